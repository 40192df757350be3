//! Cart domain types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use foilcraft_core::{CartEntryId, ItemRef, UserId};

use super::catalog::CatalogItem;

/// One stored cart entry. Unique per (user, item).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartEntry {
    pub id: CartEntryId,
    pub user_id: UserId,
    pub item: ItemRef,
    pub quantity: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A cart entry with its catalog item populated.
///
/// `catalog_item` is `None` when the item has been removed from the catalog
/// since it was added; checkout rejects such carts.
#[derive(Debug, Clone, Serialize)]
pub struct CartLine {
    #[serde(flatten)]
    pub entry: CartEntry,
    pub catalog_item: Option<CatalogItem>,
}
