//! Discriminated references into the two catalog families.
//!
//! A cart entry or order line points at either a general product or a
//! thermofoil product. [`ItemRef`] carries both the family tag and the ID so
//! the pair can never drift apart.

use core::fmt;

use serde::{Deserialize, Serialize};

use super::id::{ProductId, ThermofoilId};

/// Catalog family tag, stored alongside the raw item ID in the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "storefront.item_type", rename_all = "lowercase")
)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Product,
    Thermofoil,
}

impl ItemType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Product => "product",
            Self::Thermofoil => "thermofoil",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reference to one catalog item.
///
/// Serializes as `{"type": "product", "id": 7}` or
/// `{"type": "thermofoil", "id": 3}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "lowercase")]
pub enum ItemRef {
    Product(ProductId),
    Thermofoil(ThermofoilId),
}

impl ItemRef {
    /// Rebuild a reference from its stored `(type, id)` columns.
    #[must_use]
    pub const fn from_parts(item_type: ItemType, raw_id: i32) -> Self {
        match item_type {
            ItemType::Product => Self::Product(ProductId::new(raw_id)),
            ItemType::Thermofoil => Self::Thermofoil(ThermofoilId::new(raw_id)),
        }
    }

    #[must_use]
    pub const fn item_type(&self) -> ItemType {
        match self {
            Self::Product(_) => ItemType::Product,
            Self::Thermofoil(_) => ItemType::Thermofoil,
        }
    }

    /// The raw ID column value, meaningful only together with [`Self::item_type`].
    #[must_use]
    pub const fn raw_id(&self) -> i32 {
        match self {
            Self::Product(id) => id.as_i32(),
            Self::Thermofoil(id) => id.as_i32(),
        }
    }

    /// Storefront path of the item's detail page.
    #[must_use]
    pub fn storefront_path(&self) -> String {
        match self {
            Self::Product(id) => format!("/product/{id}"),
            Self::Thermofoil(id) => format!("/thermofoil/{id}"),
        }
    }
}

impl fmt::Display for ItemRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.item_type(), self.raw_id())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_shape() {
        let item = ItemRef::Thermofoil(ThermofoilId::new(3));
        let json = serde_json::to_value(item).unwrap();
        assert_eq!(json, serde_json::json!({"type": "thermofoil", "id": 3}));

        let parsed: ItemRef = serde_json::from_str(r#"{"type":"product","id":7}"#).unwrap();
        assert_eq!(parsed, ItemRef::Product(ProductId::new(7)));
    }

    #[test]
    fn test_unknown_tag_rejected() {
        assert!(serde_json::from_str::<ItemRef>(r#"{"type":"shed","id":1}"#).is_err());
    }

    #[test]
    fn test_from_parts_matches_accessors() {
        let item = ItemRef::from_parts(ItemType::Product, 11);
        assert_eq!(item.item_type(), ItemType::Product);
        assert_eq!(item.raw_id(), 11);
        assert_eq!(item.to_string(), "product:11");
        assert_eq!(item.storefront_path(), "/product/11");
    }
}
