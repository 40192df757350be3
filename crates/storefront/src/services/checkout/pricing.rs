//! Server-side pricing of checkout items.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::Deserialize;

use foilcraft_core::{CurrencyCode, ItemRef, Money};

use super::CheckoutError;
use crate::db::cart::MAX_QUANTITY;
use crate::models::{CatalogItem, OrderLine};

/// An item and quantity the buyer asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RequestedItem {
    pub item: ItemRef,
    pub quantity: u32,
}

/// Lines and total for a new order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedOrder {
    pub lines: Vec<OrderLine>,
    pub total: Decimal,
}

/// Merge repeated references, keeping first-seen order, and check quantities.
///
/// # Errors
///
/// Returns `CheckoutError::Validation` for an empty list or a quantity
/// outside `1..=999` (after merging).
pub fn merge_items(items: &[RequestedItem]) -> Result<Vec<RequestedItem>, CheckoutError> {
    if items.is_empty() {
        return Err(CheckoutError::Validation("cart is empty".to_string()));
    }

    let mut merged: Vec<RequestedItem> = Vec::with_capacity(items.len());
    for requested in items {
        if requested.quantity == 0 {
            return Err(CheckoutError::Validation(format!(
                "quantity for {} must be at least 1",
                requested.item
            )));
        }
        match merged.iter_mut().find(|m| m.item == requested.item) {
            Some(existing) => {
                existing.quantity = existing.quantity.saturating_add(requested.quantity);
            }
            None => merged.push(*requested),
        }
    }

    if let Some(over) = merged.iter().find(|m| m.quantity > MAX_QUANTITY) {
        return Err(CheckoutError::Validation(format!(
            "quantity for {} must be at most {MAX_QUANTITY}",
            over.item
        )));
    }

    Ok(merged)
}

/// Price each item from the catalog.
///
/// # Errors
///
/// Returns `CheckoutError::Validation` if an item is missing from `catalog`,
/// has a non-positive price, or an amount cannot be charged in whole cents.
pub fn price_items(
    items: &[RequestedItem],
    catalog: &HashMap<ItemRef, CatalogItem>,
    currency: CurrencyCode,
) -> Result<PricedOrder, CheckoutError> {
    let mut lines = Vec::with_capacity(items.len());
    let mut total = Money::zero(currency);

    for requested in items {
        let item = catalog.get(&requested.item).ok_or_else(|| {
            CheckoutError::Validation(format!("{} is no longer available", requested.item))
        })?;

        let unit_price = Money::new(item.unit_price(), currency);
        if unit_price.amount <= Decimal::ZERO {
            return Err(CheckoutError::Validation(format!(
                "{} has no valid price",
                requested.item
            )));
        }
        chargeable(&unit_price)?;

        let line_total = unit_price.times(requested.quantity);
        total.amount += line_total.amount;

        lines.push(OrderLine {
            item: requested.item,
            name: item.name().to_string(),
            unit_price: unit_price.amount,
            quantity: requested.quantity,
            pricing_unit: item.pricing_unit(),
            line_total: line_total.amount,
        });
    }

    chargeable(&total)?;

    Ok(PricedOrder {
        lines,
        total: total.amount,
    })
}

fn chargeable(amount: &Money) -> Result<i64, CheckoutError> {
    amount
        .to_minor_units()
        .map_err(|e| CheckoutError::Validation(format!("cannot charge {amount}: {e}")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use std::str::FromStr;

    use chrono::Utc;
    use foilcraft_core::{LengthUnit, ProductId, ThermofoilId};

    use super::*;
    use crate::models::{Product, ThermofoilProduct};

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn product(id: i32, selling: &str) -> CatalogItem {
        CatalogItem::Product(Product {
            id: ProductId::new(id),
            name: format!("Product {id}"),
            brand: "Hettich".to_string(),
            category: "Hardware".to_string(),
            price: dec(selling),
            selling_price: dec(selling),
            description: String::new(),
            images: vec![],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        })
    }

    fn thermofoil(id: i32, per_unit: &str) -> CatalogItem {
        CatalogItem::Thermofoil(ThermofoilProduct {
            id: ThermofoilId::new(id),
            name: format!("Foil {id}"),
            brand: "Polytec".to_string(),
            unit: LengthUnit::Meter,
            price_per_unit: dec(per_unit),
            description: String::new(),
            images: vec![],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        })
    }

    fn catalog(items: Vec<CatalogItem>) -> HashMap<ItemRef, CatalogItem> {
        items.into_iter().map(|i| (i.item_ref(), i)).collect()
    }

    fn req(item: ItemRef, quantity: u32) -> RequestedItem {
        RequestedItem { item, quantity }
    }

    const P1: ItemRef = ItemRef::Product(ProductId::new(1));
    const T1: ItemRef = ItemRef::Thermofoil(ThermofoilId::new(1));

    #[test]
    fn test_mixed_families_total() {
        let catalog = catalog(vec![product(1, "100"), thermofoil(1, "50")]);
        let priced =
            price_items(&[req(P1, 2), req(T1, 1)], &catalog, CurrencyCode::AUD).unwrap();

        assert_eq!(priced.total, dec("250"));
        assert_eq!(priced.lines[0].line_total, dec("200"));
        assert_eq!(priced.lines[0].pricing_unit, None);
        assert_eq!(priced.lines[1].pricing_unit, Some(LengthUnit::Meter));
        assert_eq!(priced.lines[1].display_name(), "Foil 1 (per meter)");
    }

    #[test]
    fn test_total_is_sum_of_line_totals() {
        let catalog = catalog(vec![
            product(1, "19.99"),
            product(2, "0.05"),
            thermofoil(1, "7.35"),
        ]);
        let items = [
            req(P1, 3),
            req(ItemRef::Product(ProductId::new(2)), 999),
            req(T1, 12),
        ];
        let priced = price_items(&items, &catalog, CurrencyCode::AUD).unwrap();

        let sum: Decimal = priced.lines.iter().map(|l| l.unit_price * Decimal::from(l.quantity)).sum();
        assert_eq!(priced.total, sum);
        assert_eq!(priced.total, dec("59.97") + dec("49.95") + dec("88.20"));
    }

    #[test]
    fn test_missing_item_rejected() {
        let catalog = catalog(vec![product(1, "100")]);
        let err = price_items(&[req(P1, 1), req(T1, 1)], &catalog, CurrencyCode::AUD).unwrap_err();
        assert!(matches!(err, CheckoutError::Validation(ref m) if m.contains("thermofoil:1")));
    }

    #[test]
    fn test_zero_price_rejected() {
        let catalog = catalog(vec![product(1, "0")]);
        assert!(matches!(
            price_items(&[req(P1, 1)], &catalog, CurrencyCode::AUD),
            Err(CheckoutError::Validation(_))
        ));
    }

    #[test]
    fn test_sub_cent_price_rejected() {
        let catalog = catalog(vec![product(1, "1.005")]);
        assert!(matches!(
            price_items(&[req(P1, 1)], &catalog, CurrencyCode::AUD),
            Err(CheckoutError::Validation(_))
        ));
    }

    #[test]
    fn test_merge_duplicates() {
        let merged = merge_items(&[req(P1, 2), req(T1, 1), req(P1, 3)]).unwrap();
        assert_eq!(merged, vec![req(P1, 5), req(T1, 1)]);
    }

    #[test]
    fn test_merge_quantity_bounds() {
        assert!(matches!(merge_items(&[]), Err(CheckoutError::Validation(_))));
        assert!(matches!(
            merge_items(&[req(P1, 0)]),
            Err(CheckoutError::Validation(_))
        ));
        assert!(merge_items(&[req(P1, 999)]).is_ok());
        assert!(matches!(
            merge_items(&[req(P1, 500), req(P1, 500)]),
            Err(CheckoutError::Validation(_))
        ));
    }
}
