//! Prompt construction from the catalog.

use rust_decimal::Decimal;
use serde::Serialize;

use foilcraft_core::{ItemRef, LengthUnit};

use crate::models::{Product, ThermofoilProduct};

use super::AssistantError;

/// One catalog item as the model sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogEntry {
    pub id: i32,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub brand: String,
    pub price: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_per: Option<LengthUnit>,
    pub description: String,
    pub url: String,
}

impl From<&Product> for CatalogEntry {
    fn from(p: &Product) -> Self {
        Self {
            id: p.id.as_i32(),
            name: p.name.clone(),
            kind: "product",
            category: Some(p.category.clone()).filter(|c| !c.is_empty()),
            brand: p.brand.clone(),
            price: p.selling_price,
            price_per: None,
            description: p.description.clone(),
            url: ItemRef::Product(p.id).storefront_path(),
        }
    }
}

impl From<&ThermofoilProduct> for CatalogEntry {
    fn from(t: &ThermofoilProduct) -> Self {
        Self {
            id: t.id.as_i32(),
            name: t.name.clone(),
            kind: "thermofoil",
            category: None,
            brand: t.brand.clone(),
            price: t.price_per_unit,
            price_per: Some(t.unit),
            description: t.description.clone(),
            url: ItemRef::Thermofoil(t.id).storefront_path(),
        }
    }
}

/// Both catalog families, products first.
#[must_use]
pub fn catalog_entries(products: &[Product], thermofoil: &[ThermofoilProduct]) -> Vec<CatalogEntry> {
    products
        .iter()
        .map(CatalogEntry::from)
        .chain(thermofoil.iter().map(CatalogEntry::from))
        .collect()
}

/// System prompt carrying the instructions and the catalog.
///
/// # Errors
///
/// Returns `AssistantError::Parse` if the catalog cannot be serialized.
pub fn system_prompt(catalog: &[CatalogEntry]) -> Result<String, AssistantError> {
    let catalog_json =
        serde_json::to_string(catalog).map_err(|e| AssistantError::Parse(e.to_string()))?;

    Ok(format!(
        r#"You are a shopping assistant for a home improvement store.

Here are our current products in JSON format:
{catalog_json}

Your task is to:
1. Understand the user's request
2. Recommend relevant products from our inventory
3. For each recommendation, include the product name, a one sentence description, the price, and a direct link using the "url" field
4. If no products match, suggest alternatives or ask clarifying questions
5. Keep responses concise (3-5 recommendations max)
6. Format product recommendations as:
   "• [Product Name] - [Price] - [Brief Description] [Product Link]"
7. For thermofoil products, mention they are thermofoil products and state the unit the price is per
8. Give links in this format "Here's a product: [RR980 Thermofoil Cabinet Door](/thermofoil/123)"
9. Maintain a friendly and helpful tone"#
    ))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use std::str::FromStr;

    use chrono::Utc;
    use foilcraft_core::{ProductId, ThermofoilId};

    use super::*;

    fn product() -> Product {
        Product {
            id: ProductId::new(11),
            name: "Soft-close Hinge".to_string(),
            brand: "Blum".to_string(),
            category: "Hardware".to_string(),
            price: Decimal::from_str("14.00").unwrap(),
            selling_price: Decimal::from_str("12.50").unwrap(),
            description: "Clip-on hinge".to_string(),
            images: vec![],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn foil() -> ThermofoilProduct {
        ThermofoilProduct {
            id: ThermofoilId::new(4),
            name: "RR980 Cabinet Door".to_string(),
            brand: "Polytec".to_string(),
            unit: LengthUnit::Meter,
            price_per_unit: Decimal::from_str("48.00").unwrap(),
            description: "Matte white".to_string(),
            images: vec![],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_entries_link_to_storefront_pages() {
        let entries = catalog_entries(&[product()], &[foil()]);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].url, "/product/11");
        assert_eq!(entries[0].price, Decimal::from_str("12.50").unwrap());
        assert_eq!(entries[1].url, "/thermofoil/4");
        assert_eq!(entries[1].price_per, Some(LengthUnit::Meter));
    }

    #[test]
    fn test_system_prompt_embeds_catalog() {
        let prompt = system_prompt(&catalog_entries(&[product()], &[foil()])).unwrap();
        assert!(prompt.contains(r#""url":"/thermofoil/4""#));
        assert!(prompt.contains(r#""type":"product""#));
        assert!(prompt.contains("Soft-close Hinge"));
    }
}
