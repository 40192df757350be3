//! Catalog domain types.
//!
//! The catalog has two families. General products are priced per item at
//! their selling price; thermofoil products are priced per length unit.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use foilcraft_core::{ItemRef, LengthUnit, ProductId, ThermofoilId};

/// A general catalog product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub brand: String,
    pub category: String,
    /// List price shown struck through when discounted.
    pub price: Decimal,
    /// Price actually charged.
    pub selling_price: Decimal,
    pub description: String,
    pub images: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A thermofoil panel product sold by length.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ThermofoilProduct {
    pub id: ThermofoilId,
    pub name: String,
    pub brand: String,
    pub unit: LengthUnit,
    pub price_per_unit: Decimal,
    pub description: String,
    pub images: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A resolved catalog item of either family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CatalogItem {
    Product(Product),
    Thermofoil(ThermofoilProduct),
}

impl CatalogItem {
    #[must_use]
    pub const fn item_ref(&self) -> ItemRef {
        match self {
            Self::Product(p) => ItemRef::Product(p.id),
            Self::Thermofoil(t) => ItemRef::Thermofoil(t.id),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Product(p) => &p.name,
            Self::Thermofoil(t) => &t.name,
        }
    }

    /// Price charged for one unit of quantity.
    #[must_use]
    pub const fn unit_price(&self) -> Decimal {
        match self {
            Self::Product(p) => p.selling_price,
            Self::Thermofoil(t) => t.price_per_unit,
        }
    }

    /// What one unit of quantity measures, for length-priced items.
    #[must_use]
    pub const fn pricing_unit(&self) -> Option<LengthUnit> {
        match self {
            Self::Product(_) => None,
            Self::Thermofoil(t) => Some(t.unit),
        }
    }
}

/// Payload for creating or replacing a general product.
#[derive(Debug, Clone, Deserialize)]
pub struct NewProduct {
    pub name: String,
    #[serde(default)]
    pub brand: String,
    #[serde(default)]
    pub category: String,
    pub price: Decimal,
    pub selling_price: Decimal,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub images: Vec<String>,
}

impl NewProduct {
    /// Check the payload before it reaches the database.
    ///
    /// # Errors
    ///
    /// Returns a client-facing message describing the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        require_name(&self.name)?;
        require_price("price", self.price)?;
        require_price("selling_price", self.selling_price)
    }
}

/// Payload for creating or replacing a thermofoil product.
#[derive(Debug, Clone, Deserialize)]
pub struct NewThermofoil {
    pub name: String,
    #[serde(default)]
    pub brand: String,
    #[serde(default)]
    pub unit: LengthUnit,
    pub price_per_unit: Decimal,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub images: Vec<String>,
}

impl NewThermofoil {
    /// Check the payload before it reaches the database.
    ///
    /// # Errors
    ///
    /// Returns a client-facing message describing the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        require_name(&self.name)?;
        require_price("price_per_unit", self.price_per_unit)
    }
}

fn require_name(name: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("name is required".to_string());
    }
    Ok(())
}

fn require_price(field: &str, value: Decimal) -> Result<(), String> {
    if value.is_sign_negative() || value.is_zero() {
        return Err(format!("{field} must be greater than zero"));
    }
    if value.normalize().scale() > 2 {
        return Err(format!("{field} must have at most two decimal places"));
    }
    Ok(())
}
