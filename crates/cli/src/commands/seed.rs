//! Seed the catalog from a YAML file.
//!
//! Entries are matched by exact name; existing ones are skipped, so the
//! command can be re-run after adding to the file. Prices are decimal
//! strings and must be quoted.
//!
//! ```yaml
//! products:
//!   - name: Soft-close hinge
//!     brand: Blum
//!     category: hardware
//!     price: "12.50"
//!     selling_price: "9.99"
//! thermofoil:
//!   - name: Gloss White
//!     brand: Polytec
//!     unit: meter
//!     price_per_unit: "18.40"
//! ```

use std::path::Path;

use serde::Deserialize;
use tracing::{error, info};

use foilcraft_core::ItemType;
use foilcraft_storefront::db::CatalogRepository;
use foilcraft_storefront::models::{NewProduct, NewThermofoil};

use super::connect;

/// Contents of a catalog seed file.
#[derive(Debug, Default, Deserialize)]
pub struct SeedCatalog {
    #[serde(default)]
    pub products: Vec<NewProduct>,
    #[serde(default)]
    pub thermofoil: Vec<NewThermofoil>,
}

impl SeedCatalog {
    /// Every validation problem in the file, prefixed with its entry.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let products = self
            .products
            .iter()
            .enumerate()
            .filter_map(|(i, p)| p.validate().err().map(|e| format!("products[{i}] ({}): {e}", p.name)));
        let thermofoil = self
            .thermofoil
            .iter()
            .enumerate()
            .filter_map(|(i, t)| t.validate().err().map(|e| format!("thermofoil[{i}] ({}): {e}", t.name)));
        products.chain(thermofoil).collect()
    }
}

#[derive(Debug, Default)]
struct SeedResult {
    inserted: usize,
    skipped: usize,
}

/// Seed products and thermofoil from `file_path`.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, any entry is
/// invalid, or a database operation fails.
pub async fn catalog(file_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let path = Path::new(file_path);
    if !path.exists() {
        return Err(format!("File not found: {file_path}").into());
    }

    info!(path = %file_path, "Loading catalog from file");

    // Read and validate YAML before connecting to database
    let content = tokio::fs::read_to_string(path).await?;
    let catalog: SeedCatalog = serde_yaml::from_str(&content)?;

    info!(
        products = catalog.products.len(),
        thermofoil = catalog.thermofoil.len(),
        "Parsed catalog"
    );

    let errors = catalog.validate();
    if !errors.is_empty() {
        error!("Catalog validation failed:");
        for err in &errors {
            error!("  - {err}");
        }
        return Err(format!("{} validation errors found", errors.len()).into());
    }

    let pool = connect().await?;
    let repo = CatalogRepository::new(&pool);
    let mut result = SeedResult::default();

    for product in &catalog.products {
        if repo.name_exists(ItemType::Product, &product.name).await? {
            result.skipped += 1;
            continue;
        }
        let created = repo.create_product(product).await?;
        info!(id = %created.id, name = %created.name, "Inserted product");
        result.inserted += 1;
    }

    for item in &catalog.thermofoil {
        if repo.name_exists(ItemType::Thermofoil, &item.name).await? {
            result.skipped += 1;
            continue;
        }
        let created = repo.create_thermofoil(item).await?;
        info!(id = %created.id, name = %created.name, "Inserted thermofoil");
        result.inserted += 1;
    }

    info!("Seeding complete!");
    info!("  Inserted: {}", result.inserted);
    info!("  Skipped (already exist): {}", result.skipped);
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::str::FromStr;

    use foilcraft_core::LengthUnit;
    use rust_decimal::Decimal;

    use super::*;

    #[test]
    fn test_parses_both_families() {
        let catalog: SeedCatalog = serde_yaml::from_str(
            r#"
products:
  - name: Soft-close hinge
    category: hardware
    price: "12.50"
    selling_price: "9.99"
thermofoil:
  - name: Gloss White
    unit: meter
    price_per_unit: "18.40"
"#,
        )
        .unwrap();

        assert_eq!(catalog.products.len(), 1);
        assert_eq!(
            catalog.products.first().unwrap().selling_price,
            Decimal::from_str("9.99").unwrap()
        );
        assert_eq!(catalog.thermofoil.first().unwrap().unit, LengthUnit::Meter);
        assert!(catalog.validate().is_empty());
    }

    #[test]
    fn test_validation_names_the_entry() {
        let catalog: SeedCatalog = serde_yaml::from_str(
            r#"
thermofoil:
  - name: Oak
    price_per_unit: "0"
"#,
        )
        .unwrap();

        assert_eq!(
            catalog.validate(),
            vec!["thermofoil[0] (Oak): price_per_unit must be greater than zero".to_string()]
        );
    }
}
