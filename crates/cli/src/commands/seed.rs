//! Seed the catalog from a YAML file.
//!
//! The whole file is parsed and validated before the database is touched, so
//! a file with errors inserts nothing. Each product is then upserted in its
//! own transaction.
//!
//! ```yaml
//! products:
//!   - id: air-runner-90
//!     name: Air Runner 90
//!     brand: Sneaco
//!     category: homme
//!     images:
//!       - https://cdn.sneaco.fr/air-runner-90/1.jpg
//!     variants:
//!       - id: air-runner-90-42-blanc
//!         size: "42"
//!         color: Blanc
//!         price: "129.99"
//!         stock: 4
//! ```

use std::path::Path;

use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;
use tracing::{error, info};

use sneaco_core::ProductId;
use sneaco_core::catalog::{CatalogError, Category, Product, Variant, brand_or_default};
use sneaco_storefront::db::{self, RepositoryError, catalog::upsert_product};

/// Errors that can occur while seeding.
#[derive(Debug, Error)]
pub enum SeedError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Could not read file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("{0} validation errors found")]
    Invalid(usize),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Failed to insert product {product}: {source}")]
    Insert {
        product: ProductId,
        source: RepositoryError,
    },
}

/// Top-level shape of a catalog seed file.
#[derive(Debug, Deserialize)]
pub struct CatalogFile {
    pub products: Vec<SeedProduct>,
}

#[derive(Debug, Deserialize)]
pub struct SeedProduct {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub description: String,
    /// Free text, French or English.
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub variants: Vec<SeedVariant>,
}

#[derive(Debug, Deserialize)]
pub struct SeedVariant {
    pub id: String,
    pub size: String,
    #[serde(default)]
    pub color: Option<String>,
    pub price: Decimal,
    #[serde(default)]
    pub stock: u32,
}

impl From<SeedProduct> for Product {
    fn from(seed: SeedProduct) -> Self {
        Self {
            id: ProductId::new(seed.id),
            name: seed.name.trim().to_owned(),
            brand: brand_or_default(seed.brand.as_deref()),
            description: seed.description,
            category: seed
                .category
                .as_deref()
                .map_or_else(Category::default, Category::parse),
            images: seed.images,
            variants: seed
                .variants
                .into_iter()
                .map(|v| Variant::new(v.id, v.size, v.color.as_deref(), v.price, v.stock))
                .collect(),
        }
    }
}

/// Parse a catalog file and validate every product.
///
/// # Errors
///
/// Returns the YAML error, or every validation error across all products.
pub fn parse_catalog(content: &str) -> Result<Vec<Product>, ParseOutcome> {
    let file: CatalogFile = serde_yaml::from_str(content).map_err(ParseOutcome::Yaml)?;
    let products: Vec<Product> = file.products.into_iter().map(Product::from).collect();

    let errors: Vec<CatalogError> = products
        .iter()
        .filter_map(|p| p.validate().err())
        .flatten()
        .collect();

    if errors.is_empty() {
        Ok(products)
    } else {
        Err(ParseOutcome::Invalid(errors))
    }
}

/// Why a catalog file was rejected.
#[derive(Debug)]
pub enum ParseOutcome {
    Yaml(serde_yaml::Error),
    Invalid(Vec<CatalogError>),
}

/// Seed the catalog from a YAML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, any product is
/// invalid, the database URL is missing, or an insert fails.
pub async fn catalog(file_path: &str, dry_run: bool) -> Result<(), SeedError> {
    let path = Path::new(file_path);
    if !path.exists() {
        return Err(SeedError::FileNotFound(file_path.to_string()));
    }

    info!(path = %file_path, "Loading catalog from file");
    let content = tokio::fs::read_to_string(path).await?;

    let products = match parse_catalog(&content) {
        Ok(products) => products,
        Err(ParseOutcome::Yaml(e)) => return Err(SeedError::Yaml(e)),
        Err(ParseOutcome::Invalid(errors)) => {
            error!("Catalog validation failed:");
            for err in &errors {
                error!("  - {err}");
            }
            return Err(SeedError::Invalid(errors.len()));
        }
    };

    let variants: usize = products.iter().map(|p| p.variants.len()).sum();
    info!(products = products.len(), variants, "Catalog validated successfully");

    if dry_run {
        info!("Dry run, nothing written");
        return Ok(());
    }

    let database_url =
        super::database_url().ok_or(SeedError::MissingEnvVar("STOREFRONT_DATABASE_URL"))?;
    let pool = db::create_pool(&database_url).await?;
    info!("Connected to database");

    for product in &products {
        upsert_product(&pool, product)
            .await
            .map_err(|source| SeedError::Insert {
                product: product.id.clone(),
                source,
            })?;
        info!(product_id = %product.id, variants = product.variants.len(), "Product seeded");
    }

    info!("Seeding complete!");
    Ok(())
}
