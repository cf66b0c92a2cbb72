//! Catalog repository.
//!
//! Product listings and product detail are cached for 5 minutes. Stock and
//! cart line details are always read from the database.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::{debug, instrument};

use sneaco_core::catalog::{Category, Product, Variant, brand_or_default};
use sneaco_core::{ProductId, VariantId};

use super::{RepositoryError, conflict_or_database};
use crate::services::catalog::{CatalogSource, VariantDetail};

/// Cache key for catalog reads.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
enum CacheKey {
    Products,
    Product(ProductId),
}

/// Cached value types.
#[derive(Debug, Clone)]
enum CacheValue {
    Products(Arc<Vec<Product>>),
    Product(Option<Box<Product>>),
}

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: String,
    name: String,
    brand: Option<String>,
    description: String,
    category: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct VariantRow {
    id: String,
    product_id: String,
    size: String,
    color: Option<String>,
    price: Decimal,
    stock: i32,
}

#[derive(Debug, sqlx::FromRow)]
struct ImageRow {
    product_id: String,
    url: String,
}

#[derive(Debug, sqlx::FromRow)]
struct VariantDetailRow {
    id: String,
    product_id: String,
    size: String,
    color: Option<String>,
    price: Decimal,
    stock: i32,
    product_name: String,
    brand: Option<String>,
    image: Option<String>,
}

impl From<VariantRow> for Variant {
    fn from(row: VariantRow) -> Self {
        Self::new(
            row.id,
            row.size,
            row.color.as_deref(),
            row.price,
            Self::stock_from_store(row.stock),
        )
    }
}

/// Postgres-backed [`CatalogSource`].
#[derive(Clone)]
pub struct PgCatalog {
    inner: Arc<PgCatalogInner>,
}

struct PgCatalogInner {
    pool: PgPool,
    cache: Cache<CacheKey, CacheValue>,
}

impl PgCatalog {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        let cache = Cache::builder()
            .max_capacity(1000)
            .time_to_live(Duration::from_secs(300)) // 5 minutes
            .build();

        Self {
            inner: Arc::new(PgCatalogInner { pool, cache }),
        }
    }

    async fn load_products(&self, only: Option<&ProductId>) -> Result<Vec<Product>, RepositoryError> {
        let pool = &self.inner.pool;
        let filter = only.map(ProductId::as_str);

        let rows: Vec<ProductRow> = sqlx::query_as(
            r"
            SELECT id, name, brand, description, category
            FROM products
            WHERE $1::text IS NULL OR id = $1
            ORDER BY created_at DESC, id
            ",
        )
        .bind(filter)
        .fetch_all(pool)
        .await?;

        let variant_rows: Vec<VariantRow> = sqlx::query_as(
            r"
            SELECT id, product_id, size, color, price, stock
            FROM product_variants
            WHERE $1::text IS NULL OR product_id = $1
            ORDER BY product_id, position, id
            ",
        )
        .bind(filter)
        .fetch_all(pool)
        .await?;

        let image_rows: Vec<ImageRow> = sqlx::query_as(
            r"
            SELECT product_id, url
            FROM product_images
            WHERE $1::text IS NULL OR product_id = $1
            ORDER BY product_id, position, id
            ",
        )
        .bind(filter)
        .fetch_all(pool)
        .await?;

        let mut variants: HashMap<String, Vec<Variant>> = HashMap::new();
        for row in variant_rows {
            variants.entry(row.product_id.clone()).or_default().push(row.into());
        }
        let mut images: HashMap<String, Vec<String>> = HashMap::new();
        for row in image_rows {
            images.entry(row.product_id).or_default().push(row.url);
        }

        Ok(rows
            .into_iter()
            .map(|row| Product {
                variants: variants.remove(&row.id).unwrap_or_default(),
                images: images.remove(&row.id).unwrap_or_default(),
                id: ProductId::new(row.id),
                name: row.name,
                brand: brand_or_default(row.brand.as_deref()),
                description: row.description,
                category: row.category.as_deref().map(Category::parse).unwrap_or_default(),
            })
            .collect())
    }
}

#[async_trait]
impl CatalogSource for PgCatalog {
    #[instrument(skip(self))]
    async fn list_products(&self) -> Result<Vec<Product>, RepositoryError> {
        if let Some(CacheValue::Products(products)) = self.inner.cache.get(&CacheKey::Products).await {
            debug!("Cache hit for product listing");
            return Ok(products.as_ref().clone());
        }

        let products = Arc::new(self.load_products(None).await?);
        self.inner
            .cache
            .insert(CacheKey::Products, CacheValue::Products(Arc::clone(&products)))
            .await;

        Ok(products.as_ref().clone())
    }

    #[instrument(skip(self), fields(product_id = %id))]
    async fn product(&self, id: &ProductId) -> Result<Option<Product>, RepositoryError> {
        let cache_key = CacheKey::Product(id.clone());
        if let Some(CacheValue::Product(product)) = self.inner.cache.get(&cache_key).await {
            debug!("Cache hit for product");
            return Ok(product.map(|p| *p));
        }

        let product = self.load_products(Some(id)).await?.into_iter().next();
        self.inner
            .cache
            .insert(cache_key, CacheValue::Product(product.clone().map(Box::new)))
            .await;

        Ok(product)
    }

    async fn variant_details(&self, ids: &[VariantId]) -> Result<Vec<VariantDetail>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<String> = ids.iter().map(|id| id.as_str().to_owned()).collect();

        let rows: Vec<VariantDetailRow> = sqlx::query_as(
            r"
            SELECT v.id, v.product_id, v.size, v.color, v.price, v.stock,
                   p.name AS product_name, p.brand,
                   (SELECT i.url FROM product_images i
                    WHERE i.product_id = p.id
                    ORDER BY i.position, i.id LIMIT 1) AS image
            FROM product_variants v
            JOIN products p ON p.id = v.product_id
            WHERE v.id = ANY($1)
            ",
        )
        .bind(&ids)
        .fetch_all(&self.inner.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| VariantDetail {
                product_id: ProductId::new(row.product_id),
                product_name: row.product_name,
                brand: brand_or_default(row.brand.as_deref()),
                image: row
                    .image
                    .unwrap_or_else(|| sneaco_core::catalog::PLACEHOLDER_IMAGE.to_owned()),
                variant: Variant::new(
                    row.id,
                    row.size,
                    row.color.as_deref(),
                    row.price,
                    Variant::stock_from_store(row.stock),
                ),
            })
            .collect())
    }

    async fn stock(&self, id: &VariantId) -> Result<Option<u32>, RepositoryError> {
        let stock: Option<i32> = sqlx::query_scalar("SELECT stock FROM product_variants WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.inner.pool)
            .await?;

        Ok(stock.map(Variant::stock_from_store))
    }
}

/// Insert or update a product with its variants and images in one transaction.
///
/// Variants are upserted by id; the product's images are replaced.
///
/// # Errors
///
/// Returns `RepositoryError::Conflict` when a variant collides with another
/// on `(product, size, color)`, `RepositoryError::Database` otherwise.
pub async fn upsert_product(pool: &PgPool, product: &Product) -> Result<(), RepositoryError> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r"
        INSERT INTO products (id, name, brand, description, category)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (id) DO UPDATE SET
            name = EXCLUDED.name,
            brand = EXCLUDED.brand,
            description = EXCLUDED.description,
            category = EXCLUDED.category
        ",
    )
    .bind(product.id.as_str())
    .bind(&product.name)
    .bind(&product.brand)
    .bind(&product.description)
    .bind(product.category.as_str())
    .execute(&mut *tx)
    .await?;

    for (position, variant) in (0_i32..).zip(&product.variants) {
        let stock = i32::try_from(variant.stock).unwrap_or(i32::MAX);
        sqlx::query(
            r"
            INSERT INTO product_variants (id, product_id, size, color, price, stock, position)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET
                size = EXCLUDED.size,
                color = EXCLUDED.color,
                price = EXCLUDED.price,
                stock = EXCLUDED.stock,
                position = EXCLUDED.position
            ",
        )
        .bind(variant.id.as_str())
        .bind(product.id.as_str())
        .bind(&variant.size)
        .bind(&variant.color)
        .bind(variant.price)
        .bind(stock)
        .bind(position)
        .execute(&mut *tx)
        .await
        .map_err(conflict_or_database)?;
    }

    sqlx::query("DELETE FROM product_images WHERE product_id = $1")
        .bind(product.id.as_str())
        .execute(&mut *tx)
        .await?;

    for (position, url) in (0_i32..).zip(&product.images) {
        sqlx::query("INSERT INTO product_images (product_id, url, position) VALUES ($1, $2, $3)")
            .bind(product.id.as_str())
            .bind(url)
            .bind(position)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(())
}
