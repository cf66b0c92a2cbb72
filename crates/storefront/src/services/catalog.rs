//! Catalog reads.
//!
//! Listing and product detail may come from a cache; stock reads never do,
//! since cart clamping depends on them.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;
use sneaco_core::catalog::filter::{CatalogFilter, FilterOptions, PER_PAGE, Page, paginate};
use sneaco_core::catalog::resolver::{Resolution, Selection};
use sneaco_core::catalog::{Category, Product, Variant};
use sneaco_core::{ProductId, VariantId};

use crate::db::RepositoryError;

/// A variant together with the product fields a cart line displays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariantDetail {
    pub product_id: ProductId,
    pub product_name: String,
    pub brand: String,
    pub image: String,
    pub variant: Variant,
}

/// Read access to the product catalog.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Every product with its variants and images.
    async fn list_products(&self) -> Result<Vec<Product>, RepositoryError>;

    async fn product(&self, id: &ProductId) -> Result<Option<Product>, RepositoryError>;

    /// Details for the given variants. Unknown ids are left out.
    async fn variant_details(&self, ids: &[VariantId]) -> Result<Vec<VariantDetail>, RepositoryError>;

    /// Current stock of one variant, read fresh. `None` for an unknown variant.
    async fn stock(&self, id: &VariantId) -> Result<Option<u32>, RepositoryError>;
}

/// A product as shown in a listing grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductSummary {
    pub id: ProductId,
    pub name: String,
    pub brand: String,
    pub category: Category,
    pub price: Decimal,
    pub image: String,
    pub in_stock: bool,
}

impl From<&Product> for ProductSummary {
    fn from(product: &Product) -> Self {
        Self {
            id: product.id.clone(),
            name: product.name.clone(),
            brand: product.brand.clone(),
            category: product.category,
            price: product.representative_price(),
            image: product.primary_image().to_owned(),
            in_stock: product.is_in_stock(),
        }
    }
}

/// One page of filtered products plus the filter facets of the whole catalog.
#[derive(Debug, Clone, Serialize)]
pub struct Listing {
    #[serde(flatten)]
    pub page: Page<ProductSummary>,
    pub filters: FilterOptions,
}

/// Filter and paginate the catalog.
///
/// # Errors
///
/// Returns `RepositoryError` if the catalog cannot be read.
pub async fn listing(
    source: &dyn CatalogSource,
    filter: &CatalogFilter,
    page: usize,
) -> Result<Listing, RepositoryError> {
    let products = source.list_products().await?;
    let filters = FilterOptions::from_products(&products);

    let summaries: Vec<ProductSummary> = filter
        .apply(&products)
        .into_iter()
        .map(ProductSummary::from)
        .collect();

    Ok(Listing {
        page: paginate(&summaries, page, PER_PAGE),
        filters,
    })
}

/// A product page: the product plus the variant resolution for the
/// requested selectors.
#[derive(Debug, Serialize)]
pub struct ProductView<'a> {
    pub product: &'a Product,
    pub selection: Selection,
    pub resolution: Resolution<'a>,
}

/// Resolve the product page for the given selectors.
///
/// Without any selector, the initial selection is used (first in-stock size,
/// first color).
#[must_use]
pub fn product_view(product: &Product, size: Option<String>, color: Option<String>) -> ProductView<'_> {
    let selection = if size.is_none() && color.is_none() {
        Selection::initial(product)
    } else {
        Selection { size, color }
    };
    let resolution = selection.resolve(&product.variants);

    ProductView {
        product,
        selection,
        resolution,
    }
}
