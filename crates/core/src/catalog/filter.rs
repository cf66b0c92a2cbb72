//! Catalog listing filters and pagination.

use std::collections::BTreeSet;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{Category, Product, resolver::compare_sizes};

/// Products per listing page.
pub const PER_PAGE: usize = 20;

/// Shopper-selected listing filters. Empty lists match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogFilter {
    /// Case-insensitive substring of the product name.
    pub query: Option<String>,
    pub brands: Vec<String>,
    pub categories: Vec<Category>,
    /// A product matches when any of its variants has one of these sizes.
    pub sizes: Vec<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
}

impl CatalogFilter {
    #[must_use]
    pub fn matches(&self, product: &Product) -> bool {
        if let Some(query) = self.query.as_deref().map(str::trim).filter(|q| !q.is_empty())
            && !product
                .name
                .to_lowercase()
                .contains(&query.to_lowercase())
        {
            return false;
        }

        if !self.brands.is_empty() && !self.brands.iter().any(|b| b == &product.brand) {
            return false;
        }

        if !self.categories.is_empty() && !self.categories.contains(&product.category) {
            return false;
        }

        if !self.sizes.is_empty()
            && !product
                .variants
                .iter()
                .any(|v| self.sizes.iter().any(|s| s == &v.size))
        {
            return false;
        }

        let price = product.representative_price();
        if self.min_price.is_some_and(|min| price < min) {
            return false;
        }
        if self.max_price.is_some_and(|max| price > max) {
            return false;
        }

        true
    }

    /// Products matching the filter, in input order.
    #[must_use]
    pub fn apply<'a>(&self, products: &'a [Product]) -> Vec<&'a Product> {
        products.iter().filter(|p| self.matches(p)).collect()
    }
}

/// Inclusive price range over a listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PriceBounds {
    pub min: Decimal,
    pub max: Decimal,
}

/// The choices offered by the listing filter panel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterOptions {
    pub brands: Vec<String>,
    pub categories: Vec<Category>,
    pub sizes: Vec<String>,
    pub price_bounds: PriceBounds,
}

impl FilterOptions {
    /// Collect brands (sorted), categories (women, men, unisex), sizes
    /// (numeric-best-effort) and the representative price range.
    #[must_use]
    pub fn from_products(products: &[Product]) -> Self {
        let brands: BTreeSet<&str> = products
            .iter()
            .map(|p| p.brand.as_str())
            .filter(|b| !b.is_empty())
            .collect();
        let categories: BTreeSet<Category> = products.iter().map(|p| p.category).collect();

        let mut sizes: Vec<&str> = products
            .iter()
            .flat_map(|p| p.variants.iter().map(|v| v.size.as_str()))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        sizes.sort_by(|a, b| compare_sizes(a, b));

        let prices = products.iter().map(Product::representative_price);
        let price_bounds = PriceBounds {
            min: prices.clone().min().unwrap_or(Decimal::ZERO),
            max: prices.max().unwrap_or(Decimal::ZERO),
        };

        Self {
            brands: brands.into_iter().map(str::to_owned).collect(),
            categories: categories.into_iter().collect(),
            sizes: sizes.into_iter().map(str::to_owned).collect(),
            price_bounds,
        }
    }
}

/// One page of a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// 1-based, clamped to `[1, total_pages]`.
    pub page: usize,
    pub total_pages: usize,
    pub total_items: usize,
}

/// Slice `items` into the requested page, clamping the page number.
#[must_use]
pub fn paginate<T: Clone>(items: &[T], page: usize, per_page: usize) -> Page<T> {
    let per_page = per_page.max(1);
    let total_items = items.len();
    let total_pages = total_items.div_ceil(per_page).max(1);
    let page = page.clamp(1, total_pages);

    let start = (page - 1) * per_page;
    let items = items
        .iter()
        .skip(start)
        .take(per_page)
        .cloned()
        .collect();

    Page {
        items,
        page,
        total_pages,
        total_items,
    }
}
