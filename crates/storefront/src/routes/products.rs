//! Product route handlers.

use axum::{
    Json,
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
};
use rust_decimal::Decimal;
use serde::Deserialize;
use sneaco_core::ProductId;
use sneaco_core::catalog::Category;
use sneaco_core::catalog::filter::CatalogFilter;
use tracing::instrument;

use crate::error::{AppError, Result};
use crate::services::catalog::{Listing, listing, product_view};
use crate::state::AppState;

/// Listing query parameters. List filters are comma-separated.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ListingQuery {
    pub q: Option<String>,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub size: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub page: Option<usize>,
}

impl ListingQuery {
    fn filter(&self) -> CatalogFilter {
        CatalogFilter {
            query: self.q.clone(),
            brands: split_list(self.brand.as_deref()),
            categories: split_list(self.category.as_deref())
                .iter()
                .map(|c| Category::parse(c))
                .collect(),
            sizes: split_list(self.size.as_deref()),
            min_price: self.min_price,
            max_price: self.max_price,
        }
    }
}

fn split_list(raw: Option<&str>) -> Vec<String> {
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Variant selector query parameters.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SelectorQuery {
    pub size: Option<String>,
    pub color: Option<String>,
}

/// Product listing with filters and pagination.
#[instrument(skip(state))]
pub async fn index(
    State(state): State<AppState>,
    Query(query): Query<ListingQuery>,
) -> Result<Json<Listing>> {
    let filter = query.filter();
    let page = listing(state.catalog().as_ref(), &filter, query.page.unwrap_or(1)).await?;
    Ok(Json(page))
}

/// Product detail with the variant resolved for the requested size and color.
#[instrument(skip(state), fields(product_id = %id))]
pub async fn show(
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
    Query(selector): Query<SelectorQuery>,
) -> Result<Response> {
    let product = state
        .catalog()
        .product(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("product {id}")))?;

    Ok(Json(product_view(&product, selector.size, selector.color)).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_query_splits_lists() {
        let query = ListingQuery {
            brand: Some("Sneaco, Runwell,".to_string()),
            category: Some("homme,femme".to_string()),
            size: Some("42".to_string()),
            ..ListingQuery::default()
        };
        let filter = query.filter();

        assert_eq!(filter.brands, vec!["Sneaco", "Runwell"]);
        assert_eq!(filter.categories, vec![Category::Men, Category::Women]);
        assert_eq!(filter.sizes, vec!["42"]);
        assert!(filter.query.is_none());
    }

    #[test]
    fn test_empty_query_filters_nothing() {
        assert_eq!(ListingQuery::default().filter(), CatalogFilter::default());
    }
}
