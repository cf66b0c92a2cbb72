//! Catalog model: products, their purchasable variants, and categories.
//!
//! The catalog is read-mostly from the storefront's perspective. Products
//! are loaded from the relational store (or a seed file) and handed to the
//! [`resolver`] and [`filter`] functions, which are pure.

pub mod filter;
pub mod resolver;

use core::fmt;
use std::collections::HashSet;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{ProductId, VariantId};

/// Color label shared by every variant that has no color of its own.
pub const IMPLICIT_COLOR: &str = "";

/// Brand shown when a product has none.
pub const DEFAULT_BRAND: &str = "Sneaco";

/// Image shown when a product has no images.
pub const PLACEHOLDER_IMAGE: &str = "/static/images/placeholder.png";

/// Normalize a raw color label: trimmed, with empty or absent mapped to
/// [`IMPLICIT_COLOR`].
#[must_use]
pub fn normalize_color(raw: Option<&str>) -> String {
    raw.map_or_else(|| IMPLICIT_COLOR.to_owned(), |c| c.trim().to_owned())
}

/// Errors reported by [`Product::validate`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("product {product} has no name")]
    EmptyName { product: ProductId },

    #[error("product {product} has no variants")]
    NoVariants { product: ProductId },

    #[error("product {product} has two variants with size {size:?} and color {color:?}")]
    DuplicateVariant {
        product: ProductId,
        size: String,
        color: String,
    },

    #[error("variant {variant} has a negative price")]
    NegativePrice { variant: VariantId },
}

/// Product category.
///
/// Stored as free text in the catalog; parsed best-effort, so anything that
/// is not recognisably men's or women's is unisex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Women,
    Men,
    #[default]
    Unisex,
}

impl Category {
    /// Parse a free-text category (French or English).
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim().to_lowercase();
        if raw.starts_with("hom") || raw == "men" || raw == "man" || raw == "male" {
            Self::Men
        } else if raw.starts_with("fem") || raw.starts_with("wom") {
            Self::Women
        } else {
            Self::Unisex
        }
    }

    /// Storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Women => "women",
            Self::Men => "men",
            Self::Unisex => "unisex",
        }
    }

    /// Customer-facing label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Women => "Femme",
            Self::Men => "Homme",
            Self::Unisex => "Unisexe",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A purchasable size/color/price/stock combination of a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    pub id: VariantId,
    pub size: String,
    /// Color label, [`IMPLICIT_COLOR`] when the variant has none.
    pub color: String,
    /// Price in major units.
    pub price: Decimal,
    pub stock: u32,
}

impl Variant {
    #[must_use]
    pub fn new(
        id: impl Into<VariantId>,
        size: impl Into<String>,
        color: Option<&str>,
        price: Decimal,
        stock: u32,
    ) -> Self {
        Self {
            id: id.into(),
            size: size.into().trim().to_owned(),
            color: normalize_color(color),
            price,
            stock,
        }
    }

    #[must_use]
    pub const fn in_stock(&self) -> bool {
        self.stock > 0
    }

    /// Stock from a signed store value; negative counts read as zero.
    #[must_use]
    pub fn stock_from_store(raw: i32) -> u32 {
        u32::try_from(raw).unwrap_or(0)
    }
}

/// A catalog product with its variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub brand: String,
    pub description: String,
    pub category: Category,
    /// Image URLs in display order.
    pub images: Vec<String>,
    pub variants: Vec<Variant>,
}

impl Product {
    /// Representative price: the cheapest variant, or zero without variants.
    #[must_use]
    pub fn representative_price(&self) -> Decimal {
        self.variants
            .iter()
            .map(|v| v.price)
            .min()
            .unwrap_or(Decimal::ZERO)
    }

    /// Default display color: the first variant's color.
    #[must_use]
    pub fn default_color(&self) -> Option<&str> {
        self.variants.first().map(|v| v.color.as_str())
    }

    /// Distinct colors, first-seen order.
    #[must_use]
    pub fn colors(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.variants
            .iter()
            .map(|v| v.color.as_str())
            .filter(|c| seen.insert(*c))
            .collect()
    }

    /// Distinct sizes, numeric-best-effort order.
    #[must_use]
    pub fn sizes(&self) -> Vec<&str> {
        resolver::sorted_sizes(&self.variants)
    }

    /// First image, or the placeholder.
    #[must_use]
    pub fn primary_image(&self) -> &str {
        self.images.first().map_or(PLACEHOLDER_IMAGE, String::as_str)
    }

    #[must_use]
    pub fn variant(&self, id: &VariantId) -> Option<&Variant> {
        self.variants.iter().find(|v| &v.id == id)
    }

    #[must_use]
    pub fn is_in_stock(&self) -> bool {
        self.variants.iter().any(Variant::in_stock)
    }

    /// Check catalog invariants, collecting every violation.
    ///
    /// # Errors
    ///
    /// Returns all violations found: empty name, no variants, two variants
    /// sharing a `(size, color)` pair, or a negative variant price.
    pub fn validate(&self) -> Result<(), Vec<CatalogError>> {
        let mut errors = Vec::new();

        if self.name.trim().is_empty() {
            errors.push(CatalogError::EmptyName {
                product: self.id.clone(),
            });
        }

        if self.variants.is_empty() {
            errors.push(CatalogError::NoVariants {
                product: self.id.clone(),
            });
        }

        let mut pairs = HashSet::new();
        for variant in &self.variants {
            if !pairs.insert((variant.size.as_str(), variant.color.as_str())) {
                errors.push(CatalogError::DuplicateVariant {
                    product: self.id.clone(),
                    size: variant.size.clone(),
                    color: variant.color.clone(),
                });
            }
            if variant.price < Decimal::ZERO {
                errors.push(CatalogError::NegativePrice {
                    variant: variant.id.clone(),
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Brand with the default applied to blank values.
#[must_use]
pub fn brand_or_default(raw: Option<&str>) -> String {
    raw.map(str::trim)
        .filter(|b| !b.is_empty())
        .unwrap_or(DEFAULT_BRAND)
        .to_owned()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn variant(id: &str, size: &str, color: &str, price: i64, stock: u32) -> Variant {
        Variant::new(id, size, Some(color), Decimal::new(price, 2), stock)
    }

    pub(crate) fn product(id: &str, variants: Vec<Variant>) -> Product {
        Product {
            id: ProductId::new(id),
            name: format!("Product {id}"),
            brand: DEFAULT_BRAND.to_owned(),
            description: String::new(),
            category: Category::Unisex,
            images: Vec::new(),
            variants,
        }
    }

    #[test]
    fn test_category_parse() {
        assert_eq!(Category::parse("Homme"), Category::Men);
        assert_eq!(Category::parse("hommes"), Category::Men);
        assert_eq!(Category::parse("men"), Category::Men);
        assert_eq!(Category::parse("Femme"), Category::Women);
        assert_eq!(Category::parse("Women"), Category::Women);
        assert_eq!(Category::parse("Unisexe"), Category::Unisex);
        assert_eq!(Category::parse(""), Category::Unisex);
        assert_eq!(Category::parse("kids"), Category::Unisex);
    }

    #[test]
    fn test_representative_price_is_cheapest_variant() {
        let p = product(
            "P1",
            vec![
                variant("V1", "42", "Noir", 12_900, 1),
                variant("V2", "43", "Noir", 11_900, 0),
            ],
        );
        assert_eq!(p.representative_price(), Decimal::new(11_900, 2));
        assert_eq!(product("P2", vec![]).representative_price(), Decimal::ZERO);
    }

    #[test]
    fn test_colors_and_default_color() {
        let p = product(
            "P1",
            vec![
                variant("V1", "42", "Blanc", 100, 1),
                variant("V2", "42", "Noir", 100, 1),
                variant("V3", "43", "Blanc", 100, 1),
            ],
        );
        assert_eq!(p.colors(), vec!["Blanc", "Noir"]);
        assert_eq!(p.default_color(), Some("Blanc"));
    }

    #[test]
    fn test_blank_color_is_implicit() {
        let v = Variant::new("V1", " 42 ", Some("  "), Decimal::ONE, 1);
        assert_eq!(v.color, IMPLICIT_COLOR);
        assert_eq!(v.size, "42");
        let v = Variant::new("V2", "42", None, Decimal::ONE, 1);
        assert_eq!(v.color, IMPLICIT_COLOR);
    }

    #[test]
    fn test_negative_store_stock_reads_as_zero() {
        assert_eq!(Variant::stock_from_store(-3), 0);
        assert_eq!(Variant::stock_from_store(7), 7);
    }

    #[test]
    fn test_primary_image_falls_back_to_placeholder() {
        let mut p = product("P1", vec![]);
        assert_eq!(p.primary_image(), PLACEHOLDER_IMAGE);
        p.images.push("/img/a.jpg".to_owned());
        assert_eq!(p.primary_image(), "/img/a.jpg");
    }

    #[test]
    fn test_validate_reports_duplicates() {
        let p = product(
            "P1",
            vec![
                variant("V1", "42", "Noir", 100, 1),
                variant("V2", "42", "Noir", 100, 1),
            ],
        );
        let errors = p.validate().unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(matches!(
            errors.first(),
            Some(CatalogError::DuplicateVariant { .. })
        ));
    }

    #[test]
    fn test_validate_collects_every_violation() {
        let mut p = product("P1", vec![]);
        p.name = " ".to_owned();
        let errors = p.validate().unwrap_err();
        assert_eq!(errors.len(), 2);

        let p = product("P2", vec![variant("V1", "42", "Noir", -100, 1)]);
        assert_eq!(
            p.validate().unwrap_err(),
            vec![CatalogError::NegativePrice {
                variant: VariantId::new("V1")
            }]
        );
    }

    #[test]
    fn test_brand_or_default() {
        assert_eq!(brand_or_default(None), "Sneaco");
        assert_eq!(brand_or_default(Some("  ")), "Sneaco");
        assert_eq!(brand_or_default(Some("Veja")), "Veja");
    }
}
