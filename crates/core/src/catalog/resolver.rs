//! Size x color variant resolution.
//!
//! The product page shows two independent selectors. [`resolve`] turns the
//! variant list plus the current selectors into the full set of options
//! (every size and color is always listed, unavailable ones disabled) and
//! the single matching variant, if any. It never substitutes a different
//! pair: an out-of-stock combination is reported as such.

use std::cmp::Ordering;
use std::collections::HashSet;

use serde::Serialize;

use super::{IMPLICIT_COLOR, Product, Variant, normalize_color};

/// One entry of a size or color selector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectorOption {
    pub label: String,
    /// A variant exists for this option and the other current selector, with stock.
    pub enabled: bool,
    pub selected: bool,
}

/// Outcome of matching both selectors against the variant list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "variant", rename_all = "snake_case")]
pub enum VariantStatus<'a> {
    /// Exact match with stock.
    Available(&'a Variant),
    /// Exact match, zero stock.
    OutOfStock(&'a Variant),
    /// No variant matches the pair (or a selector is missing).
    Unavailable,
}

/// Selector options plus the resolved variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution<'a> {
    pub sizes: Vec<SelectorOption>,
    pub colors: Vec<SelectorOption>,
    pub status: VariantStatus<'a>,
}

impl<'a> Resolution<'a> {
    /// Only an in-stock exact match may be added to the cart.
    #[must_use]
    pub const fn can_add_to_cart(&self) -> bool {
        matches!(self.status, VariantStatus::Available(_))
    }

    /// The matched variant, whether or not it has stock.
    #[must_use]
    pub const fn variant(&self) -> Option<&'a Variant> {
        match self.status {
            VariantStatus::Available(v) | VariantStatus::OutOfStock(v) => Some(v),
            VariantStatus::Unavailable => None,
        }
    }
}

/// Resolve the current `(size, color)` selectors against a variant list.
///
/// Blank color input is the implicit color. When every variant of the
/// product has the implicit color, a missing color selector resolves
/// against it so single-color products still match.
///
/// With a selector missing, the options of the other axis are enabled when
/// any variant of that option has stock.
#[must_use]
pub fn resolve<'a>(
    variants: &'a [Variant],
    size: Option<&str>,
    color: Option<&str>,
) -> Resolution<'a> {
    let colors = distinct_colors(variants);

    let size = size.map(str::trim).filter(|s| !s.is_empty());
    let color = match color {
        Some(c) => Some(normalize_color(Some(c))),
        None if colors == [IMPLICIT_COLOR] => Some(IMPLICIT_COLOR.to_owned()),
        None => None,
    };
    let color = color.as_deref();

    let has_stock = |s: Option<&str>, c: Option<&str>| {
        variants.iter().any(|v| {
            v.in_stock()
                && s.is_none_or(|s| v.size == s)
                && c.is_none_or(|c| v.color == c)
        })
    };

    let size_options = sorted_sizes(variants)
        .into_iter()
        .map(|label| SelectorOption {
            enabled: has_stock(Some(label), color),
            selected: size == Some(label),
            label: label.to_owned(),
        })
        .collect();

    let color_options = colors
        .into_iter()
        .map(|label| SelectorOption {
            enabled: has_stock(size, Some(label)),
            selected: color == Some(label),
            label: label.to_owned(),
        })
        .collect();

    let status = match (size, color) {
        (Some(s), Some(c)) => variants
            .iter()
            .find(|v| v.size == s && v.color == c)
            .map_or(VariantStatus::Unavailable, |v| {
                if v.in_stock() {
                    VariantStatus::Available(v)
                } else {
                    VariantStatus::OutOfStock(v)
                }
            }),
        _ => VariantStatus::Unavailable,
    };

    Resolution {
        sizes: size_options,
        colors: color_options,
        status,
    }
}

/// Initial selector state of a product page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Selection {
    pub size: Option<String>,
    pub color: Option<String>,
}

impl Selection {
    /// First in-stock size (or the first size) and the product's default color.
    #[must_use]
    pub fn initial(product: &Product) -> Self {
        let sizes = sorted_sizes(&product.variants);
        let size = sizes
            .iter()
            .find(|s| product.variants.iter().any(|v| v.size == **s && v.in_stock()))
            .or_else(|| sizes.first())
            .map(|s| (*s).to_owned());

        Self {
            size,
            color: product.default_color().map(str::to_owned),
        }
    }

    #[must_use]
    pub fn resolve<'a>(&self, variants: &'a [Variant]) -> Resolution<'a> {
        resolve(variants, self.size.as_deref(), self.color.as_deref())
    }
}

/// Distinct size labels: numeric labels first in ascending order, then the
/// rest lexicographically.
#[must_use]
pub fn sorted_sizes(variants: &[Variant]) -> Vec<&str> {
    let mut seen = HashSet::new();
    let mut sizes: Vec<&str> = variants
        .iter()
        .map(|v| v.size.as_str())
        .filter(|s| seen.insert(*s))
        .collect();
    sizes.sort_by(|a, b| compare_sizes(a, b));
    sizes
}

/// Numeric-best-effort size ordering (`,` accepted as decimal separator).
#[must_use]
pub fn compare_sizes(a: &str, b: &str) -> Ordering {
    match (numeric_size(a), numeric_size(b)) {
        (Some(x), Some(y)) => x.total_cmp(&y).then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

fn numeric_size(label: &str) -> Option<f64> {
    label
        .trim()
        .replace(',', ".")
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
}

fn distinct_colors(variants: &[Variant]) -> Vec<&str> {
    let mut seen = HashSet::new();
    variants
        .iter()
        .map(|v| v.color.as_str())
        .filter(|c| seen.insert(*c))
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::catalog::tests::{product, variant};

    fn two_color_shoe() -> Vec<Variant> {
        vec![
            variant("V1", "42", "Noir", 12_900, 3),
            variant("V2", "43", "Noir", 12_900, 0),
            variant("V3", "42", "Blanc", 13_900, 0),
            variant("V4", "44", "Blanc", 13_900, 5),
        ]
    }

    fn labels(options: &[SelectorOption]) -> Vec<(&str, bool)> {
        options
            .iter()
            .map(|o| (o.label.as_str(), o.enabled))
            .collect()
    }

    #[test]
    fn test_all_options_listed_and_disabled_by_current_color() {
        let variants = two_color_shoe();
        let r = resolve(&variants, Some("42"), Some("Noir"));

        assert_eq!(
            labels(&r.sizes),
            vec![("42", true), ("43", false), ("44", false)]
        );
        assert_eq!(labels(&r.colors), vec![("Noir", true), ("Blanc", false)]);
        assert!(r.sizes.first().unwrap().selected);
        assert!(r.colors.first().unwrap().selected);
    }

    #[test]
    fn test_exact_match_available() {
        let variants = two_color_shoe();
        let r = resolve(&variants, Some("44"), Some("Blanc"));
        assert_eq!(r.variant().unwrap().id.as_str(), "V4");
        assert!(r.can_add_to_cart());
    }

    #[test]
    fn test_zero_stock_pair_is_out_of_stock_not_substituted() {
        let variants = two_color_shoe();
        let r = resolve(&variants, Some("42"), Some("Blanc"));
        assert!(matches!(r.status, VariantStatus::OutOfStock(v) if v.id.as_str() == "V3"));
        assert!(!r.can_add_to_cart());
    }

    #[test]
    fn test_missing_pair_is_unavailable() {
        let variants = two_color_shoe();
        let r = resolve(&variants, Some("43"), Some("Blanc"));
        assert_eq!(r.status, VariantStatus::Unavailable);
        assert!(r.variant().is_none());
        assert!(!r.can_add_to_cart());
    }

    #[test]
    fn test_missing_color_enables_sizes_with_any_stock() {
        let variants = two_color_shoe();
        let r = resolve(&variants, None, None);
        assert_eq!(
            labels(&r.sizes),
            vec![("42", true), ("43", false), ("44", true)]
        );
        assert_eq!(r.status, VariantStatus::Unavailable);
    }

    #[test]
    fn test_implicit_color_resolves_without_color_selector() {
        let variants = vec![
            Variant::new("V1", "40", None, rust_decimal::Decimal::ONE, 2),
            Variant::new("V2", "41", Some(""), rust_decimal::Decimal::ONE, 0),
        ];
        let r = resolve(&variants, Some("40"), None);
        assert_eq!(r.variant().unwrap().id.as_str(), "V1");
        assert!(r.can_add_to_cart());

        let r = resolve(&variants, Some("41"), Some("  "));
        assert!(matches!(r.status, VariantStatus::OutOfStock(_)));
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let variants = two_color_shoe();
        for size in [None, Some("42"), Some("43"), Some("44"), Some("45")] {
            for color in [None, Some("Noir"), Some("Blanc"), Some("Rouge")] {
                assert_eq!(
                    resolve(&variants, size, color),
                    resolve(&variants, size, color)
                );
            }
        }
    }

    #[test]
    fn test_sizes_sort_numeric_first() {
        let variants = vec![
            variant("V1", "XL", "", 100, 1),
            variant("V2", "42,5", "", 100, 1),
            variant("V3", "9", "", 100, 1),
            variant("V4", "42", "", 100, 1),
            variant("V5", "M", "", 100, 1),
            variant("V6", "42", "Noir", 100, 1),
        ];
        assert_eq!(sorted_sizes(&variants), vec!["9", "42", "42,5", "M", "XL"]);
    }

    #[test]
    fn test_initial_selection_prefers_first_in_stock_size() {
        let p = product(
            "P1",
            vec![
                variant("V1", "40", "Noir", 100, 0),
                variant("V2", "41", "Noir", 100, 2),
            ],
        );
        let selection = Selection::initial(&p);
        assert_eq!(selection.size.as_deref(), Some("41"));
        assert_eq!(selection.color.as_deref(), Some("Noir"));
        assert!(selection.resolve(&p.variants).can_add_to_cart());
    }

    #[test]
    fn test_initial_selection_without_stock_uses_first_size() {
        let p = product("P1", vec![variant("V1", "40", "Noir", 100, 0)]);
        assert_eq!(Selection::initial(&p).size.as_deref(), Some("40"));
        assert_eq!(Selection::initial(&product("P2", vec![])), Selection::default());
    }
}
