//! Sample catalog.

use rust_decimal::Decimal;
use sneaco_core::catalog::{Category, Product, Variant};
use sneaco_core::ProductId;

/// `court-classic`: V9 42/Blanc 49.99 (3 left), V10 43/Blanc (sold out),
/// V11 42/Noir 54.99 (5 left).
#[must_use]
pub fn court_classic() -> Product {
    Product {
        id: ProductId::new("court-classic"),
        name: "Court Classic".to_owned(),
        brand: "Sneaco".to_owned(),
        description: "Cuir pleine fleur, semelle cousue.".to_owned(),
        category: Category::Men,
        images: vec!["https://cdn.sneaco.fr/court-classic/1.jpg".to_owned()],
        variants: vec![
            Variant::new("V9", "42", Some("Blanc"), Decimal::new(4999, 2), 3),
            Variant::new("V10", "43", Some("Blanc"), Decimal::new(4999, 2), 0),
            Variant::new("V11", "42", Some("Noir"), Decimal::new(5499, 2), 5),
        ],
    }
}

/// `trail-runner`: a single colorless variant T1, size 38, 89.00 (2 left).
#[must_use]
pub fn trail_runner() -> Product {
    Product {
        id: ProductId::new("trail-runner"),
        name: "Trail Runner".to_owned(),
        brand: "Runwell".to_owned(),
        description: String::new(),
        category: Category::Women,
        images: Vec::new(),
        variants: vec![Variant::new("T1", "38", None, Decimal::new(8900, 2), 2)],
    }
}

#[must_use]
pub fn catalog() -> Vec<Product> {
    vec![court_classic(), trail_runner()]
}
