//! Cart lines and stock clamping.
//!
//! A [`Cart`] holds at most one line per variant, each with a quantity of
//! at least 1. Every mutation that can raise a quantity takes the stock
//! observed for that variant and clamps to it rather than rejecting.
//!
//! The storefront's cart service owns persistence and mirroring; this module
//! is the pure state those layers agree on.

use serde::{Deserialize, Serialize};

use crate::types::VariantId;

/// Cart mutation errors.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CartError {
    #[error("quantity must be at least 1")]
    InvalidQuantity,

    #[error("variant {0} is out of stock")]
    OutOfStock(VariantId),

    #[error("variant {0} is not in the cart")]
    LineNotFound(VariantId),
}

/// A variant and how many of it are in the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub variant_id: VariantId,
    pub quantity: u32,
}

/// Result of [`Cart::set_quantity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantityUpdate {
    /// The line now holds this quantity.
    Set(u32),
    /// Stock is zero, so the line was dropped.
    Removed,
}

/// Ordered cart lines, unique by variant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<CartLine>", into = "Vec<CartLine>")]
pub struct Cart {
    lines: Vec<CartLine>,
}

impl Cart {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Total number of units across all lines.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.lines
            .iter()
            .fold(0_u32, |acc, line| acc.saturating_add(line.quantity))
    }

    #[must_use]
    pub fn quantity_of(&self, variant_id: &VariantId) -> Option<u32> {
        self.line(variant_id).map(|l| l.quantity)
    }

    fn line(&self, variant_id: &VariantId) -> Option<&CartLine> {
        self.lines.iter().find(|l| &l.variant_id == variant_id)
    }

    fn line_mut(&mut self, variant_id: &VariantId) -> Option<&mut CartLine> {
        self.lines.iter_mut().find(|l| &l.variant_id == variant_id)
    }

    /// Add `quantity` units of a variant with `stock` units available.
    ///
    /// The resulting quantity is `min(existing + quantity, stock)` for an
    /// existing line and `min(quantity, stock)` for a new one. Returns the
    /// line's new quantity.
    ///
    /// # Errors
    ///
    /// [`CartError::InvalidQuantity`] for a zero quantity and
    /// [`CartError::OutOfStock`] when `stock` is zero. The cart is unchanged
    /// in both cases.
    pub fn add(&mut self, variant_id: VariantId, quantity: u32, stock: u32) -> Result<u32, CartError> {
        if quantity == 0 {
            return Err(CartError::InvalidQuantity);
        }
        if stock == 0 {
            return Err(CartError::OutOfStock(variant_id));
        }

        if let Some(line) = self.line_mut(&variant_id) {
            line.quantity = line.quantity.saturating_add(quantity).min(stock);
            return Ok(line.quantity);
        }

        let quantity = quantity.min(stock);
        self.lines.push(CartLine {
            variant_id,
            quantity,
        });
        Ok(quantity)
    }

    /// Set a line's quantity, clamped to `[1, stock]`.
    ///
    /// `stock` is `None` when the fresh stock read failed; the quantity is
    /// then only clamped to a minimum of 1. A stock of zero removes the
    /// line since no quantity in `[1, 0]` exists.
    ///
    /// # Errors
    ///
    /// [`CartError::LineNotFound`] if the variant is not in the cart.
    pub fn set_quantity(
        &mut self,
        variant_id: &VariantId,
        requested: i64,
        stock: Option<u32>,
    ) -> Result<QuantityUpdate, CartError> {
        if self.line(variant_id).is_none() {
            return Err(CartError::LineNotFound(variant_id.clone()));
        }

        if stock == Some(0) {
            self.lines.retain(|l| &l.variant_id != variant_id);
            return Ok(QuantityUpdate::Removed);
        }

        let quantity = clamp_quantity(requested, stock);
        if let Some(line) = self.line_mut(variant_id) {
            line.quantity = quantity;
        }
        Ok(QuantityUpdate::Set(quantity))
    }

    /// Remove a line.
    ///
    /// # Errors
    ///
    /// [`CartError::LineNotFound`] if the variant is not in the cart.
    pub fn remove(&mut self, variant_id: &VariantId) -> Result<(), CartError> {
        let before = self.lines.len();
        self.lines.retain(|l| &l.variant_id != variant_id);
        if self.lines.len() == before {
            return Err(CartError::LineNotFound(variant_id.clone()));
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }
}

/// Clamp a requested quantity to `[1, stock]`, or to at least 1 without a stock.
#[must_use]
pub fn clamp_quantity(requested: i64, stock: Option<u32>) -> u32 {
    let quantity = u32::try_from(requested.max(1)).unwrap_or(u32::MAX);
    stock.map_or(quantity, |stock| quantity.min(stock.max(1)))
}

impl From<Vec<CartLine>> for Cart {
    /// Build a cart from stored lines, dropping zero quantities and merging
    /// repeated variants.
    fn from(lines: Vec<CartLine>) -> Self {
        let mut cart = Self::default();
        for line in lines.into_iter().filter(|l| l.quantity > 0) {
            match cart.line_mut(&line.variant_id) {
                Some(existing) => existing.quantity = existing.quantity.saturating_add(line.quantity),
                None => cart.lines.push(line),
            }
        }
        cart
    }
}

impl From<Cart> for Vec<CartLine> {
    fn from(cart: Cart) -> Self {
        cart.lines
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn v(id: &str) -> VariantId {
        VariantId::new(id)
    }

    #[test]
    fn test_add_existing_line_clamps_to_stock() {
        let mut cart = Cart::new();
        cart.add(v("V1"), 2, 3).unwrap();
        assert_eq!(cart.add(v("V1"), 2, 3).unwrap(), 3);
        assert_eq!(cart.lines().len(), 1);
        assert_eq!(cart.quantity_of(&v("V1")), Some(3));
    }

    #[test]
    fn test_add_new_line_clamps_to_stock() {
        let mut cart = Cart::new();
        assert_eq!(cart.add(v("V1"), 5, 2).unwrap(), 2);
    }

    #[test]
    fn test_add_rejects_zero_quantity_and_zero_stock() {
        let mut cart = Cart::new();
        assert_eq!(cart.add(v("V1"), 0, 3), Err(CartError::InvalidQuantity));
        assert_eq!(cart.add(v("V1"), 1, 0), Err(CartError::OutOfStock(v("V1"))));
        assert!(cart.is_empty());
    }

    #[test]
    fn test_add_keeps_lines_unique_and_ordered() {
        let mut cart = Cart::new();
        cart.add(v("V1"), 1, 10).unwrap();
        cart.add(v("V2"), 1, 10).unwrap();
        cart.add(v("V1"), 1, 10).unwrap();
        let ids: Vec<&str> = cart.lines().iter().map(|l| l.variant_id.as_str()).collect();
        assert_eq!(ids, vec!["V1", "V2"]);
        assert_eq!(cart.item_count(), 3);
    }

    #[test]
    fn test_set_quantity_zero_clamps_to_one() {
        let mut cart = Cart::new();
        cart.add(v("V2"), 2, 5).unwrap();
        assert_eq!(
            cart.set_quantity(&v("V2"), 0, Some(5)).unwrap(),
            QuantityUpdate::Set(1)
        );
        assert_eq!(
            cart.set_quantity(&v("V2"), -4, Some(5)).unwrap(),
            QuantityUpdate::Set(1)
        );
        assert_eq!(cart.quantity_of(&v("V2")), Some(1));
    }

    #[test]
    fn test_set_quantity_clamps_to_fresh_stock() {
        let mut cart = Cart::new();
        cart.add(v("V1"), 1, 5).unwrap();
        assert_eq!(
            cart.set_quantity(&v("V1"), 9, Some(4)).unwrap(),
            QuantityUpdate::Set(4)
        );
    }

    #[test]
    fn test_set_quantity_without_stock_read_only_floors() {
        let mut cart = Cart::new();
        cart.add(v("V1"), 1, 5).unwrap();
        assert_eq!(
            cart.set_quantity(&v("V1"), 40, None).unwrap(),
            QuantityUpdate::Set(40)
        );
    }

    #[test]
    fn test_set_quantity_zero_stock_removes_line() {
        let mut cart = Cart::new();
        cart.add(v("V1"), 1, 5).unwrap();
        assert_eq!(
            cart.set_quantity(&v("V1"), 2, Some(0)).unwrap(),
            QuantityUpdate::Removed
        );
        assert!(cart.is_empty());
    }

    #[test]
    fn test_set_quantity_and_remove_missing_line() {
        let mut cart = Cart::new();
        assert_eq!(
            cart.set_quantity(&v("V9"), 1, Some(1)),
            Err(CartError::LineNotFound(v("V9")))
        );
        assert_eq!(cart.remove(&v("V9")), Err(CartError::LineNotFound(v("V9"))));
    }

    #[test]
    fn test_remove_and_clear() {
        let mut cart = Cart::new();
        cart.add(v("V1"), 1, 5).unwrap();
        cart.add(v("V2"), 1, 5).unwrap();
        cart.remove(&v("V1")).unwrap();
        assert_eq!(cart.lines().len(), 1);
        cart.clear();
        assert!(cart.is_empty());
    }

    #[test]
    fn test_stock_clamp_invariant_over_sequences() {
        let stocks = [3_u32, 1, 7, 2];
        let mut cart = Cart::new();
        for (step, stock) in stocks.iter().cycle().take(24).enumerate() {
            let step = i64::try_from(step).unwrap();
            if step % 3 == 0 {
                cart.set_quantity(&v("V1"), step - 10, Some(*stock)).ok();
            } else {
                cart.add(v("V1"), 2, *stock).unwrap();
            }
            if let Some(q) = cart.quantity_of(&v("V1")) {
                assert!(q >= 1 && q <= *stock, "quantity {q} outside [1, {stock}]");
            }
        }
    }

    #[test]
    fn test_deserialize_normalizes_lines() {
        let json = r#"[
            {"variant_id": "V1", "quantity": 1},
            {"variant_id": "V2", "quantity": 0},
            {"variant_id": "V1", "quantity": 2}
        ]"#;
        let cart: Cart = serde_json::from_str(json).unwrap();
        assert_eq!(cart.lines().len(), 1);
        assert_eq!(cart.quantity_of(&v("V1")), Some(3));
    }

    #[test]
    fn test_clamp_quantity() {
        assert_eq!(clamp_quantity(0, Some(3)), 1);
        assert_eq!(clamp_quantity(5, Some(3)), 3);
        assert_eq!(clamp_quantity(i64::MAX, None), u32::MAX);
    }
}
