//! Order repository.
//!
//! `orders.payment_session_id` is unique, so recording the same payment
//! session twice converges on one order even when two requests race.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::PgPool;
use tracing::{debug, instrument};

use sneaco_core::order::{InsertOutcome, NewOrder, Order, OrderItem};
use sneaco_core::{OrderId, OrderStatus, PaymentSessionId, UserId, VariantId};

use super::RepositoryError;
use crate::services::orders::OrderStore;

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: String,
    user_id: String,
    payment_session_id: Option<String>,
    total_amount: Decimal,
    status: String,
    shipping_address: Option<Value>,
    billing_address: Option<Value>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct OrderItemRow {
    order_id: String,
    variant_id: String,
    quantity: i32,
    price_at_purchase: Decimal,
}

impl TryFrom<OrderItemRow> for OrderItem {
    type Error = RepositoryError;

    fn try_from(row: OrderItemRow) -> Result<Self, Self::Error> {
        let quantity = u32::try_from(row.quantity).map_err(|_| {
            RepositoryError::DataCorruption(format!("negative quantity in order {}", row.order_id))
        })?;
        Ok(Self {
            variant_id: VariantId::new(row.variant_id),
            quantity,
            unit_price: row.price_at_purchase,
        })
    }
}

/// Postgres-backed [`OrderStore`].
#[derive(Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn find_by_session(&self, session_id: &PaymentSessionId) -> Result<Option<OrderId>, RepositoryError> {
        let id: Option<String> = sqlx::query_scalar("SELECT id FROM orders WHERE payment_session_id = $1")
            .bind(session_id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        Ok(id.map(OrderId::new))
    }

    #[instrument(skip(self, order), fields(session_id = %order.payment_session_id))]
    async fn insert(&self, order: &NewOrder) -> Result<InsertOutcome, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let inserted: Option<String> = sqlx::query_scalar(
            r"
            INSERT INTO orders
                (user_id, payment_session_id, total_amount, status, shipping_address, billing_address)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (payment_session_id) DO NOTHING
            RETURNING id
            ",
        )
        .bind(order.user_id.as_str())
        .bind(order.payment_session_id.as_str())
        .bind(order.total_amount)
        .bind(order.status.as_str())
        .bind(&order.shipping_address)
        .bind(&order.billing_address)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(order_id) = inserted else {
            tx.rollback().await?;
            debug!("Order already recorded by a concurrent request");
            return self
                .find_by_session(&order.payment_session_id)
                .await?
                .map(InsertOutcome::Existing)
                .ok_or(RepositoryError::NotFound);
        };

        for (position, item) in (0_i32..).zip(&order.items) {
            sqlx::query(
                r"
                INSERT INTO order_items (order_id, position, variant_id, quantity, price_at_purchase)
                VALUES ($1, $2, $3, $4, $5)
                ",
            )
            .bind(&order_id)
            .bind(position)
            .bind(item.variant_id.as_str())
            .bind(i32::try_from(item.quantity).unwrap_or(i32::MAX))
            .bind(item.unit_price)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(InsertOutcome::Created(OrderId::new(order_id)))
    }

    async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<Order>, RepositoryError> {
        let rows: Vec<OrderRow> = sqlx::query_as(
            r"
            SELECT id, user_id, payment_session_id, total_amount, status,
                   shipping_address, billing_address, created_at
            FROM orders
            WHERE user_id = $1
            ORDER BY created_at DESC, id
            ",
        )
        .bind(user_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
        let item_rows: Vec<OrderItemRow> = sqlx::query_as(
            r"
            SELECT order_id, variant_id, quantity, price_at_purchase
            FROM order_items
            WHERE order_id = ANY($1)
            ORDER BY order_id, position
            ",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut items: HashMap<String, Vec<OrderItem>> = HashMap::new();
        for row in item_rows {
            let order_id = row.order_id.clone();
            items.entry(order_id).or_default().push(row.try_into()?);
        }

        rows.into_iter()
            .map(|row| {
                let status: OrderStatus = row.status.parse().map_err(|e| {
                    RepositoryError::DataCorruption(format!("order {}: {e}", row.id))
                })?;
                Ok(Order {
                    items: items.remove(&row.id).unwrap_or_default(),
                    id: OrderId::new(row.id),
                    user_id: UserId::new(row.user_id),
                    payment_session_id: row.payment_session_id.map(PaymentSessionId::new),
                    total_amount: row.total_amount,
                    status,
                    shipping_address: row.shipping_address,
                    billing_address: row.billing_address,
                    created_at: row.created_at,
                })
            })
            .collect()
    }
}
