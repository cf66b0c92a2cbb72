//! Remote cart mirror.

use async_trait::async_trait;
use sqlx::PgPool;

use sneaco_core::{UserId, VariantId};
use sneaco_core::cart::CartLine;

use super::RepositoryError;
use crate::models::CartOwner;
use crate::services::cart::CartMirror;

#[derive(Debug, sqlx::FromRow)]
struct CartItemRow {
    variant_id: String,
    quantity: i32,
}

/// Postgres-backed [`CartMirror`] over `carts` and `cart_items`.
#[derive(Clone)]
pub struct PgCartMirror {
    pool: PgPool,
}

impl PgCartMirror {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CartMirror for PgCartMirror {
    async fn upsert_line(&self, owner: &CartOwner, line: &CartLine) -> Result<(), RepositoryError> {
        let quantity = i32::try_from(line.quantity).unwrap_or(i32::MAX);

        sqlx::query(
            r"
            WITH cart AS (
                INSERT INTO carts (owner_key, user_id)
                VALUES ($1, $2)
                ON CONFLICT (owner_key) DO UPDATE SET updated_at = NOW()
                RETURNING id
            )
            INSERT INTO cart_items (cart_id, variant_id, quantity)
            SELECT id, $3, $4 FROM cart
            ON CONFLICT (cart_id, variant_id) DO UPDATE SET
                quantity = EXCLUDED.quantity,
                updated_at = NOW()
            ",
        )
        .bind(owner.key())
        .bind(owner.user_id().map(UserId::as_str))
        .bind(line.variant_id.as_str())
        .bind(quantity)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn remove_line(&self, owner: &CartOwner, variant_id: &VariantId) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            DELETE FROM cart_items
            WHERE variant_id = $2
              AND cart_id = (SELECT id FROM carts WHERE owner_key = $1)
            ",
        )
        .bind(owner.key())
        .bind(variant_id.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn clear(&self, owner: &CartOwner) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "DELETE FROM cart_items WHERE cart_id = (SELECT id FROM carts WHERE owner_key = $1)",
        )
        .bind(owner.key())
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM carts WHERE owner_key = $1")
            .bind(owner.key())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn fetch(&self, owner: &CartOwner) -> Result<Vec<CartLine>, RepositoryError> {
        let rows: Vec<CartItemRow> = sqlx::query_as(
            r"
            SELECT ci.variant_id, ci.quantity
            FROM cart_items ci
            JOIN carts c ON c.id = ci.cart_id
            WHERE c.owner_key = $1
            ORDER BY ci.created_at, ci.id
            ",
        )
        .bind(owner.key())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let quantity = u32::try_from(row.quantity).map_err(|_| {
                    RepositoryError::DataCorruption(format!(
                        "negative cart quantity for variant {}",
                        row.variant_id
                    ))
                })?;
                Ok(CartLine {
                    variant_id: VariantId::new(row.variant_id),
                    quantity,
                })
            })
            .collect()
    }
}
