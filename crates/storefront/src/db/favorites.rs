//! Remote favorites mirror.

use async_trait::async_trait;
use sqlx::PgPool;

use sneaco_core::{ProductId, UserId};

use super::RepositoryError;
use crate::services::favorites::FavoritesMirror;

/// Postgres-backed [`FavoritesMirror`].
#[derive(Clone)]
pub struct PgFavoritesMirror {
    pool: PgPool,
}

impl PgFavoritesMirror {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FavoritesMirror for PgFavoritesMirror {
    async fn add(&self, user: &UserId, product: &ProductId) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO favorites (user_id, product_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(user.as_str())
        .bind(product.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove(&self, user: &UserId, product: &ProductId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM favorites WHERE user_id = $1 AND product_id = $2")
            .bind(user.as_str())
            .bind(product.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn clear(&self, user: &UserId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM favorites WHERE user_id = $1")
            .bind(user.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list(&self, user: &UserId) -> Result<Vec<ProductId>, RepositoryError> {
        let ids: Vec<String> = sqlx::query_scalar(
            "SELECT product_id FROM favorites WHERE user_id = $1 ORDER BY created_at",
        )
        .bind(user.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().map(ProductId::new).collect())
    }
}
