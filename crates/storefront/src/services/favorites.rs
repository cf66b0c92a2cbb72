//! Local-first favorites.
//!
//! Same shape as the cart: the session copy is authoritative and the
//! `favorites` table is mirrored best-effort for signed-in customers only.

use std::sync::Arc;

use async_trait::async_trait;
use sneaco_core::{ProductId, UserId};
use tracing::{instrument, warn};

use super::{LocalStorage, StorageError};
use crate::db::RepositoryError;

/// Remote copy of a customer's favorites.
#[async_trait]
pub trait FavoritesMirror: Send + Sync {
    async fn add(&self, user: &UserId, product: &ProductId) -> Result<(), RepositoryError>;

    async fn remove(&self, user: &UserId, product: &ProductId) -> Result<(), RepositoryError>;

    async fn clear(&self, user: &UserId) -> Result<(), RepositoryError>;

    async fn list(&self, user: &UserId) -> Result<Vec<ProductId>, RepositoryError>;
}

/// Favorites for one browsing session.
pub struct FavoritesStore {
    storage: Box<dyn LocalStorage<Vec<ProductId>>>,
    mirror: Arc<dyn FavoritesMirror>,
    user: Option<UserId>,
}

impl FavoritesStore {
    #[must_use]
    pub fn new(
        storage: Box<dyn LocalStorage<Vec<ProductId>>>,
        mirror: Arc<dyn FavoritesMirror>,
        user: Option<UserId>,
    ) -> Self {
        Self {
            storage,
            mirror,
            user,
        }
    }

    /// Adopt the mirrored favorites when the local list is empty.
    ///
    /// Runs once per sign-in so that removing the last favorite is not
    /// undone by a mirror that has not caught up. Returns whether anything
    /// was adopted.
    pub async fn adopt_mirror(&self) -> bool {
        let Some(user) = &self.user else { return false };
        if !matches!(self.storage.load().await, Ok(local) if local.is_empty()) {
            return false;
        }
        match self.mirror.list(user).await {
            Ok(remote) if !remote.is_empty() => {
                if let Err(error) = self.storage.save(&remote).await {
                    warn!(%error, "Could not store mirrored favorites locally");
                    return false;
                }
                true
            }
            Ok(_) => false,
            Err(error) => {
                warn!(%error, user_id = %user, "Favorites mirror fetch failed");
                false
            }
        }
    }

    /// # Errors
    ///
    /// Returns `StorageError` if the session cannot be read.
    pub async fn list(&self) -> Result<Vec<ProductId>, StorageError> {
        self.storage.load().await
    }

    /// Add or remove a product. Returns whether it is now a favorite.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the session cannot be read or written.
    #[instrument(skip(self))]
    pub async fn toggle(&self, product_id: ProductId) -> Result<bool, StorageError> {
        let mut favorites = self.storage.load().await?;
        let now_favorite = if let Some(pos) = favorites.iter().position(|p| p == &product_id) {
            favorites.remove(pos);
            false
        } else {
            favorites.push(product_id.clone());
            true
        };
        self.storage.save(&favorites).await?;

        if let Some(user) = self.user.clone() {
            let mirror = Arc::clone(&self.mirror);
            tokio::spawn(async move {
                let result = if now_favorite {
                    mirror.add(&user, &product_id).await
                } else {
                    mirror.remove(&user, &product_id).await
                };
                if let Err(error) = result {
                    warn!(%error, user_id = %user, product_id = %product_id, "Favorites mirror failed");
                }
            });
        }

        Ok(now_favorite)
    }

    /// # Errors
    ///
    /// Returns `StorageError` if the session cannot be written.
    pub async fn clear(&self) -> Result<(), StorageError> {
        self.storage.save(&Vec::new()).await?;

        if let Some(user) = self.user.clone() {
            let mirror = Arc::clone(&self.mirror);
            tokio::spawn(async move {
                if let Err(error) = mirror.clear(&user).await {
                    warn!(%error, user_id = %user, "Favorites mirror clear failed");
                }
            });
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::services::tests::MemoryStorage;

    /// Mirror whose removals never land.
    #[derive(Default)]
    struct Mirror {
        remote: Mutex<Vec<ProductId>>,
        fail_list: bool,
    }

    #[async_trait]
    impl FavoritesMirror for Mirror {
        async fn add(&self, _user: &UserId, product: &ProductId) -> Result<(), RepositoryError> {
            self.remote.lock().unwrap().push(product.clone());
            Ok(())
        }

        async fn remove(&self, _user: &UserId, _product: &ProductId) -> Result<(), RepositoryError> {
            Err(RepositoryError::NotFound)
        }

        async fn clear(&self, _user: &UserId) -> Result<(), RepositoryError> {
            Err(RepositoryError::NotFound)
        }

        async fn list(&self, _user: &UserId) -> Result<Vec<ProductId>, RepositoryError> {
            if self.fail_list {
                return Err(RepositoryError::NotFound);
            }
            Ok(self.remote.lock().unwrap().clone())
        }
    }

    #[tokio::test]
    async fn test_toggle_twice_round_trips() {
        let storage = MemoryStorage::<Vec<ProductId>>::default();
        let store = FavoritesStore::new(Box::new(storage.clone()), Arc::new(Mirror::default()), None);

        assert!(store.toggle(ProductId::new("p-1")).await.unwrap());
        assert_eq!(storage.get(), vec![ProductId::new("p-1")]);
        assert!(!store.toggle(ProductId::new("p-1")).await.unwrap());
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mirror_fetch_failure_is_swallowed() {
        let storage = MemoryStorage::<Vec<ProductId>>::default();
        let store = FavoritesStore::new(
            Box::new(storage),
            Arc::new(Mirror {
                fail_list: true,
                ..Mirror::default()
            }),
            Some(UserId::new("u-1")),
        );

        assert!(!store.adopt_mirror().await);
        assert!(store.list().await.unwrap().is_empty());
        store.clear().await.unwrap();
    }

    #[tokio::test]
    async fn test_removed_last_favorite_is_not_readopted() {
        let storage = MemoryStorage::<Vec<ProductId>>::default();
        let mirror = Arc::new(Mirror::default());
        mirror.remote.lock().unwrap().push(ProductId::new("p-1"));
        let store = FavoritesStore::new(
            Box::new(storage.clone()),
            Arc::clone(&mirror) as Arc<dyn FavoritesMirror>,
            Some(UserId::new("u-1")),
        );

        assert!(store.adopt_mirror().await);
        assert!(!store.toggle(ProductId::new("p-1")).await.unwrap());

        let reopened = FavoritesStore::new(Box::new(storage), mirror, Some(UserId::new("u-1")));
        assert!(reopened.list().await.unwrap().is_empty());
    }
}
