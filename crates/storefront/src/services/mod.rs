//! Business logic services for the storefront.
//!
//! # Services
//!
//! - `catalog` - Product listing, detail and stock reads
//! - `cart` - Local-first cart with a best-effort remote mirror
//! - `favorites` - Local-first favorites with a best-effort remote mirror
//! - `checkout` - Cart to hosted payment session
//! - `orders` - Paid session to exactly one order

pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod favorites;
pub mod orders;

use std::marker::PhantomData;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tower_sessions::Session;

/// Local persistence failed.
#[derive(Debug, Error)]
#[error("local storage error: {0}")]
pub struct StorageError(String);

impl StorageError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<tower_sessions::session::Error> for StorageError {
    fn from(err: tower_sessions::session::Error) -> Self {
        Self(err.to_string())
    }
}

/// Local, per-browsing-session persistence of one value.
///
/// Writes are awaited before a mutation returns, so the local copy is
/// always the source of truth for the current session.
#[async_trait]
pub trait LocalStorage<T>: Send + Sync {
    /// Load the stored value, or the default when nothing is stored yet.
    async fn load(&self) -> Result<T, StorageError>;

    async fn save(&self, value: &T) -> Result<(), StorageError>;
}

/// [`LocalStorage`] backed by a key in the tower-sessions session.
pub struct SessionStorage<T> {
    session: Session,
    key: &'static str,
    _value: PhantomData<fn() -> T>,
}

impl<T> SessionStorage<T> {
    #[must_use]
    pub const fn new(session: Session, key: &'static str) -> Self {
        Self {
            session,
            key,
            _value: PhantomData,
        }
    }
}

#[async_trait]
impl<T> LocalStorage<T> for SessionStorage<T>
where
    T: Serialize + DeserializeOwned + Default + Send + Sync,
{
    async fn load(&self) -> Result<T, StorageError> {
        Ok(self.session.get::<T>(self.key).await?.unwrap_or_default())
    }

    async fn save(&self, value: &T) -> Result<(), StorageError> {
        self.session.insert(self.key, value).await?;
        Ok(())
    }
}
