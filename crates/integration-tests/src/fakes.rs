//! In-memory stand-ins for the storefront's external collaborators.
//!
//! Each fake keeps its state behind a `Mutex` and exposes a few inspection
//! helpers so tests can assert on what the storefront did.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use sneaco_core::cart::CartLine;
use sneaco_core::catalog::Product;
use sneaco_core::checkout::CheckoutSessionRequest;
use sneaco_core::order::{InsertOutcome, NewOrder, Order};
use sneaco_core::{OrderId, PaymentSessionId, ProductId, UserId, VariantId};
use sneaco_storefront::db::RepositoryError;
use sneaco_storefront::identity::{
    AuthSession, IdentityError, IdentityProvider, IdentityUser, SignUp, SignUpOutcome, UserUpdate,
};
use sneaco_storefront::models::CartOwner;
use sneaco_storefront::payments::{
    CreatedSession, CustomerDetails, PaymentError, PaymentProvider, PaymentSession,
};
use sneaco_storefront::services::cart::CartMirror;
use sneaco_storefront::services::catalog::{CatalogSource, VariantDetail};
use sneaco_storefront::services::favorites::FavoritesMirror;
use sneaco_storefront::services::orders::OrderStore;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// Catalog
// =============================================================================

/// Catalog backed by a product list.
#[derive(Default)]
pub struct FakeCatalog {
    products: Mutex<Vec<Product>>,
}

impl FakeCatalog {
    #[must_use]
    pub fn new(products: Vec<Product>) -> Self {
        Self {
            products: Mutex::new(products),
        }
    }

    /// Change a variant's stock, as another shopper's purchase would.
    pub fn set_stock(&self, id: &VariantId, stock: u32) {
        for product in lock(&self.products).iter_mut() {
            for variant in &mut product.variants {
                if &variant.id == id {
                    variant.stock = stock;
                }
            }
        }
    }

    /// Reprice a variant.
    pub fn set_price(&self, id: &VariantId, price: rust_decimal::Decimal) {
        for product in lock(&self.products).iter_mut() {
            for variant in &mut product.variants {
                if &variant.id == id {
                    variant.price = price;
                }
            }
        }
    }
}

#[async_trait]
impl CatalogSource for FakeCatalog {
    async fn list_products(&self) -> Result<Vec<Product>, RepositoryError> {
        Ok(lock(&self.products).clone())
    }

    async fn product(&self, id: &ProductId) -> Result<Option<Product>, RepositoryError> {
        Ok(lock(&self.products).iter().find(|p| &p.id == id).cloned())
    }

    async fn variant_details(&self, ids: &[VariantId]) -> Result<Vec<VariantDetail>, RepositoryError> {
        let products = lock(&self.products);
        Ok(products
            .iter()
            .flat_map(|product| {
                product
                    .variants
                    .iter()
                    .filter(|v| ids.contains(&v.id))
                    .map(move |variant| VariantDetail {
                        product_id: product.id.clone(),
                        product_name: product.name.clone(),
                        brand: product.brand.clone(),
                        image: product.primary_image().to_owned(),
                        variant: variant.clone(),
                    })
            })
            .collect())
    }

    async fn stock(&self, id: &VariantId) -> Result<Option<u32>, RepositoryError> {
        Ok(lock(&self.products)
            .iter()
            .flat_map(|p| p.variants.iter())
            .find(|v| &v.id == id)
            .map(|v| v.stock))
    }
}

// =============================================================================
// Cart and favorites mirrors
// =============================================================================

/// Remote carts keyed by owner key.
#[derive(Default)]
pub struct FakeCartMirror {
    carts: Mutex<HashMap<String, Vec<CartLine>>>,
    lose_deletes: AtomicBool,
}

impl FakeCartMirror {
    /// Accept removals and clears without applying them, like a remote
    /// write that has not landed yet.
    pub fn lose_deletes(&self) {
        self.lose_deletes.store(true, Ordering::SeqCst);
    }

    /// Seed the remote cart of an owner.
    pub fn put(&self, owner: &CartOwner, lines: Vec<CartLine>) {
        lock(&self.carts).insert(owner.key(), lines);
    }

    #[must_use]
    pub fn lines(&self, owner_key: &str) -> Vec<CartLine> {
        lock(&self.carts).get(owner_key).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl CartMirror for FakeCartMirror {
    async fn upsert_line(&self, owner: &CartOwner, line: &CartLine) -> Result<(), RepositoryError> {
        let mut carts = lock(&self.carts);
        let lines = carts.entry(owner.key()).or_default();
        match lines.iter_mut().find(|l| l.variant_id == line.variant_id) {
            Some(existing) => existing.quantity = line.quantity,
            None => lines.push(line.clone()),
        }
        Ok(())
    }

    async fn remove_line(&self, owner: &CartOwner, variant_id: &VariantId) -> Result<(), RepositoryError> {
        if self.lose_deletes.load(Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(lines) = lock(&self.carts).get_mut(&owner.key()) {
            lines.retain(|l| &l.variant_id != variant_id);
        }
        Ok(())
    }

    async fn clear(&self, owner: &CartOwner) -> Result<(), RepositoryError> {
        if self.lose_deletes.load(Ordering::SeqCst) {
            return Ok(());
        }
        lock(&self.carts).remove(&owner.key());
        Ok(())
    }

    async fn fetch(&self, owner: &CartOwner) -> Result<Vec<CartLine>, RepositoryError> {
        Ok(self.lines(&owner.key()))
    }
}

/// Remote favorites keyed by user.
#[derive(Default)]
pub struct FakeFavoritesMirror {
    favorites: Mutex<HashMap<UserId, Vec<ProductId>>>,
    lose_deletes: AtomicBool,
}

impl FakeFavoritesMirror {
    /// Accept removals and clears without applying them.
    pub fn lose_deletes(&self) {
        self.lose_deletes.store(true, Ordering::SeqCst);
    }

    pub fn put(&self, user: &UserId, products: Vec<ProductId>) {
        lock(&self.favorites).insert(user.clone(), products);
    }

    #[must_use]
    pub fn products(&self, user: &UserId) -> Vec<ProductId> {
        lock(&self.favorites).get(user).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl FavoritesMirror for FakeFavoritesMirror {
    async fn add(&self, user: &UserId, product: &ProductId) -> Result<(), RepositoryError> {
        let mut favorites = lock(&self.favorites);
        let products = favorites.entry(user.clone()).or_default();
        if !products.contains(product) {
            products.push(product.clone());
        }
        Ok(())
    }

    async fn remove(&self, user: &UserId, product: &ProductId) -> Result<(), RepositoryError> {
        if self.lose_deletes.load(Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(products) = lock(&self.favorites).get_mut(user) {
            products.retain(|p| p != product);
        }
        Ok(())
    }

    async fn clear(&self, user: &UserId) -> Result<(), RepositoryError> {
        if self.lose_deletes.load(Ordering::SeqCst) {
            return Ok(());
        }
        lock(&self.favorites).remove(user);
        Ok(())
    }

    async fn list(&self, user: &UserId) -> Result<Vec<ProductId>, RepositoryError> {
        Ok(self.products(user))
    }
}

// =============================================================================
// Orders
// =============================================================================

/// Order store enforcing one order per payment session.
#[derive(Default)]
pub struct FakeOrderStore {
    orders: Mutex<Vec<(OrderId, NewOrder)>>,
    fail_inserts: AtomicBool,
}

impl FakeOrderStore {
    #[must_use]
    pub fn orders(&self) -> Vec<(OrderId, NewOrder)> {
        lock(&self.orders).clone()
    }

    /// Make every insert fail with a database error.
    pub fn fail_inserts(&self) {
        self.fail_inserts.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl OrderStore for FakeOrderStore {
    async fn find_by_session(&self, session_id: &PaymentSessionId) -> Result<Option<OrderId>, RepositoryError> {
        Ok(lock(&self.orders)
            .iter()
            .find(|(_, order)| &order.payment_session_id == session_id)
            .map(|(id, _)| id.clone()))
    }

    async fn insert(&self, order: &NewOrder) -> Result<InsertOutcome, RepositoryError> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(RepositoryError::Conflict("insert rejected".to_owned()));
        }

        let mut orders = lock(&self.orders);
        if let Some((id, _)) = orders
            .iter()
            .find(|(_, existing)| existing.payment_session_id == order.payment_session_id)
        {
            return Ok(InsertOutcome::Existing(id.clone()));
        }

        let id = OrderId::new(format!("order-{}", orders.len() + 1));
        orders.push((id.clone(), order.clone()));
        Ok(InsertOutcome::Created(id))
    }

    async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<Order>, RepositoryError> {
        Ok(lock(&self.orders)
            .iter()
            .rev()
            .filter(|(_, order)| &order.user_id == user_id)
            .map(|(id, order)| Order {
                id: id.clone(),
                user_id: order.user_id.clone(),
                payment_session_id: Some(order.payment_session_id.clone()),
                total_amount: order.total_amount,
                status: order.status,
                shipping_address: order.shipping_address.clone(),
                billing_address: order.billing_address.clone(),
                created_at: Utc::now(),
                items: order.items.clone(),
            })
            .collect())
    }
}

// =============================================================================
// Payments
// =============================================================================

/// Payment processor that "pays" every session it creates.
#[derive(Default)]
pub struct FakePayments {
    sessions: Mutex<HashMap<PaymentSessionId, PaymentSession>>,
    requests: Mutex<Vec<CheckoutSessionRequest>>,
    created: AtomicUsize,
    fail_create: AtomicBool,
}

impl FakePayments {
    /// Requests received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<CheckoutSessionRequest> {
        lock(&self.requests).clone()
    }

    /// Register a session directly, as if the customer had paid it elsewhere.
    pub fn put_session(&self, session: PaymentSession) {
        lock(&self.sessions).insert(session.id.clone(), session);
    }

    /// Make every session creation fail with an API error.
    pub fn fail_create(&self) {
        self.fail_create.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl PaymentProvider for FakePayments {
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CreatedSession, PaymentError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(PaymentError::Api {
                status: 500,
                message: "processor unavailable".to_owned(),
            });
        }

        let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        let id = PaymentSessionId::new(format!("cs_test_{n}"));
        let amount_total = request.line_items.iter().fold(0_i64, |total, item| {
            total.saturating_add(item.unit_amount.saturating_mul(i64::from(item.quantity)))
        });

        self.put_session(PaymentSession {
            id: id.clone(),
            amount_total: Some(amount_total),
            currency: Some(request.currency.provider_code().to_owned()),
            payment_status: Some("paid".to_owned()),
            customer_details: Some(CustomerDetails {
                email: Some(request.customer_email.as_str().to_owned()),
                ..CustomerDetails::default()
            }),
            shipping_details: None,
            metadata: request.metadata.clone().into_iter().collect(),
            line_items: Vec::new(),
        });
        lock(&self.requests).push(request.clone());

        Ok(CreatedSession {
            url: format!("https://checkout.stripe.test/pay/{id}"),
            id,
        })
    }

    async fn retrieve_session(
        &self,
        id: &PaymentSessionId,
    ) -> Result<Option<PaymentSession>, PaymentError> {
        Ok(lock(&self.sessions).get(id).cloned())
    }
}

// =============================================================================
// Identity
// =============================================================================

struct Account {
    user: IdentityUser,
    password: String,
    token: String,
}

/// Identity provider with a fixed set of accounts.
#[derive(Default)]
pub struct FakeIdentity {
    accounts: Mutex<Vec<Account>>,
    deleted: Mutex<Vec<UserId>>,
    reset_requests: Mutex<Vec<String>>,
    confirm_email: AtomicBool,
    fail_delete: AtomicBool,
}

impl FakeIdentity {
    /// Register an account; returns its access token.
    pub fn add_user(&self, id: &str, email: &str, password: &str) -> String {
        let token = format!("token-{id}");
        lock(&self.accounts).push(Account {
            user: IdentityUser {
                id: UserId::new(id),
                email: Some(email.to_owned()),
                first_name: Some("Ana".to_owned()),
                last_name: Some("Diaz".to_owned()),
            },
            password: password.to_owned(),
            token: token.clone(),
        });
        token
    }

    /// Sign-ups must confirm their email before signing in.
    pub fn require_email_confirmation(&self) {
        self.confirm_email.store(true, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self) {
        self.fail_delete.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn deleted(&self) -> Vec<UserId> {
        lock(&self.deleted).clone()
    }

    #[must_use]
    pub fn reset_requests(&self) -> Vec<String> {
        lock(&self.reset_requests).clone()
    }

    /// Current password of an account, to check updates.
    #[must_use]
    pub fn password_of(&self, id: &str) -> Option<String> {
        lock(&self.accounts)
            .iter()
            .find(|a| a.user.id.as_str() == id)
            .map(|a| a.password.clone())
    }

    fn session_for(account: &Account) -> AuthSession {
        AuthSession {
            access_token: SecretString::from(account.token.clone()),
            refresh_token: None,
            expires_in: Some(3600),
            user: account.user.clone(),
        }
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentity {
    async fn user_for_token(&self, access_token: &str) -> Result<Option<IdentityUser>, IdentityError> {
        Ok(lock(&self.accounts)
            .iter()
            .find(|a| a.token == access_token)
            .map(|a| a.user.clone()))
    }

    async fn delete_user(&self, id: &UserId) -> Result<(), IdentityError> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(IdentityError::Api {
                status: 500,
                message: "delete failed".to_owned(),
            });
        }
        lock(&self.accounts).retain(|a| &a.user.id != id);
        lock(&self.deleted).push(id.clone());
        Ok(())
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<AuthSession, IdentityError> {
        lock(&self.accounts)
            .iter()
            .find(|a| a.user.email.as_deref() == Some(email) && a.password == password.expose_secret())
            .map(Self::session_for)
            .ok_or(IdentityError::InvalidCredentials)
    }

    async fn sign_up(&self, request: &SignUp) -> Result<SignUpOutcome, IdentityError> {
        let mut accounts = lock(&self.accounts);
        if accounts
            .iter()
            .any(|a| a.user.email.as_deref() == Some(request.email.as_str()))
        {
            return Err(IdentityError::UserAlreadyExists);
        }

        let id = format!("user-{}", accounts.len() + 1);
        let account = Account {
            user: IdentityUser {
                id: UserId::new(id.as_str()),
                email: Some(request.email.clone()),
                first_name: Some(request.first_name.clone()),
                last_name: Some(request.last_name.clone()),
            },
            password: request.password.expose_secret().to_owned(),
            token: format!("token-{id}"),
        };

        let outcome = if self.confirm_email.load(Ordering::SeqCst) {
            SignUpOutcome::ConfirmationRequired(account.user.clone())
        } else {
            SignUpOutcome::SignedIn(Self::session_for(&account))
        };
        accounts.push(account);
        Ok(outcome)
    }

    async fn send_password_reset(
        &self,
        email: &str,
        _redirect_to: Option<&str>,
    ) -> Result<(), IdentityError> {
        lock(&self.reset_requests).push(email.to_owned());
        Ok(())
    }

    async fn update_user(
        &self,
        access_token: &str,
        update: &UserUpdate,
    ) -> Result<Option<IdentityUser>, IdentityError> {
        let mut accounts = lock(&self.accounts);
        let Some(account) = accounts.iter_mut().find(|a| a.token == access_token) else {
            return Ok(None);
        };
        if let Some(email) = &update.email {
            account.user.email = Some(email.clone());
        }
        if let Some(password) = &update.password {
            password.expose_secret().clone_into(&mut account.password);
        }
        if let Some(first_name) = &update.first_name {
            account.user.first_name = Some(first_name.clone());
        }
        if let Some(last_name) = &update.last_name {
            account.user.last_name = Some(last_name.clone());
        }
        Ok(Some(account.user.clone()))
    }

    async fn sign_out(&self, _access_token: &str) -> Result<(), IdentityError> {
        Ok(())
    }
}
