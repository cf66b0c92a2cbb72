//! Order reconciliation.
//!
//! Runs when the customer comes back from the hosted payment page. However
//! many times it runs for one payment session, exactly one order exists
//! afterwards: the fast path finds it by session id, and the insert itself
//! is conflict-free on the unique `payment_session_id` column.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use sneaco_core::checkout::{METADATA_ITEMS, METADATA_SHIPPING, METADATA_USER_ID};
use sneaco_core::order::{
    InsertOutcome, NewOrder, Order, OrderItem, decode_items_metadata, decode_shipping_metadata,
};
use sneaco_core::{OrderId, PaymentSessionId, UserId};
use tracing::{error, info, instrument, warn};

use crate::db::RepositoryError;
use crate::payments::{PaymentProvider, PaymentSession};

/// Persistence for orders.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// The order already recorded for a payment session, if any.
    async fn find_by_session(&self, session_id: &PaymentSessionId) -> Result<Option<OrderId>, RepositoryError>;

    /// Insert an order and its items atomically. A second insert for the
    /// same payment session returns the existing order instead.
    async fn insert(&self, order: &NewOrder) -> Result<InsertOutcome, RepositoryError>;

    /// A customer's orders with their items, newest first.
    async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<Order>, RepositoryError>;
}

/// What the order confirmation page shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Confirmation {
    /// The order id, or the payment session id when the order could not be recorded.
    pub order_number: String,
    pub order_id: Option<OrderId>,
    pub newly_created: bool,
    pub amount_paid: Decimal,
    pub customer_email: Option<String>,
    pub items: Vec<OrderItem>,
}

/// Turns paid payment sessions into orders.
pub struct OrderReconciler<'a> {
    payments: &'a dyn PaymentProvider,
    orders: &'a dyn OrderStore,
}

impl<'a> OrderReconciler<'a> {
    #[must_use]
    pub const fn new(payments: &'a dyn PaymentProvider, orders: &'a dyn OrderStore) -> Self {
        Self { payments, orders }
    }

    /// Record the order for a payment session and describe it.
    ///
    /// Returns `None` when the session cannot be found, is not paid, or
    /// carries no owning user; no order is created then. Every later failure degrades into a
    /// confirmation rather than an error.
    #[instrument(skip(self), fields(session_id = %session_id))]
    pub async fn reconcile(&self, session_id: &PaymentSessionId) -> Option<Confirmation> {
        let session = match self.payments.retrieve_session(session_id).await {
            Ok(Some(session)) => session,
            Ok(None) => {
                info!("Payment session not found");
                return None;
            }
            Err(error) => {
                error!(%error, "Failed to retrieve payment session");
                return None;
            }
        };

        if !session.is_paid() {
            warn!(payment_status = ?session.payment_status, "Payment session is not paid");
            return None;
        }

        let Some(user_id) = session
            .metadata_value(METADATA_USER_ID)
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(UserId::new)
        else {
            error!("Payment session has no owning user");
            return None;
        };

        let items = decode_items_metadata(session.metadata_value(METADATA_ITEMS)).unwrap_or_else(|error| {
            warn!(%error, "Unreadable items metadata, recording the order without items");
            Vec::new()
        });

        let (order_id, newly_created) = self.ensure_order(&session, user_id, items.clone()).await;

        Some(Confirmation {
            order_number: order_id
                .as_ref()
                .map_or_else(|| session.id.to_string(), ToString::to_string),
            order_id,
            newly_created,
            amount_paid: sneaco_core::money::from_minor_units(session.amount_total.unwrap_or(0)),
            customer_email: session.customer_email().map(str::to_owned),
            items,
        })
    }

    async fn ensure_order(
        &self,
        session: &PaymentSession,
        user_id: UserId,
        items: Vec<OrderItem>,
    ) -> (Option<OrderId>, bool) {
        match self.orders.find_by_session(&session.id).await {
            Ok(Some(existing)) => return (Some(existing), false),
            Ok(None) => {}
            Err(error) => warn!(%error, "Order lookup failed, attempting insert"),
        }

        let order = NewOrder::paid(
            user_id,
            session.id.clone(),
            session.amount_total.unwrap_or(0),
            items,
        )
        .with_shipping(shipping_snapshot(session))
        .with_billing(billing_snapshot(session));

        match self.orders.insert(&order).await {
            Ok(InsertOutcome::Created(id)) => {
                info!(order_id = %id, items = order.items.len(), "Order recorded");
                (Some(id), true)
            }
            Ok(InsertOutcome::Existing(id)) => (Some(id), false),
            Err(error) => {
                let event_id = sentry::capture_error(&error);
                error!(%error, sentry_event_id = %event_id, "Order insert failed");
                (None, false)
            }
        }
    }
}

/// Shipping metadata, else the processor's shipping details, else nothing.
fn shipping_snapshot(session: &PaymentSession) -> Option<Value> {
    match decode_shipping_metadata(session.metadata_value(METADATA_SHIPPING)) {
        Ok(Some(shipping)) => return Some(shipping),
        Ok(None) => {}
        Err(error) => warn!(%error, "Unreadable shipping metadata"),
    }
    session
        .shipping_details
        .as_ref()
        .and_then(|details| serde_json::to_value(details).ok())
}

fn billing_snapshot(session: &PaymentSession) -> Option<Value> {
    session
        .customer_details
        .as_ref()
        .and_then(|c| c.address.as_ref())
        .and_then(|address| serde_json::to_value(address).ok())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use serde_json::json;
    use sneaco_core::checkout::CheckoutSessionRequest;
    use tokio::sync::Barrier;

    use super::*;
    use crate::payments::{CreatedSession, CustomerDetails, PaymentError, SessionAddress, ShippingDetails};

    /// Processor holding exactly one session.
    struct OneSession(PaymentSession);

    #[async_trait]
    impl PaymentProvider for OneSession {
        async fn create_checkout_session(
            &self,
            _request: &CheckoutSessionRequest,
        ) -> Result<CreatedSession, PaymentError> {
            Err(PaymentError::Api {
                status: 500,
                message: "not used".to_owned(),
            })
        }

        async fn retrieve_session(&self, id: &PaymentSessionId) -> Result<Option<PaymentSession>, PaymentError> {
            Ok((id == &self.0.id).then(|| self.0.clone()))
        }
    }

    /// Store unique on the session id. Every lookup waits at `lookups`, so
    /// concurrent reconciliations all miss the fast path before inserting.
    struct RacingStore {
        orders: Mutex<Vec<(OrderId, NewOrder)>>,
        lookups: Barrier,
    }

    impl RacingStore {
        fn new(racers: usize) -> Self {
            Self {
                orders: Mutex::new(Vec::new()),
                lookups: Barrier::new(racers),
            }
        }
    }

    #[async_trait]
    impl OrderStore for RacingStore {
        async fn find_by_session(&self, session_id: &PaymentSessionId) -> Result<Option<OrderId>, RepositoryError> {
            self.lookups.wait().await;
            Ok(self
                .orders
                .lock()
                .unwrap()
                .iter()
                .find(|(_, o)| &o.payment_session_id == session_id)
                .map(|(id, _)| id.clone()))
        }

        async fn insert(&self, order: &NewOrder) -> Result<InsertOutcome, RepositoryError> {
            let mut orders = self.orders.lock().unwrap();
            if let Some((id, _)) = orders
                .iter()
                .find(|(_, o)| o.payment_session_id == order.payment_session_id)
            {
                return Ok(InsertOutcome::Existing(id.clone()));
            }
            let id = OrderId::new(format!("order-{}", orders.len() + 1));
            orders.push((id.clone(), order.clone()));
            Ok(InsertOutcome::Created(id))
        }

        async fn list_for_user(&self, _user_id: &UserId) -> Result<Vec<Order>, RepositoryError> {
            Ok(vec![])
        }
    }

    fn paid_session() -> PaymentSession {
        session(&[("userId", "u-1"), ("items", r#"[["V9",2,49.99]]"#)])
    }

    fn session(metadata: &[(&str, &str)]) -> PaymentSession {
        PaymentSession {
            id: PaymentSessionId::new("cs_test_1"),
            amount_total: Some(4999),
            currency: Some("eur".to_owned()),
            payment_status: Some("paid".to_owned()),
            customer_details: Some(CustomerDetails {
                email: Some("client@sneaco.fr".to_owned()),
                address: Some(SessionAddress {
                    city: Some("Paris".to_owned()),
                    ..SessionAddress::default()
                }),
                ..CustomerDetails::default()
            }),
            shipping_details: Some(ShippingDetails {
                name: Some("Ana Diaz".to_owned()),
                address: None,
            }),
            metadata: metadata
                .iter()
                .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                .collect::<HashMap<_, _>>(),
            line_items: vec![],
        }
    }

    #[test]
    fn test_shipping_prefers_metadata() {
        let s = session(&[("shipping", r#"{"city":"Lyon"}"#)]);
        assert_eq!(shipping_snapshot(&s), Some(json!({"city": "Lyon"})));
    }

    #[test]
    fn test_shipping_falls_back_to_session_details() {
        let s = session(&[("shipping", "not json")]);
        assert_eq!(
            shipping_snapshot(&s).unwrap().get("name"),
            Some(&json!("Ana Diaz"))
        );
    }

    #[test]
    fn test_billing_is_customer_address() {
        let s = session(&[]);
        assert_eq!(billing_snapshot(&s).unwrap().get("city"), Some(&json!("Paris")));
    }

    #[tokio::test]
    async fn test_concurrent_reconciliations_converge_on_one_order() {
        let payments = OneSession(paid_session());
        let store = RacingStore::new(2);
        let reconciler = OrderReconciler::new(&payments, &store);
        let id = PaymentSessionId::new("cs_test_1");

        let (first, second) = tokio::join!(reconciler.reconcile(&id), reconciler.reconcile(&id));
        let (first, second) = (first.unwrap(), second.unwrap());

        assert_eq!(store.orders.lock().unwrap().len(), 1);
        assert_eq!(first.order_id, second.order_id);
        assert_eq!(first.order_number, "order-1");
        // Exactly one of the two created the order
        assert!(first.newly_created ^ second.newly_created);
        assert_eq!(first.items, second.items);
    }

    #[tokio::test]
    async fn test_conflicting_insert_reports_existing_order() {
        let payments = OneSession(paid_session());
        let store = RacingStore::new(1);
        store.orders.lock().unwrap().push((
            OrderId::new("order-7"),
            NewOrder::paid(UserId::new("u-1"), PaymentSessionId::new("cs_test_1"), 9998, vec![]),
        ));

        // Lookup misses, as if the other writer committed in between
        let confirmation = OrderReconciler::new(&payments, &MissingLookup(store))
            .reconcile(&PaymentSessionId::new("cs_test_1"))
            .await
            .unwrap();

        assert_eq!(confirmation.order_id, Some(OrderId::new("order-7")));
        assert!(!confirmation.newly_created);
    }

    /// Wraps a store whose fast-path lookup never finds anything.
    struct MissingLookup(RacingStore);

    #[async_trait]
    impl OrderStore for MissingLookup {
        async fn find_by_session(&self, _session_id: &PaymentSessionId) -> Result<Option<OrderId>, RepositoryError> {
            Ok(None)
        }

        async fn insert(&self, order: &NewOrder) -> Result<InsertOutcome, RepositoryError> {
            self.0.insert(order).await
        }

        async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<Order>, RepositoryError> {
            self.0.list_for_user(user_id).await
        }
    }

    #[tokio::test]
    async fn test_unpaid_session_records_nothing() {
        for status in ["unpaid", "open"] {
            let mut unpaid = paid_session();
            unpaid.payment_status = Some(status.to_owned());
            let payments = OneSession(unpaid);
            let store = RacingStore::new(1);

            let confirmation = OrderReconciler::new(&payments, &store)
                .reconcile(&PaymentSessionId::new("cs_test_1"))
                .await;

            assert!(confirmation.is_none(), "{status}");
            assert!(store.orders.lock().unwrap().is_empty());
        }
    }
}
