//! # Pre-Order Repository
//!
//! State machine for deferred purchases. The `pre_orders` table is the
//! single source of truth; cart lines only reference it.
//!
//! ```text
//! pending ──► confirmed ──► available ──► shipped ──► delivered
//!    │            │             │            │
//!    └────────────┴─────────────┴────────────┴──► cancelled
//! ```
//!
//! Pre-orders never auto-promote. `fulfill_to_order` is an explicit
//! action from `available` that re-reserves stock at that moment; when
//! stock is short the call fails and the pre-order keeps its state.
//! Every transition is a guarded UPDATE (`WHERE status = ...`) so a
//! racing writer loses cleanly instead of corrupting the lifecycle.

use chrono::{Duration, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::repository::cart::CartRepository;
use crate::repository::inventory::{InventoryRepository, StockRequest};
use crate::repository::new_id;
use crate::repository::order::OrderRepository;
use crate::repository::outbox::NotificationOutboxRepository;
use bindery_core::error::CoreError;
use bindery_core::totals::CheckoutTotals;
use bindery_core::types::{Order, OrderLine, OrderStatus, PreOrder, PreOrderStatus, TaxRate};
use bindery_core::{Money, PRE_ORDER_DELIVERY_DAYS};

/// Repository for pre-order operations.
#[derive(Debug, Clone)]
pub struct PreOrderRepository {
    pool: SqlitePool,
}

impl PreOrderRepository {
    /// Creates a new PreOrderRepository.
    pub fn new(pool: SqlitePool) -> Self {
        PreOrderRepository { pool }
    }

    /// Inserts a pre-order inside the caller's transaction. Called by
    /// the cart repository when a zero-stock book is added or converted.
    pub(crate) async fn insert_with(
        conn: &mut SqliteConnection,
        pre_order: &PreOrder,
    ) -> DbResult<()> {
        debug!(id = %pre_order.id, book_id = %pre_order.book_id, "Inserting pre-order");

        sqlx::query(
            r#"
            INSERT INTO pre_orders (
                id, customer_id, book_id, quantity,
                unit_price_cents, total_cents, status, expected_delivery,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&pre_order.id)
        .bind(&pre_order.customer_id)
        .bind(&pre_order.book_id)
        .bind(pre_order.quantity)
        .bind(pre_order.unit_price_cents)
        .bind(pre_order.total_cents)
        .bind(pre_order.status)
        .bind(pre_order.expected_delivery)
        .bind(pre_order.created_at)
        .bind(pre_order.updated_at)
        .execute(conn)
        .await?;

        Ok(())
    }

    /// Fetches a pre-order inside the caller's transaction.
    pub(crate) async fn fetch_with(
        conn: &mut SqliteConnection,
        id: &str,
    ) -> DbResult<Option<PreOrder>> {
        let pre_order = sqlx::query_as::<_, PreOrder>(
            r#"
            SELECT id, customer_id, book_id, quantity,
                   unit_price_cents, total_cents, status, expected_delivery,
                   created_at, updated_at
            FROM pre_orders
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(conn)
        .await?;

        Ok(pre_order)
    }

    /// Gets a pre-order by ID.
    pub async fn get(&self, id: &str) -> DbResult<Option<PreOrder>> {
        let mut conn = self.pool.acquire().await?;
        Self::fetch_with(&mut conn, id).await
    }

    /// Gets a pre-order owned by the given customer, or NotFound.
    pub async fn get_owned(&self, customer_id: &str, id: &str) -> DbResult<PreOrder> {
        let pre_order = sqlx::query_as::<_, PreOrder>(
            r#"
            SELECT id, customer_id, book_id, quantity,
                   unit_price_cents, total_cents, status, expected_delivery,
                   created_at, updated_at
            FROM pre_orders
            WHERE id = ?1 AND customer_id = ?2
            "#,
        )
        .bind(id)
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await?;

        pre_order.ok_or_else(|| DbError::not_found("Pre-order", id))
    }

    /// Lists a customer's pre-orders, newest first.
    pub async fn list_for_customer(&self, customer_id: &str) -> DbResult<Vec<PreOrder>> {
        let pre_orders = sqlx::query_as::<_, PreOrder>(
            r#"
            SELECT id, customer_id, book_id, quantity,
                   unit_price_cents, total_cents, status, expected_delivery,
                   created_at, updated_at
            FROM pre_orders
            WHERE customer_id = ?1
            ORDER BY created_at DESC
            "#,
        )
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(pre_orders)
    }

    /// Confirms a pending pre-order and stamps the expected delivery
    /// date. Allowed only for the owning customer.
    pub async fn confirm(&self, customer_id: &str, id: &str) -> DbResult<PreOrder> {
        let pre_order = self.get_owned(customer_id, id).await?;

        if !pre_order.status.can_transition_to(PreOrderStatus::Confirmed) {
            return Err(DbError::Core(CoreError::invalid_transition(
                "Pre-order",
                id,
                pre_order.status.as_str(),
                "confirm",
            )));
        }

        let now = Utc::now();
        let expected = now + Duration::days(PRE_ORDER_DELIVERY_DAYS);

        let result = sqlx::query(
            r#"
            UPDATE pre_orders
            SET status = ?2, expected_delivery = ?3, updated_at = ?4
            WHERE id = ?1 AND status = ?5
            "#,
        )
        .bind(id)
        .bind(PreOrderStatus::Confirmed)
        .bind(expected)
        .bind(now)
        .bind(PreOrderStatus::Pending)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::TransactionFailed(format!(
                "pre-order {id} changed state concurrently"
            )));
        }

        info!(pre_order_id = %id, expected_delivery = %expected, "Pre-order confirmed");
        self.get_owned(customer_id, id).await
    }

    /// Cancels a pre-order. Idempotent: cancelling an already-cancelled
    /// pre-order succeeds. Only `delivered` refuses.
    pub async fn cancel(&self, customer_id: &str, id: &str) -> DbResult<PreOrder> {
        let pre_order = self.get_owned(customer_id, id).await?;

        if pre_order.status == PreOrderStatus::Cancelled {
            return Ok(pre_order);
        }

        if !pre_order.status.can_transition_to(PreOrderStatus::Cancelled) {
            return Err(DbError::Core(CoreError::invalid_transition(
                "Pre-order",
                id,
                pre_order.status.as_str(),
                "cancel",
            )));
        }

        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE pre_orders
            SET status = ?2, updated_at = ?3
            WHERE id = ?1 AND status = ?4
            "#,
        )
        .bind(id)
        .bind(PreOrderStatus::Cancelled)
        .bind(now)
        .bind(pre_order.status)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::TransactionFailed(format!(
                "pre-order {id} changed state concurrently"
            )));
        }

        // A cart line pointing at a cancelled pre-order is meaningless.
        CartRepository::delete_for_pre_order_with(&mut tx, id).await?;

        tx.commit().await?;

        info!(pre_order_id = %id, "Pre-order cancelled");
        self.get_owned(customer_id, id).await
    }

    /// Fulfillment side: stock has arrived for the title.
    pub async fn mark_available(&self, id: &str) -> DbResult<()> {
        self.advance(id, PreOrderStatus::Confirmed, PreOrderStatus::Available)
            .await
    }

    /// Fulfillment side: the pre-order shipped directly.
    pub async fn mark_shipped(&self, id: &str) -> DbResult<()> {
        self.advance(id, PreOrderStatus::Available, PreOrderStatus::Shipped)
            .await
    }

    /// Fulfillment side: delivery confirmed.
    pub async fn mark_delivered(&self, id: &str) -> DbResult<()> {
        self.advance(id, PreOrderStatus::Shipped, PreOrderStatus::Delivered)
            .await
    }

    /// Converts an available pre-order into a real order.
    ///
    /// Availability may have changed since the pre-order was marked
    /// available, so stock is re-reserved here, in the same transaction
    /// that writes the order and deletes the pre-order. On shortage the
    /// transaction rolls back and the pre-order keeps its state. The
    /// unit price is the one frozen when the pre-order was placed.
    pub async fn fulfill_to_order(
        &self,
        customer_id: &str,
        id: &str,
        tax_rate: TaxRate,
    ) -> DbResult<Order> {
        let mut tx = self.pool.begin().await?;

        let pre_order = Self::fetch_with(&mut tx, id)
            .await?
            .filter(|p| p.customer_id == customer_id)
            .ok_or_else(|| DbError::not_found("Pre-order", id))?;

        if pre_order.status != PreOrderStatus::Available {
            return Err(DbError::Core(CoreError::invalid_transition(
                "Pre-order",
                id,
                pre_order.status.as_str(),
                "fulfill",
            )));
        }

        // Re-validate stock at this moment; a shortage aborts without
        // touching the pre-order.
        InventoryRepository::reserve_with(
            &mut tx,
            &[StockRequest {
                book_id: pre_order.book_id.clone(),
                quantity: pre_order.quantity,
            }],
        )
        .await?;

        let title: Option<String> = sqlx::query_scalar("SELECT title FROM books WHERE id = ?1")
            .bind(&pre_order.book_id)
            .fetch_optional(&mut *tx)
            .await?;
        let title = title.ok_or_else(|| DbError::not_found("Book", &pre_order.book_id))?;

        // No shipping fee or promo on the fulfillment path; tax applies
        // to the frozen pre-order price.
        let subtotal = Money::from_cents(pre_order.total_cents);
        let totals = CheckoutTotals::compute(subtotal, Money::zero(), 0, tax_rate);

        let now = Utc::now();
        let order = Order {
            id: new_id(),
            customer_id: pre_order.customer_id.clone(),
            subtotal_cents: totals.subtotal.cents(),
            shipping_cents: totals.shipping.cents(),
            tax_cents: totals.tax.cents(),
            discount_cents: totals.discount.cents(),
            total_cents: totals.total.cents(),
            status: OrderStatus::Pending,
            shipping_address: String::new(),
            billing_address: String::new(),
            contact_email: None,
            created_at: now,
            updated_at: now,
        };

        // Fulfillment reuses the delivery details captured when the
        // pre-order was confirmed; the address fields stay empty until
        // the delivery collaborator fills them.
        OrderRepository::insert_with(&mut tx, &order).await?;
        OrderRepository::insert_line_with(
            &mut tx,
            &OrderLine {
                id: new_id(),
                order_id: order.id.clone(),
                book_id: pre_order.book_id.clone(),
                title_snapshot: title,
                quantity: pre_order.quantity,
                unit_price_cents: pre_order.unit_price_cents,
                subtotal_cents: pre_order.total_cents,
            },
        )
        .await?;

        // The pre-order is consumed, together with any cart line that
        // still references it.
        CartRepository::delete_for_pre_order_with(&mut tx, id).await?;
        sqlx::query("DELETE FROM pre_orders WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let payload = serde_json::to_string(&order)
            .map_err(|e| DbError::Internal(format!("serialize order confirmation: {e}")))?;
        NotificationOutboxRepository::queue_with(&mut tx, "ORDER", &order.id, &payload).await?;

        tx.commit().await?;

        info!(
            pre_order_id = %id,
            order_id = %order.id,
            total = %order.total_cents,
            "Pre-order fulfilled to order"
        );
        Ok(order)
    }

    /// Guarded single-step transition used by the fulfillment-side
    /// markers.
    async fn advance(&self, id: &str, from: PreOrderStatus, to: PreOrderStatus) -> DbResult<()> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE pre_orders
            SET status = ?2, updated_at = ?3
            WHERE id = ?1 AND status = ?4
            "#,
        )
        .bind(id)
        .bind(to)
        .bind(now)
        .bind(from)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let current = self
                .get(id)
                .await?
                .ok_or_else(|| DbError::not_found("Pre-order", id))?;
            return Err(DbError::Core(CoreError::invalid_transition(
                "Pre-order",
                id,
                current.status.as_str(),
                "advance",
            )));
        }

        debug!(pre_order_id = %id, from = %from, to = %to, "Pre-order advanced");
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::testing::{seed_book, test_db};
    use crate::Database;

    /// Seeds an out-of-stock book and a pre-order for it via the cart.
    async fn seed_pre_order(db: &Database, customer: &str) -> (String, PreOrder) {
        let book = seed_book(db, "Forthcoming Title", 2500, 0).await;
        let line = db.cart().add(customer, &book.id, 2).await.unwrap();
        let pre_order_id = line.pre_order_id.expect("pre-order reference");
        let pre_order = db.pre_orders().get(&pre_order_id).await.unwrap().unwrap();
        (book.id, pre_order)
    }

    #[tokio::test]
    async fn test_confirm_stamps_expected_delivery() {
        let db = test_db().await;
        let (_, pre_order) = seed_pre_order(&db, "cust-1").await;

        let confirmed = db.pre_orders().confirm("cust-1", &pre_order.id).await.unwrap();
        assert_eq!(confirmed.status, PreOrderStatus::Confirmed);

        let expected = confirmed.expected_delivery.expect("delivery estimate");
        let days_out = (expected - Utc::now()).num_days();
        assert!((PRE_ORDER_DELIVERY_DAYS - 1..=PRE_ORDER_DELIVERY_DAYS).contains(&days_out));

        // Confirming twice is not a legal transition
        assert!(db.pre_orders().confirm("cust-1", &pre_order.id).await.is_err());
    }

    #[tokio::test]
    async fn test_confirm_requires_ownership() {
        let db = test_db().await;
        let (_, pre_order) = seed_pre_order(&db, "cust-1").await;

        let err = db.pre_orders().confirm("cust-2", &pre_order.id).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let db = test_db().await;
        let (_, pre_order) = seed_pre_order(&db, "cust-1").await;

        let first = db.pre_orders().cancel("cust-1", &pre_order.id).await.unwrap();
        assert_eq!(first.status, PreOrderStatus::Cancelled);

        // Cancelling again returns success, not an error.
        let second = db.pre_orders().cancel("cust-1", &pre_order.id).await.unwrap();
        assert_eq!(second.status, PreOrderStatus::Cancelled);

        // The referencing cart line is gone.
        assert!(db.cart().list("cust-1").await.unwrap().active.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_refused_after_delivery() {
        let db = test_db().await;
        let (_, pre_order) = seed_pre_order(&db, "cust-1").await;

        db.pre_orders().confirm("cust-1", &pre_order.id).await.unwrap();
        db.pre_orders().mark_available(&pre_order.id).await.unwrap();
        db.pre_orders().mark_shipped(&pre_order.id).await.unwrap();
        db.pre_orders().mark_delivered(&pre_order.id).await.unwrap();

        let err = db.pre_orders().cancel("cust-1", &pre_order.id).await.unwrap_err();
        assert!(matches!(
            err,
            DbError::Core(CoreError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_markers_follow_the_chain() {
        let db = test_db().await;
        let (_, pre_order) = seed_pre_order(&db, "cust-1").await;

        // available before confirmed is refused
        assert!(db.pre_orders().mark_available(&pre_order.id).await.is_err());

        db.pre_orders().confirm("cust-1", &pre_order.id).await.unwrap();
        db.pre_orders().mark_available(&pre_order.id).await.unwrap();

        let current = db.pre_orders().get(&pre_order.id).await.unwrap().unwrap();
        assert_eq!(current.status, PreOrderStatus::Available);
    }

    #[tokio::test]
    async fn test_fulfill_requires_available() {
        let db = test_db().await;
        let (_, pre_order) = seed_pre_order(&db, "cust-1").await;

        let err = db
            .pre_orders()
            .fulfill_to_order("cust-1", &pre_order.id, TaxRate::from_bps(600))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Core(CoreError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_fulfill_shortage_leaves_pre_order_untouched() {
        let db = test_db().await;
        let (_book_id, pre_order) = seed_pre_order(&db, "cust-1").await;

        db.pre_orders().confirm("cust-1", &pre_order.id).await.unwrap();
        db.pre_orders().mark_available(&pre_order.id).await.unwrap();

        // Stock never actually arrived.
        let err = db
            .pre_orders()
            .fulfill_to_order("cust-1", &pre_order.id, TaxRate::from_bps(600))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Core(CoreError::InsufficientStock { .. })
        ));

        let current = db.pre_orders().get(&pre_order.id).await.unwrap().unwrap();
        assert_eq!(current.status, PreOrderStatus::Available);
    }

    #[tokio::test]
    async fn test_fulfill_creates_order_at_frozen_price() {
        let db = test_db().await;
        let (book_id, pre_order) = seed_pre_order(&db, "cust-1").await;

        db.pre_orders().confirm("cust-1", &pre_order.id).await.unwrap();
        db.inventory().restock(&book_id, 5).await.unwrap();
        db.pre_orders().mark_available(&pre_order.id).await.unwrap();

        let order = db
            .pre_orders()
            .fulfill_to_order("cust-1", &pre_order.id, TaxRate::from_bps(600))
            .await
            .unwrap();

        // 2 x 2500 frozen price, 6% tax, no shipping or promo
        assert_eq!(order.subtotal_cents, 5000);
        assert_eq!(order.tax_cents, 300);
        assert_eq!(order.total_cents, 5300);

        let lines = db.orders().get_lines(&order.id).await.unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].unit_price_cents, 2500);

        // Pre-order consumed, cart line gone, stock decremented.
        assert!(db.pre_orders().get(&pre_order.id).await.unwrap().is_none());
        assert!(db.cart().list("cust-1").await.unwrap().active.is_empty());
        assert_eq!(db.inventory().stock_of(&book_id).await.unwrap(), 3);
        assert_eq!(db.outbox().count_pending().await.unwrap(), 1);
    }
}
