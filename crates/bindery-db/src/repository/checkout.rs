//! # Checkout Coordinator
//!
//! Turns a customer's active cart lines into a durable order.
//!
//! ## Transaction Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    SINGLE TRANSACTION                                   │
//! │                                                                         │
//! │  1. load active cart lines          (saved / pre-order lines excluded) │
//! │  2. snapshot price + title per book (price-at-purchase)                │
//! │  3. compute totals                  (bindery-core, pure)               │
//! │  4. reserve stock                   (ledger check-and-decrement)       │
//! │  5. insert order + order lines                                         │
//! │  6. record idempotency key                                             │
//! │  7. delete exactly the checked-out cart lines                          │
//! │  8. queue order confirmation        (notification outbox)              │
//! │                                                                         │
//! │  COMMIT ← any failure above rolls back every step                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Idempotency
//! The caller supplies an idempotency key. A key seen before resolves to
//! the order it originally created (`replayed = true`) instead of
//! charging stock twice. When two requests race the same key, the loser
//! hits the key's primary-key constraint, receives `DuplicateCheckout`,
//! and its retry takes the replay path.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::repository::inventory::{InventoryRepository, StockRequest};
use crate::repository::new_id;
use crate::repository::order::OrderRepository;
use crate::repository::outbox::NotificationOutboxRepository;
use bindery_core::error::{CoreError, ValidationError};
use bindery_core::money::Money;
use bindery_core::totals::{promo_discount_bps, CheckoutTotals, ShippingOption};
use bindery_core::types::{Book, CartLine, Order, OrderLine, OrderStatus, TaxRate};
use bindery_core::validation::{
    validate_address, validate_contact_email, validate_payment_method,
};

/// Everything a checkout call needs.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub customer_id: String,
    pub shipping_address: String,
    /// Defaults to the shipping address when absent.
    pub billing_address: Option<String>,
    pub contact_email: Option<String>,
    pub payment_method: String,
    pub shipping_option: ShippingOption,
    pub promo_code: Option<String>,
    /// Caller-supplied token; a retried request must reuse it.
    pub idempotency_key: String,
    pub tax_rate: TaxRate,
}

/// The outcome of a successful checkout.
#[derive(Debug, Clone)]
pub struct CheckoutReceipt {
    pub order_id: String,
    pub totals: CheckoutTotals,
    /// True when the idempotency key had already been committed and the
    /// existing order was returned instead of creating a new one.
    pub replayed: bool,
}

/// Coordinates the multi-entity checkout transaction.
#[derive(Debug, Clone)]
pub struct CheckoutCoordinator {
    pool: SqlitePool,
}

impl CheckoutCoordinator {
    /// Creates a new CheckoutCoordinator.
    pub fn new(pool: SqlitePool) -> Self {
        CheckoutCoordinator { pool }
    }

    /// Runs a checkout. All-or-nothing: on any failure no order, no
    /// stock decrement, and no cart deletion survive.
    pub async fn checkout(&self, request: &CheckoutRequest) -> DbResult<CheckoutReceipt> {
        // Validation first; a rejected request touches nothing.
        let shipping_address =
            validate_address(&request.shipping_address).map_err(CoreError::from)?;
        let billing_address = match &request.billing_address {
            Some(address) => validate_address(address).map_err(CoreError::from)?,
            None => shipping_address.clone(),
        };
        let contact_email = match &request.contact_email {
            Some(email) => Some(validate_contact_email(email).map_err(CoreError::from)?),
            None => None,
        };
        let payment_method =
            validate_payment_method(&request.payment_method).map_err(CoreError::from)?;
        if request.idempotency_key.trim().is_empty() {
            return Err(DbError::Core(
                ValidationError::Required {
                    field: "idempotency_key".to_string(),
                }
                .into(),
            ));
        }
        let discount_bps = match &request.promo_code {
            Some(code) => promo_discount_bps(code).map_err(CoreError::from)?,
            None => 0,
        };

        debug!(
            customer_id = %request.customer_id,
            payment_method = %payment_method,
            "Checkout requested"
        );

        // Replay of an already-committed key returns the original order.
        if let Some(receipt) = self.find_replay(request).await? {
            return Ok(receipt);
        }

        let mut tx = self.pool.begin().await?;

        // Active lines only: saved and pre-order lines never reserve
        // stock at checkout.
        let lines = sqlx::query_as::<_, CartLine>(
            r#"
            SELECT id, customer_id, book_id, quantity, saved, is_pre_order,
                   pre_order_id, created_at, updated_at
            FROM cart_lines
            WHERE customer_id = ?1 AND saved = 0 AND is_pre_order = 0
            ORDER BY created_at
            "#,
        )
        .bind(&request.customer_id)
        .fetch_all(&mut *tx)
        .await?;

        if lines.is_empty() {
            return Err(DbError::Core(CoreError::EmptyCart));
        }

        // Snapshot current prices and titles; these freeze into the
        // order lines and never track later catalog edits.
        let mut subtotal = Money::zero();
        let mut snapshots: Vec<(CartLine, Book)> = Vec::with_capacity(lines.len());
        for line in lines {
            let book: Option<Book> = sqlx::query_as(
                r#"
                SELECT id, title, author, price_cents, stock, is_active,
                       created_at, updated_at
                FROM books
                WHERE id = ?1 AND is_active = 1
                "#,
            )
            .bind(&line.book_id)
            .fetch_optional(&mut *tx)
            .await?;
            let book = book
                .ok_or_else(|| DbError::Core(CoreError::BookNotFound(line.book_id.clone())))?;

            subtotal += book.price().multiply_quantity(line.quantity);
            snapshots.push((line, book));
        }

        let totals = CheckoutTotals::compute(
            subtotal,
            request.shipping_option.fee(),
            discount_bps,
            request.tax_rate,
        );

        // Atomic reservation across every line; shortages abort the
        // whole transaction and name the short titles.
        let requests: Vec<StockRequest> = snapshots
            .iter()
            .map(|(line, _)| StockRequest {
                book_id: line.book_id.clone(),
                quantity: line.quantity,
            })
            .collect();
        InventoryRepository::reserve_with(&mut tx, &requests).await?;

        let now = Utc::now();
        let order = Order {
            id: new_id(),
            customer_id: request.customer_id.clone(),
            subtotal_cents: totals.subtotal.cents(),
            shipping_cents: totals.shipping.cents(),
            tax_cents: totals.tax.cents(),
            discount_cents: totals.discount.cents(),
            total_cents: totals.total.cents(),
            status: OrderStatus::Pending,
            shipping_address,
            billing_address,
            contact_email,
            created_at: now,
            updated_at: now,
        };
        OrderRepository::insert_with(&mut tx, &order).await?;

        for (line, book) in &snapshots {
            let order_line = OrderLine {
                id: new_id(),
                order_id: order.id.clone(),
                book_id: book.id.clone(),
                title_snapshot: book.title.clone(),
                quantity: line.quantity,
                unit_price_cents: book.price_cents,
                subtotal_cents: book.price_cents * line.quantity,
            };
            OrderRepository::insert_line_with(&mut tx, &order_line).await?;
        }

        // The key's primary key is the commit-time guard against two
        // requests racing the same token.
        let key_insert = sqlx::query(
            r#"
            INSERT INTO checkout_keys (idempotency_key, customer_id, order_id, created_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(request.idempotency_key.trim())
        .bind(&request.customer_id)
        .bind(&order.id)
        .bind(now)
        .execute(&mut *tx)
        .await;
        if let Err(err) = key_insert {
            return match DbError::from(err) {
                DbError::UniqueViolation { .. } => {
                    Err(DbError::Core(CoreError::DuplicateCheckout))
                }
                other => Err(other),
            };
        }

        // Delete only the lines just reserved; saved and pre-order lines
        // are untouched.
        for (line, _) in &snapshots {
            sqlx::query("DELETE FROM cart_lines WHERE id = ?1 AND customer_id = ?2")
                .bind(&line.id)
                .bind(&request.customer_id)
                .execute(&mut *tx)
                .await?;
        }

        let payload = serde_json::to_string(&order)
            .map_err(|e| DbError::Internal(format!("serialize order confirmation: {e}")))?;
        NotificationOutboxRepository::queue_with(&mut tx, "ORDER", &order.id, &payload).await?;

        tx.commit().await?;

        info!(
            order_id = %order.id,
            customer_id = %request.customer_id,
            total = %totals.total,
            lines = snapshots.len(),
            "Checkout committed"
        );

        Ok(CheckoutReceipt {
            order_id: order.id,
            totals,
            replayed: false,
        })
    }

    /// Resolves an already-committed idempotency key to its order.
    async fn find_replay(&self, request: &CheckoutRequest) -> DbResult<Option<CheckoutReceipt>> {
        let key_row: Option<(String, String)> = sqlx::query_as(
            "SELECT customer_id, order_id FROM checkout_keys WHERE idempotency_key = ?1",
        )
        .bind(request.idempotency_key.trim())
        .fetch_optional(&self.pool)
        .await?;

        let Some((owner, order_id)) = key_row else {
            return Ok(None);
        };

        // A key reused across customers never reveals the other order.
        if owner != request.customer_id {
            return Err(DbError::Core(CoreError::DuplicateCheckout));
        }

        let order = sqlx::query_as::<_, Order>(
            r#"
            SELECT id, customer_id,
                   subtotal_cents, shipping_cents, tax_cents, discount_cents, total_cents,
                   status, shipping_address, billing_address, contact_email,
                   created_at, updated_at
            FROM orders
            WHERE id = ?1
            "#,
        )
        .bind(&order_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("Order", &order_id))?;

        info!(order_id = %order.id, "Checkout replayed from idempotency key");

        Ok(Some(CheckoutReceipt {
            order_id: order.id.clone(),
            totals: CheckoutTotals {
                subtotal: Money::from_cents(order.subtotal_cents),
                shipping: Money::from_cents(order.shipping_cents),
                discount: Money::from_cents(order.discount_cents),
                tax: Money::from_cents(order.tax_cents),
                total: Money::from_cents(order.total_cents),
            },
            replayed: true,
        }))
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

    fn request(customer_id: &str, key: &str) -> CheckoutRequest {
        CheckoutRequest {
            customer_id: customer_id.to_string(),
            shipping_address: "22 Acacia Avenue, London".to_string(),
            billing_address: None,
            contact_email: None,
            payment_method: "card".to_string(),
            shipping_option: ShippingOption::Standard,
            promo_code: Some("SAVE10".to_string()),
            idempotency_key: key.to_string(),
            tax_rate: TaxRate::from_bps(600),
        }
    }

    async fn order_count(db: &Database) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM orders")
            .fetch_one(db.pool())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_empty_cart_rejected() {
        let db = test_db().await;

        let err = db.checkout().checkout(&request("cust-1", "key-1")).await.unwrap_err();
        assert!(matches!(err, DbError::Core(CoreError::EmptyCart)));
    }

    #[tokio::test]
    async fn test_validation_rejects_short_address() {
        let db = test_db().await;
        let book = seed_book(&db, "Book A", 2000, 5).await;
        db.cart().add("cust-1", &book.id, 1).await.unwrap();

        let mut req = request("cust-1", "key-1");
        req.shipping_address = "short".to_string();

        let err = db.checkout().checkout(&req).await.unwrap_err();
        assert!(matches!(
            err,
            DbError::Core(CoreError::Validation(ValidationError::TooShort { .. }))
        ));
        assert_eq!(order_count(&db).await, 0);
    }

    #[tokio::test]
    async fn test_unknown_promo_rejected() {
        let db = test_db().await;
        let book = seed_book(&db, "Book A", 2000, 5).await;
        db.cart().add("cust-1", &book.id, 1).await.unwrap();

        let mut req = request("cust-1", "key-1");
        req.promo_code = Some("EXPIRED99".to_string());

        let err = db.checkout().checkout(&req).await.unwrap_err();
        assert!(matches!(
            err,
            DbError::Core(CoreError::Validation(ValidationError::NotAllowed { .. }))
        ));
    }

    /// Spec scenario: 2 x Book A ($20.00, stock 5) plus 1 x Book B
    /// ($15.00, stock now 0). The whole checkout aborts naming Book B;
    /// Book A keeps its 5 units and no order exists.
    #[tokio::test]
    async fn test_shortage_aborts_everything() {
        let db = test_db().await;
        let book_a = seed_book(&db, "Book A", 2000, 5).await;
        let book_b = seed_book(&db, "Book B", 1500, 1).await;

        db.cart().add("cust-1", &book_a.id, 2).await.unwrap();
        db.cart().add("cust-1", &book_b.id, 1).await.unwrap();

        // The last unit of Book B sells elsewhere before checkout.
        db.inventory()
            .reserve(&[crate::repository::inventory::StockRequest {
                book_id: book_b.id.clone(),
                quantity: 1,
            }])
            .await
            .unwrap();

        let err = db.checkout().checkout(&request("cust-1", "key-1")).await.unwrap_err();
        match err {
            DbError::Core(CoreError::InsufficientStock { shortages }) => {
                assert_eq!(shortages.len(), 1);
                assert_eq!(shortages[0].title, "Book B");
            }
            other => panic!("expected InsufficientStock, got {other:?}"),
        }

        // Nothing moved: stock, cart, orders, outbox.
        assert_eq!(db.inventory().stock_of(&book_a.id).await.unwrap(), 5);
        assert_eq!(order_count(&db).await, 0);
        assert_eq!(db.cart().list("cust-1").await.unwrap().active.len(), 2);
        assert_eq!(db.outbox().count_pending().await.unwrap(), 0);
    }

    /// Spec scenario: 2 x $20.00, SAVE10, standard shipping, 6% tax.
    /// subtotal 40.00, discount 4.00, tax 2.16, shipping 5.00,
    /// total 43.16; stock 5 -> 3; cart emptied.
    #[tokio::test]
    async fn test_successful_checkout() {
        let db = test_db().await;
        let book = seed_book(&db, "Book A", 2000, 5).await;
        db.cart().add("cust-1", &book.id, 2).await.unwrap();

        let receipt = db.checkout().checkout(&request("cust-1", "key-1")).await.unwrap();

        assert!(!receipt.replayed);
        assert_eq!(receipt.totals.subtotal.cents(), 4000);
        assert_eq!(receipt.totals.discount.cents(), 400);
        assert_eq!(receipt.totals.tax.cents(), 216);
        assert_eq!(receipt.totals.shipping.cents(), 500);
        assert_eq!(receipt.totals.total.cents(), 4316);

        assert_eq!(db.inventory().stock_of(&book.id).await.unwrap(), 3);
        assert!(db.cart().list("cust-1").await.unwrap().active.is_empty());

        let order = db.orders().get_by_id(&receipt.order_id).await.unwrap().unwrap();
        assert_eq!(order.total_cents, 4316);
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.billing_address, order.shipping_address);

        let lines = db.orders().get_lines(&receipt.order_id).await.unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].unit_price_cents, 2000);
        assert_eq!(lines[0].subtotal_cents, 4000);

        // The confirmation is queued in the same transaction.
        assert_eq!(db.outbox().count_pending().await.unwrap(), 1);
    }

    /// The order total equals subtotal + shipping + tax - discount.
    #[tokio::test]
    async fn test_total_balances() {
        let db = test_db().await;
        let book_a = seed_book(&db, "Book A", 1999, 5).await;
        let book_b = seed_book(&db, "Book B", 750, 5).await;
        db.cart().add("cust-1", &book_a.id, 3).await.unwrap();
        db.cart().add("cust-1", &book_b.id, 1).await.unwrap();

        let receipt = db.checkout().checkout(&request("cust-1", "key-1")).await.unwrap();
        let order = db.orders().get_by_id(&receipt.order_id).await.unwrap().unwrap();
        let lines = db.orders().get_lines(&receipt.order_id).await.unwrap();

        let line_sum: i64 = lines.iter().map(|l| l.subtotal_cents).sum();
        assert_eq!(line_sum, order.subtotal_cents);
        assert_eq!(
            order.total_cents,
            order.subtotal_cents + order.shipping_cents + order.tax_cents
                - order.discount_cents
        );
    }

    /// Saved and pre-order lines survive a checkout untouched.
    #[tokio::test]
    async fn test_saved_and_pre_order_lines_excluded() {
        let db = test_db().await;
        let active = seed_book(&db, "Active", 1000, 5).await;
        let kept = seed_book(&db, "Kept For Later", 1000, 5).await;
        let unreleased = seed_book(&db, "Unreleased", 1000, 0).await;

        db.cart().add("cust-1", &active.id, 1).await.unwrap();
        let saved_line = db.cart().add("cust-1", &kept.id, 1).await.unwrap();
        db.cart().toggle_save("cust-1", &saved_line.id, true).await.unwrap();
        db.cart().add("cust-1", &unreleased.id, 1).await.unwrap();

        let receipt = db.checkout().checkout(&request("cust-1", "key-1")).await.unwrap();

        // Only the plain active line was ordered.
        let lines = db.orders().get_lines(&receipt.order_id).await.unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].title_snapshot, "Active");

        let view = db.cart().list("cust-1").await.unwrap();
        assert_eq!(view.saved.len(), 1);
        assert_eq!(view.active.len(), 1); // the pre-order line
        assert!(view.active[0].is_pre_order);
        assert_eq!(db.inventory().stock_of(&kept.id).await.unwrap(), 5);
    }

    /// Replaying the same idempotency key returns the same order id
    /// without decrementing stock again.
    #[tokio::test]
    async fn test_idempotent_replay() {
        let db = test_db().await;
        let book = seed_book(&db, "Book A", 2000, 5).await;
        db.cart().add("cust-1", &book.id, 2).await.unwrap();

        let first = db.checkout().checkout(&request("cust-1", "key-1")).await.unwrap();
        let second = db.checkout().checkout(&request("cust-1", "key-1")).await.unwrap();

        assert_eq!(first.order_id, second.order_id);
        assert!(second.replayed);
        assert_eq!(second.totals.total.cents(), 4316);

        assert_eq!(order_count(&db).await, 1);
        assert_eq!(db.inventory().stock_of(&book.id).await.unwrap(), 3);
    }

    /// A key minted by one customer never resolves for another.
    #[tokio::test]
    async fn test_foreign_key_reuse_rejected() {
        let db = test_db().await;
        let book = seed_book(&db, "Book A", 2000, 5).await;
        db.cart().add("cust-1", &book.id, 1).await.unwrap();
        db.cart().add("cust-2", &book.id, 1).await.unwrap();

        db.checkout().checkout(&request("cust-1", "shared-key")).await.unwrap();

        let err = db
            .checkout()
            .checkout(&request("cust-2", "shared-key"))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Core(CoreError::DuplicateCheckout)));
    }

    /// Two checkouts racing the last unit: exactly one wins, stock never
    /// goes negative.
    #[tokio::test]
    async fn test_concurrent_checkouts_for_last_unit() {
        let db = test_db().await;
        let book = seed_book(&db, "Last Copy", 2000, 1).await;
        db.cart().add("cust-1", &book.id, 1).await.unwrap();
        db.cart().add("cust-2", &book.id, 1).await.unwrap();

        let db_a = db.clone();
        let db_b = db.clone();
        let (first, second) = tokio::join!(
            tokio::spawn(async move {
                db_a.checkout().checkout(&request("cust-1", "key-a")).await
            }),
            tokio::spawn(async move {
                db_b.checkout().checkout(&request("cust-2", "key-b")).await
            }),
        );
        let results = [first.unwrap(), second.unwrap()];

        let wins = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(wins, 1, "exactly one checkout must win the last unit");

        let loss = results.iter().find(|r| r.is_err()).unwrap();
        assert!(matches!(
            loss.as_ref().unwrap_err(),
            DbError::Core(CoreError::InsufficientStock { .. })
        ));

        assert_eq!(db.inventory().stock_of(&book.id).await.unwrap(), 0);
        assert_eq!(order_count(&db).await, 1);
    }
}
