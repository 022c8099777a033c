//! # Payment Repository
//!
//! Payment records for orders. Exactly one non-refunded payment row is
//! authoritative per order; `transaction_id` is unique across every row,
//! refunds included, enforced by the database constraint.
//!
//! Refunds never rewrite the original row. Each refund is a linked
//! negative-amount row (`refund_of`), and the original flips to
//! `refunded` only once the refunds add up to the full amount.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::new_id;
use crate::repository::order::OrderRepository;
use bindery_core::error::CoreError;
use bindery_core::types::{OrderStatus, Payment, PaymentStatus};
use bindery_core::validation::{validate_amount_cents, validate_payment_method};
use bindery_core::{Money, OVERPAY_TOLERANCE_CENTS};

/// How many generated transaction ids to try before giving up on the
/// uniqueness constraint.
const TXN_ID_ATTEMPTS: usize = 3;

/// Repository for payment operations.
#[derive(Debug, Clone)]
pub struct PaymentRepository {
    pool: SqlitePool,
}

impl PaymentRepository {
    /// Creates a new PaymentRepository.
    pub fn new(pool: SqlitePool) -> Self {
        PaymentRepository { pool }
    }

    /// Creates a pending payment for an order the customer owns.
    ///
    /// ## Rules
    /// - amount must be positive and at most the order total plus a
    ///   small overpayment tolerance (rounding, tips)
    /// - a cancelled order accepts no payment
    /// - an order with a live (non-refunded) payment accepts no second
    ///   one
    /// - `transaction_id` is generated when absent; generation retries
    ///   with a suffix if the uniqueness constraint objects
    pub async fn create(
        &self,
        customer_id: &str,
        order_id: &str,
        method: &str,
        amount_cents: i64,
        transaction_id: Option<String>,
    ) -> DbResult<Payment> {
        let method = validate_payment_method(method).map_err(CoreError::from)?;
        validate_amount_cents(amount_cents).map_err(CoreError::from)?;

        let order = OrderRepository::new(self.pool.clone())
            .get_owned(customer_id, order_id)
            .await?;

        if order.status == OrderStatus::Cancelled {
            return Err(DbError::Core(CoreError::invalid_transition(
                "Order",
                order_id,
                order.status.as_str(),
                "accept payment",
            )));
        }

        if amount_cents > order.total_cents + OVERPAY_TOLERANCE_CENTS {
            return Err(DbError::Core(CoreError::payment_rejected(format!(
                "amount {} exceeds order total {}",
                Money::from_cents(amount_cents),
                order.total(),
            ))));
        }

        let live: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM payments
            WHERE order_id = ?1 AND refund_of IS NULL AND status != ?2
            "#,
        )
        .bind(order_id)
        .bind(PaymentStatus::Refunded)
        .fetch_one(&self.pool)
        .await?;
        if live > 0 {
            return Err(DbError::Core(CoreError::payment_rejected(
                "order already has an active payment",
            )));
        }

        let now = Utc::now();
        let mut payment = Payment {
            id: new_id(),
            order_id: order_id.to_string(),
            customer_id: customer_id.to_string(),
            method,
            status: PaymentStatus::Pending,
            amount_cents,
            transaction_id: String::new(),
            refund_of: None,
            note: None,
            created_at: now,
            updated_at: now,
        };

        match transaction_id {
            Some(supplied) => {
                payment.transaction_id = supplied;
                self.insert(&payment).await.map_err(|err| match err {
                    DbError::UniqueViolation { .. } => DbError::Core(
                        CoreError::payment_rejected("transaction reference already used"),
                    ),
                    other => other,
                })?;
            }
            None => self.insert_with_generated_txn_id(&mut payment).await?,
        }

        info!(
            payment_id = %payment.id,
            order_id = %order_id,
            amount = %payment.amount(),
            "Payment created"
        );
        Ok(payment)
    }

    /// Completes a pending payment. The (payment_id, transaction_id)
    /// pair must match an existing pending row. Completion confirms a
    /// still-pending order.
    pub async fn complete(&self, payment_id: &str, transaction_id: &str) -> DbResult<Payment> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = ?3, updated_at = ?4
            WHERE id = ?1 AND transaction_id = ?2 AND status = ?5
            "#,
        )
        .bind(payment_id)
        .bind(transaction_id)
        .bind(PaymentStatus::Completed)
        .bind(now)
        .bind(PaymentStatus::Pending)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Pending payment", payment_id));
        }

        let payment = self
            .get(payment_id)
            .await?
            .ok_or_else(|| DbError::not_found("Payment", payment_id))?;

        OrderRepository::new(self.pool.clone())
            .confirm_if_pending(&payment.order_id)
            .await?;

        info!(payment_id = %payment_id, order_id = %payment.order_id, "Payment completed");
        Ok(payment)
    }

    /// Refunds part or all of a completed payment.
    ///
    /// Inserts a linked negative-amount row. The original row becomes
    /// `refunded` only when refunds reach the full amount; a partial
    /// refund leaves it `completed` with an audit note.
    pub async fn refund(
        &self,
        payment_id: &str,
        refund_amount_cents: i64,
        reason: &str,
    ) -> DbResult<Payment> {
        validate_amount_cents(refund_amount_cents).map_err(CoreError::from)?;

        let original = self
            .get(payment_id)
            .await?
            .ok_or_else(|| DbError::not_found("Payment", payment_id))?;

        if original.is_refund() {
            return Err(DbError::Core(CoreError::payment_rejected(
                "cannot refund a refund row",
            )));
        }
        match original.status {
            PaymentStatus::Completed => {}
            PaymentStatus::Pending => {
                return Err(DbError::Core(CoreError::payment_rejected(
                    "payment has not completed",
                )))
            }
            PaymentStatus::Refunded => {
                return Err(DbError::Core(CoreError::payment_rejected(
                    "payment is already fully refunded",
                )))
            }
        }

        let already_refunded: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(-amount_cents), 0) FROM payments WHERE refund_of = ?1",
        )
        .bind(payment_id)
        .fetch_one(&self.pool)
        .await?;

        if already_refunded + refund_amount_cents > original.amount_cents {
            return Err(DbError::Core(CoreError::payment_rejected(format!(
                "refund {} exceeds remaining balance {}",
                Money::from_cents(refund_amount_cents),
                Money::from_cents(original.amount_cents - already_refunded),
            ))));
        }

        let full_after = already_refunded + refund_amount_cents == original.amount_cents;
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;

        let refund = Payment {
            id: new_id(),
            order_id: original.order_id.clone(),
            customer_id: original.customer_id.clone(),
            method: original.method.clone(),
            status: PaymentStatus::Completed,
            amount_cents: -refund_amount_cents,
            transaction_id: generate_txn_id(0),
            refund_of: Some(original.id.clone()),
            note: Some(reason.to_string()),
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO payments (
                id, order_id, customer_id, method, status,
                amount_cents, transaction_id, refund_of, note,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&refund.id)
        .bind(&refund.order_id)
        .bind(&refund.customer_id)
        .bind(&refund.method)
        .bind(refund.status)
        .bind(refund.amount_cents)
        .bind(&refund.transaction_id)
        .bind(&refund.refund_of)
        .bind(&refund.note)
        .bind(refund.created_at)
        .bind(refund.updated_at)
        .execute(&mut *tx)
        .await?;

        let audit_note = if full_after {
            format!("refunded in full: {reason}")
        } else {
            format!(
                "partial refund of {}: {reason}",
                Money::from_cents(refund_amount_cents)
            )
        };
        sqlx::query(
            r#"
            UPDATE payments
            SET status = ?2,
                note = COALESCE(note || '; ', '') || ?3,
                updated_at = ?4
            WHERE id = ?1
            "#,
        )
        .bind(&original.id)
        .bind(if full_after {
            PaymentStatus::Refunded
        } else {
            original.status
        })
        .bind(&audit_note)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            payment_id = %payment_id,
            refund_id = %refund.id,
            amount = %Money::from_cents(refund_amount_cents),
            full = full_after,
            "Refund recorded"
        );
        Ok(refund)
    }

    /// Gets a payment by ID.
    pub async fn get(&self, id: &str) -> DbResult<Option<Payment>> {
        let payment = sqlx::query_as::<_, Payment>(
            r#"
            SELECT id, order_id, customer_id, method, status,
                   amount_cents, transaction_id, refund_of, note,
                   created_at, updated_at
            FROM payments
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(payment)
    }

    /// Gets all payment rows for an order, oldest first. Refund rows
    /// appear alongside the payments they reference.
    pub async fn list_for_order(&self, order_id: &str) -> DbResult<Vec<Payment>> {
        let payments = sqlx::query_as::<_, Payment>(
            r#"
            SELECT id, order_id, customer_id, method, status,
                   amount_cents, transaction_id, refund_of, note,
                   created_at, updated_at
            FROM payments
            WHERE order_id = ?1
            ORDER BY created_at
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(payments)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn insert(&self, payment: &Payment) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO payments (
                id, order_id, customer_id, method, status,
                amount_cents, transaction_id, refund_of, note,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&payment.id)
        .bind(&payment.order_id)
        .bind(&payment.customer_id)
        .bind(&payment.method)
        .bind(payment.status)
        .bind(payment.amount_cents)
        .bind(&payment.transaction_id)
        .bind(&payment.refund_of)
        .bind(&payment.note)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Inserts with a generated transaction id, retrying with a suffix
    /// when the uniqueness constraint objects.
    async fn insert_with_generated_txn_id(&self, payment: &mut Payment) -> DbResult<()> {
        for attempt in 0..TXN_ID_ATTEMPTS {
            payment.transaction_id = generate_txn_id(attempt);

            match self.insert(payment).await {
                Ok(()) => return Ok(()),
                Err(DbError::UniqueViolation { field, .. })
                    if field.contains("transaction_id") =>
                {
                    debug!(attempt, "Generated transaction id collided, retrying");
                    continue;
                }
                Err(other) => return Err(other),
            }
        }

        Err(DbError::Internal(
            "could not generate a unique transaction id".to_string(),
        ))
    }
}

/// Generates a transaction reference. Attempts past the first get a
/// numeric suffix.
fn generate_txn_id(attempt: usize) -> String {
    let base = format!("TXN-{}", Uuid::new_v4());
    if attempt == 0 {
        base
    } else {
        format!("{base}-{attempt}")
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
