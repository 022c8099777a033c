//! # Order Repository
//!
//! Persistence for orders and their lines. Orders are created exactly
//! once, by the checkout coordinator or by pre-order fulfillment, always
//! inside those components' transactions; this repository only exposes
//! the row operations and read access.
//!
//! Order lines are immutable once written. `unit_price_cents` is the
//! price-at-purchase snapshot and is never recomputed from the catalog.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use bindery_core::error::CoreError;
use bindery_core::types::{Order, OrderLine, OrderStatus};

/// Repository for order database operations.
#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    /// Creates a new OrderRepository.
    pub fn new(pool: SqlitePool) -> Self {
        OrderRepository { pool }
    }

    /// Inserts an order row inside the caller's transaction.
    pub(crate) async fn insert_with(conn: &mut SqliteConnection, order: &Order) -> DbResult<()> {
        debug!(id = %order.id, total = %order.total_cents, "Inserting order");

        sqlx::query(
            r#"
            INSERT INTO orders (
                id, customer_id,
                subtotal_cents, shipping_cents, tax_cents, discount_cents, total_cents,
                status, shipping_address, billing_address, contact_email,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(&order.id)
        .bind(&order.customer_id)
        .bind(order.subtotal_cents)
        .bind(order.shipping_cents)
        .bind(order.tax_cents)
        .bind(order.discount_cents)
        .bind(order.total_cents)
        .bind(order.status)
        .bind(&order.shipping_address)
        .bind(&order.billing_address)
        .bind(&order.contact_email)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(conn)
        .await?;

        Ok(())
    }

    /// Inserts an order line inside the caller's transaction.
    pub(crate) async fn insert_line_with(
        conn: &mut SqliteConnection,
        line: &OrderLine,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO order_lines (
                id, order_id, book_id, title_snapshot,
                quantity, unit_price_cents, subtotal_cents
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&line.id)
        .bind(&line.order_id)
        .bind(&line.book_id)
        .bind(&line.title_snapshot)
        .bind(line.quantity)
        .bind(line.unit_price_cents)
        .bind(line.subtotal_cents)
        .execute(conn)
        .await?;

        Ok(())
    }

    /// Gets an order by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Order>> {
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
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(order)
    }

    /// Gets an order owned by the given customer, or NotFound.
    ///
    /// Orders belonging to other customers are indistinguishable from
    /// absent ones.
    pub async fn get_owned(&self, customer_id: &str, id: &str) -> DbResult<Order> {
        let order = sqlx::query_as::<_, Order>(
            r#"
            SELECT id, customer_id,
                   subtotal_cents, shipping_cents, tax_cents, discount_cents, total_cents,
                   status, shipping_address, billing_address, contact_email,
                   created_at, updated_at
            FROM orders
            WHERE id = ?1 AND customer_id = ?2
            "#,
        )
        .bind(id)
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await?;

        order.ok_or_else(|| DbError::not_found("Order", id))
    }

    /// Gets all lines for an order.
    pub async fn get_lines(&self, order_id: &str) -> DbResult<Vec<OrderLine>> {
        let lines = sqlx::query_as::<_, OrderLine>(
            r#"
            SELECT id, order_id, book_id, title_snapshot,
                   quantity, unit_price_cents, subtotal_cents
            FROM order_lines
            WHERE order_id = ?1
            ORDER BY title_snapshot
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(lines)
    }

    /// Moves an order to a new status, forward only.
    ///
    /// ## Errors
    /// * `CoreError::InvalidTransition` - the move is not forward
    /// * `DbError::NotFound` - no such order
    pub async fn set_status(&self, id: &str, next: OrderStatus) -> DbResult<()> {
        let order = self
            .get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Order", id))?;

        if !order.status.can_transition_to(next) {
            return Err(DbError::Core(CoreError::invalid_transition(
                "Order",
                id,
                order.status.as_str(),
                "change status",
            )));
        }

        let now = Utc::now();
        // Guard on the status we read so a racing writer loses cleanly.
        let result = sqlx::query(
            "UPDATE orders SET status = ?2, updated_at = ?3 WHERE id = ?1 AND status = ?4",
        )
        .bind(id)
        .bind(next)
        .bind(now)
        .bind(order.status)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::TransactionFailed(format!(
                "order {id} changed status concurrently"
            )));
        }

        debug!(order_id = %id, status = %next, "Order status updated");
        Ok(())
    }

    /// Marks a pending order confirmed, leaving already-confirmed orders
    /// untouched. Called when its payment completes.
    pub(crate) async fn confirm_if_pending(&self, id: &str) -> DbResult<()> {
        let now = Utc::now();
        sqlx::query(
            "UPDATE orders SET status = ?2, updated_at = ?3 WHERE id = ?1 AND status = ?4",
        )
        .bind(id)
        .bind(OrderStatus::Confirmed)
        .bind(now)
        .bind(OrderStatus::Pending)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
