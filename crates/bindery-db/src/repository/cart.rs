//! # Cart Repository
//!
//! Per-customer cart lines: add, update quantity, remove, save for
//! later. Every statement filters on `customer_id`, so one customer can
//! never read or mutate another's lines; ids that fail the ownership
//! predicate simply match nothing.
//!
//! Adding a book with zero stock creates a pre-order record and flags
//! the line; the pre-order row is the single source of truth for the
//! deferred state, the cart line only references it.

use chrono::Utc;
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::repository::new_id;
use crate::repository::preorder::PreOrderRepository;
use bindery_core::error::{CoreError, ValidationError};
use bindery_core::types::{Book, CartLine, PreOrder, PreOrderStatus};
use bindery_core::validation::validate_quantity;
use bindery_core::MAX_CART_LINES;

/// A customer's cart, split into active and saved-for-later lines.
#[derive(Debug, Clone, Serialize)]
pub struct CartView {
    pub active: Vec<CartLine>,
    pub saved: Vec<CartLine>,
}

/// Repository for cart operations.
#[derive(Debug, Clone)]
pub struct CartRepository {
    pool: SqlitePool,
}

impl CartRepository {
    /// Creates a new CartRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CartRepository { pool }
    }

    /// Adds a book to the customer's cart.
    ///
    /// ## Behavior
    /// - Book already in the cart: quantities are merged
    /// - Book in stock: a regular line is created
    /// - Book out of stock: a pending pre-order is created and the line
    ///   references it; pre-orders are never created while stock exists
    pub async fn add(&self, customer_id: &str, book_id: &str, quantity: i64) -> DbResult<CartLine> {
        validate_quantity(quantity).map_err(CoreError::from)?;

        let book = self.get_active_book(book_id).await?;

        let mut tx = self.pool.begin().await?;

        let existing = Self::fetch_line_for_book(&mut tx, customer_id, book_id).await?;

        let line = match existing {
            Some(line) => {
                let new_qty = line.quantity + quantity;
                validate_quantity(new_qty).map_err(CoreError::from)?;
                Self::update_quantity_with(&mut tx, &line, new_qty).await?
            }
            None => {
                let count: i64 =
                    sqlx::query_scalar("SELECT COUNT(*) FROM cart_lines WHERE customer_id = ?1")
                        .bind(customer_id)
                        .fetch_one(&mut *tx)
                        .await?;
                if count as usize >= MAX_CART_LINES {
                    return Err(DbError::Core(
                        ValidationError::OutOfRange {
                            field: "cart lines".to_string(),
                            min: 0,
                            max: MAX_CART_LINES as i64,
                        }
                        .into(),
                    ));
                }

                Self::insert_line_with(&mut tx, customer_id, &book, quantity).await?
            }
        };

        tx.commit().await?;

        debug!(
            customer_id = %customer_id,
            book_id = %book_id,
            quantity = %line.quantity,
            is_pre_order = %line.is_pre_order,
            "Cart line upserted"
        );
        Ok(line)
    }

    /// Sets the quantity of a line the customer owns.
    ///
    /// Quantity is validated, never silently clamped; zero is rejected
    /// (removal is an explicit operation).
    pub async fn set_quantity(
        &self,
        customer_id: &str,
        line_id: &str,
        quantity: i64,
    ) -> DbResult<CartLine> {
        validate_quantity(quantity).map_err(CoreError::from)?;

        let mut tx = self.pool.begin().await?;

        let line = Self::fetch_owned(&mut tx, customer_id, line_id)
            .await?
            .ok_or_else(|| DbError::not_found("Cart line", line_id))?;

        let updated = Self::update_quantity_with(&mut tx, &line, quantity).await?;

        tx.commit().await?;
        Ok(updated)
    }

    /// Removes the given lines, ignoring ids not owned by the customer.
    ///
    /// ## Returns
    /// The number of lines actually deleted.
    pub async fn remove(&self, customer_id: &str, line_ids: &[String]) -> DbResult<u64> {
        let mut tx = self.pool.begin().await?;
        let mut deleted = 0u64;

        for line_id in line_ids {
            let result = sqlx::query("DELETE FROM cart_lines WHERE id = ?1 AND customer_id = ?2")
                .bind(line_id)
                .bind(customer_id)
                .execute(&mut *tx)
                .await?;
            deleted += result.rows_affected();
        }

        tx.commit().await?;

        debug!(customer_id = %customer_id, requested = line_ids.len(), deleted, "Cart lines removed");
        Ok(deleted)
    }

    /// Moves a line between the active cart and the saved-for-later
    /// list.
    pub async fn toggle_save(&self, customer_id: &str, line_id: &str, saved: bool) -> DbResult<()> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE cart_lines
            SET saved = ?3, updated_at = ?4
            WHERE id = ?1 AND customer_id = ?2
            "#,
        )
        .bind(line_id)
        .bind(customer_id)
        .bind(saved)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Cart line", line_id));
        }

        Ok(())
    }

    /// Lists the customer's cart, split into active and saved lines.
    /// There is no cross-customer listing.
    pub async fn list(&self, customer_id: &str) -> DbResult<CartView> {
        let lines = sqlx::query_as::<_, CartLine>(
            r#"
            SELECT id, customer_id, book_id, quantity, saved, is_pre_order,
                   pre_order_id, created_at, updated_at
            FROM cart_lines
            WHERE customer_id = ?1
            ORDER BY created_at
            "#,
        )
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await?;

        let (saved, active): (Vec<CartLine>, Vec<CartLine>) =
            lines.into_iter().partition(|line| line.saved);

        Ok(CartView { active, saved })
    }

    /// Explicitly converts a cart line into a pre-order.
    ///
    /// Only legal while the book's stock is zero; with stock on hand the
    /// shopper buys normally. Converting an already-converted line
    /// returns the existing pre-order.
    pub async fn convert_to_pre_order(
        &self,
        customer_id: &str,
        line_id: &str,
    ) -> DbResult<PreOrder> {
        let mut tx = self.pool.begin().await?;

        let line = Self::fetch_owned(&mut tx, customer_id, line_id)
            .await?
            .ok_or_else(|| DbError::not_found("Cart line", line_id))?;

        if let Some(pre_order_id) = &line.pre_order_id {
            let existing = PreOrderRepository::fetch_with(&mut tx, pre_order_id)
                .await?
                .ok_or_else(|| DbError::not_found("Pre-order", pre_order_id))?;
            tx.commit().await?;
            return Ok(existing);
        }

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
        let book = book.ok_or_else(|| DbError::not_found("Book", &line.book_id))?;

        if !book.is_out_of_stock() {
            return Err(DbError::Core(CoreError::invalid_transition(
                "Cart line",
                line_id,
                "in stock",
                "convert to pre-order",
            )));
        }

        let pre_order = Self::make_pre_order(customer_id, &book, line.quantity);
        PreOrderRepository::insert_with(&mut tx, &pre_order).await?;

        let now = Utc::now();
        sqlx::query(
            r#"
            UPDATE cart_lines
            SET is_pre_order = 1, pre_order_id = ?2, updated_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(&line.id)
        .bind(&pre_order.id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(line_id = %line_id, pre_order_id = %pre_order.id, "Cart line converted to pre-order");
        Ok(pre_order)
    }

    /// Deletes any cart lines that reference the given pre-order.
    /// Called when a pre-order is fulfilled or cancelled.
    pub(crate) async fn delete_for_pre_order_with(
        conn: &mut SqliteConnection,
        pre_order_id: &str,
    ) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM cart_lines WHERE pre_order_id = ?1")
            .bind(pre_order_id)
            .execute(conn)
            .await?;
        Ok(result.rows_affected())
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn get_active_book(&self, book_id: &str) -> DbResult<Book> {
        let book: Option<Book> = sqlx::query_as(
            r#"
            SELECT id, title, author, price_cents, stock, is_active,
                   created_at, updated_at
            FROM books
            WHERE id = ?1 AND is_active = 1
            "#,
        )
        .bind(book_id)
        .fetch_optional(&self.pool)
        .await?;

        book.ok_or_else(|| DbError::not_found("Book", book_id))
    }

    async fn fetch_owned(
        conn: &mut SqliteConnection,
        customer_id: &str,
        line_id: &str,
    ) -> DbResult<Option<CartLine>> {
        let line = sqlx::query_as::<_, CartLine>(
            r#"
            SELECT id, customer_id, book_id, quantity, saved, is_pre_order,
                   pre_order_id, created_at, updated_at
            FROM cart_lines
            WHERE id = ?1 AND customer_id = ?2
            "#,
        )
        .bind(line_id)
        .bind(customer_id)
        .fetch_optional(conn)
        .await?;

        Ok(line)
    }

    async fn fetch_line_for_book(
        conn: &mut SqliteConnection,
        customer_id: &str,
        book_id: &str,
    ) -> DbResult<Option<CartLine>> {
        let line = sqlx::query_as::<_, CartLine>(
            r#"
            SELECT id, customer_id, book_id, quantity, saved, is_pre_order,
                   pre_order_id, created_at, updated_at
            FROM cart_lines
            WHERE customer_id = ?1 AND book_id = ?2
            "#,
        )
        .bind(customer_id)
        .bind(book_id)
        .fetch_optional(conn)
        .await?;

        Ok(line)
    }

    /// Updates a line's quantity; a pending linked pre-order tracks the
    /// change so the two never disagree.
    async fn update_quantity_with(
        conn: &mut SqliteConnection,
        line: &CartLine,
        quantity: i64,
    ) -> DbResult<CartLine> {
        let now = Utc::now();

        sqlx::query("UPDATE cart_lines SET quantity = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(&line.id)
            .bind(quantity)
            .bind(now)
            .execute(&mut *conn)
            .await?;

        if let Some(pre_order_id) = &line.pre_order_id {
            sqlx::query(
                r#"
                UPDATE pre_orders
                SET quantity = ?2, total_cents = unit_price_cents * ?2, updated_at = ?3
                WHERE id = ?1 AND status = ?4
                "#,
            )
            .bind(pre_order_id)
            .bind(quantity)
            .bind(now)
            .bind(PreOrderStatus::Pending)
            .execute(&mut *conn)
            .await?;
        }

        let mut updated = line.clone();
        updated.quantity = quantity;
        updated.updated_at = now;
        Ok(updated)
    }

    async fn insert_line_with(
        conn: &mut SqliteConnection,
        customer_id: &str,
        book: &Book,
        quantity: i64,
    ) -> DbResult<CartLine> {
        let now = Utc::now();

        // Zero stock means the line starts life as a pre-order.
        let pre_order = if book.is_out_of_stock() {
            let pre_order = Self::make_pre_order(customer_id, book, quantity);
            PreOrderRepository::insert_with(&mut *conn, &pre_order).await?;
            Some(pre_order)
        } else {
            None
        };

        let line = CartLine {
            id: new_id(),
            customer_id: customer_id.to_string(),
            book_id: book.id.clone(),
            quantity,
            saved: false,
            is_pre_order: pre_order.is_some(),
            pre_order_id: pre_order.as_ref().map(|p| p.id.clone()),
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO cart_lines (
                id, customer_id, book_id, quantity, saved, is_pre_order,
                pre_order_id, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&line.id)
        .bind(&line.customer_id)
        .bind(&line.book_id)
        .bind(line.quantity)
        .bind(line.saved)
        .bind(line.is_pre_order)
        .bind(&line.pre_order_id)
        .bind(line.created_at)
        .bind(line.updated_at)
        .execute(conn)
        .await?;

        Ok(line)
    }

    fn make_pre_order(customer_id: &str, book: &Book, quantity: i64) -> PreOrder {
        let now = Utc::now();
        PreOrder {
            id: new_id(),
            customer_id: customer_id.to_string(),
            book_id: book.id.clone(),
            quantity,
            unit_price_cents: book.price_cents,
            total_cents: book.price_cents * quantity,
            status: PreOrderStatus::Pending,
            expected_delivery: None,
            created_at: now,
            updated_at: now,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::testing::{seed_book, test_db};

    #[tokio::test]
    async fn test_add_creates_line() {
        let db = test_db().await;
        let book = seed_book(&db, "Moby-Dick", 2000, 5).await;

        let line = db.cart().add("cust-1", &book.id, 2).await.unwrap();
        assert_eq!(line.quantity, 2);
        assert!(!line.is_pre_order);
        assert!(line.pre_order_id.is_none());
    }

    #[tokio::test]
    async fn test_add_same_book_merges_quantity() {
        let db = test_db().await;
        let book = seed_book(&db, "Moby-Dick", 2000, 5).await;

        db.cart().add("cust-1", &book.id, 2).await.unwrap();
        let line = db.cart().add("cust-1", &book.id, 3).await.unwrap();

        assert_eq!(line.quantity, 5);
        let view = db.cart().list("cust-1").await.unwrap();
        assert_eq!(view.active.len(), 1);
    }

    #[tokio::test]
    async fn test_add_rejects_bad_quantity() {
        let db = test_db().await;
        let book = seed_book(&db, "Moby-Dick", 2000, 5).await;

        assert!(db.cart().add("cust-1", &book.id, 0).await.is_err());
        assert!(db.cart().add("cust-1", &book.id, -2).await.is_err());
        assert!(db.cart().add("cust-1", &book.id, 1000).await.is_err());
    }

    #[tokio::test]
    async fn test_add_out_of_stock_creates_pre_order() {
        let db = test_db().await;
        let book = seed_book(&db, "Not Yet Published", 2400, 0).await;

        let line = db.cart().add("cust-1", &book.id, 1).await.unwrap();
        assert!(line.is_pre_order);

        let pre_order_id = line.pre_order_id.expect("pre-order reference");
        let pre_order = db.pre_orders().get(&pre_order_id).await.unwrap().unwrap();
        assert_eq!(pre_order.status, PreOrderStatus::Pending);
        assert_eq!(pre_order.unit_price_cents, 2400);
        assert_eq!(pre_order.total_cents, 2400);
    }

    #[tokio::test]
    async fn test_set_quantity() {
        let db = test_db().await;
        let book = seed_book(&db, "Moby-Dick", 2000, 5).await;
        let line = db.cart().add("cust-1", &book.id, 1).await.unwrap();

        let updated = db.cart().set_quantity("cust-1", &line.id, 4).await.unwrap();
        assert_eq!(updated.quantity, 4);

        // Zero is rejected, not coerced
        assert!(db.cart().set_quantity("cust-1", &line.id, 0).await.is_err());
        // Another customer cannot touch the line
        assert!(db.cart().set_quantity("cust-2", &line.id, 2).await.is_err());
    }

    #[tokio::test]
    async fn test_remove_ignores_foreign_ids() {
        let db = test_db().await;
        let book_a = seed_book(&db, "Book A", 1000, 5).await;
        let book_b = seed_book(&db, "Book B", 1000, 5).await;

        let mine = db.cart().add("cust-1", &book_a.id, 1).await.unwrap();
        let theirs = db.cart().add("cust-2", &book_b.id, 1).await.unwrap();

        let deleted = db
            .cart()
            .remove("cust-1", &[mine.id.clone(), theirs.id.clone()])
            .await
            .unwrap();

        // Only the owned line went away; the foreign id matched nothing.
        assert_eq!(deleted, 1);
        assert_eq!(db.cart().list("cust-2").await.unwrap().active.len(), 1);
    }

    #[tokio::test]
    async fn test_toggle_save_splits_view() {
        let db = test_db().await;
        let book_a = seed_book(&db, "Book A", 1000, 5).await;
        let book_b = seed_book(&db, "Book B", 1000, 5).await;

        let line_a = db.cart().add("cust-1", &book_a.id, 1).await.unwrap();
        db.cart().add("cust-1", &book_b.id, 1).await.unwrap();

        db.cart().toggle_save("cust-1", &line_a.id, true).await.unwrap();

        let view = db.cart().list("cust-1").await.unwrap();
        assert_eq!(view.active.len(), 1);
        assert_eq!(view.saved.len(), 1);
        assert_eq!(view.saved[0].id, line_a.id);

        db.cart().toggle_save("cust-1", &line_a.id, false).await.unwrap();
        let view = db.cart().list("cust-1").await.unwrap();
        assert_eq!(view.active.len(), 2);
        assert!(view.saved.is_empty());
    }

    #[tokio::test]
    async fn test_convert_requires_zero_stock() {
        let db = test_db().await;
        let in_stock = seed_book(&db, "In Stock", 1000, 3).await;
        let line = db.cart().add("cust-1", &in_stock.id, 1).await.unwrap();

        let err = db
            .cart()
            .convert_to_pre_order("cust-1", &line.id)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Core(CoreError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_convert_is_idempotent() {
        let db = test_db().await;
        let gone = seed_book(&db, "Sold Out", 1000, 0).await;
        let line = db.cart().add("cust-1", &gone.id, 1).await.unwrap();

        let first = db
            .cart()
            .convert_to_pre_order("cust-1", &line.id)
            .await
            .unwrap();
        let second = db
            .cart()
            .convert_to_pre_order("cust-1", &line.id)
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
    }
}
