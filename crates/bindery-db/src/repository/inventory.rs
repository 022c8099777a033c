//! # Inventory Ledger
//!
//! The single authority for stock counts. Everything else treats
//! `books.stock` as read-only.
//!
//! ## Reservation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  reserve_with(tx, lines)             runs inside the caller's tx        │
//! │                                                                         │
//! │  for each (book_id, qty):                                              │
//! │      UPDATE books SET stock = stock - qty                              │
//! │      WHERE id = book_id AND stock >= qty      ← check-and-decrement    │
//! │                                                                         │
//! │  any line affected 0 rows?                                             │
//! │      collect every short title ──► Err(InsufficientStock)              │
//! │      caller drops the transaction ──► all decrements roll back         │
//! │                                                                         │
//! │  SQLite serializes writers, so two checkouts racing the last unit      │
//! │  cannot both pass the `stock >= qty` check.                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! There is no release operation. An unused reservation disappears with
//! the rolled-back transaction that made it.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use bindery_core::error::{CoreError, ValidationError};
use bindery_core::types::StockShortage;

/// One line of a reservation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockRequest {
    pub book_id: String,
    pub quantity: i64,
}

/// Repository for stock mutations.
#[derive(Debug, Clone)]
pub struct InventoryRepository {
    pool: SqlitePool,
}

impl InventoryRepository {
    /// Creates a new InventoryRepository.
    pub fn new(pool: SqlitePool) -> Self {
        InventoryRepository { pool }
    }

    /// Reserves stock for every request as one atomic unit, inside the
    /// caller's transaction.
    ///
    /// Either every line's conditional decrement succeeds, or the
    /// function returns `InsufficientStock` naming every short title and
    /// the caller rolls back. Selling down to exactly zero is allowed.
    ///
    /// ## Errors
    /// * `CoreError::InsufficientStock` - one or more lines short
    /// * `CoreError::BookNotFound` - a book id that matches no active row
    pub async fn reserve_with(
        conn: &mut SqliteConnection,
        requests: &[StockRequest],
    ) -> DbResult<()> {
        let now = Utc::now();
        let mut failed: Vec<&StockRequest> = Vec::new();

        for req in requests {
            if req.quantity <= 0 {
                return Err(DbError::Core(
                    ValidationError::MustBePositive {
                        field: "quantity".to_string(),
                    }
                    .into(),
                ));
            }

            let result = sqlx::query(
                r#"
                UPDATE books
                SET stock = stock - ?2, updated_at = ?3
                WHERE id = ?1 AND is_active = 1 AND stock >= ?2
                "#,
            )
            .bind(&req.book_id)
            .bind(req.quantity)
            .bind(now)
            .execute(&mut *conn)
            .await?;

            if result.rows_affected() == 0 {
                failed.push(req);
            }
        }

        if failed.is_empty() {
            debug!(lines = requests.len(), "Stock reserved");
            return Ok(());
        }

        // Name every short title for the caller's error message. The
        // decrements already applied are discarded with the transaction.
        let mut shortages = Vec::with_capacity(failed.len());
        for req in failed {
            let row: Option<(String, i64)> =
                sqlx::query_as("SELECT title, stock FROM books WHERE id = ?1 AND is_active = 1")
                    .bind(&req.book_id)
                    .fetch_optional(&mut *conn)
                    .await?;

            match row {
                Some((title, stock)) => shortages.push(StockShortage {
                    book_id: req.book_id.clone(),
                    title,
                    available: stock,
                    requested: req.quantity,
                }),
                None => {
                    return Err(DbError::Core(CoreError::BookNotFound(req.book_id.clone())))
                }
            }
        }

        Err(DbError::Core(CoreError::InsufficientStock { shortages }))
    }

    /// Convenience wrapper: reserves in its own transaction.
    ///
    /// Used by callers that reserve nothing else; checkout goes through
    /// `reserve_with` on its own transaction instead.
    pub async fn reserve(&self, requests: &[StockRequest]) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        Self::reserve_with(&mut tx, requests).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Adds received units back to stock (fulfillment side).
    pub async fn restock(&self, book_id: &str, quantity: i64) -> DbResult<()> {
        if quantity <= 0 {
            return Err(DbError::Core(
                ValidationError::MustBePositive {
                    field: "quantity".to_string(),
                }
                .into(),
            ));
        }

        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE books
            SET stock = stock + ?2, updated_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(book_id)
        .bind(quantity)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Book", book_id));
        }

        debug!(book_id = %book_id, quantity = %quantity, "Restocked");
        Ok(())
    }

    /// Current stock for a book (diagnostics and tests).
    pub async fn stock_of(&self, book_id: &str) -> DbResult<i64> {
        let stock: Option<i64> = sqlx::query_scalar("SELECT stock FROM books WHERE id = ?1")
            .bind(book_id)
            .fetch_optional(&self.pool)
            .await?;

        stock.ok_or_else(|| DbError::not_found("Book", book_id))
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
    async fn test_reserve_sell_to_zero() {
        let db = test_db().await;
        let book = seed_book(&db, "Stoner", 1500, 3).await;

        db.inventory()
            .reserve(&[StockRequest {
                book_id: book.id.clone(),
                quantity: 3,
            }])
            .await
            .unwrap();

        assert_eq!(db.inventory().stock_of(&book.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reserve_shortage_names_all_short_titles() {
        let db = test_db().await;
        let plenty = seed_book(&db, "Plenty", 1000, 10).await;
        let none = seed_book(&db, "None Left", 1000, 0).await;
        let few = seed_book(&db, "A Few", 1000, 2).await;

        let err = db
            .inventory()
            .reserve(&[
                StockRequest {
                    book_id: plenty.id.clone(),
                    quantity: 1,
                },
                StockRequest {
                    book_id: none.id.clone(),
                    quantity: 1,
                },
                StockRequest {
                    book_id: few.id.clone(),
                    quantity: 5,
                },
            ])
            .await
            .unwrap_err();

        match err {
            DbError::Core(CoreError::InsufficientStock { shortages }) => {
                assert_eq!(shortages.len(), 2);
                assert!(shortages.iter().any(|s| s.title == "None Left"));
                assert!(shortages.iter().any(|s| s.title == "A Few" && s.available == 2));
            }
            other => panic!("expected InsufficientStock, got {other:?}"),
        }

        // The passing line's decrement rolled back with the transaction.
        assert_eq!(db.inventory().stock_of(&plenty.id).await.unwrap(), 10);
        assert_eq!(db.inventory().stock_of(&few.id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_reserve_unknown_book() {
        let db = test_db().await;

        let err = db
            .inventory()
            .reserve(&[StockRequest {
                book_id: "ghost".to_string(),
                quantity: 1,
            }])
            .await
            .unwrap_err();

        assert!(matches!(err, DbError::Core(CoreError::BookNotFound(_))));
    }

    #[tokio::test]
    async fn test_restock() {
        let db = test_db().await;
        let book = seed_book(&db, "Restocked", 900, 0).await;

        db.inventory().restock(&book.id, 7).await.unwrap();
        assert_eq!(db.inventory().stock_of(&book.id).await.unwrap(), 7);

        assert!(db.inventory().restock(&book.id, 0).await.is_err());
        assert!(db.inventory().restock("ghost", 1).await.is_err());
    }
}
