//! # Catalog Repository
//!
//! Read access to book records. The catalog itself is managed by an
//! external collaborator; this core reads id, title, price, and stock.
//! Stock is mutated exclusively through the inventory ledger
//! ([`crate::repository::inventory`]), never here.

use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use bindery_core::types::Book;

/// Repository for catalog book lookups.
#[derive(Debug, Clone)]
pub struct CatalogRepository {
    pool: SqlitePool,
}

impl CatalogRepository {
    /// Creates a new CatalogRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CatalogRepository { pool }
    }

    /// Gets a book by its ID.
    ///
    /// ## Returns
    /// * `Ok(Some(Book))` - book found
    /// * `Ok(None)` - no such book
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Book>> {
        let book = sqlx::query_as::<_, Book>(
            r#"
            SELECT id, title, author, price_cents, stock, is_active,
                   created_at, updated_at
            FROM books
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(book)
    }

    /// Gets an active book by ID, or a NotFound error.
    ///
    /// Inactive books are invisible to the fulfillment path.
    pub async fn get_active(&self, id: &str) -> DbResult<Book> {
        let book = sqlx::query_as::<_, Book>(
            r#"
            SELECT id, title, author, price_cents, stock, is_active,
                   created_at, updated_at
            FROM books
            WHERE id = ?1 AND is_active = 1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        book.ok_or_else(|| DbError::not_found("Book", id))
    }

    /// Lists active books, sorted by title.
    pub async fn list_active(&self, limit: u32) -> DbResult<Vec<Book>> {
        let books = sqlx::query_as::<_, Book>(
            r#"
            SELECT id, title, author, price_cents, stock, is_active,
                   created_at, updated_at
            FROM books
            WHERE is_active = 1
            ORDER BY title
            LIMIT ?1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(books)
    }

    /// Inserts a book record.
    ///
    /// Used by the seed binary and tests; in production the catalog
    /// collaborator owns this table.
    pub async fn insert(&self, book: &Book) -> DbResult<()> {
        debug!(id = %book.id, title = %book.title, "Inserting book");

        sqlx::query(
            r#"
            INSERT INTO books (
                id, title, author, price_cents, stock, is_active,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&book.id)
        .bind(&book.title)
        .bind(&book.author)
        .bind(book.price_cents)
        .bind(book.stock)
        .bind(book.is_active)
        .bind(book.created_at)
        .bind(book.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Counts active books (for diagnostics).
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM books WHERE is_active = 1")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
