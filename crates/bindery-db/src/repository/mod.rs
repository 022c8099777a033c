//! Repository implementations.
//!
//! One repository per aggregate. Each holds a clone of the shared
//! `SqlitePool`; operations that must be atomic across aggregates
//! (checkout, pre-order fulfillment) open a transaction and pass the
//! connection into `*_with` helpers on the other repositories.

pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod inventory;
pub mod order;
pub mod outbox;
pub mod payment;
pub mod preorder;

use uuid::Uuid;

/// Generates a new entity id (UUID v4 as a string).
pub(crate) fn new_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
pub(crate) mod testing {
    //! Shared helpers for repository tests.

    use chrono::Utc;

    use crate::pool::{Database, DbConfig};
    use bindery_core::types::Book;

    /// Creates a migrated in-memory database.
    pub async fn test_db() -> Database {
        Database::new(DbConfig::in_memory())
            .await
            .expect("in-memory database")
    }

    /// Inserts a book and returns it.
    pub async fn seed_book(db: &Database, title: &str, price_cents: i64, stock: i64) -> Book {
        let now = Utc::now();
        let book = Book {
            id: super::new_id(),
            title: title.to_string(),
            author: "Test Author".to_string(),
            price_cents,
            stock,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        db.catalog().insert(&book).await.expect("insert book");
        book
    }
}
