//! Seeds the database with demo catalog data for local runs.
//!
//! ```sh
//! BINDERY_DATABASE_PATH=bindery.db cargo run -p bindery-db --bin seed
//! ```

use chrono::Utc;
use uuid::Uuid;

use bindery_core::types::Book;
use bindery_db::{Database, DbConfig};

const DEMO_BOOKS: &[(&str, &str, i64, i64)] = &[
    ("The Master and Margarita", "Mikhail Bulgakov", 1850, 12),
    ("Pale Fire", "Vladimir Nabokov", 1650, 7),
    ("Stoner", "John Williams", 1500, 5),
    ("Austerlitz", "W. G. Sebald", 1700, 3),
    ("The Trial", "Franz Kafka", 1200, 0), // pre-order candidate
    ("Dubliners", "James Joyce", 1100, 20),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::var("BINDERY_DATABASE_PATH").unwrap_or_else(|_| "bindery.db".to_string());
    let db = Database::new(DbConfig::new(&path)).await?;

    let catalog = db.catalog();
    let now = Utc::now();

    for (title, author, price_cents, stock) in DEMO_BOOKS {
        let book = Book {
            id: Uuid::new_v4().to_string(),
            title: (*title).to_string(),
            author: (*author).to_string(),
            price_cents: *price_cents,
            stock: *stock,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        catalog.insert(&book).await?;
        println!("seeded {:>8} x{:<3} {}", book.price_cents, book.stock, book.title);
    }

    println!("{} books seeded into {}", DEMO_BOOKS.len(), path);
    Ok(())
}
