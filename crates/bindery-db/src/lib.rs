//! # bindery-db: Database Layer for bindery
//!
//! SQLite storage for the order-fulfillment core, built on sqlx.
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - One repository per aggregate, plus the checkout
//!   coordinator that owns the multi-entity transaction
//!
//! ## Usage
//!
//! ```rust,ignore
//! use bindery_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("bindery.db")).await?;
//! let view = db.cart().list("customer-id").await?;
//! ```
//!
//! Every query is parameterized with `.bind()`; no user input is ever
//! interpolated into SQL text.

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

pub use error::DbError;
pub use pool::{Database, DbConfig};

pub use repository::cart::{CartRepository, CartView};
pub use repository::catalog::CatalogRepository;
pub use repository::checkout::{CheckoutCoordinator, CheckoutReceipt, CheckoutRequest};
pub use repository::inventory::{InventoryRepository, StockRequest};
pub use repository::order::OrderRepository;
pub use repository::outbox::NotificationOutboxRepository;
pub use repository::payment::PaymentRepository;
pub use repository::preorder::PreOrderRepository;
