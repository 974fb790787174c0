//! SQLite backend for the KalasKoll store traits.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Party deletion relies on SQLite
//! foreign-key cascades, so every connection runs with `foreign_keys = ON`.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
