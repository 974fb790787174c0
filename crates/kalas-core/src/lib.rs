//! Core types and trait definitions for the KalasKoll allergy-data service.
//!
//! This crate is deliberately free of HTTP, database and cryptography
//! dependencies. It owns the domain vocabulary, the retention policy, and the
//! sweeper that applies it through the store traits.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod allergy;
pub mod error;
pub mod party;
pub mod retention;
pub mod store;

pub use error::{Error, Result};
