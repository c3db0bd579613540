//! Core types and trait definitions for the Strata imaging catalog.
//!
//! This crate is deliberately free of filesystem and database dependencies.
//! It describes the entity hierarchy (participant → visit → session →
//! sequence → repetition → file), the provenance ledger, and the
//! [`store::CatalogStore`] abstraction implemented by storage backends.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod error;
pub mod file;
pub mod hierarchy;
pub mod provenance;
pub mod store;

pub use error::{Error, Result};
