//! # Rowkeep Common Library
//!
//! Shared code for the Rowkeep crates:
//! - Error type shared across crates
//! - Root folder and TOML configuration resolution
//! - Database initialization, default settings and schema migrations
//! - Timestamp helpers for the text-encoded columns

pub mod config;
pub mod db;
pub mod error;
pub mod time;

pub use error::{Error, Result};
