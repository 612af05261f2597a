//! Errors raised by configuration loading, database bootstrap and
//! timestamp decoding

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file unreadable or malformed
    #[error("Configuration error: {0}")]
    Config(String),

    /// A stored timestamp is not RFC 3339 text
    #[error("Invalid stored timestamp '{value}': {reason}")]
    Timestamp { value: String, reason: String },
}
