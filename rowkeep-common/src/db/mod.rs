//! Database initialization, settings and migrations

pub mod init;
pub mod migrations;

pub use init::*;
pub use migrations::*;
