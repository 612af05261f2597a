//! rowkeep-store library - versioned tabular datasets with reviewed edits
//!
//! Datasets are uploaded as spreadsheets or delimited text and every version
//! is retained. End users propose field-level edits to single rows, with
//! supporting photos and documents; a reviewer approves or rejects each one.
//! Approval merges the change into the versioned store and moves new-row
//! media from its staging prefix to the row's permanent prefix.

pub mod config;
pub mod db;
pub mod error;
pub mod hub;
pub mod models;
pub mod parser;
pub mod services;
pub mod storage;

pub use error::{StoreError, StoreResult};
pub use hub::Hub;
