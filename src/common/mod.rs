//! Common types and utilities shared across the crate.
//!
//! This module contains fundamental primitives used throughout the codebase:
//! - Configuration constants and [`config::CacheConfig`]
//! - Error types
//! - Identifiers (Epoch, PageNo)

pub mod config;
pub mod error;
mod epoch_id;
mod page_no;

pub use epoch_id::Epoch;
pub use error::{Error, Result};
pub use page_no::PageNo;
