//! # mcat Common Library
//!
//! Shared code for the mcat workspace including:
//! - Error and result types
//! - Event types (CatalogEvent enum) and the EventBus
//! - Configuration loading and root folder resolution
//! - Utility functions (timestamps, ids)

pub mod config;
pub mod error;
pub mod events;
pub mod time;
pub mod uuid_utils;

pub use error::{Error, Result};
pub use events::{CatalogEvent, EventBus};
