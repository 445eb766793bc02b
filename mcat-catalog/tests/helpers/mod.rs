//! Test Helper Utilities
//!
//! Shared fakes and fixtures for mcat-catalog integration tests

#![allow(dead_code)]

pub mod fakes;
pub mod fixtures;

pub use fakes::{FakeAnalysisClient, FlakyFileSystem, GatedFileSystem};
pub use fixtures::{
    cache_files, open_store, seed_quota, seed_quota_state, seed_snapshot, write_media, TestCatalog,
};
