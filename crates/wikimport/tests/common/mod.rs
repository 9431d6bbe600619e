//! Shared test utilities for wikimport integration tests.
//!
//! This module provides:
//! - `TestHarness` for isolated import runs over a temp storage root
//! - In-memory fakes for the wiki, the search indexer and failing storage

pub mod fakes;
pub mod harness;

pub use fakes::*;
pub use harness::{TestHarness, PROJECT_ID, SOURCE_ROOT};
