//! Integration Tests Entry Point
//!
//! This file serves as the entry point for integration tests.
//! Tests are organized by module:
//! - `api/` - UI bridge endpoint tests
//! - `common/` - Fakes and the test application

mod api;
mod common;

// Re-export common utilities for tests
pub use common::*;
