//! LOADBOARD: freight marketplace core.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod error;
pub mod types;
pub mod lifecycle;
pub mod bidding;
pub mod eligibility;
pub mod marketplace;
pub mod storage;
pub mod api;
