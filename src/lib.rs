//! SENTINEL — Unusual Options Activity Scanner
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod cache;
pub mod market;
pub mod ledger;
pub mod notify;
pub mod scan;
