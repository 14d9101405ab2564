//! clic library
//!
//! This module exposes the cache store, the get-or-run orchestration and the
//! CLI layer for use by the binary and in integration tests.

pub mod app;
pub mod cache;
pub mod cli;
pub mod config;
pub mod exec;
pub mod runner;
