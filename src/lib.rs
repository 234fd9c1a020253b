//! # DualPilot Connect Library
//!
//! This library provides the core functionality for the DualPilot connect
//! service: the Google Search Console OAuth connection flow, the connection
//! record store, and the tracking-snippet verification beacon.

pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod repositories;
pub mod search_console;
pub mod server;
pub mod telemetry;
pub use migration;
