//! hookgate - signature verification gate for webhook-style callbacks
//!
//! This crate provides:
//! - Shared-secret (HMAC-SHA256) and public-key signature verification
//! - A remote key provider with timeout and optional caching
//! - A framework-independent verification gate with bypass and auto-reject policy
//! - An axum server that installs the gate in front of callback handlers

pub mod cli;
pub mod config;
pub mod paths;
pub mod server;
pub mod signature;

pub use config::Config;
