//! Tambayan relay - CORS-friendly streaming gateway for IPTV players
//!
//! This library crate exposes the core functionality for integration testing.

pub mod config;
pub mod error;
pub mod license;
pub mod pldt;
pub mod policy;
pub mod relay;
pub mod server;
