#![doc = include_str!("../README.md")]
#![deny(unused_crate_dependencies)]

mod cache;
mod config;
mod endpoint;
mod error;
mod transport;

// ============================================================================
// Public API
// ============================================================================

pub use config::{HttpTransportConfig, LIVE_BASE_URL, TEST_BASE_URL};
pub use transport::ReqwestTransport;

// Silence unused dev-dependency warnings
#[cfg(test)]
use axum as _;
#[cfg(test)]
use tempfile as _;
