//! Shared plumbing for the contract testing workspace.
//!
//! This crate provides centralized implementations for:
//! - Error types with transport/configuration classification
//! - HTTP client configuration and building
//! - Tracing subscriber initialisation

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod http;
pub mod tracing_config;

pub use error::PlatformError;
pub use http::{DEFAULT_USER_AGENT, HttpConfig, build_http_client};
pub use tracing_config::{TracingConfig, init_tracing};
