//! Shared test utilities for the contract testing crates.
//!
//! This crate provides:
//! - Proptest generators for participants, versions and JSON bodies
//! - Mock provider, state setup, clock and VCS implementations
//! - The users contract used across the end-to-end scenarios

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod mocks;

pub use generators::*;
