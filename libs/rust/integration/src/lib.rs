//! End-to-end tests for the contract testing crates live in `tests/`.

#![forbid(unsafe_code)]
