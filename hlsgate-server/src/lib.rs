//! hlsgate server library.
//!
//! Exposes the API surface for integration testing; the binary entrypoint
//! lives in `main.rs`.

pub mod api;
pub mod logging;
