//! Domain-level building blocks shared across the storage and monitor crates:
//! the transaction model, address normalization, persistence contracts,
//! configuration and telemetry.

pub mod config;
pub mod model;
pub mod services;
pub mod storage;

pub use services::*;
pub use storage::*;
