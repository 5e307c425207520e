//! Infrastructure layer: configuration, logging, and process-level errors.

pub mod config;
pub mod error;
pub mod logging;
