//! Relay Common - Shared configuration, errors, and logging for the GraphRAG relay.
//!
//! This crate provides:
//! - Configuration types and loading (file, `.env`, environment)
//! - Configuration validation
//! - Error types and handling utilities
//! - Logging setup

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;
pub mod validation;

pub use config::{
    BedrockConfig, Config, Neo4jConfig, NetworkConfig, ObservabilityConfig, SecretsConfig,
    UploadsConfig,
};
pub use error::{Error, Result, ResultExt};
pub use validation::{Validate, ValidationError, ValidationResult};
