//! Configuration validation for relay services.

use thiserror::Error;

use crate::config::{BedrockConfig, Config, Neo4jConfig, ObservabilityConfig, UploadsConfig};

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid port {port}: must be between 1 and 65535")]
    InvalidPort { port: u16, field: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trait for validatable configuration sections.
pub trait Validate {
    /// Validate this configuration section.
    fn validate(&self) -> ValidationResult<()>;
}

/// URI schemes the graph client knows how to reach.
pub const NEO4J_SCHEMES: &[&str] = &[
    "neo4j", "neo4j+s", "neo4j+ssc", "bolt", "bolt+s", "bolt+ssc", "http", "https",
];

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
const LOG_FORMATS: &[&str] = &["json", "pretty"];

impl Config {
    /// Validate the entire configuration.
    pub fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if self.port() == 0 {
            errors.push(ValidationError::InvalidPort {
                port: 0,
                field: "network.port".into(),
            });
        }

        if self.network.bind.trim().is_empty() {
            errors.push(ValidationError::MissingField {
                field: "network.bind".into(),
            });
        }

        if let Err(e) = self.neo4j.validate() {
            errors.push(e);
        }
        if let Err(e) = self.bedrock.validate() {
            errors.push(e);
        }
        if let Err(e) = self.uploads.validate() {
            errors.push(e);
        }
        if let Err(e) = self.observability.validate() {
            errors.push(e);
        }

        if errors.is_empty() {
            Ok(())
        } else if errors.len() == 1 {
            Err(errors.remove(0))
        } else {
            Err(ValidationError::Multiple(errors))
        }
    }

    /// Load with environment overrides and validate.
    pub fn load_and_validate() -> crate::error::Result<Self> {
        Self::load_with_env()?.validated()
    }

    /// Validate, converting failures into a configuration error.
    pub fn validated(self) -> crate::error::Result<Self> {
        self.validate()
            .map_err(|e| crate::error::Error::Config(e.to_string()))?;
        Ok(self)
    }
}

impl Validate for Neo4jConfig {
    fn validate(&self) -> ValidationResult<()> {
        let parsed = url::Url::parse(&self.uri).map_err(|e| ValidationError::InvalidValue {
            field: "neo4j.uri".into(),
            reason: e.to_string(),
        })?;

        if !NEO4J_SCHEMES.contains(&parsed.scheme()) {
            return Err(ValidationError::InvalidValue {
                field: "neo4j.uri".into(),
                reason: format!("unsupported scheme '{}'", parsed.scheme()),
            });
        }

        if self.database.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "neo4j.database".into(),
            });
        }

        Ok(())
    }
}

impl Validate for BedrockConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.region.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "bedrock.region".into(),
            });
        }
        if self.model_id.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "bedrock.model_id".into(),
            });
        }
        if self.timeout_secs == 0 {
            return Err(ValidationError::InvalidValue {
                field: "bedrock.timeout_secs".into(),
                reason: "must be greater than 0".into(),
            });
        }
        Ok(())
    }
}

impl Validate for UploadsConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.max_bytes == 0 {
            return Err(ValidationError::InvalidValue {
                field: "uploads.max_bytes".into(),
                reason: "must be greater than 0".into(),
            });
        }
        Ok(())
    }
}

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        if !LOG_LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_level".into(),
                reason: format!("must be one of {}", LOG_LEVELS.join(", ")),
            });
        }
        if !LOG_FORMATS.contains(&self.log_format.as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_format".into(),
                reason: format!("must be one of {}", LOG_FORMATS.join(", ")),
            });
        }
        Ok(())
    }
}
