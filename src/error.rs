//! Error types for chartjobs
//!
//! Every rejection a caller can observe maps onto an HTTP-style status code so
//! the REST layer sitting on top can forward it unchanged.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Message attached to scheduling rejections
pub const SCHEDULING_FAILED: &str = "Scheduling Job Failed";

/// Why a single field was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldErrorCode {
    /// Required field absent or empty
    MissingField,
    /// Field present but malformed
    Invalid,
}

/// A field-level validation failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub resource: String,
    pub field: String,
    pub code: FieldErrorCode,
}

impl FieldError {
    pub fn missing(resource: &str, field: &str) -> Self {
        Self {
            resource: resource.to_string(),
            field: field.to_string(),
            code: FieldErrorCode::MissingField,
        }
    }

    pub fn invalid(resource: &str, field: &str) -> Self {
        Self {
            resource: resource.to_string(),
            field: field.to_string(),
            code: FieldErrorCode::Invalid,
        }
    }
}

/// Errors that can occur while managing or scheduling jobs
#[derive(Debug, Error)]
pub enum JobError {
    /// One or more fields failed validation
    #[error("Validation failed: {}", describe_fields(.0))]
    Validation(Vec<FieldError>),

    /// Job or task not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// The trigger expression cannot be scheduled
    #[error("Scheduling Job Failed: {0}")]
    Scheduling(String),

    /// Invalid cron expression
    #[error("Invalid cron expression: {0}")]
    InvalidExpression(String),

    /// Storage backend failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Command execution failure
    #[error("Execution error: {0}")]
    Execution(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

/// Result type alias for job operations
pub type Result<T> = std::result::Result<T, JobError>;

impl JobError {
    /// Single-field validation error
    pub fn invalid_field(resource: &str, field: &str) -> Self {
        JobError::Validation(vec![FieldError::invalid(resource, field)])
    }

    /// HTTP-style status code for this error
    pub fn status(&self) -> u16 {
        match self {
            JobError::Validation(_) => 422,
            JobError::NotFound(_) => 404,
            JobError::Scheduling(_) | JobError::InvalidExpression(_) => 400,
            _ => 500,
        }
    }

    /// Field errors carried by a validation failure
    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            JobError::Validation(errors) => errors,
            _ => &[],
        }
    }

    /// Rejection body as the REST layer returns it
    pub fn to_body(&self) -> serde_json::Value {
        match self {
            JobError::Validation(errors) => serde_json::json!({
                "status": self.status(),
                "errors": errors,
            }),
            JobError::Scheduling(_) => serde_json::json!({
                "status": self.status(),
                "customMessage": SCHEDULING_FAILED,
            }),
            JobError::NotFound(_) => serde_json::json!({ "status": self.status() }),
            _ => serde_json::json!({
                "status": self.status(),
                "message": self.to_string(),
            }),
        }
    }
}

fn describe_fields(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("{}.{} ({:?})", e.resource, e.field, e.code))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(JobError::invalid_field("job", "_id").status(), 422);
        assert_eq!(JobError::NotFound("x".into()).status(), 404);
        assert_eq!(JobError::Scheduling("bad cron".into()).status(), 400);
        assert_eq!(JobError::Storage("disk".into()).status(), 500);
    }

    #[test]
    fn test_validation_body() {
        let err = JobError::Validation(vec![
            FieldError::missing("job", "name"),
            FieldError::invalid("job", "_id"),
        ]);
        let body = err.to_body();
        assert_eq!(body["status"], 422);
        assert_eq!(body["errors"][0]["field"], "name");
        assert_eq!(body["errors"][0]["code"], "missing_field");
        assert_eq!(body["errors"][1]["code"], "invalid");
    }

    #[test]
    fn test_scheduling_body() {
        let body = JobError::Scheduling("bad cron".into()).to_body();
        assert_eq!(body["status"], 400);
        assert_eq!(body["customMessage"], SCHEDULING_FAILED);
    }

    #[test]
    fn test_display() {
        let err = JobError::Validation(vec![FieldError::missing("job", "command")]);
        assert!(err.to_string().contains("job.command"));
    }
}
