//! Field predicates consulted before a job mutation is accepted

use crate::error::FieldError;

/// Length of a document identifier in hex characters
pub const OBJECT_ID_LEN: usize = 24;

/// True for a string that is not empty once trimmed
pub fn is_non_empty_string(value: Option<&str>) -> bool {
    value.is_some_and(|v| !v.trim().is_empty())
}

/// True for a 24-character hexadecimal identifier
pub fn is_object_id(id: &str) -> bool {
    id.len() == OBJECT_ID_LEN && id.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Collects field errors for one resource
#[derive(Debug)]
pub struct FieldErrors {
    resource: &'static str,
    errors: Vec<FieldError>,
}

impl FieldErrors {
    pub fn new(resource: &'static str) -> Self {
        Self {
            resource,
            errors: Vec::new(),
        }
    }

    /// Record `missing_field` unless the value is a non-empty string
    pub fn require(&mut self, field: &str, value: Option<&str>) {
        if !is_non_empty_string(value) {
            self.errors.push(FieldError::missing(self.resource, field));
        }
    }

    /// Record `invalid` when a supplied value is blank
    pub fn non_blank_if_present(&mut self, field: &str, value: Option<&str>) {
        if value.is_some() && !is_non_empty_string(value) {
            self.errors.push(FieldError::invalid(self.resource, field));
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_vec(self) -> Vec<FieldError> {
        self.errors
    }
}
