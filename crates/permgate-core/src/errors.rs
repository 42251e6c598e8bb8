//! Error types for the rights model
//!
//! Validation failures map to a "bad request" at the HTTP edge; decode
//! failures only arise when reading wire messages back (consumers, tests).

use serde::{Deserialize, Serialize};

/// A path segment or identifier that cannot address anything
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum ValidationError {
    /// Identifier was empty
    #[error("Invalid {field}: must not be empty")]
    Empty {
        /// Which identifier was being parsed
        field: String,
    },

    /// Identifier contained a control character
    #[error("Invalid {field}: contains control characters")]
    ControlCharacter {
        /// Which identifier was being parsed
        field: String,
    },
}

impl ValidationError {
    /// Create an empty identifier error
    pub fn empty(field: impl Into<String>) -> Self {
        Self::Empty {
            field: field.into(),
        }
    }

    /// Create a control character error
    pub fn control_character(field: impl Into<String>) -> Self {
        Self::ControlCharacter {
            field: field.into(),
        }
    }

    /// Name of the offending field
    pub fn field(&self) -> &str {
        match self {
            Self::Empty { field } | Self::ControlCharacter { field } => field,
        }
    }
}

/// A wire message that does not satisfy the change event schema
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// Payload is not JSON of the expected shape
    #[error("Malformed change event: {0}")]
    Json(#[from] serde_json::Error),

    /// `command` is neither `PUT` nor `DELETE`
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// Both `User` and `Group` were set, or neither was
    #[error("Change event must name exactly one of User or Group")]
    AmbiguousPrincipal,

    /// An addressing field failed validation
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ValidationError::empty("user");
        assert_eq!(err.to_string(), "Invalid user: must not be empty");
        assert_eq!(err.field(), "user");

        let err = ValidationError::control_character("resource");
        assert_eq!(err.to_string(), "Invalid resource: contains control characters");
    }
}
