//! Errors surfaced by the annotation pipeline.

use crate::{FieldName, NoteId, UserId};
use thiserror::Error;

/// How the API should treat an error.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorClass {
    /// Malformed or unknown input, including notes that do not exist.
    InvalidRequest,
    /// The user may not contribute anymore.
    Forbidden,
    /// The store failed; nothing the caller sent was wrong.
    Service,
}

#[derive(Debug, Error)]
pub enum AnnotateError {
    #[error("unknown property name `{0}`")]
    UnknownField(String),

    #[error("{0} value is required")]
    MissingValue(FieldName),

    #[error("{field} value is invalid: {reason}")]
    InvalidValue { field: FieldName, reason: String },

    #[error("note #{note_id} does not exist")]
    NoteNotFound {
        note_id: NoteId,
        field: Option<FieldName>,
    },

    #[error("invalid note: {0}")]
    InvalidNote(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("user #{0} is blocked")]
    UserBlocked(UserId),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl AnnotateError {
    pub fn invalid_value(field: FieldName, reason: impl Into<String>) -> Self {
        AnnotateError::InvalidValue {
            field,
            reason: reason.into(),
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            AnnotateError::UserBlocked(_) => ErrorClass::Forbidden,
            AnnotateError::Storage(_) => ErrorClass::Service,
            _ => ErrorClass::InvalidRequest,
        }
    }

    /// A short machine-readable code, e.g. `victimName-03`.
    pub fn code(&self) -> String {
        match self {
            AnnotateError::MissingValue(field) => format!("{field}-01"),
            AnnotateError::NoteNotFound {
                field: Some(field), ..
            } => format!("{field}-02"),
            AnnotateError::NoteNotFound { field: None, .. } => "note-02".to_string(),
            AnnotateError::InvalidValue { field, .. } => format!("{field}-03"),
            AnnotateError::UnknownField(_) | AnnotateError::InvalidRequest(_) => {
                "request-01".to_string()
            }
            AnnotateError::InvalidNote(_) => "note-01".to_string(),
            AnnotateError::UserBlocked(_) => "user-01".to_string(),
            AnnotateError::Storage(_) => "service-01".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn test_codes_follow_field_prefix() {
        assert_eq!(
            AnnotateError::MissingValue(FieldName::VictimName).code(),
            "victimName-01"
        );
        assert_eq!(
            AnnotateError::NoteNotFound {
                note_id: 7,
                field: Some(FieldName::AccidentTime)
            }
            .code(),
            "accidentTime-02"
        );
        assert_eq!(
            AnnotateError::invalid_value(FieldName::Coordinates, "bad").code(),
            "coordinates-03"
        );
    }

    #[test]
    fn test_classes() {
        assert_eq!(
            AnnotateError::UnknownField("shoeSize".into()).class(),
            ErrorClass::InvalidRequest
        );
        assert_eq!(
            AnnotateError::NoteNotFound {
                note_id: 1,
                field: None
            }
            .class(),
            ErrorClass::InvalidRequest
        );
        assert_eq!(AnnotateError::UserBlocked(3).class(), ErrorClass::Forbidden);
        assert_eq!(
            AnnotateError::from(anyhow!("connection refused")).class(),
            ErrorClass::Service
        );
    }
}
