//! A library with common utilities for crowdsourced annotation of road collision notes.

pub mod annotations;
pub mod assignment;
pub mod audit;
pub mod config;
pub mod consensus;
pub mod error;
pub mod export;
pub mod fields;
pub mod geo;
pub mod ledger;
pub mod memory_store;
pub mod repository;
pub mod submission;

#[cfg(feature = "database")]
pub mod db_util;

pub use config::Config;
pub use error::AnnotateError;
pub use fields::FieldName;
pub use repository::AnnotationRepository;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type NoteId = u64;
pub type UserId = u64;

/// The value stored when a volunteer says a property cannot be read from the note.
pub const NOT_AVAILABLE: &str = "NA";

/// Agreeing annotations needed before a substantive value is validated.
pub const DEFAULT_VALID_THRESHOLD: u32 = 1;
/// Agreeing markers needed before "not available" is validated.
/// Also the ceiling for the per-note unavailable/invalid counters.
pub const DEFAULT_OMIT_VALID_THRESHOLD: u32 = 2;
/// Users with more invalid notes than this are blocked.
pub const DEFAULT_BLOCK_THRESHOLD: u32 = 5;
/// Two coordinates closer than this (in meters) are considered the same place.
pub const DEFAULT_PROXIMITY_RADIUS_METERS: f64 = 500.0;
pub const DEFAULT_EARLIEST_ACCIDENT_YEAR: i32 = 2018;
pub const DEFAULT_MAX_NOTE_URLS: usize = 3;

/// A volunteer, as stored in the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: UserId,
    pub email: String,
    pub username: Option<String>,
    pub blocked: bool,
    pub invalid_notes_counter: u32,
    pub created_at: DateTime<Utc>,
}

/// A unit of work: one collision reported by one or more news articles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteRecord {
    pub note_id: NoteId,
    pub user_id: UserId,
    pub custom_id: Option<String>,
    pub comments: Option<String>,
    pub urls: Vec<String>,
    pub unavailable_counter: u32,
    pub invalid_counter: u32,
    pub created_at: DateTime<Utc>,
}

/// One user's assertion about one property of one note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationRecord {
    pub annotation_id: u64,
    pub note_id: NoteId,
    pub user_id: UserId,
    pub property_name: FieldName,
    pub value: String,
    pub created_at: DateTime<Utc>,
}

/// A value promoted after enough annotations agreed on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedAnnotationRecord {
    pub validated_id: u64,
    pub note_id: NoteId,
    pub property_name: FieldName,
    pub value: String,
    pub created_at: DateTime<Utc>,
}

/// A note together with everything annotated about it so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteWithAnnotations {
    pub note: NoteRecord,
    pub annotations: Vec<AnnotationRecord>,
    pub validated_annotations: Vec<ValidatedAnnotationRecord>,
}

impl NoteWithAnnotations {
    pub fn validated_value(&self, property: FieldName) -> Option<&str> {
        self.validated_annotations
            .iter()
            .find(|v| v.property_name == property)
            .map(|v| v.value.as_str())
    }
}

/// The note handed to a volunteer to annotate next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteAssignment {
    pub note_id: NoteId,
    pub urls: Vec<String>,
    pub comments: Option<String>,
}

impl From<NoteRecord> for NoteAssignment {
    fn from(note: NoteRecord) -> Self {
        Self {
            note_id: note.note_id,
            urls: note.urls,
            comments: note.comments,
        }
    }
}

/// Whether an annotation was written or the user had already made the same one.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotateOutcome {
    Annotated,
    AlreadyAnnotated,
}

impl AnnotateOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            AnnotateOutcome::Annotated => "annotated",
            AnnotateOutcome::AlreadyAnnotated => "already_annotated",
        }
    }
}

/// The result of a submission, returned to the client.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationReceipt {
    pub outcome: AnnotateOutcome,
    /// True when this submission promoted its value to validated.
    pub validated: bool,
}
