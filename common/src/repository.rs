//! The persistence seam between the annotation engine and a store.
//!
//! Implemented by the diesel connection in `db_util` and by the in-memory [`MemoryStore`] used by
//! tests and local development.
//!
//! [`MemoryStore`]: crate::memory_store::MemoryStore

use crate::export::ValidNote;
use crate::{
    AnnotationRecord, FieldName, NoteId, NoteRecord, NoteWithAnnotations, UserId, UserRecord,
    ValidatedAnnotationRecord,
};
use anyhow::Result;
use std::collections::HashSet;

/// Data needed to create a note.
#[derive(Debug, Clone, PartialEq)]
pub struct NewNote {
    pub user_id: UserId,
    pub urls: Vec<String>,
    pub custom_id: Option<String>,
}

/// Constraints on the next note handed out for annotation.
#[derive(Debug, Clone, Default)]
pub struct AssignmentFilter {
    /// Notes already validated for the property or already annotated by the user.
    pub excluded_note_ids: HashSet<NoteId>,
    /// Notes owned by these users are skipped.
    pub blocked_user_ids: HashSet<UserId>,
    /// Notes whose unavailable or invalid counter is above this are skipped.
    pub max_counter: u32,
    /// When set, only these notes are eligible.
    pub restrict_to: Option<HashSet<NoteId>>,
}

impl AssignmentFilter {
    /// Whether a note passes the filter, for stores that filter in memory.
    pub fn accepts(&self, note: &NoteRecord) -> bool {
        !self.excluded_note_ids.contains(&note.note_id)
            && !self.blocked_user_ids.contains(&note.user_id)
            && note.unavailable_counter <= self.max_counter
            && note.invalid_counter <= self.max_counter
            && self
                .restrict_to
                .as_ref()
                .is_none_or(|ids| ids.contains(&note.note_id))
    }
}

/// Every read and write the annotation engine performs.
///
/// Lookups that find nothing return `Ok(None)` or `Ok(false)`; errors are reserved for store
/// failures.
pub trait AnnotationRepository {
    fn insert_user(&mut self, email: &str, username: Option<&str>) -> Result<UserRecord>;

    fn get_user(&mut self, user_id: UserId) -> Result<Option<UserRecord>>;

    fn get_users(&mut self, user_ids: &HashSet<UserId>) -> Result<Vec<UserRecord>>;

    /// Users with `invalid_notes_counter > block_threshold` or an explicit block.
    fn get_blocked_user_ids(&mut self, block_threshold: u32) -> Result<HashSet<UserId>>;

    /// Returns the new counter, or None if the user does not exist.
    fn increment_user_invalid_notes(&mut self, user_id: UserId) -> Result<Option<u32>>;

    fn insert_note(&mut self, new_note: &NewNote) -> Result<NoteRecord>;

    fn get_note(&mut self, note_id: NoteId) -> Result<Option<NoteRecord>>;

    fn get_note_with_annotations(&mut self, note_id: NoteId)
    -> Result<Option<NoteWithAnnotations>>;

    /// Returns false if the note does not exist.
    fn update_note_comments(&mut self, note_id: NoteId, comments: &str) -> Result<bool>;

    /// Returns the new counter, or None if the note does not exist.
    fn increment_note_unavailable(&mut self, note_id: NoteId) -> Result<Option<u32>>;

    /// Returns the new counter, or None if the note does not exist.
    fn increment_note_invalid(&mut self, note_id: NoteId) -> Result<Option<u32>>;

    /// The oldest note (by creation time, then id) accepted by the filter.
    fn find_first_assignable_note(&mut self, filter: &AssignmentFilter)
    -> Result<Option<NoteRecord>>;

    /// Notes with `invalid_counter <= max_invalid_counter` whose owner is not blocked, oldest
    /// first, with their validated annotations.
    fn get_valid_notes(
        &mut self,
        max_invalid_counter: u32,
        blocked_user_ids: &HashSet<UserId>,
    ) -> Result<Vec<ValidNote>>;

    fn get_invalid_note_ids(&mut self, max_invalid_counter: u32) -> Result<HashSet<NoteId>>;

    fn insert_annotation(
        &mut self,
        user_id: UserId,
        note_id: NoteId,
        property: FieldName,
        value: &str,
    ) -> Result<AnnotationRecord>;

    fn annotation_exists(
        &mut self,
        user_id: UserId,
        note_id: NoteId,
        property: FieldName,
        value: &str,
    ) -> Result<bool>;

    /// Distinct notes the user annotated for the property.
    fn get_user_annotated_note_ids(
        &mut self,
        property: FieldName,
        user_id: UserId,
    ) -> Result<HashSet<NoteId>>;

    fn get_annotations_for_property(&mut self, property: FieldName)
    -> Result<Vec<AnnotationRecord>>;

    /// Annotation counts per user, skipping the given users and notes, largest first.
    fn count_annotations_by_user(
        &mut self,
        excluded_user_ids: &HashSet<UserId>,
        excluded_note_ids: &HashSet<NoteId>,
    ) -> Result<Vec<(UserId, u64)>>;

    /// Insert unless the note already has a validated value for the property.
    /// Returns true if a row was written.
    fn insert_validated_annotation_if_absent(
        &mut self,
        note_id: NoteId,
        property: FieldName,
        value: &str,
    ) -> Result<bool>;

    /// Distinct notes with a validated value for the property, optionally a specific value.
    fn get_validated_note_ids(
        &mut self,
        property: FieldName,
        value: Option<&str>,
    ) -> Result<HashSet<NoteId>>;

    fn get_validated_annotations_for_property(
        &mut self,
        property: FieldName,
    ) -> Result<Vec<ValidatedAnnotationRecord>>;
}
