//! An in-memory store with the same semantics as the database tables.
//! Used by the tests and by the api when no database is configured.

use crate::export::ValidNote;
use crate::repository::{AnnotationRepository, AssignmentFilter, NewNote};
use crate::{
    AnnotationRecord, FieldName, NoteId, NoteRecord, NoteWithAnnotations, UserId, UserRecord,
    ValidatedAnnotationRecord,
};
use anyhow::{Result, anyhow};
use chrono::Utc;
use itertools::Itertools;
use std::collections::HashSet;

#[derive(Debug, Default)]
pub struct MemoryStore {
    users: Vec<UserRecord>,
    notes: Vec<NoteRecord>,
    annotations: Vec<AnnotationRecord>,
    validated_annotations: Vec<ValidatedAnnotationRecord>,
    next_id: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn note_mut(&mut self, note_id: NoteId) -> Option<&mut NoteRecord> {
        self.notes.iter_mut().find(|n| n.note_id == note_id)
    }

    /// Set the explicit block flag on a user. Returns false if the user does not exist.
    pub fn set_user_blocked(&mut self, user_id: UserId, blocked: bool) -> bool {
        match self.users.iter_mut().find(|u| u.user_id == user_id) {
            Some(user) => {
                user.blocked = blocked;
                true
            }
            None => false,
        }
    }
}

impl AnnotationRepository for MemoryStore {
    fn insert_user(&mut self, email: &str, username: Option<&str>) -> Result<UserRecord> {
        if self.users.iter().any(|u| u.email == email) {
            return Err(anyhow!("a user with email {email} already exists"));
        }
        let user = UserRecord {
            user_id: self.next_id(),
            email: email.to_string(),
            username: username.map(ToString::to_string),
            blocked: false,
            invalid_notes_counter: 0,
            created_at: Utc::now(),
        };
        self.users.push(user.clone());
        Ok(user)
    }

    fn get_user(&mut self, user_id: UserId) -> Result<Option<UserRecord>> {
        Ok(self.users.iter().find(|u| u.user_id == user_id).cloned())
    }

    fn get_users(&mut self, user_ids: &HashSet<UserId>) -> Result<Vec<UserRecord>> {
        Ok(self
            .users
            .iter()
            .filter(|u| user_ids.contains(&u.user_id))
            .cloned()
            .collect())
    }

    fn get_blocked_user_ids(&mut self, block_threshold: u32) -> Result<HashSet<UserId>> {
        Ok(self
            .users
            .iter()
            .filter(|u| u.blocked || u.invalid_notes_counter > block_threshold)
            .map(|u| u.user_id)
            .collect())
    }

    fn increment_user_invalid_notes(&mut self, user_id: UserId) -> Result<Option<u32>> {
        Ok(self
            .users
            .iter_mut()
            .find(|u| u.user_id == user_id)
            .map(|user| {
                user.invalid_notes_counter += 1;
                user.invalid_notes_counter
            }))
    }

    fn insert_note(&mut self, new_note: &NewNote) -> Result<NoteRecord> {
        if !self.users.iter().any(|u| u.user_id == new_note.user_id) {
            return Err(anyhow!("user #{} does not exist", new_note.user_id));
        }
        let note = NoteRecord {
            note_id: self.next_id(),
            user_id: new_note.user_id,
            custom_id: new_note.custom_id.clone(),
            comments: None,
            urls: new_note.urls.clone(),
            unavailable_counter: 0,
            invalid_counter: 0,
            created_at: Utc::now(),
        };
        self.notes.push(note.clone());
        Ok(note)
    }

    fn get_note(&mut self, note_id: NoteId) -> Result<Option<NoteRecord>> {
        Ok(self.notes.iter().find(|n| n.note_id == note_id).cloned())
    }

    fn get_note_with_annotations(
        &mut self,
        note_id: NoteId,
    ) -> Result<Option<NoteWithAnnotations>> {
        let Some(note) = self.get_note(note_id)? else {
            return Ok(None);
        };
        Ok(Some(NoteWithAnnotations {
            note,
            annotations: self
                .annotations
                .iter()
                .filter(|a| a.note_id == note_id)
                .cloned()
                .collect(),
            validated_annotations: self
                .validated_annotations
                .iter()
                .filter(|v| v.note_id == note_id)
                .cloned()
                .collect(),
        }))
    }

    fn update_note_comments(&mut self, note_id: NoteId, comments: &str) -> Result<bool> {
        Ok(self
            .note_mut(note_id)
            .map(|note| note.comments = Some(comments.to_string()))
            .is_some())
    }

    fn increment_note_unavailable(&mut self, note_id: NoteId) -> Result<Option<u32>> {
        Ok(self.note_mut(note_id).map(|note| {
            note.unavailable_counter += 1;
            note.unavailable_counter
        }))
    }

    fn increment_note_invalid(&mut self, note_id: NoteId) -> Result<Option<u32>> {
        Ok(self.note_mut(note_id).map(|note| {
            note.invalid_counter += 1;
            note.invalid_counter
        }))
    }

    fn find_first_assignable_note(
        &mut self,
        filter: &AssignmentFilter,
    ) -> Result<Option<NoteRecord>> {
        Ok(self
            .notes
            .iter()
            .filter(|note| filter.accepts(note))
            .min_by_key(|note| (note.created_at, note.note_id))
            .cloned())
    }

    fn get_valid_notes(
        &mut self,
        max_invalid_counter: u32,
        blocked_user_ids: &HashSet<UserId>,
    ) -> Result<Vec<ValidNote>> {
        self.notes
            .iter()
            .filter(|note| {
                note.invalid_counter <= max_invalid_counter
                    && !blocked_user_ids.contains(&note.user_id)
            })
            .sorted_by_key(|note| (note.created_at, note.note_id))
            .map(|note| {
                let owner = self
                    .users
                    .iter()
                    .find(|u| u.user_id == note.user_id)
                    .ok_or_else(|| anyhow!("note #{} has no owner", note.note_id))?;
                Ok(ValidNote {
                    note: note.clone(),
                    contributor_email: owner.email.clone(),
                    validated_annotations: self
                        .validated_annotations
                        .iter()
                        .filter(|v| v.note_id == note.note_id)
                        .cloned()
                        .collect(),
                })
            })
            .collect()
    }

    fn get_invalid_note_ids(&mut self, max_invalid_counter: u32) -> Result<HashSet<NoteId>> {
        Ok(self
            .notes
            .iter()
            .filter(|n| n.invalid_counter > max_invalid_counter)
            .map(|n| n.note_id)
            .collect())
    }

    fn insert_annotation(
        &mut self,
        user_id: UserId,
        note_id: NoteId,
        property: FieldName,
        value: &str,
    ) -> Result<AnnotationRecord> {
        if !self.notes.iter().any(|n| n.note_id == note_id) {
            return Err(anyhow!("note #{note_id} does not exist"));
        }
        let annotation = AnnotationRecord {
            annotation_id: self.next_id(),
            note_id,
            user_id,
            property_name: property,
            value: value.to_string(),
            created_at: Utc::now(),
        };
        self.annotations.push(annotation.clone());
        Ok(annotation)
    }

    fn annotation_exists(
        &mut self,
        user_id: UserId,
        note_id: NoteId,
        property: FieldName,
        value: &str,
    ) -> Result<bool> {
        Ok(self.annotations.iter().any(|a| {
            a.user_id == user_id
                && a.note_id == note_id
                && a.property_name == property
                && a.value == value
        }))
    }

    fn get_user_annotated_note_ids(
        &mut self,
        property: FieldName,
        user_id: UserId,
    ) -> Result<HashSet<NoteId>> {
        Ok(self
            .annotations
            .iter()
            .filter(|a| a.property_name == property && a.user_id == user_id)
            .map(|a| a.note_id)
            .collect())
    }

    fn get_annotations_for_property(
        &mut self,
        property: FieldName,
    ) -> Result<Vec<AnnotationRecord>> {
        Ok(self
            .annotations
            .iter()
            .filter(|a| a.property_name == property)
            .cloned()
            .collect())
    }

    fn count_annotations_by_user(
        &mut self,
        excluded_user_ids: &HashSet<UserId>,
        excluded_note_ids: &HashSet<NoteId>,
    ) -> Result<Vec<(UserId, u64)>> {
        Ok(self
            .annotations
            .iter()
            .filter(|a| {
                !excluded_user_ids.contains(&a.user_id) && !excluded_note_ids.contains(&a.note_id)
            })
            .counts_by(|a| a.user_id)
            .into_iter()
            .map(|(user_id, count)| (user_id, count as u64))
            .sorted_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)))
            .collect())
    }

    fn insert_validated_annotation_if_absent(
        &mut self,
        note_id: NoteId,
        property: FieldName,
        value: &str,
    ) -> Result<bool> {
        if !self.notes.iter().any(|n| n.note_id == note_id) {
            return Err(anyhow!("note #{note_id} does not exist"));
        }
        if self
            .validated_annotations
            .iter()
            .any(|v| v.note_id == note_id && v.property_name == property)
        {
            return Ok(false);
        }
        let validated = ValidatedAnnotationRecord {
            validated_id: self.next_id(),
            note_id,
            property_name: property,
            value: value.to_string(),
            created_at: Utc::now(),
        };
        self.validated_annotations.push(validated);
        Ok(true)
    }

    fn get_validated_note_ids(
        &mut self,
        property: FieldName,
        value: Option<&str>,
    ) -> Result<HashSet<NoteId>> {
        Ok(self
            .validated_annotations
            .iter()
            .filter(|v| v.property_name == property && value.is_none_or(|value| v.value == value))
            .map(|v| v.note_id)
            .collect())
    }

    fn get_validated_annotations_for_property(
        &mut self,
        property: FieldName,
    ) -> Result<Vec<ValidatedAnnotationRecord>> {
        Ok(self
            .validated_annotations
            .iter()
            .filter(|v| v.property_name == property)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_note() -> (MemoryStore, UserRecord, NoteRecord) {
        let mut store = MemoryStore::new();
        let user = store.insert_user("ana@example.com", Some("ana")).unwrap();
        let note = store
            .insert_note(&NewNote {
                user_id: user.user_id,
                urls: vec!["https://example.com/a".to_string()],
                custom_id: None,
            })
            .unwrap();
        (store, user, note)
    }

    #[test_log::test]
    fn test_validated_annotation_is_unique_per_property() {
        let (mut store, _, note) = store_with_note();
        assert!(
            store
                .insert_validated_annotation_if_absent(note.note_id, FieldName::VictimAge, "adult")
                .unwrap()
        );
        assert!(
            !store
                .insert_validated_annotation_if_absent(note.note_id, FieldName::VictimAge, "child")
                .unwrap()
        );
        assert!(
            store
                .insert_validated_annotation_if_absent(note.note_id, FieldName::VictimSex, "mujer")
                .unwrap()
        );
        let validated = store
            .get_validated_annotations_for_property(FieldName::VictimAge)
            .unwrap();
        assert_eq!(validated.len(), 1);
        assert_eq!(validated[0].value, "adult");
    }

    #[test_log::test]
    fn test_counters_on_missing_rows() {
        let (mut store, user, note) = store_with_note();
        assert_eq!(store.increment_note_invalid(note.note_id).unwrap(), Some(1));
        assert_eq!(store.increment_note_invalid(9999).unwrap(), None);
        assert_eq!(store.increment_note_unavailable(9999).unwrap(), None);
        assert_eq!(store.increment_user_invalid_notes(user.user_id).unwrap(), Some(1));
        assert_eq!(store.increment_user_invalid_notes(9999).unwrap(), None);
        assert!(!store.update_note_comments(9999, "hi").unwrap());
    }

    #[test_log::test]
    fn test_blocked_users() {
        let (mut store, user, _) = store_with_note();
        let other = store.insert_user("beto@example.com", None).unwrap();
        for _ in 0..3 {
            store.increment_user_invalid_notes(user.user_id).unwrap();
        }
        assert_eq!(
            store.get_blocked_user_ids(2).unwrap(),
            HashSet::from([user.user_id])
        );
        assert!(store.get_blocked_user_ids(3).unwrap().is_empty());

        assert!(store.set_user_blocked(other.user_id, true));
        assert_eq!(
            store.get_blocked_user_ids(3).unwrap(),
            HashSet::from([other.user_id])
        );
    }

    #[test_log::test]
    fn test_count_annotations_by_user() {
        let (mut store, ana, note) = store_with_note();
        let beto = store.insert_user("beto@example.com", None).unwrap();
        store
            .insert_annotation(ana.user_id, note.note_id, FieldName::VictimAge, "adult")
            .unwrap();
        store
            .insert_annotation(beto.user_id, note.note_id, FieldName::VictimAge, "adult")
            .unwrap();
        store
            .insert_annotation(beto.user_id, note.note_id, FieldName::VictimSex, "mujer")
            .unwrap();

        let counts = store
            .count_annotations_by_user(&HashSet::new(), &HashSet::new())
            .unwrap();
        assert_eq!(counts, vec![(beto.user_id, 2), (ana.user_id, 1)]);

        let counts = store
            .count_annotations_by_user(&HashSet::from([beto.user_id]), &HashSet::new())
            .unwrap();
        assert_eq!(counts, vec![(ana.user_id, 1)]);
    }
}
