//! Interfaces between the application code and database.

mod annotations;
mod conversions;
mod notes;
mod users;
mod validated_annotations;

pub use users::set_user_blocked;

use crate::export::ValidNote;
use crate::repository::{AnnotationRepository, AssignmentFilter, NewNote};
use crate::*;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use itertools::Itertools;
use std::collections::{HashMap, HashSet};
use std::env;

pub type PgPool = Pool<ConnectionManager<PgConnection>>;
pub type PgPooledConnection = PooledConnection<ConnectionManager<PgConnection>>;

/// Read `DATABASE_URL` from the environment or a `.env` file.
pub fn get_database_url() -> Result<String> {
    dotenvy::dotenv().ok();
    env::var("DATABASE_URL").context("DATABASE_URL must be set")
}

pub fn get_database_connection() -> Result<PgConnection> {
    let database_url = get_database_url()?;
    PgConnection::establish(&database_url)
        .map_err(|e| anyhow!("Error connecting to the database: {e}"))
}

pub fn get_database_pool() -> Result<PgPool> {
    let manager = ConnectionManager::<PgConnection>::new(get_database_url()?);
    Pool::builder()
        .build(manager)
        .map_err(|e| anyhow!("Error building the connection pool: {e}"))
}

pub fn get_pooled_database_connection(pool: &PgPool) -> Result<PgPooledConnection> {
    pool.get()
        .map_err(|e| anyhow!("Error getting a connection from the pool: {e}"))
}

impl AnnotationRepository for PgConnection {
    fn insert_user(&mut self, email: &str, username: Option<&str>) -> Result<UserRecord> {
        users::insert_user(self, email, username)
    }

    fn get_user(&mut self, user_id: UserId) -> Result<Option<UserRecord>> {
        users::get_user_by_id(self, user_id)
    }

    fn get_users(&mut self, user_ids: &HashSet<UserId>) -> Result<Vec<UserRecord>> {
        users::get_users_by_ids(self, user_ids)
    }

    fn get_blocked_user_ids(&mut self, block_threshold: u32) -> Result<HashSet<UserId>> {
        users::get_blocked_user_ids(self, block_threshold)
    }

    fn increment_user_invalid_notes(&mut self, user_id: UserId) -> Result<Option<u32>> {
        users::increment_invalid_notes_counter(self, user_id)
    }

    fn insert_note(&mut self, new_note: &NewNote) -> Result<NoteRecord> {
        notes::insert_note(self, new_note)
    }

    fn get_note(&mut self, note_id: NoteId) -> Result<Option<NoteRecord>> {
        notes::get_note_by_id(self, note_id)
    }

    fn get_note_with_annotations(
        &mut self,
        note_id: NoteId,
    ) -> Result<Option<NoteWithAnnotations>> {
        let Some(note) = notes::get_note_by_id(self, note_id)? else {
            return Ok(None);
        };
        Ok(Some(NoteWithAnnotations {
            note,
            annotations: annotations::get_annotations_for_note(self, note_id)?,
            validated_annotations: validated_annotations::get_validated_for_notes(
                self,
                &[note_id],
            )?,
        }))
    }

    fn update_note_comments(&mut self, note_id: NoteId, comments: &str) -> Result<bool> {
        notes::update_note_comments(self, note_id, comments)
    }

    fn increment_note_unavailable(&mut self, note_id: NoteId) -> Result<Option<u32>> {
        notes::increment_unavailable_counter(self, note_id)
    }

    fn increment_note_invalid(&mut self, note_id: NoteId) -> Result<Option<u32>> {
        notes::increment_invalid_counter(self, note_id)
    }

    fn find_first_assignable_note(
        &mut self,
        filter: &AssignmentFilter,
    ) -> Result<Option<NoteRecord>> {
        notes::find_first_assignable_note(self, filter)
    }

    fn get_valid_notes(
        &mut self,
        max_invalid_counter: u32,
        blocked_user_ids: &HashSet<UserId>,
    ) -> Result<Vec<ValidNote>> {
        let valid_notes = notes::get_valid_notes(self, max_invalid_counter, blocked_user_ids)?;

        let owner_ids: HashSet<UserId> = valid_notes.iter().map(|n| n.user_id).collect();
        let owner_emails: HashMap<UserId, String> = users::get_users_by_ids(self, &owner_ids)?
            .into_iter()
            .map(|user| (user.user_id, user.email))
            .collect();

        let note_ids: Vec<NoteId> = valid_notes.iter().map(|n| n.note_id).collect();
        let mut validated = validated_annotations::get_validated_for_notes(self, &note_ids)?
            .into_iter()
            .into_group_map_by(|v| v.note_id);

        valid_notes
            .into_iter()
            .map(|note| {
                let contributor_email = owner_emails
                    .get(&note.user_id)
                    .cloned()
                    .ok_or_else(|| anyhow!("note #{} has no owner", note.note_id))?;
                Ok(ValidNote {
                    validated_annotations: validated.remove(&note.note_id).unwrap_or_default(),
                    contributor_email,
                    note,
                })
            })
            .collect()
    }

    fn get_invalid_note_ids(&mut self, max_invalid_counter: u32) -> Result<HashSet<NoteId>> {
        notes::get_invalid_note_ids(self, max_invalid_counter)
    }

    fn insert_annotation(
        &mut self,
        user_id: UserId,
        note_id: NoteId,
        property: FieldName,
        value: &str,
    ) -> Result<AnnotationRecord> {
        annotations::insert_annotation(self, user_id, note_id, property, value)
    }

    fn annotation_exists(
        &mut self,
        user_id: UserId,
        note_id: NoteId,
        property: FieldName,
        value: &str,
    ) -> Result<bool> {
        annotations::annotation_exists(self, user_id, note_id, property, value)
    }

    fn get_user_annotated_note_ids(
        &mut self,
        property: FieldName,
        user_id: UserId,
    ) -> Result<HashSet<NoteId>> {
        annotations::get_user_annotated_note_ids(self, property, user_id)
    }

    fn get_annotations_for_property(
        &mut self,
        property: FieldName,
    ) -> Result<Vec<AnnotationRecord>> {
        annotations::get_annotations_for_property(self, property)
    }

    fn count_annotations_by_user(
        &mut self,
        excluded_user_ids: &HashSet<UserId>,
        excluded_note_ids: &HashSet<NoteId>,
    ) -> Result<Vec<(UserId, u64)>> {
        annotations::count_annotations_by_user(self, excluded_user_ids, excluded_note_ids)
    }

    fn insert_validated_annotation_if_absent(
        &mut self,
        note_id: NoteId,
        property: FieldName,
        value: &str,
    ) -> Result<bool> {
        validated_annotations::insert_validated_annotation_if_absent(self, note_id, property, value)
    }

    fn get_validated_note_ids(
        &mut self,
        property: FieldName,
        value: Option<&str>,
    ) -> Result<HashSet<NoteId>> {
        validated_annotations::get_validated_note_ids(self, property, value)
    }

    fn get_validated_annotations_for_property(
        &mut self,
        property: FieldName,
    ) -> Result<Vec<ValidatedAnnotationRecord>> {
        validated_annotations::get_validated_for_property(self, property)
    }
}
