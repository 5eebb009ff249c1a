//! Public projections of the validated data: the CSV export and the contributor ranking.

use crate::fields::ValueRule;
use crate::{
    AnnotationRepository, Config, FieldName, NoteRecord, ValidatedAnnotationRecord, ledger,
};
use anyhow::Result;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Separator between the source urls of a note inside one CSV cell.
pub const URL_SEPARATOR: &str = " ||||| ";
/// File name offered for download.
pub const EXPORT_FILE_NAME: &str = "muertesViales.csv";

/// A note that is part of the public data set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidNote {
    pub note: NoteRecord,
    /// Email of the user who created the note.
    pub contributor_email: String,
    pub validated_annotations: Vec<ValidatedAnnotationRecord>,
}

impl ValidNote {
    pub fn validated_value(&self, property: FieldName) -> Option<&str> {
        self.validated_annotations
            .iter()
            .find(|v| v.property_name == property)
            .map(|v| v.value.as_str())
    }
}

/// Notes that are not invalid and whose owner is not blocked, oldest first.
pub fn get_all_valid_notes<R>(repo: &mut R, config: &Config) -> Result<Vec<ValidNote>>
where
    R: AnnotationRepository + ?Sized,
{
    let blocked_user_ids = ledger::get_blocked_user_ids(repo, config)?;
    repo.get_valid_notes(config.omit_valid_threshold, &blocked_user_ids)
}

/// Properties that get a column in the export. The marker-only property carries no data.
pub fn export_fields(config: &Config) -> Vec<FieldName> {
    FieldName::ALL
        .into_iter()
        .filter(|field| config.registry.descriptor(*field).value_rule != ValueRule::MarkerOnly)
        .collect()
}

pub fn export_header(config: &Config) -> Vec<String> {
    ["noteDate", "contributorName", "noteUrls"]
        .into_iter()
        .map(ToString::to_string)
        .chain(export_fields(config).into_iter().map(|f| f.to_string()))
        .collect()
}

/// One row per note, in header order. Properties without a validated value are left empty.
pub fn export_rows(config: &Config, notes: &[ValidNote]) -> Vec<Vec<String>> {
    let fields = export_fields(config);
    notes
        .iter()
        .map(|valid_note| {
            let mut row = vec![
                valid_note.note.created_at.format("%Y-%m-%d").to_string(),
                valid_note.contributor_email.clone(),
                valid_note.note.urls.join(URL_SEPARATOR),
            ];
            row.extend(
                fields
                    .iter()
                    .map(|field| valid_note.validated_value(*field).unwrap_or("").to_string()),
            );
            row
        })
        .collect()
}

fn escape_csv_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Render the export, header included, one line per note.
pub fn to_csv(config: &Config, notes: &[ValidNote]) -> String {
    std::iter::once(export_header(config))
        .chain(export_rows(config, notes))
        .map(|row| row.iter().map(|field| escape_csv_field(field)).join(","))
        .join("\n")
}

/// Usernames of users who annotated valid notes, most annotations first.
/// Blocked users and users without a username are left out, so emails are never listed.
pub fn get_contributors<R>(repo: &mut R, config: &Config) -> Result<Vec<String>>
where
    R: AnnotationRepository + ?Sized,
{
    let blocked_user_ids = ledger::get_blocked_user_ids(repo, config)?;
    let invalid_note_ids = repo.get_invalid_note_ids(config.omit_valid_threshold)?;
    let counts = repo.count_annotations_by_user(&blocked_user_ids, &invalid_note_ids)?;

    let user_ids: HashSet<_> = counts.iter().map(|(user_id, _)| *user_id).collect();
    let users: HashMap<_, _> = repo
        .get_users(&user_ids)?
        .into_iter()
        .map(|user| (user.user_id, user))
        .collect();

    Ok(counts
        .iter()
        .filter_map(|(user_id, _)| users.get(user_id))
        .filter_map(|user| user.username.clone())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::create_note;
    use crate::memory_store::MemoryStore;
    use crate::{NOT_AVAILABLE, NoteId, UserId};

    fn add_note(store: &mut MemoryStore, owner: UserId, urls: &[&str]) -> NoteId {
        let urls: Vec<String> = urls.iter().map(ToString::to_string).collect();
        create_note(store, &Config::default(), owner, &urls, None)
            .unwrap()
            .note_id
    }

    #[test_log::test]
    fn test_header() {
        let header = export_header(&Config::default());
        assert_eq!(
            header[..5],
            ["noteDate", "contributorName", "noteUrls", "victimAge", "victimName"]
        );
        assert!(!header.contains(&"unavailable".to_string()));
        assert_eq!(header.len(), 3 + FieldName::ALL.len() - 1);
    }

    #[test_log::test]
    fn test_csv_rows() {
        let config = Config::default();
        let mut store = MemoryStore::new();
        let owner = store.insert_user("owner@example.com", None).unwrap().user_id;
        let note_id = add_note(
            &mut store,
            owner,
            &["https://example.com/a", "https://example.com/b"],
        );
        store
            .insert_validated_annotation_if_absent(note_id, FieldName::VictimName, "Juan \"Pepe\", Pérez")
            .unwrap();
        store
            .insert_validated_annotation_if_absent(note_id, FieldName::VictimAge, "adult")
            .unwrap();

        let notes = get_all_valid_notes(&mut store, &config).unwrap();
        let csv = to_csv(&config, &notes);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 2);

        let date = notes[0].note.created_at.format("%Y-%m-%d").to_string();
        assert!(lines[1].starts_with(&format!(
            "{date},owner@example.com,https://example.com/a ||||| https://example.com/b,adult,\"Juan \"\"Pepe\"\", Pérez\","
        )));
    }

    #[test_log::test]
    fn test_invalid_notes_and_blocked_owners_are_not_exported() {
        let config = Config::default();
        let mut store = MemoryStore::new();
        let good = store.insert_user("good@example.com", None).unwrap().user_id;
        let blocked = store.insert_user("blocked@example.com", None).unwrap().user_id;
        let kept = add_note(&mut store, good, &["https://example.com/1"]);
        let invalid = add_note(&mut store, good, &["https://example.com/2"]);
        add_note(&mut store, blocked, &["https://example.com/3"]);
        store.set_user_blocked(blocked, true);

        for _ in 0..config.omit_valid_threshold {
            store.increment_note_invalid(invalid).unwrap();
        }
        let ids: Vec<NoteId> = get_all_valid_notes(&mut store, &config)
            .unwrap()
            .iter()
            .map(|n| n.note.note_id)
            .collect();
        assert_eq!(ids, vec![kept, invalid]);

        store.increment_note_invalid(invalid).unwrap();
        let ids: Vec<NoteId> = get_all_valid_notes(&mut store, &config)
            .unwrap()
            .iter()
            .map(|n| n.note.note_id)
            .collect();
        assert_eq!(ids, vec![kept]);
    }

    #[test_log::test]
    fn test_contributors() {
        let config = Config::default();
        let mut store = MemoryStore::new();
        let owner = store.insert_user("owner@example.com", None).unwrap().user_id;
        let ana = store
            .insert_user("ana@example.com", Some("ana"))
            .unwrap()
            .user_id;
        let beto = store.insert_user("beto@example.com", None).unwrap().user_id;
        let carla = store
            .insert_user("carla@example.com", Some("carla"))
            .unwrap()
            .user_id;
        let good = add_note(&mut store, owner, &["https://example.com/1"]);
        let invalid = add_note(&mut store, owner, &["https://example.com/2"]);

        store
            .insert_annotation(ana, good, FieldName::VictimAge, "adult")
            .unwrap();
        store
            .insert_annotation(beto, good, FieldName::VictimAge, "adult")
            .unwrap();
        store
            .insert_annotation(beto, good, FieldName::VictimSex, "mujer")
            .unwrap();
        for field in [FieldName::VictimAge, FieldName::VictimSex, FieldName::VictimName] {
            store
                .insert_annotation(ana, invalid, field, NOT_AVAILABLE)
                .unwrap();
        }
        store
            .insert_annotation(carla, good, FieldName::AccidentTime, "7:00")
            .unwrap();
        for _ in 0..=config.omit_valid_threshold {
            store.increment_note_invalid(invalid).unwrap();
        }

        let contributors = get_contributors(&mut store, &config).unwrap();
        assert_eq!(contributors, vec!["ana", "carla"]);
        assert!(!contributors.iter().any(|name| name.contains('@')));

        store.set_user_blocked(ana, true);
        let contributors = get_contributors(&mut store, &config).unwrap();
        assert_eq!(contributors, vec!["carla"]);
    }
}
