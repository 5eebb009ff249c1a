//! Re-check stored consensus against all annotations.
//!
//! Validation happens at submission time and the first value to reach the threshold wins. The
//! audit looks at the full picture afterwards and reports notes where another value ended up with
//! more support, and notes that reach the threshold without a validated value (for instance after
//! the threshold was lowered). Validated values are never changed here.

use crate::consensus::{count_matching, evaluate_majority};
use crate::{AnnotationRepository, Config, FieldName, NoteId};
use anyhow::Result;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A validated value that has less support than another value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dispute {
    pub note_id: NoteId,
    pub property: FieldName,
    pub validated_value: String,
    pub validated_support: usize,
    pub majority_value: String,
    pub majority_support: usize,
}

/// A value that has enough support but was never validated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingValidation {
    pub note_id: NoteId,
    pub property: FieldName,
    pub value: String,
    pub support: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditReport {
    pub disputed: Vec<Dispute>,
    pub missing: Vec<MissingValidation>,
    /// Missing validations written by this run.
    pub promoted: usize,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.disputed.is_empty() && self.missing.is_empty()
    }
}

/// Audit one property. Results are ordered by note id.
pub fn audit_property<R>(repo: &mut R, config: &Config, property: FieldName) -> Result<AuditReport>
where
    R: AnnotationRepository + ?Sized,
{
    let descriptor = config.registry.descriptor(property);
    let validated: HashMap<NoteId, String> = repo
        .get_validated_annotations_for_property(property)?
        .into_iter()
        .map(|v| (v.note_id, v.value))
        .collect();
    let by_note = repo
        .get_annotations_for_property(property)?
        .into_iter()
        .into_group_map_by(|a| a.note_id);

    let mut report = AuditReport::default();
    for (note_id, annotations) in by_note.into_iter().sorted_by_key(|(note_id, _)| *note_id) {
        let Some(majority) = evaluate_majority(&annotations, descriptor) else {
            continue;
        };

        match validated.get(&note_id) {
            Some(validated_value) => {
                let validated_support = count_matching(&annotations, descriptor, validated_value);
                if validated_support < majority.support {
                    report.disputed.push(Dispute {
                        note_id,
                        property,
                        validated_value: validated_value.clone(),
                        validated_support,
                        majority_value: majority.value,
                        majority_support: majority.support,
                    });
                }
            }
            None => {
                if majority.support >= config.threshold_for(&majority.value) as usize {
                    report.missing.push(MissingValidation {
                        note_id,
                        property,
                        value: majority.value,
                        support: majority.support,
                    });
                }
            }
        }
    }
    Ok(report)
}

/// Audit every property, optionally writing the missing validations.
pub fn run_audit<R>(repo: &mut R, config: &Config, promote: bool) -> Result<AuditReport>
where
    R: AnnotationRepository + ?Sized,
{
    let mut report = AuditReport::default();
    for property in config.registry.all_fields() {
        let property_report = audit_property(repo, config, property)?;
        log::debug!(
            "Audited {property}: {} disputed, {} missing",
            property_report.disputed.len(),
            property_report.missing.len()
        );
        report.disputed.extend(property_report.disputed);
        report.missing.extend(property_report.missing);
    }

    if promote {
        for missing in &report.missing {
            if repo.insert_validated_annotation_if_absent(
                missing.note_id,
                missing.property,
                &missing.value,
            )? {
                log::info!(
                    "Promoted {} = {:?} on note #{}",
                    missing.property,
                    missing.value,
                    missing.note_id
                );
                report.promoted += 1;
            }
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::create_note;
    use crate::config::ConfigArgs;
    use crate::memory_store::MemoryStore;
    use crate::{NOT_AVAILABLE, UserId};

    fn setup(users: usize) -> (MemoryStore, Vec<UserId>, NoteId) {
        let mut store = MemoryStore::new();
        let user_ids: Vec<UserId> = (0..users)
            .map(|i| {
                store
                    .insert_user(&format!("user{i}@example.com"), None)
                    .unwrap()
                    .user_id
            })
            .collect();
        let note_id = create_note(
            &mut store,
            &Config::default(),
            user_ids[0],
            &["https://example.com/1".to_string()],
            None,
        )
        .unwrap()
        .note_id;
        (store, user_ids, note_id)
    }

    #[test_log::test]
    fn test_clean() {
        let (mut store, users, note_id) = setup(2);
        let config = Config::default();
        store
            .insert_annotation(users[1], note_id, FieldName::VictimAge, "adult")
            .unwrap();
        store
            .insert_validated_annotation_if_absent(note_id, FieldName::VictimAge, "adult")
            .unwrap();
        let report = run_audit(&mut store, &config, false).unwrap();
        assert!(report.is_clean());
    }

    #[test_log::test]
    fn test_disputed_value_is_reported_not_changed() {
        let (mut store, users, note_id) = setup(4);
        let config = Config::default();
        store
            .insert_annotation(users[0], note_id, FieldName::VictimSex, "hombre")
            .unwrap();
        store
            .insert_validated_annotation_if_absent(note_id, FieldName::VictimSex, "hombre")
            .unwrap();
        for user in &users[1..] {
            store
                .insert_annotation(*user, note_id, FieldName::VictimSex, "mujer")
                .unwrap();
        }

        let report = run_audit(&mut store, &config, true).unwrap();
        assert_eq!(
            report.disputed,
            vec![Dispute {
                note_id,
                property: FieldName::VictimSex,
                validated_value: "hombre".to_string(),
                validated_support: 1,
                majority_value: "mujer".to_string(),
                majority_support: 3,
            }]
        );
        assert_eq!(report.promoted, 0);
        let validated = store
            .get_validated_annotations_for_property(FieldName::VictimSex)
            .unwrap();
        assert_eq!(validated[0].value, "hombre");
    }

    #[test_log::test]
    fn test_tie_with_validated_value_is_not_a_dispute() {
        let (mut store, users, note_id) = setup(2);
        let config = Config::default();
        store
            .insert_annotation(users[0], note_id, FieldName::VictimAge, "adult")
            .unwrap();
        store
            .insert_annotation(users[1], note_id, FieldName::VictimAge, "young")
            .unwrap();
        store
            .insert_validated_annotation_if_absent(note_id, FieldName::VictimAge, "young")
            .unwrap();
        assert!(run_audit(&mut store, &config, false).unwrap().is_clean());
    }

    #[test_log::test]
    fn test_missing_validation_after_threshold_change() {
        let (mut store, users, note_id) = setup(3);
        let strict = Config::from_args(&ConfigArgs {
            valid_threshold: 3,
            ..ConfigArgs::default()
        })
        .unwrap();
        for user in &users[..2] {
            store
                .insert_annotation(*user, note_id, FieldName::AccidentTime, "18:00")
                .unwrap();
        }
        store
            .insert_annotation(users[2], note_id, FieldName::VictimizerAge, NOT_AVAILABLE)
            .unwrap();
        assert!(run_audit(&mut store, &strict, true).unwrap().is_clean());

        let relaxed = Config::from_args(&ConfigArgs {
            valid_threshold: 2,
            ..ConfigArgs::default()
        })
        .unwrap();
        let report = run_audit(&mut store, &relaxed, false).unwrap();
        assert_eq!(
            report.missing,
            vec![MissingValidation {
                note_id,
                property: FieldName::AccidentTime,
                value: "18:00".to_string(),
                support: 2,
            }]
        );
        assert_eq!(report.promoted, 0);

        let report = run_audit(&mut store, &relaxed, true).unwrap();
        assert_eq!(report.promoted, 1);
        assert!(run_audit(&mut store, &relaxed, true).unwrap().is_clean());
        assert_eq!(
            store
                .get_validated_note_ids(FieldName::AccidentTime, Some("18:00"))
                .unwrap()
                .len(),
            1
        );
    }
}
