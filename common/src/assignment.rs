//! Pick the next note a volunteer should annotate.
//!
//! Notes are handed out oldest first so every volunteer works the same backlog, which gets
//! independent annotations onto the same note sooner.

use crate::fields::FieldName;
use crate::repository::AssignmentFilter;
use crate::{AnnotationRepository, Config, NoteAssignment, NoteId, UserId, ledger};
use anyhow::Result;
use std::collections::HashSet;

/// Return the oldest note that still needs `property` and that `user_id` has not annotated for
/// it, or None when nothing is left.
pub fn select_next<R>(
    repo: &mut R,
    config: &Config,
    property: FieldName,
    user_id: UserId,
    restrict_to: Option<HashSet<NoteId>>,
) -> Result<Option<NoteAssignment>>
where
    R: AnnotationRepository + ?Sized,
{
    let validated_ids = repo.get_validated_note_ids(property, None)?;
    let user_annotated_ids = repo.get_user_annotated_note_ids(property, user_id)?;
    let blocked_user_ids = ledger::get_blocked_user_ids(repo, config)?;

    if blocked_user_ids.contains(&user_id) {
        log::debug!("User #{user_id} is blocked, not assigning {property}");
        return Ok(None);
    }
    if restrict_to.as_ref().is_some_and(HashSet::is_empty) {
        return Ok(None);
    }

    let filter = AssignmentFilter {
        excluded_note_ids: validated_ids.union(&user_annotated_ids).copied().collect(),
        blocked_user_ids,
        max_counter: config.omit_valid_threshold,
        restrict_to,
    };

    let note = repo.find_first_assignable_note(&filter)?;
    match &note {
        Some(note) => log::debug!(
            "Assigned note #{} to user #{user_id} for {property}",
            note.note_id
        ),
        None => log::debug!("No notes left for user #{user_id} on {property}"),
    }
    Ok(note.map(NoteAssignment::from))
}

/// Like [`select_next`], but only among notes already validated to have victimizer information.
pub fn select_next_requiring_victimizer_info<R>(
    repo: &mut R,
    config: &Config,
    property: FieldName,
    user_id: UserId,
) -> Result<Option<NoteAssignment>>
where
    R: AnnotationRepository + ?Sized,
{
    let with_victimizer_info =
        repo.get_validated_note_ids(FieldName::HasVictimizerInfo, Some("true"))?;
    select_next(repo, config, property, user_id, Some(with_victimizer_info))
}

/// Pick the selector variant the property's descriptor asks for.
pub fn select_for_field<R>(
    repo: &mut R,
    config: &Config,
    property: FieldName,
    user_id: UserId,
) -> Result<Option<NoteAssignment>>
where
    R: AnnotationRepository + ?Sized,
{
    if config.registry.descriptor(property).requires_victimizer_info {
        select_next_requiring_victimizer_info(repo, config, property, user_id)
    } else {
        select_next(repo, config, property, user_id, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::MemoryStore;
    use crate::repository::NewNote;

    struct Fixture {
        store: MemoryStore,
        config: Config,
        owner: UserId,
        annotator: UserId,
        notes: Vec<NoteId>,
    }

    fn fixture(note_count: usize) -> Fixture {
        let mut store = MemoryStore::new();
        let owner = store.insert_user("owner@example.com", None).unwrap().user_id;
        let annotator = store
            .insert_user("annotator@example.com", None)
            .unwrap()
            .user_id;
        let notes = (0..note_count)
            .map(|i| {
                store
                    .insert_note(&NewNote {
                        user_id: owner,
                        urls: vec![format!("https://example.com/{i}")],
                        custom_id: None,
                    })
                    .unwrap()
                    .note_id
            })
            .collect();
        Fixture {
            store,
            config: Config::default(),
            owner,
            annotator,
            notes,
        }
    }

    fn next(f: &mut Fixture, property: FieldName) -> Option<NoteId> {
        select_for_field(&mut f.store, &f.config, property, f.annotator)
            .unwrap()
            .map(|n| n.note_id)
    }

    #[test_log::test]
    fn test_oldest_note_first() {
        let mut f = fixture(3);
        assert_eq!(next(&mut f, FieldName::VictimAge), Some(f.notes[0]));
    }

    #[test_log::test]
    fn test_returns_urls_and_comments() {
        let mut f = fixture(1);
        f.store.update_note_comments(f.notes[0], "blurry photo").unwrap();
        let assignment = select_next(&mut f.store, &f.config, FieldName::VictimAge, f.annotator, None)
            .unwrap()
            .unwrap();
        assert_eq!(assignment.urls, vec!["https://example.com/0".to_string()]);
        assert_eq!(assignment.comments.as_deref(), Some("blurry photo"));
    }

    #[test_log::test]
    fn test_skips_validated_notes() {
        let mut f = fixture(2);
        f.store
            .insert_validated_annotation_if_absent(f.notes[0], FieldName::VictimAge, "adult")
            .unwrap();
        assert_eq!(next(&mut f, FieldName::VictimAge), Some(f.notes[1]));
        // other properties are unaffected
        assert_eq!(next(&mut f, FieldName::VictimSex), Some(f.notes[0]));
    }

    #[test_log::test]
    fn test_skips_notes_the_user_annotated() {
        let mut f = fixture(2);
        f.store
            .insert_annotation(f.annotator, f.notes[0], FieldName::VictimAge, "adult")
            .unwrap();
        assert_eq!(next(&mut f, FieldName::VictimAge), Some(f.notes[1]));

        // someone else still gets the first note
        let other = f.store.insert_user("other@example.com", None).unwrap().user_id;
        let assignment =
            select_next(&mut f.store, &f.config, FieldName::VictimAge, other, None).unwrap();
        assert_eq!(assignment.map(|n| n.note_id), Some(f.notes[0]));
    }

    #[test_log::test]
    fn test_none_when_exhausted() {
        let mut f = fixture(2);
        for note in f.notes.clone() {
            f.store
                .insert_annotation(f.annotator, note, FieldName::VictimSex, "mujer")
                .unwrap();
        }
        assert_eq!(next(&mut f, FieldName::VictimSex), None);
    }

    #[test_log::test]
    fn test_skips_notes_over_counters() {
        let mut f = fixture(3);
        for _ in 0..=f.config.omit_valid_threshold {
            f.store.increment_note_invalid(f.notes[0]).unwrap();
            f.store.increment_note_unavailable(f.notes[1]).unwrap();
        }
        assert_eq!(next(&mut f, FieldName::VictimAge), Some(f.notes[2]));
    }

    #[test_log::test]
    fn test_counters_at_threshold_are_still_assignable() {
        let mut f = fixture(1);
        for _ in 0..f.config.omit_valid_threshold {
            f.store.increment_note_invalid(f.notes[0]).unwrap();
            f.store.increment_note_unavailable(f.notes[0]).unwrap();
        }
        assert_eq!(next(&mut f, FieldName::VictimAge), Some(f.notes[0]));
    }

    #[test_log::test]
    fn test_skips_notes_of_blocked_owners() {
        let mut f = fixture(1);
        let good_owner = f.store.insert_user("good@example.com", None).unwrap().user_id;
        let good_note = f
            .store
            .insert_note(&NewNote {
                user_id: good_owner,
                urls: vec!["https://example.com/good".to_string()],
                custom_id: None,
            })
            .unwrap()
            .note_id;
        f.store.set_user_blocked(f.owner, true);
        assert_eq!(next(&mut f, FieldName::VictimAge), Some(good_note));
    }

    #[test_log::test]
    fn test_blocked_user_gets_nothing() {
        let mut f = fixture(1);
        f.store.set_user_blocked(f.annotator, true);
        assert_eq!(next(&mut f, FieldName::VictimAge), None);
    }

    #[test_log::test]
    fn test_restrict_to() {
        let mut f = fixture(3);
        let only = HashSet::from([f.notes[2]]);
        let assignment =
            select_next(&mut f.store, &f.config, FieldName::VictimAge, f.annotator, Some(only))
                .unwrap();
        assert_eq!(assignment.map(|n| n.note_id), Some(f.notes[2]));

        let none = select_next(
            &mut f.store,
            &f.config,
            FieldName::VictimAge,
            f.annotator,
            Some(HashSet::new()),
        )
        .unwrap();
        assert_eq!(none, None);
    }

    #[test_log::test]
    fn test_victimizer_fields_need_victimizer_info() {
        let mut f = fixture(3);
        assert_eq!(next(&mut f, FieldName::VictimizerSex), None);

        f.store
            .insert_validated_annotation_if_absent(f.notes[0], FieldName::HasVictimizerInfo, "false")
            .unwrap();
        f.store
            .insert_validated_annotation_if_absent(f.notes[1], FieldName::HasVictimizerInfo, "true")
            .unwrap();
        assert_eq!(next(&mut f, FieldName::VictimizerSex), Some(f.notes[1]));
        assert_eq!(next(&mut f, FieldName::VictimizerAge), Some(f.notes[1]));
        // vehicle does not depend on it
        assert_eq!(next(&mut f, FieldName::VictimizerVehicle), Some(f.notes[0]));
    }

    #[test_log::test]
    fn test_never_offers_validated_or_annotated_notes() {
        let mut f = fixture(6);
        for (i, note) in f.notes.clone().into_iter().enumerate() {
            if i % 2 == 0 {
                f.store
                    .insert_validated_annotation_if_absent(note, FieldName::AccidentTime, "7:00")
                    .unwrap();
            }
            if i % 3 == 0 {
                f.store
                    .insert_annotation(f.annotator, note, FieldName::AccidentTime, "8:00")
                    .unwrap();
            }
        }

        let mut offered = Vec::new();
        while let Some(note) = next(&mut f, FieldName::AccidentTime) {
            offered.push(note);
            f.store
                .insert_annotation(f.annotator, note, FieldName::AccidentTime, "9:00")
                .unwrap();
        }
        assert_eq!(offered, vec![f.notes[1], f.notes[5]]);
    }
}
