//! Moderation counters for notes and users.
//!
//! Counter updates are best-effort: a missing note or user is skipped silently.

use crate::{AnnotationRepository, Config, NoteId, UserId};
use anyhow::Result;
use std::collections::HashSet;

/// Count one more "this note is unavailable" report.
pub fn increment_unavailable<R>(repo: &mut R, note_id: NoteId) -> Result<()>
where
    R: AnnotationRepository + ?Sized,
{
    match repo.increment_note_unavailable(note_id)? {
        Some(counter) => log::debug!("Note #{note_id} unavailable counter is now {counter}"),
        None => log::debug!("Skipped unavailable report for missing note #{note_id}"),
    }
    Ok(())
}

/// Count one more "this note is invalid" report and charge `user_id` with an invalid note when
/// the note crosses the omit threshold. The user is charged once per note, on the crossing.
pub fn increment_invalid<R>(
    repo: &mut R,
    config: &Config,
    note_id: NoteId,
    user_id: UserId,
) -> Result<()>
where
    R: AnnotationRepository + ?Sized,
{
    let Some(counter) = repo.increment_note_invalid(note_id)? else {
        log::debug!("Skipped invalid report for missing note #{note_id}");
        return Ok(());
    };

    if counter == config.omit_valid_threshold + 1 {
        match repo.increment_user_invalid_notes(user_id)? {
            Some(user_counter) => log::info!(
                "Note #{note_id} is now invalid, user #{user_id} has {user_counter} invalid notes"
            ),
            None => log::debug!("Skipped invalid note charge for missing user #{user_id}"),
        }
    }
    Ok(())
}

/// Users whose notes and contributions are no longer accepted.
pub fn get_blocked_user_ids<R>(repo: &mut R, config: &Config) -> Result<HashSet<UserId>>
where
    R: AnnotationRepository + ?Sized,
{
    repo.get_blocked_user_ids(config.block_threshold)
}

pub fn is_user_blocked<R>(repo: &mut R, config: &Config, user_id: UserId) -> Result<bool>
where
    R: AnnotationRepository + ?Sized,
{
    Ok(get_blocked_user_ids(repo, config)?.contains(&user_id))
}
