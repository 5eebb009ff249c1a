//! The full path from a client's submission to stored annotations and counters.
//!
//! One pipeline serves every property; the per-property differences live in the field registry.

use crate::annotations::add_annotation;
use crate::consensus::is_consensus_reached;
use crate::fields::SubmittedValue;
use crate::{
    AnnotateError, AnnotateOutcome, AnnotationReceipt, AnnotationRepository, Config, FieldName,
    NOT_AVAILABLE, NoteId, NoteRecord, UserId, ledger,
};
use serde::{Deserialize, Serialize};

/// Why a volunteer skipped a note or property.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OmitAction {
    /// The property is not mentioned in the articles.
    UnavailableProperty,
    /// The articles cannot be opened.
    UnavailableNote,
    /// The note is not about a collision.
    InvalidNote,
}

/// Reject users that do not exist or are blocked.
pub fn require_active_user<R>(repo: &mut R, config: &Config, user_id: UserId) -> Result<(), AnnotateError>
where
    R: AnnotationRepository + ?Sized,
{
    if repo.get_user(user_id)?.is_none() {
        return Err(AnnotateError::InvalidRequest(format!(
            "user #{user_id} does not exist"
        )));
    }
    if ledger::is_user_blocked(repo, config, user_id)? {
        return Err(AnnotateError::UserBlocked(user_id));
    }
    Ok(())
}

fn load_note<R>(repo: &mut R, note_id: NoteId, property: FieldName) -> Result<NoteRecord, AnnotateError>
where
    R: AnnotationRepository + ?Sized,
{
    repo.get_note(note_id)?.ok_or(AnnotateError::NoteNotFound {
        note_id,
        field: Some(property),
    })
}

/// Check consensus against the note's stored annotations and record `value`.
fn record<R>(
    repo: &mut R,
    config: &Config,
    user_id: UserId,
    note_id: NoteId,
    property: FieldName,
    value: &str,
) -> Result<AnnotationReceipt, AnnotateError>
where
    R: AnnotationRepository + ?Sized,
{
    let note = repo
        .get_note_with_annotations(note_id)?
        .ok_or(AnnotateError::NoteNotFound {
            note_id,
            field: Some(property),
        })?;
    let descriptor = config.registry.descriptor(property);
    let reached = is_consensus_reached(config, &note.annotations, descriptor, value, user_id);
    Ok(add_annotation(repo, user_id, note_id, property, value, reached)?)
}

/// Validate and record a value for one property of a note.
pub fn submit_annotation<R>(
    repo: &mut R,
    config: &Config,
    user_id: UserId,
    note_id: NoteId,
    property: FieldName,
    submitted: &SubmittedValue,
) -> Result<AnnotationReceipt, AnnotateError>
where
    R: AnnotationRepository + ?Sized,
{
    require_active_user(repo, config, user_id)?;
    let value = config.registry.descriptor(property).canonicalize(submitted)?;
    let receipt = record(repo, config, user_id, note_id, property, &value)?;
    log::debug!(
        "User #{user_id} submitted {property} on note #{note_id}: {}",
        receipt.outcome.as_str()
    );
    Ok(receipt)
}

/// Record a "not available" marker and, for note-level reports, bump the note's counters.
///
/// Counters only move when the marker is new for this user, so repeated reports from one user
/// count once. Invalid-note reports charge the note's owner, not the reporting user.
pub fn omit<R>(
    repo: &mut R,
    config: &Config,
    user_id: UserId,
    note_id: NoteId,
    property: FieldName,
    action: OmitAction,
) -> Result<AnnotationReceipt, AnnotateError>
where
    R: AnnotationRepository + ?Sized,
{
    require_active_user(repo, config, user_id)?;
    let note = load_note(repo, note_id, property)?;

    let receipt = record(repo, config, user_id, note_id, property, NOT_AVAILABLE)?;
    if receipt.outcome == AnnotateOutcome::Annotated {
        match action {
            OmitAction::UnavailableProperty => {}
            OmitAction::UnavailableNote => ledger::increment_unavailable(repo, note_id)?,
            OmitAction::InvalidNote => {
                ledger::increment_invalid(repo, config, note_id, note.user_id)?
            }
        }
    }
    log::debug!(
        "User #{user_id} omitted {property} on note #{note_id} ({action:?}): {}",
        receipt.outcome.as_str()
    );
    Ok(receipt)
}
