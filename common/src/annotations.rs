//! Reading and writing notes and their annotations.

use crate::repository::NewNote;
use crate::{
    AnnotateError, AnnotateOutcome, AnnotationReceipt, AnnotationRepository, Config, FieldName,
    NoteId, NoteRecord, NoteWithAnnotations, UserId,
};
use anyhow::Result;
use url::Url;

/// Record one annotation, promoting it to validated first when consensus was reached.
///
/// The validated row is written before the duplicate check, so a user resubmitting a value that
/// now reaches the threshold still promotes it. Only the first promotion for a note and property
/// is kept.
pub fn add_annotation<R>(
    repo: &mut R,
    user_id: UserId,
    note_id: NoteId,
    property: FieldName,
    value: &str,
    is_consensus_reached: bool,
) -> Result<AnnotationReceipt>
where
    R: AnnotationRepository + ?Sized,
{
    let mut validated = false;
    if is_consensus_reached {
        validated = repo.insert_validated_annotation_if_absent(note_id, property, value)?;
        if validated {
            log::info!("Validated {property} = {value:?} on note #{note_id}");
        } else {
            log::debug!("Note #{note_id} already has a validated {property}");
        }
    }

    if repo.annotation_exists(user_id, note_id, property, value)? {
        return Ok(AnnotationReceipt {
            outcome: AnnotateOutcome::AlreadyAnnotated,
            validated,
        });
    }

    repo.insert_annotation(user_id, note_id, property, value)?;
    Ok(AnnotationReceipt {
        outcome: AnnotateOutcome::Annotated,
        validated,
    })
}

pub fn get_note_with_annotations<R>(
    repo: &mut R,
    note_id: NoteId,
) -> Result<Option<NoteWithAnnotations>>
where
    R: AnnotationRepository + ?Sized,
{
    repo.get_note_with_annotations(note_id)
}

/// Replace the free-text comment on a note.
pub fn update_comment<R>(repo: &mut R, note_id: NoteId, comments: &str) -> Result<(), AnnotateError>
where
    R: AnnotationRepository + ?Sized,
{
    if repo.update_note_comments(note_id, comments.trim())? {
        Ok(())
    } else {
        Err(AnnotateError::NoteNotFound {
            note_id,
            field: None,
        })
    }
}

/// Trim, check and de-duplicate the source urls of a new note, keeping their order.
pub fn normalize_note_urls(config: &Config, urls: &[String]) -> Result<Vec<String>, AnnotateError> {
    let mut normalized: Vec<String> = Vec::with_capacity(urls.len());
    for raw in urls.iter().map(|url| url.trim()).filter(|url| !url.is_empty()) {
        let url = Url::parse(raw)
            .map_err(|e| AnnotateError::InvalidNote(format!("`{raw}` is not a url: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(AnnotateError::InvalidNote(format!(
                "`{raw}` is not a web address"
            )));
        }
        if !normalized.iter().any(|existing| existing == raw) {
            normalized.push(raw.to_string());
        }
    }

    if normalized.is_empty() {
        return Err(AnnotateError::InvalidNote(
            "at least one url is required".to_string(),
        ));
    }
    if normalized.len() > config.max_note_urls {
        return Err(AnnotateError::InvalidNote(format!(
            "a note can have at most {} urls",
            config.max_note_urls
        )));
    }
    Ok(normalized)
}

/// Create a note owned by `user_id`.
pub fn create_note<R>(
    repo: &mut R,
    config: &Config,
    user_id: UserId,
    urls: &[String],
    custom_id: Option<&str>,
) -> Result<NoteRecord, AnnotateError>
where
    R: AnnotationRepository + ?Sized,
{
    let urls = normalize_note_urls(config, urls)?;
    let custom_id = custom_id
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(ToString::to_string);

    let note = repo.insert_note(&NewNote {
        user_id,
        urls,
        custom_id,
    })?;
    log::info!("User #{user_id} created note #{}", note.note_id);
    Ok(note)
}
