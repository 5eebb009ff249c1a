//! Establish annotation consensus.
//!
//! Support is counted in users, not rows: one volunteer who stores several agreeing values (for
//! example the same name spelled twice) still counts once.

use crate::fields::FieldDescriptor;
use crate::{AnnotationRecord, Config, UserId};
use chrono::{DateTime, Utc};
use itertools::Itertools;
use std::collections::HashSet;

fn agreeing_users<'a>(
    annotations: &'a [AnnotationRecord],
    descriptor: &'a FieldDescriptor,
    candidate: &'a str,
) -> impl Iterator<Item = UserId> + 'a {
    annotations
        .iter()
        .filter(move |a| {
            a.property_name == descriptor.name && descriptor.agrees(&a.value, candidate)
        })
        .map(|a| a.user_id)
        .unique()
}

/// Count the users whose annotations of the descriptor's property agree with `candidate`.
pub fn count_matching(
    annotations: &[AnnotationRecord],
    descriptor: &FieldDescriptor,
    candidate: &str,
) -> usize {
    agreeing_users(annotations, descriptor, candidate).count()
}

/// Given the annotations already stored for a note, decide whether `submitter` writing
/// `candidate` reaches the agreement threshold. The submitter counts as one; their own earlier
/// annotations do not count again.
pub fn is_consensus_reached(
    config: &Config,
    annotations: &[AnnotationRecord],
    descriptor: &FieldDescriptor,
    candidate: &str,
    submitter: UserId,
) -> bool {
    let threshold = config.threshold_for(candidate) as usize;
    let others = agreeing_users(annotations, descriptor, candidate)
        .filter(|user_id| *user_id != submitter)
        .count();
    others >= threshold.saturating_sub(1)
}

/// A set of annotations that agree with each other.
#[derive(Debug, Clone, PartialEq)]
pub struct AgreementGroup {
    /// The value of the earliest annotation in the group.
    pub value: String,
    /// Distinct users in the group.
    pub support: usize,
    pub first_annotated_at: DateTime<Utc>,
}

/// Group the annotations of the descriptor's property by agreement and return the best-supported
/// group. Ties go to the group that was annotated first, then to the smaller value.
///
/// Annotations are visited oldest first and join the first group whose value they agree with, so
/// proximity groups are anchored on their earliest pin.
pub fn evaluate_majority(
    annotations: &[AnnotationRecord],
    descriptor: &FieldDescriptor,
) -> Option<AgreementGroup> {
    let mut groups: Vec<(AgreementGroup, HashSet<UserId>)> = Vec::new();
    for annotation in annotations
        .iter()
        .filter(|a| a.property_name == descriptor.name)
        .sorted_by_key(|a| (a.created_at, a.annotation_id))
    {
        match groups
            .iter_mut()
            .find(|(g, _)| descriptor.agrees(&g.value, &annotation.value))
        {
            Some((group, users)) => {
                users.insert(annotation.user_id);
                group.support = users.len();
            }
            None => groups.push((
                AgreementGroup {
                    value: annotation.value.clone(),
                    support: 1,
                    first_annotated_at: annotation.created_at,
                },
                HashSet::from([annotation.user_id]),
            )),
        }
    }

    groups.into_iter().map(|(group, _)| group).min_by(|a, b| {
        b.support
            .cmp(&a.support)
            .then(a.first_annotated_at.cmp(&b.first_annotated_at))
            .then(a.value.cmp(&b.value))
    })
}
