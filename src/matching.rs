//! Slot-to-ground-truth identity matching.
//!
//! The model fills a fixed number of agent slots per sample, while the
//! benchmark names its own agents of interest. Matching decides which slots
//! are exported and which agents of interest have no slot at all.

use std::collections::HashSet;

use serde::Deserialize;

use crate::sample::TrackId;
use crate::{Error, Result};

/// What to do when one track id occupies more than one non-empty slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Select only the first slot carrying the id and record the anomaly.
    #[default]
    KeepFirst,
    /// Fail with `Error::DuplicateIdentity`.
    Reject,
}

/// Outcome of matching one sample.
///
/// `slot_selected` and `interest_missing` are not complements: an id is
/// missing only when no slot carries it at all.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MatchResult {
    /// Per slot: carries an id listed among the agents of interest.
    pub slot_selected: Vec<bool>,
    /// Per agents-of-interest entry: id has no slot in this sample.
    pub interest_missing: Vec<bool>,
    /// Ids found in more than one slot (only populated under `KeepFirst`).
    pub duplicates: Vec<TrackId>,
}

impl MatchResult {
    /// Ids flagged missing, in agents-of-interest order.
    pub fn missing_ids(&self, agents_of_interest: &[Option<TrackId>]) -> Vec<TrackId> {
        agents_of_interest
            .iter()
            .zip(&self.interest_missing)
            .filter(|(_, &missing)| missing)
            .filter_map(|(id, _)| *id)
            .collect()
    }

    /// Indices of the selected slots.
    pub fn selected_slots(&self) -> Vec<usize> {
        self.slot_selected
            .iter()
            .enumerate()
            .filter(|(_, &selected)| selected)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn num_selected(&self) -> usize {
        self.slot_selected.iter().filter(|&&s| s).count()
    }

    pub fn num_missing(&self) -> usize {
        self.interest_missing.iter().filter(|&&m| m).count()
    }
}

/// Match one sample's slot ids against its agents of interest.
///
/// # Arguments
/// * `timestamp` - Sample timestamp (for error reporting)
/// * `slot_ids` - Track id per slot, `None` for empty slots
/// * `agents_of_interest` - Padded agents-of-interest list
/// * `policy` - Handling of ids present in more than one slot
///
/// An id listed twice among the agents of interest fails with
/// `Error::DuplicateInterest` regardless of `policy`.
pub fn match_sample(
    timestamp: i64,
    slot_ids: &[Option<TrackId>],
    agents_of_interest: &[Option<TrackId>],
    policy: DuplicatePolicy,
) -> Result<MatchResult> {
    let mut interest: HashSet<TrackId> = HashSet::with_capacity(agents_of_interest.len());
    for &id in agents_of_interest.iter().flatten() {
        if !interest.insert(id) {
            return Err(Error::DuplicateInterest {
                timestamp,
                track_id: id.raw(),
            });
        }
    }

    let mut seen: HashSet<TrackId> = HashSet::with_capacity(slot_ids.len());
    let mut duplicates = Vec::new();
    let mut slot_selected = vec![false; slot_ids.len()];

    for (i, id) in slot_ids.iter().enumerate() {
        let Some(id) = *id else { continue };

        if !seen.insert(id) {
            match policy {
                DuplicatePolicy::Reject => {
                    return Err(Error::DuplicateIdentity {
                        timestamp,
                        track_id: id.raw(),
                    });
                }
                DuplicatePolicy::KeepFirst => {
                    if !duplicates.contains(&id) {
                        duplicates.push(id);
                    }
                    continue;
                }
            }
        }

        slot_selected[i] = interest.contains(&id);
    }

    let interest_missing = agents_of_interest
        .iter()
        .map(|id| id.map_or(false, |id| !seen.contains(&id)))
        .collect();

    Ok(MatchResult {
        slot_selected,
        interest_missing,
        duplicates,
    })
}
