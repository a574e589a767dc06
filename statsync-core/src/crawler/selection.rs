use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::types::{RegistryEntry, SubjectId};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Candidate {
    pub entry: RegistryEntry,
    /// `None` for subjects that were never synced.
    pub latest_fetched_at: Option<DateTime<Utc>>,
}

/// Picks the subjects due for a crawl: never synced, or last synced before
/// `cutoff`. Never-synced subjects come first, then oldest first; ties are
/// broken by subject id so the order is deterministic. Duplicate registry
/// rows are collapsed onto their first occurrence.
pub fn select_candidates(
    entries: Vec<RegistryEntry>,
    latest: &HashMap<SubjectId, DateTime<Utc>>,
    cutoff: DateTime<Utc>,
    limit: Option<usize>,
) -> Vec<Candidate> {
    let mut seen = HashSet::new();
    let mut due: Vec<Candidate> = entries
        .into_iter()
        .filter(|entry| seen.insert(entry.subject_id.clone()))
        .map(|entry| Candidate {
            latest_fetched_at: latest.get(&entry.subject_id).copied(),
            entry,
        })
        .filter(|candidate| {
            candidate
                .latest_fetched_at
                .is_none_or(|fetched_at| fetched_at < cutoff)
        })
        .collect();

    // `None < Some(_)`, so never-synced subjects sort first.
    due.sort_by(|a, b| {
        a.latest_fetched_at
            .cmp(&b.latest_fetched_at)
            .then_with(|| a.entry.subject_id.cmp(&b.entry.subject_id))
    });

    if let Some(limit) = limit {
        due.truncate(limit);
    }
    due
}
