use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::SubjectId;

/// A tracked subject as listed by the entry registry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub subject_id: SubjectId,
    pub display_name: String,
}

impl RegistryEntry {
    pub fn new(subject_id: SubjectId, display_name: impl Into<String>) -> Self {
        Self {
            subject_id,
            display_name: display_name.into(),
        }
    }
}

/// Canonical name change detected by the identity crawler.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityChange {
    pub subject_id: SubjectId,
    pub previous_name: String,
    pub current_name: String,
    pub observed_at: DateTime<Utc>,
}
