use std::collections::HashSet;

use crate::types::{Snapshot, TextureHistoryItem, TextureSlot};

/// Lazy, URL-deduplicated texture history of one subject.
///
/// Built over snapshots ordered newest first, it yields each distinct URL of
/// the slot once, stamped with its most recent observation. Cloning restarts
/// the walk from the newest snapshot.
#[derive(Clone, Debug)]
pub struct TextureHistory {
    snapshots: std::vec::IntoIter<Snapshot>,
    slot: TextureSlot,
    seen: HashSet<String>,
}

impl TextureHistory {
    pub fn new(newest_first: Vec<Snapshot>, slot: TextureSlot) -> Self {
        Self {
            snapshots: newest_first.into_iter(),
            slot,
            seen: HashSet::new(),
        }
    }

    pub fn slot(&self) -> TextureSlot {
        self.slot
    }
}

impl Iterator for TextureHistory {
    type Item = TextureHistoryItem;

    fn next(&mut self) -> Option<Self::Item> {
        for snapshot in self.snapshots.by_ref() {
            let Some(url) = snapshot.texture_url(self.slot) else {
                continue;
            };
            if self.seen.insert(url.to_string()) {
                return Some(TextureHistoryItem {
                    url: url.to_string(),
                    fetched_at: snapshot.fetched_at,
                });
            }
        }
        None
    }
}
