//! Tally of the change list written by a build session.
use crate::types::FileState;
use serde::Serialize;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ChangeCounter {
    pub added: usize,
    pub modified: usize,
    pub deleted: usize,
    pub unchanged: usize,
}

impl ChangeCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(&mut self, state: FileState) {
        match state {
            FileState::None => self.unchanged += 1,
            FileState::Added => self.added += 1,
            FileState::Modified => self.modified += 1,
            FileState::Deleted => self.deleted += 1,
        }
    }

    /// Number of entries that a patch generation has to carry.
    pub fn changed(&self) -> usize {
        self.added + self.modified + self.deleted
    }
}

impl std::fmt::Display for ChangeCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Added: {}, Modified: {}, Deleted: {}, Unchanged: {}",
            self.added, self.modified, self.deleted, self.unchanged,
        )
    }
}
