//! Walking the parent chain of a tree index

use crate::asset_id::AssetId;
use crate::error::Result;
use crate::storage::{self, StorageRef};
use crate::tree_index::TreeIndex;
use std::fmt;
use tracing::debug;

/// Iterator over an index and its ancestors, newest first
///
/// Ends after an index whose parent is empty or missing from the storage, or
/// after the initial index of a reference. A parent that fails to load is
/// yielded as an error and ends the walk.
#[derive(Debug)]
pub struct History {
    storage: StorageRef,
    next: Option<Result<TreeIndex>>,
}

impl History {
    /// Start walking at `start`
    pub fn new(storage: StorageRef, start: TreeIndex) -> Self {
        Self {
            storage,
            next: Some(Ok(start)),
        }
    }

    fn parent_of(&self, index: &TreeIndex) -> Option<Result<TreeIndex>> {
        if index.is_initial_index() {
            return None;
        }

        let id = index.parent().id().ok()?;
        if id.is_sentinel() {
            return None;
        }
        if !self.storage.contains(id) {
            debug!("Parent {} is not in storage, history ends", id);
            return None;
        }

        let asset = storage::asset(&self.storage, id.clone());
        Some(TreeIndex::load_asset(&asset, Some(&self.storage)))
    }
}

impl Iterator for History {
    type Item = Result<TreeIndex>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = match self.next.take()? {
            Ok(index) => index,
            Err(e) => return Some(Err(e)),
        };
        self.next = self.parent_of(&current);
        Some(Ok(current))
    }
}

/// Summary of one commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Index id
    pub id: AssetId,
    /// `author` attribute
    pub author: String,
    /// `email` attribute
    pub email: String,
    /// `message` attribute
    pub message: String,
}

impl LogEntry {
    /// Summarize an index
    pub fn from_index(index: &TreeIndex) -> Result<Self> {
        Ok(Self {
            id: index.self_id()?,
            author: index.author().to_string(),
            email: index.email().to_string(),
            message: index.message().to_string(),
        })
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", "-".repeat(80))?;
        writeln!(f, "author: {}", self.author)?;
        writeln!(f, "email: {}", self.email)?;
        writeln!(f, "id: {}", self.id)?;
        writeln!(f)?;
        writeln!(f, "{}", self.message)
    }
}
