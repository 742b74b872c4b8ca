//! Structural comparison of two tree indexes
//!
//! [`IndexesDiff::diff`] compares content, index attributes and per-path
//! attribute maps with one generic algorithm, [`map_diff`]:
//!
//! - key in both with unequal values: [`ElementState::Modified`]
//! - key only in the first map: [`ElementState::Removed`]
//! - key only in the second map: [`ElementState::Added`]
//! - key in both with equal values: omitted
//!
//! Content entries are compared by asset id, so byte-identical files from
//! different sources are unchanged. Per-path attribute maps are stored whole;
//! the attribute level diff of one path is computed on request by
//! [`IndexesDiff::content_item_attributes_diff`].

use crate::asset::Asset;
use crate::error::{PielError, Result};
use crate::tree_index::{Attributes, TreeIndex};
use std::collections::BTreeMap;
use std::fmt;

/// Classification of one diff entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementState {
    /// Same on both sides; never produced by [`map_diff`]
    Unmodified,
    /// Only in the second snapshot
    Added,
    /// Only in the first snapshot
    Removed,
    /// In both with different values
    Modified,
}

impl ElementState {
    /// One letter status code
    pub fn letter(self) -> char {
        match self {
            ElementState::Unmodified => ' ',
            ElementState::Added => 'A',
            ElementState::Removed => 'D',
            ElementState::Modified => 'M',
        }
    }
}

impl fmt::Display for ElementState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ElementState::Unmodified => "<unmodified>",
            ElementState::Added => "<added>",
            ElementState::Removed => "<removed>",
            ElementState::Modified => "<modified>",
        };
        f.write_str(name)
    }
}

/// One changed entry with both sides; the missing side is `V::default()`
#[derive(Debug, Clone, PartialEq)]
pub struct Change<V> {
    /// Kind of change
    pub state: ElementState,
    /// Value in the first snapshot
    pub first: V,
    /// Value in the second snapshot
    pub second: V,
}

/// Changed entries by key
pub type DiffMap<K, V> = BTreeMap<K, Change<V>>;
/// Content changes by path
pub type ContentDiff = DiffMap<String, Asset>;
/// Attribute changes by name
pub type AttributesDiff = DiffMap<String, String>;
/// Per-path attribute map changes by path
pub type ContentAttributesDiff = DiffMap<String, Attributes>;

/// Diff two ordered maps under the equality `eq`
pub fn map_diff<K, V, F>(first: &BTreeMap<K, V>, second: &BTreeMap<K, V>, eq: F) -> DiffMap<K, V>
where
    K: Ord + Clone,
    V: Clone + Default,
    F: Fn(&V, &V) -> bool,
{
    let mut result = DiffMap::new();

    for (key, first_value) in first {
        match second.get(key) {
            Some(second_value) if eq(first_value, second_value) => {}
            Some(second_value) => {
                result.insert(
                    key.clone(),
                    Change {
                        state: ElementState::Modified,
                        first: first_value.clone(),
                        second: second_value.clone(),
                    },
                );
            }
            None => {
                result.insert(
                    key.clone(),
                    Change {
                        state: ElementState::Removed,
                        first: first_value.clone(),
                        second: V::default(),
                    },
                );
            }
        }
    }

    for (key, second_value) in second {
        if !first.contains_key(key) {
            result.insert(
                key.clone(),
                Change {
                    state: ElementState::Added,
                    first: V::default(),
                    second: second_value.clone(),
                },
            );
        }
    }

    result
}

/// Differences between two tree indexes
#[derive(Debug, Clone, Default)]
pub struct IndexesDiff {
    content_diff: ContentDiff,
    attributes_diff: AttributesDiff,
    content_attributes_diff: ContentAttributesDiff,
}

impl IndexesDiff {
    /// Compare `first` (old) with `second` (new)
    pub fn diff(first: &TreeIndex, second: &TreeIndex) -> Self {
        Self {
            content_diff: map_diff(first.content(), second.content(), |a, b| a == b),
            attributes_diff: map_diff(first.attributes(), second.attributes(), |a, b| a == b),
            content_attributes_diff: map_diff(
                first.content_attributes(),
                second.content_attributes(),
                |a, b| a == b,
            ),
        }
    }

    /// Content changes
    pub fn content_diff(&self) -> &ContentDiff {
        &self.content_diff
    }

    /// Index attribute changes
    pub fn attributes_diff(&self) -> &AttributesDiff {
        &self.attributes_diff
    }

    /// Per-path attribute map changes
    pub fn content_attributes_diff(&self) -> &ContentAttributesDiff {
        &self.content_attributes_diff
    }

    /// Check that the snapshots are equal in every respect
    pub fn is_empty(&self) -> bool {
        self.content_diff.is_empty()
            && self.attributes_diff.is_empty()
            && self.content_attributes_diff.is_empty()
    }

    /// Check for changes to content or per-path attributes
    ///
    /// Index attributes (message, author, ...) are ignored, which is what a
    /// working tree compared against a commit needs.
    pub fn has_content_changes(&self) -> bool {
        !self.content_diff.is_empty() || !self.content_attributes_diff.is_empty()
    }

    /// Attribute level diff of one path
    ///
    /// # Errors
    ///
    /// - [`PielError::UnableToGetPathAttributesMap`] if the path has no
    ///   attribute map change
    pub fn content_item_attributes_diff(&self, path: &str) -> Result<AttributesDiff> {
        let change = self
            .content_attributes_diff
            .get(path)
            .ok_or_else(|| PielError::UnableToGetPathAttributesMap {
                path: path.to_string(),
            })?;
        Ok(map_diff(&change.first, &change.second, |a, b| a == b))
    }
}

fn asset_label(asset: &Asset) -> String {
    match asset.id() {
        Ok(id) => id.to_string(),
        Err(_) => "<unknown>".to_string(),
    }
}

fn tabs(f: &mut fmt::Formatter<'_>, count: usize) -> fmt::Result {
    for _ in 0..count {
        f.write_str("\t")?;
    }
    Ok(())
}

/// `attribute:` at `level`, its state one deeper and both values two deeper
fn write_attributes(f: &mut fmt::Formatter<'_>, diff: &AttributesDiff, level: usize) -> fmt::Result {
    for (name, change) in diff {
        tabs(f, level)?;
        writeln!(f, "attribute: {}", name)?;
        tabs(f, level + 1)?;
        writeln!(f, "state: {}", change.state)?;
        tabs(f, level + 2)?;
        writeln!(f, "first: {}", change.first)?;
        tabs(f, level + 2)?;
        writeln!(f, "second: {}", change.second)?;
    }
    Ok(())
}

impl fmt::Display for IndexesDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_attributes(f, &self.attributes_diff, 0)?;

        for (path, change) in &self.content_diff {
            writeln!(f, "path: {}", path)?;
            tabs(f, 1)?;
            writeln!(f, "state: {}", change.state)?;
            tabs(f, 2)?;
            writeln!(f, "first: {}", asset_label(&change.first))?;
            tabs(f, 2)?;
            writeln!(f, "second: {}", asset_label(&change.second))?;

            // Nested below the asset lines
            if let Ok(attrs) = self.content_item_attributes_diff(path) {
                write_attributes(f, &attrs, 3)?;
            }
        }

        // Paths whose attributes changed while content stayed
        for path in self.content_attributes_diff.keys() {
            if self.content_diff.contains_key(path) {
                continue;
            }
            if let Ok(attrs) = self.content_item_attributes_diff(path) {
                writeln!(f, "path: {}", path)?;
                write_attributes(f, &attrs, 1)?;
            }
        }

        Ok(())
    }
}
