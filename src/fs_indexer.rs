//! Building a tree index from a directory
//!
//! The indexer walks a directory without following symbolic links. Regular
//! files become file-backed assets, symbolic links become byte assets holding
//! the link target. Directories themselves are not recorded, so empty
//! directories do not appear in the index.
//!
//! ## Example
//!
//! ```rust,no_run
//! use piel::FsIndexer;
//!
//! # fn example() -> piel::Result<()> {
//! let index = FsIndexer::new("./project").exclude(".pie").build()?;
//! for path in index.index_paths() {
//!     println!("{}", path);
//! }
//! # Ok(())
//! # }
//! ```

use crate::asset::Asset;
use crate::error::{PielError, Result};
use crate::tree_index::{PredefinedAttributes, TreeIndex};
use crate::utils;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};
use walkdir::WalkDir;

/// Directory walker producing a [`TreeIndex`]
#[derive(Debug, Clone)]
pub struct FsIndexer {
    /// Directory to index
    root: PathBuf,
    /// Names of top level entries to skip
    excluded: Vec<String>,
}

impl FsIndexer {
    /// Create an indexer for `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            excluded: Vec::new(),
        }
    }

    /// Skip the top level entry called `name` and everything below it
    pub fn exclude(mut self, name: impl Into<String>) -> Self {
        self.excluded.push(name.into());
        self
    }

    /// Root directory being indexed
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Walk the directory and index every file and symbolic link
    ///
    /// A root that is not a directory yields an empty index.
    ///
    /// # Errors
    ///
    /// - [`PielError::WalkDir`] if an entry can not be read
    /// - [`PielError::PathConversion`] for names or link targets that are not
    ///   valid UTF-8
    pub fn build(&self) -> Result<TreeIndex> {
        let mut index = TreeIndex::new();

        if !self.root.is_dir() {
            debug!("{:?} is not a directory", self.root);
            return Ok(index);
        }

        let walker = WalkDir::new(&self.root)
            .follow_links(false)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !(entry.depth() == 1 && self.is_excluded(entry.file_name())));

        for entry in walker {
            let entry = entry?;
            let file_type = entry.file_type();

            if file_type.is_dir() {
                trace!("d {:?}", entry.path());
                continue;
            }

            let path = utils::index_path(&self.root, entry.path())?;

            if file_type.is_symlink() {
                let target = fs::read_link(entry.path())?;
                let target = target
                    .to_str()
                    .ok_or_else(|| PielError::PathConversion(target.as_os_str().to_os_string()))?;
                let mode = utils::permissions(&entry.metadata()?);
                let asset = Asset::create_for_str(target);
                trace!("s {} -> {}", path, target);

                if self.insert(&mut index, &path, asset) {
                    PredefinedAttributes::fill_symlink_attrs(&mut index, &path, mode);
                }
            } else if file_type.is_file() {
                let mode = utils::permissions(&entry.metadata()?);
                let asset = Asset::create_for_path(entry.path());
                trace!("f {}", path);

                if self.insert(&mut index, &path, asset) {
                    PredefinedAttributes::fill_file_attrs(&mut index, &path, mode);
                }
            } else {
                debug!("Skip special file {:?}", entry.path());
            }
        }

        debug!("Indexed {} items under {:?}", index.content().len(), self.root);
        Ok(index)
    }

    fn is_excluded(&self, name: &std::ffi::OsStr) -> bool {
        self.excluded.iter().any(|excluded| name == excluded.as_str())
    }

    fn insert(&self, index: &mut TreeIndex, path: &str, asset: Asset) -> bool {
        let inserted = index.insert_path(path, asset);
        if !inserted {
            warn!("Path is already indexed, skipped: {}", path);
        }
        inserted
    }
}
