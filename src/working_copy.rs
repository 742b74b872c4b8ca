//! Working copy: a directory bound to a local object storage
//!
//! A working copy keeps its metadata in a `.pie` directory at its root:
//!
//! ```text
//! <working dir>/
//! └── .pie/
//!     ├── storage/           # LocalDirectoryStorage
//!     ├── reference          # name of the current reference
//!     ├── index.json         # index the current reference points at
//!     └── config.properties  # author, email, ...
//! ```
//!
//! Everything else under the root is user data. Status, commit and checkout
//! all compare the index stored in `index.json` with a fresh snapshot of the
//! directory.
//!
//! ## Example
//!
//! ```rust,no_run
//! use piel::{CheckoutOptions, WorkingCopy};
//!
//! # fn example() -> piel::Result<()> {
//! let mut wc = WorkingCopy::init("./project", "main")?;
//! wc.set_config("author", "Jane")?;
//! std::fs::write("./project/notes.txt", "first")?;
//! let id = wc.commit("Add notes")?;
//! println!("Committed {}", id);
//!
//! wc.checkout("feature", CheckoutOptions { create_new_branch: true, ..Default::default() })?;
//! # Ok(())
//! # }
//! ```

use crate::asset_id::AssetId;
use crate::config::PredefinedConfigs;
use crate::error::{PielError, Result};
use crate::extractor::{AssetsExtractor, ExtractPolicy};
use crate::fs_indexer::FsIndexer;
use crate::history::{History, LogEntry};
use crate::indexes_diff::{ElementState, IndexesDiff};
use crate::properties::Properties;
use crate::storage::{self, LocalDirectoryStorage, ObjectsStorage, Reference, StorageRef};
use crate::tree_index::TreeIndex;
use crate::utils;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::{debug, info, trace};

/// Name of the metadata directory at the root of a working copy
pub const METADATA_DIR: &str = ".pie";
const STORAGE_DIR: &str = "storage";
const REFERENCE_FILE: &str = "reference";
const INDEX_FILE: &str = "index.json";
const CONFIG_FILE: &str = "config.properties";

/// Options of [`WorkingCopy::checkout`]
#[derive(Debug, Clone, Copy, Default)]
pub struct CheckoutOptions {
    /// Discard uncommitted changes
    pub force: bool,
    /// Create the reference when it does not exist
    pub create_new_branch: bool,
}

/// One attribute change of a status entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeChange {
    /// `Added` or `Modified`
    pub state: ElementState,
    /// Attribute name
    pub name: String,
    /// Committed value, empty when added
    pub first: String,
    /// Working directory value
    pub second: String,
}

/// One path of a status report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    /// Content state; `Unmodified` when only attributes changed
    pub state: ElementState,
    /// Index path
    pub path: String,
    /// Added or modified per-path attributes
    pub attributes: Vec<AttributeChange>,
}

/// Differences between the current reference and the working directory
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Status {
    /// Changed paths in path order
    pub entries: Vec<StatusEntry>,
    /// No content or attribute changes
    pub clean: bool,
}

impl Status {
    fn from_diff(diff: &IndexesDiff) -> Result<Self> {
        let mut paths: Vec<&String> = diff.content_diff().keys().collect();
        paths.extend(diff.content_attributes_diff().keys());
        paths.sort();
        paths.dedup();

        let mut entries = Vec::new();
        for path in paths {
            let state = diff
                .content_diff()
                .get(path)
                .map(|change| change.state)
                .unwrap_or(ElementState::Unmodified);

            let mut attributes = Vec::new();
            if diff.content_attributes_diff().contains_key(path) {
                for (name, change) in diff.content_item_attributes_diff(path)? {
                    if matches!(change.state, ElementState::Added | ElementState::Modified) {
                        attributes.push(AttributeChange {
                            state: change.state,
                            name,
                            first: change.first,
                            second: change.second,
                        });
                    }
                }
            }

            if state != ElementState::Unmodified || !attributes.is_empty() {
                entries.push(StatusEntry {
                    state,
                    path: path.clone(),
                    attributes,
                });
            }
        }

        Ok(Self {
            clean: entries.is_empty(),
            entries,
        })
    }

    /// `clean` or `dirty`
    pub fn label(&self) -> &'static str {
        if self.clean {
            "clean"
        } else {
            "dirty"
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            writeln!(f, "{} {}", entry.state.letter(), entry.path)?;
            for attr in &entry.attributes {
                writeln!(
                    f,
                    "\t{} attribute: {} {} -> {}",
                    attr.state.letter(),
                    attr.name,
                    attr.first,
                    attr.second
                )?;
            }
        }
        Ok(())
    }
}

/// Directory under version control
#[derive(Debug)]
pub struct WorkingCopy {
    working_dir: PathBuf,
    metadata_dir: PathBuf,
    storage: StorageRef,
    reference: String,
    reference_index: TreeIndex,
    config: Properties,
}

impl WorkingCopy {
    /// Turn `working_dir` into a working copy tracking `reference`
    ///
    /// The reference starts at an initial index with no content.
    ///
    /// # Errors
    ///
    /// - [`PielError::InvalidReferenceName`] if `reference` can not be stored
    /// - [`PielError::InitExistingWorkingCopy`] if metadata already exists
    pub fn init(working_dir: impl Into<PathBuf>, reference: &str) -> Result<Self> {
        storage::validate_reference_name(reference)?;
        let working_dir = working_dir.into();
        let metadata_dir = working_dir.join(METADATA_DIR);

        fs::create_dir_all(&working_dir)?;
        match fs::create_dir(&metadata_dir) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(PielError::InitExistingWorkingCopy(working_dir));
            }
            Err(e) => return Err(e.into()),
        }

        let storage: StorageRef = Arc::new(LocalDirectoryStorage::new(metadata_dir.join(STORAGE_DIR))?);

        let mut initial = TreeIndex::new();
        initial.initial_for(reference);
        storage.put_all(&initial.assets()?)?;
        storage.create_reference(&Reference::new(reference, initial.self_id()?))?;

        let mut wc = Self {
            working_dir,
            metadata_dir,
            storage,
            reference: String::new(),
            reference_index: TreeIndex::new(),
            config: Properties::new(),
        };
        wc.setup_current_tree(reference, &initial)?;

        info!("Initialized working copy {:?} on {}", wc.working_dir, reference);
        Ok(wc)
    }

    /// Attach to the working copy containing `dir`
    ///
    /// `dir` and then each of its ancestors is tried.
    ///
    /// # Errors
    ///
    /// - [`PielError::AttachToNonWorkingCopy`] if no working copy is found
    pub fn attach(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        for candidate in dir.ancestors() {
            trace!("Attempt to attach to {:?}", candidate);
            match Self::attach_at(candidate) {
                Ok(wc) => {
                    debug!("Attached to {:?} on {}", candidate, wc.reference);
                    return Ok(wc);
                }
                Err(PielError::AttachToNonWorkingCopy(_)) => {}
                Err(PielError::UnableToFindReferenceFile(path)) => {
                    trace!("No reference file {:?}", path);
                }
                Err(e) => return Err(e),
            }
        }
        Err(PielError::AttachToNonWorkingCopy(dir.to_path_buf()))
    }

    fn attach_at(working_dir: &Path) -> Result<Self> {
        let metadata_dir = working_dir.join(METADATA_DIR);
        let storage_dir = metadata_dir.join(STORAGE_DIR);
        if !metadata_dir.is_dir() || !storage_dir.is_dir() {
            return Err(PielError::AttachToNonWorkingCopy(working_dir.to_path_buf()));
        }

        let reference_file = metadata_dir.join(REFERENCE_FILE);
        if !reference_file.is_file() {
            return Err(PielError::UnableToFindReferenceFile(reference_file));
        }
        let mut reference = String::new();
        BufReader::new(File::open(&reference_file)?).read_line(&mut reference)?;
        let reference = reference.trim().to_string();

        let config = Properties::load_file(&metadata_dir.join(CONFIG_FILE))?;
        let storage: StorageRef = Arc::new(LocalDirectoryStorage::new(storage_dir)?);

        let index_file = metadata_dir.join(INDEX_FILE);
        let reference_index = if index_file.is_file() {
            TreeIndex::load(BufReader::new(File::open(&index_file)?), Some(&storage))?
        } else {
            TreeIndex::new()
        };

        Ok(Self {
            working_dir: working_dir.to_path_buf(),
            metadata_dir,
            storage,
            reference,
            reference_index,
            config,
        })
    }

    /// Root of the working copy
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// The `.pie` directory
    pub fn metadata_dir(&self) -> &Path {
        &self.metadata_dir
    }

    /// Local object storage
    pub fn storage(&self) -> &StorageRef {
        &self.storage
    }

    /// Name of the current reference
    pub fn current_reference(&self) -> &str {
        &self.reference
    }

    /// Index the current reference pointed at when last synchronized
    pub fn reference_index(&self) -> &TreeIndex {
        &self.reference_index
    }

    /// Snapshot of the working directory, metadata excluded
    pub fn working_dir_state(&self) -> Result<TreeIndex> {
        FsIndexer::new(&self.working_dir).exclude(METADATA_DIR).build()
    }

    /// Compare the current reference with the working directory
    pub fn status(&self) -> Result<Status> {
        let diff = IndexesDiff::diff(&self.reference_index, &self.working_dir_state()?);
        Status::from_diff(&diff)
    }

    /// Record the working directory as a new index on the current reference
    ///
    /// Returns the id of the new index.
    ///
    /// # Errors
    ///
    /// - [`PielError::NothingToCommit`] if the content did not change
    pub fn commit(&mut self, message: &str) -> Result<AssetId> {
        let mut index = self.working_dir_state()?;

        let diff = IndexesDiff::diff(&self.reference_index, &index);
        if !diff.has_content_changes() {
            debug!("Diff is empty");
            return Err(PielError::NothingToCommit);
        }
        trace!("Non empty diff:\n{}", diff);

        let head = TreeIndex::from_ref(&self.storage, &self.reference)?
            .unwrap_or_else(|| self.reference_index.clone());
        if !head.is_empty() {
            index.set_parent(storage::asset(&self.storage, head.self_id()?));
        }

        index.set_author(PredefinedConfigs::AUTHOR.value(&self.config));
        index.set_email(PredefinedConfigs::EMAIL.value(&self.config));
        index.set_commiter(PredefinedConfigs::COMMITER.value(&self.config));
        index.set_commiter_email(PredefinedConfigs::COMMITER_EMAIL.value(&self.config));
        index.set_message(message);

        self.storage.put_all(&index.assets()?)?;
        let id = index.self_id()?;
        self.storage.update_reference(&Reference::new(self.reference.clone(), id.clone()))?;

        let reference = self.reference.clone();
        self.setup_current_tree(&reference, &index)?;

        info!("Committed {} on {}", id, self.reference);
        Ok(id)
    }

    /// Start a new reference with an empty initial index and switch to it
    ///
    /// The working directory is emptied.
    ///
    /// # Errors
    ///
    /// - [`PielError::InvalidReferenceName`] if `reference` can not be stored
    /// - [`PielError::NonEmptyReferenceAlreadyExists`] if `reference` resolves
    /// - [`PielError::ThereAreNonCommittedChanges`] on a dirty working directory
    pub fn create(&mut self, reference: &str) -> Result<AssetId> {
        storage::validate_reference_name(reference)?;
        if self.storage.resolve(reference).is_some() {
            return Err(PielError::NonEmptyReferenceAlreadyExists(reference.to_string()));
        }
        self.ensure_no_changes()?;

        utils::clear_directory(&self.working_dir, &[METADATA_DIR])?;

        let mut initial = TreeIndex::new();
        initial.initial_for(reference);
        self.storage.put_all(&initial.assets()?)?;

        let id = initial.self_id()?;
        self.storage.create_reference(&Reference::new(reference, id.clone()))?;
        self.setup_current_tree(reference, &initial)?;

        info!("Created new empty tree: {}:{}", reference, id);
        Ok(id)
    }

    /// Switch the working directory to `reference`
    ///
    /// Returns the id of the index now checked out.
    ///
    /// # Errors
    ///
    /// - [`PielError::ThereAreNonCommittedChanges`] on a dirty working
    ///   directory without `force`
    /// - [`PielError::NoSuchReference`] if `reference` does not resolve and
    ///   `create_new_branch` is not set
    pub fn checkout(&mut self, reference: &str, options: CheckoutOptions) -> Result<AssetId> {
        let Some(index) = TreeIndex::from_ref(&self.storage, reference)? else {
            debug!("Resolved empty reference: {}", reference);
            if !options.create_new_branch {
                return Err(PielError::NoSuchReference(reference.to_string()));
            }
            return self.create(reference);
        };

        if !options.force {
            self.ensure_no_changes()?;
        }

        utils::clear_directory(&self.working_dir, &[METADATA_DIR])?;
        AssetsExtractor::new(&index, ExtractPolicy::ReplaceExisting).extract_into(&self.working_dir)?;
        self.setup_current_tree(reference, &index)?;

        let id = index.self_id()?;
        info!("Checked out {}:{}", reference, id);
        Ok(id)
    }

    /// Bring the working directory back to the current index
    ///
    /// Removed and modified paths are restored from the storage, with their
    /// content verified against the index, and added paths are deleted.
    /// Returns the number of paths touched.
    ///
    /// # Errors
    ///
    /// - [`PielError::AttemptToExportNonReadableAsset`] if a blob to restore
    ///   is missing from the storage
    /// - [`PielError::ExportedDataIsCorrupted`] if a stored blob does not hash
    ///   to its id
    pub fn clean(&self) -> Result<usize> {
        let diff = IndexesDiff::diff(&self.reference_index, &self.working_dir_state()?);

        let mut restore = TreeIndex::new();
        let mut removed = 0;
        for (path, change) in diff.content_diff() {
            match change.state {
                ElementState::Added => {
                    let item_path = utils::fs_path(&self.working_dir, path)?;
                    trace!("Remove added item: {:?}", item_path);
                    utils::remove_item(&item_path)?;
                    self.remove_empty_parents(&item_path);
                    removed += 1;
                }
                ElementState::Removed | ElementState::Modified => {
                    trace!("Restore {}: {}", change.state.letter(), path);
                    self.stage_restore(&mut restore, path);
                }
                ElementState::Unmodified => {}
            }
        }
        for path in diff.content_attributes_diff().keys() {
            if !restore.contains_path(path) && self.reference_index.contains_path(path) {
                trace!("Restore attributes: {}", path);
                self.stage_restore(&mut restore, path);
            }
        }

        let restored = AssetsExtractor::new(&restore, ExtractPolicy::ReplaceExisting).extract_into(&self.working_dir)?;

        info!("Cleaned working copy: {} restored, {} removed", restored, removed);
        Ok(restored + removed)
    }

    /// Diff between two references
    ///
    /// `from` defaults to the current index and `to` to the working
    /// directory.
    ///
    /// # Errors
    ///
    /// - [`PielError::NoSuchReference`] if a given bound does not resolve
    pub fn diff(&self, from: Option<&str>, to: Option<&str>) -> Result<IndexesDiff> {
        let from_index = match from {
            Some(name) => self.require_index(name)?,
            None => self.reference_index.clone(),
        };
        let to_index = match to {
            Some(name) => self.require_index(name)?,
            None => self.working_dir_state()?,
        };

        debug!(
            "Diff range {{ from: {} to: {} }}",
            from.unwrap_or("HEAD"),
            to.unwrap_or("DIR")
        );
        Ok(IndexesDiff::diff(&from_index, &to_index))
    }

    /// History between two references, newest first
    ///
    /// `to` defaults to the current index and `from` to the beginning of
    /// history; `from` itself is not listed. Names that do not resolve fall
    /// back to the defaults. The initial index of a reference is never
    /// listed.
    pub fn log(&self, from: Option<&str>, to: Option<&str>) -> Result<Vec<LogEntry>> {
        let from_id = match from {
            Some(name) => self.resolve_index(name)?.map(|index| index.self_id()).transpose()?,
            None => None,
        };
        let to_index = match to {
            Some(name) => self.resolve_index(name)?.unwrap_or_else(|| self.reference_index.clone()),
            None => self.reference_index.clone(),
        };

        let mut entries = Vec::new();
        for index in History::new(Arc::clone(&self.storage), to_index) {
            let index = index?;
            if index.is_initial_index() {
                break;
            }
            let entry = LogEntry::from_index(&index)?;
            if Some(&entry.id) == from_id.as_ref() {
                break;
            }
            entries.push(entry);
        }
        Ok(entries)
    }

    /// Store a configuration value in `config.properties`
    pub fn set_config(&mut self, name: &str, value: &str) -> Result<()> {
        self.config.set(name, value);
        self.config.store_file(&self.metadata_dir.join(CONFIG_FILE))
    }

    /// Configuration value: file value, else the environment default of a
    /// predefined property, else `default`
    pub fn get_config(&mut self, name: &str, default: &str) -> Result<String> {
        self.config = Properties::load_file(&self.metadata_dir.join(CONFIG_FILE))?;

        if let Some(value) = self.config.get(name) {
            return Ok(value.to_string());
        }
        Ok(match PredefinedConfigs::find(name) {
            Some(property) => property.value(&self.config),
            None => default.to_string(),
        })
    }

    fn resolve_index(&self, name: &str) -> Result<Option<TreeIndex>> {
        let index = TreeIndex::from_ref(&self.storage, name)?;
        if index.is_none() {
            debug!("Log bound {} is not resolved, using default", name);
        }
        Ok(index)
    }

    fn require_index(&self, name: &str) -> Result<TreeIndex> {
        TreeIndex::from_ref(&self.storage, name)?.ok_or_else(|| {
            debug!("Can't resolve reference: {}", name);
            PielError::NoSuchReference(name.to_string())
        })
    }

    fn stage_restore(&self, restore: &mut TreeIndex, path: &str) {
        if let Some(asset) = self.reference_index.asset(path) {
            restore.insert_path(path, asset.clone());
            if let Some(attrs) = self.reference_index.get_attrs(path) {
                restore.set_attrs(path, attrs.clone());
            }
        }
    }

    /// Drop directories left empty below the working directory root
    fn remove_empty_parents(&self, item_path: &Path) {
        for dir in item_path.ancestors().skip(1) {
            if dir == self.working_dir || !dir.starts_with(&self.working_dir) {
                break;
            }
            if fs::remove_dir(dir).is_err() {
                break;
            }
            trace!("Removed empty directory: {:?}", dir);
        }
    }

    fn ensure_no_changes(&self) -> Result<()> {
        let diff = IndexesDiff::diff(&self.reference_index, &self.working_dir_state()?);
        if diff.has_content_changes() {
            debug!("There are non committed changes");
            return Err(PielError::ThereAreNonCommittedChanges);
        }
        Ok(())
    }

    /// Persist the current reference name and its index, then reload the
    /// index bound to the local storage
    fn setup_current_tree(&mut self, reference: &str, index: &TreeIndex) -> Result<()> {
        if reference != self.reference {
            let mut temp = NamedTempFile::new_in(&self.metadata_dir)?;
            writeln!(temp, "{}", reference)?;
            temp.persist(self.metadata_dir.join(REFERENCE_FILE)).map_err(|e| e.error)?;
            self.reference = reference.to_string();
        }

        let index_file = self.metadata_dir.join(INDEX_FILE);
        let mut temp = NamedTempFile::new_in(&self.metadata_dir)?;
        index.store(&mut temp)?;
        temp.flush()?;
        temp.persist(&index_file).map_err(|e| e.error)?;

        self.reference_index = TreeIndex::load(BufReader::new(File::open(&index_file)?), Some(&self.storage))?;
        Ok(())
    }
}
