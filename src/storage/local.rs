//! Objects storage in a local directory
//!
//! ```text
//! <root>/
//! ├── objects/<id[0:2]>/<id[2:4]>/<id[4:6]>/<id>   # one file per blob
//! ├── references.properties                       # name=newest,older,...
//! └── references.lock                             # advisory lock for ref rewrites
//! ```
//!
//! Reference rewrites hold an exclusive advisory lock on `references.lock`.
//! The lock lives on an open file handle, so the OS drops it when the holder
//! exits and a lock file left behind by a crashed process blocks nobody.
//!
//! The fan-out is a [`StorageLayout`] and may be changed with
//! [`LocalDirectoryStorage::with_layout`]; a storage must always be reopened
//! with the layout it was created with.

use super::{id_for_put, validate_reference_name, ObjectsStorage, Reference};
use crate::asset::{Asset, AssetReader};
use crate::asset_id::AssetId;
use crate::config::StorageLayout;
use crate::error::{PielError, Result};
use crate::properties::Properties;
use fs2::FileExt;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;
use tracing::{debug, trace, warn};

const OBJECTS_DIR: &str = "objects";
const REFERENCES_FILE: &str = "references.properties";
const REFERENCES_LOCK: &str = "references.lock";
const HISTORY_SEPARATOR: char = ',';

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);
const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(10);

/// Storage persisting blobs and references under a root directory
///
/// # Example
///
/// ```rust,no_run
/// use piel::{Asset, LocalDirectoryStorage, ObjectsStorage};
///
/// # fn example() -> piel::Result<()> {
/// let storage = LocalDirectoryStorage::new("/tmp/piel-storage")?;
/// let asset = Asset::create_for_str("hello");
/// storage.put(&asset)?;
/// assert!(storage.contains(asset.id()?));
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct LocalDirectoryStorage {
    root: PathBuf,
    objects: PathBuf,
    references: PathBuf,
    layout: StorageLayout,
    lock_timeout: Duration,
    /// Serializes reference rewrites within this process
    refs_guard: Mutex<()>,
}

impl LocalDirectoryStorage {
    /// Open or create a storage with the default layout
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        Self::with_layout(root, StorageLayout::default())
    }

    /// Open or create a storage with a custom object fan-out
    ///
    /// # Errors
    ///
    /// - [`PielError::UnableToCreateDirectory`] if the objects directory can
    ///   not be created
    pub fn with_layout(root: impl Into<PathBuf>, layout: StorageLayout) -> Result<Self> {
        let root = root.into();
        let objects = root.join(OBJECTS_DIR);
        let references = root.join(REFERENCES_FILE);

        create_dir(&objects)?;
        if !references.exists() {
            Properties::new().store_file(&references)?;
        }

        debug!("Objects path: {:?} References: {:?}", objects, references);

        Ok(Self {
            root,
            objects,
            references,
            layout,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            refs_guard: Mutex::new(()),
        })
    }

    /// Change how long reference updates wait for the references lock
    pub fn set_lock_timeout(&mut self, timeout: Duration) {
        self.lock_timeout = timeout;
    }

    /// Storage root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Object fan-out in use
    pub fn layout(&self) -> StorageLayout {
        self.layout
    }

    /// Ids a reference has pointed at, newest first
    ///
    /// Empty when the reference does not exist.
    pub fn reference_history(&self, name: &str) -> Result<Vec<AssetId>> {
        let refs = Properties::load_file(&self.references)?;
        Ok(refs.get(name).map(parse_history).unwrap_or_default())
    }

    fn object_path(&self, id: &AssetId) -> PathBuf {
        self.layout.object_path(&self.objects, id)
    }

    fn load_references(&self) -> Option<Properties> {
        match Properties::load_file(&self.references) {
            Ok(refs) => Some(refs),
            Err(e) => {
                warn!("Unable to read references {:?}: {}", self.references, e);
                None
            }
        }
    }

    /// Run a read-modify-write of the references file under both locks
    fn modify_references<F>(&self, modify: F) -> Result<()>
    where
        F: FnOnce(&mut Properties) -> Result<()>,
    {
        let _guard = self.refs_guard.lock();
        let _lock = ReferencesLock::acquire(&self.root.join(REFERENCES_LOCK), self.lock_timeout)?;

        let mut refs = Properties::load_file(&self.references)?;
        modify(&mut refs)?;
        refs.store_file(&self.references)
    }
}

impl ObjectsStorage for LocalDirectoryStorage {
    fn put(&self, asset: &Asset) -> Result<()> {
        let id = id_for_put(asset)?;
        if id.is_sentinel() || self.contains(&id) {
            trace!("Skip put of asset: {}", id);
            return Ok(());
        }

        let mut reader = asset.istream().ok_or_else(|| {
            warn!("Asset: {} is not readable!", id);
            PielError::AttemptToPutNonReadableAsset(id.clone())
        })?;

        let path = self.object_path(&id);
        let parent = path.parent().unwrap_or(self.objects.as_path());
        trace!("Asset path: {:?} Parent path: {:?}", path, parent);
        create_dir(parent)?;

        let mut temp = NamedTempFile::new_in(parent)?;
        let written = io::copy(&mut reader, &mut temp)?;
        temp.persist(&path).map_err(|e| e.error)?;

        trace!("Stored asset {} ({} bytes)", id.short(), written);
        Ok(())
    }

    fn contains(&self, id: &AssetId) -> bool {
        !id.is_sentinel() && self.object_path(id).is_file()
    }

    fn istream_for(&self, id: &AssetId) -> Option<AssetReader> {
        if id.is_sentinel() {
            return None;
        }
        let path = self.object_path(id);
        match File::open(&path) {
            Ok(file) => Some(Box::new(BufReader::new(file))),
            Err(e) => {
                trace!("No object {:?}: {}", path, e);
                None
            }
        }
    }

    fn resolve(&self, name: &str) -> Option<AssetId> {
        if let Some(head) = self
            .load_references()
            .and_then(|refs| refs.get(name).and_then(|v| parse_history(v).into_iter().next()))
        {
            return Some(head);
        }

        // Raw ids resolve to themselves when stored
        if name.is_empty() || !name.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        let id = AssetId::create(name);
        self.contains(&id).then_some(id)
    }

    fn create_reference(&self, reference: &Reference) -> Result<()> {
        validate_reference_name(&reference.name)?;
        self.modify_references(|refs| {
            if refs.contains(&reference.name) {
                return Err(PielError::UnableToInsertNewReference(reference.name.clone()));
            }
            debug!("Create reference {}", reference);
            refs.set(reference.name.clone(), reference.id.to_string());
            Ok(())
        })
    }

    fn update_reference(&self, reference: &Reference) -> Result<()> {
        validate_reference_name(&reference.name)?;
        self.modify_references(|refs| {
            let value = match refs.get(&reference.name) {
                Some(history) if !history.is_empty() => {
                    format!("{}{}{}", reference.id, HISTORY_SEPARATOR, history)
                }
                _ => reference.id.to_string(),
            };
            debug!("Update reference {}", reference);
            refs.set(reference.name.clone(), value);
            Ok(())
        })
    }

    fn references(&self) -> Vec<Reference> {
        let Some(refs) = self.load_references() else {
            return Vec::new();
        };
        refs.iter()
            .filter_map(|(name, value)| {
                let head = parse_history(value).into_iter().next()?;
                Some(Reference::new(name, head))
            })
            .collect()
    }
}

fn parse_history(value: &str) -> Vec<AssetId> {
    value
        .split(HISTORY_SEPARATOR)
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(AssetId::create)
        .collect()
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|source| {
        warn!("Unable to create directory: {:?}", path);
        PielError::UnableToCreateDirectory {
            path: path.to_path_buf(),
            source,
        }
    })
}

/// Exclusive advisory lock on the references lock file
///
/// Released on drop, or by the OS when the owning process dies.
struct ReferencesLock {
    file: File,
    path: PathBuf,
}

impl ReferencesLock {
    fn acquire(path: &Path, timeout: Duration) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)?;

        let started = Instant::now();
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    trace!("Locked {:?}", path);
                    return Ok(Self {
                        file,
                        path: path.to_path_buf(),
                    });
                }
                Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                    if started.elapsed() >= timeout {
                        warn!("Timed out waiting for {:?}", path);
                        return Err(PielError::LockTimeout(path.to_path_buf()));
                    }
                    thread::sleep(LOCK_RETRY_INTERVAL);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl Drop for ReferencesLock {
    fn drop(&mut self) {
        // Closing the handle releases the lock anyway
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!("Unable to release lock {:?}: {}", self.path, e);
        }
    }
}
