//! Content-addressed object storage
//!
//! An [`ObjectsStorage`] keeps asset blobs keyed by their [`AssetId`] and a
//! small reference layer mapping names (branches, tags) to ids.
//!
//! ## Implementations
//!
//! - [`LocalDirectoryStorage`]: blobs fanned out under `objects/`, references
//!   in a properties file, persistent across processes
//! - [`MemoryObjectsStorage`]: process-local maps, used by tests and short
//!   lived import flows
//!
//! ## Contract
//!
//! - `put` is idempotent: storing an id that is already present is a no-op
//! - `put` of an asset without readable stream is
//!   [`PielError::AttemptToPutNonReadableAsset`]
//! - `resolve` maps a reference name to its head id; a raw id present in the
//!   storage resolves to itself
//! - reference names are non-empty, carry no `#`, `=` or line breaks, and
//!   have no surrounding whitespace
//!
//! Storages are shared as [`StorageRef`] so that storage-backed assets can
//! outlive the code that loaded them.
//!
//! [`PielError::AttemptToPutNonReadableAsset`]: crate::error::PielError::AttemptToPutNonReadableAsset

mod local;
mod memory;

pub use local::LocalDirectoryStorage;
pub use memory::MemoryObjectsStorage;

use crate::asset::{Asset, AssetReader};
use crate::asset_id::AssetId;
use crate::error::{PielError, Result};
use std::fmt;
use std::sync::Arc;

/// Shared handle to a storage
pub type StorageRef = Arc<dyn ObjectsStorage>;

/// Named pointer to an asset id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Reference name
    pub name: String,
    /// Id the reference points at
    pub id: AssetId,
}

impl Reference {
    /// Create a reference
    pub fn new(name: impl Into<String>, id: AssetId) -> Self {
        Self {
            name: name.into(),
            id,
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.name, self.id)
    }
}

/// Content-addressed blob store with named references
pub trait ObjectsStorage: fmt::Debug + Send + Sync {
    /// Store the content of an asset under its id
    ///
    /// Empty and reserved ids, and ids already present, are skipped.
    ///
    /// # Errors
    ///
    /// - [`PielError::AttemptToPutNonReadableAsset`](crate::error::PielError::AttemptToPutNonReadableAsset)
    ///   if the asset is not already stored and has no readable stream
    fn put(&self, asset: &Asset) -> Result<()>;

    /// Store several assets, stopping at the first failure
    fn put_all(&self, assets: &[Asset]) -> Result<()> {
        for asset in assets {
            self.put(asset)?;
        }
        Ok(())
    }

    /// Check whether a blob with this id is stored
    fn contains(&self, id: &AssetId) -> bool;

    /// Open a reader over a stored blob
    fn istream_for(&self, id: &AssetId) -> Option<AssetReader>;

    /// Resolve a reference name (or a stored raw id) to an id
    fn resolve(&self, name: &str) -> Option<AssetId>;

    /// Create a new reference
    ///
    /// # Errors
    ///
    /// - [`PielError::InvalidReferenceName`](crate::error::PielError::InvalidReferenceName)
    ///   if the name can not be stored
    /// - [`PielError::UnableToInsertNewReference`](crate::error::PielError::UnableToInsertNewReference)
    ///   if the name is already taken
    fn create_reference(&self, reference: &Reference) -> Result<()>;

    /// Point a reference at a new id, creating it when missing
    ///
    /// # Errors
    ///
    /// - [`PielError::InvalidReferenceName`](crate::error::PielError::InvalidReferenceName)
    ///   if the name can not be stored
    fn update_reference(&self, reference: &Reference) -> Result<()>;

    /// All references with their head ids, sorted by name
    fn references(&self) -> Vec<Reference>;
}

/// Storage-backed asset for `id`
///
/// When the storage does not hold the blob the asset is id-only.
pub fn asset(storage: &StorageRef, id: AssetId) -> Asset {
    if storage.contains(&id) {
        Asset::create_for_storage(Arc::clone(storage), id)
    } else {
        Asset::create_id(id)
    }
}

/// Id an asset is stored under
///
/// An asset whose id can not be computed has nothing to store.
pub(crate) fn id_for_put(asset: &Asset) -> Result<AssetId> {
    match asset.id() {
        Ok(id) => Ok(id.clone()),
        Err(PielError::UnableToCalculateAssetId) => {
            Err(PielError::AttemptToPutNonReadableAsset(AssetId::not_calculated()))
        }
        Err(e) => Err(e),
    }
}

/// Reject names that would not read back from a references file
pub(crate) fn validate_reference_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.trim() == name
        && !name.contains(['#', '=', '\n', '\r']);
    if valid {
        Ok(())
    } else {
        Err(PielError::InvalidReferenceName(name.to_string()))
    }
}
