//! Immutable byte-stream handles identified by their content
//!
//! An [`Asset`] wraps one of several backings (nothing but an id, an in-memory
//! buffer, a file on disk, or a blob inside an [`ObjectsStorage`]) and opens a
//! fresh reader over it on every [`Asset::istream`] call. Its identity is the
//! [`AssetId`] of that content, computed on first request and memoized.
//!
//! Two assets are equal exactly when their ids are equal, regardless of where
//! the bytes live.
//!
//! [`ObjectsStorage`]: crate::storage::ObjectsStorage

use crate::asset_id::AssetId;
use crate::error::{PielError, Result};
use crate::storage::StorageRef;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fs::File;
use std::io::{BufReader, Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::{debug, trace};

/// Reader returned by [`Asset::istream`]
pub type AssetReader = Box<dyn Read + Send>;

#[derive(Debug, Clone)]
enum Source {
    /// Identity only, no readable content
    Id,
    /// In-memory buffer
    Bytes(Arc<[u8]>),
    /// File on the local filesystem
    File(PathBuf),
    /// Blob held by an objects storage
    Storage(StorageRef),
}

/// Content-addressed, immutable byte-stream handle
#[derive(Debug, Clone)]
pub struct Asset {
    source: Source,
    id: OnceLock<AssetId>,
}

impl Default for Asset {
    /// The `empty` asset: no content, id [`AssetId::empty`]
    fn default() -> Self {
        Self::create_id(AssetId::empty())
    }
}

impl Asset {
    fn with_source(source: Source) -> Self {
        Self {
            source,
            id: OnceLock::new(),
        }
    }

    fn with_known_id(source: Source, id: AssetId) -> Self {
        Self {
            source,
            id: OnceLock::from(id),
        }
    }

    /// Non-readable asset that only carries an id
    pub fn create_id(id: AssetId) -> Self {
        Self::with_known_id(Source::Id, id)
    }

    /// Asset over an in-memory buffer
    pub fn create_for_bytes(data: impl Into<Vec<u8>>) -> Self {
        let data: Vec<u8> = data.into();
        Self::with_source(Source::Bytes(Arc::from(data)))
    }

    /// Asset over the UTF-8 bytes of a string
    pub fn create_for_str(data: &str) -> Self {
        Self::create_for_bytes(data.as_bytes())
    }

    /// Asset over a file; the file is not touched until read or hashed
    pub fn create_for_path(path: impl AsRef<Path>) -> Self {
        Self::with_source(Source::File(path.as_ref().to_path_buf()))
    }

    /// Asset over the full content of a stream, buffered in memory
    pub fn create_for_reader<R: Read>(mut reader: R) -> Result<Self> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Ok(Self::create_for_bytes(data))
    }

    /// Asset whose content is the blob `id` of `storage`
    pub fn create_for_storage(storage: StorageRef, id: AssetId) -> Self {
        Self::with_known_id(Source::Storage(storage), id)
    }

    /// Content id, computed on first call
    ///
    /// # Errors
    ///
    /// - [`PielError::UnableToCalculateAssetId`] if the content is not readable
    /// - [`PielError::Io`] if reading the content fails
    pub fn id(&self) -> Result<&AssetId> {
        if let Some(id) = self.id.get() {
            return Ok(id);
        }

        let reader = self.istream().ok_or_else(|| {
            debug!("Unable to calculate asset id!");
            PielError::UnableToCalculateAssetId
        })?;
        let id = AssetId::create_for(reader)?;
        trace!("Calculated asset id: {}", id);

        Ok(self.id.get_or_init(|| id))
    }

    /// Id if it is already known, without reading anything
    pub fn known_id(&self) -> Option<&AssetId> {
        self.id.get()
    }

    /// Check for the `empty` asset
    pub fn is_empty(&self) -> bool {
        self.known_id().is_some_and(AssetId::is_empty)
    }

    /// Open a fresh reader positioned at the start of the content
    ///
    /// Returns `None` when there is nothing to read: id-only assets, missing
    /// files and blobs absent from their storage.
    pub fn istream(&self) -> Option<AssetReader> {
        match &self.source {
            Source::Id => None,
            Source::Bytes(data) => Some(Box::new(Cursor::new(Arc::clone(data)))),
            Source::File(path) => match File::open(path) {
                Ok(file) => Some(Box::new(BufReader::new(file))),
                Err(e) => {
                    debug!("Unable to open {:?}: {}", path, e);
                    None
                }
            },
            Source::Storage(storage) => {
                let id = self.id.get()?;
                storage.istream_for(id)
            }
        }
    }

    /// Serialized form: the id only
    pub(crate) fn descriptor(&self) -> Result<AssetDescriptor> {
        Ok(AssetDescriptor {
            id: self.id()?.clone(),
        })
    }

    /// Rebuild an asset from its serialized form
    ///
    /// With a storage the asset becomes readable through it; reserved ids are
    /// always id-only.
    pub(crate) fn from_descriptor(descriptor: AssetDescriptor, storage: Option<&StorageRef>) -> Self {
        match storage {
            Some(storage) if !descriptor.id.is_sentinel() => {
                Self::create_for_storage(Arc::clone(storage), descriptor.id)
            }
            _ => Self::create_id(descriptor.id),
        }
    }
}

impl PartialEq for Asset {
    /// Equal by content id; an asset whose id can not be computed equals nothing
    fn eq(&self, other: &Self) -> bool {
        match (self.id(), other.id()) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialOrd for Asset {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self.id(), other.id()) {
            (Ok(a), Ok(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl From<&str> for Asset {
    fn from(data: &str) -> Self {
        Asset::create_for_str(data)
    }
}

/// JSON shape of an asset inside a serialized tree index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct AssetDescriptor {
    pub id: AssetId,
}
