//! In-memory objects storage

use super::{id_for_put, validate_reference_name, ObjectsStorage, Reference};
use crate::asset::{Asset, AssetReader};
use crate::asset_id::AssetId;
use crate::collections::{HashMap, HashMapExt};
use crate::error::{PielError, Result};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use std::sync::Arc;
use tracing::trace;

/// Storage keeping blobs and references in process memory
///
/// Nothing is persisted; contents live as long as the storage does.
#[derive(Debug)]
pub struct MemoryObjectsStorage {
    assets: RwLock<HashMap<AssetId, Arc<[u8]>>>,
    refs: RwLock<BTreeMap<String, AssetId>>,
}

impl Default for MemoryObjectsStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryObjectsStorage {
    /// Create an empty storage
    pub fn new() -> Self {
        Self {
            assets: RwLock::new(HashMap::new()),
            refs: RwLock::new(BTreeMap::new()),
        }
    }

    /// Number of stored blobs
    pub fn len(&self) -> usize {
        self.assets.read().len()
    }

    /// Check whether no blob is stored
    pub fn is_empty(&self) -> bool {
        self.assets.read().is_empty()
    }
}

impl ObjectsStorage for MemoryObjectsStorage {
    fn put(&self, asset: &Asset) -> Result<()> {
        let id = id_for_put(asset)?;
        if id.is_sentinel() || self.contains(&id) {
            trace!("Skip put of asset: {}", id);
            return Ok(());
        }

        let mut reader = asset
            .istream()
            .ok_or_else(|| PielError::AttemptToPutNonReadableAsset(id.clone()))?;
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;

        trace!("Put asset {} ({} bytes)", id.short(), data.len());
        self.assets.write().entry(id).or_insert_with(|| Arc::from(data));
        Ok(())
    }

    fn contains(&self, id: &AssetId) -> bool {
        self.assets.read().contains_key(id)
    }

    fn istream_for(&self, id: &AssetId) -> Option<AssetReader> {
        let data = self.assets.read().get(id).cloned()?;
        Some(Box::new(Cursor::new(data)))
    }

    fn resolve(&self, name: &str) -> Option<AssetId> {
        if let Some(id) = self.refs.read().get(name) {
            return Some(id.clone());
        }

        let id = AssetId::create(name);
        self.contains(&id).then_some(id)
    }

    fn create_reference(&self, reference: &Reference) -> Result<()> {
        validate_reference_name(&reference.name)?;
        let mut refs = self.refs.write();
        if refs.contains_key(&reference.name) {
            return Err(PielError::UnableToInsertNewReference(reference.name.clone()));
        }
        refs.insert(reference.name.clone(), reference.id.clone());
        Ok(())
    }

    fn update_reference(&self, reference: &Reference) -> Result<()> {
        validate_reference_name(&reference.name)?;
        trace!("Update reference {}", reference);
        self.refs
            .write()
            .insert(reference.name.clone(), reference.id.clone());
        Ok(())
    }

    fn references(&self) -> Vec<Reference> {
        self.refs
            .read()
            .iter()
            .map(|(name, id)| Reference::new(name.clone(), id.clone()))
            .collect()
    }
}
