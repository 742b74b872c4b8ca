//! Versioned snapshots of a directory tree
//!
//! A [`TreeIndex`] maps relative paths to [`Asset`]s and carries two kinds of
//! metadata: index level attributes (`message`, `author`, ...) and per-path
//! attribute maps (`asset_type`, `asset_mode`, ...). Its `parent` links it to
//! the previous snapshot of the same lineage, so a chain of indexes forms the
//! history of a reference.
//!
//! ## Identity
//!
//! The id of an index is the content id of its compact JSON form, recomputed
//! on every [`TreeIndex::self_id`] call. All maps are ordered, so the same
//! logical content always serializes to the same bytes and an index read back
//! from storage keeps its id.
//!
//! ```text
//! {"parent":{"id":"..."},
//!  "attributes":{"message":"..."},
//!  "content":{"a.txt":{"id":"..."}},
//!  "content_attributes":{"a.txt":{"asset_mode":"420","asset_type":"file"}}}
//! ```
//!
//! ## Example
//!
//! ```rust
//! use piel::{Asset, TreeIndex};
//!
//! # fn example() -> piel::Result<()> {
//! let mut index = TreeIndex::new();
//! let empty_id = index.self_id()?;
//!
//! assert!(index.insert_path("a.txt", Asset::create_for_str("hello")));
//! assert!(!index.insert_path("a.txt", Asset::create_for_str("other")));
//! assert_ne!(index.self_id()?, empty_id);
//! # Ok(())
//! # }
//! ```

use crate::asset::{Asset, AssetDescriptor};
use crate::asset_id::AssetId;
use crate::error::{PielError, Result};
use crate::storage::{self, StorageRef};
use serde::de::{Deserializer, MapAccess, Visitor};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io::{Read, Write};
use std::marker::PhantomData;
use tracing::{debug, trace, warn};

/// Path to asset mapping
pub type Content = BTreeMap<String, Asset>;
/// Attribute name to value mapping
pub type Attributes = BTreeMap<String, String>;
/// Path to attribute map mapping
pub type ContentAttributes = BTreeMap<String, Attributes>;

const INITIAL_FOR: &str = "initial_for";

/// Snapshot of a tree: content, metadata and parent link
#[derive(Debug, Clone, Default)]
pub struct TreeIndex {
    parent: Asset,
    content: Content,
    attributes: Attributes,
    content_attributes: ContentAttributes,
}

macro_rules! index_attribute {
    ($($name:ident, $setter:ident;)*) => {
        $(
            #[doc = concat!("Value of the `", stringify!($name), "` attribute, empty when unset")]
            pub fn $name(&self) -> &str {
                self.get_attribute(stringify!($name), "")
            }

            #[doc = concat!("Set the `", stringify!($name), "` attribute")]
            pub fn $setter(&mut self, value: impl Into<String>) {
                self.set_attribute(stringify!($name), value);
            }
        )*
    };
}

impl TreeIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a path only if it is free and the asset has a non-empty id
    ///
    /// Returns `false` without touching the index otherwise. An asset whose id
    /// can not be computed counts as empty.
    pub fn insert_path(&mut self, path: impl Into<String>, asset: Asset) -> bool {
        let path = path.into();
        if self.content.contains_key(&path) {
            trace!("Path already indexed: {}", path);
            return false;
        }
        match asset.id() {
            Ok(id) if !id.is_empty() => {
                self.content.insert(path, asset);
                true
            }
            Ok(_) => false,
            Err(e) => {
                debug!("Unable to index {}: {}", path, e);
                false
            }
        }
    }

    /// Insert or replace the asset at a path
    ///
    /// # Errors
    ///
    /// - [`PielError::AttemptToAddEmptyAssetIntoIndex`] if the asset id is
    ///   empty or can not be computed
    pub fn replace_path(&mut self, path: impl Into<String>, asset: Asset) -> Result<()> {
        let path = path.into();
        match asset.id() {
            Ok(id) if !id.is_empty() => {
                self.content.insert(path, asset);
                Ok(())
            }
            Ok(_) | Err(PielError::UnableToCalculateAssetId) => {
                Err(PielError::AttemptToAddEmptyAssetIntoIndex { path })
            }
            Err(e) => Err(e),
        }
    }

    /// Remove a path; absent paths are ignored
    pub fn remove_path(&mut self, path: &str) {
        self.content.remove(path);
    }

    /// Check whether a path is indexed
    pub fn contains_path(&self, path: &str) -> bool {
        self.content.contains_key(path)
    }

    /// All indexed paths with their assets
    pub fn content(&self) -> &Content {
        &self.content
    }

    /// Asset stored at a path
    pub fn asset(&self, path: &str) -> Option<&Asset> {
        self.content.get(path)
    }

    /// All indexed paths
    pub fn index_paths(&self) -> BTreeSet<String> {
        self.content.keys().cloned().collect()
    }

    /// Previous snapshot of the lineage, empty for a root
    pub fn parent(&self) -> &Asset {
        &self.parent
    }

    /// Link this index to its predecessor
    pub fn set_parent(&mut self, parent: Asset) {
        self.parent = parent;
    }

    /// Index level attributes
    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// Set an index level attribute
    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(name.into(), value.into());
    }

    /// Index level attribute or `default`
    pub fn get_attribute<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        self.attributes.get(name).map_or(default, String::as_str)
    }

    /// Check whether an index level attribute is set
    pub fn contains_attribute(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    index_attribute! {
        message, set_message;
        author, set_author;
        email, set_email;
        commiter, set_commiter;
        commiter_email, set_commiter_email;
    }

    /// Mark this index as the root of a new reference
    pub fn initial_for(&mut self, reference: impl Into<String>) {
        self.set_attribute(INITIAL_FOR, reference);
    }

    /// Check whether this index is the root of a reference
    pub fn is_initial_index(&self) -> bool {
        self.contains_attribute(INITIAL_FOR)
    }

    /// Per-path attribute maps
    pub fn content_attributes(&self) -> &ContentAttributes {
        &self.content_attributes
    }

    /// Set one attribute of a path
    pub fn set_attr(&mut self, path: impl Into<String>, name: impl Into<String>, value: impl Into<String>) {
        self.content_attributes
            .entry(path.into())
            .or_default()
            .insert(name.into(), value.into());
    }

    /// Attribute of a path or `default`
    pub fn get_attr<'a>(&'a self, path: &str, name: &str, default: &'a str) -> &'a str {
        self.content_attributes
            .get(path)
            .and_then(|attrs| attrs.get(name))
            .map_or(default, String::as_str)
    }

    /// Replace the whole attribute map of a path
    pub fn set_attrs(&mut self, path: impl Into<String>, attrs: Attributes) {
        self.content_attributes.insert(path.into(), attrs);
    }

    /// Attribute map of a path
    pub fn get_attrs(&self, path: &str) -> Option<&Attributes> {
        self.content_attributes.get(path)
    }

    /// Check for an index without parent, content or metadata
    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
            && self.content.is_empty()
            && self.attributes.is_empty()
            && self.content_attributes.is_empty()
    }

    /// Asset holding the serialized form of this index
    pub fn self_asset(&self) -> Result<Asset> {
        let mut buffer = Vec::new();
        self.store(&mut buffer)?;
        Ok(Asset::create_for_bytes(buffer))
    }

    /// Id of this index, derived from its current content
    pub fn self_id(&self) -> Result<AssetId> {
        Ok(self.self_asset()?.id()?.clone())
    }

    /// Every asset a storage needs to hold this index: content plus self
    pub fn assets(&self) -> Result<Vec<Asset>> {
        let mut result: Vec<Asset> = self.content.values().cloned().collect();
        result.push(self.self_asset()?);
        Ok(result)
    }

    /// Write the compact JSON form
    pub fn store<W: Write>(&self, writer: W) -> Result<()> {
        let content = self
            .content
            .iter()
            .map(|(path, asset)| Ok((path.as_str(), asset.descriptor()?)))
            .collect::<Result<BTreeMap<_, _>>>()?;

        let document = IndexDocumentRef {
            parent: self.parent.descriptor()?,
            attributes: &self.attributes,
            content,
            content_attributes: &self.content_attributes,
        };
        serde_json::to_writer(writer, &document)?;
        Ok(())
    }

    /// Read an index from its JSON form
    ///
    /// With a storage, content and parent assets are readable through it;
    /// otherwise they carry ids only.
    ///
    /// # Errors
    ///
    /// - [`PielError::Json`] if the input is not a serialized index
    /// - [`PielError::IndexHasSeveralEqualPaths`] if a path appears twice
    pub fn load<R: Read>(reader: R, storage: Option<&StorageRef>) -> Result<Self> {
        let document: IndexDocument = serde_json::from_reader(reader)?;

        let mut content = Content::new();
        for (path, descriptor) in document.content.0 {
            if content.contains_key(&path) {
                warn!("Not valid index! Content map contains several elements for key {}", path);
                return Err(PielError::IndexHasSeveralEqualPaths { path });
            }
            content.insert(path, Asset::from_descriptor(descriptor, storage));
        }

        Ok(Self {
            parent: Asset::from_descriptor(document.parent, storage),
            content,
            attributes: document.attributes,
            content_attributes: document.content_attributes,
        })
    }

    /// Read an index from an asset; a non-readable asset yields an empty index
    pub fn load_asset(asset: &Asset, storage: Option<&StorageRef>) -> Result<Self> {
        match asset.istream() {
            Some(reader) => Self::load(reader, storage),
            None => {
                debug!("Index asset is not readable, using empty index");
                Ok(Self::new())
            }
        }
    }

    /// Load the index a reference points at
    ///
    /// Returns `None` if the reference does not resolve.
    pub fn from_ref(storage: &StorageRef, reference: &str) -> Result<Option<Self>> {
        let Some(id) = storage.resolve(reference) else {
            debug!("Reference {} is not resolved", reference);
            return Ok(None);
        };
        let asset = storage::asset(storage, id);
        Self::load_asset(&asset, Some(storage)).map(Some)
    }
}

#[derive(Serialize)]
struct IndexDocumentRef<'a> {
    parent: AssetDescriptor,
    attributes: &'a Attributes,
    content: BTreeMap<&'a str, AssetDescriptor>,
    content_attributes: &'a ContentAttributes,
}

#[derive(Deserialize)]
struct IndexDocument {
    parent: AssetDescriptor,
    #[serde(default)]
    attributes: Attributes,
    #[serde(default)]
    content: Entries<AssetDescriptor>,
    #[serde(default)]
    content_attributes: ContentAttributes,
}

/// JSON object kept as a list of pairs so repeated keys survive parsing
struct Entries<V>(Vec<(String, V)>);

impl<V> Default for Entries<V> {
    fn default() -> Self {
        Entries(Vec::new())
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for Entries<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct EntriesVisitor<V>(PhantomData<V>);

        impl<'de, V: Deserialize<'de>> Visitor<'de> for EntriesVisitor<V> {
            type Value = Entries<V>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of paths")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some(entry) = map.next_entry::<String, V>()? {
                    entries.push(entry);
                }
                Ok(Entries(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor(PhantomData))
    }
}

/// Attribute keys and values shared by indexers and extractors
pub struct PredefinedAttributes;

impl PredefinedAttributes {
    /// Kind of filesystem item a path was indexed from
    pub const ASSET_TYPE: &'static str = "asset_type";
    /// `asset_type` of symbolic links; the asset holds the link target
    pub const ASSET_TYPE_SYMLINK: &'static str = "symlink";
    /// `asset_type` of regular files
    pub const ASSET_TYPE_FILE: &'static str = "file";
    /// POSIX permission bits, decimal
    pub const ASSET_MODE: &'static str = "asset_mode";
    /// Bits kept in `asset_mode`
    pub const ASSET_MODE_MASK: u32 = 0o777;
    /// Mode used when `asset_mode` is missing or malformed
    pub const DEFAULT_ASSET_MODE: u32 = 0o666;

    /// Decimal form of the permission bits of `mode`
    pub fn format_asset_mode(mode: u32) -> String {
        (mode & Self::ASSET_MODE_MASK).to_string()
    }

    /// Permission bits from their decimal form, `default` if malformed
    pub fn parse_asset_mode(mode: &str, default: u32) -> u32 {
        mode.trim().parse::<u32>().unwrap_or(default) & Self::ASSET_MODE_MASK
    }

    /// Mark `path` as a regular file with `mode`
    pub fn fill_file_attrs(index: &mut TreeIndex, path: &str, mode: u32) {
        index.set_attr(path, Self::ASSET_TYPE, Self::ASSET_TYPE_FILE);
        index.set_attr(path, Self::ASSET_MODE, Self::format_asset_mode(mode));
    }

    /// Mark `path` as a symbolic link with `mode`
    pub fn fill_symlink_attrs(index: &mut TreeIndex, path: &str, mode: u32) {
        index.set_attr(path, Self::ASSET_TYPE, Self::ASSET_TYPE_SYMLINK);
        index.set_attr(path, Self::ASSET_MODE, Self::format_asset_mode(mode));
    }

    /// Permission bits recorded for `path`
    pub fn asset_mode(index: &TreeIndex, path: &str) -> u32 {
        Self::parse_asset_mode(
            index.get_attr(path, Self::ASSET_MODE, ""),
            Self::DEFAULT_ASSET_MODE,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{LocalDirectoryStorage, MemoryObjectsStorage, ObjectsStorage, Reference};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn roundtrip(index: &TreeIndex) -> TreeIndex {
        let mut buffer = Vec::new();
        index.store(&mut buffer).unwrap();
        TreeIndex::load(buffer.as_slice(), None).unwrap()
    }

    #[test]
    fn test_empty_index_id() {
        let index = TreeIndex::new();
        assert!(index.is_empty());

        let expected = AssetId::create_for_bytes(
            br#"{"parent":{"id":""},"attributes":{},"content":{},"content_attributes":{}}"#,
        );
        assert_eq!(index.self_id().unwrap(), expected);
        assert_eq!(index.self_id().unwrap(), expected);
    }

    #[test]
    fn test_insert_path_changes_id() {
        let mut index = TreeIndex::new();
        let empty_id = index.self_id().unwrap();

        assert!(index.insert_path("a.txt", Asset::create_for_str("hello")));
        assert_ne!(index.self_id().unwrap(), empty_id);
        assert_eq!(index.content().len(), 1);
        assert!(!index.is_empty());
    }

    #[test]
    fn test_insert_path_uniqueness() {
        let mut index = TreeIndex::new();
        let first = Asset::create_for_str("first");
        assert!(index.insert_path("a", first.clone()));
        assert!(!index.insert_path("a", Asset::create_for_str("second")));
        assert_eq!(index.asset("a"), Some(&first));
        assert!(!index.insert_path("b", Asset::default()));
        assert!(!index.contains_path("b"));
    }

    #[test]
    fn test_replace_path() {
        let mut index = TreeIndex::new();
        index.replace_path("a", Asset::create_for_str("one")).unwrap();
        index.replace_path("a", Asset::create_for_str("two")).unwrap();
        assert_eq!(index.asset("a"), Some(&Asset::create_for_str("two")));

        let result = index.replace_path("x", Asset::default());
        assert!(matches!(
            result,
            Err(PielError::AttemptToAddEmptyAssetIntoIndex { ref path }) if path == "x"
        ));
    }

    #[test]
    fn test_remove_path() {
        let mut index = TreeIndex::new();
        index.insert_path("a", Asset::create_for_str("a"));
        index.remove_path("a");
        index.remove_path("missing");
        assert!(index.content().is_empty());
    }

    #[test]
    fn test_attributes() {
        let mut index = TreeIndex::new();
        index.set_message("initial");
        index.set_author("Jane");
        index.set_attribute("custom", "value");
        assert_eq!(index.message(), "initial");
        assert_eq!(index.author(), "Jane");
        assert_eq!(index.email(), "");
        assert_eq!(index.get_attribute("custom", "x"), "value");
        assert_eq!(index.get_attribute("missing", "x"), "x");

        index.set_attr("a", "k", "v");
        assert_eq!(index.get_attr("a", "k", "d"), "v");
        assert_eq!(index.get_attr("a", "other", "d"), "d");
        assert_eq!(index.get_attr("b", "k", "d"), "d");
        assert!(index.get_attrs("b").is_none());
    }

    #[test]
    fn test_initial_index() {
        let mut index = TreeIndex::new();
        assert!(!index.is_initial_index());
        index.initial_for("main");
        assert!(index.is_initial_index());
        assert_eq!(index.get_attribute("initial_for", ""), "main");
    }

    #[test]
    fn test_store_load_roundtrip() {
        let mut index = TreeIndex::new();
        index.set_parent(Asset::create_id(AssetId::create_for_bytes(b"parent")));
        index.insert_path("dir/b.txt", Asset::create_for_str("b"));
        index.insert_path("a.txt", Asset::create_for_str("a"));
        PredefinedAttributes::fill_file_attrs(&mut index, "a.txt", 0o100644);
        index.set_message("msg");

        let loaded = roundtrip(&index);
        assert_eq!(loaded.self_id().unwrap(), index.self_id().unwrap());
        assert_eq!(loaded.parent(), index.parent());
        assert_eq!(loaded.index_paths(), index.index_paths());
        assert_eq!(loaded.get_attr("a.txt", PredefinedAttributes::ASSET_MODE, ""), "420");
    }

    #[test]
    fn test_json_key_order() {
        let mut index = TreeIndex::new();
        index.set_attr("p", "k", "v");
        let mut buffer = Vec::new();
        index.store(&mut buffer).unwrap();
        let json = String::from_utf8(buffer).unwrap();

        let parent = json.find("\"parent\"").unwrap();
        let attributes = json.find("\"attributes\"").unwrap();
        let content = json.find("\"content\"").unwrap();
        let content_attributes = json.find("\"content_attributes\"").unwrap();
        assert!(parent < attributes && attributes < content && content < content_attributes);
    }

    #[test]
    fn test_load_duplicate_paths() {
        let json = r#"{"parent":{"id":""},"attributes":{},
            "content":{"a":{"id":"1"},"a":{"id":"2"}},"content_attributes":{}}"#;
        let result = TreeIndex::load(json.as_bytes(), None);
        assert!(matches!(
            result,
            Err(PielError::IndexHasSeveralEqualPaths { ref path }) if path == "a"
        ));
    }

    #[test]
    fn test_load_invalid_json() {
        assert!(matches!(
            TreeIndex::load(&b"not json"[..], None),
            Err(PielError::Json(_))
        ));
    }

    #[test]
    fn test_load_non_readable_asset() {
        let asset = Asset::create_id(AssetId::create_for_bytes(b"nowhere"));
        let index = TreeIndex::load_asset(&asset, None).unwrap();
        assert!(index.is_empty());
    }

    #[test]
    fn test_from_ref_memory() {
        let storage: StorageRef = Arc::new(MemoryObjectsStorage::new());
        let mut index = TreeIndex::new();
        index.insert_path("a.txt", Asset::create_for_str("hello"));

        storage.put_all(&index.assets().unwrap()).unwrap();
        let id = index.self_id().unwrap();
        storage.create_reference(&Reference::new("main", id.clone())).unwrap();

        let loaded = TreeIndex::from_ref(&storage, "main").unwrap().unwrap();
        assert_eq!(loaded.self_id().unwrap(), id);

        let mut data = String::new();
        loaded.asset("a.txt").unwrap().istream().unwrap().read_to_string(&mut data).unwrap();
        assert_eq!(data, "hello");

        assert!(TreeIndex::from_ref(&storage, "unknown").unwrap().is_none());
    }

    #[test]
    fn test_from_ref_local() {
        let temp_dir = TempDir::new().unwrap();
        let storage: StorageRef = Arc::new(LocalDirectoryStorage::new(temp_dir.path()).unwrap());

        let mut index = TreeIndex::new();
        index.insert_path("a.txt", Asset::create_for_str("hello"));
        index.insert_path("b.txt", Asset::create_for_str("world"));
        storage.put_all(&index.assets().unwrap()).unwrap();
        storage
            .create_reference(&Reference::new("main", index.self_id().unwrap()))
            .unwrap();

        let loaded = TreeIndex::from_ref(&storage, "main").unwrap().unwrap();
        assert_eq!(loaded.self_id().unwrap(), index.self_id().unwrap());
    }

    #[test]
    fn test_asset_mode() {
        assert_eq!(PredefinedAttributes::format_asset_mode(0o100755), "493");
        assert_eq!(PredefinedAttributes::parse_asset_mode("493", 0), 0o755);
        assert_eq!(PredefinedAttributes::parse_asset_mode("bad", 0o666), 0o666);

        let index = TreeIndex::new();
        assert_eq!(PredefinedAttributes::asset_mode(&index, "missing"), 0o666);
    }
}
