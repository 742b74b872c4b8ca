//! # Piel - Content-addressed tree snapshots
//!
//! A storage and diff engine for versioned directory trees.
//!
//! ## Overview
//!
//! Piel records a directory as a [`TreeIndex`]: a mapping from `/`-separated
//! paths to content-addressed [`Asset`]s, plus per-index and per-path string
//! attributes. Every index serializes to canonical JSON whose SHA-256 digest
//! is the index's own id, so an index can be stored next to the file blobs
//! it refers to and linked into a chain of commits through its `parent`.
//!
//! - **Assets and ids**: [`AssetId`] is the lowercase hex SHA-256 of a byte
//!   stream. An [`Asset`] pairs an id with a way to read the bytes back: an
//!   in-memory buffer, a file, a storage, or nothing at all.
//! - **Object storages**: [`ObjectsStorage`] holds blobs by id and maps
//!   reference names to ids. [`LocalDirectoryStorage`] persists to disk,
//!   [`MemoryObjectsStorage`] lives in memory.
//! - **Diffs**: [`IndexesDiff`] compares two indexes in three independent
//!   maps: content, index attributes and per-path attributes.
//! - **Working copy**: [`WorkingCopy`] binds a directory to a local storage
//!   and offers status, commit, create, checkout and log on top of the above.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use piel::{Asset, IndexesDiff, MemoryObjectsStorage, ObjectsStorage, Reference, StorageRef, TreeIndex};
//! use std::sync::Arc;
//!
//! # fn main() -> piel::Result<()> {
//! let storage: StorageRef = Arc::new(MemoryObjectsStorage::new());
//!
//! let mut first = TreeIndex::new();
//! first.insert_path("README", Asset::create_for_str("hello"));
//! first.set_message("Initial import");
//! storage.put_all(&first.assets()?)?;
//! storage.create_reference(&Reference::new("main", first.self_id()?))?;
//!
//! let loaded = TreeIndex::from_ref(&storage, "main")?.expect("reference exists");
//! assert_eq!(loaded.self_id()?, first.self_id()?);
//!
//! let mut second = loaded.clone();
//! second.replace_path("README", Asset::create_for_str("hello, world"))?;
//! let diff = IndexesDiff::diff(&loaded, &second);
//! println!("{}", diff);
//! # Ok(())
//! # }
//! ```
//!
//! ## Working Copies
//!
//! ```rust,no_run
//! use piel::{CheckoutOptions, WorkingCopy};
//!
//! # fn main() -> piel::Result<()> {
//! let mut wc = WorkingCopy::attach(".")?;
//! let status = wc.status()?;
//! if !status.clean {
//!     print!("{}", status);
//!     wc.commit("Save work")?;
//! }
//! wc.checkout("release", CheckoutOptions::default())?;
//! for entry in wc.log(None, None)? {
//!     print!("{}", entry);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Key Concepts
//!
//! ### Identity
//!
//! The id of an index depends on its serialized form only. Two indexes with
//! equal parent, content and attributes have equal ids, and any change to
//! one of them produces a different id. Ids are never cached on the index.
//!
//! ### References
//!
//! A reference is a name pointing at the id of an index. Local storages keep
//! the full history of ids a reference pointed at, newest first.
//!
//! ### Logging
//!
//! The crate logs through `tracing` and never installs a subscriber; without
//! one it is silent.
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result<T>`] with a [`PielError`] naming
//! the failure kind.
//!
//! ## Module Organization
//!
//! - [`asset_id`]: Content ids and the hashing writer
//! - [`asset`]: Readable and id-only assets
//! - [`storage`]: Object storages and references
//! - [`tree_index`]: Tree indexes and their JSON form
//! - [`indexes_diff`]: Diffing indexes
//! - [`history`]: Walking parent chains
//! - [`fs_indexer`] / [`extractor`]: Filesystem to index and back
//! - [`working_copy`]: Working copy operations
//! - [`config`] / [`properties`]: Configuration
//! - [`error`]: Error types

// Public API modules
pub mod asset;
pub mod asset_id;
pub mod config;
pub mod error;
pub mod extractor;
pub mod fs_indexer;
pub mod history;
pub mod indexes_diff;
pub mod properties;
pub mod storage;
pub mod tree_index;
pub mod working_copy;

// Internal modules (not part of public API)
mod collections;
mod utils;

// Re-export main types for convenience
pub use asset::{Asset, AssetReader};
pub use asset_id::{AssetId, IdWriter};
pub use config::{PredefinedConfigs, Property, StorageLayout};
pub use error::{PielError, Result};
pub use extractor::{AssetsExtractor, ExtractPolicy};
pub use fs_indexer::FsIndexer;
pub use history::{History, LogEntry};
pub use indexes_diff::{Change, ElementState, IndexesDiff};
pub use properties::Properties;
pub use storage::{LocalDirectoryStorage, MemoryObjectsStorage, ObjectsStorage, Reference, StorageRef};
pub use tree_index::{PredefinedAttributes, TreeIndex};
pub use working_copy::{CheckoutOptions, Status, WorkingCopy};
