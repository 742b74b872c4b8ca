//! Property-based testing for Piel
//!
//! Uses proptest to verify invariants of ids, indexes, diffs and storages
//! across randomly generated inputs.

use ::piel::*;
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;
use tempfile::TempDir;

/// Generate index paths of one to three components
fn path_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec("[a-z][a-z0-9_]{0,7}(\\.(txt|rs|md))?", 1..=3).prop_map(|parts| parts.join("/"))
}

/// Generate random file content
fn content_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        // Small text files
        "[a-zA-Z0-9 \n]{1,200}".prop_map(|s| s.into_bytes()),
        // Binary data
        prop::collection::vec(any::<u8>(), 1..1024),
        // Repetitive patterns
        (any::<u8>(), 1..256usize).prop_map(|(byte, count)| vec![byte; count]),
    ]
}

/// Generate an index with content, per-path and index attributes
fn index_strategy() -> impl Strategy<Value = TreeIndex> {
    (
        prop::collection::btree_map(path_strategy(), content_strategy(), 0..8),
        prop::collection::btree_map("[a-z_]{1,10}", "[ -~]{0,20}", 0..4),
        prop::option::of("[0-7]{3}"),
    )
        .prop_map(|(files, attributes, mode)| build_index(&files, &attributes, mode))
}

fn build_index(
    files: &BTreeMap<String, Vec<u8>>,
    attributes: &BTreeMap<String, String>,
    mode: Option<String>,
) -> TreeIndex {
    let mut index = TreeIndex::new();
    for (path, content) in files {
        index.insert_path(path.clone(), Asset::create_for_bytes(content.clone()));
        if let Some(mode) = &mode {
            let mode = u32::from_str_radix(mode, 8).unwrap_or(0o644);
            PredefinedAttributes::fill_file_attrs(&mut index, path, mode);
        }
    }
    for (name, value) in attributes {
        index.set_attribute(name.clone(), value.clone());
    }
    index
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Equal bytes hash to equal ids, different bytes to different ids
    #[test]
    fn content_addressing(a in content_strategy(), b in content_strategy()) {
        let first = AssetId::create_for_bytes(&a);
        let second = AssetId::create_for(a.as_slice()).unwrap();
        prop_assert_eq!(&first, &second);

        if a != b {
            prop_assert_ne!(first, AssetId::create_for_bytes(&b));
        }
    }

    /// Serialized indexes load back with the same id
    #[test]
    fn index_round_trip(index in index_strategy()) {
        let mut buffer = Vec::new();
        index.store(&mut buffer).unwrap();
        let loaded = TreeIndex::load(buffer.as_slice(), None).unwrap();

        prop_assert_eq!(loaded.self_id().unwrap(), index.self_id().unwrap());
        prop_assert!(IndexesDiff::diff(&index, &loaded).is_empty());
    }

    /// An index never differs from itself
    #[test]
    fn diff_identity(index in index_strategy()) {
        let diff = IndexesDiff::diff(&index, &index);
        prop_assert!(diff.is_empty());
        prop_assert!(!diff.has_content_changes());
    }

    /// Content diff entries are exactly the paths that differ
    #[test]
    fn diff_matches_path_sets(first in index_strategy(), second in index_strategy()) {
        let diff = IndexesDiff::diff(&first, &second);

        for path in first.index_paths().union(&second.index_paths()) {
            let expected = match (first.asset(path), second.asset(path)) {
                (Some(a), Some(b)) if a == b => None,
                (Some(_), Some(_)) => Some(ElementState::Modified),
                (Some(_), None) => Some(ElementState::Removed),
                (None, Some(_)) => Some(ElementState::Added),
                (None, None) => unreachable!(),
            };
            prop_assert_eq!(diff.content_diff().get(path).map(|c| c.state), expected);
        }
        prop_assert!(diff
            .content_diff()
            .values()
            .all(|change| change.state != ElementState::Unmodified));
    }

    /// Empty diffs compose across bytes, storage and id-only backings
    #[test]
    fn diff_transitivity(index in index_strategy()) {
        // Same snapshot read back through a storage
        let memory: StorageRef = Arc::new(MemoryObjectsStorage::new());
        memory.put_all(&index.assets().unwrap()).unwrap();
        let mut buffer = Vec::new();
        index.store(&mut buffer).unwrap();
        let b = TreeIndex::load(buffer.as_slice(), Some(&memory)).unwrap();

        // Same snapshot rebuilt from ids alone
        let mut c = TreeIndex::new();
        for (path, asset) in index.content() {
            c.insert_path(path.clone(), Asset::create_id(asset.id().unwrap().clone()));
        }
        for (path, attrs) in index.content_attributes() {
            c.set_attrs(path.clone(), attrs.clone());
        }
        for (name, value) in index.attributes() {
            c.set_attribute(name.clone(), value.clone());
        }

        for path in index.index_paths() {
            prop_assert!(b.asset(&path).unwrap().istream().is_some());
            prop_assert!(c.asset(&path).unwrap().istream().is_none());
        }

        prop_assert!(IndexesDiff::diff(&index, &b).is_empty());
        prop_assert!(IndexesDiff::diff(&b, &c).is_empty());
        prop_assert!(IndexesDiff::diff(&index, &c).is_empty());
        prop_assert_eq!(c.self_id().unwrap(), index.self_id().unwrap());
    }

    /// Putting an asset twice leaves one blob with the same bytes
    #[test]
    fn storage_put_idempotent(content in content_strategy()) {
        let dir = TempDir::new().unwrap();
        let local: StorageRef = Arc::new(LocalDirectoryStorage::new(dir.path()).unwrap());
        let memory = Arc::new(MemoryObjectsStorage::new());
        let memory_ref: StorageRef = memory.clone();

        let asset = Asset::create_for_bytes(content.clone());
        let id = asset.id().unwrap().clone();

        for storage in [&local, &memory_ref] {
            storage.put(&asset).unwrap();
            prop_assert!(storage.contains(&id));
            storage.put(&asset).unwrap();
            prop_assert!(storage.contains(&id));

            let mut stored = Vec::new();
            std::io::Read::read_to_end(&mut storage.istream_for(&id).unwrap(), &mut stored).unwrap();
            prop_assert_eq!(&stored, &content);
        }
        prop_assert_eq!(memory.len(), 1);
    }

    /// The first asset inserted at a path wins
    #[test]
    fn insert_path_uniqueness(
        path in path_strategy(),
        a in content_strategy(),
        b in content_strategy(),
    ) {
        let first = Asset::create_for_bytes(a);
        let mut index = TreeIndex::new();

        prop_assert!(index.insert_path(path.clone(), first.clone()));
        prop_assert!(!index.insert_path(path.clone(), Asset::create_for_bytes(b)));
        prop_assert_eq!(index.asset(&path), Some(&first));
    }

    /// Any mutation changes the index id
    #[test]
    fn mutation_changes_identity(index in index_strategy(), path in path_strategy(), content in content_strategy()) {
        let before = index.self_id().unwrap();

        let mut changed = index.clone();
        changed.set_message(format!("{}-changed", index.message()));
        prop_assert_ne!(changed.self_id().unwrap(), before.clone());

        let mut changed = index.clone();
        let asset = Asset::create_for_bytes(content);
        let same = index.asset(&path) == Some(&asset);
        changed.replace_path(path, asset).unwrap();
        prop_assert_eq!(changed.self_id().unwrap() == before, same);
    }
}
