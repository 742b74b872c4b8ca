//! Integration tests for Piel
//!
//! Covers the documented index scenarios against both storages and a
//! multi-branch working copy session driven by generated files.

use ::piel::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::fs;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tracing::info;

/// Deterministic file content generator
pub struct FileGenerator {
    rng: StdRng,
}

impl FileGenerator {
    /// Create a generator from a fixed seed
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Random bytes of a length in `min..max`
    pub fn content(&mut self, min: usize, max: usize) -> Vec<u8> {
        let len = self.rng.random_range(min..max);
        let mut data = vec![0u8; len];
        self.rng.fill(&mut data[..]);
        data
    }

    /// Write `count` files spread over a few directories; returns their
    /// index paths and contents
    pub fn populate(&mut self, root: &Path, count: usize) -> BTreeMap<String, Vec<u8>> {
        let mut written = BTreeMap::new();
        for i in 0..count {
            let dir = format!("dir{}", self.rng.random_range(0..4));
            let path = format!("{}/file_{}.bin", dir, i);
            let content = self.content(0, 2048);
            fs::create_dir_all(root.join(&dir)).unwrap();
            fs::write(root.join(&path), &content).unwrap();
            written.insert(path, content);
        }
        written
    }
}

/// Working copy in a temporary directory
pub struct PielTestHarness {
    pub temp_dir: TempDir,
    pub working_copy: WorkingCopy,
    pub file_generator: FileGenerator,
}

impl PielTestHarness {
    /// Create a working copy on `main`
    pub fn new(seed: u64) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let mut working_copy = WorkingCopy::init(temp_dir.path(), "main").unwrap();
        working_copy.set_config("author", "Test Author").unwrap();
        working_copy.set_config("email", "author@example.com").unwrap();
        Self {
            temp_dir,
            working_copy,
            file_generator: FileGenerator::new(seed),
        }
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Check that the working directory holds exactly `expected`
    pub fn assert_tree(&self, expected: &BTreeMap<String, Vec<u8>>) {
        let index = self.working_copy.working_dir_state().unwrap();
        let paths: Vec<String> = index.index_paths().into_iter().collect();
        let expected_paths: Vec<String> = expected.keys().cloned().collect();
        assert_eq!(paths, expected_paths);

        for (path, content) in expected {
            assert_eq!(&fs::read(self.root().join(path)).unwrap(), content, "content of {}", path);
        }
    }
}

/// Read the whole content of an asset
fn read_asset(asset: &Asset) -> anyhow::Result<Vec<u8>> {
    let id = asset.id()?;
    let mut reader = asset
        .istream()
        .ok_or_else(|| anyhow::anyhow!("asset {} is not readable", id))?;
    let mut data = Vec::new();
    reader.read_to_end(&mut data)?;
    Ok(data)
}

fn storages() -> Vec<(StorageRef, Option<TempDir>)> {
    let dir = TempDir::new().unwrap();
    let local: StorageRef = Arc::new(LocalDirectoryStorage::new(dir.path()).unwrap());
    let memory: StorageRef = Arc::new(MemoryObjectsStorage::new());
    vec![(local, Some(dir)), (memory, None)]
}

#[test]
fn test_empty_index_identity() {
    let index = TreeIndex::new();
    let first = index.self_id().unwrap();
    let second = index.self_id().unwrap();
    assert_eq!(first, second);

    let canonical = r#"{"parent":{"id":""},"attributes":{},"content":{},"content_attributes":{}}"#;
    assert_eq!(first, AssetId::create_for_bytes(canonical.as_bytes()));
}

#[test]
fn test_insert_changes_identity() {
    let mut index = TreeIndex::new();
    let empty_id = index.self_id().unwrap();

    assert!(index.insert_path("a.txt", Asset::create_for_str("hello")));
    assert_ne!(index.self_id().unwrap(), empty_id);
    assert_eq!(index.content().len(), 1);
}

#[test]
fn test_added_file_diff() {
    let mut t1 = TreeIndex::new();
    t1.insert_path("a.txt", Asset::create_for_str("a"));

    let mut t2 = t1.clone();
    let b = Asset::create_for_str("b content");
    t2.insert_path("b.txt", b.clone());

    let diff = IndexesDiff::diff(&t1, &t2);
    assert_eq!(diff.content_diff().len(), 1);

    let change = &diff.content_diff()["b.txt"];
    assert_eq!(change.state, ElementState::Added);
    assert!(change.first.is_empty());
    assert_eq!(change.second, b);
}

#[test]
fn test_reference_round_trip_in_both_storages() {
    for (storage, _dir) in storages() {
        let mut t2 = TreeIndex::new();
        t2.insert_path("a.txt", Asset::create_for_str("a"));
        t2.insert_path("b.txt", Asset::create_for_str("b"));
        t2.set_message("two files");

        storage.put_all(&t2.assets().unwrap()).unwrap();
        storage
            .create_reference(&Reference::new("main", t2.self_id().unwrap()))
            .unwrap();

        let loaded = TreeIndex::from_ref(&storage, "main").unwrap().unwrap();
        assert_eq!(loaded.self_id().unwrap(), t2.self_id().unwrap());

        // Content stays readable through the storage
        assert_eq!(read_asset(loaded.asset("b.txt").unwrap()).unwrap(), b"b");
    }
}

#[test]
fn test_modified_file_diff() {
    let old = Asset::create_for_str("old");
    let new = Asset::create_for_str("new");

    let mut t1 = TreeIndex::new();
    t1.insert_path("a.txt", old.clone());
    let mut t3 = t1.clone();
    t3.replace_path("a.txt", new.clone()).unwrap();

    let diff = IndexesDiff::diff(&t1, &t3);
    let change = &diff.content_diff()["a.txt"];
    assert_eq!(change.state, ElementState::Modified);
    assert_eq!(change.first, old);
    assert_eq!(change.second, new);
}

#[test]
fn test_replace_with_empty_asset() {
    let mut index = TreeIndex::new();
    let result = index.replace_path("x", Asset::default());
    assert!(matches!(
        result,
        Err(PielError::AttemptToAddEmptyAssetIntoIndex { ref path }) if path == "x"
    ));
    assert!(!index.contains_path("x"));
}

#[test]
fn test_reference_history_grows() {
    let dir = TempDir::new().unwrap();
    let local = LocalDirectoryStorage::new(dir.path()).unwrap();

    let ids: Vec<AssetId> = (0..3)
        .map(|i| AssetId::create_for_bytes(format!("index {}", i).as_bytes()))
        .collect();
    local.create_reference(&Reference::new("main", ids[0].clone())).unwrap();
    local.update_reference(&Reference::new("main", ids[1].clone())).unwrap();
    local.update_reference(&Reference::new("main", ids[2].clone())).unwrap();

    assert_eq!(local.resolve("main"), Some(ids[2].clone()));
    assert_eq!(
        local.reference_history("main").unwrap(),
        vec![ids[2].clone(), ids[1].clone(), ids[0].clone()]
    );
}

#[test]
fn test_branching_session() {
    let mut harness = PielTestHarness::new(42);

    let main_files = harness.file_generator.populate(harness.temp_dir.path(), 20);
    let main_id = harness.working_copy.commit("main content").unwrap();
    info!("Committed main {}", main_id);

    harness
        .working_copy
        .checkout(
            "feature",
            CheckoutOptions {
                create_new_branch: true,
                ..Default::default()
            },
        )
        .unwrap();
    harness.assert_tree(&BTreeMap::new());

    let feature_files = harness.file_generator.populate(harness.temp_dir.path(), 10);
    harness.working_copy.commit("feature content").unwrap();

    // Amend one file on the feature branch
    let (path, _) = feature_files.iter().next().unwrap();
    let mut feature_files = feature_files.clone();
    let amended = harness.file_generator.content(1, 64);
    fs::write(harness.root().join(path), &amended).unwrap();
    feature_files.insert(path.clone(), amended);

    let status = harness.working_copy.status().unwrap();
    assert_eq!(status.entries.len(), 1);
    assert_eq!(status.entries[0].state, ElementState::Modified);
    harness.working_copy.commit("amend").unwrap();

    harness.working_copy.checkout("main", CheckoutOptions::default()).unwrap();
    harness.assert_tree(&main_files);

    harness.working_copy.checkout("feature", CheckoutOptions::default()).unwrap();
    harness.assert_tree(&feature_files);

    let log = harness.working_copy.log(None, None).unwrap();
    let messages: Vec<&str> = log.iter().map(|e| e.message.as_str()).collect();
    assert_eq!(messages, vec!["amend", "feature content"]);
    assert!(log.iter().all(|e| e.author == "Test Author"));

    // Reattaching sees the same state
    let attached = WorkingCopy::attach(harness.root()).unwrap();
    assert_eq!(attached.current_reference(), "feature");
    assert_eq!(
        attached.reference_index().self_id().unwrap(),
        harness.working_copy.reference_index().self_id().unwrap()
    );
}

