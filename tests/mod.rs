//! Main test module for Piel
//!
//! This module includes all test suites:
//! - Integration tests for end-to-end scenarios
//! - Property-based tests for invariants

pub mod integration;
pub mod property;

#[cfg(test)]
mod edge_cases {
    use ::piel::*;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_unicode_paths() {
        let temp_dir = TempDir::new().unwrap();
        let storage_dir = TempDir::new().unwrap();

        let names = vec!["файл.txt", "文件.txt", "αρχείο.txt", "🚀🌟💾.txt"];
        let mut created = Vec::new();
        for name in &names {
            if fs::write(temp_dir.path().join(name), format!("Unicode content: {}", name)).is_ok() {
                created.push(*name);
            }
        }
        if created.is_empty() {
            return;
        }

        let storage: StorageRef = Arc::new(LocalDirectoryStorage::new(storage_dir.path()).unwrap());
        let index = FsIndexer::new(temp_dir.path()).build().unwrap();
        storage.put_all(&index.assets().unwrap()).unwrap();
        storage
            .create_reference(&Reference::new("main", index.self_id().unwrap()))
            .unwrap();

        let loaded = TreeIndex::from_ref(&storage, "main").unwrap().unwrap();
        for name in &created {
            assert!(loaded.contains_path(name));
        }

        let target = TempDir::new().unwrap();
        AssetsExtractor::new(&loaded, ExtractPolicy::ReplaceExisting)
            .extract_into(target.path())
            .unwrap();
        for name in &created {
            let content = fs::read_to_string(target.path().join(name)).unwrap();
            assert_eq!(content, format!("Unicode content: {}", name));
        }
    }

    #[test]
    fn test_permission_preservation() {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;

            let temp_dir = TempDir::new().unwrap();
            let mut wc = WorkingCopy::init(temp_dir.path(), "main").unwrap();

            let files = vec![
                ("readable.txt", 0o644),
                ("executable.sh", 0o755),
                ("readonly.txt", 0o444),
                ("useronly.txt", 0o600),
            ];
            for (name, mode) in &files {
                let path = temp_dir.path().join(name);
                fs::write(&path, format!("Content of {}", name)).unwrap();
                fs::set_permissions(&path, fs::Permissions::from_mode(*mode)).unwrap();
            }
            wc.commit("Permissions").unwrap();

            // Switch away and back to rebuild the tree from storage
            wc.create("scratch").unwrap();
            assert!(!temp_dir.path().join("readable.txt").exists());
            wc.checkout("main", CheckoutOptions::default()).unwrap();

            for (name, expected_mode) in &files {
                let metadata = fs::metadata(temp_dir.path().join(name)).unwrap();
                let actual_mode = metadata.permissions().mode() & 0o777;
                assert_eq!(
                    actual_mode, *expected_mode,
                    "Permission mismatch for file {}: expected {:o}, got {:o}",
                    name, expected_mode, actual_mode
                );
            }
        }
    }

    #[test]
    fn test_symlinks() {
        #[cfg(unix)]
        {
            let temp_dir = TempDir::new().unwrap();
            let mut wc = WorkingCopy::init(temp_dir.path(), "main").unwrap();

            fs::create_dir_all(temp_dir.path().join("dir")).unwrap();
            fs::write(temp_dir.path().join("dir/target.txt"), "Target content").unwrap();
            std::os::unix::fs::symlink("dir/target.txt", temp_dir.path().join("link.txt")).unwrap();
            wc.commit("With symlink").unwrap();
            assert_eq!(wc.reference_index().content().len(), 2);

            wc.create("scratch").unwrap();
            wc.checkout("main", CheckoutOptions::default()).unwrap();

            let link = temp_dir.path().join("link.txt");
            assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
            assert_eq!(fs::read_to_string(&link).unwrap(), "Target content");
            assert!(wc.status().unwrap().clean);
        }
    }
}
