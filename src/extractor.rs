//! Materializing a tree index into a directory
//!
//! Every path of the index is written below the target directory. Regular
//! files are streamed from their asset while being hashed, and only land at
//! their final name once the written bytes match the asset id. Symbolic links
//! are recreated from the target stored in their asset.
//!
//! What happens to items already present at a path is chosen by an
//! [`ExtractPolicy`].

use crate::asset::Asset;
use crate::asset_id::{AssetId, IdWriter};
use crate::error::{PielError, Result};
use crate::tree_index::{PredefinedAttributes, TreeIndex};
use crate::utils;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, trace, warn};

/// Treatment of items that already exist at an extracted path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtractPolicy {
    /// Remove the existing item and write the new one
    #[default]
    ReplaceExisting,
    /// Leave the existing item untouched and skip the path
    KeepExisting,
    /// Rename the existing item to `<name>.backup.<index id>` first
    BackupExisting,
    /// Keep the existing item and write to `<name>.new.<index id>`
    PutNewWithSuffix,
}

/// Writes the content of a tree index to the filesystem
#[derive(Debug)]
pub struct AssetsExtractor<'a> {
    index: &'a TreeIndex,
    policy: ExtractPolicy,
}

impl<'a> AssetsExtractor<'a> {
    /// Create an extractor for `index`
    pub fn new(index: &'a TreeIndex, policy: ExtractPolicy) -> Self {
        Self { index, policy }
    }

    /// Extract every path into `directory`
    ///
    /// Returns the number of items written. Extraction stops at the first
    /// failing item.
    ///
    /// # Errors
    ///
    /// - [`PielError::AttemptToExportToNonExistingDirectory`] if `directory`
    ///   is missing
    /// - [`PielError::AttemptToExportNonReadableAsset`] if an asset has no
    ///   readable stream
    /// - [`PielError::ExportedDataIsCorrupted`] if written data does not hash
    ///   to the asset id
    /// - [`PielError::UnableToCreateItemParent`] if a parent directory can not
    ///   be created
    /// - [`PielError::UnknownAssetType`] for unsupported `asset_type` values
    pub fn extract_into(&self, directory: &Path) -> Result<usize> {
        if !directory.is_dir() {
            warn!("Attempt to extract data to non existing directory: {:?}", directory);
            return Err(PielError::AttemptToExportToNonExistingDirectory(directory.to_path_buf()));
        }

        let index_id = self.index.self_id()?;
        let mut extracted = 0;

        for (path, asset) in self.index.content() {
            let mut item_path = utils::fs_path(directory, path)?;

            if fs::symlink_metadata(&item_path).is_ok() {
                match self.policy {
                    ExtractPolicy::ReplaceExisting => {
                        trace!("Replace existing item: {:?}", item_path);
                        utils::remove_item(&item_path)?;
                    }
                    ExtractPolicy::KeepExisting => {
                        trace!("Keep existing: {:?}", item_path);
                        continue;
                    }
                    ExtractPolicy::BackupExisting => {
                        let backup = with_suffix(&item_path, "backup", &index_id);
                        trace!("Backup existing item: {:?} -> {:?}", item_path, backup);
                        fs::rename(&item_path, &backup)?;
                    }
                    ExtractPolicy::PutNewWithSuffix => {
                        item_path = with_suffix(&item_path, "new", &index_id);
                        trace!("New item path: {:?}", item_path);
                        if fs::symlink_metadata(&item_path).is_ok() {
                            utils::remove_item(&item_path)?;
                        }
                    }
                }
            }

            self.extract_asset_into(&item_path, path, asset)?;
            extracted += 1;
        }

        debug!("Extracted {} items into {:?}", extracted, directory);
        Ok(extracted)
    }

    fn extract_asset_into(&self, item_path: &Path, path: &str, asset: &Asset) -> Result<()> {
        let expected = asset.id()?.clone();
        let mut reader = asset.istream().ok_or_else(|| {
            warn!("Non readable asset: {}", expected);
            PielError::AttemptToExportNonReadableAsset(expected.clone())
        })?;

        create_parent(item_path)?;

        let asset_type = self.index.get_attr(
            path,
            PredefinedAttributes::ASSET_TYPE,
            PredefinedAttributes::ASSET_TYPE_FILE,
        );

        match asset_type {
            PredefinedAttributes::ASSET_TYPE_FILE => {
                let parent = item_path.parent().unwrap_or_else(|| Path::new("."));
                let mut writer = IdWriter::new(NamedTempFile::new_in(parent)?);
                io::copy(&mut reader, &mut writer)?;
                let (temp, actual) = writer.finish()?;
                verify(&expected, actual)?;

                temp.persist(item_path).map_err(|e| e.error)?;
                let mode = PredefinedAttributes::asset_mode(self.index, path);
                utils::set_permissions(item_path, mode)?;
                trace!("Extracted file {:?} ({:o})", item_path, mode);
            }
            PredefinedAttributes::ASSET_TYPE_SYMLINK => {
                let mut target = Vec::new();
                reader.read_to_end(&mut target)?;
                verify(&expected, AssetId::create_for_bytes(&target))?;

                let target = String::from_utf8(target)
                    .map_err(|e| PielError::PathConversion(String::from_utf8_lossy(e.as_bytes()).into_owned().into()))?;
                trace!("Create symbolic link {:?} -> {}", item_path, target);
                utils::create_symlink(Path::new(&target), item_path)?;
            }
            other => {
                return Err(PielError::UnknownAssetType {
                    path: path.to_string(),
                    asset_type: other.to_string(),
                });
            }
        }
        Ok(())
    }
}

fn verify(expected: &AssetId, actual: AssetId) -> Result<()> {
    if *expected != actual {
        warn!("Corrupted asset data: expected {}, got {}", expected, actual);
        return Err(PielError::ExportedDataIsCorrupted {
            expected: expected.clone(),
            actual,
        });
    }
    Ok(())
}

fn with_suffix(path: &Path, kind: &str, index_id: &AssetId) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(format!(".{}.{}", kind, index_id));
    path.with_file_name(name)
}

/// Make sure the parent of `item_path` is a directory, replacing a file in
/// its way
fn create_parent(item_path: &Path) -> Result<()> {
    let Some(parent) = item_path.parent() else {
        return Ok(());
    };

    if let Ok(metadata) = fs::symlink_metadata(parent) {
        if !metadata.is_dir() {
            trace!("Replace parent by directory: {:?}", parent);
            utils::remove_item(parent).map_err(|_| PielError::UnableToCreateItemParent(parent.to_path_buf()))?;
        }
    }

    fs::create_dir_all(parent).map_err(|e| {
        warn!("No parent {:?}: {}", parent, e);
        PielError::UnableToCreateItemParent(parent.to_path_buf())
    })?;
    Ok(())
}
