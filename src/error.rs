//! Error types for the piel library
//!
//! Every failure the core can detect is a variant of [`PielError`]. Errors are
//! raised where they are detected and propagated unchanged to the caller; the
//! library never retries and never silently skips an item.

use crate::asset_id::AssetId;
use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Results in the piel library
pub type Result<T> = std::result::Result<T, PielError>;

/// Main error type for all piel operations
#[derive(Debug, Error)]
pub enum PielError {
    /// I/O errors during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors during JSON serialization/deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Walk directory error from walkdir crate
    #[error("Walk directory error: {0}")]
    WalkDir(#[from] walkdir::Error),

    /// `replace_path` was given an asset without identity
    #[error("Attempt to add empty asset into index at path: {path}")]
    AttemptToAddEmptyAssetIntoIndex {
        /// Index path the asset was meant for
        path: String,
    },

    /// Per-path attribute map is missing where one must exist
    #[error("Unable to get attributes map for path: {path}")]
    UnableToGetPathAttributesMap {
        /// Index path
        path: String,
    },

    /// Serialized index contains the same path more than once
    #[error("Index has several equal paths: {path}")]
    IndexHasSeveralEqualPaths {
        /// Duplicated index path
        path: String,
    },

    /// Asset stream is absent so its id can not be computed
    #[error("Unable to calculate asset id")]
    UnableToCalculateAssetId,

    /// Directory creation failed
    #[error("Unable to create directory: {path:?}")]
    UnableToCreateDirectory {
        /// Directory that could not be created
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Storage was asked to keep an asset that has no readable stream
    #[error("Attempt to put non readable asset: {0}")]
    AttemptToPutNonReadableAsset(AssetId),

    /// Reference name is already taken
    #[error("Unable to insert new reference: {0}")]
    UnableToInsertNewReference(String),

    /// Extraction of an asset without readable stream
    #[error("Attempt to export non readable asset: {0}")]
    AttemptToExportNonReadableAsset(AssetId),

    /// Written data does not hash to the expected asset id
    #[error("Exported data is corrupted - expected: {expected}, actual: {actual}")]
    ExportedDataIsCorrupted {
        /// Asset id the data should hash to
        expected: AssetId,
        /// Id of the data actually written
        actual: AssetId,
    },

    /// Parent directory of an extracted item can not be created
    #[error("Unable to create item parent: {0:?}")]
    UnableToCreateItemParent(PathBuf),

    /// Extraction target directory does not exist
    #[error("Attempt to export to non existing directory: {0:?}")]
    AttemptToExportToNonExistingDirectory(PathBuf),

    /// `asset_type` attribute holds an unsupported value
    #[error("Unknown asset type '{asset_type}' for path: {path}")]
    UnknownAssetType {
        /// Index path
        path: String,
        /// Attribute value found
        asset_type: String,
    },

    /// Path conversion error
    #[error("Path conversion error: {0:?}")]
    PathConversion(std::ffi::OsString),

    /// Lock acquisition timeout
    #[error("Lock acquisition timeout: {0:?}")]
    LockTimeout(PathBuf),

    /// Working copy metadata already exists
    #[error("Working copy already exists at: {0:?}")]
    InitExistingWorkingCopy(PathBuf),

    /// No working copy in the directory or any of its parents
    #[error("Not a working copy: {0:?}")]
    AttachToNonWorkingCopy(PathBuf),

    /// Working copy has no current reference file
    #[error("Unable to find reference file: {0:?}")]
    UnableToFindReferenceFile(PathBuf),

    /// Commit requested on a tree without changes
    #[error("Nothing to commit")]
    NothingToCommit,

    /// Operation requires a clean working tree
    #[error("There are non committed changes")]
    ThereAreNonCommittedChanges,

    /// Reference does not resolve
    #[error("No such reference: {0}")]
    NoSuchReference(String),

    /// Reference to create already points somewhere
    #[error("Reference already exists: {0}")]
    NonEmptyReferenceAlreadyExists(String),

    /// Reference name can not be stored in a references file
    #[error("Invalid reference name: {0:?}")]
    InvalidReferenceName(String),
}

impl PielError {
    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        matches!(self, PielError::LockTimeout(_))
    }

    /// Check if this error indicates corruption
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            PielError::ExportedDataIsCorrupted { .. } | PielError::IndexHasSeveralEqualPaths { .. }
        )
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            PielError::NothingToCommit => "No changes!".to_string(),
            PielError::ThereAreNonCommittedChanges => {
                "There are non committed changes. Commit them or use force.".to_string()
            }
            PielError::AttachToNonWorkingCopy(_) => {
                "Attempt to perform operation outside of working copy!".to_string()
            }
            PielError::LockTimeout(path) => format!(
                "Timed out waiting for lock {:?}. Another operation may be in progress. Try again later.",
                path
            ),
            _ => self.to_string(),
        }
    }
}
