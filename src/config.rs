//! Configuration knobs
//!
//! - [`StorageLayout`] selects how [`LocalDirectoryStorage`] fans object files
//!   out into subdirectories.
//! - [`Property`] describes one working copy setting kept in
//!   `config.properties`, with an environment variable and a default to fall
//!   back on. [`PredefinedConfigs`] lists the settings commits read.
//!
//! [`LocalDirectoryStorage`]: crate::storage::LocalDirectoryStorage

use crate::asset_id::AssetId;
use crate::properties::Properties;
use std::env;
use std::path::{Path, PathBuf};

/// Object fan-out of a local directory storage
///
/// An id is split into `depth` leading segments of `segment_len` characters,
/// each a nested directory, and the file itself is named by the full id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageLayout {
    /// Number of nested directories
    pub depth: usize,
    /// Characters per directory name
    pub segment_len: usize,
}

impl Default for StorageLayout {
    fn default() -> Self {
        Self {
            depth: 3,
            segment_len: 2,
        }
    }
}

impl StorageLayout {
    /// Path of the object file for `id` below `objects_dir`
    ///
    /// Ids shorter than the fan-out prefix get as many segments as they can
    /// fill.
    pub fn object_path(&self, objects_dir: &Path, id: &AssetId) -> PathBuf {
        let id = id.as_str();
        let mut path = objects_dir.to_path_buf();
        if self.segment_len > 0 {
            for level in 0..self.depth {
                let start = level * self.segment_len;
                match id.get(start..start + self.segment_len) {
                    Some(part) => path.push(part),
                    None => break,
                }
            }
        }
        path.push(id);
        path
    }
}

/// Named setting with environment and default fallbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Property {
    /// Key in `config.properties`
    pub name: &'static str,
    /// Value used when neither file nor environment provide one
    pub default: &'static str,
    /// Environment variable consulted before the default
    pub env: Option<&'static str>,
    /// One line description
    pub description: &'static str,
}

impl Property {
    /// Resolve the value: stored value, else environment, else default
    pub fn value(&self, props: &Properties) -> String {
        if let Some(value) = props.get(self.name) {
            return value.to_string();
        }
        self.env
            .and_then(|name| env::var(name).ok())
            .unwrap_or_else(|| self.default.to_string())
    }
}

/// Settings read when committing
pub struct PredefinedConfigs;

impl PredefinedConfigs {
    /// Commit author name
    pub const AUTHOR: Property = Property {
        name: "author",
        default: "unknown",
        env: Some("PIE_AUTHOR"),
        description: "Commit author.",
    };

    /// Commit author email
    pub const EMAIL: Property = Property {
        name: "email",
        default: "unknown",
        env: Some("PIE_EMAIL"),
        description: "Commit author email.",
    };

    /// Committer name
    pub const COMMITER: Property = Property {
        name: "commiter",
        default: "unknown",
        env: Some("PIE_COMMITER"),
        description: "Commiter.",
    };

    /// Committer email
    pub const COMMITER_EMAIL: Property = Property {
        name: "commiter_email",
        default: "unknown",
        env: Some("PIE_COMMITER_EMAIL"),
        description: "Commiter email.",
    };

    /// Every predefined setting
    pub const ALL: [Property; 4] = [Self::AUTHOR, Self::EMAIL, Self::COMMITER, Self::COMMITER_EMAIL];

    /// Look a predefined setting up by name
    pub fn find(name: &str) -> Option<Property> {
        Self::ALL.into_iter().find(|p| p.name == name)
    }
}
