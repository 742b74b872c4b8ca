//! Filesystem helpers shared by the indexer, the extractor and the working
//! copy
//!
//! ## Categories
//!
//! ### Index paths
//! - Converting filesystem paths below a root into `/`-separated index keys
//!   and back
//!
//! ### Cross-Platform Compatibility
//! - Unix/Windows permission handling
//! - Symbolic link creation
//!
//! ### Directory management
//! - Emptying a directory while keeping selected entries

use crate::error::{PielError, Result};
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::trace;

/// Index key of `path` relative to `root`
///
/// Components are joined with `/` on every platform.
///
/// # Errors
///
/// - [`PielError::PathConversion`] if the path is not below `root` or a
///   component is not valid UTF-8
pub fn index_path(root: &Path, path: &Path) -> Result<String> {
    let relative = path
        .strip_prefix(root)
        .map_err(|_| PielError::PathConversion(path.as_os_str().to_os_string()))?;

    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => {
                let part = part
                    .to_str()
                    .ok_or_else(|| PielError::PathConversion(path.as_os_str().to_os_string()))?;
                parts.push(part);
            }
            _ => return Err(PielError::PathConversion(path.as_os_str().to_os_string())),
        }
    }
    Ok(parts.join("/"))
}

/// Filesystem path of an index key below `root`
///
/// # Errors
///
/// - [`PielError::PathConversion`] if the key is empty, absolute or
///   escapes `root`
pub fn fs_path(root: &Path, index_path: &str) -> Result<PathBuf> {
    let mut result = root.to_path_buf();
    let mut depth = 0usize;
    for part in index_path.split('/') {
        match part {
            "" | "." | ".." => return Err(PielError::PathConversion(index_path.into())),
            part => {
                result.push(part);
                depth += 1;
            }
        }
    }
    if depth == 0 {
        return Err(PielError::PathConversion(index_path.into()));
    }
    Ok(result)
}

/// Get Unix permissions from metadata
#[cfg(unix)]
pub fn permissions(metadata: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode()
}

/// Get permissions from metadata (Windows implementation)
///
/// Read-only files map to `0o444`, everything else to `0o644`.
#[cfg(windows)]
pub fn permissions(metadata: &fs::Metadata) -> u32 {
    if metadata.permissions().readonly() {
        0o444
    } else {
        0o644
    }
}

/// Set Unix permissions
#[cfg(unix)]
pub fn set_permissions(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    Ok(())
}

/// Set permissions (Windows implementation)
///
/// Only the owner write bit is honoured, as the read-only flag.
#[cfg(windows)]
pub fn set_permissions(path: &Path, mode: u32) -> Result<()> {
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_readonly(mode & 0o200 == 0);
    fs::set_permissions(path, perms)?;
    Ok(())
}

/// Create a symlink (cross-platform)
#[cfg(unix)]
pub fn create_symlink(target: &Path, link: &Path) -> Result<()> {
    std::os::unix::fs::symlink(target, link)?;
    Ok(())
}

/// Create a symlink (Windows)
#[cfg(windows)]
pub fn create_symlink(target: &Path, link: &Path) -> Result<()> {
    use std::os::windows::fs::{symlink_dir, symlink_file};

    let resolved = link.parent().map(|p| p.join(target)).unwrap_or_else(|| target.to_path_buf());
    if resolved.is_dir() {
        symlink_dir(target, link)?;
    } else {
        symlink_file(target, link)?;
    }
    Ok(())
}

/// Remove an item of any kind; directories are removed recursively
pub fn remove_item(path: &Path) -> Result<()> {
    let metadata = fs::symlink_metadata(path)?;
    if metadata.is_dir() {
        fs::remove_dir_all(path)?;
    } else {
        fs::remove_file(path)?;
    }
    trace!("Removed {:?}", path);
    Ok(())
}

/// Remove every entry of `dir` except those named in `keep`
pub fn clear_directory(dir: &Path, keep: &[&str]) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if keep.iter().any(|k| name == *k) {
            continue;
        }
        remove_item(&entry.path())?;
    }
    Ok(())
}
