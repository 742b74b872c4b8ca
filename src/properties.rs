//! `name=value` properties files
//!
//! Used for `references.properties` in local storages and for working copy
//! `config.properties`. One pair per line; names and values are trimmed, `#`
//! starts a comment, lines without `=` are ignored. When a name repeats the
//! first occurrence wins.

use crate::error::Result;
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::trace;

/// Ordered set of string properties
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    data: BTreeMap<String, String>,
}

impl Properties {
    /// Create an empty property set
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse properties from a reader
    pub fn load<R: Read>(reader: R) -> Result<Self> {
        let mut result = Self::new();
        for line in BufReader::new(reader).lines() {
            let line = line?;
            if let Some((name, value)) = parse_line(&line) {
                trace!("'{}' = '{}'", name, value);
                result.data.entry(name).or_insert(value);
            }
        }
        Ok(result)
    }

    /// Parse a properties file; a missing file is an empty set
    pub fn load_file(path: &Path) -> Result<Self> {
        match fs::File::open(path) {
            Ok(file) => Self::load(file),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Write all pairs, one `name=value` line each, sorted by name
    pub fn store<W: Write>(&self, mut writer: W) -> Result<()> {
        for (name, value) in &self.data {
            writeln!(writer, "{}={}", name, value)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Replace a properties file atomically
    pub fn store_file(&self, path: &Path) -> Result<()> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut temp = NamedTempFile::new_in(dir)?;
        self.store(&mut temp)?;
        temp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    /// Value of a property
    pub fn get(&self, name: &str) -> Option<&str> {
        self.data.get(name).map(String::as_str)
    }

    /// Set a property, returning the previous value
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.data.insert(name.into(), value.into())
    }

    /// Remove a property
    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.data.remove(name)
    }

    /// Check whether a property is present
    pub fn contains(&self, name: &str) -> bool {
        self.data.contains_key(name)
    }

    /// Iterate pairs in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.data.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of properties
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check for an empty set
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

fn parse_line(line: &str) -> Option<(String, String)> {
    let line = line.split('#').next().unwrap_or_default();
    let (name, value) = line.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.trim().to_string()))
}
