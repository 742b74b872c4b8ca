//! Content hash identifiers
//!
//! An [`AssetId`] is the hex encoded digest of a byte stream. Three reserved
//! values mark ids that are not digests: [`AssetId::empty`] (no asset at all),
//! [`AssetId::base`] (placeholder root) and [`AssetId::not_calculated`].
//!
//! The digest algorithm is a type parameter of [`AssetId::create_for_with`];
//! [`AssetId::create_for`] fixes it to SHA-256.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::io::{self, Read, Write};

const BASE: &str = "<base>";
const NOT_CALCULATED: &str = "<not_calculated>";

/// Identity of an asset: the hex digest of its content
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(String);

impl AssetId {
    /// Id of "no asset"
    pub fn empty() -> Self {
        AssetId(String::new())
    }

    /// Placeholder root id
    pub fn base() -> Self {
        AssetId(BASE.to_string())
    }

    /// Id that has not been computed yet
    pub fn not_calculated() -> Self {
        AssetId(NOT_CALCULATED.to_string())
    }

    /// Wrap an already known id string
    pub fn create(id: impl Into<String>) -> Self {
        AssetId(id.into())
    }

    /// Hash a stream with SHA-256
    pub fn create_for<R: Read>(reader: R) -> io::Result<Self> {
        Self::create_for_with::<Sha256, R>(reader)
    }

    /// Hash a stream with the digest `D`
    ///
    /// The stream is consumed to its end.
    pub fn create_for_with<D: Digest, R: Read>(mut reader: R) -> io::Result<Self> {
        let mut hasher = D::new();
        let mut buffer = [0u8; 64 * 1024];
        loop {
            match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => hasher.update(&buffer[..n]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(AssetId(hex::encode(hasher.finalize())))
    }

    /// Hash an in-memory buffer with SHA-256
    pub fn create_for_bytes(data: &[u8]) -> Self {
        AssetId(hex::encode(Sha256::digest(data)))
    }

    /// Check for the `empty` id
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Check whether this is one of the reserved non-digest ids
    pub fn is_sentinel(&self) -> bool {
        self.0.is_empty() || self.0 == BASE || self.0 == NOT_CALCULATED
    }

    /// String form of the id
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First eight characters, for log lines
    pub fn short(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AssetId {
    fn from(id: &str) -> Self {
        AssetId::create(id)
    }
}

/// Writer adapter that hashes everything passing through it
///
/// Used when materializing assets to verify the written bytes against the
/// expected id.
pub struct IdWriter<W: Write> {
    inner: W,
    hasher: Sha256,
}

impl<W: Write> IdWriter<W> {
    /// Wrap a writer
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
        }
    }

    /// Flush and return the inner writer with the id of the written bytes
    pub fn finish(mut self) -> io::Result<(W, AssetId)> {
        self.inner.flush()?;
        Ok((self.inner, AssetId(hex::encode(self.hasher.finalize()))))
    }
}

impl<W: Write> Write for IdWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.hasher.update(&buf[..written]);
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
