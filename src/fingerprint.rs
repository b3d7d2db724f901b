// src/fingerprint.rs

//! Content fingerprints for inputs and declarations.
//!
//! A [`Fingerprint`] is the lowercase hex form of a blake3 digest. Inputs are
//! hashed by streaming their contents through the [`FileSystem`] seam;
//! declaration fingerprints come from dependency records and are treated as
//! opaque strings.

use std::fmt;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use blake3::Hasher;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::fs::FileSystem;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of_bytes(bytes: &[u8]) -> Self {
        Fingerprint(blake3::hash(bytes).to_hex().to_string())
    }

    /// Wrap an already computed fingerprint string.
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Fingerprint(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compute the fingerprint of a single file.
pub fn compute_file_fingerprint(fs: &dyn FileSystem, path: &Path) -> Result<Fingerprint> {
    let mut hasher = Hasher::new();
    let mut file = fs
        .open_read(path)
        .with_context(|| format!("opening file for fingerprinting: {:?}", path))?;
    let mut buf = [0u8; 8192];
    loop {
        let n = file
            .read(&mut buf)
            .with_context(|| format!("reading file for fingerprinting: {:?}", path))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    let fingerprint = Fingerprint(hasher.finalize().to_hex().to_string());
    debug!(path = ?path, fingerprint = %fingerprint, "fingerprinted file");
    Ok(fingerprint)
}

/// Combine several fingerprints into one.
///
/// `parts` must already be in a stable order (e.g. sorted by path).
pub fn compute_aggregate_fingerprint<'a, I>(parts: I) -> Fingerprint
where
    I: IntoIterator<Item = &'a Fingerprint>,
{
    let mut hasher = Hasher::new();
    for part in parts {
        hasher.update(part.as_str().as_bytes());
        hasher.update(b"\n");
    }
    Fingerprint(hasher.finalize().to_hex().to_string())
}
