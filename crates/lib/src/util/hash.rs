//! Hashing utilities for content-addressed catalog names.
//!
//! This module provides:
//! - `ContentHash`: a full 64-character SHA-256 digest
//! - `hash_file()`: streaming single file hashing
//! - `hash_bytes()`: arbitrary byte hashing

use std::fs;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// A full 64-character SHA-256 hash of some content.
///
/// Catalog names only carry a short prefix (see [`ContentHash::short`]); the
/// full digest is kept for callers that need stronger guarantees.
///
/// # Format
///
/// The hash is a lowercase hexadecimal string (64 characters).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub String);

impl ContentHash {
  /// Leading `len` hex characters of the digest.
  pub fn short(&self, len: usize) -> &str {
    let len = len.min(self.0.len());
    &self.0[..len]
  }
}

impl std::fmt::Display for ContentHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Error while hashing a file.
#[derive(Debug, Error)]
#[error("failed to read file {path}: {source}")]
pub struct HashFileError {
  pub path: String,
  #[source]
  pub source: std::io::Error,
}

/// Hash a file's contents.
///
/// Returns the full 64-character SHA-256 hash of the file.
pub fn hash_file(path: &Path) -> Result<ContentHash, HashFileError> {
  let to_err = |source| HashFileError {
    path: path.display().to_string(),
    source,
  };
  let mut file = fs::File::open(path).map_err(to_err)?;

  let mut hasher = Sha256::new();
  let mut buffer = [0u8; 8192];

  loop {
    let bytes_read = file.read(&mut buffer).map_err(to_err)?;
    if bytes_read == 0 {
      break;
    }
    hasher.update(&buffer[..bytes_read]);
  }

  Ok(ContentHash(format!("{:x}", hasher.finalize())))
}

/// Hash arbitrary bytes.
///
/// Returns the full 64-character SHA-256 hash.
pub fn hash_bytes(data: &[u8]) -> ContentHash {
  let mut hasher = Sha256::new();
  hasher.update(data);
  ContentHash(format!("{:x}", hasher.finalize()))
}
