//! Persisted embedding batches.
//!
//! One JSON file per content hash of a class's sorted descriptor list.
//! Entries are written to a temporary path and renamed into place so a crash
//! mid-write never leaves a readable-but-corrupt file at the final path.
//! Entries are never invalidated automatically; [`EmbeddingCache::clear`]
//! exists for catalogue updates.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::warn;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    key: String,
    descriptor_count: usize,
    vectors: Vec<Vec<f32>>,
}

#[derive(Debug, Clone)]
pub struct EmbeddingCache {
    dir: PathBuf,
    enabled: bool,
}

impl EmbeddingCache {
    pub fn new<P: AsRef<Path>>(dir: P, enabled: bool) -> io::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        if enabled {
            fs::create_dir_all(&dir)?;
        }
        Ok(Self { dir, enabled })
    }

    /// Content key for a descriptor set: SHA-256 over the sorted list, so the
    /// key is independent of authoring order and changes whenever any
    /// descriptor text changes.
    pub fn content_key(descriptors: &[&str]) -> String {
        let mut sorted: Vec<&str> = descriptors.to_vec();
        sorted.sort_unstable();

        let mut hasher = Sha256::new();
        for descriptor in sorted {
            hasher.update(descriptor.as_bytes());
            hasher.update([0u8]);
        }
        format!("{:x}", hasher.finalize())
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    /// Loads a cached batch; any unreadable or mismatched entry is treated
    /// as a miss.
    pub fn load(&self, key: &str, expected_count: usize) -> Option<Vec<Array1<f32>>> {
        if !self.enabled {
            return None;
        }

        let path = self.entry_path(key);
        let raw = fs::read(&path).ok()?;
        let entry: CacheEntry = match serde_json::from_slice(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Failed to parse cached embeddings at {}: {}", path.display(), e);
                return None;
            }
        };

        if entry.key != key || entry.vectors.len() != expected_count {
            warn!("Cached embeddings at {} do not match the request, ignoring", path.display());
            return None;
        }

        Some(entry.vectors.into_iter().map(Array1::from_vec).collect())
    }

    /// Persists a batch atomically. Failures are logged, not surfaced: the
    /// cache is an optimization, not a correctness requirement.
    pub fn store(&self, key: &str, vectors: &[Array1<f32>]) {
        if !self.enabled {
            return;
        }

        let entry = CacheEntry {
            key: key.to_string(),
            descriptor_count: vectors.len(),
            vectors: vectors.iter().map(|v| v.to_vec()).collect(),
        };

        if let Err(e) = self.write_atomic(key, &entry) {
            warn!("Failed to persist embedding cache entry {}: {}", key, e);
        }
    }

    fn write_atomic(&self, key: &str, entry: &CacheEntry) -> io::Result<()> {
        let path = self.entry_path(key);
        let tmp_path = self.dir.join(format!("{}.json.tmp", key));

        let payload = serde_json::to_vec(entry)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(&tmp_path, payload)?;
        fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    /// Deletes all persisted entries, returning how many were removed.
    pub fn clear(&self) -> io::Result<usize> {
        if !self.enabled || !self.dir.exists() {
            return Ok(0);
        }

        let mut removed = 0;
        for dir_entry in fs::read_dir(&self.dir)? {
            let path = dir_entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}
