//! On-disk persistence of a built engine.
//!
//! The vector index (vocabulary, chunk order, vectors) and the relationship
//! graph are written as one document so they cannot drift apart. Writers
//! hold an exclusive lock on the directory and publish via rename, so a
//! reader only ever sees a complete bundle.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::graph::{NodeKey, RelationshipGraph};
use super::vector_index::VectorIndex;
use crate::error::{Error, Result};

pub const INDEX_FILE: &str = "index.json";
pub const LOCK_FILE: &str = "index.lock";
pub const FORMAT_VERSION: u32 = 1;

/// Everything needed to reconstruct an engine.
#[derive(Debug, Deserialize)]
pub struct IndexBundle {
    pub format_version: u32,
    pub built_at: DateTime<Utc>,
    pub vector_index: VectorIndex,
    pub graph: RelationshipGraph,
}

#[derive(Serialize)]
struct IndexBundleRef<'a> {
    format_version: u32,
    built_at: DateTime<Utc>,
    vector_index: &'a VectorIndex,
    graph: &'a RelationshipGraph,
}

/// Exclusive lock guarding writes to an index directory.
pub struct IndexLock {
    lock_file: Option<File>,
    path: PathBuf,
}

impl IndexLock {
    /// Acquire an exclusive lock on `dir`, creating it if needed.
    pub fn acquire(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join(LOCK_FILE);
        let lock_file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| Error::LockError(format!("Failed to open lock file: {}", e)))?;

        match lock_file.try_lock_exclusive() {
            Ok(()) => Ok(Self {
                lock_file: Some(lock_file),
                path,
            }),
            Err(_) => Err(Error::IndexLocked),
        }
    }

    /// Release the lock manually
    pub fn release(&mut self) {
        if let Some(ref file) = self.lock_file {
            let _ = file.unlock();
            let _ = fs::remove_file(&self.path);
        }
        self.lock_file = None;
    }
}

impl Drop for IndexLock {
    fn drop(&mut self) {
        self.release();
    }
}

/// Write index and graph into `dir` as a single bundle.
pub fn save(
    dir: &Path,
    vector_index: &VectorIndex,
    graph: &RelationshipGraph,
    built_at: DateTime<Utc>,
) -> Result<PathBuf> {
    let _lock = IndexLock::acquire(dir)?;

    let bundle = IndexBundleRef {
        format_version: FORMAT_VERSION,
        built_at,
        vector_index,
        graph,
    };
    let json = serde_json::to_vec(&bundle)?;

    let target = dir.join(INDEX_FILE);
    let staging = dir.join(format!("{}.tmp", INDEX_FILE));
    fs::write(&staging, &json)?;
    fs::rename(&staging, &target)?;

    info!(
        "Saved index bundle to {} ({} bytes)",
        target.display(),
        json.len()
    );
    Ok(target)
}

/// Read a bundle written by [`save`].
pub fn load(dir: &Path) -> Result<IndexBundle> {
    let path = dir.join(INDEX_FILE);
    let content = fs::read(&path)?;
    let bundle: IndexBundle = serde_json::from_slice(&content)?;

    if bundle.format_version != FORMAT_VERSION {
        return Err(Error::SerializationError(format!(
            "unsupported index format version {} (expected {})",
            bundle.format_version, FORMAT_VERSION
        )));
    }

    let bundle = IndexBundle {
        vector_index: bundle.vector_index.reindex()?,
        ..bundle
    };

    let unknown = bundle
        .vector_index
        .chunk_ids()
        .iter()
        .filter(|id| !bundle.graph.contains(&NodeKey::chunk(id.as_str())))
        .count();
    if unknown > 0 {
        warn!(
            "{} indexed chunks are missing from the graph; they will be skipped at query time",
            unknown
        );
    }

    info!(
        "Loaded index bundle from {} ({} chunks, built {})",
        path.display(),
        bundle.vector_index.len(),
        bundle.built_at.to_rfc3339()
    );
    Ok(bundle)
}
