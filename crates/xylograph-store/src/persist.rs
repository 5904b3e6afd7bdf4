//! Directory-backed persistence.
//!
//! The store lives in one directory, reused across the schema and data
//! passes of a run and across re-runs. Opening loads the existing image when
//! one is present and starts empty otherwise; a corrupt image is an error,
//! never silently discarded. Flushes rewrite the whole image — passes are
//! not transactional, so a failed run leaves whatever was flushed last.

use crate::TripleStore;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// File name of the binary image inside the store directory.
pub const STORE_FILE: &str = "store.xyg";

/// A [`TripleStore`] tied to an on-disk directory.
#[derive(Debug)]
pub struct PersistentStore {
    dir: PathBuf,
    store: TripleStore,
}

impl PersistentStore {
    /// Open a store directory, creating it (and an empty store) on first
    /// use.
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating store directory {}", dir.display()))?;
        let image = dir.join(STORE_FILE);
        let store = if image.exists() {
            let bytes = std::fs::read(&image)
                .with_context(|| format!("reading store image {}", image.display()))?;
            let store = TripleStore::from_bytes(&bytes)
                .with_context(|| format!("decoding store image {}", image.display()))?;
            debug!(path = %image.display(), triples = store.len(), "opened existing store");
            store
        } else {
            debug!(path = %image.display(), "starting empty store");
            TripleStore::new()
        };
        Ok(Self {
            dir: dir.to_path_buf(),
            store,
        })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn store(&self) -> &TripleStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut TripleStore {
        &mut self.store
    }

    /// Write the current image to disk. Fatal for the pass on failure.
    pub fn flush(&self) -> Result<()> {
        let image = self.dir.join(STORE_FILE);
        let bytes = self.store.to_bytes()?;
        std::fs::write(&image, bytes)
            .with_context(|| format!("writing store image {}", image.display()))?;
        debug!(path = %image.display(), triples = self.store.len(), "flushed store");
        Ok(())
    }
}
