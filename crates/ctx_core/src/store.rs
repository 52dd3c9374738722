//! Store layout, initialization, and discovery.

use crate::blob::BlobStore;
use crate::error::{CtxError, Result};
use crate::graph;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the store directory created inside a project root.
pub const STORE_DIR_NAME: &str = ".ctx";

/// Store configuration persisted as `config.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Store format version.
    pub version: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "0.1".to_string(),
        }
    }
}

/// Handle to a context store rooted at a `.ctx` directory.
///
/// The root is passed explicitly to every operation; nothing is cached in
/// process-wide state.
#[derive(Debug, Clone)]
pub struct Store {
    root: PathBuf,
    blobs: BlobStore,
}

impl Store {
    /// Opens a store at an existing `.ctx` directory without validation.
    pub fn at(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        let blobs = BlobStore::new(&root);
        Self { root, blobs }
    }

    /// Initializes a new store under `dir`.
    ///
    /// Creates `.ctx/` with `objects/`, `packs/`, `refs/`, the graph
    /// directories, and a default `config.json`.
    ///
    /// # Errors
    ///
    /// Returns `StoreExists` if `<dir>/.ctx` is already present.
    pub fn init(dir: impl AsRef<Path>) -> Result<Self> {
        let root = dir.as_ref().join(STORE_DIR_NAME);

        if root.exists() {
            return Err(CtxError::StoreExists(root));
        }

        for sub in ["objects", "packs", "refs"] {
            fs::create_dir_all(root.join(sub))?;
        }

        let config = Config::default();
        let data = serde_json::to_vec_pretty(&config)?;
        fs::write(root.join("config.json"), data)?;

        graph::init_graph(&root)?;

        Ok(Self::at(root))
    }

    /// Walks up from `cwd` to find the nearest `.ctx` directory.
    ///
    /// # Errors
    ///
    /// Returns `StoreNotFound` when the filesystem root is reached without
    /// finding a store.
    pub fn discover(cwd: impl AsRef<Path>) -> Result<Self> {
        let mut dir = cwd.as_ref().to_path_buf();
        loop {
            let candidate = dir.join(STORE_DIR_NAME);
            if candidate.is_dir() {
                return Ok(Self::at(candidate));
            }
            if !dir.pop() {
                return Err(CtxError::StoreNotFound);
            }
        }
    }

    /// Returns the store root (the `.ctx` directory).
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the blob store for this store root.
    pub fn blobs(&self) -> &BlobStore {
        &self.blobs
    }

    /// Returns the pack registry directory.
    pub fn packs_dir(&self) -> PathBuf {
        self.root.join("packs")
    }

    /// Returns the mutable drafts directory.
    pub fn drafts_dir(&self) -> PathBuf {
        self.root.join("drafts")
    }

    /// Loads the store configuration.
    pub fn config(&self) -> Result<Config> {
        let data = fs::read(self.root.join("config.json"))?;
        Ok(serde_json::from_slice(&data)?)
    }
}
