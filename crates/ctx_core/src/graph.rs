//! Context graph record shapes and filesystem layout.
//!
//! The graph store lives under `.ctx/graph/`: two global append-only
//! manifests (`commits.jsonl`, `paths.jsonl`) and one snapshot directory
//! per indexed commit containing sorted, rewrite-on-index JSONL files.

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Record type tag for commit records.
pub const TYPE_COMMIT: &str = "commit";
/// Record type tag for path records.
pub const TYPE_PATH: &str = "path";
/// Record type tag for file snapshots.
pub const TYPE_FILE_SNAPSHOT: &str = "file_snapshot";
/// Record type tag for symbol records.
pub const TYPE_SYMBOL: &str = "symbol";
/// Record type tag for region records.
pub const TYPE_REGION: &str = "region";
/// Record type tag for import edges.
pub const TYPE_IMPORT_EDGE: &str = "import_edge";
/// Record type tag for call edges.
pub const TYPE_CALL_EDGE: &str = "call_edge";

/// A git commit identity in the context graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitRecord {
    #[serde(rename = "type")]
    pub record_type: String,
    pub repo: String,
    pub sha: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_sha: Option<String>,
    pub author: String,
    pub message: String,
    pub authored_at: DateTime<Utc>,
}

/// A stable file path identity tracked across commits.
///
/// The `path_id` is the 128-bit prefix of `sha256(path)`, so it survives
/// content changes but not renames.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathRecord {
    #[serde(rename = "type")]
    pub record_type: String,
    pub path_id: String,
    pub repo: String,
    pub path: String,
    pub first_seen_commit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen_commit: Option<String>,
}

/// A file's state at a specific commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSnapshot {
    #[serde(rename = "type")]
    pub record_type: String,
    pub commit: String,
    pub path_id: String,
    pub blob_oid: String,
    pub content_sha256: String,
    pub language: String,
    pub byte_size: u64,
    pub loc: u64,
    pub is_generated: bool,
    pub is_binary: bool,
}

/// A symbol definition (function, class, type, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolRecord {
    #[serde(rename = "type")]
    pub record_type: String,
    pub commit: String,
    pub symbol_id: String,
    pub path_id: String,
    pub kind: String,
    pub name: String,
    pub fqname: String,
    pub visibility: String,
    pub language: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub signature: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub docstring: String,
    pub symbol_hash: String,
    pub def_region_id: String,
}

/// A text span within a file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionRecord {
    #[serde(rename = "type")]
    pub record_type: String,
    pub commit: String,
    pub region_id: String,
    pub path_id: String,
    pub region_hash: String,
    pub purpose: String,
    pub start_line: u32,
    pub start_col: u32,
    pub end_line: u32,
    pub end_col: u32,
}

/// A file-level import dependency. Internal imports carry `to_path_id`;
/// everything else carries `to_external_module`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportEdge {
    #[serde(rename = "type")]
    pub record_type: String,
    pub commit: String,
    pub from_path_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_path_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_external_module: Option<String>,
}

/// A symbol-level call dependency with extraction confidence in [0, 1].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallEdge {
    #[serde(rename = "type")]
    pub record_type: String,
    pub commit: String,
    pub from_symbol_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_symbol_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_external_ref: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub call_type: String,
    pub confidence: f64,
}

/// Graph subdirectory name within the store root.
pub const GRAPH_DIR: &str = "graph";

/// Creates the `graph/manifests` and `graph/snapshots` directories.
pub fn init_graph(store_root: &Path) -> Result<()> {
    let graph_root = store_root.join(GRAPH_DIR);
    fs::create_dir_all(graph_root.join("manifests"))?;
    fs::create_dir_all(graph_root.join("snapshots"))?;
    Ok(())
}

/// Snapshot directory for a commit.
pub fn snapshot_dir(store_root: &Path, commit_sha: &str) -> PathBuf {
    store_root.join(GRAPH_DIR).join("snapshots").join(commit_sha)
}

/// Global commits manifest stream.
pub fn commits_path(store_root: &Path) -> PathBuf {
    store_root.join(GRAPH_DIR).join("manifests").join("commits.jsonl")
}

/// Global paths manifest stream.
pub fn paths_path(store_root: &Path) -> PathBuf {
    store_root.join(GRAPH_DIR).join("manifests").join("paths.jsonl")
}

/// Per-commit file snapshots.
pub fn files_path(store_root: &Path, commit_sha: &str) -> PathBuf {
    snapshot_dir(store_root, commit_sha).join("files.jsonl")
}

/// Per-commit symbol records.
pub fn symbols_path(store_root: &Path, commit_sha: &str) -> PathBuf {
    snapshot_dir(store_root, commit_sha).join("symbols.jsonl")
}

/// Per-commit region records.
pub fn regions_path(store_root: &Path, commit_sha: &str) -> PathBuf {
    snapshot_dir(store_root, commit_sha).join("regions.jsonl")
}

/// Per-commit import edges.
pub fn import_edges_path(store_root: &Path, commit_sha: &str) -> PathBuf {
    snapshot_dir(store_root, commit_sha).join("edges.imports.jsonl")
}

/// Per-commit call edges.
pub fn call_edges_path(store_root: &Path, commit_sha: &str) -> PathBuf {
    snapshot_dir(store_root, commit_sha).join("edges.calls.jsonl")
}

/// Completion sentinel written last by the indexer. Its presence marks the
/// snapshot directory as fully written; its absence marks a crashed partial
/// index that will be rebuilt.
pub fn done_path(store_root: &Path, commit_sha: &str) -> PathBuf {
    snapshot_dir(store_root, commit_sha).join("done")
}
