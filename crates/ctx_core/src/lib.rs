//! ctx core library
//!
//! A local, content-addressed store for AI-agent execution records and
//! commit-scoped snapshots of a source repository:
//! - Content-addressed blob storage with integrity verification
//! - Canonical-JSON pack manifests identified by their own hash
//! - A JSONL context graph of commits, files, symbols, and edges
//! - Drift detection, replay with fidelity verdicts, and a token-budget
//!   optimizer over indexed commits
//!
//! # Quick Start
//!
//! ```
//! use ctx_core::{BlobStore, ContentHash};
//! use tempfile::TempDir;
//!
//! let tmp = TempDir::new().unwrap();
//! let blobs = BlobStore::new(tmp.path());
//!
//! // Store a blob
//! let hash = blobs.write(b"hello world").unwrap();
//!
//! // Same content, same reference (deduplication)
//! assert_eq!(blobs.write(b"hello world").unwrap(), hash);
//!
//! // Reads verify integrity against the reference
//! assert_eq!(blobs.read(hash).unwrap(), b"hello world");
//! assert_eq!(hash, ContentHash::of(b"hello world"));
//! ```

mod blob;
mod cache;
mod delta;
mod drift;
mod edges;
mod error;
mod git;
mod graph;
mod hash;
mod index;
mod jsonl;
mod log;
mod optimize;
mod pack;
mod replay;
mod sharing;
mod store;
mod symbols;
mod telemetry;
mod verify;

pub use blob::BlobStore;
pub use cache::{get as cache_get, invalidate as cache_invalidate, list as cache_list, make_cache_key, put as cache_put, CacheEntry};
pub use delta::{compute_delta, DeltaReport};
pub use drift::{diff, diff_packs, DriftEntry, DriftReport, DriftType};
pub use edges::{extract_call_edges, extract_imports};
pub use error::{CtxError, Result};
pub use git::{ChangeSet, CommitInfo, GitRepo};
pub use graph::{
    call_edges_path, commits_path, done_path, files_path, import_edges_path, init_graph,
    paths_path, regions_path, snapshot_dir, symbols_path, CallEdge, CommitRecord, FileSnapshot,
    ImportEdge, PathRecord, RegionRecord, SymbolRecord,
};
pub use hash::{resolve, ContentHash, HASH_PREFIX};
pub use index::{
    count_lines, detect_language, index_commit, index_range, is_binary_content,
    is_generated_file, path_id_from_path,
};
pub use jsonl::{append_record, read_records, write_records};
pub use log::{ExecutionLog, LogEnvironment, LogInput, LogModel, LogOutput, LogPrompt, LogStep};
pub use optimize::{
    estimate_tokens, extract_task_words, generate_pack, OptimizedPack, PackItem, PackRequest,
    DEFAULT_TOKEN_CAP,
};
pub use pack::{
    canonical_json, create_pack, format_pack, load_pack, register_pack, Environment, Input,
    Model, OutputArtifact, Pack, Prompt, Step, PACK_VERSION,
};
pub use replay::{
    replay, replay_with, Executors, Fidelity, ReplayDrift, ReplayReport, StepResult, StepStatus,
    ToolExecutor,
};
pub use sharing::{finalize_draft, fork, format_pack_list, list_packs, PackSummary};
pub use store::{Config, Store, STORE_DIR_NAME};
pub use symbols::{extract_symbols, make_region_id, make_symbol_id};
pub use telemetry::{
    compute_roi, estimate_baseline, format_metrics, get_metrics, get_runs, record_run,
    RoiSummary, Run, RunMetrics,
};
pub use verify::{
    format_verify_result, generate_sidecars, read_sidecar, sidecar_path, verify_artifact,
    write_sidecar, Sidecar, VerifyResult,
};
