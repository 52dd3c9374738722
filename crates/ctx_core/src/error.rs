//! Error types for ctx_core operations.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for ctx_core operations.
#[derive(Error, Debug)]
pub enum CtxError {
    /// Malformed hash reference (bad prefix, wrong length, non-hex).
    #[error("invalid hash reference: {0}")]
    InvalidHashRef(String),

    /// Short prefix below the minimum resolvable length.
    #[error("hash prefix too short: need at least 4 characters, got {0}")]
    PrefixTooShort(usize),

    /// Short prefix contains non-hex characters.
    #[error("invalid hash prefix: {0:?} is not valid hex")]
    InvalidHexPrefix(String),

    /// No registered pack matches the given prefix.
    #[error("no pack found with prefix {0:?}")]
    PrefixNotFound(String),

    /// More than one registered pack matches the given prefix.
    #[error("ambiguous hash prefix {prefix:?}: matches {matches} packs")]
    PrefixAmbiguous {
        /// The prefix that was looked up
        prefix: String,
        /// Number of packs sharing it
        matches: usize,
    },

    /// Blob with the given reference was not found in the store.
    #[error("blob not found: {0}")]
    BlobNotFound(String),

    /// Re-hashing a blob on read did not reproduce its reference.
    #[error("blob integrity check failed: expected {expected}, got {actual}")]
    BlobIntegrity {
        /// Short form of the requested reference
        expected: String,
        /// Short form of the recomputed hash
        actual: String,
    },

    /// No `.ctx` directory found walking up from the working directory.
    #[error("no context store found (run 'ctx init' to create one)")]
    StoreNotFound,

    /// `init` called where a store already exists.
    #[error("context store already initialized at {}", .0.display())]
    StoreExists(PathBuf),

    /// Execution log failed validation; lists every missing field at once.
    #[error("invalid execution log: missing required fields: {}", .0.join(", "))]
    InvalidLog(Vec<String>),

    /// Pack manifest failed validation; lists every missing field at once.
    #[error("invalid pack manifest: missing required fields: {}", .0.join(", "))]
    InvalidManifest(Vec<String>),

    /// Pack manifest blob could not be loaded.
    #[error("pack not found: {0}")]
    PackNotFound(String),

    /// A git subprocess exited non-zero; stderr is embedded.
    #[error("git {command}: {stderr}")]
    Git {
        /// The git arguments that were run
        command: String,
        /// Captured stderr from the subprocess
        stderr: String,
    },

    /// A commit has no snapshot directory in the graph store.
    #[error("commit not indexed: {0} (run 'ctx index' first)")]
    NotIndexed(String),

    /// A JSONL stream contains a malformed line.
    #[error("parsing line {line} of {}: {reason}", path.display())]
    RecordParse {
        /// The stream file
        path: PathBuf,
        /// 1-based line number of the bad record
        line: usize,
        /// Decoder error text
        reason: String,
    },

    /// Draft pack cannot be finalized without a parent reference.
    #[error("draft has no parent reference: {}", .0.display())]
    DraftMissingParent(PathBuf),

    /// Artifact has no sidecar metadata next to it.
    #[error("no provenance metadata found for artifact: {}", .0.display())]
    SidecarMissing(PathBuf),

    /// Sidecar references a pack that is not in the store.
    #[error("provenance broken: referenced pack not found ({0})")]
    ProvenanceBroken(String),

    /// JSON encoding or decoding failed.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CtxError {
    /// Returns a user-facing recovery suggestion for the error, if available.
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            Self::StoreNotFound => Some("Run 'ctx init' in the repository root."),
            Self::NotIndexed(_) => Some("Run 'ctx index' to snapshot the commit first."),
            Self::BlobIntegrity { .. } => {
                Some("The object store is corrupted; restore the blob from a backup or re-create the pack.")
            }
            Self::PrefixAmbiguous { .. } => Some("Use more characters of the hash."),
            Self::PrefixNotFound(_) => Some("Run 'ctx log' to list registered packs."),
            _ => None,
        }
    }
}

/// Convenience Result type for ctx_core operations.
pub type Result<T> = std::result::Result<T, CtxError>;
