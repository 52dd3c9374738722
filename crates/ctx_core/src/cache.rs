//! Content-hash-keyed cache for derived artifacts.
//!
//! Single-process by design: `put` rewrites the backing JSONL sorted by
//! key, so concurrent writers would need external serialization.

use crate::error::Result;
use crate::hash::hex128;
use crate::jsonl;
use crate::store::Store;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

/// A cached derived artifact keyed by source content hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// 128-bit hex key derived from (content_hash, artifact_type, scope_id).
    pub key: String,
    pub artifact_type: String,
    pub scope_type: String,
    pub scope_id: String,
    pub content_hash: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub model: String,
    /// Opaque payload; the cache never interprets it.
    pub payload: Value,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub tokens_in: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub tokens_out: i64,
    pub created_at: DateTime<Utc>,
}

fn is_zero(n: &i64) -> bool {
    *n == 0
}

impl CacheEntry {
    /// Builds an entry with its key derived and `created_at` set to now.
    pub fn new(
        content_hash: impl Into<String>,
        artifact_type: impl Into<String>,
        scope_type: impl Into<String>,
        scope_id: impl Into<String>,
        payload: Value,
    ) -> Self {
        let content_hash = content_hash.into();
        let artifact_type = artifact_type.into();
        let scope_id = scope_id.into();
        Self {
            key: make_cache_key(&content_hash, &artifact_type, &scope_id),
            artifact_type,
            scope_type: scope_type.into(),
            scope_id,
            content_hash,
            model: String::new(),
            payload,
            tokens_in: 0,
            tokens_out: 0,
            created_at: Utc::now(),
        }
    }
}

/// Cache identity: 128-bit prefix of
/// `sha256(content_hash:artifact_type:scope_id)`.
pub fn make_cache_key(content_hash: &str, artifact_type: &str, scope_id: &str) -> String {
    hex128(&format!("{}:{}:{}", content_hash, artifact_type, scope_id))
}

fn entries_path(store: &Store) -> PathBuf {
    store.root().join("cache").join("entries.jsonl")
}

/// Returns the first entry matching (content_hash, artifact_type), if any.
pub fn get(store: &Store, content_hash: &str, artifact_type: &str) -> Result<Option<CacheEntry>> {
    let entries: Vec<CacheEntry> = jsonl::read_records(&entries_path(store))?;
    Ok(entries
        .into_iter()
        .find(|e| e.content_hash == content_hash && e.artifact_type == artifact_type))
}

/// Stores an entry, replacing any existing entry with the same key.
/// The file is rewritten sorted by key for determinism.
pub fn put(store: &Store, entry: CacheEntry) -> Result<()> {
    let path = entries_path(store);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut entry = entry;
    if entry.key.is_empty() {
        entry.key = make_cache_key(&entry.content_hash, &entry.artifact_type, &entry.scope_id);
    }

    let mut entries: Vec<CacheEntry> = jsonl::read_records(&path)?;
    match entries.iter_mut().find(|e| e.key == entry.key) {
        Some(existing) => *existing = entry,
        None => entries.push(entry),
    }

    entries.sort_by(|a, b| a.key.cmp(&b.key));
    jsonl::write_records(&path, &entries)
}

/// Removes every entry whose content hash is in the given set.
/// Returns the number of entries removed.
pub fn invalidate(store: &Store, content_hashes: &[String]) -> Result<usize> {
    let path = entries_path(store);
    let entries: Vec<CacheEntry> = jsonl::read_records(&path)?;
    if entries.is_empty() {
        return Ok(0);
    }

    let stale: HashSet<&str> = content_hashes.iter().map(|h| h.as_str()).collect();
    let kept: Vec<CacheEntry> = entries
        .iter()
        .filter(|e| !stale.contains(e.content_hash.as_str()))
        .cloned()
        .collect();

    let removed = entries.len() - kept.len();
    if removed > 0 {
        jsonl::write_records(&path, &kept)?;
    }
    Ok(removed)
}

/// Returns all cache entries.
pub fn list(store: &Store) -> Result<Vec<CacheEntry>> {
    jsonl::read_records(&entries_path(store))
}
