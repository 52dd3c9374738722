//! Delta engine: set differences between two indexed commits.

use crate::error::{CtxError, Result};
use crate::graph::{self, FileSnapshot, PathRecord, SymbolRecord};
use crate::jsonl;
use crate::store::Store;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;

/// Changes between two indexed commits, keyed by stable path id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeltaReport {
    pub base: String,
    pub head: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files_changed: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files_added: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files_deleted: Vec<String>,
    /// Fully qualified names of base-commit symbols whose owning file
    /// changed content.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub symbols_invalidated: Vec<String>,
}

impl DeltaReport {
    /// Returns true if no file-level changes were detected.
    pub fn is_empty(&self) -> bool {
        self.files_changed.is_empty()
            && self.files_added.is_empty()
            && self.files_deleted.is_empty()
    }

    /// Formatted JSON representation.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Human-readable summary with +/-/~ prefixed sections.
    pub fn human(&self) -> String {
        let mut out = String::new();

        writeln!(out, "Delta: {}..{}", short_sha(&self.base), short_sha(&self.head)).unwrap();
        writeln!(out, "───────────────────────────────────").unwrap();

        let total = self.files_changed.len() + self.files_added.len() + self.files_deleted.len();
        writeln!(out, "Files affected: {}", total).unwrap();

        if !self.files_added.is_empty() {
            writeln!(out, "\nAdded ({}):", self.files_added.len()).unwrap();
            for f in &self.files_added {
                writeln!(out, "  + {}", f).unwrap();
            }
        }
        if !self.files_deleted.is_empty() {
            writeln!(out, "\nDeleted ({}):", self.files_deleted.len()).unwrap();
            for f in &self.files_deleted {
                writeln!(out, "  - {}", f).unwrap();
            }
        }
        if !self.files_changed.is_empty() {
            writeln!(out, "\nModified ({}):", self.files_changed.len()).unwrap();
            for f in &self.files_changed {
                writeln!(out, "  ~ {}", f).unwrap();
            }
        }
        if !self.symbols_invalidated.is_empty() {
            writeln!(out, "\nSymbols invalidated ({}):", self.symbols_invalidated.len()).unwrap();
            for s in &self.symbols_invalidated {
                writeln!(out, "  ! {}", s).unwrap();
            }
        }

        if total == 0 {
            writeln!(out, "\nNo changes detected.").unwrap();
        }

        out
    }
}

/// Compares two indexed commits by stable path id.
///
/// Every path id in head but not base is added; one whose content hash
/// differs is changed; one in base but not head is deleted. Path ids fall
/// back to themselves when the path map has no entry.
pub fn compute_delta(store: &Store, base_sha: &str, head_sha: &str) -> Result<DeltaReport> {
    let root = store.root();

    for sha in [base_sha, head_sha] {
        if !graph::files_path(root, sha).exists() {
            return Err(CtxError::NotIndexed(short_sha(sha)));
        }
    }

    let base_files: Vec<FileSnapshot> = jsonl::read_records(&graph::files_path(root, base_sha))?;
    let head_files: Vec<FileSnapshot> = jsonl::read_records(&graph::files_path(root, head_sha))?;

    let base_map: HashMap<&str, &FileSnapshot> =
        base_files.iter().map(|f| (f.path_id.as_str(), f)).collect();
    let head_map: HashMap<&str, &FileSnapshot> =
        head_files.iter().map(|f| (f.path_id.as_str(), f)).collect();

    let paths: Vec<PathRecord> = jsonl::read_records(&graph::paths_path(root))?;
    let path_lookup: HashMap<&str, &str> = paths
        .iter()
        .map(|p| (p.path_id.as_str(), p.path.as_str()))
        .collect();
    let resolve = |path_id: &str| -> String {
        path_lookup
            .get(path_id)
            .map(|p| p.to_string())
            .unwrap_or_else(|| path_id.to_string())
    };

    let mut report = DeltaReport {
        base: base_sha.to_string(),
        head: head_sha.to_string(),
        files_changed: Vec::new(),
        files_added: Vec::new(),
        files_deleted: Vec::new(),
        symbols_invalidated: Vec::new(),
    };
    let mut changed_path_ids: HashSet<&str> = HashSet::new();

    for (&path_id, head_file) in &head_map {
        match base_map.get(path_id) {
            None => report.files_added.push(resolve(path_id)),
            Some(base_file) if base_file.content_sha256 != head_file.content_sha256 => {
                report.files_changed.push(resolve(path_id));
                changed_path_ids.insert(path_id);
            }
            Some(_) => {}
        }
    }

    for &path_id in base_map.keys() {
        if !head_map.contains_key(path_id) {
            report.files_deleted.push(resolve(path_id));
        }
    }

    report.files_changed.sort();
    report.files_added.sort();
    report.files_deleted.sort();

    // Symbols defined in changed files of the base snapshot are stale.
    if !changed_path_ids.is_empty() {
        let base_symbols: Vec<SymbolRecord> =
            jsonl::read_records(&graph::symbols_path(root, base_sha))?;
        let mut invalidated: Vec<String> = base_symbols
            .iter()
            .filter(|s| changed_path_ids.contains(s.path_id.as_str()))
            .map(|s| s.fqname.clone())
            .collect();
        invalidated.sort();
        invalidated.dedup();
        report.symbols_invalidated = invalidated;
    }

    Ok(report)
}

fn short_sha(sha: &str) -> String {
    sha.chars().take(8).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{TYPE_FILE_SNAPSHOT, TYPE_PATH};
    use tempfile::TempDir;

    fn snapshot(commit: &str, path_id: &str, content_hash: &str) -> FileSnapshot {
        FileSnapshot {
            record_type: TYPE_FILE_SNAPSHOT.to_string(),
            commit: commit.to_string(),
            path_id: path_id.to_string(),
            blob_oid: String::new(),
            content_sha256: content_hash.to_string(),
            language: "go".to_string(),
            byte_size: 10,
            loc: 1,
            is_generated: false,
            is_binary: false,
        }
    }

    fn path_record(path_id: &str, path: &str) -> PathRecord {
        PathRecord {
            record_type: TYPE_PATH.to_string(),
            path_id: path_id.to_string(),
            repo: "r".to_string(),
            path: path.to_string(),
            first_seen_commit: "base".to_string(),
            last_seen_commit: None,
        }
    }

    fn write_snapshot(store: &Store, sha: &str, files: &[FileSnapshot]) {
        jsonl::write_records(&graph::files_path(store.root(), sha), files).unwrap();
    }

    #[test]
    fn test_self_delta_empty() {
        let tmp = TempDir::new().unwrap();
        let store = Store::init(tmp.path()).unwrap();

        write_snapshot(&store, "c1", &[snapshot("c1", "p1", "h1")]);
        let report = compute_delta(&store, "c1", "c1").unwrap();
        assert!(report.is_empty());
    }

    #[test]
    fn test_added_changed_deleted_partition() {
        let tmp = TempDir::new().unwrap();
        let store = Store::init(tmp.path()).unwrap();

        for p in [
            path_record("p-keep", "keep.go"),
            path_record("p-change", "change.go"),
            path_record("p-del", "deleted.go"),
            path_record("p-new", "new.go"),
        ] {
            jsonl::append_record(&graph::paths_path(store.root()), &p).unwrap();
        }

        write_snapshot(
            &store,
            "base",
            &[
                snapshot("base", "p-keep", "h1"),
                snapshot("base", "p-change", "h2"),
                snapshot("base", "p-del", "h3"),
            ],
        );
        write_snapshot(
            &store,
            "head",
            &[
                snapshot("head", "p-keep", "h1"),
                snapshot("head", "p-change", "h2-modified"),
                snapshot("head", "p-new", "h4"),
            ],
        );

        let report = compute_delta(&store, "base", "head").unwrap();
        assert_eq!(report.files_added, vec!["new.go"]);
        assert_eq!(report.files_changed, vec!["change.go"]);
        assert_eq!(report.files_deleted, vec!["deleted.go"]);
        assert!(!report.is_empty());
    }

    #[test]
    fn test_missing_path_falls_back_to_id() {
        let tmp = TempDir::new().unwrap();
        let store = Store::init(tmp.path()).unwrap();

        write_snapshot(&store, "base", &[]);
        write_snapshot(&store, "head", &[snapshot("head", "p-unmapped", "h1")]);

        let report = compute_delta(&store, "base", "head").unwrap();
        assert_eq!(report.files_added, vec!["p-unmapped"]);
    }

    #[test]
    fn test_unindexed_commit_errors() {
        let tmp = TempDir::new().unwrap();
        let store = Store::init(tmp.path()).unwrap();

        write_snapshot(&store, "indexed", &[]);
        assert!(matches!(
            compute_delta(&store, "indexed", "missing"),
            Err(CtxError::NotIndexed(_))
        ));
    }

    #[test]
    fn test_symbols_invalidated() {
        let tmp = TempDir::new().unwrap();
        let store = Store::init(tmp.path()).unwrap();

        jsonl::append_record(
            &graph::paths_path(store.root()),
            &path_record("p1", "main.go"),
        )
        .unwrap();
        write_snapshot(&store, "base", &[snapshot("base", "p1", "h1")]);
        write_snapshot(&store, "head", &[snapshot("head", "p1", "h2")]);

        let symbol = SymbolRecord {
            record_type: "symbol".to_string(),
            commit: "base".to_string(),
            symbol_id: "s1".to_string(),
            path_id: "p1".to_string(),
            kind: "function".to_string(),
            name: "Handler".to_string(),
            fqname: "Handler".to_string(),
            visibility: "exported".to_string(),
            language: "go".to_string(),
            signature: String::new(),
            docstring: String::new(),
            symbol_hash: "x".to_string(),
            def_region_id: "r1".to_string(),
        };
        jsonl::write_records(&graph::symbols_path(store.root(), "base"), &[symbol]).unwrap();

        let report = compute_delta(&store, "base", "head").unwrap();
        assert_eq!(report.symbols_invalidated, vec!["Handler"]);
    }

    #[test]
    fn test_human_output_sections() {
        let report = DeltaReport {
            base: "aaaaaaaaaaaa".to_string(),
            head: "bbbbbbbbbbbb".to_string(),
            files_changed: vec!["main.go".to_string()],
            files_added: vec!["util.go".to_string()],
            files_deleted: vec!["config.yaml".to_string()],
            symbols_invalidated: vec![],
        };
        let text = report.human();
        assert!(text.contains("Delta: aaaaaaaa..bbbbbbbb"));
        assert!(text.contains("Files affected: 3"));
        assert!(text.contains("  + util.go"));
        assert!(text.contains("  - config.yaml"));
        assert!(text.contains("  ~ main.go"));
    }
}
