//! Commit indexing: snapshots a git commit's files, symbols, and edges
//! into the graph store.

use crate::edges::{extract_call_edges, extract_imports};
use crate::error::Result;
use crate::git::GitRepo;
use crate::graph::{
    self, CallEdge, CommitRecord, FileSnapshot, ImportEdge, PathRecord, RegionRecord,
    SymbolRecord, TYPE_COMMIT, TYPE_FILE_SNAPSHOT, TYPE_PATH,
};
use crate::hash::ContentHash;
use crate::jsonl;
use crate::store::Store;
use crate::symbols::extract_symbols;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// Path substrings that mark a file as generated.
const GENERATED_MARKERS: &[&str] = &[
    "generated",
    "vendor/",
    "node_modules/",
    ".min.js",
    ".min.css",
    "go.sum",
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
];

/// Indexes a single commit into the graph store.
///
/// Writes a commit record, per-file snapshots, extracted symbols, regions,
/// and import/call edges, then a completion sentinel. Re-indexing an
/// already-complete commit is a no-op; a snapshot directory without the
/// sentinel is treated as a crashed partial index and rebuilt.
pub fn index_commit(store: &Store, repo: &GitRepo, commit_sha: &str) -> Result<()> {
    let root = store.root();
    graph::init_graph(root)?;

    // Idempotence: the sentinel is written last, so its presence means the
    // whole snapshot landed.
    if graph::done_path(root, commit_sha).exists() {
        return Ok(());
    }
    let snap_dir = graph::snapshot_dir(root, commit_sha);
    if snap_dir.exists() {
        warn!(commit = commit_sha, "removing partial snapshot before re-index");
        fs::remove_dir_all(&snap_dir)?;
    }

    let info = repo.commit_info(commit_sha)?;
    let authored_at = info
        .timestamp
        .parse::<DateTime<Utc>>()
        .unwrap_or_else(|_| DateTime::<Utc>::UNIX_EPOCH);

    let repo_name = repo.root().to_string_lossy().into_owned();
    let commit_record = CommitRecord {
        record_type: TYPE_COMMIT.to_string(),
        repo: repo_name.clone(),
        sha: info.sha.clone(),
        parent_sha: info.parent_sha.clone(),
        author: info.author.clone(),
        message: info.message.clone(),
        authored_at,
    };
    jsonl::append_record(&graph::commits_path(root), &commit_record)?;

    let files = repo.list_files(commit_sha)?;

    // Known paths, for first-seen bookkeeping.
    let existing_paths: Vec<PathRecord> = jsonl::read_records(&graph::paths_path(root))?;
    let mut known_paths: HashSet<String> =
        existing_paths.into_iter().map(|p| p.path).collect();

    fs::create_dir_all(&snap_dir)?;

    // path → path-id map, used to resolve internal imports.
    let path_to_id: HashMap<String, String> = files
        .iter()
        .map(|path| (path.clone(), path_id_from_path(path)))
        .collect();

    struct SourceFile {
        path_id: String,
        language: &'static str,
        content: Vec<u8>,
    }

    let mut snapshots: Vec<FileSnapshot> = Vec::with_capacity(files.len());
    let mut new_paths: Vec<PathRecord> = Vec::new();
    let mut source_files: Vec<SourceFile> = Vec::new();

    for path in &files {
        let path_id = path_to_id[path].clone();

        if !known_paths.contains(path) {
            new_paths.push(PathRecord {
                record_type: TYPE_PATH.to_string(),
                path_id: path_id.clone(),
                repo: repo_name.clone(),
                path: path.clone(),
                first_seen_commit: commit_sha.to_string(),
                last_seen_commit: None,
            });
            known_paths.insert(path.clone());
        }

        // Unreadable entries (e.g. submodules) are skipped, not fatal.
        let content = match repo.file_at_commit(commit_sha, path) {
            Ok(content) => content,
            Err(e) => {
                debug!(path = %path, error = %e, "skipping unreadable file");
                continue;
            }
        };

        let is_binary = is_binary_content(&content);
        let language = detect_language(path);
        let loc = if is_binary { 0 } else { count_lines(&content) };
        let blob_oid = repo.blob_oid(commit_sha, path).unwrap_or_default();

        snapshots.push(FileSnapshot {
            record_type: TYPE_FILE_SNAPSHOT.to_string(),
            commit: commit_sha.to_string(),
            path_id: path_id.clone(),
            blob_oid,
            content_sha256: ContentHash::of(&content).hex(),
            language: language.to_string(),
            byte_size: content.len() as u64,
            loc,
            is_generated: is_generated_file(path),
            is_binary,
        });

        if !is_binary && !language.is_empty() {
            source_files.push(SourceFile {
                path_id,
                language,
                content,
            });
        }
    }

    snapshots.sort_by(|a, b| a.path_id.cmp(&b.path_id));
    jsonl::write_records(&graph::files_path(root, commit_sha), &snapshots)?;

    // Extraction pass: symbols and imports per file.
    let mut all_symbols: Vec<SymbolRecord> = Vec::new();
    let mut all_regions: Vec<RegionRecord> = Vec::new();
    let mut all_imports: Vec<ImportEdge> = Vec::new();

    for sf in &source_files {
        let (symbols, regions) =
            extract_symbols(&sf.content, sf.language, commit_sha, &sf.path_id);
        all_symbols.extend(symbols);
        all_regions.extend(regions);

        all_imports.extend(extract_imports(
            &sf.content,
            sf.language,
            commit_sha,
            &sf.path_id,
            &path_to_id,
        ));
    }

    // Commit-wide name map; method short names are indexed too so
    // cross-file calls resolve.
    let mut known_symbols: HashMap<String, String> = HashMap::with_capacity(all_symbols.len());
    for symbol in &all_symbols {
        known_symbols.insert(symbol.name.clone(), symbol.symbol_id.clone());
        if let Some((_, short)) = symbol.name.rsplit_once('.') {
            known_symbols.insert(short.to_string(), symbol.symbol_id.clone());
        }
    }

    let mut all_calls: Vec<CallEdge> = Vec::new();
    for sf in &source_files {
        let file_symbols: Vec<SymbolRecord> = all_symbols
            .iter()
            .filter(|s| s.path_id == sf.path_id)
            .cloned()
            .collect();
        let file_regions: Vec<RegionRecord> = all_regions
            .iter()
            .filter(|r| r.path_id == sf.path_id)
            .cloned()
            .collect();

        all_calls.extend(extract_call_edges(
            &sf.content,
            sf.language,
            commit_sha,
            &file_symbols,
            &file_regions,
            &known_symbols,
        ));
    }

    all_symbols.sort_by(|a, b| a.symbol_id.cmp(&b.symbol_id));
    all_regions.sort_by(|a, b| a.region_id.cmp(&b.region_id));

    if !all_symbols.is_empty() {
        jsonl::write_records(&graph::symbols_path(root, commit_sha), &all_symbols)?;
    }
    if !all_regions.is_empty() {
        jsonl::write_records(&graph::regions_path(root, commit_sha), &all_regions)?;
    }
    if !all_imports.is_empty() {
        jsonl::write_records(&graph::import_edges_path(root, commit_sha), &all_imports)?;
    }
    if !all_calls.is_empty() {
        jsonl::write_records(&graph::call_edges_path(root, commit_sha), &all_calls)?;
    }

    for path_record in &new_paths {
        jsonl::append_record(&graph::paths_path(root), path_record)?;
    }

    // Sentinel last: everything above is now durable.
    fs::write(graph::done_path(root, commit_sha), b"")?;

    Ok(())
}

/// Indexes every commit in `base..head` in chronological order.
pub fn index_range(store: &Store, repo: &GitRepo, base_sha: &str, head_sha: &str) -> Result<usize> {
    let commits = repo.list_range(base_sha, head_sha)?;
    for sha in &commits {
        index_commit(store, repo, sha)?;
    }
    Ok(commits.len())
}

/// Derives the stable 128-bit path identifier from a path string.
pub fn path_id_from_path(path: &str) -> String {
    ContentHash::of(path.as_bytes()).hex()[..32].to_string()
}

/// Maps a file extension (or well-known basename) to a language tag.
/// Returns an empty string for unknown files.
pub fn detect_language(path: &str) -> &'static str {
    let lower = path.to_ascii_lowercase();
    let ext = Path::new(&lower)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("");

    match ext {
        "go" => "go",
        "ts" | "tsx" => "typescript",
        "js" | "jsx" | "mjs" | "cjs" => "javascript",
        "py" => "python",
        "rs" => "rust",
        "java" => "java",
        "rb" => "ruby",
        "c" | "h" => "c",
        "cpp" | "cc" | "cxx" | "hpp" => "cpp",
        "cs" => "csharp",
        "swift" => "swift",
        "kt" | "kts" => "kotlin",
        "md" => "markdown",
        "yaml" | "yml" => "yaml",
        "json" => "json",
        "toml" => "toml",
        "xml" => "xml",
        "html" | "htm" => "html",
        "css" => "css",
        "scss" | "sass" => "scss",
        "sql" => "sql",
        "sh" | "bash" => "shell",
        "dockerfile" => "dockerfile",
        "proto" => "protobuf",
        "mod" => "gomod",
        _ => {
            let base = Path::new(&lower)
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("");
            match base {
                "dockerfile" => "dockerfile",
                "makefile" => "makefile",
                "go.mod" => "gomod",
                "go.sum" => "gosum",
                _ => "",
            }
        }
    }
}

/// A file is binary if its first 8 KiB contains a null byte or is not
/// valid UTF-8.
pub fn is_binary_content(data: &[u8]) -> bool {
    let head = &data[..data.len().min(8192)];
    if head.contains(&0) {
        return true;
    }
    match std::str::from_utf8(head) {
        Ok(_) => false,
        // A multi-byte sequence cut at the window edge is not evidence of
        // binary content; a hard invalid sequence is.
        Err(e) => e.error_len().is_some(),
    }
}

/// Counts lines: `\n` bytes, plus the unterminated tail if any.
pub fn count_lines(data: &[u8]) -> u64 {
    if data.is_empty() {
        return 0;
    }
    let mut n = data.iter().filter(|&&b| b == b'\n').count() as u64;
    if data[data.len() - 1] != b'\n' {
        n += 1;
    }
    n
}

/// Checks the fixed list of generated-file markers.
pub fn is_generated_file(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    GENERATED_MARKERS.iter().any(|m| lower.contains(m))
}
