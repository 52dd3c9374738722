//! Optimizer: selects files and symbols for a task under a token budget.

use crate::error::{CtxError, Result};
use crate::git::GitRepo;
use crate::graph::{self, FileSnapshot, PathRecord, SymbolRecord};
use crate::jsonl;
use crate::store::Store;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;

/// Default maximum token estimate for a generated pack.
pub const DEFAULT_TOKEN_CAP: i64 = 32000;

/// Approximate tokens per byte for source code.
const TOKENS_PER_BYTE: f64 = 0.25;

/// Task words too generic to score on.
const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "to", "in", "of", "for", "is", "it", "on", "at", "by", "with",
    "from", "this", "that", "be", "as", "add", "fix", "update", "implement",
];

/// What to include in an optimized context pack.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackRequest {
    /// Commit to read; empty means HEAD.
    pub commit: String,
    pub task: String,
    pub token_cap: i64,
    pub include_tests: bool,
}

impl Default for PackRequest {
    fn default() -> Self {
        Self {
            commit: String::new(),
            task: String::new(),
            token_cap: DEFAULT_TOKEN_CAP,
            include_tests: false,
        }
    }
}

/// A single file or symbol admitted into the pack.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackItem {
    pub path: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub language: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub symbol_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub symbol_name: String,
    pub estimated_tokens: i64,
    pub reason: String,
}

/// Result of pack generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizedPack {
    pub commit: String,
    pub task: String,
    pub files: Vec<PackItem>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub symbols: Vec<PackItem>,
    pub estimated_tokens: i64,
    pub token_cap: i64,
}

impl OptimizedPack {
    /// Formatted JSON representation.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Human-readable summary.
    pub fn human(&self) -> String {
        let mut out = String::new();

        writeln!(
            out,
            "Optimized Pack for commit {}",
            self.commit.chars().take(8).collect::<String>()
        )
        .unwrap();
        writeln!(out, "Task: {}", self.task).unwrap();
        writeln!(out, "───────────────────────────────────").unwrap();
        let pct = if self.token_cap > 0 {
            self.estimated_tokens as f64 / self.token_cap as f64 * 100.0
        } else {
            0.0
        };
        writeln!(
            out,
            "Token budget: {} / {} ({:.0}% used)",
            self.estimated_tokens, self.token_cap, pct
        )
        .unwrap();

        if !self.files.is_empty() {
            writeln!(out, "\nFiles ({}):", self.files.len()).unwrap();
            for f in &self.files {
                writeln!(out, "  {:<40} ~{:>5} tokens  [{}]", f.path, f.estimated_tokens, f.reason)
                    .unwrap();
            }
        }
        if !self.symbols.is_empty() {
            writeln!(out, "\nSymbols ({}):", self.symbols.len()).unwrap();
            for s in &self.symbols {
                writeln!(
                    out,
                    "  {:<40} ~{:>5} tokens  [{}]",
                    s.symbol_name, s.estimated_tokens, s.reason
                )
                .unwrap();
            }
        }

        out
    }
}

/// Builds an optimized context pack from the indexed graph.
///
/// Scores candidate files against the task, admits them greedily under the
/// token cap, then fills remaining budget with relevant symbols from
/// admitted files.
pub fn generate_pack(store: &Store, repo: &GitRepo, request: &PackRequest) -> Result<OptimizedPack> {
    let token_cap = if request.token_cap <= 0 {
        DEFAULT_TOKEN_CAP
    } else {
        request.token_cap
    };

    let commit_sha = if request.commit.is_empty() {
        repo.head_sha()?
    } else {
        request.commit.clone()
    };

    let root = store.root();
    if !graph::files_path(root, &commit_sha).exists() {
        return Err(CtxError::NotIndexed(
            commit_sha.chars().take(8).collect(),
        ));
    }

    let files: Vec<FileSnapshot> = jsonl::read_records(&graph::files_path(root, &commit_sha))?;
    let paths: Vec<PathRecord> = jsonl::read_records(&graph::paths_path(root))?;
    let path_lookup: HashMap<&str, &str> = paths
        .iter()
        .map(|p| (p.path_id.as_str(), p.path.as_str()))
        .collect();
    let symbols: Vec<SymbolRecord> =
        jsonl::read_records(&graph::symbols_path(root, &commit_sha)).unwrap_or_default();

    let task_words = extract_task_words(&request.task);

    struct Candidate<'a> {
        snapshot: &'a FileSnapshot,
        path: &'a str,
        score: f64,
        tokens: i64,
        reason: &'static str,
    }

    let mut candidates: Vec<Candidate> = Vec::new();
    for file in &files {
        let Some(&path) = path_lookup.get(file.path_id.as_str()) else {
            continue;
        };
        if file.is_binary || file.is_generated {
            continue;
        }
        if !request.include_tests && is_test_file(path) {
            continue;
        }

        let score = score_file(path, &file.language, &task_words);
        let reason = if score >= 2.0 {
            "high-relevance"
        } else if score >= 1.0 {
            "medium-relevance"
        } else {
            "low-relevance"
        };

        candidates.push(Candidate {
            snapshot: file,
            path,
            score,
            tokens: estimate_tokens(file.byte_size as i64),
            reason,
        });
    }

    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.path.cmp(b.path))
    });

    let mut result = OptimizedPack {
        commit: commit_sha.clone(),
        task: request.task.clone(),
        files: Vec::new(),
        symbols: Vec::new(),
        estimated_tokens: 0,
        token_cap,
    };

    let mut remaining = token_cap;
    let mut admitted_path_ids: HashSet<&str> = HashSet::new();

    for candidate in &candidates {
        if candidate.tokens > remaining {
            // High-signal files are tolerated over-cap while most of the
            // budget is still unspent.
            if candidate.score < 2.0 || remaining < token_cap / 4 {
                continue;
            }
        }

        result.files.push(PackItem {
            path: candidate.path.to_string(),
            language: candidate.snapshot.language.clone(),
            symbol_id: String::new(),
            symbol_name: String::new(),
            estimated_tokens: candidate.tokens,
            reason: candidate.reason.to_string(),
        });
        admitted_path_ids.insert(candidate.snapshot.path_id.as_str());
        remaining -= candidate.tokens;

        if remaining <= 0 {
            break;
        }
    }

    if !symbols.is_empty() {
        struct SymCandidate<'a> {
            symbol: &'a SymbolRecord,
            score: f64,
            tokens: i64,
        }

        let mut sym_candidates: Vec<SymCandidate> = symbols
            .iter()
            .filter(|s| admitted_path_ids.contains(s.path_id.as_str()))
            .map(|symbol| {
                let tokens =
                    estimate_tokens((symbol.signature.len() + symbol.docstring.len()) as i64)
                        .max(10);
                SymCandidate {
                    symbol,
                    score: score_symbol(symbol, &task_words),
                    tokens,
                }
            })
            .collect();

        sym_candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.symbol.symbol_id.cmp(&b.symbol.symbol_id))
        });

        for sc in &sym_candidates {
            if sc.tokens > remaining {
                continue;
            }

            result.symbols.push(PackItem {
                path: path_lookup
                    .get(sc.symbol.path_id.as_str())
                    .map(|p| p.to_string())
                    .unwrap_or_default(),
                language: String::new(),
                symbol_id: sc.symbol.symbol_id.clone(),
                symbol_name: sc.symbol.fqname.clone(),
                estimated_tokens: sc.tokens,
                reason: format!("task-relevant-{}", sc.symbol.kind),
            });
            remaining -= sc.tokens;

            if remaining <= 0 {
                break;
            }
        }
    }

    result.estimated_tokens = result
        .files
        .iter()
        .chain(result.symbols.iter())
        .map(|item| item.estimated_tokens)
        .sum();

    Ok(result)
}

/// Rough token count from byte size, floor 1.
pub fn estimate_tokens(byte_size: i64) -> i64 {
    ((byte_size as f64 * TOKENS_PER_BYTE) as i64).max(1)
}

/// Relevance score for a file path against task words.
fn score_file(path: &str, language: &str, task_words: &[String]) -> f64 {
    let mut score = 0.0;
    let path_lower = path.to_lowercase();

    if matches!(
        language,
        "go" | "typescript" | "javascript" | "python" | "rust" | "java"
    ) {
        score += 0.5;
    }

    for word in task_words {
        if path_lower.contains(word.as_str()) {
            score += 2.0;
        }
    }

    if path_lower.contains("main.") || path_lower.contains("index.") || path_lower.contains("app.")
    {
        score += 0.5;
    }

    let depth = path.matches('/').count();
    if depth > 3 {
        score -= (depth - 3) as f64 * 0.1;
    }

    score
}

/// Relevance score for a symbol against task words.
fn score_symbol(symbol: &SymbolRecord, task_words: &[String]) -> f64 {
    let mut score = 0.0;
    let name_lower = symbol.name.to_lowercase();
    let fq_lower = symbol.fqname.to_lowercase();

    if symbol.visibility == "exported" {
        score += 1.0;
    }
    if symbol.kind == "function" || symbol.kind == "method" {
        score += 0.5;
    }
    for word in task_words {
        if name_lower.contains(word.as_str()) || fq_lower.contains(word.as_str()) {
            score += 2.0;
        }
    }

    score
}

/// Splits a task description into searchable words: lowercased, short and
/// stop words dropped.
pub fn extract_task_words(task: &str) -> Vec<String> {
    task.to_lowercase()
        .split(|c: char| {
            c.is_whitespace()
                || matches!(c, ',' | '.' | ';' | ':' | '-' | '_' | '/' | '\'' | '"')
        })
        .filter(|w| w.len() >= 3 && !STOP_WORDS.contains(w))
        .map(|w| w.to_string())
        .collect()
}

/// A test file by path convention, case-insensitive.
fn is_test_file(path: &str) -> bool {
    let lower = path.to_lowercase();
    ["_test.", ".test.", ".spec.", "__tests__/", "test/", "tests/"]
        .iter()
        .any(|marker| lower.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{TYPE_FILE_SNAPSHOT, TYPE_PATH, TYPE_SYMBOL};
    use tempfile::TempDir;

    fn snapshot(path_id: &str, byte_size: u64, language: &str) -> FileSnapshot {
        FileSnapshot {
            record_type: TYPE_FILE_SNAPSHOT.to_string(),
            commit: "head".to_string(),
            path_id: path_id.to_string(),
            blob_oid: String::new(),
            content_sha256: format!("hash-{}", path_id),
            language: language.to_string(),
            byte_size,
            loc: 10,
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
            first_seen_commit: "head".to_string(),
            last_seen_commit: None,
        }
    }

    fn seed_store(store: &Store, files: &[FileSnapshot], paths: &[PathRecord]) {
        jsonl::write_records(&graph::files_path(store.root(), "head"), files).unwrap();
        for p in paths {
            jsonl::append_record(&graph::paths_path(store.root()), p).unwrap();
        }
    }

    fn request(task: &str, cap: i64) -> PackRequest {
        PackRequest {
            commit: "head".to_string(),
            task: task.to_string(),
            token_cap: cap,
            include_tests: false,
        }
    }

    // generate_pack needs a GitRepo only to resolve HEAD when the request
    // has no commit; a dummy handle works when the commit is pinned.
    fn dummy_repo(tmp: &TempDir) -> GitRepo {
        GitRepo::new(tmp.path())
    }

    #[test]
    fn test_extract_task_words() {
        let words = extract_task_words("Fix the auth-token refresh in login/session.go");
        assert_eq!(words, vec!["auth", "token", "refresh", "login", "session"]);
    }

    #[test]
    fn test_task_match_scores_higher() {
        let tmp = TempDir::new().unwrap();
        let store = Store::init(tmp.path()).unwrap();

        seed_store(
            &store,
            &[snapshot("p1", 400, "go"), snapshot("p2", 400, "go")],
            &[path_record("p1", "auth/login.go"), path_record("p2", "util/strings.go")],
        );

        let pack = generate_pack(&store, &dummy_repo(&tmp), &request("fix login flow", 1000))
            .unwrap();
        assert_eq!(pack.files[0].path, "auth/login.go");
        assert_eq!(pack.files[0].reason, "high-relevance");
    }

    #[test]
    fn test_budget_respected() {
        let tmp = TempDir::new().unwrap();
        let store = Store::init(tmp.path()).unwrap();

        // Each file estimates to 250 tokens; cap of 600 admits two.
        seed_store(
            &store,
            &[
                snapshot("p1", 1000, "go"),
                snapshot("p2", 1000, "go"),
                snapshot("p3", 1000, "go"),
            ],
            &[
                path_record("p1", "a.go"),
                path_record("p2", "b.go"),
                path_record("p3", "c.go"),
            ],
        );

        let pack =
            generate_pack(&store, &dummy_repo(&tmp), &request("anything else", 600)).unwrap();
        assert_eq!(pack.files.len(), 2);
        assert!(pack.estimated_tokens <= 600);
    }

    #[test]
    fn test_high_signal_overcap_tolerated() {
        let tmp = TempDir::new().unwrap();
        let store = Store::init(tmp.path()).unwrap();

        // 2000 tokens against a 1000 cap, but task-relevant and budget
        // untouched: admitted anyway.
        seed_store(
            &store,
            &[snapshot("p1", 8000, "go")],
            &[path_record("p1", "search/engine.go")],
        );

        let pack = generate_pack(
            &store,
            &dummy_repo(&tmp),
            &request("improve search engine ranking", 1000),
        )
        .unwrap();
        assert_eq!(pack.files.len(), 1);
        assert!(pack.estimated_tokens <= 2 * 1000);
    }

    #[test]
    fn test_skips_binary_generated_and_tests() {
        let tmp = TempDir::new().unwrap();
        let store = Store::init(tmp.path()).unwrap();

        let mut binary = snapshot("p1", 100, "");
        binary.is_binary = true;
        let mut generated = snapshot("p2", 100, "javascript");
        generated.is_generated = true;
        let test_file = snapshot("p3", 100, "go");
        let normal = snapshot("p4", 100, "go");

        seed_store(
            &store,
            &[binary, generated, test_file, normal],
            &[
                path_record("p1", "logo.png"),
                path_record("p2", "dist/bundle.js"),
                path_record("p3", "pkg/handler_test.go"),
                path_record("p4", "pkg/handler.go"),
            ],
        );

        let pack =
            generate_pack(&store, &dummy_repo(&tmp), &request("handler work", 10000)).unwrap();
        let paths: Vec<&str> = pack.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["pkg/handler.go"]);
    }

    #[test]
    fn test_include_tests_flag() {
        let tmp = TempDir::new().unwrap();
        let store = Store::init(tmp.path()).unwrap();

        seed_store(
            &store,
            &[snapshot("p1", 100, "go")],
            &[path_record("p1", "pkg/handler_test.go")],
        );

        let mut req = request("handler", 10000);
        req.include_tests = true;
        let pack = generate_pack(&store, &dummy_repo(&tmp), &req).unwrap();
        assert_eq!(pack.files.len(), 1);
    }

    #[test]
    fn test_symbols_from_admitted_files() {
        let tmp = TempDir::new().unwrap();
        let store = Store::init(tmp.path()).unwrap();

        seed_store(
            &store,
            &[snapshot("p1", 400, "go")],
            &[path_record("p1", "auth/login.go")],
        );

        let symbol = SymbolRecord {
            record_type: TYPE_SYMBOL.to_string(),
            commit: "head".to_string(),
            symbol_id: "sym1".to_string(),
            path_id: "p1".to_string(),
            kind: "function".to_string(),
            name: "ValidateLogin".to_string(),
            fqname: "ValidateLogin".to_string(),
            visibility: "exported".to_string(),
            language: "go".to_string(),
            signature: "func ValidateLogin(token string) error".to_string(),
            docstring: String::new(),
            symbol_hash: "h".to_string(),
            def_region_id: "r".to_string(),
        };
        jsonl::write_records(&graph::symbols_path(store.root(), "head"), &[symbol]).unwrap();

        let pack =
            generate_pack(&store, &dummy_repo(&tmp), &request("fix login", 10000)).unwrap();
        assert_eq!(pack.symbols.len(), 1);
        assert_eq!(pack.symbols[0].symbol_name, "ValidateLogin");
        assert_eq!(pack.symbols[0].reason, "task-relevant-function");
        assert!(pack.symbols[0].estimated_tokens >= 10);
    }

    #[test]
    fn test_unindexed_commit_errors() {
        let tmp = TempDir::new().unwrap();
        let store = Store::init(tmp.path()).unwrap();

        let result = generate_pack(&store, &dummy_repo(&tmp), &request("task", 1000));
        assert!(matches!(result, Err(CtxError::NotIndexed(_))));
    }

    #[test]
    fn test_zero_cap_defaults() {
        let tmp = TempDir::new().unwrap();
        let store = Store::init(tmp.path()).unwrap();

        seed_store(&store, &[snapshot("p1", 100, "go")], &[path_record("p1", "a.go")]);

        let mut req = request("task", 0);
        req.token_cap = 0;
        let pack = generate_pack(&store, &dummy_repo(&tmp), &req).unwrap();
        assert_eq!(pack.token_cap, DEFAULT_TOKEN_CAP);
    }
}
