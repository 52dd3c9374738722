//! Import and call edge extraction.
//!
//! Imports are matched per language; relative ts/js imports are resolved
//! against the commit's path map. Call edges are matched as `name(` over
//! each caller symbol's region: resolved names get confidence 0.8,
//! external references 0.5.

use crate::graph::{CallEdge, ImportEdge, RegionRecord, SymbolRecord, TYPE_CALL_EDGE, TYPE_IMPORT_EDGE};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

/// Confidence assigned to calls resolved to an indexed symbol.
const CONFIDENCE_INTERNAL: f64 = 0.8;
/// Confidence assigned to calls left as external references.
const CONFIDENCE_EXTERNAL: f64 = 0.5;

/// Extracts import edges from file content.
///
/// `path_index` maps repository file paths to path ids for resolving
/// relative imports. Output is sorted for deterministic JSONL files.
pub fn extract_imports(
    content: &[u8],
    language: &str,
    commit_sha: &str,
    from_path_id: &str,
    path_index: &HashMap<String, String>,
) -> Vec<ImportEdge> {
    if content.is_empty() {
        return Vec::new();
    }
    let text = String::from_utf8_lossy(content);

    let mut edges = match language {
        "go" => extract_go_imports(&text, commit_sha, from_path_id),
        "typescript" | "javascript" => {
            extract_ts_imports(&text, commit_sha, from_path_id, path_index)
        }
        "python" => extract_python_imports(&text, commit_sha, from_path_id),
        _ => Vec::new(),
    };

    edges.sort_by(|a, b| {
        (a.to_external_module.as_deref(), a.to_path_id.as_deref())
            .cmp(&(b.to_external_module.as_deref(), b.to_path_id.as_deref()))
    });

    edges
}

static CALL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\w+)\s*\(").unwrap());

/// Extracts call edges for the given caller symbols over their regions.
///
/// `known_symbols` maps symbol names (including method short names) to
/// symbol ids across the whole commit. Edges are deduplicated by
/// (from, to) and sorted.
pub fn extract_call_edges(
    content: &[u8],
    language: &str,
    commit_sha: &str,
    caller_symbols: &[SymbolRecord],
    regions: &[RegionRecord],
    known_symbols: &HashMap<String, String>,
) -> Vec<CallEdge> {
    if content.is_empty() || caller_symbols.is_empty() {
        return Vec::new();
    }

    let text = String::from_utf8_lossy(content);
    let lines: Vec<&str> = text.lines().collect();
    let mut edges = Vec::new();

    for caller in caller_symbols {
        let Some((start_line, end_line)) = symbol_line_range(caller, regions) else {
            continue;
        };

        let short_name = caller_short_name(caller);
        for line in lines
            .iter()
            .take((end_line as usize).min(lines.len()))
            .skip(start_line as usize - 1)
        {
            for m in CALL_RE.captures_iter(line) {
                let called = &m[1];
                if is_keyword(called, language) || called == short_name {
                    continue;
                }

                let (to_symbol_id, to_external_ref, confidence) =
                    match known_symbols.get(called) {
                        Some(target) => (Some(target.clone()), None, CONFIDENCE_INTERNAL),
                        None => (None, Some(called.to_string()), CONFIDENCE_EXTERNAL),
                    };

                edges.push(CallEdge {
                    record_type: TYPE_CALL_EDGE.to_string(),
                    commit: commit_sha.to_string(),
                    from_symbol_id: caller.symbol_id.clone(),
                    to_symbol_id,
                    to_external_ref,
                    call_type: "direct".to_string(),
                    confidence,
                });
            }
        }
    }

    dedupe_call_edges(&mut edges);
    edges.sort_by(|a, b| {
        (
            &a.from_symbol_id,
            a.to_symbol_id.as_deref(),
            a.to_external_ref.as_deref(),
        )
            .cmp(&(
                &b.from_symbol_id,
                b.to_symbol_id.as_deref(),
                b.to_external_ref.as_deref(),
            ))
    });

    edges
}

/// Method names like `Receiver.Method` call themselves as `Method`.
fn caller_short_name(symbol: &SymbolRecord) -> &str {
    symbol.name.rsplit('.').next().unwrap_or(&symbol.name)
}

/// Looks up a symbol's line span through its definition region.
fn symbol_line_range(symbol: &SymbolRecord, regions: &[RegionRecord]) -> Option<(u32, u32)> {
    regions
        .iter()
        .find(|r| r.region_id == symbol.def_region_id)
        .map(|r| (r.start_line, r.end_line))
        .filter(|(start, _)| *start > 0)
}

fn dedupe_call_edges(edges: &mut Vec<CallEdge>) {
    let mut seen = HashSet::new();
    edges.retain(|e| {
        let key = format!(
            "{}→{}→{}",
            e.from_symbol_id,
            e.to_symbol_id.as_deref().unwrap_or(""),
            e.to_external_ref.as_deref().unwrap_or("")
        );
        seen.insert(key)
    });
}

// --- Go imports ---

static GO_SINGLE_IMPORT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?m)^import\s+"([^"]+)""#).unwrap());
static GO_BLOCK_IMPORT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?ms)^import\s*\(\s*\n(.*?)\n\s*\)").unwrap());
static GO_IMPORT_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\s*(?:\w+\s+)?"([^"]+)""#).unwrap());

fn extract_go_imports(content: &str, commit_sha: &str, from_path_id: &str) -> Vec<ImportEdge> {
    let mut edges = Vec::new();

    let external = |module: &str| ImportEdge {
        record_type: TYPE_IMPORT_EDGE.to_string(),
        commit: commit_sha.to_string(),
        from_path_id: from_path_id.to_string(),
        to_path_id: None,
        to_external_module: Some(module.to_string()),
    };

    for m in GO_SINGLE_IMPORT_RE.captures_iter(content) {
        edges.push(external(&m[1]));
    }

    for block in GO_BLOCK_IMPORT_RE.captures_iter(content) {
        for line in block[1].lines() {
            if let Some(m) = GO_IMPORT_LINE_RE.captures(line) {
                edges.push(external(&m[1]));
            }
        }
    }

    edges
}

// --- TypeScript / JavaScript imports ---

static TS_IMPORT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?m)^import\s+.*?\s+from\s+['"]([^'"]+)['"]"#).unwrap());
static TS_REQUIRE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"require\s*\(\s*['"]([^'"]+)['"]\s*\)"#).unwrap());
static TS_DYN_IMPORT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"import\s*\(\s*['"]([^'"]+)['"]\s*\)"#).unwrap());

/// Suffixes tried when matching a relative import against known paths.
const TS_RESOLVE_SUFFIXES: &[&str] = &["", ".ts", ".tsx", ".js", ".jsx", "/index.ts", "/index.js"];

fn extract_ts_imports(
    content: &str,
    commit_sha: &str,
    from_path_id: &str,
    path_index: &HashMap<String, String>,
) -> Vec<ImportEdge> {
    let mut edges = Vec::new();
    let mut seen = HashSet::new();

    for re in [&*TS_IMPORT_RE, &*TS_REQUIRE_RE, &*TS_DYN_IMPORT_RE] {
        for m in re.captures_iter(content) {
            let module = m[1].to_string();
            if !seen.insert(module.clone()) {
                continue;
            }

            let mut edge = ImportEdge {
                record_type: TYPE_IMPORT_EDGE.to_string(),
                commit: commit_sha.to_string(),
                from_path_id: from_path_id.to_string(),
                to_path_id: None,
                to_external_module: None,
            };

            if module.starts_with('.') {
                let resolved = path_index
                    .iter()
                    .find(|(path, _)| matches_relative_import(path, &module))
                    .map(|(_, path_id)| path_id.clone());
                match resolved {
                    Some(path_id) => edge.to_path_id = Some(path_id),
                    None => edge.to_external_module = Some(module),
                }
            } else {
                edge.to_external_module = Some(module);
            }

            edges.push(edge);
        }
    }

    edges
}

/// Matches an import specifier suffix against a repository path, trying
/// the usual resolution suffixes.
fn matches_relative_import(file_path: &str, import_path: &str) -> bool {
    let clean = import_path
        .trim_start_matches("./")
        .trim_start_matches("../");

    TS_RESOLVE_SUFFIXES
        .iter()
        .any(|suffix| file_path.ends_with(&format!("{}{}", clean, suffix)))
}

// --- Python imports ---

static PY_IMPORT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^import\s+(\S+)").unwrap());
static PY_FROM_IMPORT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^from\s+(\S+)\s+import").unwrap());

fn extract_python_imports(content: &str, commit_sha: &str, from_path_id: &str) -> Vec<ImportEdge> {
    let mut edges = Vec::new();
    let mut seen = HashSet::new();

    for re in [&*PY_IMPORT_RE, &*PY_FROM_IMPORT_RE] {
        for m in re.captures_iter(content) {
            let module = m[1].to_string();
            if !seen.insert(module.clone()) {
                continue;
            }
            edges.push(ImportEdge {
                record_type: TYPE_IMPORT_EDGE.to_string(),
                commit: commit_sha.to_string(),
                from_path_id: from_path_id.to_string(),
                to_path_id: None,
                to_external_module: Some(module),
            });
        }
    }

    edges
}

// --- Keyword filtering ---

const GO_KEYWORDS: &[&str] = &[
    "if", "else", "for", "range", "return", "switch", "case", "break", "continue", "defer", "go",
    "select", "chan", "map", "make", "new", "len", "cap", "append", "copy", "delete", "panic",
    "recover", "close", "print", "println", "string", "int", "bool", "byte", "error", "nil",
    "true", "false",
];

const TS_KEYWORDS: &[&str] = &[
    "if", "else", "for", "while", "return", "switch", "case", "break", "continue", "throw", "try",
    "catch", "finally", "new", "delete", "typeof", "instanceof", "void", "this", "super", "class",
    "extends", "implements", "import", "export", "default", "const", "let", "var", "function",
    "async", "await", "yield", "from", "as", "true", "false", "null", "undefined", "console",
    "require", "module",
];

const PY_KEYWORDS: &[&str] = &[
    "if", "else", "elif", "for", "while", "return", "break", "continue", "pass", "raise", "try",
    "except", "finally", "with", "as", "import", "from", "class", "def", "lambda", "and", "or",
    "not", "in", "is", "True", "False", "None", "self", "cls", "print", "len", "range", "type",
    "int", "str", "list", "dict", "set", "tuple", "isinstance", "issubclass", "super", "property",
];

fn is_keyword(name: &str, language: &str) -> bool {
    let keywords = match language {
        "go" => GO_KEYWORDS,
        "typescript" | "javascript" => TS_KEYWORDS,
        "python" => PY_KEYWORDS,
        _ => return false,
    };
    keywords.contains(&name)
}
