//! Regex-based symbol and region extraction.
//!
//! Extraction is deliberately line-oriented and regex-level, not an AST.
//! Identifiers are derived from stable inputs (`path_id`, kind, name and
//! line spans), so swapping in a real parser later would leave downstream
//! record identities unchanged.

use crate::graph::{RegionRecord, SymbolRecord, TYPE_REGION, TYPE_SYMBOL};
use crate::hash::hex128;
use regex::Regex;
use std::sync::LazyLock;

/// Symbol kinds emitted by the extractors.
pub const KIND_FUNCTION: &str = "function";
pub const KIND_METHOD: &str = "method";
pub const KIND_TYPE: &str = "type";
pub const KIND_INTERFACE: &str = "interface";
pub const KIND_CLASS: &str = "class";
pub const KIND_CONSTANT: &str = "constant";
pub const KIND_VARIABLE: &str = "variable";

/// Visibility values emitted by the extractors.
pub const VIS_EXPORTED: &str = "exported";
pub const VIS_PRIVATE: &str = "private";

/// Intermediate symbol representation before graph records are built.
#[derive(Debug, Clone)]
struct RawSymbol {
    kind: &'static str,
    name: String,
    signature: String,
    docstring: String,
    visibility: &'static str,
    start_line: u32,
    end_line: u32,
}

/// Extracts symbol and region records from file content.
///
/// Returns empty vectors for unsupported languages and empty content.
/// Output is sorted by identifier so downstream JSONL files are
/// deterministic.
pub fn extract_symbols(
    content: &[u8],
    language: &str,
    commit_sha: &str,
    path_id: &str,
) -> (Vec<SymbolRecord>, Vec<RegionRecord>) {
    if content.is_empty() {
        return (Vec::new(), Vec::new());
    }
    let text = String::from_utf8_lossy(content);

    let raws = match language {
        "go" => extract_go_symbols(&text),
        "typescript" | "javascript" => extract_ts_symbols(&text),
        "python" => extract_python_symbols(&text),
        _ => return (Vec::new(), Vec::new()),
    };

    let mut symbols = Vec::with_capacity(raws.len());
    let mut regions = Vec::with_capacity(raws.len());

    for raw in raws {
        let symbol_id = make_symbol_id(path_id, raw.kind, &raw.name);
        let region_id = make_region_id(path_id, raw.start_line, raw.end_line);
        let symbol_hash = hex128(&format!("{}{}", raw.signature, raw.name));
        let region_hash = hex128(&format!("{}:{}", raw.start_line, raw.end_line));

        regions.push(RegionRecord {
            record_type: TYPE_REGION.to_string(),
            commit: commit_sha.to_string(),
            region_id: region_id.clone(),
            path_id: path_id.to_string(),
            region_hash,
            purpose: "definition".to_string(),
            start_line: raw.start_line,
            start_col: 0,
            end_line: raw.end_line,
            end_col: 0,
        });

        symbols.push(SymbolRecord {
            record_type: TYPE_SYMBOL.to_string(),
            commit: commit_sha.to_string(),
            symbol_id,
            path_id: path_id.to_string(),
            kind: raw.kind.to_string(),
            name: raw.name.clone(),
            fqname: raw.name,
            visibility: raw.visibility.to_string(),
            language: language.to_string(),
            signature: raw.signature,
            docstring: raw.docstring,
            symbol_hash,
            def_region_id: region_id,
        });
    }

    symbols.sort_by(|a, b| a.symbol_id.cmp(&b.symbol_id));
    regions.sort_by(|a, b| a.region_id.cmp(&b.region_id));
    regions.dedup_by(|a, b| a.region_id == b.region_id);

    (symbols, regions)
}

/// Symbol identifier: 128-bit prefix of `sha256(path_id:kind:name)`.
pub fn make_symbol_id(path_id: &str, kind: &str, name: &str) -> String {
    hex128(&format!("{}:{}:{}", path_id, kind, name))
}

/// Region identifier: 128-bit prefix of `sha256(path_id:start:end)`.
pub fn make_region_id(path_id: &str, start_line: u32, end_line: u32) -> String {
    hex128(&format!("{}:{}:{}", path_id, start_line, end_line))
}

// --- Go ---

static GO_METHOD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^func\s+\(\s*\w+\s+\*?(\w+)\s*\)\s+(\w+)\s*\(([^)]*)\)\s*(.*)").unwrap()
});
static GO_FUNC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^func\s+(\w+)\s*\(([^)]*)\)\s*(.*)").unwrap());
static GO_TYPE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^type\s+(\w+)\s+(struct|interface)\s*\{").unwrap());
static GO_CONST_VAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(const|var)\s+(\w+)\s").unwrap());

fn extract_go_symbols(content: &str) -> Vec<RawSymbol> {
    let lines: Vec<&str> = content.lines().collect();
    let mut results = Vec::new();

    for (i, line) in lines.iter().enumerate() {
        let line_num = (i + 1) as u32;

        // Methods before functions: the method pattern is more specific.
        if let Some(m) = GO_METHOD_RE.captures(line) {
            let receiver = &m[1];
            let name = &m[2];
            let signature = format!("func ({}) {}({}) {}", receiver, name, &m[3], m[4].trim());
            results.push(RawSymbol {
                kind: KIND_METHOD,
                name: format!("{}.{}", receiver, name),
                signature: signature.trim().to_string(),
                docstring: String::new(),
                visibility: go_visibility(name),
                start_line: line_num,
                end_line: find_brace_block_end(&lines, i),
            });
            continue;
        }

        if let Some(m) = GO_FUNC_RE.captures(line) {
            let name = m[1].to_string();
            let signature = format!("func {}({}) {}", name, &m[2], m[3].trim());
            results.push(RawSymbol {
                kind: KIND_FUNCTION,
                visibility: go_visibility(&name),
                name,
                signature: signature.trim().to_string(),
                docstring: String::new(),
                start_line: line_num,
                end_line: find_brace_block_end(&lines, i),
            });
            continue;
        }

        if let Some(m) = GO_TYPE_RE.captures(line) {
            let name = m[1].to_string();
            let kind = if &m[2] == "interface" {
                KIND_INTERFACE
            } else {
                KIND_TYPE
            };
            results.push(RawSymbol {
                kind,
                visibility: go_visibility(&name),
                name,
                signature: line.trim().to_string(),
                docstring: String::new(),
                start_line: line_num,
                end_line: find_brace_block_end(&lines, i),
            });
            continue;
        }

        if let Some(m) = GO_CONST_VAR_RE.captures(line) {
            let kind = if &m[1] == "var" {
                KIND_VARIABLE
            } else {
                KIND_CONSTANT
            };
            let name = m[2].to_string();
            results.push(RawSymbol {
                kind,
                visibility: go_visibility(&name),
                name,
                signature: line.trim().to_string(),
                docstring: String::new(),
                start_line: line_num,
                end_line: line_num,
            });
        }
    }

    results
}

fn go_visibility(name: &str) -> &'static str {
    if name.chars().next().is_some_and(|c| c.is_ascii_uppercase()) {
        VIS_EXPORTED
    } else {
        VIS_PRIVATE
    }
}

/// Scans forward from the header line until the brace opened there closes.
fn find_brace_block_end(lines: &[&str], start_idx: usize) -> u32 {
    let mut depth = 0i32;
    for (i, line) in lines.iter().enumerate().skip(start_idx) {
        for ch in line.chars() {
            match ch {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return (i + 1) as u32;
                    }
                }
                _ => {}
            }
        }
    }
    (start_idx + 1) as u32
}

// --- TypeScript / JavaScript ---

static TS_FUNC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:export\s+)?(?:async\s+)?function\s+(\w+)\s*\(").unwrap());
static TS_ARROW_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:export\s+)?(?:const|let|var)\s+(\w+)\s*=\s*(?:async\s+)?\(([^)]*)\)\s*(?::\s*\w+)?\s*=>")
        .unwrap()
});
static TS_CLASS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:export\s+)?(?:abstract\s+)?class\s+(\w+)").unwrap());
static TS_INTERFACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:export\s+)?interface\s+(\w+)").unwrap());
static TS_TYPE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:export\s+)?type\s+(\w+)").unwrap());

fn extract_ts_symbols(content: &str) -> Vec<RawSymbol> {
    let lines: Vec<&str> = content.lines().collect();
    let mut results = Vec::new();

    for (i, line) in lines.iter().enumerate() {
        let line_num = (i + 1) as u32;

        let (re_match, kind, spans_block) = if let Some(m) = TS_FUNC_RE.captures(line) {
            (m, KIND_FUNCTION, true)
        } else if let Some(m) = TS_ARROW_RE.captures(line) {
            (m, KIND_FUNCTION, true)
        } else if let Some(m) = TS_CLASS_RE.captures(line) {
            (m, KIND_CLASS, true)
        } else if let Some(m) = TS_INTERFACE_RE.captures(line) {
            (m, KIND_INTERFACE, true)
        } else if let Some(m) = TS_TYPE_RE.captures(line) {
            (m, KIND_TYPE, false)
        } else {
            continue;
        };

        let end_line = if spans_block {
            find_brace_block_end(&lines, i)
        } else {
            line_num
        };

        results.push(RawSymbol {
            kind,
            name: re_match[1].to_string(),
            signature: line.trim().to_string(),
            docstring: String::new(),
            visibility: ts_visibility(line),
            start_line: line_num,
            end_line,
        });
    }

    results
}

fn ts_visibility(line: &str) -> &'static str {
    if line.trim_start().starts_with("export ") {
        VIS_EXPORTED
    } else {
        VIS_PRIVATE
    }
}

// --- Python ---

static PY_CLASS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^class\s+(\w+)").unwrap());
static PY_FUNC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\s*)def\s+(\w+)\s*\(([^)]*)\)").unwrap());

fn extract_python_symbols(content: &str) -> Vec<RawSymbol> {
    let lines: Vec<&str> = content.lines().collect();
    let mut results = Vec::new();

    for (i, line) in lines.iter().enumerate() {
        let line_num = (i + 1) as u32;

        // Classes first: their methods match the def pattern below.
        if let Some(m) = PY_CLASS_RE.captures(line) {
            let name = m[1].to_string();
            results.push(RawSymbol {
                kind: KIND_CLASS,
                visibility: py_visibility(&name),
                name,
                signature: line.trim().to_string(),
                docstring: String::new(),
                start_line: line_num,
                end_line: find_py_block_end(&lines, i),
            });
            continue;
        }

        if let Some(m) = PY_FUNC_RE.captures(line) {
            let indent = &m[1];
            let name = m[2].to_string();
            let kind = if indent.is_empty() {
                KIND_FUNCTION
            } else {
                KIND_METHOD
            };
            let signature = format!("def {}({})", name, &m[3]);

            // One-line docstring preview if the next line opens one.
            let mut docstring = String::new();
            if let Some(next) = lines.get(i + 1) {
                let next = next.trim();
                if next.starts_with("\"\"\"") || next.starts_with("'''") {
                    docstring = next.trim_matches(['"', '\'', ' ']).to_string();
                }
            }

            results.push(RawSymbol {
                kind,
                visibility: py_visibility(&name),
                name,
                signature,
                docstring,
                start_line: line_num,
                end_line: find_py_block_end(&lines, i),
            });
        }
    }

    results
}

fn py_visibility(name: &str) -> &'static str {
    if name.starts_with('_') {
        VIS_PRIVATE
    } else {
        VIS_EXPORTED
    }
}

/// A Python block ends at the next non-empty line whose indentation is at
/// or below the defining line's.
fn find_py_block_end(lines: &[&str], start_idx: usize) -> u32 {
    if start_idx >= lines.len() {
        return (start_idx + 1) as u32;
    }

    let start_indent = leading_indent(lines[start_idx]);
    for (i, line) in lines.iter().enumerate().skip(start_idx + 1) {
        if line.trim().is_empty() {
            continue;
        }
        if leading_indent(line) <= start_indent {
            return i as u32;
        }
    }
    lines.len() as u32
}

/// Counts leading whitespace, tabs weighted as 4 columns.
fn leading_indent(line: &str) -> usize {
    let mut count = 0;
    for ch in line.chars() {
        match ch {
            ' ' => count += 1,
            '\t' => count += 4,
            _ => break,
        }
    }
    count
}
