//! Replay engine: re-executes recorded steps and assigns a fidelity
//! verdict.
//!
//! Tool executors are registered by name; `read_file` is the only
//! built-in. A step whose executor is missing or errors fails the run;
//! a deterministic step whose output diverges degrades it.

use crate::error::Result;
use crate::hash::ContentHash;
use crate::pack::{self, Pack, Step};
use crate::store::Store;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// Three-level replay verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Fidelity {
    Exact,
    Degraded,
    Failed,
}

impl Fidelity {
    /// Process exit code for the CLI layer: 0 exact, 1 degraded, 2 failed.
    pub fn exit_code(&self) -> i32 {
        match self {
            Fidelity::Exact => 0,
            Fidelity::Degraded => 1,
            Fidelity::Failed => 2,
        }
    }
}

/// Per-step replay outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Matched,
    Diverged,
    Failed,
}

/// Result of re-executing one recorded step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub index: u32,
    pub tool: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_hash: Option<ContentHash>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_hash: Option<ContentHash>,
    pub deterministic: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
}

/// Environment or input discrepancy noticed before/while replaying.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayDrift {
    #[serde(rename = "type")]
    pub drift_type: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub expected: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub actual: String,
}

/// Full replay report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayReport {
    pub pack_hash: String,
    pub fidelity: Fidelity,
    pub steps: Vec<StepResult>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub drift: Vec<ReplayDrift>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl ReplayReport {
    /// Formatted JSON representation.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Human-readable summary with per-step icons.
    pub fn summary(&self) -> String {
        let mut out = String::new();

        writeln!(out, "Replay: {}", self.pack_hash).unwrap();
        writeln!(out, "Fidelity: {:?}", self.fidelity).unwrap();
        writeln!(
            out,
            "Duration: {}ms\n",
            (self.end_time - self.start_time).num_milliseconds()
        )
        .unwrap();

        writeln!(out, "Steps ({}):", self.steps.len()).unwrap();
        for step in &self.steps {
            let icon = match step.status {
                StepStatus::Matched => "✓",
                StepStatus::Diverged if !step.deterministic => "≈",
                StepStatus::Diverged => "≠",
                StepStatus::Failed => "✗",
            };
            let status = match step.status {
                StepStatus::Matched => "matched",
                StepStatus::Diverged => "diverged",
                StepStatus::Failed => "failed",
            };
            let detail = if !step.reason.is_empty() {
                format!(" ({})", step.reason)
            } else if step.status == StepStatus::Diverged && !step.deterministic {
                " (expected, non-deterministic)".to_string()
            } else {
                String::new()
            };
            writeln!(out, "  {} [{}] {} {}{}", icon, step.index, step.tool, status, detail)
                .unwrap();
        }

        if !self.drift.is_empty() {
            writeln!(out, "\nDrift ({}):", self.drift.len()).unwrap();
            for d in &self.drift {
                writeln!(out, "  {}: {}", d.drift_type, d.description).unwrap();
            }
        }

        out
    }
}

/// Executes one tool call during replay.
///
/// Implemented for plain closures, so registration is just
/// `executors.register("name", |tool, params| ...)`.
pub trait ToolExecutor {
    fn execute(&self, tool: &str, params: &Map<String, Value>) -> std::result::Result<Vec<u8>, String>;
}

impl<F> ToolExecutor for F
where
    F: Fn(&str, &Map<String, Value>) -> std::result::Result<Vec<u8>, String>,
{
    fn execute(&self, tool: &str, params: &Map<String, Value>) -> std::result::Result<Vec<u8>, String> {
        self(tool, params)
    }
}

/// Named registry of tool executors.
pub struct Executors {
    registry: BTreeMap<String, Box<dyn ToolExecutor>>,
}

impl Executors {
    /// An empty registry with no executors at all.
    pub fn empty() -> Self {
        Self {
            registry: BTreeMap::new(),
        }
    }

    /// The built-in catalog: only `read_file`, which reads the literal
    /// `path` parameter from the local filesystem.
    pub fn defaults() -> Self {
        let mut executors = Self::empty();
        executors.register("read_file", |_tool: &str, params: &Map<String, Value>| {
            let path = params
                .get("path")
                .and_then(|v| v.as_str())
                .ok_or_else(|| "read_file: missing or invalid 'path' parameter".to_string())?;
            std::fs::read(path).map_err(|e| e.to_string())
        });
        executors
    }

    /// Registers (or replaces) an executor under a tool name.
    pub fn register(&mut self, tool: &str, executor: impl ToolExecutor + 'static) {
        self.registry.insert(tool.to_string(), Box::new(executor));
    }

    fn get(&self, tool: &str) -> Option<&dyn ToolExecutor> {
        self.registry.get(tool).map(|b| b.as_ref())
    }
}

/// Replays a pack with the default executor catalog.
pub fn replay(store: &Store, pack_ref: &str) -> Result<ReplayReport> {
    replay_with(store, pack_ref, &Executors::defaults())
}

/// Replays a pack with a caller-supplied executor registry.
pub fn replay_with(store: &Store, pack_ref: &str, executors: &Executors) -> Result<ReplayReport> {
    let loaded = pack::load_pack(store, pack_ref)?;

    let mut report = ReplayReport {
        pack_hash: loaded
            .hash
            .map(|h| h.to_ref())
            .unwrap_or_default(),
        fidelity: Fidelity::Exact,
        steps: Vec::with_capacity(loaded.steps.len()),
        drift: check_environment_drift(&loaded),
        start_time: Utc::now(),
        end_time: Utc::now(),
    };

    // Input availability: a missing blob is drift, not an abort.
    for input in &loaded.inputs {
        if !store.blobs().exists(input.content_ref) {
            report.drift.push(ReplayDrift {
                drift_type: "missing_input".to_string(),
                description: format!("input {:?} not found in store", input.name),
                expected: input.content_ref.short(12),
                actual: String::new(),
            });
        }
    }

    let mut has_failed = false;
    let mut has_diverged = false;

    for step in &loaded.steps {
        let result = execute_step(step, executors);
        match result.status {
            StepStatus::Failed => has_failed = true,
            StepStatus::Diverged if result.deterministic => has_diverged = true,
            _ => {}
        }
        report.steps.push(result);
    }

    report.fidelity = if has_failed {
        Fidelity::Failed
    } else if has_diverged {
        Fidelity::Degraded
    } else {
        Fidelity::Exact
    };

    report.end_time = Utc::now();
    Ok(report)
}

/// Re-executes a single step and compares the output hash.
fn execute_step(step: &Step, executors: &Executors) -> StepResult {
    let mut result = StepResult {
        index: step.index,
        tool: step.tool.clone(),
        status: StepStatus::Failed,
        expected_hash: step.output_ref,
        actual_hash: None,
        deterministic: step.deterministic,
        reason: String::new(),
    };

    let Some(executor) = executors.get(&step.tool) else {
        result.reason = format!("tool not available: {}", step.tool);
        return result;
    };

    let output = match executor.execute(&step.tool, &step.parameters) {
        Ok(output) => output,
        Err(e) => {
            result.reason = format!("execution error: {}", e);
            return result;
        }
    };

    let actual = ContentHash::of(&output);
    result.actual_hash = Some(actual);
    result.status = if Some(actual) == step.output_ref {
        StepStatus::Matched
    } else {
        StepStatus::Diverged
    };

    result
}

/// Only OS equality is checked; runtime and tool-version drift are
/// recorded in the pack but not compared.
fn check_environment_drift(loaded: &Pack) -> Vec<ReplayDrift> {
    let mut drift = Vec::new();

    let current_os = std::env::consts::OS;
    if !loaded.environment.os.is_empty() && loaded.environment.os != current_os {
        drift.push(ReplayDrift {
            drift_type: "environment".to_string(),
            description: "OS changed".to_string(),
            expected: loaded.environment.os.clone(),
            actual: current_os.to_string(),
        });
    }

    drift
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::ExecutionLog;
    use crate::pack::{create_pack, register_pack};
    use tempfile::TempDir;

    /// Pack with one deterministic read_file step expecting `expected`.
    fn read_file_pack(store: &Store, file_path: &str, expected: &str) -> String {
        let json = format!(
            r#"{{
                "model": {{"identifier": "m", "parameters": {{}}}},
                "system_prompt": "s",
                "prompts": [],
                "inputs": [{{"name": "in.txt", "content": "input body"}}],
                "steps": [{{"index": 0, "type": "tool_call", "tool": "read_file",
                           "parameters": {{"path": {fp:?}}}, "output": {out:?},
                           "deterministic": true}}],
                "outputs": [],
                "environment": {{"os": {os:?}, "runtime": "rt", "tool_versions": {{}}}}
            }}"#,
            fp = file_path,
            out = expected,
            os = std::env::consts::OS,
        );
        let log = ExecutionLog::from_slice(json.as_bytes()).unwrap();
        let pack = create_pack(store, &log).unwrap();
        let hash = pack.hash.unwrap();
        register_pack(store, hash).unwrap();
        hash.to_ref()
    }

    #[test]
    fn test_exact_fidelity() {
        let tmp = TempDir::new().unwrap();
        let store = Store::init(tmp.path()).unwrap();

        let file = tmp.path().join("data.txt");
        std::fs::write(&file, "hello world").unwrap();
        let pack_ref = read_file_pack(&store, file.to_str().unwrap(), "hello world");

        let report = replay(&store, &pack_ref).unwrap();
        assert_eq!(report.fidelity, Fidelity::Exact);
        assert_eq!(report.steps[0].status, StepStatus::Matched);
        assert_eq!(report.fidelity.exit_code(), 0);
    }

    #[test]
    fn test_degraded_on_deterministic_divergence() {
        let tmp = TempDir::new().unwrap();
        let store = Store::init(tmp.path()).unwrap();

        let file = tmp.path().join("data.txt");
        std::fs::write(&file, "changed").unwrap();
        let pack_ref = read_file_pack(&store, file.to_str().unwrap(), "hello world");

        let report = replay(&store, &pack_ref).unwrap();
        assert_eq!(report.fidelity, Fidelity::Degraded);
        assert_eq!(report.steps[0].status, StepStatus::Diverged);
        assert_eq!(report.fidelity.exit_code(), 1);
    }

    #[test]
    fn test_failed_without_executor() {
        let tmp = TempDir::new().unwrap();
        let store = Store::init(tmp.path()).unwrap();

        let file = tmp.path().join("data.txt");
        std::fs::write(&file, "hello world").unwrap();
        let pack_ref = read_file_pack(&store, file.to_str().unwrap(), "hello world");

        let report = replay_with(&store, &pack_ref, &Executors::empty()).unwrap();
        assert_eq!(report.fidelity, Fidelity::Failed);
        assert_eq!(report.steps[0].status, StepStatus::Failed);
        assert!(report.steps[0].reason.contains("tool not available: read_file"));
        assert_eq!(report.fidelity.exit_code(), 2);
    }

    #[test]
    fn test_nondeterministic_divergence_stays_exact() {
        let tmp = TempDir::new().unwrap();
        let store = Store::init(tmp.path()).unwrap();

        let json = format!(
            r#"{{
                "model": {{"identifier": "m", "parameters": {{}}}},
                "system_prompt": "s",
                "prompts": [], "inputs": [],
                "steps": [{{"index": 0, "type": "tool_call", "tool": "clock",
                           "parameters": {{}}, "output": "recorded-at-capture",
                           "deterministic": false}}],
                "outputs": [],
                "environment": {{"os": {os:?}, "runtime": "rt", "tool_versions": {{}}}}
            }}"#,
            os = std::env::consts::OS,
        );
        let log = ExecutionLog::from_slice(json.as_bytes()).unwrap();
        let pack = create_pack(&store, &log).unwrap();
        register_pack(&store, pack.hash.unwrap()).unwrap();

        let mut executors = Executors::empty();
        executors.register("clock", |_: &str, _: &Map<String, Value>| {
            Ok(b"different every time".to_vec())
        });

        let report =
            replay_with(&store, &pack.hash.unwrap().to_ref(), &executors).unwrap();
        assert_eq!(report.steps[0].status, StepStatus::Diverged);
        assert_eq!(report.fidelity, Fidelity::Exact);
    }

    #[test]
    fn test_missing_input_recorded_as_drift() {
        let tmp = TempDir::new().unwrap();
        let store = Store::init(tmp.path()).unwrap();

        let file = tmp.path().join("data.txt");
        std::fs::write(&file, "hello world").unwrap();
        let pack_ref = read_file_pack(&store, file.to_str().unwrap(), "hello world");

        // Remove the input blob behind the store's back.
        let input_hash = ContentHash::of(b"input body");
        let hex = input_hash.hex();
        let blob_path = store
            .root()
            .join("objects")
            .join(&hex[..2])
            .join(&hex[2..]);
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&blob_path, std::fs::Permissions::from_mode(0o644)).unwrap();
        }
        std::fs::remove_file(&blob_path).unwrap();

        let report = replay(&store, &pack_ref).unwrap();
        assert!(report
            .drift
            .iter()
            .any(|d| d.drift_type == "missing_input" && d.description.contains("in.txt")));
        // Missing inputs do not fail the run by themselves.
        assert_eq!(report.fidelity, Fidelity::Exact);
    }

    #[test]
    fn test_environment_drift_entry() {
        let tmp = TempDir::new().unwrap();
        let store = Store::init(tmp.path()).unwrap();

        let json = r#"{
            "model": {"identifier": "m", "parameters": {}},
            "system_prompt": "s",
            "prompts": [], "inputs": [], "steps": [], "outputs": [],
            "environment": {"os": "plan9", "runtime": "rt", "tool_versions": {}}
        }"#;
        let log = ExecutionLog::from_slice(json.as_bytes()).unwrap();
        let pack = create_pack(&store, &log).unwrap();
        register_pack(&store, pack.hash.unwrap()).unwrap();

        let report = replay(&store, &pack.hash.unwrap().to_ref()).unwrap();
        assert!(report
            .drift
            .iter()
            .any(|d| d.drift_type == "environment" && d.expected == "plan9"));
    }

    #[test]
    fn test_summary_icons() {
        let tmp = TempDir::new().unwrap();
        let store = Store::init(tmp.path()).unwrap();

        let file = tmp.path().join("data.txt");
        std::fs::write(&file, "hello world").unwrap();
        let pack_ref = read_file_pack(&store, file.to_str().unwrap(), "hello world");

        let report = replay(&store, &pack_ref).unwrap();
        let text = report.summary();
        assert!(text.contains("✓ [0] read_file matched"));
        assert!(text.contains("Fidelity: Exact"));
    }
}
