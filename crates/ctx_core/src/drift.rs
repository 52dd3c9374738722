//! Drift detector: structural comparison of two pack manifests.
//!
//! Packs are aligned by position (prompts and steps by index, outputs by
//! name) and every difference is emitted as a typed entry. Drift is a
//! report, not an error.

use crate::error::Result;
use crate::pack::{self, Pack};
use crate::store::Store;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// Categories of difference between two packs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftType {
    PromptDrift,
    ToolDrift,
    ParamDrift,
    ReasoningDrift,
    OutputDrift,
}

/// One typed difference between two packs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftEntry {
    #[serde(rename = "type")]
    pub drift_type: DriftType,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pack_a: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pack_b: Option<Value>,
}

/// Structural diff of two packs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftReport {
    pub pack_hash_a: String,
    pub pack_hash_b: String,
    pub entries: Vec<DriftEntry>,
    pub has_drift: bool,
}

impl DriftReport {
    /// Formatted JSON representation (the authoritative machine format).
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// One enumerated line per entry.
    pub fn human(&self) -> String {
        if !self.has_drift {
            return "No differences found.\n".to_string();
        }

        let mut out = String::new();
        writeln!(out, "Comparing {} vs {}\n", self.pack_hash_a, self.pack_hash_b).unwrap();
        writeln!(out, "{} difference(s) found:\n", self.entries.len()).unwrap();
        for (i, entry) in self.entries.iter().enumerate() {
            let tag = serde_json::to_value(entry.drift_type)
                .ok()
                .and_then(|v| v.as_str().map(|s| s.to_string()))
                .unwrap_or_default();
            writeln!(out, "  {}. [{}] {}", i + 1, tag, entry.description).unwrap();
        }
        out
    }
}

/// Loads two packs and produces a drift report.
pub fn diff(store: &Store, ref_a: &str, ref_b: &str) -> Result<DriftReport> {
    let a = pack::load_pack(store, ref_a)?;
    let b = pack::load_pack(store, ref_b)?;
    Ok(diff_packs(&a, &b))
}

/// Compares two loaded packs: prompts, then steps, then outputs.
pub fn diff_packs(a: &Pack, b: &Pack) -> DriftReport {
    let mut report = DriftReport {
        pack_hash_a: a.hash.map(|h| h.short(12)).unwrap_or_default(),
        pack_hash_b: b.hash.map(|h| h.short(12)).unwrap_or_default(),
        entries: Vec::new(),
        has_drift: false,
    };

    if a.hash.is_some() && a.hash == b.hash {
        return report;
    }

    report.entries.extend(compare_prompts(a, b));
    report.entries.extend(compare_steps(a, b));
    report.entries.extend(compare_outputs(a, b));
    report.has_drift = !report.entries.is_empty();
    report
}

fn compare_prompts(a: &Pack, b: &Pack) -> Vec<DriftEntry> {
    let mut entries = Vec::new();

    if a.system_prompt != b.system_prompt {
        entries.push(DriftEntry {
            drift_type: DriftType::PromptDrift,
            description: "System prompts differ".to_string(),
            step_index: None,
            pack_a: Some(a.system_prompt.short(12).into()),
            pack_b: Some(b.system_prompt.short(12).into()),
        });
    }

    let min_len = a.prompts.len().min(b.prompts.len());
    for i in 0..min_len {
        let (pa, pb) = (&a.prompts[i], &b.prompts[i]);
        if pa.content_ref != pb.content_ref {
            entries.push(DriftEntry {
                drift_type: DriftType::PromptDrift,
                description: format!("Prompt {} content differs (role: {})", i, pa.role),
                step_index: Some(i),
                pack_a: Some(pa.content_ref.short(12).into()),
                pack_b: Some(pb.content_ref.short(12).into()),
            });
        }
        if pa.role != pb.role {
            entries.push(DriftEntry {
                drift_type: DriftType::PromptDrift,
                description: format!("Prompt {} role changed", i),
                step_index: Some(i),
                pack_a: Some(pa.role.clone().into()),
                pack_b: Some(pb.role.clone().into()),
            });
        }
    }

    if a.prompts.len() > b.prompts.len() {
        entries.push(DriftEntry {
            drift_type: DriftType::PromptDrift,
            description: format!("Pack A has {} extra prompt(s)", a.prompts.len() - b.prompts.len()),
            step_index: None,
            pack_a: None,
            pack_b: None,
        });
    } else if b.prompts.len() > a.prompts.len() {
        entries.push(DriftEntry {
            drift_type: DriftType::PromptDrift,
            description: format!("Pack B has {} extra prompt(s)", b.prompts.len() - a.prompts.len()),
            step_index: None,
            pack_a: None,
            pack_b: None,
        });
    }

    entries
}

fn compare_steps(a: &Pack, b: &Pack) -> Vec<DriftEntry> {
    let mut entries = Vec::new();

    let min_len = a.steps.len().min(b.steps.len());
    for i in 0..min_len {
        let (sa, sb) = (&a.steps[i], &b.steps[i]);

        if sa.tool != sb.tool {
            entries.push(DriftEntry {
                drift_type: DriftType::ToolDrift,
                description: format!("Step {}: different tool", i),
                step_index: Some(i),
                pack_a: Some(sa.tool.clone().into()),
                pack_b: Some(sb.tool.clone().into()),
            });
            // Different tools make param and output comparison meaningless.
            continue;
        }

        if sa.parameters != sb.parameters {
            entries.push(DriftEntry {
                drift_type: DriftType::ParamDrift,
                description: format!("Step {}: {} called with different parameters", i, sa.tool),
                step_index: Some(i),
                pack_a: Some(Value::Object(sa.parameters.clone())),
                pack_b: Some(Value::Object(sb.parameters.clone())),
            });
        }

        if sa.output_ref != sb.output_ref {
            entries.push(DriftEntry {
                drift_type: DriftType::ReasoningDrift,
                description: format!("Step {}: {} produced different output", i, sa.tool),
                step_index: Some(i),
                pack_a: sa.output_ref.map(|h| h.short(12).into()),
                pack_b: sb.output_ref.map(|h| h.short(12).into()),
            });
        }
    }

    if a.steps.len() > b.steps.len() {
        for (i, step) in a.steps.iter().enumerate().skip(min_len) {
            entries.push(DriftEntry {
                drift_type: DriftType::ToolDrift,
                description: format!("Step {}: {} removed in pack B", i, step.tool),
                step_index: Some(i),
                pack_a: Some(step.tool.clone().into()),
                pack_b: None,
            });
        }
    } else {
        for (i, step) in b.steps.iter().enumerate().skip(min_len) {
            entries.push(DriftEntry {
                drift_type: DriftType::ToolDrift,
                description: format!("Step {}: {} added in pack B", i, step.tool),
                step_index: Some(i),
                pack_a: None,
                pack_b: Some(step.tool.clone().into()),
            });
        }
    }

    entries
}

fn compare_outputs(a: &Pack, b: &Pack) -> Vec<DriftEntry> {
    let mut entries = Vec::new();

    let map_a: BTreeMap<&str, _> = a
        .outputs
        .iter()
        .map(|o| (o.name.as_str(), o.content_ref))
        .collect();
    let map_b: BTreeMap<&str, _> = b
        .outputs
        .iter()
        .map(|o| (o.name.as_str(), o.content_ref))
        .collect();

    for (name, ref_a) in &map_a {
        match map_b.get(name) {
            None => entries.push(DriftEntry {
                drift_type: DriftType::OutputDrift,
                description: format!("Output {:?} removed in pack B", name),
                step_index: None,
                pack_a: Some(ref_a.short(12).into()),
                pack_b: None,
            }),
            Some(ref_b) if ref_a != ref_b => entries.push(DriftEntry {
                drift_type: DriftType::OutputDrift,
                description: format!("Output {:?} content differs", name),
                step_index: None,
                pack_a: Some(ref_a.short(12).into()),
                pack_b: Some(ref_b.short(12).into()),
            }),
            Some(_) => {}
        }
    }

    for (name, ref_b) in &map_b {
        if !map_a.contains_key(name) {
            entries.push(DriftEntry {
                drift_type: DriftType::OutputDrift,
                description: format!("Output {:?} added in pack B", name),
                step_index: None,
                pack_a: None,
                pack_b: Some(ref_b.short(12).into()),
            });
        }
    }

    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::ContentHash;
    use crate::log::ExecutionLog;
    use crate::pack::create_pack;
    use tempfile::TempDir;

    fn log_with(system_prompt: &str, output_content: &str) -> ExecutionLog {
        let json = format!(
            r#"{{
                "model": {{"identifier": "m", "parameters": {{}}}},
                "system_prompt": {sp:?},
                "prompts": [{{"role": "user", "content": "hi"}}],
                "inputs": [],
                "steps": [{{"index": 0, "type": "tool_call", "tool": "read_file",
                           "parameters": {{"path": "a.txt"}}, "output": "out",
                           "deterministic": true}}],
                "outputs": [{{"name": "result.txt", "content": {oc:?}}}],
                "environment": {{"os": "linux", "runtime": "rt", "tool_versions": {{}}}}
            }}"#,
            sp = system_prompt,
            oc = output_content,
        );
        ExecutionLog::from_slice(json.as_bytes()).unwrap()
    }

    #[test]
    fn test_self_diff_no_drift() {
        let tmp = TempDir::new().unwrap();
        let store = Store::init(tmp.path()).unwrap();

        let pack = create_pack(&store, &log_with("A", "out")).unwrap();
        let report = diff_packs(&pack, &pack);
        assert!(!report.has_drift);
        assert!(report.entries.is_empty());
    }

    #[test]
    fn test_system_prompt_drift_short_hashes() {
        let tmp = TempDir::new().unwrap();
        let store = Store::init(tmp.path()).unwrap();

        let a = create_pack(&store, &log_with("A", "out")).unwrap();
        let b = create_pack(&store, &log_with("B", "out")).unwrap();

        let report = diff_packs(&a, &b);
        assert!(report.has_drift);
        assert_eq!(report.entries.len(), 1);

        let entry = &report.entries[0];
        assert_eq!(entry.drift_type, DriftType::PromptDrift);
        assert_eq!(
            entry.pack_a,
            Some(ContentHash::of(b"A").short(12).into())
        );
        assert_eq!(
            entry.pack_b,
            Some(ContentHash::of(b"B").short(12).into())
        );
    }

    #[test]
    fn test_output_drift() {
        let tmp = TempDir::new().unwrap();
        let store = Store::init(tmp.path()).unwrap();

        let a = create_pack(&store, &log_with("S", "alpha")).unwrap();
        let b = create_pack(&store, &log_with("S", "beta")).unwrap();

        let report = diff_packs(&a, &b);
        let output_entries: Vec<_> = report
            .entries
            .iter()
            .filter(|e| e.drift_type == DriftType::OutputDrift)
            .collect();
        assert_eq!(output_entries.len(), 1);
        assert!(output_entries[0].description.contains("result.txt"));
    }

    #[test]
    fn test_tool_drift_stops_step_comparison() {
        let tmp = TempDir::new().unwrap();
        let store = Store::init(tmp.path()).unwrap();

        let mut a = create_pack(&store, &log_with("S", "out")).unwrap();
        let mut b = create_pack(&store, &log_with("S", "out")).unwrap();
        a.hash = Some(ContentHash::of(b"a"));
        b.hash = Some(ContentHash::of(b"b"));
        b.steps[0].tool = "write_file".to_string();
        b.steps[0].parameters.insert("extra".into(), Value::Bool(true));

        let report = diff_packs(&a, &b);
        let step_entries: Vec<_> = report
            .entries
            .iter()
            .filter(|e| e.step_index == Some(0))
            .collect();
        assert_eq!(step_entries.len(), 1);
        assert_eq!(step_entries[0].drift_type, DriftType::ToolDrift);
    }

    #[test]
    fn test_param_and_reasoning_drift() {
        let tmp = TempDir::new().unwrap();
        let store = Store::init(tmp.path()).unwrap();

        let mut a = create_pack(&store, &log_with("S", "out")).unwrap();
        let mut b = create_pack(&store, &log_with("S", "out")).unwrap();
        a.hash = Some(ContentHash::of(b"a"));
        b.hash = Some(ContentHash::of(b"b"));
        b.steps[0]
            .parameters
            .insert("path".into(), Value::String("b.txt".into()));
        b.steps[0].output_ref = Some(ContentHash::of(b"different"));

        let report = diff_packs(&a, &b);
        let types: Vec<DriftType> = report.entries.iter().map(|e| e.drift_type).collect();
        assert!(types.contains(&DriftType::ParamDrift));
        assert!(types.contains(&DriftType::ReasoningDrift));
    }

    #[test]
    fn test_extra_steps_reported() {
        let tmp = TempDir::new().unwrap();
        let store = Store::init(tmp.path()).unwrap();

        let mut a = create_pack(&store, &log_with("S", "out")).unwrap();
        let mut b = create_pack(&store, &log_with("S", "out")).unwrap();
        a.hash = Some(ContentHash::of(b"a"));
        b.hash = Some(ContentHash::of(b"b"));
        let extra = b.steps[0].clone();
        b.steps.push(extra);

        let report = diff_packs(&a, &b);
        let tool_entries: Vec<_> = report
            .entries
            .iter()
            .filter(|e| e.drift_type == DriftType::ToolDrift)
            .collect();
        assert_eq!(tool_entries.len(), 1);
        assert!(tool_entries[0].description.contains("added in pack B"));
    }

    #[test]
    fn test_drift_type_serializes_snake_case() {
        let json = serde_json::to_string(&DriftType::PromptDrift).unwrap();
        assert_eq!(json, "\"prompt_drift\"");
    }

    #[test]
    fn test_entry_order_prompts_steps_outputs() {
        let tmp = TempDir::new().unwrap();
        let store = Store::init(tmp.path()).unwrap();

        let a = create_pack(&store, &log_with("A", "alpha")).unwrap();
        let mut b = create_pack(&store, &log_with("B", "beta")).unwrap();
        b.steps[0].output_ref = Some(ContentHash::of(b"changed"));

        let report = diff_packs(&a, &b);
        let types: Vec<DriftType> = report.entries.iter().map(|e| e.drift_type).collect();
        assert_eq!(
            types,
            vec![
                DriftType::PromptDrift,
                DriftType::ReasoningDrift,
                DriftType::OutputDrift
            ]
        );
    }
}
