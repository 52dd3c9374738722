//! Pack manifests: creation, canonical serialization, loading.
//!
//! A pack manifest is the canonical form of an execution log with every
//! large string replaced by a blob reference. The manifest's own identity
//! is the hash of its canonical JSON serialization with the `hash` field
//! cleared, so a pack is self-describing and verifiable.

use crate::error::{CtxError, Result};
use crate::hash::{self, ContentHash};
use crate::log::ExecutionLog;
use crate::store::Store;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;

/// Manifest format version written by this crate.
pub const PACK_VERSION: &str = "0.1";

/// An immutable context pack manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pack {
    pub version: String,
    /// The pack's own reference. Materialized only in memory; the canonical
    /// blob is serialized with this field cleared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<ContentHash>,
    pub created: DateTime<Utc>,
    pub model: Model,
    pub system_prompt: ContentHash,
    pub prompts: Vec<Prompt>,
    pub inputs: Vec<Input>,
    pub steps: Vec<Step>,
    pub outputs: Vec<OutputArtifact>,
    pub environment: Environment,
    /// Set by fork; links a finalized draft to its source pack.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<ContentHash>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    pub identifier: String,
    pub parameters: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prompt {
    pub role: String,
    pub content_ref: ContentHash,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Input {
    pub name: String,
    pub content_ref: ContentHash,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub index: u32,
    #[serde(rename = "type")]
    pub step_type: String,
    pub tool: String,
    pub parameters: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_ref: Option<ContentHash>,
    pub deterministic: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputArtifact {
    pub name: String,
    pub content_ref: ContentHash,
    /// Back-reference to the owning pack, set once the pack hash is known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_pack: Option<ContentHash>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Environment {
    pub os: String,
    pub runtime: String,
    pub tool_versions: BTreeMap<String, String>,
}

impl Pack {
    /// Checks that all required manifest fields are present, collecting
    /// every violation before failing.
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();

        if self.version.is_empty() {
            missing.push("version".to_string());
        }
        if self.model.identifier.is_empty() {
            missing.push("model.identifier".to_string());
        }
        if self.environment.os.is_empty() {
            missing.push("environment.os".to_string());
        }
        if self.environment.runtime.is_empty() {
            missing.push("environment.runtime".to_string());
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(CtxError::InvalidManifest(missing))
        }
    }

    /// Computes the pack's content hash from its canonical serialization
    /// with the `hash` field cleared.
    pub fn canonical_hash(&self) -> Result<ContentHash> {
        let mut cleared = self.clone();
        cleared.hash = None;
        let data = canonical_json(&cleared)?;
        Ok(ContentHash::of(&data))
    }
}

/// Serializes a value as canonical JSON: keys sorted lexicographically at
/// every depth, arrays in order, no insignificant whitespace.
///
/// Round-trips through `serde_json::Value`, whose object representation is
/// a `BTreeMap`, so re-serialization sorts keys at every level.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let tree = serde_json::to_value(value)?;
    Ok(serde_json::to_vec(&tree)?)
}

/// Builds an immutable pack from an execution log.
///
/// Stores the system prompt, every prompt/input/output content, and every
/// step output as blobs, then stores the canonical manifest itself; the
/// manifest blob's hash becomes the pack's identity.
pub fn create_pack(store: &Store, log: &ExecutionLog) -> Result<Pack> {
    let blobs = store.blobs();

    let system_prompt = blobs.write(log.system_prompt.as_bytes())?;

    let prompts = log
        .prompts
        .iter()
        .map(|p| {
            Ok(Prompt {
                role: p.role.clone(),
                content_ref: blobs.write(p.content.as_bytes())?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let inputs = log
        .inputs
        .iter()
        .map(|inp| {
            let data = inp.content.as_bytes();
            Ok(Input {
                name: inp.name.clone(),
                content_ref: blobs.write(data)?,
                size: data.len() as u64,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let steps = log
        .steps
        .iter()
        .map(|s| {
            let output_ref = if s.output.is_empty() {
                None
            } else {
                Some(blobs.write(s.output.as_bytes())?)
            };
            Ok(Step {
                index: s.index,
                step_type: s.step_type.clone(),
                tool: s.tool.clone(),
                parameters: s.parameters.clone(),
                output_ref,
                deterministic: s.deterministic,
                timestamp: s.timestamp,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let outputs = log
        .outputs
        .iter()
        .map(|o| {
            Ok(OutputArtifact {
                name: o.name.clone(),
                content_ref: blobs.write(o.content.as_bytes())?,
                context_pack: None,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut pack = Pack {
        version: PACK_VERSION.to_string(),
        hash: None,
        created: Utc::now(),
        model: Model {
            identifier: log.model.identifier.clone(),
            parameters: log.model.parameters.clone(),
        },
        system_prompt,
        prompts,
        inputs,
        steps,
        outputs,
        environment: Environment {
            os: log.environment.os.clone(),
            runtime: log.environment.runtime.clone(),
            tool_versions: log.environment.tool_versions.clone(),
        },
        parent: None,
    };

    // The manifest blob's identity becomes the pack hash.
    let manifest = canonical_json(&pack)?;
    let pack_hash = blobs.write(&manifest)?;
    pack.hash = Some(pack_hash);

    for output in &mut pack.outputs {
        output.context_pack = Some(pack_hash);
    }

    Ok(pack)
}

/// Records a pack hash in the `packs/` registry, enabling prefix
/// resolution. Re-registering an already-known hash is a no-op.
pub fn register_pack(store: &Store, pack_hash: ContentHash) -> Result<()> {
    let path = store.packs_dir().join(pack_hash.hex());
    if path.exists() {
        return Ok(());
    }

    match OpenOptions::new().write(true).create_new(true).open(&path) {
        Ok(mut file) => {
            file.write_all(pack_hash.to_ref().as_bytes())?;
            Ok(())
        }
        // Lost a race with a concurrent registration of the same pack.
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Loads a pack manifest by full hash, short prefix, or `ctx://` URI.
///
/// The stored blob carries no `hash` field; it is set from the blob
/// identity, which the integrity-checked read guarantees.
pub fn load_pack(store: &Store, reference: &str) -> Result<Pack> {
    let pack_hash = hash::resolve(store.root(), reference)?;

    let data = store
        .blobs()
        .read(pack_hash)
        .map_err(|_| CtxError::PackNotFound(pack_hash.short(12)))?;

    let mut pack: Pack = serde_json::from_slice(&data)?;
    pack.hash = Some(pack_hash);
    Ok(pack)
}

/// Produces a human-readable summary of a pack.
pub fn format_pack(pack: &Pack) -> String {
    let mut s = String::new();
    let hash = pack
        .hash
        .map(|h| h.short(12))
        .unwrap_or_else(|| "(draft)".to_string());

    s.push_str(&format!("Pack:    {}\n", hash));
    s.push_str(&format!(
        "Created: {}\n",
        pack.created.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    s.push_str(&format!("Model:   {}\n", pack.model.identifier));
    if let Some(parent) = pack.parent {
        s.push_str(&format!("Parent:  {}\n", parent.short(12)));
    }
    s.push_str(&format!("\nSystem Prompt: {}\n", pack.system_prompt.short(12)));

    if !pack.inputs.is_empty() {
        s.push_str(&format!("\nInputs ({}):\n", pack.inputs.len()));
        for input in &pack.inputs {
            s.push_str(&format!("  {} ({} bytes)\n", input.name, input.size));
        }
    }

    if !pack.steps.is_empty() {
        s.push_str(&format!("\nSteps ({}):\n", pack.steps.len()));
        for step in &pack.steps {
            let det = if step.deterministic {
                "deterministic"
            } else {
                "non-deterministic"
            };
            s.push_str(&format!(
                "  [{}] {} {} ({})\n",
                step.index, step.step_type, step.tool, det
            ));
        }
    }

    if !pack.outputs.is_empty() {
        s.push_str(&format!("\nOutputs ({}):\n", pack.outputs.len()));
        for output in &pack.outputs {
            s.push_str(&format!("  {}\n", output.name));
        }
    }

    s.push_str(&format!(
        "\nEnvironment: {} / {}\n",
        pack.environment.os, pack.environment.runtime
    ));
    if !pack.environment.tool_versions.is_empty() {
        s.push_str("Tool Versions:\n");
        for (tool, version) in &pack.environment.tool_versions {
            s.push_str(&format!("  {}: {}\n", tool, version));
        }
    }

    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_log() -> ExecutionLog {
        let json = r##"{
            "model": {"identifier": "gpt-4", "parameters": {"temperature": 0.0}},
            "system_prompt": "You are a helpful assistant.",
            "prompts": [{"role": "user", "content": "Summarize this file"}],
            "inputs": [{"name": "readme.md", "content": "# Hello World"}],
            "steps": [{
                "index": 0,
                "type": "tool_call",
                "tool": "read_file",
                "parameters": {"path": "readme.md"},
                "output": "# Hello World",
                "deterministic": true,
                "timestamp": "2024-01-01T00:00:00Z"
            }],
            "outputs": [{"name": "summary.txt", "content": "A readme."}],
            "environment": {"os": "darwin", "runtime": "rt", "tool_versions": {}}
        }"##;
        ExecutionLog::from_slice(json.as_bytes()).unwrap()
    }

    #[test]
    fn test_create_pack_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let store = Store::init(tmp.path()).unwrap();

        let pack = create_pack(&store, &sample_log()).unwrap();
        let pack_hash = pack.hash.unwrap();
        register_pack(&store, pack_hash).unwrap();

        let loaded = load_pack(&store, &pack_hash.to_ref()).unwrap();
        assert_eq!(loaded.hash, Some(pack_hash));
        assert_eq!(loaded.model.identifier, "gpt-4");
        assert_eq!(loaded.steps[0].tool, "read_file");
        assert_eq!(
            loaded.steps[0].output_ref,
            Some(ContentHash::of(b"# Hello World"))
        );
    }

    #[test]
    fn test_output_back_reference() {
        let tmp = TempDir::new().unwrap();
        let store = Store::init(tmp.path()).unwrap();

        let pack = create_pack(&store, &sample_log()).unwrap();
        assert_eq!(pack.outputs[0].context_pack, pack.hash);
    }

    #[test]
    fn test_canonical_hash_matches_blob_identity() {
        let tmp = TempDir::new().unwrap();
        let store = Store::init(tmp.path()).unwrap();

        let pack = create_pack(&store, &sample_log()).unwrap();
        // The manifest blob was stored before outputs got back-references,
        // so clear them before recomputing.
        let mut stored_form = pack.clone();
        for output in &mut stored_form.outputs {
            output.context_pack = None;
        }
        assert_eq!(stored_form.canonical_hash().unwrap(), pack.hash.unwrap());
    }

    #[test]
    fn test_canonical_json_sorts_keys_deeply() {
        let value = serde_json::json!({
            "zebra": {"b": 1, "a": 2},
            "alpha": [{"z": 0, "a": 1}]
        });
        let data = canonical_json(&value).unwrap();
        let text = String::from_utf8(data).unwrap();
        assert_eq!(
            text,
            r#"{"alpha":[{"a":1,"z":0}],"zebra":{"a":2,"b":1}}"#
        );
    }

    #[test]
    fn test_equal_logs_hash_equal() {
        let tmp = TempDir::new().unwrap();
        let store = Store::init(tmp.path()).unwrap();

        let a = create_pack(&store, &sample_log()).unwrap();
        let b = create_pack(&store, &sample_log()).unwrap();
        // Creation timestamps differ, so compare canonical forms with
        // created pinned.
        let mut a2 = a.clone();
        let mut b2 = b.clone();
        b2.created = a2.created;
        a2.hash = None;
        b2.hash = None;
        for output in a2.outputs.iter_mut().chain(b2.outputs.iter_mut()) {
            output.context_pack = None;
        }
        assert_eq!(
            canonical_json(&a2).unwrap(),
            canonical_json(&b2).unwrap()
        );
    }

    #[test]
    fn test_register_twice_is_noop() {
        let tmp = TempDir::new().unwrap();
        let store = Store::init(tmp.path()).unwrap();

        let pack = create_pack(&store, &sample_log()).unwrap();
        let pack_hash = pack.hash.unwrap();
        register_pack(&store, pack_hash).unwrap();
        register_pack(&store, pack_hash).unwrap();

        let sentinel = store.packs_dir().join(pack_hash.hex());
        assert_eq!(
            std::fs::read_to_string(sentinel).unwrap(),
            pack_hash.to_ref()
        );
    }

    #[test]
    fn test_load_by_prefix() {
        let tmp = TempDir::new().unwrap();
        let store = Store::init(tmp.path()).unwrap();

        let pack = create_pack(&store, &sample_log()).unwrap();
        let pack_hash = pack.hash.unwrap();
        register_pack(&store, pack_hash).unwrap();

        let loaded = load_pack(&store, &pack_hash.short(8)).unwrap();
        assert_eq!(loaded.hash, Some(pack_hash));
    }

    #[test]
    fn test_validate_reports_missing() {
        let tmp = TempDir::new().unwrap();
        let store = Store::init(tmp.path()).unwrap();

        let mut pack = create_pack(&store, &sample_log()).unwrap();
        pack.version.clear();
        pack.model.identifier.clear();

        match pack.validate().unwrap_err() {
            CtxError::InvalidManifest(missing) => {
                assert_eq!(missing, vec!["version", "model.identifier"]);
            }
            other => panic!("expected InvalidManifest, got {:?}", other),
        }
    }

    #[test]
    fn test_format_pack_mentions_steps() {
        let tmp = TempDir::new().unwrap();
        let store = Store::init(tmp.path()).unwrap();

        let pack = create_pack(&store, &sample_log()).unwrap();
        let text = format_pack(&pack);
        assert!(text.contains("read_file"));
        assert!(text.contains("summary.txt"));
        assert!(text.contains("darwin / rt"));
    }
}
