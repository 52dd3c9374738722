//! Artifact provenance: sidecar metadata and integrity verification.
//!
//! Every artifact produced from a pack can carry a `<artifact>.ctx.json`
//! sidecar linking it back to the pack that produced it. Verification
//! loads the referenced pack and compares the artifact's content hash
//! against the recorded output reference.

use crate::error::{CtxError, Result};
use crate::hash::ContentHash;
use crate::pack::{self, Pack};
use crate::store::Store;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

/// Sidecar metadata written next to an artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sidecar {
    /// Reference to the pack that produced the artifact.
    pub context_pack: String,
    /// Content references of the pack's inputs.
    pub inputs: Vec<String>,
    /// Tool names used during the run.
    pub tools: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Result of verifying an artifact against its sidecar.
#[derive(Debug, Clone)]
pub struct VerifyResult {
    pub artifact_path: PathBuf,
    pub pack_hash: ContentHash,
    pub pack_created: String,
    pub tools: Vec<String>,
    /// True when the artifact's hash matches the recorded output ref.
    pub content_match: bool,
    pub content_expected: Option<ContentHash>,
    pub content_actual: Option<ContentHash>,
    pub confidence: Option<String>,
    pub notes: Option<String>,
}

/// The sidecar path for an artifact: `<artifact>.ctx.json`.
pub fn sidecar_path(artifact_path: &Path) -> PathBuf {
    let mut name = artifact_path.as_os_str().to_os_string();
    name.push(".ctx.json");
    PathBuf::from(name)
}

/// Reads and parses a sidecar file.
pub fn read_sidecar(path: &Path) -> Result<Sidecar> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(CtxError::SidecarMissing(path.to_path_buf()));
        }
        Err(e) => return Err(e.into()),
    };
    Ok(serde_json::from_slice(&data)?)
}

/// Writes a sidecar file as pretty JSON.
pub fn write_sidecar(path: &Path, sidecar: &Sidecar) -> Result<()> {
    let data = serde_json::to_vec_pretty(sidecar)?;
    fs::write(path, data)?;
    Ok(())
}

/// Creates sidecar files for every output of a pack under `output_dir`.
/// Returns the number of sidecars written.
pub fn generate_sidecars(loaded: &Pack, output_dir: &Path) -> Result<usize> {
    let tools: BTreeSet<String> = loaded.steps.iter().map(|s| s.tool.clone()).collect();
    let tools: Vec<String> = tools.into_iter().collect();

    let inputs: Vec<String> = loaded
        .inputs
        .iter()
        .map(|i| i.content_ref.to_ref())
        .collect();

    let pack_ref = loaded
        .hash
        .map(|h| h.to_ref())
        .unwrap_or_default();

    let mut count = 0;
    for output in &loaded.outputs {
        let sidecar = Sidecar {
            context_pack: pack_ref.clone(),
            inputs: inputs.clone(),
            tools: tools.clone(),
            confidence: None,
            notes: None,
        };
        write_sidecar(&sidecar_path(&output_dir.join(&output.name)), &sidecar)?;
        count += 1;
    }

    Ok(count)
}

/// Verifies an artifact's provenance and content integrity.
///
/// A missing sidecar and a sidecar whose pack cannot be loaded are
/// distinct errors from a content mismatch, which is reported in the
/// result rather than failing.
pub fn verify_artifact(store: &Store, artifact_path: &Path) -> Result<VerifyResult> {
    let sidecar = read_sidecar(&sidecar_path(artifact_path))?;

    let loaded = pack::load_pack(store, &sidecar.context_pack)
        .map_err(|_| CtxError::ProvenanceBroken(short_of(&sidecar.context_pack)))?;

    let mut result = VerifyResult {
        artifact_path: artifact_path.to_path_buf(),
        pack_hash: loaded.hash.expect("loaded pack has a hash"),
        pack_created: loaded.created.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        tools: sidecar.tools,
        content_match: false,
        content_expected: None,
        content_actual: None,
        confidence: sidecar.confidence,
        notes: sidecar.notes,
    };

    let artifact_data = fs::read(artifact_path)?;
    let actual = ContentHash::of(&artifact_data);

    let base_name = artifact_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    if let Some(output) = loaded.outputs.iter().find(|o| o.name == base_name) {
        result.content_expected = Some(output.content_ref);
        result.content_actual = Some(actual);
        result.content_match = actual == output.content_ref;
    }

    Ok(result)
}

/// Human-readable verification summary.
pub fn format_verify_result(result: &VerifyResult) -> String {
    let mut out = String::new();

    writeln!(out, "Artifact:  {}", result.artifact_path.display()).unwrap();
    writeln!(out, "Pack:      {}", result.pack_hash.short(12)).unwrap();
    writeln!(out, "Created:   {}", result.pack_created).unwrap();

    if !result.tools.is_empty() {
        writeln!(out, "Tools:     {}", result.tools.join(", ")).unwrap();
    }

    if let (Some(expected), Some(actual)) = (result.content_expected, result.content_actual) {
        if result.content_match {
            writeln!(out, "Integrity: verified").unwrap();
        } else {
            writeln!(
                out,
                "Integrity: modified (expected {}, actual {})",
                expected.short(12),
                actual.short(12)
            )
            .unwrap();
        }
    }

    if let Some(confidence) = &result.confidence {
        writeln!(out, "Confidence: {}", confidence).unwrap();
    }
    if let Some(notes) = &result.notes {
        writeln!(out, "Notes:     {}", notes).unwrap();
    }

    writeln!(out, "\nTo inspect: ctx show {}", result.pack_hash.short(12)).unwrap();
    writeln!(out, "To replay:  ctx replay {}", result.pack_hash.short(12)).unwrap();

    out
}

fn short_of(reference: &str) -> String {
    ContentHash::parse(reference)
        .map(|h| h.short(12))
        .unwrap_or_else(|_| reference.to_string())
}
