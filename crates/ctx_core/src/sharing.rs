//! Pack sharing: mutable fork drafts and the registry listing.

use crate::error::{CtxError, Result};
use crate::hash::ContentHash;
use crate::pack::{self, Pack};
use crate::store::Store;
use chrono::{DateTime, Utc};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

/// Projection of a registered pack for listings.
#[derive(Debug, Clone)]
pub struct PackSummary {
    pub hash: ContentHash,
    pub created: DateTime<Utc>,
    pub model: String,
    pub steps: usize,
    pub parent: Option<ContentHash>,
}

/// Creates a mutable draft derived from an existing pack.
///
/// The draft carries `parent = source.hash` and a cleared hash; it lives
/// at `drafts/<short-parent>.draft.json` until finalized.
pub fn fork(store: &Store, source_ref: &str) -> Result<PathBuf> {
    let mut draft = pack::load_pack(store, source_ref)?;

    let drafts_dir = store.drafts_dir();
    fs::create_dir_all(&drafts_dir)?;

    let parent = draft.hash.take().expect("loaded pack has a hash");
    draft.parent = Some(parent);

    let data = serde_json::to_vec_pretty(&draft)?;
    let draft_path = drafts_dir.join(format!("{}.draft.json", parent.short(12)));
    fs::write(&draft_path, data)?;

    Ok(draft_path)
}

/// Converts a mutable draft into an ordinary immutable pack.
///
/// The draft must carry a parent reference. Its canonical serialization is
/// stored as a blob, the pack is registered, and the draft file removed.
pub fn finalize_draft(store: &Store, draft_path: &Path) -> Result<Pack> {
    let data = fs::read(draft_path)?;
    let mut draft: Pack = serde_json::from_slice(&data)?;

    if draft.parent.is_none() {
        return Err(CtxError::DraftMissingParent(draft_path.to_path_buf()));
    }

    draft.hash = None;
    let canonical = pack::canonical_json(&draft)?;
    let pack_hash = store.blobs().write(&canonical)?;
    draft.hash = Some(pack_hash);

    pack::register_pack(store, pack_hash)?;
    fs::remove_file(draft_path)?;

    Ok(draft)
}

/// Lists finalized packs, newest first, truncated to `limit` (0 = all).
///
/// Corrupted registry entries are skipped.
pub fn list_packs(store: &Store, limit: usize) -> Result<Vec<PackSummary>> {
    let packs_dir = store.packs_dir();
    let entries = match fs::read_dir(&packs_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut summaries = Vec::new();
    for entry in entries {
        let entry = entry?;
        if entry.path().is_dir() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Ok(hash) = ContentHash::from_hex(name) else {
            continue;
        };

        let Ok(loaded) = pack::load_pack(store, &hash.to_ref()) else {
            continue;
        };

        summaries.push(PackSummary {
            hash,
            created: loaded.created,
            model: loaded.model.identifier,
            steps: loaded.steps.len(),
            parent: loaded.parent,
        });
    }

    summaries.sort_by(|a, b| b.created.cmp(&a.created));
    if limit > 0 {
        summaries.truncate(limit);
    }

    Ok(summaries)
}

/// Human-readable registry listing.
pub fn format_pack_list(summaries: &[PackSummary]) -> String {
    if summaries.is_empty() {
        return "No context packs found.\n".to_string();
    }

    let mut out = String::new();
    for summary in summaries {
        let parent = summary
            .parent
            .map(|p| format!(" (forked from {})", p.short(12)))
            .unwrap_or_default();
        writeln!(
            out,
            "{}  {}  {}  {} steps{}",
            summary.hash.short(12),
            summary.created.format("%Y-%m-%d %H:%M:%S"),
            summary.model,
            summary.steps,
            parent,
        )
        .unwrap();
    }
    out
}
