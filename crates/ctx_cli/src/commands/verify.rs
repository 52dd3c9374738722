//! Verify artifact provenance.

use super::open_store;
use anyhow::Result;
use std::path::Path;

/// Verifies an artifact against its sidecar. Exits 1 when the artifact's
/// content no longer matches the recorded output.
pub fn run(artifact: &str) -> Result<()> {
    let store = open_store()?;
    let result = ctx_core::verify_artifact(&store, Path::new(artifact))?;
    print!("{}", ctx_core::format_verify_result(&result));

    if result.content_expected.is_some() && !result.content_match {
        std::process::exit(1);
    }
    Ok(())
}
