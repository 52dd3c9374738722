//! Fork packs into drafts and finalize drafts.

use super::open_store;
use anyhow::Result;
use console::style;
use std::path::Path;

/// Forks a pack into a mutable draft.
pub fn fork(hash: &str) -> Result<()> {
    let store = open_store()?;
    let draft_path = ctx_core::fork(&store, hash)?;

    println!("{} Forked pack into draft", style("✓").green());
    println!();
    println!("  Draft: {}", draft_path.display());
    println!();
    println!("Edit the draft, then run: ctx finalize {}", draft_path.display());

    Ok(())
}

/// Finalizes a draft into an immutable, registered pack.
pub fn finalize(draft: &str) -> Result<()> {
    let store = open_store()?;
    let pack = ctx_core::finalize_draft(&store, Path::new(draft))?;
    let hash = pack.hash.expect("finalized pack has a hash");

    println!("{} Finalized draft", style("✓").green());
    println!();
    println!("  Hash:   {}", hash.to_ref());
    if let Some(parent) = pack.parent {
        println!("  Parent: {}", parent.short(12));
    }

    Ok(())
}
