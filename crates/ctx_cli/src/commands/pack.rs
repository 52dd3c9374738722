//! Pack creation, inspection, and listing.

use super::open_store;
use anyhow::{Context, Result};
use console::style;
use ctx_core::ExecutionLog;
use std::path::Path;

/// Creates a pack from an execution log file and registers it.
pub fn create(log_file: &str) -> Result<()> {
    let store = open_store()?;

    let log = ExecutionLog::from_file(Path::new(log_file))
        .with_context(|| format!("Failed to parse execution log {}", log_file))?;

    let pack = ctx_core::create_pack(&store, &log)?;
    let hash = pack.hash.expect("created pack has a hash");
    ctx_core::register_pack(&store, hash)?;

    println!("{} Created context pack", style("✓").green());
    println!();
    println!("  Hash:  {}", hash.to_ref());
    println!("  Short: {}", hash.short(12));
    println!("  Steps: {}", pack.steps.len());
    println!();
    println!("Inspect with: ctx show {}", hash.short(12));

    Ok(())
}

/// Prints a pack summary.
pub fn show(hash: &str) -> Result<()> {
    let store = open_store()?;
    let pack = ctx_core::load_pack(&store, hash)?;
    print!("{}", ctx_core::format_pack(&pack));
    Ok(())
}

/// Lists registered packs, newest first.
pub fn list(limit: usize) -> Result<()> {
    let store = open_store()?;
    let summaries = ctx_core::list_packs(&store, limit)?;
    print!("{}", ctx_core::format_pack_list(&summaries));
    Ok(())
}
