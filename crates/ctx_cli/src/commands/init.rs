//! Initialize a new context store.

use anyhow::{Context, Result};
use ctx_core::Store;

/// Creates a `.ctx` store in the current directory.
pub fn run() -> Result<()> {
    let cwd = std::env::current_dir()?;
    let store = Store::init(&cwd).context("Failed to initialize context store")?;

    println!("Initialized context store in {}", store.root().display());
    println!();
    println!("Directory structure:");
    println!("  .ctx/objects/    - Content-addressed blobs");
    println!("  .ctx/packs/      - Pack registry");
    println!("  .ctx/graph/      - Context graph (commits, files, symbols, edges)");
    println!();
    println!("Next: run 'ctx pack <log-file>' to capture an agent run,");
    println!("or 'ctx index' to snapshot the current commit.");

    Ok(())
}
