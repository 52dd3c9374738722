//! Compare two context packs.

use super::open_store;
use anyhow::Result;

/// Prints a drift report for two packs.
pub fn run(hash_a: &str, hash_b: &str, json: bool) -> Result<()> {
    let store = open_store()?;
    let report = ctx_core::diff(&store, hash_a, hash_b)?;

    if json {
        println!("{}", report.to_json()?);
    } else {
        print!("{}", report.human());
    }

    Ok(())
}
