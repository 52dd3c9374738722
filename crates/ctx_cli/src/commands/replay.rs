//! Replay a captured agent run.

use super::open_store;
use anyhow::Result;

/// Replays a pack and exits with the fidelity code:
/// 0 exact, 1 degraded, 2 failed.
pub fn run(hash: &str, json: bool) -> Result<()> {
    let store = open_store()?;
    let report = ctx_core::replay(&store, hash)?;

    if json {
        println!("{}", report.to_json()?);
    } else {
        print!("{}", report.summary());
    }

    std::process::exit(report.fidelity.exit_code());
}
