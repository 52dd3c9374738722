//! Token savings dashboard.

use super::open_store;
use anyhow::Result;

pub fn run(limit: usize) -> Result<()> {
    let store = open_store()?;
    let metrics = ctx_core::get_metrics(&store, limit)?;
    let roi = ctx_core::compute_roi(&metrics);
    print!("{}", ctx_core::format_metrics(&metrics, &roi));
    Ok(())
}
