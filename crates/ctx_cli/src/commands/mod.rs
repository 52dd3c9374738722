//! CLI commands.

pub mod diff;
pub mod fork;
pub mod index;
pub mod init;
pub mod metrics;
pub mod optimize;
pub mod pack;
pub mod replay;
pub mod verify;

use anyhow::Result;
use ctx_core::Store;

/// Discovers the store from the current working directory.
pub fn open_store() -> Result<Store> {
    let cwd = std::env::current_dir()?;
    Ok(Store::discover(cwd)?)
}
