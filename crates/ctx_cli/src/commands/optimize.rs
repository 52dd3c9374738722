//! Generate an optimized context pack for a task.

use super::open_store;
use anyhow::{bail, Context, Result};
use ctx_core::{GitRepo, PackRequest};

pub fn run(
    task: &str,
    commit: Option<&str>,
    budget: i64,
    include_tests: bool,
    json: bool,
) -> Result<()> {
    if task.trim().is_empty() {
        bail!("task must not be empty");
    }

    let store = open_store()?;
    let cwd = std::env::current_dir()?;
    let repo = GitRepo::discover(&cwd).context("Not inside a git repository")?;

    let request = PackRequest {
        commit: commit.unwrap_or_default().to_string(),
        task: task.to_string(),
        token_cap: budget,
        include_tests,
    };
    let pack = ctx_core::generate_pack(&store, &repo, &request)?;

    if json {
        println!("{}", pack.to_json()?);
    } else {
        print!("{}", pack.human());
    }

    Ok(())
}
