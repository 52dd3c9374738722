//! Index commits into the context graph and show deltas.

use super::open_store;
use anyhow::{bail, Context, Result};
use console::style;
use ctx_core::GitRepo;
use indicatif::{ProgressBar, ProgressStyle};

/// Indexes one commit (default HEAD) or a `base..head` range.
pub fn run(commit: Option<&str>, range: Option<&str>) -> Result<()> {
    let store = open_store()?;
    let cwd = std::env::current_dir()?;
    let repo = GitRepo::discover(&cwd).context("Not inside a git repository")?;

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    spinner.enable_steady_tick(std::time::Duration::from_millis(100));

    if let Some(range) = range {
        let Some((base, head)) = range.split_once("..") else {
            bail!("range must be of the form base..head");
        };
        spinner.set_message(format!("Indexing {}..{}", base, head));
        let count = ctx_core::index_range(&store, &repo, base, head)?;
        spinner.finish_and_clear();
        println!("{} Indexed {} commit(s)", style("✓").green(), count);
        return Ok(());
    }

    let sha = match commit {
        Some(sha) => sha.to_string(),
        None => repo.head_sha()?,
    };
    spinner.set_message(format!("Indexing {}", &sha[..sha.len().min(8)]));
    ctx_core::index_commit(&store, &repo, &sha)?;
    spinner.finish_and_clear();

    println!(
        "{} Indexed commit {}",
        style("✓").green(),
        &sha[..sha.len().min(8)]
    );
    Ok(())
}

/// Prints the delta between two indexed commits.
pub fn delta(base: &str, head: &str, json: bool) -> Result<()> {
    let store = open_store()?;
    let report = ctx_core::compute_delta(&store, base, head)?;

    if json {
        println!("{}", report.to_json()?);
    } else {
        print!("{}", report.human());
    }

    Ok(())
}
