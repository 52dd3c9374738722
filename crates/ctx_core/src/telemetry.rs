//! Telemetry: per-run token metrics and ROI aggregation.

use crate::error::Result;
use crate::graph::{self, FileSnapshot};
use crate::hash::hex128;
use crate::jsonl;
use crate::store::Store;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::PathBuf;

/// A single agent execution run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Run {
    pub run_id: String,
    pub repo: String,
    pub base_commit: String,
    pub head_commit: String,
    pub agent: String,
    pub task_hash: String,
    pub status: String,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// Token usage and performance data for a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunMetrics {
    pub run_id: String,
    pub baseline_est_tokens: i64,
    pub delta_tokens: i64,
    pub tokens_saved: i64,
    pub savings_pct: f64,
    pub cache_hit_rate: f64,
    pub files_invalidated: i64,
    pub symbols_invalidated: i64,
    pub latency_ms: i64,
}

/// Aggregate ROI over a set of runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoiSummary {
    pub total_runs: usize,
    pub total_baseline_tokens: i64,
    pub total_delta_tokens: i64,
    pub total_tokens_saved: i64,
    pub avg_savings_pct: f64,
    pub avg_cache_hit_rate: f64,
    pub avg_latency_ms: f64,
    pub best_savings_pct: f64,
    pub worst_savings_pct: f64,
}

/// Run and metrics stored as one flattened record per line.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RunRecord {
    #[serde(flatten)]
    run: Run,
    #[serde(flatten)]
    metrics: RunMetrics,
}

fn runs_path(store: &Store) -> PathBuf {
    store.root().join("telemetry").join("runs.jsonl")
}

/// Records a run and its metrics, deriving the run id and savings fields
/// when absent.
pub fn record_run(store: &Store, run: Run, metrics: RunMetrics) -> Result<String> {
    let mut run = run;
    let mut metrics = metrics;

    if run.run_id.is_empty() {
        run.run_id = generate_run_id(&run);
    }
    metrics.run_id = run.run_id.clone();

    if metrics.baseline_est_tokens > 0 && metrics.delta_tokens > 0 {
        metrics.tokens_saved = (metrics.baseline_est_tokens - metrics.delta_tokens).max(0);
        metrics.savings_pct =
            metrics.tokens_saved as f64 / metrics.baseline_est_tokens as f64 * 100.0;
    }

    let run_id = run.run_id.clone();
    jsonl::append_record(&runs_path(store), &RunRecord { run, metrics })?;
    Ok(run_id)
}

/// Most recent `limit` run metrics, newest first. A zero limit means all.
pub fn get_metrics(store: &Store, limit: usize) -> Result<Vec<RunMetrics>> {
    Ok(read_sorted(store, limit)?
        .into_iter()
        .map(|r| r.metrics)
        .collect())
}

/// Most recent `limit` runs, newest first. A zero limit means all.
pub fn get_runs(store: &Store, limit: usize) -> Result<Vec<Run>> {
    Ok(read_sorted(store, limit)?
        .into_iter()
        .map(|r| r.run)
        .collect())
}

fn read_sorted(store: &Store, limit: usize) -> Result<Vec<RunRecord>> {
    let mut records: Vec<RunRecord> = jsonl::read_records(&runs_path(store))?;
    records.sort_by(|a, b| b.run.ended_at.cmp(&a.run.ended_at));
    if limit > 0 {
        records.truncate(limit);
    }
    Ok(records)
}

/// Aggregates totals, averages, and best/worst savings over run metrics.
pub fn compute_roi(metrics: &[RunMetrics]) -> RoiSummary {
    if metrics.is_empty() {
        return RoiSummary::default();
    }

    let mut summary = RoiSummary {
        total_runs: metrics.len(),
        best_savings_pct: f64::MIN,
        worst_savings_pct: f64::MAX,
        ..Default::default()
    };

    let mut total_savings_pct = 0.0;
    let mut total_cache_hit_rate = 0.0;
    let mut total_latency = 0.0;

    for m in metrics {
        summary.total_baseline_tokens += m.baseline_est_tokens;
        summary.total_delta_tokens += m.delta_tokens;
        summary.total_tokens_saved += m.tokens_saved;

        total_savings_pct += m.savings_pct;
        total_cache_hit_rate += m.cache_hit_rate;
        total_latency += m.latency_ms as f64;

        summary.best_savings_pct = summary.best_savings_pct.max(m.savings_pct);
        summary.worst_savings_pct = summary.worst_savings_pct.min(m.savings_pct);
    }

    let n = metrics.len() as f64;
    summary.avg_savings_pct = total_savings_pct / n;
    summary.avg_cache_hit_rate = total_cache_hit_rate / n;
    summary.avg_latency_ms = total_latency / n;

    summary
}

/// Estimates the token cost of a cold run over an indexed commit:
/// 0.25 tokens per byte over non-binary, non-generated files.
pub fn estimate_baseline(store: &Store, commit_sha: &str) -> Result<i64> {
    let files: Vec<FileSnapshot> =
        jsonl::read_records(&graph::files_path(store.root(), commit_sha))?;

    Ok(files
        .iter()
        .filter(|f| !f.is_binary && !f.is_generated)
        .map(|f| (f.byte_size as f64 * 0.25) as i64)
        .sum())
}

/// Human-readable metrics dashboard.
pub fn format_metrics(metrics: &[RunMetrics], roi: &RoiSummary) -> String {
    let mut out = String::new();

    writeln!(out, "Token Optimization Metrics").unwrap();
    writeln!(out, "═══════════════════════════════════════\n").unwrap();

    if roi.total_runs == 0 {
        writeln!(out, "No runs recorded yet.").unwrap();
        return out;
    }

    writeln!(out, "Summary ({} runs):", roi.total_runs).unwrap();
    writeln!(out, "  Total baseline tokens:  {}", roi.total_baseline_tokens).unwrap();
    writeln!(out, "  Total delta tokens:     {}", roi.total_delta_tokens).unwrap();
    writeln!(out, "  Total tokens saved:     {}", roi.total_tokens_saved).unwrap();
    writeln!(out, "  Avg savings:            {:.1}%", roi.avg_savings_pct).unwrap();
    writeln!(out, "  Best savings:           {:.1}%", roi.best_savings_pct).unwrap();
    writeln!(out, "  Worst savings:          {:.1}%", roi.worst_savings_pct).unwrap();
    writeln!(out, "  Avg cache hit rate:     {:.1}%", roi.avg_cache_hit_rate * 100.0).unwrap();
    writeln!(out, "  Avg latency:            {:.0} ms", roi.avg_latency_ms).unwrap();

    if !metrics.is_empty() {
        writeln!(out, "\nRecent runs:").unwrap();
        writeln!(
            out,
            "  {:<16}  {:>8}  {:>8}  {:>8}  {:>6}",
            "Run ID", "Baseline", "Delta", "Saved", "Pct"
        )
        .unwrap();
        for m in metrics.iter().take(10) {
            let short_id: String = m.run_id.chars().take(16).collect();
            writeln!(
                out,
                "  {:<16}  {:>8}  {:>8}  {:>8}  {:>5.1}%",
                short_id, m.baseline_est_tokens, m.delta_tokens, m.tokens_saved, m.savings_pct
            )
            .unwrap();
        }
    }

    out
}

/// Run identity: 64-bit prefix of
/// `sha256(repo:head:task_hash:started_nanos)`, 16 hex chars.
fn generate_run_id(run: &Run) -> String {
    let nanos = run
        .started_at
        .and_then(|t| t.timestamp_nanos_opt())
        .unwrap_or(0);
    let seed = format!(
        "{}:{}:{}:{}",
        run.repo, run.head_commit, run.task_hash, nanos
    );
    hex128(&seed)[..16].to_string()
}
