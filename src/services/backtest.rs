//! Backtesting: replay stored snapshots through the detection pipeline for
//! every fetch cycle in a date range.

use anyhow::Result;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::fmt::Write as _;

use crate::config::Config;
use crate::db;
use crate::detect::pipeline;
use crate::models::Signal;

#[derive(Debug, Default)]
pub struct BacktestResult {
    pub start: String,
    pub end: String,
    pub fetch_cycles: usize,
    pub total_signals: usize,
    pub signals_by_type: HashMap<String, usize>,
    pub signals_by_sport: HashMap<String, usize>,
    pub all_signals: Vec<Signal>,
}

impl BacktestResult {
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Backtest: {} -> {}", self.start, self.end);
        let _ = writeln!(out, "  Fetch cycles: {}", self.fetch_cycles);
        let _ = writeln!(out, "  Total signals: {}", self.total_signals);

        let _ = writeln!(out, "\n  By type:");
        for (signal_type, count) in sorted_desc(&self.signals_by_type) {
            let _ = writeln!(out, "    {signal_type}: {count}");
        }

        let _ = writeln!(out, "\n  By sport:");
        for (sport, count) in sorted_desc(&self.signals_by_sport) {
            let _ = writeln!(out, "    {sport}: {count}");
        }
        out
    }
}

fn sorted_desc(map: &HashMap<String, usize>) -> Vec<(&String, usize)> {
    let mut entries: Vec<(&String, usize)> = map.iter().map(|(k, v)| (k, *v)).collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
    entries
}

/// Replay every stored fetch cycle in `[start, end)` through the pipeline.
pub async fn run(
    config: &Config,
    pool: &SqlitePool,
    start: &str,
    end: &str,
) -> Result<BacktestResult> {
    let fetch_times = db::get_distinct_fetch_times(pool, start, end).await?;
    tracing::info!(start, end, cycles = fetch_times.len(), "backtest start");

    let mut result = BacktestResult {
        start: start.to_string(),
        end: end.to_string(),
        fetch_cycles: fetch_times.len(),
        ..Default::default()
    };

    for fetched_at in &fetch_times {
        let signals = pipeline::run(config, pool, fetched_at).await?;
        result.total_signals += signals.len();
        for sig in signals {
            *result
                .signals_by_type
                .entry(sig.kind().as_str().to_string())
                .or_default() += 1;
            *result
                .signals_by_sport
                .entry(sig.sport_key.clone())
                .or_default() += 1;
            result.all_signals.push(sig);
        }
    }

    tracing::info!(
        cycles = result.fetch_cycles,
        signals = result.total_signals,
        "backtest complete"
    );
    Ok(result)
}
