//! Signal performance tracking: persist detected signals for later grading
//! and roll up win/loss/push outcomes.

use anyhow::Result;
use sqlx::SqlitePool;
use std::collections::HashMap;

use crate::db;
use crate::models::{OutcomeCounts, Signal};

/// Record one signal with the cycle's shared timestamp; result stays null
/// until the grader resolves it.
pub async fn record_signal(pool: &SqlitePool, sig: &Signal, fetched_at: &str) -> Result<()> {
    db::record_signal_result(
        pool,
        &sig.event_id,
        sig.kind().as_str(),
        &sig.market_key,
        &sig.outcome_name,
        &sig.direction_label(),
        sig.strength,
        fetched_at,
        Some(&sig.details_json()),
    )
    .await
}

pub async fn record_signals(pool: &SqlitePool, signals: &[Signal], fetched_at: &str) -> Result<()> {
    for sig in signals {
        record_signal(pool, sig, fetched_at).await?;
    }
    Ok(())
}

pub async fn get_stats(
    pool: &SqlitePool,
    since: Option<&str>,
) -> Result<HashMap<String, OutcomeCounts>> {
    db::get_performance_stats(pool, since).await
}

/// Win rate per signal type over decided (non-push) signals.
pub fn win_rates(stats: &HashMap<String, OutcomeCounts>) -> HashMap<String, f64> {
    stats
        .iter()
        .map(|(signal_type, counts)| (signal_type.clone(), counts.win_rate().unwrap_or(0.0)))
        .collect()
}
