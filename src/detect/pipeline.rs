//! Detection pipeline: fans every detector across the events of a fetch
//! cycle, then filters by strength, collapses mirror sides, and drops
//! signals still inside the alert cooldown.

use anyhow::Result;
use sqlx::SqlitePool;
use std::collections::HashMap;

use crate::config::Config;
use crate::db;
use crate::models::{Direction, ShiftDirection, Signal, SignalDetails, SignalKind};

use super::Detector;

/// Run detection over every event present in the store at `fetched_at`.
/// This is the backtest/replay entry; live polling passes the sub-sampled
/// event list to [`run_for_events`].
pub async fn run(config: &Config, pool: &SqlitePool, fetched_at: &str) -> Result<Vec<Signal>> {
    let event_ids = db::get_distinct_event_ids_at(pool, fetched_at).await?;
    run_for_events(config, pool, fetched_at, &event_ids).await
}

pub async fn run_for_events(
    config: &Config,
    pool: &SqlitePool,
    fetched_at: &str,
    event_ids: &[String],
) -> Result<Vec<Signal>> {
    tracing::info!(event_count = event_ids.len(), "pipeline start");

    let mut all_signals: Vec<Signal> = Vec::new();
    for event_id in event_ids {
        for detector in Detector::ALL {
            match detector.detect(config, pool, event_id, fetched_at).await {
                Ok(signals) => all_signals.extend(signals),
                Err(error) => {
                    // One failing detector must not silence the others.
                    tracing::error!(
                        detector = detector.name(),
                        event_id = %event_id,
                        %error,
                        "detector error"
                    );
                }
            }
        }
    }

    let total = all_signals.len();
    let strong: Vec<Signal> = all_signals
        .into_iter()
        .filter(|sig| sig.strength >= config.min_signal_strength)
        .collect();
    tracing::info!(
        before = total,
        after = strong.len(),
        min_strength = config.min_signal_strength,
        "strength filter"
    );

    let collapsed = collapse_mirrors(strong);

    // Cooldown dedup: the exact outcome, or any outcome of the same market
    // (the mirror side), alerted within the window.
    let mut fresh: Vec<Signal> = Vec::new();
    for sig in collapsed {
        let kind = sig.kind();
        let exact = db::was_alert_sent_recently(
            pool,
            &sig.event_id,
            kind.as_str(),
            &sig.market_key,
            &sig.outcome_name,
            config.alert_cooldown_minutes,
        )
        .await?;
        let mirror = db::was_market_alerted_recently(
            pool,
            &sig.event_id,
            kind.as_str(),
            &sig.market_key,
            config.alert_cooldown_minutes,
        )
        .await?;
        if exact || mirror {
            tracing::debug!(signal_type = kind.as_str(), event_id = %sig.event_id, "signal deduped");
            continue;
        }
        tracing::info!(
            signal_type = kind.as_str(),
            event_id = %sig.event_id,
            strength = sig.strength,
            %sig.description,
            "signal detected"
        );
        fresh.push(sig);
    }

    tracing::info!(
        total_signals = total,
        new_signals = fresh.len(),
        "pipeline complete"
    );
    Ok(fresh)
}

/// Collapse both sides of a two-sided market to the actionable one: group by
/// (event, type, market) and keep a single signal per group.
fn collapse_mirrors(signals: Vec<Signal>) -> Vec<Signal> {
    let mut order: Vec<(String, SignalKind, String)> = Vec::new();
    let mut groups: HashMap<(String, SignalKind, String), Vec<Signal>> = HashMap::new();
    for sig in signals {
        let key = (sig.event_id.clone(), sig.kind(), sig.market_key.clone());
        let group = groups.entry(key.clone()).or_default();
        if group.is_empty() {
            order.push(key);
        }
        group.push(sig);
    }

    order
        .into_iter()
        .filter_map(|key| groups.remove(&key).map(pick_best_signal))
        .collect()
}

/// Choose the actionable side of a group of same-market signals. Total: always
/// returns a member of the (non-empty) input.
pub(crate) fn pick_best_signal(mut group: Vec<Signal>) -> Signal {
    if group.len() == 1 {
        return group.remove(0);
    }

    let preferred = match group[0].kind() {
        // Follow the sharp book up.
        SignalKind::ReverseLine => group.iter().position(|sig| {
            matches!(
                sig.details,
                SignalDetails::ReverseLine { pinnacle_delta, .. } if pinnacle_delta > 0.0
            )
        }),
        SignalKind::SteamMove => {
            if group[0].market_key == "totals" {
                // Over on a rising total, Under on a falling one.
                group.iter().position(|sig| {
                    let SignalDetails::SteamMove { direction, .. } = &sig.details else {
                        return false;
                    };
                    match direction {
                        Direction::Up => sig.outcome_name.eq_ignore_ascii_case("over"),
                        Direction::Down => sig.outcome_name.eq_ignore_ascii_case("under"),
                    }
                })
            } else {
                // The side being bet into is the one whose number worsens.
                group.iter().position(|sig| {
                    matches!(
                        sig.details,
                        SignalDetails::SteamMove {
                            direction: Direction::Down,
                            ..
                        }
                    )
                })
            }
        }
        SignalKind::ExchangeShift => group.iter().position(|sig| {
            matches!(
                sig.details,
                SignalDetails::ExchangeShift {
                    direction: ShiftDirection::Shortened,
                    ..
                }
            )
        }),
        SignalKind::RapidChange => group
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| {
                rapid_delta(a)
                    .abs()
                    .partial_cmp(&rapid_delta(b).abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(idx, _)| idx),
        SignalKind::PinnacleDivergence => None,
    };

    let idx = preferred.unwrap_or_else(|| fallback_index(&group));
    group.swap_remove(idx)
}

fn rapid_delta(sig: &Signal) -> f64 {
    match sig.details {
        SignalDetails::RapidChange { delta, .. } => delta,
        _ => 0.0,
    }
}

/// Most value books, tiebreak on strength.
fn fallback_index(group: &[Signal]) -> usize {
    group
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| {
            a.details
                .value_book_count()
                .cmp(&b.details.value_book_count())
                .then(
                    a.strength
                        .partial_cmp(&b.strength)
                        .unwrap_or(std::cmp::Ordering::Equal),
                )
        })
        .map(|(idx, _)| idx)
        .unwrap_or(0)
}
