//! Rapid change detector: a single book moves a line by a large amount
//! between consecutive polls.

use anyhow::Result;
use sqlx::SqlitePool;
use std::collections::HashMap;

use crate::config::Config;
use crate::db;
use crate::models::{BookLine, OddsSnapshot, Signal, SignalDetails};
use crate::utils;

use super::{is_us_book, round2};

pub async fn detect(
    config: &Config,
    pool: &SqlitePool,
    event_id: &str,
    fetched_at: &str,
) -> Result<Vec<Signal>> {
    let latest = db::get_latest_snapshots(pool, event_id).await?;
    let previous = db::get_previous_snapshots(pool, event_id, fetched_at).await?;
    if latest.is_empty() || previous.is_empty() {
        return Ok(Vec::new());
    }

    let prev_map: HashMap<(&str, &str, &str), &OddsSnapshot> = previous
        .iter()
        .map(|row| {
            (
                (
                    row.bookmaker_key.as_str(),
                    row.market_key.as_str(),
                    row.outcome_name.as_str(),
                ),
                row,
            )
        })
        .collect();

    let current_lines: HashMap<(&str, &str, &str), &OddsSnapshot> = latest
        .iter()
        .map(|row| {
            (
                (
                    row.market_key.as_str(),
                    row.outcome_name.as_str(),
                    row.bookmaker_key.as_str(),
                ),
                row,
            )
        })
        .collect();

    let mut signals = Vec::new();

    for row in &latest {
        let Some(prev) = prev_map.get(&(
            row.bookmaker_key.as_str(),
            row.market_key.as_str(),
            row.outcome_name.as_str(),
        )) else {
            continue;
        };

        let market_key = row.market_key.as_str();
        let (delta, threshold, new_val, old_val) = if market_key == "h2h" {
            (
                (row.price - prev.price).abs(),
                config.rapid_ml_threshold,
                row.price,
                prev.price,
            )
        } else {
            match (row.point, prev.point) {
                (Some(new_pt), Some(old_pt)) => (
                    (new_pt - old_pt).abs(),
                    config.rapid_spread_threshold,
                    new_pt,
                    old_pt,
                ),
                _ => continue,
            }
        };

        if delta < threshold {
            continue;
        }

        let strength = (delta / (threshold * 3.0)).min(1.0);

        // Stale books (closer to the old line than the new) plus the mover.
        let mut value_books: Vec<BookLine> = Vec::new();
        for ((mk, on, other_bm), other_row) in &current_lines {
            if *mk != market_key || *on != row.outcome_name || !is_us_book(other_bm) {
                continue;
            }
            if *other_bm == row.bookmaker_key {
                value_books.push(BookLine {
                    bookmaker: other_bm.to_string(),
                    price: other_row.price,
                    point: other_row.point,
                });
                continue;
            }
            let other_val = if market_key == "h2h" {
                other_row.price
            } else {
                match other_row.point {
                    Some(pt) => pt,
                    None => continue,
                }
            };
            if (other_val - old_val).abs() < (other_val - new_val).abs() {
                value_books.push(BookLine {
                    bookmaker: other_bm.to_string(),
                    price: other_row.price,
                    point: other_row.point,
                });
            }
        }

        // Best line for the bettor first, so the recommendation leads.
        value_books.sort_by(|a, b| {
            let key_a =
                utils::favorability_key(market_key, &row.outcome_name, Some(a.price), a.point);
            let key_b =
                utils::favorability_key(market_key, &row.outcome_name, Some(b.price), b.point);
            key_b
                .partial_cmp(&key_a)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        signals.push(Signal {
            event_id: event_id.to_string(),
            sport_key: row.sport_key.clone(),
            home_team: row.home_team.clone(),
            away_team: row.away_team.clone(),
            market_key: row.market_key.clone(),
            outcome_name: row.outcome_name.clone(),
            strength,
            description: format!(
                "Rapid change at {}: {} ({market_key}) delta {delta:.1}",
                row.bookmaker_key, row.outcome_name,
            ),
            details: SignalDetails::RapidChange {
                bookmaker: row.bookmaker_key.clone(),
                old_price: prev.price,
                new_price: row.price,
                old_point: prev.point,
                new_point: row.point,
                delta: round2(delta),
                value_books,
            },
        });
    }

    Ok(signals)
}
