//! Reverse line movement detector: US consensus moves one way while the
//! sharp reference book moves the other. Contrarian signal: follow the
//! sharp side.

use anyhow::Result;
use sqlx::SqlitePool;
use std::collections::HashMap;

use crate::config::Config;
use crate::db;
use crate::models::{BookLine, Direction, OddsSnapshot, Signal, SignalDetails};
use crate::utils;

use super::{is_us_book, line_delta, round2, PINNACLE_KEY};

pub async fn detect(
    config: &Config,
    pool: &SqlitePool,
    event_id: &str,
    fetched_at: &str,
) -> Result<Vec<Signal>> {
    let window_start = utils::minutes_before(fetched_at, config.steam_window_minutes)?;
    let snapshots = db::get_snapshots_since(pool, event_id, &window_start).await?;
    if snapshots.is_empty() {
        return Ok(Vec::new());
    }

    let (sport_key, home_team, away_team) = (
        snapshots[0].sport_key.clone(),
        snapshots[0].home_team.clone(),
        snapshots[0].away_team.clone(),
    );

    // (market, outcome) -> bookmaker -> rows in window, ascending by fetched_at
    let mut grouped: HashMap<(String, String), HashMap<String, Vec<&OddsSnapshot>>> =
        HashMap::new();
    for snap in &snapshots {
        grouped
            .entry((snap.market_key.clone(), snap.outcome_name.clone()))
            .or_default()
            .entry(snap.bookmaker_key.clone())
            .or_default()
            .push(snap);
    }

    let latest = db::get_latest_snapshots(pool, event_id).await?;
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

    for ((market_key, outcome_name), book_data) in &grouped {
        let Some(pin_entries) = book_data.get(PINNACLE_KEY) else {
            continue;
        };
        if pin_entries.len() < 2 {
            continue;
        }
        let pin_delta = line_delta(market_key, pin_entries[0], pin_entries[pin_entries.len() - 1]);
        if pin_delta == 0.0 {
            continue;
        }

        // US consensus: average delta across US books that moved.
        let mut us_deltas: Vec<f64> = Vec::new();
        let mut us_movers: Vec<String> = Vec::new();
        for (bm_key, entries) in book_data {
            if !is_us_book(bm_key) || entries.len() < 2 {
                continue;
            }
            let delta = line_delta(market_key, entries[0], entries[entries.len() - 1]);
            if delta != 0.0 {
                us_deltas.push(delta);
                us_movers.push(bm_key.clone());
            }
        }
        if us_deltas.len() < 2 {
            continue;
        }

        let us_avg = us_deltas.iter().sum::<f64>() / us_deltas.len() as f64;
        if us_avg.signum() == pin_delta.signum() || us_avg == 0.0 {
            continue;
        }

        let us_direction = Direction::from_delta(us_avg);
        let pinnacle_direction = Direction::from_delta(pin_delta);
        let strength = ((us_avg.abs() + pin_delta.abs()) / 4.0).min(1.0);

        // US books moved the wrong way; their lines carry the value when
        // betting in the sharp direction.
        let value_books: Vec<BookLine> = us_movers
            .iter()
            .filter_map(|bm_key| {
                current_lines
                    .get(&(market_key.as_str(), outcome_name.as_str(), bm_key.as_str()))
                    .map(|row| BookLine {
                        bookmaker: bm_key.clone(),
                        price: row.price,
                        point: row.point,
                    })
            })
            .collect();

        signals.push(Signal {
            event_id: event_id.to_string(),
            sport_key: sport_key.clone(),
            home_team: home_team.clone(),
            away_team: away_team.clone(),
            market_key: market_key.clone(),
            outcome_name: outcome_name.clone(),
            strength,
            description: format!(
                "Reverse line movement: US consensus moved {us_direction} (avg {us_avg:+.2}) \
                 but Pinnacle moved {pinnacle_direction} ({pin_delta:+.2}) \
                 on {outcome_name} ({market_key})"
            ),
            details: SignalDetails::ReverseLine {
                us_direction,
                us_avg_delta: round2(us_avg),
                us_movers,
                pinnacle_direction,
                pinnacle_delta: round2(pin_delta),
                bet_direction: pinnacle_direction,
                value_books,
            },
        });
    }

    Ok(signals)
}
