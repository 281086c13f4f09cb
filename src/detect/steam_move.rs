//! Steam move detector: several books move a line in the same direction
//! within a short time window, read as sharp action hitting the market.

use anyhow::Result;
use sqlx::SqlitePool;
use std::collections::HashMap;

use crate::config::Config;
use crate::db;
use crate::models::{BookLine, BookMove, Direction, OddsSnapshot, Signal, SignalDetails};
use crate::utils;

use super::{is_us_book, line_delta, round2};

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

    // Current lines for value-book detection.
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
        // Per book: direction of movement first → last in the window.
        let mut moves: Vec<(&str, f64)> = Vec::new();
        for (bm_key, entries) in book_data {
            if entries.len() < 2 {
                continue;
            }
            let first = entries[0];
            let last = entries[entries.len() - 1];
            let delta = line_delta(market_key, first, last);
            if delta != 0.0 {
                moves.push((bm_key.as_str(), delta));
            }
        }

        if moves.len() < config.steam_min_books {
            continue;
        }

        let up: Vec<_> = moves.iter().filter(|m| m.1 > 0.0).copied().collect();
        let down: Vec<_> = moves.iter().filter(|m| m.1 < 0.0).copied().collect();
        let (aligned, direction) = if down.len() > up.len() {
            (down, Direction::Down)
        } else {
            (up, Direction::Up)
        };
        if aligned.len() < config.steam_min_books {
            continue;
        }

        let avg_delta = aligned.iter().map(|m| m.1.abs()).sum::<f64>() / aligned.len() as f64;
        let strength = (aligned.len() as f64 / book_data.len().max(1) as f64).min(1.0);

        let book_details: Vec<BookMove> = aligned
            .iter()
            .map(|(bm_key, delta)| {
                let current =
                    current_lines.get(&(market_key.as_str(), outcome_name.as_str(), *bm_key));
                BookMove {
                    bookmaker: bm_key.to_string(),
                    delta: round2(*delta),
                    price: current.map(|row| row.price),
                    point: current.and_then(|row| row.point),
                }
            })
            .collect();

        // Books that haven't moved yet are still on the stale line.
        let moved: Vec<&str> = aligned.iter().map(|m| m.0).collect();
        let mut value_books: Vec<BookLine> = Vec::new();
        for bm_key in book_data.keys() {
            if moved.contains(&bm_key.as_str()) || !is_us_book(bm_key) {
                continue;
            }
            if let Some(current) =
                current_lines.get(&(market_key.as_str(), outcome_name.as_str(), bm_key.as_str()))
            {
                value_books.push(BookLine {
                    bookmaker: bm_key.clone(),
                    price: current.price,
                    point: current.point,
                });
            }
        }

        signals.push(Signal {
            event_id: event_id.to_string(),
            sport_key: sport_key.clone(),
            home_team: home_team.clone(),
            away_team: away_team.clone(),
            market_key: market_key.clone(),
            outcome_name: outcome_name.clone(),
            strength,
            description: format!(
                "Steam move {direction}: {} books moved {outcome_name} ({market_key}) avg {avg_delta:.1}",
                aligned.len(),
            ),
            details: SignalDetails::SteamMove {
                direction,
                books_moved: aligned.len(),
                avg_delta: round2(avg_delta),
                book_details,
                value_books,
            },
        });
    }

    Ok(signals)
}
