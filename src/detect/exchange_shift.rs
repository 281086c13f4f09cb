//! Exchange shift detector: the Betfair exchange moves an h2h implied
//! probability by a significant amount between polls.

use anyhow::Result;
use sqlx::SqlitePool;
use std::collections::HashMap;

use crate::config::Config;
use crate::db;
use crate::models::{ExchangeBookLine, OddsSnapshot, ShiftDirection, Signal, SignalDetails};
use crate::utils::american_to_implied_prob;

use super::{is_us_book, round4, BETFAIR_KEY};

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

    // Previous Betfair rows by (market, outcome).
    let prev_map: HashMap<(&str, &str), &OddsSnapshot> = previous
        .iter()
        .filter(|row| row.bookmaker_key == BETFAIR_KEY)
        .map(|row| ((row.market_key.as_str(), row.outcome_name.as_str()), row))
        .collect();
    if prev_map.is_empty() {
        return Ok(Vec::new());
    }

    // Current US book lines by (market, outcome, bookmaker).
    let us_current: HashMap<(&str, &str, &str), &OddsSnapshot> = latest
        .iter()
        .filter(|row| is_us_book(&row.bookmaker_key))
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
        if row.bookmaker_key != BETFAIR_KEY {
            continue;
        }
        // Exchange data is only reliable for h2h.
        if row.market_key != "h2h" {
            continue;
        }
        let Some(prev) = prev_map.get(&(row.market_key.as_str(), row.outcome_name.as_str()))
        else {
            continue;
        };

        let old_prob = american_to_implied_prob(prev.price);
        let new_prob = american_to_implied_prob(row.price);
        let shift = (new_prob - old_prob).abs();
        if shift < config.exchange_shift_threshold {
            continue;
        }

        let direction = if new_prob > old_prob {
            ShiftDirection::Shortened
        } else {
            ShiftDirection::Drifted
        };
        // 15% probability shift = max strength.
        let strength = (shift / 0.15).min(1.0);

        // US books that haven't adjusted to the exchange move. Shortened means
        // the exchange thinks the side is more likely, so a US book still
        // below the new probability pays out too well; drifted is the mirror.
        let mut value_books: Vec<ExchangeBookLine> = Vec::new();
        for ((mk, on, bm_key), us_row) in &us_current {
            if *mk != row.market_key || *on != row.outcome_name {
                continue;
            }
            let us_prob = american_to_implied_prob(us_row.price);
            let lagging = match direction {
                ShiftDirection::Shortened => us_prob < new_prob,
                ShiftDirection::Drifted => us_prob > new_prob,
            };
            if lagging {
                value_books.push(ExchangeBookLine {
                    bookmaker: bm_key.to_string(),
                    current_line: us_row.price,
                    implied_prob: round4(us_prob),
                });
            }
        }

        signals.push(Signal {
            event_id: event_id.to_string(),
            sport_key: row.sport_key.clone(),
            home_team: row.home_team.clone(),
            away_team: row.away_team.clone(),
            market_key: row.market_key.clone(),
            outcome_name: row.outcome_name.clone(),
            strength,
            description: format!(
                "Exchange shift: {} {direction} on Betfair ({:.1}% -> {:.1}%, shift {:.1}%)",
                row.outcome_name,
                old_prob * 100.0,
                new_prob * 100.0,
                shift * 100.0,
            ),
            details: SignalDetails::ExchangeShift {
                old_price: prev.price,
                new_price: row.price,
                old_implied_prob: round4(old_prob),
                new_implied_prob: round4(new_prob),
                shift: round4(shift),
                direction,
                value_books,
            },
        });
    }

    Ok(signals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testutil::{memory_pool, snap};
    use crate::models::SignalKind;

    #[tokio::test]
    async fn test_exchange_shift_detected() {
        let pool = memory_pool().await;
        let config = Config::for_tests();
        let event = "evt_ex1";
        let t1 = "2025-01-15T12:00:00+00:00";
        let t2 = "2025-01-15T12:20:00+00:00";

        // -150 → ~60% implied, -250 → ~71% implied: ~11% shift
        db::insert_snapshots(
            &pool,
            &[
                snap(event, "betfair_ex_eu", "h2h", "Lakers", -150.0, None, t1),
                snap(event, "betfair_ex_eu", "h2h", "Lakers", -250.0, None, t2),
            ],
        )
        .await
        .unwrap();

        let signals = detect(&config, &pool, event, t2).await.unwrap();
        assert_eq!(signals.len(), 1);
        let sig = &signals[0];
        assert_eq!(sig.kind(), SignalKind::ExchangeShift);
        let SignalDetails::ExchangeShift {
            direction, shift, ..
        } = &sig.details
        else {
            panic!("wrong details variant");
        };
        assert_eq!(*direction, ShiftDirection::Shortened);
        assert!(*shift > 0.05);
    }

    #[tokio::test]
    async fn test_small_shift_ignored() {
        let pool = memory_pool().await;
        let config = Config::for_tests();
        let event = "evt_ex2";
        let t1 = "2025-01-15T12:00:00+00:00";
        let t2 = "2025-01-15T12:20:00+00:00";

        db::insert_snapshots(
            &pool,
            &[
                snap(event, "betfair_ex_eu", "h2h", "Lakers", -150.0, None, t1),
                snap(event, "betfair_ex_eu", "h2h", "Lakers", -155.0, None, t2),
            ],
        )
        .await
        .unwrap();

        let signals = detect(&config, &pool, event, t2).await.unwrap();
        assert!(signals.is_empty());
    }

    #[tokio::test]
    async fn test_non_exchange_books_ignored() {
        let pool = memory_pool().await;
        let config = Config::for_tests();
        let event = "evt_ex3";
        let t1 = "2025-01-15T12:00:00+00:00";
        let t2 = "2025-01-15T12:20:00+00:00";

        db::insert_snapshots(
            &pool,
            &[
                snap(event, "draftkings", "h2h", "Lakers", -150.0, None, t1),
                snap(event, "draftkings", "h2h", "Lakers", -250.0, None, t2),
            ],
        )
        .await
        .unwrap();

        let signals = detect(&config, &pool, event, t2).await.unwrap();
        assert!(signals.is_empty());
    }

    #[tokio::test]
    async fn test_lagging_us_books_listed() {
        let pool = memory_pool().await;
        let config = Config::for_tests();
        let event = "evt_ex4";
        let t1 = "2025-01-15T12:00:00+00:00";
        let t2 = "2025-01-15T12:20:00+00:00";

        db::insert_snapshots(
            &pool,
            &[
                snap(event, "betfair_ex_eu", "h2h", "Lakers", -150.0, None, t1),
                snap(event, "draftkings", "h2h", "Lakers", -150.0, None, t1),
                snap(event, "betfair_ex_eu", "h2h", "Lakers", -250.0, None, t2),
                // Still at -150 (~60% implied) vs the new ~71%: value
                snap(event, "draftkings", "h2h", "Lakers", -150.0, None, t2),
            ],
        )
        .await
        .unwrap();

        let signals = detect(&config, &pool, event, t2).await.unwrap();
        assert_eq!(signals.len(), 1);
        let SignalDetails::ExchangeShift { value_books, .. } = &signals[0].details else {
            panic!("wrong details variant");
        };
        assert_eq!(value_books.len(), 1);
        assert_eq!(value_books[0].bookmaker, "draftkings");
    }

    #[tokio::test]
    async fn test_drifted_direction() {
        let pool = memory_pool().await;
        let config = Config::for_tests();
        let event = "evt_ex5";
        let t1 = "2025-01-15T12:00:00+00:00";
        let t2 = "2025-01-15T12:20:00+00:00";

        db::insert_snapshots(
            &pool,
            &[
                snap(event, "betfair_ex_eu", "h2h", "Lakers", -250.0, None, t1),
                snap(event, "betfair_ex_eu", "h2h", "Lakers", -150.0, None, t2),
            ],
        )
        .await
        .unwrap();

        let signals = detect(&config, &pool, event, t2).await.unwrap();
        assert_eq!(signals.len(), 1);
        let SignalDetails::ExchangeShift { direction, .. } = &signals[0].details else {
            panic!("wrong details variant");
        };
        assert_eq!(*direction, ShiftDirection::Drifted);
    }
}
