//! Pinnacle divergence detector: a US book offering measurably better value
//! than the sharp reference line.

use anyhow::Result;
use sqlx::SqlitePool;
use std::collections::HashMap;

use crate::config::Config;
use crate::db;
use crate::models::{OddsSnapshot, Signal, SignalDetails};
use crate::utils::{american_to_implied_prob, us_has_better_value};

use super::{is_us_book, round2, round4, PINNACLE_KEY};

pub async fn detect(
    config: &Config,
    pool: &SqlitePool,
    event_id: &str,
    _fetched_at: &str,
) -> Result<Vec<Signal>> {
    let latest = db::get_latest_snapshots(pool, event_id).await?;
    if latest.is_empty() {
        return Ok(Vec::new());
    }

    // (market, outcome) -> bookmaker -> row
    let mut by_market: HashMap<(&str, &str), HashMap<&str, &OddsSnapshot>> = HashMap::new();
    for row in &latest {
        by_market
            .entry((row.market_key.as_str(), row.outcome_name.as_str()))
            .or_default()
            .insert(row.bookmaker_key.as_str(), row);
    }

    let mut signals = Vec::new();

    for ((market_key, outcome_name), books) in &by_market {
        let Some(pinnacle) = books.get(PINNACLE_KEY) else {
            continue;
        };

        for (bm_key, row) in books {
            if !is_us_book(bm_key) {
                continue;
            }

            let (us_val, pin_val, delta, threshold, probs) = if *market_key == "h2h" {
                let us_prob = american_to_implied_prob(row.price);
                let pin_prob = american_to_implied_prob(pinnacle.price);
                (
                    row.price,
                    pinnacle.price,
                    (us_prob - pin_prob).abs(),
                    config.pinnacle_ml_prob_threshold,
                    Some((us_prob, pin_prob)),
                )
            } else {
                match (row.point, pinnacle.point) {
                    (Some(us_pt), Some(pin_pt)) => (
                        us_pt,
                        pin_pt,
                        (us_pt - pin_pt).abs(),
                        config.pinnacle_spread_threshold,
                        None,
                    ),
                    _ => continue,
                }
            };

            if delta < threshold {
                continue;
            }
            // Only alert when the US book beats the sharp line for the bettor.
            if !us_has_better_value(market_key, outcome_name, us_val, pin_val) {
                continue;
            }

            let strength = (delta / (threshold * 3.0)).min(1.0);
            let description = if *market_key == "h2h" {
                format!(
                    "Value at {bm_key}: {outcome_name} {market_key} better than Pinnacle (delta {delta:.4})"
                )
            } else {
                format!(
                    "Value at {bm_key}: {outcome_name} {market_key} better than Pinnacle (delta {delta:.1})"
                )
            };

            signals.push(Signal {
                event_id: event_id.to_string(),
                sport_key: row.sport_key.clone(),
                home_team: row.home_team.clone(),
                away_team: row.away_team.clone(),
                market_key: market_key.to_string(),
                outcome_name: outcome_name.to_string(),
                strength,
                description,
                details: SignalDetails::PinnacleDivergence {
                    us_book: bm_key.to_string(),
                    us_value: us_val,
                    pinnacle_value: pin_val,
                    delta: if *market_key == "h2h" {
                        round4(delta)
                    } else {
                        round2(delta)
                    },
                    us_implied_prob: probs.map(|(us, _)| round4(us)),
                    pinnacle_implied_prob: probs.map(|(_, pin)| round4(pin)),
                },
            });
        }
    }

    Ok(signals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testutil::{memory_pool, snap};
    use crate::models::SignalKind;

    #[tokio::test]
    async fn test_spread_value_detected() {
        let pool = memory_pool().await;
        let config = Config::for_tests();
        let event = "evt_pin1";
        let t = "2025-01-15T12:00:00+00:00";

        // DK has -1.5 (better for bettor) vs Pinnacle -3.0
        db::insert_snapshots(
            &pool,
            &[
                snap(event, "pinnacle", "spreads", "Lakers", -110.0, Some(-3.0), t),
                snap(event, "draftkings", "spreads", "Lakers", -110.0, Some(-1.5), t),
                snap(event, "fanduel", "spreads", "Lakers", -110.0, Some(-3.0), t),
            ],
        )
        .await
        .unwrap();

        let signals = detect(&config, &pool, event, t).await.unwrap();
        assert_eq!(signals.len(), 1);
        let sig = &signals[0];
        assert_eq!(sig.kind(), SignalKind::PinnacleDivergence);
        let SignalDetails::PinnacleDivergence { us_book, delta, .. } = &sig.details else {
            panic!("wrong details variant");
        };
        assert_eq!(us_book, "draftkings");
        assert_eq!(*delta, 1.5);
        assert!((sig.strength - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_no_signal_when_pinnacle_better() {
        let pool = memory_pool().await;
        let config = Config::for_tests();
        let event = "evt_pin2";
        let t = "2025-01-15T12:00:00+00:00";

        // DK has -4.5 (worse for bettor) vs Pinnacle -3.0
        db::insert_snapshots(
            &pool,
            &[
                snap(event, "pinnacle", "spreads", "Lakers", -110.0, Some(-3.0), t),
                snap(event, "draftkings", "spreads", "Lakers", -110.0, Some(-4.5), t),
            ],
        )
        .await
        .unwrap();

        let signals = detect(&config, &pool, event, t).await.unwrap();
        assert!(signals.is_empty());
    }

    #[tokio::test]
    async fn test_moneyline_value_detected() {
        let pool = memory_pool().await;
        let config = Config::for_tests();
        let event = "evt_pin3";
        let t = "2025-01-15T12:00:00+00:00";

        // Pinnacle -150 (0.6000 implied) vs BetMGM -110 (0.5238): delta 0.0762
        db::insert_snapshots(
            &pool,
            &[
                snap(event, "pinnacle", "h2h", "Lakers", -150.0, None, t),
                snap(event, "betmgm", "h2h", "Lakers", -110.0, None, t),
            ],
        )
        .await
        .unwrap();

        let signals = detect(&config, &pool, event, t).await.unwrap();
        assert_eq!(signals.len(), 1);
        let SignalDetails::PinnacleDivergence {
            delta,
            us_implied_prob,
            pinnacle_implied_prob,
            ..
        } = &signals[0].details
        else {
            panic!("wrong details variant");
        };
        assert!((delta - 0.0762).abs() < 0.0001);
        assert_eq!(*pinnacle_implied_prob, Some(0.6));
        assert_eq!(*us_implied_prob, Some(0.5238));
    }

    #[tokio::test]
    async fn test_moneyline_worse_than_pinnacle_no_signal() {
        let pool = memory_pool().await;
        let config = Config::for_tests();
        let event = "evt_pin4";
        let t = "2025-01-15T12:00:00+00:00";

        db::insert_snapshots(
            &pool,
            &[
                snap(event, "pinnacle", "h2h", "Lakers", -150.0, None, t),
                snap(event, "betmgm", "h2h", "Lakers", -190.0, None, t),
            ],
        )
        .await
        .unwrap();

        let signals = detect(&config, &pool, event, t).await.unwrap();
        assert!(signals.is_empty());
    }

    #[tokio::test]
    async fn test_below_threshold_no_signal() {
        let pool = memory_pool().await;
        let config = Config::for_tests();
        let event = "evt_pin5";
        let t = "2025-01-15T12:00:00+00:00";

        db::insert_snapshots(
            &pool,
            &[
                snap(event, "pinnacle", "spreads", "Lakers", -110.0, Some(-3.0), t),
                snap(event, "draftkings", "spreads", "Lakers", -110.0, Some(-2.5), t),
            ],
        )
        .await
        .unwrap();

        let signals = detect(&config, &pool, event, t).await.unwrap();
        assert!(signals.is_empty());
    }

    #[tokio::test]
    async fn test_no_pinnacle_no_signal() {
        let pool = memory_pool().await;
        let config = Config::for_tests();
        let event = "evt_pin6";
        let t = "2025-01-15T12:00:00+00:00";

        db::insert_snapshots(
            &pool,
            &[
                snap(event, "draftkings", "spreads", "Lakers", -110.0, Some(-4.5), t),
                snap(event, "fanduel", "spreads", "Lakers", -110.0, Some(-3.0), t),
            ],
        )
        .await
        .unwrap();

        let signals = detect(&config, &pool, event, t).await.unwrap();
        assert!(signals.is_empty());
    }
}
