//! One poll cycle: fetch odds for every configured sport, flatten the
//! responses into snapshot rows, and hand the sub-sampled event list to the
//! detection pipeline.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::api::{Event, OddsClient};
use crate::config::Config;
use crate::db;
use crate::models::OddsSnapshot;
use crate::services::smart;
use crate::utils;

/// The outcome of one fetch cycle. `events` is the sub-sampled list eligible
/// for detection this cycle; all fetched rows are written regardless, so the
/// snapshot history has no holes.
pub struct FetchCycle {
    pub fetched_at: String,
    pub events: Vec<Event>,
    pub snapshots_written: u64,
}

/// Fetch odds for all configured sports. A failure on one sport is logged and
/// the others proceed; a failure on the active-sports call fails the cycle.
pub async fn run_fetch_cycle(
    config: &Config,
    client: &OddsClient,
    pool: &SqlitePool,
    cycle_index: u64,
) -> Result<FetchCycle> {
    let active = client.get_active_sports().await?;
    let active_keys: Vec<&str> = active
        .iter()
        .filter(|sport| sport.active && !sport.has_outrights)
        .map(|sport| sport.key.as_str())
        .collect();

    // One timestamp per cycle: every row written below shares it, so rows
    // belonging to the same poll are identifiable by equality on fetched_at.
    let fetched_at = utils::now_iso();
    let mut events_for_detection: Vec<Event> = Vec::new();
    let mut snapshots_written = 0u64;

    for sport_key in &config.sports {
        if !active_keys.contains(&sport_key.as_str()) {
            tracing::info!(sport = %sport_key, "sport not active, skipping");
            continue;
        }

        match client.fetch_odds(pool, sport_key).await {
            Ok(events) => {
                let rows = flatten_events(&events, &fetched_at);
                let inserted = db::insert_snapshots(pool, &rows).await?;
                snapshots_written += inserted;
                tracing::info!(
                    sport = %sport_key,
                    events = events.len(),
                    snapshots = inserted,
                    "odds fetched"
                );
                events_for_detection.extend(smart::filter_events_for_cycle(events, cycle_index));
            }
            Err(error) => {
                tracing::error!(sport = %sport_key, %error, "odds fetch failed");
            }
        }
    }

    Ok(FetchCycle {
        fetched_at,
        events: events_for_detection,
        snapshots_written,
    })
}

/// Flatten API events into snapshot rows, one per (bookmaker, market, outcome).
pub fn flatten_events(events: &[Event], fetched_at: &str) -> Vec<OddsSnapshot> {
    let mut rows = Vec::new();
    for event in events {
        for bookmaker in &event.bookmakers {
            for market in &bookmaker.markets {
                for outcome in &market.outcomes {
                    rows.push(OddsSnapshot {
                        event_id: event.id.clone(),
                        sport_key: event.sport_key.clone(),
                        home_team: event.home_team.clone(),
                        away_team: event.away_team.clone(),
                        commence_time: event.commence_time.clone(),
                        bookmaker_key: bookmaker.key.clone(),
                        market_key: market.key.clone(),
                        outcome_name: outcome.name.clone(),
                        price: outcome.price,
                        point: outcome.point,
                        deep_link: outcome.link.clone(),
                        fetched_at: fetched_at.to_string(),
                    });
                }
            }
        }
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{BookmakerOdds, Market, Outcome};

    fn sample_event() -> Event {
        Event {
            id: "evt1".to_string(),
            sport_key: "basketball_nba".to_string(),
            home_team: "Lakers".to_string(),
            away_team: "Celtics".to_string(),
            commence_time: "2025-01-15T00:00:00Z".to_string(),
            bookmakers: vec![BookmakerOdds {
                key: "draftkings".to_string(),
                title: "DraftKings".to_string(),
                markets: vec![
                    Market {
                        key: "h2h".to_string(),
                        outcomes: vec![
                            Outcome {
                                name: "Lakers".to_string(),
                                price: -150.0,
                                point: None,
                                link: None,
                            },
                            Outcome {
                                name: "Celtics".to_string(),
                                price: 130.0,
                                point: None,
                                link: None,
                            },
                        ],
                    },
                    Market {
                        key: "spreads".to_string(),
                        outcomes: vec![Outcome {
                            name: "Lakers".to_string(),
                            price: -110.0,
                            point: Some(-3.5),
                            link: Some("https://sportsbook.example/bet".to_string()),
                        }],
                    },
                ],
            }],
        }
    }

    #[test]
    fn test_flatten_shares_fetched_at() {
        let fetched_at = "2025-01-15T12:00:00.000000+00:00";
        let rows = flatten_events(&[sample_event()], fetched_at);
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|row| row.fetched_at == fetched_at));
    }

    #[test]
    fn test_flatten_carries_points_and_links() {
        let rows = flatten_events(&[sample_event()], "t");
        let h2h = rows.iter().find(|r| r.market_key == "h2h").unwrap();
        assert_eq!(h2h.point, None);
        let spread = rows.iter().find(|r| r.market_key == "spreads").unwrap();
        assert_eq!(spread.point, Some(-3.5));
        assert!(spread.deep_link.is_some());
    }
}
