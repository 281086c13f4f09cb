//! Line-movement detectors. Each detector is a pure read over the snapshot
//! store: input (event_id, fetched_at), output zero or more signals.

pub mod exchange_shift;
pub mod pinnacle_divergence;
pub mod pipeline;
pub mod rapid_change;
pub mod reverse_line;
pub mod steam_move;

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::models::Signal;

pub use crate::db::PINNACLE_KEY;

/// The exchange bookmaker monitored for implied-probability shifts.
pub const BETFAIR_KEY: &str = "betfair_ex_eu";

/// US retail books considered for value-side recommendations.
pub const US_BOOKS: [&str; 5] = [
    "draftkings",
    "fanduel",
    "betmgm",
    "caesars",
    "williamhill_us",
];

pub fn is_us_book(bookmaker_key: &str) -> bool {
    US_BOOKS.contains(&bookmaker_key)
}

/// The closed set of detection strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detector {
    SteamMove,
    RapidChange,
    PinnacleDivergence,
    ReverseLine,
    ExchangeShift,
}

impl Detector {
    pub const ALL: [Detector; 5] = [
        Detector::SteamMove,
        Detector::RapidChange,
        Detector::PinnacleDivergence,
        Detector::ReverseLine,
        Detector::ExchangeShift,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Detector::SteamMove => "steam_move",
            Detector::RapidChange => "rapid_change",
            Detector::PinnacleDivergence => "pinnacle_divergence",
            Detector::ReverseLine => "reverse_line",
            Detector::ExchangeShift => "exchange_shift",
        }
    }

    pub async fn detect(
        &self,
        config: &Config,
        pool: &SqlitePool,
        event_id: &str,
        fetched_at: &str,
    ) -> Result<Vec<Signal>> {
        match self {
            Detector::SteamMove => steam_move::detect(config, pool, event_id, fetched_at).await,
            Detector::RapidChange => rapid_change::detect(config, pool, event_id, fetched_at).await,
            Detector::PinnacleDivergence => {
                pinnacle_divergence::detect(config, pool, event_id, fetched_at).await
            }
            Detector::ReverseLine => reverse_line::detect(config, pool, event_id, fetched_at).await,
            Detector::ExchangeShift => {
                exchange_shift::detect(config, pool, event_id, fetched_at).await
            }
        }
    }
}

/// Movement of one line between two snapshots: price delta for h2h, point
/// delta otherwise (price as a fallback when a point is missing).
pub(crate) fn line_delta(
    market_key: &str,
    first: &crate::models::OddsSnapshot,
    last: &crate::models::OddsSnapshot,
) -> f64 {
    if market_key != "h2h" {
        if let (Some(first_pt), Some(last_pt)) = (first.point, last.point) {
            return last_pt - first_pt;
        }
    }
    last.price - first.price
}

/// Presentational rounding for details payloads; never used in threshold math.
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub(crate) fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
