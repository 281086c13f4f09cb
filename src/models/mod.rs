use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

/// One append-only odds fact: a single (event, bookmaker, market, outcome)
/// price line observed at `fetched_at`. Timestamps are canonical RFC 3339 UTC
/// strings; string comparison on them is chronological.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OddsSnapshot {
    pub event_id: String,
    pub sport_key: String,
    pub home_team: String,
    pub away_team: String,
    pub commence_time: String,
    pub bookmaker_key: String,
    pub market_key: String, // "h2h", "spreads", "totals"
    pub outcome_name: String,
    pub price: f64,
    pub point: Option<f64>, // None iff market_key == "h2h"
    pub deep_link: Option<String>,
    pub fetched_at: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct SignalResultRow {
    pub event_id: String,
    pub signal_type: String,
    pub market_key: String,
    pub outcome_name: String,
    pub signal_direction: String,
    pub signal_strength: f64,
    pub signal_at: String,
    pub details_json: Option<String>,
    pub result: Option<String>, // "won", "lost", "push"
    pub resolved_at: Option<String>,
}

/// Won/lost/push tallies for one rollup bucket (detector or market).
#[derive(Debug, Clone, Copy, Default)]
pub struct OutcomeCounts {
    pub won: i64,
    pub lost: i64,
    pub push: i64,
}

impl OutcomeCounts {
    pub fn decided(&self) -> i64 {
        self.won + self.lost
    }

    pub fn win_rate(&self) -> Option<f64> {
        let decided = self.decided();
        (decided > 0).then(|| self.won as f64 / decided as f64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    SteamMove,
    RapidChange,
    PinnacleDivergence,
    ReverseLine,
    ExchangeShift,
}

impl SignalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::SteamMove => "steam_move",
            SignalKind::RapidChange => "rapid_change",
            SignalKind::PinnacleDivergence => "pinnacle_divergence",
            SignalKind::ReverseLine => "reverse_line",
            SignalKind::ExchangeShift => "exchange_shift",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SignalKind::SteamMove => "Steam Move",
            SignalKind::RapidChange => "Rapid Line Change",
            SignalKind::PinnacleDivergence => "Pinnacle Divergence",
            SignalKind::ReverseLine => "Reverse Line Movement",
            SignalKind::ExchangeShift => "Exchange Shift",
        }
    }

    /// Discord embed color (decimal).
    pub fn color(&self) -> u32 {
        match self {
            SignalKind::SteamMove => 0xFF4500,          // orange-red
            SignalKind::RapidChange => 0xFFD700,        // gold
            SignalKind::PinnacleDivergence => 0x4169E1, // blue
            SignalKind::ReverseLine => 0x8A2BE2,        // violet
            SignalKind::ExchangeShift => 0x2ECC71,      // green
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
        }
    }

    pub fn from_delta(delta: f64) -> Self {
        if delta > 0.0 {
            Direction::Up
        } else {
            Direction::Down
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShiftDirection {
    /// Exchange implied probability rose (price came in).
    Shortened,
    /// Exchange implied probability fell (price went out).
    Drifted,
}

impl ShiftDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShiftDirection::Shortened => "shortened",
            ShiftDirection::Drifted => "drifted",
        }
    }
}

impl fmt::Display for ShiftDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One aligned book inside a steam move: its delta over the window and its
/// current line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookMove {
    pub bookmaker: String,
    pub delta: f64,
    pub price: Option<f64>,
    pub point: Option<f64>,
}

/// A bookmaker's current line, listed as a value opportunity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookLine {
    pub bookmaker: String,
    pub price: f64,
    pub point: Option<f64>,
}

/// A US book still lagging an exchange move, with its implied probability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeBookLine {
    pub bookmaker: String,
    pub current_line: f64,
    pub implied_prob: f64,
}

/// Per-detector signal payload. Serialized flat into `details_json` so each
/// variant's fields appear as top-level keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SignalDetails {
    SteamMove {
        direction: Direction,
        books_moved: usize,
        avg_delta: f64,
        book_details: Vec<BookMove>,
        value_books: Vec<BookLine>,
    },
    RapidChange {
        bookmaker: String,
        old_price: f64,
        new_price: f64,
        old_point: Option<f64>,
        new_point: Option<f64>,
        delta: f64,
        value_books: Vec<BookLine>,
    },
    PinnacleDivergence {
        us_book: String,
        us_value: f64,
        pinnacle_value: f64,
        delta: f64,
        us_implied_prob: Option<f64>,
        pinnacle_implied_prob: Option<f64>,
    },
    ReverseLine {
        us_direction: Direction,
        us_avg_delta: f64,
        us_movers: Vec<String>,
        pinnacle_direction: Direction,
        pinnacle_delta: f64,
        bet_direction: Direction,
        value_books: Vec<BookLine>,
    },
    ExchangeShift {
        old_price: f64,
        new_price: f64,
        old_implied_prob: f64,
        new_implied_prob: f64,
        shift: f64,
        direction: ShiftDirection,
        value_books: Vec<ExchangeBookLine>,
    },
}

impl SignalDetails {
    pub fn kind(&self) -> SignalKind {
        match self {
            SignalDetails::SteamMove { .. } => SignalKind::SteamMove,
            SignalDetails::RapidChange { .. } => SignalKind::RapidChange,
            SignalDetails::PinnacleDivergence { .. } => SignalKind::PinnacleDivergence,
            SignalDetails::ReverseLine { .. } => SignalKind::ReverseLine,
            SignalDetails::ExchangeShift { .. } => SignalKind::ExchangeShift,
        }
    }

    /// How many stale-line value opportunities the signal carries.
    pub fn value_book_count(&self) -> usize {
        match self {
            SignalDetails::SteamMove { value_books, .. } => value_books.len(),
            SignalDetails::RapidChange { value_books, .. } => value_books.len(),
            SignalDetails::ReverseLine { value_books, .. } => value_books.len(),
            SignalDetails::ExchangeShift { value_books, .. } => value_books.len(),
            SignalDetails::PinnacleDivergence { .. } => 0,
        }
    }
}

/// A detected line-movement event, produced by one detector for one
/// (event, market, outcome) and consumed by the pipeline, alerter and
/// performance recorder.
#[derive(Debug, Clone)]
pub struct Signal {
    pub event_id: String,
    pub sport_key: String,
    pub home_team: String,
    pub away_team: String,
    pub market_key: String,
    pub outcome_name: String,
    pub strength: f64, // 0.0–1.0, unrounded
    pub description: String,
    pub details: SignalDetails,
}

impl Signal {
    pub fn kind(&self) -> SignalKind {
        self.details.kind()
    }

    /// Directional label persisted with the signal result.
    pub fn direction_label(&self) -> String {
        match &self.details {
            SignalDetails::SteamMove { direction, .. } => direction.to_string(),
            SignalDetails::RapidChange {
                old_price,
                new_price,
                old_point,
                new_point,
                ..
            } => match (old_point, new_point) {
                (Some(old), Some(new)) => Direction::from_delta(new - old).to_string(),
                _ => Direction::from_delta(new_price - old_price).to_string(),
            },
            SignalDetails::PinnacleDivergence { .. } => "value".to_string(),
            SignalDetails::ReverseLine {
                us_direction,
                pinnacle_direction,
                ..
            } => format!("us:{us_direction}_pin:{pinnacle_direction}"),
            SignalDetails::ExchangeShift { direction, .. } => direction.to_string(),
        }
    }

    pub fn details_json(&self) -> String {
        serde_json::to_string(&self.details).unwrap_or_else(|_| "{}".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_details_json_is_flat() {
        let details = SignalDetails::RapidChange {
            bookmaker: "draftkings".into(),
            old_price: -110.0,
            new_price: -110.0,
            old_point: Some(-3.0),
            new_point: Some(-4.0),
            delta: 1.0,
            value_books: vec![],
        };
        let json: serde_json::Value = serde_json::from_str(
            &serde_json::to_string(&details).unwrap(),
        )
        .unwrap();
        assert_eq!(json["bookmaker"], "draftkings");
        assert_eq!(json["delta"], 1.0);
    }

    #[test]
    fn test_direction_labels() {
        let sig = Signal {
            event_id: "evt".into(),
            sport_key: "basketball_nba".into(),
            home_team: "Lakers".into(),
            away_team: "Celtics".into(),
            market_key: "spreads".into(),
            outcome_name: "Lakers".into(),
            strength: 0.8,
            description: String::new(),
            details: SignalDetails::RapidChange {
                bookmaker: "draftkings".into(),
                old_price: -110.0,
                new_price: -110.0,
                old_point: Some(-3.0),
                new_point: Some(-4.0),
                delta: 1.0,
                value_books: vec![],
            },
        };
        assert_eq!(sig.direction_label(), "down");
        assert_eq!(sig.kind(), SignalKind::RapidChange);
    }

    #[test]
    fn test_outcome_counts_win_rate() {
        let counts = OutcomeCounts {
            won: 3,
            lost: 1,
            push: 2,
        };
        assert_eq!(counts.decided(), 4);
        assert_eq!(counts.win_rate(), Some(0.75));
        assert_eq!(OutcomeCounts::default().win_rate(), None);
    }
}
