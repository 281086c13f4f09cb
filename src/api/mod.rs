//! Client for The Odds API v4: active sports, event odds, final scores.
//!
//! Every response carries `x-requests-used` / `x-requests-remaining` headers;
//! both are recorded verbatim into the budget ledger.

use reqwest::Client;
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

// ── Response schemas ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct Sport {
    pub key: String,
    pub title: String,
    pub active: bool,
    pub has_outrights: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Outcome {
    pub name: String,
    pub price: f64,
    #[serde(default)]
    pub point: Option<f64>,
    #[serde(default)]
    pub link: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Market {
    pub key: String,
    pub outcomes: Vec<Outcome>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BookmakerOdds {
    pub key: String,
    pub title: String,
    pub markets: Vec<Market>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Event {
    pub id: String,
    pub sport_key: String,
    pub home_team: String,
    pub away_team: String,
    pub commence_time: String,
    pub bookmakers: Vec<BookmakerOdds>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TeamScore {
    pub name: String,
    pub score: String,
}

/// A game from the scores endpoint. `scores` is absent while the game is
/// still in progress.
#[derive(Debug, Clone, Deserialize)]
pub struct ScoredGame {
    pub id: String,
    pub home_team: String,
    pub away_team: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub scores: Option<Vec<TeamScore>>,
}

#[derive(Debug, thiserror::Error)]
pub enum OddsApiError {
    #[error("odds API: invalid API key (401)")]
    InvalidKey,
    #[error("odds API: sport {0} not in subscription (422)")]
    NotInSubscription(String),
    #[error("odds API HTTP {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("odds API request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("budget ledger write failed: {0}")]
    Ledger(String),
}

const MARKETS: &str = "h2h,spreads,totals";

pub struct OddsClient {
    client: Client,
    base_url: String,
    api_key: String,
    bookmakers: String,
}

impl OddsClient {
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::new(),
            base_url: config.odds_api_base_url.trim_end_matches('/').to_string(),
            api_key: config.odds_api_key.clone(),
            bookmakers: config.bookmakers.join(","),
        }
    }

    /// Fetch the active-sports list (free endpoint, 0 credits).
    pub async fn get_active_sports(&self) -> Result<Vec<Sport>, OddsApiError> {
        let url = format!("{}/sports", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&[("apiKey", self.api_key.as_str())])
            .timeout(std::time::Duration::from_secs(30))
            .send()
            .await?;
        let resp = check_status(resp, None).await?;
        Ok(resp.json().await?)
    }

    /// Fetch odds for one sport across the configured bookmakers and the
    /// three target markets.
    pub async fn fetch_odds(
        &self,
        pool: &SqlitePool,
        sport_key: &str,
    ) -> Result<Vec<Event>, OddsApiError> {
        let endpoint = format!("/sports/{sport_key}/odds");
        let url = format!("{}{endpoint}", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&[
                ("apiKey", self.api_key.as_str()),
                ("markets", MARKETS),
                ("bookmakers", self.bookmakers.as_str()),
                ("oddsFormat", "american"),
            ])
            .timeout(std::time::Duration::from_secs(30))
            .send()
            .await?;

        self.track_credits(pool, &resp, &endpoint).await?;
        let resp = check_status(resp, Some(sport_key)).await?;
        Ok(resp.json().await?)
    }

    /// Fetch final scores for a sport, looking back `days_from` days.
    pub async fn fetch_scores(
        &self,
        pool: &SqlitePool,
        sport_key: &str,
        days_from: u32,
    ) -> Result<Vec<ScoredGame>, OddsApiError> {
        let endpoint = format!("/sports/{sport_key}/scores");
        let url = format!("{}{endpoint}", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&[
                ("apiKey", self.api_key.as_str()),
                ("daysFrom", &days_from.to_string()),
            ])
            .timeout(std::time::Duration::from_secs(30))
            .send()
            .await?;

        self.track_credits(pool, &resp, &endpoint).await?;
        let resp = check_status(resp, Some(sport_key)).await?;
        Ok(resp.json().await?)
    }

    /// Record the credit counters the API reports on every response.
    async fn track_credits(
        &self,
        pool: &SqlitePool,
        resp: &reqwest::Response,
        endpoint: &str,
    ) -> Result<(), OddsApiError> {
        let used = header_i64(resp, "x-requests-used");
        let remaining = header_i64(resp, "x-requests-remaining");
        if let (Some(used), Some(remaining)) = (used, remaining) {
            db::record_api_usage(pool, endpoint, used, remaining)
                .await
                .map_err(|e| OddsApiError::Ledger(e.to_string()))?;
            tracing::info!(endpoint, used, remaining, "api credits");
        }
        Ok(())
    }
}

fn header_i64(resp: &reqwest::Response, name: &str) -> Option<i64> {
    resp.headers()
        .get(name)?
        .to_str()
        .ok()?
        .parse::<f64>()
        .ok()
        .map(|v| v as i64)
}

async fn check_status(
    resp: reqwest::Response,
    sport_key: Option<&str>,
) -> Result<reqwest::Response, OddsApiError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    if status.as_u16() == 401 {
        return Err(OddsApiError::InvalidKey);
    }
    if status.as_u16() == 422 {
        return Err(OddsApiError::NotInSubscription(
            sport_key.unwrap_or("?").to_string(),
        ));
    }
    let body = resp.text().await.unwrap_or_default();
    Err(OddsApiError::Status { status, body })
}
