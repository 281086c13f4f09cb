use anyhow::{Context, Result};
use chrono::Weekday;
use std::env;
use std::str::FromStr;

/// Runtime configuration, loaded from the environment (a `.env` file is
/// honored via dotenv in main). Missing required keys are a fatal startup
/// error; everything else has the defaults below.
#[derive(Debug, Clone)]
pub struct Config {
    // The Odds API
    pub odds_api_key: String,
    pub odds_api_base_url: String,
    pub odds_api_monthly_credits: i64,

    /// Target bookmakers requested from the API (comma-separated env value).
    pub bookmakers: Vec<String>,
    /// Sports to track.
    pub sports: Vec<String>,

    // Discord: default webhook (required), per-signal-type overrides
    pub discord_webhook_url: String,
    pub discord_webhook_steam_move: Option<String>,
    pub discord_webhook_rapid_change: Option<String>,
    pub discord_webhook_pinnacle_divergence: Option<String>,
    pub discord_webhook_reverse_line: Option<String>,
    pub discord_webhook_exchange_shift: Option<String>,

    // Polling
    pub poll_interval_minutes: u64,

    // Detection: steam moves
    pub steam_min_books: usize,
    pub steam_window_minutes: i64,

    // Detection: rapid changes
    pub rapid_spread_threshold: f64,
    pub rapid_ml_threshold: f64,

    // Detection: Pinnacle divergence
    pub pinnacle_spread_threshold: f64,
    pub pinnacle_ml_prob_threshold: f64,

    // Detection: exchange monitor
    pub exchange_shift_threshold: f64,

    /// Quiet hours (UTC): polling is skipped inside [start, end), wrapping
    /// past midnight when start > end. Default 5-14 UTC = midnight-9am ET.
    pub quiet_hours_start: u32,
    pub quiet_hours_end: u32,

    /// Minimum signal strength to alert (0.0–1.0).
    pub min_signal_strength: f64,

    // Alert dedup
    pub alert_cooldown_minutes: i64,

    // Daily/weekly jobs (UTC)
    pub daily_job_hour_utc: u32,
    pub weekly_report_weekday: Weekday,

    // Storage
    pub db_path: String,

    // Logging
    pub log_level: String,
}

fn required(key: &str) -> Result<String> {
    env::var(key).with_context(|| format!("missing required config: {key}"))
}

fn parsed_or<T: FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("invalid value for {key}: {e}")),
        Err(_) => Ok(default),
    }
}

fn weekday_or(key: &str, default: Weekday) -> Result<Weekday> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<Weekday>()
            .map_err(|_| anyhow::anyhow!("invalid value for {key}: expected a weekday name")),
        Err(_) => Ok(default),
    }
}

fn list_or(key: &str, default: &[&str]) -> Vec<String> {
    match env::var(key) {
        Ok(raw) => raw
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Err(_) => default.iter().map(|s| s.to_string()).collect(),
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            odds_api_key: required("ODDS_API_KEY")?,
            odds_api_base_url: parsed_or(
                "ODDS_API_BASE_URL",
                "https://api.the-odds-api.com/v4".to_string(),
            )?,
            odds_api_monthly_credits: parsed_or("ODDS_API_MONTHLY_CREDITS", 500)?,
            bookmakers: list_or(
                "BOOKMAKERS",
                &["draftkings", "fanduel", "betmgm", "pinnacle"],
            ),
            sports: list_or("SPORTS", &["basketball_nba"]),
            discord_webhook_url: required("DISCORD_WEBHOOK_URL")?,
            discord_webhook_steam_move: env::var("DISCORD_WEBHOOK_STEAM_MOVE").ok(),
            discord_webhook_rapid_change: env::var("DISCORD_WEBHOOK_RAPID_CHANGE").ok(),
            discord_webhook_pinnacle_divergence: env::var("DISCORD_WEBHOOK_PINNACLE_DIVERGENCE")
                .ok(),
            discord_webhook_reverse_line: env::var("DISCORD_WEBHOOK_REVERSE_LINE").ok(),
            discord_webhook_exchange_shift: env::var("DISCORD_WEBHOOK_EXCHANGE_SHIFT").ok(),
            poll_interval_minutes: parsed_or("POLL_INTERVAL_MINUTES", 20)?,
            steam_min_books: parsed_or("STEAM_MIN_BOOKS", 3)?,
            steam_window_minutes: parsed_or("STEAM_WINDOW_MINUTES", 30)?,
            rapid_spread_threshold: parsed_or("RAPID_SPREAD_THRESHOLD", 0.5)?,
            rapid_ml_threshold: parsed_or("RAPID_ML_THRESHOLD", 20.0)?,
            pinnacle_spread_threshold: parsed_or("PINNACLE_SPREAD_THRESHOLD", 1.0)?,
            pinnacle_ml_prob_threshold: parsed_or("PINNACLE_ML_PROB_THRESHOLD", 0.03)?,
            exchange_shift_threshold: parsed_or("EXCHANGE_SHIFT_THRESHOLD", 0.05)?,
            quiet_hours_start: parsed_or("QUIET_HOURS_START", 5)?,
            quiet_hours_end: parsed_or("QUIET_HOURS_END", 14)?,
            min_signal_strength: parsed_or("MIN_SIGNAL_STRENGTH", 0.5)?,
            alert_cooldown_minutes: parsed_or("ALERT_COOLDOWN_MINUTES", 60)?,
            daily_job_hour_utc: parsed_or("DAILY_JOB_HOUR_UTC", 15)?,
            weekly_report_weekday: weekday_or("WEEKLY_REPORT_WEEKDAY", Weekday::Mon)?,
            db_path: parsed_or("DB_PATH", "sharpline.db".to_string())?,
            log_level: parsed_or("LOG_LEVEL", "info".to_string())?,
        })
    }

    /// Is the given UTC hour inside the quiet window [start, end), wrapping
    /// past midnight when start > end?
    pub fn is_quiet_hour(&self, hour: u32) -> bool {
        if self.quiet_hours_start == self.quiet_hours_end {
            return false;
        }
        if self.quiet_hours_start < self.quiet_hours_end {
            hour >= self.quiet_hours_start && hour < self.quiet_hours_end
        } else {
            hour >= self.quiet_hours_start || hour < self.quiet_hours_end
        }
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            odds_api_key: "test_key".to_string(),
            odds_api_base_url: "https://api.the-odds-api.com/v4".to_string(),
            odds_api_monthly_credits: 500,
            bookmakers: vec![
                "draftkings".to_string(),
                "fanduel".to_string(),
                "betmgm".to_string(),
                "pinnacle".to_string(),
            ],
            sports: vec!["basketball_nba".to_string()],
            // Unroutable locally so tests never leave the machine.
            discord_webhook_url: "http://127.0.0.1:9/webhooks/test".to_string(),
            discord_webhook_steam_move: None,
            discord_webhook_rapid_change: None,
            discord_webhook_pinnacle_divergence: None,
            discord_webhook_reverse_line: None,
            discord_webhook_exchange_shift: None,
            poll_interval_minutes: 20,
            steam_min_books: 3,
            steam_window_minutes: 30,
            rapid_spread_threshold: 0.5,
            rapid_ml_threshold: 20.0,
            pinnacle_spread_threshold: 1.0,
            pinnacle_ml_prob_threshold: 0.03,
            exchange_shift_threshold: 0.05,
            quiet_hours_start: 5,
            quiet_hours_end: 14,
            min_signal_strength: 0.5,
            alert_cooldown_minutes: 60,
            daily_job_hour_utc: 15,
            weekly_report_weekday: Weekday::Mon,
            db_path: ":memory:".to_string(),
            log_level: "info".to_string(),
        }
    }
}
