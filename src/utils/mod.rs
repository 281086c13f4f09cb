use chrono::{DateTime, Duration, SecondsFormat, Utc};

/// Convert American odds to implied probability (0–1).
pub fn american_to_implied_prob(price: f64) -> f64 {
    if price > 0.0 {
        100.0 / (price + 100.0)
    } else {
        price.abs() / (price.abs() + 100.0)
    }
}

/// Check if the US book offers better value to the bettor than the sharp line.
///
/// - h2h: higher price = better payout (works for both + and - odds)
/// - spreads: higher point = better for bettor (less to cover / more points received)
/// - totals over: lower point = easier to go over
/// - totals under: higher point = easier to stay under
pub fn us_has_better_value(
    market_key: &str,
    outcome_name: &str,
    us_value: f64,
    sharp_value: f64,
) -> bool {
    match market_key {
        "h2h" | "spreads" => us_value > sharp_value,
        "totals" => {
            if outcome_name.eq_ignore_ascii_case("over") {
                us_value < sharp_value
            } else {
                us_value > sharp_value
            }
        }
        _ => false,
    }
}

/// Sort key for ranking lines by bettor favorability (higher key = better line).
pub fn favorability_key(
    market_key: &str,
    outcome_name: &str,
    price: Option<f64>,
    point: Option<f64>,
) -> f64 {
    if market_key == "h2h" {
        return price.unwrap_or(0.0);
    }
    let Some(pt) = point else { return 0.0 };
    if market_key == "totals" && outcome_name.eq_ignore_ascii_case("over") {
        -pt
    } else {
        pt
    }
}

/// Canonical timestamp format: RFC 3339 UTC with fixed-width microseconds and
/// explicit +00:00 offset, so lexicographic order equals chronological order.
pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, false)
}

pub fn now_iso() -> String {
    format_ts(Utc::now())
}

/// Canonical timestamp `minutes` before the given RFC 3339 timestamp.
pub fn minutes_before(ts: &str, minutes: i64) -> anyhow::Result<String> {
    let parsed = DateTime::parse_from_rfc3339(ts)
        .map_err(|e| anyhow::anyhow!("bad timestamp {ts:?}: {e}"))?
        .with_timezone(&Utc);
    Ok(format_ts(parsed - Duration::minutes(minutes)))
}

pub fn minutes_ago(minutes: i64) -> String {
    format_ts(Utc::now() - Duration::minutes(minutes))
}

pub fn hours_ago(hours: i64) -> String {
    format_ts(Utc::now() - Duration::hours(hours))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_american_to_implied_prob() {
        assert!((american_to_implied_prob(-200.0) - 0.6667).abs() < 0.001);
        assert!((american_to_implied_prob(200.0) - 0.3333).abs() < 0.001);
        assert!((american_to_implied_prob(-100.0) - 0.5).abs() < 0.001);
        assert!((american_to_implied_prob(100.0) - 0.5).abs() < 0.001);
    }

    #[test]
    fn test_implied_prob_monotone() {
        // More favorable price for the bettor means lower implied probability.
        assert!(american_to_implied_prob(-110.0) < american_to_implied_prob(-150.0));
        assert!(american_to_implied_prob(150.0) < american_to_implied_prob(110.0));
        assert!(american_to_implied_prob(120.0) < american_to_implied_prob(-120.0));
    }

    #[test]
    fn test_better_value_polarity() {
        assert!(us_has_better_value("h2h", "Lakers", -110.0, -150.0));
        assert!(!us_has_better_value("h2h", "Lakers", -190.0, -150.0));
        assert!(us_has_better_value("spreads", "Lakers", -1.5, -3.0));
        assert!(!us_has_better_value("spreads", "Lakers", -4.5, -3.0));
        assert!(us_has_better_value("totals", "Over", 210.5, 212.0));
        assert!(us_has_better_value("totals", "Under", 214.0, 212.0));
        assert!(!us_has_better_value("totals", "Over", 214.0, 212.0));
    }

    #[test]
    fn test_favorability_key_ordering() {
        // Over: lower total ranks higher.
        let a = favorability_key("totals", "Over", Some(-110.0), Some(210.5));
        let b = favorability_key("totals", "Over", Some(-110.0), Some(212.0));
        assert!(a > b);
        // Under: higher total ranks higher.
        let a = favorability_key("totals", "Under", Some(-110.0), Some(214.0));
        let b = favorability_key("totals", "Under", Some(-110.0), Some(212.0));
        assert!(a > b);
        // Spreads: more points received ranks higher.
        let a = favorability_key("spreads", "Celtics", Some(-110.0), Some(4.0));
        let b = favorability_key("spreads", "Celtics", Some(-110.0), Some(3.5));
        assert!(a > b);
    }

    #[test]
    fn test_minutes_before_sorts_lexicographically() {
        let later = "2025-01-15T12:20:00+00:00";
        let earlier = minutes_before(later, 30).unwrap();
        assert!(earlier.as_str() < later);
        assert!(earlier.starts_with("2025-01-15T11:50:00"));
    }
}
