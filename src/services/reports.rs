//! Daily and weekly performance reports, dispatched through the alert sink.

use anyhow::Result;
use sqlx::SqlitePool;
use std::collections::HashMap;

use crate::alerts::{Alerter, Embed};
use crate::config::Config;
use crate::db;
use crate::models::OutcomeCounts;
use crate::services::budget;
use crate::utils;

pub async fn send_daily_report(config: &Config, alerter: &Alerter, pool: &SqlitePool) -> Result<()> {
    send_report(config, alerter, pool, "Daily Signal Report", &utils::hours_ago(24)).await
}

pub async fn send_weekly_report(
    config: &Config,
    alerter: &Alerter,
    pool: &SqlitePool,
) -> Result<()> {
    send_report(config, alerter, pool, "Weekly Signal Report", &utils::hours_ago(168)).await
}

async fn send_report(
    config: &Config,
    alerter: &Alerter,
    pool: &SqlitePool,
    title: &str,
    since: &str,
) -> Result<()> {
    let embed = build_report_embed(config, pool, title, since).await?;
    if alerter.send_embed(&embed).await? {
        tracing::info!(title, "report sent");
    } else {
        tracing::error!(title, "report dispatch rejected");
    }
    Ok(())
}

async fn build_report_embed(
    config: &Config,
    pool: &SqlitePool,
    title: &str,
    since: &str,
) -> Result<Embed> {
    let stats = db::get_performance_stats(pool, Some(since)).await?;
    let by_market = db::get_market_performance_stats(pool, Some(since)).await?;
    let signal_count = db::get_signal_count_since(pool, since).await?;
    let alert_count = db::get_alerts_count_since(pool, since).await?;
    let budget_status = budget::status(pool, config.odds_api_monthly_credits).await?;

    let mut embed = Embed::new(title, format!("Period: since {}", &since[..10]), 0x9B59B6)
        .field("Signals Detected", signal_count.to_string(), true)
        .field("Alerts Sent", alert_count.to_string(), true);

    if stats.is_empty() {
        embed = embed.field("Performance", "No resolved signals yet", false);
    } else {
        let total: OutcomeCounts = stats.values().fold(OutcomeCounts::default(), |acc, c| {
            OutcomeCounts {
                won: acc.won + c.won,
                lost: acc.lost + c.lost,
                push: acc.push + c.push,
            }
        });
        let overall = match total.win_rate() {
            Some(rate) => format!("{:.1}% ({}W / {}L)", rate * 100.0, total.won, total.lost),
            None => "N/A".to_string(),
        };
        embed = embed.field("Overall Win Rate", overall, true);
        embed = embed.field("By Detector", breakdown_lines(&stats), false);
        embed = embed.field("By Market", breakdown_lines(&by_market), false);
    }

    embed = embed.field(
        "API Credits",
        format!(
            "{} used / {} remaining of {}",
            budget_status.credits_used,
            budget_status
                .credits_remaining
                .map(|r| r.to_string())
                .unwrap_or_else(|| "?".to_string()),
            budget_status.monthly_limit
        ),
        true,
    );

    Ok(embed)
}

fn breakdown_lines(stats: &HashMap<String, OutcomeCounts>) -> String {
    let mut keys: Vec<&String> = stats.keys().collect();
    keys.sort();
    keys.iter()
        .map(|key| {
            let counts = stats[*key];
            let rate = match counts.win_rate() {
                Some(rate) => format!("{:.0}%", rate * 100.0),
                None => "N/A".to_string(),
            };
            format!(
                "**{key}**: {rate} ({}W/{}L/{}P)",
                counts.won, counts.lost, counts.push
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testutil::memory_pool;

    #[tokio::test]
    async fn test_report_embed_with_resolved_signals() {
        let pool = memory_pool().await;
        let config = Config::for_tests();
        let signal_at = utils::hours_ago(2);

        db::record_signal_result(
            &pool, "evt1", "steam_move", "spreads", "Lakers", "down", 0.8, &signal_at, None,
        )
        .await
        .unwrap();
        db::record_signal_result(
            &pool, "evt2", "rapid_change", "h2h", "Lakers", "down", 0.6, &signal_at, None,
        )
        .await
        .unwrap();
        db::resolve_signal(&pool, "evt1", "steam_move", "spreads", "Lakers", &signal_at, "won")
            .await
            .unwrap();
        db::resolve_signal(&pool, "evt2", "rapid_change", "h2h", "Lakers", &signal_at, "lost")
            .await
            .unwrap();

        let embed = build_report_embed(&config, &pool, "Daily Signal Report", &utils::hours_ago(24))
            .await
            .unwrap();

        assert_eq!(embed.title, "Daily Signal Report");
        let detected = embed.fields.iter().find(|f| f.name == "Signals Detected").unwrap();
        assert_eq!(detected.value, "2");
        let overall = embed.fields.iter().find(|f| f.name == "Overall Win Rate").unwrap();
        assert!(overall.value.contains("50.0%"));
        let by_detector = embed.fields.iter().find(|f| f.name == "By Detector").unwrap();
        assert!(by_detector.value.contains("steam_move"));
        assert!(by_detector.value.contains("rapid_change"));
        let by_market = embed.fields.iter().find(|f| f.name == "By Market").unwrap();
        assert!(by_market.value.contains("spreads"));
    }

    #[tokio::test]
    async fn test_report_embed_empty_store() {
        let pool = memory_pool().await;
        let config = Config::for_tests();
        let embed = build_report_embed(&config, &pool, "Weekly Signal Report", &utils::hours_ago(168))
            .await
            .unwrap();
        assert!(embed
            .fields
            .iter()
            .any(|f| f.name == "Performance" && f.value.contains("No resolved")));
    }
}
