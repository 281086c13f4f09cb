//! API credit budget: gate polling when the monthly allowance runs low, and
//! surface the balance in reports.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::alerts::{Alerter, Embed};
use crate::config::Config;
use crate::db;

/// Worst-case credits consumed by one poll cycle (sports x markets).
pub const CREDITS_PER_POLL: i64 = 9;

#[derive(Debug, Clone, Copy)]
pub struct BudgetStatus {
    pub monthly_limit: i64,
    pub credits_remaining: Option<i64>,
    pub credits_used: i64,
    pub pct_remaining: f64,
}

pub struct BudgetGovernor {
    monthly_limit: i64,
    low_budget_warned: bool,
}

impl BudgetGovernor {
    pub fn new(config: &Config) -> Self {
        Self {
            monthly_limit: config.odds_api_monthly_credits,
            low_budget_warned: false,
        }
    }

    /// True when polling is affordable: an empty ledger (bootstrap), or a
    /// balance above max(20% of the monthly limit, one poll's worth).
    /// The first denial sends a one-shot low-budget notification.
    pub async fn should_poll(&mut self, pool: &SqlitePool, alerter: &Alerter) -> Result<bool> {
        let Some(remaining) = db::get_credits_remaining(pool).await? else {
            return Ok(true);
        };

        let threshold = (self.monthly_limit as f64 * 0.20).max(CREDITS_PER_POLL as f64);
        if (remaining as f64) > threshold {
            return Ok(true);
        }

        tracing::warn!(
            remaining,
            threshold,
            monthly = self.monthly_limit,
            "budget low, polling paused"
        );
        if !self.low_budget_warned {
            self.low_budget_warned = true;
            let embed = Embed::new(
                "Budget Warning",
                format!(
                    "API credits are below the 20% threshold. \
                     Remaining: **{remaining}** / {}. Polling has been paused.",
                    self.monthly_limit
                ),
                0xE74C3C,
            );
            if let Err(error) = alerter.send_embed(&embed).await {
                tracing::error!(%error, "budget warning dispatch failed");
            }
        }
        Ok(false)
    }
}

pub async fn status(pool: &SqlitePool, monthly_limit: i64) -> Result<BudgetStatus> {
    let remaining = db::get_credits_remaining(pool).await?;
    let used = remaining.map(|r| monthly_limit - r).unwrap_or(0);
    let pct_remaining = match remaining {
        Some(r) => (r as f64 / monthly_limit as f64) * 100.0,
        None => 100.0,
    };
    Ok(BudgetStatus {
        monthly_limit,
        credits_remaining: remaining,
        credits_used: used,
        pct_remaining,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testutil::memory_pool;

    fn governor() -> BudgetGovernor {
        BudgetGovernor::new(&Config::for_tests()) // monthly limit 500
    }

    #[tokio::test]
    async fn test_empty_ledger_allows_polling() {
        let pool = memory_pool().await;
        let alerter = Alerter::new(&Config::for_tests());
        assert!(governor().should_poll(&pool, &alerter).await.unwrap());
    }

    #[tokio::test]
    async fn test_healthy_balance_allows_polling() {
        let pool = memory_pool().await;
        let alerter = Alerter::new(&Config::for_tests());
        db::record_api_usage(&pool, "/sports/x/odds", 9, 400)
            .await
            .unwrap();
        assert!(governor().should_poll(&pool, &alerter).await.unwrap());
    }

    #[tokio::test]
    async fn test_low_balance_denies_polling() {
        let pool = memory_pool().await;
        let alerter = Alerter::new(&Config::for_tests());
        // 20% of 500 = 100; a balance at the threshold is denied.
        db::record_api_usage(&pool, "/sports/x/odds", 400, 100)
            .await
            .unwrap();
        assert!(!governor().should_poll(&pool, &alerter).await.unwrap());
    }

    #[tokio::test]
    async fn test_status_math() {
        let pool = memory_pool().await;
        db::record_api_usage(&pool, "/sports/x/odds", 100, 400)
            .await
            .unwrap();
        let with_usage = status(&pool, 500).await.unwrap();
        assert_eq!(with_usage.credits_remaining, Some(400));
        assert_eq!(with_usage.credits_used, 100);
        assert!((with_usage.pct_remaining - 80.0).abs() < 1e-9);

        let empty_pool = memory_pool().await;
        let empty = status(&empty_pool, 500).await.unwrap();
        assert_eq!(empty.credits_remaining, None);
        assert_eq!(empty.credits_used, 0);
    }
}
