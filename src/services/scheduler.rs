//! The polling daemon: a single cooperative loop driving poll/detect/alert
//! cycles, the daily grader, and the daily/weekly reports.

use anyhow::Result;
use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc};
use sqlx::SqlitePool;
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::alerts::Alerter;
use crate::api::OddsClient;
use crate::config::Config;
use crate::db;
use crate::detect::pipeline;
use crate::services::budget::BudgetGovernor;
use crate::services::{fetcher, grader, performance, reports};

pub struct Daemon {
    config: Config,
    pool: SqlitePool,
    client: OddsClient,
    alerter: Alerter,
    budget: BudgetGovernor,
    cycle_index: u64,
    last_daily_run: Option<NaiveDate>,
}

impl Daemon {
    pub fn new(config: Config, pool: SqlitePool) -> Self {
        let client = OddsClient::new(&config);
        let alerter = Alerter::new(&config);
        let budget = BudgetGovernor::new(&config);
        Self {
            config,
            pool,
            client,
            alerter,
            budget,
            cycle_index: 0,
            last_daily_run: None,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        let mut poll = interval(Duration::from_secs(self.config.poll_interval_minutes * 60));
        // A tick that lands while a cycle is still running is dropped, not
        // queued: cycles never overlap.
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut housekeeping = interval(Duration::from_secs(60));
        housekeeping.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // Consume the interval's immediate first tick; the daily jobs only
        // run on real minute boundaries.
        housekeeping.tick().await;

        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        tracing::info!(
            interval_minutes = self.config.poll_interval_minutes,
            "scheduler started"
        );

        loop {
            tokio::select! {
                _ = poll.tick() => self.poll_cycle().await,
                _ = housekeeping.tick() => self.daily_jobs(Utc::now()).await,
                result = &mut shutdown => {
                    if let Err(error) = result {
                        tracing::error!(%error, "signal handler failed, shutting down");
                    } else {
                        tracing::info!("shutdown requested");
                    }
                    break;
                }
            }
        }

        self.pool.close().await;
        tracing::info!("shutdown complete");
        Ok(())
    }

    async fn poll_cycle(&mut self) {
        self.cycle_index += 1;
        tracing::info!(cycle = self.cycle_index, "poll cycle start");

        match self.budget.should_poll(&self.pool, &self.alerter).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!("poll skipped: budget");
                return;
            }
            Err(error) => {
                tracing::error!(%error, "budget check failed");
                return;
            }
        }

        let hour = Utc::now().hour();
        if self.config.is_quiet_hour(hour) {
            tracing::info!(hour, "poll skipped: quiet hours");
            return;
        }

        let cycle = match fetcher::run_fetch_cycle(
            &self.config,
            &self.client,
            &self.pool,
            self.cycle_index,
        )
        .await
        {
            Ok(cycle) => cycle,
            Err(error) => {
                tracing::error!(%error, "poll fetch error");
                return;
            }
        };

        if cycle.events.is_empty() {
            tracing::info!("poll cycle: no events due for detection");
            return;
        }

        let event_ids: Vec<String> = cycle.events.iter().map(|event| event.id.clone()).collect();
        let signals = match pipeline::run_for_events(
            &self.config,
            &self.pool,
            &cycle.fetched_at,
            &event_ids,
        )
        .await
        {
            Ok(signals) => signals,
            Err(error) => {
                tracing::error!(%error, "pipeline error");
                return;
            }
        };

        for sig in &signals {
            // Alert dispatch precedes performance recording, so the next
            // cycle's cooldown query already sees this alert.
            match self.alerter.send_signal(sig).await {
                Ok(true) => {
                    if let Err(error) = db::record_alert(
                        &self.pool,
                        &sig.event_id,
                        sig.kind().as_str(),
                        &sig.market_key,
                        &sig.outcome_name,
                        Some(&sig.details_json()),
                    )
                    .await
                    {
                        tracing::error!(%error, "alert record failed");
                    } else {
                        tracing::info!(
                            signal_type = sig.kind().as_str(),
                            event_id = %sig.event_id,
                            "alert sent"
                        );
                    }
                }
                // Rejected or failed dispatch: no sent_alerts row, so the
                // cooldown won't suppress a retry on the next cycle.
                Ok(false) => {
                    tracing::error!(event_id = %sig.event_id, "alert rejected by webhook");
                }
                Err(error) => {
                    tracing::error!(event_id = %sig.event_id, %error, "alert dispatch failed");
                }
            }

            if let Err(error) = performance::record_signal(&self.pool, sig, &cycle.fetched_at).await
            {
                tracing::error!(event_id = %sig.event_id, %error, "signal record failed");
            }
        }

        tracing::info!(
            cycle = self.cycle_index,
            signals = signals.len(),
            snapshots = cycle.snapshots_written,
            "poll cycle complete"
        );
    }

    fn daily_due(&self, now: DateTime<Utc>) -> bool {
        now.hour() == self.config.daily_job_hour_utc && self.last_daily_run != Some(now.date_naive())
    }

    async fn daily_jobs(&mut self, now: DateTime<Utc>) {
        if !self.daily_due(now) {
            return;
        }
        self.last_daily_run = Some(now.date_naive());

        // Grading runs before reporting so the report sees today's results.
        match grader::resolve_all(&self.config, &self.client, &self.pool).await {
            Ok(counts) => tracing::info!(
                resolved = counts.resolved,
                skipped = counts.skipped,
                "daily grading done"
            ),
            Err(error) => tracing::error!(%error, "daily grading failed"),
        }

        if let Err(error) = reports::send_daily_report(&self.config, &self.alerter, &self.pool).await
        {
            tracing::error!(%error, "daily report failed");
        }

        if now.weekday() == self.config.weekly_report_weekday {
            if let Err(error) =
                reports::send_weekly_report(&self.config, &self.alerter, &self.pool).await
            {
                tracing::error!(%error, "weekly report failed");
            }
        }
    }
}

async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result?,
            _ = sigterm.recv() => {}
        }
        Ok(())
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        Ok(())
    }
}
