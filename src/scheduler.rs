use anyhow::Result;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{Duration, interval};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::config::SchedulerConfig;
use crate::services::{OnboardingReport, OnboardingService};

/// Drives the onboarding job on a cron schedule (production: nightly at
/// 01:00) or a plain interval in development. Started at boot and stopped on
/// shutdown.
pub struct Scheduler {
    onboarding: Arc<OnboardingService>,
    config: SchedulerConfig,
    running: Arc<RwLock<bool>>,
}

impl Scheduler {
    #[must_use]
    pub fn new(onboarding: Arc<OnboardingService>, config: SchedulerConfig) -> Self {
        Self {
            onboarding,
            config,
            running: Arc::new(RwLock::new(false)),
        }
    }

    pub async fn start(&self) -> Result<()> {
        if !self.config.enabled {
            info!("Scheduler is disabled in config");
            return Ok(());
        }

        *self.running.write().await = true;
        info!("Starting background scheduler");

        if let Some(cron_expr) = &self.config.cron_expression {
            self.run_with_cron(cron_expr).await
        } else {
            self.run_with_interval().await
        }
    }

    async fn run_with_cron(&self, cron_expr: &str) -> Result<()> {
        let mut sched = JobScheduler::new().await?;

        let onboarding = Arc::clone(&self.onboarding);
        let running = Arc::clone(&self.running);

        let job = Job::new_async(cron_expr, move |_uuid, _lock| {
            let onboarding = Arc::clone(&onboarding);
            let running = Arc::clone(&running);
            Box::pin(async move {
                if !*running.read().await {
                    return;
                }
                if let Err(e) = onboarding.run().await {
                    error!("Scheduled onboarding run failed: {e:#}");
                }
            })
        })?;

        sched.add(job).await?;
        sched.start().await?;

        info!("Scheduler running with cron: {}", cron_expr);

        loop {
            if !*self.running.read().await {
                break;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }

        sched.shutdown().await?;
        Ok(())
    }

    async fn run_with_interval(&self) -> Result<()> {
        let interval_mins = self.config.interval_minutes;

        info!("Scheduler running every {} minutes", interval_mins);

        let mut check_interval = interval(Duration::from_secs(u64::from(interval_mins) * 60));
        // The first tick fires immediately; skip it so boot does not double
        // as a scheduled run.
        check_interval.tick().await;

        loop {
            check_interval.tick().await;
            if !*self.running.read().await {
                break;
            }
            if let Err(e) = self.onboarding.run().await {
                error!("Scheduled onboarding run failed: {e:#}");
            }
        }

        Ok(())
    }

    pub async fn stop(&self) {
        info!("Stopping scheduler...");
        *self.running.write().await = false;
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    /// Manual trigger; used by the `onboard` CLI command.
    pub async fn run_once(&self) -> Result<OnboardingReport> {
        info!("Running manual onboarding check...");
        self.onboarding.run().await
    }
}
