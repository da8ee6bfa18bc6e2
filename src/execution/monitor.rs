use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};
use crate::execution::sampler::Sampler;
use crate::execution::scheduler::Scheduler;
use crate::monitoring::logger::StorageError;
use crate::monitoring::report::{Report, Reporter};
use crate::strategies::types::Observation;

#[derive(Debug)]
pub enum TickOutcome {
    Idle,
    Sampled { observation: Observation, reported: bool },
    StorageFailed,
}

/// Scheduler, sampler and reporter driven from one cooperative loop.
pub struct Monitor {
    scheduler: Scheduler,
    sampler: Sampler,
    reporter: Reporter,
}

impl Monitor {
    pub fn new(scheduler: Scheduler, sampler: Sampler, reporter: Reporter) -> Self {
        Self {
            scheduler,
            sampler,
            reporter,
        }
    }

    #[cfg(test)]
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Create the log if needed and skip the slot of its newest row.
    pub fn prepare(&mut self) -> Result<(), StorageError> {
        let log = self.sampler.log();
        log.ensure_initialized()?;

        if let Some(last) = log.last()? {
            self.scheduler.seed_from(&last.captured_at);
            match self.scheduler.last_fired() {
                Some(slot) => info!("Last observation at {} already covers slot {}", last.captured_at, slot.0),
                None => info!("Last observation at {}", last.captured_at),
            }
        }
        Ok(())
    }

    pub async fn tick(&mut self, now: DateTime<Utc>) -> TickOutcome {
        let decision = self.scheduler.poll(&now);
        let (Some(slot), Some(boundary)) = (decision.slot(), decision.boundary()) else {
            return TickOutcome::Idle;
        };
        debug!("Slot {} due for boundary {}", slot.0, boundary);

        let local_now = now.with_timezone(&self.scheduler.policy().offset());
        let observation = match self.sampler.run_cycle(local_now).await {
            Ok(observation) => observation,
            Err(e) => {
                error!("Failed to store observation, will retry this slot: {}", e);
                return TickOutcome::StorageFailed;
            }
        };
        self.scheduler.mark_fired(slot);

        let reported = decision.report_due() && self.report().is_some();
        TickOutcome::Sampled { observation, reported }
    }

    /// Regenerate the report; failures are logged, never fatal.
    pub fn report(&self) -> Option<Report> {
        match self.reporter.regenerate(self.sampler.log()) {
            Ok(report) => Some(report),
            Err(e) => {
                error!("Report generation failed: {:#}", e);
                None
            }
        }
    }

    /// Tick until `shutdown` resolves, then write one last report.
    pub async fn run<F>(mut self, tick_every: Duration, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(tick_every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                _ = ticker.tick() => {
                    self.tick(Utc::now()).await;
                }
            }
        }

        info!("Writing final report to {}", self.reporter.output_dir().display());
        self.report();
    }
}
