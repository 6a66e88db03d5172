use std::{sync::Arc, time::Duration};

use anyhow::{ensure, Result};
use tokio::{
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error, info, warn};

use crate::{ambient::WeatherApi, db::ReadingStore};

/// Drives ingestion: list devices, store each device's latest reading.
///
/// Cycles never overlap. A cycle runs inline in the scheduler loop and ticks
/// missed while it runs are skipped rather than queued.
pub struct PollScheduler {
    api: Arc<dyn WeatherApi>,
    store: Arc<dyn ReadingStore>,
    interval: Duration,
}

/// Counts for one cycle, used for the completion log line.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CycleReport {
    pub abandoned: bool,
    pub devices: usize,
    pub stored: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl PollScheduler {
    pub fn new(
        api: Arc<dyn WeatherApi>,
        store: Arc<dyn ReadingStore>,
        interval: Duration,
    ) -> Result<Self> {
        ensure!(!interval.is_zero(), "poll interval must be greater than zero");
        Ok(Self { api, store, interval })
    }

    /// Start polling in the background. The first cycle runs immediately.
    ///
    /// Dropping the returned handle without calling `stop` also ends the
    /// loop after any cycle in progress.
    pub fn spawn(self) -> SchedulerHandle {
        let ctx = CancellationToken::new();
        let task = tokio::spawn(self.run(ctx.clone()));
        SchedulerHandle {
            guard: ctx.drop_guard(),
            task,
        }
    }

    async fn run(self, ctx: CancellationToken) {
        info!(interval_secs = self.interval.as_secs(), "Poll scheduler started");
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = ctx.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let started = Instant::now();
            self.run_cycle().await;

            let took = started.elapsed();
            if took > self.interval {
                warn!(
                    took_secs = took.as_secs(),
                    interval_secs = self.interval.as_secs(),
                    "Poll cycle outlasted the interval; missed ticks are skipped"
                );
            }
        }

        info!("Poll scheduler stopped");
    }

    pub(crate) async fn run_cycle(&self) -> CycleReport {
        info!("Polling weather data");

        let devices = match self.api.list_devices().await {
            Ok(devices) => devices,
            Err(e) => {
                error!(error = %e, "Failed to fetch devices; abandoning this cycle");
                return CycleReport {
                    abandoned: true,
                    ..CycleReport::default()
                };
            }
        };

        let mut report = CycleReport {
            devices: devices.len(),
            ..CycleReport::default()
        };

        if devices.is_empty() {
            info!("No devices found for this account");
            return report;
        }

        for entry in &devices {
            let device = match entry {
                Ok(device) => device,
                Err(e) => {
                    error!(index = e.index, mac_address = ?e.mac_address, error = %e, "Skipping malformed device entry");
                    report.failed += 1;
                    continue;
                }
            };

            let Some(reading) = device.last_data.as_ref() else {
                debug!(mac_address = %device.mac_address, "No lastData for device; skipping");
                report.skipped += 1;
                continue;
            };

            match self.store.insert(device, reading).await {
                Ok(record) => {
                    info!(mac_address = %device.mac_address, id = record.id, "Stored weather data");
                    report.stored += 1;
                }
                Err(e) => {
                    error!(mac_address = %device.mac_address, error = %e, "Failed to store weather data");
                    report.failed += 1;
                }
            }
        }

        info!(
            devices = report.devices,
            stored = report.stored,
            skipped = report.skipped,
            failed = report.failed,
            "Poll cycle completed"
        );
        report
    }
}

pub struct SchedulerHandle {
    /// Cancels the loop when dropped.
    guard: DropGuard,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Prevent further cycles and wait for the loop to exit. A cycle already
    /// running is allowed to finish.
    pub async fn stop(self) {
        let Self { guard, task } = self;
        drop(guard);
        if let Err(e) = task.await {
            error!(error = %e, "Poll scheduler task ended abnormally");
        }
    }
}
