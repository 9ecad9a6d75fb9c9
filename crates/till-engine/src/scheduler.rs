//! # Scheduler Runner
//!
//! Drives [`AlertJobs`] on timers: the low-stock sweep on a fixed interval
//! and the closing report once a day at a wall-clock time (UTC).
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        SchedulerRunner::run                             │
//! │                                                                         │
//! │   loop select! {                                                        │
//! │     interval.tick()          ──► jobs.sweep()       (every N secs)      │
//! │     sleep_until(report_at)   ──► jobs.daily_report(date), +1 day        │
//! │     trigger_rx.recv()        ──► jobs.sweep(), reply on oneshot         │
//! │     shutdown_rx.recv()       ──► break                                  │
//! │   }                                                                     │
//! │                                                                         │
//! │   SchedulerHandle ── shutdown() / trigger_sweep() ──► channels          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Job failures are logged and the loop carries on; the next tick retries.

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::alerts::{AlertJobs, SweepOutcome};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};

type SweepReply = oneshot::Sender<EngineResult<SweepOutcome>>;

/// Timer settings, taken from [`EngineConfig`] at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerSettings {
    pub sweep_interval: Duration,
    pub report_enabled: bool,
    pub report_hour: u32,
    pub report_minute: u32,
}

impl SchedulerSettings {
    pub fn from_config(config: &EngineConfig) -> Self {
        SchedulerSettings {
            sweep_interval: config.sweep_interval(),
            report_enabled: config.report.enabled,
            report_hour: config.report.hour,
            report_minute: config.report.minute,
        }
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

/// First report time strictly after `now` at `hour:minute` UTC.
///
/// ## Example
/// ```rust
/// use chrono::{TimeZone, Utc};
/// use till_engine::scheduler::next_report_time;
///
/// let now = Utc.with_ymd_and_hms(2024, 3, 10, 23, 0, 0).unwrap();
/// let next = next_report_time(now, 22, 0);
/// assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 11, 22, 0, 0).unwrap());
/// ```
pub fn next_report_time(now: DateTime<Utc>, hour: u32, minute: u32) -> DateTime<Utc> {
    match now.date_naive().and_hms_opt(hour, minute, 0) {
        Some(naive) => {
            let today = Utc.from_utc_datetime(&naive);
            if today > now {
                today
            } else {
                today + ChronoDuration::days(1)
            }
        }
        None => now + ChronoDuration::days(1),
    }
}

// =============================================================================
// Runner
// =============================================================================

pub struct SchedulerRunner {
    jobs: Arc<AlertJobs>,
    settings: SchedulerSettings,

    /// Monotonic deadline of the next report, and the UTC day it covers.
    report_at: Instant,
    report_date: NaiveDate,

    trigger_rx: mpsc::Receiver<SweepReply>,
    shutdown_rx: mpsc::Receiver<()>,
}

/// Controls a running [`SchedulerRunner`].
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    trigger_tx: mpsc::Sender<SweepReply>,
    shutdown_tx: mpsc::Sender<()>,
}

impl SchedulerHandle {
    /// Runs a sweep now and waits for its outcome.
    pub async fn trigger_sweep(&self) -> EngineResult<SweepOutcome> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.trigger_tx
            .send(reply_tx)
            .await
            .map_err(|_| EngineError::ChannelError("Scheduler is not running".into()))?;

        reply_rx
            .await
            .map_err(|_| EngineError::ChannelError("Scheduler dropped the sweep request".into()))?
    }

    /// Stops the runner after its current job.
    pub async fn shutdown(&self) -> EngineResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| EngineError::ChannelError("Shutdown channel closed".into()))
    }
}

impl SchedulerRunner {
    pub fn new(jobs: Arc<AlertJobs>, settings: SchedulerSettings) -> (Self, SchedulerHandle) {
        Self::starting_at(jobs, settings, Utc::now())
    }

    /// Like [`SchedulerRunner::new`] with an explicit wall-clock start, used
    /// to place the first report.
    pub fn starting_at(
        jobs: Arc<AlertJobs>,
        settings: SchedulerSettings,
        now: DateTime<Utc>,
    ) -> (Self, SchedulerHandle) {
        let (trigger_tx, trigger_rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let next = next_report_time(now, settings.report_hour, settings.report_minute);
        let wait = (next - now).to_std().unwrap_or(Duration::ZERO);

        let runner = SchedulerRunner {
            jobs,
            settings,
            report_at: Instant::now() + wait,
            report_date: next.date_naive(),
            trigger_rx,
            shutdown_rx,
        };

        (runner, SchedulerHandle { trigger_tx, shutdown_tx })
    }

    /// Runs until [`SchedulerHandle::shutdown`] is called or every handle
    /// is dropped. Returns at once, logging an error, when the sweep interval
    /// is zero or too large for the clock. The first timed sweep comes one interval after start;
    /// use [`SchedulerHandle::trigger_sweep`] for one at startup.
    pub async fn run(mut self) {
        info!(
            sweep_interval_secs = self.settings.sweep_interval.as_secs(),
            report_enabled = self.settings.report_enabled,
            next_report = %self.report_date,
            "Scheduler starting"
        );

        let period = self.settings.sweep_interval;
        let Some(first_sweep) = Instant::now().checked_add(period).filter(|_| !period.is_zero()) else {
            error!(?period, "Sweep interval out of range, scheduler not started");
            return;
        };
        let mut interval = tokio::time::interval_at(first_sweep, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.jobs.sweep().await {
                        error!(?e, "Low-stock sweep failed");
                    }
                }

                _ = tokio::time::sleep_until(self.report_at), if self.settings.report_enabled => {
                    let date = self.report_date;
                    if let Err(e) = self.jobs.daily_report(date).await {
                        error!(?e, date = %date, "Daily report failed");
                    }
                    self.report_at += Duration::from_secs(24 * 60 * 60);
                    self.report_date = date.succ_opt().unwrap_or(date);
                    debug!(next_report = %self.report_date, "Next daily report scheduled");
                }

                Some(reply) = self.trigger_rx.recv() => {
                    let outcome = self.jobs.sweep().await;
                    if let Err(e) = &outcome {
                        error!(?e, "Triggered sweep failed");
                    }
                    // caller may have gone away
                    let _ = reply.send(outcome);
                }

                _ = self.shutdown_rx.recv() => {
                    info!("Scheduler shutting down");
                    break;
                }
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
