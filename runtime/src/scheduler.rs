//! Periodic penalty accrual.
//!
//! The scheduler is an owned value: nothing runs until [`PenaltyScheduler::start`]
//! is called, and the returned [`SchedulerHandle`] stops the task. Ticks run
//! one at a time on a single task, so two accrual passes never overlap; a tick
//! that overruns the period causes the missed ticks to be skipped.

use crate::metrics::AccrualMetrics;
use libris_core::{AccrualReport, BorrowLifecycle, Result};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval_at};
use tracing::{debug, error, info, warn};

/// Default time between accrual passes.
pub const DEFAULT_ACCRUAL_PERIOD: Duration = Duration::from_secs(60);

/// Drives [`BorrowLifecycle::accrue_penalties`] on a fixed period.
pub struct PenaltyScheduler {
    lifecycle: BorrowLifecycle,
    period: Duration,
    shutdown_timeout: Duration,
}

impl PenaltyScheduler {
    /// Create a scheduler ticking every [`DEFAULT_ACCRUAL_PERIOD`].
    #[must_use]
    pub const fn new(lifecycle: BorrowLifecycle) -> Self {
        Self {
            lifecycle,
            period: DEFAULT_ACCRUAL_PERIOD,
            shutdown_timeout: Duration::from_secs(10),
        }
    }

    /// Set the tick period.
    #[must_use]
    pub const fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// Set how long [`SchedulerHandle::stop`] waits for an in-flight tick.
    #[must_use]
    pub const fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Run a single accrual pass and record its metrics.
    ///
    /// # Errors
    ///
    /// Returns the storage error if overdue loans could not be listed.
    pub async fn tick(lifecycle: &BorrowLifecycle) -> Result<AccrualReport> {
        let started = Instant::now();
        match lifecycle.accrue_penalties().await {
            Ok(report) => {
                AccrualMetrics::record_run(&report, started.elapsed());
                Ok(report)
            }
            Err(err) => {
                AccrualMetrics::record_tick_error();
                Err(err)
            }
        }
    }

    /// Spawn the accrual task. The first pass runs one period after start.
    ///
    /// A zero period falls back to [`DEFAULT_ACCRUAL_PERIOD`].
    #[must_use]
    pub fn start(self) -> SchedulerHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let period = if self.period.is_zero() {
            warn!(
                default_secs = DEFAULT_ACCRUAL_PERIOD.as_secs(),
                "Accrual period must be non-zero, using the default"
            );
            DEFAULT_ACCRUAL_PERIOD
        } else {
            self.period
        };
        let lifecycle = self.lifecycle;

        info!(period_secs = period.as_secs_f64(), "Starting penalty scheduler");

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(err) = Self::tick(&lifecycle).await {
                            error!(error = %err, "Penalty accrual tick failed");
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            debug!("Penalty scheduler received shutdown signal");
                            break;
                        }
                    }
                }
            }
        });

        SchedulerHandle {
            shutdown_tx,
            task,
            shutdown_timeout: self.shutdown_timeout,
        }
    }
}

/// Handle to a running [`PenaltyScheduler`].
pub struct SchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
    shutdown_timeout: Duration,
}

impl SchedulerHandle {
    /// True while the task is alive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Signal shutdown and wait for the in-flight tick, if any, to finish.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        match tokio::time::timeout(self.shutdown_timeout, self.task).await {
            Ok(Ok(())) => info!("Penalty scheduler stopped"),
            Ok(Err(e)) => warn!(error = %e, "Penalty scheduler task failed"),
            Err(_) => warn!("Penalty scheduler shutdown timed out"),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use chrono::Duration as ChronoDuration;
    use libris_core::{Clock, Loan, LoanId};
    use libris_testing::{LibraryFixture, ManualClock};
    use std::sync::Arc;

    fn overdue_setup() -> (LibraryFixture, BorrowLifecycle) {
        let fixture = LibraryFixture::new();
        let clock = Arc::new(ManualClock::default());
        let book = fixture.book("Algorithms", 1);
        let ada = fixture.student("S100", "ada@college.edu");
        let now = clock.now();
        fixture.store().insert_loan(Loan {
            id: LoanId::new(),
            book_id: book.id,
            profile_id: ada.profile.id,
            request_id: None,
            borrowed_at: now - ChronoDuration::hours(3),
            due_date: now - ChronoDuration::minutes(47),
            returned: false,
            returned_at: None,
        });
        let lifecycle = BorrowLifecycle::new(fixture.store_arc(), clock);
        (fixture, lifecycle)
    }

    #[tokio::test]
    async fn tick_runs_one_accrual_pass() {
        let (fixture, lifecycle) = overdue_setup();

        let report = PenaltyScheduler::tick(&lifecycle).await.unwrap();

        assert_eq!(report.updated, 1);
        assert_eq!(fixture.store().penalties()[0].amount, 30);
    }

    #[tokio::test]
    async fn started_scheduler_accrues_and_stops() {
        let (fixture, lifecycle) = overdue_setup();

        let handle = PenaltyScheduler::new(lifecycle)
            .with_period(Duration::from_millis(20))
            .start();
        assert!(handle.is_running());

        tokio::time::sleep(Duration::from_millis(120)).await;
        handle.stop().await;

        let penalties = fixture.store().penalties();
        assert_eq!(penalties.len(), 1);
        assert_eq!(penalties[0].days_overdue, 3);
    }

    #[tokio::test]
    async fn nothing_runs_before_the_first_period() {
        let (fixture, lifecycle) = overdue_setup();

        let handle = PenaltyScheduler::new(lifecycle)
            .with_period(Duration::from_secs(3600))
            .start();
        tokio::time::sleep(Duration::from_millis(30)).await;
        handle.stop().await;

        assert!(fixture.store().penalties().is_empty());
    }

    #[tokio::test]
    async fn zero_period_keeps_the_scheduler_alive() {
        let (fixture, lifecycle) = overdue_setup();

        let handle = PenaltyScheduler::new(lifecycle)
            .with_period(Duration::ZERO)
            .start();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(handle.is_running());
        handle.stop().await;
        assert!(fixture.store().penalties().is_empty());
    }
}
