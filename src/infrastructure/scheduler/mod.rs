//! Periodic background jobs
//!
//! Each job runs on its own tokio task and ticks at a fixed period, the first
//! tick one full period after registration. Ticks missed while a run is still
//! in progress are skipped, never queued. A run that has started is allowed to
//! finish when shutdown is requested.

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

pub struct Scheduler {
    shutdown: CancellationToken,
    jobs: Vec<(&'static str, JoinHandle<()>)>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::with_token(CancellationToken::new())
    }

    /// Share cancellation with the rest of the process
    pub fn with_token(shutdown: CancellationToken) -> Self {
        Self {
            shutdown,
            jobs: Vec::new(),
        }
    }

    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    /// Run `job` every `period` until shutdown
    pub fn every<F, Fut>(&mut self, name: &'static str, period: Duration, job: F)
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let shutdown = self.shutdown.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            tracing::info!("Scheduled job '{}' every {:?}", name, period);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        tracing::debug!("Running job '{}'", name);
                        job().await;
                    }
                }
            }

            tracing::info!("Job '{}' stopped", name);
        });
        self.jobs.push((name, handle));
    }

    /// Cancel every job and wait for in-flight runs to finish
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        for (name, handle) in self.jobs {
            if let Err(e) = handle.await {
                tracing::error!("Job '{}' ended abnormally: {}", name, e);
            }
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
