//! Tagged periodic job set.
//!
//! A `JobSet` owns one timer task that fires every job on a fixed period.
//! The first tick fires immediately on `start`. Each fire spawns the job's
//! action and does not wait for it, so a slow module never delays its
//! siblings or the next tick.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace};

use crate::domain::{CamError, Result};

/// Tag carried by every collection trigger job.
pub const TRIGGER_TAG: &str = "TriggerCM";

/// Work performed when a job fires.
#[async_trait]
pub trait JobAction: Send + Sync {
    async fn run(&self);
}

struct Job {
    tags: Vec<String>,
    action: Arc<dyn JobAction>,
    last_run: Option<DateTime<Utc>>,
}

impl Job {
    fn fire(&mut self, now: DateTime<Utc>) {
        self.last_run = Some(now);
        let action = Arc::clone(&self.action);
        tokio::spawn(async move { action.run().await });
    }
}

#[derive(Default)]
struct Shared {
    jobs: Vec<Job>,
    next_run: Option<DateTime<Utc>>,
}

fn guard(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A set of jobs sharing one period and one timer.
pub struct JobSet {
    period: Duration,
    shared: Arc<Mutex<Shared>>,
    runner: Option<JoinHandle<()>>,
}

impl JobSet {
    /// Fails with `Validation` for a zero period.
    pub fn new(period: Duration) -> Result<Self> {
        if period.is_zero() {
            return Err(CamError::validation("job period must be positive"));
        }
        Ok(Self {
            period,
            shared: Arc::new(Mutex::new(Shared::default())),
            runner: None,
        })
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Register a job. Jobs can only be added before `start`.
    pub fn add_job(&mut self, tags: Vec<String>, action: Arc<dyn JobAction>) -> Result<()> {
        if self.runner.is_some() {
            return Err(CamError::validation("cannot add jobs to a started job set"));
        }
        if tags.is_empty() {
            return Err(CamError::validation("job needs at least one tag"));
        }
        guard(&self.shared).jobs.push(Job {
            tags,
            action,
            last_run: None,
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        guard(&self.shared).jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Spawn the timer task. Calling `start` on a running set is a no-op.
    pub fn start(&mut self) {
        if self.is_running() {
            return;
        }
        let shared = Arc::clone(&self.shared);
        let period = self.period;
        let chrono_period = chrono::Duration::from_std(period).ok();

        guard(&shared).next_run = Some(Utc::now());
        self.runner = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let now = Utc::now();
                let mut state = guard(&shared);
                trace!(jobs = state.jobs.len(), "job set tick");
                for job in state.jobs.iter_mut() {
                    job.fire(now);
                }
                state.next_run = chrono_period.and_then(|p| now.checked_add_signed(p));
            }
        }));
        debug!(period_secs = period.as_secs(), "job set started");
    }

    /// Abort the timer task. Returns whether it was running.
    pub fn stop(&mut self) -> bool {
        let was_running = self.is_running();
        if let Some(handle) = self.runner.take() {
            handle.abort();
        }
        guard(&self.shared).next_run = None;
        was_running
    }

    pub fn is_running(&self) -> bool {
        self.runner.as_ref().map_or(false, |h| !h.is_finished())
    }

    /// Fire every job carrying `tag` now, independent of the timer.
    pub fn run_by_tag(&self, tag: &str) -> usize {
        let now = Utc::now();
        let mut state = guard(&self.shared);
        let mut fired = 0;
        for job in state.jobs.iter_mut().filter(|j| j.tags.iter().any(|t| t == tag)) {
            job.fire(now);
            fired += 1;
        }
        fired
    }

    /// Most recent run among jobs carrying `tag`.
    pub fn last_run(&self, tag: &str) -> Option<DateTime<Utc>> {
        guard(&self.shared)
            .jobs
            .iter()
            .filter(|j| j.tags.iter().any(|t| t == tag))
            .filter_map(|j| j.last_run)
            .max()
    }

    /// Scheduled time of the next tick, while running.
    pub fn next_run(&self) -> Option<DateTime<Utc>> {
        if !self.is_running() {
            return None;
        }
        guard(&self.shared).next_run
    }
}

impl Drop for JobSet {
    fn drop(&mut self) {
        if let Some(handle) = self.runner.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counter(AtomicUsize);

    #[async_trait]
    impl JobAction for Counter {
        async fn run(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn tags(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn zero_period_rejected() {
        assert!(JobSet::new(Duration::ZERO).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn fires_immediately_then_every_period() {
        let counter = Arc::new(Counter::default());
        let mut set = JobSet::new(Duration::from_secs(60)).unwrap();
        set.add_job(tags(&[TRIGGER_TAG]), counter.clone()).unwrap();
        assert!(set.last_run(TRIGGER_TAG).is_none());

        set.start();
        settle().await;
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
        assert!(set.last_run(TRIGGER_TAG).is_some());
        assert!(set.next_run().is_some());

        tokio::time::advance(Duration::from_secs(60)).await;
        settle().await;
        assert_eq!(counter.0.load(Ordering::SeqCst), 2);

        assert!(set.stop());
        assert!(!set.is_running());
        assert!(set.next_run().is_none());

        tokio::time::advance(Duration::from_secs(600)).await;
        settle().await;
        assert_eq!(counter.0.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn run_by_tag_only_fires_matching_jobs() {
        let tls = Arc::new(Counter::default());
        let auth = Arc::new(Counter::default());
        let mut set = JobSet::new(Duration::from_secs(300)).unwrap();
        set.add_job(tags(&[TRIGGER_TAG, "TlsVersion"]), tls.clone())
            .unwrap();
        set.add_job(tags(&[TRIGGER_TAG, "OAuthGrantTypes"]), auth.clone())
            .unwrap();

        assert_eq!(set.run_by_tag("TlsVersion"), 1);
        assert_eq!(set.run_by_tag("Unknown"), 0);
        settle().await;
        assert_eq!(tls.0.load(Ordering::SeqCst), 1);
        assert_eq!(auth.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn jobs_cannot_be_added_after_start() {
        let mut set = JobSet::new(Duration::from_secs(300)).unwrap();
        set.start();
        let err = set
            .add_job(tags(&[TRIGGER_TAG]), Arc::new(Counter::default()))
            .unwrap_err();
        assert_eq!(err.kind(), crate::domain::ErrorKind::Validation);
    }
}
