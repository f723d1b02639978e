//! Count/time bounded coalescing windows keyed by `(service_id, metric_id)`.
//!
//! Every read-modify-write of a window happens under one lock, so "is this
//! the first arrival" and "increment the counter" are a single step.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;

/// `(service_id, metric_id)`
pub type WindowKey = (String, String);

/// What the caller must do after recording one arrival.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arrival {
    /// First result of a new window: arm a timer for `generation` that
    /// fires at `deadline`.
    First { generation: u64, deadline: Instant },
    /// The threshold was reached: recompute now. The window is already reset.
    Threshold,
    /// Counted; an armed timer will handle it.
    Accrued,
}

#[derive(Debug, Default)]
struct Window {
    generation: u64,
    count: u64,
    deadline: Option<Instant>,
}

impl Window {
    fn reset(&mut self) {
        self.count = 0;
        self.deadline = None;
        self.generation += 1;
    }
}

#[derive(Debug)]
pub struct CalcWindows {
    threshold: u64,
    window: Duration,
    windows: Mutex<HashMap<WindowKey, Window>>,
}

impl CalcWindows {
    pub fn new(threshold: u64, window: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    fn guard(&self) -> MutexGuard<'_, HashMap<WindowKey, Window>> {
        self.windows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record one result for `key`.
    pub fn arrive(&self, key: &WindowKey) -> Arrival {
        let mut windows = self.guard();
        let window = windows.entry(key.clone()).or_default();

        let first = window.count == 0;
        window.count += 1;

        if window.count >= self.threshold {
            window.reset();
            return Arrival::Threshold;
        }
        if first {
            let deadline = Instant::now() + self.window;
            window.deadline = Some(deadline);
            return Arrival::First {
                generation: window.generation,
                deadline,
            };
        }
        Arrival::Accrued
    }

    /// Close the window armed for `generation`.
    ///
    /// Returns `true` when the caller should recompute: the window was not
    /// already closed by the threshold and holds at least one result.
    pub fn expire(&self, key: &WindowKey, generation: u64) -> bool {
        let mut windows = self.guard();
        match windows.get_mut(key) {
            Some(w) if w.generation == generation && w.count > 0 => {
                w.reset();
                true
            }
            _ => false,
        }
    }

    /// Results counted in the open window for `key`.
    pub fn pending(&self, key: &WindowKey) -> u64 {
        self.guard().get(key).map_or(0, |w| w.count)
    }

    /// When the open window for `key` closes, if one is open.
    pub fn deadline(&self, key: &WindowKey) -> Option<Instant> {
        self.guard().get(key).and_then(|w| w.deadline)
    }
}
