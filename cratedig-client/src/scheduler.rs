//! Client-side rate scheduler.
//!
//! Two states per instance: `Flowing` (admissions granted immediately) and
//! `Throttled` (callers suspend on a shared gate). Every admission attempt
//! recomputes the rolling window; the scheduler throttles when the window
//! is full or a failure cool-down is active. A background task re-checks
//! the condition on a fixed interval and releases every waiter together
//! when it clears.
//!
//! Read admissions contribute samples to the window; write admissions wait
//! for admission like everyone else but never count against the window.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use cratedig_core::SchedulerConfig;
use tokio::sync::watch;
use tokio::time::Instant;

/// How an admission is classified for window accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
    /// Cacheable read; samples the rate window.
    Read,
    /// Write-type request; waits for admission without sampling.
    Write,
}

/// Throttles outgoing requests to a maximum rate and pauses everyone after
/// remote failures.
pub struct RateScheduler {
    config: SchedulerConfig,
    state: Arc<Mutex<SchedulerState>>,
}

struct SchedulerState {
    samples: VecDeque<Instant>,
    waiting: Vec<String>,
    paused_until: Option<Instant>,
    failure_generation: u64,
    gate: Option<watch::Sender<()>>,
}

impl SchedulerState {
    fn prune_window(&mut self, now: Instant, window: std::time::Duration) {
        while let Some(front) = self.samples.front() {
            if now.duration_since(*front) >= window {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    fn is_clear(&self, now: Instant, ceiling: usize) -> bool {
        let paused = self.paused_until.is_some_and(|until| now < until);
        !paused && self.samples.len() < ceiling
    }
}

impl RateScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(SchedulerState {
                samples: VecDeque::new(),
                waiting: Vec::new(),
                paused_until: None,
                failure_generation: 0,
                gate: None,
            })),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    fn lock_state(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Wait until this caller may proceed with a request.
    ///
    /// Returns immediately while `Flowing`; otherwise the caller suspends
    /// on the shared gate and re-runs the admission check when the gate
    /// releases. There is no per-caller timeout and no ordering guarantee
    /// among waiters released together.
    pub async fn admit(&self, key: &str, class: RequestClass) {
        loop {
            let mut gate_rx = {
                let mut state = self.lock_state();
                let now = Instant::now();
                state.prune_window(now, self.config.window);
                if state.is_clear(now, self.config.ceiling) {
                    if class == RequestClass::Read {
                        state.samples.push_back(now);
                    }
                    return;
                }
                let rx = match &state.gate {
                    Some(gate) => gate.subscribe(),
                    None => {
                        let (tx, rx) = watch::channel(());
                        state.gate = Some(tx);
                        tracing::debug!(key, "scheduler throttled");
                        spawn_recheck(Arc::clone(&self.state), self.config.clone());
                        rx
                    }
                };
                state.waiting.push(key.to_string());
                rx
            };
            let _ = gate_rx.changed().await;
        }
    }

    /// Enter (or extend) the failure cool-down.
    ///
    /// All admissions block until the cool-down elapses, regardless of
    /// window occupancy. A newer failure extends the pause; the timer
    /// belonging to an older failure leaves the newer pause alone.
    ///
    /// Must be called from within a tokio runtime.
    pub fn note_failure(&self) {
        let generation = {
            let mut state = self.lock_state();
            state.failure_generation += 1;
            state.paused_until = Some(Instant::now() + self.config.cool_down);
            state.failure_generation
        };
        tracing::debug!(generation, "scheduler cool-down after remote failure");

        let shared = Arc::clone(&self.state);
        let cool_down = self.config.cool_down;
        tokio::spawn(async move {
            tokio::time::sleep(cool_down).await;
            let mut state = shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            if state.failure_generation == generation {
                state.paused_until = None;
            }
        });
    }

    /// Keys currently suspended on the gate.
    pub fn waiting(&self) -> Vec<String> {
        self.lock_state().waiting.clone()
    }

    /// Read admissions inside the current window.
    pub fn window_len(&self) -> usize {
        let mut state = self.lock_state();
        state.prune_window(Instant::now(), self.config.window);
        state.samples.len()
    }

    pub fn is_throttled(&self) -> bool {
        self.lock_state().gate.is_some()
    }
}

/// Periodic re-check while `Throttled`. Releases the gate (waking every
/// waiter together), clears the waiting list, and exits once the throttle
/// condition no longer holds.
fn spawn_recheck(state: Arc<Mutex<SchedulerState>>, config: SchedulerConfig) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(config.recheck_interval);
        interval.tick().await; // first tick completes immediately
        loop {
            interval.tick().await;
            let released = {
                let mut s = state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                let now = Instant::now();
                s.prune_window(now, config.window);
                if s.is_clear(now, config.ceiling) {
                    if let Some(gate) = s.gate.take() {
                        s.waiting.clear();
                        let _ = gate.send(());
                    }
                    true
                } else {
                    false
                }
            };
            if released {
                tracing::debug!("scheduler flowing again");
                return;
            }
        }
    });
}
