//! Timing primitives shared by acquisition and recording threads
//!
//! - [`StopSignal`]: cooperative cancellation token whose waits wake
//!   immediately when stop is requested.
//! - [`Backoff`]: exponential retry delay with floor and cap.
//! - [`TickScheduler`]: fixed-period, drift-corrected tick schedule on the
//!   monotonic clock.
//! - [`join_with_timeout`]: bounded thread join.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Cooperative cancellation token shared between a controller and a worker
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    inner: Arc<StopInner>,
}

#[derive(Debug, Default)]
struct StopInner {
    stopped: Mutex<bool>,
    cv: Condvar,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request stop and wake every waiter
    pub fn stop(&self) {
        let mut stopped = self.inner.stopped.lock();
        *stopped = true;
        self.inner.cv.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        *self.inner.stopped.lock()
    }

    /// Sleep for up to `timeout`. Returns `true` if stop was requested.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut stopped = self.inner.stopped.lock();
        while !*stopped {
            if self.inner.cv.wait_until(&mut stopped, deadline).timed_out() {
                break;
            }
        }
        *stopped
    }
}

/// Exponential retry delay: floor, 2x floor, ... capped at `cap`
#[derive(Debug, Clone)]
pub struct Backoff {
    floor: Duration,
    cap: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(floor: Duration, cap: Duration) -> Self {
        let cap = cap.max(floor);
        Self {
            floor,
            cap,
            current: floor,
        }
    }

    /// Delay to sleep now; doubles the following delay
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.cap);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.floor;
    }

    pub fn current(&self) -> Duration {
        self.current
    }
}

/// Fixed-period tick schedule with drift correction.
///
/// After each tick the next deadline becomes `max(previous + interval, now)`:
/// a slow iteration delays the schedule once instead of compounding, and the
/// schedule never moves backward.
#[derive(Debug, Clone)]
pub struct TickScheduler {
    interval: Duration,
    next_tick: Instant,
}

impl TickScheduler {
    pub fn new(fps: f64, start: Instant) -> Self {
        let fps = if fps.is_finite() && fps > 0.0 { fps } else { 1.0 };
        Self {
            interval: Duration::from_secs_f64(1.0 / fps),
            next_tick: start,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn next_tick(&self) -> Instant {
        self.next_tick
    }

    /// Time to wait at `now` before the next tick is due
    pub fn delay_until_tick(&self, now: Instant) -> Duration {
        self.next_tick.saturating_duration_since(now)
    }

    /// Record that the tick finished at `now` and schedule the next one
    pub fn advance(&mut self, now: Instant) -> Instant {
        let previous = self.next_tick;
        self.next_tick = (previous + self.interval).max(now);
        crate::assert_invariant!(
            self.next_tick >= previous,
            "Tick schedule never moves backward",
            "timing::TickScheduler"
        );
        self.next_tick
    }
}

/// Join `handle`, waiting at most `timeout`.
///
/// Returns `None` when the thread did not finish in time (it is detached and
/// left running) or when it panicked.
pub fn join_with_timeout<T>(handle: JoinHandle<T>, timeout: Duration) -> Option<T> {
    let start = Instant::now();
    loop {
        if handle.is_finished() {
            return match handle.join() {
                Ok(value) => Some(value),
                Err(_) => {
                    log::error!("Worker thread panicked");
                    None
                }
            };
        }
        if start.elapsed() >= timeout {
            let name = handle.thread().name().unwrap_or("unnamed").to_string();
            log::error!(
                "Thread {} did not stop within {:?}; abandoning it",
                name,
                timeout
            );
            return None;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}
