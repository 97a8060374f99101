//! Polling clock: one re-armable one-shot timer plus a stopwatch.
//!
//! Each `arm` bumps a generation counter and stamps it on the [`Tick`] the
//! timer task delivers. A tick is honoured only if [`PollingClock::claim`]
//! sees its generation still current, so a fire that lost the race against
//! `pause` or a re-arm is dropped instead of advancing the queue twice.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

/// Delivered to the fire callback when an armed timer expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub generation: u64,
    /// Duration the timer was armed for.
    pub duration: Duration,
}

#[derive(Debug)]
enum ClockState {
    Idle,
    Armed {
        started: Instant,
        handle: JoinHandle<()>,
    },
}

#[derive(Debug)]
pub struct PollingClock {
    state: ClockState,
    generation: u64,
}

impl Default for PollingClock {
    fn default() -> Self {
        Self::new()
    }
}

impl PollingClock {
    pub fn new() -> Self {
        Self {
            state: ClockState::Idle,
            generation: 0,
        }
    }

    /// Start the stopwatch and run `on_fire` once after `duration`.
    ///
    /// Any timer already in flight is cancelled first.
    pub fn arm<F, Fut>(&mut self, duration: Duration, on_fire: F)
    where
        F: FnOnce(Tick) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        self.generation += 1;
        let tick = Tick {
            generation: self.generation,
            duration,
        };
        let handle = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            on_fire(tick).await;
        });
        self.state = ClockState::Armed {
            started: Instant::now(),
            handle,
        };
        debug!(generation = tick.generation, ?duration, "polling clock armed");
    }

    /// Cancel the pending timer and return the time elapsed since `arm`.
    /// Returns `None` while idle.
    pub fn pause(&mut self) -> Option<Duration> {
        match std::mem::replace(&mut self.state, ClockState::Idle) {
            ClockState::Armed { started, handle } => {
                handle.abort();
                let elapsed = started.elapsed();
                debug!(generation = self.generation, ?elapsed, "polling clock paused");
                Some(elapsed)
            }
            ClockState::Idle => None,
        }
    }

    /// Cancel the pending timer, if any, discarding the stopwatch.
    pub fn cancel(&mut self) {
        if let ClockState::Armed { handle, .. } =
            std::mem::replace(&mut self.state, ClockState::Idle)
        {
            handle.abort();
        }
    }

    /// Accept a fired tick. Returns false for a stale tick.
    ///
    /// Must be called from the fire callback before re-arming: the clock
    /// goes idle without aborting the task that is delivering the tick.
    pub fn claim(&mut self, tick: Tick) -> bool {
        if !self.is_armed() || tick.generation != self.generation {
            return false;
        }
        self.state = ClockState::Idle;
        true
    }

    pub fn is_armed(&self) -> bool {
        matches!(self.state, ClockState::Armed { .. })
    }

    /// Time since the last `arm`, while armed.
    pub fn elapsed(&self) -> Option<Duration> {
        match &self.state {
            ClockState::Armed { started, .. } => Some(started.elapsed()),
            ClockState::Idle => None,
        }
    }
}

impl Drop for PollingClock {
    fn drop(&mut self) {
        self.cancel();
    }
}
