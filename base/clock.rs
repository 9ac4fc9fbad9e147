// This file is part of Stormwatch, an event-triggered storm video recorder.
// Copyright (C) 2026 The Stormwatch Authors; see AUTHORS and LICENSE.txt.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Clock interface and implementations for testability.

use log::warn;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Abstract interface to a monotonic clock. This is for testability.
pub trait Clocks: Send + Sync + 'static {
    /// Gets the time elapsed since some fixed epoch (process start for the
    /// real implementation). Only differences between two `monotonic` calls
    /// on the same clock are meaningful.
    fn monotonic(&self) -> Duration;

    /// Causes the current thread to sleep for the specified time.
    fn sleep(&self, how_long: Duration);
}

#[derive(Copy, Clone)]
pub struct RealClocks {
    epoch: Instant,
}

impl RealClocks {
    pub fn new() -> Self {
        RealClocks {
            epoch: Instant::now(),
        }
    }
}

impl Default for RealClocks {
    fn default() -> Self {
        Self::new()
    }
}

impl Clocks for RealClocks {
    fn monotonic(&self) -> Duration {
        self.epoch.elapsed()
    }

    fn sleep(&self, how_long: Duration) {
        thread::sleep(how_long)
    }
}

/// Logs a warning if the TimerGuard lives "too long", using the label created by a supplied
/// function.
pub struct TimerGuard<'a, C: Clocks + ?Sized, S: AsRef<str>, F: FnOnce() -> S + 'a> {
    clocks: &'a C,
    label_f: Option<F>,
    start: Duration,
}

impl<'a, C: Clocks + ?Sized, S: AsRef<str>, F: FnOnce() -> S + 'a> TimerGuard<'a, C, S, F> {
    pub fn new(clocks: &'a C, label_f: F) -> Self {
        TimerGuard {
            clocks,
            label_f: Some(label_f),
            start: clocks.monotonic(),
        }
    }
}

impl<'a, C, S, F> Drop for TimerGuard<'a, C, S, F>
where
    C: Clocks + ?Sized,
    S: AsRef<str>,
    F: FnOnce() -> S + 'a,
{
    fn drop(&mut self) {
        let elapsed = self.clocks.monotonic() - self.start;
        if elapsed.as_secs() >= 1 {
            let label_f = self.label_f.take().unwrap();
            warn!("{} took {:?}!", label_f().as_ref(), elapsed);
        }
    }
}

/// Simulated clock for testing.
#[derive(Clone)]
pub struct SimulatedClocks(Arc<SimulatedClocksInner>);

struct SimulatedClocksInner {
    uptime: Mutex<Duration>,
}

impl SimulatedClocks {
    pub fn new() -> Self {
        SimulatedClocks(Arc::new(SimulatedClocksInner {
            uptime: Mutex::new(Duration::from_secs(0)),
        }))
    }
}

impl Default for SimulatedClocks {
    fn default() -> Self {
        Self::new()
    }
}

impl Clocks for SimulatedClocks {
    fn monotonic(&self) -> Duration {
        *self.0.uptime.lock()
    }

    /// Advances the clock by the specified amount without actually sleeping.
    fn sleep(&self, how_long: Duration) {
        let mut l = self.0.uptime.lock();
        *l += how_long;
    }
}
