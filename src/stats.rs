// This file is part of Stormwatch, an event-triggered storm video recorder.
// Copyright (C) 2026 The Stormwatch Authors; see AUTHORS and LICENSE.txt.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Fixed-window stream statistics: a moving average and a frame rate counter.

use base::clock::Clocks;
use std::cmp;
use std::ops::{Add, Div};
use std::time::Duration;

/// A value usable as a `MovingAverage` sample. Integer implementations keep
/// integer (truncating) division in `mean`; that's load-bearing for the
/// brightness baseline.
pub trait Sample: Copy + Add<Output = Self> + Div<Output = Self> {
    fn from_len(n: usize) -> Self;
}

impl Sample for i64 {
    fn from_len(n: usize) -> i64 {
        n as i64
    }
}

impl Sample for f64 {
    fn from_len(n: usize) -> f64 {
        n as f64
    }
}

/// Fixed-size circular window, pre-filled with an initial value so the mean
/// is defined from the first push. Not thread-safe; owned by one caller.
pub struct MovingAverage<T> {
    values: Vec<T>,
    position: usize,
    initial: T,
}

impl<T: Sample> MovingAverage<T> {
    /// Creates a window of the given size. A size of zero is clamped to one.
    pub fn new(window: usize, initial: T) -> Self {
        let window = cmp::max(window, 1);
        MovingAverage {
            values: vec![initial; window],
            position: 0,
            initial,
        }
    }

    /// Overwrites the oldest sample.
    pub fn push(&mut self, value: T) {
        self.values[self.position] = value;
        self.position = (self.position + 1) % self.values.len();
    }

    /// Returns `(initial + Σ samples) / N`.
    pub fn mean(&self) -> T {
        let sum = self.values.iter().fold(self.initial, |a, &v| a + v);
        sum / T::from_len(self.values.len())
    }
}

/// Wall-clock frame rate counter: instantaneous rate per `update`, smoothed
/// over a small moving window.
pub struct FpsCounter<C: Clocks> {
    clocks: C,
    last: Duration,
    samples: MovingAverage<f64>,
}

/// Window size used by `FpsCounter::new`.
const FPS_SAMPLES: usize = 5;

impl<C: Clocks> FpsCounter<C> {
    pub fn new(clocks: C) -> Self {
        let last = clocks.monotonic();
        FpsCounter {
            clocks,
            last,
            samples: MovingAverage::new(FPS_SAMPLES, 0.),
        }
    }

    /// Records a frame boundary: pushes the instantaneous rate since the
    /// previous boundary and restarts the interval. The first update after
    /// construction may push an extremely large value; the window absorbs it.
    pub fn update(&mut self) {
        self.samples.push(self.fps());
        self.last = self.clocks.monotonic();
    }

    /// The instantaneous frame rate since the last `update`.
    pub fn fps(&self) -> f64 {
        Self::rate(self.clocks.monotonic() - self.last)
    }

    /// The window-averaged frame rate.
    pub fn fps_averaged(&self) -> f64 {
        self.samples.mean()
    }

    fn rate(elapsed: Duration) -> f64 {
        1000. / (elapsed.as_secs_f64() * 1000.)
    }
}
