// This file is part of Stormwatch, an event-triggered storm video recorder.
// Copyright (C) 2026 The Stormwatch Authors; see AUTHORS and LICENSE.txt.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Brightness-edge detector with debounce and post-trigger delay.
//!
//! The detector keeps a moving-average baseline of per-frame brightness. A
//! frame whose brightness exceeds the baseline by more than the configured
//! threshold arms the trigger; after the post-trigger delay has elapsed (so
//! the clip gets its tail), `should_capture` reports the event. A debounce
//! interval suppresses re-arming within a single flash, and nothing fires
//! until a full window of real samples has accumulated.

use crate::frame;
use crate::stats::MovingAverage;
use failure::Error;
use log::info;
use opencv::core::Mat;
use std::cmp;

pub struct VideoTrigger {
    debounce_count: usize,
    trip_threshold: u8,
    post_trigger_count: usize,

    baseline: MovingAverage<i64>,
    debounce_left: usize,
    delay_left: usize,
    armed_delay: bool,
    baseline_filled: bool,
    warmup_left: usize,
}

impl VideoTrigger {
    /// All intervals are given in seconds and converted to whole frame counts
    /// at the supplied rate. An edge-detection window that rounds to zero is
    /// clamped to one sample.
    pub fn new(
        fps: f64,
        edge_detection_seconds: f64,
        debounce_seconds: f64,
        trigger_delay: f64,
        trigger_threshold: u8,
    ) -> Self {
        let window = cmp::max((edge_detection_seconds * fps).round() as usize, 1);
        VideoTrigger {
            debounce_count: (debounce_seconds * fps).round() as usize,
            trip_threshold: trigger_threshold,
            post_trigger_count: (trigger_delay * fps).round() as usize,
            baseline: MovingAverage::new(window, 0),
            debounce_left: 0,
            delay_left: 0,
            armed_delay: false,
            baseline_filled: false,
            warmup_left: window,
        }
    }

    /// Feeds one frame; returns true iff a clip should be cut now.
    pub fn should_capture(&mut self, frame: &Mat) -> Result<bool, Error> {
        if self.warmup_left > 0 {
            self.warmup_left -= 1;
        } else {
            self.baseline_filled = true;
        }

        let brightness = i64::from(frame::mean_intensity(frame)?);
        self.baseline.push(brightness);
        let mean = self.baseline.mean();

        if self.debounce_left > 0 {
            self.debounce_left -= 1;
        }

        if !self.armed_delay
            && self.debounce_left == 0
            && brightness > mean
            && (brightness - mean) > i64::from(self.trip_threshold)
        {
            self.debounce_left = self.debounce_count;
            self.delay_left = self.post_trigger_count;
            self.armed_delay = true;
            info!("brightness edge ({} > {})", brightness, mean);
        }

        if self.delay_left > 0 {
            self.delay_left -= 1;
        } else if self.armed_delay {
            self.armed_delay = false;
            // Don't fire on events seen before a full window of real samples.
            return Ok(self.baseline_filled);
        }

        Ok(false)
    }

    /// How many frames after the event the clip's tail extends; the encoder
    /// seeks back this far from the end to pick a representative thumbnail.
    pub fn seek_for_thumbnail(&self) -> usize {
        self.post_trigger_count
    }
}
