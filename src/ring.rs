// This file is part of Stormwatch, an event-triggered storm video recorder.
// Copyright (C) 2026 The Stormwatch Authors; see AUTHORS and LICENSE.txt.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Bounded, pre-allocated circular buffer of frames.

use crate::frame;
use failure::Error;
use opencv::core::{Mat, Size};
use opencv::prelude::*;
use std::cmp;

/// Holds the last `capacity` frames in capture order. The buffer is filled
/// with blank frames of the target dimensions at construction so a snapshot
/// is well-defined before the first real frame arrives.
///
/// Single-writer: only the capture worker pushes and snapshots, so there is
/// no locking here.
pub struct FrameRing {
    frames: Vec<Mat>,
    index: usize,
}

impl FrameRing {
    pub fn new(capacity: usize, dims: Size) -> Result<Self, Error> {
        let capacity = cmp::max(capacity, 1);
        let mut frames = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            frames.push(frame::blank(dims)?);
        }
        Ok(FrameRing { frames, index: 0 })
    }

    pub fn capacity(&self) -> usize {
        self.frames.len()
    }

    /// Overwrites the slot at the write cursor and advances it.
    pub fn push(&mut self, frame: Mat) {
        self.frames[self.index] = frame;
        self.index = (self.index + 1) % self.frames.len();
    }

    /// Clones the buffer contents in chronological order into an owned
    /// sequence of `capacity + 1` frames; the oldest frame repeats as the
    /// final element. The clones isolate the caller from the ring, which may
    /// be overwritten as soon as this returns.
    pub fn snapshot_ordered(&self) -> Result<Vec<Mat>, Error> {
        let n = self.frames.len();
        let mut snapshot = Vec::with_capacity(n + 1);
        for k in 0..=n {
            snapshot.push(self.frames[(self.index + k) % n].try_clone()?);
        }
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::FrameRing;
    use crate::frame::mean_intensity;
    use crate::testutil::{self, solid};
    use opencv::core::Size;

    const DIMS: Size = Size {
        width: 4,
        height: 4,
    };

    #[test]
    fn prefilled_with_blanks() {
        testutil::init();
        let ring = FrameRing::new(3, DIMS).unwrap();
        let snapshot = ring.snapshot_ordered().unwrap();
        assert_eq!(snapshot.len(), 4);
        for f in &snapshot {
            assert_eq!(mean_intensity(f).unwrap(), 0);
        }
    }

    #[test]
    fn capacity_is_at_least_one() {
        testutil::init();
        let ring = FrameRing::new(0, DIMS).unwrap();
        assert_eq!(ring.capacity(), 1);
    }

    #[test]
    fn snapshot_after_wrap_is_chronological() {
        testutil::init();
        // Push f1..f10 into a ring of 10: the cursor wraps back to 0, so the
        // snapshot is [f1..f10, f1] with the oldest frame repeated last.
        let mut ring = FrameRing::new(10, DIMS).unwrap();
        for i in 1..=10u8 {
            ring.push(solid(i));
        }
        let snapshot = ring.snapshot_ordered().unwrap();
        assert_eq!(snapshot.len(), 11);
        for (k, f) in snapshot[..10].iter().enumerate() {
            assert_eq!(mean_intensity(f).unwrap(), k as u8 + 1);
        }
        assert_eq!(mean_intensity(&snapshot[10]).unwrap(), 1);
    }

    #[test]
    fn snapshot_drops_overwritten_frames() {
        testutil::init();
        // C+1 pushes: the snapshot starts at the second push.
        let mut ring = FrameRing::new(4, DIMS).unwrap();
        for i in 1..=5u8 {
            ring.push(solid(i));
        }
        let snapshot = ring.snapshot_ordered().unwrap();
        let got: Vec<u8> = snapshot.iter().map(|f| mean_intensity(f).unwrap()).collect();
        assert_eq!(got, &[2, 3, 4, 5, 2]);
    }

    #[test]
    fn snapshot_is_isolated_from_later_pushes() {
        testutil::init();
        let mut ring = FrameRing::new(2, DIMS).unwrap();
        ring.push(solid(7));
        let snapshot = ring.snapshot_ordered().unwrap();
        ring.push(solid(9));
        ring.push(solid(9));
        // The earlier snapshot still sees the old contents.
        let got: Vec<u8> = snapshot.iter().map(|f| mean_intensity(f).unwrap()).collect();
        assert_eq!(got, &[0, 7, 0]);
    }
}
