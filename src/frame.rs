// This file is part of Stormwatch, an event-triggered storm video recorder.
// Copyright (C) 2026 The Stormwatch Authors; see AUTHORS and LICENSE.txt.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Frame-level helpers shared by the capture worker, trigger, and encoder.

use failure::{bail, Error};
use opencv::core::{self, Mat, Scalar, Size, Vector};
use opencv::imgcodecs;
use opencv::imgproc;
use opencv::prelude::*;

/// Raw-sensor mosaic patterns the capture device may deliver when its
/// built-in RGB conversion is disabled. The discriminants are the wire values
/// of the `bayer_mode` property; 0 means no demosaic.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BayerMode {
    Bg = 1,
    Gb = 2,
    Rg = 3,
    Gr = 4,
}

impl BayerMode {
    pub fn from_property(value: f64) -> Option<BayerMode> {
        match value as i64 {
            1 => Some(BayerMode::Bg),
            2 => Some(BayerMode::Gb),
            3 => Some(BayerMode::Rg),
            4 => Some(BayerMode::Gr),
            _ => None,
        }
    }

    fn conversion(self) -> i32 {
        match self {
            BayerMode::Bg => imgproc::COLOR_BayerBG2BGR,
            BayerMode::Gb => imgproc::COLOR_BayerGB2BGR,
            BayerMode::Rg => imgproc::COLOR_BayerRG2BGR,
            BayerMode::Gr => imgproc::COLOR_BayerGR2BGR,
        }
    }
}

/// Returns an all-black three-channel frame of the given dimensions, used to
/// pre-fill the ring so snapshots are always well-defined.
pub fn blank(dims: Size) -> Result<Mat, Error> {
    Ok(Mat::new_size_with_default(
        dims,
        core::CV_8UC3,
        Scalar::all(0.),
    )?)
}

/// The arithmetic mean of all pixel channel values, clamped to `u8`.
pub fn mean_intensity(frame: &Mat) -> Result<u8, Error> {
    let channels = frame.channels();
    if frame.empty() || channels < 1 {
        bail!("can't take the mean intensity of an empty frame");
    }
    let per_channel = core::mean(frame, &core::no_array())?;
    let mut sum = 0.;
    for c in 0..channels as usize {
        sum += per_channel[c];
    }
    let mean = sum / f64::from(channels);
    Ok(mean.max(0.).min(255.) as u8)
}

/// Reinterprets a raw single-channel sensor buffer as `rows` image rows and
/// demosaics it to a BGR frame.
pub fn demosaic(raw: &Mat, mode: BayerMode, rows: i32) -> Result<Mat, Error> {
    let reshaped = raw.reshape(1, rows)?.try_clone()?;
    let mut bgr = Mat::default();
    imgproc::cvt_color(&reshaped, &mut bgr, mode.conversion(), 0)?;
    Ok(bgr)
}

/// JPEG-encodes a frame into an in-memory buffer.
pub fn encode_jpeg(frame: &Mat) -> Result<Vec<u8>, Error> {
    let mut buf = Vector::<u8>::new();
    if !imgcodecs::imencode(".jpg", frame, &mut buf, &Vector::new())? {
        bail!("JPEG encoder refused frame");
    }
    Ok(buf.to_vec())
}
