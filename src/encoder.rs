// This file is part of Stormwatch, an event-triggered storm video recorder.
// Copyright (C) 2026 The Stormwatch Authors; see AUTHORS and LICENSE.txt.
// SPDX-License-Identifier: GPL-3.0-or-later

//! One-shot encoding of a clip snapshot to a video file and a thumbnail.

use base::{Classify, Error, ErrorKind};
use log::{info, trace};
use opencv::core::{Mat, Size, Vector};
use opencv::imgcodecs;
use opencv::imgproc;
use opencv::prelude::*;
use opencv::videoio::{self, VideoWriter};
use std::path::PathBuf;

const THUMBNAIL_DIMS: Size = Size {
    width: 128,
    height: 96,
};

/// Muxers want a rational frame rate; this bounds the denominator.
const MAX_FPS_DENOMINATOR: i64 = 16;

/// The best rational approximation of `f` with denominator at most `max_den`,
/// by walking the continued-fraction convergents and checking the final
/// semiconvergent against the last in-bounds convergent.
pub fn nearest_rational(f: f64, max_den: i64) -> (i64, i64) {
    if !f.is_finite() {
        return (0, 1);
    }
    let neg = f < 0.;
    let target = f.abs();
    let mut x = target;
    let (mut h0, mut k0) = (1i64, 0i64);
    let (mut h1, mut k1) = (x.floor() as i64, 1i64);
    x -= x.floor();
    while x > 1e-9 {
        x = 1. / x;
        let a = x.floor() as i64;
        let h2 = a * h1 + h0;
        let k2 = a * k1 + k0;
        if k2 > max_den {
            let a_lim = (max_den - k0) / k1;
            if a_lim > 0 {
                let hs = a_lim * h1 + h0;
                let ks = a_lim * k1 + k0;
                let conv_err = (target - h1 as f64 / k1 as f64).abs();
                let semi_err = (target - hs as f64 / ks as f64).abs();
                if semi_err < conv_err {
                    h1 = hs;
                    k1 = ks;
                }
            }
            break;
        }
        h0 = h1;
        h1 = h2;
        k0 = k1;
        k1 = k2;
        x -= x.floor();
    }
    (if neg { -h1 } else { h1 }, k1)
}

/// A value-closed unit of work: owns its frames and both output paths, runs
/// to completion on the encoder worker. A failure aborts only this job.
pub struct EncoderJob {
    pub frames: Vec<Mat>,
    pub dims: Size,
    pub fps: f64,
    pub seek_back_thumbnail: usize,
    pub video_path: PathBuf,
    pub thumb_path: PathBuf,
}

impl EncoderJob {
    pub fn run(self) -> Result<(), Error> {
        info!("started save for clip {}", self.video_path.display());
        if self.frames.is_empty() {
            return Err(Error::msg(
                ErrorKind::Encoding,
                format!("no frames supplied for {}", self.video_path.display()),
            ));
        }
        let (num, den) = nearest_rational(self.fps, MAX_FPS_DENOMINATOR);
        info!("estimated frame rate at {}/{}", num, den);
        self.write_thumbnail()?;
        self.write_video(num as f64 / den as f64)?;
        info!("clip saved as {}", self.video_path.display());
        Ok(())
    }

    /// Writes a 128x96 JPEG of the frame `seek_back_thumbnail` frames from
    /// the end (the event frame), falling back to the final frame if that
    /// slot was never filled.
    fn write_thumbnail(&self) -> Result<(), Error> {
        let n = self.frames.len();
        let i = n.saturating_sub(self.seek_back_thumbnail).min(n - 1);
        let mut chosen = &self.frames[i];
        if chosen.empty() {
            chosen = &self.frames[n - 1];
        }
        if chosen.empty() {
            return Err(Error::msg(
                ErrorKind::Encoding,
                format!("no usable thumbnail frame for {}", self.thumb_path.display()),
            ));
        }
        let mut thumbnail = Mat::default();
        imgproc::resize(
            chosen,
            &mut thumbnail,
            THUMBNAIL_DIMS,
            0.,
            0.,
            imgproc::INTER_LINEAR,
        )
        .classify(ErrorKind::Encoding)?;
        if !imgcodecs::imwrite(
            &self.thumb_path.to_string_lossy(),
            &thumbnail,
            &Vector::new(),
        )
        .classify(ErrorKind::Encoding)?
        {
            return Err(Error::msg(
                ErrorKind::Encoding,
                format!("unable to write thumbnail {}", self.thumb_path.display()),
            ));
        }
        Ok(())
    }

    fn write_video(&self, fps: f64) -> Result<(), Error> {
        let fourcc = VideoWriter::fourcc('m', 'p', '4', 'v').classify(ErrorKind::Encoding)?;
        let mut output = VideoWriter::new(
            &self.video_path.to_string_lossy(),
            fourcc,
            fps,
            self.dims,
            true,
        )
        .classify(ErrorKind::Encoding)?;
        if !output.is_opened().classify(ErrorKind::Encoding)? {
            return Err(Error::msg(
                ErrorKind::Encoding,
                format!("video writer refused {}", self.video_path.display()),
            ));
        }
        output
            .set(videoio::VIDEOWRITER_PROP_QUALITY, 100.)
            .classify(ErrorKind::Encoding)?;
        let total = self.frames.len();
        for (i, frame) in self.frames.iter().enumerate() {
            // Uninitialized ring slots are skipped but still counted.
            if !frame.empty() {
                output.write(frame).classify(ErrorKind::Encoding)?;
            }
            trace!("wrote frame {}/{}", i + 1, total);
        }
        output.release().classify(ErrorKind::Encoding)?;
        Ok(())
    }
}
