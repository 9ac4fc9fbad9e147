// This file is part of Stormwatch, an event-triggered storm video recorder.
// Copyright (C) 2026 The Stormwatch Authors; see AUTHORS and LICENSE.txt.
// SPDX-License-Identifier: GPL-3.0-or-later

//! The camera: owns the capture worker and mediates all access to shared
//! state.
//!
//! One worker thread reads frames from the device, feeds the trigger, and
//! owns the ring buffer outright. Everything it shares — the preview slot,
//! the status slot — it updates with a try-acquired write lock so a slow
//! reader can never stall capture. Detection properties live in a mutex-held
//! map written by HTTP handlers; the worker re-reads them only when the
//! apply-settings flag is cleared, so a batch of writes followed by one
//! `apply_property_change` takes effect atomically at a frame boundary.

use crate::frame::{self, BayerMode};
use crate::library::Library;
use crate::ring::FrameRing;
use crate::stats::FpsCounter;
use crate::trigger::VideoTrigger;
use base::clock::{Clocks, TimerGuard};
use base::{Classify, Error, ErrorKind};
use fnv::FnvHashMap;
use lazy_static::lazy_static;
use log::{error, info, warn};
use opencv::core::{Mat, Size};
use opencv::prelude::*;
use opencv::videoio::{self, VideoCapture};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

/// The runtime-tunable properties, all carried as `f64` on the wire.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum Property {
    EdgeDetectionSeconds,
    DebounceSeconds,
    TriggerDelay,
    TriggerThreshold,
    ClipLengthSeconds,
    BayerMode,
    Width,
    Height,
}

impl Property {
    pub const ALL: [Property; 8] = [
        Property::EdgeDetectionSeconds,
        Property::DebounceSeconds,
        Property::TriggerDelay,
        Property::TriggerThreshold,
        Property::ClipLengthSeconds,
        Property::BayerMode,
        Property::Width,
        Property::Height,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Property::EdgeDetectionSeconds => "edge_detection_seconds",
            Property::DebounceSeconds => "debounce_seconds",
            Property::TriggerDelay => "trigger_delay",
            Property::TriggerThreshold => "trigger_threshold",
            Property::ClipLengthSeconds => "clip_length_seconds",
            Property::BayerMode => "bayer_mode",
            Property::Width => "width",
            Property::Height => "height",
        }
    }

    pub fn parse(s: &str) -> Option<Property> {
        match s {
            "edge_detection_seconds" => Some(Property::EdgeDetectionSeconds),
            "debounce_seconds" => Some(Property::DebounceSeconds),
            "trigger_delay" => Some(Property::TriggerDelay),
            "trigger_threshold" => Some(Property::TriggerThreshold),
            "clip_length_seconds" => Some(Property::ClipLengthSeconds),
            "bayer_mode" => Some(Property::BayerMode),
            "width" => Some(Property::Width),
            "height" => Some(Property::Height),
            _ => None,
        }
    }

    fn default_value(self) -> f64 {
        match self {
            Property::EdgeDetectionSeconds => 2.,
            Property::DebounceSeconds => 1.,
            Property::TriggerDelay => 5.,
            Property::TriggerThreshold => 15.,
            Property::ClipLengthSeconds => 30.,
            Property::BayerMode => 0.,
            Property::Width => 0.,
            Property::Height => 0.,
        }
    }
}

/// Capture statistics: resolution and nominal rate are set once when the
/// device opens; the measured rate is refreshed per frame, best-effort.
#[derive(Clone, Debug, Default)]
pub struct Status {
    pub width: i32,
    pub height: i32,
    pub nominal_fps: f64,
    pub measured_fps: f64,
}

lazy_static! {
    /// Served whenever there is no live preview frame.
    static ref BLACK_PREVIEW: Vec<u8> = frame::encode_jpeg(
        &frame::blank(Size::new(32, 32)).expect("can't allocate placeholder frame"),
    )
    .expect("can't encode placeholder frame");
}

pub struct Camera<C: Clocks + Clone> {
    clocks: C,
    library: Arc<Library>,
    properties: Arc<Mutex<FnvHashMap<Property, f64>>>,
    preview: Arc<RwLock<Mat>>,
    status: Arc<RwLock<Status>>,
    apply_settings: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
}

impl<C: Clocks + Clone> Camera<C> {
    pub fn new(clocks: C, library: Arc<Library>) -> Self {
        let mut properties =
            FnvHashMap::with_capacity_and_hasher(Property::ALL.len(), Default::default());
        for &p in &Property::ALL {
            properties.insert(p, p.default_value());
        }
        Camera {
            clocks,
            library,
            properties: Arc::new(Mutex::new(properties)),
            preview: Arc::new(RwLock::new(Mat::default())),
            status: Arc::new(RwLock::new(Status::default())),
            apply_settings: Arc::new(AtomicBool::new(true)),
            shutdown: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
        }
    }

    pub fn get_property(&self, property: Property) -> f64 {
        self.properties
            .lock()
            .get(&property)
            .copied()
            .expect("property map holds every key")
    }

    pub fn set_property(&self, property: Property, value: f64) {
        self.properties.lock().insert(property, value);
    }

    /// Arms the reload flag; the worker rebuilds its trigger from the current
    /// property values at the next frame boundary. Any number of
    /// `set_property` calls before a single call here take effect atomically
    /// from the worker's point of view.
    pub fn apply_property_change(&self) {
        self.apply_settings.store(false, Ordering::Release);
    }

    /// Spawns the capture worker if it isn't running. Clip length, Bayer
    /// mode, and requested dimensions are captured by value here; changing
    /// them later requires `stop` then `start`.
    pub fn start(&self) {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            info!("camera is already running; ignoring start request");
            return;
        }
        let (clip_length_seconds, bayer_mode, requested_dims) = {
            let p = self.properties.lock();
            let get = |prop: Property| p.get(&prop).copied().expect("property map holds every key");
            let width = get(Property::Width) as i32;
            let height = get(Property::Height) as i32;
            (
                get(Property::ClipLengthSeconds),
                BayerMode::from_property(get(Property::BayerMode)),
                if width > 0 && height > 0 {
                    Some(Size::new(width, height))
                } else {
                    None
                },
            )
        };
        self.shutdown.store(false, Ordering::SeqCst);
        let w = Worker {
            clocks: self.clocks.clone(),
            library: self.library.clone(),
            properties: self.properties.clone(),
            preview: self.preview.clone(),
            status: self.status.clone(),
            apply_settings: self.apply_settings.clone(),
            shutdown: self.shutdown.clone(),
            clip_length_seconds,
            bayer_mode,
            requested_dims,
        };
        *worker = Some(
            thread::Builder::new()
                .name("camera".to_owned())
                .spawn(move || w.run())
                .expect("couldn't spawn capture worker"),
        );
    }

    /// Signals the worker to exit at its next loop boundary and joins it.
    pub fn stop(&self) {
        let handle = self.worker.lock().take();
        match handle {
            None => info!("camera is already stopped; ignoring stop request"),
            Some(handle) => {
                self.shutdown.store(true, Ordering::SeqCst);
                if handle.join().is_err() {
                    error!("camera worker panicked");
                }
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }

    /// A JPEG of the most recent frame the worker managed to publish, or a
    /// 32x32 black placeholder when stopped or before the first frame. Never
    /// blocks on the worker.
    pub fn preview(&self) -> Vec<u8> {
        if self.is_running() {
            let preview = self.preview.read();
            if !preview.empty() {
                match frame::encode_jpeg(&preview) {
                    Ok(jpeg) => return jpeg,
                    Err(e) => warn!("unable to encode preview frame: {:?}", e),
                }
            }
        }
        BLACK_PREVIEW.clone()
    }

    pub fn status(&self) -> Status {
        self.status.read().clone()
    }
}

/// State owned by the capture worker thread.
struct Worker<C: Clocks> {
    clocks: C,
    library: Arc<Library>,
    properties: Arc<Mutex<FnvHashMap<Property, f64>>>,
    preview: Arc<RwLock<Mat>>,
    status: Arc<RwLock<Status>>,
    apply_settings: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
    clip_length_seconds: f64,
    bayer_mode: Option<BayerMode>,
    requested_dims: Option<Size>,
}

impl<C: Clocks + Clone> Worker<C> {
    fn run(self) {
        if let Err(e) = self.run_once() {
            error!("capture failed: {}", e);
        }
        info!("capture worker exiting");
    }

    fn run_once(&self) -> Result<(), Error> {
        let (mut cap, dims, fps) = self.open_device()?;
        info!("capturing {}x{} at {} fps", dims.width, dims.height, fps);
        self.capture(&mut cap, dims, fps)
            .classify(ErrorKind::Internal)
    }

    /// Opens and configures capture device 0, returning it along with its
    /// actual dimensions and frame rate.
    fn open_device(&self) -> Result<(VideoCapture, Size, f64), Error> {
        let mut cap = {
            let _t = TimerGuard::new(&self.clocks, || "opening capture device");
            VideoCapture::new(0, videoio::CAP_ANY).classify(ErrorKind::Device)?
        };
        if !cap.is_opened().classify(ErrorKind::Device)? {
            return Err(Error::msg(
                ErrorKind::Device,
                "unable to open capture device 0",
            ));
        }
        if let Some(dims) = self.requested_dims {
            cap.set(videoio::CAP_PROP_FRAME_WIDTH, f64::from(dims.width))
                .classify(ErrorKind::Device)?;
            cap.set(videoio::CAP_PROP_FRAME_HEIGHT, f64::from(dims.height))
                .classify(ErrorKind::Device)?;
        }
        if self.bayer_mode.is_some() {
            // We demosaic ourselves; take the sensor data raw.
            cap.set(videoio::CAP_PROP_CONVERT_RGB, 0.)
                .classify(ErrorKind::Device)?;
        }

        let width = cap
            .get(videoio::CAP_PROP_FRAME_WIDTH)
            .classify(ErrorKind::Device)? as i32;
        let height = cap
            .get(videoio::CAP_PROP_FRAME_HEIGHT)
            .classify(ErrorKind::Device)? as i32;
        let mut fps = cap.get(videoio::CAP_PROP_FPS).classify(ErrorKind::Device)?;
        if fps == 0. {
            warn!("device reports 0 fps; assuming 30");
            fps = 30.;
        }
        Ok((cap, Size::new(width, height), fps))
    }

    /// The per-frame loop, until `shutdown` is raised.
    fn capture(&self, cap: &mut VideoCapture, dims: Size, fps: f64) -> Result<(), failure::Error> {
        let mut ring = FrameRing::new((self.clip_length_seconds * fps).ceil() as usize, dims)?;
        {
            let mut status = self.status.write();
            status.width = dims.width;
            status.height = dims.height;
            status.nominal_fps = fps;
        }

        let mut counter = FpsCounter::new(self.clocks.clone());
        let mut trigger = self.make_trigger(fps);

        while !self.shutdown.load(Ordering::SeqCst) {
            let mut frame = Mat::default();
            if !cap.read(&mut frame)? || frame.empty() {
                warn!("blank frame grabbed");
                continue;
            }
            let frame = match self.bayer_mode {
                Some(mode) => frame::demosaic(&frame, mode, dims.height)?,
                None => frame,
            };

            ring.push(frame.try_clone()?);

            // A cleared flag means fresh property values are waiting: leave
            // the flag raised again and start a new trigger over them.
            if !self.apply_settings.fetch_or(true, Ordering::AcqRel) {
                info!("trigger settings changed; state cleared");
                trigger = self.make_trigger(fps);
            }

            if trigger.should_capture(&frame)? {
                let snapshot = ring.snapshot_ordered()?;
                self.library
                    .save_clip(snapshot, dims, fps, trigger.seek_for_thumbnail())?;
                info!("clip saved");
            }

            counter.update();

            // Clone outside the locks; a held reader only costs us this
            // frame's publication, never a stall.
            let copy = frame.try_clone()?;
            if let Some(mut preview) = self.preview.try_write() {
                *preview = copy;
            }
            if let Some(mut status) = self.status.try_write() {
                status.measured_fps = counter.fps_averaged();
            }
        }
        Ok(())
    }

    fn make_trigger(&self, fps: f64) -> VideoTrigger {
        let p = self.properties.lock();
        let get = |prop: Property| p.get(&prop).copied().expect("property map holds every key");
        VideoTrigger::new(
            fps,
            get(Property::EdgeDetectionSeconds),
            get(Property::DebounceSeconds),
            get(Property::TriggerDelay),
            get(Property::TriggerThreshold).max(0.).min(255.) as u8,
        )
    }
}
