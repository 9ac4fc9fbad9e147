// This file is part of Stormwatch, an event-triggered storm video recorder.
// Copyright (C) 2026 The Stormwatch Authors; see AUTHORS and LICENSE.txt.
// SPDX-License-Identifier: GPL-3.0-or-later

//! The on-disk clip library and its background encoder worker.

use crate::clip::ClipId;
use crate::encoder::EncoderJob;
use failure::{format_err, Error, ResultExt};
use lazy_static::lazy_static;
use log::{error, info};
use opencv::core::{Mat, Size};
use regex::Regex;
use std::fs;
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;

pub const VIDEO_EXT: &str = "mp4";
pub const THUMB_EXT: &str = "jpeg";

lazy_static! {
    /// Clip filenames are base64 stems plus a known extension, nothing else.
    /// The HTTP surface resolves opaque client input through `clip_path`, so
    /// this doubles as the path-traversal guard.
    static ref CLIP_FILENAME: Regex = Regex::new(r"^[A-Za-z0-9+/=]+\.(jpeg|mp4)$").unwrap();
}

/// What flows over the channel to the encoder worker.
enum EncoderCommand {
    Encode(EncoderJob),
    Flush(mpsc::SyncSender<()>),
}

/// The sending half of the encoder worker's queue. Jobs run in FIFO order;
/// once every clone of this handle is gone, the worker winds down.
#[derive(Clone)]
struct EncoderChannel(mpsc::Sender<EncoderCommand>);

impl EncoderChannel {
    fn encode(&self, job: EncoderJob) -> Result<(), Error> {
        self.0
            .send(EncoderCommand::Encode(job))
            .map_err(|_| format_err!("encoder worker is gone"))
    }

    /// Blocks until every previously enqueued job has completed.
    fn flush(&self) {
        let (snd, rcv) = mpsc::sync_channel(0);
        if self.0.send(EncoderCommand::Flush(snd)).is_ok() {
            let _ = rcv.recv(); // Err means the worker reached and dropped it.
        }
    }
}

fn start_encoder() -> Result<(EncoderChannel, thread::JoinHandle<()>), Error> {
    let (snd, rcv) = mpsc::channel();
    let join = thread::Builder::new()
        .name("encoder".to_owned())
        .spawn(move || encoder_loop(rcv))?;
    Ok((EncoderChannel(snd), join))
}

fn encoder_loop(cmds: mpsc::Receiver<EncoderCommand>) {
    loop {
        match cmds.recv() {
            Err(_) => return, // all senders are gone.
            Ok(EncoderCommand::Encode(job)) => {
                let video_path = job.video_path.clone();
                if let Err(e) = job.run() {
                    error!("save for {} failed: {}", video_path.display(), e);
                }
            }
            Ok(EncoderCommand::Flush(done)) => drop(done),
        }
    }
}

/// Owns the clip directory and the encoder worker. Shared (via `Arc`) between
/// the capture worker, which enqueues clips, and the HTTP handlers, which
/// enumerate, fetch, and delete them.
pub struct Library {
    dir: PathBuf,
    channel: EncoderChannel,
    join: Option<thread::JoinHandle<()>>,
}

impl Library {
    /// Opens the library, creating the directory if absent, and starts the
    /// encoder worker.
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self, Error> {
        let dir = dir.as_ref().to_owned();
        if !dir.exists() {
            fs::create_dir_all(&dir)
                .with_context(|_| format!("unable to create library dir {}", dir.display()))?;
        }
        let (channel, join) = start_encoder()?;
        Ok(Library {
            dir,
            channel,
            join: Some(join),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Synthesizes a fresh id for the clip and hands the frames to the
    /// encoder worker. Non-blocking; the files appear later, thumbnail first.
    pub fn save_clip(
        &self,
        frames: Vec<Mat>,
        dims: Size,
        fps: f64,
        seek_back_thumbnail: usize,
    ) -> Result<(), Error> {
        let id = ClipId::new();
        let video_path = self.dir.join(format!("{}.{}", id.id(), VIDEO_EXT));
        let thumb_path = self.dir.join(format!("{}.{}", id.id(), THUMB_EXT));
        info!("queueing clip {} ({} frames)", id.timestamp(), frames.len());
        self.channel.encode(EncoderJob {
            frames,
            dims,
            fps,
            seek_back_thumbnail,
            video_path,
            thumb_path,
        })
    }

    /// Raw id stems of all clips. The thumbnail is written last, so its
    /// presence gates enumeration; a clip mid-encode is simply not listed
    /// yet. Order is unspecified.
    pub fn list_clips(&self) -> Vec<String> {
        let mut clips = Vec::new();
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(_) => return clips,
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some(THUMB_EXT) {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    clips.push(stem.to_owned());
                }
            }
        }
        clips
    }

    /// Resolves a clip filename (id stem plus extension) to its path, or
    /// `None` for anything that isn't a well-formed clip filename.
    pub fn clip_path(&self, name: &str) -> Option<PathBuf> {
        if !CLIP_FILENAME.is_match(name) || !self.dir.exists() {
            return None;
        }
        Some(self.dir.join(name))
    }

    /// Removes a clip's video and thumbnail; true iff both existed and were
    /// removed.
    pub fn delete_clip(&self, id: &str) -> bool {
        let video = fs::remove_file(self.dir.join(format!("{}.{}", id, VIDEO_EXT))).is_ok();
        let thumb = fs::remove_file(self.dir.join(format!("{}.{}", id, THUMB_EXT))).is_ok();
        video && thumb
    }

    /// Blocks until all clips enqueued so far are on disk. Test support.
    pub fn flush(&self) {
        self.channel.flush()
    }
}

impl Drop for Library {
    fn drop(&mut self) {
        // Drop our sender so the worker winds down, then join it to let
        // queued clips finish writing.
        let (dummy, _) = mpsc::channel();
        drop(mem::replace(&mut self.channel, EncoderChannel(dummy)));
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                error!("encoder worker panicked");
            }
        }
    }
}
