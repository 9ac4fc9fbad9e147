// This file is part of Stormwatch, an event-triggered storm video recorder.
// Copyright (C) 2026 The Stormwatch Authors; see AUTHORS and LICENSE.txt.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Serde types for the web API.

use crate::camera::Status;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct Stats {
    pub width: i32,
    pub height: i32,
    #[serde(rename = "nominalFPS")]
    pub nominal_fps: f64,
    #[serde(rename = "measuredFPS")]
    pub measured_fps: f64,
}

impl From<Status> for Stats {
    fn from(s: Status) -> Self {
        Stats {
            width: s.width,
            height: s.height,
            nominal_fps: s.nominal_fps,
            measured_fps: s.measured_fps,
        }
    }
}

/// One row of the `/clips` listing; `video` and `thumbnail` are paths the
/// client fetches directly.
#[derive(Debug, Serialize)]
pub struct ClipEntry {
    pub title: String,
    pub video: String,
    pub thumbnail: String,
}

#[cfg(test)]
mod tests {
    use super::{ClipEntry, Stats};
    use crate::camera::Status;

    #[test]
    fn stats_field_names() {
        let stats = Stats::from(Status {
            width: 640,
            height: 480,
            nominal_fps: 30.,
            measured_fps: 29.5,
        });
        let v = serde_json::to_value(&stats).unwrap();
        assert_eq!(v["width"], 640);
        assert_eq!(v["height"], 480);
        assert_eq!(v["nominalFPS"], 30.);
        assert_eq!(v["measuredFPS"], 29.5);
    }

    #[test]
    fn clip_entry_shape() {
        let entry = ClipEntry {
            title: "2026-08-01T14:23:05.123456".to_owned(),
            video: "/clips/abc=.mp4".to_owned(),
            thumbnail: "/clips/abc=.jpeg".to_owned(),
        };
        let v = serde_json::to_value(&entry).unwrap();
        assert_eq!(v["title"], "2026-08-01T14:23:05.123456");
        assert_eq!(v["video"], "/clips/abc=.mp4");
        assert_eq!(v["thumbnail"], "/clips/abc=.jpeg");
    }
}
