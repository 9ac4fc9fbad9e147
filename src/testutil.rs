// This file is part of Stormwatch, an event-triggered storm video recorder.
// Copyright (C) 2026 The Stormwatch Authors; see AUTHORS and LICENSE.txt.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Helpers shared by tests.

use opencv::core::{Mat, Scalar, Size, CV_8UC3};
use std::sync::Once;

static INIT: Once = Once::new();

/// One-time test setup: installs a logger that cooperates with the test
/// harness's output capturing.
pub fn init() {
    INIT.call_once(|| {
        let _ = env_logger::Builder::from_env(
            env_logger::Env::default().default_filter_or("info"),
        )
        .is_test(true)
        .try_init();
    });
}

/// A small BGR frame of uniform intensity.
pub fn solid(intensity: u8) -> Mat {
    Mat::new_size_with_default(
        Size::new(4, 4),
        CV_8UC3,
        Scalar::all(f64::from(intensity)),
    )
    .unwrap()
}
