// This file is part of Stormwatch, an event-triggered storm video recorder.
// Copyright (C) 2026 The Stormwatch Authors; see AUTHORS and LICENSE.txt.
// SPDX-License-Identifier: GPL-3.0-or-later

//! The recorder's error type: a `failure` cause tagged with the domain it
//! came from.
//!
//! The tag is what callers dispatch on. The capture worker's run ends on a
//! `Device` error but shrugs off transient frames; the web layer reports an
//! `InvalidId` as an absent clip; `Encoding` failures die with their job on
//! the encoder thread. Everything keeps its underlying cause for the logs.

use failure::Fail;
use std::fmt;

/// The failure domains of the recorder.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// The capture device is absent, busy, or rejected configuration.
    Device,
    /// An externally supplied clip id doesn't decode to a timestamp.
    InvalidId,
    /// A clip or its thumbnail couldn't be encoded and written out.
    Encoding,
    /// Frame plumbing and everything else.
    Internal,
}

impl ErrorKind {
    fn label(self) -> &'static str {
        match self {
            ErrorKind::Device => "capture device",
            ErrorKind::InvalidId => "invalid clip id",
            ErrorKind::Encoding => "clip encoding",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// An error carrying its domain tag.
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    cause: failure::Error,
}

impl Error {
    /// Tags an arbitrary cause with the domain it failed in.
    pub fn wrap<E: Into<failure::Error>>(kind: ErrorKind, cause: E) -> Self {
        Error {
            kind,
            cause: cause.into(),
        }
    }

    /// An error from scratch, with just a message.
    pub fn msg<M: fmt::Display>(kind: ErrorKind, msg: M) -> Self {
        Error {
            kind,
            cause: failure::err_msg(msg.to_string()),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.cause)
    }
}

impl Fail for Error {
    fn cause(&self) -> Option<&dyn Fail> {
        Some(self.cause.as_fail())
    }
}

/// Tags the error side of a result, so a fallible call can be classified
/// inline with `?`:
///
/// ```
/// use stormwatch_base::{Classify, ErrorKind};
/// let e = "not a number".parse::<f64>().classify(ErrorKind::Internal).unwrap_err();
/// assert_eq!(e.kind(), ErrorKind::Internal);
/// ```
pub trait Classify<T> {
    fn classify(self, kind: ErrorKind) -> Result<T, Error>;
}

impl<T, E: Into<failure::Error>> Classify<T> for Result<T, E> {
    fn classify(self, kind: ErrorKind) -> Result<T, Error> {
        self.map_err(|e| Error::wrap(kind, e))
    }
}

/// Renders an error with its whole cause chain, one cause per line. For the
/// final log line before giving up.
pub fn format_chain(err: &failure::Error) -> String {
    use std::fmt::Write as _;
    let mut out = err.to_string();
    for cause in err.iter_causes() {
        let _ = write!(&mut out, "\n  caused by: {}", cause);
    }
    out
}
