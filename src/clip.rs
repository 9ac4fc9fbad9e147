// This file is part of Stormwatch, an event-triggered storm video recorder.
// Copyright (C) 2026 The Stormwatch Authors; see AUTHORS and LICENSE.txt.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Clip identifiers.
//!
//! A clip id is the local wall-clock timestamp of the triggering event,
//! formatted as extended ISO-8601 with microsecond precision and then
//! base64-encoded so the raw value is usable as a filename stem.

use base::{Classify, Error, ErrorKind};
use chrono::NaiveDateTime;

/// Extended ISO-8601 with microseconds, e.g. `2026-08-01T14:23:05.123456`.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClipId {
    id: String,
    timestamp: String,
}

impl ClipId {
    /// Creates a fresh id from the current local wall clock.
    pub fn new() -> Self {
        Self::from_timestamp(chrono::Local::now().naive_local())
    }

    fn from_timestamp(t: NaiveDateTime) -> Self {
        let timestamp = t.format(TIMESTAMP_FORMAT).to_string();
        ClipId {
            id: base64::encode(&timestamp),
            timestamp,
        }
    }

    /// Validates an externally supplied id: it must base64-decode to a
    /// well-formed timestamp.
    pub fn parse(id: &str) -> Result<Self, Error> {
        let decoded = base64::decode(id).classify(ErrorKind::InvalidId)?;
        let timestamp = match String::from_utf8(decoded) {
            Ok(t) => t,
            Err(_) => {
                return Err(Error::msg(
                    ErrorKind::InvalidId,
                    format!("clip id {:?} is not UTF-8", id),
                ))
            }
        };
        NaiveDateTime::parse_from_str(&timestamp, TIMESTAMP_FORMAT)
            .classify(ErrorKind::InvalidId)?;
        Ok(ClipId {
            id: id.to_owned(),
            timestamp,
        })
    }

    /// The encoded form, used as a filename stem.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The decoded timestamp.
    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }
}

impl Default for ClipId {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::ClipId;

    #[test]
    fn round_trip() {
        let id = ClipId::new();
        let reparsed = ClipId::parse(id.id()).unwrap();
        assert_eq!(reparsed.timestamp(), id.timestamp());
        assert_eq!(reparsed.id(), id.id());
    }

    #[test]
    fn known_value() {
        let raw = base64::encode("2026-08-01T14:23:05.123456");
        let id = ClipId::parse(&raw).unwrap();
        assert_eq!(id.timestamp(), "2026-08-01T14:23:05.123456");
    }

    #[test]
    fn rejects_garbage() {
        // Not base64 at all.
        ClipId::parse("../etc/passwd\0").unwrap_err();
        // Valid base64, but not a timestamp.
        ClipId::parse(&base64::encode("hello world")).unwrap_err();
        // Valid base64 of non-UTF-8 bytes.
        ClipId::parse(&base64::encode(&[0xffu8, 0xfe, 0x00][..])).unwrap_err();
    }
}
