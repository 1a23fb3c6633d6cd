// Copyright (c) 2022 Jan Holthuis
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0. If a copy
// of the MPL was not distributed with this file, You can obtain one at
// http://mozilla.org/MPL/2.0/.
//
// SPDX-License-Identifier: MPL-2.0

//! Error types shared by every decoder and emitter in this crate.

use std::path::PathBuf;

/// Top-level error type returned by the decoders, the emitter and the orchestrator.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("failed to read `{path}`")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unexpected end of input while reading {context}")]
    TruncatedInput { context: &'static str },

    #[error("bad magic bytes in {context}: expected {expected:?}, got {got:?}")]
    BadMagic {
        context: &'static str,
        expected: &'static [u8],
        got: Vec<u8>,
    },

    #[error("reserved field `{field}` in {context} was not zero (got {value:#x})")]
    BadZeroField {
        context: &'static str,
        field: &'static str,
        value: u64,
    },

    #[error("page {index} self-check failed: {reason}")]
    PageSelfCheckFailed { index: u32, reason: String },

    #[error("string at offset {offset} is not valid UTF-16")]
    InvalidUtf16 { offset: usize },

    #[error("USB path does not exist or is not a directory: {0}")]
    UsbPathNotFound(PathBuf),

    #[error("export.pdb not found on USB stick: {0}")]
    ExportPdbNotFound(PathBuf),

    #[cfg(feature = "xml")]
    #[error(transparent)]
    Xml(#[from] quick_xml::Error),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// A non-fatal anomaly observed while decoding or emitting.
///
/// Decoder failures abort the run; these do not. The orchestrator collects them into a
/// run-scoped list and flushes them to stderr, since nothing in this crate depends on a
/// structured logging framework.
#[derive(Debug, Clone)]
pub enum Diagnostic {
    DanglingForeignKey {
        playlist_id: u32,
        track_id: u32,
    },
    TooManyMemoryCues {
        track_id: u32,
        found: usize,
        kept: usize,
    },
    MissingAutoGrid {
        track_id: u32,
    },
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Diagnostic::DanglingForeignKey {
                playlist_id,
                track_id,
            } => write!(
                f,
                "playlist {playlist_id} references missing track {track_id}; entry dropped"
            ),
            Diagnostic::TooManyMemoryCues {
                track_id,
                found,
                kept,
            } => write!(
                f,
                "track {track_id} has {found} memory cues, keeping the first {kept}"
            ),
            Diagnostic::MissingAutoGrid { track_id } => write!(
                f,
                "track {track_id} has no beat with num == 1; omitting AutoGrid cue"
            ),
        }
    }
}
