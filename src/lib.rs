// Copyright (c) 2022 Jan Holthuis
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0. If a copy
// of the MPL was not distributed with this file, You can obtain one at
// http://mozilla.org/MPL/2.0/.
//
// SPDX-License-Identifier: MPL-2.0

//! Converts a rekordbox USB export into a Traktor-compatible library: decodes `export.pdb` and
//! each track's `.DAT`/`.EXT` analysis files, then emits one NML playlist per rekordbox playlist
//! and a flat directory of symlinks into the export's `Contents` tree for Traktor to read from.

pub mod anlz;
pub mod error;
pub mod fs;
pub mod model;
#[cfg(feature = "xml")]
pub mod nml;
#[cfg(feature = "xml")]
pub mod orchestrate;
pub mod pdb;

pub use error::{Diagnostic, Error, Result};
