// Copyright (c) 2022 Jan Holthuis
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0. If a copy
// of the MPL was not distributed with this file, You can obtain one at
// http://mozilla.org/MPL/2.0/.
//
// SPDX-License-Identifier: MPL-2.0

use chrono::Utc;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use traktorize::error::Error;
use traktorize::fs::StdFilesystem;

/// Converts a rekordbox USB export into a Traktor-compatible library.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Path to the root of the USB stick (the directory containing `PIONEER/`).
    usb_path: PathBuf,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if !cli.usb_path.is_dir() {
        eprintln!("{}", Error::UsbPathNotFound(cli.usb_path));
        return ExitCode::FAILURE;
    }

    let export_pdb = cli
        .usb_path
        .join("PIONEER")
        .join("rekordbox")
        .join("export.pdb");
    if !export_pdb.is_file() {
        eprintln!("{}", Error::ExportPdbNotFound(export_pdb));
        return ExitCode::FAILURE;
    }

    let mut fs = StdFilesystem;
    match traktorize::orchestrate::run(&mut fs, &cli.usb_path, Utc::now()) {
        Ok(diagnostics) => {
            for diagnostic in &diagnostics {
                eprintln!("warning: {diagnostic}");
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
