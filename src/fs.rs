// Copyright (c) 2022 Jan Holthuis
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0. If a copy
// of the MPL was not distributed with this file, You can obtain one at
// http://mozilla.org/MPL/2.0/.
//
// SPDX-License-Identifier: MPL-2.0

//! The single filesystem handle abstraction the orchestrator consumes, so the pipeline itself
//! performs no direct syscalls and can be exercised against an in-memory fixture in tests.

use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub trait Filesystem {
    /// Reads a file's full contents relative to the USB root.
    fn read(&self, path: &Path) -> Result<Vec<u8>>;

    /// Removes `dir` (if present) and recreates it empty.
    fn recreate_dir(&mut self, dir: &Path) -> Result<()>;

    /// Creates a symlink at `link` pointing at `target`.
    fn symlink(&mut self, link: &Path, target: &Path) -> Result<()>;

    /// `true` if a symlink already exists at `path`.
    fn is_symlink(&self, path: &Path) -> bool;

    /// Writes `contents` to `path`, overwriting any existing file.
    fn write(&mut self, path: &Path, contents: &[u8]) -> Result<()>;
}

/// Real filesystem access, backed by `std::fs`.
#[derive(Debug, Default)]
pub struct StdFilesystem;

impl Filesystem for StdFilesystem {
    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        std::fs::read(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    fn recreate_dir(&mut self, dir: &Path) -> Result<()> {
        if dir.exists() {
            std::fs::remove_dir_all(dir).map_err(|source| Error::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        std::fs::create_dir_all(dir).map_err(|source| Error::Io {
            path: dir.to_path_buf(),
            source,
        })
    }

    fn symlink(&mut self, link: &Path, target: &Path) -> Result<()> {
        std::os::unix::fs::symlink(target, link).map_err(|source| Error::Io {
            path: link.to_path_buf(),
            source,
        })
    }

    fn is_symlink(&self, path: &Path) -> bool {
        path.symlink_metadata()
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false)
    }

    fn write(&mut self, path: &Path, contents: &[u8]) -> Result<()> {
        std::fs::write(path, contents).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// An in-memory filesystem used by tests to exercise the orchestrator's dedup/ordering/emission
/// logic without touching disk.
#[derive(Debug, Default)]
pub struct MemFilesystem {
    pub files: BTreeMap<PathBuf, Vec<u8>>,
    pub symlinks: BTreeMap<PathBuf, PathBuf>,
    pub dirs: Vec<PathBuf>,
}

impl Filesystem for MemFilesystem {
    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| Error::Io {
                path: path.to_path_buf(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            })
    }

    fn recreate_dir(&mut self, dir: &Path) -> Result<()> {
        self.symlinks.retain(|path, _| !path.starts_with(dir));
        self.dirs.push(dir.to_path_buf());
        Ok(())
    }

    fn symlink(&mut self, link: &Path, target: &Path) -> Result<()> {
        self.symlinks.insert(link.to_path_buf(), target.to_path_buf());
        Ok(())
    }

    fn is_symlink(&self, path: &Path) -> bool {
        self.symlinks.contains_key(path)
    }

    fn write(&mut self, path: &Path, contents: &[u8]) -> Result<()> {
        self.files.insert(path.to_path_buf(), contents.to_vec());
        Ok(())
    }
}
