// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Log output: console plus a size-capped file.
//!
//! The file is written through [`RotatingFile`]. When the next write would
//! take it past `max_bytes`, the current file is renamed to `<file>.bak`
//! (replacing any previous backup) and a fresh file is started. Writes go
//! through a [`tracing_appender::non_blocking`] worker so that logging never
//! blocks the relay actors.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LogConfig;
use crate::error::Error;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Append-only log file with a single `.bak` generation.
#[derive(Debug)]
pub struct RotatingFile {
    path: PathBuf,
    backup: PathBuf,
    file: File,
    written: u64,
    max_bytes: u64,
}

impl RotatingFile {
    /// Opens (or creates) `path` for appending.
    ///
    /// # Errors
    ///
    /// Returns an error if the file or its parent directory cannot be
    /// created.
    pub fn open(path: impl AsRef<Path>, max_bytes: u64) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = Self::append(&path)?;
        let written = file.metadata()?.len();
        let backup = backup_path(&path);
        Ok(Self {
            path,
            backup,
            file,
            written,
            max_bytes,
        })
    }

    /// Path of the live log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path the live file is rotated to.
    #[must_use]
    pub fn backup(&self) -> &Path {
        &self.backup
    }

    fn append(path: &Path) -> io::Result<File> {
        OpenOptions::new().create(true).append(true).open(path)
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;
        match fs::remove_file(&self.backup) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        match fs::rename(&self.path, &self.backup) {
            Ok(()) => {}
            // Removed behind our back; start a new file without a backup.
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        self.file = Self::append(&self.path)?;
        self.written = 0;
        Ok(())
    }
}

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let len = buf.len() as u64;
        if self.max_bytes > 0 && self.written > 0 && self.written + len > self.max_bytes {
            self.rotate()?;
        }
        let n = self.file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".bak");
    PathBuf::from(name)
}

/// Installs the global subscriber.
///
/// The filter is taken from `level_override` if given, else from `RUST_LOG`,
/// else from `config.level`. The returned guard must be held for the life of
/// the process so buffered lines are flushed on exit.
///
/// # Errors
///
/// Returns [`Error::Logging`] if the filter is invalid, the log file cannot
/// be opened, or a global subscriber is already installed.
pub fn init(config: &LogConfig, level_override: Option<&str>) -> Result<WorkerGuard, Error> {
    let filter = match level_override {
        Some(level) => EnvFilter::try_new(level),
        None => EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.level)),
    }
    .map_err(|e| Error::Logging(format!("invalid log filter: {e}")))?;

    let file = RotatingFile::open(&config.file, config.max_bytes).map_err(|e| {
        Error::Logging(format!("cannot open {}: {e}", config.file.display()))
    })?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_timer(ChronoLocal::new(TIMESTAMP_FORMAT.to_string()))
                .with_target(false),
        )
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_timer(ChronoLocal::new(TIMESTAMP_FORMAT.to_string()))
                .with_ansi(false)
                .with_target(true),
        )
        .try_init()
        .map_err(|e| Error::Logging(e.to_string()))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backup_path_appends_suffix() {
        assert_eq!(backup_path(Path::new("logs/wol.log")), PathBuf::from("logs/wol.log.bak"));
    }

    #[test]
    fn creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("wol.log");

        let mut file = RotatingFile::open(&path, 1024).unwrap();
        file.write_all(b"hello\n").unwrap();
        file.flush().unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "hello\n");
    }

    #[test]
    fn rotates_past_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wol.log");

        let mut file = RotatingFile::open(&path, 10).unwrap();
        file.write_all(b"first-\n").unwrap();
        file.write_all(b"second\n").unwrap();
        file.flush().unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "second\n");
        assert_eq!(fs::read_to_string(file.backup()).unwrap(), "first-\n");
    }

    #[test]
    fn rotation_replaces_old_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wol.log");

        let mut file = RotatingFile::open(&path, 4).unwrap();
        for line in [&b"aaa\n"[..], b"bbb\n", b"ccc\n"] {
            file.write_all(line).unwrap();
        }
        file.flush().unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "ccc\n");
        assert_eq!(fs::read_to_string(file.backup()).unwrap(), "bbb\n");
    }

    #[test]
    fn recovers_after_file_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wol.log");

        let mut file = RotatingFile::open(&path, 8).unwrap();
        file.write_all(b"first-\n").unwrap();
        fs::remove_file(&path).unwrap();

        for _ in 0..5 {
            file.write_all(b"again-\n").unwrap();
        }
        file.flush().unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "again-\n");
        assert_eq!(fs::read_to_string(file.backup()).unwrap(), "again-\n");
    }

    #[test]
    fn oversized_write_lands_in_fresh_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wol.log");

        let mut file = RotatingFile::open(&path, 4).unwrap();
        file.write_all(b"0123456789").unwrap();
        file.flush().unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "0123456789");
        assert!(!file.backup().exists());
    }

    #[test]
    fn existing_size_counts_toward_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wol.log");
        fs::write(&path, "old-data\n").unwrap();

        let mut file = RotatingFile::open(&path, 12).unwrap();
        file.write_all(b"new\n").unwrap();
        file.flush().unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "new\n");
        assert_eq!(fs::read_to_string(file.backup()).unwrap(), "old-data\n");
    }
}
