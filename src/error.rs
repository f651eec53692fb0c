// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the relay agent.
//!
//! Errors are grouped by the layer that produces them: value validation,
//! configuration loading, relay transport, and device actions. Transport
//! and action errors are recovered or logged where they occur; only
//! startup failures ever reach `main`.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// The main error type for this crate.
///
/// Only startup can fail: the relay session and device actions recover
/// from their own errors and log them where they occur.
#[derive(Debug, Error)]
pub enum Error {
    /// Error occurred while loading configuration.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Logging could not be initialised.
    #[error("logging error: {0}")]
    Logging(String),

    /// Generic I/O failure outside the relay connection.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Errors related to value validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValueError {
    /// The MAC address string could not be parsed.
    #[error("invalid MAC address: {0}")]
    InvalidMac(String),

    /// A device identifier is empty or otherwise unusable.
    #[error("invalid device id: {0:?}")]
    InvalidDeviceId(String),
}

/// Errors raised while reading the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// Path that was read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The file is not valid TOML for the expected schema.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value in the file failed validation.
    #[error(transparent)]
    Value(#[from] ValueError),

    /// A required field is missing or empty.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// A field holds a value that fails validation.
    #[error("invalid value for {field}: {message}")]
    InvalidValue {
        /// Dotted path of the offending field.
        field: String,
        /// What was wrong with it.
        message: String,
    },
}

/// Errors on the relay transport.
///
/// `generation` identifies the session that was live when the failure was
/// observed, so a reconnect request can be ignored if another actor has
/// already replaced that session.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Connecting to the relay failed.
    #[error("connection to {endpoint} failed: {source}")]
    Connect {
        /// `host:port` of the relay.
        endpoint: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Writing a frame to the relay failed.
    #[error("send on session {generation} failed: {source}")]
    Send {
        /// Session generation the write was attempted on.
        generation: u64,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// No session is currently established.
    #[error("no live session (last generation {generation})")]
    NotConnected {
        /// Last generation that was installed.
        generation: u64,
    },
}

impl ProtocolError {
    /// Returns the session generation this error was observed on, if any.
    #[must_use]
    pub fn generation(&self) -> Option<u64> {
        match self {
            Self::Send { generation, .. } | Self::NotConnected { generation } => Some(*generation),
            Self::Connect { .. } => None,
        }
    }
}

/// Errors raised by device actions (Wake-on-LAN, remote shutdown).
#[derive(Debug, Error)]
pub enum ActionError {
    /// Sending the magic packet failed.
    #[error("wake-on-lan send failed: {0}")]
    Wake(#[source] io::Error),

    /// The remote shell client could not be started.
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        /// Program that was executed.
        program: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The remote shell client did not finish in time.
    #[error("remote shutdown of {host} timed out after {secs}s")]
    Timeout {
        /// Target host.
        host: String,
        /// Timeout that elapsed.
        secs: u64,
    },

    /// The remote shell client exited unsuccessfully.
    #[error("remote shutdown of {host} exited with {status}")]
    ExitStatus {
        /// Target host.
        host: String,
        /// Exit status description.
        status: String,
    },
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
