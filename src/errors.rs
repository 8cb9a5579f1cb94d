// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the camera lifecycle tracker
//!
//! Device failures are not errors at this level: they are classified into
//! [`crate::state::ErrorCode`] and reported through the camera state. The
//! types here cover API misuse and configuration failures.

use crate::backends::camera::types::CameraId;
use crate::state::StateType;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using LifecycleError
pub type LifecycleResult<T> = Result<T, LifecycleError>;

/// Errors returned by the lifecycle manager's client API
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LifecycleError {
    /// The camera is not currently reported present by the platform
    #[error("Camera {0} is not present")]
    CameraNotPresent(CameraId),

    /// An open attempt or teardown is already in progress for this camera
    #[error("Camera {camera} is busy ({state})")]
    SessionBusy { camera: CameraId, state: StateType },

    /// No session was ever opened for this camera
    #[error("No session for camera {0}")]
    UnknownSession(CameraId),

    /// The handle belongs to an earlier session of this camera
    #[error("Session handle for camera {0} is stale")]
    StaleSession(CameraId),

    /// The manager has been shut down
    #[error("Camera lifecycle manager is shut down")]
    ShutDown,
}

/// Configuration loading and saving errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No user configuration directory available")]
    NoConfigDir,

    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed configuration {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
