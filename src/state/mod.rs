// SPDX-License-Identifier: GPL-3.0-only

//! Camera session state
//!
//! - [`error_code`]: classified error codes and the platform error classifier
//! - [`retry`]: pluggable retry policies for recoverable failures
//! - [`session`]: the per-camera device session state machine
//!
//! Observers only ever see [`CameraState`], the `(state, error)` pair.

pub mod error_code;
pub mod retry;
pub mod session;

pub use error_code::{ErrorCode, RecoverabilityClass, classify};
pub use retry::{ExponentialBackoff, FixedDelayRetry, ManualRetry, RetryDecision, RetryPolicy};
pub use session::{DeviceSession, SessionAction, SessionStep};

use crate::backends::camera::types::CameraId;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a camera session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateType {
    /// Open requested, no platform call in flight (queued or waiting to retry)
    PendingOpen,
    /// Platform open call in flight
    Opening,
    /// Device open and usable
    Open,
    /// Teardown started, device handle not yet released
    Closing,
    /// No device held
    Closed,
}

impl std::fmt::Display for StateType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StateType::PendingOpen => write!(f, "PENDING_OPEN"),
            StateType::Opening => write!(f, "OPENING"),
            StateType::Open => write!(f, "OPEN"),
            StateType::Closing => write!(f, "CLOSING"),
            StateType::Closed => write!(f, "CLOSED"),
        }
    }
}

/// Externally observable camera state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraState {
    pub state: StateType,
    pub error: Option<ErrorCode>,
}

impl CameraState {
    pub fn new(state: StateType, error: Option<ErrorCode>) -> Self {
        Self { state, error }
    }

    pub fn closed() -> Self {
        Self::new(StateType::Closed, None)
    }
}

impl std::fmt::Display for CameraState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.error {
            Some(error) => write!(f, "{} ({})", self.state, error),
            None => write!(f, "{}", self.state),
        }
    }
}

/// Notification payload delivered to state observers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChange {
    pub camera_id: CameraId,
    pub state: CameraState,
}
