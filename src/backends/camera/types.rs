// SPDX-License-Identifier: GPL-3.0-only
// Shared types for the camera platform boundary

//! Shared types for camera backends

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

use super::DeviceHandle;

/// Opaque identifier of a camera known to the platform
///
/// Identifiers are compared and hashed by value. The same identifier may come
/// back after a camera is unplugged and plugged in again.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CameraId(String);

impl CameraId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CameraId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CameraId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for CameraId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Raw error code reported by the platform when opening or operating a device
///
/// The numeric values follow the Android `CameraDevice.StateCallback` error
/// constants. Use [`crate::state::classify`] to turn them into an
/// [`crate::state::ErrorCode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlatformErrorCode(pub i32);

impl PlatformErrorCode {
    /// Camera is already opened by a higher priority client
    pub const CAMERA_IN_USE: Self = Self(1);
    /// System-wide limit of simultaneously open cameras reached
    pub const MAX_CAMERAS_IN_USE: Self = Self(2);
    /// Camera disabled by device policy
    pub const CAMERA_DISABLED: Self = Self(3);
    /// Generic device failure, usually transient
    pub const CAMERA_DEVICE: Self = Self(4);
    /// Camera service failed, the device cannot be used until it recovers
    pub const CAMERA_SERVICE: Self = Self(5);

    pub fn raw(&self) -> i32 {
        self.0
    }

    /// Platform name of the code, if it is one of the known constants
    pub fn name(&self) -> Option<&'static str> {
        match *self {
            Self::CAMERA_IN_USE => Some("ERROR_CAMERA_IN_USE"),
            Self::MAX_CAMERAS_IN_USE => Some("ERROR_MAX_CAMERAS_IN_USE"),
            Self::CAMERA_DISABLED => Some("ERROR_CAMERA_DISABLED"),
            Self::CAMERA_DEVICE => Some("ERROR_CAMERA_DEVICE"),
            Self::CAMERA_SERVICE => Some("ERROR_CAMERA_SERVICE"),
            _ => None,
        }
    }
}

impl std::fmt::Display for PlatformErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} ({})", name, self.0),
            None => write!(f, "unknown platform error ({})", self.0),
        }
    }
}

/// Result of a platform open call
pub enum OpenOutcome {
    /// The device is open and owned by the receiver
    Success(Arc<dyn DeviceHandle>),
    /// The device could not be opened
    Failure(PlatformErrorCode),
}

impl std::fmt::Debug for OpenOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpenOutcome::Success(handle) => write!(f, "Success({})", handle.camera_id()),
            OpenOutcome::Failure(code) => write!(f, "Failure({})", code),
        }
    }
}

/// Event reported by the platform for one open attempt of one device
pub enum DeviceEvent {
    /// Outcome of the open call
    Open(OpenOutcome),
    /// The device was disconnected (unplugged, or taken by a higher priority client)
    Disconnected,
    /// The open device reported an error
    Error(PlatformErrorCode),
    /// The device handle finished closing
    Closed,
}

impl DeviceEvent {
    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            DeviceEvent::Open(OpenOutcome::Success(_)) => "opened",
            DeviceEvent::Open(OpenOutcome::Failure(_)) => "open_error",
            DeviceEvent::Disconnected => "disconnected",
            DeviceEvent::Error(_) => "error",
            DeviceEvent::Closed => "closed",
        }
    }
}

impl std::fmt::Debug for DeviceEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceEvent::Open(outcome) => write!(f, "Open({:?})", outcome),
            DeviceEvent::Disconnected => write!(f, "Disconnected"),
            DeviceEvent::Error(code) => write!(f, "Error({})", code),
            DeviceEvent::Closed => write!(f, "Closed"),
        }
    }
}

/// Kind of presence change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceChange {
    Added,
    Removed,
}

impl std::fmt::Display for PresenceChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PresenceChange::Added => write!(f, "added"),
            PresenceChange::Removed => write!(f, "removed"),
        }
    }
}

/// A camera appeared in or disappeared from the system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceEvent {
    pub camera_id: CameraId,
    pub change: PresenceChange,
}

impl PresenceEvent {
    pub fn added(camera_id: CameraId) -> Self {
        Self {
            camera_id,
            change: PresenceChange::Added,
        }
    }

    pub fn removed(camera_id: CameraId) -> Self {
        Self {
            camera_id,
            change: PresenceChange::Removed,
        }
    }
}

/// Snapshot of the cameras currently reported present
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PresenceSet(BTreeSet<CameraId>);

impl PresenceSet {
    pub fn contains(&self, id: &CameraId) -> bool {
        self.0.contains(id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CameraId> {
        self.0.iter()
    }
}

impl From<BTreeSet<CameraId>> for PresenceSet {
    fn from(ids: BTreeSet<CameraId>) -> Self {
        Self(ids)
    }
}

impl FromIterator<CameraId> for PresenceSet {
    fn from_iter<I: IntoIterator<Item = CameraId>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for PresenceSet {
    type Item = CameraId;
    type IntoIter = std::collections::btree_set::IntoIter<CameraId>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
