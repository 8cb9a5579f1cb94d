// SPDX-License-Identifier: GPL-3.0-only

//! Camera platform abstraction
//!
//! The lifecycle manager drives cameras through the [`CameraPlatform`] trait:
//!
//! ```text
//! ┌──────────────────────────┐
//! │      Client / CLI        │
//! └────────────┬─────────────┘
//!              │ request_open / request_close / subscribe
//!              ▼
//! ┌──────────────────────────┐
//! │  CameraLifecycleManager  │  ← presence, sessions, observers
//! └────────────┬─────────────┘
//!              │ open_device / presence listener
//!              ▼
//! ┌──────────────────────────┐
//! │  CameraPlatform trait    │
//! └────────────┬─────────────┘
//!              ▼
//!       ┌─────────────┐
//!       │  Simulated  │
//!       └─────────────┘
//! ```
//!
//! Platform callbacks are messages: an open call receives a
//! [`DeviceEventSink`] bound to the camera and the attempt it was issued
//! for, and hot-plug notifications go through a [`PresenceSink`].

pub mod manager;
pub mod simulated;
pub mod types;

pub use manager::{
    CameraLifecycleManager, CameraLifecycleManagerBuilder, DeviceEventSink, PresenceSink,
    SessionHandle,
};
pub use simulated::{DeviceErrorScenario, SimulatedDevice, SimulatedPlatform};
pub use types::*;

use crate::executor::Executor;
use std::sync::Arc;
use uuid::Uuid;

/// An opened camera device
pub trait DeviceHandle: Send + Sync {
    fn camera_id(&self) -> &CameraId;

    /// Start closing the device
    ///
    /// Returns immediately. The platform delivers [`DeviceEvent::Closed`] to
    /// the device's sink once the device is released. Calling it again is a
    /// no-op.
    fn close(&self);
}

/// Token identifying a presence listener registration on a platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PresenceRegistration(Uuid);

impl PresenceRegistration {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PresenceRegistration {
    fn default() -> Self {
        Self::new()
    }
}

/// Camera service of the host system
///
/// Implementations must not call into a sink while holding their own locks:
/// sinks take the manager's per-camera lock.
pub trait CameraPlatform: Send + Sync {
    /// Cameras present right now
    fn camera_ids(&self) -> Vec<CameraId>;

    /// Start opening a camera
    ///
    /// The outcome arrives through `sink` on `executor` as
    /// [`DeviceEvent::Open`]. Later device events for an opened handle use
    /// the same sink. An `Err` means the call was rejected synchronously and
    /// no event will follow.
    fn open_device(
        &self,
        id: &CameraId,
        executor: Arc<dyn Executor>,
        sink: DeviceEventSink,
    ) -> Result<(), PlatformErrorCode>;

    /// Register for hot-plug notifications, delivered through `sink` on `executor`
    fn register_presence_listener(
        &self,
        executor: Arc<dyn Executor>,
        sink: PresenceSink,
    ) -> PresenceRegistration;

    fn unregister_presence_listener(&self, registration: PresenceRegistration);
}
