// SPDX-License-Identifier: GPL-3.0-only

//! Camera Lifecycle - camera availability and device session tracking
//!
//! This library keeps track of which cameras the platform reports present,
//! drives one device session per camera through
//! `PendingOpen -> Opening -> Open -> Closing -> Closed`, and notifies
//! observers of every presence and state change.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`backends`]: Platform abstraction, lifecycle manager and simulated platform
//! - [`state`]: Session state machine, error classification and retry policies
//! - [`registry`]: Set of cameras currently present
//! - [`listeners`]: Observer registration and ordered delivery
//! - [`executor`] / [`scheduler`]: Where callbacks and delayed retries run
//! - [`config`]: User configuration handling
//!
//! # Example
//!
//! ```
//! use camera_lifecycle::backends::camera::{CameraId, CameraLifecycleManager, SimulatedPlatform};
//! use camera_lifecycle::state::StateType;
//! use std::sync::Arc;
//!
//! let platform = Arc::new(SimulatedPlatform::with_cameras(["0"]));
//! let manager = CameraLifecycleManager::builder(platform).build();
//!
//! let id = CameraId::from("0");
//! let session = manager.request_open(&id).unwrap();
//! assert_eq!(manager.camera_state(&id).state, StateType::Open);
//! manager.request_close(&session).unwrap();
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod executor;
pub mod listeners;
pub mod registry;
pub mod scheduler;
pub mod state;

// Re-export commonly used types
pub use backends::camera::{
    CameraId, CameraLifecycleManager, CameraPlatform, DeviceHandle, PresenceEvent, PresenceSet,
    SessionHandle,
};
pub use config::Config;
pub use errors::{LifecycleError, LifecycleResult};
pub use listeners::ListenerHandle;
pub use state::{CameraState, ErrorCode, StateChange, StateType};
