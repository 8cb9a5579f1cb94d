// SPDX-License-Identifier: GPL-3.0-only

//! Backend abstraction layer
//!
//! This module provides the platform boundary of the lifecycle tracker:
//! - The [`camera::CameraPlatform`] trait the host camera service implements
//! - The [`camera::CameraLifecycleManager`] driving it
//! - A scriptable [`camera::SimulatedPlatform`]
//!
//! # Modules
//!
//! - [`camera`]: Camera platform trait, lifecycle manager and simulated platform

pub mod camera;
