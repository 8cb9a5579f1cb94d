// SPDX-License-Identifier: GPL-3.0-only

//! Device session state machine
//!
//! A [`DeviceSession`] tracks one camera through
//! `PendingOpen -> Opening -> Open -> Closing -> Closed` and owns the device
//! handle while it is held. It is plain data: the lifecycle manager calls it
//! from inside the camera's critical section and applies the returned
//! [`SessionStep`] (state notifications plus platform actions) after the lock
//! is released.
//!
//! Every platform event carries the attempt id it was issued for. Events for
//! an attempt the session no longer tracks are stale and ignored, except that
//! a stale device handle is always handed back for release.

use super::error_code::ErrorCode;
use super::retry::{RetryDecision, RetryPolicy};
use super::{CameraState, StateType};
use crate::backends::camera::DeviceHandle;
use crate::backends::camera::types::CameraId;
use crate::errors::{LifecycleError, LifecycleResult};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Side effect the lifecycle manager must perform outside the critical section
pub enum SessionAction {
    /// Issue the platform open call for this attempt
    IssueOpen { attempt: u64 },
    /// Call back into the session with `token` once `delay` has elapsed
    ScheduleRetry { token: u64, delay: Duration },
    /// Close the device handle; the platform answers with a closed event
    ReleaseDevice(Arc<dyn DeviceHandle>),
}

impl std::fmt::Debug for SessionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionAction::IssueOpen { attempt } => write!(f, "IssueOpen({})", attempt),
            SessionAction::ScheduleRetry { token, delay } => {
                write!(f, "ScheduleRetry({}, {:?})", token, delay)
            }
            SessionAction::ReleaseDevice(handle) => {
                write!(f, "ReleaseDevice({})", handle.camera_id())
            }
        }
    }
}

/// Observable transitions and pending actions produced by one session call
#[derive(Debug, Default)]
pub struct SessionStep {
    pub transitions: Vec<CameraState>,
    pub actions: Vec<SessionAction>,
}

impl SessionStep {
    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty() && self.actions.is_empty()
    }
}

/// The device slot of a session: the in-flight attempt, plus the handle once opened
struct DeviceLease {
    attempt: u64,
    handle: Option<Arc<dyn DeviceHandle>>,
}

#[derive(Debug, Clone, Copy)]
enum CloseReason {
    Requested,
    DeviceRemoved,
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloseReason::Requested => write!(f, "close requested"),
            CloseReason::DeviceRemoved => write!(f, "device removed"),
        }
    }
}

/// Lifecycle state of one camera
pub struct DeviceSession {
    camera_id: CameraId,
    /// Incremented on every open from `Closed`; identifies client session handles
    generation: u64,
    state: StateType,
    last_error: Option<ErrorCode>,
    /// Present iff state is Opening, Open or Closing
    device: Option<DeviceLease>,
    /// Consecutive recoverable failures in the current generation
    failures: u32,
    /// Token of the scheduled retry, if one is pending
    retry_token: Option<u64>,
    /// Source of attempt ids and retry tokens
    next_token: u64,
}

impl DeviceSession {
    pub fn new(camera_id: CameraId) -> Self {
        Self {
            camera_id,
            generation: 0,
            state: StateType::Closed,
            last_error: None,
            device: None,
            failures: 0,
            retry_token: None,
            next_token: 0,
        }
    }

    pub fn camera_id(&self) -> &CameraId {
        &self.camera_id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn state(&self) -> StateType {
        self.state
    }

    pub fn last_error(&self) -> Option<ErrorCode> {
        self.last_error
    }

    pub fn camera_state(&self) -> CameraState {
        CameraState::new(self.state, self.last_error)
    }

    /// True while a device handle (or the placeholder of an in-flight open) is held
    pub fn holds_device(&self) -> bool {
        self.device.is_some()
    }

    /// True once the platform delivered a handle that has not been released yet
    pub fn has_open_handle(&self) -> bool {
        self.device.as_ref().is_some_and(|lease| lease.handle.is_some())
    }

    /// True when an automatic retry is scheduled
    pub fn retry_scheduled(&self) -> bool {
        self.retry_token.is_some()
    }

    /// Client asked for the camera to be opened
    ///
    /// From `Closed` this starts a new generation. From `PendingOpen` the
    /// open is issued right away, replacing any scheduled retry. Any other
    /// state already has an open call or a teardown in flight.
    pub fn request_open(&mut self) -> LifecycleResult<SessionStep> {
        let mut step = SessionStep::default();
        match self.state {
            StateType::Closed => {
                self.generation += 1;
                self.failures = 0;
                self.retry_token = None;
                self.transition(&mut step, StateType::PendingOpen, None);
                self.begin_open(&mut step);
                Ok(step)
            }
            StateType::PendingOpen => {
                if self.retry_token.take().is_some() {
                    debug!(camera = %self.camera_id, "Scheduled retry replaced by open request");
                }
                self.begin_open(&mut step);
                Ok(step)
            }
            state => Err(LifecycleError::SessionBusy {
                camera: self.camera_id.clone(),
                state,
            }),
        }
    }

    /// Client asked for the camera to be closed
    pub fn request_close(&mut self) -> SessionStep {
        self.close(CloseReason::Requested)
    }

    /// The camera disappeared from the presence set
    pub fn on_device_removed(&mut self) -> SessionStep {
        self.close(CloseReason::DeviceRemoved)
    }

    /// A scheduled retry fired
    pub fn on_retry_due(&mut self, token: u64) -> SessionStep {
        let mut step = SessionStep::default();
        if self.state == StateType::PendingOpen && self.retry_token == Some(token) {
            self.retry_token = None;
            self.begin_open(&mut step);
        } else {
            debug!(camera = %self.camera_id, token, state = %self.state, "Ignoring stale retry");
        }
        step
    }

    /// The platform opened the device for `attempt`
    pub fn on_opened(&mut self, attempt: u64, handle: Arc<dyn DeviceHandle>) -> SessionStep {
        let mut step = SessionStep::default();
        if !self.owns(attempt) {
            debug!(camera = %self.camera_id, attempt, "Releasing device from stale open attempt");
            step.actions.push(SessionAction::ReleaseDevice(handle));
            return step;
        }

        match self.state {
            StateType::Opening => {
                self.set_handle(handle);
                self.failures = 0;
                self.transition(&mut step, StateType::Open, None);
            }
            StateType::Closing if !self.has_open_handle() => {
                // Close was requested while the open was in flight
                info!(camera = %self.camera_id, "Device opened after close request, releasing");
                self.set_handle(Arc::clone(&handle));
                step.actions.push(SessionAction::ReleaseDevice(handle));
            }
            state => {
                debug!(camera = %self.camera_id, %state, "Duplicate open callback, releasing handle");
                step.actions.push(SessionAction::ReleaseDevice(handle));
            }
        }
        step
    }

    /// The platform failed to open the device for `attempt`
    pub fn on_open_error(
        &mut self,
        attempt: u64,
        code: ErrorCode,
        policy: &dyn RetryPolicy,
    ) -> SessionStep {
        let mut step = SessionStep::default();
        if !self.owns(attempt) {
            debug!(camera = %self.camera_id, attempt, %code, "Ignoring stale open error");
            return step;
        }

        match self.state {
            StateType::Opening if code.is_recoverable() => {
                self.failures += 1;
                let decision = policy.on_recoverable_error(self.failures, code);
                info!(
                    camera = %self.camera_id,
                    %code,
                    failures = self.failures,
                    ?decision,
                    "Recoverable open error"
                );
                self.apply_retry_decision(&mut step, code, decision);
            }
            StateType::Opening => {
                info!(camera = %self.camera_id, %code, "Fatal open error");
                self.teardown(&mut step, Some(code));
            }
            StateType::Closing if !self.has_open_handle() => {
                // Close was requested while the open was in flight, nothing to release
                self.finish_close(&mut step);
            }
            state => {
                debug!(camera = %self.camera_id, %state, %code, "Ignoring open error");
            }
        }
        step
    }

    /// The device reported an error for `attempt`
    ///
    /// While opening this is an open failure; once open it tears the session down.
    pub fn on_device_error(
        &mut self,
        attempt: u64,
        code: ErrorCode,
        policy: &dyn RetryPolicy,
    ) -> SessionStep {
        match self.state {
            StateType::Opening => self.on_open_error(attempt, code, policy),
            _ => self.on_device_lost(attempt, Some(code), "error"),
        }
    }

    /// The device was disconnected for `attempt`
    pub fn on_disconnected(&mut self, attempt: u64) -> SessionStep {
        self.on_device_lost(attempt, None, "disconnected")
    }

    /// The device handle of `attempt` finished closing
    pub fn on_handle_closed(&mut self, attempt: u64) -> SessionStep {
        let mut step = SessionStep::default();
        if !self.owns(attempt) {
            debug!(camera = %self.camera_id, attempt, "Ignoring close of stale attempt");
            return step;
        }

        match self.state {
            StateType::Closing => self.finish_close(&mut step),
            StateType::Opening | StateType::Open => {
                info!(camera = %self.camera_id, state = %self.state, "Device closed unexpectedly");
                self.transition(&mut step, StateType::Closing, None);
                self.finish_close(&mut step);
            }
            _ => {}
        }
        step
    }

    fn on_device_lost(
        &mut self,
        attempt: u64,
        error: Option<ErrorCode>,
        what: &'static str,
    ) -> SessionStep {
        let mut step = SessionStep::default();
        if !self.owns(attempt) {
            debug!(camera = %self.camera_id, attempt, event = what, "Ignoring event for stale attempt");
            return step;
        }

        match self.state {
            StateType::Opening | StateType::Open => {
                info!(camera = %self.camera_id, event = what, error = ?error, "Device lost");
                self.teardown(&mut step, error);
            }
            StateType::Closing if !self.has_open_handle() => {
                // The in-flight open is dead, no handle will arrive
                self.finish_close(&mut step);
            }
            _ => {
                debug!(camera = %self.camera_id, event = what, "Already closing");
            }
        }
        step
    }

    fn close(&mut self, reason: CloseReason) -> SessionStep {
        let mut step = SessionStep::default();
        match self.state {
            StateType::PendingOpen => {
                info!(camera = %self.camera_id, %reason, "Cancelling pending open");
                self.retry_token = None;
                self.transition(&mut step, StateType::Closing, None);
                self.finish_close(&mut step);
            }
            StateType::Opening => {
                // Keep the attempt lease; its callback decides when we reach Closed
                info!(camera = %self.camera_id, %reason, "Closing while open is in flight");
                self.transition(&mut step, StateType::Closing, None);
            }
            StateType::Open => {
                info!(camera = %self.camera_id, %reason, "Closing camera");
                self.teardown(&mut step, None);
            }
            StateType::Closing | StateType::Closed => {
                debug!(camera = %self.camera_id, %reason, state = %self.state, "Close is a no-op");
            }
        }
        step
    }

    fn begin_open(&mut self, step: &mut SessionStep) {
        let attempt = self.take_token();
        self.device = Some(DeviceLease {
            attempt,
            handle: None,
        });
        self.transition(step, StateType::Opening, None);
        step.actions.push(SessionAction::IssueOpen { attempt });
    }

    fn apply_retry_decision(
        &mut self,
        step: &mut SessionStep,
        code: ErrorCode,
        decision: RetryDecision,
    ) {
        match decision {
            RetryDecision::RetryAfter(delay) if delay.is_zero() => {
                let attempt = self.take_token();
                self.device = Some(DeviceLease {
                    attempt,
                    handle: None,
                });
                self.transition(step, StateType::Opening, Some(code));
                step.actions.push(SessionAction::IssueOpen { attempt });
            }
            RetryDecision::RetryAfter(delay) => {
                let token = self.take_token();
                self.device = None;
                self.retry_token = Some(token);
                self.transition(step, StateType::PendingOpen, Some(code));
                step.actions.push(SessionAction::ScheduleRetry { token, delay });
            }
            RetryDecision::AwaitRequest => {
                self.device = None;
                self.transition(step, StateType::PendingOpen, Some(code));
            }
            RetryDecision::GiveUp => self.teardown(step, Some(code)),
        }
    }

    /// Enter Closing; release the handle if there is one, otherwise finish immediately
    fn teardown(&mut self, step: &mut SessionStep, error: Option<ErrorCode>) {
        self.transition(step, StateType::Closing, error);
        let handle = self
            .device
            .as_ref()
            .and_then(|lease| lease.handle.as_ref().map(Arc::clone));
        match handle {
            Some(handle) => step.actions.push(SessionAction::ReleaseDevice(handle)),
            None => self.finish_close(step),
        }
    }

    fn finish_close(&mut self, step: &mut SessionStep) {
        self.device = None;
        self.retry_token = None;
        self.transition(step, StateType::Closed, None);
    }

    fn set_handle(&mut self, handle: Arc<dyn DeviceHandle>) {
        if let Some(lease) = self.device.as_mut() {
            lease.handle = Some(handle);
        }
    }

    fn owns(&self, attempt: u64) -> bool {
        self.device
            .as_ref()
            .is_some_and(|lease| lease.attempt == attempt)
    }

    fn take_token(&mut self) -> u64 {
        self.next_token += 1;
        self.next_token
    }

    fn transition(&mut self, step: &mut SessionStep, state: StateType, error: Option<ErrorCode>) {
        debug!(camera = %self.camera_id, from = %self.state, to = %state, "Session transition");
        self.state = state;
        self.last_error = error;
        step.transitions.push(CameraState::new(state, error));
        info!(camera = %self.camera_id, state = %state, error = ?error, "Camera state changed");
    }
}

impl std::fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSession")
            .field("camera_id", &self.camera_id)
            .field("generation", &self.generation)
            .field("state", &self.state)
            .field("last_error", &self.last_error)
            .field("holds_device", &self.holds_device())
            .field("failures", &self.failures)
            .finish()
    }
}
