// SPDX-License-Identifier: GPL-3.0-only

//! Simulated camera platform
//!
//! An in-memory [`CameraPlatform`] that can be scripted: cameras are plugged
//! and unplugged on demand, open calls can be made to fail or to stay
//! pending until released, and open devices can be made to report errors or
//! disconnect. Used by the CLI scenarios and by tests.
//!
//! Callbacks are always delivered through the executor the manager supplied
//! and never while the platform's own lock is held.

use super::manager::{DeviceEventSink, PresenceSink};
use super::types::*;
use super::{CameraPlatform, DeviceHandle, PresenceRegistration};
use crate::executor::Executor;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::{debug, info};

/// Failure reported by an open device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceErrorScenario {
    /// The device reports an error with this code
    OnError(PlatformErrorCode),
    /// The device is disconnected
    OnDisconnected,
}

#[derive(Debug, Clone, Copy)]
enum OpenFailure {
    /// Reported through the sink
    Callback(PlatformErrorCode),
    /// Returned from the open call
    Rejected(PlatformErrorCode),
}

struct PendingOpen {
    camera_id: CameraId,
    executor: Arc<dyn Executor>,
    sink: DeviceEventSink,
}

struct PresenceListener {
    registration: PresenceRegistration,
    executor: Arc<dyn Executor>,
    sink: PresenceSink,
}

#[derive(Default)]
struct SimState {
    cameras: BTreeSet<CameraId>,
    listeners: Vec<PresenceListener>,
    open_failures: HashMap<CameraId, VecDeque<OpenFailure>>,
    hold_opens: bool,
    hold_closes: bool,
    pending_opens: Vec<PendingOpen>,
    open_devices: Vec<Arc<SimulatedDevice>>,
    open_calls: HashMap<CameraId, usize>,
}

/// Device handle produced by [`SimulatedPlatform`]
pub struct SimulatedDevice {
    camera_id: CameraId,
    executor: Arc<dyn Executor>,
    sink: DeviceEventSink,
    closed: AtomicBool,
    platform: Weak<Mutex<SimState>>,
}

impl DeviceHandle for SimulatedDevice {
    fn camera_id(&self) -> &CameraId {
        &self.camera_id
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!(camera = %self.camera_id, attempt = self.sink.attempt(), "Simulated device closing");

        if let Some(state) = self.platform.upgrade() {
            let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
            if state.hold_closes {
                debug!(camera = %self.camera_id, "Simulated close held");
                return;
            }
            state
                .open_devices
                .retain(|device| !std::ptr::eq(Arc::as_ptr(device), self));
        }

        self.report_closed();
    }
}

impl SimulatedDevice {
    /// True once close was called, even if the platform has not confirmed it
    pub fn is_closing(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn report_closed(&self) {
        let sink = self.sink.clone();
        self.executor.execute(Box::new(move || sink.closed()));
    }
}

/// Scriptable in-memory camera platform
#[derive(Default)]
pub struct SimulatedPlatform {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Platform that starts with `ids` plugged in
    pub fn with_cameras<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<CameraId>,
    {
        let platform = Self::new();
        platform.lock().cameras = ids.into_iter().map(Into::into).collect();
        platform
    }

    /// Plug a camera in and notify presence listeners
    ///
    /// Returns false if the camera was already present.
    pub fn add_camera(&self, id: impl Into<CameraId>) -> bool {
        let id = id.into();
        let listeners = {
            let mut state = self.lock();
            if !state.cameras.insert(id.clone()) {
                return false;
            }
            listener_targets(&state)
        };

        info!(camera = %id, "Simulated camera plugged in");
        for (executor, sink) in listeners {
            let id = id.clone();
            executor.execute(Box::new(move || sink.on_added(&id)));
        }
        true
    }

    /// Unplug a camera and notify presence listeners
    ///
    /// Open devices of the camera are left alone; the manager reacts to the
    /// presence change. Returns false if the camera was not present.
    pub fn remove_camera(&self, id: &CameraId) -> bool {
        let listeners = {
            let mut state = self.lock();
            if !state.cameras.remove(id) {
                return false;
            }
            listener_targets(&state)
        };

        info!(camera = %id, "Simulated camera unplugged");
        for (executor, sink) in listeners {
            let id = id.clone();
            executor.execute(Box::new(move || sink.on_removed(&id)));
        }
        true
    }

    /// Send a removal notification without changing the camera set
    ///
    /// Mimics a platform repeating a hot-plug callback.
    pub fn repeat_removal(&self, id: &CameraId) {
        let listeners = listener_targets(&self.lock());
        for (executor, sink) in listeners {
            let id = id.clone();
            executor.execute(Box::new(move || sink.on_removed(&id)));
        }
    }

    /// Make the next open of `id` report `code` through its callback
    pub fn fail_next_open_with(&self, id: &CameraId, code: PlatformErrorCode) {
        self.queue_failure(id, OpenFailure::Callback(code));
    }

    /// Make the next open call of `id` return `code` directly
    pub fn reject_next_open_with(&self, id: &CameraId, code: PlatformErrorCode) {
        self.queue_failure(id, OpenFailure::Rejected(code));
    }

    /// While set, successful opens stay pending until completed or failed
    pub fn hold_opens(&self, hold: bool) {
        self.lock().hold_opens = hold;
    }

    /// While set, closed devices stay registered and their closed event is
    /// withheld until [`Self::complete_pending_closes`]
    pub fn hold_closes(&self, hold: bool) {
        self.lock().hold_closes = hold;
    }

    /// Confirm every held close of `id`; returns how many were confirmed
    pub fn complete_pending_closes(&self, id: &CameraId) -> usize {
        let closing: Vec<Arc<SimulatedDevice>> = {
            let mut state = self.lock();
            let (closing, open): (Vec<_>, Vec<_>) = std::mem::take(&mut state.open_devices)
                .into_iter()
                .partition(|device| &device.camera_id == id && device.is_closing());
            state.open_devices = open;
            closing
        };

        for device in &closing {
            device.report_closed();
        }
        closing.len()
    }

    /// Complete the oldest pending open of `id` with a device
    pub fn complete_pending_open(&self, id: &CameraId) -> bool {
        let Some(pending) = self.take_pending(id) else {
            return false;
        };
        self.deliver_device(pending.camera_id, pending.executor, pending.sink);
        true
    }

    /// Fail the oldest pending open of `id` with `code`
    pub fn fail_pending_open(&self, id: &CameraId, code: PlatformErrorCode) -> bool {
        let Some(pending) = self.take_pending(id) else {
            return false;
        };
        let sink = pending.sink;
        pending
            .executor
            .execute(Box::new(move || sink.open_failed(code)));
        true
    }

    pub fn pending_open_count(&self, id: &CameraId) -> usize {
        self.lock()
            .pending_opens
            .iter()
            .filter(|pending| &pending.camera_id == id)
            .count()
    }

    /// Make every registered device of `id` report `scenario`; returns how many were notified
    ///
    /// Devices whose close is held still count as registered.
    pub fn notify_device_error(&self, id: &CameraId, scenario: DeviceErrorScenario) -> usize {
        let devices: Vec<Arc<SimulatedDevice>> = self
            .lock()
            .open_devices
            .iter()
            .filter(|device| &device.camera_id == id)
            .map(Arc::clone)
            .collect();

        info!(camera = %id, ?scenario, devices = devices.len(), "Simulating device failure");
        for device in &devices {
            let sink = device.sink.clone();
            let job: Box<dyn FnOnce() + Send> = match scenario {
                DeviceErrorScenario::OnError(code) => Box::new(move || sink.error(code)),
                DeviceErrorScenario::OnDisconnected => Box::new(move || sink.disconnected()),
            };
            device.executor.execute(job);
        }
        devices.len()
    }

    /// Number of open calls made for `id`
    pub fn open_call_count(&self, id: &CameraId) -> usize {
        self.lock().open_calls.get(id).copied().unwrap_or(0)
    }

    /// True if a device of `id` is registered and its close not yet confirmed
    pub fn is_device_open(&self, id: &CameraId) -> bool {
        self.lock()
            .open_devices
            .iter()
            .any(|device| &device.camera_id == id)
    }

    pub fn open_device_count(&self) -> usize {
        self.lock().open_devices.len()
    }

    /// Number of registered presence listeners
    pub fn presence_listener_count(&self) -> usize {
        self.lock().listeners.len()
    }

    fn queue_failure(&self, id: &CameraId, failure: OpenFailure) {
        self.lock()
            .open_failures
            .entry(id.clone())
            .or_default()
            .push_back(failure);
    }

    fn take_pending(&self, id: &CameraId) -> Option<PendingOpen> {
        let mut state = self.lock();
        let index = state
            .pending_opens
            .iter()
            .position(|pending| &pending.camera_id == id)?;
        Some(state.pending_opens.remove(index))
    }

    fn deliver_device(&self, camera_id: CameraId, executor: Arc<dyn Executor>, sink: DeviceEventSink) {
        let device = Arc::new(SimulatedDevice {
            camera_id,
            executor: Arc::clone(&executor),
            sink: sink.clone(),
            closed: AtomicBool::new(false),
            platform: Arc::downgrade(&self.state),
        });
        self.lock().open_devices.push(Arc::clone(&device));

        debug!(camera = %device.camera_id, attempt = sink.attempt(), "Simulated device opened");
        executor.execute(Box::new(move || sink.opened(device)));
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn listener_targets(state: &SimState) -> Vec<(Arc<dyn Executor>, PresenceSink)> {
    state
        .listeners
        .iter()
        .map(|listener| (Arc::clone(&listener.executor), listener.sink.clone()))
        .collect()
}

impl CameraPlatform for SimulatedPlatform {
    fn camera_ids(&self) -> Vec<CameraId> {
        self.lock().cameras.iter().cloned().collect()
    }

    fn open_device(
        &self,
        id: &CameraId,
        executor: Arc<dyn Executor>,
        sink: DeviceEventSink,
    ) -> Result<(), PlatformErrorCode> {
        let failure = {
            let mut state = self.lock();
            *state.open_calls.entry(id.clone()).or_default() += 1;

            if !state.cameras.contains(id) {
                return Err(PlatformErrorCode::CAMERA_DEVICE);
            }

            let failure = state
                .open_failures
                .get_mut(id)
                .and_then(VecDeque::pop_front);
            if failure.is_none() && state.hold_opens {
                state.pending_opens.push(PendingOpen {
                    camera_id: id.clone(),
                    executor,
                    sink,
                });
                debug!(camera = %id, "Simulated open held");
                return Ok(());
            }
            failure
        };

        match failure {
            Some(OpenFailure::Rejected(code)) => Err(code),
            Some(OpenFailure::Callback(code)) => {
                debug!(camera = %id, %code, "Simulated open failing");
                executor.execute(Box::new(move || sink.open_failed(code)));
                Ok(())
            }
            None => {
                self.deliver_device(id.clone(), executor, sink);
                Ok(())
            }
        }
    }

    fn register_presence_listener(
        &self,
        executor: Arc<dyn Executor>,
        sink: PresenceSink,
    ) -> PresenceRegistration {
        let registration = PresenceRegistration::new();
        self.lock().listeners.push(PresenceListener {
            registration,
            executor,
            sink,
        });
        registration
    }

    fn unregister_presence_listener(&self, registration: PresenceRegistration) {
        self.lock()
            .listeners
            .retain(|listener| listener.registration != registration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::CameraLifecycleManager;
    use crate::state::StateType;

    #[test]
    fn test_with_cameras_seeds_ids() {
        let platform = SimulatedPlatform::with_cameras(["1", "0"]);
        assert_eq!(
            platform.camera_ids(),
            vec![CameraId::from("0"), CameraId::from("1")]
        );
    }

    #[test]
    fn test_add_and_remove_report_changes() {
        let platform = SimulatedPlatform::new();
        assert!(platform.add_camera("0"));
        assert!(!platform.add_camera("0"));
        assert!(platform.remove_camera(&CameraId::from("0")));
        assert!(!platform.remove_camera(&CameraId::from("0")));
    }

    #[test]
    fn test_held_open_completes_on_demand() {
        let platform = Arc::new(SimulatedPlatform::with_cameras(["0"]));
        platform.hold_opens(true);
        let manager = CameraLifecycleManager::builder(platform.clone()).build();
        let id = CameraId::from("0");

        manager.request_open(&id).unwrap();
        assert_eq!(platform.pending_open_count(&id), 1);
        assert_eq!(manager.camera_state(&id).state, StateType::Opening);

        assert!(platform.complete_pending_open(&id));
        assert_eq!(manager.camera_state(&id).state, StateType::Open);
        assert!(!platform.complete_pending_open(&id));
    }

    #[test]
    fn test_held_close_keeps_device_registered() {
        let platform = Arc::new(SimulatedPlatform::with_cameras(["0"]));
        let manager = CameraLifecycleManager::builder(platform.clone()).build();
        let id = CameraId::from("0");
        platform.hold_closes(true);

        let handle = manager.request_open(&id).unwrap();
        manager.request_close(&handle).unwrap();
        assert_eq!(manager.camera_state(&id).state, StateType::Closing);
        assert!(platform.is_device_open(&id));

        assert_eq!(platform.complete_pending_closes(&id), 1);
        assert_eq!(manager.camera_state(&id).state, StateType::Closed);
        assert!(!platform.is_device_open(&id));
        assert_eq!(platform.complete_pending_closes(&id), 0);
    }

    #[test]
    fn test_device_close_is_idempotent() {
        let platform = Arc::new(SimulatedPlatform::with_cameras(["0"]));
        let manager = CameraLifecycleManager::builder(platform.clone()).build();
        let id = CameraId::from("0");

        let handle = manager.request_open(&id).unwrap();
        assert_eq!(platform.open_device_count(), 1);
        manager.request_close(&handle).unwrap();
        manager.request_close(&handle).unwrap();
        assert_eq!(platform.open_device_count(), 0);
        assert_eq!(manager.camera_state(&id).state, StateType::Closed);
    }
}
