// SPDX-License-Identifier: GPL-3.0-only

//! Camera lifecycle manager
//!
//! The manager provides:
//! - Presence tracking driven by platform hot-plug notifications
//! - One device session per camera, opened and closed on client request
//! - Ordered state and presence notifications to registered observers
//!
//! Every camera has its own critical section. Session transitions, presence
//! changes and notification enqueueing for a camera happen inside it; platform
//! calls, device releases and observer deliveries happen after it is left.

use super::types::*;
use super::{CameraPlatform, DeviceHandle, PresenceRegistration};
use crate::config::Config;
use crate::constants;
use crate::errors::{LifecycleError, LifecycleResult};
use crate::executor::{Executor, InlineExecutor};
use crate::listeners::{Dispatch, ListenerFanout, ListenerHandle, ListenerKind};
use crate::registry::CameraRegistry;
use crate::scheduler::{Scheduler, ThreadScheduler, TokioScheduler};
use crate::state::{
    CameraState, DeviceSession, ManualRetry, RetryPolicy, SessionAction, SessionStep, StateChange,
    classify,
};
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tracing::{debug, info, warn};

/// Client token for one open session of a camera
///
/// Returned by [`CameraLifecycleManager::request_open`]; closing with a
/// token from an earlier session of the same camera is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionHandle {
    camera_id: CameraId,
    generation: u64,
}

impl SessionHandle {
    pub fn camera_id(&self) -> &CameraId {
        &self.camera_id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Per-camera state guarded by the camera's critical section
#[derive(Default)]
struct CameraSlot {
    session: Option<DeviceSession>,
}

/// Work collected inside a critical section, applied after it is left
#[derive(Default)]
struct Effects {
    dispatch: Dispatch,
    actions: Vec<SessionAction>,
}

type DeferredEffects = Box<dyn FnOnce()>;

thread_local! {
    /// Effects raised on this thread while it is already applying effects
    static DEFERRED: RefCell<Option<VecDeque<DeferredEffects>>> = const { RefCell::new(None) };
}

/// Marks the outermost effect application on a thread; drops leftover work on unwind
struct ApplyScope;

impl ApplyScope {
    /// None if this thread is already applying effects
    fn enter() -> Option<Self> {
        DEFERRED.with(|deferred| {
            let mut deferred = deferred.borrow_mut();
            if deferred.is_some() {
                return None;
            }
            *deferred = Some(VecDeque::new());
            Some(ApplyScope)
        })
    }

    fn defer(job: DeferredEffects) {
        DEFERRED.with(|deferred| {
            if let Some(queue) = deferred.borrow_mut().as_mut() {
                queue.push_back(job);
            }
        });
    }

    fn next(&self) -> Option<DeferredEffects> {
        DEFERRED.with(|deferred| deferred.borrow_mut().as_mut().and_then(VecDeque::pop_front))
    }
}

impl Drop for ApplyScope {
    fn drop(&mut self) {
        // Taken out first: dropping queued effects may start deliveries that re-enter
        let leftover = DEFERRED.with(|deferred| deferred.borrow_mut().take());
        drop(leftover);
    }
}

struct Inner {
    platform: Arc<dyn CameraPlatform>,
    registry: CameraRegistry,
    slots: Mutex<HashMap<CameraId, Arc<Mutex<CameraSlot>>>>,
    presence_listeners: ListenerFanout<PresenceEvent>,
    state_listeners: ListenerFanout<StateChange>,
    retry_policy: Arc<dyn RetryPolicy>,
    scheduler: Arc<dyn Scheduler>,
    /// Executor for platform callbacks
    camera_executor: Arc<dyn Executor>,
    presence_registration: Mutex<Option<PresenceRegistration>>,
    shut_down: AtomicBool,
}

impl Inner {
    fn slot(&self, id: &CameraId) -> Arc<Mutex<CameraSlot>> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(id.clone()).or_default())
    }

    fn existing_slot(&self, id: &CameraId) -> Option<Arc<Mutex<CameraSlot>>> {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .map(Arc::clone)
    }

    /// Run `f` inside the critical section of `id`, then apply its effects
    fn transact<R>(
        self: &Arc<Self>,
        id: &CameraId,
        f: impl FnOnce(&mut CameraSlot, &mut Effects) -> R,
    ) -> R {
        let slot = self.slot(id);
        let mut effects = Effects::default();
        let result = {
            let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
            f(&mut guard, &mut effects)
        };
        self.apply(id, effects);
        result
    }

    /// Publish the step's transitions and queue its actions
    fn absorb(&self, id: &CameraId, step: SessionStep, effects: &mut Effects) {
        for state in step.transitions {
            let change = StateChange {
                camera_id: id.clone(),
                state,
            };
            effects.dispatch.extend(self.state_listeners.publish(&change));
        }
        effects.actions.extend(step.actions);
    }

    /// Apply effects outside any critical section
    ///
    /// Platform calls may answer synchronously and raise further effects on
    /// the same thread. Those are queued and run by the outermost call in a
    /// loop, so back-to-back retries never deepen the stack.
    fn apply(self: &Arc<Self>, id: &CameraId, effects: Effects) {
        let Some(scope) = ApplyScope::enter() else {
            let inner = Arc::clone(self);
            let id = id.clone();
            ApplyScope::defer(Box::new(move || inner.run_effects(&id, effects)));
            return;
        };

        self.run_effects(id, effects);
        while let Some(job) = scope.next() {
            job();
        }
    }

    fn run_effects(self: &Arc<Self>, id: &CameraId, effects: Effects) {
        let Effects { dispatch, actions } = effects;
        drop(dispatch);

        for action in actions {
            match action {
                SessionAction::IssueOpen { attempt } => self.issue_open(id, attempt),
                SessionAction::ScheduleRetry { token, delay } => {
                    debug!(camera = %id, token, ?delay, "Scheduling open retry");
                    let inner = Arc::downgrade(self);
                    let camera_id = id.clone();
                    self.scheduler.schedule(
                        delay,
                        Box::new(move || {
                            if let Some(inner) = inner.upgrade() {
                                inner.retry_due(&camera_id, token);
                            }
                        }),
                    );
                }
                SessionAction::ReleaseDevice(handle) => {
                    debug!(camera = %id, "Releasing device");
                    handle.close();
                }
            }
        }
    }

    fn issue_open(self: &Arc<Self>, id: &CameraId, attempt: u64) {
        debug!(camera = %id, attempt, "Opening device");
        let sink = DeviceEventSink {
            inner: Arc::downgrade(self),
            camera_id: id.clone(),
            attempt,
        };
        let issued = self
            .platform
            .open_device(id, Arc::clone(&self.camera_executor), sink);
        if let Err(code) = issued {
            warn!(camera = %id, attempt, %code, "Platform rejected open call");
            self.device_event(id, attempt, DeviceEvent::Open(OpenOutcome::Failure(code)));
        }
    }

    fn retry_due(self: &Arc<Self>, id: &CameraId, token: u64) {
        self.transact(id, |slot, effects| {
            if let Some(session) = slot.session.as_mut() {
                let step = session.on_retry_due(token);
                self.absorb(id, step, effects);
            }
        });
    }

    fn device_event(self: &Arc<Self>, id: &CameraId, attempt: u64, event: DeviceEvent) {
        debug!(camera = %id, attempt, event = event.name(), "Device event");
        self.transact(id, |slot, effects| {
            let Some(session) = slot.session.as_mut() else {
                if let DeviceEvent::Open(OpenOutcome::Success(handle)) = event {
                    effects.actions.push(SessionAction::ReleaseDevice(handle));
                }
                return;
            };

            let policy = self.retry_policy.as_ref();
            let step = match event {
                DeviceEvent::Open(OpenOutcome::Success(handle)) => {
                    session.on_opened(attempt, handle)
                }
                DeviceEvent::Open(OpenOutcome::Failure(raw)) => {
                    session.on_open_error(attempt, classify(raw), policy)
                }
                DeviceEvent::Disconnected => session.on_disconnected(attempt),
                DeviceEvent::Error(raw) => session.on_device_error(attempt, classify(raw), policy),
                DeviceEvent::Closed => session.on_handle_closed(attempt),
            };
            self.absorb(id, step, effects);
        });
    }

    fn presence_added(self: &Arc<Self>, id: &CameraId) {
        self.transact(id, |_, effects| {
            if let Some(event) = self.registry.add(id) {
                info!(camera = %id, "Camera added");
                effects.dispatch.extend(self.presence_listeners.publish(&event));
            }
        });
    }

    fn presence_removed(self: &Arc<Self>, id: &CameraId) {
        self.transact(id, |slot, effects| {
            let Some(event) = self.registry.remove(id) else {
                return;
            };
            info!(camera = %id, "Camera removed");
            effects.dispatch.extend(self.presence_listeners.publish(&event));

            if let Some(session) = slot.session.as_mut() {
                let step = session.on_device_removed();
                self.absorb(id, step, effects);
            }
        });
    }
}

/// Receives the events of one platform open attempt
///
/// Bound to the camera and the attempt it was issued for. Events sent after
/// the manager is gone are dropped; a device handle delivered then is closed.
#[derive(Clone)]
pub struct DeviceEventSink {
    inner: Weak<Inner>,
    camera_id: CameraId,
    attempt: u64,
}

impl DeviceEventSink {
    pub fn camera_id(&self) -> &CameraId {
        &self.camera_id
    }

    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    pub fn send(&self, event: DeviceEvent) {
        match self.inner.upgrade() {
            Some(inner) => inner.device_event(&self.camera_id, self.attempt, event),
            None => {
                debug!(camera = %self.camera_id, event = event.name(), "Manager gone, dropping device event");
                if let DeviceEvent::Open(OpenOutcome::Success(handle)) = event {
                    handle.close();
                }
            }
        }
    }

    pub fn opened(&self, handle: Arc<dyn DeviceHandle>) {
        self.send(DeviceEvent::Open(OpenOutcome::Success(handle)));
    }

    pub fn open_failed(&self, code: PlatformErrorCode) {
        self.send(DeviceEvent::Open(OpenOutcome::Failure(code)));
    }

    pub fn disconnected(&self) {
        self.send(DeviceEvent::Disconnected);
    }

    pub fn error(&self, code: PlatformErrorCode) {
        self.send(DeviceEvent::Error(code));
    }

    pub fn closed(&self) {
        self.send(DeviceEvent::Closed);
    }
}

impl std::fmt::Debug for DeviceEventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceEventSink")
            .field("camera_id", &self.camera_id)
            .field("attempt", &self.attempt)
            .finish()
    }
}

/// Receives platform hot-plug notifications
#[derive(Clone)]
pub struct PresenceSink {
    inner: Weak<Inner>,
}

impl PresenceSink {
    pub fn on_added(&self, id: &CameraId) {
        if let Some(inner) = self.inner.upgrade() {
            inner.presence_added(id);
        }
    }

    pub fn on_removed(&self, id: &CameraId) {
        if let Some(inner) = self.inner.upgrade() {
            inner.presence_removed(id);
        }
    }
}

impl std::fmt::Debug for PresenceSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresenceSink")
            .field("live", &(self.inner.strong_count() > 0))
            .finish()
    }
}

/// Camera lifecycle manager
///
/// Tracks which cameras are present, runs one device session per camera and
/// notifies observers of presence and state changes.
/// Thread-safe and can be shared across threads.
#[derive(Clone)]
pub struct CameraLifecycleManager {
    inner: Arc<Inner>,
}

impl CameraLifecycleManager {
    pub fn builder(platform: Arc<dyn CameraPlatform>) -> CameraLifecycleManagerBuilder {
        CameraLifecycleManagerBuilder::new(platform)
    }

    /// Create a manager with the retry policy and callback executor from `config`
    pub fn from_config(platform: Arc<dyn CameraPlatform>, config: &Config) -> std::io::Result<Self> {
        let executor = config
            .callback_executor
            .build(constants::CALLBACK_THREAD_NAME)?;
        let scheduler: Arc<dyn Scheduler> = match TokioScheduler::current() {
            Some(scheduler) => Arc::new(scheduler),
            None => Arc::new(ThreadScheduler),
        };
        Ok(Self::builder(platform)
            .retry_policy(config.retry.policy())
            .scheduler(scheduler)
            .camera_executor(executor)
            .build())
    }

    /// Ask for a camera to be opened
    ///
    /// Progress is reported to state observers. Fails if the camera is not
    /// present or its session already has an open or a teardown in flight.
    /// A session waiting in `PendingOpen` is opened right away.
    pub fn request_open(&self, id: &CameraId) -> LifecycleResult<SessionHandle> {
        if self.inner.shut_down.load(Ordering::Acquire) {
            return Err(LifecycleError::ShutDown);
        }

        let inner = &self.inner;
        // Slots are only created for cameras that have been present
        if !inner.registry.contains(id) && inner.existing_slot(id).is_none() {
            return Err(LifecycleError::CameraNotPresent(id.clone()));
        }

        inner.transact(id, |slot, effects| {
            if !inner.registry.contains(id) {
                return Err(LifecycleError::CameraNotPresent(id.clone()));
            }

            let session = slot
                .session
                .get_or_insert_with(|| DeviceSession::new(id.clone()));
            let step = session.request_open()?;
            let handle = SessionHandle {
                camera_id: id.clone(),
                generation: session.generation(),
            };
            info!(camera = %id, generation = handle.generation, "Open requested");
            inner.absorb(id, step, effects);
            Ok(handle)
        })
    }

    /// Ask for the session identified by `handle` to be closed
    ///
    /// Closing an already closing or closed session succeeds without effect.
    pub fn request_close(&self, handle: &SessionHandle) -> LifecycleResult<()> {
        let id = &handle.camera_id;
        if self.inner.existing_slot(id).is_none() {
            return Err(LifecycleError::UnknownSession(id.clone()));
        }

        let inner = &self.inner;
        inner.transact(id, |slot, effects| {
            let session = slot
                .session
                .as_mut()
                .ok_or_else(|| LifecycleError::UnknownSession(id.clone()))?;
            if session.generation() != handle.generation {
                return Err(LifecycleError::StaleSession(id.clone()));
            }

            info!(camera = %id, generation = handle.generation, "Close requested");
            let step = session.request_close();
            inner.absorb(id, step, effects);
            Ok(())
        })
    }

    /// Cameras currently present
    pub fn query_presence(&self) -> PresenceSet {
        self.inner.registry.snapshot()
    }

    pub fn is_present(&self, id: &CameraId) -> bool {
        self.inner.registry.contains(id)
    }

    /// Current `(state, error)` of a camera; `Closed` if it was never opened
    pub fn camera_state(&self, id: &CameraId) -> CameraState {
        self.inner
            .existing_slot(id)
            .and_then(|slot| {
                slot.lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .session
                    .as_ref()
                    .map(DeviceSession::camera_state)
            })
            .unwrap_or_else(CameraState::closed)
    }

    /// Observe state changes of one camera
    ///
    /// `callback` runs on `executor`, one notification at a time, in the
    /// order the changes happened. The current state is not replayed; use
    /// [`Self::camera_state`] for it.
    pub fn subscribe_state<F>(
        &self,
        id: &CameraId,
        executor: Arc<dyn Executor>,
        callback: F,
    ) -> ListenerHandle
    where
        F: Fn(&StateChange) + Send + Sync + 'static,
    {
        self.inner
            .state_listeners
            .subscribe(Some(id.clone()), executor, callback)
    }

    /// Observe cameras being added and removed
    pub fn subscribe_presence<F>(&self, executor: Arc<dyn Executor>, callback: F) -> ListenerHandle
    where
        F: Fn(&PresenceEvent) + Send + Sync + 'static,
    {
        self.inner
            .presence_listeners
            .subscribe(None, executor, callback)
    }

    /// Remove an observer; returns false if it was not registered
    pub fn unsubscribe(&self, handle: ListenerHandle) -> bool {
        match handle.kind() {
            ListenerKind::Presence => self.inner.presence_listeners.unsubscribe(handle),
            ListenerKind::State => self.inner.state_listeners.unsubscribe(handle),
        }
    }

    /// Stop tracking presence and close every session
    ///
    /// Observers keep receiving the resulting transitions. Further open
    /// requests fail with [`LifecycleError::ShutDown`].
    pub fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("Shutting down camera lifecycle manager");

        let registration = self
            .inner
            .presence_registration
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(registration) = registration {
            self.inner.platform.unregister_presence_listener(registration);
        }

        let ids: Vec<CameraId> = self
            .inner
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        let inner = &self.inner;
        for id in ids {
            inner.transact(&id, |slot, effects| {
                if let Some(session) = slot.session.as_mut() {
                    let step = session.request_close();
                    inner.absorb(&id, step, effects);
                }
            });
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::Acquire)
    }
}

/// Builder for [`CameraLifecycleManager`]
///
/// Defaults: clients retry manually, platform callbacks run inline and
/// delayed retries use a sleeping thread.
pub struct CameraLifecycleManagerBuilder {
    platform: Arc<dyn CameraPlatform>,
    retry_policy: Arc<dyn RetryPolicy>,
    scheduler: Arc<dyn Scheduler>,
    camera_executor: Arc<dyn Executor>,
}

impl CameraLifecycleManagerBuilder {
    fn new(platform: Arc<dyn CameraPlatform>) -> Self {
        Self {
            platform,
            retry_policy: Arc::new(ManualRetry),
            scheduler: Arc::new(ThreadScheduler),
            camera_executor: Arc::new(InlineExecutor),
        }
    }

    pub fn retry_policy(mut self, policy: Arc<dyn RetryPolicy>) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Executor the platform delivers device and presence callbacks on
    pub fn camera_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.camera_executor = executor;
        self
    }

    /// Create the manager, register for hot-plug notifications and seed the
    /// presence set from the platform's current cameras
    pub fn build(self) -> CameraLifecycleManager {
        info!(policy = ?self.retry_policy, "Creating camera lifecycle manager");

        let inner = Arc::new(Inner {
            platform: self.platform,
            registry: CameraRegistry::new(),
            slots: Mutex::new(HashMap::new()),
            presence_listeners: ListenerFanout::new(ListenerKind::Presence),
            state_listeners: ListenerFanout::new(ListenerKind::State),
            retry_policy: self.retry_policy,
            scheduler: self.scheduler,
            camera_executor: self.camera_executor,
            presence_registration: Mutex::new(None),
            shut_down: AtomicBool::new(false),
        });

        // Register first so no hot-plug event between enumeration and registration is lost
        let sink = PresenceSink {
            inner: Arc::downgrade(&inner),
        };
        let registration = inner
            .platform
            .register_presence_listener(Arc::clone(&inner.camera_executor), sink);
        *inner
            .presence_registration
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(registration);

        for id in inner.platform.camera_ids() {
            inner.presence_added(&id);
        }
        info!(cameras = inner.registry.len(), "Camera presence seeded");

        CameraLifecycleManager { inner }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::simulated::SimulatedPlatform;
    use crate::scheduler::ManualScheduler;
    use crate::state::{ErrorCode, FixedDelayRetry, StateType};
    use std::time::Duration;

    fn recorded(
        manager: &CameraLifecycleManager,
        id: &str,
    ) -> Arc<Mutex<Vec<CameraState>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        manager.subscribe_state(&CameraId::from(id), Arc::new(InlineExecutor), move |change| {
            sink.lock().unwrap().push(change.state);
        });
        seen
    }

    fn states(seen: &Arc<Mutex<Vec<CameraState>>>) -> Vec<(StateType, Option<ErrorCode>)> {
        seen.lock()
            .unwrap()
            .iter()
            .map(|s| (s.state, s.error))
            .collect()
    }

    #[test]
    fn test_open_and_close() {
        let platform = Arc::new(SimulatedPlatform::with_cameras(["0"]));
        let manager = CameraLifecycleManager::builder(platform.clone()).build();
        let seen = recorded(&manager, "0");

        let handle = manager.request_open(&CameraId::from("0")).unwrap();
        assert_eq!(manager.camera_state(&CameraId::from("0")).state, StateType::Open);
        assert!(platform.is_device_open(&CameraId::from("0")));

        manager.request_close(&handle).unwrap();
        assert_eq!(
            states(&seen),
            vec![
                (StateType::PendingOpen, None),
                (StateType::Opening, None),
                (StateType::Open, None),
                (StateType::Closing, None),
                (StateType::Closed, None),
            ]
        );
        assert!(!platform.is_device_open(&CameraId::from("0")));
    }

    #[test]
    fn test_open_absent_camera_is_rejected() {
        let platform = Arc::new(SimulatedPlatform::new());
        let manager = CameraLifecycleManager::builder(platform.clone()).build();

        assert_eq!(
            manager.request_open(&CameraId::from("9")),
            Err(LifecycleError::CameraNotPresent(CameraId::from("9")))
        );
        assert_eq!(platform.open_call_count(&CameraId::from("9")), 0);
    }

    #[test]
    fn test_open_absent_cameras_leaves_no_slots() {
        let platform = Arc::new(SimulatedPlatform::with_cameras(["0"]));
        let manager = CameraLifecycleManager::builder(platform).build();

        for i in 0..100 {
            let id = CameraId::from(format!("missing-{}", i));
            assert!(manager.request_open(&id).is_err());
        }
        // Only the camera seeded at startup has a slot
        let slots = manager.inner.slots.lock().unwrap();
        assert_eq!(slots.len(), 1);
        assert!(slots.contains_key(&CameraId::from("0")));
    }

    #[test]
    fn test_zero_delay_retries_do_not_grow_the_stack() {
        let platform = Arc::new(SimulatedPlatform::with_cameras(["1"]));
        let manager = CameraLifecycleManager::builder(platform.clone())
            .retry_policy(Arc::new(FixedDelayRetry {
                delay: Duration::ZERO,
                max_attempts: None,
            }))
            .build();
        let id = CameraId::from("1");

        const FAILURES: usize = 10_000;
        for _ in 0..FAILURES {
            platform.fail_next_open_with(&id, PlatformErrorCode::CAMERA_IN_USE);
        }
        manager.request_open(&id).unwrap();

        assert_eq!(manager.camera_state(&id), CameraState::new(StateType::Open, None));
        assert_eq!(platform.open_call_count(&id), FAILURES + 1);
    }

    #[test]
    fn test_close_with_stale_handle() {
        let platform = Arc::new(SimulatedPlatform::with_cameras(["0"]));
        let manager = CameraLifecycleManager::builder(platform).build();
        let id = CameraId::from("0");

        let first = manager.request_open(&id).unwrap();
        manager.request_close(&first).unwrap();
        let second = manager.request_open(&id).unwrap();

        assert_eq!(
            manager.request_close(&first),
            Err(LifecycleError::StaleSession(id.clone()))
        );
        assert_eq!(manager.camera_state(&id).state, StateType::Open);
        manager.request_close(&second).unwrap();
        // Idempotent
        manager.request_close(&second).unwrap();
    }

    #[test]
    fn test_close_unknown_session() {
        let platform = Arc::new(SimulatedPlatform::with_cameras(["0"]));
        let manager = CameraLifecycleManager::builder(platform).build();
        let handle = SessionHandle {
            camera_id: CameraId::from("0"),
            generation: 1,
        };
        assert_eq!(
            manager.request_close(&handle),
            Err(LifecycleError::UnknownSession(CameraId::from("0")))
        );
    }

    #[test]
    fn test_scheduled_retry_reopens() {
        let platform = Arc::new(SimulatedPlatform::with_cameras(["1"]));
        let scheduler = Arc::new(ManualScheduler::new());
        let manager = CameraLifecycleManager::builder(platform.clone())
            .retry_policy(Arc::new(FixedDelayRetry {
                delay: Duration::from_millis(100),
                max_attempts: Some(3),
            }))
            .scheduler(scheduler.clone())
            .build();
        let id = CameraId::from("1");

        platform.fail_next_open_with(&id, PlatformErrorCode::CAMERA_IN_USE);
        manager.request_open(&id).unwrap();
        assert_eq!(
            manager.camera_state(&id),
            CameraState::new(StateType::PendingOpen, Some(ErrorCode::CameraInUse))
        );
        assert_eq!(scheduler.pending(), 1);

        scheduler.run_pending();
        assert_eq!(manager.camera_state(&id), CameraState::new(StateType::Open, None));
        assert_eq!(platform.open_call_count(&id), 2);
    }

    #[test]
    fn test_synchronous_platform_rejection_is_open_error() {
        let platform = Arc::new(SimulatedPlatform::with_cameras(["2"]));
        let manager = CameraLifecycleManager::builder(platform.clone()).build();
        let id = CameraId::from("2");

        platform.reject_next_open_with(&id, PlatformErrorCode::CAMERA_DISABLED);
        manager.request_open(&id).unwrap();
        assert_eq!(manager.camera_state(&id), CameraState::closed());
        assert_eq!(manager.camera_state(&id).error, None);
    }

    #[test]
    fn test_shutdown_closes_sessions_and_unregisters() {
        let platform = Arc::new(SimulatedPlatform::with_cameras(["0", "1"]));
        let manager = CameraLifecycleManager::builder(platform.clone()).build();
        assert_eq!(platform.presence_listener_count(), 1);

        manager.request_open(&CameraId::from("0")).unwrap();
        manager.request_open(&CameraId::from("1")).unwrap();
        manager.shutdown();

        assert_eq!(platform.presence_listener_count(), 0);
        assert!(!platform.is_device_open(&CameraId::from("0")));
        assert!(!platform.is_device_open(&CameraId::from("1")));
        assert_eq!(
            manager.request_open(&CameraId::from("0")),
            Err(LifecycleError::ShutDown)
        );
        assert!(manager.is_shut_down());
    }

    #[test]
    fn test_device_delivered_after_manager_dropped_is_closed() {
        let platform = Arc::new(SimulatedPlatform::with_cameras(["0"]));
        platform.hold_opens(true);
        let manager = CameraLifecycleManager::builder(platform.clone()).build();
        let id = CameraId::from("0");

        manager.request_open(&id).unwrap();
        drop(manager);

        assert!(platform.complete_pending_open(&id));
        assert!(!platform.is_device_open(&id));
    }
}
