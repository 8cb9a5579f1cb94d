// SPDX-License-Identifier: GPL-3.0-only

//! Observer registration and ordered delivery
//!
//! Each registration owns a sequential queue bound to the executor it was
//! registered with. [`ListenerFanout::publish`] enqueues the payload for
//! every matching registration; the queues are filled in publish order, so
//! a registration always observes events in the order they were produced.
//!
//! Publishing only enqueues. Delivery starts when the returned [`Dispatch`]
//! is dropped, which the lifecycle manager does after it has left the
//! camera's critical section. Callbacks therefore never run under a manager
//! lock and may call back into the manager.

use crate::backends::camera::types::{CameraId, PresenceEvent};
use crate::executor::{Executor, Job};
use crate::state::StateChange;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error};
use uuid::Uuid;

/// What a registration observes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerKind {
    Presence,
    State,
}

/// Token identifying one registration; pass it back to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerHandle {
    kind: ListenerKind,
    id: Uuid,
}

impl ListenerHandle {
    fn new(kind: ListenerKind) -> Self {
        Self {
            kind,
            id: Uuid::new_v4(),
        }
    }

    pub fn kind(&self) -> ListenerKind {
        self.kind
    }
}

impl std::fmt::Display for ListenerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}:{}", self.kind, self.id)
    }
}

/// Events that concern a single camera
pub trait CameraEvent: Clone + Send + 'static {
    fn camera_id(&self) -> &CameraId;
}

impl CameraEvent for StateChange {
    fn camera_id(&self) -> &CameraId {
        &self.camera_id
    }
}

impl CameraEvent for PresenceEvent {
    fn camera_id(&self) -> &CameraId {
        &self.camera_id
    }
}

type Callback<T> = Box<dyn Fn(&T) + Send + Sync>;

struct Queue<T> {
    items: VecDeque<T>,
    draining: bool,
}

struct Subscriber<T> {
    handle: ListenerHandle,
    /// Only events for this camera are delivered, if set
    scope: Option<CameraId>,
    callback: Callback<T>,
    active: AtomicBool,
    executor: Arc<dyn Executor>,
    queue: Mutex<Queue<T>>,
}

impl<T: CameraEvent> Subscriber<T> {
    fn wants(&self, event: &T) -> bool {
        self.active.load(Ordering::Acquire)
            && self
                .scope
                .as_ref()
                .is_none_or(|scope| scope == event.camera_id())
    }

    /// Queue `event`; returns true if the caller must start a drain
    fn enqueue(&self, event: T) -> bool {
        let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        queue.items.push_back(event);
        !std::mem::replace(&mut queue.draining, true)
    }

    fn drain(&self) {
        loop {
            let event = {
                let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
                match queue.items.pop_front() {
                    Some(event) => event,
                    None => {
                        queue.draining = false;
                        return;
                    }
                }
            };

            if !self.active.load(Ordering::Acquire) {
                continue;
            }

            let delivered =
                std::panic::catch_unwind(AssertUnwindSafe(|| (self.callback)(&event)));
            if delivered.is_err() {
                error!(
                    listener = %self.handle,
                    camera = %event.camera_id(),
                    "Listener callback panicked"
                );
            }
        }
    }
}

/// Deliveries started by a publish; they are submitted when this is dropped
#[must_use = "deliveries start when the Dispatch is dropped"]
#[derive(Default)]
pub struct Dispatch {
    pending: Vec<(Arc<dyn Executor>, Job)>,
}

impl Dispatch {
    pub fn none() -> Self {
        Self::default()
    }

    /// Merge another dispatch, keeping submission order
    pub fn extend(&mut self, mut other: Dispatch) {
        self.pending.append(&mut other.pending);
    }
}

impl Drop for Dispatch {
    fn drop(&mut self) {
        for (executor, job) in self.pending.drain(..) {
            executor.execute(job);
        }
    }
}

impl std::fmt::Debug for Dispatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatch")
            .field("pending", &self.pending.len())
            .finish()
    }
}

/// Set of registrations for one kind of event
pub struct ListenerFanout<T> {
    kind: ListenerKind,
    subscribers: Mutex<Vec<Arc<Subscriber<T>>>>,
}

impl<T: CameraEvent> ListenerFanout<T> {
    pub fn new(kind: ListenerKind) -> Self {
        Self {
            kind,
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Register `callback`, to run on `executor`
    ///
    /// With a `scope`, only events for that camera are delivered.
    pub fn subscribe<F>(
        &self,
        scope: Option<CameraId>,
        executor: Arc<dyn Executor>,
        callback: F,
    ) -> ListenerHandle
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let handle = ListenerHandle::new(self.kind);
        let subscriber = Arc::new(Subscriber {
            handle,
            scope,
            callback: Box::new(callback),
            active: AtomicBool::new(true),
            executor,
            queue: Mutex::new(Queue {
                items: VecDeque::new(),
                draining: false,
            }),
        });
        self.lock().push(subscriber);
        debug!(listener = %handle, "Listener registered");
        handle
    }

    /// Remove a registration
    ///
    /// Events still queued for it are dropped. Returns false if the handle
    /// is unknown or was already removed.
    pub fn unsubscribe(&self, handle: ListenerHandle) -> bool {
        let removed = {
            let mut subscribers = self.lock();
            subscribers
                .iter()
                .position(|s| s.handle == handle)
                .map(|index| subscribers.remove(index))
        };

        match removed {
            Some(subscriber) => {
                subscriber.active.store(false, Ordering::Release);
                debug!(listener = %handle, "Listener removed");
                true
            }
            None => false,
        }
    }

    /// Enqueue `event` for every interested registration
    pub fn publish(&self, event: &T) -> Dispatch {
        let subscribers: Vec<_> = self.lock().iter().map(Arc::clone).collect();
        let mut dispatch = Dispatch::none();

        for subscriber in subscribers {
            if !subscriber.wants(event) {
                continue;
            }
            if subscriber.enqueue(event.clone()) {
                let executor = Arc::clone(&subscriber.executor);
                dispatch
                    .pending
                    .push((executor, Box::new(move || subscriber.drain())));
            }
        }
        dispatch
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Arc<Subscriber<T>>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{InlineExecutor, ThreadExecutor};
    use crate::state::{CameraState, StateType};
    use std::time::Duration;

    fn change(id: &str, state: StateType) -> StateChange {
        StateChange {
            camera_id: CameraId::from(id),
            state: CameraState::new(state, None),
        }
    }

    fn recorder() -> (
        Arc<Mutex<Vec<StateType>>>,
        impl Fn(&StateChange) + Send + Sync + 'static,
    ) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |event: &StateChange| {
            sink.lock().unwrap().push(event.state.state)
        })
    }

    #[test]
    fn test_delivery_waits_for_dispatch_drop() {
        let fanout = ListenerFanout::new(ListenerKind::State);
        let (seen, callback) = recorder();
        fanout.subscribe(None, Arc::new(InlineExecutor), callback);

        let dispatch = fanout.publish(&change("0", StateType::Opening));
        assert!(seen.lock().unwrap().is_empty());
        drop(dispatch);
        assert_eq!(*seen.lock().unwrap(), vec![StateType::Opening]);
    }

    #[test]
    fn test_scope_filters_other_cameras() {
        let fanout = ListenerFanout::new(ListenerKind::State);
        let (seen, callback) = recorder();
        fanout.subscribe(Some(CameraId::from("1")), Arc::new(InlineExecutor), callback);

        drop(fanout.publish(&change("0", StateType::Open)));
        drop(fanout.publish(&change("1", StateType::Closed)));
        assert_eq!(*seen.lock().unwrap(), vec![StateType::Closed]);
    }

    #[test]
    fn test_unsubscribe_drops_queued_events() {
        let fanout = ListenerFanout::new(ListenerKind::State);
        let (seen, callback) = recorder();
        let handle = fanout.subscribe(None, Arc::new(InlineExecutor), callback);

        let dispatch = fanout.publish(&change("0", StateType::Open));
        assert!(fanout.unsubscribe(handle));
        drop(dispatch);

        assert!(seen.lock().unwrap().is_empty());
        assert!(!fanout.unsubscribe(handle));
        assert!(fanout.is_empty());
    }

    #[test]
    fn test_panicking_listener_does_not_affect_others() {
        let fanout = ListenerFanout::new(ListenerKind::State);
        fanout.subscribe(None, Arc::new(InlineExecutor), |_: &StateChange| {
            panic!("listener failure")
        });
        let (seen, callback) = recorder();
        fanout.subscribe(None, Arc::new(InlineExecutor), callback);

        drop(fanout.publish(&change("0", StateType::Open)));
        drop(fanout.publish(&change("0", StateType::Closing)));
        assert_eq!(
            *seen.lock().unwrap(),
            vec![StateType::Open, StateType::Closing]
        );
    }

    #[test]
    fn test_order_preserved_on_thread_executor() {
        let fanout = ListenerFanout::new(ListenerKind::State);
        let (tx, rx) = std::sync::mpsc::channel();
        let tx = Mutex::new(tx);
        fanout.subscribe(
            None,
            Arc::new(ThreadExecutor::new("test-listener").unwrap()),
            move |event: &StateChange| {
                tx.lock().unwrap().send(event.state.state).unwrap();
            },
        );

        let sequence = [
            StateType::PendingOpen,
            StateType::Opening,
            StateType::Open,
            StateType::Closing,
            StateType::Closed,
        ];
        for state in sequence {
            drop(fanout.publish(&change("0", state)));
        }

        let received: Vec<StateType> = (0..sequence.len())
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        assert_eq!(received, sequence.to_vec());
    }

    #[test]
    fn test_reentrant_publish_is_delivered_after_current() {
        let fanout = Arc::new(ListenerFanout::new(ListenerKind::State));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let inner = Arc::clone(&fanout);
        let sink = Arc::clone(&seen);
        fanout.subscribe(None, Arc::new(InlineExecutor), move |event: &StateChange| {
            sink.lock().unwrap().push(event.state.state);
            if event.state.state == StateType::Open {
                drop(inner.publish(&change("0", StateType::Closing)));
                // Not delivered yet, the outer delivery is still running
                assert_eq!(sink.lock().unwrap().last(), Some(&StateType::Open));
            }
        });

        drop(fanout.publish(&change("0", StateType::Open)));
        assert_eq!(
            *seen.lock().unwrap(),
            vec![StateType::Open, StateType::Closing]
        );
    }
}
