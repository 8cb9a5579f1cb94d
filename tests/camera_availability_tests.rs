// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for cameras being added and removed at runtime

use camera_lifecycle::backends::camera::{
    CameraId, CameraLifecycleManager, DeviceErrorScenario, PlatformErrorCode, PresenceChange,
    PresenceEvent, SimulatedPlatform,
};
use camera_lifecycle::executor::{Executor, InlineExecutor};
use camera_lifecycle::state::{CameraState, StateType};
use std::sync::{Arc, Mutex};

const BACK: &str = "0";
const FRONT: &str = "1";

fn inline() -> Arc<dyn Executor> {
    Arc::new(InlineExecutor)
}

fn setup(ids: &[&str]) -> (Arc<SimulatedPlatform>, CameraLifecycleManager) {
    let platform = Arc::new(SimulatedPlatform::with_cameras(ids.iter().copied()));
    let manager = CameraLifecycleManager::builder(platform.clone()).build();
    (platform, manager)
}

fn presence_log(manager: &CameraLifecycleManager) -> Arc<Mutex<Vec<PresenceEvent>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    manager.subscribe_presence(inline(), move |event| sink.lock().unwrap().push(event.clone()));
    log
}

fn state_log(manager: &CameraLifecycleManager, id: &str) -> Arc<Mutex<Vec<CameraState>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    manager.subscribe_state(&CameraId::from(id), inline(), move |change| {
        sink.lock().unwrap().push(change.state)
    });
    log
}

#[test]
fn test_presence_listener_registered_before_use() {
    let (platform, manager) = setup(&[BACK]);

    assert_eq!(platform.presence_listener_count(), 1);
    assert!(manager.is_present(&CameraId::from(BACK)));
    assert!(!manager.is_present(&CameraId::from(FRONT)));
}

#[test]
fn test_added_camera_is_detected_and_usable() {
    let (platform, manager) = setup(&[BACK]);
    let presence = presence_log(&manager);
    let front = CameraId::from(FRONT);

    assert_eq!(
        manager.request_open(&front),
        Err(camera_lifecycle::LifecycleError::CameraNotPresent(front.clone()))
    );

    platform.add_camera(FRONT);

    assert_eq!(*presence.lock().unwrap(), vec![PresenceEvent::added(front.clone())]);
    assert!(manager.is_present(&front));

    manager.request_open(&front).unwrap();
    assert_eq!(manager.camera_state(&front), CameraState::new(StateType::Open, None));
}

#[test]
fn test_closed_camera_removed_becomes_unavailable() {
    let (platform, manager) = setup(&[BACK, FRONT]);
    let presence = presence_log(&manager);
    let states = state_log(&manager, FRONT);
    let front = CameraId::from(FRONT);

    platform.remove_camera(&front);

    assert_eq!(*presence.lock().unwrap(), vec![PresenceEvent::removed(front.clone())]);
    assert!(!manager.is_present(&front));
    assert!(!manager.query_presence().contains(&front));
    // Never opened, so no session transitions
    assert!(states.lock().unwrap().is_empty());
}

fn verify_open_device_unplugged(scenario: Option<DeviceErrorScenario>) {
    let (platform, manager) = setup(&[BACK]);
    let back = CameraId::from(BACK);
    manager.request_open(&back).unwrap();
    assert!(platform.is_device_open(&back));

    let presence = presence_log(&manager);
    let states = state_log(&manager, BACK);

    // Keep the device around until its close is confirmed, so its callbacks
    // race the removal
    platform.hold_closes(true);
    platform.remove_camera(&back);
    assert_eq!(
        *states.lock().unwrap(),
        vec![CameraState::new(StateType::Closing, None)]
    );

    if let Some(scenario) = scenario {
        assert_eq!(platform.notify_device_error(&back, scenario), 1);
    }
    assert_eq!(platform.complete_pending_closes(&back), 1);

    assert_eq!(*presence.lock().unwrap(), vec![PresenceEvent::removed(back.clone())]);
    assert_eq!(
        *states.lock().unwrap(),
        vec![
            CameraState::new(StateType::Closing, None),
            CameraState::new(StateType::Closed, None),
        ]
    );
    assert!(!platform.is_device_open(&back));
    assert!(!manager.is_present(&back));
}

#[test]
fn test_open_device_closes_when_unplugged_without_device_callback() {
    verify_open_device_unplugged(None);
}

#[test]
fn test_open_device_closes_when_unplugged_and_notified_on_error() {
    verify_open_device_unplugged(Some(DeviceErrorScenario::OnError(
        PlatformErrorCode::CAMERA_DEVICE,
    )));
}

#[test]
fn test_open_device_closes_when_unplugged_and_notified_on_disconnected() {
    verify_open_device_unplugged(Some(DeviceErrorScenario::OnDisconnected));
}

#[test]
fn test_double_remove_notifies_once() {
    let (platform, manager) = setup(&[BACK]);
    let presence = presence_log(&manager);
    let back = CameraId::from(BACK);

    platform.remove_camera(&back);
    platform.repeat_removal(&back);

    let events = presence.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].change, PresenceChange::Removed);
}

#[test]
fn test_pending_open_cancelled_by_removal() {
    let (platform, manager) = setup(&[BACK]);
    let back = CameraId::from(BACK);
    platform.fail_next_open_with(&back, PlatformErrorCode::CAMERA_IN_USE);
    manager.request_open(&back).unwrap();
    assert_eq!(manager.camera_state(&back).state, StateType::PendingOpen);

    let states = state_log(&manager, BACK);
    platform.remove_camera(&back);

    assert_eq!(
        *states.lock().unwrap(),
        vec![
            CameraState::new(StateType::Closing, None),
            CameraState::new(StateType::Closed, None),
        ]
    );
}

#[test]
fn test_removal_during_opening_releases_late_device() {
    let (platform, manager) = setup(&[BACK]);
    let back = CameraId::from(BACK);
    platform.hold_opens(true);
    manager.request_open(&back).unwrap();

    platform.remove_camera(&back);
    assert_eq!(manager.camera_state(&back).state, StateType::Closing);

    let states = state_log(&manager, BACK);
    platform.complete_pending_open(&back);

    assert_eq!(
        *states.lock().unwrap(),
        vec![CameraState::new(StateType::Closed, None)]
    );
    assert!(!platform.is_device_open(&back));
}

#[test]
fn test_readded_camera_can_be_opened_again() {
    let (platform, manager) = setup(&[BACK]);
    let back = CameraId::from(BACK);
    manager.request_open(&back).unwrap();

    platform.remove_camera(&back);
    assert_eq!(manager.camera_state(&back), CameraState::closed());
    assert!(manager.request_open(&back).is_err());

    platform.add_camera(BACK);
    let session = manager.request_open(&back).unwrap();
    assert_eq!(session.generation(), 2);
    assert_eq!(manager.camera_state(&back).state, StateType::Open);
}

#[test]
fn test_presence_unsubscribe_stops_notifications() {
    let (platform, manager) = setup(&[]);
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    let handle = manager.subscribe_presence(inline(), move |event| {
        sink.lock().unwrap().push(event.camera_id.clone())
    });

    platform.add_camera(BACK);
    assert!(manager.unsubscribe(handle));
    platform.add_camera(FRONT);

    assert_eq!(*log.lock().unwrap(), vec![CameraId::from(BACK)]);
    assert!(!manager.unsubscribe(handle));
}
