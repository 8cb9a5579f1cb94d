// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands
//!
//! This module provides command-line functionality for:
//! - Running scripted scenarios against the simulated platform
//! - Showing and writing the configuration

use camera_lifecycle::backends::camera::{
    CameraId, CameraLifecycleManager, DeviceErrorScenario, PlatformErrorCode, SimulatedPlatform,
};
use camera_lifecycle::executor::{Executor, InlineExecutor, ThreadExecutor};
use camera_lifecycle::scheduler::ManualScheduler;
use camera_lifecycle::state::{CameraState, StateType};
use camera_lifecycle::config::RetryConfig;
use camera_lifecycle::{Config, constants};
use chrono::Local;
use clap::ValueEnum;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How long a threaded scenario waits for a state before failing
const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Scripted scenarios
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Scenario {
    /// Open camera 0 and close it again
    Open,
    /// Unplug camera 0 while it is open
    Unplug,
    /// Open camera 1 while another client holds it
    InUse,
    /// Open camera 2, which is disabled by policy
    Disabled,
    /// Close camera 0 while its open call is still in flight
    Cancel,
    /// Camera 0 disconnects, is replugged and opened again
    Reconnect,
}

/// Simulated platform, manager and the means to let pending work run
struct Harness {
    platform: Arc<SimulatedPlatform>,
    manager: CameraLifecycleManager,
    /// Set when running deterministically
    scheduler: Option<Arc<ManualScheduler>>,
    retries_automatically: bool,
    _runtime: Option<tokio::runtime::Runtime>,
}

impl Harness {
    fn new(config: &Config, threaded: bool) -> Result<Self, Box<dyn std::error::Error>> {
        let platform = Arc::new(SimulatedPlatform::with_cameras(["0", "1", "2"]));
        let retries_automatically = config.retry != RetryConfig::Manual;

        let (manager, manual, runtime) = if threaded {
            // Callbacks run on the configured executor, retries on the runtime's timer
            let runtime = tokio::runtime::Runtime::new()?;
            let manager = {
                let _context = runtime.enter();
                CameraLifecycleManager::from_config(platform.clone(), config)?
            };
            (manager, None, Some(runtime))
        } else {
            let deterministic = Arc::new(ManualScheduler::new());
            let manager = CameraLifecycleManager::builder(platform.clone())
                .retry_policy(config.retry.policy())
                .scheduler(deterministic.clone())
                .camera_executor(Arc::new(InlineExecutor))
                .build();
            (manager, Some(deterministic), None)
        };

        let observer: Arc<dyn Executor> = if threaded {
            Arc::new(ThreadExecutor::new("scenario-observer")?)
        } else {
            Arc::new(InlineExecutor)
        };

        manager.subscribe_presence(Arc::clone(&observer), |event| {
            log_line(&format!("camera {} {}", event.camera_id, event.change));
        });
        for id in ["0", "1", "2"] {
            manager.subscribe_state(&CameraId::from(id), Arc::clone(&observer), |change| {
                log_line(&format!("camera {} -> {}", change.camera_id, change.state));
            });
        }

        Ok(Self {
            platform,
            manager,
            scheduler: manual,
            retries_automatically,
            _runtime: runtime,
        })
    }

    /// Wait until `id` reaches `state`
    fn wait_for(
        &self,
        id: &CameraId,
        state: StateType,
    ) -> Result<CameraState, Box<dyn std::error::Error>> {
        let deadline = Instant::now() + SETTLE_TIMEOUT;
        loop {
            if let Some(scheduler) = &self.scheduler {
                scheduler.run_pending();
            }
            let current = self.manager.camera_state(id);
            if current.state == state {
                return Ok(current);
            }
            if self.scheduler.as_ref().is_some_and(|s| s.pending() == 0) {
                return Err(format!("camera {} stuck in {}, expected {}", id, current, state).into());
            }
            if Instant::now() >= deadline {
                return Err(format!("timed out waiting for camera {} to reach {}", id, state).into());
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    /// Wait until no open call is in flight for `id`
    fn wait_settled(&self, id: &CameraId) -> CameraState {
        let deadline = Instant::now() + SETTLE_TIMEOUT;
        loop {
            let current = self.manager.camera_state(id);
            if current.state != StateType::Opening || Instant::now() >= deadline {
                return current;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }
}

fn log_line(message: &str) {
    println!("{}  {}", Local::now().format("%H:%M:%S%.3f"), message);
}

/// Run a scripted scenario and print the event log
pub fn run_scenario(
    scenario: Scenario,
    threaded: bool,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    println!(
        "camera-lifecycle {} scenario {:?} ({})",
        constants::app_info::version(),
        scenario,
        if threaded { "threaded" } else { "deterministic" }
    );
    let harness = Harness::new(config, threaded)?;
    log_line(&format!("present: {:?}", harness.manager.query_presence()));

    match scenario {
        Scenario::Open => open_and_close(&harness, &CameraId::from("0"))?,
        Scenario::Unplug => unplug(&harness)?,
        Scenario::InUse => in_use(&harness)?,
        Scenario::Disabled => disabled(&harness)?,
        Scenario::Cancel => cancel(&harness)?,
        Scenario::Reconnect => reconnect(&harness)?,
    }

    harness.manager.shutdown();
    // Let observers on other threads print their last lines
    if threaded {
        std::thread::sleep(Duration::from_millis(50));
    }
    Ok(())
}

fn open_and_close(harness: &Harness, id: &CameraId) -> Result<(), Box<dyn std::error::Error>> {
    let session = harness.manager.request_open(id)?;
    harness.wait_for(id, StateType::Open)?;
    harness.manager.request_close(&session)?;
    harness.wait_for(id, StateType::Closed)?;
    Ok(())
}

fn unplug(harness: &Harness) -> Result<(), Box<dyn std::error::Error>> {
    let id = CameraId::from("0");
    harness.manager.request_open(&id)?;
    harness.wait_for(&id, StateType::Open)?;

    harness.platform.remove_camera(&id);
    harness.wait_for(&id, StateType::Closed)?;
    log_line(&format!("present: {:?}", harness.manager.query_presence()));
    Ok(())
}

fn in_use(harness: &Harness) -> Result<(), Box<dyn std::error::Error>> {
    let id = CameraId::from("1");
    harness
        .platform
        .fail_next_open_with(&id, PlatformErrorCode::CAMERA_IN_USE);
    let mut session = harness.manager.request_open(&id)?;

    if !harness.retries_automatically {
        let state = harness.wait_settled(&id);
        log_line(&format!("camera {} settled in {}, requesting again", id, state));
        session = harness.manager.request_open(&id)?;
    }
    harness.wait_for(&id, StateType::Open)?;
    harness.manager.request_close(&session)?;
    harness.wait_for(&id, StateType::Closed)?;
    Ok(())
}

fn disabled(harness: &Harness) -> Result<(), Box<dyn std::error::Error>> {
    let id = CameraId::from("2");
    harness
        .platform
        .fail_next_open_with(&id, PlatformErrorCode::CAMERA_DISABLED);
    harness.manager.request_open(&id)?;
    harness.wait_for(&id, StateType::Closed)?;
    Ok(())
}

fn cancel(harness: &Harness) -> Result<(), Box<dyn std::error::Error>> {
    let id = CameraId::from("0");
    harness.platform.hold_opens(true);
    let session = harness.manager.request_open(&id)?;
    harness.manager.request_close(&session)?;

    log_line("platform completes the cancelled open");
    harness.platform.complete_pending_open(&id);
    harness.wait_for(&id, StateType::Closed)?;
    harness.platform.hold_opens(false);
    Ok(())
}

fn reconnect(harness: &Harness) -> Result<(), Box<dyn std::error::Error>> {
    let id = CameraId::from("0");
    harness.manager.request_open(&id)?;
    harness.wait_for(&id, StateType::Open)?;

    harness
        .platform
        .notify_device_error(&id, DeviceErrorScenario::OnDisconnected);
    harness.wait_for(&id, StateType::Closed)?;

    harness.platform.remove_camera(&id);
    harness.platform.add_camera(id.clone());
    open_and_close(harness, &id)
}

/// Print the effective configuration, optionally writing it to `path`
pub fn show_config(
    config: &Config,
    path: Option<&Path>,
    write: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(path) => println!("# {}", path.display()),
        None => println!("# no configuration directory"),
    }
    println!("{}", serde_json::to_string_pretty(config)?);

    if write {
        let path = path.ok_or("no configuration path available")?;
        config.save(path)?;
        println!("Configuration written to {}", path.display());
    }
    Ok(())
}
