// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use std::time::Duration;

/// Retry timing defaults
pub mod retry {
    use super::Duration;

    /// Delay between automatic open attempts for the fixed policy
    pub const FIXED_DELAY: Duration = Duration::from_millis(500);

    /// First delay of the exponential policy
    pub const BACKOFF_INITIAL_DELAY: Duration = Duration::from_millis(100);

    /// Upper bound of the exponential policy's delay
    pub const BACKOFF_MAX_DELAY: Duration = Duration::from_secs(5);

    /// Automatic retries before giving up, for bounded policies
    pub const MAX_ATTEMPTS: u32 = 5;
}

/// Default `tracing` filter when neither `RUST_LOG` nor the config sets one
pub const DEFAULT_LOG_FILTER: &str = "warn";

/// Directory name under the user configuration directory
pub const CONFIG_DIR_NAME: &str = "camera-lifecycle";

/// Configuration file name
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Name of the thread that runs platform callbacks
pub const CALLBACK_THREAD_NAME: &str = "camera-callbacks";

/// Application information
pub mod app_info {
    /// Get the application version from build-time environment
    pub fn version() -> &'static str {
        env!("GIT_VERSION")
    }
}
