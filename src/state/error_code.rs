// SPDX-License-Identifier: GPL-3.0-only

//! Camera error codes and their classification
//!
//! This is the only place that decides whether a platform failure is worth
//! retrying. Everything downstream works with [`ErrorCode`] and its
//! [`RecoverabilityClass`], never with raw platform codes.

use crate::backends::camera::types::PlatformErrorCode;
use serde::{Deserialize, Serialize};

/// Whether an error leaves the open intent intact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoverabilityClass {
    /// Transient contention, the open can be retried
    Recoverable,
    /// The camera cannot be used, the session drains to closed
    Fatal,
}

impl std::fmt::Display for RecoverabilityClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecoverabilityClass::Recoverable => write!(f, "recoverable"),
            RecoverabilityClass::Fatal => write!(f, "fatal"),
        }
    }
}

/// Classified camera error surfaced to observers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Maximum number of simultaneously open cameras reached
    MaxCamerasInUse,
    /// Camera is in use by another client
    CameraInUse,
    /// Device reported a generic error that may go away on retry
    OtherRecoverable,
    /// Camera disabled by device policy
    CameraDisabled,
    /// Camera service failed
    CameraFatal,
}

impl ErrorCode {
    pub const ALL: [ErrorCode; 5] = [
        ErrorCode::MaxCamerasInUse,
        ErrorCode::CameraInUse,
        ErrorCode::OtherRecoverable,
        ErrorCode::CameraDisabled,
        ErrorCode::CameraFatal,
    ];

    pub fn class(&self) -> RecoverabilityClass {
        match self {
            ErrorCode::MaxCamerasInUse | ErrorCode::CameraInUse | ErrorCode::OtherRecoverable => {
                RecoverabilityClass::Recoverable
            }
            ErrorCode::CameraDisabled | ErrorCode::CameraFatal => RecoverabilityClass::Fatal,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        self.class() == RecoverabilityClass::Recoverable
    }

    /// Stable numeric code, matching the CameraX `CameraState.ERROR_*` values
    pub fn code(&self) -> i32 {
        match self {
            ErrorCode::MaxCamerasInUse => 1,
            ErrorCode::CameraInUse => 2,
            ErrorCode::OtherRecoverable => 3,
            ErrorCode::CameraDisabled => 5,
            ErrorCode::CameraFatal => 6,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ErrorCode::MaxCamerasInUse => "MAX_CAMERAS_IN_USE",
            ErrorCode::CameraInUse => "CAMERA_IN_USE",
            ErrorCode::OtherRecoverable => "OTHER_RECOVERABLE_ERROR",
            ErrorCode::CameraDisabled => "CAMERA_DISABLED",
            ErrorCode::CameraFatal => "CAMERA_FATAL_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Map a raw platform failure to an [`ErrorCode`]
///
/// Unknown raw codes are treated as a service failure, so a misbehaving
/// platform can never keep a session retrying forever.
pub fn classify(raw: PlatformErrorCode) -> ErrorCode {
    match raw {
        PlatformErrorCode::CAMERA_IN_USE => ErrorCode::CameraInUse,
        PlatformErrorCode::MAX_CAMERAS_IN_USE => ErrorCode::MaxCamerasInUse,
        PlatformErrorCode::CAMERA_DEVICE => ErrorCode::OtherRecoverable,
        PlatformErrorCode::CAMERA_DISABLED => ErrorCode::CameraDisabled,
        PlatformErrorCode::CAMERA_SERVICE => ErrorCode::CameraFatal,
        _ => ErrorCode::CameraFatal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_contention_is_recoverable() {
        assert_eq!(
            classify(PlatformErrorCode::CAMERA_IN_USE),
            ErrorCode::CameraInUse
        );
        assert_eq!(
            classify(PlatformErrorCode::MAX_CAMERAS_IN_USE),
            ErrorCode::MaxCamerasInUse
        );
        assert_eq!(
            classify(PlatformErrorCode::CAMERA_DEVICE),
            ErrorCode::OtherRecoverable
        );
        for raw in [
            PlatformErrorCode::CAMERA_IN_USE,
            PlatformErrorCode::MAX_CAMERAS_IN_USE,
            PlatformErrorCode::CAMERA_DEVICE,
        ] {
            assert_eq!(classify(raw).class(), RecoverabilityClass::Recoverable);
        }
    }

    #[test]
    fn test_classify_policy_and_service_are_fatal() {
        assert_eq!(
            classify(PlatformErrorCode::CAMERA_DISABLED),
            ErrorCode::CameraDisabled
        );
        assert_eq!(
            classify(PlatformErrorCode::CAMERA_SERVICE),
            ErrorCode::CameraFatal
        );
        assert!(!classify(PlatformErrorCode::CAMERA_DISABLED).is_recoverable());
        assert!(!classify(PlatformErrorCode::CAMERA_SERVICE).is_recoverable());
    }

    #[test]
    fn test_classify_unknown_codes_are_fatal() {
        for raw in [0, -1, 6, 99, i32::MAX] {
            let code = classify(PlatformErrorCode(raw));
            assert_eq!(code, ErrorCode::CameraFatal, "raw code {}", raw);
        }
    }

    #[test]
    fn test_stable_codes_are_unique() {
        let mut codes: Vec<i32> = ErrorCode::ALL.iter().map(|c| c.code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), ErrorCode::ALL.len());
    }
}
