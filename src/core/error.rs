use std::time::Duration;

use thiserror::Error;

use super::session::TrackingState;

/// Why a camera stream could not be attached.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CameraError {
    #[error("camera permission denied")]
    PermissionDenied,

    #[error("no camera found")]
    NotFound,

    #[error("camera is already in use by another application")]
    InUse,

    #[error("camera does not support the requested constraints")]
    Overconstrained,

    #[error("camera access requires a secure context")]
    Insecure,

    #[error("camera API not available")]
    Unavailable,

    #[error("camera did not start within {0:?}")]
    Timeout(Duration),

    #[error("camera error: {0}")]
    Other(String),
}

impl CameraError {
    /// Maps the DOMException name reported by a browser-side detector.
    pub fn from_reason(reason: &str) -> Self {
        match reason {
            "NotAllowedError" | "PermissionDeniedError" => CameraError::PermissionDenied,
            "NotFoundError" | "DevicesNotFoundError" => CameraError::NotFound,
            "NotReadableError" | "TrackStartError" => CameraError::InUse,
            "OverconstrainedError" => CameraError::Overconstrained,
            "SecurityError" => CameraError::Insecure,
            "NotSupportedError" => CameraError::Unavailable,
            other => CameraError::Other(other.to_string()),
        }
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("cannot {action} while {state:?}")]
    InvalidTransition {
        action: &'static str,
        state: TrackingState,
    },

    #[error("failed to load face detector: {0}")]
    DetectorLoad(String),

    #[error(transparent)]
    Camera(#[from] CameraError),
}
