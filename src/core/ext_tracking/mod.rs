use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use serde::Deserialize;

use self::{
    face_api::{face_api_emotions, face_api_to_canonical},
    face_mesh::{face_mesh_emotions, face_mesh_to_canonical},
    landmarks::{CoarseEmotions, FaceLandmarks, RawPoint},
};
use super::{error::CameraError, status::StatusBar};

mod face_api;
mod face_mesh;
pub mod landmarks;
pub mod replay;
pub mod udp;

/// One datagram or capture line from a browser-side detector.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DetectorPacket {
    /// Points are fractions of the video frame, which is `width` by
    /// `height` pixels.
    FaceMesh {
        landmarks: Vec<RawPoint>,
        width: f32,
        height: f32,
    },
    FaceApi {
        positions: Vec<RawPoint>,
        #[serde(default)]
        expressions: HashMap<String, f32>,
    },
    NoFace,
    CameraError {
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub enum RawDetection {
    FaceMesh {
        landmarks: Vec<RawPoint>,
        width: f32,
        height: f32,
    },
    FaceApi {
        positions: Vec<RawPoint>,
        expressions: HashMap<String, f32>,
    },
}

impl DetectorPacket {
    /// `Ok(None)` means the detector ran and found no face.
    pub fn into_detection(self) -> Result<Option<RawDetection>, CameraError> {
        match self {
            DetectorPacket::FaceMesh {
                landmarks,
                width,
                height,
            } => Ok(Some(RawDetection::FaceMesh {
                landmarks,
                width,
                height,
            })),
            DetectorPacket::FaceApi {
                positions,
                expressions,
            } => Ok(Some(RawDetection::FaceApi {
                positions,
                expressions,
            })),
            DetectorPacket::NoFace => Ok(None),
            DetectorPacket::CameraError { reason } => Err(CameraError::from_reason(&reason)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NormalizedFace {
    pub landmarks: FaceLandmarks,
    pub emotions: Option<CoarseEmotions>,
}

/// Adapts any detector's output to the canonical face record.
/// Returns `None` when the result cannot fill every landmark group.
pub fn normalize(raw: &RawDetection) -> Option<NormalizedFace> {
    let face = match raw {
        RawDetection::FaceMesh {
            landmarks,
            width,
            height,
        } => {
            let landmarks = face_mesh_to_canonical(landmarks, *width, *height)?;
            NormalizedFace {
                emotions: Some(face_mesh_emotions(&landmarks)),
                landmarks,
            }
        }
        RawDetection::FaceApi {
            positions,
            expressions,
        } => NormalizedFace {
            landmarks: face_api_to_canonical(positions)?,
            emotions: face_api_emotions(expressions),
        },
    };
    if !face.landmarks.is_finite() {
        log::debug!("Face has non-finite points, channels using them will read 0");
    }
    Some(face)
}

/// A detector result stamped with the session it was requested in.
#[derive(Debug, Clone)]
pub struct DetectionEvent {
    pub generation: u64,
    pub detection: Option<RawDetection>,
}

/// Shared between the pipeline and source threads. Every start or stop
/// bumps the generation, so results from an earlier session are recognizable.
#[derive(Debug, Clone, Default)]
pub struct TrackingGate {
    active: Arc<AtomicBool>,
    generation: Arc<AtomicU64>,
}

impl TrackingGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new session and returns its generation.
    pub fn open(&self) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.active.store(true, Ordering::Release);
        generation
    }

    pub fn close(&self) {
        self.active.store(false, Ordering::Release);
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// True while `generation` is the live session.
    pub fn accepts(&self, generation: u64) -> bool {
        self.is_active() && generation == self.generation()
    }
}

/// Camera plus landmark detector, running off the tick thread.
pub trait FrameSource {
    /// Prepares the detector. Called once while initializing.
    fn load(&mut self) -> anyhow::Result<()>;
    /// Attaches the camera and starts producing detections for the gate's
    /// current generation.
    fn acquire(&mut self, gate: &TrackingGate, timeout: Duration) -> Result<(), CameraError>;
    /// Releases the camera. Late results are filtered by the gate.
    fn release(&mut self);
    /// Detections completed since the last call.
    fn drain(&mut self) -> Vec<DetectionEvent>;
    fn report(&self, _status: &mut StatusBar) {}
}
