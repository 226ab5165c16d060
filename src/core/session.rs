use std::{sync::Arc, time::Duration};

use colored::{Color, Colorize};
use once_cell::sync::Lazy;
use strum::AsRefStr;

use super::{
    avatar::{
        capability::{resolve, AvatarCapability},
        retarget, AvatarEngine,
    },
    error::PipelineError,
    expression::{
        estimator::{estimate, estimate_head_pose, EstimatorTuning, PoseTuning},
        smoothing::{FrameInterpolator, PoseSmoother, Smoother, SmoothingTuning},
        ExpressionFrame, HeadPose,
    },
    ext_tracking::{normalize, FrameSource, TrackingGate},
    status::StatusBar,
};

static FACE_ON: Lazy<Arc<str>> = Lazy::new(|| format!("{}", "FACE".color(Color::Green)).into());
static FACE_OFF: Lazy<Arc<str>> = Lazy::new(|| format!("{}", "FACE".color(Color::Red)).into());

/// Weight of the newest gap in the detection interval estimate.
const INTERVAL_ALPHA: f32 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr)]
#[strum(serialize_all = "UPPERCASE")]
pub enum TrackingState {
    Idle,
    Initializing,
    Ready,
    Tracking,
    Paused,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub estimator: EstimatorTuning,
    pub pose: PoseTuning,
    pub smoothing: SmoothingTuning,
    pub camera_timeout: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            estimator: EstimatorTuning::default(),
            pose: PoseTuning::default(),
            smoothing: SmoothingTuning::default(),
            camera_timeout: Duration::from_secs(10),
        }
    }
}

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Results from the live session, with or without a face.
    pub detections: usize,
    pub faces: usize,
    /// Results dropped because they belong to another session or arrived
    /// while not tracking.
    pub discarded: usize,
    pub applied: bool,
    pub morph_writes: usize,
}

/// Owns everything that persists across frames and moves it through
/// detection, estimation, smoothing and retargeting once per tick.
pub struct Pipeline<E: AvatarEngine, S: FrameSource> {
    engine: E,
    source: S,
    settings: PipelineSettings,
    state: TrackingState,
    gate: TrackingGate,
    capability: AvatarCapability,
    smoother: Smoother,
    pose_smoother: PoseSmoother,
    interpolator: FrameInterpolator,
    detection_interval: Option<f32>,
    since_detection: f32,
    settled_shown: bool,
    last_face: Option<f32>,
    uptime: f32,
}

impl<E: AvatarEngine, S: FrameSource> Pipeline<E, S> {
    pub fn new(engine: E, source: S, settings: PipelineSettings) -> Self {
        Self {
            engine,
            source,
            smoother: Smoother::new(settings.smoothing.clone()),
            pose_smoother: PoseSmoother::new(settings.smoothing.pose_alpha),
            interpolator: FrameInterpolator::new(settings.smoothing.easing),
            settings,
            state: TrackingState::Idle,
            gate: TrackingGate::new(),
            capability: AvatarCapability::default(),
            detection_interval: None,
            since_detection: 0.,
            settled_shown: false,
            last_face: None,
            uptime: 0.,
        }
    }

    pub fn state(&self) -> TrackingState {
        self.state
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn capability(&self) -> &AvatarCapability {
        &self.capability
    }

    pub fn gate(&self) -> &TrackingGate {
        &self.gate
    }

    /// Last smoothed value of a channel in the current session.
    pub fn smoothed(&self, channel: &str) -> Option<f32> {
        self.smoother.value(channel)
    }

    fn expect(&self, action: &'static str, allowed: &[TrackingState]) -> Result<(), PipelineError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(PipelineError::InvalidTransition {
                action,
                state: self.state,
            })
        }
    }

    fn set_state(&mut self, state: TrackingState) {
        log::info!("Pipeline {:?} -> {:?}", self.state, state);
        self.state = state;
    }

    /// Loads the detector and the avatar. An avatar that fails to load is
    /// replaced by the geometric fallback; a detector that fails to load
    /// sends the pipeline back to idle.
    pub fn initialize(&mut self, avatar: Option<&str>) -> Result<(), PipelineError> {
        self.expect("initialize", &[TrackingState::Idle])?;
        self.set_state(TrackingState::Initializing);

        if let Err(e) = self.source.load() {
            log::error!("Detector failed to load: {:#}", e);
            self.set_state(TrackingState::Idle);
            return Err(PipelineError::DetectorLoad(format!("{:#}", e)));
        }

        self.load_avatar(avatar);
        self.set_state(TrackingState::Ready);
        Ok(())
    }

    fn load_avatar(&mut self, avatar: Option<&str>) {
        let meshes = match avatar.map(|source| (source, self.engine.load_avatar(source))) {
            Some((_, Ok(meshes))) if !meshes.is_empty() => meshes,
            Some((source, Ok(_))) => {
                log::warn!("Avatar {} has no meshes, using fallback", source);
                self.engine.build_fallback_avatar()
            }
            Some((source, Err(e))) => {
                log::warn!("Avatar {} failed to load, using fallback: {:#}", source, e);
                self.engine.build_fallback_avatar()
            }
            None => self.engine.build_fallback_avatar(),
        };

        self.capability = resolve(&meshes);
        self.capability.apply_layout(&mut self.engine);
        retarget::reset(&self.capability, &mut self.engine);
        self.settled_shown = false;
    }

    /// Attaches the camera. Starting again after a stop opens a fresh
    /// session with empty smoothing state. On a camera error the pipeline
    /// stays ready for another attempt.
    pub fn start_tracking(&mut self) -> Result<(), PipelineError> {
        self.expect(
            "start tracking",
            &[TrackingState::Ready, TrackingState::Stopped],
        )?;
        if self.state == TrackingState::Stopped {
            self.clear_motion();
        }

        let generation = self.gate.open();
        log::debug!("Acquiring camera for session {}", generation);
        if let Err(e) = self.source.acquire(&self.gate, self.settings.camera_timeout) {
            log::warn!("Camera unavailable: {}", e);
            self.gate.close();
            self.source.release();
            self.set_state(TrackingState::Ready);
            return Err(e.into());
        }

        self.since_detection = 0.;
        self.detection_interval = None;
        self.set_state(TrackingState::Tracking);
        Ok(())
    }

    /// Keeps the camera attached but stops animating.
    pub fn pause(&mut self) -> Result<(), PipelineError> {
        self.expect("pause", &[TrackingState::Tracking])?;
        self.set_state(TrackingState::Paused);
        Ok(())
    }

    pub fn resume(&mut self) -> Result<(), PipelineError> {
        self.expect("resume", &[TrackingState::Paused])?;
        self.since_detection = 0.;
        self.detection_interval = None;
        self.set_state(TrackingState::Tracking);
        Ok(())
    }

    /// Releases the camera. The avatar holds its last pose and smoothing
    /// state is kept.
    pub fn stop(&mut self) -> Result<(), PipelineError> {
        self.expect("stop", &[TrackingState::Tracking, TrackingState::Paused])?;
        self.gate.close();
        self.source.release();
        self.set_state(TrackingState::Stopped);
        Ok(())
    }

    /// Clears smoothing and puts the avatar back to neutral.
    pub fn reset(&mut self) -> Result<(), PipelineError> {
        self.expect(
            "reset",
            &[
                TrackingState::Ready,
                TrackingState::Tracking,
                TrackingState::Paused,
                TrackingState::Stopped,
            ],
        )?;
        log::info!("Resetting avatar");
        self.clear_motion();
        retarget::reset(&self.capability, &mut self.engine);
        Ok(())
    }

    /// Swaps the avatar without touching the tracking session.
    pub fn change_avatar(&mut self, avatar: Option<&str>) -> Result<(), PipelineError> {
        self.expect(
            "change avatar",
            &[
                TrackingState::Ready,
                TrackingState::Tracking,
                TrackingState::Paused,
                TrackingState::Stopped,
            ],
        )?;
        self.load_avatar(avatar);
        Ok(())
    }

    fn clear_motion(&mut self) {
        self.smoother.reset();
        self.pose_smoother.reset();
        self.interpolator.reset();
        self.settled_shown = false;
    }

    fn note_detection(&mut self) {
        let gap = self.since_detection;
        self.since_detection = 0.;
        self.detection_interval = Some(match self.detection_interval {
            Some(prev) => prev + (gap - prev) * INTERVAL_ALPHA,
            None => gap,
        });
    }

    fn interpolation_time(&self) -> f32 {
        self.detection_interval
            .unwrap_or(0.)
            .min(self.settings.smoothing.max_interpolation)
    }

    /// Consumes finished detections and updates the avatar. Ticks without a
    /// new detection keep easing toward the last one, then hold.
    pub fn tick(&mut self, dt: f32) -> TickReport {
        let mut report = TickReport::default();
        let events = self.source.drain();
        if dt.is_finite() && dt > 0. {
            self.uptime += dt;
        }

        if self.state != TrackingState::Tracking {
            report.discarded = events.len();
            return report;
        }
        self.since_detection += dt.max(0.);

        let mut latest: Option<(ExpressionFrame, HeadPose)> = None;
        for event in events {
            if !self.gate.accepts(event.generation) {
                log::trace!("Dropping result from session {}", event.generation);
                report.discarded += 1;
                continue;
            }
            report.detections += 1;

            // no face: hold the last pose and leave smoothing alone
            let Some(face) = event.detection.as_ref().and_then(normalize) else {
                continue;
            };
            report.faces += 1;

            let raw = estimate(
                &face.landmarks,
                face.emotions.as_ref(),
                &self.settings.estimator,
            );
            let pose = estimate_head_pose(&face.landmarks, &self.settings.pose);
            latest = Some((self.smoother.smooth(&raw), self.pose_smoother.smooth(pose)));
        }

        if report.detections > 0 {
            self.note_detection();
        }
        if report.faces > 0 {
            self.last_face = Some(self.uptime);
        }

        if let Some((frame, pose)) = latest {
            let duration = self.interpolation_time();
            self.interpolator.retarget(frame, pose, duration);
            self.settled_shown = false;
        } else if !self.interpolator.has_target() || self.settled_shown {
            return report;
        }

        let (frame, pose) = self.interpolator.advance(dt);
        report.morph_writes = retarget::apply(
            &frame,
            pose,
            &self.capability,
            &self.settings.pose.limits,
            &mut self.engine,
        );
        report.applied = true;
        self.settled_shown = self.interpolator.is_settled();
        report
    }

    /// True when a face was seen within the last half second of ticks.
    pub fn face_visible(&self) -> bool {
        self.state == TrackingState::Tracking
            && self
                .last_face
                .is_some_and(|seen| self.uptime - seen < 0.5)
    }

    pub fn report(&self, status: &mut StatusBar) {
        status.add_item(self.state.as_ref().into());
        if self.face_visible() {
            status.add_item(FACE_ON.clone());
        } else {
            status.add_item(FACE_OFF.clone());
        }
        self.source.report(status);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, VecDeque};

    use anyhow::bail;
    use strum::IntoEnumIterator;

    use super::*;
    use crate::core::{
        avatar::{
            manifest::{AvatarManifest, ManifestMesh},
            testing::RecordingEngine,
            ChannelHandle, MeshHandle,
        },
        error::CameraError,
        expression::{smoothing::Easing, ExpressionChannel},
        ext_tracking::{
            landmarks::{testing::FaceBuilder, RawPoint},
            DetectionEvent, RawDetection,
        },
    };

    #[derive(Default)]
    struct ScriptedSource {
        fail_load: bool,
        camera: Option<CameraError>,
        generation: u64,
        pending: VecDeque<DetectionEvent>,
        released: usize,
    }

    impl ScriptedSource {
        fn push(&mut self, detection: Option<RawDetection>) {
            self.pending.push_back(DetectionEvent {
                generation: self.generation,
                detection,
            });
        }
    }

    impl FrameSource for ScriptedSource {
        fn load(&mut self) -> anyhow::Result<()> {
            if self.fail_load {
                bail!("model weights missing");
            }
            Ok(())
        }

        fn acquire(&mut self, gate: &TrackingGate, _timeout: Duration) -> Result<(), CameraError> {
            if let Some(e) = self.camera.clone() {
                return Err(e);
            }
            self.generation = gate.generation();
            Ok(())
        }

        fn release(&mut self) {
            self.released += 1;
        }

        fn drain(&mut self) -> Vec<DetectionEvent> {
            self.pending.drain(..).collect()
        }
    }

    fn face(builder: FaceBuilder) -> Option<RawDetection> {
        Some(RawDetection::FaceApi {
            positions: builder
                .points()
                .iter()
                .map(|p| RawPoint::Pair([p.x, p.y]))
                .collect(),
            expressions: HashMap::new(),
        })
    }

    fn open_mouth() -> Option<RawDetection> {
        face(FaceBuilder {
            mouth_gap: 15.,
            outer_lip_gap: 28.,
            ..Default::default()
        })
    }

    fn fox() -> AvatarManifest {
        AvatarManifest {
            name: "fox".into(),
            model: "fox.glb".into(),
            meshes: vec![
                ManifestMesh {
                    name: "Face".into(),
                    parent: None,
                    morph_targets: vec!["jawOpen".into(), "EyeBlink_L".into()],
                },
                ManifestMesh {
                    name: "Body".into(),
                    parent: None,
                    morph_targets: Vec::new(),
                },
            ],
        }
    }

    fn settings() -> PipelineSettings {
        let mut settings = PipelineSettings::default();
        settings.smoothing.easing = Easing::Step;
        settings
    }

    fn tracking() -> Pipeline<RecordingEngine, ScriptedSource> {
        let mut pipeline = Pipeline::new(
            RecordingEngine::with_avatar("fox", fox()),
            ScriptedSource::default(),
            settings(),
        );
        pipeline.initialize(Some("fox")).unwrap();
        pipeline.start_tracking().unwrap();
        pipeline
    }

    fn jaw() -> &'static str {
        ExpressionChannel::JawOpen.name()
    }

    // first morph target on the fox face
    const JAW_MORPH: ChannelHandle = ChannelHandle {
        mesh: MeshHandle(0),
        index: 0,
    };

    #[test]
    fn test_lifecycle() {
        let mut pipeline = Pipeline::new(
            RecordingEngine::default(),
            ScriptedSource::default(),
            settings(),
        );
        assert_eq!(pipeline.state(), TrackingState::Idle);
        assert!(matches!(
            pipeline.start_tracking(),
            Err(PipelineError::InvalidTransition {
                state: TrackingState::Idle,
                ..
            })
        ));

        pipeline.initialize(None).unwrap();
        assert_eq!(pipeline.state(), TrackingState::Ready);
        pipeline.start_tracking().unwrap();
        pipeline.pause().unwrap();
        assert_eq!(pipeline.state(), TrackingState::Paused);
        assert!(pipeline.pause().is_err());
        pipeline.resume().unwrap();
        pipeline.stop().unwrap();
        assert_eq!(pipeline.state(), TrackingState::Stopped);
        assert_eq!(pipeline.source_mut().released, 1);
        pipeline.start_tracking().unwrap();
        assert_eq!(pipeline.state(), TrackingState::Tracking);
    }

    #[test]
    fn test_detector_failure_returns_to_idle() {
        let mut pipeline = Pipeline::new(
            RecordingEngine::default(),
            ScriptedSource {
                fail_load: true,
                ..Default::default()
            },
            settings(),
        );
        assert!(matches!(
            pipeline.initialize(None),
            Err(PipelineError::DetectorLoad(_))
        ));
        assert_eq!(pipeline.state(), TrackingState::Idle);
    }

    #[test]
    fn test_missing_avatar_falls_back() {
        let mut pipeline = Pipeline::new(
            RecordingEngine::default(),
            ScriptedSource::default(),
            settings(),
        );
        pipeline.initialize(Some("ghost")).unwrap();
        assert_eq!(pipeline.state(), TrackingState::Ready);
        assert_eq!(pipeline.engine().fallback_built, 1);
        assert!(!pipeline.capability().blendshape_capable);
        assert!(pipeline.capability().fallback.mouth.is_some());
    }

    #[test]
    fn test_layout_hides_body() {
        let pipeline = tracking();
        let engine = pipeline.engine();
        assert_eq!(engine.visible.get(&MeshHandle(1)), Some(&false));
        assert_eq!(engine.head_group, vec![MeshHandle(0)]);
    }

    #[test]
    fn test_camera_error_leaves_pipeline_ready() {
        let mut pipeline = Pipeline::new(
            RecordingEngine::default(),
            ScriptedSource {
                camera: Some(CameraError::PermissionDenied),
                ..Default::default()
            },
            settings(),
        );
        pipeline.initialize(None).unwrap();
        assert!(matches!(
            pipeline.start_tracking(),
            Err(PipelineError::Camera(CameraError::PermissionDenied))
        ));
        assert_eq!(pipeline.state(), TrackingState::Ready);
        assert!(!pipeline.gate().is_active());

        pipeline.source_mut().camera = None;
        pipeline.start_tracking().unwrap();
    }

    #[test]
    fn test_face_drives_morphs() {
        let mut pipeline = tracking();
        pipeline.source_mut().push(open_mouth());
        let report = pipeline.tick(1. / 60.);

        assert_eq!(report.faces, 1);
        assert!(report.applied);
        assert!(report.morph_writes > 0);
        let jaw = pipeline.engine().morphs[&JAW_MORPH];
        assert!(jaw > 0.5, "jaw {}", jaw);
        assert!(pipeline.engine().rotation.is_some());
    }

    #[test]
    fn test_no_face_holds_pose_without_writes() {
        let mut pipeline = tracking();
        pipeline.source_mut().push(open_mouth());
        pipeline.tick(0.016);
        let writes = pipeline.engine().morph_writes;
        let smoothed = pipeline.smoothed(jaw());

        pipeline.source_mut().push(None);
        let report = pipeline.tick(0.016);
        assert_eq!(report.detections, 1);
        assert_eq!(report.faces, 0);
        assert!(!report.applied);
        assert_eq!(pipeline.engine().morph_writes, writes);
        assert_eq!(pipeline.smoothed(jaw()), smoothed);
    }

    #[test]
    fn test_missing_frames_do_not_perturb_smoothing() {
        let mut gappy = tracking();
        for detection in [open_mouth(), open_mouth(), None, None, face(FaceBuilder::default())] {
            gappy.source_mut().push(detection);
            gappy.tick(0.016);
        }

        let mut steady = tracking();
        for detection in [open_mouth(), open_mouth(), face(FaceBuilder::default())] {
            steady.source_mut().push(detection);
            steady.tick(0.016);
        }

        for channel in ExpressionChannel::iter() {
            let name = channel.name();
            let (a, b) = (gappy.smoothed(name), steady.smoothed(name));
            assert!(
                (a.unwrap() - b.unwrap()).abs() < 1e-6,
                "{} diverged: {:?} vs {:?}",
                name,
                a,
                b
            );
        }
    }

    #[test]
    fn test_results_from_old_session_are_dropped() {
        let mut pipeline = tracking();
        pipeline.source_mut().push(open_mouth());
        pipeline.stop().unwrap();

        // a detector call that finished after stop
        let report = pipeline.tick(0.016);
        assert_eq!(report.discarded, 1);
        assert!(pipeline.smoothed(jaw()).is_none());

        let stale = pipeline.source_mut().generation;
        pipeline.start_tracking().unwrap();
        pipeline.source_mut().pending.push_back(DetectionEvent {
            generation: stale,
            detection: open_mouth(),
        });
        let report = pipeline.tick(0.016);
        assert_eq!(report.discarded, 1);
        assert_eq!(report.detections, 0);
    }

    #[test]
    fn test_stop_keeps_smoothing_until_restart() {
        let mut pipeline = tracking();
        pipeline.source_mut().push(open_mouth());
        pipeline.tick(0.016);
        pipeline.stop().unwrap();
        assert!(pipeline.smoothed(jaw()).is_some());

        pipeline.start_tracking().unwrap();
        assert!(pipeline.smoothed(jaw()).is_none());
    }

    #[test]
    fn test_paused_pipeline_ignores_detections() {
        let mut pipeline = tracking();
        let writes = pipeline.engine().morph_writes;
        pipeline.pause().unwrap();
        pipeline.source_mut().push(open_mouth());
        let report = pipeline.tick(0.016);
        assert_eq!(report.discarded, 1);
        assert_eq!(pipeline.engine().morph_writes, writes);
    }

    #[test]
    fn test_reset_zeroes_avatar_and_smoothing() {
        let mut pipeline = tracking();
        pipeline.source_mut().push(open_mouth());
        pipeline.tick(0.016);

        pipeline.reset().unwrap();
        assert!(pipeline.smoothed(jaw()).is_none());
        assert!(pipeline.engine().morphs.values().all(|v| *v == 0.));
        assert_eq!(pipeline.engine().rotation, Some(HeadPose::ZERO));
        assert_eq!(pipeline.state(), TrackingState::Tracking);
    }

    #[test]
    fn test_change_avatar_keeps_session() {
        let mut pipeline = tracking();
        pipeline.source_mut().push(open_mouth());
        pipeline.tick(0.016);

        pipeline.change_avatar(None).unwrap();
        assert_eq!(pipeline.state(), TrackingState::Tracking);
        assert_eq!(pipeline.engine().fallback_built, 1);
        assert!(pipeline.smoothed(jaw()).is_some());

        pipeline.source_mut().push(open_mouth());
        let report = pipeline.tick(0.016);
        assert!(report.applied);
        assert_eq!(report.morph_writes, 0);
    }

    #[test]
    fn test_interpolation_eases_between_detections() {
        let mut settings = PipelineSettings::default();
        settings.smoothing.easing = Easing::Linear;
        let mut pipeline = Pipeline::new(
            RecordingEngine::with_avatar("fox", fox()),
            ScriptedSource::default(),
            settings,
        );
        pipeline.initialize(Some("fox")).unwrap();
        pipeline.start_tracking().unwrap();

        // detector at 10 Hz, renderer at 50 Hz
        pipeline.source_mut().push(face(FaceBuilder::default()));
        pipeline.tick(0.02);
        for _ in 0..4 {
            pipeline.tick(0.02);
        }
        pipeline.source_mut().push(open_mouth());
        pipeline.tick(0.02);
        let first = pipeline.engine().morphs[&JAW_MORPH];
        pipeline.tick(0.02);
        let second = pipeline.engine().morphs[&JAW_MORPH];
        for _ in 0..10 {
            pipeline.tick(0.02);
        }
        let settled = pipeline.engine().morphs[&JAW_MORPH];

        assert!(first < second, "{} !< {}", first, second);
        assert!(second < settled, "{} !< {}", second, settled);
        // the jawOpen morph follows the larger of jaw and mouth opening
        let target = [ExpressionChannel::JawOpen, ExpressionChannel::MouthOpen]
            .into_iter()
            .filter_map(|c| pipeline.smoothed(c.name()))
            .fold(0., f32::max);
        assert!((settled - target.clamp(0., 1.)).abs() < 1e-5);
    }
}
