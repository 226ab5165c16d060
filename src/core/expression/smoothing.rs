use std::{collections::HashMap, sync::Arc};

use serde::{Deserialize, Serialize};

use super::{ExpressionFrame, HeadPose};

/// Groups channels that share a smoothing constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelClass {
    Blink,
    Smile,
    Mouth,
    Brow,
    Other,
}

impl ChannelClass {
    /// Classifies by case-insensitive substring, most specific first.
    pub fn of(name: &str) -> Self {
        let name = name.to_ascii_lowercase();
        if name.contains("blink") {
            Self::Blink
        } else if name.contains("smile") {
            Self::Smile
        } else if name.contains("mouth") || name.contains("jaw") {
            Self::Mouth
        } else if name.contains("brow") {
            Self::Brow
        } else {
            Self::Other
        }
    }
}

/// Easing curve used between detector updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Easing {
    /// Jump straight to each new detection.
    Step,
    Linear,
    QuadInOut,
    CubicOut,
    CubicIn,
}

impl Easing {
    /// Evaluates the curve at `t` in [0, 1].
    pub fn ease(&self, t: f32) -> f32 {
        let t = if t.is_nan() { 1. } else { t.clamp(0., 1.) };
        match self {
            Self::Step => 1.,
            Self::Linear => t,
            Self::QuadInOut => {
                if t < 0.5 {
                    2. * t * t
                } else {
                    1. - (-2. * t + 2.).powi(2) / 2.
                }
            }
            Self::CubicOut => 1. - (1. - t).powi(3),
            Self::CubicIn => t * t * t,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SmoothingTuning {
    pub blink_alpha: f32,
    pub smile_alpha: f32,
    pub mouth_alpha: f32,
    pub brow_alpha: f32,
    pub default_alpha: f32,
    pub pose_alpha: f32,
    /// Changes smaller than this keep the previous value.
    pub epsilon: f32,
    pub easing: Easing,
    /// Longest interpolation between two detections, in seconds.
    pub max_interpolation: f32,
}

impl Default for SmoothingTuning {
    fn default() -> Self {
        Self {
            blink_alpha: 0.8,
            smile_alpha: 0.75,
            mouth_alpha: 0.7,
            brow_alpha: 0.65,
            default_alpha: 0.7,
            pose_alpha: 0.65,
            epsilon: 1e-4,
            easing: Easing::QuadInOut,
            max_interpolation: 0.25,
        }
    }
}

impl SmoothingTuning {
    pub fn alpha(&self, class: ChannelClass) -> f32 {
        let alpha = match class {
            ChannelClass::Blink => self.blink_alpha,
            ChannelClass::Smile => self.smile_alpha,
            ChannelClass::Mouth => self.mouth_alpha,
            ChannelClass::Brow => self.brow_alpha,
            ChannelClass::Other => self.default_alpha,
        };
        alpha.clamp(0., 1.)
    }
}

/// First-order exponential filter, one state per channel name.
pub struct Smoother {
    state: HashMap<Arc<str>, f32>,
    tuning: SmoothingTuning,
    classify: fn(&str) -> ChannelClass,
}

impl Smoother {
    pub fn new(tuning: SmoothingTuning) -> Self {
        Self::with_classifier(tuning, ChannelClass::of)
    }

    pub fn with_classifier(tuning: SmoothingTuning, classify: fn(&str) -> ChannelClass) -> Self {
        Self {
            state: HashMap::new(),
            tuning,
            classify,
        }
    }

    /// Moves every channel of `raw` toward its raw value and returns the result.
    /// Channels seen for the first time start from 0.
    pub fn smooth(&mut self, raw: &ExpressionFrame) -> ExpressionFrame {
        let mut out = ExpressionFrame::new();
        for (name, value) in raw.iter() {
            let previous = self.state.get(&**name).copied().unwrap_or(0.);
            let smoothed = if !value.is_finite() || (value - previous).abs() < self.tuning.epsilon
            {
                previous
            } else {
                let alpha = self.tuning.alpha((self.classify)(name));
                previous + (value - previous) * alpha
            };
            self.state.insert(name.clone(), smoothed);
            out.set(name.clone(), smoothed);
        }
        out
    }

    pub fn value(&self, name: &str) -> Option<f32> {
        self.state.get(name).copied()
    }

    pub fn reset(&mut self) {
        self.state.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }
}

/// Head pose filter, separate from the expression channels.
pub struct PoseSmoother {
    last: HeadPose,
    alpha: f32,
}

impl PoseSmoother {
    pub fn new(alpha: f32) -> Self {
        Self {
            last: HeadPose::ZERO,
            alpha: alpha.clamp(0., 1.),
        }
    }

    pub fn smooth(&mut self, raw: HeadPose) -> HeadPose {
        let step = |prev: f32, raw: f32| {
            if raw.is_finite() {
                prev + (raw - prev) * self.alpha
            } else {
                prev
            }
        };
        self.last = HeadPose {
            yaw: step(self.last.yaw, raw.yaw),
            pitch: step(self.last.pitch, raw.pitch),
            roll: step(self.last.roll, raw.roll),
        };
        self.last
    }

    pub fn reset(&mut self) {
        self.last = HeadPose::ZERO;
    }
}

/// Eases the displayed frame toward the latest smoothed detection so the
/// avatar does not step at the detector's rate.
pub struct FrameInterpolator {
    from: ExpressionFrame,
    from_pose: HeadPose,
    to: ExpressionFrame,
    to_pose: HeadPose,
    elapsed: f32,
    duration: f32,
    easing: Easing,
    has_target: bool,
}

impl FrameInterpolator {
    pub fn new(easing: Easing) -> Self {
        Self {
            from: ExpressionFrame::new(),
            from_pose: HeadPose::ZERO,
            to: ExpressionFrame::new(),
            to_pose: HeadPose::ZERO,
            elapsed: 0.,
            duration: 0.,
            easing,
            has_target: false,
        }
    }

    /// Starts a new transition from whatever is currently shown.
    pub fn retarget(&mut self, to: ExpressionFrame, pose: HeadPose, duration: f32) {
        let (from, from_pose) = self.current();
        self.from = from;
        self.from_pose = from_pose;
        self.to = to;
        self.to_pose = pose;
        self.elapsed = 0.;
        self.duration = if duration.is_finite() {
            duration.max(0.)
        } else {
            0.
        };
        self.has_target = true;
    }

    pub fn advance(&mut self, dt: f32) -> (ExpressionFrame, HeadPose) {
        if dt.is_finite() && dt > 0. {
            self.elapsed += dt;
        }
        self.current()
    }

    pub fn current(&self) -> (ExpressionFrame, HeadPose) {
        let t = if self.duration > 0. {
            self.easing.ease(self.elapsed / self.duration)
        } else {
            1.
        };

        let mut frame = ExpressionFrame::new();
        for (name, to) in self.to.iter() {
            let from = self.from.get(name);
            frame.set(name.clone(), from + (to - from) * t);
        }
        for (name, from) in self.from.iter() {
            if !self.to.contains(name) {
                frame.set(name.clone(), from * (1. - t));
            }
        }
        (frame, self.from_pose.lerp(self.to_pose, t))
    }

    pub fn is_settled(&self) -> bool {
        self.elapsed >= self.duration
    }

    pub fn has_target(&self) -> bool {
        self.has_target
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.easing);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::expression::ExpressionChannel;

    fn frame_of(values: &[(ExpressionChannel, f32)]) -> ExpressionFrame {
        let mut frame = ExpressionFrame::new();
        for &(channel, value) in values {
            frame.setx(channel, value);
        }
        frame
    }

    #[test]
    fn test_channel_classes() {
        assert_eq!(ChannelClass::of("eyeBlinkLeft"), ChannelClass::Blink);
        assert_eq!(ChannelClass::of("mouthSmileRight"), ChannelClass::Smile);
        assert_eq!(ChannelClass::of("jawOpen"), ChannelClass::Mouth);
        assert_eq!(ChannelClass::of("BrowInnerUp"), ChannelClass::Brow);
        assert_eq!(ChannelClass::of("tongueOut"), ChannelClass::Other);
    }

    #[test]
    fn test_first_sample_starts_from_zero() {
        let mut smoother = Smoother::new(SmoothingTuning::default());
        let out = smoother.smooth(&frame_of(&[(ExpressionChannel::EyeBlinkLeft, 1.0)]));
        assert!((out.getx(ExpressionChannel::EyeBlinkLeft) - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_blink_reacts_faster_than_brow() {
        let mut smoother = Smoother::new(SmoothingTuning::default());
        let out = smoother.smooth(&frame_of(&[
            (ExpressionChannel::EyeBlinkLeft, 1.0),
            (ExpressionChannel::BrowInnerUp, 1.0),
        ]));
        assert!(
            out.getx(ExpressionChannel::EyeBlinkLeft) > out.getx(ExpressionChannel::BrowInnerUp)
        );
    }

    #[test]
    fn test_steady_input_converges() {
        let tuning = SmoothingTuning::default();
        let raw = frame_of(&[
            (ExpressionChannel::BrowRaise, 0.6),
            (ExpressionChannel::MouthOpen, 0.9),
            (ExpressionChannel::TongueOut, 0.3),
        ]);
        // (1 - 0.65)^n < 1e-3 / 0.9 once n >= 7
        let mut smoother = Smoother::new(tuning);
        let mut out = ExpressionFrame::new();
        for _ in 0..8 {
            out = smoother.smooth(&raw);
        }
        for (name, value) in raw.iter() {
            assert!(
                (out.get(name) - value).abs() < 1e-3,
                "{} settled at {} instead of {}",
                name,
                out.get(name),
                value
            );
        }
    }

    #[test]
    fn test_skipped_frames_leave_state_untouched() {
        let face = frame_of(&[(ExpressionChannel::Smile, 0.7)]);

        let mut with_gaps = Smoother::new(SmoothingTuning::default());
        let mut direct = Smoother::new(SmoothingTuning::default());
        for frame in [Some(&face), Some(&face), None, None, Some(&face)] {
            if let Some(frame) = frame {
                with_gaps.smooth(frame);
            }
        }
        for _ in 0..3 {
            direct.smooth(&face);
        }
        let (a, b) = (with_gaps.value("smile"), direct.value("smile"));
        assert!((a.unwrap() - b.unwrap()).abs() < 1e-6);
    }

    #[test]
    fn test_reset_forgets_state() {
        let mut smoother = Smoother::new(SmoothingTuning::default());
        smoother.smooth(&frame_of(&[(ExpressionChannel::Smile, 1.0)]));
        assert!(!smoother.is_empty());
        smoother.reset();
        assert!(smoother.is_empty());
        let out = smoother.smooth(&frame_of(&[(ExpressionChannel::Smile, 1.0)]));
        assert!((out.getx(ExpressionChannel::Smile) - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_non_finite_input_holds_previous() {
        let mut smoother = Smoother::new(SmoothingTuning::default());
        smoother.smooth(&frame_of(&[(ExpressionChannel::MouthOpen, 0.5)]));
        let held = smoother.value("mouthOpen");
        let out = smoother.smooth(&frame_of(&[(ExpressionChannel::MouthOpen, f32::NAN)]));
        assert_eq!(Some(out.getx(ExpressionChannel::MouthOpen)), held);
    }

    #[test]
    fn test_pose_smoother_converges() {
        let mut smoother = PoseSmoother::new(0.65);
        let target = HeadPose {
            yaw: 0.3,
            pitch: -0.2,
            roll: 0.1,
        };
        let mut pose = HeadPose::ZERO;
        for _ in 0..10 {
            pose = smoother.smooth(target);
        }
        assert!((pose.yaw - 0.3).abs() < 1e-3);
        assert!((pose.pitch + 0.2).abs() < 1e-3);
    }

    #[test]
    fn test_easing_endpoints() {
        for easing in [
            Easing::Linear,
            Easing::QuadInOut,
            Easing::CubicOut,
            Easing::CubicIn,
        ] {
            assert_eq!(easing.ease(0.), 0.);
            assert!((easing.ease(1.) - 1.).abs() < 1e-6);
        }
        assert_eq!(Easing::Step.ease(0.), 1.);
    }

    #[test]
    fn test_interpolator_eases_then_holds() {
        let mut interp = FrameInterpolator::new(Easing::Linear);
        assert!(!interp.has_target());

        let target = frame_of(&[(ExpressionChannel::MouthOpen, 1.0)]);
        interp.retarget(target, HeadPose::ZERO, 0.1);

        let (mid, _) = interp.advance(0.05);
        assert!((mid.getx(ExpressionChannel::MouthOpen) - 0.5).abs() < 1e-4);

        let (end, _) = interp.advance(0.05);
        assert!((end.getx(ExpressionChannel::MouthOpen) - 1.0).abs() < 1e-4);

        let (held, _) = interp.advance(1.0);
        assert_eq!(held.getx(ExpressionChannel::MouthOpen), 1.0);
        assert!(interp.is_settled());
    }

    #[test]
    fn test_retarget_starts_from_shown_values() {
        let mut interp = FrameInterpolator::new(Easing::Linear);
        interp.retarget(
            frame_of(&[(ExpressionChannel::Smile, 1.0)]),
            HeadPose::ZERO,
            0.1,
        );
        interp.advance(0.05);
        interp.retarget(
            frame_of(&[(ExpressionChannel::Smile, 0.0)]),
            HeadPose::ZERO,
            0.1,
        );
        let (start, _) = interp.current();
        assert!((start.getx(ExpressionChannel::Smile) - 0.5).abs() < 1e-4);
    }
}
