use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::core::ext_tracking::landmarks::{
    CoarseEmotions, Emotion, FaceLandmarks, LandmarkPoint, Side, EYE_CORNER_A, EYE_CORNER_B,
    EYE_LID_PAIRS, EYE_POINTS, MOUTH_INNER_PAIRS, MOUTH_LOWER_CENTER, MOUTH_UPPER_CENTER,
};

use super::{unit, ExpressionChannel, ExpressionFrame, HeadPose, PoseLimits};

/// Gains, thresholds and resting ratios for the landmark formulas.
/// Ratios are relative to eye width, mouth width or eye distance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EstimatorTuning {
    pub eye_open_ratio: f32,
    pub eye_closed_ratio: f32,
    pub mouth_rest_ratio: f32,
    pub mouth_gain: f32,
    pub smile_rest_aspect: f32,
    pub smile_aspect_gain: f32,
    pub smile_lift_gain: f32,
    pub frown_gain: f32,
    pub brow_rest: f32,
    pub brow_gain: f32,
    pub jaw_rest: f32,
    pub jaw_gain: f32,
    pub pucker_rest: f32,
    pub pucker_range: f32,
    pub press_gap: f32,
    pub puff_rest: f32,
    pub puff_range: f32,
    /// Scales how far the lid contour leans toward one side of the eye.
    pub gaze_gain: f32,
    /// Sideways offset of the mouth from the nose-chin line, in eye distances.
    pub mouth_shift_rest: f32,
    pub mouth_shift_range: f32,
    pub tongue: TongueTuning,
    pub emotion: EmotionWeights,
}

impl Default for EstimatorTuning {
    fn default() -> Self {
        Self {
            eye_open_ratio: 0.30,
            eye_closed_ratio: 0.12,
            mouth_rest_ratio: 0.06,
            mouth_gain: 5.0,
            smile_rest_aspect: 3.2,
            smile_aspect_gain: 0.5,
            smile_lift_gain: 8.0,
            frown_gain: 8.0,
            brow_rest: 0.35,
            brow_gain: 5.0,
            jaw_rest: 1.0,
            jaw_gain: 2.5,
            pucker_rest: 0.8,
            pucker_range: 0.25,
            press_gap: 0.04,
            puff_rest: 2.35,
            puff_range: 0.3,
            gaze_gain: 2.0,
            mouth_shift_rest: 0.05,
            mouth_shift_range: 0.1,
            tongue: TongueTuning::default(),
            emotion: EmotionWeights::default(),
        }
    }
}

/// The tongue is never visible to the landmark models, so `tongueOut`
/// is a guess pieced together from mouth shape and coarse emotions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TongueTuning {
    pub shape_threshold: f32,
    pub shape_gain: f32,
    pub surprise_gain: f32,
    pub protrusion_rest: f32,
    pub protrusion_range: f32,
    pub shape_weight: f32,
    pub surprise_weight: f32,
    pub protrusion_weight: f32,
    /// Below this `tongueOut` the tongue has no direction.
    pub direction_threshold: f32,
    /// Offset of the lip opening from the corner line, in eye distances.
    pub direction_rest: f32,
    pub direction_range: f32,
}

impl Default for TongueTuning {
    fn default() -> Self {
        Self {
            shape_threshold: 0.3,
            shape_gain: 2.0,
            surprise_gain: 1.5,
            protrusion_rest: 0.25,
            protrusion_range: 0.15,
            shape_weight: 0.4,
            surprise_weight: 0.3,
            protrusion_weight: 0.3,
            direction_threshold: 0.1,
            direction_rest: 0.02,
            direction_range: 0.08,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmotionWeights {
    pub surprised_jaw: f32,
    pub surprised_brow: f32,
    pub surprised_pucker: f32,
    pub surprised_puff: f32,
    pub fearful_jaw: f32,
    pub fearful_brow: f32,
    pub happy_smile: f32,
    pub happy_squint: f32,
    pub sad_frown: f32,
    pub sad_shrug_lower: f32,
    pub sad_shrug_upper: f32,
    pub angry_frown: f32,
    pub angry_press: f32,
    pub disgusted_sneer: f32,
    pub angry_sneer: f32,
}

impl Default for EmotionWeights {
    fn default() -> Self {
        Self {
            surprised_jaw: 0.8,
            surprised_brow: 0.7,
            surprised_pucker: 0.5,
            surprised_puff: 0.4,
            fearful_jaw: 0.6,
            fearful_brow: 0.5,
            happy_smile: 0.9,
            happy_squint: 0.6,
            sad_frown: 0.8,
            sad_shrug_lower: 0.4,
            sad_shrug_upper: 0.3,
            angry_frown: 0.4,
            angry_press: 0.6,
            disgusted_sneer: 0.7,
            angry_sneer: 0.3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PoseTuning {
    pub yaw_gain: f32,
    pub pitch_rest: f32,
    pub pitch_gain: f32,
    pub roll_gain: f32,
    /// Flip yaw and roll so the avatar behaves like a mirror.
    pub mirror: bool,
    pub limits: PoseLimits,
}

impl Default for PoseTuning {
    fn default() -> Self {
        Self {
            yaw_gain: 1.5,
            pitch_rest: 0.5,
            pitch_gain: 1.5,
            roll_gain: 1.0,
            mirror: false,
            limits: PoseLimits::default(),
        }
    }
}

#[inline]
fn ratio(num: f32, den: f32) -> Option<f32> {
    let r = num / den;
    (den > f32::EPSILON && r.is_finite()).then_some(r)
}

/// Axes aligned with the eye line, scaled by eye distance, so
/// measurements survive head roll and camera distance.
struct FaceAxes {
    right: Vec2,
    down: Vec2,
    scale: f32,
}

impl FaceAxes {
    fn new(face: &FaceLandmarks) -> Option<Self> {
        let across = face.eye_center(Side::Right) - face.eye_center(Side::Left);
        let scale = across.length();
        if !scale.is_finite() || scale <= f32::EPSILON {
            return None;
        }
        let right = across / scale;
        Some(Self {
            right,
            down: right.perp(),
            scale,
        })
    }

    /// How far `to` sits below `from`, in eye distances.
    fn below(&self, from: Vec2, to: Vec2) -> Option<f32> {
        ratio((to - from).dot(self.down), self.scale)
    }

    fn across(&self, from: Vec2, to: Vec2) -> Option<f32> {
        ratio((to - from).dot(self.right), self.scale)
    }

    fn span(&self, a: Vec2, b: Vec2) -> Option<f32> {
        ratio(a.distance(b), self.scale)
    }
}

/// Eyelid gap over eye width, averaged across both lid pairs.
pub fn eye_aspect_ratio(eye: &[LandmarkPoint; EYE_POINTS]) -> Option<f32> {
    let width = eye[EYE_CORNER_A].truncate().distance(eye[EYE_CORNER_B].truncate());
    let gap = EYE_LID_PAIRS
        .iter()
        .map(|&(up, down)| eye[up].truncate().distance(eye[down].truncate()))
        .sum::<f32>()
        / EYE_LID_PAIRS.len() as f32;
    ratio(gap, width)
}

/// Inner lip gap over mouth width, averaged across the inner lip pairs.
pub fn mouth_aspect_ratio(face: &FaceLandmarks) -> Option<f32> {
    let gap = MOUTH_INNER_PAIRS
        .iter()
        .map(|&(up, down)| face.mouth[up].truncate().distance(face.mouth[down].truncate()))
        .sum::<f32>()
        / MOUTH_INNER_PAIRS.len() as f32;
    ratio(gap, face.mouth_width())
}

struct Estimator<'a> {
    face: &'a FaceLandmarks,
    axes: Option<FaceAxes>,
    tuning: &'a EstimatorTuning,
    emotions: Option<&'a CoarseEmotions>,
}

impl<'a> Estimator<'a> {
    fn emotion(&self, emotion: Emotion) -> f32 {
        self.emotions.map(|e| e.get(emotion)).unwrap_or(0.)
    }

    fn blink(&self, side: Side) -> Option<f32> {
        let t = self.tuning;
        let ear = eye_aspect_ratio(self.face.eye(side))?;
        let range = t.eye_open_ratio - t.eye_closed_ratio;
        ratio(t.eye_open_ratio - ear, range).map(unit)
    }

    fn mouth_open(&self) -> Option<f32> {
        let t = self.tuning;
        let mar = mouth_aspect_ratio(self.face)?;
        Some(unit((mar - t.mouth_rest_ratio) * t.mouth_gain))
    }

    fn smile_aspect(&self) -> Option<f32> {
        let t = self.tuning;
        let upper = self.face.mouth[MOUTH_UPPER_CENTER].truncate();
        let lower = self.face.mouth[MOUTH_LOWER_CENTER].truncate();
        let aspect = ratio(self.face.mouth_width(), upper.distance(lower))?;
        Some((aspect - t.smile_rest_aspect) * t.smile_aspect_gain)
    }

    /// Corner height above the lip center, in mouth widths.
    fn corner_lift(&self, side: Side) -> Option<f32> {
        let axes = self.axes.as_ref()?;
        let upper = self.face.mouth[MOUTH_UPPER_CENTER].truncate();
        let lower = self.face.mouth[MOUTH_LOWER_CENTER].truncate();
        let center = (upper + lower) * 0.5;
        let below = axes.below(center, self.face.mouth_corner(side))?;
        ratio(-below * axes.scale, self.face.mouth_width())
    }

    fn side_smile(&self, side: Side) -> Option<f32> {
        let lift = self.corner_lift(side)?;
        let aspect = self.smile_aspect().unwrap_or(0.);
        Some(unit(aspect + lift * self.tuning.smile_lift_gain))
    }

    fn smile(&self) -> Option<f32> {
        let lift = (self.corner_lift(Side::Left)? + self.corner_lift(Side::Right)?) * 0.5;
        let aspect = self.smile_aspect().unwrap_or(0.);
        Some(unit(aspect + lift * self.tuning.smile_lift_gain))
    }

    fn frown(&self, side: Side) -> Option<f32> {
        let lift = self.corner_lift(side)?;
        Some(unit(-lift * self.tuning.frown_gain))
    }

    fn brow_lift(&self, brow: Vec2, eye: Vec2) -> Option<f32> {
        let axes = self.axes.as_ref()?;
        let height = axes.below(brow, eye)?;
        Some(unit((height - self.tuning.brow_rest) * self.tuning.brow_gain))
    }

    fn brow_outer(&self, side: Side) -> Option<f32> {
        self.brow_lift(self.face.brow_outer(side), self.face.eye_outer_corner(side))
    }

    fn brow_inner(&self, side: Side) -> Option<f32> {
        self.brow_lift(self.face.brow_inner(side), self.face.eye_inner_corner(side))
    }

    fn jaw_open(&self) -> Option<f32> {
        let axes = self.axes.as_ref()?;
        let drop = axes.span(self.face.nose_tip(), self.face.chin())?;
        Some(unit((drop - self.tuning.jaw_rest) * self.tuning.jaw_gain))
    }

    fn tongue_out(&self, mouth_open: f32) -> Option<f32> {
        let t = &self.tuning.tongue;
        let axes = self.axes.as_ref()?;

        let shape = mouth_aspect_ratio(self.face)
            .map(|mar| ((mar - t.shape_threshold) * t.shape_gain).max(0.))
            .unwrap_or(0.);
        let surprise = self.emotion(Emotion::Surprised) * mouth_open * t.surprise_gain;
        let lip_gap = axes.span(
            self.face.nose_tip(),
            self.face.mouth[MOUTH_UPPER_CENTER].truncate(),
        )?;
        let protrusion = unit(ratio(t.protrusion_rest - lip_gap, t.protrusion_range)?);

        Some(unit(
            shape * t.shape_weight + surprise * t.surprise_weight + protrusion * t.protrusion_weight,
        ))
    }

    fn pucker(&self) -> Option<f32> {
        let axes = self.axes.as_ref()?;
        let width = axes.span(self.face.mouth_corner(Side::Left), self.face.mouth_corner(Side::Right))?;
        ratio(self.tuning.pucker_rest - width, self.tuning.pucker_range).map(unit)
    }

    fn press(&self) -> Option<f32> {
        let mar = mouth_aspect_ratio(self.face)?;
        ratio(self.tuning.press_gap - mar, self.tuning.press_gap).map(unit)
    }

    /// Where the lid contour sits inside the eye's bounding box, averaged
    /// over both eyes. Positive is image-right and down.
    fn gaze(&self) -> Option<Vec2> {
        let axes = self.axes.as_ref()?;
        let lean = |side: Side| -> Option<Vec2> {
            let points = self
                .face
                .eye(side)
                .map(|p| Vec2::new(p.truncate().dot(axes.right), p.truncate().dot(axes.down)));
            let min = points.iter().copied().reduce(Vec2::min)?;
            let max = points.iter().copied().reduce(Vec2::max)?;
            let mean = points.iter().sum::<Vec2>() / EYE_POINTS as f32;
            let offset = mean - (min + max) * 0.5;
            let size = max - min;
            Some(Vec2::new(ratio(offset.x, size.x)?, ratio(offset.y, size.y)?))
        };
        Some((lean(Side::Left)? + lean(Side::Right)?) * 0.5 * self.tuning.gaze_gain)
    }

    /// Sideways offset of the mouth from the nose-chin line, in eye distances.
    fn mouth_shift(&self) -> Option<f32> {
        let axes = self.axes.as_ref()?;
        let nose = self.face.nose_tip();
        let midline = self.face.chin() - nose;
        let mouth = (self.face.mouth_corner(Side::Left) + self.face.mouth_corner(Side::Right)) * 0.5;
        let t = ratio((mouth - nose).dot(midline), midline.length_squared())?;
        axes.across(nose + midline * t, mouth)
    }

    fn mouth_side(&self, shift: f32) -> f32 {
        let t = self.tuning;
        ratio(shift - t.mouth_shift_rest, t.mouth_shift_range)
            .map(unit)
            .unwrap_or(0.)
    }

    /// Direction of a protruding tongue as (left, right, up, down), read
    /// from where the lip opening sits relative to the mouth corners.
    fn tongue_direction(&self, tongue: f32) -> Option<[f32; 4]> {
        let t = &self.tuning.tongue;
        if tongue < t.direction_threshold {
            return Some([0.; 4]);
        }
        let axes = self.axes.as_ref()?;
        let (up, down) = MOUTH_INNER_PAIRS[1];
        let opening = (self.face.mouth[up].truncate() + self.face.mouth[down].truncate()) * 0.5;
        let corners = (self.face.mouth_corner(Side::Left) + self.face.mouth_corner(Side::Right)) * 0.5;
        let drop = axes.below(corners, opening)?;
        let shift = self.mouth_shift().unwrap_or(0.);

        let lean = |v: f32| {
            ratio(v - t.direction_rest, t.direction_range)
                .map(|v| unit(v) * tongue)
                .unwrap_or(0.)
        };
        Some([lean(-shift), lean(shift), lean(-drop), lean(drop)])
    }

    fn cheek_puff(&self) -> Option<f32> {
        let axes = self.axes.as_ref()?;
        let width = axes.span(self.face.jaw[1].truncate(), self.face.jaw[15].truncate())?;
        ratio(width - self.tuning.puff_rest, self.tuning.puff_range).map(unit)
    }
}

/// Turns one face into expression values in [0,1].
///
/// Every channel stands alone: a formula that cannot be evaluated
/// (degenerate or non-finite points) yields 0 without affecting the rest.
/// Coarse emotions only ever raise channels, via `max`.
pub fn estimate(
    face: &FaceLandmarks,
    emotions: Option<&CoarseEmotions>,
    tuning: &EstimatorTuning,
) -> ExpressionFrame {
    let est = Estimator {
        face,
        axes: FaceAxes::new(face),
        tuning,
        emotions,
    };
    let w = &tuning.emotion;
    let or0 = |v: Option<f32>| v.unwrap_or(0.);

    let mut frame = ExpressionFrame::new();
    let mut set = |channel: ExpressionChannel, value: f32| frame.setx(channel, unit(value));

    set(ExpressionChannel::EyeBlinkLeft, or0(est.blink(Side::Left)));
    set(ExpressionChannel::EyeBlinkRight, or0(est.blink(Side::Right)));

    let mouth_open = or0(est.mouth_open());
    set(ExpressionChannel::MouthOpen, mouth_open);

    let surprised = est.emotion(Emotion::Surprised);
    let fearful = est.emotion(Emotion::Fearful);
    set(
        ExpressionChannel::JawOpen,
        or0(est.jaw_open())
            .max(surprised * w.surprised_jaw)
            .max(fearful * w.fearful_jaw),
    );

    let happy = est.emotion(Emotion::Happy) * w.happy_smile;
    set(ExpressionChannel::Smile, or0(est.smile()).max(happy));
    set(
        ExpressionChannel::MouthSmileLeft,
        or0(est.side_smile(Side::Left)).max(happy),
    );
    set(
        ExpressionChannel::MouthSmileRight,
        or0(est.side_smile(Side::Right)).max(happy),
    );

    let sad = est.emotion(Emotion::Sad) * w.sad_frown + est.emotion(Emotion::Angry) * w.angry_frown;
    set(
        ExpressionChannel::MouthFrownLeft,
        or0(est.frown(Side::Left)).max(sad),
    );
    set(
        ExpressionChannel::MouthFrownRight,
        or0(est.frown(Side::Right)).max(sad),
    );

    let outer = [or0(est.brow_outer(Side::Left)), or0(est.brow_outer(Side::Right))];
    let inner = [or0(est.brow_inner(Side::Left)), or0(est.brow_inner(Side::Right))];
    let brow_surprise = surprised * w.surprised_brow;
    set(ExpressionChannel::BrowOuterUpLeft, outer[0]);
    set(ExpressionChannel::BrowOuterUpRight, outer[1]);
    set(
        ExpressionChannel::BrowInnerUp,
        ((inner[0] + inner[1]) * 0.5)
            .max(brow_surprise)
            .max(fearful * w.fearful_brow),
    );
    set(
        ExpressionChannel::BrowRaise,
        ((outer[0] + outer[1] + inner[0] + inner[1]) * 0.25).max(brow_surprise),
    );

    let tongue = or0(est.tongue_out(mouth_open));
    let [left, right, up, down] = est.tongue_direction(tongue).unwrap_or([0.; 4]);
    set(ExpressionChannel::TongueOut, tongue);
    set(ExpressionChannel::TongueLeft, left);
    set(ExpressionChannel::TongueRight, right);
    set(ExpressionChannel::TongueUp, up);
    set(ExpressionChannel::TongueDown, down);

    let gaze = est.gaze().unwrap_or(Vec2::ZERO);
    set(ExpressionChannel::EyeLookLeft, -gaze.x);
    set(ExpressionChannel::EyeLookRight, gaze.x);
    set(ExpressionChannel::EyeLookUp, -gaze.y);
    set(ExpressionChannel::EyeLookDown, gaze.y);

    let shift = or0(est.mouth_shift());
    set(ExpressionChannel::MouthLeft, est.mouth_side(-shift));
    set(ExpressionChannel::MouthRight, est.mouth_side(shift));

    let sad_only = est.emotion(Emotion::Sad);
    set(ExpressionChannel::MouthShrugLower, sad_only * w.sad_shrug_lower);
    set(ExpressionChannel::MouthShrugUpper, sad_only * w.sad_shrug_upper);

    set(
        ExpressionChannel::MouthPucker,
        or0(est.pucker()).max(surprised * w.surprised_pucker),
    );
    set(
        ExpressionChannel::MouthPress,
        or0(est.press()).max(est.emotion(Emotion::Angry) * w.angry_press),
    );
    set(
        ExpressionChannel::CheekPuff,
        or0(est.cheek_puff()).max(surprised * w.surprised_puff),
    );
    set(
        ExpressionChannel::CheekSquint,
        est.emotion(Emotion::Happy) * w.happy_squint,
    );
    set(
        ExpressionChannel::NoseSneer,
        est.emotion(Emotion::Disgusted) * w.disgusted_sneer
            + est.emotion(Emotion::Angry) * w.angry_sneer,
    );

    frame
}

/// Coarse yaw/pitch/roll from where the nose sits relative to the eyes.
pub fn estimate_head_pose(face: &FaceLandmarks, tuning: &PoseTuning) -> HeadPose {
    let Some(axes) = FaceAxes::new(face) else {
        return HeadPose::ZERO;
    };
    let eyes = face.eyes_center();
    let tip = face.nose_tip();

    let yaw = axes.across(eyes, tip).unwrap_or(0.) * tuning.yaw_gain;
    let pitch = axes
        .below(eyes, tip)
        .map(|d| (d - tuning.pitch_rest) * tuning.pitch_gain)
        .unwrap_or(0.);
    let roll = axes.right.y.atan2(axes.right.x) * tuning.roll_gain;

    let sign = if tuning.mirror { -1. } else { 1. };
    HeadPose {
        yaw: yaw * sign,
        pitch,
        roll: roll * sign,
    }
    .clamped(&tuning.limits)
}
