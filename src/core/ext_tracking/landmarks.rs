use glam::{Vec2, Vec3};
use serde::Deserialize;
use strum::{EnumCount, EnumIter, EnumString, IntoStaticStr};

/// One detected point. Detectors without depth leave `z` at 0.
pub type LandmarkPoint = Vec3;

pub const JAW_POINTS: usize = 17;
pub const BROW_POINTS: usize = 5;
pub const NOSE_POINTS: usize = 9;
pub const EYE_POINTS: usize = 6;
pub const MOUTH_POINTS: usize = 20;

pub const CHIN: usize = 8;
pub const NOSE_TIP: usize = 3;

pub const EYE_CORNER_A: usize = 0;
pub const EYE_CORNER_B: usize = 3;
/// Upper/lower lid pairs, each pair vertically aligned.
pub const EYE_LID_PAIRS: [(usize, usize); 2] = [(1, 5), (2, 4)];

pub const MOUTH_CORNER_LEFT: usize = 0;
pub const MOUTH_CORNER_RIGHT: usize = 6;
pub const MOUTH_UPPER_CENTER: usize = 3;
pub const MOUTH_LOWER_CENTER: usize = 9;
/// Inner lip upper/lower pairs, left to right.
pub const MOUTH_INNER_PAIRS: [(usize, usize); 3] = [(13, 19), (14, 18), (15, 17)];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

/// Canonical face record shared by every detector adapter.
///
/// All groups use the 68-point face layout ordering, image-left first.
/// Groups are always complete: an adapter that cannot fill a group
/// produces no `FaceLandmarks` at all.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceLandmarks {
    pub jaw: [LandmarkPoint; JAW_POINTS],
    /// Left brow runs outer to inner, right brow inner to outer.
    pub brows: [[LandmarkPoint; BROW_POINTS]; 2],
    pub nose: [LandmarkPoint; NOSE_POINTS],
    pub eyes: [[LandmarkPoint; EYE_POINTS]; 2],
    pub mouth: [LandmarkPoint; MOUTH_POINTS],
}

impl FaceLandmarks {
    /// Builds the record from 68 points in the standard face layout.
    pub fn from_68(points: &[LandmarkPoint; 68]) -> Self {
        let take = |start: usize| points[start];
        Self {
            jaw: std::array::from_fn(|i| take(i)),
            brows: [
                std::array::from_fn(|i| take(17 + i)),
                std::array::from_fn(|i| take(22 + i)),
            ],
            nose: std::array::from_fn(|i| take(27 + i)),
            eyes: [
                std::array::from_fn(|i| take(36 + i)),
                std::array::from_fn(|i| take(42 + i)),
            ],
            mouth: std::array::from_fn(|i| take(48 + i)),
        }
    }

    #[inline(always)]
    pub fn eye(&self, side: Side) -> &[LandmarkPoint; EYE_POINTS] {
        &self.eyes[side as usize]
    }

    #[inline(always)]
    pub fn brow(&self, side: Side) -> &[LandmarkPoint; BROW_POINTS] {
        &self.brows[side as usize]
    }

    pub fn eye_center(&self, side: Side) -> Vec2 {
        let eye = self.eye(side);
        (eye[EYE_CORNER_A].truncate() + eye[EYE_CORNER_B].truncate()) * 0.5
    }

    /// Midpoint between both eye centers.
    pub fn eyes_center(&self) -> Vec2 {
        (self.eye_center(Side::Left) + self.eye_center(Side::Right)) * 0.5
    }

    /// Distance between eye centers, the reference length for face-scale ratios.
    pub fn interocular(&self) -> f32 {
        self.eye_center(Side::Left)
            .distance(self.eye_center(Side::Right))
    }

    /// Eye corner nearest the temple.
    pub fn eye_outer_corner(&self, side: Side) -> Vec2 {
        match side {
            Side::Left => self.eye(side)[EYE_CORNER_A].truncate(),
            Side::Right => self.eye(side)[EYE_CORNER_B].truncate(),
        }
    }

    /// Eye corner nearest the nose.
    pub fn eye_inner_corner(&self, side: Side) -> Vec2 {
        match side {
            Side::Left => self.eye(side)[EYE_CORNER_B].truncate(),
            Side::Right => self.eye(side)[EYE_CORNER_A].truncate(),
        }
    }

    pub fn brow_outer(&self, side: Side) -> Vec2 {
        match side {
            Side::Left => self.brow(side)[0].truncate(),
            Side::Right => self.brow(side)[BROW_POINTS - 1].truncate(),
        }
    }

    pub fn brow_inner(&self, side: Side) -> Vec2 {
        match side {
            Side::Left => self.brow(side)[BROW_POINTS - 1].truncate(),
            Side::Right => self.brow(side)[0].truncate(),
        }
    }

    pub fn mouth_corner(&self, side: Side) -> Vec2 {
        match side {
            Side::Left => self.mouth[MOUTH_CORNER_LEFT].truncate(),
            Side::Right => self.mouth[MOUTH_CORNER_RIGHT].truncate(),
        }
    }

    pub fn mouth_width(&self) -> f32 {
        self.mouth_corner(Side::Left)
            .distance(self.mouth_corner(Side::Right))
    }

    pub fn nose_tip(&self) -> Vec2 {
        self.nose[NOSE_TIP].truncate()
    }

    pub fn chin(&self) -> Vec2 {
        self.jaw[CHIN].truncate()
    }

    pub fn is_finite(&self) -> bool {
        self.jaw
            .iter()
            .chain(self.brows.iter().flatten())
            .chain(self.nose.iter())
            .chain(self.eyes.iter().flatten())
            .chain(self.mouth.iter())
            .all(|p| p.is_finite())
    }
}

/// Coarse classifier output that some detectors report next to landmarks.
#[repr(usize)]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, EnumCount, EnumString, IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum Emotion {
    Happy,
    Sad,
    Angry,
    Fearful,
    Disgusted,
    Surprised,
    Neutral,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoarseEmotions {
    scores: [f32; Emotion::COUNT],
}

impl CoarseEmotions {
    #[inline(always)]
    pub fn get(&self, emotion: Emotion) -> f32 {
        self.scores[emotion as usize]
    }

    pub fn set(&mut self, emotion: Emotion, score: f32) {
        self.scores[emotion as usize] = if score.is_finite() {
            score.clamp(0., 1.)
        } else {
            0.
        };
    }

    /// Reads a detector's name→score map, ignoring names outside the vocabulary.
    pub fn from_scores<'a>(scores: impl IntoIterator<Item = (&'a str, f32)>) -> Self {
        let mut me = Self::default();
        for (name, score) in scores {
            match name.parse::<Emotion>() {
                Ok(emotion) => me.set(emotion, score),
                Err(_) => log::debug!("Ignoring unknown emotion {}", name),
            }
        }
        me
    }
}

/// Raw point as it arrives from a detector, before normalization.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(untagged)]
pub enum RawPoint {
    Named {
        x: f32,
        y: f32,
        #[serde(default)]
        z: f32,
    },
    Pair([f32; 2]),
    Triple([f32; 3]),
}

impl From<RawPoint> for LandmarkPoint {
    fn from(value: RawPoint) -> Self {
        match value {
            RawPoint::Named { x, y, z } => Vec3::new(x, y, z),
            RawPoint::Pair([x, y]) => Vec3::new(x, y, 0.),
            RawPoint::Triple([x, y, z]) => Vec3::new(x, y, z),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn test_resting_face_geometry() {
        let face = resting_face();
        assert!((face.interocular() - 60.).abs() < 1e-4);
        assert!((face.mouth_width() - 50.).abs() < 1e-4);
        assert_eq!(face.nose_tip(), Vec2::new(0., 30.));
        assert!(face.chin().y > 89.);
        assert!(face.is_finite());
    }

    #[test]
    fn test_corners_follow_side() {
        let face = resting_face();
        assert!(face.eye_outer_corner(Side::Left).x < face.eye_inner_corner(Side::Left).x);
        assert!(face.eye_outer_corner(Side::Right).x > face.eye_inner_corner(Side::Right).x);
        assert!(face.brow_outer(Side::Left).x < face.brow_inner(Side::Left).x);
        assert!(face.brow_outer(Side::Right).x > face.brow_inner(Side::Right).x);
    }

    #[test]
    fn test_emotions_ignore_unknown_names() {
        let emotions =
            CoarseEmotions::from_scores([("happy", 0.7), ("bored", 1.0), ("surprised", 2.0)]);
        assert_eq!(emotions.get(Emotion::Happy), 0.7);
        assert_eq!(emotions.get(Emotion::Surprised), 1.0);
        assert_eq!(emotions.get(Emotion::Sad), 0.0);
    }

    #[test]
    fn test_raw_point_shapes() {
        let named: RawPoint = serde_json::from_str(r#"{"x":0.5,"y":0.25}"#).unwrap();
        let pair: RawPoint = serde_json::from_str("[10, 20]").unwrap();
        assert_eq!(LandmarkPoint::from(named), Vec3::new(0.5, 0.25, 0.));
        assert_eq!(LandmarkPoint::from(pair), Vec3::new(10., 20., 0.));
    }
}
