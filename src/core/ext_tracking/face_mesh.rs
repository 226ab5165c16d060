use glam::{Vec2, Vec3};

use super::landmarks::{
    CoarseEmotions, Emotion, FaceLandmarks, LandmarkPoint, RawPoint, Side, MOUTH_LOWER_CENTER,
    MOUTH_UPPER_CENTER,
};
use crate::core::expression::{
    estimator::{eye_aspect_ratio, mouth_aspect_ratio},
    unit,
};

/// Face Mesh emits 468 points, or 478 with iris refinement.
pub const FACE_MESH_MIN_POINTS: usize = 468;

/// Mesh vertex standing in for each point of the 68-point face layout.
const FACE_MESH_TO_68: [usize; 68] = [
    // jaw
    162, 234, 93, 58, 172, 136, 149, 148, 152, 377, 378, 365, 397, 288, 323, 454, 389,
    // brows
    70, 63, 105, 66, 107, 336, 296, 334, 293, 300,
    // nose bridge, nostrils
    168, 197, 5, 4, 75, 97, 2, 326, 305,
    // eyes
    33, 160, 158, 133, 153, 144, 362, 385, 387, 263, 373, 380,
    // outer lips
    61, 39, 37, 0, 267, 269, 291, 405, 314, 17, 84, 181,
    // inner lips
    78, 82, 13, 312, 308, 317, 14, 87,
];

/// Face Mesh points are fractions of the frame width and height. Every ratio
/// downstream assumes square pixels, so points are scaled back to pixels first.
pub(crate) fn face_mesh_to_canonical(
    mesh: &[RawPoint],
    width: f32,
    height: f32,
) -> Option<FaceLandmarks> {
    if mesh.len() < FACE_MESH_MIN_POINTS {
        log::warn!(
            "Face mesh has {} points, expected at least {}",
            mesh.len(),
            FACE_MESH_MIN_POINTS
        );
        return None;
    }
    if !(width.is_finite() && height.is_finite() && width > 0. && height > 0.) {
        log::warn!("Face mesh frame size {}x{} is unusable", width, height);
        return None;
    }

    // z shares the x scale in Face Mesh output
    let frame = Vec3::new(width, height, width);
    let getp = |i: usize| -> LandmarkPoint { LandmarkPoint::from(mesh[FACE_MESH_TO_68[i]]) * frame };
    let points: [LandmarkPoint; 68] = std::array::from_fn(getp);

    Some(FaceLandmarks::from_68(&points))
}

const OPEN_REST: f32 = 0.06;
const OPEN_GAIN: f32 = 5.0;
const EYE_OPEN: f32 = 0.30;
const EYE_CLOSED: f32 = 0.12;
/// Corner travel, in mouth widths, that reads as a full smile or frown.
const CORNER_RANGE: f32 = 0.25;
const BROW_REST: f32 = 0.35;
const BROW_KNIT_RANGE: f32 = 0.15;
const PUCKER_REST: f32 = 0.8;
const PUCKER_RANGE: f32 = 0.25;

/// Face Mesh has no classifier head, so coarse emotions are read off the
/// geometry: corner lift, mouth opening, knitted brows and narrowed lips.
pub(crate) fn face_mesh_emotions(face: &FaceLandmarks) -> CoarseEmotions {
    let mut emotions = CoarseEmotions::default();

    let across = face.eye_center(Side::Right) - face.eye_center(Side::Left);
    let scale = across.length();
    if !scale.is_finite() || scale <= f32::EPSILON {
        return emotions;
    }
    let down = (across / scale).perp();
    let below = |from: Vec2, to: Vec2| (to - from).dot(down);

    let openness = mouth_aspect_ratio(face)
        .map(|mar| unit((mar - OPEN_REST) * OPEN_GAIN))
        .unwrap_or(0.);
    let blink = |side: Side| {
        eye_aspect_ratio(face.eye(side))
            .map(|ear| unit((EYE_OPEN - ear) / (EYE_OPEN - EYE_CLOSED)))
            .unwrap_or(0.)
    };

    let width = face.mouth_width();
    let center = (face.mouth[MOUTH_UPPER_CENTER].truncate()
        + face.mouth[MOUTH_LOWER_CENTER].truncate())
        * 0.5;
    let lift = -(below(center, face.mouth_corner(Side::Left))
        + below(center, face.mouth_corner(Side::Right)))
        * 0.5
        / (width * CORNER_RANGE);

    let inner_height = (below(face.brow_inner(Side::Left), face.eye_inner_corner(Side::Left))
        + below(face.brow_inner(Side::Right), face.eye_inner_corner(Side::Right)))
        * 0.5
        / scale;
    let pucker = unit((PUCKER_REST - width / scale) / PUCKER_RANGE);

    emotions.set(Emotion::Happy, unit(lift));
    emotions.set(Emotion::Sad, unit(-lift));
    emotions.set(Emotion::Surprised, unit(openness * 2.));
    emotions.set(Emotion::Fearful, unit(openness * 1.5));
    emotions.set(
        Emotion::Angry,
        unit((BROW_REST - inner_height) / BROW_KNIT_RANGE) * 0.8,
    );
    emotions.set(Emotion::Disgusted, pucker * 0.6);
    emotions.set(
        Emotion::Neutral,
        1. - openness.max(blink(Side::Left)).max(blink(Side::Right)),
    );
    emotions
}


#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::testing::mesh_from_pixels;
    use super::*;
    use crate::core::{
        expression::{
            estimator::{estimate, EstimatorTuning},
            ExpressionChannel,
        },
        ext_tracking::landmarks::{testing::FaceBuilder, NOSE_TIP},
    };

    fn mesh_with(n: usize) -> Vec<RawPoint> {
        (0..n)
            .map(|i| RawPoint::Triple([i as f32, (i * 2) as f32, 0.]))
            .collect()
    }

    fn wide_frame(builder: FaceBuilder) -> FaceLandmarks {
        let mesh = mesh_from_pixels(&builder.points(), 1280., 720.);
        face_mesh_to_canonical(&mesh, 1280., 720.).unwrap()
    }

    #[test]
    fn test_short_mesh_is_rejected() {
        assert!(face_mesh_to_canonical(&mesh_with(100), 1., 1.).is_none());
    }

    #[test]
    fn test_bad_frame_size_is_rejected() {
        assert!(face_mesh_to_canonical(&mesh_with(478), 0., 720.).is_none());
        assert!(face_mesh_to_canonical(&mesh_with(478), 1280., f32::NAN).is_none());
    }

    #[test]
    fn test_mesh_picks_representative_vertices() {
        let face = face_mesh_to_canonical(&mesh_with(478), 1., 1.).unwrap();
        assert_eq!(face.nose[NOSE_TIP], Vec3::new(4., 8., 0.));
        assert_eq!(face.jaw[8], Vec3::new(152., 304., 0.));
        assert_eq!(face.mouth[0], Vec3::new(61., 122., 0.));
        assert_eq!(face.eyes[1][3], Vec3::new(263., 526., 0.));
    }

    #[test]
    fn test_vertex_table_stays_in_range() {
        assert!(FACE_MESH_TO_68.iter().all(|&i| i < FACE_MESH_MIN_POINTS));
    }

    #[test]
    fn test_wide_frame_restores_pixel_geometry() {
        let face = wide_frame(FaceBuilder::default());
        assert!((face.interocular() - 60.).abs() < 1e-2);
        assert!((face.mouth_width() - 50.).abs() < 1e-2);
    }

    #[test]
    fn test_wide_frame_keeps_thresholds() {
        let tuning = EstimatorTuning::default();

        // 3 / 50 = 0.06
        let rest = wide_frame(FaceBuilder::default());
        let frame = estimate(&rest, Some(&face_mesh_emotions(&rest)), &tuning);
        assert!(frame.getx(ExpressionChannel::MouthOpen) < 1e-3);
        assert!(frame.getx(ExpressionChannel::EyeBlinkLeft) < 1e-3);

        // 3 / 30 = 0.10
        let closed = wide_frame(FaceBuilder {
            eye_gap: [3., 3.],
            ..Default::default()
        });
        let frame = estimate(&closed, Some(&face_mesh_emotions(&closed)), &tuning);
        assert!((frame.getx(ExpressionChannel::EyeBlinkLeft) - 1.0).abs() < 1e-3);
        assert!((frame.getx(ExpressionChannel::EyeBlinkRight) - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_resting_face_reads_neutral() {
        let emotions = face_mesh_emotions(&wide_frame(FaceBuilder::default()));
        assert!((emotions.get(Emotion::Neutral) - 1.).abs() < 1e-3);
        for emotion in [
            Emotion::Happy,
            Emotion::Sad,
            Emotion::Angry,
            Emotion::Fearful,
            Emotion::Disgusted,
            Emotion::Surprised,
        ] {
            assert!(emotions.get(emotion) < 1e-3, "{:?} at rest", emotion);
        }
    }

    #[test]
    fn test_geometry_drives_emotions() {
        let smiling = face_mesh_emotions(&wide_frame(FaceBuilder {
            corner_lift: [12.5, 12.5],
            ..Default::default()
        }));
        assert!(smiling.get(Emotion::Happy) > 0.9);
        assert_eq!(smiling.get(Emotion::Sad), 0.);

        let gaping = face_mesh_emotions(&wide_frame(FaceBuilder {
            mouth_gap: 15.,
            outer_lip_gap: 28.,
            ..Default::default()
        }));
        assert_eq!(gaping.get(Emotion::Surprised), 1.);
        assert_eq!(gaping.get(Emotion::Fearful), 1.);
        assert_eq!(gaping.get(Emotion::Neutral), 0.);

        // inner brows pulled down to the eye line
        let scowling = face_mesh_emotions(&wide_frame(FaceBuilder {
            brow_lift: [-12., -12.],
            ..Default::default()
        }));
        assert!((scowling.get(Emotion::Angry) - 0.8).abs() < 1e-3);
    }
}
