use std::collections::HashMap;

use super::landmarks::{CoarseEmotions, FaceLandmarks, LandmarkPoint, RawPoint};

pub const FACE_API_POINTS: usize = 68;

/// face-api.js already reports the 68-point layout, so points copy across as-is.
pub(crate) fn face_api_to_canonical(positions: &[RawPoint]) -> Option<FaceLandmarks> {
    let Ok(positions) = <&[RawPoint; FACE_API_POINTS]>::try_from(positions) else {
        log::warn!(
            "face-api result has {} points, expected {}",
            positions.len(),
            FACE_API_POINTS
        );
        return None;
    };

    let points: [LandmarkPoint; FACE_API_POINTS] = (*positions).map(LandmarkPoint::from);
    Some(FaceLandmarks::from_68(&points))
}

pub(crate) fn face_api_emotions(expressions: &HashMap<String, f32>) -> Option<CoarseEmotions> {
    if expressions.is_empty() {
        return None;
    }
    Some(CoarseEmotions::from_scores(
        expressions.iter().map(|(k, v)| (k.as_str(), *v)),
    ))
}
