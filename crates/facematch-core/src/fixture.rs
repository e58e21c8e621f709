//! Replays detections recorded as JSON.
//!
//! ```json
//! { "faces": [ { "box": { "x": 0.1, "y": 0.1, "width": 0.5, "height": 0.5 },
//!                "landmarks": [ { "x": 0.5, "y": 0.5 } ] } ] }
//! ```
//!
//! Useful for exercising the comparison pipeline without a model, and for
//! comparing landmarks produced by a backend that is not linked in.

use crate::extractor::{ExtractError, LandmarkExtractor};
use crate::types::{LandmarkSet, NormalizedBox};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedFace {
    #[serde(rename = "box")]
    pub face: NormalizedBox,
    #[serde(default)]
    pub landmarks: LandmarkSet,
}

/// A detections document for one image, faces best first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Detections {
    pub faces: Vec<RecordedFace>,
}

impl Detections {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ExtractError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let detections: Detections = serde_json::from_str(&raw)?;
        tracing::debug!(
            path = %path.as_ref().display(),
            faces = detections.faces.len(),
            "loaded recorded detections"
        );
        Ok(detections)
    }
}

/// [`LandmarkExtractor`] over recorded [`Detections`].
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonExtractor;

impl LandmarkExtractor for JsonExtractor {
    type Input = Detections;

    fn detect_faces(&mut self, input: &Detections) -> Result<Vec<NormalizedBox>, ExtractError> {
        Ok(input.faces.iter().map(|f| f.face).collect())
    }

    fn detect_landmarks(
        &mut self,
        input: &Detections,
        faces: &[NormalizedBox],
    ) -> Result<Vec<LandmarkSet>, ExtractError> {
        faces
            .iter()
            .map(|face| {
                input
                    .faces
                    .iter()
                    .find(|recorded| recorded.face == *face && !recorded.landmarks.is_empty())
                    .map(|recorded| recorded.landmarks.clone())
                    .ok_or(ExtractError::NoLandmarksDetected)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::extract_face_points;
    use crate::types::{CanvasSize, NormalizedPoint};
    use std::io::Write;

    const DOC: &str = r#"{
        "faces": [
            { "box": { "x": 0.1, "y": 0.1, "width": 0.5, "height": 0.5 },
              "landmarks": [ { "x": 0.5, "y": 0.5 }, { "x": 0.25, "y": 0.75 } ] },
            { "box": { "x": 0.7, "y": 0.7, "width": 0.1, "height": 0.1 } }
        ]
    }"#;

    #[test]
    fn test_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(DOC.as_bytes()).unwrap();

        let detections = Detections::from_path(file.path()).unwrap();
        assert_eq!(detections.faces.len(), 2);
        assert_eq!(detections.faces[0].landmarks[1], NormalizedPoint::new(0.25, 0.75));
        assert!(detections.faces[1].landmarks.is_empty());
    }

    #[test]
    fn test_from_path_rejects_garbage() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{ \"faces\": 3 }").unwrap();
        assert!(matches!(Detections::from_path(file.path()), Err(ExtractError::Json(_))));
        assert!(matches!(
            Detections::from_path("/nonexistent/detections.json"),
            Err(ExtractError::Io(_))
        ));
    }

    #[test]
    fn test_landmarks_follow_requested_faces() {
        let detections: Detections = serde_json::from_str(DOC).unwrap();
        let mut extractor = JsonExtractor;

        let faces = extractor.detect_faces(&detections).unwrap();
        assert_eq!(faces.len(), 2);

        let sets = extractor.detect_landmarks(&detections, &faces[..1]).unwrap();
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].len(), 2);

        let err = extractor.detect_landmarks(&detections, &faces[1..]).unwrap_err();
        assert!(matches!(err, ExtractError::NoLandmarksDetected));
    }

    #[test]
    fn test_pipeline_over_recorded_faces() {
        let detections: Detections = serde_json::from_str(DOC).unwrap();
        let points =
            extract_face_points(&mut JsonExtractor, &detections, CanvasSize::default()).unwrap();
        assert_eq!(points.len(), 2);
        assert!((points[0].x - 262.5).abs() < 1e-9);
        assert!((points[1].x - 168.75).abs() < 1e-9);
        assert!((points[1].y - 356.25).abs() < 1e-9);
    }

    #[test]
    fn test_no_faces_recorded() {
        let empty = Detections::default();
        let err =
            extract_face_points(&mut JsonExtractor, &empty, CanvasSize::default()).unwrap_err();
        assert!(matches!(err, ExtractError::NoFaceDetected));
    }
}
