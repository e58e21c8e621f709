//! Vision backend seam and the per-image extraction pipeline.
//!
//! A backend reports face boxes normalized to the image and, for faces it
//! is handed back, landmark sets normalized to each face box. The pipeline
//! picks the backend's first (best) face and maps it into the canvas.

use crate::mapper::map_face;
use crate::types::{AbsolutePoint, CanvasSize, LandmarkSet, NormalizedBox};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("no face detected")]
    NoFaceDetected,
    #[error("no landmarks detected")]
    NoLandmarksDetected,
    #[error("model file not found: {0} (download det_10g.onnx from insightface)")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("invalid image: {0}")]
    InvalidImage(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("detections document: {0}")]
    Json(#[from] serde_json::Error),
}

/// An 8-bit grayscale image, row-major, one byte per pixel.
#[derive(Debug, Clone)]
pub struct GrayImage {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl GrayImage {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Result<Self, ExtractError> {
        let expected = width as usize * height as usize;
        if width == 0 || height == 0 {
            return Err(ExtractError::InvalidImage(format!("empty image {width}x{height}")));
        }
        if data.len() != expected {
            return Err(ExtractError::InvalidImage(format!(
                "expected {expected} bytes for {width}x{height}, got {}",
                data.len()
            )));
        }
        Ok(Self { data, width, height })
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

/// Face and landmark detection capability.
///
/// Faces are passed explicitly to [`detect_landmarks`](Self::detect_landmarks);
/// implementations keep no per-request state between the two calls.
pub trait LandmarkExtractor {
    /// What the backend detects on: pixels for a model, a document for a
    /// replayed detection.
    type Input: ?Sized;

    /// Face boxes normalized to the input's extent, best face first.
    fn detect_faces(&mut self, input: &Self::Input) -> Result<Vec<NormalizedBox>, ExtractError>;

    /// One landmark set per face in `faces`, in the same order, each
    /// normalized to its own face box.
    fn detect_landmarks(
        &mut self,
        input: &Self::Input,
        faces: &[NormalizedBox],
    ) -> Result<Vec<LandmarkSet>, ExtractError>;
}

/// Detect the best face in `input` and return its landmarks in canvas
/// units, ready for a comparator slot.
pub fn extract_face_points<E>(
    extractor: &mut E,
    input: &E::Input,
    canvas: CanvasSize,
) -> Result<Vec<AbsolutePoint>, ExtractError>
where
    E: LandmarkExtractor + ?Sized,
{
    let faces = extractor.detect_faces(input)?;
    let Some(face) = faces.first().copied() else {
        return Err(ExtractError::NoFaceDetected);
    };
    tracing::debug!(faces = faces.len(), ?face, "faces detected");

    let landmarks = extractor.detect_landmarks(input, &[face])?;
    let Some(points) = landmarks.first().filter(|set| !set.is_empty()) else {
        return Err(ExtractError::NoLandmarksDetected);
    };

    let mapped = map_face(&face, points, canvas);
    tracing::debug!(points = mapped.len(), %canvas, "landmarks mapped to canvas");
    Ok(mapped)
}
