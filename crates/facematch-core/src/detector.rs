//! SCRFD landmark backend via ONNX Runtime.
//!
//! Runs the SCRFD (Sample and Computation Redistribution for Efficient Face
//! Detection) model with 3-stride anchor-free decoding and NMS, and reports
//! its five keypoints (eyes, nose, mouth corners) as a normalized landmark set.

use crate::extractor::{ExtractError, GrayImage, LandmarkExtractor};
use crate::types::{LandmarkSet, NormalizedBox, NormalizedPoint};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;

const SCRFD_INPUT_SIZE: usize = 640;
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_CONFIDENCE_THRESHOLD: f32 = 0.5;
const SCRFD_NMS_THRESHOLD: f64 = 0.4;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;
const SCRFD_KEYPOINTS: usize = 5;

/// Minimum overlap for a fresh detection to count as a requested face.
const FACE_MATCH_IOU: f64 = 0.3;

/// Scale and padding applied when fitting a frame into the square input.
#[derive(Debug, Clone, Copy)]
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

impl Letterbox {
    fn fit(width: usize, height: usize) -> Self {
        let side = SCRFD_INPUT_SIZE as f32;
        let scale = (side / width as f32).min(side / height as f32);
        let new_w = (width as f32 * scale).round();
        let new_h = (height as f32 * scale).round();
        Self {
            scale,
            pad_x: (SCRFD_INPUT_SIZE as f32 - new_w) / 2.0,
            pad_y: (SCRFD_INPUT_SIZE as f32 - new_h) / 2.0,
        }
    }

    /// Letterboxed input coordinates → original frame pixels.
    fn unmap(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// One decoded face, normalized to the frame.
#[derive(Debug, Clone)]
struct Detection {
    face: NormalizedBox,
    confidence: f32,
    /// Keypoints normalized to the frame (not the box).
    keypoints: [(f64, f64); SCRFD_KEYPOINTS],
}

/// Output tensor indices for one stride: (score_idx, bbox_idx, kps_idx).
type StrideOutputs = (usize, usize, usize);

/// SCRFD-backed [`LandmarkExtractor`] working on grayscale frames.
pub struct ScrfdExtractor {
    session: Session,
    stride_outputs: [StrideOutputs; 3],
}

impl ScrfdExtractor {
    /// Load the SCRFD ONNX model from the given path.
    pub fn load(model_path: impl AsRef<Path>) -> Result<Self, ExtractError> {
        let model_path = model_path.as_ref();
        if !model_path.exists() {
            return Err(ExtractError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> =
            session.outputs().iter().map(|o| o.name().to_string()).collect();

        tracing::info!(
            path = %model_path.display(),
            outputs = ?output_names,
            "loaded SCRFD model"
        );

        if output_names.len() < 9 {
            return Err(ExtractError::InferenceFailed(format!(
                "SCRFD model requires 9 outputs (3 strides × score/bbox/kps), got {}",
                output_names.len()
            )));
        }

        let stride_outputs = discover_output_indices(&output_names);
        tracing::debug!(?stride_outputs, "SCRFD output tensor mapping");

        Ok(Self { session, stride_outputs })
    }

    /// Run the model on `image`; detections sorted by confidence, best first.
    fn detect(&mut self, image: &GrayImage) -> Result<Vec<Detection>, ExtractError> {
        let width = image.width() as usize;
        let height = image.height() as usize;
        let letterbox = Letterbox::fit(width, height);
        let input = to_input_tensor(image.data(), width, height, &letterbox)?;

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut detections = Vec::new();
        let strides = SCRFD_STRIDES.iter().zip(&self.stride_outputs);
        for (&stride, &(score_idx, bbox_idx, kps_idx)) in strides {
            let extract = |idx: usize, what: &str| {
                outputs[idx]
                    .try_extract_tensor::<f32>()
                    .map(|(_, data)| data)
                    .map_err(|e| {
                        ExtractError::InferenceFailed(format!("{what} stride {stride}: {e}"))
                    })
            };
            let raw = RawStride {
                stride,
                scores: extract(score_idx, "scores")?,
                bboxes: extract(bbox_idx, "bboxes")?,
                kps: extract(kps_idx, "kps")?,
            };
            detections.extend(raw.decode(&letterbox, width as f32, height as f32));
        }

        let kept = nms(detections, SCRFD_NMS_THRESHOLD);
        tracing::debug!(faces = kept.len(), "SCRFD detection");
        Ok(kept)
    }
}

impl LandmarkExtractor for ScrfdExtractor {
    type Input = GrayImage;

    fn detect_faces(&mut self, image: &GrayImage) -> Result<Vec<NormalizedBox>, ExtractError> {
        Ok(self.detect(image)?.into_iter().map(|d| d.face).collect())
    }

    fn detect_landmarks(
        &mut self,
        image: &GrayImage,
        faces: &[NormalizedBox],
    ) -> Result<Vec<LandmarkSet>, ExtractError> {
        let detections = self.detect(image)?;
        faces
            .iter()
            .map(|face| {
                let matched =
                    best_match(face, &detections).ok_or(ExtractError::NoLandmarksDetected)?;
                relative_to(face, &matched.keypoints).ok_or(ExtractError::NoLandmarksDetected)
            })
            .collect()
    }
}

/// Raw tensors for one stride level.
struct RawStride<'a> {
    stride: usize,
    scores: &'a [f32],
    bboxes: &'a [f32],
    kps: &'a [f32],
}

impl RawStride<'_> {
    fn decode(&self, letterbox: &Letterbox, frame_w: f32, frame_h: f32) -> Vec<Detection> {
        let stride = self.stride as f32;
        let grid_w = SCRFD_INPUT_SIZE / self.stride;
        let grid_h = SCRFD_INPUT_SIZE / self.stride;
        let num_anchors = grid_w * grid_h * SCRFD_ANCHORS_PER_CELL;
        let normalize = |(x, y): (f32, f32)| ((x / frame_w) as f64, (y / frame_h) as f64);

        let mut detections = Vec::new();
        for idx in 0..num_anchors {
            let confidence = self.scores.get(idx).copied().unwrap_or(0.0);
            if confidence <= SCRFD_CONFIDENCE_THRESHOLD {
                continue;
            }
            let (Some(bbox), Some(kps)) = (
                self.bboxes.get(idx * 4..idx * 4 + 4),
                self.kps.get(idx * 10..idx * 10 + 10),
            ) else {
                continue;
            };

            let cell = idx / SCRFD_ANCHORS_PER_CELL;
            let anchor_x = (cell % grid_w) as f32 * stride;
            let anchor_y = (cell / grid_w) as f32 * stride;

            // Distances from the anchor to each edge, in stride units
            let (x1, y1) =
                letterbox.unmap(anchor_x - bbox[0] * stride, anchor_y - bbox[1] * stride);
            let (x2, y2) =
                letterbox.unmap(anchor_x + bbox[2] * stride, anchor_y + bbox[3] * stride);

            let mut keypoints = [(0.0, 0.0); SCRFD_KEYPOINTS];
            for (k, point) in keypoints.iter_mut().enumerate() {
                let px = anchor_x + kps[k * 2] * stride;
                let py = anchor_y + kps[k * 2 + 1] * stride;
                *point = normalize(letterbox.unmap(px, py));
            }

            let (nx1, ny1) = normalize((x1, y1));
            let (nx2, ny2) = normalize((x2, y2));
            detections.push(Detection {
                face: NormalizedBox::new(nx1, ny1, nx2 - nx1, ny2 - ny1),
                confidence,
                keypoints,
            });
        }
        detections
    }
}

/// Letterbox a grayscale frame into a normalized NCHW tensor.
///
/// Bilinear resize; padding uses the mean so it normalizes to 0.0, and the
/// gray channel is replicated into all three inputs.
fn to_input_tensor(
    frame: &[u8],
    width: usize,
    height: usize,
    letterbox: &Letterbox,
) -> Result<Array4<f32>, ExtractError> {
    if width == 0 || height == 0 || frame.len() != width * height {
        return Err(ExtractError::InvalidImage(format!(
            "{} bytes do not describe a {width}x{height} frame",
            frame.len()
        )));
    }
    let new_w = (width as f32 * letterbox.scale).round() as usize;
    let new_h = (height as f32 * letterbox.scale).round() as usize;
    let pad_x = letterbox.pad_x.floor() as usize;
    let pad_y = letterbox.pad_y.floor() as usize;
    let resized = resize_bilinear(frame, width, height, new_w, new_h);

    let mut tensor = Array4::<f32>::from_elem((1, 3, SCRFD_INPUT_SIZE, SCRFD_INPUT_SIZE), 0.0);
    for y in 0..new_h.min(SCRFD_INPUT_SIZE - pad_y) {
        for x in 0..new_w.min(SCRFD_INPUT_SIZE - pad_x) {
            let value = (resized[y * new_w + x] as f32 - SCRFD_MEAN) / SCRFD_STD;
            for c in 0..3 {
                tensor[[0, c, y + pad_y, x + pad_x]] = value;
            }
        }
    }
    Ok(tensor)
}

/// `src` must hold exactly `width * height` pixels, both non-zero.
fn resize_bilinear(
    src: &[u8],
    width: usize,
    height: usize,
    new_w: usize,
    new_h: usize,
) -> Vec<u8> {
    let sx = width as f32 / new_w.max(1) as f32;
    let sy = height as f32 / new_h.max(1) as f32;
    // Source sample index and weight of the next sample along one axis.
    let sample = |dst: usize, scale: f32, len: usize| {
        let src = ((dst as f32 + 0.5) * scale - 0.5).max(0.0);
        let i0 = (src.floor() as usize).min(len - 1);
        let i1 = (i0 + 1).min(len - 1);
        (i0, i1, (src - i0 as f32).clamp(0.0, 1.0))
    };

    let mut out = vec![0u8; new_w * new_h];
    for y in 0..new_h {
        let (y0, y1, fy) = sample(y, sy, height);
        for x in 0..new_w {
            let (x0, x1, fx) = sample(x, sx, width);
            let px = |xx: usize, yy: usize| src[yy * width + xx] as f32;
            let top = px(x0, y0) * (1.0 - fx) + px(x1, y0) * fx;
            let bottom = px(x0, y1) * (1.0 - fx) + px(x1, y1) * fx;
            let value = top * (1.0 - fy) + bottom * fy;
            out[y * new_w + x] = value.round().clamp(0.0, 255.0) as u8;
        }
    }
    out
}

/// Map output tensors to strides by name ("score_8", "bbox_16", "kps_32"...),
/// falling back to the standard positional layout
/// [scores 8/16/32, bboxes 8/16/32, kps 8/16/32] for numerically named exports.
fn discover_output_indices(names: &[String]) -> [StrideOutputs; 3] {
    let find = |prefix: &str, stride: usize| {
        let target = format!("{prefix}_{stride}");
        names.iter().position(|n| *n == target)
    };
    let named = |stride: usize| {
        Some((find("score", stride)?, find("bbox", stride)?, find("kps", stride)?))
    };

    match (named(8), named(16), named(32)) {
        (Some(s8), Some(s16), Some(s32)) => [s8, s16, s32],
        _ => {
            tracing::info!(?names, "SCRFD: output names not recognized, using positional mapping");
            [(0, 3, 6), (1, 4, 7), (2, 5, 8)]
        }
    }
}

/// Greedy non-maximum suppression; survivors sorted by confidence.
fn nms(mut detections: Vec<Detection>, iou_threshold: f64) -> Vec<Detection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<Detection> = Vec::with_capacity(detections.len());
    for det in detections {
        if keep.iter().all(|k| k.face.iou(&det.face) <= iou_threshold) {
            keep.push(det);
        }
    }
    keep
}

/// The detection overlapping `face` the most, if it overlaps enough.
fn best_match<'a>(face: &NormalizedBox, detections: &'a [Detection]) -> Option<&'a Detection> {
    detections
        .iter()
        .map(|d| (face.iou(&d.face), d))
        .filter(|(iou, _)| *iou >= FACE_MATCH_IOU)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, d)| d)
}

/// Re-express frame-normalized keypoints relative to `face`.
fn relative_to(face: &NormalizedBox, keypoints: &[(f64, f64)]) -> Option<LandmarkSet> {
    if face.width <= 0.0 || face.height <= 0.0 {
        return None;
    }
    Some(
        keypoints
            .iter()
            .map(|&(x, y)| {
                NormalizedPoint::new((x - face.x) / face.width, (y - face.y) / face.height)
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x: f64, y: f64, w: f64, h: f64, confidence: f32) -> Detection {
        Detection {
            face: NormalizedBox::new(x, y, w, h),
            confidence,
            keypoints: [(x, y); SCRFD_KEYPOINTS],
        }
    }

    #[test]
    fn test_load_missing_model() {
        let err = ScrfdExtractor::load("/nonexistent/det_10g.onnx").err().unwrap();
        assert!(matches!(err, ExtractError::ModelNotFound(_)));
    }

    #[test]
    fn test_nms_suppresses_overlapping() {
        let detections = vec![
            det(0.0, 0.0, 0.1, 0.1, 0.8),
            det(0.005, 0.005, 0.1, 0.1, 0.9),
            det(0.5, 0.5, 0.05, 0.05, 0.7),
        ];
        let result = nms(detections, 0.4);
        assert_eq!(result.len(), 2);
        assert!((result[0].confidence - 0.9).abs() < 1e-6);
        assert!((result[1].confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_nms_empty() {
        assert!(nms(vec![], 0.4).is_empty());
    }

    #[test]
    fn test_letterbox_roundtrip() {
        let letterbox = Letterbox::fit(320, 240);
        assert!((letterbox.scale - 2.0).abs() < 1e-6);
        assert!(letterbox.pad_x.abs() < 1e-6);
        assert!((letterbox.pad_y - 80.0).abs() < 1e-6);

        let (x, y) = letterbox.unmap(
            100.0 * letterbox.scale + letterbox.pad_x,
            50.0 * letterbox.scale + letterbox.pad_y,
        );
        assert!((x - 100.0).abs() < 0.01, "x: {x}");
        assert!((y - 50.0).abs() < 0.01, "y: {y}");
    }

    #[test]
    fn test_input_tensor_pads_to_zero() {
        let frame = vec![255u8; 320 * 240];
        let letterbox = Letterbox::fit(320, 240);
        let tensor = to_input_tensor(&frame, 320, 240, &letterbox).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, SCRFD_INPUT_SIZE, SCRFD_INPUT_SIZE]);
        // Top padding band
        assert_eq!(tensor[[0, 0, 10, 320]], 0.0);
        // Image content, replicated over channels
        let expected = (255.0 - SCRFD_MEAN) / SCRFD_STD;
        assert!((tensor[[0, 0, 320, 320]] - expected).abs() < 1e-6);
        assert_eq!(tensor[[0, 0, 320, 320]], tensor[[0, 2, 320, 320]]);
    }

    #[test]
    fn test_input_tensor_rejects_short_frame() {
        // 10 bytes claimed as 100x100: resizing would read past the buffer
        let letterbox = Letterbox::fit(100, 100);
        let err = to_input_tensor(&[0u8; 10], 100, 100, &letterbox).unwrap_err();
        assert!(matches!(err, ExtractError::InvalidImage(_)), "{err}");

        let err = to_input_tensor(&[], 0, 100, &Letterbox::fit(1, 100)).unwrap_err();
        assert!(matches!(err, ExtractError::InvalidImage(_)), "{err}");
    }

    #[test]
    fn test_resize_uniform_stays_uniform() {
        let frame = vec![128u8; 100 * 100];
        let resized = resize_bilinear(&frame, 100, 100, 200, 150);
        assert_eq!(resized.len(), 200 * 150);
        assert!(resized.iter().all(|&p| p == 128));
    }

    #[test]
    fn test_decode_single_anchor() {
        // Stride 32 grid is 20x20 cells, 2 anchors each; light up anchor 0
        // of cell (x=2, y=3) with a box one stride wide on each side.
        let stride = 32usize;
        let cells = (SCRFD_INPUT_SIZE / stride).pow(2) * SCRFD_ANCHORS_PER_CELL;
        let idx = (3 * 20 + 2) * SCRFD_ANCHORS_PER_CELL;

        let mut scores = vec![0.0f32; cells];
        let mut bboxes = vec![0.0f32; cells * 4];
        let mut kps = vec![0.0f32; cells * 10];
        scores[idx] = 0.9;
        bboxes[idx * 4..idx * 4 + 4].copy_from_slice(&[1.0, 1.0, 1.0, 1.0]);

        let raw = RawStride { stride, scores: &scores, bboxes: &bboxes, kps: &kps };
        let letterbox = Letterbox::fit(640, 640);
        let out = raw.decode(&letterbox, 640.0, 640.0);

        assert_eq!(out.len(), 1);
        let face = out[0].face;
        // Anchor at (64, 96), box spans ±32 px
        assert!((face.x - 32.0 / 640.0).abs() < 1e-6);
        assert!((face.y - 64.0 / 640.0).abs() < 1e-6);
        assert!((face.width - 0.1).abs() < 1e-6);
        assert!((face.height - 0.1).abs() < 1e-6);
        assert!((out[0].keypoints[0].0 - 64.0 / 640.0).abs() < 1e-6);

        kps.clear();
        let truncated = RawStride { stride, scores: &scores, bboxes: &bboxes, kps: &kps };
        assert!(truncated.decode(&letterbox, 640.0, 640.0).is_empty());
    }

    #[test]
    fn test_discover_output_indices_named() {
        let names: Vec<String> = [
            "bbox_8", "kps_8", "score_8",
            "bbox_16", "kps_16", "score_16",
            "bbox_32", "kps_32", "score_32",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let indices = discover_output_indices(&names);
        assert_eq!(indices, [(2, 0, 1), (5, 3, 4), (8, 6, 7)]);
    }

    #[test]
    fn test_discover_output_indices_positional_fallback() {
        let names: Vec<String> = (0..9).map(|i: usize| i.to_string()).collect();
        assert_eq!(discover_output_indices(&names), [(0, 3, 6), (1, 4, 7), (2, 5, 8)]);
    }

    #[test]
    fn test_best_match_picks_highest_overlap() {
        let detections = vec![
            det(0.0, 0.0, 0.2, 0.2, 0.9),
            det(0.5, 0.5, 0.2, 0.2, 0.8),
        ];
        let face = NormalizedBox::new(0.51, 0.5, 0.2, 0.2);
        let matched = best_match(&face, &detections).unwrap();
        assert!((matched.confidence - 0.8).abs() < 1e-6);

        let elsewhere = NormalizedBox::new(0.8, 0.0, 0.1, 0.1);
        assert!(best_match(&elsewhere, &detections).is_none());
    }

    #[test]
    fn test_relative_to_face_box() {
        let face = NormalizedBox::new(0.2, 0.4, 0.5, 0.25);
        let set = relative_to(&face, &[(0.45, 0.525), (0.2, 0.4)]).unwrap();
        assert!((set[0].x - 0.5).abs() < 1e-9);
        assert!((set[0].y - 0.5).abs() < 1e-9);
        assert_eq!(set[1], NormalizedPoint::new(0.0, 0.0));

        let flat = NormalizedBox::new(0.2, 0.4, 0.0, 0.25);
        assert!(relative_to(&flat, &[(0.2, 0.4)]).is_none());
    }
}
