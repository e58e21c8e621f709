//! facematch-core — Landmark-based face comparison engine.
//!
//! Maps detector-reported normalized landmarks into a shared canvas,
//! holds the reference and candidate point sets in a two-slot comparator,
//! and scores them by mean Euclidean distance against a threshold.
//!
//! Face detection itself is a pluggable [`LandmarkExtractor`]; an SCRFD
//! backend (ONNX Runtime) and a JSON fixture backend are bundled.

pub mod comparator;
pub mod detector;
pub mod extractor;
pub mod fixture;
pub mod mapper;
pub mod scorer;
pub mod types;

pub use comparator::{ComparatorError, ComparatorState, FaceComparator, SlotOutcome, Transition};
pub use detector::ScrfdExtractor;
pub use extractor::{extract_face_points, ExtractError, GrayImage, LandmarkExtractor};
pub use fixture::{Detections, JsonExtractor, RecordedFace};
pub use mapper::{map_box, map_face, map_points};
pub use scorer::{ScoreError, SimilarityScorer, DEFAULT_THRESHOLD};
pub use types::{
    AbsoluteBox, AbsolutePoint, CanvasSize, Classification, ComparisonResult, LandmarkSet,
    NormalizedBox, NormalizedPoint, Slot,
};
