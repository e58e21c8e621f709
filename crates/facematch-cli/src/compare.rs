//! Runs both images through an extractor concurrently and feeds the
//! comparator as each one finishes.

use anyhow::{anyhow, bail, Context, Result};
use facematch_core::{
    extract_face_points, CanvasSize, ComparisonResult, Detections, FaceComparator, GrayImage,
    LandmarkExtractor, SimilarityScorer, Slot, SlotOutcome,
};
use image::imageops::FilterType;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Turns a path into what the extractor detects on.
pub type Loader<I> = fn(&Path, CanvasSize) -> Result<I>;

/// Decode an image, resize it to the canvas and convert it to grayscale.
pub fn load_image(path: &Path, canvas: CanvasSize) -> Result<GrayImage> {
    let width = canvas.width.round() as u32;
    let height = canvas.height.round() as u32;
    let decoded = image::open(path).with_context(|| format!("decoding {}", path.display()))?;
    tracing::debug!(
        path = %path.display(),
        original_width = decoded.width(),
        original_height = decoded.height(),
        width,
        height,
        "resizing image to canvas"
    );
    let gray = decoded.resize_exact(width, height, FilterType::Triangle).to_luma8();
    Ok(GrayImage::new(gray.into_raw(), width, height)?)
}

pub fn load_detections(path: &Path, _canvas: CanvasSize) -> Result<Detections> {
    Ok(Detections::from_path(path)?)
}

/// Extract landmarks from `reference` and `candidate` in parallel and score
/// them once both slots are filled.
pub async fn run_comparison<E>(
    extractor: E,
    load: Loader<E::Input>,
    reference: PathBuf,
    candidate: PathBuf,
    canvas: CanvasSize,
    scorer: SimilarityScorer,
) -> Result<ComparisonResult>
where
    E: LandmarkExtractor + Send + 'static,
    E::Input: Sized,
{
    let extractor = Arc::new(Mutex::new(extractor));
    let comparator = Arc::new(FaceComparator::new(scorer));
    let generation = comparator.generation();

    tracing::info!(
        %canvas,
        threshold = comparator.scorer().threshold(),
        generation,
        "comparing faces"
    );

    let tasks: Vec<_> = [(Slot::Reference, reference), (Slot::Candidate, candidate)]
        .into_iter()
        .map(|(slot, path)| {
            let extractor = Arc::clone(&extractor);
            let comparator = Arc::clone(&comparator);
            tokio::task::spawn_blocking(move || -> Result<SlotOutcome> {
                let input = load(&path, canvas)?;
                let points = {
                    let mut extractor = extractor
                        .lock()
                        .map_err(|_| anyhow!("extractor poisoned by a panicked task"))?;
                    extract_face_points(&mut *extractor, &input, canvas)
                        .with_context(|| format!("{slot} image {}", path.display()))?
                };
                tracing::info!(%slot, points = points.len(), "landmarks extracted");
                Ok(comparator.set_slot_in(generation, slot, points)?)
            })
        })
        .collect();

    let mut result = None;
    for task in tasks {
        if let SlotOutcome::Scored(scored) = task.await.context("extraction task failed")?? {
            result = Some(scored);
        }
    }

    match result {
        Some(result) => {
            tracing::info!(
                mean_distance = result.mean_distance,
                classification = ?result.classification,
                "comparison complete"
            );
            Ok(result)
        }
        None => bail!("comparison finished without both slots filled"),
    }
}
