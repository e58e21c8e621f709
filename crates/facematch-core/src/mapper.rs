//! Normalized → canvas coordinate mapping.
//!
//! Boxes are normalized against the full image; landmarks are normalized
//! against their face box. A box must be mapped into the canvas before the
//! landmarks inside it can be.

use crate::types::{AbsoluteBox, AbsolutePoint, CanvasSize, NormalizedBox, NormalizedPoint};

/// Scale a normalized face box into canvas units. No clamping.
pub fn map_box(face: &NormalizedBox, canvas: CanvasSize) -> AbsoluteBox {
    AbsoluteBox {
        x: face.x * canvas.width,
        y: face.y * canvas.height,
        width: face.width * canvas.width,
        height: face.height * canvas.height,
    }
}

/// Map box-relative landmarks into the canvas the box was mapped into.
///
/// Order and length are preserved.
pub fn map_points(points: &[NormalizedPoint], face: &AbsoluteBox) -> Vec<AbsolutePoint> {
    points
        .iter()
        .map(|p| AbsolutePoint {
            x: p.x * face.width + face.x,
            y: p.y * face.height + face.y,
        })
        .collect()
}

/// [`map_box`] followed by [`map_points`].
pub fn map_face(
    face: &NormalizedBox,
    points: &[NormalizedPoint],
    canvas: CanvasSize,
) -> Vec<AbsolutePoint> {
    let abs = map_box(face, canvas);
    map_points(points, &abs)
}
