//! Presentation-facing identity matching: a thin adapter over the
//! gallery's nearest-neighbour query.

use serde::Serialize;

use crate::gallery::Gallery;
use crate::types::Region;

/// A recognized face as shown to the presentation layer.
#[derive(Debug, Clone, Serialize)]
pub struct RecognizedFace {
    pub name: String,
    pub employee_id: String,
    pub region: Region,
    pub confidence: f32,
}

/// Match one detected face against the gallery. `None` means unknown —
/// either the gallery is empty or the best distance exceeds the
/// tolerance. No face present is simply no call here, not an error.
pub fn recognize(
    gallery: &Gallery,
    embedding: &[f32],
    region: Region,
    tolerance: f32,
) -> Option<RecognizedFace> {
    let m = gallery.best_match(embedding, tolerance)?;
    tracing::debug!(
        employee_id = %m.employee_id,
        distance = m.distance,
        confidence = m.confidence,
        "face recognized"
    );
    Some(RecognizedFace {
        name: m.name,
        employee_id: m.employee_id,
        region,
        confidence: m.confidence,
    })
}
