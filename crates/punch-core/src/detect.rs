//! Contract for the external face detector/encoder.
//!
//! Detection, embedding extraction, and landmark localization are
//! provided by an external oracle (typically a model-backed pipeline in
//! the capture driver). The core only consumes its outputs; accuracy is
//! the oracle's problem.

use image::RgbImage;

use crate::types::{EyeLandmarks, Region};

/// Opaque error produced by an oracle implementation.
pub type OracleError = Box<dyn std::error::Error + Send + Sync>;

/// External detector/encoder capability.
///
/// `encode` and `landmarks` return one entry per input region, in the
/// same order.
pub trait FaceOracle {
    /// Locate face bounding regions in a frame.
    fn detect(&mut self, frame: &RgbImage) -> Result<Vec<Region>, OracleError>;

    /// Produce a 128-dimensional identity embedding per region.
    fn encode(&mut self, frame: &RgbImage, regions: &[Region])
        -> Result<Vec<Vec<f32>>, OracleError>;

    /// Produce eye contour landmarks per region, where available.
    fn landmarks(
        &mut self,
        frame: &RgbImage,
        regions: &[Region],
    ) -> Result<Vec<EyeLandmarks>, OracleError>;
}
