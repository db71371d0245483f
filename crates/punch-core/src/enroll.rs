//! Enrollment capture: exactly one face, one embedding.
//!
//! Registration must not create a partial gallery entry, so the frame is
//! rejected outright when it holds zero or more than one face. The
//! caller pairs the returned embedding with the user record and handles
//! the gallery/store atomicity.

use image::RgbImage;
use thiserror::Error;

use crate::detect::{FaceOracle, OracleError};
use crate::types::Region;

#[derive(Error, Debug)]
pub enum EnrollError {
    #[error("no face detected — ensure the face is visible")]
    NoFaceDetected,
    #[error("multiple faces detected ({0}) — ensure only one person is in frame")]
    MultipleFacesDetected(usize),
    #[error("encoder produced no embedding for the detected face")]
    EncodingFailed,
    #[error("detector error: {0}")]
    Oracle(String),
}

impl EnrollError {
    fn oracle(e: OracleError) -> Self {
        EnrollError::Oracle(e.to_string())
    }
}

/// Run the oracle on an enrollment frame and extract the single face's
/// region and embedding.
pub fn extract_enrollment(
    oracle: &mut dyn FaceOracle,
    frame: &RgbImage,
) -> Result<(Region, Vec<f32>), EnrollError> {
    let regions = oracle.detect(frame).map_err(EnrollError::oracle)?;

    match regions.len() {
        0 => return Err(EnrollError::NoFaceDetected),
        1 => {}
        n => return Err(EnrollError::MultipleFacesDetected(n)),
    }

    let embeddings = oracle
        .encode(frame, &regions)
        .map_err(EnrollError::oracle)?;
    let embedding = embeddings.into_iter().next().ok_or(EnrollError::EncodingFailed)?;

    Ok((regions[0], embedding))
}
