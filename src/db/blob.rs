// Compact stat blob: gzip-compressed JSON array of artifact slots.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Write};

use crate::model::RawArtifact;

#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("stat blob io: {0}")]
    Io(#[from] std::io::Error),
    #[error("stat blob json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Pack artifact slots for the `artifact_blob` column.
pub fn encode_artifacts(artifacts: &[RawArtifact]) -> Result<Vec<u8>, BlobError> {
    let json = serde_json::to_vec(artifacts)?;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
    encoder.write_all(&json)?;
    Ok(encoder.finish()?)
}

/// Unpack an `artifact_blob` column.
pub fn decode_artifacts(data: &[u8]) -> Result<Vec<RawArtifact>, BlobError> {
    let mut decoder = GzDecoder::new(data);
    let mut json = Vec::new();
    decoder.read_to_end(&mut json)?;
    Ok(serde_json::from_slice(&json)?)
}
