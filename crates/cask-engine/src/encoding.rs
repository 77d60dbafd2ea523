//! Gzip bodies for entries stored with `content_encoding = gzip`.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::{EngineError, EngineResult};

/// Compress `data` with default gzip settings.
pub fn gzip(data: &[u8]) -> EngineResult<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    let encode_err = |e: std::io::Error| EngineError::Internal(format!("gzip encode failed: {e}"));
    encoder.write_all(data).map_err(encode_err)?;
    encoder.finish().map_err(encode_err)
}

/// Decompress a gzip body. A malformed body is invalid input.
pub fn gunzip(data: &[u8]) -> EngineResult<Vec<u8>> {
    let mut out = Vec::new();
    GzDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(|e| EngineError::InvalidInput(format!("gzip body could not be decoded: {e}")))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gzip_roundtrip() {
        let data = b"the same bytes, over and over, the same bytes".repeat(20);
        let packed = gzip(&data).unwrap();
        assert!(packed.len() < data.len());
        assert_eq!(gunzip(&packed).unwrap(), data);
    }

    #[test]
    fn garbage_is_invalid_input() {
        assert!(matches!(
            gunzip(b"not gzip at all"),
            Err(EngineError::InvalidInput(_))
        ));
    }
}
