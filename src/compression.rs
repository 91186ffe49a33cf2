//! gzip compression for stored paste content

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{self, Read, Write};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompressionError {
    #[error("compression failed: {0}")]
    Compress(io::Error),

    #[error("compressed data is corrupt: {0}")]
    Decompress(io::Error),
}

/// gzip `data` at `level` (clamped to 0-9). The header carries no timestamp,
/// so equal input yields equal output.
pub fn compress(data: &[u8], level: u32) -> Result<Vec<u8>, CompressionError> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2 + 32), Compression::new(level.min(9)));
    encoder.write_all(data).map_err(CompressionError::Compress)?;
    encoder.finish().map_err(CompressionError::Compress)
}

/// Reverse [`compress`].
pub fn decompress(data: &[u8]) -> Result<Vec<u8>, CompressionError> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::with_capacity(data.len() * 2);
    decoder.read_to_end(&mut out).map_err(CompressionError::Decompress)?;
    Ok(out)
}

/// Content of at least `threshold` bytes is worth compressing.
pub fn should_compress(len: usize, threshold: usize) -> bool {
    len >= threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_is_lossless() {
        let samples: Vec<Vec<u8>> = vec![
            Vec::new(),
            b"hello".to_vec(),
            "héllo wörld ✓ 日本語".as_bytes().to_vec(),
            "line of text\n".repeat(2_000).into_bytes(),
        ];
        for sample in samples {
            let packed = compress(&sample, 6).unwrap();
            assert_eq!(decompress(&packed).unwrap(), sample);
        }
    }

    #[test]
    fn test_repetitive_content_shrinks() {
        let data = "abcdefgh".repeat(1_000);
        let packed = compress(data.as_bytes(), 6).unwrap();
        assert!(packed.len() < data.len() / 10);
    }

    #[test]
    fn test_output_is_deterministic() {
        let data = b"same input, same bytes";
        assert_eq!(compress(data, 6).unwrap(), compress(data, 6).unwrap());
    }

    #[test]
    fn test_out_of_range_level_is_clamped() {
        let packed = compress(b"data", 42).unwrap();
        assert_eq!(decompress(&packed).unwrap(), b"data");
    }

    #[test]
    fn test_corrupt_input_is_an_error() {
        assert!(matches!(
            decompress(b"definitely not gzip"),
            Err(CompressionError::Decompress(_))
        ));
    }

    #[test]
    fn test_should_compress_threshold() {
        assert!(!should_compress(511, 512));
        assert!(should_compress(512, 512));
        assert!(should_compress(0, 0));
    }
}
