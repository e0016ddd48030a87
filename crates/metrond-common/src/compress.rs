//! Gzip body helpers used on both sides of the wire.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

#[derive(Debug, thiserror::Error)]
pub enum CompressError {
    #[error("gzip compression failed: {0}")]
    Compress(#[source] std::io::Error),
    #[error("gzip decompression failed: {0}")]
    Decompress(#[source] std::io::Error),
}

pub fn gzip(data: &[u8]) -> Result<Vec<u8>, CompressError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).map_err(CompressError::Compress)?;
    encoder.finish().map_err(CompressError::Compress)
}

pub fn gunzip(data: &[u8]) -> Result<Vec<u8>, CompressError> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(CompressError::Decompress)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let cases: &[&[u8]] = &[b"", b"x", b"[{\"id\":\"Alloc\"}]", &[0u8; 4096]];
        for body in cases {
            let packed = gzip(body).unwrap();
            assert_eq!(gunzip(&packed).unwrap(), *body);
        }
    }

    #[test]
    fn truncated_stream_fails() {
        let packed = gzip(b"some payload that compresses").unwrap();
        assert!(gunzip(&packed[..packed.len() / 2]).is_err());
    }

    #[test]
    fn garbage_fails() {
        assert!(gunzip(b"definitely not gzip").is_err());
    }
}
