//! Per-block gzip wrapping. Stored blocks are either raw text or one
//! single-member gzip stream; the two are told apart by the magic bytes,
//! never by file extension.

use std::io::{Read, Write};

use flate2::bufread::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::{Error, Result};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Whether the buffer starts with a gzip member header.
pub fn is_gzip(data: &[u8]) -> bool {
    data.len() >= 2 && data[0] == GZIP_MAGIC[0] && data[1] == GZIP_MAGIC[1]
}

/// Wraps raw block bytes in a single gzip member at the default level.
pub fn compress(raw: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(raw)
        .map_err(|e| Error::Compression(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| Error::Compression(e.to_string()))
}

/// Inflates a stored block that was read back by its exact location.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    Ok(decompress_prefix(data)?.0)
}

/// Inflates the first gzip member at the start of `data` and reports exactly
/// how many compressed bytes it occupied. The decoder stops at the member
/// trailer, so the count is the member length even when `data` continues
/// with further blocks. The recovery scanner relies on this to delimit
/// compressed blocks without sidecar metadata.
pub fn decompress_prefix(data: &[u8]) -> Result<(Vec<u8>, usize)> {
    let mut decoder = GzDecoder::new(data);
    let mut raw = Vec::new();
    decoder
        .read_to_end(&mut raw)
        .map_err(|e| Error::Compression(e.to_string()))?;
    let consumed = data.len() - decoder.into_inner().len();
    Ok((raw, consumed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let raw = b"users[1]{id,name}:\n1,Alice\n";
        let compressed = compress(raw).expect("compress failed");
        assert!(is_gzip(&compressed));
        assert_eq!(decompress(&compressed).expect("decompress failed"), raw);
    }

    #[test]
    fn test_is_gzip() {
        assert!(!is_gzip(b""));
        assert!(!is_gzip(&[0x1f]));
        assert!(!is_gzip(b"users[1]{id}:\n1\n"));
        assert!(is_gzip(&[0x1f, 0x8b, 0x08]));
    }

    #[test]
    fn test_prefix_consumes_single_member() {
        let first = compress(b"first block").expect("compress failed");
        let mut file = first.clone();
        file.extend_from_slice(b"trailing uncompressed block\n");

        let (raw, consumed) = decompress_prefix(&file).expect("decompress failed");
        assert_eq!(raw, b"first block");
        assert_eq!(consumed, first.len());
    }

    #[test]
    fn test_back_to_back_members() {
        let first = compress(b"one").expect("compress failed");
        let second = compress(b"two").expect("compress failed");
        let mut file = first.clone();
        file.extend_from_slice(&second);

        let (raw, consumed) = decompress_prefix(&file).expect("decompress failed");
        assert_eq!(raw, b"one");
        assert_eq!(consumed, first.len());

        let (raw, consumed) = decompress_prefix(&file[first.len()..]).expect("decompress failed");
        assert_eq!(raw, b"two");
        assert_eq!(consumed, second.len());
    }

    #[test]
    fn test_truncated_stream() {
        let compressed = compress(b"some content that compresses").expect("compress failed");
        let truncated = &compressed[..compressed.len() / 2];
        assert!(matches!(
            decompress(truncated),
            Err(Error::Compression(_))
        ));
    }

    #[test]
    fn test_bad_header() {
        // Correct magic, garbage after it.
        let junk = [0x1f, 0x8b, 0xff, 0x00, 0x12, 0x34];
        assert!(matches!(decompress(&junk), Err(Error::Compression(_))));
    }
}
