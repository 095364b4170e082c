//! Index reconstruction: a forward scan over a collection file that locates
//! block boundaries without any sidecar metadata and repopulates the
//! primary-key index.
//!
//! The file may interleave raw text blocks and gzip-wrapped blocks, and may
//! end in a partially-written block or arbitrary garbage from an
//! interrupted commit. The scanner is the only place where structural
//! errors are recoverable: it warns, resynchronizes, and keeps going, so a
//! damaged tail never makes the healthy prefix unreadable.

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};

use crate::collection::BlockLocation;
use crate::compress;
use crate::error::Result;
use crate::grid;

/// Rebuilds the index from the file contents, last writer winning per key,
/// and leaves the file cursor at the end for subsequent appends.
pub(crate) fn load_index(file: &File, index: &mut HashMap<String, BlockLocation>) -> Result<()> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(());
    }

    let mut handle: &File = file;
    handle.seek(SeekFrom::Start(0))?;
    let mut data = Vec::with_capacity(len as usize);
    handle.read_to_end(&mut data)?;

    // Blocks come back in ascending offset order, so a key rewritten by a
    // later block ends up pointing at the later block.
    for (location, keys) in scan_blocks(&data) {
        for key in keys {
            index.insert(key, location);
        }
    }

    handle.seek(SeekFrom::End(0))?;
    Ok(())
}

/// Walks the buffer from offset 0 and yields every well-formed block with
/// the keys it contains, in ascending offset order.
pub(crate) fn scan_blocks(data: &[u8]) -> Vec<(BlockLocation, Vec<String>)> {
    let mut blocks = Vec::new();
    let mut offset = 0usize;

    while offset < data.len() {
        let rest = &data[offset..];

        if compress::is_gzip(rest) {
            match compress::decompress_prefix(rest) {
                Ok((raw, consumed)) => {
                    let location = BlockLocation {
                        offset: offset as u64,
                        length: consumed as u64,
                    };
                    match grid::extract_keys(&raw) {
                        Ok(keys) => blocks.push((location, keys)),
                        Err(e) => {
                            tracing::warn!(offset, error = %e, "skipping compressed block with unreadable content");
                        }
                    }
                    offset += consumed;
                }
                Err(e) => {
                    tracing::warn!(offset, error = %e, "bad gzip member, resyncing");
                    offset += 1;
                }
            }
            continue;
        }

        // Uncompressed text block. The header must be a complete line; an
        // unterminated tail is a partial trailing block and ends the scan.
        let Some(header_end) = rest.iter().position(|&b| b == b'\n') else {
            break;
        };
        let header_len = header_end + 1;

        let count = match std::str::from_utf8(&rest[..header_end])
            .map_err(|e| crate::Error::InvalidHeader(format!("invalid utf-8: {e}")))
            .and_then(grid::parse_header)
        {
            Ok((count, _, _)) => count,
            Err(e) => {
                tracing::warn!(offset, error = %e, "skipping malformed header line");
                offset += header_len;
                continue;
            }
        };

        // Delimit the declared rows. Every row must be newline-terminated;
        // running out of rows means an interrupted commit wrote a partial
        // block, which is tolerated but never indexed.
        let mut block_len = header_len;
        let mut complete = true;
        for _ in 0..count {
            match rest[block_len..].iter().position(|&b| b == b'\n') {
                Some(pos) => block_len += pos + 1,
                None => {
                    complete = false;
                    break;
                }
            }
        }
        if !complete {
            tracing::warn!(offset, "partial trailing block, stopping scan");
            break;
        }

        let location = BlockLocation {
            offset: offset as u64,
            length: block_len as u64,
        };
        match grid::extract_keys(&rest[..block_len]) {
            Ok(keys) => blocks.push((location, keys)),
            Err(e) => {
                tracing::warn!(offset, error = %e, "skipping block with unreadable rows");
            }
        }
        offset += block_len;
    }

    blocks
}
