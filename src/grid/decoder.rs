use super::parser::{infer, lines, parse_header, parse_row};
use crate::error::{Error, Result};
use crate::record::Record;

fn block_text(data: &[u8]) -> Result<&str> {
    if data.is_empty() {
        return Err(Error::EmptyBlock);
    }
    std::str::from_utf8(data).map_err(|e| Error::MalformedBlock(format!("invalid utf-8: {e}")))
}

fn materialize(schema: &[String], row: Vec<String>) -> Record {
    schema
        .iter()
        .cloned()
        .zip(row.iter().map(|raw| infer(raw)))
        .collect()
}

/// Scans a block for a single record by key, short-circuiting on the first
/// row whose id column matches. Rows after the match are never parsed, and
/// no other record is materialized.
///
/// Returns `Ok(None)` when the block does not contain the key.
pub fn decode_one(data: &[u8], key: &str) -> Result<Option<Record>> {
    let text = block_text(data)?;
    let mut lines = lines(text);
    let header = lines.next().ok_or(Error::EmptyBlock)?;
    let (count, schema, id_column) = parse_header(header)?;

    for found in 0..count {
        let line = lines.next().ok_or_else(|| {
            Error::CountMismatch(format!("header declared {count} rows, block ends after {found}"))
        })?;
        let row = parse_row(line);
        if row.len() != schema.len() {
            return Err(Error::SchemaMismatch(format!(
                "row has {} fields, schema has {}",
                row.len(),
                schema.len()
            )));
        }
        if row[id_column] == key {
            return Ok(Some(materialize(&schema, row)));
        }
    }

    Ok(None)
}

/// Parses an entire block into records, one per data line.
pub fn decode_all(data: &[u8]) -> Result<Vec<Record>> {
    let text = block_text(data)?;
    let mut lines = lines(text);
    let header = lines.next().ok_or(Error::EmptyBlock)?;
    let (count, schema, _) = parse_header(header)?;

    let mut records = Vec::with_capacity(count);
    for found in 0..count {
        let line = lines.next().ok_or_else(|| {
            Error::CountMismatch(format!("header declared {count} rows, block ends after {found}"))
        })?;
        let row = parse_row(line);
        if row.len() != schema.len() {
            return Err(Error::SchemaMismatch(format!(
                "row has {} fields, schema has {}",
                row.len(),
                schema.len()
            )));
        }
        records.push(materialize(&schema, row));
    }

    Ok(records)
}

/// Extracts every primary key from a block without materializing records.
/// Used by the recovery scanner to rebuild the index.
///
/// When the id column is first (guaranteed for blocks this crate writes),
/// each key is read by scanning up to the first unescaped comma; otherwise
/// the full row is parsed.
pub fn extract_keys(data: &[u8]) -> Result<Vec<String>> {
    let text = block_text(data)?;
    let mut lines = lines(text);
    let header = lines.next().ok_or(Error::EmptyBlock)?;
    let (count, _, id_column) = parse_header(header)?;

    let mut keys = Vec::with_capacity(count);
    for found in 0..count {
        let line = lines.next().ok_or_else(|| {
            Error::CountMismatch(format!("header declared {count} rows, block ends after {found}"))
        })?;
        if id_column == 0 {
            keys.push(first_field(line));
        } else {
            let row = parse_row(line);
            if let Some(key) = row.into_iter().nth(id_column) {
                keys.push(key);
            }
        }
    }

    Ok(keys)
}

/// Unescapes the first field of a data line, stopping at the first
/// unescaped comma.
fn first_field(line: &str) -> String {
    let mut out = String::new();
    let mut escaped = false;
    for c in line.chars() {
        if escaped {
            match c {
                '\\' => out.push('\\'),
                ',' => out.push(','),
                'n' => out.push('\n'),
                'r' => out.push('\r'),
                other => {
                    out.push('\\');
                    out.push(other);
                }
            }
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == ',' {
            break;
        } else {
            out.push(c);
        }
    }
    out
}
