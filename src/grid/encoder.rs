use itertools::Itertools;

use crate::error::{Error, Result};
use crate::record::Record;

/// Escapes a rendered value for embedding in a data line.
pub(crate) fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            ',' => out.push_str("\\,"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out
}

/// Computes the unified schema of a batch: the union of field names with
/// `id` forced first and the remainder in ascending order.
fn unified_schema(records: &[Record]) -> Vec<String> {
    let mut schema: Vec<String> = records
        .iter()
        .flat_map(|record| record.keys())
        .unique()
        .cloned()
        .collect();
    schema.sort_by(|a, b| {
        if a == "id" {
            std::cmp::Ordering::Less
        } else if b == "id" {
            std::cmp::Ordering::Greater
        } else {
            a.cmp(b)
        }
    });
    schema
}

/// Encodes a batch of records as one block.
///
/// Every record must carry an `id` field. Fields missing from a record but
/// present in the batch schema render as the empty string. The same batch
/// always encodes to the same bytes: the schema is sorted, and row order
/// follows batch order.
///
/// # Errors
///
/// `MissingId` if any record lacks `id`; `EmptyBlock` for an empty batch
/// (blocks declaring zero rows are never written).
pub fn encode(name: &str, records: &[Record]) -> Result<Vec<u8>> {
    if records.is_empty() {
        return Err(Error::EmptyBlock);
    }
    for record in records {
        if !record.contains_key("id") {
            return Err(Error::MissingId);
        }
    }

    let schema = unified_schema(records);

    let mut out = String::new();
    out.push_str(name);
    out.push('[');
    out.push_str(&records.len().to_string());
    out.push_str("]{");
    out.push_str(&schema.join(","));
    out.push_str("}:\n");

    let mut row = Vec::with_capacity(schema.len());
    for record in records {
        row.clear();
        for field in &schema {
            match record.get(field) {
                Some(value) => row.push(escape(&value.render())),
                None => row.push(String::new()),
            }
        }
        out.push_str(&row.join(","));
        out.push('\n');
    }

    Ok(out.into_bytes())
}
