//! The grid block format: a compact, schema-deduplicated text container for
//! batches of records.
//!
//! ## Block Layout
//!
//! A block is a header line followed by one data line per record, UTF-8
//! encoded, every line terminated by `\n`:
//!
//! ```text
//! +--------------------------------------+
//! | <collection>[<N>]{id,<f1>,...,<fK>}: |
//! +--------------------------------------+
//! | <v0>,<v1>,...,<vK>                   |
//! +--------------------------------------+
//! | ...                                  |
//! +--------------------------------------+
//! | row N-1                              |
//! +--------------------------------------+
//! ```
//!
//! The schema is the union of field names across the batch, `id` first and
//! the rest in ascending order, so heterogeneous records share one header.
//! Values are rendered as text and escaped (`\\`, `\,`, `\n`, `\r`); a field
//! absent from a record renders as the empty string. Decoding recovers types
//! per field: integer, then finite float, then boolean literal, then text.
//!
//! On disk a block may additionally be gzip-wrapped as a whole; that is the
//! storage layer's concern (see [`crate::compress`]), this module only deals
//! in the text form.

mod decoder;
mod encoder;
mod parser;

pub use decoder::{decode_all, decode_one, extract_keys};
pub use encoder::encode;
pub use parser::{infer, parse_header, parse_row};
