use crate::error::{Error, Result};
use crate::record::Value;

/// Iterates the lines of a block. Unlike [`str::lines`] this never treats a
/// lone `\r` as part of a terminator (carriage returns inside values are
/// escaped, so a raw `\r` is data), and a final unterminated line is still
/// yielded so partially-written blocks surface as short row counts rather
/// than phantom empty rows.
pub(crate) fn lines(text: &str) -> Lines<'_> {
    Lines { rest: Some(text) }
}

pub(crate) struct Lines<'a> {
    rest: Option<&'a str>,
}

impl<'a> Iterator for Lines<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        let rest = self.rest?;
        match rest.find('\n') {
            Some(pos) => {
                self.rest = Some(&rest[pos + 1..]);
                Some(&rest[..pos])
            }
            None => {
                self.rest = None;
                if rest.is_empty() {
                    None
                } else {
                    Some(rest)
                }
            }
        }
    }
}

/// Parses a block header line of the form `<collection>[<N>]{<f0>,...}:`.
///
/// Returns the declared row count, the schema, and the column index of the
/// `id` field. The collection name before `[` is parsed but carries no
/// meaning to the decoder.
pub fn parse_header(header: &str) -> Result<(usize, Vec<String>, usize)> {
    let lbracket = header.find('[');
    let rbracket = header.find(']');
    let (lbracket, rbracket) = match (lbracket, rbracket) {
        (Some(l), Some(r)) if l < r => (l, r),
        _ => {
            return Err(Error::InvalidHeader(format!(
                "missing or mis-ordered brackets in {header:?}"
            )))
        }
    };
    let count: usize = header[lbracket + 1..rbracket]
        .parse()
        .map_err(|e| Error::InvalidHeader(format!("invalid count: {e}")))?;

    let lbrace = header.find('{');
    let rbrace = header.find('}');
    let (lbrace, rbrace) = match (lbrace, rbrace) {
        (Some(l), Some(r)) if l < r => (l, r),
        _ => {
            return Err(Error::InvalidHeader(format!(
                "missing or mis-ordered braces in {header:?}"
            )))
        }
    };

    // Field names cannot contain commas, so a plain split is safe here.
    let schema: Vec<String> = header[lbrace + 1..rbrace]
        .split(',')
        .map(str::to_string)
        .collect();

    let id_column = schema
        .iter()
        .position(|field| field == "id")
        .ok_or_else(|| Error::InvalidHeader("schema missing 'id' field".to_string()))?;

    Ok((count, schema, id_column))
}

/// Splits one data line into its raw field values, undoing the escaping
/// applied on encode. A single escape flag drives the state machine: `\\`,
/// `\,`, `\n` and `\r` map back to their raw characters, any other escape
/// is preserved as a literal backslash followed by the character.
pub fn parse_row(line: &str) -> Vec<String> {
    let mut values = Vec::new();
    let mut current = String::new();
    let mut escaped = false;

    for c in line.chars() {
        if escaped {
            match c {
                '\\' => current.push('\\'),
                ',' => current.push(','),
                'n' => current.push('\n'),
                'r' => current.push('\r'),
                other => {
                    current.push('\\');
                    current.push(other);
                }
            }
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == ',' {
            values.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    values.push(current);
    values
}

/// Recovers a typed value from its raw field text: signed 64-bit integer,
/// then finite 64-bit float, then the literals `true`/`false`, then text.
/// The empty string is text.
pub fn infer(raw: &str) -> Value {
    if let Ok(i) = raw.parse::<i64>() {
        return Value::Int64(i);
    }
    if let Ok(f) = raw.parse::<f64>() {
        if f.is_finite() {
            return Value::Float64(f);
        }
    }
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::Text(raw.to_string()),
    }
}
