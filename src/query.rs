//! Ad-hoc single-predicate queries: one field compared against one operand,
//! evaluated over the visible set of a collection.

use std::cmp::Ordering;

use crate::collection::Collection;
use crate::error::{Error, Result};
use crate::record::{Record, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
}

/// One comparison against a named field, e.g. `age > 30`. The operand is
/// kept as text and interpreted against each record's field type at match
/// time.
#[derive(Clone, Debug, PartialEq)]
pub struct Predicate {
    pub field: String,
    pub op: CompareOp,
    pub value: String,
}

impl Predicate {
    /// Parses an expression of the form `<field> <op> <value>`. Quotes
    /// around the value are stripped. Two-character operators are matched
    /// before their one-character prefixes, so `>=` never parses as `>`.
    pub fn parse(expr: &str) -> Result<Self> {
        const OPERATORS: [(&str, CompareOp); 6] = [
            (">=", CompareOp::Ge),
            ("<=", CompareOp::Le),
            ("!=", CompareOp::Ne),
            ("=", CompareOp::Eq),
            (">", CompareOp::Gt),
            ("<", CompareOp::Lt),
        ];

        for (symbol, op) in OPERATORS {
            if let Some(idx) = expr.find(symbol) {
                let field = expr[..idx].trim();
                let value = expr[idx + symbol.len()..]
                    .trim()
                    .trim_matches(|c| c == '"' || c == '\'');
                if field.is_empty() || value.is_empty() {
                    return Err(Error::InvalidQuery(format!(
                        "expected <field> {symbol} <value>, got {expr:?}"
                    )));
                }
                return Ok(Self {
                    field: field.to_string(),
                    op,
                    value: value.to_string(),
                });
            }
        }

        Err(Error::InvalidQuery(format!(
            "no operator in {expr:?} (supported: =, !=, >, <, >=, <=)"
        )))
    }

    /// Whether a record satisfies the predicate. Records lacking the field
    /// never match. Equality compares rendered text; ordering compares
    /// int against int-parsed operand, float against float-parsed operand,
    /// text lexicographically, and falls back to rendered text when the
    /// operand does not parse as the field's type.
    pub fn matches(&self, record: &Record) -> bool {
        let Some(value) = record.get(&self.field) else {
            return false;
        };
        match self.op {
            CompareOp::Eq => value.render() == self.value,
            CompareOp::Ne => value.render() != self.value,
            CompareOp::Gt => compare(value, &self.value) == Ordering::Greater,
            CompareOp::Lt => compare(value, &self.value) == Ordering::Less,
            CompareOp::Ge => compare(value, &self.value) != Ordering::Less,
            CompareOp::Le => compare(value, &self.value) != Ordering::Greater,
        }
    }
}

fn compare(field: &Value, operand: &str) -> Ordering {
    match field {
        Value::Int64(i) => {
            if let Ok(parsed) = operand.parse::<i64>() {
                return i.cmp(&parsed);
            }
        }
        Value::Float64(f) => {
            if let Some(ordering) = operand
                .parse::<f64>()
                .ok()
                .and_then(|parsed| f.partial_cmp(&parsed))
            {
                return ordering;
            }
        }
        Value::Text(s) => return s.as_str().cmp(operand),
        Value::Bool(_) => {}
    }
    field.render().as_str().cmp(operand)
}

impl Collection {
    /// Returns every visible record matching the predicate.
    pub fn query(&self, predicate: &Predicate) -> Result<Vec<Record>> {
        Ok(self
            .all()?
            .into_iter()
            .filter(|record| predicate.matches(record))
            .collect())
    }
}
