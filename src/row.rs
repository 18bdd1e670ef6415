//! Tabular rows and their wire encoding.
//!
//! A data block on the wire is a sequence of lines, each line holding one [`Row`].
//! Fields are separated by commas when written; when reading, any run of `;`, `,`
//! or tab characters separates fields. Fields made of one to nine decimal digits
//! are read back as integers, everything else stays text.
//!
//! A row consisting of a single text field that does not look like a number is
//! written as `#<text>`, which marks the remainder of the line as one opaque
//! field. This keeps such rows intact even when the text contains separators.
//!
//! # Example
//! ```rust
//! use gpclient::{Field, Row};
//!
//! let row = Row::from((1, "Main Page"));
//! assert_eq!(row.encode(), "1,Main Page");
//!
//! let title = Row::from(("Foo, Bar",));
//! assert_eq!(title.encode(), "#Foo, Bar");
//! assert_eq!(Row::decode("#Foo, Bar"), Some(title));
//!
//! assert_eq!(Row::decode("7;x"), Some(Row::new(vec![Field::Int(7), "x".into()])));
//! ```
use std::{collections::HashMap, fmt};

use crate::{ClientError, ClientResult};

/// Longest digit sequence still decoded as an integer.
const MAX_INT_DIGITS: usize = 9;

/// Single value of a row, or a single command argument.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    Int(i64),
    Text(String),
}

impl Field {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Field::Int(i) => Some(*i),
            Field::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Field::Int(_) => None,
            Field::Text(s) => Some(s),
        }
    }

    fn decode(s: &str) -> Self {
        if is_short_number(s) {
            if let Ok(i) = s.parse() {
                return Field::Int(i);
            }
        }
        Field::Text(s.to_string())
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Int(i) => write!(f, "{i}"),
            Field::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for Field {
    fn from(value: i64) -> Self {
        Field::Int(value)
    }
}

impl From<i32> for Field {
    fn from(value: i32) -> Self {
        Field::Int(value.into())
    }
}

impl From<u32> for Field {
    fn from(value: u32) -> Self {
        Field::Int(value.into())
    }
}

impl From<&str> for Field {
    fn from(value: &str) -> Self {
        Field::Text(value.to_string())
    }
}

impl From<String> for Field {
    fn from(value: String) -> Self {
        Field::Text(value)
    }
}

fn is_short_number(s: &str) -> bool {
    !s.is_empty() && s.len() <= MAX_INT_DIGITS && s.bytes().all(|b| b.is_ascii_digit())
}

fn is_number(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn is_separator(c: char) -> bool {
    matches!(c, ';' | ',' | '\t')
}

/// One line of a data block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Row(Vec<Field>);

impl Row {
    pub fn new(fields: Vec<Field>) -> Self {
        Self(fields)
    }

    pub fn fields(&self) -> &[Field] {
        &self.0
    }

    pub fn into_fields(self) -> Vec<Field> {
        self.0
    }

    pub fn get(&self, col: usize) -> Option<&Field> {
        self.0.get(col)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Encodes the row as a wire line, without line break.
    pub fn encode(&self) -> String {
        if let [Field::Text(s)] = self.0.as_slice() {
            if !is_number(s) {
                return format!("#{s}");
            }
        }

        self.0
            .iter()
            .map(Field::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Encodes the row for a data block. Fails for rows that would not stay on
    /// one line: an empty row reads as the block terminator and a line break
    /// inside a field would start a new line.
    pub fn to_line(&self) -> ClientResult<String> {
        if self.0.is_empty() {
            return Err(ClientError::usage("can't send an empty row in a data block"));
        }
        if let Some(field) = self
            .0
            .iter()
            .find(|f| f.as_text().is_some_and(|s| s.contains(['\r', '\n'])))
        {
            return Err(ClientError::usage(format!(
                "row field contains a line break: {field:?}"
            )));
        }
        Ok(self.encode())
    }

    /// Decodes a wire line. Returns `None` for a blank line, which terminates
    /// a data block.
    pub fn decode(line: &str) -> Option<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            return None;
        }

        if let Some(text) = line.strip_prefix('#') {
            return Some(Row(vec![Field::Text(text.to_string())]));
        }

        let fields = line
            .split(is_separator)
            .map(|s| s.trim_matches(' '))
            .filter(|s| !s.is_empty())
            .map(Field::decode)
            .collect();
        Some(Row(fields))
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode())
    }
}

impl From<Vec<Field>> for Row {
    fn from(value: Vec<Field>) -> Self {
        Row(value)
    }
}

impl From<Field> for Row {
    fn from(value: Field) -> Self {
        Row(vec![value])
    }
}

impl<A: Into<Field>> From<(A,)> for Row {
    fn from(value: (A,)) -> Self {
        Row(vec![value.0.into()])
    }
}

impl<A: Into<Field>, B: Into<Field>> From<(A, B)> for Row {
    fn from(value: (A, B)) -> Self {
        Row(vec![value.0.into(), value.1.into()])
    }
}

impl<A: Into<Field>, B: Into<Field>, C: Into<Field>> From<(A, B, C)> for Row {
    fn from(value: (A, B, C)) -> Self {
        Row(vec![value.0.into(), value.1.into(), value.2.into()])
    }
}

impl FromIterator<Field> for Row {
    fn from_iter<I: IntoIterator<Item = Field>>(iter: I) -> Self {
        Row(iter.into_iter().collect())
    }
}

/// Extracts column `col` from every row.
pub fn array_column(rows: &[Row], col: usize) -> ClientResult<Vec<Field>> {
    rows.iter()
        .map(|row| {
            row.get(col)
                .cloned()
                .ok_or_else(|| ClientError::usage(format!("row `{row}` has no column {col}")))
        })
        .collect()
}

/// Builds a map from two columns of every row. Later rows win on duplicate keys.
pub fn pairs_to_map(
    rows: &[Row],
    key_col: usize,
    value_col: usize,
) -> ClientResult<HashMap<Field, Field>> {
    let mut map = HashMap::with_capacity(rows.len());
    for row in rows {
        match (row.get(key_col), row.get(value_col)) {
            (Some(k), Some(v)) => {
                map.insert(k.clone(), v.clone());
            }
            _ => {
                return Err(ClientError::usage(format!(
                    "row `{row}` has no columns {key_col} and {value_col}"
                )));
            }
        }
    }
    Ok(map)
}
