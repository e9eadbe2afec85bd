// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// One cell value in a query result row. The server speaks JSON scalars;
/// anything structured the server might emit is flattened to text upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Scalar {
    pub fn display(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(true) => "true".to_owned(),
            Self::Bool(false) => "false".to_owned(),
            Self::Number(value) => format_number(*value),
            Self::Text(value) => value.clone(),
        }
    }

    /// Numeric view used by sorting: `Number` directly, `Text` when it parses.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            Self::Text(value) => value.trim().parse().ok(),
            Self::Null | Self::Bool(_) => None,
        }
    }
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

/// One row of tabular query-result data. Field order is the order the server
/// sent, which is what header derivation depends on.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Record {
    fields: Vec<(String, Scalar)>,
}

impl Record {
    pub fn from_fields(fields: Vec<(String, Scalar)>) -> Self {
        Self { fields }
    }

    pub fn get(&self, column: &str) -> Option<&Scalar> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &Scalar> {
        self.fields.iter().map(|(_, value)| value)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// The authoritative, currently-loaded dataset. Replaced wholesale when a new
/// query result arrives; never mutated in place -- filtering and sorting
/// derive new sequences from it.
///
/// Headers are fixed at construction from the first record's field order and
/// stay fixed for the life of this generation, even if a later record carries
/// a different field set.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResultSet {
    headers: Vec<String>,
    records: Vec<Record>,
}

impl ResultSet {
    pub fn new(records: Vec<Record>) -> Self {
        let headers = records
            .first()
            .map(|record| record.columns().map(str::to_owned).collect())
            .unwrap_or_default();
        Self { headers, records }
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.headers.iter().any(|header| header == column)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaColumn {
    pub name: String,
    pub data_type: String,
}

/// Metadata for one selectable database table. Identity for selection is the
/// composite key over name plus the full ordered column list, never the name
/// alone -- see [`crate::selection::composite_key`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaTable {
    pub name: String,
    pub columns: Vec<SchemaColumn>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChatAuthor {
    User,
    Bot,
}

/// One transcript entry. Append-only; `markup` marks bot replies that carry
/// list markup rather than plain text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEntry {
    pub author: ChatAuthor,
    pub text: String,
    pub markup: bool,
    pub at: OffsetDateTime,
}

impl ChatEntry {
    pub fn user(text: impl Into<String>, at: OffsetDateTime) -> Self {
        Self {
            author: ChatAuthor::User,
            text: text.into(),
            markup: false,
            at,
        }
    }

    pub fn bot(text: impl Into<String>, at: OffsetDateTime) -> Self {
        Self {
            author: ChatAuthor::Bot,
            text: text.into(),
            markup: false,
            at,
        }
    }

    pub fn bot_markup(text: impl Into<String>, at: OffsetDateTime) -> Self {
        Self {
            author: ChatAuthor::Bot,
            text: text.into(),
            markup: true,
            at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub const fn toggled(self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}
