//! Exact-match filter expressions and their Qdrant translation.

use std::fmt;
use std::str::FromStr;

use serde_json::{Value, json};

use super::types::VectorStoreError;

/// Payload field holding the owning document identifier.
pub const DOCUMENT_ID_FIELD: &str = "id";

/// Value side of an exact-match filter. Also used as a document identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FilterValue {
    /// Integer identifier, stored and matched as a JSON number.
    Integer(i64),
    /// Text identifier, stored and matched as a JSON string.
    Text(String),
}

impl FilterValue {
    /// JSON form stored in payloads and sent in match clauses.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Integer(value) => Value::from(*value),
            Self::Text(value) => Value::String(value.clone()),
        }
    }

    /// Qdrant payload index schema matching this value's type.
    pub fn field_schema(&self) -> &'static str {
        match self {
            Self::Integer(_) => "integer",
            Self::Text(_) => "keyword",
        }
    }

    /// Parse an unquoted identifier: integers stay integers, anything else is text.
    pub fn infer(raw: &str) -> Self {
        let trimmed = raw.trim();
        trimmed
            .parse()
            .map(Self::Integer)
            .unwrap_or_else(|_| Self::Text(trimmed.to_string()))
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(value) => write!(f, "{value}"),
            Self::Text(value) => write!(f, "\"{value}\""),
        }
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Exact-match expression of the form `field==value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterExpr {
    field: String,
    value: FilterValue,
}

impl FilterExpr {
    /// Match payloads whose `field` equals `value`.
    pub fn equals(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Match chunks belonging to the given document.
    pub fn id_equals(value: impl Into<FilterValue>) -> Self {
        Self::equals(DOCUMENT_ID_FIELD, value)
    }

    /// Filtered payload field.
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Expected value.
    pub fn value(&self) -> &FilterValue {
        &self.value
    }

    /// Qdrant filter body for this expression.
    pub fn to_qdrant(&self) -> Value {
        json!({
            "must": [
                {
                    "key": self.field,
                    "match": { "value": self.value.to_json() }
                }
            ]
        })
    }
}

impl fmt::Display for FilterExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}=={}", self.field, self.value)
    }
}

impl FromStr for FilterExpr {
    type Err = VectorStoreError;

    fn from_str(expr: &str) -> Result<Self, Self::Err> {
        let invalid = || VectorStoreError::InvalidFilter(expr.to_string());
        let (field, raw_value) = expr.split_once("==").ok_or_else(invalid)?;

        let field = field.trim();
        if field.is_empty()
            || !field
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(invalid());
        }

        let raw_value = raw_value.trim();
        let value = match raw_value
            .strip_prefix('"')
            .and_then(|rest| rest.strip_suffix('"'))
        {
            Some(text) => FilterValue::Text(text.to_string()),
            None if raw_value.is_empty() || raw_value.contains('"') => return Err(invalid()),
            None => FilterValue::infer(raw_value),
        };

        Ok(Self {
            field: field.to_string(),
            value,
        })
    }
}
