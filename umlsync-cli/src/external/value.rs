//! Column value representation for external records

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::identity::ExternalGuid;

/// A value in an external table column
///
/// `Null` and empty text compare equal: the vendor store does not tell them
/// apart reliably.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    /// Null/empty value
    #[default]
    Null,
    /// Text value
    Text(String),
    /// Reference to another record, by GUID
    Ref(ExternalGuid),
}

impl Value {
    /// Text value, with empty strings collapsed to `Null`
    pub fn text(s: impl Into<String>) -> Self {
        let s = s.into();
        if s.is_empty() { Value::Null } else { Value::Text(s) }
    }

    pub fn opt(s: Option<&str>) -> Self {
        s.map(Value::text).unwrap_or(Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) if !s.is_empty() => Some(s),
            Value::Ref(guid) => Some(guid.as_str()),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Ref(a), Value::Ref(b)) => a == b,
            (Value::Ref(_), _) | (_, Value::Ref(_)) => false,
            _ => self.as_str() == other.as_str(),
        }
    }
}

impl Eq for Value {}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Text(s) => write!(f, "{}", s),
            Value::Ref(guid) => write!(f, "{}", guid),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::text(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::text(s)
    }
}

impl From<Option<String>> for Value {
    fn from(s: Option<String>) -> Self {
        s.map(Value::text).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_equals_empty_text() {
        assert_eq!(Value::Null, Value::Text(String::new()));
        assert_eq!(Value::text(""), Value::Null);
        assert_ne!(Value::Null, Value::text("x"));
    }

    #[test]
    fn test_ref_never_equals_text() {
        let guid = ExternalGuid::new_random();
        assert_ne!(Value::Ref(guid.clone()), Value::text(guid.as_str()));
        assert_eq!(Value::Ref(guid.clone()), Value::Ref(guid));
    }
}
