//! Shared identifier wrappers for matcalc templates.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

const BASE_PREFIX: &str = "base-";
const ATTRIBUTE_PREFIX: &str = "attr-";

/// Error returned when parsing an identifier fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdParseError {
    message: String,
}

impl IdParseError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for IdParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for IdParseError {}

macro_rules! define_uuid_id {
    ($name:ident, $label:expr) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            pub fn parse(value: &str) -> Result<Self, IdParseError> {
                Uuid::parse_str(value)
                    .map_err(|e| IdParseError::new(format!("Invalid {}: {}", $label, e)))?;
                Ok(Self(value.to_string()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = IdParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }
    };
}

define_uuid_id!(OperandId, "operand ID");

/// Which family a column id belongs to, recovered from its textual form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnIdKind {
    Base(u8),
    Attribute(u32),
}

/// Opaque, stable identifier of a template column.
///
/// Base columns are `base-<kind>`, attribute columns are `attr-<index>`.
/// The id is only ever used as a lookup key; typed references travel
/// alongside it instead of being re-parsed from the string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnId(String);

impl ColumnId {
    pub fn base(kind: u8) -> Self {
        Self(format!("{}{}", BASE_PREFIX, kind))
    }

    pub fn attribute(index: u32) -> Self {
        Self(format!("{}{}", ATTRIBUTE_PREFIX, index))
    }

    /// Parse a textual column id, accepting only the two known patterns.
    pub fn parse(value: &str) -> Result<Self, IdParseError> {
        let id = Self(value.trim().to_string());
        id.kind()
            .map(|_| id.clone())
            .ok_or_else(|| IdParseError::new(format!("Invalid column ID: '{}'", value)))
    }

    /// Recover the family and numeric part of the id, if it follows a known pattern.
    pub fn kind(&self) -> Option<ColumnIdKind> {
        if let Some(rest) = self.0.strip_prefix(BASE_PREFIX) {
            return rest.parse::<u8>().ok().map(ColumnIdKind::Base);
        }
        if let Some(rest) = self.0.strip_prefix(ATTRIBUTE_PREFIX) {
            return rest.parse::<u32>().ok().map(ColumnIdKind::Attribute);
        }
        None
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ColumnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ColumnId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
