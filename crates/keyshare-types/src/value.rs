//! Typed MIB values, instances and key visibility.

use crate::error::{KeyShareError, KeyShareResult};
use serde::{Deserialize, Serialize};

/// The kind tag stored with every MIB instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Integer,
    String,
}

impl std::fmt::Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Integer => write!(f, "Integer"),
            Self::String => write!(f, "String"),
        }
    }
}

/// A value held by (or written to) a MIB instance.
///
/// On the wire this is a bare JSON number or string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MibValue {
    Int(i64),
    Str(String),
}

impl MibValue {
    /// The kind this value carries.
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Int(_) => ValueKind::Integer,
            Self::Str(_) => ValueKind::String,
        }
    }

    /// Best-effort conversion to `kind`.
    ///
    /// Integers always render as strings; strings convert to integers only
    /// when they parse as a decimal `i64` (surrounding whitespace ignored).
    pub fn coerce(self, kind: ValueKind) -> Option<MibValue> {
        match (self, kind) {
            (v @ Self::Int(_), ValueKind::Integer) | (v @ Self::Str(_), ValueKind::String) => {
                Some(v)
            }
            (Self::Int(n), ValueKind::String) => Some(Self::Str(n.to_string())),
            (Self::Str(s), ValueKind::Integer) => s.trim().parse::<i64>().ok().map(Self::Int),
        }
    }

    /// The integer payload, if this is an integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            Self::Str(_) => None,
        }
    }

    /// The string payload, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            Self::Int(_) => None,
        }
    }
}

impl std::fmt::Display for MibValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Str(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<i64> for MibValue {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<i32> for MibValue {
    fn from(n: i32) -> Self {
        Self::Int(i64::from(n))
    }
}

impl From<&str> for MibValue {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for MibValue {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

/// Access mode of a MIB instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Access {
    ReadOnly,
    ReadWrite,
}

/// One addressable MIB entry.
///
/// The value's kind always matches `kind`; the only mutator is
/// [`Instance::assign`], which coerces or rejects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    access: Access,
    kind: ValueKind,
    value: MibValue,
}

impl Instance {
    /// Create an instance whose kind is taken from its initial value.
    pub fn new(access: Access, value: MibValue) -> Self {
        Self {
            access,
            kind: value.kind(),
            value,
        }
    }

    pub fn access(&self) -> Access {
        self.access
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    pub fn value(&self) -> &MibValue {
        &self.value
    }

    /// True when the stored value agrees with the kind tag.
    pub fn is_consistent(&self) -> bool {
        self.value.kind() == self.kind
    }

    /// Replace the value, coercing it to this instance's kind.
    ///
    /// Access mode is not checked here; callers decide whether a write is
    /// admitted.
    pub fn assign(&mut self, oid: &str, value: MibValue) -> KeyShareResult<()> {
        let coerced = value
            .coerce(self.kind)
            .ok_or_else(|| KeyShareError::TypeMismatch {
                oid: oid.to_string(),
                expected: self.kind,
            })?;
        self.value = coerced;
        Ok(())
    }
}

/// Disclosure policy of an issued key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i64", try_from = "i64")]
pub enum Visibility {
    /// Nobody can read the row.
    Private = 0,
    /// Only the address that requested the key can read the row.
    RequesterOnly = 1,
    /// Everybody can read the row.
    Public = 2,
}

impl Visibility {
    /// Rows with this visibility count towards the valid-key quota.
    pub fn counts_as_valid(self) -> bool {
        matches!(self, Self::RequesterOnly | Self::Public)
    }
}

impl From<Visibility> for i64 {
    fn from(v: Visibility) -> Self {
        v as i64
    }
}

impl TryFrom<i64> for Visibility {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Private),
            1 => Ok(Self::RequesterOnly),
            2 => Ok(Self::Public),
            other => Err(format!("visibility must be 0, 1 or 2 (got {other})")),
        }
    }
}
