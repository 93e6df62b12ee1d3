//! Reserved OIDs and key-table addressing.
//!
//! Scalars live at fixed OIDs. The key table lives under
//! `3.2.1.<column>.<rowId>`; `3.2.1.6.0` is not an instance but the
//! write-only trigger that issues a new key.

use crate::value::ValueKind;

pub const SYSTEM_RESTART_DATE: &str = "1.1.0";
pub const SYSTEM_RESTART_TIME: &str = "1.2.0";
pub const SYSTEM_KEY_SIZE: &str = "1.3.0";
pub const SYSTEM_INTERVAL_UPDATE: &str = "1.4.0";
pub const SYSTEM_MAX_KEYS: &str = "1.5.0";
pub const SYSTEM_KEY_TTL: &str = "1.6.0";
pub const CONFIG_MASTER_KEY: &str = "2.1.0";
pub const CONFIG_FIRST_CHAR: &str = "2.2.0";
pub const CONFIG_CARDINALITY: &str = "2.3.0";
pub const DATA_VALID_KEYS: &str = "3.1.0";

/// Prefix shared by every key-table OID.
pub const KEY_TABLE_PREFIX: &str = "3.2.1.";

/// SET on this OID issues a new key with the written visibility.
pub const KEY_ISSUE_TRIGGER: &str = "3.2.1.6.0";

/// OID used in the error list when a whole request is rejected.
pub const PROTOCOL_ERROR_OID: &str = "0";

/// A column of the generated-keys table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyColumn {
    KeyId = 1,
    KeyValue = 2,
    Requester = 3,
    ExpirationDate = 4,
    ExpirationTime = 5,
    Visibility = 6,
}

impl KeyColumn {
    /// All columns in OID order.
    pub const ALL: [KeyColumn; 6] = [
        KeyColumn::KeyId,
        KeyColumn::KeyValue,
        KeyColumn::Requester,
        KeyColumn::ExpirationDate,
        KeyColumn::ExpirationTime,
        KeyColumn::Visibility,
    ];

    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(usize::from(index).checked_sub(1)?).copied()
    }

    pub fn index(self) -> u8 {
        self as u8
    }

    /// Kind of the instance stored in this column.
    pub fn kind(self) -> ValueKind {
        match self {
            Self::KeyValue | Self::Requester => ValueKind::String,
            Self::KeyId | Self::ExpirationDate | Self::ExpirationTime | Self::Visibility => {
                ValueKind::Integer
            }
        }
    }
}

/// A parsed `3.2.1.<column>.<rowId>` address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TableOid {
    pub column: KeyColumn,
    pub row_id: u64,
}

impl TableOid {
    pub fn new(column: KeyColumn, row_id: u64) -> Self {
        Self { column, row_id }
    }

    /// Parse a key-table OID. Returns `None` for anything outside the table,
    /// including malformed or non-canonical segments (`02`, `+1`).
    pub fn parse(oid: &str) -> Option<Self> {
        let rest = oid.strip_prefix(KEY_TABLE_PREFIX)?;
        let (column, row) = rest.split_once('.')?;
        let column = KeyColumn::from_index(column.parse().ok()?)?;
        let row_id = row.parse().ok()?;
        let parsed = Self { column, row_id };
        (parsed.to_oid() == oid).then_some(parsed)
    }

    pub fn to_oid(self) -> String {
        format!("{KEY_TABLE_PREFIX}{}.{}", self.column.index(), self.row_id)
    }
}

impl std::fmt::Display for TableOid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{KEY_TABLE_PREFIX}{}.{}",
            self.column.index(),
            self.row_id
        )
    }
}

/// True when `oid` falls inside the key-table subtree.
pub fn is_table_oid(oid: &str) -> bool {
    oid.starts_with(KEY_TABLE_PREFIX)
}

/// The row id encoded in an OID: its last dot-separated segment, which must be
/// written in canonical decimal form.
pub fn oid_row_id(oid: &str) -> Option<u64> {
    let segment = oid.rsplit('.').next()?;
    let row_id: u64 = segment.parse().ok()?;
    (row_id.to_string() == segment).then_some(row_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_table_oid() {
        let parsed = TableOid::parse("3.2.1.2.17").unwrap();
        assert_eq!(parsed.column, KeyColumn::KeyValue);
        assert_eq!(parsed.row_id, 17);
        assert_eq!(parsed.to_oid(), "3.2.1.2.17");
        assert_eq!(parsed.to_string(), "3.2.1.2.17");
    }

    #[test]
    fn test_parse_rejects_outside_table() {
        assert!(TableOid::parse("3.1.0").is_none());
        assert!(TableOid::parse("3.2.1.7.1").is_none());
        assert!(TableOid::parse("3.2.1.0.1").is_none());
        assert!(TableOid::parse("3.2.1.2").is_none());
        assert!(TableOid::parse("3.2.1.2.x").is_none());
        assert!(TableOid::parse("3.2.1.2.1.5").is_none());
    }

    #[test]
    fn test_parse_rejects_non_canonical_segments() {
        assert!(TableOid::parse("3.2.1.02.1").is_none());
        assert!(TableOid::parse("3.2.1.2.+1").is_none());
        assert!(TableOid::parse("3.2.1.2.01").is_none());
        assert!(TableOid::parse("3.2.1.+2.1").is_none());
        assert_eq!(oid_row_id("3.2.1.2.01"), None);
        assert_eq!(oid_row_id("3.2.1.2.+1"), None);
        assert_eq!(
            TableOid::parse("3.2.1.2.10"),
            Some(TableOid::new(KeyColumn::KeyValue, 10))
        );
    }

    #[test]
    fn test_issue_trigger_parses_as_row_zero() {
        let parsed = TableOid::parse(KEY_ISSUE_TRIGGER).unwrap();
        assert_eq!(parsed.column, KeyColumn::Visibility);
        assert_eq!(parsed.row_id, 0);
    }

    #[test]
    fn test_oid_row_id() {
        assert_eq!(oid_row_id("3.2.1.6.42"), Some(42));
        assert_eq!(oid_row_id("1.4.0"), Some(0));
        assert_eq!(oid_row_id("1.4.a"), None);
        assert!(is_table_oid("3.2.1.1.1"));
        assert!(!is_table_oid("3.1.0"));
    }

    #[test]
    fn test_column_kinds() {
        assert_eq!(KeyColumn::KeyValue.kind(), ValueKind::String);
        assert_eq!(KeyColumn::Visibility.kind(), ValueKind::Integer);
        assert_eq!(KeyColumn::from_index(3), Some(KeyColumn::Requester));
        assert_eq!(KeyColumn::from_index(0), None);
    }
}
