//! The generated-keys table (`3.2.1.<column>.<rowId>`).

use keyshare_types::error::{KeyShareError, KeyShareResult};
use keyshare_types::oid::{KeyColumn, TableOid};
use keyshare_types::value::{MibValue, Visibility};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One issued key. All six columns live and die together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRow {
    pub key_id: u64,
    pub value: String,
    /// Address of the manager that requested the key.
    pub requester: String,
    /// Calendar date, `YYYYMMDD`.
    pub expiration_date: i64,
    /// Time of day, `HHMMSS`.
    pub expiration_time: i64,
    pub visibility: Visibility,
}

impl KeyRow {
    /// Value of a single column.
    pub fn column(&self, column: KeyColumn) -> MibValue {
        match column {
            KeyColumn::KeyId => MibValue::Int(self.key_id as i64),
            KeyColumn::KeyValue => MibValue::Str(self.value.clone()),
            KeyColumn::Requester => MibValue::Str(self.requester.clone()),
            KeyColumn::ExpirationDate => MibValue::Int(self.expiration_date),
            KeyColumn::ExpirationTime => MibValue::Int(self.expiration_time),
            KeyColumn::Visibility => MibValue::Int(self.visibility.into()),
        }
    }

    /// Overwrite one column. The key id is immutable.
    pub fn assign(&mut self, column: KeyColumn, value: MibValue) -> KeyShareResult<()> {
        let oid = TableOid::new(column, self.key_id).to_oid();
        if column == KeyColumn::KeyId {
            return Err(KeyShareError::ReadOnlyViolation(oid));
        }
        let mismatch = || KeyShareError::TypeMismatch {
            oid: oid.clone(),
            expected: column.kind(),
        };
        let value = value.coerce(column.kind()).ok_or_else(mismatch)?;
        match (column, value) {
            (KeyColumn::KeyValue, MibValue::Str(s)) => self.value = s,
            (KeyColumn::Requester, MibValue::Str(s)) => self.requester = s,
            (KeyColumn::ExpirationDate, MibValue::Int(n)) => self.expiration_date = n,
            (KeyColumn::ExpirationTime, MibValue::Int(n)) => self.expiration_time = n,
            (KeyColumn::Visibility, MibValue::Int(n)) => {
                self.visibility = Visibility::try_from(n).map_err(|_| mismatch())?;
            }
            _ => return Err(mismatch()),
        }
        Ok(())
    }

    /// True when the expiration stamp lies strictly before `now`.
    ///
    /// `now` is the `(YYYYMMDD, HHMMSS)` pair; the comparison is
    /// lexicographic over (date, time).
    pub fn is_expired(&self, now: (i64, i64)) -> bool {
        (self.expiration_date, self.expiration_time) < now
    }
}

/// Rows keyed by id, plus the order in which they were inserted.
#[derive(Debug, Clone, Default)]
pub struct KeyTable {
    rows: HashMap<u64, KeyRow>,
    order: Vec<u64>,
}

impl KeyTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Insert a whole row. Fails if the id is already taken.
    pub fn insert(&mut self, row: KeyRow) -> KeyShareResult<()> {
        if self.rows.contains_key(&row.key_id) {
            return Err(KeyShareError::DuplicateRow(row.key_id));
        }
        self.order.push(row.key_id);
        self.rows.insert(row.key_id, row);
        Ok(())
    }

    /// Remove a whole row.
    pub fn remove(&mut self, row_id: u64) -> Option<KeyRow> {
        let row = self.rows.remove(&row_id)?;
        self.order.retain(|id| *id != row_id);
        Some(row)
    }

    pub fn get(&self, row_id: u64) -> Option<&KeyRow> {
        self.rows.get(&row_id)
    }

    pub fn get_mut(&mut self, row_id: u64) -> Option<&mut KeyRow> {
        self.rows.get_mut(&row_id)
    }

    /// Rows in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &KeyRow> + '_ {
        self.order.iter().filter_map(|id| self.rows.get(id))
    }

    /// First OID of the table in traversal order.
    pub fn first_oid(&self) -> Option<TableOid> {
        self.order
            .first()
            .map(|id| TableOid::new(KeyColumn::KeyId, *id))
    }

    /// OID that follows `at` in traversal order: the remaining columns of the
    /// same row, then the first column of the next inserted row.
    pub fn next_oid(&self, at: TableOid) -> Option<TableOid> {
        if let Some(column) = KeyColumn::from_index(at.column.index() + 1) {
            return Some(TableOid::new(column, at.row_id));
        }
        let position = self.order.iter().position(|id| *id == at.row_id)?;
        self.order
            .get(position + 1)
            .map(|id| TableOid::new(KeyColumn::KeyId, *id))
    }

    pub fn max_row_id(&self) -> Option<u64> {
        self.order.iter().copied().max()
    }

    /// Number of rows whose visibility counts as valid.
    pub fn valid_count(&self) -> u64 {
        self.rows
            .values()
            .filter(|row| row.visibility.counts_as_valid())
            .count() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: u64, visibility: Visibility) -> KeyRow {
        KeyRow {
            key_id: id,
            value: format!("key-{id}"),
            requester: "127.0.0.1:5000".to_string(),
            expiration_date: 20260101,
            expiration_time: 120000,
            visibility,
        }
    }

    #[test]
    fn test_insert_and_remove_row() {
        let mut table = KeyTable::new();
        table.insert(row(1, Visibility::Public)).unwrap();
        table.insert(row(2, Visibility::Private)).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(
            table.insert(row(1, Visibility::Public)),
            Err(KeyShareError::DuplicateRow(1))
        );

        let removed = table.remove(1).unwrap();
        assert_eq!(removed.value, "key-1");
        assert!(table.get(1).is_none());
        assert!(table.remove(1).is_none());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_traversal_walks_columns_then_rows() {
        let mut table = KeyTable::new();
        table.insert(row(5, Visibility::Public)).unwrap();
        table.insert(row(2, Visibility::Public)).unwrap();

        let mut walked = Vec::new();
        let mut cursor = table.first_oid();
        while let Some(oid) = cursor {
            walked.push(oid.to_oid());
            cursor = table.next_oid(oid);
        }
        assert_eq!(walked.len(), 12);
        assert_eq!(walked[0], "3.2.1.1.5");
        assert_eq!(walked[5], "3.2.1.6.5");
        // Insertion order, not numeric order.
        assert_eq!(walked[6], "3.2.1.1.2");
        assert_eq!(walked[11], "3.2.1.6.2");
    }

    #[test]
    fn test_valid_count_ignores_private_rows() {
        let mut table = KeyTable::new();
        table.insert(row(1, Visibility::Private)).unwrap();
        table.insert(row(2, Visibility::RequesterOnly)).unwrap();
        table.insert(row(3, Visibility::Public)).unwrap();
        assert_eq!(table.valid_count(), 2);
        assert_eq!(table.max_row_id(), Some(3));
    }

    #[test]
    fn test_row_assign() {
        let mut r = row(4, Visibility::Private);
        r.assign(KeyColumn::Visibility, MibValue::Int(2)).unwrap();
        assert_eq!(r.visibility, Visibility::Public);
        assert!(matches!(
            r.assign(KeyColumn::Visibility, MibValue::Int(9)),
            Err(KeyShareError::TypeMismatch { .. })
        ));
        assert!(matches!(
            r.assign(KeyColumn::KeyId, MibValue::Int(9)),
            Err(KeyShareError::ReadOnlyViolation(_))
        ));
        r.assign(KeyColumn::ExpirationTime, MibValue::from("000001"))
            .unwrap();
        assert_eq!(r.expiration_time, 1);
    }

    #[test]
    fn test_expiry_is_lexicographic_over_date_then_time() {
        let r = row(1, Visibility::Public);
        assert!(r.is_expired((20260101, 120001)));
        assert!(r.is_expired((20260102, 0)));
        assert!(!r.is_expired((20260101, 120000)));
        assert!(!r.is_expired((20251231, 235959)));
    }
}
