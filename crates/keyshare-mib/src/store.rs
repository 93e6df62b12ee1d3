//! Thread-safe MIB store.
//!
//! The [`MibStore`] owns every instance. Callers never hold a reference into
//! it across a mutation; all reads return owned values and every operation
//! takes the lock exactly once, so a reader can never observe a half-written
//! key row.

use crate::snapshot::{MibSnapshot, SnapshotError};
use crate::table::{KeyRow, KeyTable};
use keyshare_types::error::{KeyShareError, KeyShareResult};
use keyshare_types::oid::{self, TableOid};
use keyshare_types::value::{Access, Instance, MibValue};
use std::sync::RwLock;
use tracing::debug;

/// Values the fixed scalar block is seeded with at boot.
#[derive(Debug, Clone)]
pub struct ScalarDefaults {
    /// Boot date, `YYYYMMDD`.
    pub restart_date: i64,
    /// Boot time, `HHMMSS`.
    pub restart_time: i64,
    pub key_size: i64,
    pub update_interval_ms: i64,
    pub max_keys: i64,
    pub key_ttl_secs: i64,
    pub master_key: String,
    pub first_char: i64,
    pub cardinality: i64,
}

#[derive(Debug, Clone, Default)]
struct MibInner {
    /// Scalar block in insertion order. The block is small and fixed, so
    /// lookups scan it.
    scalars: Vec<(String, Instance)>,
    keys: KeyTable,
}

impl MibInner {
    fn scalar(&self, oid: &str) -> Option<&Instance> {
        self.scalars
            .iter()
            .find(|(o, _)| o == oid)
            .map(|(_, inst)| inst)
    }

    fn scalar_mut(&mut self, oid: &str) -> Option<&mut Instance> {
        self.scalars
            .iter_mut()
            .find(|(o, _)| o == oid)
            .map(|(_, inst)| inst)
    }

    fn get(&self, oid: &str) -> KeyShareResult<MibValue> {
        if let Some(inst) = self.scalar(oid) {
            return Ok(inst.value().clone());
        }
        let addr = TableOid::parse(oid).ok_or_else(|| KeyShareError::UnknownOid(oid.into()))?;
        self.keys
            .get(addr.row_id)
            .map(|row| row.column(addr.column))
            .ok_or_else(|| KeyShareError::UnknownOid(oid.into()))
    }

    fn contains(&self, oid: &str) -> bool {
        self.scalar(oid).is_some()
            || TableOid::parse(oid).is_some_and(|addr| self.keys.get(addr.row_id).is_some())
    }

    /// OID following `oid` in traversal order, if any. `oid` must exist.
    fn next_oid(&self, oid: &str) -> Option<String> {
        if let Some(pos) = self.scalars.iter().position(|(o, _)| o == oid) {
            return match self.scalars.get(pos + 1) {
                Some((next, _)) => Some(next.clone()),
                None => self.keys.first_oid().map(TableOid::to_oid),
            };
        }
        let addr = TableOid::parse(oid)?;
        self.keys.next_oid(addr).map(TableOid::to_oid)
    }

    fn write(&mut self, oid: &str, value: MibValue, admin: bool) -> KeyShareResult<MibValue> {
        if let Some(inst) = self.scalar_mut(oid) {
            if !admin && inst.access() == Access::ReadOnly {
                return Err(KeyShareError::ReadOnlyViolation(oid.into()));
            }
            inst.assign(oid, value)?;
            return Ok(inst.value().clone());
        }
        let addr = TableOid::parse(oid).ok_or_else(|| KeyShareError::UnknownOid(oid.into()))?;
        let row = self
            .keys
            .get_mut(addr.row_id)
            .ok_or_else(|| KeyShareError::UnknownOid(oid.into()))?;
        // Every key-table column is read-only to the network.
        if !admin {
            return Err(KeyShareError::ReadOnlyViolation(oid.into()));
        }
        row.assign(addr.column, value)?;
        Ok(row.column(addr.column))
    }
}

/// The agent's object database.
#[derive(Debug, Default)]
pub struct MibStore {
    inner: RwLock<MibInner>,
}

impl MibStore {
    /// Create a store holding the given scalars (in this order) and an empty
    /// key table.
    pub fn new(scalars: Vec<(String, Instance)>) -> Self {
        Self {
            inner: RwLock::new(MibInner {
                scalars,
                keys: KeyTable::new(),
            }),
        }
    }

    /// Create the standard scalar block (`1.1.0` .. `3.1.0`).
    pub fn bootstrap(defaults: &ScalarDefaults) -> Self {
        use Access::{ReadOnly, ReadWrite};
        use MibValue::{Int, Str};
        let scalars = vec![
            (oid::SYSTEM_RESTART_DATE, ReadOnly, Int(defaults.restart_date)),
            (oid::SYSTEM_RESTART_TIME, ReadOnly, Int(defaults.restart_time)),
            (oid::SYSTEM_KEY_SIZE, ReadOnly, Int(defaults.key_size)),
            (oid::SYSTEM_INTERVAL_UPDATE, ReadWrite, Int(defaults.update_interval_ms)),
            (oid::SYSTEM_MAX_KEYS, ReadWrite, Int(defaults.max_keys)),
            (oid::SYSTEM_KEY_TTL, ReadWrite, Int(defaults.key_ttl_secs)),
            (oid::CONFIG_MASTER_KEY, ReadWrite, Str(defaults.master_key.clone())),
            (oid::CONFIG_FIRST_CHAR, ReadWrite, Int(defaults.first_char)),
            (oid::CONFIG_CARDINALITY, ReadWrite, Int(defaults.cardinality)),
            (oid::DATA_VALID_KEYS, ReadOnly, Int(0)),
        ];
        Self::new(
            scalars
                .into_iter()
                .map(|(oid, access, value)| (oid.to_string(), Instance::new(access, value)))
                .collect(),
        )
    }

    /// Rebuild a store from a snapshot, refreshing the restart stamp.
    ///
    /// Everything else carries over unchanged. Instances whose value does not
    /// match their kind, or duplicate rows, make the snapshot invalid.
    pub fn restore(
        snapshot: MibSnapshot,
        restart_date: i64,
        restart_time: i64,
    ) -> Result<Self, SnapshotError> {
        if let Some((oid, _)) = snapshot
            .scalars
            .iter()
            .find(|(_, inst)| !inst.is_consistent())
        {
            return Err(SnapshotError::Invalid(format!(
                "instance {oid} holds a value of the wrong kind"
            )));
        }
        let mut keys = KeyTable::new();
        for row in snapshot.rows {
            keys.insert(row)
                .map_err(|e| SnapshotError::Invalid(e.to_string()))?;
        }
        let store = Self {
            inner: RwLock::new(MibInner {
                scalars: snapshot.scalars,
                keys,
            }),
        };
        for (oid, value) in [
            (oid::SYSTEM_RESTART_DATE, restart_date),
            (oid::SYSTEM_RESTART_TIME, restart_time),
        ] {
            store
                .set_admin(oid, MibValue::Int(value))
                .map_err(|e| SnapshotError::Invalid(e.to_string()))?;
        }
        Ok(store)
    }

    /// Capture the whole MIB. `key_counter` is the derivation counter the
    /// agent wants restored alongside it.
    pub fn snapshot(&self, key_counter: u64) -> MibSnapshot {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        MibSnapshot {
            scalars: inner.scalars.clone(),
            rows: inner.keys.iter().cloned().collect(),
            key_counter,
        }
    }

    /// Read the value at `oid`.
    pub fn get(&self, oid: &str) -> KeyShareResult<MibValue> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.get(oid)
    }

    /// Read an integer scalar; `None` if absent or not an integer.
    pub fn get_int(&self, oid: &str) -> Option<i64> {
        self.get(oid).ok().and_then(|v| v.as_int())
    }

    /// Write `value` on behalf of a network request.
    ///
    /// Fails on unknown OIDs, read-only instances and values that cannot be
    /// coerced to the instance kind. Returns the value as stored.
    pub fn set(&self, oid: &str, value: MibValue) -> KeyShareResult<MibValue> {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.write(oid, value, false)
    }

    /// Write `value` bypassing the read-only check. Internal callers only.
    pub fn set_admin(&self, oid: &str, value: MibValue) -> KeyShareResult<MibValue> {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.write(oid, value, true)
    }

    /// The entry immediately after `oid` in insertion order.
    ///
    /// With `expected_row`, the row id encoded in `oid` must match it.
    pub fn get_next(
        &self,
        oid: &str,
        expected_row: Option<u64>,
    ) -> KeyShareResult<(String, MibValue)> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        if !inner.contains(oid) {
            return Err(KeyShareError::UnknownOid(oid.into()));
        }
        let next = inner
            .next_oid(oid)
            .ok_or_else(|| KeyShareError::EndOfMib(oid.into()))?;
        if let Some(expected) = expected_row {
            if oid::oid_row_id(oid) != Some(expected) {
                return Err(KeyShareError::RowMismatch {
                    oid: oid.into(),
                    expected,
                });
            }
        }
        let value = inner.get(&next)?;
        Ok((next, value))
    }

    /// Insert all six columns of a key row at once.
    ///
    /// Returns the row's visibility OID and value.
    pub fn add_key_row(&self, row: KeyRow) -> KeyShareResult<(String, MibValue)> {
        let visibility_oid = TableOid::new(oid::KeyColumn::Visibility, row.key_id).to_oid();
        let visibility = MibValue::Int(row.visibility.into());
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.keys.insert(row)?;
        Ok((visibility_oid, visibility))
    }

    /// Remove the whole row addressed by `oid` (any of its column OIDs).
    pub fn remove_key_row(&self, oid: &str) -> KeyShareResult<KeyRow> {
        let row_id = Self::oid_row_id(oid)?;
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner
            .keys
            .remove(row_id)
            .ok_or_else(|| KeyShareError::UnknownOid(oid.into()))
    }

    /// Row id of the key-table OID `oid`.
    pub fn oid_row_id(oid: &str) -> KeyShareResult<u64> {
        TableOid::parse(oid)
            .map(|addr| addr.row_id)
            .ok_or_else(|| KeyShareError::UnknownOid(oid.into()))
    }

    /// Copy of a key row.
    pub fn key_row(&self, row_id: u64) -> Option<KeyRow> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.keys.get(row_id).cloned()
    }

    /// Number of rows whose visibility makes them valid keys.
    pub fn valid_key_count(&self) -> u64 {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.keys.valid_count()
    }

    /// Number of rows in the key table.
    pub fn key_row_count(&self) -> usize {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.keys.len()
    }

    /// Highest row id currently stored.
    pub fn max_row_id(&self) -> Option<u64> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.keys.max_row_id()
    }

    /// Remove every row whose expiration stamp is before `now` under a
    /// single write lock.
    pub fn remove_expired(&self, now: (i64, i64)) -> Vec<KeyRow> {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let expired: Vec<u64> = inner
            .keys
            .iter()
            .filter(|row| row.is_expired(now))
            .map(|row| row.key_id)
            .collect();
        let removed: Vec<KeyRow> = expired
            .into_iter()
            .filter_map(|id| inner.keys.remove(id))
            .collect();
        if !removed.is_empty() {
            debug!(count = removed.len(), "Removed expired key rows");
        }
        removed
    }

    /// Every OID in traversal order.
    pub fn oids(&self) -> Vec<String> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        let mut oids: Vec<String> = inner.scalars.iter().map(|(o, _)| o.clone()).collect();
        let mut cursor = inner.keys.first_oid();
        while let Some(addr) = cursor {
            oids.push(addr.to_oid());
            cursor = inner.keys.next_oid(addr);
        }
        oids
    }
}
