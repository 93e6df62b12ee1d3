//! KeyShareAgent: the request state machine and key lifecycle.
//!
//! The agent owns the MIB and the Z matrix. Requests are answered item by
//! item: a failing item lands in the response's error list and processing
//! moves on, so a batch never aborts on a single bad OID. Only protocol
//! failures (bad primitive, reused request id) reject a request whole.

use crate::clock::{stamp, Clock};
use crate::error::{KernelError, KernelResult};
use crate::matrix::{generate_master_key, Alphabet, SeedVariant, ZMatrix};
use async_trait::async_trait;
use keyshare_mib::{load_snapshot, save_snapshot, KeyRow, MibSnapshot, MibStore, ScalarDefaults};
use keyshare_types::config::{validate_alphabet, KeyShareConfig};
use keyshare_types::error::{KeyShareError, KeyShareResult};
use keyshare_types::oid;
use keyshare_types::value::{MibValue, ValueKind, Visibility};
use keyshare_wire::{PduError, PduHandler, Pdu, Primitive, RequestLedger, VarBind};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Lower bound for the maintenance sleep, whatever 1.4.0 says.
const MIN_UPDATE_INTERVAL: Duration = Duration::from_millis(10);

/// The key-issuing agent.
pub struct KeyShareAgent {
    config: KeyShareConfig,
    mib: MibStore,
    /// Held for the whole of a key issuance so quota check, derivation and
    /// insertion happen as one step.
    matrix: Mutex<ZMatrix>,
    /// Row id for the next issued key.
    next_row_id: AtomicU64,
    /// Derivation counter `N`.
    key_counter: AtomicU64,
    ledger: RequestLedger,
    clock: Arc<dyn Clock>,
    booted_at: Instant,
}

impl KeyShareAgent {
    /// Build the agent: restore the MIB from the snapshot if there is one,
    /// otherwise seed a fresh one from `config`, then build the matrix.
    pub fn boot(config: KeyShareConfig, clock: Arc<dyn Clock>) -> KernelResult<Self> {
        config.key_maintenance.validate()?;
        let km = &config.key_maintenance;
        let variant = if km.single_seed {
            SeedVariant::Single(km.matrix_seed)
        } else {
            SeedVariant::Split
        };
        let (restart_date, restart_time) = stamp(clock.now());

        let restored = match snapshot_path(&config) {
            Some(path) => load_snapshot(path)?,
            None => None,
        };

        let (mib, key_counter) = match restored {
            Some(snapshot) => {
                let key_counter = snapshot.key_counter;
                let mib = MibStore::restore(snapshot, restart_date, restart_time)?;
                info!(
                    rows = mib.key_row_count(),
                    key_counter, "Restored MIB from snapshot"
                );
                (mib, key_counter)
            }
            None => {
                let master_key = if km.master_key.is_empty() {
                    info!(matrix_size = km.matrix_size, "No master key configured; generated one");
                    generate_master_key(km.matrix_size)
                } else {
                    km.master_key.clone()
                };
                let mib = MibStore::bootstrap(&ScalarDefaults {
                    restart_date,
                    restart_time,
                    key_size: km.matrix_size as i64,
                    update_interval_ms: clamp_to_i64(km.update_interval_ms),
                    max_keys: clamp_to_i64(km.max_keys),
                    key_ttl_secs: clamp_to_i64(km.key_ttl_secs),
                    master_key,
                    first_char: i64::from(km.first_char),
                    cardinality: i64::from(km.cardinality),
                });
                (mib, 0)
            }
        };

        let matrix = Self::seed_matrix(&mib, &config, variant)?;
        let next_row_id = mib.max_row_id().map_or(1, |max| max + 1);

        let agent = Self {
            ledger: RequestLedger::new(config.agent.duplicate_window()),
            config,
            mib,
            matrix: Mutex::new(matrix),
            next_row_id: AtomicU64::new(next_row_id),
            key_counter: AtomicU64::new(key_counter),
            clock,
            booted_at: Instant::now(),
        };
        agent.refresh_valid_count();

        info!(
            matrix_size = agent.matrix_size(),
            interval_ms = agent.update_interval().as_millis() as u64,
            key_ttl_secs = agent.mib.get_int(oid::SYSTEM_KEY_TTL).unwrap_or_default(),
            max_keys = agent.mib.get_int(oid::SYSTEM_MAX_KEYS).unwrap_or_default(),
            next_row_id,
            "KeyShare agent booted"
        );
        Ok(agent)
    }

    /// Seed Z from the key size and master key the MIB holds. A restored MIB
    /// whose pair no longer fits falls back to the configured values, which
    /// are then written back.
    fn seed_matrix(
        mib: &MibStore,
        config: &KeyShareConfig,
        variant: SeedVariant,
    ) -> KernelResult<ZMatrix> {
        let size = mib
            .get_int(oid::SYSTEM_KEY_SIZE)
            .and_then(|k| usize::try_from(k).ok());
        let master = mib
            .get(oid::CONFIG_MASTER_KEY)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string));
        if let (Some(size), Some(master)) = (size, master) {
            match ZMatrix::from_master_key(&master, size, variant) {
                Ok(matrix) => return Ok(matrix),
                Err(e) => warn!(error = %e, "Stored master key unusable; falling back to config"),
            }
        }

        let km = &config.key_maintenance;
        let master = if km.master_key.is_empty() {
            generate_master_key(km.matrix_size)
        } else {
            km.master_key.clone()
        };
        let matrix = ZMatrix::from_master_key(&master, km.matrix_size, variant)
            .map_err(|e| KernelError::BootFailed(e.to_string()))?;
        mib.set_admin(oid::SYSTEM_KEY_SIZE, MibValue::Int(km.matrix_size as i64))?;
        mib.set_admin(oid::CONFIG_MASTER_KEY, MibValue::Str(master))?;
        Ok(matrix)
    }

    pub fn config(&self) -> &KeyShareConfig {
        &self.config
    }

    pub fn mib(&self) -> &MibStore {
        &self.mib
    }

    /// Time since boot.
    pub fn uptime(&self) -> Duration {
        self.booted_at.elapsed()
    }

    pub fn matrix_size(&self) -> usize {
        self.matrix.lock().unwrap_or_else(|e| e.into_inner()).size()
    }

    /// Answer one request. `None` means the PDU is not something the agent
    /// replies to.
    pub fn handle(&self, pdu: Pdu, source: SocketAddr) -> Option<Pdu> {
        let request_id = pdu.request_id;
        match pdu.primitive {
            Primitive::Response => {
                debug!(request_id, %source, "Ignoring inbound response PDU");
                return None;
            }
            Primitive::Unknown(raw) => {
                warn!(request_id, primitive = raw, %source, "Invalid primitive");
                return Some(Pdu::protocol_error(
                    request_id,
                    &KeyShareError::InvalidPrimitive(raw),
                ));
            }
            Primitive::Get | Primitive::Set => {}
        }
        if let Err(e) = self.ledger.check_and_record(request_id) {
            warn!(request_id, %source, "Duplicate request rejected");
            return Some(Pdu::protocol_error(request_id, &e));
        }

        let requester = source.to_string();
        let mut results = Vec::new();
        let mut errors = Vec::new();
        match pdu.primitive {
            Primitive::Get => {
                for item in pdu.list {
                    self.get_item(item, &requester, &mut results, &mut errors);
                }
            }
            _ => {
                for item in pdu.list {
                    match self.set_item(&item.oid, item.value, &requester) {
                        Ok(written) => results.push(written),
                        Err(e) => errors.push(PduError::new(item.oid, &e)),
                    }
                }
            }
        }
        debug!(
            request_id,
            results = results.len(),
            errors = errors.len(),
            "Request served"
        );
        Some(Pdu::response(request_id, results, errors))
    }

    /// Resolve one GET item: the OID itself, then up to `follow` instances
    /// after it.
    fn get_item(
        &self,
        item: VarBind,
        requester: &str,
        results: &mut Vec<VarBind>,
        errors: &mut Vec<PduError>,
    ) {
        let follow = match item
            .value
            .coerce(ValueKind::Integer)
            .and_then(|v| v.as_int())
            .and_then(|n| u64::try_from(n).ok())
        {
            Some(n) => n,
            None => {
                let err = KeyShareError::TypeMismatch {
                    oid: item.oid.clone(),
                    expected: ValueKind::Integer,
                };
                errors.push(PduError::new(item.oid, &err));
                return;
            }
        };

        match self.read_visible(&item.oid, requester) {
            Ok(value) => results.push(VarBind::new(item.oid.clone(), value)),
            Err(e @ KeyShareError::UnknownOid(_)) => {
                // Nothing to walk from.
                errors.push(PduError::new(item.oid, &e));
                return;
            }
            Err(e) => errors.push(PduError::new(item.oid.clone(), &e)),
        }

        let mut cursor = item.oid;
        for _ in 0..follow {
            let expected_row = oid::is_table_oid(&cursor)
                .then(|| oid::oid_row_id(&cursor))
                .flatten();
            match self.mib.get_next(&cursor, expected_row) {
                Ok((next, value)) => {
                    if oid::is_table_oid(&next) {
                        match self.check_key_visible(&next, requester) {
                            Ok(()) => results.push(VarBind::new(next.clone(), value)),
                            Err(e) => errors.push(PduError::new(next.clone(), &e)),
                        }
                    } else {
                        results.push(VarBind::new(next.clone(), value));
                    }
                    cursor = next;
                }
                Err(e) => {
                    errors.push(PduError::new(cursor, &e));
                    break;
                }
            }
        }
    }

    /// Read `oid`, enforcing key visibility inside the key table.
    pub fn read_visible(&self, oid: &str, requester: &str) -> KeyShareResult<MibValue> {
        if oid::is_table_oid(oid) {
            self.check_key_visible(oid, requester)?;
        }
        self.mib.get(oid)
    }

    /// Fail `KeyInvisible` unless the row behind `oid` may be shown to
    /// `requester`.
    pub fn check_key_visible(&self, oid: &str, requester: &str) -> KeyShareResult<()> {
        let row_id = MibStore::oid_row_id(oid)?;
        let row = self
            .mib
            .key_row(row_id)
            .ok_or_else(|| KeyShareError::UnknownOid(oid.to_string()))?;
        match row.visibility {
            Visibility::Public => Ok(()),
            Visibility::RequesterOnly if row.requester == requester => Ok(()),
            Visibility::RequesterOnly | Visibility::Private => {
                Err(KeyShareError::KeyInvisible(oid.to_string()))
            }
        }
    }

    /// Apply one SET item and return what was written.
    fn set_item(&self, oid: &str, value: MibValue, requester: &str) -> KeyShareResult<VarBind> {
        if oid == oid::KEY_ISSUE_TRIGGER {
            let (oid, value) = self.issue_key(value, requester)?;
            return Ok(VarBind::new(oid, value));
        }
        if oid == oid::CONFIG_FIRST_CHAR || oid == oid::CONFIG_CARDINALITY {
            self.check_alphabet_write(oid, &value)?;
        }
        let stored = self.mib.set(oid, value)?;
        Ok(VarBind::new(oid, stored))
    }

    /// Reject alphabet writes that would make keys unprintable.
    fn check_alphabet_write(&self, oid: &str, value: &MibValue) -> KeyShareResult<()> {
        // Type errors are left to the store.
        let Some(new) = value.clone().coerce(ValueKind::Integer).and_then(|v| v.as_int()) else {
            return Ok(());
        };
        let mut first = self.mib.get_int(oid::CONFIG_FIRST_CHAR).unwrap_or_default();
        let mut cardinality = self.mib.get_int(oid::CONFIG_CARDINALITY).unwrap_or_default();
        if oid == oid::CONFIG_FIRST_CHAR {
            first = new;
        } else {
            cardinality = new;
        }
        validate_alphabet(first, cardinality)
    }

    /// Issue a key with the requested visibility for `requester`.
    ///
    /// Returns the new row's visibility OID and value.
    pub fn issue_key(
        &self,
        visibility: MibValue,
        requester: &str,
    ) -> KeyShareResult<(String, MibValue)> {
        let visibility = visibility
            .coerce(ValueKind::Integer)
            .and_then(|v| v.as_int())
            .and_then(|n| Visibility::try_from(n).ok())
            .ok_or_else(|| KeyShareError::TypeMismatch {
                oid: oid::KEY_ISSUE_TRIGGER.to_string(),
                expected: ValueKind::Integer,
            })?;

        let matrix = self.matrix.lock().unwrap_or_else(|e| e.into_inner());

        let max = self.mib.get_int(oid::SYSTEM_MAX_KEYS).unwrap_or_default();
        let current = self.mib.valid_key_count();
        if i64::try_from(current).unwrap_or(i64::MAX) >= max {
            return Err(KeyShareError::QuotaExceeded {
                current,
                max: u64::try_from(max).unwrap_or_default(),
            });
        }

        let alphabet = Alphabet::new(
            self.mib.get_int(oid::CONFIG_FIRST_CHAR).unwrap_or_default(),
            self.mib.get_int(oid::CONFIG_CARDINALITY).unwrap_or_default(),
        )?;
        let ttl = self.mib.get_int(oid::SYSTEM_KEY_TTL).unwrap_or_default();
        let expires = chrono::Duration::try_seconds(ttl)
            .and_then(|ttl| self.clock.now().checked_add_signed(ttl))
            .ok_or_else(|| KeyShareError::Config(format!("key TTL {ttl}s is out of range")))?;
        let (expiration_date, expiration_time) = stamp(expires);

        let counter = self.key_counter.fetch_add(1, Ordering::SeqCst);
        let value = matrix.derive(counter, alphabet);
        let key_id = self.next_row_id.fetch_add(1, Ordering::SeqCst);

        let issued = self.mib.add_key_row(KeyRow {
            key_id,
            value,
            requester: requester.to_string(),
            expiration_date,
            expiration_time,
            visibility,
        })?;
        drop(matrix);
        self.refresh_valid_count();

        info!(
            key_id,
            visibility = ?visibility,
            requester,
            expiration_date,
            expiration_time,
            "Key issued"
        );
        Ok(issued)
    }

    /// Remove every key whose expiration stamp is in the past.
    pub fn sweep_expired(&self) -> usize {
        let removed = self.mib.remove_expired(stamp(self.clock.now()));
        for row in &removed {
            info!(
                key_id = row.key_id,
                expiration_date = row.expiration_date,
                expiration_time = row.expiration_time,
                "Expired key removed"
            );
        }
        if !removed.is_empty() {
            self.refresh_valid_count();
        }
        removed.len()
    }

    /// Recompute 3.1.0 from the key table.
    pub fn refresh_valid_count(&self) {
        let count = self.mib.valid_key_count();
        let value = MibValue::Int(i64::try_from(count).unwrap_or(i64::MAX));
        if let Err(e) = self.mib.set_admin(oid::DATA_VALID_KEYS, value) {
            warn!(error = %e, "Could not update the valid key counter");
        }
    }

    /// Evolve Z once.
    pub fn evolve_matrix(&self) {
        self.matrix
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .evolve();
    }

    /// One maintenance iteration: evolve, sweep, recount, prune the ledger.
    pub fn maintenance_tick(&self) {
        self.evolve_matrix();
        self.sweep_expired();
        self.refresh_valid_count();
        self.ledger.prune();
    }

    /// Sleep between maintenance iterations, read live from 1.4.0.
    pub fn update_interval(&self) -> Duration {
        self.mib
            .get_int(oid::SYSTEM_INTERVAL_UPDATE)
            .and_then(|ms| u64::try_from(ms).ok())
            .map(Duration::from_millis)
            .unwrap_or(MIN_UPDATE_INTERVAL)
            .max(MIN_UPDATE_INTERVAL)
    }

    /// Capture the MIB together with the derivation counter.
    pub fn snapshot(&self) -> MibSnapshot {
        self.mib.snapshot(self.key_counter.load(Ordering::SeqCst))
    }

    /// Write the snapshot if persistence is configured. Returns the path
    /// written to.
    pub fn persist(&self) -> KernelResult<Option<PathBuf>> {
        let Some(path) = snapshot_path(&self.config) else {
            return Ok(None);
        };
        save_snapshot(path, &self.snapshot())?;
        Ok(Some(path.to_path_buf()))
    }
}

#[async_trait]
impl PduHandler for KeyShareAgent {
    async fn handle_pdu(&self, pdu: Pdu, source: SocketAddr) -> Option<Pdu> {
        self.handle(pdu, source)
    }
}

/// Configured snapshot path; an empty path disables persistence.
fn snapshot_path(config: &KeyShareConfig) -> Option<&Path> {
    config
        .agent
        .snapshot_path
        .as_deref()
        .filter(|p| !p.as_os_str().is_empty())
}

fn clamp_to_i64(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::{NaiveDate, NaiveDateTime};
    use keyshare_types::error::ErrorCode;

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 16)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn config() -> KeyShareConfig {
        let mut config = KeyShareConfig::default();
        config.key_maintenance.matrix_size = 10;
        config.key_maintenance.master_key = "07994506586870582927".into();
        config.key_maintenance.max_keys = 2;
        config.key_maintenance.key_ttl_secs = 60;
        config.agent.duplicate_window_ms = 0;
        config
    }

    fn boot(config: KeyShareConfig) -> (KeyShareAgent, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(start()));
        let agent = KeyShareAgent::boot(config, clock.clone()).unwrap();
        (agent, clock)
    }

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    const ALICE: &str = "10.0.0.1:4000";
    const BOB: &str = "10.0.0.2:4000";

    fn issue(agent: &KeyShareAgent, p: u64, visibility: i64, from: &str) -> Pdu {
        agent
            .handle(
                Pdu::set(p, vec![VarBind::new(oid::KEY_ISSUE_TRIGGER, visibility)]),
                addr(from),
            )
            .unwrap()
    }

    #[test]
    fn test_boot_seeds_scalars() {
        let (agent, _) = boot(config());
        let mib = agent.mib();
        assert_eq!(mib.get("1.1.0").unwrap(), MibValue::Int(20261016));
        assert_eq!(mib.get("1.2.0").unwrap(), MibValue::Int(120000));
        assert_eq!(mib.get("1.3.0").unwrap(), MibValue::Int(10));
        assert_eq!(mib.get("2.2.0").unwrap(), MibValue::Int(33));
        assert_eq!(mib.get("2.3.0").unwrap(), MibValue::Int(94));
        assert_eq!(mib.get("3.1.0").unwrap(), MibValue::Int(0));
    }

    #[test]
    fn test_boot_generates_master_key_when_empty() {
        let mut cfg = config();
        cfg.key_maintenance.master_key.clear();
        let (agent, _) = boot(cfg);
        let master = agent.mib().get("2.1.0").unwrap();
        assert_eq!(master.as_str().map(str::len), Some(20));
    }

    #[test]
    fn test_boot_rejects_bad_master_key() {
        let mut cfg = config();
        cfg.key_maintenance.master_key = "123".into();
        let clock = Arc::new(ManualClock::new(start()));
        assert!(matches!(
            KeyShareAgent::boot(cfg, clock),
            Err(KernelError::KeyShare(KeyShareError::Config(_)))
        ));
    }

    #[test]
    fn test_issue_key_returns_visibility_oid() {
        let (agent, _) = boot(config());
        let response = issue(&agent, 1, 2, ALICE);
        assert!(response.errors.is_empty());
        assert_eq!(response.list, vec![VarBind::new("3.2.1.6.1", 2)]);

        let row = agent.mib().key_row(1).unwrap();
        assert_eq!(row.requester, ALICE);
        assert_eq!(row.value.chars().count(), 10);
        assert_eq!((row.expiration_date, row.expiration_time), (20261016, 120100));
        assert_eq!(agent.mib().get("3.1.0").unwrap(), MibValue::Int(1));
    }

    #[test]
    fn test_quota_then_expiry_frees_a_slot() {
        let (agent, clock) = boot(config());
        assert!(issue(&agent, 1, 1, ALICE).errors.is_empty());
        assert!(issue(&agent, 2, 2, ALICE).errors.is_empty());

        let refused = issue(&agent, 3, 2, ALICE);
        assert!(refused.list.is_empty());
        assert_eq!(refused.errors[0].oid, oid::KEY_ISSUE_TRIGGER);
        assert_eq!(refused.errors[0].code, ErrorCode::QuotaExceeded);

        clock.advance(chrono::Duration::seconds(61));
        assert_eq!(agent.sweep_expired(), 2);
        assert_eq!(agent.mib().get("3.1.0").unwrap(), MibValue::Int(0));

        let accepted = issue(&agent, 4, 2, ALICE);
        assert!(accepted.errors.is_empty());
        assert_eq!(accepted.list[0].oid, "3.2.1.6.3");
    }

    #[test]
    fn test_private_keys_do_not_count_towards_quota() {
        let (agent, _) = boot(config());
        for p in 1..=3 {
            assert!(issue(&agent, p, 0, ALICE).errors.is_empty());
        }
        assert_eq!(agent.mib().get("3.1.0").unwrap(), MibValue::Int(0));
    }

    #[test]
    fn test_visibility_rules() {
        let mut cfg = config();
        cfg.key_maintenance.max_keys = 5;
        let (agent, _) = boot(cfg);
        issue(&agent, 1, 1, ALICE);
        issue(&agent, 2, 2, ALICE);
        issue(&agent, 3, 0, ALICE);

        assert!(agent.check_key_visible("3.2.1.2.1", ALICE).is_ok());
        assert_eq!(
            agent.check_key_visible("3.2.1.2.1", BOB),
            Err(KeyShareError::KeyInvisible("3.2.1.2.1".into()))
        );
        assert!(agent.check_key_visible("3.2.1.2.2", BOB).is_ok());
        assert!(agent.check_key_visible("3.2.1.2.3", ALICE).is_err());
        assert!(agent.check_key_visible("3.2.1.2.3", BOB).is_err());

        // Same IP, different port is a different requester.
        assert!(agent.check_key_visible("3.2.1.2.1", "10.0.0.1:4001").is_err());

        // Zero-padded or signed segments do not address the row.
        for alias in ["3.2.1.02.1", "3.2.1.2.+1", "3.2.1.2.01"] {
            assert_eq!(
                agent.check_key_visible(alias, BOB),
                Err(KeyShareError::UnknownOid(alias.into()))
            );
        }
    }

    #[test]
    fn test_get_base_and_follow() {
        let (agent, _) = boot(config());
        let response = agent
            .handle(Pdu::get(1, [("1.1.0", 2), ("3.1.0", 0)]), addr(ALICE))
            .unwrap();
        let oids: Vec<&str> = response.list.iter().map(|v| v.oid.as_str()).collect();
        assert_eq!(oids, ["1.1.0", "1.2.0", "1.3.0", "3.1.0"]);
        assert!(response.errors.is_empty());
    }

    #[test]
    fn test_get_walk_into_invisible_row_reports_and_continues() {
        let mut cfg = config();
        cfg.key_maintenance.max_keys = 5;
        let (agent, _) = boot(cfg);
        issue(&agent, 1, 1, ALICE);

        let response = agent
            .handle(Pdu::get(2, [("3.1.0", 3)]), addr(BOB))
            .unwrap();
        assert_eq!(response.list, vec![VarBind::new("3.1.0", 1)]);
        let error_oids: Vec<&str> = response.errors.iter().map(|e| e.oid.as_str()).collect();
        assert_eq!(error_oids, ["3.2.1.1.1", "3.2.1.2.1", "3.2.1.3.1"]);
        assert!(response
            .errors
            .iter()
            .all(|e| e.code == ErrorCode::KeyInvisible));

        let own = agent
            .handle(Pdu::get(3, [("3.2.1.1.1", 6)]), addr(ALICE))
            .unwrap();
        assert_eq!(own.list.len(), 6);
        assert_eq!(own.list[1].value, agent.mib().get("3.2.1.2.1").unwrap());
        assert_eq!(own.errors.len(), 1);
        assert_eq!(own.errors[0].code, ErrorCode::EndOfMib);
    }

    #[test]
    fn test_get_unknown_oid_is_one_error() {
        let (agent, _) = boot(config());
        let response = agent
            .handle(Pdu::get(1, [("9.9.9", 4), ("1.5.0", 0)]), addr(ALICE))
            .unwrap();
        assert_eq!(response.errors.len(), 1);
        assert_eq!(response.errors[0].code, ErrorCode::UnknownOid);
        assert_eq!(response.list, vec![VarBind::new("1.5.0", 2)]);
    }

    #[test]
    fn test_set_partial_success() {
        let (agent, _) = boot(config());
        let response = agent
            .handle(
                Pdu::set(
                    1,
                    vec![
                        VarBind::new("1.5.0", 7),
                        VarBind::new("1.1.0", 1),
                        VarBind::new("1.6.0", "soon"),
                        VarBind::new("2.1.0", 5),
                    ],
                ),
                addr(ALICE),
            )
            .unwrap();
        assert_eq!(
            response.list,
            vec![VarBind::new("1.5.0", 7), VarBind::new("2.1.0", "5")]
        );
        let codes: Vec<ErrorCode> = response.errors.iter().map(|e| e.code).collect();
        assert_eq!(codes, [ErrorCode::ReadOnlyViolation, ErrorCode::TypeMismatch]);
        assert_eq!(agent.mib().get("1.5.0").unwrap(), MibValue::Int(7));
    }

    #[test]
    fn test_set_invalid_alphabet_rejected() {
        let (agent, _) = boot(config());
        let response = agent
            .handle(
                Pdu::set(1, vec![VarBind::new("2.3.0", 0)]),
                addr(ALICE),
            )
            .unwrap();
        assert_eq!(response.errors[0].code, ErrorCode::Config);
        assert_eq!(agent.mib().get("2.3.0").unwrap(), MibValue::Int(94));
    }

    #[test]
    fn test_set_alphabet_at_integer_limits_is_rejected() {
        let (agent, _) = boot(config());
        let response = agent
            .handle(
                Pdu::set(
                    1,
                    vec![
                        VarBind::new("2.2.0", i64::MAX),
                        VarBind::new("2.3.0", i64::MAX),
                    ],
                ),
                addr(ALICE),
            )
            .unwrap();
        assert!(response.list.is_empty());
        let codes: Vec<ErrorCode> = response.errors.iter().map(|e| e.code).collect();
        assert_eq!(codes, [ErrorCode::Config, ErrorCode::Config]);
        assert_eq!(agent.mib().get("2.2.0").unwrap(), MibValue::Int(33));
        assert_eq!(agent.mib().get("2.3.0").unwrap(), MibValue::Int(94));

        // Issuance still works with the untouched alphabet.
        assert!(issue(&agent, 2, 2, ALICE).errors.is_empty());
    }

    #[test]
    fn test_issue_with_bad_visibility() {
        let (agent, _) = boot(config());
        let response = issue(&agent, 1, 3, ALICE);
        assert_eq!(response.errors[0].code, ErrorCode::TypeMismatch);
        assert_eq!(agent.mib().key_row_count(), 0);
    }

    #[test]
    fn test_protocol_level_rejections() {
        let mut cfg = config();
        cfg.agent.duplicate_window_ms = 60_000;
        let (agent, _) = boot(cfg);

        let mut odd = Pdu::get(1, [("1.1.0", 0)]);
        odd.primitive = Primitive::Unknown(5);
        let response = agent.handle(odd, addr(ALICE)).unwrap();
        assert_eq!(response.errors[0].oid, "0");
        assert_eq!(response.errors[0].code, ErrorCode::InvalidPrimitive);

        let wide = br#"{"S":0,"NS":0,"Q":[],"P":4,"Y":300,"NL_or_NW":0,"L_or_W":[],"NR":0,"R":[]}"#;
        let response = agent
            .handle(keyshare_wire::decode_pdu(wide).unwrap(), addr(ALICE))
            .unwrap();
        assert_eq!(response.request_id, 4);
        assert_eq!(response.errors[0].code, ErrorCode::InvalidPrimitive);

        assert!(agent
            .handle(Pdu::response(2, Vec::new(), Vec::new()), addr(ALICE))
            .is_none());

        assert!(agent
            .handle(Pdu::get(3, [("1.1.0", 0)]), addr(ALICE))
            .unwrap()
            .errors
            .is_empty());
        let duplicate = agent
            .handle(Pdu::get(3, [("1.1.0", 0)]), addr(BOB))
            .unwrap();
        assert!(duplicate.list.is_empty());
        assert_eq!(duplicate.errors[0].code, ErrorCode::DuplicateRequest);
    }

    #[test]
    fn test_derivation_is_reproducible_across_agents() {
        let (a, _) = boot(config());
        let (b, _) = boot(config());
        issue(&a, 1, 2, ALICE);
        issue(&b, 1, 2, BOB);
        assert_eq!(a.mib().key_row(1).unwrap().value, b.mib().key_row(1).unwrap().value);
    }

    #[test]
    fn test_update_interval_is_live_and_clamped() {
        let (agent, _) = boot(config());
        assert_eq!(agent.update_interval(), Duration::from_millis(1000));
        agent.mib().set("1.4.0", MibValue::Int(250)).unwrap();
        assert_eq!(agent.update_interval(), Duration::from_millis(250));
        agent.mib().set("1.4.0", MibValue::Int(-5)).unwrap();
        assert_eq!(agent.update_interval(), MIN_UPDATE_INTERVAL);
    }

    #[test]
    fn test_snapshot_restore_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config();
        cfg.agent.snapshot_path = Some(dir.path().join("mib.msgpack"));
        cfg.key_maintenance.master_key.clear();

        let (agent, clock) = boot(cfg.clone());
        issue(&agent, 1, 2, ALICE);
        agent.mib().set("1.5.0", MibValue::Int(9)).unwrap();
        let issued = agent.mib().key_row(1).unwrap();
        let master = agent.mib().get("2.1.0").unwrap();
        assert!(agent.persist().unwrap().is_some());

        clock.advance(chrono::Duration::seconds(5));
        let restored = KeyShareAgent::boot(cfg, clock.clone()).unwrap();
        assert_eq!(restored.mib().get("1.2.0").unwrap(), MibValue::Int(120005));
        assert_eq!(restored.mib().get("1.5.0").unwrap(), MibValue::Int(9));
        assert_eq!(restored.mib().get("2.1.0").unwrap(), master);
        assert_eq!(restored.mib().key_row(1), Some(issued));

        let next = issue(&restored, 2, 2, BOB);
        assert_eq!(next.list[0].oid, "3.2.1.6.2");
    }

    #[test]
    fn test_maintenance_tick_sweeps_and_recounts() {
        let (agent, clock) = boot(config());
        issue(&agent, 1, 2, ALICE);
        clock.advance(chrono::Duration::seconds(120));
        agent.maintenance_tick();
        assert_eq!(agent.mib().key_row_count(), 0);
        assert_eq!(agent.mib().get("3.1.0").unwrap(), MibValue::Int(0));
    }
}
