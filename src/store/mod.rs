//! Referral store: a consistent, ordered view over the ledger plus the two
//! mutations the system allows (create, and pending → matched | rejected).
//!
//! Creating a referral is two separate ledger writes: the record first, then
//! the index. Nothing makes the pair atomic, so a record can exist without
//! being indexed (failed or lost index write) and an indexed id can lack a
//! visible record (lagging reads). Both are tolerated by [`ReferralStore::load_all`].

use std::collections::HashSet;
use std::sync::Arc;

use rand::Rng;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::codec::{decode_referral, encode_referral};
use crate::config::{ConfigError, StoreConfig, WriteMode};
use crate::error::{LedgerError, ReferralError, ReferralResult};
use crate::index::IndexManager;
use crate::ledger::{CasOutcome, LedgerClient, WriteRequest};
use crate::referral::{Referral, ReferralId, ReferralInput, ReferralStatus, Verdict};
use crate::wallet::Wallet;

const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const ID_SUFFIX_LEN: usize = 7;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// Indexed, but nothing (or an empty value) stored under the record key.
    Missing,
    Malformed { error: String },
    Unreadable { error: LedgerError },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SkippedRecord {
    pub id: ReferralId,
    pub reason: SkipReason,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub referrals: Vec<Referral>,
    pub skipped: Vec<SkippedRecord>,
}

pub struct ReferralStore<L: LedgerClient> {
    ledger: Arc<L>,
    wallet: Arc<dyn Wallet>,
    clock: Arc<dyn Clock>,
    config: StoreConfig,
}

impl<L: LedgerClient> ReferralStore<L> {
    pub fn new(ledger: Arc<L>, wallet: Arc<dyn Wallet>) -> Self {
        Self {
            ledger,
            wallet,
            clock: Arc::new(SystemClock),
            config: StoreConfig::default(),
        }
    }

    pub fn with_config(mut self, config: StoreConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Arc<L> {
        &self.ledger
    }

    pub fn wallet(&self) -> &Arc<dyn Wallet> {
        &self.wallet
    }

    pub fn index(&self) -> IndexManager<'_, L> {
        IndexManager::new(&*self.ledger, &*self.wallet, &self.config.index_key)
    }

    /// Every readable referral, newest first.
    pub fn load_all(&self) -> ReferralResult<Vec<Referral>> {
        Ok(self.load_report()?.referrals)
    }

    /// Like [`Self::load_all`], also listing the indexed ids that were skipped.
    pub fn load_report(&self) -> ReferralResult<LoadReport> {
        if !self.ledger.is_available() {
            return Err(LedgerError::Unavailable.into());
        }
        let ids = self.index().get()?;
        let mut seen = HashSet::with_capacity(ids.len());
        let mut report = LoadReport::default();
        for id in ids {
            if !seen.insert(id.clone()) {
                continue;
            }
            let key = self.config.record_key(&id);
            let reason = match self.ledger.read(&key) {
                Ok(Some(bytes)) if !bytes.is_empty() => match decode_referral(&id, &bytes) {
                    Ok(referral) => {
                        report.referrals.push(referral);
                        continue;
                    }
                    Err(err) => SkipReason::Malformed {
                        error: err.to_string(),
                    },
                },
                Ok(_) => SkipReason::Missing,
                Err(error) => SkipReason::Unreadable { error },
            };
            warn!(%id, ?reason, "skipping referral record");
            report.skipped.push(SkippedRecord { id, reason });
        }
        sort_newest_first(&mut report.referrals);
        debug!(
            loaded = report.referrals.len(),
            skipped = report.skipped.len(),
            "referrals loaded"
        );
        Ok(report)
    }

    /// Read a single record.
    pub fn get(&self, id: &str) -> ReferralResult<Referral> {
        let bytes = self
            .ledger
            .read(&self.config.record_key(id))?
            .filter(|bytes| !bytes.is_empty())
            .ok_or_else(|| ReferralError::NotFound { id: id.to_string() })?;
        decode_referral(id, &bytes).map_err(|source| ReferralError::Decode {
            id: id.to_string(),
            source,
        })
    }

    pub fn create(&self, input: ReferralInput) -> ReferralResult<Referral> {
        let referrer = input.referrer.trim();
        if referrer.is_empty() {
            return Err(ReferralError::NotAuthenticated);
        }
        if input.position.trim().is_empty() {
            return Err(ReferralError::Validation { field: "position" });
        }
        if input.encrypted_data.trim().is_empty() {
            return Err(ReferralError::Validation {
                field: "encrypted_data",
            });
        }

        let known = self.index().snapshot()?;
        let timestamp = self.clock.now_secs();
        let atomic = self.uses_compare_and_swap();
        for attempt in 1..=self.config.id_attempts {
            let id = self.fresh_id();
            if known.contains(&id) {
                debug!(%id, attempt, "generated id already indexed; regenerating");
                continue;
            }
            let referral = Referral {
                id: id.clone(),
                encrypted_data: input.encrypted_data.clone(),
                timestamp,
                referrer: referrer.to_string(),
                position: input.position.clone(),
                status: ReferralStatus::Pending,
            };
            let key = self.config.record_key(&id);
            let request = WriteRequest::signed(&key, encode_referral(&referral), &*self.wallet)?;
            if atomic {
                if let CasOutcome::Conflict { .. } = self.ledger.compare_and_swap(request, None)? {
                    debug!(%id, attempt, "record key already taken; regenerating");
                    continue;
                }
            } else {
                self.ledger.write(request)?;
            }
            self.append_to_index(&id)?;
            info!(%id, position = %referral.position, "referral created");
            return Ok(referral);
        }
        Err(LedgerError::Contention {
            key: self.config.record_prefix.clone(),
            attempts: self.config.id_attempts,
        }
        .into())
    }

    /// Move a pending referral to a terminal status on behalf of
    /// `acting_identity`, which must be the referral's referrer.
    pub fn transition(
        &self,
        id: &str,
        verdict: Verdict,
        acting_identity: &str,
    ) -> ReferralResult<Referral> {
        let actor = acting_identity.trim();
        if actor.is_empty() {
            return Err(ReferralError::NotAuthenticated);
        }
        let target = ReferralStatus::from(verdict);
        let key = self.config.record_key(id);
        let atomic = self.uses_compare_and_swap();
        let attempts = if atomic { self.config.cas_attempts } else { 1 };

        let mut stored = self.ledger.read(&key)?;
        for attempt in 1..=attempts {
            let bytes = stored
                .take()
                .filter(|bytes| !bytes.is_empty())
                .ok_or_else(|| ReferralError::NotFound { id: id.to_string() })?;
            let current = decode_referral(id, &bytes).map_err(|source| ReferralError::Decode {
                id: id.to_string(),
                source,
            })?;
            if !current.is_referrer(actor) {
                return Err(ReferralError::NotAuthorized {
                    id: id.to_string(),
                    identity: actor.to_string(),
                });
            }
            if current.status.is_terminal() {
                return Err(ReferralError::InvalidTransition {
                    id: id.to_string(),
                    from: current.status,
                    to: target,
                });
            }

            let updated = current.with_status(target);
            let request = WriteRequest::signed(&key, encode_referral(&updated), &*self.wallet)?;
            if atomic {
                match self.ledger.compare_and_swap(request, Some(bytes.as_slice()))? {
                    CasOutcome::Swapped => {}
                    CasOutcome::Conflict { current: latest } => {
                        debug!(%id, attempt, "record changed during transition; re-checking");
                        stored = latest;
                        continue;
                    }
                }
            } else {
                self.ledger.write(request)?;
            }
            info!(%id, status = %target, "referral transitioned");
            return Ok(updated);
        }
        Err(LedgerError::Contention { key, attempts }.into())
    }

    fn uses_compare_and_swap(&self) -> bool {
        self.config.write_mode == WriteMode::Atomic && self.ledger.supports_compare_and_swap()
    }

    fn append_to_index(&self, id: &str) -> ReferralResult<()> {
        let index = self.index();
        match self.config.write_mode {
            WriteMode::ReadModifyWrite => index.append(id),
            WriteMode::Atomic if self.ledger.supports_compare_and_swap() => {
                index.append_atomic(id, self.config.cas_attempts)
            }
            WriteMode::Atomic => {
                warn!(%id, "ledger lacks compare-and-swap; index append can race other clients");
                index.append(id)
            }
        }
    }

    /// `<unix millis>-<7 base36 chars>`.
    fn fresh_id(&self) -> ReferralId {
        let mut rng = rand::thread_rng();
        let suffix: String = (0..ID_SUFFIX_LEN)
            .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
            .collect();
        format!("{}-{}", self.clock.now_millis(), suffix)
    }
}

/// Display order: timestamp descending, ties broken by id descending.
pub fn sort_newest_first(referrals: &mut [Referral]) {
    referrals.sort_by(|a, b| {
        b.timestamp
            .cmp(&a.timestamp)
            .then_with(|| b.id.cmp(&a.id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::codec::encode_index;
    use crate::config::DEFAULT_INDEX_KEY;
    use crate::ledger::MemoryLedger;
    use crate::wallet::LocalWallet;

    struct Fixture {
        ledger: Arc<MemoryLedger>,
        clock: Arc<FixedClock>,
        store: ReferralStore<MemoryLedger>,
    }

    fn fixture(ledger: MemoryLedger) -> Fixture {
        let ledger = Arc::new(ledger);
        let clock = Arc::new(FixedClock::at_secs(1_700_000_000));
        let store = ReferralStore::new(ledger.clone(), Arc::new(LocalWallet::generate()))
            .with_clock(clock.clone());
        Fixture {
            ledger,
            clock,
            store,
        }
    }

    fn input(position: &str, referrer: &str) -> ReferralInput {
        ReferralInput {
            position: position.into(),
            encrypted_data: "FHE-Y3Q=".into(),
            referrer: referrer.into(),
        }
    }

    #[test]
    fn created_referral_is_pending_and_listed_once() {
        let fx = fixture(MemoryLedger::new());
        let created = fx.store.create(input("Data Engineer", "0xAAA")).unwrap();
        assert_eq!(created.status, ReferralStatus::Pending);
        assert_eq!(created.timestamp, 1_700_000_000);

        let all = fx.store.load_all().unwrap();
        assert_eq!(all, vec![created.clone()]);
        assert_eq!(fx.store.index().get().unwrap(), vec![created.id.clone()]);
        assert!(fx
            .ledger
            .keys()
            .contains(&format!("referral_{}", created.id)));
    }

    #[test]
    fn ids_carry_millis_and_a_base36_suffix() {
        let fx = fixture(MemoryLedger::new());
        let id = fx.store.create(input("QA", "0xAAA")).unwrap().id;
        let (millis, suffix) = id.split_once('-').unwrap();
        assert_eq!(millis, "1700000000000");
        assert_eq!(suffix.len(), 7);
        assert!(suffix.bytes().all(|b| ID_ALPHABET.contains(&b)));
    }

    #[test]
    fn create_validates_before_touching_the_ledger() {
        let fx = fixture(MemoryLedger::new());
        assert!(matches!(
            fx.store.create(input("QA", "")),
            Err(ReferralError::NotAuthenticated)
        ));
        assert!(matches!(
            fx.store.create(input("  ", "0xAAA")),
            Err(ReferralError::Validation { field: "position" })
        ));
        let mut empty_data = input("QA", "0xAAA");
        empty_data.encrypted_data.clear();
        assert!(matches!(
            fx.store.create(empty_data),
            Err(ReferralError::Validation {
                field: "encrypted_data"
            })
        ));
        assert!(fx.ledger.keys().is_empty());
    }

    #[test]
    fn load_all_orders_newest_first_and_is_repeatable() {
        let fx = fixture(MemoryLedger::new());
        let first = fx.store.create(input("Backend", "0xAAA")).unwrap();
        fx.clock.advance_secs(60);
        let second = fx.store.create(input("Frontend", "0xBBB")).unwrap();
        fx.clock.advance_secs(60);
        let third = fx.store.create(input("Design", "0xAAA")).unwrap();

        let listed = fx.store.load_all().unwrap();
        let ids: Vec<_> = listed.iter().map(|r| r.id.clone()).collect();
        assert_eq!(ids, vec![third.id, second.id, first.id]);
        assert_eq!(fx.store.load_all().unwrap(), listed);
    }

    #[test]
    fn load_skips_dangling_malformed_and_duplicate_ids() {
        let fx = fixture(MemoryLedger::new());
        let good = fx.store.create(input("SRE", "0xAAA")).unwrap();
        let ids = vec![
            good.id.clone(),
            "ghost".to_string(),
            "broken".to_string(),
            "blank".to_string(),
            good.id.clone(),
        ];
        fx.ledger.seed("referral_keys", encode_index(&ids));
        fx.ledger.seed("referral_broken", b"{not json".to_vec());
        fx.ledger.seed("referral_blank", Vec::new());

        let report = fx.store.load_report().unwrap();
        assert_eq!(report.referrals, vec![good]);
        let skipped: Vec<_> = report.skipped.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(skipped, vec!["ghost", "broken", "blank"]);
        assert_eq!(report.skipped[0].reason, SkipReason::Missing);
        assert!(matches!(
            report.skipped[1].reason,
            SkipReason::Malformed { .. }
        ));
        assert_eq!(report.skipped[2].reason, SkipReason::Missing);
    }

    #[test]
    fn corrupt_index_loads_as_empty() {
        let fx = fixture(MemoryLedger::new());
        fx.ledger.seed("referral_keys", b"\xff\xfe".to_vec());
        assert!(fx.store.load_all().unwrap().is_empty());
    }

    #[test]
    fn unavailable_ledger_fails_the_load() {
        let fx = fixture(MemoryLedger::new());
        fx.ledger.set_available(false);
        assert!(matches!(
            fx.store.load_all(),
            Err(ReferralError::Persistence(LedgerError::Unavailable))
        ));
    }

    #[test]
    fn referrer_can_match_once() {
        let fx = fixture(MemoryLedger::new());
        let created = fx.store.create(input("PM", "0xAbC")).unwrap();
        let matched = fx
            .store
            .transition(&created.id, Verdict::Matched, "0xabc")
            .unwrap();
        assert_eq!(matched, created.with_status(ReferralStatus::Matched));

        let err = fx
            .store
            .transition(&created.id, Verdict::Rejected, "0xABC")
            .unwrap_err();
        assert!(matches!(
            err,
            ReferralError::InvalidTransition {
                from: ReferralStatus::Matched,
                to: ReferralStatus::Rejected,
                ..
            }
        ));
        assert_eq!(
            fx.store.get(&created.id).unwrap().status,
            ReferralStatus::Matched
        );
    }

    #[test]
    fn foreign_identity_cannot_transition() {
        let fx = fixture(MemoryLedger::new());
        let created = fx.store.create(input("PM", "0xAAA")).unwrap();
        assert!(matches!(
            fx.store.transition(&created.id, Verdict::Rejected, "0xBBB"),
            Err(ReferralError::NotAuthorized { .. })
        ));
        assert!(matches!(
            fx.store.transition(&created.id, Verdict::Rejected, " "),
            Err(ReferralError::NotAuthenticated)
        ));
        assert_eq!(fx.store.get(&created.id).unwrap(), created);
    }

    #[test]
    fn transition_reports_missing_and_malformed_records() {
        let fx = fixture(MemoryLedger::new());
        assert!(matches!(
            fx.store.transition("nope", Verdict::Matched, "0xAAA"),
            Err(ReferralError::NotFound { .. })
        ));
        fx.ledger.seed("referral_bad", b"[]".to_vec());
        assert!(matches!(
            fx.store.transition("bad", Verdict::Matched, "0xAAA"),
            Err(ReferralError::Decode { .. })
        ));
    }

    #[test]
    fn transition_preserves_every_other_field_of_legacy_records() {
        let fx = fixture(MemoryLedger::without_compare_and_swap());
        fx.ledger.seed(
            "referral_legacy",
            br#"{"data":"FHE-old","timestamp":12,"referrer":"0xAAA","position":"Ops"}"#.to_vec(),
        );
        fx.ledger
            .seed("referral_keys", encode_index(&["legacy".to_string()]));
        let updated = fx
            .store
            .transition("legacy", Verdict::Rejected, "0xaaa")
            .unwrap();
        assert_eq!(
            updated,
            Referral {
                id: "legacy".into(),
                encrypted_data: "FHE-old".into(),
                timestamp: 12,
                referrer: "0xAAA".into(),
                position: "Ops".into(),
                status: ReferralStatus::Rejected,
            }
        );
        assert_eq!(fx.store.load_all().unwrap(), vec![updated]);
    }

    #[test]
    fn disconnected_wallet_cannot_write() {
        let ledger = Arc::new(MemoryLedger::new());
        let store = ReferralStore::new(ledger.clone(), Arc::new(LocalWallet::disconnected()));
        assert!(matches!(
            store.create(input("QA", "0xAAA")),
            Err(ReferralError::NotAuthenticated)
        ));
        assert!(ledger.keys().is_empty());
    }

    #[test]
    fn declined_signature_surfaces_as_rejection() {
        let wallet = Arc::new(LocalWallet::generate());
        let ledger = Arc::new(MemoryLedger::new());
        let store = ReferralStore::new(ledger, wallet.clone());
        let created = store.create(input("QA", "0xAAA")).unwrap();
        wallet.decline_signing(true);
        assert!(matches!(
            store.transition(&created.id, Verdict::Matched, "0xAAA"),
            Err(ReferralError::SigningRejected)
        ));
        assert_eq!(store.get(&created.id).unwrap().status, ReferralStatus::Pending);
    }

    struct RejectingWrites(MemoryLedger);

    impl LedgerClient for RejectingWrites {
        fn read(&self, key: &str) -> Result<Option<Vec<u8>>, LedgerError> {
            self.0.read(key)
        }

        fn write(&self, _request: WriteRequest) -> Result<(), LedgerError> {
            Err(LedgerError::WriteRejected("execution reverted".into()))
        }
    }

    #[test]
    fn ledger_write_failure_is_a_persistence_error() {
        let store = ReferralStore::new(
            Arc::new(RejectingWrites(MemoryLedger::new())),
            Arc::new(LocalWallet::generate()),
        );
        assert!(matches!(
            store.create(input("QA", "0xAAA")),
            Err(ReferralError::Persistence(LedgerError::WriteRejected(_)))
        ));
        assert!(store.load_all().unwrap().is_empty());
    }

    #[test]
    fn padded_referrer_is_stored_trimmed_and_can_still_act() {
        let fx = fixture(MemoryLedger::new());
        let created = fx.store.create(input("QA", " 0xAAA ")).unwrap();
        assert_eq!(created.referrer, "0xAAA");
        assert_eq!(fx.store.get(&created.id).unwrap().referrer, "0xAAA");

        let matched = fx
            .store
            .transition(&created.id, Verdict::Matched, "0xaaa")
            .unwrap();
        assert_eq!(matched.status, ReferralStatus::Matched);
    }

    /// Stores records but refuses every write to the index key.
    struct RejectingIndexWrites(MemoryLedger);

    impl LedgerClient for RejectingIndexWrites {
        fn read(&self, key: &str) -> Result<Option<Vec<u8>>, LedgerError> {
            self.0.read(key)
        }

        fn write(&self, request: WriteRequest) -> Result<(), LedgerError> {
            if request.key == DEFAULT_INDEX_KEY {
                return Err(LedgerError::WriteRejected("out of gas".into()));
            }
            self.0.write(request)
        }
    }

    #[test]
    fn failed_index_append_leaves_an_unlisted_record() {
        let ledger = Arc::new(RejectingIndexWrites(MemoryLedger::without_compare_and_swap()));
        let store = ReferralStore::new(ledger.clone(), Arc::new(LocalWallet::generate()));
        let err = store.create(input("QA", "0xAAA")).unwrap_err();
        assert!(matches!(
            err,
            ReferralError::Persistence(LedgerError::WriteRejected(_))
        ));

        let orphan = ledger
            .0
            .keys()
            .into_iter()
            .find_map(|key| key.strip_prefix("referral_").map(str::to_string))
            .unwrap();
        let record = store.get(&orphan).unwrap();
        assert_eq!(record.referrer, "0xAAA");
        assert_eq!(record.status, ReferralStatus::Pending);
        assert!(store.load_all().unwrap().is_empty());
    }

    /// Loses every compare-and-swap, as if another client always wins.
    struct AlwaysContended(MemoryLedger);

    impl LedgerClient for AlwaysContended {
        fn read(&self, key: &str) -> Result<Option<Vec<u8>>, LedgerError> {
            self.0.read(key)
        }

        fn write(&self, request: WriteRequest) -> Result<(), LedgerError> {
            self.0.write(request)
        }

        fn supports_compare_and_swap(&self) -> bool {
            true
        }

        fn compare_and_swap(
            &self,
            request: WriteRequest,
            _expected: Option<&[u8]>,
        ) -> Result<CasOutcome, LedgerError> {
            Ok(CasOutcome::Conflict {
                current: self.0.read(&request.key)?,
            })
        }
    }

    #[test]
    fn exhausted_compare_and_swap_reports_contention() {
        let store = ReferralStore::new(
            Arc::new(AlwaysContended(MemoryLedger::new())),
            Arc::new(LocalWallet::generate()),
        )
        .with_config(StoreConfig {
            id_attempts: 2,
            ..StoreConfig::default()
        })
        .unwrap();
        assert!(matches!(
            store.create(input("QA", "0xAAA")),
            Err(ReferralError::Persistence(LedgerError::Contention { attempts: 2, .. }))
        ));
    }

    #[test]
    fn invalid_config_is_refused() {
        let fx = fixture(MemoryLedger::new());
        let result = fx.store.with_config(StoreConfig {
            cas_attempts: 0,
            ..StoreConfig::default()
        });
        assert!(matches!(result, Err(ConfigError::Zero("cas_attempts"))));
    }
}
