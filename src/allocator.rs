//! The public allocator: `peek_next`, `allocate_next`, `release`, and the
//! reconciliation entry points.
//!
//! One `IdAllocator` is constructed per process and shared by handle; all
//! collaborators (registry, store, durable cache, device identity) are
//! injected, so nothing global is touched. A single coarse mutex
//! serializes the entire peek/allocate/reconcile path across all tables:
//! no two concurrent callers can observe the same "next" value. The cold
//! path does blocking storage I/O under that lock; warm-path calls are
//! memory-only.
//!
//! Storage faults never fail an allocation. The call degrades to the best
//! cached value (or the per-device default `"<tag>-01"`) and logs a
//! warning; the store's own primary-key uniqueness constraint is the final
//! backstop, and an insert that trips it should be retried with one fresh
//! `allocate_next`.

use crate::cache::{AllocationCache, AllocationRecord, DurableCache};
use crate::codec;
use crate::device::{DeviceIdentity, DeviceTag, DEVICE_NUMBER_KEY, LAST_USED_PREFIX_KEY};
use crate::error::{MintError, Result};
use crate::reconcile::{merge_winner, ReconcileReport};
use crate::registry::{Registry, TableSpec};
use crate::resolver;
use crate::scanner::{DatabaseScanner, RecordStore};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Durable key prefix for persisted entity-type -> table mappings.
const TYPE_MAP_KEY_PREFIX: &str = "TypeMap:";

/// Everything mutable, guarded by the allocator's one lock.
struct AllocState {
    tag: Option<DeviceTag>,
    cache: AllocationCache,
    /// Last value generated per table in this process run; the same-run
    /// collision guard.
    session_last: HashMap<String, String>,
    /// Entity-type -> table mappings observed during reconciliation.
    aliases: HashMap<String, String>,
    reconciled: bool,
}

/// Counters exposed for diagnostics.
#[derive(Debug, Clone)]
pub struct AllocatorStats {
    pub warm_tables: usize,
    pub session_entries: usize,
    pub reconciled: bool,
    pub device_tag: Option<String>,
}

/// Device-prefixed sequential ID allocator.
pub struct IdAllocator {
    scanner: DatabaseScanner,
    identity: Arc<dyn DeviceIdentity>,
    state: Mutex<AllocState>,
}

impl IdAllocator {
    pub fn new(
        registry: Registry,
        store: Arc<dyn RecordStore>,
        durable: Arc<dyn DurableCache>,
        identity: Arc<dyn DeviceIdentity>,
    ) -> Self {
        IdAllocator {
            scanner: DatabaseScanner::new(store, registry),
            identity,
            state: Mutex::new(AllocState {
                tag: None,
                cache: AllocationCache::new(durable),
                session_last: HashMap::new(),
                aliases: HashMap::new(),
                reconciled: false,
            }),
        }
    }

    /// The normalized tag for this installation, resolving and persisting
    /// it on first use.
    pub fn device_tag(&self) -> Result<DeviceTag> {
        let mut state = self.state.lock();
        self.resolve_tag_locked(&mut state)
    }

    /// Compute the ID the next allocation for `table` would return,
    /// without persisting anything durably.
    pub fn peek_next(&self, table: &str) -> Result<String> {
        let mut state = self.state.lock();
        let spec = self.resolve_table(&state, table)?;
        let tag = self.resolve_tag_locked(&mut state)?;
        Ok(self.peek_locked(&mut state, &spec, &tag))
    }

    /// Hand out the next ID for `table` and persist it as the last
    /// assigned value (memory and durable cache).
    pub fn allocate_next(&self, table: &str) -> Result<String> {
        let mut state = self.state.lock();
        let spec = self.resolve_table(&state, table)?;
        let tag = self.resolve_tag_locked(&mut state)?;

        let mut candidate = self.peek_locked(&mut state, &spec, &tag);

        // Defensive reset: a foreign or stale value must never be advanced
        // into this device's stream.
        if !candidate.starts_with(tag.as_str()) {
            warn!(table = %spec.table_name, %candidate, "foreign candidate leaked through, resetting");
            candidate = codec::encode(tag.as_str(), 1);
        }

        // Same-run collision guard: never hand out the value this process
        // generated last, even if the caches rewound underneath us.
        if state.session_last.get(&spec.table_name) == Some(&candidate) {
            candidate = codec::next(tag.as_str(), Some(&candidate))?;
        }
        state
            .session_last
            .insert(spec.table_name.clone(), candidate.clone());

        if let Err(err) = state
            .cache
            .set(&spec.table_name, &spec.entity_type, &candidate)
        {
            warn!(table = %spec.table_name, %err, "durable write failed, continuing on in-memory state");
        }
        debug!(table = %spec.table_name, id = %candidate, "allocated");
        Ok(candidate)
    }

    /// Roll back a provisional allocation after a failed downstream create.
    ///
    /// Returns the predecessor ID, or `None` when the counter is already at
    /// its minimum (or the ID does not decode). Any table whose cached
    /// last-assigned value equals `id` is rewound so the slot can be
    /// reissued on a later run. The same-run guard is left untouched, so
    /// reissue within this process run is not guaranteed.
    pub fn release(&self, id: &str) -> Option<String> {
        let predecessor = match codec::previous(id) {
            Ok(Some(prev)) => prev,
            Ok(None) => {
                debug!(id, "release at counter floor, no predecessor");
                return None;
            }
            Err(err) => {
                warn!(id, %err, "cannot release malformed ID");
                return None;
            }
        };
        let mut state = self.state.lock();
        let affected = state.cache.rollback(id, &predecessor);
        if !affected.is_empty() {
            debug!(id, ?affected, "rolled back released allocation");
        }
        Some(predecessor)
    }

    /// Merge cached and scanned state into an authoritative baseline for
    /// every tracked table. No-op after the first run of a process
    /// lifetime; use [`IdAllocator::reconcile_forced`] to re-run.
    pub fn reconcile(&self) -> ReconcileReport {
        self.reconcile_inner(false)
    }

    /// Re-run reconciliation even if this process already reconciled.
    pub fn reconcile_forced(&self) -> ReconcileReport {
        self.reconcile_inner(true)
    }

    pub fn stats(&self) -> AllocatorStats {
        let state = self.state.lock();
        AllocatorStats {
            warm_tables: state.cache.warm_len(),
            session_entries: state.session_last.len(),
            reconciled: state.reconciled,
            device_tag: state.tag.as_ref().map(|t| t.as_str().to_string()),
        }
    }

    /// Resolve a table or entity-type name against the registry: exact
    /// table match first, then reconciliation aliases, then normalization.
    fn resolve_table(&self, state: &AllocState, name: &str) -> Result<TableSpec> {
        let registry = self.scanner.registry();
        if let Some(spec) = registry.get(name) {
            return Ok(spec.clone());
        }
        if let Some(table) = state.aliases.get(name) {
            if let Some(spec) = registry.get(table) {
                return Ok(spec.clone());
            }
        }
        let canonical = resolver::canonical_table_name(name)?;
        registry
            .get(&canonical)
            .cloned()
            .ok_or_else(|| MintError::UnknownTable(name.to_string()))
    }

    fn resolve_tag_locked(&self, state: &mut AllocState) -> Result<DeviceTag> {
        if let Some(tag) = &state.tag {
            return Ok(tag.clone());
        }
        match self.identity.device_tag() {
            Ok(raw) => {
                let tag = DeviceTag::new(&raw)?;
                for key in [DEVICE_NUMBER_KEY, LAST_USED_PREFIX_KEY] {
                    if let Err(err) = state.cache.durable().set(key, tag.as_str()) {
                        warn!(key, %err, "failed to persist device tag");
                    }
                }
                info!(tag = %tag, "device tag resolved");
                state.tag = Some(tag.clone());
                Ok(tag)
            }
            Err(identity_err) => {
                // The provider failed; fall back to a tag persisted on an
                // earlier run rather than swallowing the error silently.
                for key in [DEVICE_NUMBER_KEY, LAST_USED_PREFIX_KEY] {
                    match state.cache.durable().get(key) {
                        Ok(Some(raw)) => {
                            if let Ok(tag) = DeviceTag::new(&raw) {
                                warn!(key, %identity_err, "device identity unavailable, using persisted tag");
                                state.tag = Some(tag.clone());
                                return Ok(tag);
                            }
                        }
                        Ok(None) => {}
                        Err(err) => warn!(key, %err, "durable read failed during tag resolution"),
                    }
                }
                Err(identity_err)
            }
        }
    }

    /// The peek path proper: memory, then durable cache, then store scan,
    /// then the per-device default. Storage faults degrade, never fail.
    fn peek_locked(&self, state: &mut AllocState, spec: &TableSpec, tag: &DeviceTag) -> String {
        // Warm path.
        if let Some(last) = state.cache.get(&spec.table_name) {
            let last = last.to_string();
            return self.advance(tag, Some(&last));
        }

        // Cold path, stage 1: durable record from an earlier run.
        match state.cache.load_durable(&spec.table_name) {
            Ok(Some(record)) => {
                if let Some(id) = record.valid_id() {
                    if id.starts_with(tag.as_str()) {
                        let next = self.advance(tag, Some(id));
                        state.cache.adopt(record.clone());
                        return next;
                    }
                    debug!(table = %spec.table_name, id, "ignoring durable record from another device");
                }
            }
            Ok(None) => {}
            Err(err) => {
                warn!(table = %spec.table_name, %err, "durable cache unavailable, falling back to store scan");
            }
        }

        // Cold path, stage 2: authoritative store scan.
        let scanned = match self.scanner.scan_table(&spec.table_name, tag) {
            Ok(found) => found.filter(|id| {
                // A key merely containing the tag mid-string belongs to
                // someone else; advancing it would fork their stream.
                let ours = id.starts_with(tag.as_str());
                if !ours {
                    debug!(table = %spec.table_name, %id, "ignoring scanned key with foreign prefix");
                }
                ours
            }),
            Err(err) => {
                warn!(table = %spec.table_name, %err, "store scan failed, falling back to default");
                None
            }
        };

        match scanned {
            Some(found) => {
                state.cache.adopt(AllocationRecord {
                    table_name: spec.table_name.clone(),
                    entity_type: spec.entity_type.clone(),
                    last_assigned_id: Some(found.clone()),
                });
                self.advance(tag, Some(&found))
            }
            // Nothing anywhere: seed the memory layer with the default and
            // hand the default itself out.
            None => {
                let default = codec::encode(tag.as_str(), 1);
                state.cache.adopt(AllocationRecord {
                    table_name: spec.table_name.clone(),
                    entity_type: spec.entity_type.clone(),
                    last_assigned_id: Some(default.clone()),
                });
                default
            }
        }
    }

    /// `codec::next` with corruption downgraded to the default seed.
    fn advance(&self, tag: &DeviceTag, last: Option<&str>) -> String {
        match codec::next(tag.as_str(), last) {
            Ok(id) => id,
            Err(err) => {
                warn!(%err, "cached value does not decode, reseeding");
                codec::encode(tag.as_str(), 1)
            }
        }
    }

    fn reconcile_inner(&self, force: bool) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let mut state = self.state.lock();
        if state.reconciled && !force {
            report.already_reconciled = true;
            return report;
        }
        let tag = match self.resolve_tag_locked(&mut state) {
            Ok(tag) => tag,
            Err(err) => {
                warn!(%err, "reconciliation aborted: device tag unavailable");
                for spec in self.scanner.registry().tables() {
                    report.failed.push((spec.table_name.clone(), err.to_string()));
                }
                return report;
            }
        };
        let specs: Vec<TableSpec> = self.scanner.registry().tables().to_vec();
        for spec in &specs {
            match self.reconcile_table(&mut state, spec, &tag) {
                Ok(()) => report.merged.push(spec.table_name.clone()),
                Err(err) => {
                    warn!(table = %spec.table_name, %err, "reconciliation skipped table");
                    report.failed.push((spec.table_name.clone(), err.to_string()));
                }
            }
        }
        state.reconciled = true;
        info!(
            merged = report.merged.len(),
            failed = report.failed.len(),
            forced = force,
            "reconciliation finished"
        );
        report
    }

    fn reconcile_table(
        &self,
        state: &mut AllocState,
        spec: &TableSpec,
        tag: &DeviceTag,
    ) -> Result<()> {
        let cached = match state.cache.get(&spec.table_name) {
            Some(id) => Some(id.to_string()),
            None => state
                .cache
                .load_durable(&spec.table_name)?
                .and_then(|rec| rec.valid_id().map(str::to_string))
                .filter(|id| id.starts_with(tag.as_str())),
        };
        let scanned = self
            .scanner
            .scan_table(&spec.table_name, tag)?
            .filter(|id| id.starts_with(tag.as_str()));

        if let Some(winner) = merge_winner(cached.as_deref(), scanned.as_deref()) {
            let winner = winner.to_string();
            state
                .cache
                .set(&spec.table_name, &spec.entity_type, &winner)?;
            debug!(table = %spec.table_name, baseline = %winner, "baseline merged");
        }

        state
            .aliases
            .insert(spec.entity_type.clone(), spec.table_name.clone());
        let key = format!("{TYPE_MAP_KEY_PREFIX}{}", spec.entity_type);
        if let Err(err) = state.cache.durable().set(&key, &spec.table_name) {
            warn!(entity = %spec.entity_type, %err, "failed to persist type mapping");
        }
        Ok(())
    }
}
