//! ---
//! vatio_section: "05-session-sync"
//! vatio_subsection: "module"
//! vatio_type: "source"
//! vatio_scope: "code"
//! vatio_description: "Cross-device reconciliation of the active session record."
//! vatio_version: "v0.1.0"
//! vatio_owner: "tbd"
//! ---
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use vatio_common::time::age;
use vatio_common::SyncConfig;
use vatio_session::CostAccumulator;

use crate::store::{Result, SessionStore};

/// Reconciles the local accumulator replica against the shared store.
#[derive(Debug, Clone)]
pub struct SessionSynchronizer {
    staleness_bound: Duration,
}

impl SessionSynchronizer {
    pub fn new(staleness_bound: Duration) -> Self {
        Self { staleness_bound }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(config.staleness_bound)
    }

    fn is_fresh(&self, now: DateTime<Utc>, start_time: DateTime<Utc>) -> bool {
        age(now, start_time) <= self.staleness_bound
    }

    /// Startup reconciliation. A fresh shared record is authoritative and
    /// adopted wholesale, overriding any local cache; a stale one is expected
    /// orphan debris and ignored. The local cache survives only when it
    /// independently holds a fresh active session.
    pub fn adopt_on_startup(
        &self,
        accumulator: &mut CostAccumulator,
        store: &dyn SessionStore,
        now: DateTime<Utc>,
    ) -> Result<()> {
        match store.fetch_active()? {
            Some(shared) if self.is_fresh(now, shared.start_time) => {
                accumulator.adopt(shared);
                return Ok(());
            }
            Some(shared) => {
                info!(
                    start_time = %shared.start_time,
                    "shared active session older than staleness bound; ignoring as orphaned"
                );
            }
            None => {}
        }

        if let Some(local) = accumulator.session() {
            if self.is_fresh(now, local.start_time) {
                debug!(start_time = %local.start_time, "keeping locally cached active session");
            } else {
                info!(start_time = %local.start_time, "local session cache is stale; discarding");
                accumulator.clear();
            }
        }
        Ok(())
    }

    /// Steady-state reconciliation, run on a fixed interval while a local
    /// session is active. For a matching start_time both replicas converge
    /// to max(local, shared); a missing shared record is re-created from the
    /// local one. A foreign session appearing mid-run is deliberately never
    /// adopted here; only startup reconciliation may do that, so orphaned
    /// or phantom records cannot resurrect a session this observer never
    /// started.
    pub fn reconcile(
        &self,
        accumulator: &mut CostAccumulator,
        store: &dyn SessionStore,
    ) -> Result<()> {
        let Some(local) = accumulator.session().cloned() else {
            return Ok(());
        };

        match store.fetch_active()? {
            Some(shared) if shared.start_time == local.start_time => {
                if shared.total_cost > local.total_cost {
                    debug!(
                        local = local.total_cost,
                        shared = shared.total_cost,
                        "adopting higher shared cost"
                    );
                    accumulator.raise_total_cost(shared.total_cost);
                } else if local.total_cost > shared.total_cost {
                    debug!(
                        local = local.total_cost,
                        shared = shared.total_cost,
                        "pushing higher local cost to shared store"
                    );
                    store.put_active(&local)?;
                }
            }
            Some(shared) => {
                debug!(
                    local_start = %local.start_time,
                    shared_start = %shared.start_time,
                    "foreign active session in store; not adopted during steady state"
                );
            }
            None => {
                debug!(start_time = %local.start_time, "shared record missing; re-creating from local");
                store.put_active(&local)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{SessionStore, StoreError};
    use chrono::TimeZone;
    use parking_lot::Mutex;
    use vatio_common::MeteringConfig;
    use vatio_session::{ActiveSession, FlatPrice};

    #[derive(Default)]
    struct MemoryStore {
        record: Mutex<Option<ActiveSession>>,
        fail_reads: Mutex<bool>,
    }

    impl MemoryStore {
        fn with_record(session: ActiveSession) -> Self {
            Self {
                record: Mutex::new(Some(session)),
                fail_reads: Mutex::new(false),
            }
        }
    }

    impl SessionStore for MemoryStore {
        fn fetch_active(&self) -> Result<Option<ActiveSession>> {
            if *self.fail_reads.lock() {
                return Err(StoreError::Unavailable("injected fault".into()));
            }
            Ok(self.record.lock().clone())
        }

        fn put_active(&self, session: &ActiveSession) -> Result<()> {
            *self.record.lock() = Some(session.clone());
            Ok(())
        }

        fn clear_active(&self) -> Result<()> {
            *self.record.lock() = None;
            Ok(())
        }
    }

    fn now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 4, 12, 0, 0).unwrap()
    }

    fn session_started(minutes_ago: i64, cost: f64) -> ActiveSession {
        ActiveSession {
            start_time: now() - chrono::Duration::minutes(minutes_ago),
            equipment: Some("press".into()),
            total_cost: cost,
        }
    }

    fn sync() -> SessionSynchronizer {
        SessionSynchronizer::new(Duration::from_secs(24 * 3600))
    }

    #[test]
    fn startup_adopts_fresh_shared_session() {
        let store = MemoryStore::with_record(session_started(30, 1.25));
        let mut acc = CostAccumulator::new(MeteringConfig::default());
        sync().adopt_on_startup(&mut acc, &store, now()).unwrap();
        let adopted = acc.session().unwrap();
        assert_eq!(adopted.total_cost, 1.25);
        assert_eq!(adopted.equipment.as_deref(), Some("press"));
    }

    #[test]
    fn startup_adoption_overrides_local_cache() {
        let store = MemoryStore::with_record(session_started(30, 5.0));
        let mut acc = CostAccumulator::new(MeteringConfig::default());
        acc.adopt(session_started(90, 0.5));
        sync().adopt_on_startup(&mut acc, &store, now()).unwrap();
        assert_eq!(acc.session().unwrap().total_cost, 5.0);
    }

    #[test]
    fn startup_ignores_stale_shared_session() {
        let store = MemoryStore::with_record(session_started(25 * 60, 9.0));
        let mut acc = CostAccumulator::new(MeteringConfig::default());
        sync().adopt_on_startup(&mut acc, &store, now()).unwrap();
        assert!(!acc.is_active());
    }

    #[test]
    fn stale_shared_keeps_fresh_local_cache() {
        let store = MemoryStore::with_record(session_started(25 * 60, 9.0));
        let mut acc = CostAccumulator::new(MeteringConfig::default());
        acc.adopt(session_started(10, 0.75));
        sync().adopt_on_startup(&mut acc, &store, now()).unwrap();
        assert_eq!(acc.session().unwrap().total_cost, 0.75);
    }

    #[test]
    fn stale_local_cache_is_discarded() {
        let store = MemoryStore::default();
        let mut acc = CostAccumulator::new(MeteringConfig::default());
        acc.adopt(session_started(48 * 60, 2.0));
        sync().adopt_on_startup(&mut acc, &store, now()).unwrap();
        assert!(!acc.is_active());
    }

    #[test]
    fn reconcile_converges_both_replicas_to_max() {
        let local_session = session_started(5, 0.40);
        let shared = ActiveSession {
            total_cost: 0.90,
            ..local_session.clone()
        };
        let store = MemoryStore::with_record(shared);
        let mut acc = CostAccumulator::new(MeteringConfig::default());
        acc.adopt(local_session.clone());

        // Shared is higher: local adopts it.
        sync().reconcile(&mut acc, &store).unwrap();
        assert_eq!(acc.session().unwrap().total_cost, 0.90);
        assert_eq!(store.fetch_active().unwrap().unwrap().total_cost, 0.90);

        // Local pulls ahead: the store is raised.
        acc.tick(now(), 4000.0, &FlatPrice(10.0));
        let raised = acc.session().unwrap().total_cost;
        assert!(raised > 0.90);
        sync().reconcile(&mut acc, &store).unwrap();
        assert_eq!(store.fetch_active().unwrap().unwrap().total_cost, raised);
        assert_eq!(acc.session().unwrap().total_cost, raised);
    }

    #[test]
    fn reconcile_recreates_missing_shared_record() {
        let store = MemoryStore::default();
        let mut acc = CostAccumulator::new(MeteringConfig::default());
        acc.adopt(session_started(5, 0.33));
        sync().reconcile(&mut acc, &store).unwrap();
        assert_eq!(store.fetch_active().unwrap().unwrap().total_cost, 0.33);
    }

    #[test]
    fn reconcile_never_adopts_foreign_session() {
        let store = MemoryStore::with_record(session_started(3, 7.0));
        let mut acc = CostAccumulator::new(MeteringConfig::default());
        sync().reconcile(&mut acc, &store).unwrap();
        assert!(!acc.is_active());

        // Even with a different local session running, a foreign record is
        // neither adopted nor clobbered.
        let mut local = session_started(8, 0.10);
        local.start_time = now() - chrono::Duration::minutes(8);
        acc.adopt(local);
        sync().reconcile(&mut acc, &store).unwrap();
        assert_eq!(acc.session().unwrap().total_cost, 0.10);
        assert_eq!(store.fetch_active().unwrap().unwrap().total_cost, 7.0);
    }

    #[test]
    fn store_errors_propagate_without_mutating_local() {
        let store = MemoryStore::with_record(session_started(5, 2.0));
        *store.fail_reads.lock() = true;
        let mut acc = CostAccumulator::new(MeteringConfig::default());
        acc.adopt(session_started(5, 1.0));
        assert!(sync().reconcile(&mut acc, &store).is_err());
        assert_eq!(acc.session().unwrap().total_cost, 1.0);
    }
}
