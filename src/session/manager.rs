//! Session manager: owns the in-process working copies.
//!
//! Turns for one session id run strictly one after another behind a
//! per-session mutex; turns for different ids run in parallel. Store I/O is
//! bounded by a timeout and never fails a turn: a failed load leaves the
//! session un-hydrated (retried next turn) and a failed write leaves it dirty
//! (carried by the next turn's write).

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::DatabaseError;
use crate::store::{LeadRecord, SessionStore};

use super::model::{Platform, Session};
use super::state::TurnOutcome;

/// A session after one turn.
#[derive(Debug, Clone)]
pub struct TurnResult {
    pub session: Session,
    pub outcome: TurnOutcome,
    /// Whether this turn's write reached the store (always true for web).
    pub persisted: bool,
}

#[derive(Default)]
struct Slot {
    session: Option<Session>,
    /// The store has been consulted successfully for this id.
    hydrated: bool,
    /// The working copy has changes the store has not seen.
    dirty: bool,
    /// Dropped from the map by a sweep or clear; turns that were already
    /// waiting on it must start over on a fresh slot.
    retired: bool,
}

type SlotRef = Arc<Mutex<Slot>>;

pub struct SessionManager {
    store: SessionStore,
    config: SessionConfig,
    slots: RwLock<HashMap<String, SlotRef>>,
}

impl SessionManager {
    pub fn new(store: SessionStore, config: SessionConfig) -> Self {
        Self {
            store,
            config,
            slots: RwLock::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Run one inbound utterance through the session for `session_id`.
    pub async fn process_turn(
        &self,
        session_id: &str,
        platform: Platform,
        text: &str,
    ) -> TurnResult {
        let mut slot = loop {
            let guard = self.slot(session_id).await.lock_owned().await;
            if !guard.retired {
                break guard;
            }
            debug!(session_id = %session_id, "Slot retired while waiting, retrying");
        };

        self.hydrate(&mut slot, session_id, platform).await;
        let session = slot
            .session
            .get_or_insert_with(|| Session::new(session_id, platform));

        let outcome = session.apply_turn(text);
        debug!(
            session_id = %session_id,
            exchange = session.exchange_count,
            changed = outcome.changed,
            "Turn applied"
        );

        slot.dirty = true;
        let persisted = self.persist(&mut slot).await;

        let session = slot.session.clone().unwrap_or_else(|| Session::new(session_id, platform));
        TurnResult {
            session,
            outcome,
            persisted,
        }
    }

    /// Current state of a session: the working copy when one is held,
    /// otherwise whatever the store has.
    pub async fn get(&self, session_id: &str) -> Option<Session> {
        let existing = self.slots.read().await.get(session_id).cloned();
        if let Some(slot) = existing {
            let slot = slot.lock().await;
            if !slot.retired {
                if let Some(session) = slot.session.clone() {
                    return Some(session);
                }
            }
        }
        match self.with_timeout("load", self.store.load(session_id)).await {
            Ok(found) => found,
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Session lookup failed");
                None
            }
        }
    }

    /// Forget a session in memory and in the store. Returns whether anything
    /// existed.
    pub async fn clear(&self, session_id: &str) -> bool {
        let removed = self.slots.write().await.remove(session_id);
        let mut existed = false;
        if let Some(slot) = removed {
            // Wait out any in-flight turn before dropping the copy.
            let mut slot = slot.lock().await;
            slot.retired = true;
            existed = slot.session.take().is_some();
        }

        match self.with_timeout("delete", self.store.delete(session_id)).await {
            Ok(found) => existed |= found,
            Err(e) => warn!(session_id = %session_id, error = %e, "Failed to delete stored session"),
        }

        info!(session_id = %session_id, existed, "Session cleared");
        existed
    }

    /// Upsert a captured lead under the store timeout.
    pub async fn save_lead(&self, lead: &LeadRecord) -> Result<(), DatabaseError> {
        self.with_timeout("save_lead", self.store.save_lead(lead)).await
    }

    /// Snapshot of every session held in process memory.
    pub async fn active_sessions(&self) -> Vec<Session> {
        let slots: Vec<SlotRef> = self.slots.read().await.values().cloned().collect();
        let mut sessions = Vec::with_capacity(slots.len());
        for slot in slots {
            let slot = slot.lock().await;
            if let (false, Some(session)) = (slot.retired, slot.session.as_ref()) {
                sessions.push(session.clone());
            }
        }
        sessions.sort_by(|a, b| b.last_updated.cmp(&a.last_updated));
        sessions
    }

    pub async fn len(&self) -> usize {
        self.slots.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.slots.read().await.is_empty()
    }

    /// Mark sessions idle past the timeout as abandoned and evict them.
    ///
    /// Sessions mid-turn are skipped. A durable session whose final write
    /// fails stays in memory until a later sweep gets it out.
    pub async fn sweep_idle(&self) -> usize {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(self.config.idle_timeout)
                .unwrap_or_else(|_| chrono::Duration::hours(1));
        let snapshot: Vec<(String, SlotRef)> = self
            .slots
            .read()
            .await
            .iter()
            .map(|(id, slot)| (id.clone(), Arc::clone(slot)))
            .collect();

        let mut evicted = 0;
        for (id, slot_ref) in snapshot {
            let Ok(mut guard) = slot_ref.try_lock() else {
                continue;
            };
            let slot = &mut *guard;
            let idle = slot
                .session
                .as_ref()
                .is_none_or(|s| s.last_updated < cutoff);
            if !idle {
                continue;
            }

            if let Some(session) = slot.session.as_mut() {
                if session.mark_abandoned() {
                    slot.dirty = true;
                    info!(session_id = %id, "Session abandoned after idle timeout");
                }
            }
            if slot.dirty && !self.persist(slot).await {
                continue;
            }

            let mut slots = self.slots.write().await;
            if slots.get(&id).is_some_and(|current| Arc::ptr_eq(current, &slot_ref)) {
                slots.remove(&id);
                slot.retired = true;
                evicted += 1;
            }
        }

        if evicted > 0 {
            info!(evicted, "Idle sessions evicted");
        }
        evicted
    }

    /// Run `sweep_idle` on the configured interval until the handle is aborted.
    pub fn spawn_sweeper(self: Arc<Self>) -> JoinHandle<()> {
        let period = self.config.sweep_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick fires immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                self.sweep_idle().await;
            }
        })
    }

    // ── Internals ───────────────────────────────────────────────────

    async fn slot(&self, session_id: &str) -> SlotRef {
        if let Some(slot) = self.slots.read().await.get(session_id) {
            return Arc::clone(slot);
        }
        let mut slots = self.slots.write().await;
        Arc::clone(slots.entry(session_id.to_string()).or_default())
    }

    /// Make sure the slot holds a working copy, consulting the store until it
    /// has answered once.
    async fn hydrate(&self, slot: &mut Slot, session_id: &str, platform: Platform) {
        if slot.hydrated {
            return;
        }

        match self.with_timeout("load", self.store.load(session_id)).await {
            Ok(Some(stored)) => {
                match slot.session.as_mut() {
                    Some(working) => {
                        working.absorb(stored);
                        info!(session_id = %session_id, "Absorbed late-loaded session");
                    }
                    None => slot.session = Some(stored),
                }
                slot.hydrated = true;
            }
            Ok(None) => slot.hydrated = true,
            Err(e) => {
                warn!(
                    session_id = %session_id,
                    platform = %platform,
                    error = %e,
                    "Session load failed, continuing in memory"
                );
            }
        }

        if slot.session.is_none() {
            debug!(session_id = %session_id, platform = %platform, "New session");
            slot.session = Some(Session::new(session_id, platform));
        }
    }

    /// Write the working copy if the store has been consulted. Returns whether
    /// the store is now current.
    async fn persist(&self, slot: &mut Slot) -> bool {
        let Some(session) = slot.session.as_mut() else {
            return true;
        };
        // Writing before the stored record is absorbed would clobber it.
        if !slot.hydrated {
            slot.dirty = true;
            return false;
        }

        let result = match tokio::time::timeout(
            self.config.store_timeout,
            self.store.upsert(session),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(DatabaseError::Timeout {
                operation: "upsert",
                timeout: self.config.store_timeout,
            }),
        };

        match result {
            Ok(()) => {
                slot.dirty = false;
                true
            }
            Err(e) => {
                warn!(
                    session_id = %session.session_id,
                    error = %e,
                    "Session write failed, will retry next turn"
                );
                slot.dirty = true;
                false
            }
        }
    }

    async fn with_timeout<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = Result<T, DatabaseError>>,
    ) -> Result<T, DatabaseError> {
        tokio::time::timeout(self.config.store_timeout, fut)
            .await
            .unwrap_or(Err(DatabaseError::Timeout {
                operation,
                timeout: self.config.store_timeout,
            }))
    }
}
