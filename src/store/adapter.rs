//! Session store adapter: platform durability policy over a `Database`.
//!
//! Telegram sessions are written through on every turn. Web sessions live
//! only in process memory, so their writes are skipped and their reads always
//! miss. A session is durable only when both its id and its platform say
//! Telegram, so nothing is written that a later load would refuse.

use std::sync::Arc;

use tracing::debug;

use crate::error::DatabaseError;
use crate::session::{Platform, Session};
use crate::store::traits::{Database, LeadRecord};

#[derive(Clone)]
pub struct SessionStore {
    db: Arc<dyn Database>,
}

impl SessionStore {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// Load a durable session. Ids of non-durable platforms never hit the
    /// database.
    pub async fn load(&self, session_id: &str) -> Result<Option<Session>, DatabaseError> {
        if !Platform::for_session_id(session_id).is_durable() {
            return Ok(None);
        }
        let loaded = self.db.load_session(session_id).await?;
        // A row claiming to be a web session is never resurrected.
        Ok(loaded.filter(is_durable))
    }

    /// Refresh `last_updated` and persist, unless the platform is ephemeral.
    pub async fn upsert(&self, session: &mut Session) -> Result<(), DatabaseError> {
        session.touch();
        if !is_durable(session) {
            debug!(session_id = %session.session_id, "Skipping write for ephemeral session");
            return Ok(());
        }
        self.db.upsert_session(session).await
    }

    /// Remove a session and its captured lead. Returns whether anything existed.
    pub async fn delete(&self, session_id: &str) -> Result<bool, DatabaseError> {
        let session = self.db.delete_session(session_id).await?;
        let lead = self.db.delete_lead(session_id).await?;
        Ok(session || lead)
    }

    /// Write the lead table row for a capture.
    pub async fn save_lead(&self, lead: &LeadRecord) -> Result<(), DatabaseError> {
        self.db.save_lead(lead).await
    }

    pub async fn get_lead(&self, session_id: &str) -> Result<Option<LeadRecord>, DatabaseError> {
        self.db.get_lead_by_session(session_id).await
    }
}

fn is_durable(session: &Session) -> bool {
    session.platform.is_durable() && Platform::for_session_id(&session.session_id).is_durable()
}
