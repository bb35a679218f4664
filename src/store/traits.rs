//! Backend-agnostic `Database` trait for sessions and captured leads.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::lead::{Country, StudyLevel};
use crate::session::{Platform, Session};

/// A captured lead, written once per session when the hard fields are in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadRecord {
    pub id: Uuid,
    pub session_id: String,
    pub platform: Platform,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub target_country: Country,
    pub preferred_intake: Option<String>,
    pub study_level: Option<StudyLevel>,
    pub gpa_grades: Option<String>,
    pub study_field: Option<String>,
    pub captured_at: DateTime<Utc>,
}

impl LeadRecord {
    /// Build a record from a session whose draft is complete.
    pub fn from_session(session: &Session) -> Option<Self> {
        let d = &session.draft;
        if !d.is_complete() {
            return None;
        }
        Some(Self {
            id: Uuid::new_v4(),
            session_id: session.session_id.clone(),
            platform: session.platform,
            name: d.name.clone()?,
            email: d.email.clone()?,
            phone: d.phone.clone()?,
            target_country: d.target_country?,
            preferred_intake: d.preferred_intake.clone(),
            study_level: d.study_level,
            gpa_grades: d.gpa_grades.clone(),
            study_field: d.study_field.clone(),
            captured_at: Utc::now(),
        })
    }
}

/// Persistence for session records and the lead table.
///
/// Implementations write exactly what they are given; durability policy per
/// platform lives in [`crate::store::SessionStore`].
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn init_schema(&self) -> Result<(), DatabaseError>;

    // ── Sessions ────────────────────────────────────────────────────

    /// Load a session by id. Unreadable column values come back empty.
    async fn load_session(&self, session_id: &str) -> Result<Option<Session>, DatabaseError>;

    /// Insert or overwrite the row keyed by `session.session_id`.
    async fn upsert_session(&self, session: &Session) -> Result<(), DatabaseError>;

    /// Delete a session row. Returns whether one existed.
    async fn delete_session(&self, session_id: &str) -> Result<bool, DatabaseError>;

    // ── Leads ───────────────────────────────────────────────────────

    /// Insert or overwrite the lead for `lead.session_id`.
    async fn save_lead(&self, lead: &LeadRecord) -> Result<(), DatabaseError>;

    /// Look up the captured lead for a session.
    async fn get_lead_by_session(
        &self,
        session_id: &str,
    ) -> Result<Option<LeadRecord>, DatabaseError>;

    /// Delete the captured lead for a session. Returns whether one existed.
    async fn delete_lead(&self, session_id: &str) -> Result<bool, DatabaseError>;
}
