//! libSQL implementation of the `Database` trait.
//!
//! Supports local file and in-memory databases over a single shared
//! connection.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::lead::{Country, LeadDraft, StudyLevel, extract};
use crate::session::{Platform, ProgressState, Session};
use crate::store::migrations;
use crate::store::traits::{Database, LeadRecord};

/// libSQL database backend.
///
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    DatabaseError::Pool(format!("Failed to create database directory: {e}"))
                })?;
            }
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_db(db)?;
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let backend = Self::from_db(db)?;
        backend.init_schema().await?;
        Ok(backend)
    }

    fn from_db(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string. Unparseable values read as
/// "now" so a damaged timestamp never makes a session look ancient.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    Utc::now()
}

/// Read a nullable text column. NULL, blank, and non-text values are `None`.
fn opt_string(row: &libsql::Row, idx: i32) -> Option<String> {
    row.get::<String>(idx)
        .ok()
        .filter(|s| !s.trim().is_empty())
}

/// Parse a JSON tag list, treating anything malformed as empty.
fn parse_tags(raw: Option<String>) -> Vec<String> {
    raw.and_then(|s| serde_json::from_str::<Vec<String>>(&s).ok())
        .unwrap_or_default()
}

fn tags_json(tags: &[String]) -> String {
    serde_json::to_string(tags).unwrap_or_else(|_| "[]".to_string())
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

const SESSION_COLUMNS: &str = "session_id, platform, name, email, phone, target_country, \
     preferred_intake, study_level, gpa_grades, study_field, progress_state, exchange_count, \
     completed_steps, next_actions, created_at, last_updated";

const LEAD_COLUMNS: &str = "id, session_id, platform, name, email, phone, target_country, \
     preferred_intake, study_level, gpa_grades, study_field, captured_at";

/// Map a `sessions` row, recovering every malformed column as empty.
fn row_to_session(row: &libsql::Row) -> Result<Session, libsql::Error> {
    let session_id: String = row.get(0)?;
    let platform = opt_string(row, 1)
        .and_then(|p| Platform::parse(&p))
        .unwrap_or_else(|| Platform::for_session_id(&session_id));

    let draft = LeadDraft {
        name: opt_string(row, 2),
        email: opt_string(row, 3).filter(|e| extract::is_email(e)),
        phone: opt_string(row, 4).and_then(|p| extract::stored_phone(&p)),
        target_country: opt_string(row, 5).and_then(|c| Country::parse_stored(&c)),
        preferred_intake: opt_string(row, 6),
        study_level: opt_string(row, 7).and_then(|l| StudyLevel::parse_stored(&l)),
        gpa_grades: opt_string(row, 8),
        study_field: opt_string(row, 9),
    };

    let progress_state = opt_string(row, 10)
        .and_then(|s| ProgressState::parse(&s))
        .unwrap_or_default();
    let exchange_count = row
        .get::<i64>(11)
        .ok()
        .map(|n| u32::try_from(n.max(0)).unwrap_or(u32::MAX))
        .unwrap_or(0);

    let now = Utc::now();
    let created_at = opt_string(row, 14).map_or(now, |s| parse_datetime(&s));
    let last_updated = opt_string(row, 15).map_or(now, |s| parse_datetime(&s));

    Ok(Session {
        session_id,
        platform,
        draft,
        progress_state,
        exchange_count,
        completed_steps: parse_tags(opt_string(row, 12)),
        next_actions: parse_tags(opt_string(row, 13)),
        created_at,
        last_updated,
    })
}

fn row_to_lead(row: &libsql::Row) -> Result<LeadRecord, DatabaseError> {
    let text = |idx: i32| -> Result<String, DatabaseError> {
        row.get::<String>(idx)
            .map_err(|e| DatabaseError::Serialization(format!("lead column {idx}: {e}")))
    };

    let session_id = text(1)?;
    let country_raw = text(6)?;
    let target_country = Country::parse_stored(&country_raw).ok_or_else(|| {
        DatabaseError::Serialization(format!("unsupported country in lead row: {country_raw}"))
    })?;

    Ok(LeadRecord {
        id: Uuid::parse_str(&text(0)?).unwrap_or_default(),
        platform: opt_string(row, 2)
            .and_then(|p| Platform::parse(&p))
            .unwrap_or_else(|| Platform::for_session_id(&session_id)),
        session_id,
        name: text(3)?,
        email: text(4)?,
        phone: text(5)?,
        target_country,
        preferred_intake: opt_string(row, 7),
        study_level: opt_string(row, 8).and_then(|l| StudyLevel::parse_stored(&l)),
        gpa_grades: opt_string(row, 9),
        study_field: opt_string(row, 10),
        captured_at: opt_string(row, 11).map_or_else(Utc::now, |s| parse_datetime(&s)),
    })
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Sessions ────────────────────────────────────────────────────

    async fn load_session(&self, session_id: &str) -> Result<Option<Session>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE session_id = ?1"),
                params![session_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("load_session: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let session = row_to_session(&row)
                    .map_err(|e| DatabaseError::Query(format!("load_session row parse: {e}")))?;
                Ok(Some(session))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("load_session: {e}"))),
        }
    }

    async fn upsert_session(&self, session: &Session) -> Result<(), DatabaseError> {
        let d = &session.draft;
        self.conn()
            .execute(
                &format!(
                    "INSERT INTO sessions ({SESSION_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
                     ON CONFLICT(session_id) DO UPDATE SET
                        platform = excluded.platform,
                        name = excluded.name,
                        email = excluded.email,
                        phone = excluded.phone,
                        target_country = excluded.target_country,
                        preferred_intake = excluded.preferred_intake,
                        study_level = excluded.study_level,
                        gpa_grades = excluded.gpa_grades,
                        study_field = excluded.study_field,
                        progress_state = excluded.progress_state,
                        exchange_count = excluded.exchange_count,
                        completed_steps = excluded.completed_steps,
                        next_actions = excluded.next_actions,
                        last_updated = excluded.last_updated"
                ),
                params![
                    session.session_id.as_str(),
                    session.platform.as_str(),
                    opt_text(d.name.as_deref()),
                    opt_text(d.email.as_deref()),
                    opt_text(d.phone.as_deref()),
                    opt_text(d.target_country.map(|c| c.as_str())),
                    opt_text(d.preferred_intake.as_deref()),
                    opt_text(d.study_level.map(|l| l.as_str())),
                    opt_text(d.gpa_grades.as_deref()),
                    opt_text(d.study_field.as_deref()),
                    session.progress_state.to_string(),
                    i64::from(session.exchange_count),
                    tags_json(&session.completed_steps),
                    tags_json(&session.next_actions),
                    session.created_at.to_rfc3339(),
                    session.last_updated.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert_session: {e}")))?;

        debug!(session_id = %session.session_id, "Session upserted");
        Ok(())
    }

    async fn delete_session(&self, session_id: &str) -> Result<bool, DatabaseError> {
        let affected = self
            .conn()
            .execute(
                "DELETE FROM sessions WHERE session_id = ?1",
                params![session_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_session: {e}")))?;
        Ok(affected > 0)
    }

    // ── Leads ───────────────────────────────────────────────────────

    async fn save_lead(&self, lead: &LeadRecord) -> Result<(), DatabaseError> {
        // The first capture keeps its id and timestamp.
        self.conn()
            .execute(
                &format!(
                    "INSERT INTO leads ({LEAD_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                     ON CONFLICT(session_id) DO UPDATE SET
                        name = excluded.name,
                        email = excluded.email,
                        phone = excluded.phone,
                        target_country = excluded.target_country,
                        preferred_intake = excluded.preferred_intake,
                        study_level = excluded.study_level,
                        gpa_grades = excluded.gpa_grades,
                        study_field = excluded.study_field"
                ),
                params![
                    lead.id.to_string(),
                    lead.session_id.as_str(),
                    lead.platform.as_str(),
                    lead.name.as_str(),
                    lead.email.as_str(),
                    lead.phone.as_str(),
                    lead.target_country.as_str(),
                    opt_text(lead.preferred_intake.as_deref()),
                    opt_text(lead.study_level.map(|l| l.as_str())),
                    opt_text(lead.gpa_grades.as_deref()),
                    opt_text(lead.study_field.as_deref()),
                    lead.captured_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("save_lead: {e}")))?;

        info!(session_id = %lead.session_id, lead_id = %lead.id, "Lead saved");
        Ok(())
    }

    async fn get_lead_by_session(
        &self,
        session_id: &str,
    ) -> Result<Option<LeadRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {LEAD_COLUMNS} FROM leads WHERE session_id = ?1"),
                params![session_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_lead_by_session: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row_to_lead(&row).map(Some),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_lead_by_session: {e}"))),
        }
    }

    async fn delete_lead(&self, session_id: &str) -> Result<bool, DatabaseError> {
        let affected = self
            .conn()
            .execute("DELETE FROM leads WHERE session_id = ?1", params![session_id])
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_lead: {e}")))?;
        Ok(affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_db() -> LibSqlBackend {
        LibSqlBackend::new_memory().await.unwrap()
    }

    fn telegram_session() -> Session {
        let mut s = Session::new("telegram_100", Platform::Telegram);
        s.draft.name = Some("Sarah Lee".into());
        s.draft.email = Some("sarah@mail.com".into());
        s.draft.target_country = Some(Country::SouthKorea);
        s.draft.study_level = Some(StudyLevel::PhD);
        s.exchange_count = 3;
        s.completed_steps = vec!["name_collected".into(), "email_collected".into()];
        s
    }

    // ── Session tests ───────────────────────────────────────────────

    #[tokio::test]
    async fn upsert_and_load_session() {
        let db = test_db().await;
        let session = telegram_session();
        db.upsert_session(&session).await.unwrap();

        let loaded = db.load_session("telegram_100").await.unwrap().unwrap();
        assert_eq!(loaded.draft, session.draft);
        assert_eq!(loaded.exchange_count, 3);
        assert_eq!(loaded.completed_steps, session.completed_steps);
        assert_eq!(loaded.platform, Platform::Telegram);
        assert_eq!(loaded.progress_state, ProgressState::ConversationActive);
    }

    #[tokio::test]
    async fn load_missing_session() {
        let db = test_db().await;
        assert!(db.load_session("telegram_404").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upsert_overwrites_by_session_id() {
        let db = test_db().await;
        let mut session = telegram_session();
        db.upsert_session(&session).await.unwrap();

        session.draft.phone = Some("+15551234567".into());
        session.exchange_count = 4;
        session.progress_state = ProgressState::LeadCaptured;
        db.upsert_session(&session).await.unwrap();
        db.upsert_session(&session).await.unwrap();

        let loaded = db.load_session("telegram_100").await.unwrap().unwrap();
        assert_eq!(loaded.draft.phone.as_deref(), Some("+15551234567"));
        assert_eq!(loaded.exchange_count, 4);
        assert_eq!(loaded.progress_state, ProgressState::LeadCaptured);

        let mut rows = db
            .conn()
            .query("SELECT COUNT(*) FROM sessions", ())
            .await
            .unwrap();
        let count: i64 = rows.next().await.unwrap().unwrap().get(0).unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn malformed_columns_read_as_empty() {
        let db = test_db().await;
        db.conn()
            .execute(
                "INSERT INTO sessions (session_id, platform, email, target_country, study_level,
                    progress_state, exchange_count, completed_steps, next_actions, created_at, last_updated)
                 VALUES ('telegram_7', 'carrier-pigeon', 42, 'Germany', 'kindergarten',
                    'confused', -5, 'not json', '[\"notify_team\"]', 'yesterday', '2025-03-01 09:30:00')",
                (),
            )
            .await
            .unwrap();

        let s = db.load_session("telegram_7").await.unwrap().unwrap();
        assert_eq!(s.platform, Platform::Telegram);
        assert_eq!(s.draft.email, None);
        assert_eq!(s.draft.target_country, None);
        assert_eq!(s.draft.study_level, None);
        assert_eq!(s.progress_state, ProgressState::ConversationActive);
        assert_eq!(s.exchange_count, 0);
        assert!(s.completed_steps.is_empty());
        assert_eq!(s.next_actions, vec!["notify_team"]);
        assert_eq!(s.last_updated.to_rfc3339(), "2025-03-01T09:30:00+00:00");
    }

    #[tokio::test]
    async fn invalid_contact_text_reads_as_empty() {
        let db = test_db().await;
        db.conn()
            .execute(
                "INSERT INTO sessions (session_id, platform, name, email, phone, created_at, last_updated)
                 VALUES ('telegram_8', 'telegram', 'Ram Thapa', 'not-an-email', 'call me later',
                    '2025-03-01 09:30:00', '2025-03-01 09:30:00'),
                        ('telegram_9', 'telegram', NULL, 'ram@mail.com', '9841234567',
                    '2025-03-01 09:30:00', '2025-03-01 09:30:00')",
                (),
            )
            .await
            .unwrap();

        let bad = db.load_session("telegram_8").await.unwrap().unwrap();
        assert_eq!(bad.draft.name.as_deref(), Some("Ram Thapa"));
        assert_eq!(bad.draft.email, None);
        assert_eq!(bad.draft.phone, None);

        let good = db.load_session("telegram_9").await.unwrap().unwrap();
        assert_eq!(good.draft.email.as_deref(), Some("ram@mail.com"));
        assert_eq!(good.draft.phone.as_deref(), Some("+9841234567"));
    }

    #[tokio::test]
    async fn delete_session_reports_existence() {
        let db = test_db().await;
        db.upsert_session(&telegram_session()).await.unwrap();
        assert!(db.delete_session("telegram_100").await.unwrap());
        assert!(!db.delete_session("telegram_100").await.unwrap());
        assert!(db.load_session("telegram_100").await.unwrap().is_none());
    }

    // ── Lead tests ──────────────────────────────────────────────────

    #[tokio::test]
    async fn save_lead_is_unique_per_session() {
        let db = test_db().await;
        let mut session = telegram_session();
        session.draft.phone = Some("+15551234567".into());

        let first = LeadRecord::from_session(&session).unwrap();
        db.save_lead(&first).await.unwrap();

        session.draft.study_field = Some("Physics".into());
        let retry = LeadRecord::from_session(&session).unwrap();
        db.save_lead(&retry).await.unwrap();

        let stored = db.get_lead_by_session("telegram_100").await.unwrap().unwrap();
        assert_eq!(stored.id, first.id);
        assert_eq!(stored.study_field.as_deref(), Some("Physics"));
        assert_eq!(stored.target_country, Country::SouthKorea);
        assert_eq!(stored.study_level, Some(StudyLevel::PhD));

        let mut rows = db
            .conn()
            .query("SELECT COUNT(*) FROM leads", ())
            .await
            .unwrap();
        let count: i64 = rows.next().await.unwrap().unwrap().get(0).unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn delete_lead_removes_row() {
        let db = test_db().await;
        let mut session = telegram_session();
        session.draft.phone = Some("+15551234567".into());
        db.save_lead(&LeadRecord::from_session(&session).unwrap())
            .await
            .unwrap();

        assert!(db.delete_lead("telegram_100").await.unwrap());
        assert!(db.get_lead_by_session("telegram_100").await.unwrap().is_none());
    }
}
