//! Session record: one per conversation identity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::lead::{LeadDraft, LeadField};

/// Front-end a conversation arrived on.
///
/// Durability differs per platform: only Telegram sessions are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Web,
    Telegram,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Web => "web",
            Self::Telegram => "telegram",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "web" => Some(Self::Web),
            "telegram" => Some(Self::Telegram),
            _ => None,
        }
    }

    /// Platform implied by a session id's prefix. Anything that is not a
    /// Telegram id is treated as a web visit.
    pub fn for_session_id(session_id: &str) -> Self {
        if session_id.starts_with(TELEGRAM_PREFIX) {
            Self::Telegram
        } else {
            Self::Web
        }
    }

    /// Whether sessions on this platform outlive the process.
    pub fn is_durable(&self) -> bool {
        matches!(self, Self::Telegram)
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

const TELEGRAM_PREFIX: &str = "telegram_";
const WEB_PREFIX: &str = "web_";

/// Session id for a Telegram user.
pub fn telegram_session_id(user_id: impl std::fmt::Display) -> String {
    format!("{TELEGRAM_PREFIX}{user_id}")
}

/// Fresh id for a web visit that did not bring one.
pub fn new_web_session_id() -> String {
    format!("{WEB_PREFIX}{}", Uuid::new_v4())
}

/// Where a conversation stands.
///
/// `ConversationActive` → `LeadCaptured` (terminal), or
/// `ConversationActive` ⇄ `Abandoned` via the idle sweep and a resumed chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProgressState {
    #[default]
    ConversationActive,
    LeadCaptured,
    Abandoned,
}

impl ProgressState {
    pub fn can_transition_to(&self, target: ProgressState) -> bool {
        use ProgressState::*;
        matches!(
            (self, target),
            (ConversationActive, LeadCaptured)
                | (ConversationActive, Abandoned)
                | (Abandoned, ConversationActive)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::LeadCaptured)
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "conversation_active" => Some(Self::ConversationActive),
            "lead_captured" => Some(Self::LeadCaptured),
            "abandoned" => Some(Self::Abandoned),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProgressState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ConversationActive => "conversation_active",
            Self::LeadCaptured => "lead_captured",
            Self::Abandoned => "abandoned",
        };
        write!(f, "{s}")
    }
}

/// Progress tags appended to `completed_steps` / `next_actions`.
pub mod steps {
    pub const LEAD_CAPTURED: &str = "lead_captured";
    pub const CONVERSATION_RESUMED: &str = "conversation_resumed";
    pub const NOTIFY_TEAM: &str = "notify_team";
    pub const SAVE_LEAD: &str = "save_lead";

    /// Breadcrumb for a field filled for the first time.
    pub fn collected(field: crate::lead::LeadField) -> String {
        format!("{}_collected", field.as_str())
    }
}

/// One conversation's cumulative state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub platform: Platform,
    #[serde(flatten)]
    pub draft: LeadDraft,
    #[serde(default)]
    pub progress_state: ProgressState,
    #[serde(default)]
    pub exchange_count: u32,
    #[serde(default)]
    pub completed_steps: Vec<String>,
    #[serde(default)]
    pub next_actions: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl Session {
    pub fn new(session_id: impl Into<String>, platform: Platform) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            platform,
            draft: LeadDraft::default(),
            progress_state: ProgressState::default(),
            exchange_count: 0,
            completed_steps: Vec::new(),
            next_actions: Vec::new(),
            created_at: now,
            last_updated: now,
        }
    }

    /// Refresh `last_updated`. Every mutation goes through here.
    pub fn touch(&mut self) {
        self.last_updated = Utc::now();
    }

    pub fn is_complete(&self) -> bool {
        self.draft.is_complete()
    }

    pub fn missing(&self) -> Vec<LeadField> {
        self.draft.missing()
    }

    /// Append a completed-step tag unless it is already recorded.
    pub fn push_step(&mut self, tag: impl Into<String>) {
        push_unique(&mut self.completed_steps, tag.into());
    }

    /// Append a next-action tag unless it is already recorded.
    pub fn push_action(&mut self, tag: impl Into<String>) {
        push_unique(&mut self.next_actions, tag.into());
    }

    /// Render the draft for the LLM prompt.
    pub fn context_summary(&self) -> String {
        let known: Vec<String> = LeadField::ALL
            .iter()
            .filter_map(|f| self.draft.value(*f).map(|v| format!("{}: {v}", f.as_str())))
            .collect();

        if self.is_complete() {
            return format!("Lead complete: {}", known.join(", "));
        }

        let missing: Vec<&str> = self.missing().iter().map(|f| f.as_str()).collect();
        let mut summary = format!("Lead incomplete. Missing: {}", missing.join(", "));
        if !known.is_empty() {
            summary.push_str(&format!(". Known: {}", known.join(", ")));
        }
        summary
    }
}

pub(crate) fn push_unique(list: &mut Vec<String>, tag: String) {
    if !list.contains(&tag) {
        list.push(tag);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lead::Country;

    #[test]
    fn display_matches_serde() {
        for state in [
            ProgressState::ConversationActive,
            ProgressState::LeadCaptured,
            ProgressState::Abandoned,
        ] {
            let json = serde_json::to_string(&state).unwrap();
            assert_eq!(json, format!("\"{state}\""));
            assert_eq!(ProgressState::parse(&state.to_string()), Some(state));
        }
    }

    #[test]
    fn lead_captured_is_terminal() {
        use ProgressState::*;
        assert!(LeadCaptured.is_terminal());
        assert!(!LeadCaptured.can_transition_to(ConversationActive));
        assert!(!LeadCaptured.can_transition_to(Abandoned));
        assert!(ConversationActive.can_transition_to(Abandoned));
        assert!(Abandoned.can_transition_to(ConversationActive));
    }

    #[test]
    fn session_ids_carry_platform() {
        let tg = telegram_session_id(42);
        assert_eq!(tg, "telegram_42");
        assert_eq!(Platform::for_session_id(&tg), Platform::Telegram);

        let web = new_web_session_id();
        assert!(web.starts_with("web_"));
        assert_eq!(Platform::for_session_id(&web), Platform::Web);
        assert_ne!(web, new_web_session_id());
    }

    #[test]
    fn tags_are_not_duplicated() {
        let mut s = Session::new("web_1", Platform::Web);
        s.push_step("email_collected");
        s.push_step("email_collected");
        s.push_action(steps::NOTIFY_TEAM);
        assert_eq!(s.completed_steps, vec!["email_collected"]);
        assert_eq!(s.next_actions, vec!["notify_team"]);
    }

    #[test]
    fn context_summary_lists_missing_and_known() {
        let mut s = Session::new("web_1", Platform::Web);
        assert_eq!(
            s.context_summary(),
            "Lead incomplete. Missing: name, email, phone, target_country, preferred_intake, study_level, gpa_grades, study_field"
        );

        s.draft.target_country = Some(Country::Uk);
        assert!(s.context_summary().ends_with("Known: target_country: UK"));

        s.draft.name = Some("Ram".into());
        s.draft.email = Some("ram@mail.com".into());
        s.draft.phone = Some("+9779800000000".into());
        assert!(s.context_summary().starts_with("Lead complete: name: Ram"));
    }

    #[test]
    fn session_serializes_flat() {
        let mut s = Session::new("telegram_7", Platform::Telegram);
        s.draft.email = Some("a@b.co".into());
        let value = serde_json::to_value(&s).unwrap();
        assert_eq!(value["email"], "a@b.co");
        assert_eq!(value["platform"], "telegram");
        assert_eq!(value["progress_state"], "conversation_active");
        let back: Session = serde_json::from_value(value).unwrap();
        assert_eq!(back, s);
    }
}
