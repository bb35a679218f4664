//! Per-turn session state machine.

use crate::lead::{self, LeadField};

use super::model::{ProgressState, Session, push_unique, steps};

/// What one turn did to a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    pub is_complete: bool,
    pub missing: Vec<LeadField>,
    pub changed: bool,
    /// Fields filled for the first time this turn.
    pub newly_filled: Vec<LeadField>,
    /// True exactly once per session: on the turn the lead became capturable.
    /// The caller owns the notification and lead-table paths.
    pub lead_captured: bool,
}

impl Session {
    /// Advance the session by one inbound utterance.
    pub fn apply_turn(&mut self, text: &str) -> TurnOutcome {
        if self.progress_state == ProgressState::Abandoned {
            self.progress_state = ProgressState::ConversationActive;
            self.push_step(steps::CONVERSATION_RESUMED);
        }

        self.exchange_count = self.exchange_count.saturating_add(1);

        let merged = lead::merge(&self.draft, text);
        let newly_filled = merged.draft.newly_filled_since(&self.draft);
        for field in &newly_filled {
            self.push_step(steps::collected(*field));
        }
        self.draft = merged.draft;

        let lead_captured = merged.is_complete
            && self
                .progress_state
                .can_transition_to(ProgressState::LeadCaptured);
        if lead_captured {
            self.progress_state = ProgressState::LeadCaptured;
            self.push_step(steps::LEAD_CAPTURED);
            self.push_action(steps::NOTIFY_TEAM);
            self.push_action(steps::SAVE_LEAD);
            tracing::info!(
                session_id = %self.session_id,
                platform = %self.platform,
                exchange = self.exchange_count,
                "Lead captured"
            );
        }

        self.touch();

        TurnOutcome {
            is_complete: merged.is_complete,
            missing: merged.missing,
            changed: merged.changed,
            newly_filled,
            lead_captured,
        }
    }

    /// Mark an idle session abandoned. Returns false when the current state
    /// does not allow it (already captured or already abandoned).
    pub fn mark_abandoned(&mut self) -> bool {
        if !self
            .progress_state
            .can_transition_to(ProgressState::Abandoned)
        {
            return false;
        }
        self.progress_state = ProgressState::Abandoned;
        self.touch();
        true
    }

    /// Fold a record loaded late from the store into this working copy.
    ///
    /// Stored values win where both sides have a field, counters add, and
    /// tag lists are unioned with the stored order first.
    pub fn absorb(&mut self, stored: Session) {
        let mut draft = stored.draft;
        draft.fill_gaps_from(&self.draft);
        self.draft = draft;

        self.exchange_count = self.exchange_count.saturating_add(stored.exchange_count);

        let mut completed = stored.completed_steps;
        for tag in self.completed_steps.drain(..) {
            push_unique(&mut completed, tag);
        }
        self.completed_steps = completed;

        let mut actions = stored.next_actions;
        for tag in self.next_actions.drain(..) {
            push_unique(&mut actions, tag);
        }
        self.next_actions = actions;

        if stored.progress_state.is_terminal() {
            self.progress_state = stored.progress_state;
        }
        self.created_at = self.created_at.min(stored.created_at);
        self.touch();
    }
}
