//! Reply generation seam.
//!
//! A `Responder` turns a processed turn into the assistant's text. A hosted
//! LLM plugs in here; `GuidedResponder` is the deterministic built-in that
//! steers the user toward the fields still missing.

use async_trait::async_trait;

use crate::error::ReplyError;
use crate::session::{Session, TurnOutcome};

/// Everything a responder may look at for one turn.
#[derive(Debug, Clone, Copy)]
pub struct ReplyContext<'a> {
    pub user_text: &'a str,
    pub session: &'a Session,
    pub outcome: &'a TurnOutcome,
}

#[async_trait]
pub trait Responder: Send + Sync {
    async fn respond(&self, ctx: ReplyContext<'_>) -> Result<String, ReplyError>;
}

/// Deterministic responder: acknowledge, then ask for the next missing field.
#[derive(Debug, Default, Clone)]
pub struct GuidedResponder;

#[async_trait]
impl Responder for GuidedResponder {
    async fn respond(&self, ctx: ReplyContext<'_>) -> Result<String, ReplyError> {
        Ok(guided_reply(ctx.session, ctx.outcome))
    }
}

fn guided_reply(session: &Session, outcome: &TurnOutcome) -> String {
    let draft = &session.draft;

    if outcome.lead_captured {
        let name = draft.name.as_deref().unwrap_or("there");
        let country = draft
            .target_country
            .map(|c| c.to_string())
            .unwrap_or_default();
        let mut reply = format!(
            "Thank you, {name}! I have your details and one of our counsellors for {country} \
             will contact you shortly."
        );
        if let Some(next) = outcome.missing.first() {
            reply.push_str(&format!(
                " If you like, you can also share your {} so we can prepare better.",
                next.label()
            ));
        }
        return reply;
    }

    let mut parts = Vec::new();
    if outcome.newly_filled.is_empty() {
        if session.exchange_count <= 1 {
            parts.push(
                "Hello! I can help you with student visas for USA, UK, Australia and South Korea."
                    .to_string(),
            );
        }
    } else {
        let noted: Vec<&str> = outcome.newly_filled.iter().map(|f| f.label()).collect();
        parts.push(format!("Thanks, I've noted your {}.", join_labels(&noted)));
    }

    let next_hard = outcome.missing.iter().find(|f| f.is_hard());
    match next_hard.or(outcome.missing.first()) {
        Some(field) if field.is_hard() => {
            parts.push(format!("Could you share your {}?", field.label()));
        }
        Some(field) => {
            parts.push(format!(
                "To help our counsellors, could you also tell me your {}?",
                field.label()
            ));
        }
        None => parts.push("Is there anything else you'd like to know?".to_string()),
    }

    parts.join(" ")
}

fn join_labels(labels: &[&str]) -> String {
    match labels {
        [] => String::new(),
        [one] => (*one).to_string(),
        [init @ .., last] => format!("{} and {last}", init.join(", ")),
    }
}

/// Canned text for `/start`.
pub const WELCOME_TEXT: &str = "Hello! Welcome to our student visa consultancy. I'm here to help \
    you with information about student visas for USA, UK, Australia, and South Korea. How can I \
    assist you today?";

/// Confirmation after a user's data is wiped.
pub const DATA_DELETED_TEXT: &str = "Your data has been completely deleted from our system. This \
    is a fresh start - I have no memory of our previous conversation. How can I help you with \
    student visa information?";

/// Sent when the responder fails; the turn itself has still been recorded.
pub const FALLBACK_TEXT: &str =
    "I apologize, but I encountered an error generating a response. Please try again.";
