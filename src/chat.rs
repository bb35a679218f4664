//! Chat service: one inbound message in, one reply out.
//!
//! Every front-end (Telegram polling loop, web API) goes through
//! [`ChatService::handle`]. It owns command handling, the capture side effects
//! (lead table and team notification) and the bounded call into the
//! responder. None of its failures reach the user: store, notifier and
//! responder errors are logged and the conversation carries on.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::channels::{Channel, IncomingMessage, OutgoingResponse, StatusUpdate};
use crate::error::ReplyError;
use crate::notify::LeadNotifier;
use crate::reply::{DATA_DELETED_TEXT, FALLBACK_TEXT, ReplyContext, Responder, WELCOME_TEXT};
use crate::session::{
    Platform, Session, SessionManager, TurnOutcome, TurnResult, new_web_session_id,
    telegram_session_id,
};
use crate::store::LeadRecord;

/// Phrases that wipe the user's session.
const DELETE_PHRASES: &[&str] = &[
    "delete my data",
    "delete data",
    "clear data",
    "delete my chat",
    "delete chat",
    "clear chat",
    "delete history",
    "clear history",
];

/// What a message turned out to be before any state was touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    DeleteData,
}

impl Command {
    pub fn parse(text: &str) -> Option<Self> {
        let trimmed = text.trim();
        if trimmed == "/start" || trimmed.starts_with("/start ") {
            return Some(Self::Start);
        }
        let lower = trimmed.to_lowercase();
        if DELETE_PHRASES.iter().any(|p| lower.contains(p)) {
            return Some(Self::DeleteData);
        }
        None
    }
}

/// The service's answer to one message.
#[derive(Debug, Clone)]
pub struct ChatReply {
    pub response: String,
    pub session_id: String,
    /// Present when the message ran through the state machine.
    pub turn: Option<TurnResult>,
    /// Set for commands, which bypass extraction.
    pub command: Option<Command>,
}

pub struct ChatService {
    manager: Arc<SessionManager>,
    responder: Arc<dyn Responder>,
    notifier: Arc<dyn LeadNotifier>,
    reply_permits: Arc<Semaphore>,
}

impl ChatService {
    pub fn new(
        manager: Arc<SessionManager>,
        responder: Arc<dyn Responder>,
        notifier: Arc<dyn LeadNotifier>,
        max_concurrent_replies: usize,
    ) -> Self {
        Self {
            manager,
            responder,
            notifier,
            reply_permits: Arc::new(Semaphore::new(max_concurrent_replies)),
        }
    }

    pub fn manager(&self) -> &Arc<SessionManager> {
        &self.manager
    }

    /// Handle one message for a known session id.
    pub async fn handle(&self, session_id: &str, platform: Platform, text: &str) -> ChatReply {
        if let Some(command) = Command::parse(text) {
            let response = self.run_command(command, session_id).await;
            return ChatReply {
                response,
                session_id: session_id.to_string(),
                turn: None,
                command: Some(command),
            };
        }

        let turn = self.manager.process_turn(session_id, platform, text).await;
        if turn.outcome.lead_captured {
            self.record_capture(&turn.session).await;
        }

        let response = self.reply(text, &turn.session, &turn.outcome).await;
        ChatReply {
            response,
            session_id: session_id.to_string(),
            turn: Some(turn),
            command: None,
        }
    }

    /// Handle a message from the web widget.
    ///
    /// Only web ids are accepted from the browser; anything else starts a new
    /// web session so a caller cannot address a Telegram user's record.
    pub async fn handle_web(&self, session_id: Option<&str>, text: &str) -> ChatReply {
        let session_id = match session_id.map(str::trim) {
            Some(id) if !id.is_empty() && Platform::for_session_id(id) == Platform::Web => {
                id.to_string()
            }
            _ => new_web_session_id(),
        };
        self.handle(&session_id, Platform::Web, text).await
    }

    async fn run_command(&self, command: Command, session_id: &str) -> String {
        match command {
            Command::Start => WELCOME_TEXT.to_string(),
            Command::DeleteData => {
                let existed = self.manager.clear(session_id).await;
                info!(session_id = %session_id, existed, "User requested data deletion");
                DATA_DELETED_TEXT.to_string()
            }
        }
    }

    /// Side effects of the capture transition. Failures are logged only.
    async fn record_capture(&self, session: &Session) {
        let Some(lead) = LeadRecord::from_session(session) else {
            warn!(session_id = %session.session_id, "Capture flagged on an incomplete lead");
            return;
        };

        if let Err(e) = self.manager.save_lead(&lead).await {
            warn!(session_id = %lead.session_id, error = %e, "Failed to save lead");
        }
        if let Err(e) = self.notifier.notify(&lead).await {
            warn!(session_id = %lead.session_id, error = %e, "Lead notification failed");
        }
        info!(
            session_id = %lead.session_id,
            platform = %lead.platform,
            country = %lead.target_country,
            "Lead captured"
        );
    }

    async fn reply(&self, text: &str, session: &Session, outcome: &TurnOutcome) -> String {
        let Ok(_permit) = self.reply_permits.acquire().await else {
            return FALLBACK_TEXT.to_string();
        };
        let ctx = ReplyContext {
            user_text: text,
            session,
            outcome,
        };
        let result = self.responder.respond(ctx).await.and_then(|reply| {
            if reply.trim().is_empty() {
                Err(ReplyError::Empty)
            } else {
                Ok(reply)
            }
        });
        match result {
            Ok(reply) => reply,
            Err(e) => {
                warn!(session_id = %session.session_id, error = %e, "Responder failed");
                FALLBACK_TEXT.to_string()
            }
        }
    }
}

/// Drive a channel until its stream ends, answering each message.
///
/// Messages are handled on their own tasks; the session manager serializes
/// messages from the same user.
pub async fn run_channel(channel: Arc<dyn Channel>, service: Arc<ChatService>) {
    let mut stream = match channel.start().await {
        Ok(stream) => stream,
        Err(e) => {
            warn!(channel = channel.name(), error = %e, "Channel failed to start");
            return;
        }
    };
    info!(channel = channel.name(), "Channel listening");

    while let Some(message) = stream.next().await {
        let channel = Arc::clone(&channel);
        let service = Arc::clone(&service);
        tokio::spawn(async move {
            handle_channel_message(channel.as_ref(), &service, message).await;
        });
    }

    info!(channel = channel.name(), "Channel stream ended");
}

async fn handle_channel_message(channel: &dyn Channel, service: &ChatService, msg: IncomingMessage) {
    if let Err(e) = channel.send_status(StatusUpdate::Typing, &msg.metadata).await {
        debug!(channel = channel.name(), error = %e, "Typing indicator failed");
    }

    let session_id = telegram_session_id(&msg.user_id);
    let reply = service
        .handle(&session_id, Platform::Telegram, &msg.content)
        .await;

    if let Err(e) = channel
        .respond(&msg, OutgoingResponse::text(reply.response))
        .await
    {
        warn!(
            channel = channel.name(),
            session_id = %session_id,
            error = %e,
            "Failed to deliver reply"
        );
    }
}
