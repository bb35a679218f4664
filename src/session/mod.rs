//! Conversation sessions: record, per-turn state machine and manager.

pub mod manager;
pub mod model;
pub mod state;

pub use manager::{SessionManager, TurnResult};
pub use model::{
    Platform, ProgressState, Session, new_web_session_id, steps, telegram_session_id,
};
pub use state::TurnOutcome;
