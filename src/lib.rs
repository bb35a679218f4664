//! Lead Assist: conversational lead capture for a student-visa consultancy.

pub mod channels;
pub mod chat;
pub mod config;
pub mod error;
pub mod lead;
pub mod notify;
pub mod reply;
pub mod session;
pub mod store;
pub mod web;

pub use error::{Error, Result};
