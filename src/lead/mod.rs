//! Lead capture: draft model, field extractors and the aggregator.

pub mod aggregate;
pub mod extract;
pub mod model;

pub use aggregate::{MergeOutcome, merge};
pub use model::{Country, LeadDraft, LeadField, StudyLevel};
