//! Lead aggregator: folds one utterance into a cumulative draft.

use super::extract;
use super::model::{LeadDraft, LeadField};

/// Result of merging one utterance into a draft.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    pub draft: LeadDraft,
    pub is_complete: bool,
    pub missing: Vec<LeadField>,
    pub changed: bool,
}

/// Run every extractor whose slot is still empty and write back what matched.
///
/// Filled slots are never touched, so merging the same text twice is a no-op.
pub fn merge(prior: &LeadDraft, text: &str) -> MergeOutcome {
    let mut draft = prior.clone();

    if !draft.is_filled(LeadField::Email) {
        draft.email = extract::extract_email(text);
    }
    if !draft.is_filled(LeadField::Phone) {
        draft.phone = extract::extract_phone(text);
    }
    if !draft.is_filled(LeadField::Name) {
        // Only an address captured by this same merge feeds the email fallback.
        let fresh_email = if prior.is_filled(LeadField::Email) {
            None
        } else {
            draft.email.as_deref()
        };
        draft.name = extract::extract_name(text, fresh_email);
    }
    if draft.target_country.is_none() {
        draft.target_country = extract::extract_country(text);
    }
    if !draft.is_filled(LeadField::PreferredIntake) {
        draft.preferred_intake = extract::extract_intake(text);
    }
    if draft.study_level.is_none() {
        draft.study_level = extract::extract_study_level(text);
    }
    if !draft.is_filled(LeadField::GpaGrades) {
        draft.gpa_grades = extract::extract_gpa(text);
    }
    if !draft.is_filled(LeadField::StudyField) {
        draft.study_field = extract::extract_study_field(text);
    }

    // A blank stored slot that nothing new replaced keeps its prior value.
    draft.fill_gaps_from(prior);

    let changed = draft != *prior;
    if changed {
        tracing::debug!(
            fields = ?draft.newly_filled_since(prior),
            "Extracted lead fields"
        );
    }

    MergeOutcome {
        is_complete: draft.is_complete(),
        missing: draft.missing(),
        changed,
        draft,
    }
}
