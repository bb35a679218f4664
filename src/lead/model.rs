//! Lead draft data model.

use serde::{Deserialize, Serialize};

/// Destination countries the consultancy handles.
///
/// Anything else mentioned in chat is deliberately not captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Country {
    #[serde(rename = "USA")]
    Usa,
    #[serde(rename = "UK")]
    Uk,
    #[serde(rename = "Australia")]
    Australia,
    #[serde(rename = "South Korea")]
    SouthKorea,
}

impl Country {
    /// Canonical display/storage value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Usa => "USA",
            Self::Uk => "UK",
            Self::Australia => "Australia",
            Self::SouthKorea => "South Korea",
        }
    }

    /// Parse a stored value. Accepts the canonical names and the lowercase
    /// codes older rows used (`usa`, `south_korea`, ...).
    pub fn parse_stored(s: &str) -> Option<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', " ");
        match normalized.as_str() {
            "usa" => Some(Self::Usa),
            "uk" => Some(Self::Uk),
            "australia" => Some(Self::Australia),
            "south korea" => Some(Self::SouthKorea),
            _ => None,
        }
    }
}

impl std::fmt::Display for Country {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Level of study the lead is applying for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StudyLevel {
    Bachelor,
    Master,
    #[serde(rename = "PhD")]
    PhD,
    Diploma,
}

impl StudyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bachelor => "Bachelor",
            Self::Master => "Master",
            Self::PhD => "PhD",
            Self::Diploma => "Diploma",
        }
    }

    pub fn parse_stored(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bachelor" => Some(Self::Bachelor),
            "master" => Some(Self::Master),
            "phd" => Some(Self::PhD),
            "diploma" => Some(Self::Diploma),
            _ => None,
        }
    }
}

impl std::fmt::Display for StudyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The eight lead fields, in reporting order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadField {
    Name,
    Email,
    Phone,
    TargetCountry,
    PreferredIntake,
    StudyLevel,
    GpaGrades,
    StudyField,
}

impl LeadField {
    /// All fields in the order `missing` lists are reported.
    pub const ALL: [LeadField; 8] = [
        LeadField::Name,
        LeadField::Email,
        LeadField::Phone,
        LeadField::TargetCountry,
        LeadField::PreferredIntake,
        LeadField::StudyLevel,
        LeadField::GpaGrades,
        LeadField::StudyField,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Email => "email",
            Self::Phone => "phone",
            Self::TargetCountry => "target_country",
            Self::PreferredIntake => "preferred_intake",
            Self::StudyLevel => "study_level",
            Self::GpaGrades => "gpa_grades",
            Self::StudyField => "study_field",
        }
    }

    /// Hard fields gate completeness; the rest are advisory.
    pub fn is_hard(&self) -> bool {
        matches!(
            self,
            Self::Name | Self::Email | Self::Phone | Self::TargetCountry
        )
    }

    /// Human wording used when asking the user for this field.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Name => "full name",
            Self::Email => "email address",
            Self::Phone => "phone number",
            Self::TargetCountry => "preferred study destination (USA, UK, Australia or South Korea)",
            Self::PreferredIntake => "preferred intake (e.g. Fall 2026)",
            Self::StudyLevel => "study level (Bachelor, Master, PhD or Diploma)",
            Self::GpaGrades => "GPA or grades",
            Self::StudyField => "field of study",
        }
    }
}

impl std::fmt::Display for LeadField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// In-progress lead accumulated over a conversation.
///
/// Every slot is filled at most once; later turns never overwrite it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadDraft {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_country: Option<Country>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_intake: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub study_level: Option<StudyLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpa_grades: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub study_field: Option<String>,
}

impl LeadDraft {
    pub fn is_filled(&self, field: LeadField) -> bool {
        match field {
            LeadField::Name => has_text(&self.name),
            LeadField::Email => has_text(&self.email),
            LeadField::Phone => has_text(&self.phone),
            LeadField::TargetCountry => self.target_country.is_some(),
            LeadField::PreferredIntake => has_text(&self.preferred_intake),
            LeadField::StudyLevel => self.study_level.is_some(),
            LeadField::GpaGrades => has_text(&self.gpa_grades),
            LeadField::StudyField => has_text(&self.study_field),
        }
    }

    /// Display value of a field, if filled.
    pub fn value(&self, field: LeadField) -> Option<String> {
        if !self.is_filled(field) {
            return None;
        }
        match field {
            LeadField::Name => self.name.clone(),
            LeadField::Email => self.email.clone(),
            LeadField::Phone => self.phone.clone(),
            LeadField::TargetCountry => self.target_country.map(|c| c.to_string()),
            LeadField::PreferredIntake => self.preferred_intake.clone(),
            LeadField::StudyLevel => self.study_level.map(|l| l.to_string()),
            LeadField::GpaGrades => self.gpa_grades.clone(),
            LeadField::StudyField => self.study_field.clone(),
        }
    }

    /// True once all four hard contact fields are present.
    pub fn is_complete(&self) -> bool {
        LeadField::ALL
            .iter()
            .filter(|f| f.is_hard())
            .all(|f| self.is_filled(*f))
    }

    /// Empty fields, in `LeadField::ALL` order.
    pub fn missing(&self) -> Vec<LeadField> {
        LeadField::ALL
            .iter()
            .copied()
            .filter(|f| !self.is_filled(*f))
            .collect()
    }

    /// Fields filled here but not in `earlier`.
    pub fn newly_filled_since(&self, earlier: &LeadDraft) -> Vec<LeadField> {
        LeadField::ALL
            .iter()
            .copied()
            .filter(|f| self.is_filled(*f) && !earlier.is_filled(*f))
            .collect()
    }

    /// Fill this draft's empty slots from `other`, leaving filled slots alone.
    pub fn fill_gaps_from(&mut self, other: &LeadDraft) {
        fill(&mut self.name, &other.name);
        fill(&mut self.email, &other.email);
        fill(&mut self.phone, &other.phone);
        if self.target_country.is_none() {
            self.target_country = other.target_country;
        }
        fill(&mut self.preferred_intake, &other.preferred_intake);
        if self.study_level.is_none() {
            self.study_level = other.study_level;
        }
        fill(&mut self.gpa_grades, &other.gpa_grades);
        fill(&mut self.study_field, &other.study_field);
    }
}

fn has_text(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

fn fill(slot: &mut Option<String>, other: &Option<String>) {
    if !has_text(slot) && has_text(other) {
        *slot = other.clone();
    }
}
