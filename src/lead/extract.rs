//! Field extractors: pattern and dictionary matching over one utterance.
//!
//! Each extractor is pure and returns `None` when nothing matches. Ties are
//! always broken by position in the text or by table order, never by score.
//! Callers only invoke an extractor for a slot that is still empty.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use super::model::{Country, StudyLevel};

/// Digit bounds for a phone number (E.164 caps at 15).
const MIN_PHONE_DIGITS: usize = 7;
const MAX_PHONE_DIGITS: usize = 15;

/// Longest name we accept, in words.
const MAX_NAME_WORDS: usize = 4;

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b[A-Z0-9._%+\-]+@[A-Z0-9.\-]+\.[A-Z]{2,}\b").unwrap()
});

static PHONE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\+?\(?\d[\d\s().\-]{5,}\d").unwrap());

static NAME_LEAD_IN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:my name is|this is|i am|i'm|i’m)\s+([a-z][a-z .'’\-]*)").unwrap()
});

static LEADING_PHRASE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([A-Za-z][A-Za-z .'’\-]*?)\s*,").unwrap());

static NAME_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z.'’\-]*$").unwrap());

static INTAKE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(january|february|march|april|may|june|july|august|september|october|november|december|jan|feb|mar|apr|jun|jul|aug|sept|sep|oct|nov|dec|fall|spring|summer|autumn|winter)\b(?:\s*,?\s*(\d{4})\b)?",
    )
    .unwrap()
});

/// GPA/grade patterns, tried in order. The first capture group is the value.
static GPA_PATTERNS: LazyLock<Vec<(GradeKind, Regex)>> = LazyLock::new(|| {
    vec![
        // 3.8/4.0
        (
            GradeKind::Plain,
            Regex::new(r"\b(\d(?:\.\d{1,2})?)\s*/\s*4(?:\.0{1,2})?\b").unwrap(),
        ),
        // 3.8 GPA
        (
            GradeKind::Plain,
            Regex::new(r"(?i)\b(\d\.\d{1,2})\s*c?gpa\b").unwrap(),
        ),
        // GPA of 3.8
        (
            GradeKind::Plain,
            Regex::new(r"(?i)\bc?gpa\s*(?:of|is|was|:|=)?\s*(\d\.\d{1,2})\b").unwrap(),
        ),
        // bare 3.8
        (GradeKind::Plain, Regex::new(r"\b(\d\.\d{1,2})\b").unwrap()),
        // 85%
        (
            GradeKind::Percent,
            Regex::new(r"\b(\d{1,3}(?:\.\d{1,2})?)\s*%").unwrap(),
        ),
        // got an A / grade B+
        (
            GradeKind::Plain,
            Regex::new(
                r"(?i:\b(?:grades?|got|scored?))\s*(?i:of|is|was|an|a|:)?\s*([A-F][+\-]?)(?:[^A-Za-z0-9]|$)",
            )
            .unwrap(),
        ),
        // standalone A+ / B-
        (
            GradeKind::Plain,
            Regex::new(r"(?:^|[^A-Za-z0-9])([A-F][+\-])(?:[^A-Za-z0-9+\-]|$)").unwrap(),
        ),
    ]
});

#[derive(Debug, Clone, Copy)]
enum GradeKind {
    Plain,
    Percent,
}

/// Country aliases in dictionary order. `true` marks a case-sensitive alias.
const COUNTRY_ALIASES: &[(Country, &[(&str, bool)])] = &[
    (
        Country::Usa,
        &[
            ("usa", false),
            ("u.s.a", false),
            ("u.s.", false),
            ("united states", false),
            ("america", false),
            ("US", true),
        ],
    ),
    (
        Country::Uk,
        &[
            ("uk", false),
            ("u.k.", false),
            ("united kingdom", false),
            ("britain", false),
            ("great britain", false),
            ("england", false),
        ],
    ),
    (Country::Australia, &[("australia", false), ("aussie", false)]),
    (
        Country::SouthKorea,
        &[
            ("south korea", false),
            ("korea", false),
            ("korean", false),
            ("seoul", false),
        ],
    ),
];

const STUDY_LEVEL_ALIASES: &[(StudyLevel, &[&str])] = &[
    (
        StudyLevel::Bachelor,
        &[
            "bachelor",
            "bachelors",
            "undergraduate",
            "undergrad",
            "ug",
            "bsc",
            "b.sc",
            "bba",
            "bca",
        ],
    ),
    (
        StudyLevel::Master,
        &[
            "master",
            "masters",
            "postgraduate",
            "postgrad",
            "pg",
            "msc",
            "m.sc",
            "mba",
        ],
    ),
    (
        StudyLevel::PhD,
        &["phd", "ph.d", "doctorate", "doctoral"],
    ),
    (StudyLevel::Diploma, &["diploma", "certificate"]),
];

/// Degree subjects, compound names ahead of their shorter forms.
const STUDY_FIELDS: &[&str] = &[
    "computer science",
    "information technology",
    "data science",
    "software engineering",
    "artificial intelligence",
    "cyber security",
    "cybersecurity",
    "civil engineering",
    "mechanical engineering",
    "electrical engineering",
    "engineering",
    "business administration",
    "business analytics",
    "business",
    "management",
    "finance",
    "accounting",
    "economics",
    "marketing",
    "international relations",
    "public health",
    "nursing",
    "pharmacy",
    "medicine",
    "biotechnology",
    "biology",
    "chemistry",
    "physics",
    "mathematics",
    "statistics",
    "psychology",
    "law",
    "architecture",
    "hospitality",
    "tourism",
    "education",
    "journalism",
    "media",
    "design",
    "arts",
];

/// Words that never appear inside a captured name.
static NON_NAME_WORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "a", "an", "the", "and", "or", "but", "so", "from", "in", "at", "to", "for", "of",
        "with", "on", "about", "regarding", "i", "im", "me", "my", "is", "am", "are", "was",
        "will", "can", "would", "could", "should", "hi", "hello", "hey", "dear", "thanks",
        "thank", "you", "please", "yes", "no", "ok", "okay", "sure", "interested", "looking",
        "planning", "trying", "hoping", "thinking", "asking", "wondering", "want", "wanting",
        "wanna", "like", "going", "gonna", "here", "just", "not", "currently", "really", "very",
        "also", "still", "student", "studying", "study", "applying", "apply", "ready", "good",
        "fine", "great", "glad", "happy", "new", "done", "calling", "writing", "contacting",
        "visa", "urgent", "important", "helpful", "confused", "sorry", "morning", "afternoon",
        "evening",
    ]
    .into_iter()
    .collect()
});

/// Build a case-insensitive alternation over aliases, anchoring alphanumeric
/// edges on word boundaries.
fn alias_regex(aliases: &[(&str, bool)]) -> Regex {
    let alternatives: Vec<String> = aliases
        .iter()
        .map(|(alias, case_sensitive)| {
            let mut pat = String::new();
            if alias.chars().next().is_some_and(char::is_alphanumeric) {
                pat.push_str(r"\b");
            }
            pat.push_str(&regex::escape(alias));
            if alias.chars().last().is_some_and(char::is_alphanumeric) {
                pat.push_str(r"\b");
            }
            if *case_sensitive {
                format!("(?-i:{pat})")
            } else {
                pat
            }
        })
        .collect();
    Regex::new(&format!("(?i)(?:{})", alternatives.join("|"))).unwrap()
}

static COUNTRY_MATCHERS: LazyLock<Vec<(Country, Regex)>> = LazyLock::new(|| {
    COUNTRY_ALIASES
        .iter()
        .map(|(country, aliases)| (*country, alias_regex(aliases)))
        .collect()
});

static STUDY_LEVEL_MATCHERS: LazyLock<Vec<(StudyLevel, Regex)>> = LazyLock::new(|| {
    STUDY_LEVEL_ALIASES
        .iter()
        .map(|(level, aliases)| {
            let flagged: Vec<(&str, bool)> = aliases.iter().map(|a| (*a, false)).collect();
            (*level, alias_regex(&flagged))
        })
        .collect()
});

static STUDY_FIELD_MATCHERS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    STUDY_FIELDS
        .iter()
        .map(|field| (*field, alias_regex(&[(field, false)])))
        .collect()
});

// ── Extractors ──────────────────────────────────────────────────────

/// First email address in the text.
pub fn extract_email(text: &str) -> Option<String> {
    EMAIL.find(text).map(|m| m.as_str().to_string())
}

/// First digit-heavy span with a plausible digit count, normalized to
/// `+<digits>`. Email addresses are masked first so their digits never count.
pub fn extract_phone(text: &str) -> Option<String> {
    let masked = EMAIL.replace_all(text, " ");
    PHONE.find_iter(&masked).find_map(|m| {
        let normalized = normalize_phone(m.as_str());
        let digits = normalized.len() - 1;
        (MIN_PHONE_DIGITS..=MAX_PHONE_DIGITS)
            .contains(&digits)
            .then_some(normalized)
    })
}

/// Whether `value` is exactly one email address, nothing around it.
pub fn is_email(value: &str) -> bool {
    EMAIL
        .find(value)
        .is_some_and(|m| m.start() == 0 && m.end() == value.len())
}

/// Accept a stored phone only in `+<digits>` (or bare digits) form with a
/// plausible digit count, returned normalized.
pub fn stored_phone(value: &str) -> Option<String> {
    let digits = value.strip_prefix('+').unwrap_or(value);
    let plausible = (MIN_PHONE_DIGITS..=MAX_PHONE_DIGITS).contains(&digits.len())
        && digits.chars().all(|c| c.is_ascii_digit());
    plausible.then(|| format!("+{digits}"))
}

/// Strip everything but digits and always lead with a single `+`.
pub fn normalize_phone(raw: &str) -> String {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    format!("+{digits}")
}

/// Name, trying in order: lead-in phrases, a comma-delimited clause that
/// reads like "Firstname Lastname", then the email local-part.
pub fn extract_name(text: &str, email: Option<&str>) -> Option<String> {
    name_from_lead_in(text)
        .or_else(|| name_from_clauses(text))
        .or_else(|| email.and_then(name_from_email))
}

fn name_from_lead_in(text: &str) -> Option<String> {
    for caps in NAME_LEAD_IN.captures_iter(text) {
        let Some(raw) = caps.get(1) else { continue };
        // Sentence end closes the phrase.
        let phrase = raw.as_str().split(". ").next().unwrap_or_default();
        let words: Vec<&str> = phrase
            .split_whitespace()
            .map(|w| w.trim_end_matches('.'))
            .take_while(|w| !is_non_name_word(w))
            .collect();
        if let Some(name) = accept_name_words(&words) {
            return Some(name);
        }
    }

    // A bare leading phrase: "Sarah, I want to study in the UK".
    let caps = LEADING_PHRASE.captures(text)?;
    let words: Vec<&str> = caps
        .get(1)
        .map(|m| m.as_str().split_whitespace().collect())
        .unwrap_or_default();
    if words.iter().any(|w| is_non_name_word(w)) {
        return None;
    }
    accept_name_words(&words)
}

fn name_from_clauses(text: &str) -> Option<String> {
    if !text.contains(',') {
        return None;
    }
    text.split(',').find_map(|clause| {
        let words: Vec<&str> = clause.split_whitespace().collect();
        if words.len() < 2 || words.iter().any(|w| is_non_name_word(w)) {
            return None;
        }
        accept_name_words(&words)
    })
}

fn name_from_email(email: &str) -> Option<String> {
    let local = email.split('@').next()?;
    let spaced: String = local
        .chars()
        .map(|c| if c.is_alphabetic() { c } else { ' ' })
        .collect();
    let name = title_case(&spaced);
    (name.chars().count() >= 2).then_some(name)
}

fn accept_name_words(words: &[&str]) -> Option<String> {
    if words.is_empty() || words.len() > MAX_NAME_WORDS {
        return None;
    }
    if !words.iter().all(|w| NAME_WORD.is_match(w)) {
        return None;
    }
    let candidate = words.join(" ");
    // "Computer Science" or "South Korea" is not somebody's name.
    if extract_country(&candidate).is_some()
        || extract_study_level(&candidate).is_some()
        || extract_study_field(&candidate).is_some()
    {
        return None;
    }
    Some(title_case(&candidate))
}

fn is_non_name_word(word: &str) -> bool {
    let lower = word
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase();
    NON_NAME_WORDS.contains(lower.as_str())
}

/// First supported country by dictionary order.
pub fn extract_country(text: &str) -> Option<Country> {
    COUNTRY_MATCHERS
        .iter()
        .find(|(_, re)| re.is_match(text))
        .map(|(country, _)| *country)
}

/// First month or season mentioned, with an adjacent year when present.
pub fn extract_intake(text: &str) -> Option<String> {
    INTAKE.captures_iter(text).find_map(|caps| {
        let period = caps.get(1)?.as_str();
        let year = caps.get(2).map(|y| y.as_str());
        // "may" alone is the verb, not the month.
        if period.eq_ignore_ascii_case("may") && year.is_none() {
            return None;
        }
        let period = title_case(period);
        Some(match year {
            Some(year) => format!("{period} {year}"),
            None => period,
        })
    })
}

/// First study level by dictionary order.
pub fn extract_study_level(text: &str) -> Option<StudyLevel> {
    STUDY_LEVEL_MATCHERS
        .iter()
        .find(|(_, re)| re.is_match(text))
        .map(|(level, _)| *level)
}

/// GPA or grade from the first pattern that matches anywhere.
pub fn extract_gpa(text: &str) -> Option<String> {
    GPA_PATTERNS.iter().find_map(|(kind, re)| {
        let value = re.captures(text)?.get(1)?.as_str();
        Some(match kind {
            GradeKind::Plain => value.to_string(),
            GradeKind::Percent => format!("{value}%"),
        })
    })
}

/// First subject from the vocabulary, title-cased.
pub fn extract_study_field(text: &str) -> Option<String> {
    STUDY_FIELD_MATCHERS
        .iter()
        .find(|(_, re)| re.is_match(text))
        .map(|(field, _)| title_case(field))
}

/// Collapse whitespace and upper-case each letter that follows a non-letter.
pub fn title_case(s: &str) -> String {
    let collapsed = s.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut out = String::with_capacity(collapsed.len());
    let mut prev_letter = false;
    for ch in collapsed.chars() {
        if ch.is_alphabetic() {
            if prev_letter {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            prev_letter = true;
        } else {
            out.push(ch);
            prev_letter = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Email / phone ───────────────────────────────────────────────

    #[test]
    fn email_first_match_wins() {
        assert_eq!(
            extract_email("contact me at a.b@x.org please").as_deref(),
            Some("a.b@x.org")
        );
        assert_eq!(
            extract_email("one@a.com or two@b.com").as_deref(),
            Some("one@a.com")
        );
        assert_eq!(extract_email("no address here"), None);
    }

    #[test]
    fn phone_normalizes_separators() {
        assert_eq!(
            extract_phone("call (977) 987-654-3210").as_deref(),
            Some("+9779876543210")
        );
        assert_eq!(
            extract_phone("my number is +1 555 123 4567").as_deref(),
            Some("+15551234567")
        );
    }

    #[test]
    fn phone_synthesizes_plus() {
        assert_eq!(
            extract_phone("9841234567").as_deref(),
            Some("+9841234567")
        );
    }

    #[test]
    fn phone_ignores_short_numbers_and_years() {
        assert_eq!(extract_phone("Fall 2026, GPA 3.8/4.0"), None);
        assert_eq!(extract_phone("room 12345"), None);
    }

    #[test]
    fn phone_ignores_digits_inside_email() {
        assert_eq!(extract_phone("write to ram12345678@mail.com"), None);
    }

    // ── Name ────────────────────────────────────────────────────────

    #[test]
    fn stored_contact_shapes() {
        assert!(is_email("ram@mail.com"));
        assert!(!is_email("ram@mail.com and more"));
        assert!(!is_email("not-an-email"));
        assert_eq!(stored_phone("+9841234567").as_deref(), Some("+9841234567"));
        assert_eq!(stored_phone("9841234567").as_deref(), Some("+9841234567"));
        assert_eq!(stored_phone("call me"), None);
        assert_eq!(stored_phone("+12"), None);
        assert_eq!(stored_phone("+984-123-4567"), None);
    }

    #[test]
    fn name_from_lead_in_phrase() {
        assert_eq!(
            extract_name("Hi, I'm Sarah Lee, from Kathmandu", None).as_deref(),
            Some("Sarah Lee")
        );
        assert_eq!(
            extract_name("my name is ram bahadur thapa", None).as_deref(),
            Some("Ram Bahadur Thapa")
        );
        assert_eq!(
            extract_name("This is Anil from Pokhara", None).as_deref(),
            Some("Anil")
        );
    }

    #[test]
    fn name_lead_in_stops_at_sentence_end() {
        assert_eq!(
            extract_name("I am Priya. I want to study abroad", None).as_deref(),
            Some("Priya")
        );
    }

    #[test]
    fn name_rejects_non_name_phrases() {
        assert_eq!(extract_name("I am interested in the UK", None), None);
        assert_eq!(extract_name("I'm looking for a visa", None), None);
        assert_eq!(extract_name("I am from Nepal", None), None);
    }

    #[test]
    fn name_from_leading_phrase_with_contact() {
        assert_eq!(
            extract_name("Sita, sita@mail.com", None).as_deref(),
            Some("Sita")
        );
        // Greeting before a comma is not a name.
        assert_eq!(extract_name("Hello, 9841234567", None), None);
    }

    #[test]
    fn name_from_leading_phrase_without_contact() {
        assert_eq!(
            extract_name("Sarah, I want to study in the UK", None).as_deref(),
            Some("Sarah")
        );
        assert_eq!(extract_name("Sure, I want to study in the UK", None), None);
        assert_eq!(extract_name("Hi, I want to study in the UK", None), None);
    }

    #[test]
    fn name_from_comma_clause() {
        assert_eq!(
            extract_name("USA, john smith, fall intake", None).as_deref(),
            Some("John Smith")
        );
        assert_eq!(extract_name("Computer Science, South Korea", None), None);
    }

    #[test]
    fn name_from_email_local_part() {
        assert_eq!(
            extract_name("here you go", Some("sarah.lee@mail.com")).as_deref(),
            Some("Sarah Lee")
        );
        assert_eq!(
            extract_name("here you go", Some("john_doe99@mail.com")).as_deref(),
            Some("John Doe")
        );
        assert_eq!(extract_name("ok", Some("j7@mail.com")), None);
    }

    #[test]
    fn title_case_handles_punctuation() {
        assert_eq!(title_case("  mary-jane   o'brien "), "Mary-Jane O'Brien");
        assert_eq!(title_case("COMPUTER science"), "Computer Science");
    }

    // ── Country ─────────────────────────────────────────────────────

    #[test]
    fn country_aliases_resolve() {
        assert_eq!(
            extract_country("I want to study in the U.S."),
            Some(Country::Usa)
        );
        assert_eq!(extract_country("thinking about america"), Some(Country::Usa));
        assert_eq!(extract_country("Seoul looks nice"), Some(Country::SouthKorea));
        assert_eq!(extract_country("maybe great britain"), Some(Country::Uk));
    }

    #[test]
    fn unsupported_country_not_captured() {
        assert_eq!(extract_country("I want to study in Germany"), None);
    }

    #[test]
    fn short_alias_needs_word_boundary() {
        assert_eq!(extract_country("can we discuss fees"), None);
        assert_eq!(extract_country("tell us more"), None);
        assert_eq!(extract_country("going to the US next year"), Some(Country::Usa));
    }

    #[test]
    fn country_dictionary_order_breaks_ties() {
        assert_eq!(
            extract_country("either Australia or the UK"),
            Some(Country::Uk)
        );
    }

    // ── Intake ──────────────────────────────────────────────────────

    #[test]
    fn intake_month_and_year() {
        assert_eq!(extract_intake("for Fall 2026").as_deref(), Some("Fall 2026"));
        assert_eq!(
            extract_intake("starting september, 2025").as_deref(),
            Some("September 2025")
        );
        assert_eq!(extract_intake("the jan intake").as_deref(), Some("Jan"));
    }

    #[test]
    fn intake_skips_modal_may() {
        assert_eq!(extract_intake("I may apply"), None);
        assert_eq!(extract_intake("May 2026 works").as_deref(), Some("May 2026"));
    }

    // ── Study level ─────────────────────────────────────────────────

    #[test]
    fn study_level_synonyms() {
        assert_eq!(
            extract_study_level("Master's in Computer Science"),
            Some(StudyLevel::Master)
        );
        assert_eq!(
            extract_study_level("an undergraduate program"),
            Some(StudyLevel::Bachelor)
        );
        assert_eq!(extract_study_level("doing a PhD"), Some(StudyLevel::PhD));
        assert_eq!(extract_study_level("a short diploma"), Some(StudyLevel::Diploma));
        assert_eq!(extract_study_level("I thought so"), None);
    }

    // ── GPA ─────────────────────────────────────────────────────────

    #[test]
    fn gpa_pattern_order() {
        assert_eq!(extract_gpa("GPA 3.8/4.0").as_deref(), Some("3.8"));
        assert_eq!(extract_gpa("I have 3.5 GPA").as_deref(), Some("3.5"));
        assert_eq!(extract_gpa("my cgpa is 3.2").as_deref(), Some("3.2"));
        assert_eq!(extract_gpa("scored 3.65 overall").as_deref(), Some("3.65"));
        assert_eq!(extract_gpa("I got 85% in +2").as_deref(), Some("85%"));
        assert_eq!(extract_gpa("I got an A in finals").as_deref(), Some("A"));
        assert_eq!(extract_gpa("mostly B+ grades").as_deref(), Some("B+"));
    }

    #[test]
    fn gpa_fraction_beats_bare_decimal() {
        assert_eq!(extract_gpa("IELTS 6.5 and 3.9/4").as_deref(), Some("3.9"));
    }

    #[test]
    fn gpa_ignores_plain_capitals() {
        assert_eq!(extract_gpa("A friend told me about you"), None);
    }

    // ── Study field ─────────────────────────────────────────────────

    #[test]
    fn study_field_first_in_vocabulary() {
        assert_eq!(
            extract_study_field("software engineering or business").as_deref(),
            Some("Software Engineering")
        );
        assert_eq!(
            extract_study_field("master's in computer science").as_deref(),
            Some("Computer Science")
        );
        assert_eq!(extract_study_field("what a flawless day"), None);
    }
}
