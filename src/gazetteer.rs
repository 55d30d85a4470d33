//! Target-market location matching.
//!
//! Locations are normalized (state abbreviations expanded, "City of" and
//! "County" qualifiers dropped, short names title-cased) and accepted when
//! they hit a configured market or regional alias by exact match,
//! substring, or a normalized Levenshtein ratio of at least 0.8.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::PipelineConfig;
use crate::normalizer::whole_word_positions;

pub const FUZZY_MATCH_RATIO: f64 = 0.8;

/// Shortest string allowed to satisfy a substring match.
const MIN_SUBSTRING_LEN: usize = 4;

const US_STATES: [(&str, &str); 51] = [
    ("AL", "Alabama"),
    ("AK", "Alaska"),
    ("AZ", "Arizona"),
    ("AR", "Arkansas"),
    ("CA", "California"),
    ("CO", "Colorado"),
    ("CT", "Connecticut"),
    ("DE", "Delaware"),
    ("DC", "District of Columbia"),
    ("FL", "Florida"),
    ("GA", "Georgia"),
    ("HI", "Hawaii"),
    ("ID", "Idaho"),
    ("IL", "Illinois"),
    ("IN", "Indiana"),
    ("IA", "Iowa"),
    ("KS", "Kansas"),
    ("KY", "Kentucky"),
    ("LA", "Louisiana"),
    ("ME", "Maine"),
    ("MD", "Maryland"),
    ("MA", "Massachusetts"),
    ("MI", "Michigan"),
    ("MN", "Minnesota"),
    ("MS", "Mississippi"),
    ("MO", "Missouri"),
    ("MT", "Montana"),
    ("NE", "Nebraska"),
    ("NV", "Nevada"),
    ("NH", "New Hampshire"),
    ("NJ", "New Jersey"),
    ("NM", "New Mexico"),
    ("NY", "New York"),
    ("NC", "North Carolina"),
    ("ND", "North Dakota"),
    ("OH", "Ohio"),
    ("OK", "Oklahoma"),
    ("OR", "Oregon"),
    ("PA", "Pennsylvania"),
    ("RI", "Rhode Island"),
    ("SC", "South Carolina"),
    ("SD", "South Dakota"),
    ("TN", "Tennessee"),
    ("TX", "Texas"),
    ("UT", "Utah"),
    ("VT", "Vermont"),
    ("VA", "Virginia"),
    ("WA", "Washington"),
    ("WV", "West Virginia"),
    ("WI", "Wisconsin"),
    ("WY", "Wyoming"),
];

static CITY_STATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b([A-Z][a-zA-Z]+(?:\s[A-Z][a-zA-Z]+){0,2}),\s*([A-Z]{2}|[A-Z][a-z]+(?:\s[A-Z][a-z]+)?)\b")
        .expect("static regex")
});
static CITY_OF_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[Cc]ity of ([A-Z][a-zA-Z]+(?:\s[A-Z][a-zA-Z]+){0,2})").expect("static regex")
});
static COUNTY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b([A-Z][a-zA-Z]+(?:\s[A-Z][a-zA-Z]+){0,2}) County\b").expect("static regex")
});
static ZIP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{5}(?:-\d{4})?\b").expect("static regex"));

/// Full state name for a two-letter postal code.
pub fn expand_state(code: &str) -> Option<&'static str> {
    let upper = code.trim().to_uppercase();
    US_STATES
        .iter()
        .find(|(abbrev, _)| *abbrev == upper)
        .map(|(_, name)| *name)
}

fn is_state_name(name: &str) -> bool {
    US_STATES
        .iter()
        .any(|(_, full)| full.eq_ignore_ascii_case(name.trim()))
}

/// Canonical form of a free-text location.
pub fn normalize_location(raw: &str) -> String {
    raw.split(',')
        .map(|part| ZIP_RE.replace_all(part, "").trim().to_string())
        .filter(|part| !part.is_empty())
        .map(|part| normalize_part(&part))
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

fn normalize_part(part: &str) -> String {
    if part.len() == 2 && part.chars().all(|c| c.is_ascii_alphabetic()) {
        if let Some(full) = expand_state(part) {
            return full.to_string();
        }
    }

    let mut name = part.trim();
    if name.len() > 8 && name.get(..8).is_some_and(|p| p.eq_ignore_ascii_case("city of ")) {
        name = name[8..].trim();
    }
    let cut = name.len().saturating_sub(7);
    if cut > 0 && name.get(cut..).is_some_and(|s| s.eq_ignore_ascii_case(" county")) {
        name = name[..cut].trim();
    }

    if name.split_whitespace().count() <= 4 {
        title_case(name)
    } else {
        name.to_string()
    }
}

fn title_case(name: &str) -> String {
    name.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Exact, substring or fuzzy equality between two normalized names.
pub fn fuzzy_matches(candidate: &str, entry: &str) -> bool {
    let a = candidate.trim().to_lowercase();
    let b = entry.trim().to_lowercase();
    if a.is_empty() || b.is_empty() {
        return false;
    }
    if a == b {
        return true;
    }
    if (b.len() >= MIN_SUBSTRING_LEN && a.contains(&b))
        || (a.len() >= MIN_SUBSTRING_LEN && b.contains(&a))
    {
        return true;
    }
    strsim::normalized_levenshtein(&a, &b) >= FUZZY_MATCH_RATIO
}

/// Splits a trailing state off a normalized location:
/// "Orange, California" gives `("Orange", Some("california"))`.
fn split_state(normalized: &str) -> (String, Option<String>) {
    match normalized.rsplit_once(", ") {
        Some((name, last)) if is_state_name(last) => (name.to_string(), Some(last.to_lowercase())),
        _ => (normalized.to_string(), None),
    }
}

#[derive(Debug, Clone)]
struct Entry {
    display: String,
    /// Normalized name without its state.
    key: String,
    /// Lowercased state the entry is qualified with, e.g. "Springfield, IL".
    state: Option<String>,
    /// The entry is a state itself.
    is_state: bool,
}

impl Entry {
    fn new(display: &str) -> Self {
        let (name, state) = split_state(&normalize_location(display));
        Self {
            display: display.trim().to_string(),
            is_state: state.is_none() && is_state_name(&name),
            key: name.to_lowercase(),
            state,
        }
    }
}

/// Configured target markets plus generic regional aliases.
#[derive(Debug, Clone)]
pub struct Gazetteer {
    markets: Vec<Entry>,
    aliases: Vec<Entry>,
    /// Lowercased states configured as markets or aliases.
    states: Vec<String>,
}

impl Gazetteer {
    pub fn new(target_markets: &[String], regional_aliases: &[String]) -> Self {
        let build = |items: &[String]| {
            items
                .iter()
                .filter(|s| !s.trim().is_empty())
                .map(|s| Entry::new(s))
                .collect::<Vec<_>>()
        };
        let markets = build(target_markets);
        let aliases = build(regional_aliases);
        let states = markets
            .iter()
            .chain(aliases.iter())
            .filter(|e| e.is_state)
            .map(|e| e.key.clone())
            .collect();
        Self {
            markets,
            aliases,
            states,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(&config.target_markets, &config.regional_aliases)
    }

    /// False when no markets are configured; scorers give partial credit then.
    pub fn has_targets(&self) -> bool {
        !self.markets.is_empty()
    }

    /// The market or alias a location falls into, if any.
    ///
    /// The whole normalized string is tried first, then each comma part, so
    /// "Santa Monica, California" can match either entry. A location that
    /// names a state only matches cities and counties in that state.
    pub fn match_location(&self, raw: &str) -> Option<&str> {
        let normalized = normalize_location(raw);
        if normalized.is_empty() {
            return None;
        }
        let (_, location_state) = split_state(&normalized);

        let mut candidates = vec![normalized.clone()];
        candidates.extend(normalized.split(", ").map(str::to_string));

        for candidate in &candidates {
            for entry in self.markets.iter().chain(self.aliases.iter()) {
                if fuzzy_matches(candidate, &entry.key)
                    && self.state_agrees(entry, location_state.as_deref())
                {
                    return Some(entry.display.as_str());
                }
            }
        }
        None
    }

    /// An entry without its own state belongs to the configured states.
    fn state_agrees(&self, entry: &Entry, location_state: Option<&str>) -> bool {
        if entry.is_state {
            return true;
        }
        match (location_state, entry.state.as_deref()) {
            (None, _) => true,
            (Some(location), Some(own)) => location == own,
            (Some(location), None) => {
                self.states.is_empty() || self.states.iter().any(|s| s == location)
            }
        }
    }

    pub fn matches(&self, raw: &str) -> bool {
        self.match_location(raw).is_some()
    }

    /// Markets and aliases named verbatim (whole word, any case) in `text`.
    pub fn find_mentions(&self, text: &str) -> Vec<String> {
        let lowered = text.to_lowercase();
        let mut found: Vec<(usize, String)> = self
            .markets
            .iter()
            .chain(self.aliases.iter())
            .filter_map(|entry| {
                whole_word_positions(&lowered, &entry.display.to_lowercase())
                    .first()
                    .map(|pos| (*pos, entry.display.clone()))
            })
            .collect();
        found.sort();
        found.into_iter().map(|(_, display)| display).collect()
    }
}

/// Location-looking phrases in `text`, in order of appearance.
pub fn location_candidates(text: &str) -> Vec<(usize, String)> {
    let mut found = Vec::new();

    for caps in CITY_STATE_RE.captures_iter(text) {
        let (Some(whole), Some(city), Some(state)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        let state = state.as_str();
        if expand_state(state).is_some() || is_state_name(state) {
            found.push((whole.start(), format!("{}, {}", city.as_str(), state)));
        }
    }
    for caps in CITY_OF_RE.captures_iter(text) {
        if let (Some(whole), Some(city)) = (caps.get(0), caps.get(1)) {
            found.push((whole.start(), city.as_str().to_string()));
        }
    }
    for caps in COUNTY_RE.captures_iter(text) {
        if let (Some(whole), Some(county)) = (caps.get(0), caps.get(1)) {
            found.push((whole.start(), format!("{} County", county.as_str())));
        }
    }

    found.sort_by_key(|(pos, _)| *pos);
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    fn socal() -> Gazetteer {
        Gazetteer::new(
            &[
                "California".to_string(),
                "Los Angeles County".to_string(),
                "Santa Monica".to_string(),
            ],
            &["Inland Empire".to_string()],
        )
    }

    #[test]
    fn normalizes_qualifiers_and_abbreviations() {
        assert_eq!(normalize_location("City of santa monica, CA 90401"), "Santa Monica, California");
        assert_eq!(normalize_location("Los Angeles County"), "Los Angeles");
        assert_eq!(normalize_location("  "), "");
    }

    #[test]
    fn matches_exact_substring_and_fuzzy() {
        let gazetteer = socal();
        assert_eq!(gazetteer.match_location("Santa Monica"), Some("Santa Monica"));
        assert_eq!(gazetteer.match_location("Pasadena, CA"), Some("California"));
        assert_eq!(gazetteer.match_location("East Los Angeles"), Some("Los Angeles County"));
        assert_eq!(gazetteer.match_location("Santa Monika"), Some("Santa Monica"));
        assert_eq!(gazetteer.match_location("Inland Empire region"), Some("Inland Empire"));
        assert_eq!(gazetteer.match_location("Austin, TX"), None);
    }

    #[test]
    fn state_qualifier_must_agree() {
        let gazetteer = Gazetteer::new(
            &["California".to_string(), "Orange County".to_string()],
            &[],
        );
        assert_eq!(gazetteer.match_location("Orange, TX"), None);
        assert_eq!(gazetteer.match_location("Orange County, Texas"), None);
        assert!(gazetteer.matches("Orange, CA"));
        assert_eq!(gazetteer.match_location("Orange County"), Some("Orange County"));

        let qualified = Gazetteer::new(&["Springfield, IL".to_string()], &[]);
        assert_eq!(qualified.match_location("Springfield, MO"), None);
        assert_eq!(qualified.match_location("Springfield, Illinois"), Some("Springfield, IL"));
        assert_eq!(qualified.match_location("Springfield"), Some("Springfield, IL"));
    }

    #[test]
    fn finds_candidates_in_prose() {
        let text = "The City of Irvine and Orange County approved a clinic in Tustin, CA next year.";
        let candidates: Vec<String> = location_candidates(text).into_iter().map(|(_, c)| c).collect();
        assert_eq!(candidates, vec!["Irvine", "Orange County", "Tustin, CA"]);
    }

    #[test]
    fn mentions_are_whole_words() {
        let gazetteer = socal();
        let mentions = gazetteer.find_mentions("Expansion in santa monica, not Californiaville.");
        assert_eq!(mentions, vec!["Santa Monica".to_string()]);
    }
}
