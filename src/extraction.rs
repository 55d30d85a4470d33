//! Rule-based field extraction over normalized text.
//!
//! Everything here is deterministic: regexes, fixed vocabularies and the
//! target-market [`Gazetteer`]. Extractors never fail; an absent field is an
//! empty list or `None`.

use std::collections::BTreeMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::config::PipelineConfig;
use crate::gazetteer::{location_candidates, normalize_location, Gazetteer};
use crate::models::MarketSector;
use crate::normalizer::whole_word_positions;
use crate::timeline::{self, ProjectDates};

/// Below this relevance a text is classified as [`MarketSector::Other`].
pub const SECTOR_MIN_CONFIDENCE: f64 = 0.3;

// ============ Value estimate tables ============

/// Construction cost per square foot by building type, in USD.
pub const COST_PER_SQUARE_FOOT: [(&str, f64); 17] = [
    ("hospital", 1_000.0),
    ("medical center", 1_000.0),
    ("medical office", 600.0),
    ("clinic", 600.0),
    ("laboratory", 800.0),
    ("data center", 1_100.0),
    ("school", 450.0),
    ("university", 550.0),
    ("library", 500.0),
    ("office", 400.0),
    ("retail", 300.0),
    ("hotel", 450.0),
    ("multifamily", 350.0),
    ("warehouse", 150.0),
    ("industrial", 200.0),
    ("parking", 120.0),
    ("stadium", 700.0),
];
pub const DEFAULT_COST_PER_SQUARE_FOOT: f64 = 350.0;
pub const COST_PER_UNIT: f64 = 300_000.0;
pub const COST_PER_FLOOR: f64 = 3_500_000.0;

/// Share of new-build cost a project type typically carries.
pub fn project_type_factor(project_type: Option<&str>) -> f64 {
    match project_type {
        Some("renovation" | "remodel" | "modernization" | "retrofit" | "seismic retrofit") => 0.7,
        Some("tenant improvement") => 0.5,
        _ => 1.0,
    }
}

pub fn cost_per_square_foot(building_type: Option<&str>) -> f64 {
    building_type
        .and_then(|kind| {
            COST_PER_SQUARE_FOOT
                .iter()
                .find(|(name, _)| *name == kind)
                .map(|(_, cost)| *cost)
        })
        .unwrap_or(DEFAULT_COST_PER_SQUARE_FOOT)
}

// ============ Vocabularies ============

const HEALTHCARE_KEYWORDS: &[&str] = &[
    "hospital",
    "medical center",
    "medical",
    "healthcare",
    "health care",
    "clinic",
    "patient",
    "surgical",
    "outpatient",
    "emergency department",
    "behavioral health",
    "nursing",
];
const EDUCATION_KEYWORDS: &[&str] = &[
    "school",
    "university",
    "college",
    "campus",
    "classroom",
    "student",
    "education",
    "academic",
    "library",
    "school district",
    "elementary",
    "dormitory",
];
const ENERGY_KEYWORDS: &[&str] = &[
    "energy",
    "utility",
    "utilities",
    "solar",
    "power plant",
    "substation",
    "transmission",
    "water treatment",
    "wastewater",
    "battery storage",
    "microgrid",
    "electrical grid",
];
const COMMERCIAL_KEYWORDS: &[&str] = &[
    "office",
    "retail",
    "commercial",
    "mixed-use",
    "shopping center",
    "hotel",
    "warehouse",
    "industrial",
    "logistics",
    "restaurant",
    "tenant",
    "headquarters",
];
const ENTERTAINMENT_KEYWORDS: &[&str] = &[
    "theater",
    "theatre",
    "stadium",
    "arena",
    "entertainment",
    "studio",
    "museum",
    "concert",
    "venue",
    "amphitheater",
    "sound stage",
    "casino",
];

pub fn sector_keywords(sector: MarketSector) -> &'static [&'static str] {
    match sector {
        MarketSector::Healthcare => HEALTHCARE_KEYWORDS,
        MarketSector::Education => EDUCATION_KEYWORDS,
        MarketSector::EnergyUtilities => ENERGY_KEYWORDS,
        MarketSector::Commercial => COMMERCIAL_KEYWORDS,
        MarketSector::Entertainment => ENTERTAINMENT_KEYWORDS,
        MarketSector::Other => &[],
    }
}

const PROJECT_TYPES: &[&str] = &[
    "new construction",
    "tenant improvement",
    "seismic retrofit",
    "renovation",
    "remodel",
    "modernization",
    "retrofit",
    "expansion",
    "addition",
    "demolition",
    "replacement",
    "conversion",
    "upgrade",
];
const BUILDING_TYPES: &[&str] = &[
    "hospital",
    "medical center",
    "medical office",
    "clinic",
    "laboratory",
    "data center",
    "school",
    "university",
    "library",
    "office",
    "retail",
    "hotel",
    "multifamily",
    "apartment",
    "warehouse",
    "industrial",
    "parking",
    "stadium",
    "arena",
    "theater",
    "museum",
    "dormitory",
    "fire station",
    "substation",
];
const MATERIALS: &[&str] = &[
    "mass timber",
    "steel",
    "concrete",
    "timber",
    "glass",
    "masonry",
    "brick",
    "wood frame",
    "precast",
    "curtain wall",
];
const CONSTRUCTION_PHASES: &[&str] = &[
    "planning",
    "design",
    "pre-construction",
    "bidding",
    "permitting",
    "entitlement",
    "groundbreaking",
    "construction",
    "completion",
    "occupancy",
];
const CONSTRUCTION_ROLES: &[&str] = &[
    "general contractor",
    "construction manager",
    "project manager",
    "subcontractor",
    "architect",
    "engineer",
    "developer",
    "design-build",
    "consultant",
    "owner",
];

const STRONG_INTENT: &[&str] = &[
    "plans to",
    "planned",
    "proposed",
    "will build",
    "will construct",
    "to be built",
    "groundbreaking",
    "break ground",
    "broke ground",
    "request for proposal",
    "request for qualifications",
    "invitation to bid",
    "bids due",
    "approved",
    "awarded",
    "new construction",
    "under construction",
    "funding",
    "budget",
];
const MODERATE_INTENT: &[&str] = &[
    "expansion",
    "renovation",
    "construction",
    "development",
    "project",
    "addition",
    "modernization",
    "facility",
    "tower",
    "phase",
    "building",
    "design",
];
const NEGATIVE_INTENT: &[&str] = &[
    "cancelled",
    "canceled",
    "postponed",
    "abandoned",
    "rejected",
    "denied",
    "withdrawn",
    "lawsuit",
    "obituary",
    "retrospective",
];

// ============ Patterns ============

static ORGANIZATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b((?:[A-Z][A-Za-z0-9&'.-]*\s+){1,5}(?:Inc|LLC|LLP|Corp|Corporation|Company|Group|Partners|Associates|Builders|Construction|Contractors|Architects|Engineering|Developers|Development|Properties|Hospital|Health|Healthcare|Medical Center|University|College|Unified School District|School District|Authority|Department|Foundation|Institute|Trust))\b",
    )
    .expect("static regex")
});
static TITLED_PERSON_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:Mr|Ms|Mrs|Dr)\.?\s+([A-Z][a-z]+(?:\s+[A-Z][a-z]+)?)").expect("static regex")
});
static PERSON_ROLE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b([A-Z][a-z]+\s+[A-Z][a-z]+),\s+(?:the\s+)?(?:[A-Z][a-z]+\s+)?(?:CEO|President|Director|Manager|Superintendent|Chief|Principal|Architect|Engineer|Officer|Chair|Administrator|Vice President)",
    )
    .expect("static regex")
});
static QUOTED_PERSON_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:said|according to)\s+([A-Z][a-z]+\s+[A-Z][a-z]+)").expect("static regex")
});
static MONEY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\$\s?(\d[\d,]*(?:\.\d+)?)(?:\s*(million|billion|thousand|mil|mm|m|b|k)\b)?")
        .expect("static regex")
});
static SQFT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d{1,3}(?:,\d{3})+|\d+(?:\.\d+)?)(?:\s*-\s*|\s+)square[- ]f(?:ee|oo)t\b")
        .expect("static regex")
});
static UNITS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(\d{1,3}(?:,\d{3})+|\d+)[\s-]+(?:(?:residential|housing|apartment|affordable|condominium|senior|dwelling)\s+)*(?:units|apartments|residences|homes)\b",
    )
    .expect("static regex")
});
static STORIES_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(\d{1,3}|one|two|three|four|five|six|seven|eight|nine|ten|eleven|twelve|fifteen|twenty)[\s-](?:story|stories|storey|floor|floors)\b",
    )
    .expect("static regex")
});
static ACRES_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d+(?:\.\d+)?|one|two|three|four|five|six|seven|eight|nine|ten|twelve|fifteen|twenty)[\s-]acres?\b")
        .expect("static regex")
});

/// Entity buckets reported by [`FieldExtractor::extract_entities`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityCategory {
    Organizations,
    People,
    Locations,
    Money,
    Dates,
    ProjectTypes,
    BuildingTypes,
    Materials,
    ConstructionPhases,
    ProjectScope,
    ConstructionRoles,
}

pub type EntityMap = BTreeMap<EntityCategory, Vec<String>>;

/// Size and money figures found in a text.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProjectValues {
    pub monetary_values: Vec<f64>,
    pub square_footage: Option<f64>,
    pub units: Option<u32>,
    pub stories: Option<u32>,
    pub acres: Option<f64>,
    pub estimated_value: Option<f64>,
}

/// Pulls structured fields out of normalized lead text.
pub trait FieldExtractor: Send + Sync {
    fn extract_entities(&self, text: &str) -> EntityMap;

    /// Normalized locations that fall inside a target market or alias.
    fn extract_locations(&self, text: &str) -> Vec<String>;

    fn extract_project_values(&self, text: &str) -> ProjectValues;

    fn extract_dates(&self, text: &str) -> ProjectDates;

    /// Best sector and its relevance score.
    fn classify_market_sector(&self, text: &str) -> (MarketSector, f64);

    /// How strongly the text reads as a real, upcoming project, in [0, 1].
    fn project_intent_score(&self, text: &str) -> f64;

    fn calculate_relevance_score(&self, text: &str, keywords: &[&str]) -> f64 {
        calculate_relevance_score(text, keywords)
    }
}

/// Keyword relevance of `text` in [0, 1].
///
/// Weighted sum of whole-word hit rate (0.6), long-keyword substring rate
/// (0.1, capped at 0.5) and an average position/length score (0.3), boosted
/// by up to 30% for keyword diversity.
pub fn calculate_relevance_score(text: &str, keywords: &[&str]) -> f64 {
    if keywords.is_empty() || text.trim().is_empty() {
        return 0.0;
    }

    let lowered = text.to_lowercase();
    let text_len = lowered.len().max(1) as f64;
    let mut exact_hits = 0usize;
    let mut distinct = 0usize;
    let mut partial = 0usize;
    let mut placement = 0.0;

    for keyword in keywords {
        let keyword = keyword.to_lowercase();
        let positions = whole_word_positions(&lowered, &keyword);
        if let Some(first) = positions.first() {
            exact_hits += positions.len();
            distinct += 1;
            let position_weight = 1.0 - *first as f64 / text_len;
            let length_weight = (keyword.len() as f64 / 12.0).min(1.0);
            placement += 0.6 * position_weight + 0.4 * length_weight;
        }
        if keyword.len() > 4 && lowered.contains(&keyword) {
            partial += 1;
        }
    }

    let n = keywords.len() as f64;
    let exact = (exact_hits as f64 / n).min(1.0);
    let substring = (partial as f64 / n).min(0.5);
    let placement = if distinct > 0 {
        placement / distinct as f64
    } else {
        0.0
    };
    let diversity = (distinct as f64 / n.min(5.0)).min(1.0);

    ((0.6 * exact + 0.1 * substring + 0.3 * placement) * (1.0 + 0.3 * diversity)).clamp(0.0, 1.0)
}

/// Parses "$45 million", "$2.5B", "$750,000" and friends into dollars.
pub fn parse_money(raw: &str) -> Option<f64> {
    let caps = MONEY_RE.captures(raw)?;
    let number: f64 = caps.get(1)?.as_str().replace(',', "").parse().ok()?;
    let multiplier = match caps.get(2).map(|m| m.as_str().to_lowercase()) {
        Some(suffix) => match suffix.as_str() {
            "million" | "mil" | "mm" | "m" => 1e6,
            "billion" | "b" => 1e9,
            "thousand" | "k" => 1e3,
            _ => 1.0,
        },
        None => 1.0,
    };
    Some(number * multiplier)
}

fn parse_count(raw: &str) -> Option<f64> {
    let word = match raw.to_lowercase().as_str() {
        "one" => 1.0,
        "two" => 2.0,
        "three" => 3.0,
        "four" => 4.0,
        "five" => 5.0,
        "six" => 6.0,
        "seven" => 7.0,
        "eight" => 8.0,
        "nine" => 9.0,
        "ten" => 10.0,
        "eleven" => 11.0,
        "twelve" => 12.0,
        "fifteen" => 15.0,
        "twenty" => 20.0,
        other => return other.replace(',', "").parse().ok(),
    };
    Some(word)
}

fn largest_capture(re: &Regex, text: &str) -> Option<f64> {
    re.captures_iter(text)
        .filter_map(|caps| caps.get(1).and_then(|m| parse_count(m.as_str())))
        .filter(|value| value.is_finite() && *value > 0.0)
        .fold(None, |best: Option<f64>, value| {
            Some(best.map_or(value, |b| b.max(value)))
        })
}

/// Vocabulary terms present in `text` as whole words, by first occurrence.
fn vocabulary_hits(lowered: &str, vocabulary: &[&'static str]) -> Vec<&'static str> {
    let mut hits: Vec<(usize, &'static str)> = vocabulary
        .iter()
        .filter_map(|term| {
            whole_word_positions(lowered, term)
                .first()
                .map(|pos| (*pos, *term))
        })
        .collect();
    hits.sort_by_key(|(pos, _)| *pos);
    hits.into_iter().map(|(_, term)| term).collect()
}

/// First building type named in `text`.
pub fn detect_building_type(text: &str) -> Option<&'static str> {
    vocabulary_hits(&text.to_lowercase(), BUILDING_TYPES)
        .into_iter()
        .next()
}

/// First project type named in `text`.
pub fn detect_project_type(text: &str) -> Option<&'static str> {
    vocabulary_hits(&text.to_lowercase(), PROJECT_TYPES)
        .into_iter()
        .next()
}

fn push_unique(list: &mut Vec<String>, item: impl Into<String>) {
    let item = item.into();
    let item = item.trim();
    if !item.is_empty() && !list.iter().any(|existing| existing == item) {
        list.push(item.to_string());
    }
}

fn captures_group(re: &Regex, text: &str, group: usize, out: &mut Vec<String>) {
    for caps in re.captures_iter(text) {
        if let Some(m) = caps.get(group) {
            push_unique(out, m.as_str());
        }
    }
}

/// Default [`FieldExtractor`]: regexes, fixed vocabularies and a gazetteer.
#[derive(Debug, Clone)]
pub struct RuleBasedExtractor {
    gazetteer: Arc<Gazetteer>,
}

impl RuleBasedExtractor {
    pub fn new(gazetteer: Arc<Gazetteer>) -> Self {
        Self { gazetteer }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(Arc::new(Gazetteer::from_config(config)))
    }

    pub fn gazetteer(&self) -> &Gazetteer {
        &self.gazetteer
    }

    fn organizations(text: &str) -> Vec<String> {
        let mut found = Vec::new();
        for caps in ORGANIZATION_RE.captures_iter(text) {
            if let Some(m) = caps.get(1) {
                let name = m.as_str().trim();
                let name = name.strip_prefix("The ").unwrap_or(name);
                push_unique(&mut found, name);
            }
        }
        found
    }

    fn people(text: &str) -> Vec<String> {
        let mut found = Vec::new();
        captures_group(&TITLED_PERSON_RE, text, 1, &mut found);
        captures_group(&PERSON_ROLE_RE, text, 1, &mut found);
        captures_group(&QUOTED_PERSON_RE, text, 1, &mut found);
        found
    }

    fn project_scope(text: &str) -> Vec<String> {
        let mut found = Vec::new();
        for re in [&*SQFT_RE, &*UNITS_RE, &*STORIES_RE, &*ACRES_RE] {
            for m in re.find_iter(text) {
                push_unique(&mut found, m.as_str());
            }
        }
        found
    }
}

impl FieldExtractor for RuleBasedExtractor {
    fn extract_entities(&self, text: &str) -> EntityMap {
        let lowered = text.to_lowercase();
        let vocabulary = |terms: &[&'static str]| {
            vocabulary_hits(&lowered, terms)
                .into_iter()
                .map(str::to_string)
                .collect::<Vec<_>>()
        };

        let mut locations = Vec::new();
        for (_, candidate) in location_candidates(text) {
            push_unique(&mut locations, normalize_location(&candidate));
        }
        for mention in self.gazetteer.find_mentions(text) {
            push_unique(&mut locations, mention);
        }

        let mut money = Vec::new();
        for m in MONEY_RE.find_iter(text) {
            push_unique(&mut money, m.as_str());
        }

        let mut dates = Vec::new();
        for mention in timeline::find_dates(text) {
            push_unique(&mut dates, mention.text);
        }

        let mut entities = EntityMap::new();
        let buckets = [
            (EntityCategory::Organizations, Self::organizations(text)),
            (EntityCategory::People, Self::people(text)),
            (EntityCategory::Locations, locations),
            (EntityCategory::Money, money),
            (EntityCategory::Dates, dates),
            (EntityCategory::ProjectTypes, vocabulary(PROJECT_TYPES)),
            (EntityCategory::BuildingTypes, vocabulary(BUILDING_TYPES)),
            (EntityCategory::Materials, vocabulary(MATERIALS)),
            (EntityCategory::ConstructionPhases, vocabulary(CONSTRUCTION_PHASES)),
            (EntityCategory::ProjectScope, Self::project_scope(text)),
            (EntityCategory::ConstructionRoles, vocabulary(CONSTRUCTION_ROLES)),
        ];
        for (category, values) in buckets {
            if !values.is_empty() {
                entities.insert(category, values);
            }
        }
        entities
    }

    fn extract_locations(&self, text: &str) -> Vec<String> {
        let mut found = Vec::new();
        let keep_all = !self.gazetteer.has_targets();

        for (_, candidate) in location_candidates(text) {
            if keep_all || self.gazetteer.matches(&candidate) {
                push_unique(&mut found, normalize_location(&candidate));
            }
        }
        for mention in self.gazetteer.find_mentions(text) {
            push_unique(&mut found, normalize_location(&mention));
        }
        found
    }

    fn extract_project_values(&self, text: &str) -> ProjectValues {
        let monetary_values: Vec<f64> = MONEY_RE
            .find_iter(text)
            .filter_map(|m| parse_money(m.as_str()))
            .filter(|value| value.is_finite() && *value > 0.0)
            .collect();

        let square_footage = largest_capture(&SQFT_RE, text);
        let units = largest_capture(&UNITS_RE, text).map(|u| u as u32);
        let stories = largest_capture(&STORIES_RE, text).map(|s| s as u32);
        let acres = largest_capture(&ACRES_RE, text);

        let estimated_value = monetary_values
            .iter()
            .copied()
            .fold(None, |best: Option<f64>, v| Some(best.map_or(v, |b| b.max(v))))
            .or_else(|| {
                square_footage.map(|sqft| {
                    sqft * cost_per_square_foot(detect_building_type(text))
                        * project_type_factor(detect_project_type(text))
                })
            })
            .or_else(|| units.map(|u| f64::from(u) * COST_PER_UNIT))
            .or_else(|| stories.map(|s| f64::from(s) * COST_PER_FLOOR));

        ProjectValues {
            monetary_values,
            square_footage,
            units,
            stories,
            acres,
            estimated_value,
        }
    }

    fn extract_dates(&self, text: &str) -> ProjectDates {
        timeline::extract_dates(text)
    }

    fn classify_market_sector(&self, text: &str) -> (MarketSector, f64) {
        let mut best = (MarketSector::Other, 0.0);
        for sector in MarketSector::ALL {
            if sector == MarketSector::Other {
                continue;
            }
            let score = calculate_relevance_score(text, sector_keywords(sector));
            if score > best.1 {
                best = (sector, score);
            }
        }

        if best.1 < SECTOR_MIN_CONFIDENCE {
            (MarketSector::Other, best.1)
        } else {
            best
        }
    }

    fn project_intent_score(&self, text: &str) -> f64 {
        if text.trim().is_empty() {
            return 0.0;
        }
        let lowered = text.to_lowercase();
        let count = |phrases: &[&str]| {
            phrases
                .iter()
                .filter(|p| !whole_word_positions(&lowered, p).is_empty())
                .count() as f64
        };

        let strong = (count(STRONG_INTENT) * 0.2).min(0.6);
        let moderate = (count(MODERATE_INTENT) * 0.1).min(0.3);
        let negative = count(NEGATIVE_INTENT) * 0.25;
        let money = if MONEY_RE.is_match(text) { 0.1 } else { 0.0 };
        let scope = if SQFT_RE.is_match(text) { 0.05 } else { 0.0 };

        (0.2 + strong + moderate + money + scope - negative).clamp(0.0, 1.0)
    }
}
