use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

// ============ Enumerations ============

/// Industry bucket a lead belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketSector {
    Healthcare,
    Education,
    EnergyUtilities,
    Commercial,
    Entertainment,
    Other,
}

impl MarketSector {
    /// Every sector a classifier may return, `Other` last.
    pub const ALL: [MarketSector; 6] = [
        MarketSector::Healthcare,
        MarketSector::Education,
        MarketSector::EnergyUtilities,
        MarketSector::Commercial,
        MarketSector::Entertainment,
        MarketSector::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MarketSector::Healthcare => "healthcare",
            MarketSector::Education => "education",
            MarketSector::EnergyUtilities => "energy_utilities",
            MarketSector::Commercial => "commercial",
            MarketSector::Entertainment => "entertainment",
            MarketSector::Other => "other",
        }
    }

    /// Lenient parse used for raw source data and configuration values.
    pub fn parse(raw: &str) -> Option<Self> {
        let lowered = raw.trim().to_lowercase();
        match lowered.as_str() {
            "healthcare" | "health care" | "health" | "medical" => Some(MarketSector::Healthcare),
            "education" | "educational" | "schools" => Some(MarketSector::Education),
            "energy" | "utilities" | "utility" | "energy_utilities" | "energy/utilities"
            | "energy & utilities" | "energy and utilities" => Some(MarketSector::EnergyUtilities),
            "commercial" | "retail" | "office" => Some(MarketSector::Commercial),
            "entertainment" | "hospitality & entertainment" => Some(MarketSector::Entertainment),
            "other" => Some(MarketSector::Other),
            _ => None,
        }
    }
}

impl fmt::Display for MarketSector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a project sits in its life. Drives the timeliness score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStage {
    Planning,
    Design,
    PreBid,
    Bidding,
    PreConstruction,
    Construction,
    PostConstruction,
    Completed,
    Unknown,
}

impl ProjectStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStage::Planning => "planning",
            ProjectStage::Design => "design",
            ProjectStage::PreBid => "pre_bid",
            ProjectStage::Bidding => "bidding",
            ProjectStage::PreConstruction => "pre_construction",
            ProjectStage::Construction => "construction",
            ProjectStage::PostConstruction => "post_construction",
            ProjectStage::Completed => "completed",
            ProjectStage::Unknown => "unknown",
        }
    }
}

/// Sales lifecycle tag. Moves forward by convention only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    #[default]
    New,
    Qualified,
    Enriched,
    Contacted,
    Negotiating,
    Won,
    Lost,
    Archived,
}

impl LeadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadStatus::New => "new",
            LeadStatus::Qualified => "qualified",
            LeadStatus::Enriched => "enriched",
            LeadStatus::Contacted => "contacted",
            LeadStatus::Negotiating => "negotiating",
            LeadStatus::Won => "won",
            LeadStatus::Lost => "lost",
            LeadStatus::Archived => "archived",
        }
    }
}

/// Kind of upstream a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Rss,
    Website,
    Api,
    LegalDocument,
    /// Records supplied inline by the caller.
    Manual,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Rss => "rss",
            SourceType::Website => "website",
            SourceType::Api => "api",
            SourceType::LegalDocument => "legal_document",
            SourceType::Manual => "manual",
        }
    }
}

// ============ Lead ============

/// Provenance value stored in a lead's metadata bag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Text(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::Text(value)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        MetadataValue::Number(value)
    }
}

impl From<usize> for MetadataValue {
    fn from(value: usize) -> Self {
        MetadataValue::Number(value as f64)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Bool(value)
    }
}

/// Postal location of a project. Every part is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
}

impl Location {
    pub fn is_empty(&self) -> bool {
        self.address.is_none() && self.city.is_none() && self.state.is_none() && self.zip.is_none()
    }

    /// "city, state" style label used for matching and fingerprints.
    pub fn label(&self) -> String {
        [&self.address, &self.city, &self.state, &self.zip]
            .iter()
            .filter_map(|part| part.as_deref())
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Builds a location from a free-text "City, State" mention.
    pub fn from_label(label: &str) -> Self {
        let mut parts = label.split(',').map(str::trim).filter(|p| !p.is_empty());
        let first = parts.next().map(str::to_string);
        let second = parts.next().map(str::to_string);
        match (first, second) {
            (Some(city), Some(state)) => Location {
                city: Some(city),
                state: Some(state),
                ..Default::default()
            },
            (Some(single), None) => Location {
                city: Some(single),
                ..Default::default()
            },
            _ => Location::default(),
        }
    }
}

/// A person or desk to reach about a lead.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub name: Option<String>,
    pub title: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// One candidate sales opportunity.
///
/// `id` and `retrieved_date` are fixed by [`Lead::new`]; the three scores
/// are private so their setters can keep them inside their ranges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    id: String,
    pub title: String,
    pub description: String,
    pub source: String,
    pub source_url: String,
    pub market_sector: Option<MarketSector>,
    pub location: Option<Location>,
    pub estimated_value: Option<f64>,
    pub organization: Option<String>,
    #[serde(default)]
    pub contacts: Vec<Contact>,
    pub project_type: Option<String>,
    pub project_stage: Option<ProjectStage>,
    pub square_footage: Option<f64>,
    pub published_date: Option<DateTime<Utc>>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    retrieved_date: DateTime<Utc>,
    confidence_score: f64,
    quality_score: f64,
    priority_score: u8,
    #[serde(default)]
    pub status: LeadStatus,
    #[serde(default)]
    pub metadata: BTreeMap<String, MetadataValue>,
}

impl Lead {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        source: impl Into<String>,
        source_url: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            description: description.into(),
            source: source.into(),
            source_url: source_url.into(),
            market_sector: None,
            location: None,
            estimated_value: None,
            organization: None,
            contacts: Vec::new(),
            project_type: None,
            project_stage: None,
            square_footage: None,
            published_date: None,
            start_date: None,
            end_date: None,
            retrieved_date: Utc::now(),
            confidence_score: 0.5,
            quality_score: 0.0,
            priority_score: 0,
            status: LeadStatus::New,
            metadata: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn retrieved_date(&self) -> DateTime<Utc> {
        self.retrieved_date
    }

    pub fn confidence_score(&self) -> f64 {
        self.confidence_score
    }

    pub fn quality_score(&self) -> f64 {
        self.quality_score
    }

    pub fn priority_score(&self) -> u8 {
        self.priority_score
    }

    pub fn set_confidence(&mut self, value: f64) {
        self.confidence_score = clamp_unit(value);
    }

    pub fn adjust_confidence(&mut self, delta: f64) {
        self.set_confidence(self.confidence_score + delta);
    }

    pub fn set_quality(&mut self, value: f64) {
        self.quality_score = clamp_unit(value);
    }

    pub fn set_priority(&mut self, value: u8) {
        self.priority_score = value.min(100);
    }

    /// Builder form of [`Lead::set_confidence`].
    pub fn with_confidence(mut self, value: f64) -> Self {
        self.set_confidence(value);
        self
    }

    pub fn location_label(&self) -> Option<String> {
        self.location
            .as_ref()
            .map(Location::label)
            .filter(|label| !label.is_empty())
    }

    pub fn set_metadata(&mut self, key: impl Into<String>, value: impl Into<MetadataValue>) {
        self.metadata.insert(key.into(), value.into());
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

// ============ Source Records ============

/// Identifies one upstream feed or document set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub name: String,
    pub source_type: SourceType,
    #[serde(default)]
    pub url: Option<String>,
}

impl SourceDescriptor {
    pub fn new(name: impl Into<String>, source_type: SourceType) -> Self {
        Self {
            name: name.into(),
            source_type,
            url: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

/// A record as a source hands it over, before any extraction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawRecord {
    pub title: Option<String>,
    pub description: Option<String>,
    pub content: Option<String>,
    #[serde(alias = "link")]
    pub url: Option<String>,
    pub published_date: Option<DateTime<Utc>>,
    pub organization: Option<String>,
    pub location: Option<Location>,
    pub market_sector: Option<String>,
    pub estimated_value: Option<f64>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub contacts: Vec<Contact>,
    /// Source-specific fields kept for provenance.
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl RawRecord {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            description: Some(description.into()),
            ..Default::default()
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_published_date(mut self, at: DateTime<Utc>) -> Self {
        self.published_date = Some(at);
        self
    }
}
