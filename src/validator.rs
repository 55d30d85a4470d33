//! Lead validation.
//!
//! Seven checks run in order: required fields, location, market sector,
//! contacts, duplicates, timeline and project intent. Each yields a
//! [`ValidationResult`]; results merge left to right. Only a
//! [`Severity::Critical`] failure makes a lead invalid, and it stops the
//! remaining checks. Every other failure just costs confidence.

use std::ops::ControlFlow;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::PipelineConfig;
use crate::dedup::Deduplicator;
use crate::enrichment::sanitize_contact;
use crate::extraction::FieldExtractor;
use crate::gazetteer::{expand_state, fuzzy_matches, normalize_location, Gazetteer};
use crate::models::{Contact, Lead, Location, MarketSector};

pub const SHORT_TITLE_CHARS: usize = 10;
pub const SHORT_DESCRIPTION_CHARS: usize = 50;
pub const NO_CONTACTS_MESSAGE: &str = "No contact information provided.";

const MIN_DURATION_DAYS: i64 = 7;
const MAX_DURATION_DAYS: i64 = 1095;
const MAX_STALE_PENALTY: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Failure invalidates the lead.
    Critical,
    /// Failure lowers confidence.
    Standard,
    /// Informational; lowers confidence slightly.
    Advisory,
}

/// Canonical value a check hands back for the lead.
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedField {
    Location(Location),
    MarketSector(MarketSector),
    Contacts(Vec<Contact>),
}

/// Outcome of a single check.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub messages: Vec<String>,
    pub confidence_adjustment: f64,
    pub normalized_data: Option<NormalizedField>,
    pub severity: Severity,
}

impl ValidationResult {
    pub fn pass(severity: Severity) -> Self {
        Self {
            is_valid: true,
            messages: Vec::new(),
            confidence_adjustment: 0.0,
            normalized_data: None,
            severity,
        }
    }

    pub fn fail(severity: Severity, message: impl Into<String>, adjustment: f64) -> Self {
        Self {
            is_valid: false,
            messages: vec![message.into()],
            confidence_adjustment: adjustment,
            normalized_data: None,
            severity,
        }
    }

    /// Adds a note and its confidence cost without failing the check.
    pub fn note(mut self, message: impl Into<String>, adjustment: f64) -> Self {
        self.messages.push(message.into());
        self.confidence_adjustment += adjustment;
        self
    }

    pub fn adjust(mut self, adjustment: f64) -> Self {
        self.confidence_adjustment += adjustment;
        self
    }

    pub fn normalized(mut self, field: NormalizedField) -> Self {
        self.normalized_data = Some(field);
        self
    }

    fn is_critical_failure(&self) -> bool {
        !self.is_valid && self.severity == Severity::Critical
    }
}

/// Merged verdict for one lead.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationOutcome {
    pub is_valid: bool,
    pub messages: Vec<String>,
    /// Confidence after all adjustments, already stored on the lead.
    pub confidence: f64,
    /// First message of the Critical failure, when there was one.
    pub rejection: Option<String>,
}

struct Merge {
    original: f64,
    adjustment: f64,
    messages: Vec<String>,
    rejection: Option<String>,
}

impl Merge {
    fn new(original: f64) -> Self {
        Self {
            original,
            adjustment: 0.0,
            messages: Vec::new(),
            rejection: None,
        }
    }

    fn absorb(&mut self, result: ValidationResult) -> ControlFlow<()> {
        self.adjustment += result.confidence_adjustment;
        let critical = result.is_critical_failure();
        if critical {
            self.rejection = result.messages.first().cloned();
        }
        self.messages.extend(result.messages);
        if critical {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    }

    fn finish(self) -> ValidationOutcome {
        let confidence = self.original + self.adjustment;
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        ValidationOutcome {
            is_valid: self.rejection.is_none(),
            messages: self.messages,
            confidence,
            rejection: self.rejection,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Step {
    RequiredFields,
    Location,
    MarketSector,
    Contacts,
    Duplicate,
    Timeline,
    ProjectIntent,
}

const STEPS: [Step; 7] = [
    Step::RequiredFields,
    Step::Location,
    Step::MarketSector,
    Step::Contacts,
    Step::Duplicate,
    Step::Timeline,
    Step::ProjectIntent,
];

pub struct LeadValidator {
    gazetteer: Arc<Gazetteer>,
    extractor: Arc<dyn FieldExtractor>,
    dedup: Option<Arc<Deduplicator>>,
    target_sectors: Vec<String>,
    critical_location_sources: Vec<String>,
    intent_threshold: f64,
    max_age_days: i64,
}

impl LeadValidator {
    pub fn new(
        config: &PipelineConfig,
        gazetteer: Arc<Gazetteer>,
        extractor: Arc<dyn FieldExtractor>,
    ) -> Self {
        Self {
            gazetteer,
            extractor,
            dedup: None,
            target_sectors: config.target_sectors.clone(),
            critical_location_sources: config.critical_location_sources.clone(),
            intent_threshold: config.intent_threshold,
            max_age_days: config.max_age_days,
        }
    }

    /// Enables the duplicate check against `dedup`'s history.
    pub fn with_deduplicator(mut self, dedup: Arc<Deduplicator>) -> Self {
        self.dedup = Some(dedup);
        self
    }

    pub fn validate(&self, lead: &mut Lead) -> ValidationOutcome {
        self.validate_at(lead, Utc::now())
    }

    /// [`LeadValidator::validate`] with an explicit clock.
    pub fn validate_at(&self, lead: &mut Lead, now: DateTime<Utc>) -> ValidationOutcome {
        let mut merge = Merge::new(lead.confidence_score());

        for step in STEPS {
            let mut result = match step {
                Step::RequiredFields => self.check_required(lead),
                Step::Location => self.check_location(lead),
                Step::MarketSector => self.check_sector(lead),
                Step::Contacts => self.check_contacts(lead),
                Step::Duplicate => self.check_duplicate(lead),
                Step::Timeline => self.check_timeline(lead, now),
                Step::ProjectIntent => self.check_intent(lead),
            };
            if let Some(field) = result.normalized_data.take() {
                apply_normalized(lead, field);
            }
            if merge.absorb(result).is_break() {
                tracing::debug!(lead_id = %lead.id(), step = ?step, "Critical validation failure");
                break;
            }
        }

        let outcome = merge.finish();
        lead.set_confidence(outcome.confidence);
        outcome
    }

    fn check_required(&self, lead: &Lead) -> ValidationResult {
        let missing: Vec<&str> = [
            ("title", lead.title.trim().is_empty()),
            ("description", lead.description.trim().is_empty()),
            ("source_url", lead.source_url.trim().is_empty()),
        ]
        .iter()
        .filter(|(_, absent)| *absent)
        .map(|(name, _)| *name)
        .collect();
        if !missing.is_empty() {
            return ValidationResult::fail(
                Severity::Critical,
                format!("Missing required field(s): {}", missing.join(", ")),
                0.0,
            );
        }

        let mut result = ValidationResult::pass(Severity::Critical);
        if lead.title.trim().chars().count() < SHORT_TITLE_CHARS {
            result = result.note("Title is unusually short", -0.05);
        }
        if lead.description.trim().chars().count() < SHORT_DESCRIPTION_CHARS {
            result = result.note("Description is unusually short", -0.05);
        }
        if lead.source.trim().is_empty() {
            result = result.note("Lead has no source name", -0.05);
        }
        if url::Url::parse(lead.source_url.trim()).is_err() {
            result = result.note(format!("Source URL '{}' is not a valid URL", lead.source_url), -0.05);
        }
        result
    }

    fn check_location(&self, lead: &Lead) -> ValidationResult {
        let severity = if self
            .critical_location_sources
            .iter()
            .any(|s| s.eq_ignore_ascii_case(lead.source.trim()))
        {
            Severity::Critical
        } else {
            Severity::Standard
        };

        let (Some(location), Some(label)) = (lead.location.as_ref(), lead.location_label()) else {
            return ValidationResult::fail(severity, "No location provided", -0.1);
        };
        let normalized = NormalizedField::Location(normalize_location_parts(location));

        if !self.gazetteer.has_targets() {
            return ValidationResult::pass(severity).normalized(normalized);
        }
        match self.gazetteer.match_location(&label) {
            Some(_) => ValidationResult::pass(severity).normalized(normalized),
            None => ValidationResult::fail(
                severity,
                format!("Location '{label}' is outside the target markets"),
                -0.1,
            )
            .normalized(normalized),
        }
    }

    fn check_sector(&self, lead: &Lead) -> ValidationResult {
        if self.target_sectors.is_empty() {
            return ValidationResult::pass(Severity::Standard);
        }
        let Some(sector) = lead.market_sector else {
            return ValidationResult::fail(Severity::Standard, "No market sector identified", -0.1);
        };

        let targeted = self.target_sectors.iter().any(|target| {
            MarketSector::parse(target) == Some(sector) || fuzzy_matches(sector.as_str(), target)
        });
        if targeted {
            ValidationResult::pass(Severity::Standard).normalized(NormalizedField::MarketSector(sector))
        } else {
            ValidationResult::fail(
                Severity::Standard,
                format!("Market sector '{sector}' is not a target sector"),
                -0.1,
            )
        }
    }

    fn check_contacts(&self, lead: &Lead) -> ValidationResult {
        if lead.contacts.is_empty() {
            return ValidationResult::fail(Severity::Advisory, NO_CONTACTS_MESSAGE, -0.1)
                .normalized(NormalizedField::Contacts(Vec::new()));
        }

        let mut dropped_fields = 0;
        let cleaned: Vec<Contact> = lead
            .contacts
            .iter()
            .filter_map(|contact| {
                let (cleaned, dropped) = sanitize_contact(contact);
                dropped_fields += dropped;
                cleaned
            })
            .collect();

        let mut result = if cleaned.is_empty() {
            ValidationResult::fail(Severity::Advisory, "No valid contact information", -0.1)
        } else {
            ValidationResult::pass(Severity::Advisory)
        };
        if dropped_fields > 0 {
            result = result.note(format!("Dropped {dropped_fields} invalid contact field(s)"), 0.0);
        }
        result.normalized(NormalizedField::Contacts(cleaned))
    }

    fn check_duplicate(&self, lead: &Lead) -> ValidationResult {
        let Some(dedup) = &self.dedup else {
            return ValidationResult::pass(Severity::Critical);
        };
        match dedup.find_duplicate(lead) {
            Some(found) => ValidationResult::fail(
                Severity::Critical,
                format!(
                    "Duplicate of {} (similarity {:.2})",
                    found
                        .existing_id
                        .as_deref()
                        .map_or_else(|| "a previously seen lead".to_string(), |id| format!("lead {id}")),
                    found.similarity
                ),
                -0.5 * found.similarity,
            ),
            None => ValidationResult::pass(Severity::Critical),
        }
    }

    fn check_timeline(&self, lead: &Lead, now: DateTime<Utc>) -> ValidationResult {
        let mut result = ValidationResult::pass(Severity::Standard);

        if let Some(published) = lead.published_date {
            if published > now {
                result = ValidationResult::fail(
                    Severity::Standard,
                    "Publication date is in the future",
                    -0.2,
                );
            } else {
                let age_days = (now - published).num_days();
                if age_days > self.max_age_days {
                    let penalty = (0.05 + 0.01 * (age_days - self.max_age_days) as f64)
                        .min(MAX_STALE_PENALTY);
                    result = ValidationResult::fail(
                        Severity::Standard,
                        format!(
                            "Lead is {age_days} days old (older than {} days)",
                            self.max_age_days
                        ),
                        -penalty,
                    );
                }
            }
        }

        if let (Some(start), Some(end)) = (lead.start_date, lead.end_date) {
            if end > start {
                result = result.adjust(0.05);
            } else {
                result = result.note("End date is not after start date", -0.1);
            }
            let duration = (end - start).num_days();
            if (MIN_DURATION_DAYS..=MAX_DURATION_DAYS).contains(&duration) {
                result = result.adjust(0.05);
            } else {
                result = result.note(format!("Unusual project duration of {duration} days"), -0.05);
            }
        }
        result
    }

    fn check_intent(&self, lead: &mut Lead) -> ValidationResult {
        let text = format!("{}. {}", lead.title, lead.description);
        let score = self.extractor.project_intent_score(&text);
        lead.set_metadata("intent_score", score);

        let adjustment = 0.5 * (score - self.intent_threshold);
        if score >= self.intent_threshold {
            ValidationResult::pass(Severity::Critical).adjust(adjustment)
        } else {
            ValidationResult::fail(
                Severity::Critical,
                format!(
                    "Project intent score {score:.2} is below threshold {:.2}",
                    self.intent_threshold
                ),
                adjustment,
            )
        }
    }
}

fn normalize_location_parts(location: &Location) -> Location {
    let clean = |part: &Option<String>| {
        part.as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
    };
    Location {
        address: clean(&location.address),
        city: clean(&location.city).map(|city| normalize_location(&city)),
        state: clean(&location.state)
            .map(|state| expand_state(&state).map(str::to_string).unwrap_or(state)),
        zip: clean(&location.zip),
    }
}

fn apply_normalized(lead: &mut Lead, field: NormalizedField) {
    match field {
        NormalizedField::Location(location) => lead.location = Some(location),
        NormalizedField::MarketSector(sector) => lead.market_sector = Some(sector),
        NormalizedField::Contacts(contacts) => lead.contacts = contacts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::RuleBasedExtractor;
    use chrono::{Duration, NaiveDate};

    const DESCRIPTION: &str = "Providence Health plans to build a $45 million patient tower \
        expansion at its Santa Monica hospital campus, with construction starting next year.";

    fn validator(config: &PipelineConfig) -> LeadValidator {
        let gazetteer = Arc::new(Gazetteer::from_config(config));
        let extractor = Arc::new(RuleBasedExtractor::new(gazetteer.clone()));
        LeadValidator::new(config, gazetteer, extractor)
    }

    fn good_lead(now: DateTime<Utc>) -> Lead {
        let mut lead = Lead::new(
            "Santa Monica Hospital Tower Expansion",
            DESCRIPTION,
            "socal-news",
            "https://news.example.com/tower",
        )
        .with_confidence(0.7);
        lead.location = Some(Location {
            city: Some("santa monica".into()),
            state: Some("CA".into()),
            ..Default::default()
        });
        lead.market_sector = Some(MarketSector::Healthcare);
        lead.contacts = vec![Contact {
            name: Some("Dana Reyes".into()),
            email: Some("dreyes@example.org".into()),
            ..Default::default()
        }];
        lead.published_date = Some(now - Duration::days(2));
        lead
    }

    #[test]
    fn clean_lead_passes_and_is_normalized() {
        let now = Utc::now();
        let mut lead = good_lead(now);
        let outcome = validator(&PipelineConfig::default()).validate_at(&mut lead, now);

        assert!(outcome.is_valid, "{:?}", outcome.messages);
        assert!(outcome.rejection.is_none());
        let location = lead.location.as_ref().unwrap();
        assert_eq!(location.city.as_deref(), Some("Santa Monica"));
        assert_eq!(location.state.as_deref(), Some("California"));
        assert_eq!(lead.confidence_score(), outcome.confidence);
        assert!(outcome.confidence > 0.7);
    }

    #[test]
    fn missing_required_field_short_circuits() {
        let now = Utc::now();
        let mut lead = good_lead(now);
        lead.title = "  ".into();
        lead.contacts.clear();
        let outcome = validator(&PipelineConfig::default()).validate_at(&mut lead, now);

        assert!(!outcome.is_valid);
        assert_eq!(outcome.messages.len(), 1);
        assert!(outcome.messages[0].contains("title"));
    }

    #[test]
    fn missing_contacts_is_advisory() {
        let now = Utc::now();
        let mut lead = good_lead(now);
        lead.contacts.clear();
        let outcome = validator(&PipelineConfig::default()).validate_at(&mut lead, now);

        assert!(outcome.is_valid);
        assert!(outcome.messages.iter().any(|m| m == NO_CONTACTS_MESSAGE));
    }

    #[test]
    fn stale_lead_stays_valid_with_capped_penalty() {
        let now = Utc::now();
        let mut fresh = good_lead(now);
        let mut stale = good_lead(now);
        stale.published_date = Some(now - Duration::days(60));

        let validator = validator(&PipelineConfig::default());
        let fresh_outcome = validator.validate_at(&mut fresh, now);
        let stale_outcome = validator.validate_at(&mut stale, now);

        assert!(stale_outcome.is_valid);
        assert!(stale_outcome.messages.iter().any(|m| m.contains("older than 14 days")));
        let penalty = fresh_outcome.confidence - stale_outcome.confidence;
        assert!((penalty - MAX_STALE_PENALTY).abs() < 1e-9, "penalty {penalty}");
    }

    #[test]
    fn future_publication_and_bad_dates_cost_confidence() {
        let now = Utc::now();
        let mut lead = good_lead(now);
        lead.published_date = Some(now + Duration::days(3));
        lead.start_date = NaiveDate::from_ymd_opt(2025, 6, 1);
        lead.end_date = NaiveDate::from_ymd_opt(2025, 5, 1);
        let outcome = validator(&PipelineConfig::default()).validate_at(&mut lead, now);

        assert!(outcome.is_valid);
        assert!(outcome.messages.iter().any(|m| m.contains("future")));
        assert!(outcome.messages.iter().any(|m| m.contains("End date")));
    }

    #[test]
    fn location_is_critical_for_listed_sources() {
        let now = Utc::now();
        let mut config = PipelineConfig::default();
        config.critical_location_sources = vec!["socal-news".into()];
        let mut lead = good_lead(now);
        lead.location = Some(Location::from_label("Austin, TX"));

        let outcome = validator(&config).validate_at(&mut lead, now);
        assert!(!outcome.is_valid);
        assert!(outcome.rejection.unwrap().contains("outside the target markets"));

        let mut lead = good_lead(now);
        lead.location = Some(Location::from_label("Austin, TX"));
        let outcome = validator(&PipelineConfig::default()).validate_at(&mut lead, now);
        assert!(outcome.is_valid);
    }

    #[test]
    fn off_target_sector_lowers_confidence() {
        let now = Utc::now();
        let mut on_target = good_lead(now);
        let mut off_target = good_lead(now);
        off_target.market_sector = Some(MarketSector::Other);

        let validator = validator(&PipelineConfig::default());
        let a = validator.validate_at(&mut on_target, now);
        let b = validator.validate_at(&mut off_target, now);
        assert!(b.is_valid);
        assert!((a.confidence - b.confidence - 0.1).abs() < 1e-9);
    }

    #[test]
    fn duplicates_are_critical() {
        let now = Utc::now();
        let config = PipelineConfig::default();
        let dedup = Arc::new(Deduplicator::from_config(&config));
        let validator = validator(&config).with_deduplicator(dedup.clone());

        let seen = good_lead(now);
        dedup.remember(std::slice::from_ref(&seen));

        let mut again = seen.clone();
        let outcome = validator.validate_at(&mut again, now);
        assert!(!outcome.is_valid);
        assert!(outcome.rejection.unwrap().starts_with("Duplicate of lead"));
    }

    #[test]
    fn weak_intent_is_rejected() {
        let now = Utc::now();
        let mut lead = good_lead(now);
        lead.description =
            "A retrospective look at the hospital's history and the people who worked there over the decades."
                .into();
        let outcome = validator(&PipelineConfig::default()).validate_at(&mut lead, now);
        assert!(!outcome.is_valid);
        assert!(outcome.rejection.unwrap().contains("intent"));
    }
}
