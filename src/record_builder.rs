//! Raw source record → [`Lead`].
//!
//! Explicit fields on the record always win; extraction only fills what is
//! missing. The only hard failure is a record with no usable title.

use std::sync::Arc;

use chrono::{DateTime, NaiveTime, Utc};

use crate::errors::AppError;
use crate::extraction::{detect_building_type, detect_project_type, FieldExtractor, EntityCategory};
use crate::models::{Lead, Location, MarketSector, MetadataValue, RawRecord, SourceDescriptor};
use crate::normalizer::normalize_optional;
use crate::timeline::stage_from_keywords;

/// Longest title derived from a body's first sentence.
const MAX_DERIVED_TITLE_CHARS: usize = 120;

#[derive(Clone)]
pub struct RecordBuilder {
    extractor: Arc<dyn FieldExtractor>,
}

impl RecordBuilder {
    pub fn new(extractor: Arc<dyn FieldExtractor>) -> Self {
        Self { extractor }
    }

    pub fn extractor(&self) -> &dyn FieldExtractor {
        self.extractor.as_ref()
    }

    /// Builds one lead. Fails only when no title can be found.
    pub fn build(&self, raw: &RawRecord, descriptor: &SourceDescriptor) -> Result<Lead, AppError> {
        let description = normalize_optional(raw.description.as_deref());
        let content = normalize_optional(raw.content.as_deref());
        let body = if description.is_empty() { content } else { description };

        let title = match normalize_optional(raw.title.as_deref()) {
            t if !t.is_empty() => t,
            _ => first_sentence(&body).ok_or_else(|| {
                AppError::MissingRequiredField(format!(
                    "title (record from source '{}')",
                    descriptor.name
                ))
            })?,
        };

        let source_url = raw
            .url
            .as_deref()
            .or(descriptor.url.as_deref())
            .unwrap_or_default()
            .trim()
            .to_string();

        let text = if body.is_empty() { title.clone() } else { body.clone() };
        let headline_and_body = if body.is_empty() {
            title.clone()
        } else {
            format!("{title}. {body}")
        };
        let mut lead = Lead::new(title, body, descriptor.name.clone(), source_url);
        lead.contacts = raw.contacts.clone();
        lead.set_metadata("source_type", descriptor.source_type.as_str());

        // Sector: explicit value counts as fully confident.
        let explicit_sector = raw.market_sector.as_deref().and_then(MarketSector::parse);
        let sector_confidence = match explicit_sector {
            Some(sector) => {
                lead.market_sector = Some(sector);
                1.0
            }
            None => {
                let (sector, confidence) = self.extractor.classify_market_sector(&headline_and_body);
                lead.market_sector = Some(sector);
                confidence
            }
        };
        lead.set_metadata("sector_confidence", sector_confidence);

        lead.location = raw
            .location
            .clone()
            .filter(|location| !location.is_empty())
            .or_else(|| {
                self.extractor
                    .extract_locations(&text)
                    .first()
                    .map(|label| Location::from_label(label))
            });

        lead.organization = raw
            .organization
            .as_deref()
            .map(str::trim)
            .filter(|org| !org.is_empty())
            .map(str::to_string)
            .or_else(|| {
                self.extractor
                    .extract_entities(&text)
                    .remove(&EntityCategory::Organizations)
                    .and_then(|orgs| orgs.into_iter().next())
            });

        let values = self.extractor.extract_project_values(&text);
        lead.estimated_value = raw
            .estimated_value
            .filter(|v| v.is_finite() && *v > 0.0)
            .or(values.estimated_value);
        lead.square_footage = values.square_footage;
        if let Some(units) = values.units {
            lead.set_metadata("units", f64::from(units));
        }
        if let Some(stories) = values.stories {
            lead.set_metadata("stories", f64::from(stories));
        }
        if let Some(acres) = values.acres {
            lead.set_metadata("acres", acres);
        }

        lead.project_type = detect_project_type(&text).map(str::to_string);
        if let Some(building) = detect_building_type(&text) {
            lead.set_metadata("building_type", building);
        }

        let dates = self.extractor.extract_dates(&text);
        lead.start_date = raw.start_date.or(dates.start_date);
        lead.end_date = raw.end_date.or(dates.completion_date);
        lead.published_date = raw.published_date.or_else(|| {
            dates
                .publication_date
                .map(|day| DateTime::from_naive_utc_and_offset(day.and_time(NaiveTime::MIN), Utc))
        });
        if let Some(bid) = dates.bid_date {
            lead.set_metadata("bid_date", bid.to_string());
        }
        lead.project_stage = dates.project_phase.or_else(|| stage_from_keywords(&text));

        for (key, value) in &raw.extra {
            if let Some(value) = scalar_metadata(value) {
                lead.set_metadata(format!("extra.{key}"), value);
            }
        }

        let populated = [
            lead.location.is_some(),
            lead.organization.is_some(),
            lead.estimated_value.is_some(),
        ]
        .iter()
        .filter(|present| **present)
        .count() as f64;
        lead.set_confidence(0.4 + 0.1 * populated + 0.2 * sector_confidence);

        tracing::debug!(
            lead_id = %lead.id(),
            source = %descriptor.name,
            sector = ?lead.market_sector,
            confidence = lead.confidence_score(),
            "Built lead from raw record"
        );
        Ok(lead)
    }

    /// Builds every record, keeping per-record failures alongside successes.
    pub fn build_batch(
        &self,
        records: &[RawRecord],
        descriptor: &SourceDescriptor,
    ) -> Vec<Result<Lead, AppError>> {
        records.iter().map(|raw| self.build(raw, descriptor)).collect()
    }
}

fn scalar_metadata(value: &serde_json::Value) -> Option<MetadataValue> {
    match value {
        serde_json::Value::String(s) => Some(MetadataValue::Text(s.clone())),
        serde_json::Value::Number(n) => n.as_f64().map(MetadataValue::Number),
        serde_json::Value::Bool(b) => Some(MetadataValue::Bool(*b)),
        _ => None,
    }
}

/// First sentence of `body`, cut to a title-sized length.
fn first_sentence(body: &str) -> Option<String> {
    let end = body
        .char_indices()
        .find(|(i, c)| {
            matches!(c, '.' | '!' | '?')
                && body[*i + c.len_utf8()..]
                    .chars()
                    .next()
                    .map_or(true, char::is_whitespace)
        })
        .map_or(body.len(), |(i, _)| i);

    let sentence: String = body[..end].chars().take(MAX_DERIVED_TITLE_CHARS).collect();
    let sentence = sentence.trim();
    (!sentence.is_empty()).then(|| sentence.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::extraction::RuleBasedExtractor;
    use crate::models::SourceType;

    fn builder() -> RecordBuilder {
        RecordBuilder::new(Arc::new(RuleBasedExtractor::from_config(&PipelineConfig::default())))
    }

    fn feed() -> SourceDescriptor {
        SourceDescriptor::new("socal-news", SourceType::Rss).with_url("https://news.example.com/feed")
    }

    #[test]
    fn extracts_missing_fields() {
        let raw = RawRecord::new(
            "Santa Monica Medical Center Expansion",
            "<p>Providence Health plans a $45 million expansion of its hospital in Santa Monica, CA. \
             Construction will begin in July 2023.</p>",
        )
        .with_url("https://news.example.com/a");

        let lead = builder().build(&raw, &feed()).unwrap();
        assert_eq!(lead.market_sector, Some(MarketSector::Healthcare));
        assert_eq!(lead.estimated_value, Some(45_000_000.0));
        assert_eq!(lead.organization.as_deref(), Some("Providence Health"));
        assert_eq!(
            lead.location.as_ref().and_then(|l| l.city.as_deref()),
            Some("Santa Monica")
        );
        assert_eq!(lead.project_type.as_deref(), Some("expansion"));
        assert_eq!(lead.start_date.map(|d| d.to_string()).as_deref(), Some("2023-07-01"));
        assert!(!lead.description.contains('<'));
        assert!(lead.confidence_score() > 0.7);
    }

    #[test]
    fn explicit_fields_win() {
        let mut raw = RawRecord::new("School gym", "A $2 million gym for Pasadena, CA schools.");
        raw.estimated_value = Some(3_000_000.0);
        raw.organization = Some("Pasadena Unified".to_string());
        raw.market_sector = Some("commercial".to_string());

        let lead = builder().build(&raw, &feed()).unwrap();
        assert_eq!(lead.estimated_value, Some(3_000_000.0));
        assert_eq!(lead.organization.as_deref(), Some("Pasadena Unified"));
        assert_eq!(lead.market_sector, Some(MarketSector::Commercial));
        assert_eq!(lead.source_url, "https://news.example.com/feed");
    }

    #[test]
    fn title_falls_back_to_first_sentence() {
        let mut raw = RawRecord::default();
        raw.content = Some("New library planned. It opens in 2027.".to_string());
        let lead = builder().build(&raw, &feed()).unwrap();
        assert_eq!(lead.title, "New library planned");
    }

    #[test]
    fn record_without_any_text_is_rejected() {
        let err = builder().build(&RawRecord::default(), &feed()).unwrap_err();
        assert_eq!(err.kind(), "missing_required_field");
    }

    #[test]
    fn extra_scalars_become_metadata() {
        let mut raw = RawRecord::new("Clinic", "A clinic.");
        raw.extra.insert("permit_no".into(), serde_json::json!("BP-101"));
        raw.extra.insert("nested".into(), serde_json::json!({"a": 1}));
        let lead = builder().build(&raw, &feed()).unwrap();
        assert_eq!(
            lead.metadata.get("extra.permit_no"),
            Some(&MetadataValue::Text("BP-101".into()))
        );
        assert!(!lead.metadata.contains_key("extra.nested"));
    }
}
