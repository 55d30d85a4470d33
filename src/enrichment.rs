/// Contact hygiene and lead enrichment
///
/// This module provides the contact checks shared by validation and the
/// enrichment stage:
/// 1. Email and phone validation (phones normalized to E.164)
/// 2. Contact extraction from lead text
/// 3. Filling organization, stage and building type when still missing
use crate::extraction::{detect_building_type, EntityCategory, FieldExtractor};
use crate::models::{Contact, Lead, LeadStatus};
use crate::timeline::stage_from_keywords;
use chrono::Utc;
use once_cell::sync::Lazy;
use phonenumber::country::Id as CountryId;
use phonenumber::{Mode, PhoneNumber};
use regex::Regex;
use std::sync::Arc;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$",
    )
    .expect("static regex")
});
static EMAIL_IN_TEXT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9-]+(?:\.[A-Za-z0-9-]+)*\.[A-Za-z]{2,}").expect("static regex")
});
static PHONE_IN_TEXT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\+?1[-.\s]?)?\(?\b\d{3}\)?[-.\s]?\d{3}[-.\s]\d{4}\b").expect("static regex")
});
static CONTACT_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:[Cc]ontact|[Qq]uestions to|[Ss]ubmit to)\s*:?\s+([A-Z][a-z]+\s+[A-Z][a-z]+)")
        .expect("static regex")
});

/// Validate email address
///
/// Checks for:
/// - Basic email format (contains @ and .)
/// - Fake/placeholder patterns (repeated digits like 9999, 1111)
/// - Minimum length requirements
/// - Valid domain structure
pub fn is_valid_email(email: &str) -> bool {
    if email.len() < 5 || !email.contains('@') || !email.contains('.') {
        return false;
    }

    let fake_patterns = ["999999", "111111", "000000", "123456789"];
    for pattern in &fake_patterns {
        if email.contains(pattern) {
            tracing::warn!(
                "❌ Invalid email detected (fake pattern '{}'): {}",
                pattern,
                email
            );
            return false;
        }
    }

    if !EMAIL_RE.is_match(email) {
        tracing::warn!("❌ Invalid email format: {}", email);
        return false;
    }

    true
}

/// Validate and normalize a US phone number
///
/// Uses phonenumber library (port of Google's libphonenumber) to:
/// - Parse phone number with the US region
/// - Check it has the North American shape: country code 1, ten digits,
///   area code and exchange not starting with 0 or 1
/// - Return normalized E.164 format (+13108259111)
///
/// Unassigned area codes and 555 exchanges still pass.
///
/// Returns: (is_valid, normalized_phone_or_error_msg)
pub fn validate_us_phone(raw: &str) -> (bool, String) {
    let digits = raw.chars().filter(|c| c.is_ascii_digit()).count();
    if raw.trim().is_empty() || digits < 10 {
        return (false, "Phone too short".to_string());
    }

    match phonenumber::parse(Some(CountryId::US), raw) {
        Ok(number) => {
            if is_nanp_shaped(&number) {
                let formatted = number.format().mode(Mode::E164).to_string();
                tracing::debug!("✓ Valid phone: {} → {}", raw, formatted);
                (true, formatted)
            } else {
                tracing::warn!("❌ Invalid phone number: {}", raw);
                (false, "Invalid phone number".to_string())
            }
        }
        Err(e) => {
            tracing::warn!("❌ Failed to parse phone '{}': {:?}", raw, e);
            (false, format!("Parse error: {:?}", e))
        }
    }
}

fn is_nanp_shaped(number: &PhoneNumber) -> bool {
    let national = number.national().value();
    let exchange_lead = (national / 1_000_000) % 10;
    number.code().value() == 1
        && (2_000_000_000..=9_999_999_999).contains(&national)
        && exchange_lead >= 2
}

/// Cleans one contact: bad email/phone fields are dropped, the phone is
/// normalized, and a contact left with no name, email or phone is removed.
///
/// Returns the cleaned contact and how many fields were dropped.
pub fn sanitize_contact(contact: &Contact) -> (Option<Contact>, usize) {
    let mut dropped = 0;
    let keep = |value: &Option<String>| {
        value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    let email = match keep(&contact.email) {
        Some(email) if is_valid_email(&email) => Some(email.to_lowercase()),
        Some(_) => {
            dropped += 1;
            None
        }
        None => None,
    };
    let phone = match keep(&contact.phone) {
        Some(phone) => match validate_us_phone(&phone) {
            (true, normalized) => Some(normalized),
            (false, _) => {
                dropped += 1;
                None
            }
        },
        None => None,
    };

    let cleaned = Contact {
        name: keep(&contact.name),
        title: keep(&contact.title),
        email,
        phone,
    };
    if cleaned.name.is_none() && cleaned.email.is_none() && cleaned.phone.is_none() {
        return (None, dropped);
    }
    (Some(cleaned), dropped)
}

/// Emails, phones and a named contact person mentioned in free text.
pub fn extract_contacts(text: &str) -> Vec<Contact> {
    let emails: Vec<String> = EMAIL_IN_TEXT_RE
        .find_iter(text)
        .map(|m| m.as_str().trim_end_matches('.').to_lowercase())
        .filter(|e| is_valid_email(e))
        .collect();
    let phones: Vec<String> = PHONE_IN_TEXT_RE
        .find_iter(text)
        .filter_map(|m| match validate_us_phone(m.as_str()) {
            (true, normalized) => Some(normalized),
            (false, _) => None,
        })
        .collect();
    let name = CONTACT_NAME_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string());

    let count = emails.len().max(phones.len()).max(usize::from(name.is_some()));
    let mut contacts: Vec<Contact> = (0..count)
        .map(|i| Contact {
            name: None,
            title: None,
            email: emails.get(i).cloned(),
            phone: phones.get(i).cloned(),
        })
        .collect();
    if let (Some(first), Some(name)) = (contacts.first_mut(), name) {
        first.name = Some(name);
    }
    contacts
}

/// What the enrichment stage changed on one lead.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrichmentResult {
    pub contacts_added: usize,
    pub organization_filled: bool,
    pub stage_inferred: bool,
}

impl EnrichmentResult {
    pub fn changed_anything(&self) -> bool {
        self.contacts_added > 0 || self.organization_filled || self.stage_inferred
    }
}

/// Fills gaps left by record building, using only the lead's own text.
#[derive(Clone)]
pub struct LeadEnricher {
    extractor: Arc<dyn FieldExtractor>,
}

impl LeadEnricher {
    pub fn new(extractor: Arc<dyn FieldExtractor>) -> Self {
        Self { extractor }
    }

    /// Enriches in place and marks the lead `Enriched`.
    pub fn enrich(&self, lead: &mut Lead) -> EnrichmentResult {
        let mut result = EnrichmentResult::default();
        let text = format!("{}. {}", lead.title, lead.description);

        if lead.contacts.is_empty() {
            let found = extract_contacts(&lead.description);
            result.contacts_added = found.len();
            lead.contacts = found;
        }

        if lead.organization.is_none() {
            lead.organization = self
                .extractor
                .extract_entities(&text)
                .remove(&EntityCategory::Organizations)
                .and_then(|orgs| orgs.into_iter().next());
            result.organization_filled = lead.organization.is_some();
        }

        if lead.project_stage.is_none() {
            lead.project_stage = self
                .extractor
                .extract_dates(&text)
                .project_phase
                .or_else(|| stage_from_keywords(&text));
            result.stage_inferred = lead.project_stage.is_some();
        }

        if !lead.metadata.contains_key("building_type") {
            if let Some(building) = detect_building_type(&text) {
                lead.set_metadata("building_type", building);
            }
        }

        lead.status = LeadStatus::Enriched;
        lead.set_metadata("enriched_at", Utc::now().to_rfc3339());

        tracing::debug!(
            lead_id = %lead.id(),
            contacts_added = result.contacts_added,
            organization_filled = result.organization_filled,
            stage_inferred = result.stage_inferred,
            "Enriched lead"
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::extraction::RuleBasedExtractor;
    use crate::models::ProjectStage;

    #[test]
    fn sanitize_drops_bad_fields_and_empty_contacts() {
        let contact = Contact {
            name: Some("  Dana Reyes ".into()),
            title: None,
            email: Some("not-an-email".into()),
            phone: Some("310-825-9111".into()),
        };
        let (cleaned, dropped) = sanitize_contact(&contact);
        let cleaned = cleaned.unwrap();
        assert_eq!(dropped, 1);
        assert_eq!(cleaned.name.as_deref(), Some("Dana Reyes"));
        assert_eq!(cleaned.email, None);
        assert_eq!(cleaned.phone.as_deref(), Some("+13108259111"));

        let hollow = Contact {
            name: None,
            title: Some("PM".into()),
            email: Some("bad".into()),
            phone: None,
        };
        assert_eq!(sanitize_contact(&hollow), (None, 1));
    }

    #[test]
    fn pulls_contacts_out_of_text() {
        let contacts = extract_contacts(
            "Questions to Dana Reyes at dreyes@smmc.org or (310) 825-9111.",
        );
        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0].name.as_deref(), Some("Dana Reyes"));
        assert_eq!(contacts[0].email.as_deref(), Some("dreyes@smmc.org"));
        assert_eq!(contacts[0].phone.as_deref(), Some("+13108259111"));
        assert!(extract_contacts("no contact details").is_empty());
    }

    #[test]
    fn enrich_fills_gaps_and_sets_status() {
        let enricher = LeadEnricher::new(Arc::new(RuleBasedExtractor::from_config(
            &PipelineConfig::default(),
        )));
        let mut lead = Lead::new(
            "Clinic addition",
            "Westside Health issued a request for proposal for a clinic addition. Contact: Dana Reyes, dreyes@westside.org.",
            "test",
            "https://example.com",
        );

        let result = enricher.enrich(&mut lead);
        assert!(result.changed_anything());
        assert_eq!(lead.status, LeadStatus::Enriched);
        assert_eq!(lead.organization.as_deref(), Some("Westside Health"));
        assert_eq!(lead.project_stage, Some(ProjectStage::Bidding));
        assert_eq!(lead.contacts.len(), 1);
        assert!(lead.metadata.contains_key("enriched_at"));
    }
}
