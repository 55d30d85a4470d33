/// Unit tests for contact hygiene and lead enrichment
/// Tests email validation, phone normalization, contact extraction and the enricher
use rust_lead_pipeline::enrichment::{extract_contacts, is_valid_email, sanitize_contact, validate_us_phone};

#[cfg(test)]
mod email_validation_tests {
    use super::*;

    #[test]
    fn test_valid_emails() {
        assert!(is_valid_email("user@example.com"));
        assert!(is_valid_email("pm.office@builder.co"));
        assert!(is_valid_email("bids+hospital@example-gc.com"));
        assert!(is_valid_email("a@b.c"));
    }

    #[test]
    fn test_invalid_emails_basic() {
        assert!(!is_valid_email("userexample.com"));
        assert!(!is_valid_email("user@examplecom"));
        assert!(!is_valid_email("user@"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email(""));
    }

    #[test]
    fn test_invalid_emails_fake_patterns() {
        assert!(!is_valid_email("bids999999@example.com"));
        assert!(!is_valid_email("1111111111@gmail.com"));
        assert!(!is_valid_email("test123456789@example.com"));
    }

    #[test]
    fn test_invalid_emails_malformed() {
        assert!(!is_valid_email("user @example.com"));
        assert!(!is_valid_email("user@exam ple.com"));
    }
}

#[cfg(test)]
mod phone_validation_tests {
    use super::*;

    #[test]
    fn test_phone_normalization() {
        let formats = vec![
            "310-825-9111",
            "(310) 825-9111",
            "310.825.9111",
            "+1 310 825 9111",
            "13108259111",
        ];

        for format in formats {
            let (valid, normalized) = validate_us_phone(format);
            assert!(valid, "Rejected format: {}", format);
            assert_eq!(normalized, "+13108259111", "Failed for format: {}", format);
        }
    }

    #[test]
    fn test_loose_north_american_numbers() {
        let cases = [
            ("(213) 555-0142", "+12135550142"),
            ("290-555-0100", "+12905550100"),
            ("1-800-555-0199", "+18005550199"),
        ];
        for (raw, expected) in cases {
            let (valid, normalized) = validate_us_phone(raw);
            assert!(valid, "Rejected format: {}", raw);
            assert_eq!(normalized, expected);
        }
    }

    #[test]
    fn test_invalid_phones() {
        for raw in ["", "   ", "1234", "825-9111", "000-000-0000", "310-155-0100", "110-825-9111"] {
            let (valid, _) = validate_us_phone(raw);
            assert!(!valid, "Accepted: {:?}", raw);
        }
    }
}

#[cfg(test)]
mod contact_tests {
    use super::*;
    use rust_lead_pipeline::models::Contact;

    #[test]
    fn sanitize_keeps_clean_contacts() {
        let contact = Contact {
            name: Some("Dana Reyes".into()),
            title: Some("Project Manager".into()),
            email: Some("DReyes@Example.org".into()),
            phone: Some("(310) 825-9111".into()),
        };
        let (cleaned, dropped) = sanitize_contact(&contact);
        let cleaned = cleaned.expect("contact kept");
        assert_eq!(dropped, 0);
        assert_eq!(cleaned.email.as_deref(), Some("dreyes@example.org"));
        assert_eq!(cleaned.phone.as_deref(), Some("+13108259111"));
        assert_eq!(cleaned.title.as_deref(), Some("Project Manager"));
    }

    #[test]
    fn sanitize_removes_contacts_with_nothing_reachable() {
        let contact = Contact {
            name: Some("   ".into()),
            email: Some("nobody".into()),
            phone: Some("12".into()),
            ..Default::default()
        };
        assert_eq!(sanitize_contact(&contact), (None, 2));
    }

    #[test]
    fn extraction_pairs_emails_and_phones_in_order() {
        let contacts = extract_contacts(
            "Submit to Lee Park, lpark@district.org, 310-825-9111. \
             Alternate: ops@district.org.",
        );
        assert_eq!(contacts.len(), 2);
        assert_eq!(contacts[0].name.as_deref(), Some("Lee Park"));
        assert_eq!(contacts[0].phone.as_deref(), Some("+13108259111"));
        assert_eq!(contacts[1].email.as_deref(), Some("ops@district.org"));
        assert!(contacts[1].phone.is_none());
    }
}

#[cfg(test)]
mod enricher_tests {
    use rust_lead_pipeline::config::PipelineConfig;
    use rust_lead_pipeline::enrichment::LeadEnricher;
    use rust_lead_pipeline::extraction::RuleBasedExtractor;
    use rust_lead_pipeline::models::{Contact, Lead, LeadStatus};
    use std::sync::Arc;

    fn enricher() -> LeadEnricher {
        LeadEnricher::new(Arc::new(RuleBasedExtractor::from_config(&PipelineConfig::default())))
    }

    #[test]
    fn existing_fields_are_not_overwritten() {
        let mut lead = Lead::new(
            "Library renovation",
            "Pasadena Public Library plans a renovation. Contact: Sam Ortiz, sortiz@cityofpasadena.net.",
            "test",
            "https://example.com",
        );
        lead.organization = Some("City of Pasadena".into());
        lead.contacts = vec![Contact {
            name: Some("Existing Person".into()),
            ..Default::default()
        }];

        let result = enricher().enrich(&mut lead);

        assert_eq!(result.contacts_added, 0);
        assert!(!result.organization_filled);
        assert_eq!(lead.organization.as_deref(), Some("City of Pasadena"));
        assert_eq!(lead.contacts[0].name.as_deref(), Some("Existing Person"));
        assert_eq!(lead.status, LeadStatus::Enriched);
    }
}

#[cfg(test)]
mod error_handling_tests {
    use rust_lead_pipeline::errors::{AppError, ResultExt};

    #[test]
    fn test_error_kinds_and_retryability() {
        let timeout = AppError::Timeout {
            operation: "fetch from source 'socal'".to_string(),
            seconds: 30,
        };
        assert_eq!(timeout.kind(), "timeout");
        assert!(timeout.is_retryable());

        let unsupported = AppError::UnsupportedSource("website".to_string());
        assert_eq!(unsupported.kind(), "unsupported_source");
        assert!(!unsupported.is_retryable());

        let network = AppError::ExternalApiError("connection reset".to_string());
        assert_eq!(network.kind(), "network");
        assert!(network.is_retryable());
    }

    #[test]
    fn test_error_display() {
        let error = AppError::MissingRequiredField("title".to_string());
        assert_eq!(format!("{}", error), "Missing required field: title");

        let failed: Result<(), AppError> = Err(AppError::ExternalApiError("status 500".to_string()));
        let wrapped = failed.context("fetch socal feed");
        let display = format!("{}", wrapped.unwrap_err());
        assert!(display.starts_with("fetch socal feed: "));
        assert!(display.contains("status 500"));
    }
}
