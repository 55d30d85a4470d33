use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;

use crate::errors::AppError;
use crate::models::{RawRecord, SourceDescriptor, SourceType};

/// Keys [`RawRecord`] understands; anything else in an API item is kept in
/// `extra`.
const KNOWN_RECORD_KEYS: &[&str] = &[
    "title",
    "description",
    "content",
    "url",
    "link",
    "published_date",
    "organization",
    "location",
    "market_sector",
    "estimated_value",
    "start_date",
    "end_date",
    "contacts",
    "extra",
];

/// Array keys searched, in order, when an API answers with an object.
const API_LIST_KEYS: &[&str] = &["items", "results", "data", "leads"];

const USER_AGENT: &str = "rust-lead-pipeline/0.1";

/// One upstream producing raw records.
///
/// An upstream with nothing new returns empty records; `Err` is reserved
/// for fetch failures and bodies that cannot be parsed at all.
#[async_trait]
pub trait LeadSource: Send + Sync {
    fn descriptor(&self) -> &SourceDescriptor;

    async fn fetch(&self) -> Result<FetchedRecords, AppError>;
}

/// Records from one fetch, plus the items that were in the response but
/// could not be read as records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchedRecords {
    pub records: Vec<RawRecord>,
    /// One reason per unreadable item.
    pub rejected: Vec<String>,
}

impl FetchedRecords {
    pub fn new(records: Vec<RawRecord>) -> Self {
        Self {
            records,
            rejected: Vec::new(),
        }
    }
}

/// Records handed over by the caller.
pub struct StaticSource {
    descriptor: SourceDescriptor,
    records: Vec<RawRecord>,
}

impl StaticSource {
    pub fn new(descriptor: SourceDescriptor, records: Vec<RawRecord>) -> Self {
        Self { descriptor, records }
    }
}

#[async_trait]
impl LeadSource for StaticSource {
    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    async fn fetch(&self) -> Result<FetchedRecords, AppError> {
        Ok(FetchedRecords::new(self.records.clone()))
    }
}

async fn get_bytes(client: &Client, url: &str, source: &str) -> Result<Vec<u8>, AppError> {
    let response = client
        .get(url)
        .header("User-Agent", USER_AGENT)
        .send()
        .await
        .map_err(|e| AppError::ExternalApiError(format!("{source}: request failed: {e}")))?;

    if !response.status().is_success() {
        let status = response.status();
        tracing::error!("Source {} returned status {}", source, status);
        return Err(AppError::ExternalApiError(format!(
            "{source}: upstream returned status {status}"
        )));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| AppError::ExternalApiError(format!("{source}: failed to read body: {e}")))?;
    Ok(bytes.to_vec())
}

/// RSS or Atom feed over HTTP.
pub struct FeedSource {
    descriptor: SourceDescriptor,
    client: Client,
    url: String,
}

impl FeedSource {
    pub fn new(descriptor: SourceDescriptor, client: Client, url: impl Into<String>) -> Self {
        Self {
            descriptor,
            client,
            url: url.into(),
        }
    }
}

/// Maps parsed feed entries onto raw records.
pub fn parse_feed(bytes: &[u8]) -> Result<Vec<RawRecord>, AppError> {
    let feed = feed_rs::parser::parse(bytes)
        .map_err(|e| AppError::MalformedResponse(format!("Failed to parse RSS/Atom feed: {e}")))?;

    let records = feed
        .entries
        .into_iter()
        .map(|entry| {
            let mut record = RawRecord {
                title: entry.title.map(|t| t.content),
                description: entry.summary.map(|s| s.content),
                content: entry.content.and_then(|c| c.body),
                url: entry
                    .links
                    .first()
                    .map(|l| l.href.clone())
                    .or_else(|| entry.id.starts_with("http").then(|| entry.id.clone())),
                published_date: entry
                    .published
                    .or(entry.updated)
                    .map(|dt| dt.with_timezone(&chrono::Utc)),
                ..Default::default()
            };
            let categories: Vec<Value> = entry
                .categories
                .into_iter()
                .map(|c| Value::String(c.term))
                .collect();
            if !categories.is_empty() {
                record.extra.insert("categories".to_string(), Value::Array(categories));
            }
            record
        })
        .collect();
    Ok(records)
}

#[async_trait]
impl LeadSource for FeedSource {
    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    async fn fetch(&self) -> Result<FetchedRecords, AppError> {
        let bytes = get_bytes(&self.client, &self.url, &self.descriptor.name).await?;
        let records = parse_feed(&bytes)?;
        tracing::info!(
            source = %self.descriptor.name,
            items = records.len(),
            "feed: parsed successfully"
        );
        Ok(FetchedRecords::new(records))
    }
}

/// JSON API answering with an array of records, or an object wrapping one.
pub struct ApiSource {
    descriptor: SourceDescriptor,
    client: Client,
    url: String,
}

impl ApiSource {
    pub fn new(descriptor: SourceDescriptor, client: Client, url: impl Into<String>) -> Self {
        Self {
            descriptor,
            client,
            url: url.into(),
        }
    }
}

/// Items of an API payload as raw records. Items that are not objects, or
/// do not fit the record shape, are returned as rejections.
pub fn parse_api_payload(payload: Value, source: &str) -> Result<FetchedRecords, AppError> {
    let items = match payload {
        Value::Array(items) => items,
        Value::Object(mut map) => API_LIST_KEYS
            .iter()
            .find_map(|key| match map.remove(*key) {
                Some(Value::Array(items)) => Some(items),
                _ => None,
            })
            .ok_or_else(|| {
                AppError::MalformedResponse(format!(
                    "{source}: response object has no {} array",
                    API_LIST_KEYS.join("/")
                ))
            })?,
        Value::Null => Vec::new(),
        other => {
            return Err(AppError::MalformedResponse(format!(
                "{source}: unexpected response type: {}",
                json_type(&other)
            )))
        }
    };

    let mut fetched = FetchedRecords {
        records: Vec::with_capacity(items.len()),
        rejected: Vec::new(),
    };
    for (position, item) in items.into_iter().enumerate() {
        let fields = match item {
            Value::Object(fields) => fields,
            other => {
                tracing::warn!(source, position, "Skipping non-object API item");
                fetched
                    .rejected
                    .push(format!("item {position}: expected an object, got {}", json_type(&other)));
                continue;
            }
        };
        let unknown: Vec<(String, Value)> = fields
            .iter()
            .filter(|(key, _)| !KNOWN_RECORD_KEYS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        match serde_json::from_value::<RawRecord>(Value::Object(fields)) {
            Ok(mut record) => {
                record.extra.extend(unknown);
                fetched.records.push(record);
            }
            Err(e) => {
                tracing::warn!(source, position, "Skipping malformed API item: {}", e);
                fetched.rejected.push(format!("item {position}: {e}"));
            }
        }
    }
    Ok(fetched)
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[async_trait]
impl LeadSource for ApiSource {
    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    async fn fetch(&self) -> Result<FetchedRecords, AppError> {
        let bytes = get_bytes(&self.client, &self.url, &self.descriptor.name).await?;
        let payload: Value = serde_json::from_slice(&bytes).map_err(|e| {
            AppError::MalformedResponse(format!(
                "{}: failed to parse API response: {}",
                self.descriptor.name, e
            ))
        })?;
        let fetched = parse_api_payload(payload, &self.descriptor.name)?;
        tracing::info!(
            source = %self.descriptor.name,
            items = fetched.records.len(),
            rejected = fetched.rejected.len(),
            "api: parsed successfully"
        );
        Ok(fetched)
    }
}

/// Adapter for a descriptor. Inline `records` always make a static source.
pub fn build_source(
    descriptor: SourceDescriptor,
    client: &Client,
    records: Option<Vec<RawRecord>>,
) -> Result<Arc<dyn LeadSource>, AppError> {
    if let Some(records) = records {
        return Ok(Arc::new(StaticSource::new(descriptor, records)));
    }

    let url = || {
        descriptor
            .url
            .clone()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| {
                AppError::Configuration(format!("source '{}' has no URL", descriptor.name))
            })
    };

    match descriptor.source_type {
        SourceType::Manual => Ok(Arc::new(StaticSource::new(descriptor, Vec::new()))),
        SourceType::Rss => {
            let url = url()?;
            Ok(Arc::new(FeedSource::new(descriptor, client.clone(), url)))
        }
        SourceType::Api => {
            let url = url()?;
            Ok(Arc::new(ApiSource::new(descriptor, client.clone(), url)))
        }
        SourceType::Website | SourceType::LegalDocument => Err(AppError::UnsupportedSource(
            format!(
                "no adapter for {} source '{}'",
                descriptor.source_type.as_str(),
                descriptor.name
            ),
        )),
    }
}

/// Stand-in for a descriptor no adapter could be built for. Every fetch
/// fails with the original error, so the run reports the source as failed.
pub struct UnavailableSource {
    descriptor: SourceDescriptor,
    error: AppError,
}

impl UnavailableSource {
    pub fn new(descriptor: SourceDescriptor, error: AppError) -> Self {
        Self { descriptor, error }
    }
}

#[async_trait]
impl LeadSource for UnavailableSource {
    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    async fn fetch(&self) -> Result<FetchedRecords, AppError> {
        Err(self.error.clone())
    }
}

/// Like [`build_source`], but a descriptor that cannot be served becomes an
/// [`UnavailableSource`] instead of an error.
pub fn build_source_or_unavailable(
    descriptor: SourceDescriptor,
    client: &Client,
    records: Option<Vec<RawRecord>>,
) -> Arc<dyn LeadSource> {
    match build_source(descriptor.clone(), client, records) {
        Ok(source) => source,
        Err(e) => {
            tracing::warn!(source = %descriptor.name, "Source unavailable: {}", e);
            Arc::new(UnavailableSource::new(descriptor, e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>Build News</title>
<item>
  <title>Clinic addition approved</title>
  <link>https://news.example.com/clinic</link>
  <description>The board approved a $12 million clinic addition.</description>
  <category>healthcare</category>
  <pubDate>Mon, 06 Jan 2025 10:00:00 GMT</pubDate>
</item>
</channel></rss>"#;

    #[test]
    fn parses_rss_items() {
        let records = parse_feed(RSS.as_bytes()).unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.title.as_deref(), Some("Clinic addition approved"));
        assert_eq!(record.url.as_deref(), Some("https://news.example.com/clinic"));
        assert!(record.published_date.is_some());
        assert_eq!(record.extra["categories"], json!(["healthcare"]));
    }

    #[test]
    fn garbage_feed_is_not_retried() {
        let err = parse_feed(b"not a feed").unwrap_err();
        assert_eq!(err.kind(), "malformed_response");
        assert!(!err.is_retryable());
    }

    #[test]
    fn api_payload_shapes() {
        let wrapped = json!({"results": [{"title": "Gym", "link": "https://x.test/1", "permit": "BP-1"}]});
        let fetched = parse_api_payload(wrapped, "api").unwrap();
        assert_eq!(fetched.records.len(), 1);
        assert!(fetched.rejected.is_empty());
        assert_eq!(fetched.records[0].url.as_deref(), Some("https://x.test/1"));
        assert_eq!(fetched.records[0].extra["permit"], json!("BP-1"));

        assert!(parse_api_payload(json!([]), "api").unwrap().records.is_empty());
        assert_eq!(
            parse_api_payload(json!({"other": 1}), "api").unwrap_err().kind(),
            "malformed_response"
        );
        assert!(parse_api_payload(json!("text"), "api").is_err());
    }

    #[test]
    fn unreadable_api_items_are_rejected_not_lost() {
        let payload = json!([
            {"title": "Gym", "link": "https://x.test/1"},
            5,
            {"title": "Pool", "estimated_value": "a lot"},
        ]);
        let fetched = parse_api_payload(payload, "api").unwrap();

        assert_eq!(fetched.records.len(), 1);
        assert_eq!(fetched.rejected.len(), 2);
        assert!(fetched.rejected[0].starts_with("item 1: expected an object, got number"));
        assert!(fetched.rejected[1].starts_with("item 2: "));
    }

    #[test]
    fn unsupported_and_misconfigured_sources() {
        let client = Client::new();
        let website = SourceDescriptor::new("site", SourceType::Website).with_url("https://x.test");
        let err = build_source(website, &client, None).err().unwrap();
        assert_eq!(err.kind(), "unsupported_source");

        let no_url = SourceDescriptor::new("feed", SourceType::Rss);
        let err = build_source(no_url, &client, None).err().unwrap();
        assert_eq!(err.kind(), "configuration");

        let inline = SourceDescriptor::new("site", SourceType::Website);
        assert!(build_source(inline, &client, Some(vec![RawRecord::default()])).is_ok());
    }

    #[tokio::test]
    async fn unavailable_source_replays_its_error() {
        let legal = SourceDescriptor::new("court", SourceType::LegalDocument);
        let source = build_source_or_unavailable(legal, &Client::new(), None);
        let err = source.fetch().await.unwrap_err();
        assert_eq!(err.kind(), "unsupported_source");
        assert!(!err.is_retryable());
    }
}
