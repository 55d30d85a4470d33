//! Date mentions and project phase.
//!
//! Each date found in the text is tagged by the nearest category keyword
//! inside a ±50 character window ("groundbreaking" → start, "occupancy" →
//! completion, "RFP" → bid, ...). The phase then falls out of comparing
//! those dates with today.

use chrono::{NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::models::ProjectStage;
use crate::normalizer::whole_word_positions;

const CONTEXT_WINDOW: usize = 50;

static MONTH_DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(Jan(?:uary)?|Feb(?:ruary)?|Mar(?:ch)?|Apr(?:il)?|May|June?|July?|Aug(?:ust)?|Sep(?:t(?:ember)?)?|Oct(?:ober)?|Nov(?:ember)?|Dec(?:ember)?)\.?\s+(?:(\d{1,2})(?:st|nd|rd|th)?,?\s+)?(\d{4})\b",
    )
    .expect("static regex")
});
static ISO_DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b").expect("static regex"));
static US_DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4})\b").expect("static regex"));
static QUARTER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[Qq]([1-4])\s+(\d{4})\b").expect("static regex"));
static SEASON_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(spring|summer|fall|autumn|winter)\s+(?:of\s+)?(\d{4})\b")
        .expect("static regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DateCategory {
    Start,
    Completion,
    Bid,
    Permit,
    Publication,
}

const CATEGORY_KEYWORDS: [(DateCategory, &[&str]); 5] = [
    (
        DateCategory::Start,
        &[
            "groundbreaking",
            "break ground",
            "breaking ground",
            "broke ground",
            "begin",
            "begins",
            "beginning",
            "start",
            "starts",
            "started",
            "commence",
            "commences",
            "commencement",
            "kick off",
        ],
    ),
    (
        DateCategory::Completion,
        &[
            "completion",
            "complete",
            "completed",
            "occupancy",
            "open",
            "opens",
            "opening",
            "finish",
            "finished",
            "substantial",
            "delivery",
            "delivered",
        ],
    ),
    (
        DateCategory::Bid,
        &[
            "bid",
            "bids",
            "bidding",
            "request for proposal",
            "request for qualifications",
            "proposal",
            "proposals",
            "due",
        ],
    ),
    (
        DateCategory::Permit,
        &["permit", "permits", "approval", "approved", "entitlement", "entitled"],
    ),
    (
        DateCategory::Publication,
        &["published", "posted", "announced", "press release"],
    ),
];

/// One date found in text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateMention {
    pub text: String,
    pub date: NaiveDate,
    pub position: usize,
}

/// Dates pulled from a text blob, by role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProjectDates {
    pub start_date: Option<NaiveDate>,
    pub completion_date: Option<NaiveDate>,
    pub bid_date: Option<NaiveDate>,
    pub permit_date: Option<NaiveDate>,
    pub publication_date: Option<NaiveDate>,
    pub all_dates: Vec<NaiveDate>,
    pub project_phase: Option<ProjectStage>,
}

fn month_number(name: &str) -> Option<u32> {
    let prefix: String = name.chars().take(3).collect::<String>().to_lowercase();
    let month = match prefix.as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

fn parse_num<T: std::str::FromStr>(caps: &regex::Captures, idx: usize) -> Option<T> {
    caps.get(idx).and_then(|m| m.as_str().parse().ok())
}

fn mention(whole: Option<regex::Match<'_>>, date: Option<NaiveDate>) -> Option<DateMention> {
    let whole = whole?;
    Some(DateMention {
        text: whole.as_str().to_string(),
        date: date?,
        position: whole.start(),
    })
}

/// Every parsable date in `text`, ordered by position.
pub fn find_dates(text: &str) -> Vec<DateMention> {
    let mut found: Vec<DateMention> = Vec::new();

    for caps in MONTH_DATE_RE.captures_iter(text) {
        let month = caps.get(1).and_then(|m| month_number(m.as_str()));
        let day = parse_num::<u32>(&caps, 2).unwrap_or(1);
        let year = parse_num::<i32>(&caps, 3);
        let date = month
            .zip(year)
            .and_then(|(m, y)| NaiveDate::from_ymd_opt(y, m, day));
        found.extend(mention(caps.get(0), date));
    }
    for caps in ISO_DATE_RE.captures_iter(text) {
        let date = match (parse_num(&caps, 1), parse_num(&caps, 2), parse_num(&caps, 3)) {
            (Some(y), Some(m), Some(d)) => NaiveDate::from_ymd_opt(y, m, d),
            _ => None,
        };
        found.extend(mention(caps.get(0), date));
    }
    for caps in US_DATE_RE.captures_iter(text) {
        let date = match (parse_num(&caps, 3), parse_num(&caps, 1), parse_num(&caps, 2)) {
            (Some(y), Some(m), Some(d)) => NaiveDate::from_ymd_opt(y, m, d),
            _ => None,
        };
        found.extend(mention(caps.get(0), date));
    }
    for caps in QUARTER_RE.captures_iter(text) {
        let date = match (parse_num::<u32>(&caps, 1), parse_num::<i32>(&caps, 2)) {
            (Some(q), Some(y)) => NaiveDate::from_ymd_opt(y, (q - 1) * 3 + 1, 1),
            _ => None,
        };
        found.extend(mention(caps.get(0), date));
    }
    for caps in SEASON_RE.captures_iter(text) {
        let month = caps.get(1).map(|m| match m.as_str().to_lowercase().as_str() {
            "spring" => 3,
            "summer" => 6,
            "fall" | "autumn" => 9,
            _ => 12,
        });
        let date = month
            .zip(parse_num::<i32>(&caps, 2))
            .and_then(|(m, y)| NaiveDate::from_ymd_opt(y, m, 1));
        found.extend(mention(caps.get(0), date));
    }

    found.sort_by_key(|mention| mention.position);
    found
}

fn floor_char_boundary(text: &str, mut idx: usize) -> usize {
    idx = idx.min(text.len());
    while !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

/// Category of the nearest keyword before the mention, falling back to the
/// nearest one after it.
fn categorize(text: &str, mention: &DateMention) -> Option<DateCategory> {
    let start = floor_char_boundary(text, mention.position.saturating_sub(CONTEXT_WINDOW));
    let end = floor_char_boundary(text, mention.position + mention.text.len() + CONTEXT_WINDOW);
    let window = text[start..end].to_lowercase();
    let anchor = mention.position - start;
    let anchor_end = anchor + mention.text.len();

    let mut before: Option<(usize, DateCategory)> = None;
    let mut after: Option<(usize, DateCategory)> = None;
    for (category, keywords) in CATEGORY_KEYWORDS.iter() {
        for keyword in keywords.iter() {
            for pos in whole_word_positions(&window, keyword) {
                let (slot, gap) = if pos + keyword.len() <= anchor {
                    (&mut before, anchor - (pos + keyword.len()))
                } else if pos >= anchor_end {
                    (&mut after, pos - anchor_end)
                } else {
                    continue;
                };
                if slot.map_or(true, |(g, _)| gap < g) {
                    *slot = Some((gap, *category));
                }
            }
        }
    }
    before.or(after).map(|(_, category)| category)
}

/// Phase implied by the dates relative to `today`.
pub fn derive_phase(dates: &ProjectDates, today: NaiveDate) -> Option<ProjectStage> {
    if let Some(end) = dates.completion_date {
        if end < today {
            return Some(ProjectStage::Completed);
        }
    }
    if let Some(start) = dates.start_date {
        return Some(if start <= today {
            ProjectStage::Construction
        } else {
            ProjectStage::PreConstruction
        });
    }
    dates.bid_date.map(|bid| {
        if bid >= today {
            ProjectStage::PreBid
        } else {
            ProjectStage::Bidding
        }
    })
}

pub fn extract_dates(text: &str) -> ProjectDates {
    extract_dates_at(text, Utc::now().date_naive())
}

/// [`extract_dates`] with an explicit "today", for deterministic callers.
pub fn extract_dates_at(text: &str, today: NaiveDate) -> ProjectDates {
    let mentions = find_dates(text);
    let mut dates = ProjectDates::default();

    for mention in &mentions {
        if !dates.all_dates.contains(&mention.date) {
            dates.all_dates.push(mention.date);
        }
        let slot = match categorize(text, mention) {
            Some(DateCategory::Start) => &mut dates.start_date,
            Some(DateCategory::Completion) => &mut dates.completion_date,
            Some(DateCategory::Bid) => &mut dates.bid_date,
            Some(DateCategory::Permit) => &mut dates.permit_date,
            Some(DateCategory::Publication) => &mut dates.publication_date,
            None => continue,
        };
        if slot.is_none() {
            *slot = Some(mention.date);
        }
    }

    dates.project_phase = derive_phase(&dates, today);
    dates
}

/// Stage guessed from wording alone, for leads without usable dates.
pub fn stage_from_keywords(text: &str) -> Option<ProjectStage> {
    let lowered = text.to_lowercase();
    let has = |phrases: &[&str]| {
        phrases
            .iter()
            .any(|p| !whole_word_positions(&lowered, p).is_empty())
    };

    if has(&["completed", "ribbon cutting", "grand opening", "now open"]) {
        Some(ProjectStage::Completed)
    } else if has(&["under construction", "construction is underway", "broke ground"]) {
        Some(ProjectStage::Construction)
    } else if has(&["request for proposal", "request for qualifications", "bids due", "invitation to bid", "bidding"]) {
        Some(ProjectStage::Bidding)
    } else if has(&["groundbreaking", "break ground", "pre-construction", "preconstruction"]) {
        Some(ProjectStage::PreConstruction)
    } else if has(&["design phase", "schematic design", "architect selected", "design development"]) {
        Some(ProjectStage::Design)
    } else if has(&["proposed", "planning", "plans to", "feasibility", "master plan"]) {
        Some(ProjectStage::Planning)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn parses_common_formats() {
        let dates: Vec<NaiveDate> = find_dates(
            "Bids on 2024-03-15, walkthrough 04/02/2024, start July 2024, open Q3 2026, review spring 2025, board Sept. 9, 2024",
        )
        .into_iter()
        .map(|m| m.date)
        .collect();

        assert_eq!(
            dates,
            vec![
                ymd(2024, 3, 15),
                ymd(2024, 4, 2),
                ymd(2024, 7, 1),
                ymd(2026, 7, 1),
                ymd(2025, 3, 1),
                ymd(2024, 9, 9),
            ]
        );
    }

    #[test]
    fn invalid_calendar_dates_are_skipped() {
        assert!(find_dates("due 2024-02-31 and 13/45/2024").is_empty());
    }

    #[test]
    fn categorizes_by_nearest_keyword() {
        let text = "Groundbreaking is set for March 2025, with completion expected in June 2027. Bids are due January 15, 2025.";
        let dates = extract_dates_at(text, ymd(2024, 10, 1));

        assert_eq!(dates.start_date, Some(ymd(2025, 3, 1)));
        assert_eq!(dates.completion_date, Some(ymd(2027, 6, 1)));
        assert_eq!(dates.bid_date, Some(ymd(2025, 1, 15)));
        assert_eq!(dates.all_dates.len(), 3);
        assert_eq!(dates.project_phase, Some(ProjectStage::PreConstruction));
    }

    #[test]
    fn phase_rules() {
        let today = ymd(2025, 1, 1);
        let mut dates = ProjectDates {
            bid_date: Some(ymd(2025, 2, 1)),
            ..Default::default()
        };
        assert_eq!(derive_phase(&dates, today), Some(ProjectStage::PreBid));

        dates.bid_date = Some(ymd(2024, 12, 1));
        assert_eq!(derive_phase(&dates, today), Some(ProjectStage::Bidding));

        dates.start_date = Some(ymd(2024, 12, 20));
        assert_eq!(derive_phase(&dates, today), Some(ProjectStage::Construction));

        dates.completion_date = Some(ymd(2024, 12, 31));
        assert_eq!(derive_phase(&dates, today), Some(ProjectStage::Completed));

        assert_eq!(derive_phase(&ProjectDates::default(), today), None);
    }

    #[test]
    fn stage_keywords() {
        assert_eq!(
            stage_from_keywords("The district issued a request for proposal for the gym."),
            Some(ProjectStage::Bidding)
        );
        assert_eq!(
            stage_from_keywords("A proposed medical office building"),
            Some(ProjectStage::Planning)
        );
        assert_eq!(stage_from_keywords("Quarterly earnings call"), None);
    }
}
