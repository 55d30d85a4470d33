//! 0–100 lead priority.
//!
//! Six components add up to at most 100: company data (15), contact (20),
//! project detail (15), project value (15), timeliness (20) and market fit
//! (15).

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use crate::config::PipelineConfig;
use crate::gazetteer::{fuzzy_matches, Gazetteer};
use crate::models::{Lead, MarketSector, ProjectStage};

const ENTITY_SUFFIXES: &[&str] = &[
    "inc",
    "llc",
    "corp",
    "corporation",
    "company",
    "group",
    "health",
    "hospital",
    "university",
    "college",
    "district",
    "authority",
    "department",
    "city",
    "county",
    "foundation",
    "partners",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreComponent {
    CompanyData,
    Contact,
    ProjectDetail,
    ProjectValue,
    Timeliness,
    MarketFit,
}

impl ScoreComponent {
    pub fn max_points(&self) -> u8 {
        match self {
            ScoreComponent::CompanyData => 15,
            ScoreComponent::Contact => 20,
            ScoreComponent::ProjectDetail => 15,
            ScoreComponent::ProjectValue => 15,
            ScoreComponent::Timeliness => 20,
            ScoreComponent::MarketFit => 15,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityTier {
    Poor,
    Fair,
    Average,
    Good,
    Excellent,
}

impl QualityTier {
    pub fn from_total(total: u8) -> Self {
        match total {
            80.. => QualityTier::Excellent,
            60..=79 => QualityTier::Good,
            40..=59 => QualityTier::Average,
            20..=39 => QualityTier::Fair,
            _ => QualityTier::Poor,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeadScore {
    pub total: u8,
    pub quality: QualityTier,
    pub components: BTreeMap<ScoreComponent, u8>,
}

/// Points for a known project value; `None` scores nothing.
pub fn value_points(estimated_value: Option<f64>) -> u8 {
    match estimated_value {
        Some(v) if v.is_nan() => 0,
        Some(v) if v >= 10_000_000.0 => 15,
        Some(v) if v >= 5_000_000.0 => 12,
        Some(v) if v >= 1_000_000.0 => 10,
        Some(v) if v >= 500_000.0 => 8,
        Some(v) if v >= 100_000.0 => 5,
        Some(_) => 3,
        None => 0,
    }
}

/// Points for where the project sits; earlier buying windows score higher.
pub fn timeliness_points(stage: Option<ProjectStage>) -> u8 {
    match stage.unwrap_or(ProjectStage::Unknown) {
        ProjectStage::Bidding | ProjectStage::PreBid => 20,
        ProjectStage::PreConstruction => 18,
        ProjectStage::Design => 14,
        ProjectStage::Planning => 12,
        ProjectStage::Construction => 8,
        ProjectStage::Unknown | ProjectStage::PostConstruction => 4,
        ProjectStage::Completed => 2,
    }
}

pub struct Scorer {
    gazetteer: Arc<Gazetteer>,
    target_sectors: Vec<String>,
}

impl Scorer {
    pub fn new(config: &PipelineConfig, gazetteer: Arc<Gazetteer>) -> Self {
        Self {
            gazetteer,
            target_sectors: config.target_sectors.clone(),
        }
    }

    pub fn score(&self, lead: &Lead) -> LeadScore {
        let components: BTreeMap<ScoreComponent, u8> = [
            (ScoreComponent::CompanyData, company_points(lead)),
            (ScoreComponent::Contact, contact_points(lead)),
            (ScoreComponent::ProjectDetail, detail_points(lead)),
            (ScoreComponent::ProjectValue, value_points(lead.estimated_value)),
            (ScoreComponent::Timeliness, timeliness_points(lead.project_stage)),
            (ScoreComponent::MarketFit, self.market_fit_points(lead)),
        ]
        .into_iter()
        .map(|(component, points)| (component, points.min(component.max_points())))
        .collect();

        let total = components.values().map(|p| u32::from(*p)).sum::<u32>().min(100) as u8;
        LeadScore {
            total,
            quality: QualityTier::from_total(total),
            components,
        }
    }

    /// Scores and stores priority and quality on the lead.
    pub fn apply(&self, lead: &mut Lead) -> LeadScore {
        let score = self.score(lead);
        lead.set_priority(score.total);
        lead.set_quality(f64::from(score.total) / 100.0);
        score
    }

    fn market_fit_points(&self, lead: &Lead) -> u8 {
        let location = if !self.gazetteer.has_targets() {
            4
        } else if lead
            .location_label()
            .is_some_and(|label| self.gazetteer.matches(&label))
        {
            8
        } else {
            0
        };

        let sector = if self.target_sectors.is_empty() {
            3
        } else {
            match lead.market_sector {
                Some(sector) if sector != MarketSector::Other => {
                    let targeted = self.target_sectors.iter().any(|target| {
                        MarketSector::parse(target) == Some(sector)
                            || fuzzy_matches(sector.as_str(), target)
                    });
                    if targeted {
                        7
                    } else {
                        0
                    }
                }
                _ => 0,
            }
        };
        location + sector
    }
}

fn company_points(lead: &Lead) -> u8 {
    let Some(org) = lead.organization.as_deref().map(str::trim).filter(|o| !o.is_empty()) else {
        return 0;
    };
    let lowered = org.to_lowercase();
    let formal = lowered.split_whitespace().count() >= 2
        || lowered
            .split_whitespace()
            .any(|word| ENTITY_SUFFIXES.contains(&word.trim_matches('.')));

    let mut points = 8;
    if formal {
        points += 4;
    }
    if lead.location.is_some() {
        points += 3;
    }
    points
}

fn contact_points(lead: &Lead) -> u8 {
    lead.contacts
        .iter()
        .map(|contact| {
            let mut points = 0;
            if contact.name.is_some() {
                points += 5;
            }
            if contact.email.is_some() {
                points += 8;
            }
            if contact.phone.is_some() {
                points += 7;
            }
            points
        })
        .max()
        .unwrap_or(0)
}

fn detail_points(lead: &Lead) -> u8 {
    let description_len = lead.description.chars().count();
    let mut points = match description_len {
        200.. => 5,
        50..=199 => 3,
        _ => 0,
    };
    if lead.project_type.is_some() {
        points += 3;
    }
    if lead.square_footage.is_some() {
        points += 3;
    }
    if lead.start_date.is_some() || lead.end_date.is_some() {
        points += 2;
    }
    if lead.market_sector.is_some_and(|s| s != MarketSector::Other) {
        points += 2;
    }
    points
}
