use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

use crate::config::PipelineConfig;
use crate::models::Lead;

/// Characters of the description that feed the fingerprint.
const FINGERPRINT_DESCRIPTION_CHARS: usize = 100;

/// Detects leads already seen, by exact fingerprint or token overlap.
///
/// # Locking
///
/// All cache state lives behind one `Mutex`. Every public method takes the
/// lock once, does its work synchronously and releases it before returning;
/// the lock is never held across an `.await`. A poisoned lock is recovered,
/// since the state is only ever left with whole entries inserted or removed.
///
/// # Cache writes
///
/// [`Deduplicator::deduplicate`] only reads the cache, so running it twice
/// over the same batch gives the same answer. Survivors enter the cache
/// through [`Deduplicator::remember`] once the batch is done, and
/// [`Deduplicator::prune`] then evicts entries past the lookback window.
pub struct Deduplicator {
    similarity_threshold: f64,
    lookback: Duration,
    max_size: usize,
    state: Mutex<CacheState>,
}

#[derive(Default)]
struct CacheState {
    fingerprints: HashMap<String, DateTime<Utc>>,
    history: VecDeque<Remembered>,
}

struct Remembered {
    id: String,
    fingerprint: String,
    tokens: HashSet<String>,
    seen_at: DateTime<Utc>,
}

/// Why a lead counts as a duplicate.
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateMatch {
    /// Lead it duplicates, when known.
    pub existing_id: Option<String>,
    /// 1.0 for an exact fingerprint hit, the Jaccard ratio otherwise.
    pub similarity: f64,
    pub exact: bool,
}

/// SHA-256 over the identifying fields of a lead, hex encoded.
pub fn fingerprint(lead: &Lead) -> String {
    let description: String = lead
        .description
        .chars()
        .take(FINGERPRINT_DESCRIPTION_CHARS)
        .collect();
    let value = lead
        .estimated_value
        .map(|v| format!("{v:.2}"))
        .unwrap_or_default();
    let sector = lead.market_sector.map(|s| s.as_str()).unwrap_or_default();

    let material = [
        lead.title.as_str(),
        description.as_str(),
        lead.organization.as_deref().unwrap_or_default(),
        lead.location_label().as_deref().unwrap_or_default(),
        sector,
        value.as_str(),
    ]
    .join("|");

    let mut hasher = Sha256::new();
    hasher.update(material.as_bytes());
    hex::encode(hasher.finalize())
}

/// Lower-cased word set used for fuzzy comparison.
pub fn token_set(lead: &Lead) -> HashSet<String> {
    let location = lead.location_label().unwrap_or_default();
    [
        lead.title.as_str(),
        lead.description.as_str(),
        lead.organization.as_deref().unwrap_or_default(),
        location.as_str(),
        lead.project_type.as_deref().unwrap_or_default(),
    ]
    .iter()
    .flat_map(|field| field.split_whitespace())
    .map(|word| {
        word.trim_matches(|c: char| !c.is_alphanumeric())
            .to_lowercase()
    })
    .filter(|word| !word.is_empty())
    .collect()
}

/// |A ∩ B| / |A ∪ B|; two empty sets are not similar.
pub fn jaccard_similarity(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    intersection / union
}

impl Deduplicator {
    pub fn new(similarity_threshold: f64, lookback_days: i64, max_size: usize) -> Self {
        Self {
            similarity_threshold,
            lookback: Duration::days(lookback_days),
            max_size,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            config.similarity_threshold,
            config.dedup_lookback_days,
            config.dedup_cache_size,
        )
    }

    pub fn lookback_days(&self) -> i64 {
        self.lookback.num_days()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Loads stored leads into the cache, dated by their retrieval time.
    pub fn seed_from_history(&self, leads: &[Lead]) {
        let mut state = self.lock();
        let mut entries: Vec<Remembered> = leads
            .iter()
            .map(|lead| Remembered {
                id: lead.id().to_string(),
                fingerprint: fingerprint(lead),
                tokens: token_set(lead),
                seen_at: lead.retrieved_date(),
            })
            .collect();
        entries.sort_by_key(|entry| entry.seen_at);

        for entry in entries {
            state
                .fingerprints
                .entry(entry.fingerprint.clone())
                .or_insert(entry.seen_at);
            state.history.push_back(entry);
        }
        trim_to_size(&mut state, self.max_size);
        tracing::info!(
            seeded = leads.len(),
            cached = state.history.len(),
            "Seeded dedup cache from stored leads"
        );
    }

    /// Cached lead that `lead` duplicates, if any.
    pub fn find_duplicate(&self, lead: &Lead) -> Option<DuplicateMatch> {
        let state = self.lock();
        self.match_against(&state.history, &state.fingerprints, &fingerprint(lead), &token_set(lead))
    }

    fn match_against<'a>(
        &self,
        history: impl IntoIterator<Item = &'a Remembered>,
        fingerprints: &HashMap<String, DateTime<Utc>>,
        print: &str,
        tokens: &HashSet<String>,
    ) -> Option<DuplicateMatch> {
        let mut best: Option<DuplicateMatch> = None;
        for entry in history {
            if entry.fingerprint == print {
                return Some(DuplicateMatch {
                    existing_id: Some(entry.id.clone()),
                    similarity: 1.0,
                    exact: true,
                });
            }
            let similarity = jaccard_similarity(tokens, &entry.tokens);
            if similarity >= self.similarity_threshold
                && best.as_ref().map_or(true, |b| similarity > b.similarity)
            {
                best = Some(DuplicateMatch {
                    existing_id: Some(entry.id.clone()),
                    similarity,
                    exact: false,
                });
            }
        }
        if best.is_none() && fingerprints.contains_key(print) {
            // Fingerprint outlived its history entry after trimming.
            return Some(DuplicateMatch {
                existing_id: None,
                similarity: 1.0,
                exact: true,
            });
        }
        best
    }

    /// Splits a batch into survivors and duplicates.
    ///
    /// Leads are considered in descending confidence (ties keep input
    /// order) so the most confident copy survives. Both lists come back in
    /// input order. The cache is read, never written.
    pub fn partition(&self, leads: Vec<Lead>) -> (Vec<Lead>, Vec<(Lead, DuplicateMatch)>) {
        let mut order: Vec<usize> = (0..leads.len()).collect();
        order.sort_by(|a, b| {
            leads[*b]
                .confidence_score()
                .total_cmp(&leads[*a].confidence_score())
        });

        let mut verdicts: Vec<Option<DuplicateMatch>> = vec![None; leads.len()];
        {
            let state = self.lock();
            let mut accepted: Vec<Remembered> = Vec::new();
            for idx in order {
                let lead = &leads[idx];
                let print = fingerprint(lead);
                let tokens = token_set(lead);

                let verdict = self
                    .match_against(&state.history, &state.fingerprints, &print, &tokens)
                    .or_else(|| self.match_against(&accepted, &HashMap::new(), &print, &tokens));

                match verdict {
                    Some(found) => verdicts[idx] = Some(found),
                    None => accepted.push(Remembered {
                        id: lead.id().to_string(),
                        fingerprint: print,
                        tokens,
                        seen_at: Utc::now(),
                    }),
                }
            }
        }

        let mut kept = Vec::new();
        let mut duplicates = Vec::new();
        for (lead, verdict) in leads.into_iter().zip(verdicts) {
            match verdict {
                Some(found) => {
                    tracing::debug!(
                        lead_id = %lead.id(),
                        duplicate_of = ?found.existing_id,
                        similarity = found.similarity,
                        "Dropping duplicate lead"
                    );
                    duplicates.push((lead, found));
                }
                None => kept.push(lead),
            }
        }
        (kept, duplicates)
    }

    /// Survivors of a batch; always a subset of `leads` in input order.
    pub fn deduplicate(&self, leads: Vec<Lead>) -> Vec<Lead> {
        self.partition(leads).0
    }

    /// Records leads as seen now.
    pub fn remember(&self, leads: &[Lead]) {
        let now = Utc::now();
        let mut state = self.lock();
        for lead in leads {
            let print = fingerprint(lead);
            state.fingerprints.insert(print.clone(), now);
            state.history.push_back(Remembered {
                id: lead.id().to_string(),
                fingerprint: print,
                tokens: token_set(lead),
                seen_at: now,
            });
        }
        trim_to_size(&mut state, self.max_size);
    }

    /// Drops entries older than the lookback window. Returns how many
    /// history entries were removed.
    pub fn prune(&self) -> usize {
        self.prune_older_than(Utc::now() - self.lookback)
    }

    fn prune_older_than(&self, cutoff: DateTime<Utc>) -> usize {
        let mut state = self.lock();
        let before = state.history.len();
        state.history.retain(|entry| entry.seen_at >= cutoff);
        state.fingerprints.retain(|_, seen_at| *seen_at >= cutoff);
        trim_to_size(&mut state, self.max_size);
        before - state.history.len()
    }

    /// Number of leads in the fuzzy history.
    pub fn len(&self) -> usize {
        self.lock().history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn trim_to_size(state: &mut CacheState, max_size: usize) {
    while state.history.len() > max_size {
        state.history.pop_front();
    }
    if state.fingerprints.len() > max_size {
        let mut by_age: Vec<(String, DateTime<Utc>)> = state
            .fingerprints
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        by_age.sort_by_key(|(_, seen_at)| *seen_at);
        let excess = by_age.len() - max_size;
        for (key, _) in by_age.into_iter().take(excess) {
            state.fingerprints.remove(&key);
        }
    }
}
