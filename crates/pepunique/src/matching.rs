use crate::driver::Observer;
use crate::feature::{Feature, FeatureCatalog, FeatureId};
use crate::index::RangeIndex;
use crate::tolerance::{Candidate, Region, SearchThresholds, ToleranceEvaluator};
use crate::Error;
use fnv::FnvHashMap;
use rayon::prelude::*;
use serde::Serialize;
use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering};
use std::time::Instant;

/// Progress is reported, and cancellation polled, once per this many features
pub const PROGRESS_INTERVAL: usize = 100;

pub const DEFAULT_MAX_MATCHES: usize = 3;
pub const MAX_MATCHES_LIMIT: usize = 100;

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct MatchResult {
    pub feature_id: FeatureId,
    pub matching_id: FeatureId,
    /// Matching mass minus feature mass, in Da
    pub mass_err: f64,
    /// Matching NET minus feature NET
    pub net_err: f64,
    pub slic_score: f64,
    /// Difference between the best score for this feature and this match
    pub del_slic: f64,
    /// Number of comparison features within tolerance, before the cap
    pub multi_amt_hit_count: usize,
}

/// All retained matches for a single feature, best first
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureMatches {
    pub feature_id: FeatureId,
    pub mass: f64,
    pub multi_amt_hit_count: usize,
    pub matches: Vec<MatchResult>,
}

/// Matches for every searched feature of one threshold level, in the order
/// the features were searched
#[derive(Clone, Debug, Default)]
pub struct MatchResultSet {
    entries: Vec<FeatureMatches>,
    lookup: FnvHashMap<FeatureId, usize>,
}

impl MatchResultSet {
    fn new(entries: Vec<FeatureMatches>) -> Self {
        let lookup = entries
            .iter()
            .enumerate()
            .map(|(ix, entry)| (entry.feature_id, ix))
            .collect();
        Self { entries, lookup }
    }

    pub fn matches(&self, feature_id: FeatureId) -> &[MatchResult] {
        self.lookup
            .get(&feature_id)
            .map(|&ix| self.entries[ix].matches.as_slice())
            .unwrap_or(&[])
    }

    pub fn match_count_for_feature_id(&self, feature_id: FeatureId) -> usize {
        self.matches(feature_id).len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FeatureMatches> {
        self.entries.iter()
    }

    /// Number of features searched
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of retained matches across all features
    pub fn total_matches(&self) -> usize {
        self.entries.iter().map(|e| e.matches.len()).sum()
    }
}

/// Runs the per-feature search for one threshold level at a time against a
/// single comparison catalog. The [`RangeIndex`] is built once, at
/// construction, and reused for every level.
pub struct MatchEngine {
    index: RangeIndex,
    max_matches_per_feature: usize,
    region: Region,
    self_comparison: bool,
}

impl MatchEngine {
    /// Index `comparisons`. When `self_comparison` is set, the features to
    /// identify are drawn from the same catalog and a feature is never
    /// reported as a match for itself
    pub fn new(
        comparisons: &FeatureCatalog,
        self_comparison: bool,
        max_matches_per_feature: usize,
        region: Region,
    ) -> Self {
        MatchEngine {
            index: RangeIndex::build(comparisons),
            max_matches_per_feature: max_matches_per_feature.clamp(1, MAX_MATCHES_LIMIT),
            region,
            self_comparison,
        }
    }

    pub fn index(&self) -> &RangeIndex {
        &self.index
    }

    pub fn identify(
        &self,
        thresholds: &SearchThresholds,
        targets: &FeatureCatalog,
        comparisons: &FeatureCatalog,
        observer: &dyn Observer,
        cancel: &AtomicBool,
    ) -> Result<MatchResultSet, Error> {
        self.index.ensure_current(comparisons)?;
        if self.self_comparison {
            self.index.ensure_current(targets)?;
        }

        let evaluator = ToleranceEvaluator::new(*thresholds, self.region);
        let total = targets.len().max(1);
        let counter = AtomicUsize::new(0);
        let start = Instant::now();

        let entries = targets
            .as_slice()
            .par_iter()
            .map(|query| {
                let prev = counter.fetch_add(1, AtomicOrdering::Relaxed);
                if prev % PROGRESS_INTERVAL == 0 {
                    if cancel.load(AtomicOrdering::Relaxed) {
                        return Err(Error::Aborted);
                    }
                    observer.progress("Matching features", prev as f32 * 100.0 / total as f32);
                }
                Ok(self.search(&evaluator, query))
            })
            .collect::<Result<Vec<_>, Error>>()?;

        let duration = start.elapsed().as_millis() as usize;
        let rate = targets.len() * 1000 / (duration + 1);
        log::info!("- matching: {:8} ms ({} features/s)", duration, rate);

        Ok(MatchResultSet::new(entries))
    }

    fn search(&self, evaluator: &ToleranceEvaluator, query: &Feature) -> FeatureMatches {
        let (lo, hi) = evaluator.window(query.mass);
        let mut hits = self
            .index
            .query(lo, hi)
            .iter()
            .filter(|candidate| !(self.self_comparison && candidate.id == query.id))
            .filter_map(|candidate| evaluator.evaluate(query, candidate))
            .collect::<Vec<_>>();

        let use_slic = evaluator.thresholds().use_slic_score;
        hits.sort_unstable_by(|a, b| rank(a, b, use_slic));

        let multi_amt_hit_count = hits.len();
        let best = hits.first().map(|hit| hit.slic_score).unwrap_or_default();
        hits.truncate(self.max_matches_per_feature);

        let matches = hits
            .into_iter()
            .map(|hit| MatchResult {
                feature_id: query.id,
                matching_id: hit.matching_id,
                mass_err: hit.mass_err,
                net_err: hit.net_err,
                slic_score: hit.slic_score,
                del_slic: best - hit.slic_score,
                multi_amt_hit_count,
            })
            .collect();

        FeatureMatches {
            feature_id: query.id,
            mass: query.mass,
            multi_amt_hit_count,
            matches,
        }
    }
}

/// Best candidate first: highest SLiC score in SLiC mode, smallest normalized
/// distance in geometric mode. Ties go to the lower matching id
fn rank(a: &Candidate, b: &Candidate, use_slic: bool) -> Ordering {
    let primary = match use_slic {
        true => b.slic_score.total_cmp(&a.slic_score),
        false => a.distance.total_cmp(&b.distance),
    };
    primary.then_with(|| a.matching_id.cmp(&b.matching_id))
}
