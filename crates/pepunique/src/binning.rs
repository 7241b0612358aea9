//! Per-feature uniqueness classification and mass-binned statistics
//!
//! Every searched feature is classified as [`Uniqueness::Unique`],
//! [`Uniqueness::NonUnique`] or [`Uniqueness::Unmatched`]. Matched features
//! are then counted into contiguous mass bins covering
//! `[mass_minimum, mass_maximum)`; non-unique features also increment a
//! match-count histogram whose last bucket collects "H or more" matches.
//!
//! Bins are allocated once, after the final range and bin size are known.

use crate::feature::FeatureId;
use crate::matching::{MatchResult, MatchResultSet, DEFAULT_MAX_MATCHES};
use serde::{Deserialize, Serialize};

pub const MAX_BIN_COUNT: usize = 1_000_000;
pub const MAX_HISTOGRAM_BUCKETS: usize = 10;
pub const DEFAULT_MASS_MINIMUM: f64 = 400.0;
pub const DEFAULT_MASS_MAXIMUM: f64 = 6000.0;
pub const DEFAULT_BIN_SIZE_DA: f64 = 25.0;
/// Auto-determined mass ranges are widened to multiples of this value
const AUTO_RANGE_STEP: f64 = 100.0;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Uniqueness {
    Unique,
    NonUnique,
    Unmatched,
}

/// Classify a feature from its retained matches.
///
/// * No matches: unmatched, in either mode.
/// * SLiC mode: unique when any retained match scores at least
///   `minimum_slic_score`.
/// * Geometric mode: unique when there is exactly one match.
pub fn classify(matches: &[MatchResult], use_slic_score: bool, minimum_slic_score: f64) -> Uniqueness {
    if matches.is_empty() {
        return Uniqueness::Unmatched;
    }
    let unique = match use_slic_score {
        true => matches.iter().any(|m| m.slic_score >= minimum_slic_score),
        false => matches.len() == 1,
    };
    match unique {
        true => Uniqueness::Unique,
        false => Uniqueness::NonUnique,
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct Classified {
    pub feature_id: FeatureId,
    pub mass: f64,
    pub match_count: usize,
    pub uniqueness: Uniqueness,
}

pub fn classify_all(
    results: &MatchResultSet,
    use_slic_score: bool,
    minimum_slic_score: f64,
) -> Vec<Classified> {
    results
        .iter()
        .map(|entry| Classified {
            feature_id: entry.feature_id,
            mass: entry.mass,
            match_count: entry.matches.len(),
            uniqueness: classify(&entry.matches, use_slic_score, minimum_slic_score),
        })
        .collect()
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BinningSettings {
    pub use_slic_score: bool,
    pub minimum_slic_score: f64,
    pub auto_determine_mass_range: bool,
    pub mass_bin_size_da: f64,
    pub mass_minimum: f64,
    pub mass_maximum: f64,
    pub max_matches_per_feature: usize,
}

impl Default for BinningSettings {
    fn default() -> Self {
        Self {
            use_slic_score: false,
            minimum_slic_score: 0.99,
            auto_determine_mass_range: true,
            mass_bin_size_da: DEFAULT_BIN_SIZE_DA,
            mass_minimum: DEFAULT_MASS_MINIMUM,
            mass_maximum: DEFAULT_MASS_MAXIMUM,
            max_matches_per_feature: DEFAULT_MAX_MATCHES,
        }
    }
}

impl BinningSettings {
    /// Number of histogram buckets
    pub fn histogram_len(&self) -> usize {
        self.max_matches_per_feature.clamp(1, MAX_HISTOGRAM_BUCKETS)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Bin {
    pub mass_bin_start: f64,
    pub mass_bin_end: f64,
    pub unique_count: usize,
    pub non_unique_count: usize,
    /// `match_count_histogram[i]` counts non-unique features with `i + 1`
    /// matches; the last bucket also holds everything above
    pub match_count_histogram: Vec<usize>,
}

impl Bin {
    pub fn peptide_count_total(&self) -> usize {
        self.unique_count + self.non_unique_count
    }

    pub fn percent_unique(&self) -> f64 {
        match self.peptide_count_total() {
            0 => 0.0,
            total => self.unique_count as f64 / total as f64 * 100.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BinnedStats {
    pub bins: Vec<Bin>,
    pub mass_minimum: f64,
    pub mass_maximum: f64,
    /// Bin size actually used, after enforcing [`MAX_BIN_COUNT`]
    pub bin_size_da: f64,
    pub requested_bin_size_da: f64,
    /// Matched features whose mass fell outside the binning range
    pub skipped: usize,
    pub unique: usize,
    pub non_unique: usize,
    pub unmatched: usize,
}

impl BinnedStats {
    pub fn bin_size_increased(&self) -> bool {
        self.bin_size_da > self.requested_bin_size_da
    }

    pub fn histogram_len(&self) -> usize {
        self.bins
            .first()
            .map(|bin| bin.match_count_histogram.len())
            .unwrap_or_default()
    }
}

/// Mass range to bin over. Auto ranges cover every matched feature, rounded
/// outwards to a multiple of 100 Da
pub fn mass_range(classified: &[Classified], settings: &BinningSettings) -> (f64, f64) {
    if !settings.auto_determine_mass_range {
        let (lo, hi) = (settings.mass_minimum, settings.mass_maximum);
        if lo.is_finite() && hi.is_finite() && hi > lo {
            return (lo, hi);
        }
        log::warn!(
            "mass range [{}, {}) is unusable, using [{}, {})",
            settings.mass_minimum,
            settings.mass_maximum,
            DEFAULT_MASS_MINIMUM,
            DEFAULT_MASS_MAXIMUM
        );
        return (DEFAULT_MASS_MINIMUM, DEFAULT_MASS_MAXIMUM);
    }

    let matched = classified
        .iter()
        .filter(|c| c.uniqueness != Uniqueness::Unmatched)
        .map(|c| c.mass);

    let (lo, hi) = matched.fold((f64::MAX, f64::MIN), |(lo, hi), mass| {
        (lo.min(mass), hi.max(mass))
    });
    if lo > hi {
        return (DEFAULT_MASS_MINIMUM, DEFAULT_MASS_MAXIMUM);
    }

    // Upper bound is exclusive, so step past the largest mass
    let lo = (lo / AUTO_RANGE_STEP).floor() * AUTO_RANGE_STEP;
    let hi = (hi / AUTO_RANGE_STEP).floor() * AUTO_RANGE_STEP + AUTO_RANGE_STEP;
    (lo, hi)
}

/// Pick the final bin size and count for a range, multiplying the bin size
/// by 10 until no more than [`MAX_BIN_COUNT`] bins are needed
pub fn bin_layout(mass_minimum: f64, mass_maximum: f64, bin_size_da: f64) -> (f64, usize) {
    let span = mass_maximum - mass_minimum;
    let mut size = match bin_size_da.is_finite() && bin_size_da > 0.0 {
        true => bin_size_da,
        false => {
            log::warn!("invalid mass bin size {}, using {}", bin_size_da, DEFAULT_BIN_SIZE_DA);
            DEFAULT_BIN_SIZE_DA
        }
    };
    if !(span.is_finite() && span > 0.0) {
        return (size, 1);
    }
    let mut count = (span / size).ceil();
    while count > MAX_BIN_COUNT as f64 {
        size *= 10.0;
        count = (span / size).ceil();
    }

    let mut count = (count as usize).max(1);
    // Guard against a trailing zero-width bin from rounding
    while count > 1 && mass_minimum + (count - 1) as f64 * size >= mass_maximum {
        count -= 1;
    }
    (size, count)
}

pub struct UniquenessBinner {
    settings: BinningSettings,
}

impl UniquenessBinner {
    pub fn new(settings: BinningSettings) -> Self {
        Self { settings }
    }

    pub fn classify(&self, results: &MatchResultSet) -> Vec<Classified> {
        classify_all(
            results,
            self.settings.use_slic_score,
            self.settings.minimum_slic_score,
        )
    }

    pub fn bin(&self, classified: &[Classified]) -> BinnedStats {
        let (mass_minimum, mass_maximum) = mass_range(classified, &self.settings);
        let (bin_size_da, bin_count) =
            bin_layout(mass_minimum, mass_maximum, self.settings.mass_bin_size_da);
        let histogram_len = self.settings.histogram_len();

        let mut bins = (0..bin_count)
            .map(|ix| Bin {
                mass_bin_start: mass_minimum + ix as f64 * bin_size_da,
                mass_bin_end: match ix + 1 == bin_count {
                    true => mass_maximum,
                    false => mass_minimum + (ix + 1) as f64 * bin_size_da,
                },
                unique_count: 0,
                non_unique_count: 0,
                match_count_histogram: vec![0; histogram_len],
            })
            .collect::<Vec<_>>();

        let mut stats = BinnedStats {
            bins: Vec::new(),
            mass_minimum,
            mass_maximum,
            bin_size_da,
            requested_bin_size_da: self.settings.mass_bin_size_da,
            skipped: 0,
            unique: 0,
            non_unique: 0,
            unmatched: 0,
        };

        for feature in classified {
            match feature.uniqueness {
                Uniqueness::Unmatched => {
                    stats.unmatched += 1;
                    continue;
                }
                Uniqueness::Unique => stats.unique += 1,
                Uniqueness::NonUnique => stats.non_unique += 1,
            }

            if feature.mass < mass_minimum || feature.mass >= mass_maximum {
                stats.skipped += 1;
                continue;
            }
            let ix = (((feature.mass - mass_minimum) / bin_size_da).floor() as usize).min(bin_count - 1);
            let bin = &mut bins[ix];

            match feature.uniqueness {
                Uniqueness::Unique => bin.unique_count += 1,
                _ => {
                    bin.non_unique_count += 1;
                    let bucket = feature.match_count.clamp(1, histogram_len) - 1;
                    bin.match_count_histogram[bucket] += 1;
                }
            }
        }

        stats.bins = bins;
        stats
    }
}
