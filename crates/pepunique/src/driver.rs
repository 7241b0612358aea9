//! Top-level control loop for uniqueness statistics.
//!
//! [`UniquenessStatsDriver::generate_uniqueness_stats`] indexes the comparison
//! catalog once, then processes every threshold level to completion before
//! starting the next: match, classify and bin, aggregate per protein, and
//! hand the rows to a [`ResultSink`]. Nothing computed for one level is
//! carried into the next.

use crate::binning::{BinnedStats, BinningSettings, UniquenessBinner, MAX_BIN_COUNT};
use crate::feature::FeatureCatalog;
use crate::identifiability::{self, ProteinStats};
use crate::matching::{MatchEngine, MatchResultSet, DEFAULT_MAX_MATCHES, MAX_MATCHES_LIMIT};
use crate::protein::ProteinCollection;
use crate::tolerance::{Region, SearchThresholds};
use crate::Error;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub enum Severity {
    Normal,
    Warning,
    Error,
}

/// Progress and log sink. Calls may arrive from worker threads
pub trait Observer: Sync {
    fn progress(&self, task: &str, percent_complete: f32);
    fn message(&self, message: &str, severity: Severity);
}

pub struct NullObserver;

impl Observer for NullObserver {
    fn progress(&self, _: &str, _: f32) {}
    fn message(&self, _: &str, _: Severity) {}
}

/// Forwards everything to the `log` facade
pub struct LogObserver;

impl Observer for LogObserver {
    fn progress(&self, task: &str, percent_complete: f32) {
        log::trace!("{}: {:.1}%", task, percent_complete);
    }

    fn message(&self, message: &str, severity: Severity) {
        match severity {
            Severity::Normal => log::info!("{}", message),
            Severity::Warning => log::warn!("{}", message),
            Severity::Error => log::error!("{}", message),
        }
    }
}

/// Receives the rows of each threshold level as soon as that level is done
pub trait ResultSink {
    fn write_matches(&mut self, level: usize, results: &MatchResultSet) -> Result<(), Error>;
    fn write_bins(&mut self, level: usize, stats: &BinnedStats) -> Result<(), Error>;
    fn write_proteins(&mut self, level: usize, stats: &[ProteinStats]) -> Result<(), Error>;
}

/// Global settings shared by every threshold level
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub max_matches_per_feature: usize,
    pub use_slic_score: bool,
    pub use_ellipse_region: bool,
    pub minimum_slic_score: f64,
    pub auto_determine_mass_range: bool,
    pub mass_bin_size_da: f64,
    pub mass_minimum: f64,
    pub mass_maximum: f64,
}

impl Default for Settings {
    fn default() -> Self {
        let binning = BinningSettings::default();
        Self {
            max_matches_per_feature: DEFAULT_MAX_MATCHES,
            use_slic_score: false,
            use_ellipse_region: true,
            minimum_slic_score: binning.minimum_slic_score,
            auto_determine_mass_range: binning.auto_determine_mass_range,
            mass_bin_size_da: binning.mass_bin_size_da,
            mass_minimum: binning.mass_minimum,
            mass_maximum: binning.mass_maximum,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), Error> {
        if !(1..=MAX_MATCHES_LIMIT).contains(&self.max_matches_per_feature) {
            return Err(Error::Config(format!(
                "max_matches_per_feature must be between 1 and {}, got {}",
                MAX_MATCHES_LIMIT, self.max_matches_per_feature
            )));
        }
        if !(0.0..=1.0).contains(&self.minimum_slic_score) {
            return Err(Error::Config(format!(
                "minimum_slic_score must be between 0 and 1, got {}",
                self.minimum_slic_score
            )));
        }
        if !self.mass_bin_size_da.is_finite() || self.mass_bin_size_da <= 0.0 {
            return Err(Error::Config(format!(
                "mass_bin_size_da must be positive, got {}",
                self.mass_bin_size_da
            )));
        }
        if !self.mass_minimum.is_finite() || !self.mass_maximum.is_finite() {
            return Err(Error::Config(format!(
                "mass range [{}, {}) must be finite",
                self.mass_minimum, self.mass_maximum
            )));
        }
        if !self.auto_determine_mass_range && !(self.mass_maximum > self.mass_minimum) {
            return Err(Error::Config(format!(
                "mass_maximum ({}) must exceed mass_minimum ({})",
                self.mass_maximum, self.mass_minimum
            )));
        }
        Ok(())
    }

    pub fn binning(&self) -> BinningSettings {
        BinningSettings {
            use_slic_score: self.use_slic_score,
            minimum_slic_score: self.minimum_slic_score,
            auto_determine_mass_range: self.auto_determine_mass_range,
            mass_bin_size_da: self.mass_bin_size_da,
            mass_minimum: self.mass_minimum,
            mass_maximum: self.mass_maximum,
            max_matches_per_feature: self.max_matches_per_feature,
        }
    }

    pub fn region(&self) -> Region {
        Region::from_ellipse_flag(self.use_ellipse_region)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub enum DriverState {
    Idle,
    Initializing,
    Matching(usize),
    Binning(usize),
    Aggregating(usize),
    Completed,
    Aborted,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
/// Outcome of one threshold level
pub struct LevelSummary {
    pub threshold_index: usize,
    /// Thresholds as evaluated, after global overrides
    pub thresholds: SearchThresholds,
    pub features_searched: usize,
    pub total_matches: usize,
    pub unique: usize,
    pub non_unique: usize,
    pub unmatched: usize,
    /// Matched features outside the binning range
    pub skipped: usize,
    pub bin_size_da: f64,
    pub elapsed_ms: u64,
}

impl LevelSummary {
    /// Unique features as a percentage of all matched features
    pub fn percent_unique(&self) -> f64 {
        match self.unique + self.non_unique {
            0 => 0.0,
            total => self.unique as f64 / total as f64 * 100.0,
        }
    }
}

pub struct UniquenessStatsDriver<'o> {
    settings: Settings,
    thresholds: Vec<SearchThresholds>,
    observer: &'o dyn Observer,
    cancel: Arc<AtomicBool>,
    state: DriverState,
}

impl<'o> UniquenessStatsDriver<'o> {
    pub fn new(
        settings: Settings,
        thresholds: Vec<SearchThresholds>,
        observer: &'o dyn Observer,
    ) -> Self {
        Self {
            settings,
            thresholds,
            observer,
            cancel: Arc::new(AtomicBool::new(false)),
            state: DriverState::Idle,
        }
    }

    /// Share an existing cancellation flag with the caller
    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Setting the returned flag requests cooperative cancellation
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    /// Compute uniqueness statistics for `targets` at every threshold level.
    ///
    /// When `comparisons` is `None` or refers to `targets` itself, `targets`
    /// are compared against themselves and self-matches are excluded. Protein rows are only
    /// produced when `proteins` is given and non-empty.
    pub fn generate_uniqueness_stats(
        &mut self,
        targets: &FeatureCatalog,
        comparisons: Option<&FeatureCatalog>,
        proteins: Option<&ProteinCollection>,
        sink: &mut dyn ResultSink,
    ) -> Result<Vec<LevelSummary>, Error> {
        let result = self.run(targets, comparisons, proteins, sink);
        match &result {
            Ok(_) => self.state = DriverState::Completed,
            Err(Error::Aborted) => {
                self.state = DriverState::Aborted;
                self.observer
                    .message("Uniqueness statistics aborted", Severity::Warning);
            }
            Err(e) => {
                self.state = DriverState::Failed;
                self.observer.message(&e.to_string(), Severity::Error);
            }
        }
        result
    }

    fn run(
        &mut self,
        targets: &FeatureCatalog,
        comparisons: Option<&FeatureCatalog>,
        proteins: Option<&ProteinCollection>,
        sink: &mut dyn ResultSink,
    ) -> Result<Vec<LevelSummary>, Error> {
        self.state = DriverState::Initializing;
        self.settings.validate()?;

        if targets.is_empty() {
            return Err(Error::EmptyInput(
                "no features to identify were supplied".into(),
            ));
        }
        if comparisons.map(FeatureCatalog::is_empty).unwrap_or(false) {
            return Err(Error::EmptyInput(
                "the comparison feature catalog is empty".into(),
            ));
        }

        let levels = self.resolve_thresholds();
        let self_comparison = comparisons.map_or(true, |c| std::ptr::eq(c, targets));
        let comparisons = comparisons.unwrap_or(targets);

        let start = Instant::now();
        let engine = MatchEngine::new(
            comparisons,
            self_comparison,
            self.settings.max_matches_per_feature,
            self.settings.region(),
        );
        log::info!(
            "indexed {} comparison features in {:#?}",
            engine.index().len(),
            start.elapsed()
        );

        let binner = UniquenessBinner::new(self.settings.binning());
        let proteins = proteins.filter(|p| !p.is_empty());
        let mut summaries = Vec::with_capacity(levels.len());

        for (level, thresholds) in levels.iter().enumerate() {
            if self.cancel.load(Ordering::Relaxed) {
                return Err(Error::Aborted);
            }
            let start = Instant::now();
            self.observer.progress(
                &format!("Threshold level {} of {}", level + 1, levels.len()),
                level as f32 * 100.0 / levels.len() as f32,
            );

            self.state = DriverState::Matching(level);
            let results = engine.identify(
                thresholds,
                targets,
                comparisons,
                self.observer,
                &self.cancel,
            )?;

            self.state = DriverState::Binning(level);
            let classified = binner.classify(&results);
            let stats = binner.bin(&classified);
            self.report_binning(level, &stats);

            self.state = DriverState::Aggregating(level);
            let protein_stats = proteins.map(|p| identifiability::aggregate(&classified, p));

            sink.write_matches(level, &results)?;
            sink.write_bins(level, &stats)?;
            if let Some(protein_stats) = &protein_stats {
                sink.write_proteins(level, protein_stats)?;
            }

            let summary = LevelSummary {
                threshold_index: level,
                thresholds: *thresholds,
                features_searched: results.len(),
                total_matches: results.total_matches(),
                unique: stats.unique,
                non_unique: stats.non_unique,
                unmatched: stats.unmatched,
                skipped: stats.skipped,
                bin_size_da: stats.bin_size_da,
                elapsed_ms: start.elapsed().as_millis() as u64,
            };
            self.observer.message(
                &format!(
                    "threshold level {}: {} unique, {} non-unique, {} unmatched ({:.2}% unique)",
                    level,
                    summary.unique,
                    summary.non_unique,
                    summary.unmatched,
                    summary.percent_unique()
                ),
                Severity::Normal,
            );
            summaries.push(summary);
        }

        self.observer.progress("Uniqueness statistics", 100.0);
        Ok(summaries)
    }

    /// Threshold levels to evaluate. An empty or malformed list is replaced
    /// by a single default level; the global SLiC setting applies to all
    fn resolve_thresholds(&self) -> Vec<SearchThresholds> {
        let mut levels = self.thresholds.clone();
        if levels.is_empty() {
            self.observer.message(
                "no threshold levels supplied, using a single default level",
                Severity::Normal,
            );
            levels.push(SearchThresholds::default());
        }

        let problem = levels.iter().enumerate().find_map(|(ix, level)| {
            let mut level = *level;
            level.use_slic_score = self.settings.use_slic_score;
            level.validate().err().map(|e| (ix, e))
        });
        if let Some((ix, e)) = problem {
            self.observer.message(
                &format!(
                    "threshold level {} is invalid ({}), using a single default level",
                    ix, e
                ),
                Severity::Warning,
            );
            levels = vec![SearchThresholds::default()];
        }

        for level in &mut levels {
            level.use_slic_score = self.settings.use_slic_score;
            if level.use_slic_score && level.auto_define_slic_thresholds {
                level.define_slic_thresholds();
            }
        }
        levels
    }

    fn report_binning(&self, level: usize, stats: &BinnedStats) {
        if stats.bin_size_increased() {
            self.observer.message(
                &format!(
                    "threshold level {}: mass bin size raised from {} to {} Da to stay within {} bins",
                    level, stats.requested_bin_size_da, stats.bin_size_da, MAX_BIN_COUNT
                ),
                Severity::Warning,
            );
        }
        if stats.skipped > 0 {
            self.observer.message(
                &format!(
                    "threshold level {}: {} features outside the mass range [{}, {}) were skipped",
                    level, stats.skipped, stats.mass_minimum, stats.mass_maximum
                ),
                Severity::Warning,
            );
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::feature::Feature;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        messages: Mutex<Vec<(String, Severity)>>,
    }

    impl Observer for Recorder {
        fn progress(&self, _: &str, percent_complete: f32) {
            assert!((0.0..=100.0).contains(&percent_complete));
        }

        fn message(&self, message: &str, severity: Severity) {
            if let Ok(mut messages) = self.messages.lock() {
                messages.push((message.into(), severity));
            }
        }
    }

    #[derive(Default)]
    struct CountingSink {
        levels: Vec<usize>,
    }

    impl ResultSink for CountingSink {
        fn write_matches(&mut self, level: usize, _: &MatchResultSet) -> Result<(), Error> {
            self.levels.push(level);
            Ok(())
        }

        fn write_bins(&mut self, _: usize, _: &BinnedStats) -> Result<(), Error> {
            Ok(())
        }

        fn write_proteins(&mut self, _: usize, _: &[ProteinStats]) -> Result<(), Error> {
            Ok(())
        }
    }

    fn catalog() -> FeatureCatalog {
        [
            Feature::new(1, 1000.0, 0.5),
            Feature::new(2, 1000.001, 0.5),
            Feature::new(3, 1500.0, 0.2),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn empty_threshold_list_gets_default_level() {
        let observer = Recorder::default();
        let mut driver = UniquenessStatsDriver::new(Settings::default(), vec![], &observer);
        let mut sink = CountingSink::default();
        let summaries = driver
            .generate_uniqueness_stats(&catalog(), None, None, &mut sink)
            .unwrap();

        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].thresholds, SearchThresholds::default());
        assert_eq!(sink.levels, vec![0]);
        assert_eq!(driver.state(), DriverState::Completed);
    }

    #[test]
    fn malformed_levels_replaced() {
        let observer = Recorder::default();
        let bad = SearchThresholds {
            net_tolerance: f64::NAN,
            ..Default::default()
        };
        let mut driver = UniquenessStatsDriver::new(
            Settings::default(),
            vec![SearchThresholds::default(), bad],
            &observer,
        );
        let summaries = driver
            .generate_uniqueness_stats(&catalog(), None, None, &mut CountingSink::default())
            .unwrap();
        assert_eq!(summaries.len(), 1);

        let messages = observer.messages.lock().unwrap();
        assert!(messages
            .iter()
            .any(|(m, s)| *s == Severity::Warning && m.contains("invalid")));
    }

    #[test]
    fn empty_input_fails() {
        let mut driver = UniquenessStatsDriver::new(Settings::default(), vec![], &NullObserver);
        let mut sink = CountingSink::default();
        let result =
            driver.generate_uniqueness_stats(&FeatureCatalog::new(), None, None, &mut sink);
        assert!(matches!(result, Err(Error::EmptyInput(_))));
        assert_eq!(driver.state(), DriverState::Failed);
        assert!(sink.levels.is_empty());
    }

    #[test]
    fn invalid_settings_fail() {
        let settings = Settings {
            max_matches_per_feature: 0,
            ..Default::default()
        };
        let mut driver = UniquenessStatsDriver::new(settings, vec![], &NullObserver);
        let result = driver.generate_uniqueness_stats(
            &catalog(),
            None,
            None,
            &mut CountingSink::default(),
        );
        assert!(matches!(result, Err(Error::Config(_))));
        assert_eq!(driver.state(), DriverState::Failed);
    }

    #[test]
    fn cancelled_before_first_level() {
        let mut driver = UniquenessStatsDriver::new(
            Settings::default(),
            vec![SearchThresholds::default(); 3],
            &NullObserver,
        );
        driver.cancel_handle().store(true, Ordering::Relaxed);

        let mut sink = CountingSink::default();
        let result = driver.generate_uniqueness_stats(&catalog(), None, None, &mut sink);
        assert!(result.as_ref().err().map(Error::is_abort).unwrap_or(false));
        assert_eq!(driver.state(), DriverState::Aborted);
        assert!(sink.levels.is_empty());
    }

    #[test]
    fn infinite_mass_range_rejected() {
        for (lo, hi) in [(400.0, f64::INFINITY), (f64::NEG_INFINITY, 6000.0), (f64::NAN, 6000.0)] {
            let settings = Settings {
                auto_determine_mass_range: false,
                mass_minimum: lo,
                mass_maximum: hi,
                ..Default::default()
            };
            assert!(matches!(settings.validate(), Err(Error::Config(_))));

            let mut driver = UniquenessStatsDriver::new(settings, vec![], &NullObserver);
            let mut sink = CountingSink::default();
            let result = driver.generate_uniqueness_stats(&catalog(), None, None, &mut sink);
            assert!(matches!(result, Err(Error::Config(_))));
            assert!(sink.levels.is_empty());
        }
    }

    #[test]
    fn derived_slic_thresholds_reported() {
        let settings = Settings {
            use_slic_score: true,
            ..Default::default()
        };
        let level = SearchThresholds {
            mass_tolerance: 6.0,
            net_tolerance: 0.06,
            slic_max_search_distance_multiplier: 3.0,
            auto_define_slic_thresholds: true,
            ..Default::default()
        };
        let mut driver = UniquenessStatsDriver::new(settings, vec![level], &NullObserver);
        let summaries = driver
            .generate_uniqueness_stats(&catalog(), None, None, &mut CountingSink::default())
            .unwrap();

        let reported = summaries[0].thresholds;
        assert!((reported.slic_mass_ppm_stdev - 2.0).abs() < 1e-9);
        assert!((reported.slic_net_stdev - 0.02).abs() < 1e-9);
    }

    #[test]
    fn global_slic_setting_applies_to_every_level() {
        let settings = Settings {
            use_slic_score: true,
            ..Default::default()
        };
        let mut driver = UniquenessStatsDriver::new(
            settings,
            vec![SearchThresholds::default(); 2],
            &NullObserver,
        );
        let summaries = driver
            .generate_uniqueness_stats(&catalog(), None, None, &mut CountingSink::default())
            .unwrap();
        assert!(summaries.iter().all(|s| s.thresholds.use_slic_score));
    }
}
