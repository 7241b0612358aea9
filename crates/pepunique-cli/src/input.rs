use anyhow::{ensure, Context};
use clap::ArgMatches;
use pepunique_core::{
    driver::{LevelSummary, Settings},
    feature::{Feature, FeatureCatalog, FeatureId},
    protein::{CleavageState, ProteinCollection},
    tolerance::{MassTolType, SearchThresholds},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Serialize)]
/// Actual run parameters - may include overrides or default values not set by user
pub struct Search {
    pub version: String,
    pub settings: Settings,
    pub thresholds: Vec<SearchThresholds>,
    pub write_matches: bool,
    pub features: String,
    pub comparison_features: Option<String>,
    pub protein_links: Option<String>,
    pub output_paths: Vec<String>,
    pub summaries: Vec<LevelSummary>,

    #[serde(skip_serializing)]
    pub output_directory: PathBuf,
}

#[derive(Deserialize, Default)]
/// Input parameters deserialized from JSON file
pub struct Input {
    features: Option<String>,
    comparison_features: Option<String>,
    protein_links: Option<String>,
    output_directory: Option<String>,
    thresholds: Option<Vec<ThresholdOptions>>,

    max_matches_per_feature: Option<usize>,
    use_slic_score: Option<bool>,
    use_ellipse_region: Option<bool>,
    minimum_slic_score: Option<f64>,
    auto_determine_mass_range: Option<bool>,
    mass_bin_size_da: Option<f64>,
    mass_minimum: Option<f64>,
    mass_maximum: Option<f64>,
    write_matches: Option<bool>,
}

#[derive(Serialize, Deserialize, Default, Debug)]
/// One threshold level; `use_slic_score` is a global setting
pub struct ThresholdOptions {
    mass_tol_type: Option<MassTolType>,
    mass_tolerance: Option<f64>,
    net_tolerance: Option<f64>,
    slic_mass_ppm_stdev: Option<f64>,
    slic_net_stdev: Option<f64>,
    slic_use_amt_net_stdev: Option<bool>,
    slic_max_search_distance_multiplier: Option<f32>,
    auto_define_slic_thresholds: Option<bool>,
}

impl From<ThresholdOptions> for SearchThresholds {
    fn from(value: ThresholdOptions) -> SearchThresholds {
        let default = SearchThresholds::default();
        SearchThresholds {
            mass_tol_type: value.mass_tol_type.unwrap_or(default.mass_tol_type),
            mass_tolerance: value.mass_tolerance.unwrap_or(default.mass_tolerance),
            net_tolerance: value.net_tolerance.unwrap_or(default.net_tolerance),
            use_slic_score: default.use_slic_score,
            slic_mass_ppm_stdev: value
                .slic_mass_ppm_stdev
                .unwrap_or(default.slic_mass_ppm_stdev),
            slic_net_stdev: value.slic_net_stdev.unwrap_or(default.slic_net_stdev),
            slic_use_amt_net_stdev: value
                .slic_use_amt_net_stdev
                .unwrap_or(default.slic_use_amt_net_stdev),
            slic_max_search_distance_multiplier: value
                .slic_max_search_distance_multiplier
                .unwrap_or(default.slic_max_search_distance_multiplier),
            auto_define_slic_thresholds: value
                .auto_define_slic_thresholds
                .unwrap_or(default.auto_define_slic_thresholds),
        }
    }
}

impl Input {
    pub fn from_arguments(matches: ArgMatches) -> anyhow::Result<Self> {
        let mut input = match matches.get_one::<String>("parameters") {
            Some(path) => Input::load(path)
                .with_context(|| format!("Failed to read parameters from `{path}`"))?,
            None => Input::default(),
        };

        // Handle JSON configuration overrides
        if let Some(output_directory) = matches.get_one::<String>("output_directory") {
            log::trace!("overriding `output_directory` parameter.");
            input.output_directory = Some(output_directory.into());
        }
        if let Some(features) = matches.get_one::<String>("features") {
            log::trace!("overriding `features` parameter.");
            input.features = Some(features.into());
        }
        if let Some(comparisons) = matches.get_one::<String>("comparison_features") {
            log::trace!("overriding `comparison_features` parameter.");
            input.comparison_features = Some(comparisons.into());
        }
        if let Some(links) = matches.get_one::<String>("protein_links") {
            log::trace!("overriding `protein_links` parameter.");
            input.protein_links = Some(links.into());
        }
        if matches.get_flag("no-matches") {
            input.write_matches = Some(false);
        }

        ensure!(
            input.features.is_some(),
            "`features` must be set. For more information try '--help'"
        );

        Ok(input)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        pepunique_core::read_json(path).map_err(anyhow::Error::from)
    }

    fn check_thresholds(thresholds: &[SearchThresholds], use_slic_score: bool) {
        for (ix, level) in thresholds.iter().enumerate() {
            if level.mass_tol_type == MassTolType::Ppm && level.mass_tolerance > 100.0 {
                log::warn!(
                    "threshold level {}: mass tolerance of {} ppm is wider than expected",
                    ix,
                    level.mass_tolerance
                );
            }
            if level.net_tolerance > 1.0 {
                log::warn!(
                    "threshold level {}: NET tolerance {} spans more than the whole elution range",
                    ix,
                    level.net_tolerance
                );
            }
            if !use_slic_score && level.slic_use_amt_net_stdev {
                log::warn!(
                    "threshold level {}: `slic_use_amt_net_stdev` has no effect unless `use_slic_score` is set",
                    ix
                );
            }
        }
    }

    pub fn build(self) -> anyhow::Result<Search> {
        let default = Settings::default();
        let settings = Settings {
            max_matches_per_feature: self
                .max_matches_per_feature
                .unwrap_or(default.max_matches_per_feature),
            use_slic_score: self.use_slic_score.unwrap_or(default.use_slic_score),
            use_ellipse_region: self
                .use_ellipse_region
                .unwrap_or(default.use_ellipse_region),
            minimum_slic_score: self
                .minimum_slic_score
                .unwrap_or(default.minimum_slic_score),
            auto_determine_mass_range: self
                .auto_determine_mass_range
                .unwrap_or(default.auto_determine_mass_range),
            mass_bin_size_da: self.mass_bin_size_da.unwrap_or(default.mass_bin_size_da),
            mass_minimum: self.mass_minimum.unwrap_or(default.mass_minimum),
            mass_maximum: self.mass_maximum.unwrap_or(default.mass_maximum),
        };
        settings.validate()?;

        if settings.auto_determine_mass_range
            && (self.mass_minimum.is_some() || self.mass_maximum.is_some())
        {
            log::warn!("`mass_minimum`/`mass_maximum` are ignored while `auto_determine_mass_range` is set");
        }

        let mut thresholds = self
            .thresholds
            .unwrap_or_default()
            .into_iter()
            .map(SearchThresholds::from)
            .collect::<Vec<_>>();
        for level in &mut thresholds {
            level.use_slic_score = settings.use_slic_score;
        }
        Self::check_thresholds(&thresholds, settings.use_slic_score);

        let features = self.features.context("'features' must be provided!")?;

        let output_directory = match self.output_directory {
            Some(path) => {
                let path = PathBuf::from(path);
                std::fs::create_dir_all(&path).with_context(|| {
                    format!("Failed to create output directory `{}`", path.display())
                })?;
                path
            }
            None => std::env::current_dir()?,
        };

        Ok(Search {
            version: clap::crate_version!().into(),
            settings,
            thresholds,
            write_matches: self.write_matches.unwrap_or(true),
            features,
            comparison_features: self.comparison_features,
            protein_links: self.protein_links,
            output_paths: Vec::new(),
            summaries: Vec::new(),
            output_directory,
        })
    }
}

#[derive(Deserialize)]
struct FeatureRow {
    id: u32,
    #[serde(default)]
    name: String,
    mass: f64,
    net: f32,
    net_stdev: Option<f32>,
    discriminant_score: Option<f32>,
}

/// Read a tab-separated feature table. Rows sharing an `id` replace earlier
/// ones
pub fn read_features<P: AsRef<Path>>(path: P) -> anyhow::Result<FeatureCatalog> {
    let path = path.as_ref();
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .from_path(path)
        .with_context(|| format!("Failed to open features `{}`", path.display()))?;

    let mut catalog = FeatureCatalog::new();
    for (ix, row) in rdr.deserialize::<FeatureRow>().enumerate() {
        // Header is line 1
        let line = ix + 2;
        let row = row.with_context(|| format!("`{}` line {}", path.display(), line))?;
        ensure!(
            row.mass.is_finite() && row.mass >= 0.0,
            "`{}` line {}: feature {} has invalid mass {}",
            path.display(),
            line,
            row.id,
            row.mass
        );
        catalog.upsert(Feature {
            id: FeatureId(row.id),
            name: row.name,
            mass: row.mass,
            net: row.net,
            net_stdev: row.net_stdev.unwrap_or_default(),
            discriminant_score: row.discriminant_score.unwrap_or_default(),
        });
    }

    log::info!("read {} features from {}", catalog.len(), path.display());
    Ok(catalog)
}

#[derive(Deserialize)]
struct LinkRow {
    protein: String,
    peptide_id: u32,
    cleavage_state: Option<String>,
}

/// Read a tab-separated protein to peptide link table
pub fn read_protein_links<P: AsRef<Path>>(path: P) -> anyhow::Result<ProteinCollection> {
    let path = path.as_ref();
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .from_path(path)
        .with_context(|| format!("Failed to open protein links `{}`", path.display()))?;

    let mut proteins = ProteinCollection::new();
    let mut duplicates = 0;
    for (ix, row) in rdr.deserialize::<LinkRow>().enumerate() {
        let line = ix + 2;
        let row = row.with_context(|| format!("`{}` line {}", path.display(), line))?;
        let cleavage_state = match row.cleavage_state.as_deref() {
            Some(state) => state
                .parse::<CleavageState>()
                .map_err(anyhow::Error::msg)
                .with_context(|| format!("`{}` line {}", path.display(), line))?,
            None => CleavageState::Unknown,
        };
        let protein_id = proteins.add_or_get_protein(&row.protein);
        if !proteins.add_link(protein_id, FeatureId(row.peptide_id), cleavage_state) {
            duplicates += 1;
        }
    }

    if duplicates > 0 {
        log::warn!("ignored {} duplicate protein-peptide links", duplicates);
    }
    log::info!(
        "read {} proteins, {} links from {}",
        proteins.len(),
        proteins.links().len(),
        path.display()
    );
    Ok(proteins)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() -> anyhow::Result<()> {
        let input: Input = serde_json::from_str(
            r#"{
                "features": "features.tsv",
                "use_slic_score": true,
                "thresholds": [
                    { "mass_tolerance": 10.0 },
                    { "mass_tol_type": "absolute", "mass_tolerance": 0.01, "net_tolerance": 0.1 }
                ]
            }"#,
        )?;
        let search = input.build()?;

        assert!(search.write_matches);
        assert_eq!(search.settings.max_matches_per_feature, 3);
        assert_eq!(search.thresholds.len(), 2);
        assert_eq!(search.thresholds[0].mass_tol_type, MassTolType::Ppm);
        assert_eq!(search.thresholds[0].net_tolerance, 0.05);
        assert_eq!(search.thresholds[1].mass_tol_type, MassTolType::Absolute);
        assert!(search.thresholds.iter().all(|t| t.use_slic_score));
        Ok(())
    }

    #[test]
    fn invalid_global_settings_rejected() {
        let input: Input =
            serde_json::from_str(r#"{ "features": "x.tsv", "max_matches_per_feature": 0 }"#)
                .unwrap();
        assert!(input.build().is_err());

        let input: Input =
            serde_json::from_str(r#"{ "features": "x.tsv", "minimum_slic_score": 1.5 }"#).unwrap();
        assert!(input.build().is_err());
    }
}
