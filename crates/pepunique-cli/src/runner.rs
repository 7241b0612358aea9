use crate::input::{read_features, read_protein_links, Search};
use crate::output::TsvSink;
use anyhow::Context;
use log::info;
use pepunique_core::driver::{LogObserver, UniquenessStatsDriver};
use pepunique_core::feature::FeatureCatalog;
use pepunique_core::protein::ProteinCollection;
use std::path::PathBuf;
use std::time::Instant;

fn same_file(a: &str, b: &str) -> bool {
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

pub struct Runner {
    parameters: Search,
    targets: FeatureCatalog,
    comparisons: Option<FeatureCatalog>,
    proteins: Option<ProteinCollection>,
    start: Instant,
}

impl Runner {
    pub fn new(parameters: Search) -> anyhow::Result<Self> {
        let start = Instant::now();
        let targets = read_features(&parameters.features)?;
        let comparisons = parameters
            .comparison_features
            .as_ref()
            .filter(|path| !same_file(path, &parameters.features))
            .map(read_features)
            .transpose()?;
        if parameters.comparison_features.is_some() && comparisons.is_none() {
            info!("comparison features are the features to identify, excluding self-matches");
        }
        let proteins = parameters
            .protein_links
            .as_ref()
            .map(read_protein_links)
            .transpose()?;

        info!("loaded inputs in {:#?}", start.elapsed());
        Ok(Self {
            parameters,
            targets,
            comparisons,
            proteins,
            start,
        })
    }

    // Create a path for `file_name` in the output directory
    fn make_path<S: AsRef<str>>(&self, file_name: S) -> PathBuf {
        self.parameters.output_directory.join(file_name.as_ref())
    }

    /// Run every threshold level and write the results, returning the
    /// parameters as echoed to `results.json`
    pub fn run(mut self) -> anyhow::Result<Search> {
        let mut sink = TsvSink::new(
            &self.parameters.output_directory,
            self.parameters.write_matches,
        );
        let mut driver = UniquenessStatsDriver::new(
            self.parameters.settings,
            self.parameters.thresholds.clone(),
            &LogObserver,
        );

        let summaries = driver
            .generate_uniqueness_stats(
                &self.targets,
                self.comparisons.as_ref(),
                self.proteins.as_ref(),
                &mut sink,
            )
            .context("Failed to compute uniqueness statistics")?;

        self.parameters.output_paths.extend(
            sink.finish()?
                .into_iter()
                .map(|path| path.display().to_string()),
        );
        self.parameters.summaries = summaries;

        let path = self.make_path("results.json");
        self.parameters.output_paths.push(path.display().to_string());
        println!("{}", serde_json::to_string_pretty(&self.parameters)?);

        let bytes = serde_json::to_vec_pretty(&self.parameters)?;
        std::fs::write(&path, bytes)
            .with_context(|| format!("Failed to write `{}`", path.display()))?;

        info!("finished in {}s", self.start.elapsed().as_secs());
        Ok(self.parameters)
    }
}
