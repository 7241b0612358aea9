use pepunique_core::binning::BinnedStats;
use pepunique_core::driver::ResultSink;
use pepunique_core::identifiability::ProteinStats;
use pepunique_core::matching::{FeatureMatches, MatchResultSet};
use pepunique_core::Error;
use std::fs::File;
use std::path::{Path, PathBuf};

pub const MATCHES_FILE: &str = "matches.tsv";
pub const BINS_FILE: &str = "uniqueness_bins.tsv";
pub const PROTEINS_FILE: &str = "protein_stats.tsv";

type Writer = csv::Writer<File>;

fn io(e: csv::Error) -> Error {
    Error::Io(e.into())
}

/// Writes the rows of every threshold level into three tab-separated files.
/// Files are created on first use, so a run without protein links produces
/// no protein file
pub struct TsvSink {
    directory: PathBuf,
    write_matches: bool,
    matches: Option<Writer>,
    bins: Option<Writer>,
    proteins: Option<Writer>,
    paths: Vec<PathBuf>,
}

impl TsvSink {
    pub fn new<P: AsRef<Path>>(directory: P, write_matches: bool) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
            write_matches,
            matches: None,
            bins: None,
            proteins: None,
            paths: Vec::new(),
        }
    }

    fn open(
        directory: &Path,
        paths: &mut Vec<PathBuf>,
        file_name: &str,
        headers: csv::ByteRecord,
    ) -> Result<Writer, Error> {
        let path = directory.join(file_name);
        let mut wtr = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_path(&path)
            .map_err(io)?;
        wtr.write_byte_record(&headers).map_err(io)?;
        paths.push(path);
        Ok(wtr)
    }

    fn serialize_matches(level: usize, entry: &FeatureMatches) -> Vec<csv::ByteRecord> {
        entry
            .matches
            .iter()
            .map(|m| {
                let mut record = csv::ByteRecord::new();
                record.push_field(itoa::Buffer::new().format(level).as_bytes());
                record.push_field(itoa::Buffer::new().format(m.feature_id.0).as_bytes());
                record.push_field(itoa::Buffer::new().format(entry.matches.len()).as_bytes());
                record.push_field(
                    itoa::Buffer::new()
                        .format(m.multi_amt_hit_count)
                        .as_bytes(),
                );
                record.push_field(itoa::Buffer::new().format(m.matching_id.0).as_bytes());
                record.push_field(ryu::Buffer::new().format(m.mass_err).as_bytes());
                record.push_field(ryu::Buffer::new().format(m.net_err).as_bytes());
                record.push_field(ryu::Buffer::new().format(m.slic_score).as_bytes());
                record.push_field(ryu::Buffer::new().format(m.del_slic).as_bytes());
                record
            })
            .collect()
    }

    fn bin_headers(histogram_len: usize) -> csv::ByteRecord {
        let mut headers = csv::ByteRecord::from(vec![
            "threshold_index",
            "bin_start_mass",
            "bin_end_mass",
            "percent_unique",
            "peptide_count_total",
            "unique_count",
            "non_unique_count",
        ]);
        for n in 1..=histogram_len {
            match n == histogram_len {
                true => headers.push_field(format!("matches_{}_or_more", n).as_bytes()),
                false => headers.push_field(format!("matches_{}", n).as_bytes()),
            }
        }
        headers
    }

    /// Flush all open files and return the paths written
    pub fn finish(self) -> Result<Vec<PathBuf>, Error> {
        for mut wtr in [self.matches, self.bins, self.proteins].into_iter().flatten() {
            wtr.flush()?;
        }
        Ok(self.paths)
    }
}

impl ResultSink for TsvSink {
    fn write_matches(&mut self, level: usize, results: &MatchResultSet) -> Result<(), Error> {
        if !self.write_matches {
            return Ok(());
        }
        if self.matches.is_none() {
            let headers = csv::ByteRecord::from(vec![
                "threshold_index",
                "feature_id",
                "match_count",
                "multi_amt_hit_count",
                "matching_id",
                "mass_err",
                "net_err",
                "slic_score",
                "del_slic",
            ]);
            self.matches = Some(Self::open(
                &self.directory,
                &mut self.paths,
                MATCHES_FILE,
                headers,
            )?);
        }

        if let Some(wtr) = &mut self.matches {
            for entry in results.iter() {
                for record in Self::serialize_matches(level, entry) {
                    wtr.write_byte_record(&record).map_err(io)?;
                }
            }
        }
        Ok(())
    }

    fn write_bins(&mut self, level: usize, stats: &BinnedStats) -> Result<(), Error> {
        if self.bins.is_none() {
            let headers = Self::bin_headers(stats.histogram_len());
            self.bins = Some(Self::open(
                &self.directory,
                &mut self.paths,
                BINS_FILE,
                headers,
            )?);
        }
        let wtr = match &mut self.bins {
            Some(wtr) => wtr,
            None => return Ok(()),
        };

        for bin in &stats.bins {
            let mut record = csv::ByteRecord::new();
            record.push_field(itoa::Buffer::new().format(level).as_bytes());
            record.push_field(ryu::Buffer::new().format(bin.mass_bin_start).as_bytes());
            record.push_field(ryu::Buffer::new().format(bin.mass_bin_end).as_bytes());
            record.push_field(ryu::Buffer::new().format(bin.percent_unique()).as_bytes());
            record.push_field(
                itoa::Buffer::new()
                    .format(bin.peptide_count_total())
                    .as_bytes(),
            );
            record.push_field(itoa::Buffer::new().format(bin.unique_count).as_bytes());
            record.push_field(itoa::Buffer::new().format(bin.non_unique_count).as_bytes());
            for count in &bin.match_count_histogram {
                record.push_field(itoa::Buffer::new().format(*count).as_bytes());
            }
            wtr.write_byte_record(&record).map_err(io)?;
        }
        Ok(())
    }

    fn write_proteins(&mut self, level: usize, stats: &[ProteinStats]) -> Result<(), Error> {
        if self.proteins.is_none() {
            let headers = csv::ByteRecord::from(vec![
                "threshold_index",
                "protein_name",
                "protein_id",
                "peptide_count_total",
                "peptide_count_uniquely_identifiable",
            ]);
            self.proteins = Some(Self::open(
                &self.directory,
                &mut self.paths,
                PROTEINS_FILE,
                headers,
            )?);
        }
        let wtr = match &mut self.proteins {
            Some(wtr) => wtr,
            None => return Ok(()),
        };

        for row in stats {
            let mut record = csv::ByteRecord::new();
            record.push_field(itoa::Buffer::new().format(level).as_bytes());
            record.push_field(row.protein_name.as_bytes());
            record.push_field(itoa::Buffer::new().format(row.protein_id.0).as_bytes());
            record.push_field(
                itoa::Buffer::new()
                    .format(row.peptide_count_total)
                    .as_bytes(),
            );
            record.push_field(
                itoa::Buffer::new()
                    .format(row.peptide_count_uniquely_identifiable)
                    .as_bytes(),
            );
            wtr.write_byte_record(&record).map_err(io)?;
        }
        Ok(())
    }
}
