//! Per-protein counts of uniquely identifiable peptides

use crate::binning::{Classified, Uniqueness};
use crate::feature::FeatureId;
use crate::protein::{ProteinCollection, ProteinId};
use fnv::FnvHashSet;
use serde::Serialize;
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProteinStats {
    pub protein_id: ProteinId,
    pub protein_name: Arc<str>,
    /// All peptides linked to the protein
    pub peptide_count_total: usize,
    /// Distinct linked peptides classified as unique
    pub peptide_count_uniquely_identifiable: usize,
}

/// Count, for every protein in `proteins`, how many of its peptides were
/// classified as unique. A peptide shared by several proteins counts once
/// for each of them. Rows are returned in protein id order
pub fn aggregate(classified: &[Classified], proteins: &ProteinCollection) -> Vec<ProteinStats> {
    let mut unique_pairs: FnvHashSet<(ProteinId, FeatureId)> = FnvHashSet::default();
    for feature in classified
        .iter()
        .filter(|c| c.uniqueness == Uniqueness::Unique)
    {
        for &protein_id in proteins.proteins_for_peptide(feature.feature_id) {
            unique_pairs.insert((protein_id, feature.feature_id));
        }
    }

    let mut unique_counts = vec![0usize; proteins.len()];
    for (protein_id, _) in &unique_pairs {
        // Ids are dense from 1
        unique_counts[protein_id.0 as usize - 1] += 1;
    }

    proteins
        .proteins()
        .iter()
        .zip(unique_counts)
        .map(|(protein, unique)| ProteinStats {
            protein_id: protein.id,
            protein_name: protein.name.clone(),
            peptide_count_total: proteins.peptide_count(protein.id),
            peptide_count_uniquely_identifiable: unique,
        })
        .collect()
}
