use crate::feature::FeatureId;
use fnv::{FnvHashMap, FnvHashSet};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Protein identifier, assigned densely from 1 in order of first appearance
#[derive(Hash, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct ProteinId(pub u32);

impl std::fmt::Display for ProteinId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// How a peptide arises from enzymatic cleavage of its parent protein
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CleavageState {
    #[default]
    Unknown,
    NonSpecific,
    Partial,
    Full,
}

impl std::str::FromStr for CleavageState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "unknown" => Ok(CleavageState::Unknown),
            "nonspecific" | "non-specific" | "non_specific" => Ok(CleavageState::NonSpecific),
            "partial" => Ok(CleavageState::Partial),
            "full" => Ok(CleavageState::Full),
            other => Err(format!("unrecognized cleavage state `{}`", other)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Protein {
    pub id: ProteinId,
    pub name: Arc<str>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProteinPeptideLink {
    pub protein_id: ProteinId,
    pub peptide_id: FeatureId,
    pub cleavage_state: CleavageState,
}

/// Protein table plus a deduplicated many-to-many protein <-> peptide map
#[derive(Clone, Debug, Default)]
pub struct ProteinCollection {
    proteins: Vec<Protein>,
    by_name: FnvHashMap<Arc<str>, ProteinId>,
    links: Vec<ProteinPeptideLink>,
    seen: FnvHashSet<(ProteinId, FeatureId)>,
    by_peptide: FnvHashMap<FeatureId, Vec<ProteinId>>,
    peptide_counts: Vec<usize>,
}

impl ProteinCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a protein by name, registering it if it is new
    pub fn add_or_get_protein(&mut self, name: &str) -> ProteinId {
        if let Some(&id) = self.by_name.get(name) {
            return id;
        }
        let id = ProteinId(self.proteins.len() as u32 + 1);
        let name: Arc<str> = Arc::from(name);
        self.by_name.insert(name.clone(), id);
        self.proteins.push(Protein { id, name });
        self.peptide_counts.push(0);
        id
    }

    /// Record that `peptide_id` belongs to `protein_id`. A pair is only
    /// recorded once; later links for the same pair are ignored and `false`
    /// is returned
    pub fn add_link(
        &mut self,
        protein_id: ProteinId,
        peptide_id: FeatureId,
        cleavage_state: CleavageState,
    ) -> bool {
        if self.index(protein_id).is_none() || !self.seen.insert((protein_id, peptide_id)) {
            return false;
        }
        self.links.push(ProteinPeptideLink {
            protein_id,
            peptide_id,
            cleavage_state,
        });
        self.by_peptide.entry(peptide_id).or_default().push(protein_id);
        if let Some(ix) = self.index(protein_id) {
            self.peptide_counts[ix] += 1;
        }
        true
    }

    /// Resolve `protein_name` and link it to `peptide_id`
    pub fn add_mapping(
        &mut self,
        protein_name: &str,
        peptide_id: FeatureId,
        cleavage_state: CleavageState,
    ) -> ProteinId {
        let id = self.add_or_get_protein(protein_name);
        self.add_link(id, peptide_id, cleavage_state);
        id
    }

    fn index(&self, id: ProteinId) -> Option<usize> {
        let ix = (id.0 as usize).checked_sub(1)?;
        (ix < self.proteins.len()).then_some(ix)
    }

    pub fn proteins(&self) -> &[Protein] {
        &self.proteins
    }

    pub fn links(&self) -> &[ProteinPeptideLink] {
        &self.links
    }

    /// Proteins a peptide maps to, in link order
    pub fn proteins_for_peptide(&self, peptide_id: FeatureId) -> &[ProteinId] {
        self.by_peptide
            .get(&peptide_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Number of distinct peptides linked to a protein
    pub fn peptide_count(&self, id: ProteinId) -> usize {
        self.index(id)
            .map(|ix| self.peptide_counts[ix])
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.proteins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proteins.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn dense_ids_and_lookup() {
        let mut proteins = ProteinCollection::new();
        let a = proteins.add_or_get_protein("sp|P1");
        let b = proteins.add_or_get_protein("sp|P2");
        assert_eq!(a, ProteinId(1));
        assert_eq!(b, ProteinId(2));
        assert_eq!(proteins.add_or_get_protein("sp|P1"), a);
        assert_eq!(proteins.len(), 2);
        assert_eq!(&*proteins.proteins()[1].name, "sp|P2");
        assert_eq!(proteins.peptide_count(ProteinId(0)), 0);
        assert_eq!(proteins.peptide_count(ProteinId(3)), 0);
    }

    #[test]
    fn links_deduplicated() {
        let mut proteins = ProteinCollection::new();
        let a = proteins.add_mapping("A", FeatureId(10), CleavageState::Full);
        proteins.add_mapping("A", FeatureId(10), CleavageState::Partial);
        proteins.add_mapping("A", FeatureId(11), CleavageState::Full);
        let b = proteins.add_mapping("B", FeatureId(10), CleavageState::Unknown);

        assert_eq!(proteins.links().len(), 3);
        assert_eq!(proteins.links()[0].cleavage_state, CleavageState::Full);
        assert_eq!(proteins.peptide_count(a), 2);
        assert_eq!(proteins.peptide_count(b), 1);
        assert_eq!(proteins.proteins_for_peptide(FeatureId(10)), &[a, b]);
        assert!(proteins.proteins_for_peptide(FeatureId(12)).is_empty());

        // Links to unknown proteins are refused
        assert!(!proteins.add_link(ProteinId(42), FeatureId(1), CleavageState::Full));
    }

    #[test]
    fn cleavage_states() {
        assert_eq!("Full".parse(), Ok(CleavageState::Full));
        assert_eq!("".parse(), Ok(CleavageState::Unknown));
        assert_eq!("non-specific".parse(), Ok(CleavageState::NonSpecific));
        assert!("tryptic".parse::<CleavageState>().is_err());
    }
}
