use fnv::FnvHashMap;
use serde::{Deserialize, Serialize};

/// Join key for peptide features. Unique within a [`FeatureCatalog`]
#[derive(Hash, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct FeatureId(pub u32);

impl std::fmt::Display for FeatureId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
/// A peptide characterized by monoisotopic mass and normalized elution time
pub struct Feature {
    pub id: FeatureId,
    pub name: String,
    /// Monoisotopic mass, always >= 0
    pub mass: f64,
    /// Normalized elution time
    pub net: f32,
    /// Standard deviation of the NET, 0 when unknown
    pub net_stdev: f32,
    pub discriminant_score: f32,
}

impl Feature {
    pub fn new(id: u32, mass: f64, net: f32) -> Self {
        Feature {
            id: FeatureId(id),
            name: String::new(),
            mass,
            net,
            net_stdev: 0.0,
            discriminant_score: 0.0,
        }
    }
}

/// Ordered collection of features keyed by [`FeatureId`]
///
/// Insertion order is preserved. Re-inserting an existing id replaces the
/// stored feature in place (last write wins). Every mutation bumps the
/// catalog generation, which is how a [`crate::index::RangeIndex`] detects
/// that it no longer describes the catalog it was built from.
#[derive(Clone, Debug, Default)]
pub struct FeatureCatalog {
    features: Vec<Feature>,
    lookup: FnvHashMap<FeatureId, usize>,
    generation: u64,
}

impl FeatureCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `feature`, replacing any feature with the same id.
    /// Negative or non-finite masses are clamped to 0.
    pub fn upsert(&mut self, mut feature: Feature) {
        if !feature.mass.is_finite() || feature.mass < 0.0 {
            log::warn!(
                "feature {} has invalid mass {}, storing as 0",
                feature.id,
                feature.mass
            );
            feature.mass = 0.0;
        }
        self.generation += 1;
        match self.lookup.get(&feature.id) {
            Some(&ix) => self.features[ix] = feature,
            None => {
                self.lookup.insert(feature.id, self.features.len());
                self.features.push(feature);
            }
        }
    }

    pub fn get(&self, id: FeatureId) -> Option<&Feature> {
        self.lookup.get(&id).map(|&ix| &self.features[ix])
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Feature> {
        self.features.iter()
    }

    pub fn as_slice(&self) -> &[Feature] {
        &self.features
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl FromIterator<Feature> for FeatureCatalog {
    fn from_iter<I: IntoIterator<Item = Feature>>(iter: I) -> Self {
        let mut catalog = FeatureCatalog::new();
        for feature in iter {
            catalog.upsert(feature);
        }
        catalog
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn last_write_wins() {
        let mut catalog = FeatureCatalog::new();
        catalog.upsert(Feature::new(7, 1000.0, 0.5));
        catalog.upsert(Feature::new(3, 800.0, 0.2));
        catalog.upsert(Feature::new(7, 1200.0, 0.6));

        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get(FeatureId(7)).map(|f| f.mass), Some(1200.0));
        // Replacement keeps the original position
        let ids = catalog.iter().map(|f| f.id.0).collect::<Vec<_>>();
        assert_eq!(ids, vec![7, 3]);
        assert_eq!(catalog.generation(), 3);
    }

    #[test]
    fn negative_mass_clamped() {
        let catalog = [Feature::new(1, -5.0, 0.1), Feature::new(2, f64::NAN, 0.1)]
            .into_iter()
            .collect::<FeatureCatalog>();
        assert!(catalog.iter().all(|f| f.mass == 0.0));
    }
}
