use crate::feature::{Feature, FeatureCatalog};
use crate::Error;
use rayon::prelude::*;

/// Read-only view of a [`FeatureCatalog`] sorted by mass, supporting
/// "all features with mass in [lo, hi]" queries.
///
/// The index owns a sorted copy of the features, so it can be shared across
/// threads and reused for every threshold level of a run. It remembers the
/// catalog generation it was built from: use [`RangeIndex::ensure_current`]
/// before trusting it with a catalog that may have been modified since.
pub struct RangeIndex {
    features: Vec<Feature>,
    generation: u64,
}

impl RangeIndex {
    pub fn build(catalog: &FeatureCatalog) -> Self {
        let mut features = catalog.as_slice().to_vec();

        // Ties are ordered by id, so queries return candidates in a
        // deterministic order regardless of catalog insertion order
        features.par_sort_unstable_by(|a, b| a.mass.total_cmp(&b.mass).then(a.id.cmp(&b.id)));

        log::trace!("indexed {} features by mass", features.len());
        RangeIndex {
            features,
            generation: catalog.generation(),
        }
    }

    /// Fail fast if `catalog` has been modified after this index was built
    pub fn ensure_current(&self, catalog: &FeatureCatalog) -> Result<(), Error> {
        if catalog.generation() != self.generation || catalog.len() != self.features.len() {
            return Err(Error::StaleIndex {
                built: self.generation,
                current: catalog.generation(),
            });
        }
        Ok(())
    }

    /// All features with `lo <= mass <= hi`, in ascending mass order.
    /// A degenerate window (`lo > hi`, or NaN bounds) yields nothing
    pub fn query(&self, lo: f64, hi: f64) -> &[Feature] {
        if lo.is_nan() || hi.is_nan() || lo > hi {
            return &[];
        }
        let (left, right) = mass_bounds(&self.features, lo, hi);
        &self.features[left..right]
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// Return the exact `left` and `right` indices into a mass-sorted `slice`
/// such that `slice[left..right]` holds every feature with a mass in
/// `[low, high]`.
///
/// # Invariants
///
/// * `0 <= left <= right <= slice.len()`
/// * `slice[left - 1].mass < low` when `left > 0`
/// * `slice[right].mass > high` when `right < slice.len()`
#[inline]
pub fn mass_bounds(slice: &[Feature], low: f64, high: f64) -> (usize, usize) {
    let left = slice.partition_point(|f| f.mass < low);
    let right = left
        + slice[left..]
            .iter()
            .take_while(|f| f.mass <= high)
            .count();
    (left, right)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::feature::{Feature, FeatureId};
    use quickcheck_macros::quickcheck;

    fn catalog(masses: &[f64]) -> FeatureCatalog {
        masses
            .iter()
            .enumerate()
            .map(|(ix, &mass)| Feature::new(ix as u32, mass, 0.5))
            .collect()
    }

    #[test]
    fn range_query_smoke() {
        let index = RangeIndex::build(&catalog(&[4.0, 1.0, 2.5, 1.5, 3.0, 2.0, 3.5]));
        let masses = index
            .query(1.75, 3.5)
            .iter()
            .map(|f| f.mass)
            .collect::<Vec<_>>();
        assert_eq!(masses, vec![2.0, 2.5, 3.0, 3.5]);

        assert_eq!(index.query(0.0, 5.0).len(), 7);
        assert!(index.query(5.0, 6.0).is_empty());
        assert!(index.query(3.0, 2.0).is_empty());
        assert!(index.query(f64::NAN, 2.0).is_empty());
    }

    #[test]
    fn range_query_runs() {
        let index = RangeIndex::build(&catalog(&[
            1.0, 1.5, 1.5, 1.5, 1.5, 2.0, 2.5, 3.0, 3.0, 3.5, 4.0,
        ]));
        let hits = index.query(1.5, 3.0);
        assert_eq!(hits.len(), 8);
        assert!(hits.iter().all(|f| f.mass >= 1.5 && f.mass <= 3.0));
        // Equal masses are ordered by id
        let ids = hits[..4].iter().map(|f| f.id).collect::<Vec<_>>();
        assert_eq!(ids, vec![FeatureId(1), FeatureId(2), FeatureId(3), FeatureId(4)]);
    }

    #[test]
    fn stale_index_detected() {
        let mut cat = catalog(&[100.0, 200.0]);
        let index = RangeIndex::build(&cat);
        assert!(index.ensure_current(&cat).is_ok());

        cat.upsert(Feature::new(9, 300.0, 0.1));
        assert!(matches!(
            index.ensure_current(&cat),
            Err(Error::StaleIndex { .. })
        ));
    }

    #[quickcheck]
    fn query_matches_linear_scan(masses: Vec<u16>, lo: u16, width: u16) -> bool {
        let masses = masses.into_iter().map(f64::from).collect::<Vec<_>>();
        let index = RangeIndex::build(&catalog(&masses));
        let (lo, hi) = (f64::from(lo), f64::from(lo) + f64::from(width));

        let expected = masses.iter().filter(|&&m| m >= lo && m <= hi).count();
        let hits = index.query(lo, hi);
        hits.len() == expected && hits.iter().all(|f| f.mass >= lo && f.mass <= hi)
    }
}
