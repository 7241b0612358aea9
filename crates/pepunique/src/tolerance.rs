//! Translate a threshold level into a coarse mass window and a
//! per-candidate accept/reject decision.
//!
//! Two acceptance families exist:
//!
//! * Geometric: the candidate must fall inside a rectangle or an ellipse
//!   whose half-axes are the mass and NET tolerances.
//! * SLiC: mass and NET errors are converted to z-scores using the SLiC
//!   standard deviations; the candidate is accepted when its Euclidean
//!   z-distance does not exceed `slic_max_search_distance_multiplier`, and it
//!   is scored with the bivariate Gaussian similarity `exp(-d²/2)`.
//!
//! Mass errors are compared in the unit of the level's tolerance type: ppm
//! for [`MassTolType::Ppm`], Da for [`MassTolType::Absolute`]. The SLiC mass
//! standard deviation is interpreted in that same unit.

use crate::feature::{Feature, FeatureId};
use crate::mass::Tolerance;
use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MassTolType {
    Absolute,
    #[default]
    Ppm,
}

/// Shape of the geometric acceptance region
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    Rectangle,
    #[default]
    Ellipse,
}

impl Region {
    pub fn from_ellipse_flag(use_ellipse_region: bool) -> Self {
        if use_ellipse_region {
            Region::Ellipse
        } else {
            Region::Rectangle
        }
    }
}

/// One complete tolerance configuration ("threshold level")
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchThresholds {
    pub mass_tol_type: MassTolType,
    pub mass_tolerance: f64,
    pub net_tolerance: f64,
    pub use_slic_score: bool,
    pub slic_mass_ppm_stdev: f64,
    pub slic_net_stdev: f64,
    pub slic_use_amt_net_stdev: bool,
    pub slic_max_search_distance_multiplier: f32,
    pub auto_define_slic_thresholds: bool,
}

impl Default for SearchThresholds {
    fn default() -> Self {
        Self {
            mass_tol_type: MassTolType::Ppm,
            mass_tolerance: 5.0,
            net_tolerance: 0.05,
            use_slic_score: false,
            slic_mass_ppm_stdev: 3.0,
            slic_net_stdev: 0.025,
            slic_use_amt_net_stdev: false,
            slic_max_search_distance_multiplier: 2.0,
            auto_define_slic_thresholds: true,
        }
    }
}

impl SearchThresholds {
    pub fn mass_tolerance(&self) -> Tolerance {
        match self.mass_tol_type {
            MassTolType::Ppm => Tolerance::Ppm(self.mass_tolerance),
            MassTolType::Absolute => Tolerance::Da(self.mass_tolerance),
        }
    }

    /// Check that this level can be evaluated. Returns a description of the
    /// first problem found
    pub fn validate(&self) -> Result<(), String> {
        if !self.mass_tolerance.is_finite() || self.mass_tolerance < 0.0 {
            return Err(format!("mass tolerance {} is invalid", self.mass_tolerance));
        }
        if !self.net_tolerance.is_finite() || self.net_tolerance < 0.0 {
            return Err(format!("NET tolerance {} is invalid", self.net_tolerance));
        }
        let multiplier = self.slic_max_search_distance_multiplier;
        if !multiplier.is_finite() || multiplier <= 0.0 {
            return Err(format!(
                "SLiC search distance multiplier {} must be positive",
                multiplier
            ));
        }
        if self.use_slic_score && !self.auto_define_slic_thresholds {
            if !(self.slic_mass_ppm_stdev > 0.0) {
                return Err(format!(
                    "SLiC mass standard deviation {} must be positive",
                    self.slic_mass_ppm_stdev
                ));
            }
            if !self.slic_use_amt_net_stdev && !(self.slic_net_stdev > 0.0) {
                return Err(format!(
                    "SLiC NET standard deviation {} must be positive",
                    self.slic_net_stdev
                ));
            }
        }
        Ok(())
    }

    /// Derive the SLiC standard deviations from the tolerances, such that a
    /// z-distance equal to the search multiplier lands on the tolerance box
    pub fn define_slic_thresholds(&mut self) {
        let multiplier = f64::from(self.slic_max_search_distance_multiplier);
        if multiplier > 0.0 {
            self.slic_mass_ppm_stdev = self.mass_tolerance / multiplier;
            self.slic_net_stdev = self.net_tolerance / multiplier;
        }
    }
}

/// A comparison feature that passed the acceptance test for a query feature
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Candidate {
    pub matching_id: FeatureId,
    /// Candidate mass minus query mass, in Da
    pub mass_err: f64,
    /// Candidate NET minus query NET
    pub net_err: f64,
    pub slic_score: f64,
    /// Normalized distance: z-distance in SLiC mode, tolerance-normalized
    /// distance in geometric mode
    pub distance: f64,
}

#[derive(Clone, Debug)]
pub struct ToleranceEvaluator {
    thresholds: SearchThresholds,
    region: Region,
    tolerance: Tolerance,
    search: Tolerance,
}

impl ToleranceEvaluator {
    pub fn new(mut thresholds: SearchThresholds, region: Region) -> Self {
        if thresholds.use_slic_score && thresholds.auto_define_slic_thresholds {
            thresholds.define_slic_thresholds();
        }
        let tolerance = thresholds.mass_tolerance();

        // SLiC acceptance is softer than the tolerance box, so the coarse
        // window has to reach as far as the widest accepted z-distance
        let search = if thresholds.use_slic_score {
            let widest = tolerance.width().abs().max(thresholds.slic_mass_ppm_stdev.abs());
            let multiplier = f64::from(thresholds.slic_max_search_distance_multiplier).max(1.0);
            let widest = match tolerance {
                Tolerance::Ppm(_) => Tolerance::Ppm(widest),
                Tolerance::Da(_) => Tolerance::Da(widest),
            };
            widest * multiplier
        } else {
            tolerance
        };

        ToleranceEvaluator {
            thresholds,
            region,
            tolerance,
            search,
        }
    }

    pub fn thresholds(&self) -> &SearchThresholds {
        &self.thresholds
    }

    /// Coarse (`lower`, `upper`) mass window to pass to the range index
    pub fn window(&self, mass: f64) -> (f64, f64) {
        self.search.bounds(mass)
    }

    /// Decide whether `candidate` matches `query`, computing the error
    /// metrics and score if so
    pub fn evaluate(&self, query: &Feature, candidate: &Feature) -> Option<Candidate> {
        let mass_err = self.tolerance.error(query.mass, candidate.mass);
        let net_err = f64::from(candidate.net) - f64::from(query.net);

        let distance = if self.thresholds.use_slic_score {
            self.slic_distance(mass_err, net_err, candidate)?
        } else {
            self.geometric_distance(mass_err, net_err)?
        };

        Some(Candidate {
            matching_id: candidate.id,
            mass_err: candidate.mass - query.mass,
            net_err,
            slic_score: (-0.5 * distance * distance).exp(),
            distance,
        })
    }

    fn slic_distance(&self, mass_err: f64, net_err: f64, candidate: &Feature) -> Option<f64> {
        let mass_stdev = self.thresholds.slic_mass_ppm_stdev;
        let net_stdev = if self.thresholds.slic_use_amt_net_stdev {
            f64::from(candidate.net_stdev)
        } else {
            self.thresholds.slic_net_stdev
        };
        if mass_stdev <= 0.0 || net_stdev <= 0.0 {
            return None;
        }

        let z_mass = mass_err / mass_stdev;
        let z_net = net_err / net_stdev;
        let distance = (z_mass * z_mass + z_net * z_net).sqrt();

        match distance <= f64::from(self.thresholds.slic_max_search_distance_multiplier) {
            true => Some(distance),
            false => None,
        }
    }

    fn geometric_distance(&self, mass_err: f64, net_err: f64) -> Option<f64> {
        let mass_tol = self.thresholds.mass_tolerance;
        let net_tol = self.thresholds.net_tolerance;

        let accepted = match self.region {
            Region::Rectangle => mass_err.abs() <= mass_tol && net_err.abs() <= net_tol,
            Region::Ellipse => {
                let m = normalize(mass_err, mass_tol);
                let n = normalize(net_err, net_tol);
                m * m + n * n <= 1.0
            }
        };
        if !accepted {
            return None;
        }

        let m = normalize(mass_err, mass_tol);
        let n = normalize(net_err, net_tol);
        Some((m * m + n * n).sqrt())
    }
}

/// `err / tol`, with a zero tolerance only admitting a zero error
fn normalize(err: f64, tol: f64) -> f64 {
    if tol > 0.0 {
        err / tol
    } else if err == 0.0 {
        0.0
    } else {
        f64::INFINITY
    }
}
