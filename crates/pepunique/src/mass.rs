use std::ops::Mul;

use serde::{Deserialize, Serialize};

/// Symmetric mass tolerance around a monoisotopic mass
#[derive(Copy, Clone, Serialize, Deserialize, Debug, PartialEq, PartialOrd)]
#[serde(rename_all = "lowercase")]
pub enum Tolerance {
    Ppm(f64),
    Da(f64),
}

impl Tolerance {
    /// Half-width of the window, in Da, centered on `center`
    pub fn delta(&self, center: f64) -> f64 {
        match self {
            Tolerance::Ppm(ppm) => Self::ppm_to_delta_mass(center, *ppm),
            Tolerance::Da(da) => *da,
        }
    }

    /// Compute the (`lower`, `upper`) window (in Da) for a monoisotopic
    /// mass and a given tolerance
    pub fn bounds(&self, center: f64) -> (f64, f64) {
        let delta = self.delta(center).abs();
        (center - delta, center + delta)
    }

    /// Signed error of `observed` relative to `reference`, expressed in the
    /// same unit as this tolerance (ppm or Da)
    pub fn error(&self, reference: f64, observed: f64) -> f64 {
        match self {
            Tolerance::Ppm(_) => ppm_error(reference, observed),
            Tolerance::Da(_) => observed - reference,
        }
    }

    /// The tolerance value itself, in its own unit
    pub fn width(&self) -> f64 {
        match self {
            Tolerance::Ppm(x) | Tolerance::Da(x) => *x,
        }
    }

    pub fn ppm_to_delta_mass(center: f64, ppm: f64) -> f64 {
        ppm * center / 1_000_000.0
    }
}

impl Mul<f64> for Tolerance {
    type Output = Tolerance;

    fn mul(self, rhs: f64) -> Self::Output {
        match self {
            Tolerance::Ppm(x) => Tolerance::Ppm(x * rhs),
            Tolerance::Da(x) => Tolerance::Da(x * rhs),
        }
    }
}

/// Mass error in parts-per-million. A zero reference mass yields 0
pub fn ppm_error(reference: f64, observed: f64) -> f64 {
    if reference == 0.0 {
        return 0.0;
    }
    (observed - reference) / reference * 1_000_000.0
}

#[cfg(test)]
mod test {
    use super::{ppm_error, Tolerance};

    fn close(a: (f64, f64), b: (f64, f64)) -> bool {
        (a.0 - b.0).abs() < 1e-9 && (a.1 - b.1).abs() < 1e-9
    }

    #[test]
    fn tolerances() {
        assert!(close(Tolerance::Ppm(10.0).bounds(1000.0), (999.99, 1000.01)));
        assert!(close(
            Tolerance::Ppm(10.0).bounds(487.0),
            (486.99513, 487.00487)
        ));
        assert!(close(Tolerance::Da(0.5).bounds(1000.0), (999.5, 1000.5)));
        // Negative tolerances describe the same symmetric window
        assert!(close(Tolerance::Da(-0.5).bounds(1000.0), (999.5, 1000.5)));
    }

    #[test]
    fn widening() {
        let tol = Tolerance::Ppm(5.0) * 2.0;
        assert_eq!(tol, Tolerance::Ppm(10.0));
        assert!(close(tol.bounds(1000.0), (999.99, 1000.01)));
    }

    #[test]
    fn errors() {
        assert!((ppm_error(1000.0, 1000.0005) - 0.5).abs() < 1e-6);
        assert_eq!(ppm_error(0.0, 12.0), 0.0);
        assert!((Tolerance::Da(1.0).error(1000.0, 1000.25) - 0.25).abs() < 1e-12);
    }
}
