use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::error::{DispatchError, DispatchResult};

/// Operating envelope of a single compressor unit.
///
/// `wmin` and `wmax` are the power draws at `qmin` and `qmax` while the unit
/// is running. Between the two corners power is assumed affine in flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Compressor {
    pub name: String,
    pub qmin: f64,
    pub qmax: f64,
    pub wmin: f64,
    pub wmax: f64,
}

impl Compressor {
    pub fn new(name: impl Into<String>, qmin: f64, qmax: f64, wmin: f64, wmax: f64) -> Self {
        Self {
            name: name.into(),
            qmin,
            qmax,
            wmin,
            wmax,
        }
    }

    /// Validate the envelope for use in an allocator
    pub fn validate(&self) -> DispatchResult<()> {
        let invalid = |reason: &str| DispatchError::InvalidCompressor {
            name: self.name.clone(),
            reason: reason.to_string(),
        };

        if self.name.trim().is_empty() {
            return Err(invalid("name cannot be empty"));
        }

        for (field, value) in [
            ("qmin", self.qmin),
            ("qmax", self.qmax),
            ("wmin", self.wmin),
            ("wmax", self.wmax),
        ] {
            if !value.is_finite() {
                return Err(invalid(&format!("{field} is not finite: {value}")));
            }
        }

        if self.qmin < 0.0 {
            return Err(invalid("qmin cannot be negative"));
        }

        if self.qmax == self.qmin {
            return Err(DispatchError::DegenerateEnvelope {
                name: self.name.clone(),
            });
        }

        if self.qmax < self.qmin {
            return Err(invalid("qmax must be greater than qmin"));
        }

        Ok(())
    }
}

/// Affine power model `power = alpha * flow + beta` of a running unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AffineCostModel {
    /// Marginal power per unit of flow
    pub alpha: f64,
    /// Intercept, chosen so the line passes through (qmin, wmin)
    pub beta: f64,
}

impl AffineCostModel {
    /// Power drawn at `flow` with the unit switched `on` or off.
    ///
    /// `beta - beta * (1 - on)` zeroes the intercept for an idle unit; with
    /// flow forced to 0 when off, an idle unit draws nothing.
    pub fn power(&self, flow: f64, on: bool) -> f64 {
        let on = if on { 1.0 } else { 0.0 };
        self.alpha * flow + self.beta - self.beta * (1.0 - on)
    }
}

impl TryFrom<&Compressor> for AffineCostModel {
    type Error = DispatchError;

    fn try_from(compressor: &Compressor) -> DispatchResult<Self> {
        let span = compressor.qmax - compressor.qmin;
        if span == 0.0 {
            return Err(DispatchError::DegenerateEnvelope {
                name: compressor.name.clone(),
            });
        }

        let alpha = (compressor.wmax - compressor.wmin) / span;
        let beta = compressor.wmin - compressor.qmin * alpha;
        Ok(Self { alpha, beta })
    }
}

/// Validate a whole fleet and derive one cost model per unit, in fleet order.
pub fn cost_models(fleet: &[Compressor]) -> DispatchResult<Vec<AffineCostModel>> {
    if fleet.is_empty() {
        return Err(DispatchError::EmptyFleet);
    }

    if let Some(name) = fleet.iter().map(|c| c.name.as_str()).duplicates().next() {
        return Err(DispatchError::DuplicateCompressor(name.to_string()));
    }

    fleet
        .iter()
        .map(|c| {
            c.validate()?;
            AffineCostModel::try_from(c)
        })
        .collect()
}

/// Total capacity of the fleet
pub fn total_capacity(fleet: &[Compressor]) -> f64 {
    fleet.iter().map(|c| c.qmax).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_affine_model_passes_through_corners() {
        let c = Compressor::new("K1", 2.0, 10.0, 30.0, 70.0);
        let model = AffineCostModel::try_from(&c).unwrap();

        assert!((model.alpha - 5.0).abs() < 1e-12);
        assert!((model.beta - 20.0).abs() < 1e-12);
        assert!((model.power(2.0, true) - 30.0).abs() < 1e-12);
        assert!((model.power(10.0, true) - 70.0).abs() < 1e-12);
    }

    #[test]
    fn test_idle_unit_draws_no_power() {
        let c = Compressor::new("K1", 2.0, 10.0, 30.0, 70.0);
        let model = AffineCostModel::try_from(&c).unwrap();
        assert_eq!(model.power(0.0, false), 0.0);
    }

    #[test]
    fn test_degenerate_envelope_rejected() {
        let c = Compressor::new("flat", 4.0, 4.0, 10.0, 12.0);
        assert_eq!(
            AffineCostModel::try_from(&c),
            Err(DispatchError::DegenerateEnvelope {
                name: "flat".to_string()
            })
        );
        assert!(matches!(
            c.validate(),
            Err(DispatchError::DegenerateEnvelope { .. })
        ));
    }

    #[test]
    fn test_validation() {
        assert!(Compressor::new("ok", 0.0, 5.0, 0.0, 10.0).validate().is_ok());
        assert!(Compressor::new("neg", -1.0, 5.0, 0.0, 10.0).validate().is_err());
        assert!(Compressor::new("inv", 6.0, 5.0, 0.0, 10.0).validate().is_err());
        assert!(Compressor::new("nan", 0.0, f64::NAN, 0.0, 10.0).validate().is_err());
        assert!(Compressor::new(" ", 0.0, 5.0, 0.0, 10.0).validate().is_err());
    }

    #[test]
    fn test_fleet_checks() {
        assert_eq!(cost_models(&[]), Err(DispatchError::EmptyFleet));

        let fleet = vec![
            Compressor::new("A", 1.0, 5.0, 10.0, 20.0),
            Compressor::new("A", 2.0, 8.0, 15.0, 40.0),
        ];
        assert_eq!(
            cost_models(&fleet),
            Err(DispatchError::DuplicateCompressor("A".to_string()))
        );
    }
}
