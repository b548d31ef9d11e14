//! Demand sweeps: the data side of comparing allocators across a range of
//! demands. Rendering is left to consumers of [`SweepReport`].

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::domain::AllocationResult;
use crate::optimizer::DispatchStrategy;

const GRID_TOLERANCE: f64 = 1e-9;

/// Evenly spaced, increasing demand values from `start` to `end` inclusive
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DemandGrid {
    pub start: f64,
    pub end: f64,
    pub step: f64,
}

impl DemandGrid {
    pub fn new(start: f64, end: f64, step: f64) -> Result<Self> {
        let grid = Self { start, end, step };
        grid.validate()?;
        Ok(grid)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.start.is_finite() && self.end.is_finite() && self.step.is_finite()) {
            anyhow::bail!("demand grid bounds must be finite");
        }
        if self.start < 0.0 {
            anyhow::bail!("demand grid cannot start below zero: {}", self.start);
        }
        if self.end < self.start {
            anyhow::bail!("demand grid end {} is before start {}", self.end, self.start);
        }
        if self.step <= 0.0 {
            anyhow::bail!("demand grid step must be positive: {}", self.step);
        }
        Ok(())
    }

    pub fn points(&self) -> Vec<f64> {
        let n = ((self.end - self.start) / self.step + GRID_TOLERANCE).floor() as usize;
        (0..=n).map(|k| self.start + k as f64 * self.step).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepPoint {
    pub demand: f64,
    pub result: AllocationResult,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepReport {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub strategy: String,
    pub points: Vec<SweepPoint>,
}

/// Power difference at one demand where both allocators succeeded
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerGap {
    pub demand: f64,
    pub optimal_power: f64,
    pub counterfactual_power: f64,
    pub gap: f64,
}

impl SweepReport {
    pub fn feasible_count(&self) -> usize {
        self.points.iter().filter(|p| p.result.success).count()
    }

    /// Compare two sweeps point by point; demands that do not line up or
    /// where either side failed are skipped.
    pub fn power_gap(optimal: &SweepReport, counterfactual: &SweepReport) -> Vec<PowerGap> {
        optimal
            .points
            .iter()
            .zip(&counterfactual.points)
            .filter(|(o, c)| (o.demand - c.demand).abs() < GRID_TOLERANCE)
            .filter_map(|(o, c)| {
                let optimal_power = o.result.total_power?;
                let counterfactual_power = c.result.total_power?;
                Some(PowerGap {
                    demand: o.demand,
                    optimal_power,
                    counterfactual_power,
                    gap: counterfactual_power - optimal_power,
                })
            })
            .collect()
    }
}

/// Solve every grid point in order against a single strategy instance.
pub fn run_sweep<S: DispatchStrategy + ?Sized>(
    strategy: &mut S,
    grid: &DemandGrid,
) -> Result<SweepReport> {
    grid.validate()?;

    let points = grid
        .points()
        .into_iter()
        .map(|demand| {
            let result = strategy
                .dispatch(demand)
                .with_context(|| format!("{} dispatch failed at demand {demand}", strategy.label()))?;
            Ok(SweepPoint { demand, result })
        })
        .collect::<Result<Vec<_>>>()?;

    let report = SweepReport {
        id: Uuid::new_v4(),
        created_at: Utc::now(),
        strategy: strategy.label().to_string(),
        points,
    };

    info!(
        strategy = %report.strategy,
        points = report.points.len(),
        feasible = report.feasible_count(),
        "demand sweep finished"
    );

    Ok(report)
}
