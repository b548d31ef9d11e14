use std::path::Path;

use anyhow::{Context, Result};
use figment::{providers::{Env, Format, Toml}, Figment};
use serde::Deserialize;

use crate::domain::Compressor;
use crate::error::DispatchResult;
use crate::optimizer::CounterfactualPolicy;
use crate::sweep::DemandGrid;

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";
pub const ENV_PREFIX: &str = "CDISP__";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub fleet: FleetConfig,
    pub sweep: DemandGrid,
    pub counterfactual: CounterfactualConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FleetConfig {
    pub compressors: Vec<Compressor>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CounterfactualConfig {
    /// Selector, `sequence`/`1` or `proportional`/`2`
    pub policy: String,
    /// Preferred order for the sequence policy; empty means fleet order
    #[serde(default)]
    pub sequence: Vec<String>,
}

impl CounterfactualConfig {
    pub fn policy(&self, fleet: &[Compressor]) -> DispatchResult<CounterfactualPolicy> {
        let sequence = if self.sequence.is_empty() {
            fleet.iter().map(|c| c.name.clone()).collect()
        } else {
            self.sequence.clone()
        };
        CounterfactualPolicy::from_selector(&self.policy, &sequence)
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::from_path(DEFAULT_CONFIG_PATH)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        Self::from_figment(Figment::new().merge(Toml::file(path)))
            .with_context(|| format!("loading configuration from {}", path.display()))
    }

    fn from_figment(base: Figment) -> Result<Self> {
        let figment = base.merge(Env::prefixed(ENV_PREFIX).split("__"));
        let config: Self = figment.extract()?;
        config.sweep.validate()?;
        Ok(config)
    }
}
