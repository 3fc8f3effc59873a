//! Run configuration loaded from TOML.
//!
//! ```toml
//! delta = 0.1
//! end_time = 10.0
//!
//! [solver]
//! kind = "fixed_point"
//! tolerance = 1e-10
//! max_iterations = 500
//!
//! [locator]
//! kind = "itp"
//!
//! [rates]
//! "plant.sensor" = 5
//! ```

use crate::errors::{CbdError, CbdResult};
use crate::events::{
    BisectionLocator, EventLocator, ItpLocator, LinearLocator, PostCrossingLocator,
    PreCrossingLocator, RegulaFalsiLocator,
};
use crate::loopsolvers::{FixedPointSolver, LinearSolver, LoopSolver};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

fn default_delta() -> f64 {
    0.1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimulationConfig {
    /// Base step size.
    #[serde(default = "default_delta")]
    pub delta: f64,
    #[serde(default)]
    pub start_time: f64,
    /// Without an end time the run only stops through its termination condition.
    #[serde(default)]
    pub end_time: Option<f64>,
    #[serde(default)]
    pub solver: SolverConfig,
    #[serde(default)]
    pub locator: LocatorConfig,
    #[serde(default)]
    pub realtime: Option<RealtimeConfig>,
    /// Block path to rate multiple.
    #[serde(default)]
    pub rates: BTreeMap<String, u32>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            delta: default_delta(),
            start_time: 0.0,
            end_time: None,
            solver: SolverConfig::default(),
            locator: LocatorConfig::default(),
            realtime: None,
            rates: BTreeMap::new(),
        }
    }
}

impl SimulationConfig {
    pub fn from_toml_str(text: &str) -> CbdResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| CbdError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> CbdResult<String> {
        toml::to_string(self).map_err(|e| CbdError::Config(e.to_string()))
    }

    pub fn validate(&self) -> CbdResult<()> {
        if !(self.delta.is_finite() && self.delta > 0.0) {
            return Err(CbdError::Config(format!(
                "delta must be positive, got {}",
                self.delta
            )));
        }
        if let Some(end) = self.end_time {
            if end < self.start_time {
                return Err(CbdError::Config(format!(
                    "end_time {} is before start_time {}",
                    end, self.start_time
                )));
            }
        }
        if let Some(realtime) = &self.realtime {
            if !(realtime.scale.is_finite() && realtime.scale > 0.0) {
                return Err(CbdError::Config(format!(
                    "realtime scale must be positive, got {}",
                    realtime.scale
                )));
            }
        }
        for (path, rate) in &self.rates {
            if *rate == 0 {
                return Err(CbdError::InvalidRate {
                    block: path.clone(),
                    rate: *rate,
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SolverConfig {
    FixedPoint {
        #[serde(default = "default_solver_tolerance")]
        tolerance: f64,
        #[serde(default = "default_solver_iterations")]
        max_iterations: usize,
    },
    Linear,
}

fn default_solver_tolerance() -> f64 {
    FixedPointSolver::default().tolerance
}

fn default_solver_iterations() -> usize {
    FixedPointSolver::default().max_iterations
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig::FixedPoint {
            tolerance: default_solver_tolerance(),
            max_iterations: default_solver_iterations(),
        }
    }
}

impl SolverConfig {
    pub fn build(&self) -> Box<dyn LoopSolver> {
        match self {
            SolverConfig::FixedPoint {
                tolerance,
                max_iterations,
            } => Box::new(FixedPointSolver::new(*tolerance, *max_iterations)),
            SolverConfig::Linear => Box::new(LinearSolver::new()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LocatorConfig {
    Pre,
    Post,
    Linear,
    Bisection {
        #[serde(default = "default_bisection_iterations")]
        max_iterations: usize,
    },
    RegulaFalsi {
        #[serde(default = "default_locator_tolerance")]
        tolerance: f64,
        #[serde(default = "default_regula_falsi_iterations")]
        max_iterations: usize,
    },
    Itp {
        #[serde(default = "default_locator_tolerance")]
        tolerance: f64,
        #[serde(default = "default_k1")]
        k1: f64,
        #[serde(default = "default_k2")]
        k2: f64,
        #[serde(default)]
        n0: u32,
    },
}

fn default_bisection_iterations() -> usize {
    BisectionLocator::default().max_iterations
}

fn default_locator_tolerance() -> f64 {
    1e-5
}

fn default_regula_falsi_iterations() -> usize {
    RegulaFalsiLocator::default().max_iterations
}

fn default_k1() -> f64 {
    ItpLocator::default().k1
}

fn default_k2() -> f64 {
    ItpLocator::default().k2
}

impl Default for LocatorConfig {
    fn default() -> Self {
        LocatorConfig::RegulaFalsi {
            tolerance: default_locator_tolerance(),
            max_iterations: default_regula_falsi_iterations(),
        }
    }
}

impl LocatorConfig {
    pub fn build(&self) -> Box<dyn EventLocator> {
        match self {
            LocatorConfig::Pre => Box::new(PreCrossingLocator),
            LocatorConfig::Post => Box::new(PostCrossingLocator),
            LocatorConfig::Linear => Box::new(LinearLocator),
            LocatorConfig::Bisection { max_iterations } => Box::new(BisectionLocator {
                max_iterations: *max_iterations,
            }),
            LocatorConfig::RegulaFalsi {
                tolerance,
                max_iterations,
            } => Box::new(RegulaFalsiLocator {
                tolerance: *tolerance,
                max_iterations: *max_iterations,
            }),
            LocatorConfig::Itp {
                tolerance,
                k1,
                k2,
                n0,
            } => Box::new(ItpLocator {
                tolerance: *tolerance,
                k1: *k1,
                k2: *k2,
                n0: *n0,
            }),
        }
    }
}

/// Wall-clock pacing of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Wall-clock seconds per simulated second.
    #[serde(default = "default_scale")]
    pub scale: f64,
    /// Number of late steps tolerated before pacing gives up and runs as fast as possible.
    #[serde(default = "default_max_overdue")]
    pub max_overdue: usize,
}

fn default_scale() -> f64 {
    1.0
}

fn default_max_overdue() -> usize {
    100
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            scale: default_scale(),
            max_overdue: default_max_overdue(),
        }
    }
}
