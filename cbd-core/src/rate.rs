//! Multi-rate execution.
//!
//! Every block runs at a positive integer multiple of the base step. A block with
//! rate `r` is due at step `n` iff `n mod r == 0`. Rates set on a composite apply to
//! every block inside it unless a block sets its own.

use crate::errors::{CbdError, CbdResult};
use crate::graph::FlatModel;
use crate::schedule::ExecUnit;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RateController {
    rates: BTreeMap<String, u32>,
}

impl RateController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_rate(&mut self, path: &str, rate: u32) -> CbdResult<()> {
        if rate == 0 {
            return Err(CbdError::InvalidRate {
                block: path.to_string(),
                rate,
            });
        }
        self.rates.insert(path.to_string(), rate);
        Ok(())
    }

    /// The rate of the leaf block at `path`, inherited from the closest configured ancestor.
    pub fn rate_of(&self, path: &str) -> u32 {
        let mut current = path;
        loop {
            if let Some(rate) = self.rates.get(current) {
                return *rate;
            }
            match current.rsplit_once('.') {
                Some((parent, _)) => current = parent,
                None => return 1,
            }
        }
    }

    pub fn is_due(&self, path: &str, step: usize) -> bool {
        step % self.rate_of(path) as usize == 0
    }

    /// The units of `units` that execute at `step`, in schedule order.
    ///
    /// A loop executes as a whole as soon as any of its members is due.
    pub fn due_units<'a>(
        &self,
        units: &'a [ExecUnit],
        model: &FlatModel,
        step: usize,
    ) -> Vec<&'a ExecUnit> {
        units
            .iter()
            .filter(|unit| {
                unit.members()
                    .iter()
                    .any(|idx| self.is_due(&model.block(*idx).path, step))
            })
            .collect()
    }

    /// Check that every configured path exists in `model`.
    pub fn validate(&self, model: &FlatModel) -> CbdResult<()> {
        for path in self.rates.keys() {
            if !model.contains_path(path) {
                return Err(CbdError::UnknownBlock(path.clone()));
            }
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &u32)> {
        self.rates.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::example_blocks::{TestConstant, TestGain};
    use crate::graph::ModelGraph;
    use crate::schedule::compute_schedule;

    #[test]
    fn zero_rate_is_invalid() {
        let mut rates = RateController::new();
        let err = rates.set_rate("a", 0).unwrap_err();
        assert!(err.is_structural());
        assert_eq!(
            err,
            CbdError::InvalidRate {
                block: "a".to_string(),
                rate: 0
            }
        );
    }

    #[test]
    fn inherited_rates() {
        let mut rates = RateController::new();
        rates.set_rate("sub", 3).unwrap();
        rates.set_rate("sub.fast", 1).unwrap();

        assert_eq!(rates.rate_of("other"), 1);
        assert_eq!(rates.rate_of("sub.slow"), 3);
        assert_eq!(rates.rate_of("sub.inner.slow"), 3);
        assert_eq!(rates.rate_of("sub.fast"), 1);
        assert!(rates.is_due("sub.slow", 6));
        assert!(!rates.is_due("sub.slow", 7));
    }

    #[test]
    fn due_units_keep_schedule_order() {
        let mut graph = ModelGraph::new("root");
        graph.add_block("c", TestConstant::new(1.0)).unwrap();
        graph.add_block("g1", TestGain::new(1.0)).unwrap();
        graph.add_block("g2", TestGain::new(1.0)).unwrap();
        graph.connect("c", "OUT1", "g1", "IN1").unwrap();
        graph.connect("g1", "OUT1", "g2", "IN1").unwrap();
        let schedule = compute_schedule(&graph).unwrap();

        let mut rates = RateController::new();
        rates.set_rate("g1", 2).unwrap();
        rates.validate(schedule.model()).unwrap();

        let names = |step| -> Vec<String> {
            rates
                .due_units(schedule.units(step), schedule.model(), step)
                .iter()
                .map(|u| schedule.model().block(u.members()[0]).path.clone())
                .collect()
        };
        assert_eq!(names(0), vec!["c", "g1", "g2"]);
        assert_eq!(names(1), vec!["c", "g2"]);
        assert_eq!(names(2), vec!["c", "g1", "g2"]);

        rates.set_rate("missing", 2).unwrap();
        assert!(rates.validate(schedule.model()).is_err());
    }
}
