//! Root finders that locate a level crossing between two samples.
//!
//! Every locator receives the bracketing points `(time, value - level)` and a function
//! that evaluates the monitored signal (relative to the level) at any time in between
//! by running a micro-step of the model.

use crate::errors::CbdResult;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

use super::Direction;

/// Result of a locator run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Location {
    Found(f64),
    /// The root finder gave up. The caller reports the crossing at the later sample.
    Failed(&'static str),
}

pub type Evaluate<'f> = dyn FnMut(f64) -> CbdResult<f64> + 'f;

pub trait EventLocator: Debug + Send {
    fn locate(
        &self,
        lower: (f64, f64),
        upper: (f64, f64),
        direction: Direction,
        f: &mut Evaluate<'_>,
    ) -> CbdResult<Location>;
}

/// Reports the crossing at the earlier sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PreCrossingLocator;

impl EventLocator for PreCrossingLocator {
    fn locate(
        &self,
        lower: (f64, f64),
        _upper: (f64, f64),
        _direction: Direction,
        _f: &mut Evaluate<'_>,
    ) -> CbdResult<Location> {
        Ok(Location::Found(lower.0))
    }
}

/// Reports the crossing at the later sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PostCrossingLocator;

impl EventLocator for PostCrossingLocator {
    fn locate(
        &self,
        _lower: (f64, f64),
        upper: (f64, f64),
        _direction: Direction,
        _f: &mut Evaluate<'_>,
    ) -> CbdResult<Location> {
        Ok(Location::Found(upper.0))
    }
}

/// Interpolates linearly between the two samples without evaluating the model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LinearLocator;

impl EventLocator for LinearLocator {
    fn locate(
        &self,
        lower: (f64, f64),
        upper: (f64, f64),
        _direction: Direction,
        _f: &mut Evaluate<'_>,
    ) -> CbdResult<Location> {
        let (t1, y1) = lower;
        let (t2, y2) = upper;
        if y1 == y2 {
            return Ok(Location::Found(t1));
        }
        Ok(Location::Found(t1 - y1 * (t2 - t1) / (y2 - y1)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BisectionLocator {
    pub max_iterations: usize,
}

impl Default for BisectionLocator {
    fn default() -> Self {
        Self { max_iterations: 10 }
    }
}

impl EventLocator for BisectionLocator {
    fn locate(
        &self,
        lower: (f64, f64),
        upper: (f64, f64),
        direction: Direction,
        f: &mut Evaluate<'_>,
    ) -> CbdResult<Location> {
        let (mut a, mut b) = (lower, upper);
        for _ in 0..self.max_iterations {
            let tc = a.0 + (b.0 - a.0) / 2.0;
            let yc = f(tc)?;
            if direction.brackets(a.1, yc) {
                b = (tc, yc);
            } else if direction.brackets(yc, b.1) {
                a = (tc, yc);
            } else {
                return Ok(Location::Failed("crossing is not bracketed"));
            }
        }
        Ok(Location::Found(a.0 + (b.0 - a.0) / 2.0))
    }
}

/// Regula falsi with the Illinois modification.
///
/// Stops once the bracket is smaller than `tolerance` relative to the time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegulaFalsiLocator {
    pub tolerance: f64,
    pub max_iterations: usize,
}

impl Default for RegulaFalsiLocator {
    fn default() -> Self {
        Self {
            tolerance: 1e-5,
            max_iterations: 1000,
        }
    }
}

impl EventLocator for RegulaFalsiLocator {
    fn locate(
        &self,
        lower: (f64, f64),
        upper: (f64, f64),
        direction: Direction,
        f: &mut Evaluate<'_>,
    ) -> CbdResult<Location> {
        let (mut t1, mut y1) = lower;
        let (mut t2, mut y2) = upper;
        let mut tn = t1;
        // -1 when the upper end moved last, 1 when the lower end did
        let mut side = 0;

        for _ in 0..self.max_iterations {
            if (t2 - t1).abs() < self.tolerance * (t1.abs() + t2.abs()).max(1.0) {
                return Ok(Location::Found(tn));
            }
            tn = if (y1 - y2).abs() < self.tolerance {
                t1 + (t2 - t1) / 2.0
            } else {
                (y1 * t2 - y2 * t1) / (y1 - y2)
            };
            let yn = f(tn)?;
            if yn == 0.0 {
                return Ok(Location::Found(tn));
            }

            if direction.brackets(y1, yn) {
                t2 = tn;
                y2 = yn;
                if side == -1 {
                    y1 /= 2.0;
                }
                side = -1;
            } else if direction.brackets(yn, y2) {
                t1 = tn;
                y1 = yn;
                if side == 1 {
                    y2 /= 2.0;
                }
                side = 1;
            } else {
                return Ok(Location::Failed("crossing is not bracketed"));
            }
        }
        Ok(Location::Failed("iteration budget exhausted"))
    }
}

/// The Interpolate-Truncate-Project method.
///
/// `k1` must be positive, `k2` in `[1, 1 + golden ratio]` and `n0` is the slack on the
/// number of iterations compared to bisection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ItpLocator {
    pub tolerance: f64,
    pub k1: f64,
    pub k2: f64,
    pub n0: u32,
}

impl Default for ItpLocator {
    fn default() -> Self {
        Self {
            tolerance: 1e-5,
            k1: 0.1,
            k2: 1.5,
            n0: 0,
        }
    }
}

fn sign(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

impl EventLocator for ItpLocator {
    fn locate(
        &self,
        lower: (f64, f64),
        upper: (f64, f64),
        direction: Direction,
        f: &mut Evaluate<'_>,
    ) -> CbdResult<Location> {
        let eps = self.tolerance;
        let (mut a, mut ya) = lower;
        let (mut b, mut yb) = upper;
        if ya == 0.0 {
            return Ok(Location::Found(a));
        }
        if yb == 0.0 {
            return Ok(Location::Found(b));
        }

        let n_half = ((b - a) / (2.0 * eps)).log2().ceil().max(0.0);
        let n_max = n_half + self.n0 as f64;
        let mut j = 0.0;
        while (b - a) > 2.0 * eps {
            if j > n_max + 64.0 {
                return Ok(Location::Failed("iteration budget exhausted"));
            }
            let x_half = a + (b - a) / 2.0;
            let r = eps * 2f64.powf(n_max - j) - (b - a) / 2.0;
            let delta = self.k1 * (b - a).powf(self.k2);

            // Interpolation
            let x_f = if (yb - ya).abs() < eps {
                x_half
            } else {
                (yb * a - ya * b) / (yb - ya)
            };
            // Truncation
            let s = sign(x_half - x_f);
            let x_t = if delta <= (x_half - x_f).abs() {
                x_f + s * delta
            } else {
                x_half
            };
            // Projection
            let x_itp = if (x_t - x_half).abs() <= r {
                x_t
            } else {
                x_half - s * r
            };

            let y_itp = f(x_itp)?;
            if (ya - yb) * y_itp < 0.0 && direction.brackets(ya, y_itp) {
                b = x_itp;
                yb = y_itp;
            } else if (ya - yb) * y_itp > 0.0 && direction.brackets(y_itp, yb) {
                a = x_itp;
                ya = y_itp;
            } else if y_itp == 0.0 {
                a = x_itp;
                b = x_itp;
            } else {
                return Ok(Location::Failed("crossing is not bracketed"));
            }
            j += 1.0;
        }
        Ok(Location::Found((a + b) / 2.0))
    }
}
