//! Pacing simulated time against wall-clock time.
//!
//! Every backend drives the same operation, [`Simulator::advance`]. They only differ in
//! who decides when the next step runs:
//!
//! - [`AsFastAsPossible`] never waits.
//! - [`BlockingPacer`] sleeps the calling thread until the step's deadline.
//! - [`spawn`] runs a paced simulation on a background thread.
//! - [`GameLoopDriver`] is pumped by an external loop (a UI or game loop) and catches up
//!   on every step whose deadline has passed.

use crate::config::RealtimeConfig;
use crate::errors::{CbdError, CbdResult};
use crate::simulator::{RunControl, SimulationState, Simulator};
use log::warn;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Decides when the step at a simulated time may run.
pub trait Synchronizer: Send {
    /// Anchor simulated time `sim_time` to the current wall-clock time.
    fn start(&mut self, sim_time: f64);

    /// Block until the step at `sim_time` is due.
    fn wait_until(&mut self, sim_time: f64);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AsFastAsPossible;

impl Synchronizer for AsFastAsPossible {
    fn start(&mut self, _sim_time: f64) {}

    fn wait_until(&mut self, _sim_time: f64) {}
}

/// Sleeps until `start + (t - t0) * scale` before the step at `t`.
///
/// Steps that are already late run immediately and are counted. Once `max_overdue`
/// steps ran late a warning is logged.
#[derive(Debug, Clone)]
pub struct BlockingPacer {
    scale: f64,
    max_overdue: usize,
    overdue: usize,
    origin: Option<(Instant, f64)>,
}

impl BlockingPacer {
    /// `scale` is the number of wall-clock seconds per simulated second.
    pub fn new(scale: f64) -> Self {
        Self {
            scale,
            max_overdue: RealtimeConfig::default().max_overdue,
            overdue: 0,
            origin: None,
        }
    }

    pub fn from_config(config: &RealtimeConfig) -> Self {
        Self {
            max_overdue: config.max_overdue,
            ..Self::new(config.scale)
        }
    }

    /// Number of steps that started after their deadline.
    pub fn overdue(&self) -> usize {
        self.overdue
    }

    fn deadline(&self, sim_time: f64) -> Option<Instant> {
        let (wall, t0) = self.origin?;
        let offset = (sim_time - t0) * self.scale;
        if offset.is_finite() && offset > 0.0 {
            Some(wall + Duration::from_secs_f64(offset))
        } else {
            Some(wall)
        }
    }
}

impl Synchronizer for BlockingPacer {
    fn start(&mut self, sim_time: f64) {
        self.origin = Some((Instant::now(), sim_time));
        self.overdue = 0;
    }

    fn wait_until(&mut self, sim_time: f64) {
        let Some(deadline) = self.deadline(sim_time) else {
            self.start(sim_time);
            return;
        };
        let now = Instant::now();
        if deadline > now {
            thread::sleep(deadline - now);
        } else if now - deadline > Duration::from_millis(1) {
            self.overdue += 1;
            if self.overdue == self.max_overdue {
                warn!(
                    "{} steps missed their real-time deadline. The model cannot keep up at scale {}",
                    self.overdue, self.scale
                );
            }
        }
    }
}

/// A simulation running on a background thread.
#[derive(Debug)]
pub struct RealtimeHandle {
    control: RunControl,
    handle: JoinHandle<Simulator>,
}

impl RealtimeHandle {
    pub fn control(&self) -> &RunControl {
        &self.control
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the run to end and take the simulator back.
    ///
    /// The outcome of the run is the simulator's [`state`](Simulator::state).
    pub fn join(self) -> CbdResult<Simulator> {
        self.handle
            .join()
            .map_err(|_| CbdError::Error("The simulation thread panicked".to_string()))
    }
}

/// Run `simulator` on a new thread, paced by `pacer`.
pub fn spawn(mut simulator: Simulator, mut pacer: impl Synchronizer + 'static) -> RealtimeHandle {
    let control = simulator.control();
    let handle = thread::spawn(move || {
        // Failures are recorded in the simulator's state
        let _ = simulator.run_paced(&mut pacer);
        simulator
    });
    RealtimeHandle { control, handle }
}

/// Advances a simulation from an externally driven loop.
///
/// The first call anchors simulated time to the wall-clock time passed in. Every later
/// call executes the steps whose deadline is at or before `now`.
#[derive(Debug, Clone)]
pub struct GameLoopDriver {
    scale: f64,
    origin: Option<(Instant, f64)>,
}

impl GameLoopDriver {
    pub fn new(scale: f64) -> Self {
        Self {
            scale,
            origin: None,
        }
    }

    /// Returns the number of steps executed.
    ///
    /// A paused simulation is left alone until [`Simulator::resume`] is called.
    pub fn pump(&mut self, simulator: &mut Simulator, now: Instant) -> CbdResult<usize> {
        if *simulator.state() == SimulationState::Paused {
            return Ok(0);
        }
        let (wall, t0) = *self.origin.get_or_insert((now, simulator.next_time()));
        let target = t0 + now.saturating_duration_since(wall).as_secs_f64() / self.scale;

        let mut steps = 0;
        while simulator.poll_control() && simulator.next_time() <= target {
            steps += 1;
            if simulator.advance()?.finished.is_some() {
                break;
            }
        }
        Ok(steps)
    }
}
