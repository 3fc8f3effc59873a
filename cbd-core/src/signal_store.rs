//! Append-only storage of every output port's history.

use crate::errors::{CbdError, CbdResult};
use crate::interpolate::{read_samples, ReadPolicy, Sample};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Identifies a signal by the block path and output port that produce it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SignalId {
    pub block: String,
    pub port: String,
}

impl SignalId {
    pub fn new(block: &str, port: &str) -> Self {
        Self {
            block: block.to_string(),
            port: port.to_string(),
        }
    }
}

impl fmt::Display for SignalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.block, self.port)
    }
}

/// The history of a single output port.
///
/// Samples are strictly increasing in time and are never rewritten.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub id: SignalId,
    samples: Vec<Sample>,
}

impl Signal {
    pub fn new(id: SignalId) -> Self {
        Self {
            id,
            samples: vec![],
        }
    }

    pub fn append(&mut self, time: f64, value: f64) -> CbdResult<()> {
        let last = self.samples.last().map(|s| s.time);
        let increasing = match last {
            Some(last) => time > last,
            None => true,
        };
        if !time.is_finite() || !increasing {
            return Err(CbdError::NonMonotonicAppend {
                signal: self.id.to_string(),
                last: last.unwrap_or(f64::NEG_INFINITY),
                time,
            });
        }
        self.samples.push(Sample::new(time, value));
        Ok(())
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn last(&self) -> Option<Sample> {
        self.samples.last().copied()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn read(&self, time: f64, policy: ReadPolicy) -> CbdResult<f64> {
        read_samples(&self.samples, time, policy, &self.id.to_string())
    }
}

/// A collection of signals, one per output port of the flattened model.
///
/// The producing block is the only writer of a signal. Tracers, event detection and
/// other blocks only read.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<Signal>", into = "Vec<Signal>")]
pub struct SignalStore {
    signals: Vec<Signal>,
    index: HashMap<SignalId, usize>,
}

impl From<Vec<Signal>> for SignalStore {
    fn from(signals: Vec<Signal>) -> Self {
        let index = signals
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id.clone(), i))
            .collect();
        Self { signals, index }
    }
}

impl From<SignalStore> for Vec<Signal> {
    fn from(store: SignalStore) -> Self {
        store.signals
    }
}

impl SignalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensure that an (empty) signal exists for `id`.
    pub fn register(&mut self, id: &SignalId) {
        if !self.index.contains_key(id) {
            self.index.insert(id.clone(), self.signals.len());
            self.signals.push(Signal::new(id.clone()));
        }
    }

    /// Append a sample to a signal, creating the signal if needed.
    ///
    /// Fails if `time` is not finite or not strictly after the last stored sample.
    pub fn append(&mut self, id: &SignalId, time: f64, value: f64) -> CbdResult<()> {
        self.register(id);
        let idx = self.index[id];
        self.signals[idx].append(time, value)
    }

    pub fn get(&self, id: &SignalId) -> Option<&Signal> {
        self.index.get(id).map(|&i| &self.signals[i])
    }

    /// Read a signal at `time` using `policy`.
    pub fn read(&self, id: &SignalId, time: f64, policy: ReadPolicy) -> CbdResult<f64> {
        match self.get(id) {
            Some(signal) => signal.read(time, policy),
            None => Err(CbdError::NoSample {
                signal: id.to_string(),
                time,
            }),
        }
    }

    pub fn last(&self, id: &SignalId) -> Option<Sample> {
        self.get(id).and_then(|s| s.last())
    }

    /// The committed history of a signal, oldest sample first.
    pub fn history(&self, id: &SignalId) -> &[Sample] {
        self.get(id).map(|s| s.samples()).unwrap_or(&[])
    }

    /// Sample a signal on a fixed communication interval.
    ///
    /// Produces one sample at `start`, `start + interval`, ... up to and including `end`.
    pub fn resample(
        &self,
        id: &SignalId,
        start: f64,
        end: f64,
        interval: f64,
        policy: ReadPolicy,
    ) -> CbdResult<Vec<Sample>> {
        if interval <= 0.0 {
            return Err(CbdError::Config(format!(
                "communication interval must be positive, got {}",
                interval
            )));
        }
        let mut result = vec![];
        let mut k = 0u64;
        loop {
            let time = start + k as f64 * interval;
            if time > end + interval * 1e-9 {
                break;
            }
            result.push(Sample::new(time, self.read(id, time, policy)?));
            k += 1;
        }
        Ok(result)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Signal> {
        self.signals.iter()
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    /// Drop every sample while keeping the registered signals.
    pub fn clear(&mut self) {
        for signal in self.signals.iter_mut() {
            signal.samples.clear();
        }
    }
}
