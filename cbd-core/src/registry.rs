//! The boundary between model descriptions and block implementations.
//!
//! A [`ModelDescription`] names blocks by type. A [`BlockRegistry`] maps each type name to a
//! factory that builds the block from its parameter table.

use crate::block::Block;
use crate::errors::{CbdError, CbdResult};
use crate::graph::ModelGraph;
use crate::interpolate::ReadPolicy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One `[[blocks]]` entry of a model description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub parameters: toml::Table,
}

impl BlockSpec {
    pub fn new(name: &str, kind: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: kind.to_string(),
            parameters: toml::Table::new(),
        }
    }

    pub fn with_parameter(mut self, name: &str, value: impl Into<toml::Value>) -> Self {
        self.parameters.insert(name.to_string(), value.into());
        self
    }

    fn invalid(&self, name: &str, expected: &str) -> CbdError {
        CbdError::Config(format!(
            "parameter {} of block {} must be {}",
            name, self.name, expected
        ))
    }

    /// A numeric parameter. Integers are accepted.
    pub fn float(&self, name: &str) -> CbdResult<f64> {
        match self.parameters.get(name) {
            Some(toml::Value::Float(v)) => Ok(*v),
            Some(toml::Value::Integer(v)) => Ok(*v as f64),
            Some(_) => Err(self.invalid(name, "a number")),
            None => Err(CbdError::UnknownParameter {
                block: self.name.clone(),
                name: name.to_string(),
            }),
        }
    }

    pub fn float_or(&self, name: &str, default: f64) -> CbdResult<f64> {
        match self.parameters.get(name) {
            None => Ok(default),
            Some(_) => self.float(name),
        }
    }

    pub fn integer_or(&self, name: &str, default: i64) -> CbdResult<i64> {
        match self.parameters.get(name) {
            None => Ok(default),
            Some(toml::Value::Integer(v)) => Ok(*v),
            Some(_) => Err(self.invalid(name, "an integer")),
        }
    }

    pub fn bool_or(&self, name: &str, default: bool) -> CbdResult<bool> {
        match self.parameters.get(name) {
            None => Ok(default),
            Some(toml::Value::Boolean(v)) => Ok(*v),
            Some(_) => Err(self.invalid(name, "a boolean")),
        }
    }

    pub fn string(&self, name: &str) -> CbdResult<String> {
        match self.parameters.get(name) {
            Some(toml::Value::String(v)) => Ok(v.clone()),
            Some(_) => Err(self.invalid(name, "a string")),
            None => Err(CbdError::UnknownParameter {
                block: self.name.clone(),
                name: name.to_string(),
            }),
        }
    }

    pub fn floats(&self, name: &str) -> CbdResult<Vec<f64>> {
        match self.parameters.get(name) {
            Some(toml::Value::Array(values)) => values
                .iter()
                .map(|v| match v {
                    toml::Value::Float(v) => Ok(*v),
                    toml::Value::Integer(v) => Ok(*v as f64),
                    _ => Err(self.invalid(name, "an array of numbers")),
                })
                .collect(),
            Some(_) => Err(self.invalid(name, "an array of numbers")),
            None => Err(CbdError::UnknownParameter {
                block: self.name.clone(),
                name: name.to_string(),
            }),
        }
    }
}

/// One `[[connections]]` entry, with endpoints written as `block.port`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionSpec {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub policy: ReadPolicy,
}

fn split_endpoint(endpoint: &str) -> CbdResult<(&str, &str)> {
    endpoint
        .rsplit_once('.')
        .filter(|(block, port)| !block.is_empty() && !port.is_empty())
        .ok_or_else(|| {
            CbdError::InvalidConnection(format!(
                "endpoint {} is not of the form block.port",
                endpoint
            ))
        })
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelDescription {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub blocks: Vec<BlockSpec>,
    #[serde(default)]
    pub connections: Vec<ConnectionSpec>,
}

impl ModelDescription {
    pub fn from_toml_str(text: &str) -> CbdResult<Self> {
        toml::from_str(text).map_err(|e| CbdError::Config(e.to_string()))
    }
}

pub type BlockFactory = Box<dyn Fn(&BlockSpec) -> CbdResult<Box<dyn Block>> + Send + Sync>;

/// Named block factories.
#[derive(Default)]
pub struct BlockRegistry {
    factories: BTreeMap<String, BlockFactory>,
}

impl fmt::Debug for BlockRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

impl BlockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `factory` under `kind`, replacing any previous factory of that name.
    pub fn register(
        &mut self,
        kind: &str,
        factory: impl Fn(&BlockSpec) -> CbdResult<Box<dyn Block>> + Send + Sync + 'static,
    ) -> &mut Self {
        self.factories.insert(kind.to_string(), Box::new(factory));
        self
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    pub fn kinds(&self) -> Vec<&str> {
        self.factories.keys().map(|k| k.as_str()).collect()
    }

    pub fn create(&self, spec: &BlockSpec) -> CbdResult<Box<dyn Block>> {
        let factory = self
            .factories
            .get(&spec.kind)
            .ok_or_else(|| CbdError::Config(format!("unknown block type {}", spec.kind)))?;
        factory(spec)
    }

    /// Instantiate every block of `description` and wire the connections.
    pub fn build(&self, description: &ModelDescription) -> CbdResult<ModelGraph> {
        let mut graph = ModelGraph::new(&description.name);
        for spec in &description.blocks {
            let block = self.create(spec)?;
            graph.add_boxed_block(&spec.name, block)?;
        }
        for connection in &description.connections {
            let (from, from_port) = split_endpoint(&connection.from)?;
            let (to, to_port) = split_endpoint(&connection.to)?;
            graph.connect_with_policy(from, from_port, to, to_port, connection.policy)?;
        }
        Ok(graph)
    }
}
