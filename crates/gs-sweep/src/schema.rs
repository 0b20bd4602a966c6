//! Declared experiment outputs and enforcement of the returned shape.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use gs_types::{config_error, GsResult, Outcome, OutcomeShape, Value, ValueKind};

use crate::grid::{is_reserved, GridSpace};

/// One declared output of the experiment function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputDecl {
    pub name: String,
    pub kind: ValueKind,
}

/// The set of outputs an experiment is expected to produce.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReturnSchema {
    pub outputs: Vec<OutputDecl>,
}

impl ReturnSchema {
    pub fn new() -> Self {
        Self {
            outputs: Vec::new(),
        }
    }

    pub fn with_output(mut self, name: impl Into<String>, kind: ValueKind) -> Self {
        self.outputs.push(OutputDecl {
            name: name.into(),
            kind,
        });
        self
    }

    pub fn names(&self) -> Vec<String> {
        self.outputs.iter().map(|o| o.name.clone()).collect()
    }

    pub fn kind_of(&self, name: &str) -> Option<ValueKind> {
        self.outputs.iter().find(|o| o.name == name).map(|o| o.kind)
    }

    /// Check output names against reserved names and grid dimensions.
    pub fn validate(&self, grid: &GridSpace) -> GsResult<()> {
        let mut seen = HashSet::new();
        for output in &self.outputs {
            if is_reserved(&output.name) {
                return Err(config_error!("Output name '{}' is reserved", output.name));
            }
            if grid.contains_dim(&output.name) {
                return Err(config_error!(
                    "Output '{}' has the same name as a parameter",
                    output.name
                ));
            }
            if !seen.insert(output.name.as_str()) {
                return Err(config_error!("Output '{}' is declared twice", output.name));
            }
        }
        Ok(())
    }
}

/// Why an outcome could not be recorded.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaViolation {
    /// The declared schema cannot describe what the experiment returns.
    Structural(String),
    /// This particular outcome is malformed.
    Malformed(String),
}

/// Shape facts fixed by the first successful outcome of a run.
#[derive(Debug, Clone, Default)]
pub struct ShapeLock {
    shape: Option<OutcomeShape>,
    array_dims: BTreeMap<String, Vec<String>>,
}

impl ShapeLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn locked_shape(&self) -> Option<OutcomeShape> {
        self.shape
    }

    /// Validate `outcome` and flatten it into cell results.
    ///
    /// A mismatch on the first success is structural; afterwards it only
    /// affects the offending cell. Array dimensions that collide with grid
    /// dimensions are always structural.
    pub fn resolve(
        &mut self,
        schema: &ReturnSchema,
        grid: &GridSpace,
        outcome: Outcome,
    ) -> Result<BTreeMap<String, Value>, SchemaViolation> {
        let shape = outcome.shape();
        let first = self.shape.is_none();

        if let Some(locked) = self.shape {
            if locked != shape {
                return Err(SchemaViolation::Malformed(format!(
                    "experiment returned {shape}, earlier runs returned {locked}"
                )));
            }
        }

        let mut results = outcome.into_results();
        for (name, value) in results.iter_mut() {
            let shared_dim = value
                .as_array()
                .and_then(|array| array.dims().iter().find(|d| grid.contains_dim(d)));
            if let Some(dim) = shared_dim {
                return Err(SchemaViolation::Structural(format!(
                    "array output '{name}' uses dimension '{dim}' which is a parameter name"
                )));
            }
            if let Err(message) = self.check_value(schema, name, value) {
                return Err(if first {
                    SchemaViolation::Structural(message)
                } else {
                    SchemaViolation::Malformed(message)
                });
            }
        }

        if first {
            self.shape = Some(shape);
        }
        for (name, value) in &results {
            if let Some(array) = value.as_array() {
                self.array_dims
                    .entry(name.clone())
                    .or_insert_with(|| array.dims().to_vec());
            }
        }
        Ok(results)
    }

    fn check_value(
        &self,
        schema: &ReturnSchema,
        name: &str,
        value: &mut Value,
    ) -> Result<(), String> {
        let Some(declared) = schema.kind_of(name) else {
            return Err(format!(
                "experiment returned '{name}' which is not a declared output (declared: {:?})",
                schema.names()
            ));
        };
        if declared == ValueKind::Float {
            if let Value::Int(v) = *value {
                *value = Value::Float(v as f64);
            }
        }
        if declared != value.kind() {
            return Err(format!(
                "output '{name}' is declared as {declared} but the experiment returned {}",
                value.kind()
            ));
        }
        if let (Some(array), Some(dims)) = (value.as_array(), self.array_dims.get(name)) {
            if array.dims() != dims.as_slice() {
                return Err(format!(
                    "output '{name}' has dimensions {:?}, earlier runs had {:?}",
                    array.dims(),
                    dims
                ));
            }
        }
        Ok(())
    }
}
