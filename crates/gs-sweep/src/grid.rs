//! Parameter space and the Cartesian coordinate grid built from it.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use gs_types::{config_error, GsResult, Value};

/// Argument names the sweep itself injects or stores per cell.
pub const RESERVED_ARGUMENTS: [&str; 4] = ["uuid", "status", "duration", "priority"];

/// Keyword under which the per-cell identifier is passed.
pub const IDENTIFIER_ARGUMENT: &str = "uuid";

pub fn is_reserved(name: &str) -> bool {
    RESERVED_ARGUMENTS.contains(&name)
}

/// A single named dimension of the grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    /// Keyword the value is passed under (e.g. "learning_rate").
    pub name: String,
    /// Admissible values, in grid order.
    pub values: Vec<Value>,
}

/// Ordered list of parameters spanning the grid.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ParameterSpace {
    pub parameters: Vec<Parameter>,
}

impl ParameterSpace {
    pub fn new() -> Self {
        Self {
            parameters: Vec::new(),
        }
    }

    pub fn add<I, V>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.parameters.push(Parameter {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn names(&self) -> Vec<String> {
        self.parameters.iter().map(|p| p.name.clone()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Total number of grid points.
    pub fn cardinality(&self) -> usize {
        self.parameters.iter().map(|p| p.values.len()).product()
    }
}

/// Per-dimension indices of one grid point, ordered lexicographically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Coordinate(pub Vec<usize>);

impl Coordinate {
    pub fn new(indices: Vec<usize>) -> Self {
        Self(indices)
    }

    pub fn indices(&self) -> &[usize] {
        &self.0
    }
}

impl From<Vec<usize>> for Coordinate {
    fn from(indices: Vec<usize>) -> Self {
        Self(indices)
    }
}

impl<const N: usize> From<[usize; N]> for Coordinate {
    fn from(indices: [usize; N]) -> Self {
        Self(indices.to_vec())
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, idx) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{idx}")?;
        }
        write!(f, ")")
    }
}

/// Validated parameter space with row-major coordinate arithmetic.
#[derive(Debug, Clone, PartialEq)]
pub struct GridSpace {
    space: ParameterSpace,
    shape: Vec<usize>,
}

impl GridSpace {
    pub fn new(space: ParameterSpace) -> GsResult<Self> {
        let mut seen = HashSet::new();
        for param in &space.parameters {
            if param.values.is_empty() {
                return Err(config_error!(
                    "Parameter '{}' has an empty value list",
                    param.name
                ));
            }
            if is_reserved(&param.name) {
                return Err(config_error!(
                    "Parameter name '{}' is reserved (reserved names: {:?})",
                    param.name,
                    RESERVED_ARGUMENTS
                ));
            }
            if !seen.insert(param.name.as_str()) {
                return Err(config_error!("Parameter '{}' is declared twice", param.name));
            }
        }
        let shape = space.parameters.iter().map(|p| p.values.len()).collect();
        Ok(Self { space, shape })
    }

    pub fn space(&self) -> &ParameterSpace {
        &self.space
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Parameter names in declaration order.
    pub fn dims(&self) -> Vec<String> {
        self.space.names()
    }

    pub fn contains_dim(&self, name: &str) -> bool {
        self.space.get(name).is_some()
    }

    pub fn cardinality(&self) -> usize {
        self.shape.iter().product()
    }

    /// Row-major position of `coord`, or `None` if it lies outside the grid.
    pub fn flat_index(&self, coord: &Coordinate) -> Option<usize> {
        if coord.0.len() != self.shape.len() {
            return None;
        }
        let mut flat = 0;
        for (idx, extent) in coord.0.iter().zip(&self.shape) {
            if idx >= extent {
                return None;
            }
            flat = flat * extent + idx;
        }
        Some(flat)
    }

    /// Inverse of [`GridSpace::flat_index`].
    pub fn coordinate_at(&self, flat: usize) -> Option<Coordinate> {
        if flat >= self.cardinality() {
            return None;
        }
        let mut indices = vec![0; self.shape.len()];
        let mut rest = flat;
        for (slot, extent) in indices.iter_mut().zip(&self.shape).rev() {
            *slot = rest % extent;
            rest /= extent;
        }
        Some(Coordinate(indices))
    }

    /// All coordinates in lexicographic (row-major) order.
    pub fn coordinates(&self) -> impl Iterator<Item = Coordinate> + '_ {
        (0..self.cardinality()).filter_map(move |flat| self.coordinate_at(flat))
    }

    /// Parameter values at `coord`, in declaration order.
    pub fn resolve(&self, coord: &Coordinate) -> Option<Vec<(&str, &Value)>> {
        self.flat_index(coord)?;
        Some(
            self.space
                .parameters
                .iter()
                .zip(&coord.0)
                .map(|(param, idx)| (param.name.as_str(), &param.values[*idx]))
                .collect(),
        )
    }
}
