//! Values exchanged between the parameter grid, experiment functions and
//! storage.
//!
//! Parameter values, custom arguments and experiment results all share the
//! [`Value`] model. An experiment returns an [`Outcome`], which is flattened
//! into named results when it is recorded.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::errors::GsResult;
use crate::validation_error;

/// Key under which a scalar outcome is stored.
pub const SCALAR_RESULT_KEY: &str = "result";

/// Key under which the `index`-th element of a sequence outcome is stored.
pub fn sequence_result_key(index: usize) -> String {
    format!("{SCALAR_RESULT_KEY}_{index}")
}

/// A complex number.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Complex {
    #[serde(with = "crate::float_repr")]
    pub re: f64,
    #[serde(with = "crate::float_repr")]
    pub im: f64,
}

impl Complex {
    pub fn new(re: f64, im: f64) -> Self {
        Self { re, im }
    }
}

/// A dense row-major array with named dimensions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledArray {
    dims: Vec<String>,
    shape: Vec<usize>,
    #[serde(with = "crate::float_repr::vec")]
    data: Vec<f64>,
}

impl LabeledArray {
    pub fn new(dims: Vec<String>, shape: Vec<usize>, data: Vec<f64>) -> GsResult<Self> {
        if dims.len() != shape.len() {
            return Err(validation_error!(
                "array has {} dimension names but {} extents",
                dims.len(),
                shape.len()
            ));
        }
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(validation_error!(
                "array of shape {:?} needs {} elements, got {}",
                shape,
                expected,
                data.len()
            ));
        }
        Ok(Self { dims, shape, data })
    }

    /// One-dimensional array along `dim`.
    pub fn vector(dim: impl Into<String>, data: Vec<f64>) -> Self {
        Self {
            dims: vec![dim.into()],
            shape: vec![data.len()],
            data,
        }
    }

    pub fn dims(&self) -> &[String] {
        &self.dims
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }
}

/// Type tag of a [`Value`], used to declare experiment outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Int,
    Float,
    Complex,
    Str,
    Bool,
    Array,
    Object,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Int => "int",
            Self::Float => "float",
            Self::Complex => "complex",
            Self::Str => "str",
            Self::Bool => "bool",
            Self::Array => "array",
            Self::Object => "object",
        };
        f.write_str(name)
    }
}

/// A parameter value, custom argument or experiment result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Value {
    Int(i64),
    Float(#[serde(with = "crate::float_repr")] f64),
    Complex(Complex),
    Str(String),
    Bool(bool),
    Array(LabeledArray),
    /// Opaque value stored as JSON.
    Object(serde_json::Value),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Int(_) => ValueKind::Int,
            Self::Float(_) => ValueKind::Float,
            Self::Complex(_) => ValueKind::Complex,
            Self::Str(_) => ValueKind::Str,
            Self::Bool(_) => ValueKind::Bool,
            Self::Array(_) => ValueKind::Array,
            Self::Object(_) => ValueKind::Object,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Float view; integers widen.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&LabeledArray> {
        match self {
            Self::Array(v) => Some(v),
            _ => None,
        }
    }

    /// Equality with a relative tolerance on floating point components.
    pub fn approx_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Float(a), Self::Float(b)) => close(*a, *b),
            (Self::Complex(a), Self::Complex(b)) => close(a.re, b.re) && close(a.im, b.im),
            (Self::Array(a), Self::Array(b)) => {
                a.dims == b.dims
                    && a.shape == b.shape
                    && a.data.iter().zip(&b.data).all(|(x, y)| close(*x, *y))
            }
            _ => self == other,
        }
    }
}

fn close(a: f64, b: f64) -> bool {
    if a == b || (a.is_nan() && b.is_nan()) {
        return true;
    }
    (a - b).abs() <= 1e-8 + 1e-5 * b.abs()
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Complex(c) => write!(f, "{}{:+}j", c.re, c.im),
            Self::Str(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Array(a) => write!(f, "array(dims={:?}, shape={:?})", a.dims, a.shape),
            Self::Object(v) => write!(f, "{v}"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<Complex> for Value {
    fn from(v: Complex) -> Self {
        Self::Complex(v)
    }
}

impl From<LabeledArray> for Value {
    fn from(v: LabeledArray) -> Self {
        Self::Array(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Self::Object(v)
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// What an experiment function returns on success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", content = "values", rename_all = "snake_case")]
pub enum Outcome {
    /// Stored under [`SCALAR_RESULT_KEY`].
    Scalar(Value),
    /// Stored under `result_0`, `result_1`, ...
    Sequence(Vec<Value>),
    /// Stored under the given names.
    Named(BTreeMap<String, Value>),
}

/// Structural shape of an [`Outcome`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeShape {
    Scalar,
    Sequence(usize),
    Named,
}

impl fmt::Display for OutcomeShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar => f.write_str("a single value"),
            Self::Sequence(n) => write!(f, "a sequence of {n} values"),
            Self::Named => f.write_str("named values"),
        }
    }
}

impl Outcome {
    pub fn scalar(value: impl Into<Value>) -> Self {
        Self::Scalar(value.into())
    }

    pub fn sequence<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::Sequence(values.into_iter().map(Into::into).collect())
    }

    pub fn named<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Self::Named(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// An experiment that produces no outputs.
    pub fn empty() -> Self {
        Self::Named(BTreeMap::new())
    }

    pub fn shape(&self) -> OutcomeShape {
        match self {
            Self::Scalar(_) => OutcomeShape::Scalar,
            Self::Sequence(values) => OutcomeShape::Sequence(values.len()),
            Self::Named(_) => OutcomeShape::Named,
        }
    }

    /// Flatten into the named results written to a cell.
    pub fn into_results(self) -> BTreeMap<String, Value> {
        match self {
            Self::Scalar(value) => BTreeMap::from([(SCALAR_RESULT_KEY.to_string(), value)]),
            Self::Sequence(values) => values
                .into_iter()
                .enumerate()
                .map(|(i, v)| (sequence_result_key(i), v))
                .collect(),
            Self::Named(map) => map,
        }
    }
}

impl From<Value> for Outcome {
    fn from(value: Value) -> Self {
        Self::Scalar(value)
    }
}
