//! Dispatchable tasks, the experiment contract and task reports.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use gs_types::{validation_error, GsResult, Outcome, Value};

use crate::grid::Coordinate;

/// Keyword arguments handed to an experiment.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Kwargs(BTreeMap<String, Value>);

impl Kwargs {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.0.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn require(&self, name: &str) -> GsResult<&Value> {
        self.0
            .get(name)
            .ok_or_else(|| validation_error!("missing argument '{}'", name))
    }

    pub fn int(&self, name: &str) -> GsResult<i64> {
        let value = self.require(name)?;
        value
            .as_i64()
            .ok_or_else(|| validation_error!("argument '{}' is {}, not an int", name, value.kind()))
    }

    pub fn float(&self, name: &str) -> GsResult<f64> {
        let value = self.require(name)?;
        value
            .as_f64()
            .ok_or_else(|| validation_error!("argument '{}' is {}, not a float", name, value.kind()))
    }

    pub fn str(&self, name: &str) -> GsResult<&str> {
        let value = self.require(name)?;
        value
            .as_str()
            .ok_or_else(|| validation_error!("argument '{}' is {}, not a str", name, value.kind()))
    }

    pub fn bool(&self, name: &str) -> GsResult<bool> {
        let value = self.require(name)?;
        value
            .as_bool()
            .ok_or_else(|| validation_error!("argument '{}' is {}, not a bool", name, value.kind()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A unit of work derived from a cell at dispatch time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub coordinate: Coordinate,
    pub kwargs: Kwargs,
    pub priority: i64,
}

/// The user function evaluated at every grid point.
pub trait Experiment: Send + Sync {
    fn run(&self, kwargs: &Kwargs) -> anyhow::Result<Outcome>;
}

impl<F> Experiment for F
where
    F: Fn(&Kwargs) -> anyhow::Result<Outcome> + Send + Sync,
{
    fn run(&self, kwargs: &Kwargs) -> anyhow::Result<Outcome> {
        self(kwargs)
    }
}

/// Result of executing one task, as produced by a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportOutcome {
    Success(Outcome),
    Failure(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskReport {
    pub coordinate: Coordinate,
    pub outcome: ReportOutcome,
    /// Wall time in seconds, present when timing was requested.
    pub duration: Option<f64>,
}

impl TaskReport {
    pub fn failure(coordinate: Coordinate, error: impl Into<String>) -> Self {
        Self {
            coordinate,
            outcome: ReportOutcome::Failure(error.into()),
            duration: None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ReportOutcome::Success(_))
    }
}

/// Run `experiment` on `task`, turning errors and panics into a failure report.
pub fn execute_task(experiment: &dyn Experiment, task: &Task, timeit: bool) -> TaskReport {
    let started = Instant::now();
    let result = panic::catch_unwind(AssertUnwindSafe(|| experiment.run(&task.kwargs)));
    let elapsed = started.elapsed().as_secs_f64();

    let outcome = match result {
        Ok(Ok(outcome)) => ReportOutcome::Success(outcome),
        Ok(Err(err)) => ReportOutcome::Failure(format!("{err:#}")),
        Err(payload) => ReportOutcome::Failure(format!(
            "experiment panicked: {}",
            panic_message(payload.as_ref())
        )),
    };
    let duration = match outcome {
        ReportOutcome::Success(_) if timeit => Some(elapsed),
        _ => None,
    };

    TaskReport {
        coordinate: task.coordinate.clone(),
        outcome,
        duration,
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
