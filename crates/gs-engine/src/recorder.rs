// Outcome recording for a single run
// Every backend funnels its task reports through one Recorder, which owns the
// only mutable path into the cell store for the duration of the run.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use gs_sweep::{CellStore, Coordinate, ReportOutcome, ReturnSchema, SchemaViolation, ShapeLock, TaskReport};
use gs_types::{config_error, internal_error, GsResult};
use tracing::{debug, error};

/// Called with the store after every applied outcome
pub type PersistHook<'a> = Box<dyn FnMut(&CellStore) -> GsResult<()> + 'a>;

/// What a run did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    /// Coordinates in the order they were handed to workers
    pub dispatched: Vec<Coordinate>,
    pub completed: usize,
    pub failed: usize,
    pub elapsed: Duration,
    /// Tasks this rank executed as a distributed worker
    pub served: usize,
}

impl RunSummary {
    pub fn executed(&self) -> usize {
        self.completed + self.failed
    }
}

pub struct Recorder<'a> {
    store: &'a mut CellStore,
    schema: &'a ReturnSchema,
    lock: &'a mut ShapeLock,
    persist: Option<PersistHook<'a>>,
    seen: HashSet<Coordinate>,
    outstanding: HashSet<Coordinate>,
    summary: RunSummary,
    started: Instant,
}

impl<'a> Recorder<'a> {
    pub fn new(store: &'a mut CellStore, schema: &'a ReturnSchema, lock: &'a mut ShapeLock) -> Self {
        Self {
            store,
            schema,
            lock,
            persist: None,
            seen: HashSet::new(),
            outstanding: HashSet::new(),
            summary: RunSummary::default(),
            started: Instant::now(),
        }
    }

    pub fn with_persist(mut self, hook: PersistHook<'a>) -> Self {
        self.persist = Some(hook);
        self
    }

    pub fn store(&self) -> &CellStore {
        &*self.store
    }

    /// Number of dispatched tasks still waiting for an outcome
    pub fn outstanding(&self) -> usize {
        self.outstanding.len()
    }

    pub fn is_outstanding(&self, coord: &Coordinate) -> bool {
        self.outstanding.contains(coord)
    }

    /// Register that `coord` was handed to a worker. A coordinate can be
    /// dispatched once per run.
    pub fn dispatch(&mut self, coord: &Coordinate) -> GsResult<()> {
        if !self.seen.insert(coord.clone()) {
            return Err(internal_error!("{} was already dispatched in this run", coord));
        }
        self.outstanding.insert(coord.clone());
        self.summary.dispatched.push(coord.clone());
        debug!(coordinate = %coord, "Dispatched experiment");
        Ok(())
    }

    /// Write a report into the store. Only schema problems with the first
    /// successful outcome are returned as errors; everything else fails the
    /// cell and the run continues.
    pub fn apply(&mut self, report: TaskReport) -> GsResult<()> {
        let coord = report.coordinate;
        if !self.outstanding.remove(&coord) {
            return Err(internal_error!(
                "received an outcome for {} which is not awaiting one",
                coord
            ));
        }

        match report.outcome {
            ReportOutcome::Success(outcome) => {
                match self.lock.resolve(self.schema, self.store.grid(), outcome) {
                    Ok(results) => {
                        self.store.record_success(&coord, results, report.duration)?;
                        self.summary.completed += 1;
                        debug!(coordinate = %coord, duration = ?report.duration, "Experiment completed");
                    }
                    Err(SchemaViolation::Structural(message)) => {
                        return Err(config_error!(
                            "return value at {} does not match the declared outputs: {}",
                            coord,
                            message
                        ));
                    }
                    Err(SchemaViolation::Malformed(message)) => self.fail(&coord, message)?,
                }
            }
            ReportOutcome::Failure(message) => self.fail(&coord, message)?,
        }

        if let Some(persist) = self.persist.as_mut() {
            persist(&*self.store)?;
        }
        Ok(())
    }

    fn fail(&mut self, coord: &Coordinate, message: String) -> GsResult<()> {
        error!(coordinate = %coord, "Experiment failed: {}", message);
        self.store.record_failure(coord, message)?;
        self.summary.failed += 1;
        Ok(())
    }

    pub fn finish(self) -> RunSummary {
        let mut summary = self.summary;
        summary.elapsed = self.started.elapsed();
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gs_sweep::{GridSpace, ParameterSpace};
    use gs_types::{CellStatus, Outcome, Value, ValueKind};

    fn fixtures() -> (CellStore, ReturnSchema) {
        let grid = GridSpace::new(ParameterSpace::new().add("a", [1, 2, 3])).unwrap();
        let schema = ReturnSchema::new().with_output("result", ValueKind::Int);
        (CellStore::new(grid), schema)
    }

    fn success(i: usize, value: i64) -> TaskReport {
        TaskReport {
            coordinate: Coordinate::from([i]),
            outcome: ReportOutcome::Success(Outcome::scalar(value)),
            duration: Some(0.1),
        }
    }

    #[test]
    fn applies_success_and_failure() {
        let (mut store, schema) = fixtures();
        let mut lock = ShapeLock::new();
        let mut recorder = Recorder::new(&mut store, &schema, &mut lock);

        recorder.dispatch(&Coordinate::from([0])).unwrap();
        recorder.dispatch(&Coordinate::from([1])).unwrap();
        recorder.apply(success(0, 5)).unwrap();
        recorder
            .apply(TaskReport::failure(Coordinate::from([1]), "boom"))
            .unwrap();
        let summary = recorder.finish();

        assert_eq!(summary.completed, 1);
        assert_eq!(summary.failed, 1);
        let cell = store.get(&Coordinate::from([0])).unwrap();
        assert_eq!(cell.results.get("result"), Some(&Value::Int(5)));
        assert_eq!(cell.duration, Some(0.1));
        let cell = store.get(&Coordinate::from([1])).unwrap();
        assert_eq!(cell.status, CellStatus::Failed);
        assert_eq!(cell.error.as_deref(), Some("boom"));
    }

    #[test]
    fn rejects_duplicate_and_unexpected_outcomes() {
        let (mut store, schema) = fixtures();
        let mut lock = ShapeLock::new();
        let mut recorder = Recorder::new(&mut store, &schema, &mut lock);

        assert!(recorder.apply(success(2, 1)).is_err());
        recorder.dispatch(&Coordinate::from([2])).unwrap();
        assert!(recorder.dispatch(&Coordinate::from([2])).is_err());
        recorder.apply(success(2, 1)).unwrap();
        assert!(recorder.apply(success(2, 1)).is_err());
    }

    #[test]
    fn structural_mismatch_aborts_malformed_fails_cell() {
        let (mut store, schema) = fixtures();
        let mut lock = ShapeLock::new();
        let mut recorder = Recorder::new(&mut store, &schema, &mut lock);

        recorder.dispatch(&Coordinate::from([0])).unwrap();
        let err = recorder
            .apply(TaskReport {
                coordinate: Coordinate::from([0]),
                outcome: ReportOutcome::Success(Outcome::named([("other", 1)])),
                duration: None,
            })
            .unwrap_err();
        assert!(err.to_string().contains("Configuration error"));

        recorder.dispatch(&Coordinate::from([1])).unwrap();
        recorder.apply(success(1, 2)).unwrap();
        recorder.dispatch(&Coordinate::from([2])).unwrap();
        recorder
            .apply(TaskReport {
                coordinate: Coordinate::from([2]),
                outcome: ReportOutcome::Success(Outcome::sequence([1, 2])),
                duration: None,
            })
            .unwrap();
        drop(recorder);

        assert_eq!(
            store.get(&Coordinate::from([2])).unwrap().status,
            CellStatus::Failed
        );
    }

    #[test]
    fn persists_after_each_outcome() {
        let (mut store, schema) = fixtures();
        let mut lock = ShapeLock::new();
        let mut saves = Vec::new();
        {
            let hook: PersistHook<'_> = Box::new(|store: &CellStore| {
                saves.push(store.status_counts().get(&CellStatus::NotStarted).copied());
                Ok(())
            });
            let mut recorder = Recorder::new(&mut store, &schema, &mut lock).with_persist(hook);
            for i in 0..3 {
                recorder.dispatch(&Coordinate::from([i])).unwrap();
            }
            for i in 0..3 {
                recorder.apply(success(i, 1)).unwrap();
            }
        }
        assert_eq!(saves, vec![Some(2), Some(1), None]);
    }
}
