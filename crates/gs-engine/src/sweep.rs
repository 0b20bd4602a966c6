// Sweep facade
// Owns the cell store for one grid, picks pending cells, orders them and hands
// them to the configured backend. Persistence is optional and file based.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::runtime::Runtime;
use tracing::{debug, info};

use gs_data::{FileStorage, PersistenceAdapter, SaveMode, StorageFormat, StoreSnapshot};
use gs_sweep::{
    pending, reset_coordinates, reset_statuses, CellStore, Coordinate, DispatchQueue, Experiment,
    GridSpace, ParameterSpace, ReturnSchema, ShapeLock, StatusFilter,
};
use gs_types::{CellStatus, GsResult, PersistenceError, Value};

use crate::distributed::{coordinate, serve, DistributedConfig, TcpTransport, Transport};
use crate::recorder::{PersistHook, Recorder, RunSummary};
use crate::{pool, sequential};

/// What to sweep over and where to keep the results
#[derive(Debug, Clone)]
pub struct SweepConfig {
    pub parameters: ParameterSpace,
    pub outputs: ReturnSchema,
    pub save_path: Option<PathBuf>,
}

impl SweepConfig {
    pub fn new(parameters: ParameterSpace, outputs: ReturnSchema) -> Self {
        Self {
            parameters,
            outputs,
            save_path: None,
        }
    }

    pub fn with_save_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.save_path = Some(path.into());
        self
    }
}

/// Per-run knobs
#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    /// Cells whose status is in this set are executed
    pub statuses: StatusFilter,
    /// Pool size for the worker pool backend
    pub max_workers: Option<usize>,
    /// Record wall time of successful experiments
    pub timeit: bool,
    /// Save the store after every outcome
    pub auto_save: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            statuses: StatusFilter::default(),
            max_workers: None,
            timeit: false,
            auto_save: false,
        }
    }
}

impl RunOptions {
    pub fn with_statuses(mut self, statuses: StatusFilter) -> Self {
        self.statuses = statuses;
        self
    }

    pub fn with_max_workers(mut self, workers: usize) -> Self {
        self.max_workers = Some(workers);
        self
    }

    pub fn with_timeit(mut self, timeit: bool) -> Self {
        self.timeit = timeit;
        self
    }

    pub fn with_auto_save(mut self, auto_save: bool) -> Self {
        self.auto_save = auto_save;
        self
    }
}

/// Execution strategy, fixed at construction
pub enum Backend {
    Sequential,
    WorkerPool,
    Distributed(DistributedBackend),
}

/// This process's rank in a distributed group plus the runtime driving it
pub struct DistributedBackend {
    transport: Box<dyn Transport>,
    config: DistributedConfig,
    runtime: Runtime,
}

impl DistributedBackend {
    pub fn new(transport: impl Transport + 'static, config: DistributedConfig) -> GsResult<Self> {
        Ok(Self {
            transport: Box::new(transport),
            config,
            runtime: build_runtime()?,
        })
    }

    /// Rank 0 binds `addr` and waits for every worker; other ranks connect to it.
    pub fn tcp(addr: &str, rank: usize, size: usize, config: DistributedConfig) -> GsResult<Self> {
        let runtime = build_runtime()?;
        let transport = runtime.block_on(async {
            if rank == 0 {
                TcpTransport::bind(addr, size).await
            } else {
                TcpTransport::connect(addr, rank, size).await
            }
        })?;
        Ok(Self {
            transport: Box::new(transport),
            config,
            runtime,
        })
    }

    /// Rank 0 on a listener the caller already bound.
    pub fn tcp_coordinator(
        listener: std::net::TcpListener,
        size: usize,
        config: DistributedConfig,
    ) -> GsResult<Self> {
        listener.set_nonblocking(true)?;
        let runtime = build_runtime()?;
        let transport = runtime.block_on(async {
            TcpTransport::accept_workers(tokio::net::TcpListener::from_std(listener)?, size).await
        })?;
        Ok(Self {
            transport: Box::new(transport),
            config,
            runtime,
        })
    }

    pub fn rank(&self) -> usize {
        self.transport.rank()
    }

    pub fn is_coordinator(&self) -> bool {
        self.rank() == 0
    }

    pub fn config(&self) -> &DistributedConfig {
        &self.config
    }
}

fn build_runtime() -> GsResult<Runtime> {
    Ok(tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("sweep-rt")
        .build()?)
}

pub struct Sweep {
    experiment: Arc<dyn Experiment>,
    store: CellStore,
    schema: ReturnSchema,
    lock: ShapeLock,
    backend: Backend,
    save_path: Option<PathBuf>,
    storage: FileStorage,
    pass_identifier: bool,
    restored_arguments: Vec<String>,
}

impl Sweep {
    /// Build the grid and, when a save file already exists, resume from it.
    pub fn new<E>(experiment: E, config: SweepConfig, backend: Backend) -> GsResult<Self>
    where
        E: Experiment + 'static,
    {
        let grid = GridSpace::new(config.parameters)?;
        config.outputs.validate(&grid)?;
        if let Some(path) = &config.save_path {
            StorageFormat::from_path(path)?;
        }

        let storage = FileStorage::new();
        let coordinator = !matches!(&backend, Backend::Distributed(d) if !d.is_coordinator());
        let snapshot = match &config.save_path {
            Some(path) if coordinator => storage.load(path)?,
            _ => None,
        };

        let (store, schema) = match snapshot {
            Some(snapshot) => {
                let (store, schema) = snapshot.restore(grid, &config.outputs)?;
                let counts = store.status_counts();
                info!(
                    "Resumed {} cells: {} completed, {} failed",
                    store.len(),
                    counts.get(&CellStatus::Completed).copied().unwrap_or(0),
                    counts.get(&CellStatus::Failed).copied().unwrap_or(0)
                );
                (store, schema)
            }
            None => (CellStore::new(grid), config.outputs),
        };
        let restored_arguments = store.custom_arguments().to_vec();

        Ok(Self {
            experiment: Arc::new(experiment),
            store,
            schema,
            lock: ShapeLock::new(),
            backend,
            save_path: config.save_path,
            storage,
            pass_identifier: false,
            restored_arguments,
        })
    }

    pub fn store(&self) -> &CellStore {
        &self.store
    }

    pub fn grid(&self) -> &GridSpace {
        self.store.grid()
    }

    /// Declared outputs, including any only known from a resumed file
    pub fn schema(&self) -> &ReturnSchema {
        &self.schema
    }

    pub fn save_path(&self) -> Option<&Path> {
        self.save_path.as_deref()
    }

    pub fn rank(&self) -> usize {
        match &self.backend {
            Backend::Distributed(backend) => backend.rank(),
            _ => 0,
        }
    }

    pub fn is_coordinator(&self) -> bool {
        self.rank() == 0
    }

    /// Declare an extra keyword argument. Arguments restored from a save file
    /// keep their per-cell values.
    pub fn add_custom_argument(&mut self, name: &str, default: impl Into<Value>) -> GsResult<()> {
        if self.restored_arguments.iter().any(|a| a == name) {
            debug!("Custom argument '{}' restored from save file", name);
            return Ok(());
        }
        self.store.add_custom_argument(name, default.into())
    }

    pub fn set_custom_argument(
        &mut self,
        coord: &Coordinate,
        name: &str,
        value: impl Into<Value>,
    ) -> GsResult<()> {
        self.store.set_custom_argument(coord, name, value.into())
    }

    /// Pass each cell's identifier to the experiment as `uuid`, generating
    /// identifiers for cells that lack one.
    pub fn enable_identifiers(&mut self) -> usize {
        self.pass_identifier = true;
        self.store.ensure_identifiers()
    }

    pub fn set_status(&mut self, coord: &Coordinate, status: CellStatus) -> GsResult<()> {
        self.store.set_status(coord, status)
    }

    pub fn set_priority(&mut self, coord: &Coordinate, priority: i64) -> GsResult<()> {
        self.store.set_priority(coord, priority)
    }

    /// Send every cell in `statuses` back to `NotStarted`
    pub fn reset_status(&mut self, statuses: &StatusFilter) -> usize {
        reset_statuses(&mut self.store, statuses)
    }

    pub fn reset_coordinates(&mut self, coords: &[Coordinate]) -> GsResult<usize> {
        reset_coordinates(&mut self.store, coords)
    }

    /// Write the store to the save path. Does nothing on worker ranks.
    pub fn save(&self, mode: SaveMode) -> GsResult<()> {
        if !self.is_coordinator() {
            return Ok(());
        }
        let path = self.save_path.as_deref().ok_or(PersistenceError::NoSavePath)?;
        self.storage
            .save(&StoreSnapshot::capture(&self.store, &self.schema), path, mode)
    }

    /// Execute every cell selected by `options.statuses`.
    ///
    /// On a distributed worker rank this serves tasks until the coordinator
    /// terminates it; only `served` is filled in the returned summary.
    pub fn run(&mut self, options: &RunOptions) -> GsResult<RunSummary> {
        if let Backend::Distributed(backend) = &mut self.backend {
            if !backend.is_coordinator() {
                let started = std::time::Instant::now();
                let served = backend.runtime.block_on(serve(
                    backend.transport.as_mut(),
                    Arc::clone(&self.experiment),
                ))?;
                return Ok(RunSummary {
                    served,
                    elapsed: started.elapsed(),
                    ..RunSummary::default()
                });
            }
        }

        let autosave = match (options.auto_save, &self.save_path) {
            (true, Some(path)) => Some(path.clone()),
            (true, None) => return Err(PersistenceError::NoSavePath.into()),
            (false, _) => None,
        };

        let queue = DispatchQueue::build(&self.store, pending(&self.store, &options.statuses))?;
        info!("Found {} experiments to run", queue.len());
        if let Some(head) = queue.iter().next() {
            debug!(coordinate = %head.coordinate, priority = head.priority, "Dispatch starts");
        }
        let tasks = queue.into_tasks(&self.store, self.pass_identifier)?;

        let storage = &self.storage;
        let schema = &self.schema;
        let mut recorder = Recorder::new(&mut self.store, schema, &mut self.lock);
        if let Some(path) = autosave {
            let hook: PersistHook<'_> = Box::new(move |store: &CellStore| {
                storage.save(&StoreSnapshot::capture(store, schema), &path, SaveMode::Overwrite)
            });
            recorder = recorder.with_persist(hook);
        }

        match &mut self.backend {
            Backend::Sequential => {
                sequential::run(tasks, self.experiment.as_ref(), options.timeit, &mut recorder)?
            }
            Backend::WorkerPool => pool::run(
                tasks,
                Arc::clone(&self.experiment),
                options.max_workers,
                options.timeit,
                &mut recorder,
            )?,
            Backend::Distributed(backend) => backend.runtime.block_on(coordinate(
                backend.transport.as_mut(),
                tasks,
                options.timeit,
                &backend.config,
                &mut recorder,
            ))?,
        }

        let summary = recorder.finish();
        info!(
            "Finished {} experiments in {:.2?}: {} completed, {} failed",
            summary.executed(),
            summary.elapsed,
            summary.completed,
            summary.failed
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributed::local_group;
    use gs_sweep::Kwargs;
    use gs_types::{GsError, Outcome, ValueKind};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    fn add(kwargs: &Kwargs) -> anyhow::Result<Outcome> {
        let (a, b) = (kwargs.int("a")?, kwargs.int("b")?);
        if (a, b) == (2, 1) {
            anyhow::bail!("f(2, 1) is not defined");
        }
        Ok(Outcome::scalar(a + b))
    }

    fn add_config() -> SweepConfig {
        SweepConfig::new(
            ParameterSpace::new().add("a", [1, 2]).add("b", [1, 2]),
            ReturnSchema::new().with_output("result", ValueKind::Int),
        )
    }

    fn assert_add_results(store: &CellStore) {
        let result = |a: usize, b: usize| {
            let cell = store.get(&Coordinate::from([a, b])).unwrap();
            (cell.status, cell.results.get("result").cloned())
        };
        assert_eq!(result(0, 0), (CellStatus::Completed, Some(Value::Int(2))));
        assert_eq!(result(0, 1), (CellStatus::Completed, Some(Value::Int(3))));
        assert_eq!(result(1, 0), (CellStatus::Failed, None));
        assert_eq!(result(1, 1), (CellStatus::Completed, Some(Value::Int(4))));
    }

    #[test]
    fn every_backend_produces_the_same_grid() {
        for backend in [Backend::Sequential, Backend::WorkerPool] {
            let mut sweep = Sweep::new(add, add_config(), backend).unwrap();
            let summary = sweep.run(&RunOptions::default().with_max_workers(2)).unwrap();
            assert_eq!((summary.completed, summary.failed), (3, 1));
            assert_scenario(sweep.store());
        }

        let mut group = local_group(3).unwrap();
        let coordinator = group.remove(0);
        let workers: Vec<_> = group
            .into_iter()
            .map(|transport| {
                std::thread::spawn(move || {
                    let backend = DistributedBackend::new(transport, DistributedConfig::default())?;
                    let mut sweep = Sweep::new(add, add_config(), Backend::Distributed(backend))?;
                    sweep.run(&RunOptions::default())
                })
            })
            .collect();

        let backend = DistributedBackend::new(coordinator, DistributedConfig::default()).unwrap();
        let mut sweep = Sweep::new(add, add_config(), Backend::Distributed(backend)).unwrap();
        let summary = sweep.run(&RunOptions::default().with_timeit(true)).unwrap();
        assert_eq!((summary.completed, summary.failed), (3, 1));
        assert_scenario(sweep.store());

        let served: usize = workers
            .into_iter()
            .map(|w| w.join().unwrap().unwrap().served)
            .sum();
        assert_eq!(served, 4);
    }

    fn add_and_ratio(kwargs: &Kwargs) -> anyhow::Result<Outcome> {
        let (a, b) = (kwargs.int("a")?, kwargs.int("b")?);
        if (a, b) == (2, 1) {
            anyhow::bail!("f(2, 1) is not defined");
        }
        let ratio = if a == b { f64::NAN } else { a as f64 / b as f64 };
        Ok(Outcome::named([("sum", Value::Int(a + b)), ("ratio", Value::Float(ratio))]))
    }

    fn add_and_ratio_config() -> SweepConfig {
        SweepConfig::new(
            ParameterSpace::new().add("a", [1, 2]).add("b", [1, 2]),
            ReturnSchema::new()
                .with_output("sum", ValueKind::Int)
                .with_output("ratio", ValueKind::Float),
        )
    }

    fn assert_add_and_ratio(store: &CellStore) {
        let cell = |a: usize, b: usize| store.get(&Coordinate::from([a, b])).unwrap();
        let ratio = |a: usize, b: usize| cell(a, b).results.get("ratio").and_then(Value::as_f64);

        assert_eq!(cell(0, 0).status, CellStatus::Completed);
        assert_eq!(cell(0, 0).results.get("sum"), Some(&Value::Int(2)));
        assert!(ratio(0, 0).unwrap().is_nan());
        assert_eq!(cell(0, 1).results.get("sum"), Some(&Value::Int(3)));
        assert_eq!(ratio(0, 1), Some(0.5));
        assert_eq!(cell(1, 0).status, CellStatus::Failed);
        assert!(cell(1, 0).error.as_deref().unwrap().contains("f(2, 1) is not defined"));
        assert_eq!(cell(1, 1).status, CellStatus::Completed);
        assert!(ratio(1, 1).unwrap().is_nan());
    }

    #[test]
    fn tcp_backend_carries_non_finite_results() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ratio.json");
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let workers: Vec<_> = (1..3)
            .map(|rank| {
                let addr = addr.clone();
                std::thread::spawn(move || {
                    let backend = DistributedBackend::tcp(&addr, rank, 3, DistributedConfig::default())?;
                    let mut sweep =
                        Sweep::new(add_and_ratio, add_and_ratio_config(), Backend::Distributed(backend))?;
                    sweep.run(&RunOptions::default())
                })
            })
            .collect();

        let backend = DistributedBackend::tcp_coordinator(listener, 3, DistributedConfig::default()).unwrap();
        let config = add_and_ratio_config().with_save_path(&path);
        let mut sweep = Sweep::new(add_and_ratio, config.clone(), Backend::Distributed(backend)).unwrap();
        let summary = sweep.run(&RunOptions::default().with_auto_save(true)).unwrap();
        assert_eq!((summary.completed, summary.failed), (3, 1));
        assert_add_and_ratio(sweep.store());

        let served: usize = workers
            .into_iter()
            .map(|w| w.join().unwrap().unwrap().served)
            .sum();
        assert_eq!(served, 4);

        let resumed = Sweep::new(add_and_ratio, config, Backend::Sequential).unwrap();
        assert_add_and_ratio(resumed.store());
    }

    #[test]
    fn non_finite_results_survive_resume() {
        let dir = tempdir().unwrap();
        for name in ["inf.json", "inf.parquet"] {
            let config = SweepConfig::new(
                ParameterSpace::new().add("x", [0, 1]),
                ReturnSchema::new().with_output("result", ValueKind::Float),
            )
            .with_save_path(dir.path().join(name));
            let inverse = |kwargs: &Kwargs| -> anyhow::Result<Outcome> {
                Ok(Outcome::scalar(1.0 / kwargs.int("x")? as f64))
            };

            let mut first = Sweep::new(inverse, config.clone(), Backend::Sequential).unwrap();
            first.run(&RunOptions::default().with_auto_save(true)).unwrap();

            let resumed = Sweep::new(inverse, config, Backend::Sequential).unwrap();
            let result = |x: usize| {
                let cell = resumed.store().get(&Coordinate::from([x])).unwrap();
                assert_eq!(cell.status, CellStatus::Completed);
                cell.results.get("result").and_then(Value::as_f64)
            };
            assert_eq!(result(0), Some(f64::INFINITY));
            assert_eq!(result(1), Some(1.0));
        }
    }

    fn assert_scenario(store: &CellStore) {
        assert_add_results(store);
        let failed = store.get(&Coordinate::from([1, 0])).unwrap();
        assert!(failed.error.as_deref().unwrap().contains("f(2, 1) is not defined"));
    }

    #[test]
    fn completed_cells_are_not_run_again() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let experiment = move |kwargs: &Kwargs| -> anyhow::Result<Outcome> {
            counter.fetch_add(1, Ordering::SeqCst);
            add(kwargs)
        };
        let mut sweep = Sweep::new(experiment, add_config(), Backend::Sequential).unwrap();

        assert_eq!(sweep.run(&RunOptions::default()).unwrap().executed(), 4);
        assert_eq!(sweep.run(&RunOptions::default()).unwrap().executed(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 4);

        // Only the failed cell is selected; the rest keep their results
        let summary = sweep
            .run(&RunOptions::default().with_statuses(StatusFilter::only(CellStatus::Failed)))
            .unwrap();
        assert_eq!(summary.dispatched, vec![Coordinate::from([1, 0])]);
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert_add_results(sweep.store());
    }

    #[test]
    fn skipped_cells_are_left_alone_until_reset() {
        let mut sweep = Sweep::new(add, add_config(), Backend::Sequential).unwrap();
        sweep.set_status(&Coordinate::from([0, 1]), CellStatus::Skip).unwrap();

        let summary = sweep.run(&RunOptions::default()).unwrap();
        assert_eq!(summary.executed(), 3);
        assert_eq!(
            sweep.store().get(&Coordinate::from([0, 1])).unwrap().status,
            CellStatus::Skip
        );

        assert_eq!(sweep.reset_status(&StatusFilter::finished()), 3);
        assert_eq!(sweep.run(&RunOptions::default()).unwrap().executed(), 3);
    }

    #[test]
    fn resumes_from_both_file_formats() {
        let dir = tempdir().unwrap();
        for name in ["sweep.json", "sweep.parquet"] {
            let path = dir.path().join(name);
            let config = SweepConfig::new(
                ParameterSpace::new().add("x", [0, 1, 2, 3]),
                ReturnSchema::new().with_output("square", ValueKind::Int),
            )
            .with_save_path(&path);
            let square = |kwargs: &Kwargs| -> anyhow::Result<Outcome> {
                let x = kwargs.int("x")?;
                Ok(Outcome::named([("square", x * x)]))
            };

            let mut first = Sweep::new(square, config.clone(), Backend::Sequential).unwrap();
            first.set_status(&Coordinate::from([2]), CellStatus::Skip).unwrap();
            first.set_status(&Coordinate::from([3]), CellStatus::Skip).unwrap();
            first
                .run(&RunOptions::default().with_auto_save(true).with_timeit(true))
                .unwrap();
            first.set_status(&Coordinate::from([2]), CellStatus::NotStarted).unwrap();
            first.set_status(&Coordinate::from([3]), CellStatus::NotStarted).unwrap();
            first.save(SaveMode::Overwrite).unwrap();

            let mut resumed = Sweep::new(square, config, Backend::Sequential).unwrap();
            let cell = resumed.store().get(&Coordinate::from([1])).unwrap();
            assert_eq!(cell.status, CellStatus::Completed);
            assert!(cell.duration.is_some());

            let summary = resumed.run(&RunOptions::default()).unwrap();
            assert_eq!(
                summary.dispatched,
                vec![Coordinate::from([2]), Coordinate::from([3])]
            );
            assert_eq!(
                resumed.store().get(&Coordinate::from([3])).unwrap().results.get("square"),
                Some(&Value::Int(9))
            );
        }
    }

    #[test]
    fn resume_rejects_a_different_grid() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sweep.json");
        let sweep = Sweep::new(add, add_config().with_save_path(&path), Backend::Sequential).unwrap();
        sweep.save(SaveMode::CreateNew).unwrap();

        let other = SweepConfig::new(
            ParameterSpace::new().add("a", [1, 3]).add("b", [1, 2]),
            ReturnSchema::new().with_output("result", ValueKind::Int),
        )
        .with_save_path(&path);
        match Sweep::new(add, other, Backend::Sequential) {
            Err(GsError::Persistence(PersistenceError::ParameterMismatch { .. })) => (),
            _ => panic!("Expected ParameterMismatch"),
        }
    }

    #[test]
    fn save_conflicts_and_missing_paths() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sweep.json");
        let sweep = Sweep::new(add, add_config().with_save_path(&path), Backend::Sequential).unwrap();
        sweep.save(SaveMode::CreateNew).unwrap();
        match sweep.save(SaveMode::CreateNew) {
            Err(GsError::Persistence(PersistenceError::FileExists { .. })) => (),
            _ => panic!("Expected FileExists"),
        }

        let mut unsaved = Sweep::new(add, add_config(), Backend::Sequential).unwrap();
        match unsaved.run(&RunOptions::default().with_auto_save(true)) {
            Err(GsError::Persistence(PersistenceError::NoSavePath)) => (),
            _ => panic!("Expected NoSavePath"),
        }

        match Sweep::new(add, add_config().with_save_path(dir.path().join("sweep.zarr")), Backend::Sequential) {
            Err(GsError::Persistence(PersistenceError::UnsupportedFormat { .. })) => (),
            _ => panic!("Expected UnsupportedFormat"),
        }
    }

    #[test]
    fn custom_arguments_and_identifiers_reach_the_experiment() {
        let config = SweepConfig::new(
            ParameterSpace::new().add("x", [1, 2]),
            ReturnSchema::new()
                .with_output("scaled", ValueKind::Float)
                .with_output("tag", ValueKind::Str),
        );
        let experiment = |kwargs: &Kwargs| -> anyhow::Result<Outcome> {
            let scaled = kwargs.int("x")? as f64 * kwargs.float("scale")?;
            let tag = kwargs.str("uuid")?.to_string();
            Ok(Outcome::named([
                ("scaled", Value::Float(scaled)),
                ("tag", Value::Str(tag)),
            ]))
        };
        let mut sweep = Sweep::new(experiment, config, Backend::Sequential).unwrap();
        sweep.add_custom_argument("scale", 0.5).unwrap();
        sweep
            .set_custom_argument(&Coordinate::from([1]), "scale", 10.0)
            .unwrap();
        assert!(sweep.add_custom_argument("x", 1).is_err());
        assert_eq!(sweep.enable_identifiers(), 2);

        sweep.run(&RunOptions::default()).unwrap();
        let first = sweep.store().get(&Coordinate::from([0])).unwrap();
        assert_eq!(first.results.get("scaled"), Some(&Value::Float(0.5)));
        assert_eq!(
            first.results.get("tag").and_then(Value::as_str),
            first.identifier.as_deref()
        );
        let second = sweep.store().get(&Coordinate::from([1])).unwrap();
        assert_eq!(second.results.get("scaled"), Some(&Value::Float(20.0)));
    }

    #[test]
    fn wrong_first_outcome_aborts_the_run() {
        let experiment =
            |_: &Kwargs| -> anyhow::Result<Outcome> { Ok(Outcome::named([("unexpected", 1)])) };
        let mut sweep = Sweep::new(experiment, add_config(), Backend::Sequential).unwrap();
        match sweep.run(&RunOptions::default()) {
            Err(GsError::Config(message)) => assert!(message.contains("unexpected")),
            _ => panic!("Expected a configuration error"),
        }
    }
}
