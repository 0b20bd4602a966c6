//! Master/worker execution across ranks.
//!
//! Rank 0 runs [`coordinate`], every other rank runs [`serve`]. Workers pull
//! work by sending `Ready`; the coordinator answers with the highest priority
//! task left or with `Terminate` once the queue is empty.

mod coordinator;
mod protocol;
mod tcp;
mod transport;
mod worker;

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use coordinator::coordinate;
pub use protocol::Message;
pub use tcp::{read_frame, write_frame, TcpTransport, MAX_FRAME};
pub use transport::{local_group, Incoming, LocalTransport, Transport};
pub use worker::serve;

/// Coordinator tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributedConfig {
    /// Fail a task whose worker has not reported within this long.
    pub worker_timeout: Option<Duration>,
    /// How long to wait for idle workers to check in at the end of a run.
    pub shutdown_grace: Duration,
}

impl Default for DistributedConfig {
    fn default() -> Self {
        Self {
            worker_timeout: None,
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

impl DistributedConfig {
    pub fn with_worker_timeout(mut self, timeout: Duration) -> Self {
        self.worker_timeout = Some(timeout);
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::Recorder;
    use gs_sweep::{
        pending, CellStore, Coordinate, DispatchQueue, Experiment, GridSpace, Kwargs,
        ParameterSpace, ReportOutcome, ReturnSchema, ShapeLock, StatusFilter, Task, TaskReport,
    };
    use gs_types::{CellStatus, GsError, Outcome, ProtocolError, ValueKind};
    use std::sync::Arc;

    fn tasks_for(store: &CellStore) -> Vec<Task> {
        let coords = pending(store, &StatusFilter::default());
        DispatchQueue::build(store, coords)
            .unwrap()
            .into_tasks(store, false)
            .unwrap()
    }

    fn spawn_workers(
        transports: Vec<LocalTransport>,
        experiment: Arc<dyn Experiment>,
    ) -> Vec<tokio::task::JoinHandle<gs_types::GsResult<usize>>> {
        transports
            .into_iter()
            .map(|mut transport| {
                let experiment = Arc::clone(&experiment);
                tokio::spawn(async move { serve(&mut transport, experiment).await })
            })
            .collect()
    }

    fn sum_experiment() -> Arc<dyn Experiment> {
        Arc::new(|kwargs: &Kwargs| -> anyhow::Result<Outcome> {
            let (a, b) = (kwargs.int("a")?, kwargs.int("b")?);
            if (a, b) == (2, 1) {
                anyhow::bail!("cannot add 2 and 1");
            }
            Ok(Outcome::scalar(a + b))
        })
    }

    fn sum_grid() -> (CellStore, ReturnSchema) {
        let grid = GridSpace::new(ParameterSpace::new().add("a", [1, 2]).add("b", [1, 2])).unwrap();
        (CellStore::new(grid), ReturnSchema::new().with_output("result", ValueKind::Int))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn workers_fill_the_grid_and_isolate_failures() {
        let (mut store, schema) = sum_grid();
        let tasks = tasks_for(&store);
        let mut group = local_group(3).unwrap();
        let mut coordinator = group.remove(0);
        let workers = spawn_workers(group, sum_experiment());

        let mut lock = ShapeLock::new();
        let mut recorder = Recorder::new(&mut store, &schema, &mut lock);
        coordinate(&mut coordinator, tasks, false, &DistributedConfig::default(), &mut recorder)
            .await
            .unwrap();
        let summary = recorder.finish();

        let mut executed = 0;
        for worker in workers {
            executed += worker.await.unwrap().unwrap();
        }
        assert_eq!(executed, 4);
        assert_eq!((summary.completed, summary.failed), (3, 1));
        assert_eq!(
            store.get(&Coordinate::from([1, 0])).unwrap().status,
            CellStatus::Failed
        );
        assert_eq!(
            store.get(&Coordinate::from([1, 1])).unwrap().results.get("result"),
            Some(&gs_types::Value::Int(4))
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn single_worker_follows_priority_order() {
        let grid = GridSpace::new(ParameterSpace::new().add("x", [0, 1, 2])).unwrap();
        let schema = ReturnSchema::new();
        let mut store = CellStore::new(grid);
        for (i, priority) in [1, 3, 2].into_iter().enumerate() {
            store.set_priority(&Coordinate::from([i]), priority).unwrap();
        }
        let tasks = tasks_for(&store);
        let mut group = local_group(2).unwrap();
        let mut coordinator = group.remove(0);
        let experiment: Arc<dyn Experiment> =
            Arc::new(|_: &Kwargs| -> anyhow::Result<Outcome> { Ok(Outcome::empty()) });
        let workers = spawn_workers(group, experiment);

        let mut lock = ShapeLock::new();
        let mut recorder = Recorder::new(&mut store, &schema, &mut lock);
        coordinate(&mut coordinator, tasks, true, &DistributedConfig::default(), &mut recorder)
            .await
            .unwrap();
        let summary = recorder.finish();
        for worker in workers {
            worker.await.unwrap().unwrap();
        }

        assert_eq!(
            summary.dispatched,
            vec![Coordinate::from([1]), Coordinate::from([2]), Coordinate::from([0])]
        );
        assert!(store.get(&Coordinate::from([0])).unwrap().duration.is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn lost_worker_fails_only_its_cell() {
        let (mut store, schema) = sum_grid();
        let tasks = tasks_for(&store);
        let mut group = local_group(3).unwrap();
        let mut rogue = group.pop().unwrap();
        let mut coordinator = group.remove(0);

        // Takes the first task and disappears
        rogue.send(0, Message::Ready { report: None }).await.unwrap();
        let rogue = tokio::spawn(async move {
            match rogue.recv().await.unwrap() {
                Incoming::Message { message: Message::Assign { task, .. }, .. } => task.coordinate,
                other => panic!("Expected Assign, got {other:?}"),
            }
        });
        let workers = spawn_workers(group, sum_experiment());

        let mut lock = ShapeLock::new();
        let mut recorder = Recorder::new(&mut store, &schema, &mut lock);
        coordinate(&mut coordinator, tasks, false, &DistributedConfig::default(), &mut recorder)
            .await
            .unwrap();
        let summary = recorder.finish();
        for worker in workers {
            worker.await.unwrap().unwrap();
        }
        let lost = rogue.await.unwrap();

        assert_eq!(lost, Coordinate::from([0, 0]));
        assert_eq!(summary.executed(), 4);
        let cell = store.get(&lost).unwrap();
        assert_eq!(cell.status, CellStatus::Failed);
        assert!(cell.error.as_deref().unwrap().contains("lost"));
        assert_eq!(store.status_counts().get(&CellStatus::NotStarted), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn silent_worker_times_out() {
        let (mut store, schema) = sum_grid();
        let tasks = tasks_for(&store);
        let mut group = local_group(3).unwrap();
        let mut silent = group.pop().unwrap();
        let mut coordinator = group.remove(0);

        // Takes the first task and never answers
        silent.send(0, Message::Ready { report: None }).await.unwrap();
        let config = DistributedConfig::default()
            .with_worker_timeout(Duration::from_millis(200))
            .with_shutdown_grace(Duration::from_millis(100));

        let mut lock = ShapeLock::new();
        let mut recorder = Recorder::new(&mut store, &schema, &mut lock);
        let first = Coordinate::from([0, 0]);
        let workers = spawn_workers(group, sum_experiment());
        coordinate(&mut coordinator, tasks, false, &config, &mut recorder)
            .await
            .unwrap();
        let summary = recorder.finish();
        for worker in workers {
            worker.await.unwrap().unwrap();
        }
        drop(silent);

        assert_eq!(summary.dispatched[0], first);
        let cell = store.get(&first).unwrap();
        assert_eq!(cell.status, CellStatus::Failed);
        assert!(cell.error.as_deref().unwrap().contains("did not report"));
        assert_eq!(summary.executed(), 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn report_for_unassigned_cell_is_a_protocol_error() {
        let (mut store, schema) = sum_grid();
        let tasks = tasks_for(&store);
        let mut group = local_group(2).unwrap();
        let mut worker = group.pop().unwrap();
        let mut coordinator = group.remove(0);

        worker
            .send(
                0,
                Message::Ready {
                    report: Some(TaskReport {
                        coordinate: Coordinate::from([1, 1]),
                        outcome: ReportOutcome::Success(Outcome::scalar(4)),
                        duration: None,
                    }),
                },
            )
            .await
            .unwrap();

        let mut lock = ShapeLock::new();
        let mut recorder = Recorder::new(&mut store, &schema, &mut lock);
        let result =
            coordinate(&mut coordinator, tasks, false, &DistributedConfig::default(), &mut recorder).await;
        match result {
            Err(GsError::Protocol(ProtocolError::UnassignedReport { rank: 1, .. })) => (),
            other => panic!("Expected UnassignedReport, got {other:?}"),
        }
    }
}
