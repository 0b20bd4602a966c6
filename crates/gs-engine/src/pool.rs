// Worker pool backend
// Tasks are submitted FIFO to a fixed rayon pool in dispatch order; reports
// come back over a crossbeam channel and are applied on the calling thread.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::unbounded;
use gs_sweep::{execute_task, Coordinate, Experiment, Task, TaskReport};
use gs_types::{internal_error, GsResult};
use tracing::{error, info, warn};

use crate::recorder::Recorder;

/// Worker count used when none is configured
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

pub fn run(
    tasks: Vec<Task>,
    experiment: Arc<dyn Experiment>,
    max_workers: Option<usize>,
    timeit: bool,
    recorder: &mut Recorder<'_>,
) -> GsResult<()> {
    if tasks.is_empty() {
        return Ok(());
    }

    let workers = max_workers.unwrap_or_else(default_workers).max(1);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("sweep-worker-{i}"))
        .panic_handler(|_| error!("Worker thread panicked outside of an experiment"))
        .build()
        .map_err(|e| internal_error!("failed to start worker pool: {}", e))?;
    info!("Running {} experiments on {} workers", tasks.len(), workers);

    let (tx, rx) = unbounded::<TaskReport>();
    let abort = Arc::new(AtomicBool::new(false));
    let mut in_flight: HashSet<Coordinate> = HashSet::with_capacity(tasks.len());

    for task in tasks {
        recorder.dispatch(&task.coordinate)?;
        in_flight.insert(task.coordinate.clone());

        let tx = tx.clone();
        let experiment = Arc::clone(&experiment);
        let abort = Arc::clone(&abort);
        pool.spawn_fifo(move || {
            if abort.load(Ordering::Relaxed) {
                return;
            }
            let report = execute_task(experiment.as_ref(), &task, timeit);
            let _ = tx.send(report);
        });
    }
    drop(tx);

    while !in_flight.is_empty() {
        match rx.recv() {
            Ok(report) => {
                in_flight.remove(&report.coordinate);
                if let Err(e) = recorder.apply(report) {
                    abort.store(true, Ordering::Relaxed);
                    return Err(e);
                }
            }
            Err(_) => {
                // Every job has finished, so whatever is left never reported.
                warn!("{} experiments ended without a report", in_flight.len());
                let mut lost: Vec<Coordinate> = in_flight.drain().collect();
                lost.sort();
                for coord in lost {
                    recorder.apply(TaskReport::failure(
                        coord,
                        "worker terminated before reporting a result",
                    ))?;
                }
            }
        }
    }
    Ok(())
}
