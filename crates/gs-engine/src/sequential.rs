// Sequential backend
// Runs tasks one after another on the calling thread, in dispatch order.

use gs_sweep::{execute_task, Experiment, Task};
use gs_types::GsResult;
use tracing::debug;

use crate::recorder::Recorder;

pub fn run(
    tasks: Vec<Task>,
    experiment: &dyn Experiment,
    timeit: bool,
    recorder: &mut Recorder<'_>,
) -> GsResult<()> {
    let total = tasks.len();
    for (done, task) in tasks.into_iter().enumerate() {
        debug!("{} experiments left", total - done);
        recorder.dispatch(&task.coordinate)?;
        let report = execute_task(experiment, &task, timeit);
        recorder.apply(report)?;
    }
    Ok(())
}
