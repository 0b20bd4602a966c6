use std::sync::Arc;

use tracing::{debug, info};

use gs_sweep::{execute_task, Experiment, TaskReport};
use gs_types::{GsResult, ProtocolError};

use super::protocol::Message;
use super::transport::{Incoming, Transport};

/// Worker loop: announce readiness with the previous report, run what the
/// coordinator assigns, stop on `Terminate`. Returns the number of tasks run.
pub async fn serve(transport: &mut dyn Transport, experiment: Arc<dyn Experiment>) -> GsResult<usize> {
    let rank = transport.rank();
    if rank == 0 {
        return Err(ProtocolError::InvalidGroup {
            message: "rank 0 is the coordinator and cannot serve tasks".to_string(),
        }
        .into());
    }

    let mut report: Option<TaskReport> = None;
    let mut executed = 0;
    loop {
        transport.send(0, Message::Ready { report: report.take() }).await?;

        match next_from_coordinator(transport).await? {
            Message::Assign { task, timeit } => {
                debug!(rank, coordinate = %task.coordinate, "Running experiment");
                let coordinate = task.coordinate.clone();
                let experiment = Arc::clone(&experiment);
                let result = tokio::task::spawn_blocking(move || execute_task(experiment.as_ref(), &task, timeit)).await;
                report = Some(match result {
                    Ok(report) => report,
                    Err(e) => TaskReport::failure(coordinate, format!("experiment task did not complete: {e}")),
                });
                executed += 1;
            }
            Message::Terminate => break,
            other => {
                return Err(ProtocolError::UnexpectedMessage {
                    rank: 0,
                    expected: "assign or terminate".to_string(),
                    got: other.kind().to_string(),
                }
                .into())
            }
        }
    }

    info!(rank, "Worker finished after {} experiments", executed);
    Ok(executed)
}

async fn next_from_coordinator(transport: &mut dyn Transport) -> GsResult<Message> {
    loop {
        match transport.recv().await? {
            Incoming::Message { source: 0, message } => return Ok(message),
            Incoming::Message { source, .. } => return Err(ProtocolError::UnexpectedSender { rank: source }.into()),
            Incoming::Hangup { source: 0 } => return Err(ProtocolError::Disconnected { rank: 0 }.into()),
            Incoming::Hangup { .. } => continue,
        }
    }
}
