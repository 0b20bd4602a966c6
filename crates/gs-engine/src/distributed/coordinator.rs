use std::collections::{HashMap, HashSet, VecDeque};

use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

use gs_sweep::{Coordinate, Task, TaskReport};
use gs_types::{GsResult, ProtocolError};

use super::protocol::Message;
use super::transport::{Incoming, Transport};
use super::DistributedConfig;
use crate::recorder::Recorder;

/// Rank 0 loop: hand tasks to whichever worker reports ready, in queue
/// order, until the queue is drained and every outcome is in.
pub async fn coordinate(
    transport: &mut dyn Transport,
    tasks: Vec<Task>,
    timeit: bool,
    config: &DistributedConfig,
    recorder: &mut Recorder<'_>,
) -> GsResult<()> {
    if transport.rank() != 0 {
        return Err(ProtocolError::InvalidGroup {
            message: format!("rank {} cannot coordinate, only rank 0 can", transport.rank()),
        }
        .into());
    }
    let size = transport.size();
    let workers = size.saturating_sub(1);
    if workers == 0 {
        return Err(ProtocolError::InvalidGroup {
            message: "no worker ranks in the group".to_string(),
        }
        .into());
    }

    let mut queue: VecDeque<Task> = tasks.into();
    let mut in_flight: HashMap<usize, (Coordinate, Instant)> = HashMap::new();
    // Workers that were terminated, lost or timed out
    let mut retired: HashSet<usize> = HashSet::new();
    info!("Coordinating {} experiments across {} workers", queue.len(), workers);

    while !queue.is_empty() || !in_flight.is_empty() {
        if retired.len() == workers {
            warn!("All workers are gone, {} experiments were not dispatched", queue.len());
            break;
        }

        let deadline = config.worker_timeout.and_then(|limit| {
            in_flight.values().map(|(_, started)| *started + limit).min()
        });
        let incoming = match deadline {
            Some(deadline) => match timeout(deadline.saturating_duration_since(Instant::now()), transport.recv()).await {
                Ok(incoming) => incoming?,
                Err(_) => {
                    expire_overdue(&mut in_flight, &mut retired, config, recorder)?;
                    continue;
                }
            },
            None => transport.recv().await?,
        };

        let (source, message) = match incoming {
            Incoming::Hangup { source } => {
                retired.insert(source);
                if let Some((coord, _)) = in_flight.remove(&source) {
                    warn!(rank = source, coordinate = %coord, "Worker lost while running an experiment");
                    recorder.apply(TaskReport::failure(
                        coord,
                        format!("worker {source} was lost while running this experiment"),
                    ))?;
                }
                continue;
            }
            Incoming::Message { source, message } => (source, message),
        };
        check_worker(source, size)?;

        let report = match message {
            Message::Ready { report } => report,
            other => {
                return Err(ProtocolError::UnexpectedMessage {
                    rank: source,
                    expected: "ready".to_string(),
                    got: other.kind().to_string(),
                }
                .into())
            }
        };

        if retired.contains(&source) {
            // Late report from a worker that already timed out; its cell was failed.
            debug!(rank = source, "Ignoring report from retired worker");
            let _ = transport.send(source, Message::Terminate).await;
            continue;
        }

        match (report, in_flight.remove(&source)) {
            (Some(report), Some((coord, _))) if report.coordinate == coord => recorder.apply(report)?,
            (Some(report), _) => {
                return Err(ProtocolError::UnassignedReport {
                    rank: source,
                    coordinate: report.coordinate.to_string(),
                }
                .into())
            }
            (None, Some((coord, _))) => {
                return Err(ProtocolError::UnexpectedMessage {
                    rank: source,
                    expected: format!("a report for {coord}"),
                    got: "ready without a report".to_string(),
                }
                .into())
            }
            (None, None) => {}
        }

        match queue.pop_front() {
            Some(task) => {
                let coord = task.coordinate.clone();
                recorder.dispatch(&coord)?;
                debug!(rank = source, coordinate = %coord, "Assigning experiment");
                if transport.send(source, Message::Assign { task, timeit }).await.is_err() {
                    retired.insert(source);
                    recorder.apply(TaskReport::failure(
                        coord,
                        format!("worker {source} disconnected before the experiment was delivered"),
                    ))?;
                } else {
                    in_flight.insert(source, (coord, Instant::now()));
                }
            }
            None => {
                let _ = transport.send(source, Message::Terminate).await;
                retired.insert(source);
            }
        }
    }

    release_workers(transport, &mut retired, config).await
}

fn check_worker(source: usize, size: usize) -> GsResult<()> {
    if source == 0 || source >= size {
        return Err(ProtocolError::UnexpectedSender { rank: source }.into());
    }
    Ok(())
}

fn expire_overdue(
    in_flight: &mut HashMap<usize, (Coordinate, Instant)>,
    retired: &mut HashSet<usize>,
    config: &DistributedConfig,
    recorder: &mut Recorder<'_>,
) -> GsResult<()> {
    let Some(limit) = config.worker_timeout else {
        return Ok(());
    };
    let now = Instant::now();
    let mut overdue: Vec<usize> = in_flight
        .iter()
        .filter(|(_, (_, started))| *started + limit <= now)
        .map(|(rank, _)| *rank)
        .collect();
    overdue.sort_unstable();

    for rank in overdue {
        if let Some((coord, _)) = in_flight.remove(&rank) {
            warn!(rank, coordinate = %coord, "No report from worker within {:?}", limit);
            retired.insert(rank);
            recorder.apply(TaskReport::failure(
                coord,
                format!("worker {rank} did not report within {limit:?}"),
            ))?;
        }
    }
    Ok(())
}

/// Terminate idle workers that have not been told to stop, waiting at most
/// the configured grace period.
async fn release_workers(
    transport: &mut dyn Transport,
    retired: &mut HashSet<usize>,
    config: &DistributedConfig,
) -> GsResult<()> {
    let size = transport.size();
    let deadline = Instant::now() + config.shutdown_grace;

    while retired.len() < size - 1 {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let incoming = match timeout(remaining, transport.recv()).await {
            Ok(incoming) => incoming?,
            Err(_) => {
                warn!("{} workers did not check in before shutdown", size - 1 - retired.len());
                break;
            }
        };
        match incoming {
            Incoming::Hangup { source } => {
                retired.insert(source);
            }
            Incoming::Message { source, message: Message::Ready { report } } => {
                check_worker(source, size)?;
                if let (Some(report), false) = (&report, retired.contains(&source)) {
                    return Err(ProtocolError::UnassignedReport {
                        rank: source,
                        coordinate: report.coordinate.to_string(),
                    }
                    .into());
                }
                retired.insert(source);
                let _ = transport.send(source, Message::Terminate).await;
            }
            Incoming::Message { source, message } => {
                return Err(ProtocolError::UnexpectedMessage {
                    rank: source,
                    expected: "ready".to_string(),
                    got: message.kind().to_string(),
                }
                .into())
            }
        }
    }
    debug!("Distributed run finished");
    Ok(())
}
