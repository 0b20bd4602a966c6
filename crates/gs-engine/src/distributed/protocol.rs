use serde::{Deserialize, Serialize};

use gs_sweep::{Task, TaskReport};

/// Frames exchanged between the coordinator (rank 0) and workers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// First frame on a new connection, worker to coordinator
    Hello { rank: usize },
    /// Worker is idle; carries the report of its previous task, if any
    Ready { report: Option<TaskReport> },
    /// Coordinator hands out the next task
    Assign { task: Task, timeit: bool },
    /// No more work; the worker exits its loop
    Terminate,
}

impl Message {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Hello { .. } => "hello",
            Self::Ready { .. } => "ready",
            Self::Assign { .. } => "assign",
            Self::Terminate => "terminate",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gs_sweep::{Coordinate, Kwargs, ReportOutcome};
    use gs_types::{Outcome, Value};

    #[test]
    fn frames_are_tagged_json() {
        let mut kwargs = Kwargs::new();
        kwargs.insert("a", Value::Int(1));
        let assign = Message::Assign {
            task: gs_sweep::Task {
                coordinate: Coordinate::from([0, 1]),
                kwargs,
                priority: 2,
            },
            timeit: true,
        };
        let json = serde_json::to_string(&assign).unwrap();
        assert!(json.contains("\"type\":\"assign\""));
        assert_eq!(serde_json::from_str::<Message>(&json).unwrap(), assign);

        let ready = Message::Ready {
            report: Some(TaskReport {
                coordinate: Coordinate::from([0, 1]),
                outcome: ReportOutcome::Success(Outcome::named([("sum", 2.5)])),
                duration: Some(0.25),
            }),
        };
        let json = serde_json::to_string(&ready).unwrap();
        assert_eq!(serde_json::from_str::<Message>(&json).unwrap(), ready);
        assert_eq!(ready.kind(), "ready");
    }
}
