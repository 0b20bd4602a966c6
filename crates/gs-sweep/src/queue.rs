use std::collections::VecDeque;

use gs_types::GsResult;

use crate::grid::Coordinate;
use crate::store::CellStore;
use crate::task::Task;

/// A pending coordinate with the priority it had when the queue was built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub coordinate: Coordinate,
    pub priority: i64,
}

/// Dispatch order for one run: highest priority first, ties broken by
/// ascending coordinate. Fixed once built.
#[derive(Debug, Clone, Default)]
pub struct DispatchQueue {
    entries: VecDeque<QueueEntry>,
}

impl DispatchQueue {
    pub fn build(store: &CellStore, pending: Vec<Coordinate>) -> GsResult<Self> {
        let mut entries = Vec::with_capacity(pending.len());
        for coordinate in pending {
            let priority = store.get(&coordinate)?.priority;
            entries.push(QueueEntry {
                coordinate,
                priority,
            });
        }
        entries.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.coordinate.cmp(&b.coordinate))
        });
        Ok(Self {
            entries: entries.into(),
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueueEntry> {
        self.entries.iter()
    }

    /// Materialize tasks in dispatch order.
    pub fn into_tasks(self, store: &CellStore, pass_identifier: bool) -> GsResult<Vec<Task>> {
        self.entries
            .into_iter()
            .map(|entry| {
                Ok(Task {
                    kwargs: store.kwargs(&entry.coordinate, pass_identifier)?,
                    coordinate: entry.coordinate,
                    priority: entry.priority,
                })
            })
            .collect()
    }
}
