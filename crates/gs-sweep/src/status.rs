//! Status selection and reset rules for grid cells.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::str::FromStr;
use tracing::debug;

use gs_types::{CellStatus, GsError, GsResult};

use crate::grid::Coordinate;
use crate::store::CellStore;

/// Set of statuses a run or a reset applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusFilter {
    statuses: BTreeSet<CellStatus>,
}

impl StatusFilter {
    pub fn new<I: IntoIterator<Item = CellStatus>>(statuses: I) -> Self {
        Self {
            statuses: statuses.into_iter().collect(),
        }
    }

    /// Every status; used when a run is asked to execute everything.
    pub fn all() -> Self {
        Self::new(CellStatus::ALL)
    }

    pub fn only(status: CellStatus) -> Self {
        Self::new([status])
    }

    /// Default selection for [`reset_statuses`].
    pub fn finished() -> Self {
        Self::new([CellStatus::Completed, CellStatus::Failed])
    }

    pub fn matches(&self, status: CellStatus) -> bool {
        self.statuses.contains(&status)
    }

    pub fn statuses(&self) -> impl Iterator<Item = CellStatus> + '_ {
        self.statuses.iter().copied()
    }
}

impl Default for StatusFilter {
    fn default() -> Self {
        Self::only(CellStatus::NotStarted)
    }
}

/// Parses a string of status codes such as `"NF"` or a comma separated list
/// such as `"not_started,failed"`. An empty string selects every status.
impl FromStr for StatusFilter {
    type Err = GsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(Self::all());
        }
        if s.contains(',') {
            let statuses = s
                .split(',')
                .map(str::parse)
                .collect::<GsResult<Vec<CellStatus>>>()?;
            return Ok(Self::new(statuses));
        }
        if let Ok(status) = s.parse::<CellStatus>() {
            return Ok(Self::only(status));
        }
        let statuses = s
            .chars()
            .map(|c| c.to_string().parse())
            .collect::<GsResult<Vec<CellStatus>>>()?;
        Ok(Self::new(statuses))
    }
}

/// Coordinates whose status is selected by `filter`, in lexicographic order.
pub fn pending(store: &CellStore, filter: &StatusFilter) -> Vec<Coordinate> {
    store
        .iter()
        .filter(|(_, cell)| filter.matches(cell.status))
        .map(|(coord, _)| coord)
        .collect()
}

/// Send every cell whose status is selected by `filter` back to `NotStarted`.
pub fn reset_statuses(store: &mut CellStore, filter: &StatusFilter) -> usize {
    let touched = store.reset_where(|_, cell| filter.matches(cell.status));
    debug!(touched, "reset cells by status");
    touched
}

/// Send the given cells back to `NotStarted`.
pub fn reset_coordinates(store: &mut CellStore, coords: &[Coordinate]) -> GsResult<usize> {
    let mut selected = HashSet::with_capacity(coords.len());
    for coord in coords {
        store.get(coord)?;
        selected.insert(coord);
    }
    let touched = store.reset_where(|coord, _| selected.contains(coord));
    debug!(touched, "reset selected cells");
    Ok(touched)
}
