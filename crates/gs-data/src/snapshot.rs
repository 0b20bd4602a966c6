use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gs_sweep::{CellStore, GridSpace, ParameterSpace, ReturnSchema};
use gs_types::{Cell, GsResult, PersistenceError};

/// Layout version written into every snapshot
pub const SNAPSHOT_VERSION: u32 = 1;

/// Everything needed to rebuild the grid a snapshot belongs to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotHeader {
    pub version: u32,
    pub parameters: ParameterSpace,
    pub outputs: ReturnSchema,
    pub custom_arguments: Vec<String>,
    pub saved_at: DateTime<Utc>,
}

/// Point-in-time copy of a cell store, cells in row-major order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub header: SnapshotHeader,
    pub cells: Vec<Cell>,
}

impl StoreSnapshot {
    pub fn capture(store: &CellStore, outputs: &ReturnSchema) -> Self {
        Self {
            header: SnapshotHeader {
                version: SNAPSHOT_VERSION,
                parameters: store.grid().space().clone(),
                outputs: outputs.clone(),
                custom_arguments: store.custom_arguments().to_vec(),
                saved_at: Utc::now(),
            },
            cells: store.cells().to_vec(),
        }
    }

    /// Rebuild the store for `grid`, checking that the snapshot describes the
    /// same parameters and at least the declared outputs.
    ///
    /// Returns the store and the stored output schema, which may declare more
    /// outputs than `outputs`.
    pub fn restore(self, grid: GridSpace, outputs: &ReturnSchema) -> GsResult<(CellStore, ReturnSchema)> {
        self.check_parameters(grid.space())?;
        self.check_outputs(outputs)?;

        let store = CellStore::from_parts(grid, self.cells, self.header.custom_arguments)
            .map_err(|e| PersistenceError::Corruption { message: e.to_string() })?;
        Ok((store, self.header.outputs))
    }

    fn check_parameters(&self, space: &ParameterSpace) -> GsResult<()> {
        let saved = self.header.parameters.names();
        let requested = space.names();
        if saved != requested {
            return Err(PersistenceError::ParameterMismatch {
                message: format!("saved parameters {saved:?}, requested {requested:?}"),
            }.into());
        }

        for (saved, requested) in self.header.parameters.parameters.iter().zip(&space.parameters) {
            let same = saved.values.len() == requested.values.len()
                && saved.values.iter().zip(&requested.values).all(|(a, b)| a.approx_eq(b));
            if !same {
                return Err(PersistenceError::ParameterMismatch {
                    message: format!("values of '{}' differ from the saved values", saved.name),
                }.into());
            }
        }
        Ok(())
    }

    fn check_outputs(&self, outputs: &ReturnSchema) -> GsResult<()> {
        for output in &outputs.outputs {
            match self.header.outputs.kind_of(&output.name) {
                Some(kind) if kind == output.kind => {}
                Some(kind) => {
                    return Err(PersistenceError::ReturnValueMismatch {
                        message: format!(
                            "'{}' is saved as {} but declared as {}",
                            output.name, kind, output.kind
                        ),
                    }.into())
                }
                None => {
                    return Err(PersistenceError::ReturnValueMismatch {
                        message: format!(
                            "'{}' is not among the saved outputs {:?}",
                            output.name,
                            self.header.outputs.names()
                        ),
                    }.into())
                }
            }
        }
        Ok(())
    }
}
