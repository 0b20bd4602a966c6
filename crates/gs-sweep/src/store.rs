//! Dense per-coordinate record store.

use std::collections::BTreeMap;

use gs_types::{
    config_error, new_identifier, validation_error, Cell, CellStatus, GsResult, Value,
};

use crate::grid::{is_reserved, Coordinate, GridSpace, IDENTIFIER_ARGUMENT};
use crate::task::Kwargs;

/// One [`Cell`] per grid coordinate, stored in row-major order.
///
/// Cells are only mutated through the store, so the lifecycle rules hold no
/// matter which backend produced an outcome.
#[derive(Debug, Clone)]
pub struct CellStore {
    grid: GridSpace,
    cells: Vec<Cell>,
    custom_arguments: Vec<String>,
}

impl CellStore {
    pub fn new(grid: GridSpace) -> Self {
        let cells = vec![Cell::new(); grid.cardinality()];
        Self {
            grid,
            cells,
            custom_arguments: Vec::new(),
        }
    }

    /// Rebuild a store from persisted cells.
    pub fn from_parts(
        grid: GridSpace,
        cells: Vec<Cell>,
        custom_arguments: Vec<String>,
    ) -> GsResult<Self> {
        if cells.len() != grid.cardinality() {
            return Err(validation_error!(
                "grid has {} points but {} cells were supplied",
                grid.cardinality(),
                cells.len()
            ));
        }
        Ok(Self {
            grid,
            cells,
            custom_arguments,
        })
    }

    pub fn grid(&self) -> &GridSpace {
        &self.grid
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn custom_arguments(&self) -> &[String] {
        &self.custom_arguments
    }

    pub fn get(&self, coord: &Coordinate) -> GsResult<&Cell> {
        let idx = self.index_of(coord)?;
        Ok(&self.cells[idx])
    }

    /// Cells paired with their coordinates, in lexicographic order.
    pub fn iter(&self) -> impl Iterator<Item = (Coordinate, &Cell)> + '_ {
        self.grid.coordinates().zip(self.cells.iter())
    }

    pub fn status_counts(&self) -> BTreeMap<CellStatus, usize> {
        let mut counts = BTreeMap::new();
        for cell in &self.cells {
            *counts.entry(cell.status).or_insert(0) += 1;
        }
        counts
    }

    fn index_of(&self, coord: &Coordinate) -> GsResult<usize> {
        self.grid.flat_index(coord).ok_or_else(|| {
            validation_error!(
                "coordinate {} is outside the grid of shape {:?}",
                coord,
                self.grid.shape()
            )
        })
    }

    // ---------- external edits ----------

    /// Mark a cell `Skip` or send it back to `NotStarted`.
    pub fn set_status(&mut self, coord: &Coordinate, status: CellStatus) -> GsResult<()> {
        let idx = self.index_of(coord)?;
        match status {
            CellStatus::Skip => self.cells[idx].status = CellStatus::Skip,
            CellStatus::NotStarted => self.cells[idx].reset(),
            other => {
                return Err(validation_error!(
                    "status of {} cannot be set to {}; only execution produces it",
                    coord,
                    other
                ))
            }
        }
        Ok(())
    }

    pub fn set_priority(&mut self, coord: &Coordinate, priority: i64) -> GsResult<()> {
        let idx = self.index_of(coord)?;
        self.cells[idx].priority = priority;
        Ok(())
    }

    /// Declare an extra keyword argument with a default for every cell.
    pub fn add_custom_argument(&mut self, name: &str, default: Value) -> GsResult<()> {
        if is_reserved(name) {
            return Err(config_error!(
                "The name '{}' is reserved and cannot be used as a custom argument",
                name
            ));
        }
        if self.grid.contains_dim(name) {
            return Err(config_error!("'{}' is already a parameter", name));
        }
        if self.custom_arguments.iter().any(|a| a == name) {
            return Err(config_error!("'{}' is already a custom argument", name));
        }
        self.custom_arguments.push(name.to_string());
        for cell in &mut self.cells {
            cell.custom_args.insert(name.to_string(), default.clone());
        }
        Ok(())
    }

    pub fn set_custom_argument(
        &mut self,
        coord: &Coordinate,
        name: &str,
        value: Value,
    ) -> GsResult<()> {
        if !self.custom_arguments.iter().any(|a| a == name) {
            return Err(validation_error!("'{}' is not a custom argument", name));
        }
        let idx = self.index_of(coord)?;
        self.cells[idx].custom_args.insert(name.to_string(), value);
        Ok(())
    }

    /// Give every cell without an identifier a fresh one.
    pub fn ensure_identifiers(&mut self) -> usize {
        let mut generated = 0;
        for cell in &mut self.cells {
            if cell.identifier.is_none() {
                cell.identifier = Some(new_identifier());
                generated += 1;
            }
        }
        generated
    }

    /// Reset every cell matching `predicate`; returns how many were touched.
    pub fn reset_where<F>(&mut self, mut predicate: F) -> usize
    where
        F: FnMut(&Coordinate, &Cell) -> bool,
    {
        let mut touched = 0;
        for (flat, cell) in self.cells.iter_mut().enumerate() {
            let Some(coord) = self.grid.coordinate_at(flat) else {
                continue;
            };
            if predicate(&coord, cell) {
                cell.reset();
                touched += 1;
            }
        }
        touched
    }

    // ---------- outcome application ----------

    pub fn record_success(
        &mut self,
        coord: &Coordinate,
        results: BTreeMap<String, Value>,
        duration: Option<f64>,
    ) -> GsResult<()> {
        let idx = self.index_of(coord)?;
        self.cells[idx].mark_completed(results, duration);
        Ok(())
    }

    pub fn record_failure(&mut self, coord: &Coordinate, error: String) -> GsResult<()> {
        let idx = self.index_of(coord)?;
        self.cells[idx].mark_failed(error);
        Ok(())
    }

    // ---------- task inputs ----------

    /// Keyword arguments for the experiment at `coord`.
    pub fn kwargs(&self, coord: &Coordinate, pass_identifier: bool) -> GsResult<Kwargs> {
        let cell = self.get(coord)?;
        let values = self
            .grid
            .resolve(coord)
            .ok_or_else(|| validation_error!("coordinate {} is outside the grid", coord))?;

        let mut kwargs = Kwargs::new();
        for (name, value) in values {
            kwargs.insert(name, value.clone());
        }
        for (name, value) in &cell.custom_args {
            kwargs.insert(name, value.clone());
        }
        if pass_identifier {
            let identifier = cell.identifier.clone().ok_or_else(|| {
                validation_error!("cell {} has no identifier assigned", coord)
            })?;
            kwargs.insert(IDENTIFIER_ARGUMENT, Value::Str(identifier));
        }
        Ok(kwargs)
    }
}
