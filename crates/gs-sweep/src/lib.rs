//! # gs-sweep
//!
//! Grid construction and per-cell bookkeeping for GridSweep.
//!
//! Provides the parameter grid, the cell store, status selection and reset,
//! the priority-ordered dispatch queue, the declared return schema and the
//! task/experiment contract shared by every execution backend.

mod grid;
mod queue;
mod schema;
mod status;
mod store;
mod task;

pub use grid::{
    is_reserved, Coordinate, GridSpace, Parameter, ParameterSpace, IDENTIFIER_ARGUMENT,
    RESERVED_ARGUMENTS,
};
pub use queue::{DispatchQueue, QueueEntry};
pub use schema::{OutputDecl, ReturnSchema, SchemaViolation, ShapeLock};
pub use status::{pending, reset_coordinates, reset_statuses, StatusFilter};
pub use store::CellStore;
pub use task::{execute_task, Experiment, Kwargs, ReportOutcome, Task, TaskReport};
