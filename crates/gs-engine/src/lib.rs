// GridSweep execution engine
// Runs the pending cells of a sweep sequentially, on a local worker pool or
// across a group of ranks, and records every outcome through one Recorder.

pub mod distributed;
pub mod pool;
pub mod recorder;
pub mod sequential;
pub mod sweep;

pub use distributed::{
    coordinate, local_group, serve, DistributedConfig, Incoming, LocalTransport, Message,
    TcpTransport, Transport,
};
pub use recorder::{PersistHook, Recorder, RunSummary};
pub use sweep::{Backend, DistributedBackend, RunOptions, Sweep, SweepConfig};
