pub mod columnar;
pub mod snapshot;
pub mod storage;

pub use columnar::{read_parquet, write_parquet, HEADER_METADATA_KEY};
pub use snapshot::*;
pub use storage::*;
