use thiserror::Error;

/// Main error type for the GridSweep system
#[derive(Error, Debug)]
pub enum GsError {
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Arrow error: {0}")]
    Arrow(String),

    #[error("Parquet error: {0}")]
    Parquet(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Errors raised while loading or saving a sweep snapshot
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("File already exists: {path}")]
    FileExists { path: String },

    #[error("File format not supported: {extension}")]
    UnsupportedFormat { extension: String },

    #[error("No save path configured")]
    NoSavePath,

    #[error("Parameter mismatch: {message}")]
    ParameterMismatch { message: String },

    #[error("Return value mismatch: {message}")]
    ReturnValueMismatch { message: String },

    #[error("Snapshot corruption detected: {message}")]
    Corruption { message: String },
}

/// Errors in the coordinator/worker message exchange
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Unexpected message from rank {rank}: expected {expected}, got {got}")]
    UnexpectedMessage {
        rank: usize,
        expected: String,
        got: String,
    },

    #[error("Unexpected sender: rank {rank} is not a worker of this group")]
    UnexpectedSender { rank: usize },

    #[error("Rank {rank} reported {coordinate} which was not assigned to it")]
    UnassignedReport { rank: usize, coordinate: String },

    #[error("Rank {rank} disconnected")]
    Disconnected { rank: usize },

    #[error("Invalid process group: {message}")]
    InvalidGroup { message: String },

    #[error("Frame of {size} bytes exceeds the limit of {limit} bytes")]
    FrameTooLarge { size: usize, limit: usize },

    #[error("Undecodable frame from rank {rank}: {message}")]
    MalformedFrame { rank: usize, message: String },
}

/// Result type alias for GridSweep operations
pub type GsResult<T> = Result<T, GsError>;

/// Macro for creating validation errors
#[macro_export]
macro_rules! validation_error {
    ($($arg:tt)*) => {
        $crate::GsError::Validation(format!($($arg)*))
    };
}

/// Macro for creating internal errors
#[macro_export]
macro_rules! internal_error {
    ($($arg:tt)*) => {
        $crate::GsError::Internal(format!($($arg)*))
    };
}

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::GsError::Config(format!($($arg)*))
    };
}
