use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::errors::GsError;
use crate::validation_error;
use crate::value::Value;

/// Lifecycle state of a single grid cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CellStatus {
    NotStarted,
    Completed,
    Failed,
    Skip,
}

impl CellStatus {
    pub const ALL: [CellStatus; 4] = [
        CellStatus::NotStarted,
        CellStatus::Completed,
        CellStatus::Failed,
        CellStatus::Skip,
    ];

    /// Single-letter code used in storage and on the command line
    pub fn code(&self) -> char {
        match self {
            Self::NotStarted => 'N',
            Self::Completed => 'C',
            Self::Failed => 'F',
            Self::Skip => 'S',
        }
    }

    pub fn from_code(code: char) -> Option<Self> {
        match code {
            'N' => Some(Self::NotStarted),
            'C' => Some(Self::Completed),
            'F' => Some(Self::Failed),
            'S' => Some(Self::Skip),
            _ => None,
        }
    }
}

impl fmt::Display for CellStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotStarted => "not started",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skip => "skip",
        };
        f.write_str(name)
    }
}

impl FromStr for CellStatus {
    type Err = GsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let mut chars = trimmed.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            if let Some(status) = Self::from_code(c.to_ascii_uppercase()) {
                return Ok(status);
            }
        }
        match trimmed.to_ascii_lowercase().replace(['_', ' '], "").as_str() {
            "notstarted" => Ok(Self::NotStarted),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "skip" | "skipped" => Ok(Self::Skip),
            _ => Err(validation_error!(
                "Invalid status '{}', expected one of N, C, F, S",
                s
            )),
        }
    }
}

/// Generate a fresh run-scoped identifier
pub fn new_identifier() -> String {
    Uuid::new_v4().to_string()
}

/// Per-coordinate experiment record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub status: CellStatus,
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub identifier: Option<String>,
    #[serde(default)]
    pub custom_args: BTreeMap<String, Value>,
    #[serde(default)]
    pub results: BTreeMap<String, Value>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Cell {
    pub fn new() -> Self {
        Self {
            status: CellStatus::NotStarted,
            priority: 0,
            duration: None,
            identifier: None,
            custom_args: BTreeMap::new(),
            results: BTreeMap::new(),
            error: None,
            finished_at: None,
        }
    }

    pub fn mark_completed(&mut self, results: BTreeMap<String, Value>, duration: Option<f64>) {
        self.status = CellStatus::Completed;
        self.results = results;
        self.duration = duration;
        self.error = None;
        self.finished_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, error: String) {
        self.status = CellStatus::Failed;
        self.results.clear();
        self.duration = None;
        self.error = Some(error);
        self.finished_at = Some(Utc::now());
    }

    /// Back to `NotStarted`; priority, identifier and custom arguments survive.
    pub fn reset(&mut self) {
        self.status = CellStatus::NotStarted;
        self.results.clear();
        self.duration = None;
        self.error = None;
        self.finished_at = None;
    }
}

impl Default for Cell {
    fn default() -> Self {
        Self::new()
    }
}
