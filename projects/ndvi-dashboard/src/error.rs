use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

use crate::catalog::selection::Level;

/// A field record that could not be turned into a polygon part.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NormalizeError {
    #[error("record {record_id}: unparsable geometry: {reason}")]
    Geometry { record_id: String, reason: String },

    #[error("record {record_id}: no value for field key '{key}'")]
    MissingKey { record_id: String, key: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExtractionError {
    #[error("field has no geometry")]
    EmptyGeometry,

    #[error("request failed: {0}")]
    Request(String),

    #[error("index service rejected the request: {0}")]
    Rejected(String),

    #[error("invalid index response: {0}")]
    Decode(String),

    #[error("extraction worker stopped before reporting")]
    WorkerLost,
}

/// Per-field extraction failure, collected and reported after the loop.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[error("extraction failed for field '{field}': {reason}")]
pub struct ExtractionFailure {
    pub field: String,
    pub reason: String,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReshapeError {
    #[error("duplicate sample for field '{field}' on {date}")]
    DuplicateSample { field: String, date: NaiveDate },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum InterpolationError {
    #[error("field '{field}' has {known} known observation(s), at least 2 are required")]
    InsufficientData { field: String, known: usize },

    #[error("interpolation system for field '{field}' is singular")]
    Singular { field: String },
}

impl InterpolationError {
    pub fn field(&self) -> &str {
        match self {
            Self::InsufficientData { field, .. } | Self::Singular { field } => field,
        }
    }
}

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("catalog IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("catalog JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum SelectionError {
    #[error("no {0} available for this selection")]
    Empty(Level),

    #[error("{level} {id} not found")]
    NotFound { level: Level, id: u64 },

    #[error("no {0} selected")]
    Unselected(Level),

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("no data for this selection: {detail}")]
    EmptyResult { detail: String },

    #[error(transparent)]
    Interpolation(#[from] InterpolationError),

    #[error(transparent)]
    Reshape(#[from] ReshapeError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

impl PipelineError {
    pub fn empty(detail: impl Into<String>) -> Self {
        Self::EmptyResult {
            detail: detail.into(),
        }
    }
}
