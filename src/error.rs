use polars::prelude::PolarsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{table} table is missing required column `{column}`")]
    MissingColumn { table: String, column: String },

    #[error(
        "events for match {match_id} have {found} columns, expected {expected} to match the batch"
    )]
    ColumnMismatch {
        match_id: String,
        expected: usize,
        found: usize,
    },

    #[error("batch contains {found} distinct matches, expected {expected}")]
    MatchCountMismatch { expected: usize, found: usize },

    #[error("{table} row {row}: required value `{column}` is null")]
    NullValue {
        table: String,
        column: String,
        row: usize,
    },

    #[error("possession event {individual_poss_id} has no end frame to fall back on")]
    MissingEndFrame { individual_poss_id: String },

    #[error("{table} references possession event {event_id} in match {match_id}, which is not a player possession")]
    UnknownPossessionEvent {
        table: String,
        match_id: String,
        event_id: String,
    },

    #[error(transparent)]
    Polars(#[from] PolarsError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
