//! Error types shared across the toolkit.
//!
//! Structural impossibilities (bad level index, missing required pointer,
//! addresses outside the image) are fatal for the level they concern and
//! propagate as [`Error`]. Malformed persisted text surfaces as the parse
//! enums so callers can point at the offending line.

use thiserror::Error;

use crate::directory::ComponentKind;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("level index {index} out of range: table holds {count} levels")]
    LevelOutOfRange { index: usize, count: usize },

    #[error("level {level} has no {kind} pointer")]
    MissingComponent { level: usize, kind: ComponentKind },

    #[error("the {layout} layout has no {kind} component")]
    ComponentNotInLayout {
        layout: &'static str,
        kind: ComponentKind,
    },

    #[error("pointer {addr:#010x} does not map into the image")]
    BadAddress { addr: u32 },

    #[error("directory table at {addr:#010x} does not fit the image")]
    TableOutOfBounds { addr: u32 },

    #[error("grid text error: {0}")]
    GridText(#[from] GridTextError),

    #[error("object text error: {0}")]
    ObjectText(#[from] ObjectTextError),

    #[error("manifest error: {0}")]
    Manifest(#[from] serde_json::Error),
}

/// Failures while parsing the text form of a dimensioned or fixed grid.
#[derive(Debug, Error)]
pub enum GridTextError {
    #[error("missing dimension header")]
    MissingHeader,

    #[error("bad dimension header {0:?}")]
    BadHeader(String),

    #[error("line {line}: expected {expected} cells, found {found}")]
    ShortRow {
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("line {line}: {token:?} is not a hex cell value")]
    BadToken { line: usize, token: String },

    #[error("line {line}: cell value {value:#x} exceeds 16 bits")]
    CellRange { line: usize, value: u32 },

    #[error("expected {expected} rows, found {found}")]
    MissingRows { expected: usize, found: usize },
}

/// Failures while parsing the text form of an object table.
#[derive(Debug, Error)]
pub enum ObjectTextError {
    #[error("line {line}: expected 4 columns, found {found}")]
    ShortRow { line: usize, found: usize },

    #[error("line {line}: {token:?} is not a decimal value")]
    BadToken { line: usize, token: String },
}

pub type Result<T> = std::result::Result<T, Error>;
