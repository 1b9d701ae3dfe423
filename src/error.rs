//! Error taxonomy for the checking pipeline
//!
//! Two kinds of failure exist: validation diagnostics (rule-authored messages
//! counted by the sink, never represented as `Err`) and unrecoverable internal
//! errors, which are the variants below. Any internal error aborts the whole
//! run; `main` reports it once and exits non-zero.

use std::path::PathBuf;
use thiserror::Error;

/// Error while reading or parsing an XML document
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("XML parse error in {path} at line {line}: {message}")]
    Xml {
        path: PathBuf,
        line: usize,
        message: String,
    },
}

/// Error while loading a rule document
#[derive(Debug, Error)]
pub enum RuleLoadError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("invalid rule document {path}: {message}")]
    Invalid { path: PathBuf, message: String },

    #[error("include cycle detected at {path}")]
    IncludeCycle { path: PathBuf },
}

/// Structural fault while evaluating a rule set against a document
///
/// Distinct from a diagnostic: a diagnostic is data the rule author produced,
/// an `EngineError` means the rule set itself could not be executed.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid condition `{condition}`: {message}")]
    Condition { condition: String, message: String },

    #[error("diagnostic handler failed: {0}")]
    Handler(#[from] std::io::Error),
}

/// Top-level error for a whole check run
#[derive(Debug, Error)]
pub enum CheckError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Rules(#[from] RuleLoadError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}
