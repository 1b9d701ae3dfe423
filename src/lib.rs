//! mdcheck - SAML metadata rule checker
//!
//! Checks an input file containing SAML metadata against a set of local
//! rules expressed as XML rule documents. Every diagnostic a rule set emits
//! is echoed verbatim to the diagnostic stream; a message is fatal to the
//! build if and only if its text begins with the `[ERROR]` marker.
//!
//! # Architecture
//!
//! ```text
//! CLI -> CheckRunner -> engine -> DiagnosticSink -> stderr
//! ```
//!
//! The runner loads the input document once, then applies each rule set in
//! command-line order with a fresh sink per application and sums the sinks'
//! error counts into a [`RunResult`]. Internal errors (unreadable files,
//! malformed XML, invalid rule documents, engine faults) abort the run;
//! validation diagnostics never do.

pub mod document;
pub mod engine;
pub mod error;
pub mod loader;
pub mod ruleset;
pub mod runner;
pub mod sink;

// Re-export main types
pub use document::{Document, QName, XmlNode};
pub use engine::{DiagnosticHandler, Level};
pub use error::{CheckError, EngineError, ParseError, RuleLoadError};
pub use ruleset::{NamePattern, Rule, RuleSet};
pub use runner::{CheckRunner, RunResult};
pub use sink::{DiagnosticSink, ERROR_MARKER};
