//! Diagnostic sink: one per (input, rule set) application
//!
//! Echoes every message verbatim, emits a banner before the first message
//! only, and counts messages carrying the error marker. State never outlives
//! one rule-set application.

use crate::engine::{DiagnosticHandler, Level};
use std::io::{self, Write};

/// Literal prefix rule authors use to mark a message as build-failing.
pub const ERROR_MARKER: &str = "[ERROR]";

pub struct DiagnosticSink<'a> {
    out: &'a mut dyn Write,
    input_name: String,
    rule_set_name: String,
    first: bool,
    errors: u32,
}

impl<'a> DiagnosticSink<'a> {
    pub fn new(out: &'a mut dyn Write, input_name: &str, rule_set_name: &str) -> Self {
        Self {
            out,
            input_name: input_name.to_string(),
            rule_set_name: rule_set_name.to_string(),
            first: true,
            errors: 0,
        }
    }

    /// Number of messages that started with the error marker.
    pub fn error_count(&self) -> u32 {
        self.errors
    }
}

impl DiagnosticHandler for DiagnosticSink<'_> {
    fn accept(&mut self, message: &str, _level: Level) -> io::Result<()> {
        if self.first {
            self.first = false;
            writeln!(
                self.out,
                "*** checking {} with {}",
                self.input_name, self.rule_set_name
            )?;
        }

        writeln!(self.out, "{}", message)?;

        // Classification follows the message-prefix convention owned by rule
        // authors, not the engine-assigned level.
        if message.starts_with(ERROR_MARKER) {
            self.errors += 1;
        }

        Ok(())
    }
}
