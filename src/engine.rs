//! Rule evaluation engine
//!
//! Walks the input document once per rule set. Every fired rule produces one
//! diagnostic, delivered through the [`DiagnosticHandler`] seam; the engine
//! itself never decides whether a message fails the run. A fault while
//! evaluating (an invalid regex in a condition, a failing handler) is an
//! [`EngineError`] and aborts the whole run.

use crate::document::{Document, XmlNode};
use crate::error::EngineError;
use crate::ruleset::RuleSet;
use regex::Regex;
use std::fmt;
use std::io;

/// Engine-assigned diagnostic level
///
/// Reported alongside each message but deliberately not used to decide
/// pass/fail; rule authors embed that convention in the message text itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Level {
    #[default]
    Warning,
    Error,
    Fatal,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Warning => write!(f, "warning"),
            Level::Error => write!(f, "error"),
            Level::Fatal => write!(f, "fatal"),
        }
    }
}

impl std::str::FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "warning" | "warn" => Ok(Level::Warning),
            "error" | "err" => Ok(Level::Error),
            "fatal" => Ok(Level::Fatal),
            _ => Err(format!("unknown level: {}", s)),
        }
    }
}

/// Receives every diagnostic raised while one rule set runs against one
/// document.
///
/// The handler holds all per-application state (first-message flag, error
/// counter) and is never shared across rule sets. A failing handler aborts
/// the run; the engine does not tolerate handler failures.
pub trait DiagnosticHandler {
    fn accept(&mut self, message: &str, level: Level) -> io::Result<()>;
}

/// Apply one rule set to a document, reporting diagnostics to `handler`.
///
/// The document is only read; evaluation has no side effects on it.
pub fn apply(
    rule_set: &RuleSet,
    doc: &Document,
    handler: &mut dyn DiagnosticHandler,
) -> Result<(), EngineError> {
    for node in doc.nodes() {
        if !node.is_element() {
            continue;
        }
        for rule in rule_set.rules() {
            if !rule.pattern.matches(&node.name) {
                continue;
            }
            if let Some(condition) = &rule.when {
                if !evaluate_condition(condition, doc, node)? {
                    continue;
                }
            }
            let message = render_message(&rule.message, node);
            handler
                .accept(&message, rule.level)
                .map_err(EngineError::Handler)?;
        }
    }
    Ok(())
}

/// Evaluate a condition expression against a node
fn evaluate_condition(
    condition: &str,
    doc: &Document,
    node: &XmlNode,
) -> Result<bool, EngineError> {
    let condition = condition.trim();

    if let Some(idx) = find_operator(condition, "||") {
        return Ok(evaluate_condition(&condition[..idx], doc, node)?
            || evaluate_condition(&condition[idx + 2..], doc, node)?);
    }

    if let Some(idx) = find_operator(condition, "&&") {
        return Ok(evaluate_condition(&condition[..idx], doc, node)?
            && evaluate_condition(&condition[idx + 2..], doc, node)?);
    }

    if let Some(rest) = condition.strip_prefix('!') {
        return Ok(!evaluate_condition(rest, doc, node)?);
    }

    if condition.starts_with('(') && condition.ends_with(')') {
        return evaluate_condition(&condition[1..condition.len() - 1], doc, node);
    }

    if let Some(idx) = condition.find("==") {
        let left = condition[..idx].trim();
        let right = condition[idx + 2..]
            .trim()
            .trim_matches('"')
            .trim_matches('\'');
        return Ok(lookup(left, doc, node).is_some_and(|v| v == right));
    }

    if let Some(idx) = condition.find("!=") {
        let left = condition[..idx].trim();
        let right = condition[idx + 2..]
            .trim()
            .trim_matches('"')
            .trim_matches('\'');
        return Ok(lookup(left, doc, node).is_none_or(|v| v != right));
    }

    if let Some(idx) = condition.find("=~") {
        let left = condition[..idx].trim();
        let pattern = condition[idx + 2..].trim().trim_matches('/');
        let re = Regex::new(pattern).map_err(|e| EngineError::Condition {
            condition: condition.to_string(),
            message: e.to_string(),
        })?;
        return Ok(lookup(left, doc, node).is_some_and(|v| re.is_match(&v)));
    }

    if let Some(arg) = function_arg(condition, "hasChild") {
        return Ok(doc
            .children(node)
            .any(|c| c.is_element() && c.name.local == arg));
    }

    if let Some(arg) = function_arg(condition, "isEmpty") {
        return Ok(lookup(&arg, doc, node).is_none_or(|v| v.is_empty()));
    }

    if let Some(attr) = condition.strip_prefix("attributes.") {
        return Ok(node.attr(attr).is_some());
    }

    // Simple truthiness
    Ok(lookup(condition, doc, node).is_some())
}

/// Get a value from a node based on path
fn lookup(path: &str, doc: &Document, node: &XmlNode) -> Option<String> {
    if let Some(attr) = path.strip_prefix("attributes.") {
        return node.attr(attr).map(String::from);
    }
    match path {
        "name" => Some(node.name.local.clone()),
        "text" => doc.text_of(node),
        _ => None,
    }
}

/// Find a top-level logical operator, skipping parenthesized groups.
fn find_operator(s: &str, op: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut depth = 0i32;

    for i in 0..bytes.len() {
        match bytes[i] {
            b'(' => depth += 1,
            b')' => depth -= 1,
            _ => {}
        }
        if depth == 0 && s.get(i..).is_some_and(|rest| rest.starts_with(op)) {
            return Some(i);
        }
    }

    None
}

fn function_arg(condition: &str, name: &str) -> Option<String> {
    let rest = condition.strip_prefix(name)?;
    let rest = rest.strip_prefix('(')?;
    let rest = rest.strip_suffix(')')?;
    Some(rest.trim().trim_matches('\'').trim_matches('"').to_string())
}

/// Render a message template with values from the matched node
fn render_message(template: &str, node: &XmlNode) -> String {
    let attr_re = Regex::new(r"\{attributes\.([^}]+)\}").unwrap();
    let result = attr_re.replace_all(template, |caps: &regex::Captures| {
        node.attr(&caps[1]).unwrap_or("(unknown)").to_string()
    });

    result
        .replace("{name}", &node.name.local)
        .replace("{line}", &node.line.to_string())
}
