//! Rule documents: loading, include resolution, compiled form
//!
//! A rule document is an XML file with a `<rules>` root containing
//! `<namespace>` declarations, `<include>` references, and `<rule>` entries.
//! Loading compiles everything into a flat, ordered list of [`Rule`]s;
//! structural problems (unknown elements, undeclared prefixes, include
//! cycles) fail the load, they never become diagnostics.

use crate::document::QName;
use crate::engine::Level;
use crate::error::{ParseError, RuleLoadError};
use crate::loader;
use log::debug;
use regex::Regex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Matcher for a qualified element name.
///
/// A prefixed pattern (`md:EntityDescriptor`) requires the namespace URI the
/// prefix was declared with; an unprefixed pattern matches on local name
/// alone. The local part may use `*` as a wildcard.
#[derive(Debug, Clone)]
pub struct NamePattern {
    namespace: Option<String>,
    local: LocalMatcher,
}

#[derive(Debug, Clone)]
enum LocalMatcher {
    Any,
    Exact(String),
    Glob(Regex),
}

impl NamePattern {
    pub fn compile(
        pattern: &str,
        namespaces: &HashMap<String, String>,
    ) -> Result<Self, String> {
        let (prefix, local) = match pattern.split_once(':') {
            Some((prefix, local)) => (prefix, local),
            None => ("", pattern),
        };

        let namespace = if prefix.is_empty() {
            None
        } else {
            let uri = namespaces.get(prefix).ok_or_else(|| {
                format!("undeclared prefix `{}` in match pattern `{}`", prefix, pattern)
            })?;
            Some(uri.clone())
        };

        let local = if local == "*" {
            LocalMatcher::Any
        } else if local.contains('*') {
            let regex = format!(
                "^{}$",
                local
                    .split('*')
                    .map(regex::escape)
                    .collect::<Vec<_>>()
                    .join(".*")
            );
            LocalMatcher::Glob(Regex::new(&regex).map_err(|e| e.to_string())?)
        } else {
            LocalMatcher::Exact(local.to_string())
        };

        Ok(Self { namespace, local })
    }

    pub fn matches(&self, name: &QName) -> bool {
        if let Some(ns) = &self.namespace {
            if name.namespace.as_deref() != Some(ns.as_str()) {
                return false;
            }
        }
        match &self.local {
            LocalMatcher::Any => true,
            LocalMatcher::Exact(local) => name.local == *local,
            LocalMatcher::Glob(re) => re.is_match(&name.local),
        }
    }
}

/// One compiled rule
#[derive(Debug, Clone)]
pub struct Rule {
    pub pattern: NamePattern,
    /// Optional condition, evaluated against each matched node.
    pub when: Option<String>,
    /// Engine-assigned level, reported to the handler but never used for
    /// pass/fail classification.
    pub level: Level,
    /// Message template; the author owns the text, including any `[ERROR]`
    /// marker.
    pub message: String,
}

/// One loaded rule document, includes already spliced in
#[derive(Debug)]
pub struct RuleSet {
    name: String,
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn load(path: &Path) -> Result<Self, RuleLoadError> {
        let mut rules = Vec::new();
        let mut visiting = Vec::new();
        compile_into(path, &mut rules, &mut visiting)?;

        let name = display_name(path);
        debug!("loaded rule set {} ({} rules)", name, rules.len());

        Ok(Self { name, rules })
    }

    /// Short name for banners: the final path component only.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    #[cfg(test)]
    pub(crate) fn from_rules(name: &str, rules: Vec<Rule>) -> Self {
        Self {
            name: name.to_string(),
            rules,
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Compile one rule document into `rules`, recursing into includes.
///
/// `visiting` holds the canonical paths currently being compiled; re-entering
/// one is an include cycle.
fn compile_into(
    path: &Path,
    rules: &mut Vec<Rule>,
    visiting: &mut Vec<PathBuf>,
) -> Result<(), RuleLoadError> {
    let canonical = fs::canonicalize(path).map_err(|source| {
        RuleLoadError::Parse(ParseError::Io {
            path: path.to_path_buf(),
            source,
        })
    })?;
    if visiting.contains(&canonical) {
        return Err(RuleLoadError::IncludeCycle {
            path: path.to_path_buf(),
        });
    }
    visiting.push(canonical);

    let invalid = |message: String| RuleLoadError::Invalid {
        path: path.to_path_buf(),
        message,
    };

    let doc = loader::load(path)?;
    let root = doc
        .root()
        .ok_or_else(|| invalid("empty rule document".to_string()))?;
    if root.name.local != "rules" {
        return Err(invalid(format!(
            "root element must be <rules>, found <{}>",
            root.name.local
        )));
    }

    // Relative includes resolve against this document's own directory,
    // not the process working directory.
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));

    let mut namespaces: HashMap<String, String> = HashMap::new();

    for child in doc.children(root) {
        if !child.is_element() {
            continue;
        }
        match child.name.local.as_str() {
            "namespace" => {
                let prefix = child
                    .attr("prefix")
                    .ok_or_else(|| invalid("<namespace> requires a prefix attribute".to_string()))?;
                let uri = child
                    .attr("uri")
                    .ok_or_else(|| invalid("<namespace> requires a uri attribute".to_string()))?;
                namespaces.insert(prefix.to_string(), uri.to_string());
            }
            "include" => {
                let href = child
                    .attr("href")
                    .ok_or_else(|| invalid("<include> requires an href attribute".to_string()))?;
                compile_into(&base_dir.join(href), rules, visiting)?;
            }
            "rule" => {
                rules.push(compile_rule(child, &namespaces, path)?);
            }
            other => {
                return Err(invalid(format!("unknown element <{}>", other)));
            }
        }
    }

    visiting.pop();
    Ok(())
}

fn compile_rule(
    node: &crate::document::XmlNode,
    namespaces: &HashMap<String, String>,
    path: &Path,
) -> Result<Rule, RuleLoadError> {
    let invalid = |message: String| RuleLoadError::Invalid {
        path: path.to_path_buf(),
        message,
    };

    let pattern_src = node
        .attr("match")
        .ok_or_else(|| invalid("<rule> requires a match attribute".to_string()))?;
    let pattern = NamePattern::compile(pattern_src, namespaces).map_err(invalid)?;

    let message = node
        .attr("message")
        .ok_or_else(|| invalid("<rule> requires a message attribute".to_string()))?
        .to_string();

    let level = match node.attr("level") {
        Some(s) => s.parse::<Level>().map_err(invalid)?,
        None => Level::Warning,
    };

    let when = node.attr("when").map(String::from);

    Ok(Rule {
        pattern,
        when,
        level,
        message,
    })
}
