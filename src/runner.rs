//! Orchestrates one check run
//!
//! Loads the input once, then applies each rule set in the order it was
//! added, with a fresh sink per application. Error counts flow back as
//! values; nothing is shared between rule-set applications.

use crate::document::Document;
use crate::engine;
use crate::error::CheckError;
use crate::loader;
use crate::ruleset::RuleSet;
use crate::sink::DiagnosticSink;
use log::debug;
use std::io::Write;
use std::path::Path;

/// Aggregate outcome of a run: total error-marked diagnostics across all
/// rule sets applied to the input document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunResult {
    error_count: u32,
}

impl RunResult {
    pub fn error_count(&self) -> u32 {
        self.error_count
    }

    pub fn passed(&self) -> bool {
        self.error_count == 0
    }
}

pub struct CheckRunner {
    /// Final path component, used in checking banners.
    input_name: String,
    input: Document,
    rule_sets: Vec<RuleSet>,
}

impl CheckRunner {
    /// Load the input document immediately. A failure here is unrecoverable
    /// and means no rule set is ever attempted.
    pub fn new(input_path: &Path) -> Result<Self, CheckError> {
        let input = loader::load(input_path)?;
        let input_name = input_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| input_path.display().to_string());

        Ok(Self {
            input_name,
            input,
            rule_sets: Vec::new(),
        })
    }

    /// Load and append one rule set. Insertion order is evaluation order;
    /// any load failure aborts the whole run, it never skips the rule set.
    pub fn add_rule_set(&mut self, path: &Path) -> Result<(), CheckError> {
        self.rule_sets.push(RuleSet::load(path)?);
        Ok(())
    }

    /// Apply every rule set in order, writing diagnostics to `diag`.
    pub fn run<W: Write>(&self, diag: &mut W) -> Result<RunResult, CheckError> {
        let mut error_count = 0;

        for rule_set in &self.rule_sets {
            debug!("checking {} with {}", self.input_name, rule_set.name());
            let mut sink = DiagnosticSink::new(&mut *diag, &self.input_name, rule_set.name());
            engine::apply(rule_set, &self.input, &mut sink)?;
            error_count += sink.error_count();
        }

        Ok(RunResult { error_count })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    const MD_NS: &str = "urn:oasis:names:tc:SAML:2.0:metadata";

    fn write_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    fn write_metadata(dir: &TempDir) -> PathBuf {
        write_file(
            dir,
            "metadata.xml",
            &format!(
                r#"<md:EntityDescriptor xmlns:md="{}" entityID="https://idp.example.org">
                     <md:IDPSSODescriptor/>
                   </md:EntityDescriptor>"#,
                MD_NS
            ),
        )
    }

    #[test]
    fn test_clean_run_is_silent_and_passes() {
        let dir = TempDir::new().unwrap();
        let input = write_metadata(&dir);
        let rules = write_file(
            &dir,
            "check-entity-id.xml",
            &format!(
                r#"<rules>
                     <namespace prefix="md" uri="{}"/>
                     <rule match="md:EntityDescriptor" when="!attributes.entityID"
                           level="error" message="[ERROR] no entityID"/>
                   </rules>"#,
                MD_NS
            ),
        );

        let mut runner = CheckRunner::new(&input).unwrap();
        runner.add_rule_set(&rules).unwrap();

        let mut out = Vec::new();
        let result = runner.run(&mut out).unwrap();

        assert!(result.passed());
        assert!(out.is_empty());
    }

    #[test]
    fn test_error_diagnostic_counted_and_reported() {
        let dir = TempDir::new().unwrap();
        let input = write_metadata(&dir);
        let rules = write_file(
            &dir,
            "rule.xml",
            r#"<rules><rule match="EntityDescriptor" message="[ERROR] missing X"/></rules>"#,
        );

        let mut runner = CheckRunner::new(&input).unwrap();
        runner.add_rule_set(&rules).unwrap();

        let mut out = Vec::new();
        let result = runner.run(&mut out).unwrap();

        assert_eq!(result.error_count(), 1);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "*** checking metadata.xml with rule.xml\n[ERROR] missing X\n"
        );
    }

    #[test]
    fn test_rule_sets_applied_in_order_and_counts_summed() {
        let dir = TempDir::new().unwrap();
        let input = write_metadata(&dir);
        let first = write_file(
            &dir,
            "first.xml",
            r#"<rules><rule match="EntityDescriptor" message="[WARN] cosmetic issue"/></rules>"#,
        );
        let second = write_file(
            &dir,
            "second.xml",
            r#"<rules><rule match="EntityDescriptor" message="[ERROR] bad"/></rules>"#,
        );

        let mut runner = CheckRunner::new(&input).unwrap();
        runner.add_rule_set(&first).unwrap();
        runner.add_rule_set(&second).unwrap();

        let mut out = Vec::new();
        let result = runner.run(&mut out).unwrap();
        let out = String::from_utf8(out).unwrap();

        assert_eq!(result.error_count(), 1);
        let first_banner = out.find("with first.xml").unwrap();
        let second_banner = out.find("with second.xml").unwrap();
        assert!(first_banner < second_banner);
    }

    #[test]
    fn test_silent_rule_set_gets_no_banner() {
        let dir = TempDir::new().unwrap();
        let input = write_metadata(&dir);
        let silent = write_file(
            &dir,
            "silent.xml",
            r#"<rules><rule match="NoSuchElement" message="[ERROR] never"/></rules>"#,
        );
        let noisy = write_file(
            &dir,
            "noisy.xml",
            r#"<rules><rule match="EntityDescriptor" message="[WARN] seen"/></rules>"#,
        );

        let mut runner = CheckRunner::new(&input).unwrap();
        runner.add_rule_set(&silent).unwrap();
        runner.add_rule_set(&noisy).unwrap();

        let mut out = Vec::new();
        runner.run(&mut out).unwrap();
        let out = String::from_utf8(out).unwrap();

        assert!(!out.contains("silent.xml"));
        assert!(out.contains("*** checking metadata.xml with noisy.xml"));
    }

    #[test]
    fn test_missing_input_fails_construction() {
        assert!(CheckRunner::new(Path::new("/nonexistent/metadata.xml")).is_err());
    }

    #[test]
    fn test_missing_rule_set_fails_add() {
        let dir = TempDir::new().unwrap();
        let input = write_metadata(&dir);
        let mut runner = CheckRunner::new(&input).unwrap();
        assert!(runner.add_rule_set(Path::new("/nonexistent/rules.xml")).is_err());
    }

    #[test]
    fn test_run_with_no_rule_sets_passes() {
        let dir = TempDir::new().unwrap();
        let input = write_metadata(&dir);
        let runner = CheckRunner::new(&input).unwrap();

        let mut out = Vec::new();
        let result = runner.run(&mut out).unwrap();
        assert!(result.passed());
        assert!(out.is_empty());
    }
}
