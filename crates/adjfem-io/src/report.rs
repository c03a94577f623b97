use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::Path;

use adjfem_core::CheckResult;
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementReport {
    pub name: String,
    pub kind: String,
    pub checks: Vec<CheckResult>,
}

impl ElementReport {
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|check| check.passed)
    }
}

/// Outcome of verifying every element of a case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub case_name: String,
    /// Set by the caller, e.g. an RFC 3339 timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<String>,
    pub elements: Vec<ElementReport>,
}

impl VerificationReport {
    pub fn passed(&self) -> bool {
        self.elements.iter().all(ElementReport::passed)
    }

    pub fn num_checks(&self) -> usize {
        self.elements.iter().map(|e| e.checks.len()).sum()
    }

    pub fn num_failed(&self) -> usize {
        self.elements
            .iter()
            .flat_map(|e| &e.checks)
            .filter(|check| !check.passed)
            .count()
    }

    fn status(&self) -> &'static str {
        if self.passed() { "PASSED" } else { "FAILED" }
    }

    /// Plain-text table of every check
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "*ADJFEM VERIFICATION REPORT");
        let _ = writeln!(out, "CASE: {}", self.case_name);
        if let Some(stamp) = &self.generated_at {
            let _ = writeln!(out, "GENERATED: {stamp}");
        }
        let _ = writeln!(
            out,
            "STATUS: {} ({} of {} checks failed)",
            self.status(),
            self.num_failed(),
            self.num_checks()
        );
        for element in &self.elements {
            let _ = writeln!(out);
            let _ = writeln!(out, "ELEMENT {} ({})", element.name, element.kind);
            let _ = writeln!(
                out,
                "  {:<48} {:>7} {:>12} {:>12}  RESULT",
                "CHECK", "ENTRIES", "ABS ERR", "REL ERR"
            );
            for check in &element.checks {
                let _ = writeln!(
                    out,
                    "  {:<48} {:>7} {:>12.3e} {:>12.3e}  {}",
                    check.name,
                    check.entries,
                    check.max_abs_err,
                    check.max_rel_err,
                    if check.passed { "PASS" } else { "FAIL" }
                );
            }
        }
        out
    }
}

fn ensure_parent_dir(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

pub fn write_json_report(path: impl AsRef<Path>, report: &VerificationReport) -> Result<()> {
    let path = path.as_ref();
    ensure_parent_dir(path)?;
    fs::write(path, serde_json::to_vec_pretty(report)?)?;
    Ok(())
}

pub fn write_text_report(path: impl AsRef<Path>, report: &VerificationReport) -> Result<()> {
    let path = path.as_ref();
    ensure_parent_dir(path)?;
    fs::write(path, report.to_text())?;
    Ok(())
}

pub fn load_json_report(path: impl AsRef<Path>) -> Result<VerificationReport> {
    let bytes = fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(name: &str, passed: bool) -> CheckResult {
        CheckResult {
            name: name.to_string(),
            entries: 4,
            max_abs_err: if passed { 1e-12 } else { 0.5 },
            max_rel_err: if passed { 1e-14 } else { 0.1 },
            worst_index: Some(2),
            passed,
        }
    }

    #[test]
    fn counts_failures_across_elements() {
        let report = VerificationReport {
            case_name: "mixed".to_string(),
            generated_at: None,
            elements: vec![
                ElementReport {
                    name: "a".to_string(),
                    kind: "heat_conduction_2d".to_string(),
                    checks: vec![check("weak jacobian", true)],
                },
                ElementReport {
                    name: "b".to_string(),
                    kind: "linear_elasticity_3d".to_string(),
                    checks: vec![check("weak jacobian", true), check("weak adjoint product", false)],
                },
            ],
        };
        assert!(!report.passed());
        assert_eq!(report.num_checks(), 3);
        assert_eq!(report.num_failed(), 1);

        let text = report.to_text();
        assert!(text.contains("STATUS: FAILED (1 of 3 checks failed)"));
        assert!(text.contains("ELEMENT b (linear_elasticity_3d)"));
        assert!(!text.contains("GENERATED"));
    }

    #[test]
    fn empty_report_passes() {
        let report = VerificationReport {
            case_name: "empty".to_string(),
            generated_at: Some("2026-01-01T00:00:00Z".to_string()),
            elements: Vec::new(),
        };
        assert!(report.passed());
        assert!(report.to_text().contains("GENERATED: 2026-01-01T00:00:00Z"));
    }
}
