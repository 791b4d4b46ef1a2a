//! Verdict policy - determines how failures are filtered and judged

use super::{Failure, FailureKind, Severity};

/// Policy for filtering and judging failures
#[derive(Debug, Clone)]
pub struct VerdictPolicy {
    /// Strict mode: warnings fail the run
    pub strict: bool,
    /// Failure kinds to ignore
    pub ignore_kinds: Vec<FailureKind>,
    /// Minimum severity to report (below this = ignored)
    pub min_severity: Severity,
}

impl Default for VerdictPolicy {
    fn default() -> Self {
        Self {
            strict: true,
            ignore_kinds: vec![],
            min_severity: Severity::Warning,
        }
    }
}

impl VerdictPolicy {
    /// Create a lenient policy (warnings don't fail)
    #[must_use]
    pub fn lenient() -> Self {
        Self {
            strict: false,
            ..Default::default()
        }
    }

    /// Filter failures according to policy
    #[must_use]
    pub fn filter(&self, failures: Vec<Failure>) -> Vec<Failure> {
        failures
            .into_iter()
            .filter(|f| self.should_report(f))
            .collect()
    }

    fn should_report(&self, failure: &Failure) -> bool {
        !self.ignore_kinds.contains(&failure.kind) && failure.severity >= self.min_severity
    }

    /// Highest exit code among the failures, 0 when there are none.
    #[must_use]
    pub fn exit_code(&self, failures: &[Failure]) -> i32 {
        failures
            .iter()
            .map(|f| f.severity.exit_code(self.strict))
            .max()
            .unwrap_or(0)
    }

    /// Judge a run from its (already filtered) failures and executed case count.
    ///
    /// A run that executed nothing is a tool error (exit 3), never a pass.
    #[must_use]
    pub fn verdict(&self, failures: &[Failure], iterations: u64) -> Verdict {
        if iterations == 0 {
            return Verdict {
                status: VerdictStatus::Fail,
                exit_code: 3,
                reason: "No cases were executed".to_string(),
            };
        }

        let exit_code = self.exit_code(failures);
        if failures.is_empty() {
            return Verdict {
                status: VerdictStatus::Pass,
                exit_code,
                reason: format!("All {iterations} cases passed"),
            };
        }

        let count = |severity: Severity| failures.iter().filter(|f| f.severity == severity).count();
        let reason = format!(
            "{} failures ({} critical, {} error, {} warning) in {iterations} cases",
            failures.len(),
            count(Severity::Critical),
            count(Severity::Error),
            count(Severity::Warning),
        );

        Verdict {
            status: if exit_code == 0 {
                VerdictStatus::Pass
            } else {
                VerdictStatus::Fail
            },
            exit_code,
            reason,
        }
    }
}

/// Final verdict
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub status: VerdictStatus,
    pub exit_code: i32,
    pub reason: String,
}

/// Pass or fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerdictStatus {
    Pass,
    Fail,
}

impl std::fmt::Display for VerdictStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pass => write!(f, "PASS"),
            Self::Fail => write!(f, "FAIL"),
        }
    }
}
