//! Aggregated distribution results

use serde::Serialize;

/// Message of a job in which every distributor succeeded
pub const SUCCESS_MESSAGE: &str = "Everything is OK";

/// Result of one configured distributor for one job
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DistributionOutcome {
    pub name: String,
    pub attempted: bool,
    pub succeeded: bool,
    pub message: String,
}

impl DistributionOutcome {
    pub fn skipped(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attempted: false,
            succeeded: false,
            message: message.into(),
        }
    }

    pub fn ran(name: impl Into<String>, succeeded: bool, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attempted: true,
            succeeded,
            message: message.into(),
        }
    }
}

/// Every configured distributor lands in exactly one of `called`, `failed`
/// and `skipped`, in configured order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DistributionReport {
    pub outcomes: Vec<DistributionOutcome>,
    pub called: Vec<String>,
    pub failed: Vec<String>,
    pub skipped: Vec<String>,
    pub failure_messages: Vec<String>,
}

impl DistributionReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, outcome: DistributionOutcome) {
        match (outcome.attempted, outcome.succeeded) {
            (false, _) => self.skipped.push(outcome.name.clone()),
            (true, true) => self.called.push(outcome.name.clone()),
            (true, false) => {
                self.failed.push(outcome.name.clone());
                self.failure_messages.push(outcome.message.clone());
            },
        }
        self.outcomes.push(outcome);
    }

    /// No attempted distributor failed
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }

    /// No configured distributor was skipped
    pub fn all_attempted(&self) -> bool {
        self.skipped.is_empty()
    }

    /// The job verdict: everything attempted and everything succeeded
    pub fn is_success(&self) -> bool {
        self.all_succeeded() && self.all_attempted()
    }

    /// Human-readable summary returned to the caller
    pub fn message(&self) -> String {
        if self.is_success() {
            return SUCCESS_MESSAGE.to_string();
        }

        let mut lines = Vec::new();
        if !self.all_succeeded() {
            lines.push(format!(
                "The following distributors failed: {}",
                self.failed.join(", ")
            ));
            lines.extend(
                self.outcomes
                    .iter()
                    .filter(|o| o.attempted && !o.succeeded)
                    .map(|o| format!(" - {}: {}", o.name, o.message)),
            );
        }
        if !self.all_attempted() {
            lines.push(format!(
                "The following jobs were skipped: {}",
                self.skipped.join(", ")
            ));
        }
        lines.join("\n")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_all_ok() {
        let mut report = DistributionReport::new();
        report.push(DistributionOutcome::ran("file", true, "Added file"));
        report.push(DistributionOutcome::ran("pycsw", true, "totalInserted: 1"));
        assert!(report.is_success());
        assert_eq!(report.message(), "Everything is OK");
        assert_eq!(report.called, vec!["file", "pycsw"]);
    }

    #[test]
    fn test_failure_and_skip_message() {
        let mut report = DistributionReport::new();
        report.push(DistributionOutcome::ran("file", true, "Added file"));
        report.push(DistributionOutcome::ran("pycsw", false, "Unknown Error"));
        report.push(DistributionOutcome::skipped("git", "Unknown distributor 'git'"));

        assert!(!report.all_succeeded());
        assert!(!report.all_attempted());
        assert!(!report.is_success());
        assert_eq!(report.failure_messages, vec!["Unknown Error"]);
        assert_eq!(
            report.message(),
            "The following distributors failed: pycsw\n - pycsw: Unknown Error\nThe following jobs were skipped: git"
        );
    }

    #[test]
    fn test_every_outcome_is_accounted_for() {
        let mut report = DistributionReport::new();
        let outcomes = [
            DistributionOutcome::ran("file", false, "File already exists"),
            DistributionOutcome::skipped("solr", "The run job is invalid"),
            DistributionOutcome::ran("pycsw", true, "ok"),
            DistributionOutcome::skipped("git", "unknown"),
            DistributionOutcome::ran("file", true, "ok"),
        ];
        for outcome in outcomes.iter().cloned() {
            report.push(outcome);
        }
        assert_eq!(
            report.called.len() + report.failed.len() + report.skipped.len(),
            outcomes.len()
        );
    }

    #[test]
    fn test_skip_only_is_not_success() {
        let mut report = DistributionReport::new();
        report.push(DistributionOutcome::skipped("solr", "invalid"));
        assert!(report.all_succeeded());
        assert!(!report.is_success());
        assert_eq!(report.message(), "The following jobs were skipped: solr");
    }
}
