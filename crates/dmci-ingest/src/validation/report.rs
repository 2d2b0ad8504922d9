//! Results of content checks

/// Outcome of one named check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    pub errors: Vec<String>,
}

impl CheckResult {
    /// A check passes when it collected no errors
    pub fn new(name: impl Into<String>, errors: Vec<String>) -> Self {
        Self {
            name: name.into(),
            passed: errors.is_empty(),
            errors,
        }
    }
}

/// All checks run against one document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub checks: Vec<CheckResult>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, check: CheckResult) {
        if check.passed {
            tracing::debug!(check = %check.name, "Passed");
        } else {
            tracing::info!(check = %check.name, errors = ?check.errors, "Failed");
        }
        self.checks.push(check);
    }

    pub fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    /// `Passed: <check>` lines
    pub fn passed_lines(&self) -> Vec<String> {
        self.checks
            .iter()
            .filter(|c| c.passed)
            .map(|c| format!("Passed: {}", c.name))
            .collect()
    }

    /// `Failed: <check>` lines, each followed by ` - <error>` lines
    pub fn failure_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        for check in self.checks.iter().filter(|c| !c.passed) {
            lines.push(format!("Failed: {}", check.name));
            lines.extend(check.errors.iter().map(|e| format!(" - {}", e)));
        }
        lines
    }
}
