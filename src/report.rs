use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Scope {
    Project,
    Standalone,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Project => write!(f, "project"),
            Scope::Standalone => write!(f, "container"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Action {
    NoChange,
    Recreated,
    Skipped,
    Failed,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Action::NoChange => "up to date",
            Action::Recreated => "recreated",
            Action::Skipped => "skipped",
            Action::Failed => "failed",
        };
        write!(f, "{label}")
    }
}

/// One terminal result per project or standalone container.
#[derive(Debug)]
pub(crate) struct UpdateOutcome {
    pub scope: Scope,
    pub identifier: String,
    pub action: Action,
    pub detail: Option<String>,
}

impl UpdateOutcome {
    pub(crate) fn new(scope: Scope, identifier: impl Into<String>, action: Action) -> Self {
        Self {
            scope,
            identifier: identifier.into(),
            action,
            detail: None,
        }
    }

    pub(crate) fn with_detail(
        scope: Scope,
        identifier: impl Into<String>,
        action: Action,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            detail: Some(detail.into()),
            ..Self::new(scope, identifier, action)
        }
    }
}

impl fmt::Display for UpdateOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.scope, self.identifier, self.action)?;
        if let Some(detail) = &self.detail {
            write!(f, " ({detail})")?;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub(crate) struct RunReport {
    outcomes: Vec<UpdateOutcome>,
}

impl RunReport {
    pub(crate) fn record(&mut self, outcome: UpdateOutcome) {
        self.outcomes.push(outcome);
    }

    pub(crate) fn count(&self, scope: Scope, action: Action) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.scope == scope && outcome.action == action)
            .count()
    }

    pub(crate) fn summary(&self) -> String {
        let mut lines = String::from("--- summary ---\n");
        for (scope, label) in [(Scope::Project, "projects"), (Scope::Standalone, "standalone")] {
            lines.push_str(&format!(
                "{label}: {} up to date, {} recreated, {} skipped, {} failed\n",
                self.count(scope, Action::NoChange),
                self.count(scope, Action::Recreated),
                self.count(scope, Action::Skipped),
                self.count(scope, Action::Failed),
            ));
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_are_per_scope_and_action() {
        let mut report = RunReport::default();
        report.record(UpdateOutcome::new(Scope::Project, "proja", Action::NoChange));
        report.record(UpdateOutcome::with_detail(
            Scope::Project,
            "projb",
            Action::Recreated,
            "service api not running",
        ));
        report.record(UpdateOutcome::new(Scope::Standalone, "cache1", Action::Recreated));
        report.record(UpdateOutcome::with_detail(
            Scope::Standalone,
            "broken",
            Action::Failed,
            "run spec extraction failed",
        ));

        assert_eq!(report.count(Scope::Project, Action::NoChange), 1);
        assert_eq!(report.count(Scope::Project, Action::Recreated), 1);
        assert_eq!(report.count(Scope::Project, Action::Failed), 0);
        assert_eq!(report.count(Scope::Standalone, Action::Recreated), 1);
        assert_eq!(report.count(Scope::Standalone, Action::Failed), 1);
    }

    #[test]
    fn outcome_renders_detail_when_present() {
        let outcome = UpdateOutcome::with_detail(
            Scope::Project,
            "projb",
            Action::Skipped,
            "no services declared",
        );
        assert_eq!(outcome.to_string(), "project projb: skipped (no services declared)");

        let outcome = UpdateOutcome::new(Scope::Standalone, "cache1", Action::NoChange);
        assert_eq!(outcome.to_string(), "container cache1: up to date");
    }

    #[test]
    fn summary_lists_both_scopes() {
        let mut report = RunReport::default();
        report.record(UpdateOutcome::new(Scope::Project, "proja", Action::NoChange));
        report.record(UpdateOutcome::new(Scope::Standalone, "cache1", Action::Recreated));

        let summary = report.summary();
        assert!(summary.contains("projects: 1 up to date, 0 recreated, 0 skipped, 0 failed"));
        assert!(summary.contains("standalone: 0 up to date, 1 recreated, 0 skipped, 0 failed"));
    }
}
