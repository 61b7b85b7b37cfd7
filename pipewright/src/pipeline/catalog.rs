//! Stage catalog: maps event categories to ordered stage sequences.

use crate::core::{EventCategory, FailurePolicy, StageDefinition};

const MINUTE_MS: u64 = 60_000;

/// The fixed stage sequences this engine knows how to run.
///
/// Pure lookup, no state. Unknown categories fall back to the full
/// pipeline; that is a design choice, not an error case.
#[derive(Debug, Clone)]
pub struct StageCatalog {
    full: Vec<StageDefinition>,
    review_only: Vec<StageDefinition>,
    comment_fix: Vec<StageDefinition>,
    scaffold: Vec<StageDefinition>,
}

impl Default for StageCatalog {
    fn default() -> Self {
        let analyze = || {
            StageDefinition::new("analyze", "analyze", 2, 2 * MINUTE_MS, FailurePolicy::Notify)
        };
        let design = || {
            StageDefinition::new("design", "design", 2, 3 * MINUTE_MS, FailurePolicy::Notify)
        };
        let implement = || {
            StageDefinition::new("implement", "implement", 3, 10 * MINUTE_MS, FailurePolicy::Retry)
        };
        let test = || {
            StageDefinition::new("test", "test", 3, 5 * MINUTE_MS, FailurePolicy::Retry)
        };
        let review = || {
            StageDefinition::new("review", "review", 1, 3 * MINUTE_MS, FailurePolicy::Notify)
        };
        let commit = || {
            StageDefinition::new("commit", "commit", 1, MINUTE_MS, FailurePolicy::Abort)
        };

        Self {
            full: vec![
                analyze(),
                design(),
                implement().with_parallel(),
                test(),
                review(),
                commit(),
            ],
            review_only: vec![review()],
            comment_fix: vec![implement(), test(), review(), commit()],
            scaffold: vec![
                analyze(),
                design(),
                StageDefinition::new(
                    "scaffold",
                    "scaffold",
                    2,
                    10 * MINUTE_MS,
                    FailurePolicy::Notify,
                ),
                test(),
                commit(),
            ],
        }
    }
}

impl StageCatalog {
    /// Creates the default catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a catalog where every category maps to the same sequence.
    /// Intended for tests and embedders with a single custom pipeline.
    #[must_use]
    pub fn uniform(stages: Vec<StageDefinition>) -> Self {
        Self {
            full: stages.clone(),
            review_only: stages.clone(),
            comment_fix: stages.clone(),
            scaffold: stages,
        }
    }

    /// The ordered stage sequence for an event category.
    #[must_use]
    pub fn stages_for(&self, category: EventCategory) -> &[StageDefinition] {
        match category {
            EventCategory::IssueLabeled | EventCategory::Manual => &self.full,
            EventCategory::MrCreated | EventCategory::MrUpdated => &self.review_only,
            EventCategory::MrComment => &self.comment_fix,
            EventCategory::Scaffold => &self.scaffold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_pipeline_order() {
        let catalog = StageCatalog::new();
        let names: Vec<&str> = catalog
            .stages_for(EventCategory::IssueLabeled)
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(
            names,
            vec!["analyze", "design", "implement", "test", "review", "commit"]
        );
    }

    #[test]
    fn test_manual_matches_full() {
        let catalog = StageCatalog::new();
        assert_eq!(
            catalog.stages_for(EventCategory::Manual),
            catalog.stages_for(EventCategory::IssueLabeled)
        );
    }

    #[test]
    fn test_review_only_pipeline() {
        let catalog = StageCatalog::new();
        let stages = catalog.stages_for(EventCategory::MrCreated);
        assert_eq!(stages.len(), 1);
        assert_eq!(stages[0].name, "review");
        assert_eq!(stages[0].on_failure, FailurePolicy::Notify);
    }

    #[test]
    fn test_comment_fix_pipeline() {
        let catalog = StageCatalog::new();
        let names: Vec<&str> = catalog
            .stages_for(EventCategory::MrComment)
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(names, vec!["implement", "test", "review", "commit"]);
    }

    #[test]
    fn test_scaffold_pipeline() {
        let catalog = StageCatalog::new();
        let stages = catalog.stages_for(EventCategory::Scaffold);
        assert_eq!(stages.len(), 5);
        assert_eq!(stages[2].name, "scaffold");
        assert_eq!(stages[2].max_retries, 2);
    }

    #[test]
    fn test_commit_always_aborts() {
        let catalog = StageCatalog::new();
        for category in [
            EventCategory::IssueLabeled,
            EventCategory::MrComment,
            EventCategory::Scaffold,
        ] {
            let last = catalog.stages_for(category).last().unwrap();
            assert_eq!(last.name, "commit");
            assert_eq!(last.on_failure, FailurePolicy::Abort);
            assert_eq!(last.max_retries, 1);
        }
    }

    #[test]
    fn test_only_implement_is_parallel() {
        let catalog = StageCatalog::new();
        let full = catalog.stages_for(EventCategory::IssueLabeled);
        assert!(full.iter().find(|s| s.name == "implement").unwrap().parallel);
        assert!(full.iter().filter(|s| s.parallel).count() == 1);
    }
}
