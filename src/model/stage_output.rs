/**
 * Stage Output Tagged Union
 *
 * DESIGN DECISION: One enum over stage name rather than a struct of optional fields
 * WHY: a tagged variant's presence implies the stage ran; a bag of `Option<T>` fields lets
 * the compiler accept states that are not reachable (e.g. a verify_result with no plan)
 *
 * REASONING CHAIN:
 * 1. Each stage produces a distinct payload shape (brainstorm is freeform text, plan is
 *    structured, verify_result is structured with a pass/fail)
 * 2. The Assembler needs to pretty-print each payload or fall back to "N/A"
 * 3. A tagged union makes "this stage's output is absent" and "this stage's output is the
 *    empty case" distinguishable, which a restart-from-stage clear operation depends on
 *
 * PATTERN: tagged union over stage name
 */

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DesignReviewOutput {
    pub approach: String,
    pub risks: Vec<String>,
    pub alternatives_considered: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanOutput {
    pub steps: Vec<String>,
    pub files_touched: Vec<String>,
    pub score: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImplementationOutput {
    pub notes: String,
    pub files_changed: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeReviewOutput {
    pub comments: Vec<String>,
    pub score: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyOutput {
    pub passed: bool,
    pub test_results: String,
}

/// One stage's persisted output. Absence of an entry for a `StageKind` in the task's output
/// map means that stage has not produced a result since the task was created or last
/// restarted from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum StageOutput {
    Brainstorm { text: String },
    DesignReview(DesignReviewOutput),
    Plan(PlanOutput),
    Implementation(ImplementationOutput),
    CodeReview(CodeReviewOutput),
    Verify(VerifyOutput),
}

impl StageOutput {
    /// Render as pretty-printed structured text for template substitution, or the raw text
    /// for freeform stages.
    pub fn render(&self) -> String {
        match self {
            StageOutput::Brainstorm { text } => text.clone(),
            StageOutput::DesignReview(o) => {
                serde_json::to_string_pretty(o).unwrap_or_else(|_| "N/A".to_string())
            }
            StageOutput::Plan(o) => {
                serde_json::to_string_pretty(o).unwrap_or_else(|_| "N/A".to_string())
            }
            StageOutput::Implementation(o) => o.notes.clone(),
            StageOutput::CodeReview(o) => {
                serde_json::to_string_pretty(o).unwrap_or_else(|_| "N/A".to_string())
            }
            StageOutput::Verify(o) => {
                serde_json::to_string_pretty(o).unwrap_or_else(|_| "N/A".to_string())
            }
        }
    }

    /// Score used for auto-approval gates (plan, code_review). Other stages have no score.
    pub fn score(&self) -> Option<f64> {
        match self {
            StageOutput::Plan(o) => o.score,
            StageOutput::CodeReview(o) => o.score,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_brainstorm_renders_raw_text() {
        let out = StageOutput::Brainstorm { text: "some ideas".to_string() };
        assert_eq!(out.render(), "some ideas");
    }

    #[test]
    fn test_plan_score_extraction() {
        let out = StageOutput::Plan(PlanOutput {
            steps: vec!["step 1".into()],
            files_touched: vec![],
            score: Some(4.5),
        });
        assert_eq!(out.score(), Some(4.5));
    }

    #[test]
    fn test_non_scored_stage_returns_none() {
        let out = StageOutput::Implementation(ImplementationOutput {
            notes: "done".into(),
            files_changed: vec![],
        });
        assert_eq!(out.score(), None);
    }
}
