/**
 * Hand-off Record
 *
 * DESIGN DECISION: Hand-offs are append-only and carry seven free-text fields plus a status tag
 * WHY: The hand-off chain is the only context carried between stages besides persisted stage
 * outputs; rewriting a prior entry would destroy the audit trail a rejection loop
 * depends on
 *
 * REASONING CHAIN:
 * 1. Every stage run produces exactly one hand-off, appended, never mutated
 * 2. A rejected stage appends a new hand-off with status `needs_intervention`
 * 3. Hand-offs are totally ordered and monotonically timestamped per task
 * 4. Structured fields (not one blob) let the Assembler render `previous_handoff` precisely
 *
 * PATTERN: structured session transfer, grounded on a session-handoff record type, trimmed
 * from its dozen nested record kinds down to seven flat fields
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::stage::StageKind;

/// Resolution status of one stage run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandoffStatus {
    Completed,
    Blocked,
    NeedsIntervention,
}

/// One append-only hand-off record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Handoff {
    pub stage: StageKind,
    pub agent_label: String,
    pub model_label: String,
    pub timestamp: DateTime<Utc>,
    pub status: HandoffStatus,

    pub summary: String,
    pub key_decisions: String,
    pub open_questions: String,
    pub files_modified: String,
    pub next_stage_needs: String,
    pub warnings: String,
    pub status_note: Option<String>,
}

impl Handoff {
    /// Build a minimal hand-off when stage output settles without a parseable labelled block:
    /// a missing header signals the engine to synthesise a minimal hand-off.
    pub fn synthesize(
        stage: StageKind,
        agent_label: impl Into<String>,
        model_label: impl Into<String>,
        status: HandoffStatus,
        raw_output: &str,
    ) -> Self {
        Self {
            stage,
            agent_label: agent_label.into(),
            model_label: model_label.into(),
            timestamp: Utc::now(),
            status,
            summary: raw_output.chars().take(280).collect(),
            key_decisions: String::new(),
            open_questions: String::new(),
            files_modified: String::new(),
            next_stage_needs: String::new(),
            warnings: String::new(),
            status_note: None,
        }
    }

    /// Append the timed-out marker to `warnings`: a timed-out hand-off must contain the
    /// substring `timed out after <N>ms`.
    pub fn mark_timed_out(&mut self, timeout_ms: u64) {
        let marker = format!("timed out after {}ms", timeout_ms);
        if self.warnings.is_empty() {
            self.warnings = marker;
        } else {
            self.warnings = format!("{}; {}", self.warnings, marker);
        }
    }
}
