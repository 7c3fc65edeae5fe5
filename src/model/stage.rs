/**
 * Stage & Tier Tables
 *
 * DESIGN DECISION: Stage sequence and per-stage config as static tables keyed by Tier/StageKind
 * WHY: tier->stage sequences and per-stage settings are fixed at design time, not data loaded
 * from a store; a lookup table keeps `canTransition` and template selection a pure function of
 * (tier, stage) with no runtime mutation
 *
 * REASONING CHAIN:
 * 1. Each Tier has a fixed ordered stage sequence (L1: 3 stages, L2: 5, L3: 7)
 * 2. Each stage in that sequence has a skill tag, default model, turns/timeout budget,
 *    a `pauses` gate flag and an optional auto-approve threshold
 * 3. The Engine consults this table on every transition decision
 * 4. Making it `const`/static avoids a persistence round-trip on the hot transition path
 *
 * PATTERN: design-time lookup table, generalized from a per-agent-type assignment table
 */

use serde::{Deserialize, Serialize};

/// Task-level label selecting which subset of stages applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tier {
    L1,
    L2,
    L3,
}

/// One unit of model-driven work inside a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Brainstorm,
    DesignReview,
    Plan,
    Implement,
    CodeReview,
    Verify,
}

impl StageKind {
    pub fn template_filename(&self) -> &'static str {
        match self {
            StageKind::Brainstorm => "brainstorm.md",
            StageKind::DesignReview => "design_review.md",
            StageKind::Plan => "plan.md",
            StageKind::Implement => "implement.md",
            StageKind::CodeReview => "code_review.md",
            StageKind::Verify => "verify.md",
        }
    }
}

/// Design-time configuration for one stage.
#[derive(Debug, Clone)]
pub struct StageConfig {
    pub kind: StageKind,
    pub skill_tag: &'static str,
    pub default_model: &'static str,
    pub max_turns: u32,
    pub timeout_ms: u64,
    /// Whether a gate (human or automated) is required after this stage.
    pub pauses: bool,
    /// Score >= threshold under auto-mode bypasses the gate. None = no auto-approval.
    pub auto_approve_threshold: Option<f64>,
}

impl StageConfig {
    pub fn template_filename(&self) -> &'static str {
        self.kind.template_filename()
    }
}

const BRAINSTORM: StageConfig = StageConfig {
    kind: StageKind::Brainstorm,
    skill_tag: "brainstorm",
    default_model: "default",
    max_turns: 6,
    timeout_ms: 10 * 60 * 1000,
    pauses: false,
    auto_approve_threshold: None,
};

const DESIGN_REVIEW: StageConfig = StageConfig {
    kind: StageKind::DesignReview,
    skill_tag: "design_review",
    default_model: "default",
    max_turns: 6,
    timeout_ms: 10 * 60 * 1000,
    pauses: true,
    auto_approve_threshold: None,
};

const PLAN: StageConfig = StageConfig {
    kind: StageKind::Plan,
    skill_tag: "plan",
    default_model: "default",
    max_turns: 8,
    timeout_ms: 15 * 60 * 1000,
    pauses: true,
    // Default auto-approve threshold for plan/code_review is 4.0.
    auto_approve_threshold: Some(4.0),
};

const IMPLEMENT: StageConfig = StageConfig {
    kind: StageKind::Implement,
    skill_tag: "implement",
    default_model: "default",
    max_turns: 40,
    timeout_ms: 60 * 60 * 1000,
    pauses: false,
    auto_approve_threshold: None,
};

const CODE_REVIEW: StageConfig = StageConfig {
    kind: StageKind::CodeReview,
    skill_tag: "code_review",
    default_model: "default",
    max_turns: 8,
    timeout_ms: 15 * 60 * 1000,
    pauses: true,
    auto_approve_threshold: Some(4.0),
};

const VERIFY: StageConfig = StageConfig {
    kind: StageKind::Verify,
    skill_tag: "verify",
    default_model: "default",
    max_turns: 10,
    timeout_ms: 20 * 60 * 1000,
    pauses: false,
    auto_approve_threshold: None,
};

/// Ordered stage sequence for a tier. `done` is implicit and terminates
/// the sequence; it is not a StageKind because it has no model invocation or config.
pub fn stage_sequence(tier: Tier) -> &'static [StageConfig] {
    match tier {
        Tier::L1 => &[PLAN, IMPLEMENT],
        Tier::L2 => &[BRAINSTORM, PLAN, IMPLEMENT, VERIFY],
        Tier::L3 => &[BRAINSTORM, DESIGN_REVIEW, PLAN, IMPLEMENT, CODE_REVIEW, VERIFY],
    }
}

pub fn stage_config(tier: Tier, kind: StageKind) -> Option<&'static StageConfig> {
    stage_sequence(tier).iter().find(|s| s.kind == kind)
}

/// The stage immediately after `kind` in `tier`'s sequence, or `None` if `kind` is the last
/// stage (meaning the next transition is to the terminal `done` status).
pub fn next_stage(tier: Tier, kind: StageKind) -> Option<StageKind> {
    let seq = stage_sequence(tier);
    let idx = seq.iter().position(|s| s.kind == kind)?;
    seq.get(idx + 1).map(|s| s.kind)
}

pub fn is_last_stage(tier: Tier, kind: StageKind) -> bool {
    next_stage(tier, kind).is_none()
}

pub fn first_stage(tier: Tier) -> StageKind {
    stage_sequence(tier)[0].kind
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_l1_sequence() {
        let seq: Vec<StageKind> = stage_sequence(Tier::L1).iter().map(|s| s.kind).collect();
        assert_eq!(seq, vec![StageKind::Plan, StageKind::Implement]);
    }

    #[test]
    fn test_l3_sequence() {
        let seq: Vec<StageKind> = stage_sequence(Tier::L3).iter().map(|s| s.kind).collect();
        assert_eq!(
            seq,
            vec![
                StageKind::Brainstorm,
                StageKind::DesignReview,
                StageKind::Plan,
                StageKind::Implement,
                StageKind::CodeReview,
                StageKind::Verify,
            ]
        );
    }

    #[test]
    fn test_next_stage_and_terminal() {
        assert_eq!(next_stage(Tier::L1, StageKind::Plan), Some(StageKind::Implement));
        assert!(is_last_stage(Tier::L1, StageKind::Implement));
        assert!(!is_last_stage(Tier::L2, StageKind::Plan));
    }

    #[test]
    fn test_first_stage_per_tier() {
        assert_eq!(first_stage(Tier::L1), StageKind::Plan);
        assert_eq!(first_stage(Tier::L2), StageKind::Brainstorm);
        assert_eq!(first_stage(Tier::L3), StageKind::Brainstorm);
    }
}
