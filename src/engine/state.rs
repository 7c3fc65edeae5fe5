/**
 * Transition Protocol
 *
 * DESIGN DECISION: Pure functions over `Task` + the static stage tables, no I/O, so the
 * transition rules can be unit tested without a Runner or a store
 * WHY: `canTransition` is a pure predicate over task state and the circuit-breaker counters;
 * keeping it pure lets the Pipeline Engine (mod.rs) call it at every decision point without
 * threading persistence through it
 */

use crate::model::stage::{stage_sequence, StageKind};
use crate::model::task::{Task, CIRCUIT_BREAKER_LIMIT};

/// Why a transition to `next` is refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Denial {
    NotInSequence,
    CircuitBreaker { stage: StageKind, count: u32 },
}

/// Confirm `next` is reachable from `task`'s current tier sequence and that no circuit
/// breaker blocks it.
pub fn can_transition(task: &Task, next: StageKind) -> Result<(), Denial> {
    let in_sequence = stage_sequence(task.tier).iter().any(|s| s.kind == next);
    if !in_sequence {
        return Err(Denial::NotInSequence);
    }

    if matches!(next, StageKind::Plan | StageKind::Implement) {
        let count = task.review_count(next);
        if count >= CIRCUIT_BREAKER_LIMIT {
            return Err(Denial::CircuitBreaker { stage: next, count });
        }
    }

    Ok(())
}
