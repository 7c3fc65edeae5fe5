/**
 * Workshop Session Auto-Naming
 *
 * DESIGN DECISION: Renaming is a best-effort secondary model call; failure is silent and
 * leaves the default title in place
 * WHY: failure of this secondary call is silent, the title remains. This is a cosmetic
 * feature, not part of the pipeline state machine, so it must never surface an error through
 * the Engine's public contract
 */

use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

use crate::events::{EngineEvent, EventSender};
use crate::model::approval::ApprovalRegistry;
use crate::persistence::PersistenceStore;
use crate::runner::{CancellationToken, ModelSession, RunnerInput, RunnerOutcome};

pub const DEFAULT_WORKSHOP_TITLE: &str = "New Session";
const TITLE_PROMPT: &str = "Reply with only a 3-5 word title summarising this conversation so far. No punctuation, no quotes.";

/// Issue the short secondary prompt and, on success, emit `session-renamed`. Any failure
/// (session error, malformed title) is swallowed - the caller's title is left untouched.
pub async fn maybe_autoname_session(
    session_id: &str,
    current_title: &str,
    runner: &Arc<dyn ModelSession>,
    approvals: &Arc<Mutex<ApprovalRegistry>>,
    events: &EventSender,
    store: &Arc<PersistenceStore>,
    working_dir: std::path::PathBuf,
) {
    if current_title != DEFAULT_WORKSHOP_TITLE {
        return;
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    tokio::spawn(async move { while rx.recv().await.is_some() {} });

    let input = RunnerInput {
        task_id: 0,
        prompt: TITLE_PROMPT.to_string(),
        model: "default".to_string(),
        working_dir,
        max_turns: 1,
        timeout: std::time::Duration::from_secs(20),
        resume_handle: Some(session_id.to_string()),
        attempt: 0,
    };

    let outcome = runner
        .run(input, tx, approvals.clone(), events.clone(), session_id.to_string(), CancellationToken::new())
        .await;

    let title = match outcome {
        Ok(RunnerOutcome::Completed { text, .. }) => text.trim().to_string(),
        _ => {
            eprintln!("workshop: auto-naming secondary call failed for session {session_id}, keeping default title");
            return;
        }
    };

    let word_count = title.split_whitespace().count();
    if title.is_empty() || !(3..=5).contains(&word_count) {
        eprintln!("workshop: auto-naming returned an unusable title '{title}', keeping default");
        return;
    }

    // Best-effort, same as the secondary model call above: a session row that hasn't been
    // persisted yet must not turn a cosmetic rename into a hard failure.
    let _ = store.rename_workshop_session(session_id, &title);
    let _ = events.send(EngineEvent::SessionRenamed { session_id: session_id.to_string(), title });
}
