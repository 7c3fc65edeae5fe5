/**
 * Approval Request - transient tool-use mediation
 *
 * DESIGN DECISION: Process-wide map keyed by request id, each entry tagged with its owning
 * session id
 * WHY: cleanup on session abort must iterate only the tags belonging to the terminating
 * session, leaving other sessions' entries untouched
 */

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use super::task::TaskId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalResolution {
    pub allow: bool,
    pub message: Option<String>,
}

/// One pending approval request. The resolution channel is not `Clone`/`Serialize`; only
/// `ApprovalRequestInfo` below is exposed across the event channel boundary.
pub struct ApprovalRequest {
    pub request_id: String,
    pub session_id: String,
    pub task_id: TaskId,
    pub tool_name: String,
    pub tool_input: serde_json::Value,
    pub resolver: oneshot::Sender<ApprovalResolution>,
}

/// The serializable projection of a pending request, published on the event channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequestInfo {
    pub request_id: String,
    pub task_id: TaskId,
    pub tool_name: String,
    pub tool_input: serde_json::Value,
}

impl From<&ApprovalRequest> for ApprovalRequestInfo {
    fn from(req: &ApprovalRequest) -> Self {
        Self {
            request_id: req.request_id.clone(),
            task_id: req.task_id,
            tool_name: req.tool_name.clone(),
            tool_input: req.tool_input.clone(),
        }
    }
}

/// Process-wide pending-approval registry.
#[derive(Default)]
pub struct ApprovalRegistry {
    pending: std::collections::HashMap<String, ApprovalRequest>,
}

impl ApprovalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, request: ApprovalRequest) {
        self.pending.insert(request.request_id.clone(), request);
    }

    /// Resolve the named request. Returns `false` if no matching pending request exists
    /// (already resolved, or never registered).
    pub fn resolve(&mut self, request_id: &str, resolution: ApprovalResolution) -> bool {
        if let Some(req) = self.pending.remove(request_id) {
            let _ = req.resolver.send(resolution);
            true
        } else {
            false
        }
    }

    /// Resolve every pending request tagged with `session_id` as deny, removing them.
    /// Entries belonging to other sessions are untouched.
    pub fn deny_all_for_session(&mut self, session_id: &str, message: impl Into<String>) {
        let msg = message.into();
        let ids: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, r)| r.session_id == session_id)
            .map(|(id, _)| id.clone())
            .collect();
        for id in ids {
            if let Some(req) = self.pending.remove(&id) {
                let _ = req.resolver.send(ApprovalResolution { allow: false, message: Some(msg.clone()) });
            }
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_request(id: &str, session: &str) -> (ApprovalRequest, oneshot::Receiver<ApprovalResolution>) {
        let (tx, rx) = oneshot::channel();
        (
            ApprovalRequest {
                request_id: id.to_string(),
                session_id: session.to_string(),
                task_id: 1,
                tool_name: "write_file".to_string(),
                tool_input: serde_json::json!({}),
                resolver: tx,
            },
            rx,
        )
    }

    #[tokio::test]
    async fn test_resolve_delivers_to_waiter() {
        let mut registry = ApprovalRegistry::new();
        let (req, rx) = make_request("r1", "s1");
        registry.insert(req);

        assert!(registry.resolve("r1", ApprovalResolution { allow: true, message: None }));
        let resolution = rx.await.unwrap();
        assert!(resolution.allow);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_deny_all_for_session_only_affects_that_session() {
        let mut registry = ApprovalRegistry::new();
        let (req1, rx1) = make_request("r1", "session-a");
        let (req2, rx2) = make_request("r2", "session-b");
        registry.insert(req1);
        registry.insert(req2);

        registry.deny_all_for_session("session-a", "session ended");

        let res1 = rx1.await.unwrap();
        assert!(!res1.allow);
        assert_eq!(res1.message.as_deref(), Some("session ended"));

        // session-b's request must still be pending, untouched.
        assert_eq!(registry.len(), 1);
        drop(rx2);
    }

    #[test]
    fn test_resolve_unknown_id_returns_false() {
        let mut registry = ApprovalRegistry::new();
        assert!(!registry.resolve("missing", ApprovalResolution { allow: true, message: None }));
    }
}
