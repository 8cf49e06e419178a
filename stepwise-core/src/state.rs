//! Per-user workflow instance state (§3, §4.2).

use crate::id::{StepId, SurfaceId, UserId, WorkflowId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// A single selection: either one option id (`choice`/`confirm`) or several
/// (`multi-choice`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Selection {
    /// One chosen option id.
    Single(String),
    /// Several chosen option ids.
    Multiple(Vec<String>),
}

impl Selection {
    /// View the selection as a slice regardless of arity.
    pub fn as_slice(&self) -> &[String] {
        match self {
            Selection::Single(s) => std::slice::from_ref(s),
            Selection::Multiple(v) => v,
        }
    }
}

/// What a step recorded when the user passed through it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepData {
    /// Milliseconds since the Unix epoch when this data was recorded.
    pub timestamp: u64,
    /// Raw text reply, for `text-input` steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    /// Selection, for `choice`/`multi-choice`/`confirm` steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection: Option<Selection>,
}

impl StepData {
    /// Record a text reply.
    pub fn from_input(input: impl Into<String>, timestamp: u64) -> Self {
        Self {
            timestamp,
            input: Some(input.into()),
            selection: None,
        }
    }

    /// Record a selection.
    pub fn from_selection(selection: Selection, timestamp: u64) -> Self {
        Self {
            timestamp,
            input: None,
            selection: Some(selection),
        }
    }
}

/// Durable per-user, per-workflow instance state. At most one active
/// instance exists per `(user_id, workflow_id)` and at most one active
/// instance exists per user at all (enforced by the state store, §4.2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    /// Which workflow definition this instance runs.
    pub workflow_id: WorkflowId,
    /// The unified user this instance belongs to.
    pub user_id: UserId,
    /// The step currently awaiting input (or about to be rendered).
    pub current_step: StepId,
    /// Steps visited so far, in order, excluding `current_step`.
    pub step_history: Vec<StepId>,
    /// Data recorded at each visited step, keyed by step id.
    pub data: HashMap<StepId, StepData>,
    /// When this instance was started, in epoch milliseconds.
    pub started_at: u64,
    /// When this instance was last touched, in epoch milliseconds.
    pub last_active_at: u64,
    /// The surface the workflow was started on.
    pub origin_surface: SurfaceId,
    /// The surface of the most recent inbound action.
    pub last_surface: SurfaceId,
    /// When this instance expires, in epoch milliseconds. Always
    /// `> started_at`.
    pub expires_at: u64,
    /// The most recently rendered message id per surface, so a later
    /// render on the same surface can edit in place where supported.
    #[serde(default)]
    pub last_message_ids: HashMap<SurfaceId, String>,
}

impl WorkflowState {
    /// Whether `current_step` re-appears in `step_history` (should never
    /// be true; exposed for assertions in tests and recovery audits).
    pub fn history_contains_current(&self) -> bool {
        self.step_history.contains(&self.current_step)
    }

    /// Whether this instance has expired as of `now_millis`.
    pub fn is_expired(&self, now_millis: u64) -> bool {
        now_millis >= self.expires_at
    }
}

/// Errors from state store operations.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum StateError {
    /// `create` was called but an active state already exists for this
    /// `(userId, workflowId)`; the caller must `delete` first.
    #[error("active state already exists for user {user}, workflow {workflow}")]
    AlreadyExists {
        /// The user whose state collided.
        user: UserId,
        /// The workflow whose state collided.
        workflow: WorkflowId,
    },

    /// The underlying storage medium failed (disk I/O, serialization).
    #[error("storage failure: {0}")]
    Storage(String),

    /// Catch-all for other errors.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Persistent, crash-safe per-user workflow state with TTL (§4.2).
///
/// At most one active instance exists per `(user_id, workflow_id)`, and at
/// most one active instance exists per user at all — callers enforce the
/// latter by checking [`StateStore::get_active_for_user`] before
/// `create`. Implementations must make `update`/`delete` atomic with
/// respect to concurrent readers (e.g. temp-file + rename on a
/// filesystem-backed store).
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Create a new active state. Fails with
    /// [`StateError::AlreadyExists`] if one already exists for this
    /// `(user_id, workflow_id)`.
    async fn create(&self, state: WorkflowState) -> Result<(), StateError>;

    /// Fetch the state for a specific `(user_id, workflow_id)`, if any and
    /// not expired.
    async fn get(
        &self,
        user_id: &UserId,
        workflow_id: &WorkflowId,
    ) -> Result<Option<WorkflowState>, StateError>;

    /// Fetch the sole active state for a user, regardless of which
    /// workflow it belongs to, if any and not expired.
    async fn get_active_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<WorkflowState>, StateError>;

    /// Overwrite an existing state atomically. Implementations refresh
    /// `last_active_at` is the caller's responsibility to set before
    /// calling this — the store persists whatever it's given.
    async fn update(&self, state: WorkflowState) -> Result<(), StateError>;

    /// Delete a state. Idempotent — deleting an absent state is not an
    /// error.
    async fn delete(&self, user_id: &UserId, workflow_id: &WorkflowId) -> Result<(), StateError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_as_slice_single() {
        let s = Selection::Single("a".into());
        assert_eq!(s.as_slice(), &["a".to_string()]);
    }

    #[test]
    fn selection_as_slice_multiple() {
        let s = Selection::Multiple(vec!["a".into(), "b".into()]);
        assert_eq!(s.as_slice(), &["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn selection_round_trips_through_json() {
        let single = Selection::Single("yes".into());
        let json = serde_json::to_string(&single).unwrap();
        assert_eq!(json, "\"yes\"");
        let back: Selection = serde_json::from_str(&json).unwrap();
        assert_eq!(back, single);

        let multi = Selection::Multiple(vec!["a".into(), "b".into()]);
        let json = serde_json::to_string(&multi).unwrap();
        let back: Selection = serde_json::from_str(&json).unwrap();
        assert_eq!(back, multi);
    }

    #[test]
    fn is_expired_boundary() {
        let mut state = sample_state();
        state.expires_at = 1000;
        assert!(!state.is_expired(999));
        assert!(state.is_expired(1000));
        assert!(state.is_expired(1001));
    }

    fn sample_state() -> WorkflowState {
        WorkflowState {
            workflow_id: WorkflowId::new("wf"),
            user_id: UserId::new("u1"),
            current_step: StepId::new("a"),
            step_history: vec![],
            data: HashMap::new(),
            started_at: 0,
            last_active_at: 0,
            origin_surface: SurfaceId::new("telegram"),
            last_surface: SurfaceId::new("telegram"),
            expires_at: 0,
            last_message_ids: HashMap::new(),
        }
    }
}
