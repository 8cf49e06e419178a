#![deny(missing_docs)]
//! Filesystem-backed implementation of `stepwise-core`'s `StateStore`
//! trait (§4.2).
//!
//! One logical document per user: `<root>/<encoded-user-id>.json`, holding
//! that user's sole active `WorkflowState` (if any). Writes are atomic —
//! a temp file is written alongside the target and renamed into place, so
//! readers never observe a torn write. A single writer is assumed; two
//! `FsStore`s pointed at the same data directory is undefined behavior.

use async_trait::async_trait;
use stepwise_core::{now_millis, StateError, StateStore, UserId, WorkflowId, WorkflowState};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors specific to recovering state from disk at startup.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum RecoveryError {
    /// The data directory could not be read.
    #[error("failed to read data directory: {0}")]
    ReadDir(String),
}

/// One outcome of the startup recovery scan, kept as an audit trail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// The state was rehydrated successfully and is still active.
    Kept {
        /// The user whose state was kept.
        user: UserId,
    },
    /// The state's `expires_at` had already passed; it was deleted.
    DroppedExpired {
        /// The user whose state was dropped.
        user: UserId,
    },
    /// The state named a workflow no longer present in the registry; it
    /// was deleted.
    DroppedUnknownWorkflow {
        /// The user whose state was dropped.
        user: UserId,
        /// The workflow id that is no longer registered.
        workflow: WorkflowId,
    },
    /// The file on disk could not be parsed as a `WorkflowState` at all;
    /// it was left in place for manual inspection rather than deleted.
    Unreadable {
        /// The file that failed to parse.
        path: PathBuf,
        /// The parse error.
        reason: String,
    },
}

/// Filesystem-backed state store.
///
/// Suitable for single-machine deployments where workflow state must
/// survive process restarts without a database.
pub struct FsStore {
    root: PathBuf,
}

fn encode_user_id(user_id: &UserId) -> String {
    let mut encoded = String::new();
    for ch in user_id.as_str().chars() {
        match ch {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => encoded.push(ch),
            _ => {
                for byte in ch.to_string().as_bytes() {
                    encoded.push_str(&format!("%{byte:02X}"));
                }
            }
        }
    }
    encoded
}

fn decode_user_id(encoded: &str) -> Option<String> {
    let bytes = encoded.as_bytes();
    let mut result = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok()?;
            result.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            result.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(result).ok()
}

impl FsStore {
    /// Create a new filesystem store rooted at the given directory. The
    /// directory is created lazily on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, user_id: &UserId) -> PathBuf {
        self.root.join(format!("{}.json", encode_user_id(user_id)))
    }

    async fn write_atomic(&self, path: &Path, contents: &str) -> Result<(), StateError> {
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| StateError::Storage(e.to_string()))?;
        }
        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, contents)
            .await
            .map_err(|e| StateError::Storage(e.to_string()))?;
        tokio::fs::rename(&tmp_path, path)
            .await
            .map_err(|e| StateError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn read_state(&self, path: &Path) -> Result<Option<WorkflowState>, StateError> {
        match tokio::fs::read_to_string(path).await {
            Ok(contents) => {
                let state: WorkflowState = serde_json::from_str(&contents)
                    .map_err(|e| StateError::Storage(e.to_string()))?;
                Ok(Some(state))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StateError::Storage(e.to_string())),
        }
    }

    /// Rehydrate from disk at startup. Drops (deletes) any state whose
    /// `expires_at` has passed, and any state whose `workflow_id` is not
    /// in `known_workflows`, recording each such drop in the returned
    /// audit trail. Files that fail to parse are left untouched.
    pub async fn recover(
        &self,
        known_workflows: &HashSet<WorkflowId>,
    ) -> Result<Vec<RecoveryOutcome>, RecoveryError> {
        let mut outcomes = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(outcomes),
            Err(e) => return Err(RecoveryError::ReadDir(e.to_string())),
        };

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| RecoveryError::ReadDir(e.to_string()))?
        {
            let path = entry.path();
            let Some(filename) = path.file_name().and_then(|f| f.to_str()) else {
                continue;
            };
            let Some(encoded) = filename.strip_suffix(".json") else {
                continue;
            };
            let Some(user_id_str) = decode_user_id(encoded) else {
                continue;
            };
            let user_id = UserId::new(user_id_str);

            let contents = match tokio::fs::read_to_string(&path).await {
                Ok(c) => c,
                Err(_) => continue,
            };
            let state: WorkflowState = match serde_json::from_str(&contents) {
                Ok(s) => s,
                Err(e) => {
                    outcomes.push(RecoveryOutcome::Unreadable {
                        path: path.clone(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            if state.is_expired(now_millis()) {
                let _ = tokio::fs::remove_file(&path).await;
                outcomes.push(RecoveryOutcome::DroppedExpired { user: user_id });
                continue;
            }
            if !known_workflows.contains(&state.workflow_id) {
                let _ = tokio::fs::remove_file(&path).await;
                outcomes.push(RecoveryOutcome::DroppedUnknownWorkflow {
                    user: user_id,
                    workflow: state.workflow_id,
                });
                continue;
            }
            outcomes.push(RecoveryOutcome::Kept { user: user_id });
        }

        Ok(outcomes)
    }

    /// Delete every on-disk state whose `expires_at` has passed. Returns
    /// how many were dropped, for an observer to log.
    pub async fn sweep_expired(&self) -> Result<usize, StateError> {
        let mut dropped = 0;
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(StateError::Storage(e.to_string())),
        };
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StateError::Storage(e.to_string()))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(state) = self.read_state(&path).await? {
                if state.is_expired(now_millis()) {
                    let _ = tokio::fs::remove_file(&path).await;
                    dropped += 1;
                }
            }
        }
        Ok(dropped)
    }
}

#[async_trait]
impl StateStore for FsStore {
    async fn create(&self, state: WorkflowState) -> Result<(), StateError> {
        let path = self.path_for(&state.user_id);
        if let Some(existing) = self.read_state(&path).await? {
            if !existing.is_expired(now_millis()) {
                return Err(StateError::AlreadyExists {
                    user: state.user_id,
                    workflow: state.workflow_id,
                });
            }
        }
        let contents = serde_json::to_string_pretty(&state)
            .map_err(|e| StateError::Storage(e.to_string()))?;
        self.write_atomic(&path, &contents).await
    }

    async fn get(
        &self,
        user_id: &UserId,
        workflow_id: &WorkflowId,
    ) -> Result<Option<WorkflowState>, StateError> {
        let path = self.path_for(user_id);
        let state = self.read_state(&path).await?;
        Ok(state.filter(|s| &s.workflow_id == workflow_id && !s.is_expired(now_millis())))
    }

    async fn get_active_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<WorkflowState>, StateError> {
        let path = self.path_for(user_id);
        let state = self.read_state(&path).await?;
        Ok(state.filter(|s| !s.is_expired(now_millis())))
    }

    async fn update(&self, state: WorkflowState) -> Result<(), StateError> {
        let path = self.path_for(&state.user_id);
        let contents = serde_json::to_string_pretty(&state)
            .map_err(|e| StateError::Storage(e.to_string()))?;
        self.write_atomic(&path, &contents).await
    }

    async fn delete(&self, user_id: &UserId, workflow_id: &WorkflowId) -> Result<(), StateError> {
        let path = self.path_for(user_id);
        match self.read_state(&path).await? {
            Some(existing) if &existing.workflow_id != workflow_id => Ok(()),
            _ => match tokio::fs::remove_file(&path).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(StateError::Storage(e.to_string())),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stepwise_core::{StepId, SurfaceId};
    use std::collections::HashMap;

    fn sample(user: &str, workflow: &str, expires_at: u64) -> WorkflowState {
        WorkflowState {
            workflow_id: WorkflowId::new(workflow),
            user_id: UserId::new(user),
            current_step: StepId::new("a"),
            step_history: vec![],
            data: HashMap::new(),
            started_at: now_millis(),
            last_active_at: now_millis(),
            origin_surface: SurfaceId::new("telegram"),
            last_surface: SurfaceId::new("telegram"),
            expires_at,
            last_message_ids: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        let state = sample("u1", "wf", now_millis() + 60_000);
        store.create(state.clone()).await.unwrap();
        let fetched = store
            .get(&UserId::new("u1"), &WorkflowId::new("wf"))
            .await
            .unwrap();
        assert_eq!(fetched, Some(state));
    }

    #[tokio::test]
    async fn create_twice_fails_while_active() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        let state = sample("u1", "wf", now_millis() + 60_000);
        store.create(state.clone()).await.unwrap();
        let err = store.create(state).await.unwrap_err();
        assert!(matches!(err, StateError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn update_overwrites_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        let mut state = sample("u1", "wf", now_millis() + 60_000);
        store.create(state.clone()).await.unwrap();
        state.current_step = StepId::new("b");
        store.update(state.clone()).await.unwrap();
        let fetched = store
            .get(&UserId::new("u1"), &WorkflowId::new("wf"))
            .await
            .unwrap();
        assert_eq!(fetched.unwrap().current_step, StepId::new("b"));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        store
            .delete(&UserId::new("absent"), &WorkflowId::new("absent"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn delete_for_a_different_workflow_than_the_active_one_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        store
            .create(sample("u1", "wf-a", now_millis() + 60_000))
            .await
            .unwrap();

        store.delete(&UserId::new("u1"), &WorkflowId::new("wf-b")).await.unwrap();

        let fetched = store
            .get(&UserId::new("u1"), &WorkflowId::new("wf-a"))
            .await
            .unwrap();
        assert!(fetched.is_some(), "wf-a's state must survive a delete addressed to wf-b");
    }

    #[tokio::test]
    async fn get_for_a_different_workflow_than_the_active_one_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        store
            .create(sample("u1", "wf-a", now_millis() + 60_000))
            .await
            .unwrap();
        let fetched = store
            .get(&UserId::new("u1"), &WorkflowId::new("wf-b"))
            .await
            .unwrap();
        assert_eq!(fetched, None);
    }

    #[tokio::test]
    async fn recover_drops_expired_states() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        let contents = serde_json::to_string(&sample("u1", "wf", 1)).unwrap();
        tokio::fs::write(dir.path().join(format!("{}.json", encode_user_id(&UserId::new("u1")))), contents)
            .await
            .unwrap();

        let known = HashSet::from([WorkflowId::new("wf")]);
        let outcomes = store.recover(&known).await.unwrap();
        assert_eq!(outcomes, vec![RecoveryOutcome::DroppedExpired { user: UserId::new("u1") }]);
        assert_eq!(
            store.get_active_for_user(&UserId::new("u1")).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn recover_drops_states_for_unregistered_workflows() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        store
            .create(sample("u1", "deprecated-wf", now_millis() + 60_000))
            .await
            .unwrap();

        let known = HashSet::new();
        let outcomes = store.recover(&known).await.unwrap();
        assert_eq!(
            outcomes,
            vec![RecoveryOutcome::DroppedUnknownWorkflow {
                user: UserId::new("u1"),
                workflow: WorkflowId::new("deprecated-wf"),
            }]
        );
    }

    #[tokio::test]
    async fn recover_keeps_valid_active_states() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        store
            .create(sample("u1", "wf", now_millis() + 60_000))
            .await
            .unwrap();

        let known = HashSet::from([WorkflowId::new("wf")]);
        let outcomes = store.recover(&known).await.unwrap();
        assert_eq!(outcomes, vec![RecoveryOutcome::Kept { user: UserId::new("u1") }]);
    }

    #[test]
    fn user_id_encoding_roundtrips_unsafe_characters() {
        for id in ["simple", "user:123", "has spaces", "slash/in/it"] {
            let encoded = encode_user_id(&UserId::new(id));
            let decoded = decode_user_id(&encoded).unwrap();
            assert_eq!(decoded, id);
        }
    }
}
