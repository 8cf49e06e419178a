#![deny(missing_docs)]
//! In-memory implementation of `stepwise-core`'s `StateStore` trait.
//!
//! Uses a `HashMap` behind a `RwLock` for concurrent access. Suitable for
//! testing and single-process deployments where persistence across
//! restarts is not required. Expired entries are dropped lazily on
//! access, matching the lazy-check-on-`get` half of the state store's
//! TTL policy (the other half, the periodic sweep, is this store's
//! `sweep_expired`).

use async_trait::async_trait;
use stepwise_core::{now_millis, StateError, StateStore, UserId, WorkflowId, WorkflowState};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// In-memory state store backed by a `HashMap` behind a `RwLock`.
pub struct MemoryStore {
    data: RwLock<HashMap<(UserId, WorkflowId), WorkflowState>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
        }
    }

    /// Delete every entry whose `expires_at` has passed as of now. Returns
    /// how many entries were dropped, for an observer to log.
    pub async fn sweep_expired(&self) -> usize {
        let now = now_millis();
        let mut data = self.data.write().await;
        let before = data.len();
        data.retain(|_, state| !state.is_expired(now));
        before - data.len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn create(&self, state: WorkflowState) -> Result<(), StateError> {
        let key = (state.user_id.clone(), state.workflow_id.clone());
        let mut data = self.data.write().await;
        let now = now_millis();
        if data
            .values()
            .any(|existing| existing.user_id == state.user_id && !existing.is_expired(now))
        {
            return Err(StateError::AlreadyExists {
                user: state.user_id,
                workflow: state.workflow_id,
            });
        }
        data.insert(key, state);
        Ok(())
    }

    async fn get(
        &self,
        user_id: &UserId,
        workflow_id: &WorkflowId,
    ) -> Result<Option<WorkflowState>, StateError> {
        let now = now_millis();
        let data = self.data.read().await;
        Ok(data
            .get(&(user_id.clone(), workflow_id.clone()))
            .filter(|state| !state.is_expired(now))
            .cloned())
    }

    async fn get_active_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<WorkflowState>, StateError> {
        let now = now_millis();
        let data = self.data.read().await;
        Ok(data
            .values()
            .find(|state| &state.user_id == user_id && !state.is_expired(now))
            .cloned())
    }

    async fn update(&self, state: WorkflowState) -> Result<(), StateError> {
        let key = (state.user_id.clone(), state.workflow_id.clone());
        let mut data = self.data.write().await;
        data.insert(key, state);
        Ok(())
    }

    async fn delete(&self, user_id: &UserId, workflow_id: &WorkflowId) -> Result<(), StateError> {
        let mut data = self.data.write().await;
        data.remove(&(user_id.clone(), workflow_id.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stepwise_core::{SurfaceId, StepId};
    use std::collections::HashMap as StdHashMap;

    fn sample(user: &str, workflow: &str, expires_at: u64) -> WorkflowState {
        WorkflowState {
            workflow_id: WorkflowId::new(workflow),
            user_id: UserId::new(user),
            current_step: StepId::new("a"),
            step_history: vec![],
            data: StdHashMap::new(),
            started_at: now_millis(),
            last_active_at: now_millis(),
            origin_surface: SurfaceId::new("telegram"),
            last_surface: SurfaceId::new("telegram"),
            expires_at,
            last_message_ids: StdHashMap::new(),
        }
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let store = MemoryStore::new();
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
        let store = MemoryStore::new();
        let state = sample("u1", "wf", now_millis() + 60_000);
        store.create(state.clone()).await.unwrap();
        let err = store.create(state).await.unwrap_err();
        assert!(matches!(err, StateError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn create_fails_for_a_second_workflow_while_another_is_active() {
        let store = MemoryStore::new();
        store.create(sample("u1", "wf-a", now_millis() + 60_000)).await.unwrap();
        let err = store
            .create(sample("u1", "wf-b", now_millis() + 60_000))
            .await
            .unwrap_err();
        assert!(matches!(err, StateError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn create_succeeds_over_an_expired_entry() {
        let store = MemoryStore::new();
        let expired = sample("u1", "wf", 1);
        store.create(expired).await.unwrap();
        let fresh = sample("u1", "wf", now_millis() + 60_000);
        store.create(fresh).await.unwrap();
    }

    #[tokio::test]
    async fn get_hides_expired_entries() {
        let store = MemoryStore::new();
        store.create(sample("u1", "wf", 1)).await.unwrap();
        let fetched = store
            .get(&UserId::new("u1"), &WorkflowId::new("wf"))
            .await
            .unwrap();
        assert_eq!(fetched, None);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = MemoryStore::new();
        store
            .delete(&UserId::new("absent"), &WorkflowId::new("absent"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn sweep_expired_removes_only_expired_entries() {
        let store = MemoryStore::new();
        store.create(sample("u1", "wf", 1)).await.unwrap();
        store
            .create(sample("u2", "wf", now_millis() + 60_000))
            .await
            .unwrap();
        let dropped = store.sweep_expired().await;
        assert_eq!(dropped, 1);
        assert!(store
            .get(&UserId::new("u2"), &WorkflowId::new("wf"))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn get_active_for_user_finds_the_sole_instance() {
        let store = MemoryStore::new();
        let state = sample("u1", "wf", now_millis() + 60_000);
        store.create(state.clone()).await.unwrap();
        let active = store.get_active_for_user(&UserId::new("u1")).await.unwrap();
        assert_eq!(active, Some(state));
    }
}
