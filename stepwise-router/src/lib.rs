#![deny(missing_docs)]
//! Message router (§4.6): last-surface reply, proactive-to-default
//! delivery, and a bounded per-user retry queue with fixed backoff.
//!
//! Adapters are registered under their [`SurfaceId`] the way
//! `neuron-orch-local` registers operators under an `AgentId` — a plain
//! `HashMap<SurfaceId, Arc<dyn SurfaceAdapter>>` behind a lock, dispatched
//! to directly rather than through a generic executor abstraction.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use stepwise_core::{
    now_millis, EngineEvent, EngineObserver, NullObserver, QueueEntry, RenderTarget, SurfaceAdapter,
    SurfaceId, SurfaceUserId, UserId,
};
use thiserror::Error;
use tokio::sync::RwLock;

/// Backoff schedule, in seconds per attempt already made (§4.6).
pub const BACKOFF_SCHEDULE_SECS: [u64; 5] = [10, 30, 90, 270, 810];

/// Attempts allowed before an entry is dropped.
pub const MAX_ATTEMPTS: u32 = 5;

/// Per-user queue length cap; oldest entry is dropped on overflow.
pub const MAX_QUEUE_PER_USER: usize = 20;

/// Errors from router operations.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum RouterError {
    /// No adapter is registered for the requested surface.
    #[error("no adapter registered for surface {0}")]
    AdapterNotFound(SurfaceId),

    /// Neither a last-surface nor a resolvable default surface exists
    /// for this user.
    #[error("user {0} has no routable surface")]
    UserNotRoutable(UserId),

    /// The underlying queue persistence medium failed.
    #[error("storage failure: {0}")]
    Storage(String),
}

/// What the router needs to know about a user to route a message,
/// without depending on `stepwise-identity` directly — any identity
/// store can implement this.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// The user's surface identity on `surface`, if linked.
    async fn surface_user_id(&self, user_id: &UserId, surface: &SurfaceId) -> Option<SurfaceUserId>;

    /// The user's default (proactive) surface, if known.
    async fn default_surface(&self, user_id: &UserId) -> Option<SurfaceId>;
}

fn queue_path(data_dir: &Path) -> PathBuf {
    data_dir.join("message-queue.json")
}

async fn write_atomic(path: &Path, contents: &str) -> Result<(), RouterError> {
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| RouterError::Storage(e.to_string()))?;
    }
    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, contents)
        .await
        .map_err(|e| RouterError::Storage(e.to_string()))?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| RouterError::Storage(e.to_string()))?;
    Ok(())
}

/// Routes responses and proactive messages to surfaces, queueing and
/// retrying with backoff on transport failure.
pub struct MessageRouter {
    data_dir: PathBuf,
    adapters: RwLock<HashMap<SurfaceId, Arc<dyn SurfaceAdapter>>>,
    directory: Arc<dyn UserDirectory>,
    queue: RwLock<Vec<QueueEntry>>,
    next_entry_id: AtomicU64,
    observer: Arc<dyn EngineObserver>,
}

impl MessageRouter {
    /// Construct a router rooted at `data_dir`, resolving users via
    /// `directory`. Call [`MessageRouter::load`] to rehydrate a
    /// previously persisted queue.
    pub fn new(data_dir: impl Into<PathBuf>, directory: Arc<dyn UserDirectory>) -> Self {
        Self {
            data_dir: data_dir.into(),
            adapters: RwLock::new(HashMap::new()),
            directory,
            queue: RwLock::new(Vec::new()),
            next_entry_id: AtomicU64::new(1),
            observer: Arc::new(NullObserver),
        }
    }

    /// Attach an observer for enqueue/retry/drop events.
    pub fn with_observer(mut self, observer: Arc<dyn EngineObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Register an adapter under its own surface id.
    pub async fn register_adapter(&self, adapter: Arc<dyn SurfaceAdapter>) {
        let id = adapter.surface_id().clone();
        self.adapters.write().await.insert(id, adapter);
    }

    /// Rehydrate the retry queue from `message-queue.json`. Absent file
    /// is treated as an empty queue.
    pub async fn load(&self) -> Result<(), RouterError> {
        let entries: Vec<QueueEntry> = match tokio::fs::read_to_string(queue_path(&self.data_dir)).await
        {
            Ok(contents) => {
                serde_json::from_str(&contents).map_err(|e| RouterError::Storage(e.to_string()))?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(RouterError::Storage(e.to_string())),
        };
        *self.queue.write().await = entries;
        Ok(())
    }

    async fn persist_queue(&self, entries: &[QueueEntry]) -> Result<(), RouterError> {
        let contents =
            serde_json::to_string_pretty(entries).map_err(|e| RouterError::Storage(e.to_string()))?;
        write_atomic(&queue_path(&self.data_dir), &contents).await
    }

    /// Reply on the surface of the user's latest inbound action.
    pub async fn route_response(
        &self,
        user_id: &UserId,
        last_surface: &SurfaceId,
        message: serde_json::Value,
    ) -> Result<(), RouterError> {
        self.deliver_or_enqueue(user_id, last_surface, message).await
    }

    /// Emit on the user's default surface.
    pub async fn route_proactive(
        &self,
        user_id: &UserId,
        message: serde_json::Value,
    ) -> Result<(), RouterError> {
        let surface = self
            .directory
            .default_surface(user_id)
            .await
            .ok_or_else(|| RouterError::UserNotRoutable(user_id.clone()))?;
        self.deliver_or_enqueue(user_id, &surface, message).await
    }

    async fn deliver_or_enqueue(
        &self,
        user_id: &UserId,
        surface: &SurfaceId,
        message: serde_json::Value,
    ) -> Result<(), RouterError> {
        match self.try_deliver(user_id, surface, &message).await {
            Ok(()) => Ok(()),
            Err(_) => self.enqueue(user_id, surface, message).await,
        }
    }

    async fn try_deliver(
        &self,
        user_id: &UserId,
        surface: &SurfaceId,
        message: &serde_json::Value,
    ) -> Result<(), RouterError> {
        let adapters = self.adapters.read().await;
        let adapter = adapters
            .get(surface)
            .ok_or_else(|| RouterError::AdapterNotFound(surface.clone()))?;
        let surface_user_id = self
            .directory
            .surface_user_id(user_id, surface)
            .await
            .ok_or_else(|| RouterError::UserNotRoutable(user_id.clone()))?;
        let target = RenderTarget {
            surface_user_id,
            channel_id: None,
            thread_id: None,
        };
        adapter
            .send_message(&target, message)
            .await
            .map(|_| ())
            .map_err(|e| RouterError::Storage(e.to_string()))
    }

    async fn enqueue(
        &self,
        user_id: &UserId,
        surface: &SurfaceId,
        message: serde_json::Value,
    ) -> Result<(), RouterError> {
        let id = self.next_entry_id.fetch_add(1, Ordering::Relaxed);
        let entry = QueueEntry {
            id: format!("q-{id}"),
            user_id: user_id.clone(),
            target_surface: surface.clone(),
            message,
            queued_at: now_millis(),
            attempts: 0,
            last_attempt_at: None,
            max_attempts: MAX_ATTEMPTS,
        };

        let mut queue = self.queue.write().await;
        let mut user_entries: Vec<usize> = queue
            .iter()
            .enumerate()
            .filter(|(_, e)| &e.user_id == user_id)
            .map(|(i, _)| i)
            .collect();
        if user_entries.len() >= MAX_QUEUE_PER_USER {
            user_entries.sort_by_key(|&i| queue[i].queued_at);
            let oldest = user_entries[0];
            queue.remove(oldest);
            self.observer.on_event(EngineEvent::MessageDropped {
                user: user_id.clone(),
                reason: "queue full, oldest entry dropped".to_string(),
            });
        }
        queue.push(entry);
        self.observer.on_event(EngineEvent::MessageEnqueued {
            user: user_id.clone(),
            surface: surface.clone(),
        });
        self.persist_queue(&queue).await
    }

    fn cooldown_elapsed(entry: &QueueEntry, now: u64) -> bool {
        let index = entry.attempts.saturating_sub(1) as usize;
        let schedule_secs = BACKOFF_SCHEDULE_SECS
            .get(index)
            .copied()
            .unwrap_or(*BACKOFF_SCHEDULE_SECS.last().unwrap());
        let since = entry.last_attempt_at.unwrap_or(entry.queued_at);
        now >= since + schedule_secs * 1000
    }

    /// Sweep the queue once: retries entries whose cool-down has
    /// elapsed, drops entries whose target surface is no longer linked
    /// to the user or whose attempts are exhausted. Intended to run on a
    /// 30s timer. Safe to call with an empty queue (no side effects).
    pub async fn process_queue(&self) -> Result<(), RouterError> {
        let now = now_millis();
        let mut queue = self.queue.write().await;
        if queue.is_empty() {
            return Ok(());
        }

        let mut survivors = Vec::with_capacity(queue.len());
        for mut entry in std::mem::take(&mut *queue) {
            if self
                .directory
                .surface_user_id(&entry.user_id, &entry.target_surface)
                .await
                .is_none()
            {
                self.observer.on_event(EngineEvent::MessageDropped {
                    user: entry.user_id.clone(),
                    reason: "target surface no longer linked".to_string(),
                });
                continue;
            }

            if !Self::cooldown_elapsed(&entry, now) {
                survivors.push(entry);
                continue;
            }

            match self
                .try_deliver(&entry.user_id, &entry.target_surface, &entry.message)
                .await
            {
                Ok(()) => {}
                Err(_) => {
                    entry.attempts += 1;
                    entry.last_attempt_at = Some(now);
                    if entry.is_exhausted() {
                        self.observer.on_event(EngineEvent::MessageDropped {
                            user: entry.user_id.clone(),
                            reason: "retry attempts exhausted".to_string(),
                        });
                    } else {
                        let next_index = entry.attempts.saturating_sub(1) as usize;
                        let next_in = BACKOFF_SCHEDULE_SECS
                            .get(next_index)
                            .copied()
                            .unwrap_or(*BACKOFF_SCHEDULE_SECS.last().unwrap());
                        self.observer.on_event(EngineEvent::MessageRetryScheduled {
                            user: entry.user_id.clone(),
                            attempt: entry.attempts,
                            next_attempt_in_secs: next_in,
                        });
                        survivors.push(entry);
                    }
                }
            }
        }

        *queue = survivors;
        self.persist_queue(&queue).await
    }

    /// Current queue length, for tests and observability.
    pub async fn queue_len(&self) -> usize {
        self.queue.read().await.len()
    }
}
