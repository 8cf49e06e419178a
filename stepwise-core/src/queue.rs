//! Retry-queue entries for proactive delivery (§3, §4.6).

use crate::id::{SurfaceId, UserId};
use serde::{Deserialize, Serialize};

/// A free-form message awaiting delivery to a surface, with retry bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Unique id for this entry (used to avoid duplicate persistence).
    pub id: String,
    /// The user the message is addressed to.
    pub user_id: UserId,
    /// The surface to deliver on.
    pub target_surface: SurfaceId,
    /// Free-form message payload, opaque to the router.
    pub message: serde_json::Value,
    /// When the entry was first queued, in epoch milliseconds.
    pub queued_at: u64,
    /// Delivery attempts made so far.
    pub attempts: u32,
    /// When the last attempt was made, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt_at: Option<u64>,
    /// Attempts allowed before the entry is dropped.
    pub max_attempts: u32,
}

impl QueueEntry {
    /// Whether this entry has exhausted its attempt budget.
    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}
