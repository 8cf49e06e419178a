//! Wall-clock time as epoch milliseconds — the timestamp unit used
//! throughout `WorkflowState`, `LinkCode`, and `QueueEntry` (§3).

use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time, in milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
