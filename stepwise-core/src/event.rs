//! Passive observability vocabulary — not a logging subsystem, just a
//! typed event a host may subscribe to.
//!
//! `stepwise-engine` and `stepwise-router` emit these through an optional
//! `Arc<dyn EngineObserver>`; a host wires that into `tracing`, a metrics
//! sink, or nothing. Neither crate depends on a concrete sink itself.

use crate::id::{StepId, SurfaceId, UserId, WorkflowId};
use serde::{Deserialize, Serialize};

/// An event emitted by the engine or router as a side effect of handling
/// an action, advancing a workflow, or delivering a queued message.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// A workflow instance was created.
    WorkflowStarted {
        /// The workflow definition that was started.
        workflow: WorkflowId,
        /// The user it was started for.
        user: UserId,
        /// The surface it was started on.
        surface: SurfaceId,
    },
    /// A workflow instance moved from one step to another, whether by
    /// direct user action or auto-advance.
    WorkflowAdvanced {
        /// The workflow instance.
        workflow: WorkflowId,
        /// The user.
        user: UserId,
        /// The step moved away from.
        from: StepId,
        /// The step moved to.
        to: StepId,
    },
    /// A workflow instance reached a terminal step and was deleted.
    WorkflowCompleted {
        /// The workflow instance.
        workflow: WorkflowId,
        /// The user.
        user: UserId,
    },
    /// A workflow instance was deleted without reaching a terminal step.
    WorkflowCancelled {
        /// The workflow instance.
        workflow: WorkflowId,
        /// The user.
        user: UserId,
        /// Why it was cancelled.
        reason: String,
    },
    /// A tool call bound to a step failed.
    ToolCallFailed {
        /// The workflow instance.
        workflow: WorkflowId,
        /// The step whose tool call failed.
        step: StepId,
        /// The tool's own error message.
        error: String,
    },
    /// A proactive message was placed on the router's retry queue.
    MessageEnqueued {
        /// The user the message is addressed to.
        user: UserId,
        /// The target surface.
        surface: SurfaceId,
    },
    /// A queued message's delivery attempt failed and will be retried.
    MessageRetryScheduled {
        /// The user the message is addressed to.
        user: UserId,
        /// Which attempt just failed (1-based).
        attempt: u32,
        /// Seconds until the next attempt.
        next_attempt_in_secs: u64,
    },
    /// A queued message exhausted its retry budget and was dropped, or its
    /// target surface disappeared from the user's linked surfaces.
    MessageDropped {
        /// The user the message was addressed to.
        user: UserId,
        /// Why it was dropped.
        reason: String,
    },
}

/// A sink for [`EngineEvent`]s. Implementations decide what to do with
/// each event — log it, record a metric, ignore it. Called synchronously
/// at the point the event occurs; implementations that need to do I/O
/// should hand the event off rather than block the engine on it.
pub trait EngineObserver: Send + Sync {
    /// Handle one event.
    fn on_event(&self, event: EngineEvent);
}

/// An observer that discards every event, used when a host registers none.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullObserver;

impl EngineObserver for NullObserver {
    fn on_event(&self, _event: EngineEvent) {}
}
