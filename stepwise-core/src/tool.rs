//! Tool executor contract (§6).
//!
//! Tool names are engine-opaque: the engine resolves a [`ToolCallBinding`]'s
//! `paramMap` into a `HashMap<String, serde_json::Value>` and hands it to
//! whichever executor is registered, without ever inspecting the name or
//! the executor's internals. Implementations must honor
//! [`ToolExecutor::timeout`] themselves — the engine does not race a
//! separate timer against `execute` — and must never mutate engine state
//! directly; all effects flow back through the returned [`ToolOutcome`].

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by a tool executor.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ToolError {
    /// No executor is registered for the requested tool name.
    #[error("tool not found: {0}")]
    NotFound(String),

    /// The executor ran but reported failure.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    /// The tool did not finish within its timeout.
    #[error("tool timed out after {0:?}")]
    TimedOut(Duration),

    /// Catch-all for executor-specific errors.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// The result of calling a tool. Mirrors the wire shape from §6:
/// `{success, result?, error?}`.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutcome {
    /// Whether the call succeeded.
    pub success: bool,
    /// The tool's return value, present when `success` is true.
    pub result: Option<serde_json::Value>,
    /// A human-readable failure reason, present when `success` is false.
    pub error: Option<String>,
}

impl ToolOutcome {
    /// Build a successful outcome.
    pub fn success(result: serde_json::Value) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
        }
    }

    /// Build a failed outcome.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.into()),
        }
    }
}

/// Object-safe trait for tool implementations a workflow step can invoke
/// through a [`crate::definition::ToolCallBinding`].
///
/// Tool names are opaque to the engine; only the executor assigns them
/// meaning. An executor must not reach back into engine or workflow state —
/// its only channel for affecting the workflow is the returned
/// `ToolOutcome`, which the engine feeds into the step's `onSuccess`/
/// `onError` transition.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Execute a named tool with resolved parameters.
    ///
    /// `params` is built by the engine from the binding's `paramMap`: each
    /// value is either the literal string, an input-reply string, or a
    /// `data.<stepId>` lookup, already resolved to JSON before this call.
    async fn execute(
        &self,
        name: &str,
        params: HashMap<String, serde_json::Value>,
    ) -> Result<ToolOutcome, ToolError>;

    /// How long the engine should wait for this executor before treating
    /// the call as failed. Implementations that call out to a network
    /// should enforce this themselves (e.g. via `tokio::time::timeout`);
    /// the engine trusts the outcome it gets back and does not re-wrap
    /// the call in its own timeout.
    fn timeout(&self) -> Duration {
        Duration::from_secs(10)
    }
}
