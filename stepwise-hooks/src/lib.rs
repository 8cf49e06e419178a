#![deny(missing_docs)]
//! Host hook layer (§6, §9): translates the three raw event shapes a host
//! transport delivers — a callback (`wf:` encoding), a modal submission
//! (`wf_modal:` encoding), and a plain-text message against an active
//! workflow — into a [`ParsedUserAction`] and dispatches it to a
//! [`WorkflowEngine`].
//!
//! Grounded on `neuron-hooks`'s ordered hook pipeline: one [`WorkflowHook`]
//! is registered per surface, ahead of that surface's ordinary chat
//! handling. When it returns [`HookSignal::Handled`], the host must not
//! render anything further for the event — the engine already rendered
//! through the adapter. [`HookSignal::PassThrough`] means the event wasn't
//! addressed to any workflow; the host's other hooks should run as usual.

use std::sync::Arc;
use stepwise_core::action::{parse_meta_action, ActionKind, ParsedUserAction, SurfaceRef};
use stepwise_core::callback::decode_modal_id;
use stepwise_core::{AdapterError, SurfaceAdapter, SurfaceUserId};
use stepwise_engine::{EngineError, Outcome, WorkflowEngine};
use stepwise_identity::{IdentityError, IdentityService};
use thiserror::Error;

/// Errors from hook dispatch.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum HookError {
    /// The surface adapter failed to decode or acknowledge the raw event.
    #[error("adapter failure: {0}")]
    Adapter(#[from] AdapterError),
    /// The engine failed to process the resulting action.
    #[error("engine failure: {0}")]
    Engine(#[from] EngineError),
    /// Identity resolution failed.
    #[error("identity failure: {0}")]
    Identity(#[from] IdentityError),
}

/// A raw event as categorized by the host transport (§6). The host is
/// responsible for this classification; `WorkflowHook` only decodes the
/// payload each shape carries.
pub enum HostEvent<'a> {
    /// An inline-control callback, payload matching `wf:...`.
    Callback(&'a serde_json::Value),
    /// A modal/structured-input submission, payload matching `wf_modal:...`.
    ModalSubmit(&'a serde_json::Value),
    /// A plain-text message, dispatched only if the sender has an active
    /// workflow.
    Text {
        /// The sender's identity on this surface.
        surface_user_id: SurfaceUserId,
        /// The message body.
        text: &'a str,
    },
}

/// What a dispatched event resolved to.
pub enum HookSignal {
    /// This was a workflow event; the engine has already rendered its
    /// response through the adapter. The host must not render anything
    /// else for it.
    Handled(Outcome),
    /// Not a workflow event (or the sender has no active workflow). The
    /// host's other hooks should process it normally.
    PassThrough,
}

/// Bridges one surface's raw host events to a [`WorkflowEngine`],
/// resolving surface-local identities to unified users along the way.
///
/// One instance is registered per surface, ahead of that surface's
/// general-purpose chat hook, per the host hook priority rule (§9).
pub struct WorkflowHook {
    engine: Arc<WorkflowEngine>,
    identity: Arc<IdentityService>,
    adapter: Arc<dyn SurfaceAdapter>,
}

impl WorkflowHook {
    /// Construct a hook for one surface, wiring an engine, identity
    /// service, and that surface's adapter together.
    pub fn new(engine: Arc<WorkflowEngine>, identity: Arc<IdentityService>, adapter: Arc<dyn SurfaceAdapter>) -> Self {
        Self { engine, identity, adapter }
    }

    /// Translate and dispatch one raw host event.
    pub async fn dispatch(&self, event: HostEvent<'_>) -> Result<HookSignal, HookError> {
        match event {
            HostEvent::Callback(raw) => self.dispatch_callback(raw).await,
            HostEvent::ModalSubmit(raw) => self.dispatch_modal_submit(raw).await,
            HostEvent::Text { surface_user_id, text } => self.dispatch_text(surface_user_id, text).await,
        }
    }

    async fn dispatch_callback(&self, raw: &serde_json::Value) -> Result<HookSignal, HookError> {
        let Some(action) = self.adapter.parse_action(raw)? else {
            return Ok(HookSignal::PassThrough);
        };
        self.handle(action).await
    }

    async fn dispatch_modal_submit(&self, raw: &serde_json::Value) -> Result<HookSignal, HookError> {
        let Some(callback_id) = raw.get("callback_data").and_then(|v| v.as_str()) else {
            return Ok(HookSignal::PassThrough);
        };
        let Some((workflow_id, step_id)) = decode_modal_id(callback_id) else {
            return Ok(HookSignal::PassThrough);
        };
        let value = raw
            .pointer("/input_block/text_input/value")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let surface_user_id = raw
            .get("user_id")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string();

        let kind = parse_meta_action(&value).unwrap_or(ActionKind::Text(value));
        let action = ParsedUserAction {
            kind,
            workflow_id,
            step_id,
            surface: SurfaceRef {
                surface_id: self.adapter.surface_id().clone(),
                surface_user_id: SurfaceUserId::new(surface_user_id),
                channel_id: None,
                thread_id: None,
            },
        };
        self.handle(action).await
    }

    async fn dispatch_text(&self, surface_user_id: SurfaceUserId, text: &str) -> Result<HookSignal, HookError> {
        let user = self
            .identity
            .resolve_user(self.adapter.surface_id().clone(), surface_user_id.clone())
            .await?;
        let Some(state) = self.engine.get_active_workflow(&user.id).await? else {
            return Ok(HookSignal::PassThrough);
        };

        let kind = parse_meta_action(text).unwrap_or_else(|| ActionKind::Text(text.to_string()));
        let action = ParsedUserAction {
            kind,
            workflow_id: state.workflow_id,
            step_id: state.current_step,
            surface: SurfaceRef {
                surface_id: self.adapter.surface_id().clone(),
                surface_user_id,
                channel_id: None,
                thread_id: None,
            },
        };
        tracing::debug!(user = %user.id, workflow = %action.workflow_id, "stepwise.hooks.text_to_active_workflow");
        let outcome = self.engine.handle_action(&user.id, action).await?;
        Ok(HookSignal::Handled(outcome))
    }

    async fn handle(&self, action: ParsedUserAction) -> Result<HookSignal, HookError> {
        let user = self
            .identity
            .resolve_user(self.adapter.surface_id().clone(), action.surface.surface_user_id.clone())
            .await?;
        let outcome = self.engine.handle_action(&user.id, action).await?;
        Ok(HookSignal::Handled(outcome))
    }
}
