//! Surface adapter contract (§4.5).
//!
//! An adapter owns everything surface-specific: encoding callback data,
//! folding options into rows under `maxButtonsPerRow`, chunking or
//! truncating long text, and recognizing its own transport's event shapes.
//! The engine, negotiator, and router never see a surface-specific type.

use crate::action::ParsedUserAction;
use crate::capability::SurfaceCapabilities;
use crate::id::SurfaceId;
use crate::primitive::{InteractionPrimitive, RenderMeta};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors an adapter may report back to the engine or router.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The transport rejected the send (rate limit, auth failure, etc.).
    #[error("transport rejected the request: {0}")]
    TransportRejected(String),

    /// The target surface/chat/thread no longer exists from the
    /// transport's point of view.
    #[error("target is gone")]
    TargetGone,

    /// Catch-all for adapter-specific failures.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Where a message is addressed, in adapter-agnostic terms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderTarget {
    /// The user's identity on this surface.
    pub surface_user_id: crate::id::SurfaceUserId,
    /// Channel/chat id, for surfaces that have one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    /// Thread id, for surfaces that support threading.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
}

/// What a render degraded to, when the adapter could not render the
/// primitive in its native form. Mirrors the negotiator's
/// [`crate::capability::SurfaceCapabilities`]-driven decision, surfaced
/// back to the engine for logging/observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackKind {
    /// Rendered as a numbered text list instead of native buttons.
    TextList,
    /// Rendered as an info message with a URL instead of inline media.
    InfoWithUrl,
    /// The primitive could not be rendered at all; the host was notified.
    Blocked,
}

/// What an adapter's `render` call produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedMessage {
    /// The transport's id for the message that was sent, so a later
    /// `updateMessage`/`deleteMessage` can target it.
    pub message_id: String,
    /// Whether the adapter had to fall back from the primitive's native
    /// rendering (e.g. buttons -> numbered text list).
    pub used_fallback: bool,
    /// What kind of fallback was used, when `used_fallback` is true.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_type: Option<FallbackKind>,
}

impl RenderedMessage {
    /// A message rendered in the primitive's native form.
    pub fn native(message_id: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            used_fallback: false,
            fallback_type: None,
        }
    }

    /// A message rendered via the given fallback.
    pub fn fallback(message_id: impl Into<String>, kind: FallbackKind) -> Self {
        Self {
            message_id: message_id.into(),
            used_fallback: true,
            fallback_type: Some(kind),
        }
    }
}

/// Free-form rendering context passed alongside a primitive: whether
/// progress should be shown, and any additional affordances (back/cancel).
pub type RenderContext = RenderMeta;

/// The surface-agnostic contract every transport integration implements
/// (§4.5). Registered with the engine and router under a [`SurfaceId`].
#[async_trait]
pub trait SurfaceAdapter: Send + Sync {
    /// This adapter's surface id, matching what it registers under.
    fn surface_id(&self) -> &SurfaceId;

    /// This adapter's declared capabilities, advertised once at startup.
    fn capabilities(&self) -> SurfaceCapabilities;

    /// Emit `primitive` to `target`, preserving the callback encoding
    /// `wf:<workflowId>|s:<stepId>|a:<actionId>` for any interactive
    /// element. Multi-select adapters batch toggled values into a single
    /// `a:submit` action. Truncates the encoding deterministically
    /// (see [`crate::callback::encode_action_id_fitting`]) if it would
    /// exceed the transport's action-id length cap.
    async fn render(
        &self,
        target: &RenderTarget,
        primitive: &InteractionPrimitive,
        context: &RenderContext,
    ) -> Result<RenderedMessage, AdapterError>;

    /// Decode a transport-native event (button press, modal submit, text
    /// reply, threaded reply) into the uniform action vocabulary.
    /// Recognizes the reserved action ids and the text meta-commands
    /// `cancel`/`back` per [`crate::action::parse_meta_action`]. Returns
    /// `Ok(None)` for events this adapter doesn't recognize as workflow
    /// actions at all (distinct from a decode error).
    fn parse_action(
        &self,
        raw_event: &serde_json::Value,
    ) -> Result<Option<ParsedUserAction>, AdapterError>;

    /// Send a free-form, non-workflow message. Returns the transport's
    /// message id.
    async fn send_message(
        &self,
        target: &RenderTarget,
        payload: &serde_json::Value,
    ) -> Result<String, AdapterError>;

    /// Best-effort in-place edit of a previously sent message. Must
    /// silently no-op (return `Ok(())`) on message kinds the transport
    /// cannot edit, such as modal submissions or file uploads.
    async fn update_message(
        &self,
        target: &RenderTarget,
        message_id: &str,
        payload: &serde_json::Value,
    ) -> Result<(), AdapterError>;

    /// Best-effort deletion of a previously sent message.
    async fn delete_message(
        &self,
        target: &RenderTarget,
        message_id: &str,
    ) -> Result<(), AdapterError>;

    /// Transport-specific quick acknowledgement of a raw inbound event
    /// (e.g. a visible ephemeral reply). May be a no-op for transports
    /// that acknowledge at the HTTP layer already.
    async fn acknowledge_action(
        &self,
        raw_event: &serde_json::Value,
        text: Option<&str>,
    ) -> Result<(), AdapterError>;
}
