//! ButtonAdapter — an inline-button-capable mock surface.

use crate::action::{parse_meta_action, ActionKind, ParsedUserAction, SurfaceRef};
use crate::adapter::{AdapterError, RenderContext, RenderTarget, RenderedMessage, SurfaceAdapter};
use crate::capability::SurfaceCapabilities;
use crate::callback::decode_action_id;
use crate::id::{SurfaceId, SurfaceUserId};
use crate::primitive::InteractionPrimitive;
use async_trait::async_trait;
use tokio::sync::Mutex;

/// A surface that supports everything: inline buttons, multi-select,
/// file upload, voice, threading, rich text, modals. Used to exercise the
/// native-rendering path of the negotiator and engine without picking
/// a real transport.
pub struct ButtonAdapter {
    surface_id: SurfaceId,
    sent: Mutex<Vec<serde_json::Value>>,
    next_message_id: Mutex<u64>,
}

impl ButtonAdapter {
    /// Construct a mock adapter under the given surface id.
    pub fn new(surface_id: impl Into<SurfaceId>) -> Self {
        Self {
            surface_id: surface_id.into(),
            sent: Mutex::new(Vec::new()),
            next_message_id: Mutex::new(1),
        }
    }

    /// Everything sent through `render`/`send_message` so far, for test
    /// assertions.
    pub async fn sent_messages(&self) -> Vec<serde_json::Value> {
        self.sent.lock().await.clone()
    }

    async fn allocate_message_id(&self) -> String {
        let mut next = self.next_message_id.lock().await;
        let id = *next;
        *next += 1;
        format!("msg-{id}")
    }
}

#[async_trait]
impl SurfaceAdapter for ButtonAdapter {
    fn surface_id(&self) -> &SurfaceId {
        &self.surface_id
    }

    fn capabilities(&self) -> SurfaceCapabilities {
        SurfaceCapabilities {
            inline_buttons: true,
            multi_select_buttons: true,
            reactions: true,
            file_upload: true,
            voice_messages: true,
            threading: true,
            rich_text: true,
            modals: true,
            max_buttons_per_row: 3,
            max_button_rows: 8,
            max_message_length: 4096,
        }
    }

    async fn render(
        &self,
        _target: &RenderTarget,
        primitive: &InteractionPrimitive,
        _context: &RenderContext,
    ) -> Result<RenderedMessage, AdapterError> {
        let message_id = self.allocate_message_id().await;
        self.sent.lock().await.push(serde_json::json!({
            "kind": "render",
            "primitive": primitive,
        }));
        Ok(RenderedMessage::native(message_id))
    }

    fn parse_action(
        &self,
        raw_event: &serde_json::Value,
    ) -> Result<Option<ParsedUserAction>, AdapterError> {
        let Some(callback_data) = raw_event.get("callback_data").and_then(|v| v.as_str()) else {
            return Ok(None);
        };
        let Some((workflow_id, step_id, action_id)) = decode_action_id(callback_data) else {
            return Ok(None);
        };
        let surface_user_id = raw_event
            .get("user_id")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string();

        let kind = match parse_meta_action(&action_id) {
            Some(kind) => kind,
            None => ActionKind::Selection(crate::state::Selection::Single(action_id)),
        };

        Ok(Some(ParsedUserAction {
            kind,
            workflow_id,
            step_id,
            surface: SurfaceRef {
                surface_id: self.surface_id.clone(),
                surface_user_id: SurfaceUserId::new(surface_user_id),
                channel_id: None,
                thread_id: None,
            },
        }))
    }

    async fn send_message(
        &self,
        _target: &RenderTarget,
        payload: &serde_json::Value,
    ) -> Result<String, AdapterError> {
        let message_id = self.allocate_message_id().await;
        self.sent.lock().await.push(payload.clone());
        Ok(message_id)
    }

    async fn update_message(
        &self,
        _target: &RenderTarget,
        _message_id: &str,
        payload: &serde_json::Value,
    ) -> Result<(), AdapterError> {
        self.sent.lock().await.push(payload.clone());
        Ok(())
    }

    async fn delete_message(
        &self,
        _target: &RenderTarget,
        _message_id: &str,
    ) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn acknowledge_action(
        &self,
        _raw_event: &serde_json::Value,
        _text: Option<&str>,
    ) -> Result<(), AdapterError> {
        Ok(())
    }
}
