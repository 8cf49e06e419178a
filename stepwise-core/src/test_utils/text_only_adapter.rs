//! TextOnlyAdapter — the degenerate plain-text mock surface (SMS-like).

use crate::action::{parse_meta_action, ActionKind, ParsedUserAction, SurfaceRef};
use crate::adapter::{AdapterError, FallbackKind, RenderContext, RenderTarget, RenderedMessage, SurfaceAdapter};
use crate::capability::SurfaceCapabilities;
use crate::id::{SurfaceId, SurfaceUserId};
use crate::primitive::InteractionPrimitive;
use async_trait::async_trait;
use tokio::sync::Mutex;

/// A surface with none of the optional capabilities turned on. Every
/// `choice`/`confirm`/`media` primitive renders as a numbered text list or
/// an info-with-url fallback; replies are parsed as plain text.
pub struct TextOnlyAdapter {
    surface_id: SurfaceId,
    sent: Mutex<Vec<String>>,
    next_message_id: Mutex<u64>,
}

impl TextOnlyAdapter {
    /// Construct a mock adapter under the given surface id.
    pub fn new(surface_id: impl Into<SurfaceId>) -> Self {
        Self {
            surface_id: surface_id.into(),
            sent: Mutex::new(Vec::new()),
            next_message_id: Mutex::new(1),
        }
    }

    /// Every rendered body text sent so far, for test assertions.
    pub async fn sent_texts(&self) -> Vec<String> {
        self.sent.lock().await.clone()
    }

    async fn allocate_message_id(&self) -> String {
        let mut next = self.next_message_id.lock().await;
        let id = *next;
        *next += 1;
        format!("sms-{id}")
    }

    fn render_as_text(primitive: &InteractionPrimitive) -> (String, Option<FallbackKind>) {
        match primitive {
            InteractionPrimitive::Info { content } | InteractionPrimitive::TextInput { content, .. } => {
                (content.clone(), None)
            }
            InteractionPrimitive::Choice { content, options }
            | InteractionPrimitive::MultiChoice { content, options, .. } => {
                let mut body = content.clone();
                for (i, option) in options.iter().enumerate() {
                    body.push_str(&format!("\n{}. {}", i + 1, option.label));
                }
                (body, Some(FallbackKind::TextList))
            }
            InteractionPrimitive::Confirm {
                content,
                yes_label,
                no_label,
            } => (
                format!("{content}\n1. {yes_label}\n2. {no_label}"),
                Some(FallbackKind::TextList),
            ),
            InteractionPrimitive::Media { content, source, .. } => {
                let url = match source {
                    Some(crate::primitive::MediaSource::Url(u)) => format!("\n{u}"),
                    Some(crate::primitive::MediaSource::Path(_)) | None => String::new(),
                };
                (format!("{content}{url}"), Some(FallbackKind::InfoWithUrl))
            }
        }
    }
}

#[async_trait]
impl SurfaceAdapter for TextOnlyAdapter {
    fn surface_id(&self) -> &SurfaceId {
        &self.surface_id
    }

    fn capabilities(&self) -> SurfaceCapabilities {
        SurfaceCapabilities::text_only(160)
    }

    async fn render(
        &self,
        _target: &RenderTarget,
        primitive: &InteractionPrimitive,
        _context: &RenderContext,
    ) -> Result<RenderedMessage, AdapterError> {
        let (text, fallback) = Self::render_as_text(primitive);
        let message_id = self.allocate_message_id().await;
        self.sent.lock().await.push(text);
        Ok(match fallback {
            Some(kind) => RenderedMessage::fallback(message_id, kind),
            None => RenderedMessage::native(message_id),
        })
    }

    fn parse_action(
        &self,
        raw_event: &serde_json::Value,
    ) -> Result<Option<ParsedUserAction>, AdapterError> {
        let Some(text) = raw_event.get("text").and_then(|v| v.as_str()) else {
            return Ok(None);
        };
        let Some(workflow_id) = raw_event.get("workflow_id").and_then(|v| v.as_str()) else {
            return Ok(None);
        };
        let Some(step_id) = raw_event.get("step_id").and_then(|v| v.as_str()) else {
            return Ok(None);
        };
        let surface_user_id = raw_event
            .get("user_id")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string();

        let kind = parse_meta_action(text).unwrap_or_else(|| ActionKind::Text(text.to_string()));

        Ok(Some(ParsedUserAction {
            kind,
            workflow_id: crate::id::WorkflowId::new(workflow_id),
            step_id: crate::id::StepId::new(step_id),
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
        let text = payload
            .get("text")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        self.sent.lock().await.push(text);
        Ok(message_id)
    }

    async fn update_message(
        &self,
        _target: &RenderTarget,
        _message_id: &str,
        _payload: &serde_json::Value,
    ) -> Result<(), AdapterError> {
        // SMS-like transports can't edit a sent message in place.
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
