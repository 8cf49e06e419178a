//! The abstract interaction vocabulary (§3, §4.1).
//!
//! Workflow steps compile down to one of these before the negotiator and
//! adapter ever see them. A primitive carries already-interpolated text —
//! template expansion happens in the engine, not here.

use serde::{Deserialize, Serialize};

/// One selectable option in a `choice` or `multi-choice` primitive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceOption {
    /// Stable identifier used in callback encoding and `transitions` lookup.
    pub id: String,
    /// Human-readable label.
    pub label: String,
    /// Optional secondary description shown under the label where the
    /// surface supports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Optional surface-specific visual style hint (e.g. "danger", "primary").
    /// Adapters that don't support styling ignore it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
}

impl ChoiceOption {
    /// Construct a bare option with just an id and label.
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            description: None,
            style: None,
        }
    }
}

/// Progress indicator attached to a rendered step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    /// 1-based position of the current step.
    pub current: u32,
    /// Total steps estimated to reach a terminal step (never less than `current`).
    pub total: u32,
}

/// What kind of media a `media` primitive carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    /// A still image.
    Image,
    /// An arbitrary file attachment.
    File,
    /// A voice/audio message.
    Voice,
}

/// Where a `media` primitive's bytes come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaSource {
    /// A remotely fetchable URL.
    Url(String),
    /// A path local to the host process.
    Path(String),
}

/// An abstract interaction that the negotiator turns into a native
/// rendering or a text fallback, depending on the target surface's
/// capabilities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InteractionPrimitive {
    /// Informational message with no expected reply.
    Info {
        /// Already-interpolated body text.
        content: String,
    },
    /// Pick exactly one of several options.
    Choice {
        /// Already-interpolated prompt text.
        content: String,
        /// The selectable options.
        options: Vec<ChoiceOption>,
    },
    /// Pick zero or more of several options.
    MultiChoice {
        /// Already-interpolated prompt text.
        content: String,
        /// The selectable options.
        options: Vec<ChoiceOption>,
        /// Minimum number of selections required (0 = optional).
        #[serde(default)]
        min_selections: u32,
    },
    /// Yes/no confirmation with custom labels.
    Confirm {
        /// Already-interpolated prompt text.
        content: String,
        /// Label for the affirmative action.
        yes_label: String,
        /// Label for the negative action.
        no_label: String,
    },
    /// Free-text input, optionally constrained.
    TextInput {
        /// Already-interpolated prompt text.
        content: String,
        /// Placeholder text shown in the input field, if the surface has one.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        placeholder: Option<String>,
    },
    /// An image, file, or voice message.
    Media {
        /// Already-interpolated caption text.
        content: String,
        /// The kind of media.
        media_type: MediaKind,
        /// Where the bytes come from, if any (absent for a pure text downgrade).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<MediaSource>,
        /// MIME type, where known.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
    },
}

impl InteractionPrimitive {
    /// The already-interpolated body/prompt text common to every variant.
    pub fn content(&self) -> &str {
        match self {
            InteractionPrimitive::Info { content }
            | InteractionPrimitive::Choice { content, .. }
            | InteractionPrimitive::MultiChoice { content, .. }
            | InteractionPrimitive::Confirm { content, .. }
            | InteractionPrimitive::TextInput { content, .. }
            | InteractionPrimitive::Media { content, .. } => content,
        }
    }
}

/// Cross-cutting rendering instructions that travel alongside a primitive
/// but are not part of its identity (so they don't affect negotiation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RenderMeta {
    /// Progress to display, if `showProgress` is enabled for this workflow.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<Progress>,
    /// Whether a "back" affordance should be offered.
    pub include_back: bool,
    /// Whether a "cancel" affordance should be offered.
    pub include_cancel: bool,
}
