#![deny(missing_docs)]
//! Stateless negotiation between an abstract [`InteractionPrimitive`] and a
//! surface's declared [`SurfaceCapabilities`] (§4.4).
//!
//! `negotiate` is a pure function: identical inputs produce identical
//! outputs, every time, with no shared state and no I/O. The engine calls
//! it once per render to decide whether the adapter should be handed the
//! primitive as-is, a text-fallback substitute, or nothing at all.

use serde::{Deserialize, Serialize};
use stepwise_core::{ChoiceOption, InteractionPrimitive, MediaKind, RenderMeta, SurfaceCapabilities};

/// How a primitive should be rendered on a given surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Render the primitive in its native form.
    Native,
    /// Render a text substitute instead (see [`NegotiationResult::fallback_primitive`]).
    TextFallback,
    /// The primitive cannot be rendered at all on this surface.
    NotifyBlocked,
}

/// The outcome of negotiating one primitive against one capability set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NegotiationResult {
    /// Which strategy the adapter should use.
    pub strategy: Strategy,
    /// The substitute primitive to render, present when `strategy` is
    /// `TextFallback` (and absent otherwise).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_primitive: Option<InteractionPrimitive>,
    /// Why the primitive was blocked, present when `strategy` is
    /// `NotifyBlocked`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_reason: Option<String>,
}

impl NegotiationResult {
    fn native() -> Self {
        Self {
            strategy: Strategy::Native,
            fallback_primitive: None,
            blocked_reason: None,
        }
    }

    fn text_fallback(primitive: InteractionPrimitive) -> Self {
        Self {
            strategy: Strategy::TextFallback,
            fallback_primitive: Some(primitive),
            blocked_reason: None,
        }
    }

    fn blocked(reason: impl Into<String>) -> Self {
        Self {
            strategy: Strategy::NotifyBlocked,
            fallback_primitive: None,
            blocked_reason: Some(reason.into()),
        }
    }
}

fn numbered_list(options: &[ChoiceOption]) -> String {
    options
        .iter()
        .enumerate()
        .map(|(i, option)| format!("{}. {}", i + 1, option.label))
        .collect::<Vec<_>>()
        .join("\n")
}

fn meta_button_count(meta: &RenderMeta) -> u32 {
    meta.include_back as u32 + meta.include_cancel as u32
}

fn meta_hint(meta: &RenderMeta) -> String {
    match (meta.include_back, meta.include_cancel) {
        (true, true) => " (or reply \"back\" / \"cancel\")".to_string(),
        (true, false) => " (or reply \"back\")".to_string(),
        (false, true) => " (or reply \"cancel\")".to_string(),
        (false, false) => String::new(),
    }
}

/// Decide how `primitive` should be rendered given `capabilities`,
/// following the rules from §4.4.
pub fn negotiate(
    primitive: &InteractionPrimitive,
    capabilities: &SurfaceCapabilities,
    meta: &RenderMeta,
) -> NegotiationResult {
    match primitive {
        InteractionPrimitive::Info { .. } | InteractionPrimitive::TextInput { .. } => {
            NegotiationResult::native()
        }

        InteractionPrimitive::Choice { content, options } => {
            let fits = capabilities.inline_buttons
                && (options.len() as u32) + meta_button_count(meta) <= capabilities.max_buttons();
            if fits {
                NegotiationResult::native()
            } else {
                let content = format!(
                    "{content}\n{}\nReply with a number{}",
                    numbered_list(options),
                    meta_hint(meta)
                );
                NegotiationResult::text_fallback(InteractionPrimitive::Info { content })
            }
        }

        InteractionPrimitive::MultiChoice { content, options, .. } => {
            if capabilities.multi_select_buttons || capabilities.inline_buttons {
                NegotiationResult::native()
            } else {
                let content = format!(
                    "{content}\n{}\nReply with numbers separated by commas{}",
                    numbered_list(options),
                    meta_hint(meta)
                );
                NegotiationResult::text_fallback(InteractionPrimitive::Info { content })
            }
        }

        InteractionPrimitive::Confirm { content, .. } => {
            if capabilities.inline_buttons {
                NegotiationResult::native()
            } else {
                let content = format!("{content}\nReply yes or no{}", meta_hint(meta));
                NegotiationResult::text_fallback(InteractionPrimitive::Info { content })
            }
        }

        InteractionPrimitive::Media {
            content,
            media_type,
            source,
            ..
        } => match media_type {
            MediaKind::Image | MediaKind::File => {
                if capabilities.file_upload {
                    NegotiationResult::native()
                } else {
                    match source {
                        Some(stepwise_core::MediaSource::Url(url)) => {
                            NegotiationResult::text_fallback(InteractionPrimitive::Info {
                                content: format!("{content}\n{url}"),
                            })
                        }
                        _ => NegotiationResult::blocked(
                            "this surface cannot receive files and no URL was available",
                        ),
                    }
                }
            }
            MediaKind::Voice => {
                if capabilities.voice_messages {
                    NegotiationResult::native()
                } else {
                    NegotiationResult::blocked(
                        "this surface cannot play voice messages; continue on a surface that supports voice",
                    )
                }
            }
        },
    }
}
