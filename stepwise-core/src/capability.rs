//! Surface capability descriptors (§4.1).

use serde::{Deserialize, Serialize};

/// Static, per-adapter capability flags and limits. No runtime
/// re-negotiation — a surface either supports a feature or it doesn't.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SurfaceCapabilities {
    /// Can render tappable inline buttons attached to a message.
    pub inline_buttons: bool,
    /// Can render a native multi-select control (checkboxes, etc.)
    /// distinct from toggling individual inline buttons.
    pub multi_select_buttons: bool,
    /// Supports emoji/tap reactions on a message.
    pub reactions: bool,
    /// Can accept file/image uploads from the user and send files.
    pub file_upload: bool,
    /// Can send and receive voice messages.
    pub voice_messages: bool,
    /// Supports threaded replies.
    pub threading: bool,
    /// Supports rich text formatting (bold, links, etc.).
    pub rich_text: bool,
    /// Supports modal/dialog forms.
    pub modals: bool,
    /// Maximum buttons that fit in one row.
    pub max_buttons_per_row: u32,
    /// Maximum button rows per message.
    pub max_button_rows: u32,
    /// Maximum message length in characters.
    pub max_message_length: u32,
}

impl SurfaceCapabilities {
    /// Total button capacity: `max_buttons_per_row * max_button_rows`.
    pub fn max_buttons(&self) -> u32 {
        self.max_buttons_per_row.saturating_mul(self.max_button_rows)
    }

    /// A capability set with nothing turned on — the degenerate
    /// plain-text surface (SMS, dumb terminal).
    pub const fn text_only(max_message_length: u32) -> Self {
        Self {
            inline_buttons: false,
            multi_select_buttons: false,
            reactions: false,
            file_upload: false,
            voice_messages: false,
            threading: false,
            rich_text: false,
            modals: false,
            max_buttons_per_row: 0,
            max_button_rows: 0,
            max_message_length,
        }
    }
}
