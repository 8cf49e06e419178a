//! The uniform action vocabulary adapters decode transport events into
//! (§3, §4.5, §9).

use crate::id::{StepId, SurfaceId, SurfaceUserId, WorkflowId};
use crate::state::Selection;
use serde::{Deserialize, Serialize};

/// Reserved action ids recognized by every adapter (§6).
pub const ACTION_CANCEL: &str = "__cancel__";
/// Reserved action id for the "back" meta-action.
pub const ACTION_BACK: &str = "__back__";
/// Reserved action id a multi-select adapter batches toggled values under.
pub const ACTION_SUBMIT: &str = "submit";

/// Where a parsed action originated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceRef {
    /// Which adapter produced this action.
    pub surface_id: SurfaceId,
    /// The user's identity on that surface.
    pub surface_user_id: SurfaceUserId,
    /// Channel/chat id, for surfaces that have one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    /// Thread id, for surfaces that support threading.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
}

/// What the user did, decoded from a transport-native event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionKind {
    /// A choice/confirm/multi-choice selection.
    Selection(Selection),
    /// A free-text reply.
    Text(String),
    /// The `cancel` meta-action.
    Cancel,
    /// The `back` meta-action.
    Back,
}

/// A transport-native event, decoded by the originating surface's adapter
/// into this uniform shape. The engine never sees anything less structured
/// than this.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedUserAction {
    /// What the user did.
    pub kind: ActionKind,
    /// The workflow this action is addressed to.
    pub workflow_id: WorkflowId,
    /// The step the action was taken against.
    pub step_id: StepId,
    /// Where the action came from.
    pub surface: SurfaceRef,
}

/// Parse the reserved callback action id or a text meta-command into an
/// `ActionKind`, if it matches one of the recognized forms. Text
/// meta-commands are case-insensitive and tolerate an optional leading
/// slash (`cancel`, `/cancel`, `Back`, `/BACK`).
pub fn parse_meta_action(raw: &str) -> Option<ActionKind> {
    match raw {
        ACTION_CANCEL => return Some(ActionKind::Cancel),
        ACTION_BACK => return Some(ActionKind::Back),
        _ => {}
    }
    let trimmed = raw.trim().strip_prefix('/').unwrap_or(raw.trim());
    match trimmed.to_ascii_lowercase().as_str() {
        "cancel" => Some(ActionKind::Cancel),
        "back" => Some(ActionKind::Back),
        _ => None,
    }
}
