#![deny(missing_docs)]
//! Protocol types and traits shared by every crate in the workspace.
//!
//! `stepwise-core` defines the surface-agnostic vocabulary: typed ids, the
//! abstract interaction primitives, workflow definitions, the action
//! vocabulary adapters decode transport events into, the `SurfaceAdapter`,
//! `ToolExecutor`, and `StateStore` traits, and cross-surface identity
//! and queueing types. It has no opinion on how a workflow advances, how
//! a state store is backed, or which surfaces exist — those live in
//! `stepwise-engine`, `stepwise-state-fs`/`stepwise-state-memory`, and
//! host-provided adapters respectively.

pub mod action;
pub mod adapter;
pub mod callback;
pub mod capability;
pub mod clock;
pub mod definition;
pub mod event;
pub mod id;
pub mod identity;
pub mod primitive;
pub mod queue;
pub mod state;
pub mod tool;

#[cfg(feature = "test-utils")]
pub mod test_utils;

pub use action::{ActionKind, ParsedUserAction, SurfaceRef};
pub use adapter::{AdapterError, FallbackKind, RenderContext, RenderTarget, RenderedMessage, SurfaceAdapter};
pub use capability::SurfaceCapabilities;
pub use clock::now_millis;
pub use definition::{DefinitionError, StepDefinition, WorkflowDefinition};
pub use event::{EngineEvent, EngineObserver, NullObserver};
pub use id::{StepId, SurfaceId, SurfaceUserId, UserId, WorkflowId};
pub use identity::{LinkCode, UnifiedUser};
pub use primitive::{ChoiceOption, InteractionPrimitive, MediaKind, MediaSource, Progress, RenderMeta};
pub use queue::QueueEntry;
pub use state::{Selection, StateError, StateStore, StepData, WorkflowState};
pub use tool::{ToolError, ToolExecutor, ToolOutcome};
