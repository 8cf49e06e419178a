#![deny(missing_docs)]
//! # stepwise — umbrella crate
//!
//! A single import surface for the conversational workflow engine.
//! Re-exports the protocol and chosen implementations behind feature
//! flags, plus a `prelude` for the happy path: register a workflow,
//! register a surface adapter, `startWorkflow`, `handleAction`.

#[cfg(feature = "core")]
pub use stepwise_core as core;
#[cfg(feature = "core")]
pub use stepwise_engine as engine;
#[cfg(feature = "hooks")]
pub use stepwise_hooks as hooks;
#[cfg(feature = "identity")]
pub use stepwise_identity as identity;
#[cfg(feature = "core")]
pub use stepwise_negotiator as negotiator;
#[cfg(feature = "router")]
pub use stepwise_router as router;
#[cfg(feature = "state-fs")]
pub use stepwise_state_fs as state_fs;
#[cfg(feature = "state-memory")]
pub use stepwise_state_memory as state_memory;

/// Happy-path imports for composing a workflow host.
pub mod prelude {
    #[cfg(feature = "core")]
    pub use stepwise_core::action::{ActionKind, ParsedUserAction, SurfaceRef};
    #[cfg(feature = "core")]
    pub use stepwise_core::definition::WorkflowDefinition;
    #[cfg(feature = "core")]
    pub use stepwise_core::{
        SurfaceAdapter, SurfaceId, SurfaceUserId, ToolExecutor, UserId, WorkflowId,
    };

    #[cfg(feature = "core")]
    pub use stepwise_engine::{EngineError, Outcome, WorkflowEngine};

    #[cfg(feature = "hooks")]
    pub use stepwise_hooks::{HookError, HookSignal, HostEvent, WorkflowHook};

    #[cfg(feature = "identity")]
    pub use stepwise_identity::IdentityService;

    #[cfg(feature = "router")]
    pub use stepwise_router::{MessageRouter, UserDirectory};

    #[cfg(feature = "state-memory")]
    pub use stepwise_state_memory::MemoryStore;

    #[cfg(feature = "state-fs")]
    pub use stepwise_state_fs::FsStore;
}
