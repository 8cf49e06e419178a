#![deny(missing_docs)]
//! The core workflow engine (§4.7): registration, start/advance/complete,
//! meta-actions, tool-call resolution, auto-advance, progress, and the
//! per-`(userId, workflowId)` concurrency guard.
//!
//! Workflow and adapter registries are plain maps behind a lock, the same
//! shape `neuron-orch-local` uses for its agent registry — dispatch is
//! direct (`HashMap` lookup + trait-object call), not routed through a
//! generic executor abstraction.

mod progress;
mod template;

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use stepwise_core::action::{ActionKind, ParsedUserAction, SurfaceRef};
use stepwise_core::definition::{DefinitionError, ParamSource, StepDefinition};
use stepwise_core::{
    now_millis, AdapterError, EngineEvent, EngineObserver, NullObserver, Progress, RenderMeta,
    RenderTarget, Selection, StateError, StateStore, StepData, StepId, SurfaceAdapter, SurfaceId,
    ToolError, ToolExecutor, ToolOutcome, UserId, WorkflowDefinition, WorkflowId, WorkflowState,
};
use stepwise_core::primitive::InteractionPrimitive;
use stepwise_negotiator::{negotiate, Strategy};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

pub use progress::shortest_path_to_terminal;
pub use template::interpolate;

/// Outcome of starting a workflow or processing one action (§7).
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum Outcome {
    /// The workflow moved to a new step (or stayed, with no change, on an
    /// unresolved transition).
    Advanced,
    /// A terminal step was reached; state has been deleted.
    Completed,
    /// The workflow was cancelled, explicitly or otherwise (back-from-root,
    /// a lost concurrency race, or an unknown/expired workflow). `reason`
    /// distinguishes these for callers that care (§9 open question).
    Cancelled {
        /// Human-readable reason this outcome occurred.
        reason: String,
    },
    /// A `text-input` reply failed its step's validation rule.
    ValidationError {
        /// The message shown to the user (custom or default).
        message: String,
    },
    /// A tool call failed (execution error or `{success: false}`).
    ToolError {
        /// The message shown to the user.
        message: String,
    },
}

/// Errors from engine operations that are not represented as an
/// [`Outcome`] — registration failures, missing registrations, and
/// failures bubbling up from a collaborator.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum EngineError {
    /// The requested workflow id has no registered definition.
    #[error("workflow {0} is not registered")]
    UnknownWorkflow(WorkflowId),
    /// The requested surface has no registered adapter.
    #[error("no adapter registered for surface {0}")]
    UnknownAdapter(SurfaceId),
    /// The state store failed.
    #[error("state store failure: {0}")]
    State(#[from] StateError),
    /// The surface adapter failed.
    #[error("adapter failure: {0}")]
    Adapter(#[from] AdapterError),
}

fn default_cancel_message() -> serde_json::Value {
    serde_json::json!({ "text": "Workflow cancelled." })
}

/// Registers workflows and adapters, drives instances through
/// `startWorkflow`/`handleAction`, and enforces the per-`(userId,
/// workflowId)` concurrency lock described in §5.
pub struct WorkflowEngine {
    definitions: RwLock<HashMap<WorkflowId, Arc<WorkflowDefinition>>>,
    adapters: RwLock<HashMap<SurfaceId, Arc<dyn SurfaceAdapter>>>,
    store: Arc<dyn StateStore>,
    tool_executor: Option<Arc<dyn ToolExecutor>>,
    locks: Mutex<HashSet<(UserId, WorkflowId)>>,
    observer: Arc<dyn EngineObserver>,
}

impl WorkflowEngine {
    /// Construct an engine backed by `store`, with no workflows or
    /// adapters registered yet.
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            definitions: RwLock::new(HashMap::new()),
            adapters: RwLock::new(HashMap::new()),
            store,
            tool_executor: None,
            locks: Mutex::new(HashSet::new()),
            observer: Arc::new(NullObserver),
        }
    }

    /// Attach the tool executor used to resolve `toolCall` bindings.
    pub fn with_tool_executor(mut self, executor: Arc<dyn ToolExecutor>) -> Self {
        self.tool_executor = Some(executor);
        self
    }

    /// Attach an observer for lifecycle events.
    pub fn with_observer(mut self, observer: Arc<dyn EngineObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Validate and install a workflow definition. On failure, returns
    /// every violation found and does not install the definition.
    pub async fn register_workflow(&self, def: WorkflowDefinition) -> Result<(), Vec<DefinitionError>> {
        def.validate()?;
        let id = WorkflowId::new(def.id.clone());
        self.definitions.write().await.insert(id, Arc::new(def));
        Ok(())
    }

    /// Register a surface adapter under its own declared surface id.
    pub async fn register_adapter(&self, adapter: Arc<dyn SurfaceAdapter>) {
        let id = adapter.surface_id().clone();
        self.adapters.write().await.insert(id, adapter);
    }

    /// The capabilities of a registered surface, if any.
    pub async fn get_surface_capabilities(
        &self,
        surface_id: &SurfaceId,
    ) -> Option<stepwise_core::SurfaceCapabilities> {
        self.adapters.read().await.get(surface_id).map(|a| a.capabilities())
    }

    /// The sole active workflow state for a user, if any.
    pub async fn get_active_workflow(
        &self,
        user_id: &UserId,
    ) -> Result<Option<WorkflowState>, EngineError> {
        Ok(self.store.get_active_for_user(user_id).await?)
    }

    /// Cancel a user's instance of a workflow. Idempotent.
    pub async fn cancel_workflow(
        &self,
        user_id: &UserId,
        workflow_id: &WorkflowId,
    ) -> Result<(), EngineError> {
        self.store.delete(user_id, workflow_id).await?;
        Ok(())
    }

    async fn definition(&self, workflow_id: &WorkflowId) -> Result<Arc<WorkflowDefinition>, EngineError> {
        self.definitions
            .read()
            .await
            .get(workflow_id)
            .cloned()
            .ok_or_else(|| EngineError::UnknownWorkflow(workflow_id.clone()))
    }

    async fn adapter(&self, surface_id: &SurfaceId) -> Result<Arc<dyn SurfaceAdapter>, EngineError> {
        self.adapters
            .read()
            .await
            .get(surface_id)
            .cloned()
            .ok_or_else(|| EngineError::UnknownAdapter(surface_id.clone()))
    }

    async fn try_acquire(&self, key: (UserId, WorkflowId)) -> bool {
        let mut locks = self.locks.lock().await;
        if locks.contains(&key) {
            false
        } else {
            locks.insert(key);
            true
        }
    }

    async fn release(&self, key: &(UserId, WorkflowId)) {
        self.locks.lock().await.remove(key);
    }

    /// Delete any prior instance for `(userId, workflowId)`, create a
    /// fresh instance at the definition's entry point, render it, and
    /// auto-advance through consecutive non-terminal `info` steps.
    pub async fn start_workflow(
        &self,
        workflow_id: &WorkflowId,
        user_id: &UserId,
        surface: SurfaceRef,
        initial_data: Option<HashMap<StepId, StepData>>,
    ) -> Result<Outcome, EngineError> {
        let def = self.definition(workflow_id).await?;
        self.store.delete(user_id, workflow_id).await?;

        let now = now_millis();
        let mut state = WorkflowState {
            workflow_id: workflow_id.clone(),
            user_id: user_id.clone(),
            current_step: def.entry_point.clone(),
            step_history: Vec::new(),
            data: initial_data.unwrap_or_default(),
            started_at: now,
            last_active_at: now,
            origin_surface: surface.surface_id.clone(),
            last_surface: surface.surface_id.clone(),
            expires_at: now + def.ttl_millis,
            last_message_ids: HashMap::new(),
        };
        self.store.create(state.clone()).await?;
        self.observer.on_event(EngineEvent::WorkflowStarted {
            workflow: workflow_id.clone(),
            user: user_id.clone(),
            surface: surface.surface_id.clone(),
        });
        tracing::debug!(workflow = %workflow_id, user = %user_id, "stepwise.engine.start");

        self.run_and_auto_advance(&mut state, &def, &surface).await
    }

    /// Process one user action against their active workflow instance,
    /// under the per-`(userId, workflowId)` lock (§5). Returns
    /// immediately with [`Outcome::Cancelled`] if the lock is already
    /// held for this key.
    pub async fn handle_action(
        &self,
        user_id: &UserId,
        action: ParsedUserAction,
    ) -> Result<Outcome, EngineError> {
        let key = (user_id.clone(), action.workflow_id.clone());
        if !self.try_acquire(key.clone()).await {
            tracing::debug!(user = %user_id, workflow = %action.workflow_id, "stepwise.engine.concurrent_action");
            return Ok(Outcome::Cancelled {
                reason: "already handled on another surface".to_string(),
            });
        }
        let result = self.handle_action_locked(user_id, action).await;
        self.release(&key).await;
        result
    }

    async fn handle_action_locked(
        &self,
        user_id: &UserId,
        action: ParsedUserAction,
    ) -> Result<Outcome, EngineError> {
        let Some(mut state) = self.store.get(user_id, &action.workflow_id).await? else {
            return Ok(Outcome::Cancelled {
                reason: "no active workflow".to_string(),
            });
        };

        state.last_surface = action.surface.surface_id.clone();
        state.last_active_at = now_millis();

        if matches!(action.kind, ActionKind::Cancel) {
            self.store.delete(user_id, &action.workflow_id).await?;
            self.notify(&action.surface, default_cancel_message()).await?;
            self.observer.on_event(EngineEvent::WorkflowCancelled {
                workflow: action.workflow_id.clone(),
                user: user_id.clone(),
                reason: "cancel".to_string(),
            });
            return Ok(Outcome::Cancelled {
                reason: "cancelled by user".to_string(),
            });
        }

        if matches!(action.kind, ActionKind::Back) {
            return self.handle_back(user_id, &mut state, &action).await;
        }

        let def = self.definition(&action.workflow_id).await?;
        let step_def = def
            .steps
            .get(&state.current_step)
            .expect("currentStep invariant: current_step always names a defined step");

        if let (StepDefinition::TextInput(text_step), ActionKind::Text(text)) = (step_def, &action.kind) {
            if let Some(rule) = &text_step.validation {
                if let Err(message) = rule.check(text) {
                    self.notify(&action.surface, serde_json::json!({ "text": message.clone() }))
                        .await?;
                    return Ok(Outcome::ValidationError { message });
                }
            }
        }

        let timestamp = now_millis();
        let current_input = match &action.kind {
            ActionKind::Text(text) => Some(text.clone()),
            _ => None,
        };
        let step_data = match &action.kind {
            ActionKind::Selection(selection) => StepData::from_selection(selection.clone(), timestamp),
            ActionKind::Text(text) => StepData::from_input(text.clone(), timestamp),
            ActionKind::Cancel | ActionKind::Back => unreachable!("handled above"),
        };
        state.data.insert(state.current_step.clone(), step_data);

        let common = step_def.common();
        if let Some(tool_call) = &common.tool_call {
            match self
                .invoke_tool(tool_call, &state, current_input.as_deref())
                .await
            {
                Ok(outcome) if outcome.success => {}
                other => {
                    let message = match other {
                        Ok(outcome) => outcome.error.unwrap_or_else(|| "Tool call failed.".to_string()),
                        Err(err) => err.to_string(),
                    };
                    self.observer.on_event(EngineEvent::ToolCallFailed {
                        workflow: action.workflow_id.clone(),
                        step: state.current_step.clone(),
                        error: message.clone(),
                    });
                    self.notify(&action.surface, serde_json::json!({ "text": message.clone() }))
                        .await?;
                    if let Some(on_error) = &tool_call.on_error {
                        state.step_history.push(state.current_step.clone());
                        state.current_step = on_error.clone();
                    }
                    self.store.update(state.clone()).await?;
                    return Ok(Outcome::ToolError { message });
                }
            }
        }

        let next_step_id = match &action.kind {
            ActionKind::Selection(selection) => {
                let key = selection_key(selection);
                common.transitions.get(&key).cloned().or_else(|| common.next.clone())
            }
            _ => common.next.clone(),
        };

        if let Some(next) = next_step_id {
            state.step_history.push(state.current_step.clone());
            state.current_step = next;
        } else if !common.terminal {
            self.store.update(state.clone()).await?;
            return Ok(Outcome::Advanced);
        }

        self.run_and_auto_advance(&mut state, &def, &action.surface).await
    }

    async fn handle_back(
        &self,
        user_id: &UserId,
        state: &mut WorkflowState,
        action: &ParsedUserAction,
    ) -> Result<Outcome, EngineError> {
        let Some(previous) = state.step_history.pop() else {
            self.store.delete(user_id, &action.workflow_id).await?;
            self.notify(&action.surface, default_cancel_message()).await?;
            self.observer.on_event(EngineEvent::WorkflowCancelled {
                workflow: action.workflow_id.clone(),
                user: user_id.clone(),
                reason: "back from root".to_string(),
            });
            return Ok(Outcome::Cancelled {
                reason: "back from root".to_string(),
            });
        };
        state.data.remove(&previous);
        state.current_step = previous;
        self.store.update(state.clone()).await?;

        let def = self.definition(&action.workflow_id).await?;
        let step_def = def
            .steps
            .get(&state.current_step)
            .expect("currentStep invariant");
        self.render_step(state, &def, step_def, &action.surface).await?;
        Ok(Outcome::Advanced)
    }

    /// Render `state.current_step`, then, while it is a non-terminal
    /// `info` step with a `next`, execute any bound tool call, advance,
    /// persist, and render again (§4.7 auto-advance). Stops (and leaves
    /// the instance active) the moment the landed step is not an `info`
    /// step, has no `next`, or its tool call fails. Deletes the instance
    /// and returns `Completed` if a terminal step is reached.
    async fn run_and_auto_advance(
        &self,
        state: &mut WorkflowState,
        def: &WorkflowDefinition,
        surface: &SurfaceRef,
    ) -> Result<Outcome, EngineError> {
        loop {
            self.store.update(state.clone()).await?;
            let step_def = def
                .steps
                .get(&state.current_step)
                .expect("currentStep invariant");
            let common = step_def.common();

            self.render_step(state, def, step_def, surface).await?;

            if common.terminal {
                self.store.delete(&state.user_id, &state.workflow_id).await?;
                self.observer.on_event(EngineEvent::WorkflowCompleted {
                    workflow: state.workflow_id.clone(),
                    user: state.user_id.clone(),
                });
                return Ok(Outcome::Completed);
            }

            if !step_def.is_info() {
                return Ok(Outcome::Advanced);
            }

            if let Some(tool_call) = &common.tool_call {
                match self.invoke_tool(tool_call, state, None).await {
                    Ok(outcome) if outcome.success => {}
                    other => {
                        let message = match other {
                            Ok(outcome) => outcome.error.unwrap_or_else(|| "Tool call failed.".to_string()),
                            Err(err) => err.to_string(),
                        };
                        self.observer.on_event(EngineEvent::ToolCallFailed {
                            workflow: state.workflow_id.clone(),
                            step: state.current_step.clone(),
                            error: message,
                        });
                        return Ok(Outcome::Advanced);
                    }
                }
            }

            let Some(next) = common.next.clone() else {
                return Ok(Outcome::Advanced);
            };
            state.step_history.push(state.current_step.clone());
            state.current_step = next;
        }
    }

    async fn render_step(
        &self,
        state: &mut WorkflowState,
        def: &WorkflowDefinition,
        step_def: &StepDefinition,
        surface: &SurfaceRef,
    ) -> Result<(), EngineError> {
        let common = step_def.common();
        let content = interpolate(&common.content, &state.data);
        let primitive = compile_primitive(step_def, content);

        let suppressed = common.suppress_progress || common.terminal;
        let progress = if def.show_progress && !suppressed {
            let current = state.step_history.len() as u32 + 1;
            let remaining = shortest_path_to_terminal(&state.current_step, def);
            Some(Progress {
                current,
                total: current + remaining,
            })
        } else {
            None
        };
        let meta = RenderMeta {
            progress,
            include_back: !state.step_history.is_empty(),
            include_cancel: true,
        };

        let adapter = self.adapter(&surface.surface_id).await?;
        let negotiation = negotiate(&primitive, &adapter.capabilities(), &meta);
        let to_render = match negotiation.strategy {
            Strategy::Native => primitive,
            Strategy::TextFallback => negotiation.fallback_primitive.unwrap_or(primitive),
            Strategy::NotifyBlocked => InteractionPrimitive::Info {
                content: negotiation
                    .blocked_reason
                    .unwrap_or_else(|| "This can't be shown here.".to_string()),
            },
        };

        let target = RenderTarget {
            surface_user_id: surface.surface_user_id.clone(),
            channel_id: surface.channel_id.clone(),
            thread_id: surface.thread_id.clone(),
        };
        let rendered = adapter.render(&target, &to_render, &meta).await?;
        state
            .last_message_ids
            .insert(surface.surface_id.clone(), rendered.message_id);
        Ok(())
    }

    async fn notify(&self, surface: &SurfaceRef, payload: serde_json::Value) -> Result<(), EngineError> {
        let adapter = self.adapter(&surface.surface_id).await?;
        let target = RenderTarget {
            surface_user_id: surface.surface_user_id.clone(),
            channel_id: surface.channel_id.clone(),
            thread_id: surface.thread_id.clone(),
        };
        adapter.send_message(&target, &payload).await?;
        Ok(())
    }

    async fn invoke_tool(
        &self,
        tool_call: &stepwise_core::definition::ToolCallBinding,
        state: &WorkflowState,
        current_input: Option<&str>,
    ) -> Result<ToolOutcome, ToolError> {
        let Some(executor) = &self.tool_executor else {
            return Ok(ToolOutcome::failure("no tool executor configured"));
        };
        let params = tool_call
            .resolved_params()
            .into_iter()
            .map(|(name, source)| (name, resolve_param(&source, state, current_input)))
            .collect();
        executor.execute(&tool_call.name, params).await
    }
}

fn selection_key(selection: &Selection) -> String {
    match selection {
        Selection::Single(id) => id.clone(),
        Selection::Multiple(_) => stepwise_core::action::ACTION_SUBMIT.to_string(),
    }
}

fn resolve_param(source: &ParamSource, state: &WorkflowState, current_input: Option<&str>) -> serde_json::Value {
    match source {
        ParamSource::Input => serde_json::Value::String(current_input.unwrap_or_default().to_string()),
        ParamSource::Literal(s) => serde_json::Value::String(s.clone()),
        ParamSource::DataRef(path) => {
            let mut parts = path.splitn(2, '.');
            let step = parts.next().unwrap_or_default();
            let field = parts.next();
            let Some(step_data) = state.data.get(&StepId::new(step)) else {
                return serde_json::Value::Null;
            };
            match field {
                Some("input") => step_data
                    .input
                    .clone()
                    .map(serde_json::Value::String)
                    .unwrap_or(serde_json::Value::Null),
                Some("selection") => selection_to_json(step_data.selection.as_ref()),
                _ => step_data
                    .input
                    .clone()
                    .map(serde_json::Value::String)
                    .unwrap_or_else(|| selection_to_json(step_data.selection.as_ref())),
            }
        }
    }
}

fn selection_to_json(selection: Option<&Selection>) -> serde_json::Value {
    match selection {
        None => serde_json::Value::Null,
        Some(Selection::Single(id)) => serde_json::Value::String(id.clone()),
        Some(Selection::Multiple(ids)) => {
            serde_json::Value::Array(ids.iter().cloned().map(serde_json::Value::String).collect())
        }
    }
}

fn compile_primitive(step_def: &StepDefinition, content: String) -> InteractionPrimitive {
    match step_def {
        StepDefinition::Info(_) => InteractionPrimitive::Info { content },
        StepDefinition::Media(media) => InteractionPrimitive::Media {
            content,
            media_type: media.media_type,
            source: media.source.clone(),
            mime_type: media.mime_type.clone(),
        },
        StepDefinition::Choice(choice) => InteractionPrimitive::Choice {
            content,
            options: choice.options.clone(),
        },
        StepDefinition::MultiChoice(choice) => InteractionPrimitive::MultiChoice {
            content,
            options: choice.options.clone(),
            min_selections: choice.min_selections,
        },
        StepDefinition::Confirm(confirm) => InteractionPrimitive::Confirm {
            content,
            yes_label: confirm.yes_label.clone(),
            no_label: confirm.no_label.clone(),
        },
        StepDefinition::TextInput(text) => InteractionPrimitive::TextInput {
            content,
            placeholder: text.placeholder.clone(),
        },
    }
}
