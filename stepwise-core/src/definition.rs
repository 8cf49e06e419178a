//! Workflow definitions — the immutable, data-only description of a
//! multi-step conversational workflow (§3, §6).

use crate::id::StepId;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

fn default_ttl_millis() -> u64 {
    60 * 60 * 1000
}

fn default_true() -> bool {
    true
}

/// Immutable document describing one workflow's steps and transitions.
/// Deserialized directly from the host's JSON/YAML definition file (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Unique id for this workflow (also used as the instance key).
    pub id: String,
    /// Owning plugin/integration name. Opaque to the engine.
    pub plugin: String,
    /// Definition version, for the host's own bookkeeping.
    pub version: String,
    /// The step a new instance starts at.
    pub entry_point: StepId,
    /// Time-to-live for an instance, in milliseconds. Defaults to one hour.
    #[serde(default = "default_ttl_millis")]
    pub ttl_millis: u64,
    /// Whether rendered steps carry a progress indicator. Defaults to true.
    #[serde(default = "default_true")]
    pub show_progress: bool,
    /// All steps, keyed by id.
    pub steps: HashMap<StepId, StepDefinition>,
}

/// One node in a workflow. The common fields live on the variant payload
/// rather than a separate struct so that `next`/`transitions` only exist on
/// variants that can meaningfully have them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StepDefinition {
    /// Informational step. Auto-advances through consecutive info steps.
    Info(StepCommon),
    /// Single-selection step.
    Choice(ChoiceStep),
    /// Multi-selection step.
    MultiChoice(ChoiceStep),
    /// Yes/no confirmation step.
    Confirm(ConfirmStep),
    /// Free-text input step.
    TextInput(TextInputStep),
    /// Media-presenting step.
    Media(MediaStep),
}

/// Fields shared by every step kind.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StepCommon {
    /// Template content, expanded against `state.data` before render.
    pub content: String,
    /// Linear successor. Mutually usable alongside `transitions` — branching
    /// steps check `transitions` first, then fall back to `next`.
    #[serde(default)]
    pub next: Option<StepId>,
    /// Branching successors keyed by the selection id.
    #[serde(default)]
    pub transitions: HashMap<String, StepId>,
    /// Tool call to execute when this step is completed (or, for an info
    /// step, when auto-advanced through).
    #[serde(default)]
    pub tool_call: Option<ToolCallBinding>,
    /// Whether this step has no outbound edge and ends the workflow.
    #[serde(default)]
    pub terminal: bool,
    /// Suppress the progress indicator for this specific step even if the
    /// workflow has `show_progress` enabled.
    #[serde(default)]
    pub suppress_progress: bool,
}

/// A `choice`/`multi-choice` step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChoiceStep {
    #[serde(flatten)]
    pub common: StepCommon,
    /// The selectable options. Required to be non-empty by `validate()`.
    pub options: Vec<crate::primitive::ChoiceOption>,
    /// For multi-choice: minimum required selections.
    #[serde(default)]
    pub min_selections: u32,
}

/// A `media` step: an image, file, or voice message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaStep {
    #[serde(flatten)]
    pub common: StepCommon,
    /// The kind of media this step presents.
    pub media_type: crate::primitive::MediaKind,
    /// Where the bytes come from. Absent for a pure text/caption step.
    #[serde(default)]
    pub source: Option<crate::primitive::MediaSource>,
    /// MIME type, where known.
    #[serde(default)]
    pub mime_type: Option<String>,
}

/// A `confirm` step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmStep {
    #[serde(flatten)]
    pub common: StepCommon,
    /// Label for the affirmative choice.
    pub yes_label: String,
    /// Label for the negative choice.
    pub no_label: String,
}

/// A `text-input` step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextInputStep {
    #[serde(flatten)]
    pub common: StepCommon,
    /// Placeholder shown in the input field.
    #[serde(default)]
    pub placeholder: Option<String>,
    /// Validation rules applied to the raw text reply.
    #[serde(default)]
    pub validation: Option<ValidationRule>,
}

/// Length/pattern constraints on a `text-input` reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationRule {
    /// Minimum accepted length, inclusive.
    #[serde(default)]
    pub min_length: Option<usize>,
    /// Maximum accepted length, inclusive.
    #[serde(default)]
    pub max_length: Option<usize>,
    /// Regex the reply must fully match, if present.
    #[serde(default)]
    pub pattern: Option<String>,
    /// Message shown on validation failure. Falls back to a generic
    /// message when absent.
    #[serde(default)]
    pub error_message: Option<String>,
}

impl ValidationRule {
    /// Validate `input` against this rule, returning the custom or default
    /// error message on failure.
    pub fn check(&self, input: &str) -> Result<(), String> {
        let len = input.chars().count();
        if let Some(min) = self.min_length {
            if len < min {
                return Err(self.error_message.clone().unwrap_or_else(|| {
                    format!("Please enter at least {min} characters.")
                }));
            }
        }
        if let Some(max) = self.max_length {
            if len > max {
                return Err(self.error_message.clone().unwrap_or_else(|| {
                    format!("Please enter at most {max} characters.")
                }));
            }
        }
        if let Some(pattern) = &self.pattern {
            // Compilation is checked at registration time; a bad pattern
            // here would already have failed validate().
            let re = Regex::new(pattern).map_err(|e| e.to_string())?;
            if !re.is_match(input) {
                return Err(self
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "That doesn't look right. Please try again.".to_string()));
            }
        }
        Ok(())
    }
}

/// How a tool-call parameter's value is produced. Derived from the wire
/// format string via [`ParamSource::parse`] — never serialized directly.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamSource {
    /// A literal reference to the current step's raw text input.
    Input,
    /// A reference into a prior step's stored data:
    /// `$data.<stepId>`, `$data.<stepId>.input`, or `$data.<stepId>.selection`.
    DataRef(String),
    /// Any other string is taken as a literal value.
    Literal(String),
}

impl ParamSource {
    /// Parse the wire-format string form (`"$input"`, `"$data.foo.input"`,
    /// or any other literal string) into a `ParamSource`.
    pub fn parse(raw: &str) -> Self {
        if raw == "$input" {
            ParamSource::Input
        } else if let Some(rest) = raw.strip_prefix("$data.") {
            ParamSource::DataRef(rest.to_string())
        } else {
            ParamSource::Literal(raw.to_string())
        }
    }
}

/// Binding between a step and an external tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallBinding {
    /// Tool name, opaque to the engine.
    pub name: String,
    /// Map from tool parameter name to where its value comes from,
    /// expressed in wire format (`"$input"`, `"$data.step.field"`, or a
    /// literal string).
    pub param_map: HashMap<String, String>,
    /// Step to transition to if the tool call fails.
    #[serde(default)]
    pub on_error: Option<StepId>,
}

impl ToolCallBinding {
    /// Resolve `param_map` into concrete `ParamSource`s.
    pub fn resolved_params(&self) -> HashMap<String, ParamSource> {
        self.param_map
            .iter()
            .map(|(k, v)| (k.clone(), ParamSource::parse(v)))
            .collect()
    }
}

impl StepDefinition {
    /// The fields shared by every variant.
    pub fn common(&self) -> &StepCommon {
        match self {
            StepDefinition::Info(c) => c,
            StepDefinition::Media(c) => &c.common,
            StepDefinition::Choice(c) | StepDefinition::MultiChoice(c) => &c.common,
            StepDefinition::Confirm(c) => &c.common,
            StepDefinition::TextInput(c) => &c.common,
        }
    }

    /// Whether this step type is `Info` (relevant to auto-advance).
    pub fn is_info(&self) -> bool {
        matches!(self, StepDefinition::Info(_))
    }

    /// All step ids this step can transition to (for reachability analysis).
    pub fn outbound(&self) -> Vec<&StepId> {
        let common = self.common();
        let mut out: Vec<&StepId> = common.transitions.values().collect();
        if let Some(next) = &common.next {
            out.push(next);
        }
        out
    }
}

/// A single validation failure, addressable by the field it came from.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DefinitionError {
    /// `entry_point` does not name a step in `steps`.
    #[error("entry_point {0:?} is not a defined step")]
    UnknownEntryPoint(StepId),
    /// A `next`, `transitions[*]`, or `tool_call.on_error` target does not
    /// name a step in `steps`.
    #[error("step {step:?} references unknown step {target:?}")]
    UnknownTarget {
        /// The step containing the dangling reference.
        step: StepId,
        /// The dangling reference.
        target: StepId,
    },
    /// A non-terminal step cannot reach any terminal step.
    #[error("step {0:?} cannot reach a terminal step")]
    Unreachable(StepId),
    /// A `terminal` step declares an outbound edge.
    #[error("terminal step {0:?} must not have outbound transitions")]
    TerminalHasOutbound(StepId),
    /// A `choice`/`multi-choice` step has no options.
    #[error("choice step {0:?} must declare at least one option")]
    EmptyOptions(StepId),
    /// A `confirm` step is missing one of its labels.
    #[error("confirm step {0:?} must declare both yes_label and no_label")]
    MissingConfirmLabels(StepId),
    /// A validation regex does not compile.
    #[error("step {step:?} has an invalid validation pattern: {message}")]
    InvalidPattern {
        /// The offending step.
        step: StepId,
        /// The regex engine's error message.
        message: String,
    },
}

impl WorkflowDefinition {
    /// Validate every invariant from §3: entry point exists, every outbound
    /// reference resolves, every non-terminal step reaches some terminal,
    /// terminal steps have no outbound edge, choice/multi-choice steps have
    /// options, confirm steps have both labels, and validation regexes
    /// compile. Returns every violation found, not just the first.
    pub fn validate(&self) -> Result<(), Vec<DefinitionError>> {
        let mut errors = Vec::new();

        if !self.steps.contains_key(&self.entry_point) {
            errors.push(DefinitionError::UnknownEntryPoint(self.entry_point.clone()));
        }

        for (id, step) in &self.steps {
            let common = step.common();

            if common.terminal && (common.next.is_some() || !common.transitions.is_empty()) {
                errors.push(DefinitionError::TerminalHasOutbound(id.clone()));
            }

            for target in step.outbound() {
                if !self.steps.contains_key(target) {
                    errors.push(DefinitionError::UnknownTarget {
                        step: id.clone(),
                        target: target.clone(),
                    });
                }
            }
            if let Some(tc) = &common.tool_call {
                if let Some(on_error) = &tc.on_error {
                    if !self.steps.contains_key(on_error) {
                        errors.push(DefinitionError::UnknownTarget {
                            step: id.clone(),
                            target: on_error.clone(),
                        });
                    }
                }
            }

            match step {
                StepDefinition::Choice(c) | StepDefinition::MultiChoice(c) => {
                    if c.options.is_empty() {
                        errors.push(DefinitionError::EmptyOptions(id.clone()));
                    }
                }
                StepDefinition::Confirm(c) => {
                    if c.yes_label.trim().is_empty() || c.no_label.trim().is_empty() {
                        errors.push(DefinitionError::MissingConfirmLabels(id.clone()));
                    }
                }
                StepDefinition::TextInput(t) => {
                    if let Some(v) = &t.validation {
                        if let Some(pattern) = &v.pattern {
                            if let Err(e) = Regex::new(pattern) {
                                errors.push(DefinitionError::InvalidPattern {
                                    step: id.clone(),
                                    message: e.to_string(),
                                });
                            }
                        }
                    }
                }
                _ => {}
            }
        }

        // Reachability: BFS backwards from every terminal step over the
        // reversed edge set, then flag any non-terminal step not reached.
        let mut reverse: HashMap<&StepId, Vec<&StepId>> = HashMap::new();
        for (id, step) in &self.steps {
            for target in step.outbound() {
                reverse.entry(target).or_default().push(id);
            }
        }
        let mut can_reach_terminal: HashSet<&StepId> = HashSet::new();
        let mut queue: VecDeque<&StepId> = VecDeque::new();
        for (id, step) in &self.steps {
            if step.common().terminal {
                can_reach_terminal.insert(id);
                queue.push_back(id);
            }
        }
        while let Some(id) = queue.pop_front() {
            if let Some(preds) = reverse.get(id) {
                for pred in preds {
                    if can_reach_terminal.insert(pred) {
                        queue.push_back(pred);
                    }
                }
            }
        }
        for (id, step) in &self.steps {
            if !step.common().terminal && !can_reach_terminal.contains(id) {
                errors.push(DefinitionError::Unreachable(id.clone()));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn info(next: Option<&str>) -> StepDefinition {
        StepDefinition::Info(StepCommon {
            content: "hi".into(),
            next: next.map(StepId::new),
            terminal: next.is_none(),
            ..Default::default()
        })
    }

    fn def(steps: Vec<(&str, StepDefinition)>, entry: &str) -> WorkflowDefinition {
        WorkflowDefinition {
            id: "wf".into(),
            plugin: "test".into(),
            version: "1".into(),
            entry_point: StepId::new(entry),
            ttl_millis: default_ttl_millis(),
            show_progress: true,
            steps: steps
                .into_iter()
                .map(|(k, v)| (StepId::new(k), v))
                .collect(),
        }
    }

    #[test]
    fn linear_two_step_is_valid() {
        let d = def(
            vec![("a", info(Some("b"))), ("b", info(None))],
            "a",
        );
        assert!(d.validate().is_ok());
    }

    #[test]
    fn unknown_entry_point_is_rejected() {
        let d = def(vec![("a", info(None))], "missing");
        let errs = d.validate().unwrap_err();
        assert!(matches!(errs[0], DefinitionError::UnknownEntryPoint(_)));
    }

    #[test]
    fn dangling_next_is_rejected() {
        let d = def(vec![("a", info(Some("ghost")))], "a");
        let errs = d.validate().unwrap_err();
        assert!(errs
            .iter()
            .any(|e| matches!(e, DefinitionError::UnknownTarget { .. })));
    }

    #[test]
    fn unreachable_step_is_rejected() {
        // "b" is terminal-less and has no path forward.
        let mut steps = HashMap::new();
        steps.insert(StepId::new("a"), info(None));
        steps.insert(
            StepId::new("b"),
            StepDefinition::Info(StepCommon {
                content: "stuck".into(),
                ..Default::default()
            }),
        );
        let d = WorkflowDefinition {
            id: "wf".into(),
            plugin: "test".into(),
            version: "1".into(),
            entry_point: StepId::new("a"),
            ttl_millis: default_ttl_millis(),
            show_progress: true,
            steps,
        };
        let errs = d.validate().unwrap_err();
        assert!(errs
            .iter()
            .any(|e| matches!(e, DefinitionError::Unreachable(s) if s.as_str() == "b")));
    }

    #[test]
    fn terminal_step_with_outbound_is_rejected() {
        let bad = StepDefinition::Info(StepCommon {
            content: "x".into(),
            next: Some(StepId::new("a")),
            terminal: true,
            ..Default::default()
        });
        let d = def(vec![("a", bad)], "a");
        let errs = d.validate().unwrap_err();
        assert!(errs
            .iter()
            .any(|e| matches!(e, DefinitionError::TerminalHasOutbound(_))));
    }

    #[test]
    fn choice_without_options_is_rejected() {
        let d = def(
            vec![(
                "a",
                StepDefinition::Choice(ChoiceStep {
                    common: StepCommon {
                        content: "pick".into(),
                        terminal: true,
                        ..Default::default()
                    },
                    options: vec![],
                    min_selections: 0,
                }),
            )],
            "a",
        );
        let errs = d.validate().unwrap_err();
        assert!(errs.iter().any(|e| matches!(e, DefinitionError::EmptyOptions(_))));
    }

    #[test]
    fn confirm_missing_label_is_rejected() {
        let d = def(
            vec![(
                "a",
                StepDefinition::Confirm(ConfirmStep {
                    common: StepCommon {
                        content: "sure?".into(),
                        terminal: true,
                        ..Default::default()
                    },
                    yes_label: "".into(),
                    no_label: "No".into(),
                }),
            )],
            "a",
        );
        let errs = d.validate().unwrap_err();
        assert!(errs
            .iter()
            .any(|e| matches!(e, DefinitionError::MissingConfirmLabels(_))));
    }

    #[test]
    fn bad_regex_is_rejected() {
        let d = def(
            vec![(
                "a",
                StepDefinition::TextInput(TextInputStep {
                    common: StepCommon {
                        content: "enter".into(),
                        terminal: true,
                        ..Default::default()
                    },
                    placeholder: None,
                    validation: Some(ValidationRule {
                        min_length: None,
                        max_length: None,
                        pattern: Some("(".into()),
                        error_message: None,
                    }),
                }),
            )],
            "a",
        );
        let errs = d.validate().unwrap_err();
        assert!(errs.iter().any(|e| matches!(e, DefinitionError::InvalidPattern { .. })));
    }

    #[test]
    fn param_source_parses_wire_format() {
        assert!(matches!(ParamSource::parse("$input"), ParamSource::Input));
        assert!(matches!(
            ParamSource::parse("$data.step1.input"),
            ParamSource::DataRef(s) if s == "step1.input"
        ));
        assert!(matches!(
            ParamSource::parse("literal-value"),
            ParamSource::Literal(s) if s == "literal-value"
        ));
    }

    #[test]
    fn validation_rule_boundary_lengths() {
        let rule = ValidationRule {
            min_length: Some(8),
            max_length: Some(12),
            pattern: None,
            error_message: None,
        };
        assert!(rule.check("12345678").is_ok()); // exactly min
        assert!(rule.check("123456789012").is_ok()); // exactly max
        assert!(rule.check("1234567").is_err()); // one under
        assert!(rule.check("1234567890123").is_err()); // one over
    }
}
