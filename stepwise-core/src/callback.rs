//! Callback data encoding for inline-control surfaces (§6, §8).
//!
//! `wf:<workflowId>|s:<stepId>|a:<actionId>`. Adapters truncate
//! deterministically when the encoded form exceeds their transport's
//! action-id length cap — truncation always drops from the tail of the
//! step id, never from the workflow id or action id, so `decode` can still
//! recover the (possibly-shortened) step id unambiguously.

use crate::id::{StepId, WorkflowId};

/// Encode a callback id. The caller is responsible for checking the result
/// against their transport's length cap and calling
/// [`truncate_step_id`] if it doesn't fit.
pub fn encode_action_id(workflow: &WorkflowId, step: &StepId, action: &str) -> String {
    format!("wf:{workflow}|s:{step}|a:{action}")
}

/// Encode a callback id, truncating the step id from the tail as needed to
/// fit within `max_len` bytes. Returns `None` if even an empty step id
/// would not fit (the workflow id + action id alone exceed the cap).
pub fn encode_action_id_fitting(
    workflow: &WorkflowId,
    step: &StepId,
    action: &str,
    max_len: usize,
) -> Option<String> {
    let mut step_str = step.as_str().to_string();
    loop {
        let candidate = format!("wf:{workflow}|s:{step_str}|a:{action}");
        if candidate.len() <= max_len {
            return Some(candidate);
        }
        if step_str.is_empty() {
            return None;
        }
        step_str.pop();
    }
}

/// Decode a callback id produced by [`encode_action_id`] (or a
/// length-fitted variant of it) back into its three parts.
pub fn decode_action_id(raw: &str) -> Option<(WorkflowId, StepId, String)> {
    let rest = raw.strip_prefix("wf:")?;
    let (workflow, rest) = rest.split_once("|s:")?;
    let (step, action) = rest.split_once("|a:")?;
    Some((
        WorkflowId::new(workflow),
        StepId::new(step),
        action.to_string(),
    ))
}

/// Encode a modal/structured-input callback id: `wf_modal:<workflowId>:<stepId>`.
/// The submitted form value itself travels in the transport's own modal
/// payload (a conventional `input_block.text_input.value` field); adapters
/// read it from there, not from this id.
pub fn encode_modal_id(workflow: &WorkflowId, step: &StepId) -> String {
    format!("wf_modal:{workflow}:{step}")
}

/// Decode a modal callback id produced by [`encode_modal_id`].
pub fn decode_modal_id(raw: &str) -> Option<(WorkflowId, StepId)> {
    let rest = raw.strip_prefix("wf_modal:")?;
    let (workflow, step) = rest.split_once(':')?;
    Some((WorkflowId::new(workflow), StepId::new(step)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_for_ordinary_ids() {
        let wf = WorkflowId::new("onboarding");
        let step = StepId::new("confirm-create");
        let (decoded_wf, decoded_step, decoded_action) =
            decode_action_id(&encode_action_id(&wf, &step, "yes")).unwrap();
        assert_eq!(decoded_wf, wf);
        assert_eq!(decoded_step, step);
        assert_eq!(decoded_action, "yes");
    }

    #[test]
    fn round_trips_for_reserved_actions() {
        let wf = WorkflowId::new("wf");
        let step = StepId::new("s");
        for action in ["submit"] {
            let (_, _, decoded_action) =
                decode_action_id(&encode_action_id(&wf, &step, action)).unwrap();
            assert_eq!(decoded_action, action);
        }
    }

    #[test]
    fn fits_within_cap_by_truncating_step_id() {
        let wf = WorkflowId::new("wf");
        let step = StepId::new("a-very-long-step-identifier-indeed");
        let encoded = encode_action_id_fitting(&wf, &step, "yes", 20).unwrap();
        assert!(encoded.len() <= 20);
        assert!(encoded.starts_with("wf:wf|s:"));
    }

    #[test]
    fn returns_none_when_even_empty_step_does_not_fit() {
        let wf = WorkflowId::new("an-extremely-long-workflow-identifier");
        let step = StepId::new("s");
        assert!(encode_action_id_fitting(&wf, &step, "yes", 10).is_none());
    }

    #[test]
    fn decode_rejects_malformed_input() {
        assert!(decode_action_id("not-a-callback").is_none());
        assert!(decode_action_id("wf:x|a:y").is_none());
    }

    #[test]
    fn modal_id_round_trips() {
        let wf = WorkflowId::new("onboarding");
        let step = StepId::new("full-name");
        let (decoded_wf, decoded_step) = decode_modal_id(&encode_modal_id(&wf, &step)).unwrap();
        assert_eq!(decoded_wf, wf);
        assert_eq!(decoded_step, step);
    }

    #[test]
    fn decode_modal_id_rejects_non_modal_input() {
        assert!(decode_modal_id("wf:x|s:y|a:z").is_none());
        assert!(decode_modal_id("wf_modal:onlyworkflow").is_none());
    }
}
