//! Template interpolation of `{{data.<stepId>[.input|.selection]}}`
//! references against accumulated step data (§4.7).

use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;
use stepwise_core::{Selection, StepData, StepId};

fn reference_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\{\{\s*data\.([A-Za-z0-9_-]+)(?:\.(input|selection))?\s*\}\}")
            .expect("reference pattern is a fixed, valid regex")
    })
}

fn selection_as_text(selection: &Selection) -> String {
    match selection {
        Selection::Single(id) => id.clone(),
        Selection::Multiple(ids) => ids.join(", "),
    }
}

fn resolve(step_data: Option<&StepData>, field: Option<&str>) -> String {
    let Some(step_data) = step_data else {
        return String::new();
    };
    match field {
        Some("input") => step_data.input.clone().unwrap_or_default(),
        Some("selection") => step_data.selection.as_ref().map(selection_as_text).unwrap_or_default(),
        _ => step_data
            .input
            .clone()
            .or_else(|| step_data.selection.as_ref().map(selection_as_text))
            .unwrap_or_default(),
    }
}

/// Expand every `{{data.<stepId>[.input|.selection]}}` reference in
/// `content` against `data`. References to steps or fields with no
/// recorded value expand to the empty string.
pub fn interpolate(content: &str, data: &HashMap<StepId, StepData>) -> String {
    reference_pattern()
        .replace_all(content, |caps: &regex::Captures| {
            let step_id = StepId::new(&caps[1]);
            let field = caps.get(2).map(|m| m.as_str());
            resolve(data.get(&step_id), field)
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data_with(step: &str, input: Option<&str>, selection: Option<Selection>) -> HashMap<StepId, StepData> {
        let mut map = HashMap::new();
        map.insert(
            StepId::new(step),
            StepData {
                timestamp: 0,
                input: input.map(String::from),
                selection,
            },
        );
        map
    }

    #[test]
    fn interpolates_input_reference() {
        let data = data_with("name", Some("Ada"), None);
        assert_eq!(interpolate("Hello {{data.name.input}}!", &data), "Hello Ada!");
    }

    #[test]
    fn interpolates_selection_reference() {
        let data = data_with("plan", None, Some(Selection::Single("pro".into())));
        assert_eq!(interpolate("Plan: {{data.plan.selection}}", &data), "Plan: pro");
    }

    #[test]
    fn interpolates_multiple_selection_joined_with_commas() {
        let data = data_with("toppings", None, Some(Selection::Multiple(vec!["a".into(), "b".into()])));
        assert_eq!(interpolate("{{data.toppings.selection}}", &data), "a, b");
    }

    #[test]
    fn unknown_reference_expands_to_empty_string() {
        assert_eq!(interpolate("Hi {{data.missing.input}}.", &HashMap::new()), "Hi .");
    }

    #[test]
    fn bare_reference_prefers_input_over_selection() {
        let data = data_with("step", Some("typed"), Some(Selection::Single("picked".into())));
        assert_eq!(interpolate("{{data.step}}", &data), "typed");
    }

    #[test]
    fn content_without_references_is_unchanged() {
        assert_eq!(interpolate("plain text", &HashMap::new()), "plain text");
    }
}
