//! Progress estimation via BFS over `next`/`transitions` edges (§4.7).

use std::collections::{HashMap, VecDeque};
use stepwise_core::{StepId, WorkflowDefinition};

/// Shortest number of hops from `from` to any terminal step, by BFS over
/// the definition's outbound edges. Zero if `from` is itself terminal.
pub fn shortest_path_to_terminal(from: &StepId, def: &WorkflowDefinition) -> u32 {
    let Some(start) = def.steps.get(from) else {
        return 0;
    };
    if start.common().terminal {
        return 0;
    }

    let mut distances: HashMap<&StepId, u32> = HashMap::new();
    distances.insert(from, 0);
    let mut queue = VecDeque::new();
    queue.push_back(from);

    while let Some(current) = queue.pop_front() {
        let dist = distances[current];
        let Some(step) = def.steps.get(current) else {
            continue;
        };
        if step.common().terminal {
            return dist;
        }
        for next in step.outbound() {
            if !distances.contains_key(next) {
                distances.insert(next, dist + 1);
                queue.push_back(next);
            }
        }
    }

    distances.values().max().copied().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;
    use stepwise_core::definition::{StepCommon, StepDefinition};

    fn info(next: Option<&str>, terminal: bool) -> StepDefinition {
        StepDefinition::Info(StepCommon {
            content: "x".into(),
            next: next.map(StepId::new),
            terminal,
            ..Default::default()
        })
    }

    fn def(steps: Vec<(&str, StepDefinition)>, entry: &str) -> WorkflowDefinition {
        WorkflowDefinition {
            id: "wf".into(),
            plugin: "test".into(),
            version: "1".into(),
            entry_point: StepId::new(entry),
            ttl_millis: 3_600_000,
            show_progress: true,
            steps: steps.into_iter().map(|(k, v)| (StepId::new(k), v)).collect(),
        }
    }

    #[test]
    fn terminal_step_has_zero_distance() {
        let d = def(vec![("a", info(None, true))], "a");
        assert_eq!(shortest_path_to_terminal(&StepId::new("a"), &d), 0);
    }

    #[test]
    fn linear_chain_counts_hops() {
        let d = def(
            vec![
                ("a", info(Some("b"), false)),
                ("b", info(Some("c"), false)),
                ("c", info(None, true)),
            ],
            "a",
        );
        assert_eq!(shortest_path_to_terminal(&StepId::new("a"), &d), 2);
        assert_eq!(shortest_path_to_terminal(&StepId::new("b"), &d), 1);
    }

    #[test]
    fn branching_picks_shortest_branch() {
        let mut steps = Map::new();
        steps.insert(
            StepId::new("choose"),
            StepDefinition::Choice(stepwise_core::definition::ChoiceStep {
                common: StepCommon {
                    content: "pick".into(),
                    transitions: [("short".to_string(), StepId::new("done")), ("long".to_string(), StepId::new("mid"))]
                        .into_iter()
                        .collect(),
                    ..Default::default()
                },
                options: vec![],
                min_selections: 0,
            }),
        );
        steps.insert(StepId::new("mid"), info(Some("done"), false));
        steps.insert(StepId::new("done"), info(None, true));
        let d = WorkflowDefinition {
            id: "wf".into(),
            plugin: "test".into(),
            version: "1".into(),
            entry_point: StepId::new("choose"),
            ttl_millis: 3_600_000,
            show_progress: true,
            steps,
        };
        assert_eq!(shortest_path_to_terminal(&StepId::new("choose"), &d), 1);
    }
}
