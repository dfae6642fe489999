//! Step graph: the arena behind a note's ready-queue.
//!
//! Built once per run from `note.logic`. Validation is eager: unknown
//! dependency ids and cycles are rejected before any step runs, so a note
//! never stalls with steps that can never become ready.

use std::collections::{HashMap, HashSet, VecDeque};

use notefabric_core::error::{FabricError, Result};
use notefabric_core::types::{Note, StepStatus};

#[derive(Debug)]
pub struct StepGraph {
    /// Step id → dependencies not yet completed.
    unmet: HashMap<String, usize>,
    /// Step id → steps that list it as a dependency, in `logic` order.
    dependents: HashMap<String, Vec<String>>,
}

impl StepGraph {
    pub fn build(note: &Note) -> Result<Self> {
        let ids: HashSet<&str> = note.logic.iter().map(|s| s.id.as_str()).collect();
        if ids.len() != note.logic.len() {
            return Err(FabricError::NoteExecution {
                note_id: note.id.clone(),
                message: "duplicate step ids in logic".into(),
            });
        }
        let status: HashMap<&str, StepStatus> =
            note.logic.iter().map(|s| (s.id.as_str(), s.status)).collect();

        let mut unmet = HashMap::with_capacity(note.logic.len());
        let mut dependents: HashMap<String, Vec<String>> = HashMap::new();
        for step in &note.logic {
            let deps = unique(&step.dependencies);
            let missing: Vec<String> = deps
                .iter()
                .filter(|d| !ids.contains(d.as_str()))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(FabricError::StaleDependency {
                    note_id: note.id.clone(),
                    step_id: step.id.clone(),
                    missing,
                });
            }

            let open = deps
                .iter()
                .filter(|d| status.get(d.as_str()) != Some(&StepStatus::Completed))
                .count();
            unmet.insert(step.id.clone(), open);
            for dep in deps {
                dependents.entry(dep).or_default().push(step.id.clone());
            }
        }

        let graph = Self { unmet, dependents };
        graph.check_acyclic(note)?;
        Ok(graph)
    }

    /// Kahn's algorithm over the full dependency relation, ignoring status.
    fn check_acyclic(&self, note: &Note) -> Result<()> {
        let mut indegree: HashMap<&str, usize> = note
            .logic
            .iter()
            .map(|s| (s.id.as_str(), unique(&s.dependencies).len()))
            .collect();
        let mut queue: VecDeque<&str> = note
            .logic
            .iter()
            .map(|s| s.id.as_str())
            .filter(|id| indegree.get(id) == Some(&0))
            .collect();

        let mut visited = 0;
        while let Some(id) = queue.pop_front() {
            visited += 1;
            for dependent in self.dependents.get(id).into_iter().flatten() {
                if let Some(d) = indegree.get_mut(dependent.as_str()) {
                    *d -= 1;
                    if *d == 0 {
                        queue.push_back(dependent.as_str());
                    }
                }
            }
        }

        if visited == indegree.len() {
            return Ok(());
        }
        let mut steps: Vec<String> = indegree
            .into_iter()
            .filter(|(_, d)| *d > 0)
            .map(|(id, _)| id.to_string())
            .collect();
        steps.sort();
        Err(FabricError::DependencyCycle {
            note_id: note.id.clone(),
            steps,
        })
    }

    /// Pending steps with no open dependencies, in `logic` order.
    pub fn initial_ready(&self, note: &Note) -> VecDeque<String> {
        note.logic
            .iter()
            .filter(|s| s.status == StepStatus::Pending && self.unmet.get(&s.id) == Some(&0))
            .map(|s| s.id.clone())
            .collect()
    }

    /// Mark `step_id` completed; returns dependents that just became ready.
    pub fn complete(&mut self, step_id: &str) -> Vec<String> {
        let mut ready = Vec::new();
        for dependent in self.dependents.get(step_id).into_iter().flatten() {
            if let Some(count) = self.unmet.get_mut(dependent)
                && *count > 0
            {
                *count -= 1;
                if *count == 0 {
                    ready.push(dependent.clone());
                }
            }
        }
        ready
    }

    pub fn unmet(&self, step_id: &str) -> Option<usize> {
        self.unmet.get(step_id).copied()
    }
}

fn unique(deps: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(deps.len());
    for d in deps {
        if !out.contains(d) {
            out.push(d.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use notefabric_core::types::Step;
    use serde_json::Value;

    fn note(steps: Vec<Step>) -> Note {
        Note::new("graph").with_logic(steps)
    }

    #[test]
    fn test_ready_order_and_release() {
        let n = note(vec![
            Step::new("a", "echo", Value::Null),
            Step::new("b", "echo", Value::Null).depends_on(&["a"]),
            Step::new("c", "echo", Value::Null).depends_on(&["a", "b"]),
            Step::new("d", "echo", Value::Null),
        ]);
        let mut graph = StepGraph::build(&n).unwrap();
        assert_eq!(graph.initial_ready(&n), VecDeque::from(["a".to_string(), "d".to_string()]));
        assert_eq!(graph.complete("a"), vec!["b".to_string()]);
        assert_eq!(graph.unmet("c"), Some(1));
        assert_eq!(graph.complete("b"), vec!["c".to_string()]);
    }

    #[test]
    fn test_stale_dependency_detected() {
        let n = note(vec![Step::new("a", "echo", Value::Null).depends_on(&["ghost"])]);
        match StepGraph::build(&n).unwrap_err() {
            FabricError::StaleDependency { step_id, missing, .. } => {
                assert_eq!(step_id, "a");
                assert_eq!(missing, vec!["ghost".to_string()]);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_cycle_detected() {
        let n = note(vec![
            Step::new("root", "echo", Value::Null),
            Step::new("a", "echo", Value::Null).depends_on(&["b"]),
            Step::new("b", "echo", Value::Null).depends_on(&["a"]),
        ]);
        match StepGraph::build(&n).unwrap_err() {
            FabricError::DependencyCycle { steps, .. } => {
                assert_eq!(steps, vec!["a".to_string(), "b".to_string()]);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_step_ids_rejected() {
        let n = note(vec![
            Step::new("a", "echo", Value::Null),
            Step::new("a", "echo", Value::Null),
        ]);
        assert!(matches!(
            StepGraph::build(&n),
            Err(FabricError::NoteExecution { .. })
        ));
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let n = note(vec![Step::new("a", "echo", Value::Null).depends_on(&["a"])]);
        assert!(matches!(
            StepGraph::build(&n),
            Err(FabricError::DependencyCycle { .. })
        ));
    }

    #[test]
    fn test_completed_dependencies_count_as_met() {
        let mut n = note(vec![
            Step::new("a", "echo", Value::Null),
            Step::new("b", "echo", Value::Null).depends_on(&["a", "a"]),
        ]);
        n.logic[0].status = StepStatus::Completed;
        let graph = StepGraph::build(&n).unwrap();
        assert_eq!(graph.unmet("b"), Some(0));
        assert_eq!(graph.initial_ready(&n), VecDeque::from(["b".to_string()]));
    }
}
