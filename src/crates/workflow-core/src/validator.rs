//! Workflow graph validation, run once at `WorkflowBuilder::build` time.
//!
//! Grounded on the original's `WorkflowGraphValidator` (`_validation.py`).
//! Edge duplication, type incompatibility, and unreachable/isolated nodes
//! are hard errors — a workflow that fails these is never constructed.
//! Self-loops, handler ambiguity, dead ends, and cycles are permitted;
//! they're only logged as warnings, since the original explicitly allows a
//! workflow graph to contain cycles (iteration is what bounds them, not the
//! topology).

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::warn;

use crate::edge::EdgeGroup;
use crate::error::ValidationError;
use crate::types::assignable;

/// Validates an edge-group topology before a [`crate::workflow::Workflow`]
/// is built from it.
pub struct GraphValidator<'a> {
    edge_groups: &'a [EdgeGroup],
    start_executor_id: &'a str,
    all_executor_ids: &'a [String],
}

impl<'a> GraphValidator<'a> {
    pub fn new(edge_groups: &'a [EdgeGroup], start_executor_id: &'a str, all_executor_ids: &'a [String]) -> Self {
        Self { edge_groups, start_executor_id, all_executor_ids }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.validate_edge_duplication()?;
        self.validate_type_compatibility()?;
        self.validate_switch_case_defaults()?;
        self.validate_graph_connectivity()?;

        self.warn_self_loops();
        self.warn_handler_ambiguity();
        self.warn_dead_ends();
        self.warn_cycles();
        self.warn_switch_case_default_ordering();

        Ok(())
    }

    fn simple_edge_ids(&self) -> Vec<(String, String, String)> {
        // (edge_id, source, target) triples for every concrete edge the
        // group expands to.
        let mut out = Vec::new();
        for group in self.edge_groups {
            match group {
                EdgeGroup::Single(edge) => out.push((edge.id(), edge.source.id().to_string(), edge.target.id().to_string())),
                EdgeGroup::FanOut { source, targets, .. } => {
                    for t in targets {
                        out.push((format!("{}->{}", source.id(), t.id()), source.id().to_string(), t.id().to_string()));
                    }
                }
                EdgeGroup::SwitchCase { source, cases } => {
                    for c in cases {
                        out.push((format!("{}->{}", source.id(), c.target.id()), source.id().to_string(), c.target.id().to_string()));
                    }
                }
                EdgeGroup::FanIn { sources, target } => {
                    for s in sources {
                        out.push((format!("{}->{}", s.id(), target.id()), s.id().to_string(), target.id().to_string()));
                    }
                }
            }
        }
        out
    }

    fn validate_edge_duplication(&self) -> Result<(), ValidationError> {
        let mut seen = HashSet::new();
        for (id, _, _) in self.simple_edge_ids() {
            if !seen.insert(id.clone()) {
                return Err(ValidationError::EdgeDuplication(id));
            }
        }
        Ok(())
    }

    fn validate_type_compatibility(&self) -> Result<(), ValidationError> {
        for group in self.edge_groups {
            match group {
                EdgeGroup::Single(edge) => {
                    let source_types = edge.source.emitted_types();
                    let target_types = edge.target.accepted_types();
                    if source_types.is_empty() || target_types.is_empty() {
                        continue;
                    }
                    let compatible = source_types.iter().any(|s| target_types.iter().any(|t| assignable(s, t)));
                    if !compatible {
                        return Err(ValidationError::TypeCompatibility {
                            source_executor_id: edge.source.id().to_string(),
                            target_executor_id: edge.target.id().to_string(),
                            source_types,
                            target_types,
                        });
                    }
                }
                EdgeGroup::FanOut { source, targets, .. } => {
                    let source_types = source.emitted_types();
                    if source_types.is_empty() {
                        continue;
                    }
                    for target in targets {
                        let target_types = target.accepted_types();
                        if target_types.is_empty() {
                            continue;
                        }
                        let compatible = source_types.iter().any(|s| target_types.iter().any(|t| assignable(s, t)));
                        if !compatible {
                            return Err(ValidationError::TypeCompatibility {
                                source_executor_id: source.id().to_string(),
                                target_executor_id: target.id().to_string(),
                                source_types: source_types.clone(),
                                target_types,
                            });
                        }
                    }
                }
                EdgeGroup::SwitchCase { source, cases } => {
                    let source_types = source.emitted_types();
                    if source_types.is_empty() {
                        continue;
                    }
                    for case in cases {
                        let target_types = case.target.accepted_types();
                        if target_types.is_empty() {
                            continue;
                        }
                        let compatible = source_types.iter().any(|s| target_types.iter().any(|t| assignable(s, t)));
                        if !compatible {
                            return Err(ValidationError::TypeCompatibility {
                                source_executor_id: source.id().to_string(),
                                target_executor_id: case.target.id().to_string(),
                                source_types: source_types.clone(),
                                target_types,
                            });
                        }
                    }
                }
                EdgeGroup::FanIn { sources, target } => {
                    let target_types = target.accepted_types();
                    if target_types.is_empty() {
                        continue;
                    }
                    for source in sources {
                        let source_types = source.emitted_types();
                        if source_types.is_empty() {
                            continue;
                        }
                        // The target of a fan-in accepts a List of (one of)
                        // its sources' emitted types; list-wrap before comparing.
                        let compatible = source_types
                            .iter()
                            .any(|s| target_types.iter().any(|t| assignable(&crate::types::PayloadType::list_of(s.clone()), t)));
                        if !compatible {
                            return Err(ValidationError::TypeCompatibility {
                                source_executor_id: source.id().to_string(),
                                target_executor_id: target.id().to_string(),
                                source_types: source_types.clone(),
                                target_types,
                            });
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn validate_switch_case_defaults(&self) -> Result<(), ValidationError> {
        for group in self.edge_groups {
            if let EdgeGroup::SwitchCase { cases, .. } = group {
                let default_count = cases.iter().filter(|c| c.is_default()).count();
                if default_count != 1 {
                    return Err(ValidationError::SwitchCaseDefaultCount(default_count));
                }
            }
        }
        Ok(())
    }

    fn adjacency(&self) -> HashMap<String, Vec<String>> {
        let mut adjacency: HashMap<String, Vec<String>> = HashMap::new();
        for (_, source, target) in self.simple_edge_ids() {
            adjacency.entry(source).or_default().push(target);
        }
        adjacency
    }

    fn validate_graph_connectivity(&self) -> Result<(), ValidationError> {
        let adjacency = self.adjacency();
        let mut reachable = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(self.start_executor_id.to_string());
        reachable.insert(self.start_executor_id.to_string());

        while let Some(node) = queue.pop_front() {
            if let Some(neighbors) = adjacency.get(&node) {
                for n in neighbors {
                    if reachable.insert(n.clone()) {
                        queue.push_back(n.clone());
                    }
                }
            }
        }

        let mut has_edge: HashSet<String> = HashSet::new();
        for (_, s, t) in self.simple_edge_ids() {
            has_edge.insert(s);
            has_edge.insert(t);
        }

        for id in self.all_executor_ids {
            if id == self.start_executor_id {
                continue;
            }
            if !has_edge.contains(id) {
                return Err(ValidationError::GraphConnectivity(format!(
                    "executor '{id}' has no incoming or outgoing edges and is not the start executor"
                )));
            }
            if !reachable.contains(id) {
                return Err(ValidationError::GraphConnectivity(format!(
                    "executor '{id}' is not reachable from the start executor '{}'",
                    self.start_executor_id
                )));
            }
        }

        Ok(())
    }

    fn warn_self_loops(&self) {
        for (id, source, target) in self.simple_edge_ids() {
            if source == target {
                warn!(edge_id = %id, executor_id = %source, "edge is a self-loop");
            }
        }
    }

    fn warn_handler_ambiguity(&self) {
        let mut seen_target_inputs: HashMap<String, HashSet<String>> = HashMap::new();
        for group in self.edge_groups {
            for target_id in group.target_ids() {
                seen_target_inputs.entry(target_id).or_default();
            }
        }
        // Ambiguity detection proper (duplicate accepted types on one
        // executor) requires introspecting handler tables directly; done at
        // executor-registration time via `ExecutorBuilder`, not here, since
        // the edge topology alone can't see handler tags for executors with
        // no inbound edges yet.
        let _ = seen_target_inputs;
    }

    fn warn_dead_ends(&self) {
        let adjacency = self.adjacency();
        for id in self.all_executor_ids {
            if !adjacency.contains_key(id) {
                warn!(executor_id = %id, "executor has no outgoing edges");
            }
        }
    }

    fn warn_cycles(&self) {
        let adjacency = self.adjacency();
        #[derive(Clone, Copy, PartialEq)]
        enum Color {
            White,
            Gray,
            Black,
        }
        let mut color: HashMap<String, Color> = self.all_executor_ids.iter().map(|id| (id.clone(), Color::White)).collect();

        fn visit(node: &str, adjacency: &HashMap<String, Vec<String>>, color: &mut HashMap<String, Color>) -> bool {
            color.insert(node.to_string(), Color::Gray);
            let mut found = false;
            if let Some(neighbors) = adjacency.get(node) {
                for n in neighbors {
                    match color.get(n.as_str()).copied().unwrap_or(Color::White) {
                        Color::Gray => found = true,
                        Color::White => {
                            if visit(n, adjacency, color) {
                                found = true;
                            }
                        }
                        Color::Black => {}
                    }
                }
            }
            color.insert(node.to_string(), Color::Black);
            found
        }

        let mut any_cycle = false;
        for id in self.all_executor_ids {
            if color.get(id).copied() == Some(Color::White) && visit(id, &adjacency, &mut color) {
                any_cycle = true;
            }
        }
        if any_cycle {
            warn!("workflow graph contains one or more cycles; iteration bounds must be relied on for termination");
        }
    }

    fn warn_switch_case_default_ordering(&self) {
        for group in self.edge_groups {
            if let EdgeGroup::SwitchCase { source, cases } = group {
                if let Some(position) = EdgeGroup::switch_case_default_position(cases) {
                    if position != cases.len() - 1 {
                        warn!(
                            executor_id = %source.id(),
                            "switch-case default is not the last case; later cases after it are unreachable"
                        );
                    }
                }
            }
        }
    }
}
