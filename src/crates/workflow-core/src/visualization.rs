//! Graph visualization: render a workflow's edge topology as DOT or Mermaid.
//!
//! Grounded on the original's `WorkflowViz` (`_viz.py`); this only ever
//! looks at the static edge-group topology, never at the data flowing
//! through a live run, so it can be called before the workflow has ever
//! executed.

use crate::edge::EdgeGroup;

/// Renders an edge-group topology in either DOT (Graphviz) or Mermaid
/// flowchart syntax. The original only emits DOT; Mermaid is added here
/// since it renders inline in most Markdown viewers without a local
/// Graphviz install.
pub struct WorkflowViz<'a> {
    edge_groups: &'a [EdgeGroup],
    start_executor_id: &'a str,
}

impl<'a> WorkflowViz<'a> {
    pub fn new(edge_groups: &'a [EdgeGroup], start_executor_id: &'a str) -> Self {
        Self { edge_groups, start_executor_id }
    }

    pub fn to_digraph(&self) -> String {
        let mut lines = vec!["digraph Workflow {".to_string(), "    rankdir=LR;".to_string()];

        for id in self.node_ids() {
            if id == self.start_executor_id {
                lines.push(format!("    \"{id}\" [style=filled, fillcolor=lightgreen];"));
            } else {
                lines.push(format!("    \"{id}\" [shape=box];"));
            }
        }

        let mut fan_in_counter = 0;
        for group in self.edge_groups {
            match group {
                EdgeGroup::Single(edge) => {
                    let style = if edge.gate.is_some() { " [style=dashed, label=\"conditional\"]" } else { "" };
                    lines.push(format!("    \"{}\" -> \"{}\"{};", edge.source.id(), edge.target.id(), style));
                }
                EdgeGroup::FanOut { source, targets, .. } => {
                    for target in targets {
                        lines.push(format!("    \"{}\" -> \"{}\" [label=\"fan-out\"];", source.id(), target.id()));
                    }
                }
                EdgeGroup::SwitchCase { source, cases } => {
                    for case in cases {
                        let label = if case.is_default() { "default" } else { "case" };
                        lines.push(format!(
                            "    \"{}\" -> \"{}\" [style=dashed, label=\"{}\"];",
                            source.id(),
                            case.target.id(),
                            label
                        ));
                    }
                }
                EdgeGroup::FanIn { sources, target } => {
                    let node = format!("__fan_in_{fan_in_counter}");
                    fan_in_counter += 1;
                    lines.push(format!(
                        "    \"{node}\" [shape=ellipse, style=filled, fillcolor=lightgoldenrod, label=\"fan-in\"];"
                    ));
                    for source in sources {
                        lines.push(format!("    \"{}\" -> \"{node}\";", source.id()));
                    }
                    lines.push(format!("    \"{node}\" -> \"{}\";", target.id()));
                }
            }
        }

        lines.push("}".to_string());
        lines.join("\n")
    }

    pub fn to_mermaid(&self) -> String {
        let mut lines = vec!["flowchart LR".to_string()];

        for id in self.node_ids() {
            let node = sanitize(&id);
            if id == self.start_executor_id {
                lines.push(format!("    {node}([{id}]):::start"));
            } else {
                lines.push(format!("    {node}[{id}]"));
            }
        }

        let mut fan_in_counter = 0;
        for group in self.edge_groups {
            match group {
                EdgeGroup::Single(edge) => {
                    let arrow = if edge.gate.is_some() { "-.->|conditional|" } else { "-->" };
                    lines.push(format!("    {} {} {}", sanitize(edge.source.id()), arrow, sanitize(edge.target.id())));
                }
                EdgeGroup::FanOut { source, targets, .. } => {
                    for target in targets {
                        lines.push(format!("    {} -->|fan-out| {}", sanitize(source.id()), sanitize(target.id())));
                    }
                }
                EdgeGroup::SwitchCase { source, cases } => {
                    for case in cases {
                        let label = if case.is_default() { "default" } else { "case" };
                        lines.push(format!(
                            "    {} -.->|{}| {}",
                            sanitize(source.id()),
                            label,
                            sanitize(case.target.id())
                        ));
                    }
                }
                EdgeGroup::FanIn { sources, target } => {
                    let node = format!("fan_in_{fan_in_counter}");
                    fan_in_counter += 1;
                    lines.push(format!("    {node}{{fan-in}}"));
                    for source in sources {
                        lines.push(format!("    {} --> {node}", sanitize(source.id())));
                    }
                    lines.push(format!("    {node} --> {}", sanitize(target.id())));
                }
            }
        }

        lines.push("    classDef start fill:#90ee90".to_string());
        lines.join("\n")
    }

    fn node_ids(&self) -> Vec<String> {
        let mut ids = std::collections::BTreeSet::new();
        for group in self.edge_groups {
            for id in group.source_ids() {
                ids.insert(id);
            }
            for id in group.target_ids() {
                ids.insert(id);
            }
        }
        ids.insert(self.start_executor_id.to_string());
        ids.into_iter().collect()
    }
}

fn sanitize(id: &str) -> String {
    id.chars().map(|c| if c.is_alphanumeric() { c } else { '_' }).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::Edge;
    use crate::executor::Executor;
    use crate::types::PayloadType;
    use std::sync::Arc;

    fn executor(id: &str) -> Arc<Executor> {
        Arc::new(Executor::builder(id).handler(PayloadType::concrete("T"), vec![], |_v, _ctx| async { Ok(()) }).build())
    }

    #[test]
    fn digraph_includes_start_and_target_nodes() {
        let a = executor("a");
        let b = executor("b");
        let groups = vec![EdgeGroup::Single(Edge::new(a.clone(), b.clone()))];
        let viz = WorkflowViz::new(&groups, "a");
        let dot = viz.to_digraph();
        assert!(dot.contains("\"a\" [style=filled, fillcolor=lightgreen];"));
        assert!(dot.contains("\"a\" -> \"b\";"));
    }

    #[test]
    fn mermaid_renders_fan_in_as_diamond_node() {
        let x = executor("x");
        let y = executor("y");
        let j = executor("j");
        let groups = vec![EdgeGroup::FanIn { sources: vec![x, y], target: j }];
        let viz = WorkflowViz::new(&groups, "x");
        let mermaid = viz.to_mermaid();
        assert!(mermaid.contains("fan_in_0{fan-in}"));
    }
}
