//! Per-superstep delivery semantics for each [`EdgeGroup`] variant.
//!
//! `route` is pure with respect to a single superstep's drained messages
//! except for `FanIn`, which keeps a buffer across supersteps: a fan-in
//! join can receive its sources' messages on different iterations and only
//! fires once every declared source has contributed one.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::edge::EdgeGroup;
use crate::error::{Result, WorkflowError};
use crate::executor::Executor;
use crate::message::{Message, Payload};

/// One resolved delivery: `target` should be invoked with `payload`, and
/// `source_ids` records which upstream executor(s) produced it (in
/// declared-source order for fan-in, a single id otherwise).
#[derive(Debug, Clone)]
pub struct Dispatch {
    pub target: Arc<Executor>,
    pub payload: Payload,
    pub source_ids: Vec<String>,
}

/// Result of routing one superstep's drained messages through a single
/// [`EdgeGroup`].
#[derive(Debug, Default)]
pub struct RouteOutcome {
    pub dispatches: Vec<Dispatch>,
    /// How many of each source's messages this group counts as "handled"
    /// this superstep: actually dispatched, deliberately dropped by a gate
    /// (`spec.md` §4.3 counts a gate rejection as handled, not dropped), or
    /// (for `FanIn`) retained in the join buffer awaiting the rest of its
    /// sources. The runner compares this against how many messages a
    /// source actually produced to detect ones no edge group claimed at
    /// all, which it reports via `WorkflowWarning` rather than dropping
    /// silently.
    pub claimed: HashMap<String, usize>,
}

/// Runtime companion to a static [`EdgeGroup`]: adds the buffering state
/// `FanIn` needs and exposes the single `route` entry point the runner
/// calls each superstep.
pub struct EdgeRunner {
    group: EdgeGroup,
    /// Per-source FIFO queue of messages received but not yet consumed by a
    /// join. A re-entrant source firing twice before the join fires once
    /// must not drop the first (oldest) message — `spec.md` §4.3 requires
    /// the extras to be buffered and delivered oldest-first on a later
    /// round, not overwritten by the newest arrival.
    fan_in_buffer: Option<Mutex<HashMap<String, VecDeque<Message>>>>,
}

impl EdgeRunner {
    pub fn new(group: EdgeGroup) -> Self {
        let fan_in_buffer = matches!(group, EdgeGroup::FanIn { .. }).then(|| Mutex::new(HashMap::new()));
        Self { group, fan_in_buffer }
    }

    pub fn source_ids(&self) -> Vec<String> {
        self.group.source_ids()
    }

    pub fn target_ids(&self) -> Vec<String> {
        self.group.target_ids()
    }

    /// Clear any buffered-but-incomplete fan-in join state. Called at the
    /// start of a fresh `run`/`run_streaming` so a prior run's partial join
    /// never leaks into the next one.
    pub fn reset(&self) {
        if let Some(buffer) = &self.fan_in_buffer {
            buffer.lock().unwrap().clear();
        }
    }

    /// Resolve this superstep's deliveries given the full set of messages
    /// drained this iteration, keyed by emitting executor id.
    pub fn route(&self, messages_by_source: &HashMap<String, Vec<Message>>) -> Result<RouteOutcome> {
        match &self.group {
            EdgeGroup::Single(edge) => {
                let mut dispatches = Vec::new();
                let mut claimed = HashMap::new();
                if let Some(msgs) = messages_by_source.get(edge.source.id()) {
                    for m in msgs {
                        if edge.passes_gate(&m.payload.value) {
                            dispatches.push(Dispatch {
                                target: edge.target.clone(),
                                payload: m.payload.clone(),
                                source_ids: vec![edge.source.id().to_string()],
                            });
                        }
                    }
                    // A gate rejection is a deliberate filter, not a failed
                    // delivery — `spec.md` §4.3 counts it as handled so it
                    // never raises an undeliverable-message warning.
                    claimed.insert(edge.source.id().to_string(), msgs.len());
                }
                Ok(RouteOutcome { dispatches, claimed })
            }

            EdgeGroup::FanOut { source, targets, selector } => {
                let mut dispatches = Vec::new();
                let mut claimed = HashMap::new();
                let Some(msgs) = messages_by_source.get(source.id()) else {
                    return Ok(RouteOutcome { dispatches, claimed });
                };
                let declared: HashSet<&str> = targets.iter().map(|t| t.id()).collect();

                let mut delivered = 0;
                for m in msgs {
                    let target_ids: Vec<String> = match selector {
                        Some(select) => {
                            let chosen = select(&m.payload.value);
                            let invalid: Vec<String> =
                                chosen.iter().filter(|id| !declared.contains(id.as_str())).cloned().collect();
                            if !invalid.is_empty() {
                                return Err(WorkflowError::Selection {
                                    executor_id: source.id().to_string(),
                                    invalid_targets: invalid,
                                });
                            }
                            chosen
                        }
                        None => targets.iter().map(|t| t.id().to_string()).collect(),
                    };

                    let mut any_delivered = false;
                    for tid in target_ids {
                        if let Some(target) = targets.iter().find(|t| t.id() == tid) {
                            any_delivered = true;
                            dispatches.push(Dispatch {
                                target: target.clone(),
                                payload: m.payload.clone(),
                                source_ids: vec![source.id().to_string()],
                            });
                        }
                    }
                    if any_delivered {
                        delivered += 1;
                    }
                }
                claimed.insert(source.id().to_string(), delivered);
                Ok(RouteOutcome { dispatches, claimed })
            }

            EdgeGroup::SwitchCase { source, cases } => {
                let mut dispatches = Vec::new();
                let mut claimed = HashMap::new();
                let Some(msgs) = messages_by_source.get(source.id()) else {
                    return Ok(RouteOutcome { dispatches, claimed });
                };

                let mut delivered = 0;
                for m in msgs {
                    if let Some(case) = cases.iter().find(|c| c.matches(&m.payload.value)) {
                        delivered += 1;
                        dispatches.push(Dispatch {
                            target: case.target.clone(),
                            payload: m.payload.clone(),
                            source_ids: vec![source.id().to_string()],
                        });
                    }
                }
                claimed.insert(source.id().to_string(), delivered);
                Ok(RouteOutcome { dispatches, claimed })
            }

            EdgeGroup::FanIn { sources, target } => {
                let mut buffer = self.fan_in_buffer.as_ref().expect("fan-in buffer always set for FanIn groups").lock().unwrap();
                let mut claimed = HashMap::new();

                for src in sources {
                    if let Some(msgs) = messages_by_source.get(src.id()) {
                        let queue = buffer.entry(src.id().to_string()).or_default();
                        for m in msgs {
                            queue.push_back(m.clone());
                        }
                        claimed.insert(src.id().to_string(), msgs.len());
                    }
                }

                if !sources.iter().all(|s| buffer.get(s.id()).is_some_and(|q| !q.is_empty())) {
                    return Ok(RouteOutcome { dispatches: Vec::new(), claimed });
                }

                let mut values = Vec::with_capacity(sources.len());
                for src in sources {
                    let message = buffer.get_mut(src.id()).expect("checked all present above").pop_front().expect("checked non-empty above");
                    values.push(message.payload.value);
                }

                let payload = Payload::new(format!("fan_in::{}", target.id()), Value::Array(values));
                Ok(RouteOutcome {
                    dispatches: vec![Dispatch {
                        target: target.clone(),
                        payload,
                        source_ids: sources.iter().map(|s| s.id().to_string()).collect(),
                    }],
                    claimed,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::{Case, Edge};
    use crate::message::Payload;
    use crate::types::PayloadType;
    use serde_json::json;

    fn noop_executor(id: &str) -> Arc<Executor> {
        Arc::new(
            Executor::builder(id)
                .handler(PayloadType::concrete("Any"), vec![], |_v, _ctx| async { Ok(()) })
                .build(),
        )
    }

    fn msg(source: &str, value: Value) -> Message {
        Message::new(Payload::new("T", value), source)
    }

    #[test]
    fn single_edge_drops_message_failing_gate() {
        let a = noop_executor("a");
        let b = noop_executor("b");
        let edge = Edge::new(a.clone(), b.clone()).with_gate(|v| v.get("ok").and_then(Value::as_bool).unwrap_or(false));
        let runner = EdgeRunner::new(EdgeGroup::Single(edge));

        let mut messages = HashMap::new();
        messages.insert("a".to_string(), vec![msg("a", json!({"ok": false}))]);
        assert!(runner.route(&messages).unwrap().dispatches.is_empty());

        messages.insert("a".to_string(), vec![msg("a", json!({"ok": true}))]);
        let dispatches = runner.route(&messages).unwrap().dispatches;
        assert_eq!(dispatches.len(), 1);
        assert_eq!(dispatches[0].target.id(), "b");
    }

    #[test]
    fn fan_out_broadcasts_to_all_targets_without_selector() {
        let source = noop_executor("source");
        let b = noop_executor("b");
        let c = noop_executor("c");
        let runner = EdgeRunner::new(EdgeGroup::FanOut {
            source: source.clone(),
            targets: vec![b, c],
            selector: None,
        });

        let mut messages = HashMap::new();
        messages.insert("source".to_string(), vec![msg("source", json!(1))]);
        let dispatches = runner.route(&messages).unwrap().dispatches;
        assert_eq!(dispatches.len(), 2);
    }

    #[test]
    fn fan_out_selector_rejects_undeclared_targets() {
        let source = noop_executor("source");
        let b = noop_executor("b");
        let runner = EdgeRunner::new(EdgeGroup::FanOut {
            source: source.clone(),
            targets: vec![b],
            selector: Some(Arc::new(|_v| vec!["ghost".to_string()])),
        });

        let mut messages = HashMap::new();
        messages.insert("source".to_string(), vec![msg("source", json!(1))]);
        let result = runner.route(&messages);
        assert!(matches!(result, Err(WorkflowError::Selection { .. })));
    }

    #[test]
    fn switch_case_picks_first_matching_case_in_order() {
        let source = noop_executor("source");
        let negative = noop_executor("negative");
        let zero = noop_executor("zero");
        let positive = noop_executor("positive");
        let cases = vec![
            Case::when(negative.clone(), |v| v.as_i64().unwrap_or(0) < 0),
            Case::when(zero.clone(), |v| v.as_i64().unwrap_or(1) == 0),
            Case::default(positive.clone()),
        ];
        let runner = EdgeRunner::new(EdgeGroup::SwitchCase { source: source.clone(), cases });

        let mut messages = HashMap::new();
        messages.insert("source".to_string(), vec![msg("source", json!(-5))]);
        assert_eq!(runner.route(&messages).unwrap().dispatches[0].target.id(), "negative");

        messages.insert("source".to_string(), vec![msg("source", json!(0))]);
        assert_eq!(runner.route(&messages).unwrap().dispatches[0].target.id(), "zero");

        messages.insert("source".to_string(), vec![msg("source", json!(5))]);
        assert_eq!(runner.route(&messages).unwrap().dispatches[0].target.id(), "positive");
    }

    #[test]
    fn fan_in_waits_for_all_sources_then_assembles_in_declared_order() {
        let x = noop_executor("x");
        let y = noop_executor("y");
        let target = noop_executor("join");
        let runner = EdgeRunner::new(EdgeGroup::FanIn { sources: vec![x, y], target });

        let mut first = HashMap::new();
        first.insert("x".to_string(), vec![msg("x", json!(10))]);
        assert!(runner.route(&first).unwrap().dispatches.is_empty());

        let mut second = HashMap::new();
        second.insert("y".to_string(), vec![msg("y", json!(20))]);
        let dispatches = runner.route(&second).unwrap().dispatches;
        assert_eq!(dispatches.len(), 1);
        assert_eq!(dispatches[0].payload.value, json!([10, 20]));
    }

    #[test]
    fn fan_in_buffers_extras_fifo_when_a_source_fires_twice_before_the_join_fires() {
        let x = noop_executor("x");
        let y = noop_executor("y");
        let target = noop_executor("join");
        let runner = EdgeRunner::new(EdgeGroup::FanIn { sources: vec![x, y], target });

        // x fires twice (10, then 11) before y ever fires once.
        let mut first = HashMap::new();
        first.insert("x".to_string(), vec![msg("x", json!(10)), msg("x", json!(11))]);
        assert!(runner.route(&first).unwrap().dispatches.is_empty());

        // y's first arrival completes the join: it must pair with x's
        // oldest unconsumed message (10), not the newest (11).
        let mut second = HashMap::new();
        second.insert("y".to_string(), vec![msg("y", json!(20))]);
        let first_join = runner.route(&second).unwrap().dispatches;
        assert_eq!(first_join.len(), 1);
        assert_eq!(first_join[0].payload.value, json!([10, 20]));

        // x's buffered extra (11) is still waiting for the next y.
        let mut third = HashMap::new();
        third.insert("y".to_string(), vec![msg("y", json!(21))]);
        let second_join = runner.route(&third).unwrap().dispatches;
        assert_eq!(second_join.len(), 1);
        assert_eq!(second_join[0].payload.value, json!([11, 21]));
    }
}
