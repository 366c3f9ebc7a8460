//! Static edge topology: who can send to whom, and under what condition.
//!
//! Grounded on the original's `_edge.py`. An [`Edge`] is a single
//! source-to-target link with an optional boolean gate; an [`EdgeGroup`] is
//! how a set of edges sharing a source (or, for fan-in, a set of targets)
//! is actually delivered in one superstep — see [`crate::edge_runner`].

use std::sync::Arc;

use serde_json::Value;

use crate::executor::Executor;

type GateFn = Arc<dyn Fn(&Value) -> bool + Send + Sync>;
/// Chooses a subset of a fan-out's declared targets for a given payload.
/// Returning an id outside the declared target set is a `Selection` error.
type SelectorFn = Arc<dyn Fn(&Value) -> Vec<String> + Send + Sync>;
/// A switch-case predicate: true means this case's target receives the message.
type CaseFn = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// A single directed link between two executors, with an optional gate that
/// must evaluate true for a message to be delivered.
#[derive(Clone)]
pub struct Edge {
    pub source: Arc<Executor>,
    pub target: Arc<Executor>,
    pub gate: Option<GateFn>,
}

impl Edge {
    pub fn new(source: Arc<Executor>, target: Arc<Executor>) -> Self {
        Self { source, target, gate: None }
    }

    pub fn with_gate<F: Fn(&Value) -> bool + Send + Sync + 'static>(mut self, gate: F) -> Self {
        self.gate = Some(Arc::new(gate));
        self
    }

    /// Stable identity used for edge-uniqueness validation:
    /// `"{source}->{target}"`.
    pub fn id(&self) -> String {
        format!("{}->{}", self.source.id(), self.target.id())
    }

    pub fn passes_gate(&self, value: &Value) -> bool {
        self.gate.as_ref().map_or(true, |g| g(value))
    }
}

impl std::fmt::Debug for Edge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Edge")
            .field("source", &self.source.id())
            .field("target", &self.target.id())
            .field("has_gate", &self.gate.is_some())
            .finish()
    }
}

/// One named switch-case branch: a predicate plus its target. The last case
/// in a [`EdgeGroup::SwitchCase`] is the default and should have no
/// predicate (`predicate: None`); `spec.md` §4.3 requires exactly one
/// default, and it should be last — a default anywhere else only produces a
/// validation warning, not an error, since later cases simply become
/// unreachable.
#[derive(Clone)]
pub struct Case {
    pub target: Arc<Executor>,
    pub predicate: Option<CaseFn>,
}

impl Case {
    pub fn when<F: Fn(&Value) -> bool + Send + Sync + 'static>(target: Arc<Executor>, predicate: F) -> Self {
        Self { target, predicate: Some(Arc::new(predicate)) }
    }

    pub fn default(target: Arc<Executor>) -> Self {
        Self { target, predicate: None }
    }

    pub fn is_default(&self) -> bool {
        self.predicate.is_none()
    }

    pub fn matches(&self, value: &Value) -> bool {
        self.predicate.as_ref().map_or(true, |p| p(value))
    }
}

/// How a set of edges sharing topology is delivered within a superstep.
/// See `spec.md` §4.3 for the exact semantics of each variant, implemented
/// in [`crate::edge_runner`].
#[derive(Clone)]
pub enum EdgeGroup {
    /// A single gated edge: deliver if the gate passes, otherwise drop.
    Single(Edge),
    /// Broadcast to every target, or to the subset an optional selector
    /// picks; dispatched concurrently within the superstep.
    FanOut { source: Arc<Executor>, targets: Vec<Arc<Executor>>, selector: Option<SelectorFn> },
    /// Ordered case evaluation; first matching case (or the default) wins.
    /// Exactly one case should have `predicate: None`.
    SwitchCase { source: Arc<Executor>, cases: Vec<Case> },
    /// A synchronized join: `target` only fires once a message has arrived
    /// from every executor in `sources` during the same (or a carried-over)
    /// superstep, assembled in declared-source order.
    FanIn { sources: Vec<Arc<Executor>>, target: Arc<Executor> },
}

impl EdgeGroup {
    pub fn source_ids(&self) -> Vec<String> {
        match self {
            EdgeGroup::Single(edge) => vec![edge.source.id().to_string()],
            EdgeGroup::FanOut { source, .. } => vec![source.id().to_string()],
            EdgeGroup::SwitchCase { source, .. } => vec![source.id().to_string()],
            EdgeGroup::FanIn { sources, .. } => sources.iter().map(|s| s.id().to_string()).collect(),
        }
    }

    pub fn target_ids(&self) -> Vec<String> {
        match self {
            EdgeGroup::Single(edge) => vec![edge.target.id().to_string()],
            EdgeGroup::FanOut { targets, .. } => targets.iter().map(|t| t.id().to_string()).collect(),
            EdgeGroup::SwitchCase { cases, .. } => cases.iter().map(|c| c.target.id().to_string()).collect(),
            EdgeGroup::FanIn { target, .. } => vec![target.id().to_string()],
        }
    }

    /// Whether a given case ordering has exactly one default and, if so,
    /// whether it's last. Used by the validator to raise the
    /// `SwitchCaseDefaultCount` error and the default-ordering warning.
    pub fn switch_case_default_position(cases: &[Case]) -> Option<usize> {
        let defaults: Vec<usize> = cases.iter().enumerate().filter(|(_, c)| c.is_default()).map(|(i, _)| i).collect();
        if defaults.len() == 1 {
            Some(defaults[0])
        } else {
            None
        }
    }
}
