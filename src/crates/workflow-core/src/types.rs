//! Payload type algebra used by handler registration and graph validation.
//!
//! Executors are not open classes with reflectable method signatures the way
//! the original's decorator-based handlers are; a Rust `Executor` declares
//! its accepted and emitted payload shapes up front as [`PayloadType`]
//! values. `assignable` implements the same compatibility rules as the
//! original's `_is_type_compatible`: exact tag equality, `Any` matching
//! everything, unions matching if any (target) / all (source) member
//! matches, and structural recursion into `List`/`Set`/`Tuple`/`Map`.

use std::collections::HashSet;

/// A payload shape as declared by an executor's handler or an edge's
/// validator. `Concrete` wraps the payload's type tag (see
/// [`crate::message::Payload`]); the rest model the generic shapes the
/// original's `typing` introspection had to cope with.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PayloadType {
    /// Matches any payload whatsoever.
    Any,
    /// A single concrete type tag, e.g. `"OrderRequest"`.
    Concrete(String),
    /// Matches if the payload is assignable to any of the given types.
    Union(Vec<PayloadType>),
    /// A homogeneous list of some element type.
    List(Box<PayloadType>),
    /// A homogeneous set of some element type.
    Set(Box<PayloadType>),
    /// A fixed-arity tuple of types, positional.
    Tuple(Vec<PayloadType>),
    /// A homogeneous map from one type to another.
    Map(Box<PayloadType>, Box<PayloadType>),
}

impl PayloadType {
    pub fn concrete(tag: impl Into<String>) -> Self {
        PayloadType::Concrete(tag.into())
    }

    pub fn list_of(elem: PayloadType) -> Self {
        PayloadType::List(Box::new(elem))
    }

    pub fn set_of(elem: PayloadType) -> Self {
        PayloadType::Set(Box::new(elem))
    }

    pub fn map_of(key: PayloadType, value: PayloadType) -> Self {
        PayloadType::Map(Box::new(key), Box::new(value))
    }
}

impl std::fmt::Display for PayloadType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PayloadType::Any => write!(f, "Any"),
            PayloadType::Concrete(tag) => write!(f, "{tag}"),
            PayloadType::Union(members) => {
                let parts: Vec<String> = members.iter().map(|m| m.to_string()).collect();
                write!(f, "Union[{}]", parts.join(", "))
            }
            PayloadType::List(elem) => write!(f, "List[{elem}]"),
            PayloadType::Set(elem) => write!(f, "Set[{elem}]"),
            PayloadType::Tuple(members) => {
                let parts: Vec<String> = members.iter().map(|m| m.to_string()).collect();
                write!(f, "Tuple[{}]", parts.join(", "))
            }
            PayloadType::Map(k, v) => write!(f, "Map[{k}, {v}]"),
        }
    }
}

/// Can a value declared as `source` be delivered to a handler that only
/// accepts `target`? Mirrors `_is_type_compatible` in the original
/// validator: `Any` is universal, unions unwrap on either side, and
/// generic containers recurse arity-matched.
pub fn assignable(source: &PayloadType, target: &PayloadType) -> bool {
    if matches!(target, PayloadType::Any) || matches!(source, PayloadType::Any) {
        return true;
    }
    if source == target {
        return true;
    }

    match (source, target) {
        (_, PayloadType::Union(targets)) => targets.iter().any(|t| assignable(source, t)),
        (PayloadType::Union(sources), _) => sources.iter().all(|s| assignable(s, target)),
        (PayloadType::List(s), PayloadType::List(t)) => assignable(s, t),
        (PayloadType::Set(s), PayloadType::Set(t)) => assignable(s, t),
        (PayloadType::Map(sk, sv), PayloadType::Map(tk, tv)) => assignable(sk, tk) && assignable(sv, tv),
        (PayloadType::Tuple(s), PayloadType::Tuple(t)) => {
            s.len() == t.len() && s.iter().zip(t.iter()).all(|(a, b)| assignable(a, b))
        }
        _ => false,
    }
}

/// Flattens a possibly-nested set of output types down to the distinct tags
/// they could concretely manifest as, for diagnostics. `Any`/generic shapes
/// report themselves verbatim since they have no finite tag set.
pub fn concrete_tags(types: &[PayloadType]) -> HashSet<String> {
    let mut tags = HashSet::new();
    for t in types {
        collect_tags(t, &mut tags);
    }
    tags
}

fn collect_tags(t: &PayloadType, out: &mut HashSet<String>) {
    match t {
        PayloadType::Concrete(tag) => {
            out.insert(tag.clone());
        }
        PayloadType::Union(members) => {
            for m in members {
                collect_tags(m, out);
            }
        }
        other => {
            out.insert(other.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_matches_everything_both_ways() {
        assert!(assignable(&PayloadType::Any, &PayloadType::concrete("Foo")));
        assert!(assignable(&PayloadType::concrete("Foo"), &PayloadType::Any));
    }

    #[test]
    fn exact_concrete_match() {
        assert!(assignable(&PayloadType::concrete("Foo"), &PayloadType::concrete("Foo")));
        assert!(!assignable(&PayloadType::concrete("Foo"), &PayloadType::concrete("Bar")));
    }

    #[test]
    fn union_target_matches_any_member() {
        let target = PayloadType::Union(vec![PayloadType::concrete("A"), PayloadType::concrete("B")]);
        assert!(assignable(&PayloadType::concrete("B"), &target));
        assert!(!assignable(&PayloadType::concrete("C"), &target));
    }

    #[test]
    fn union_source_requires_all_members_assignable() {
        let source = PayloadType::Union(vec![PayloadType::concrete("A"), PayloadType::concrete("B")]);
        let target_ok = PayloadType::Union(vec![PayloadType::concrete("A"), PayloadType::concrete("B")]);
        let target_bad = PayloadType::concrete("A");
        assert!(assignable(&source, &target_ok));
        assert!(!assignable(&source, &target_bad));
    }

    #[test]
    fn list_recurses_into_element_type() {
        let source = PayloadType::list_of(PayloadType::concrete("Item"));
        let target = PayloadType::list_of(PayloadType::concrete("Item"));
        assert!(assignable(&source, &target));
        let mismatched = PayloadType::list_of(PayloadType::concrete("Other"));
        assert!(!assignable(&source, &mismatched));
    }

    #[test]
    fn tuple_requires_same_arity_and_positional_match() {
        let source = PayloadType::Tuple(vec![PayloadType::concrete("A"), PayloadType::concrete("B")]);
        let target = PayloadType::Tuple(vec![PayloadType::concrete("A"), PayloadType::concrete("B")]);
        assert!(assignable(&source, &target));
        let short = PayloadType::Tuple(vec![PayloadType::concrete("A")]);
        assert!(!assignable(&source, &short));
    }
}
