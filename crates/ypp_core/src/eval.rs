//! Evaluator for compiled queries

use crate::ast::{Anchor, Comparator, DescentSelector, Literal, Operand, Predicate, Query, Step};
use crate::node::{NodeKind, TreeNode};
use smallvec::SmallVec;

/// Apply a query to a document root, returning matches in document order
pub fn evaluate<'n, N: TreeNode>(query: &Query, root: &'n N) -> Vec<&'n N> {
    let mut results = Vec::new();
    apply(query.step(), root, root, &mut results);
    results
}

fn apply<'n, N: TreeNode>(step: &Step, node: &'n N, root: &'n N, out: &mut Vec<&'n N>) {
    match step {
        Step::Identity => out.push(node),
        Step::RootAnchor(then) => {
            let content = node
                .content()
                .first()
                .filter(|_| node.kind() == NodeKind::Document);
            if let Some(content) = content {
                apply(then, content, root, out);
            }
        }
        Step::Child { name, then } => {
            if let Some(value) = child(node, name) {
                apply(then, value, root, out);
            }
        }
        Step::WildcardChildren(then) => {
            for value in mapping_values(node) {
                apply(then, value, root, out);
            }
        }
        Step::RecursiveDescent { selector, then } => {
            for descendant in collect_descendants(node) {
                match selector {
                    DescentSelector::Named(name) => {
                        if let Some(value) = child(descendant, name) {
                            apply(then, value, root, out);
                        }
                    }
                    DescentSelector::Wildcard => {
                        for value in children(descendant) {
                            apply(then, value, root, out);
                        }
                    }
                }
            }
        }
        Step::IndexSlice { spec, then } => {
            if node.kind() == NodeKind::Sequence {
                let elements = node.content();
                for index in spec.resolve(elements.len()) {
                    if let Some(element) = elements.get(index) {
                        apply(then, element, root, out);
                    }
                }
            }
        }
        Step::FilterSelect { predicate, then } => {
            for candidate in children(node) {
                if holds(predicate, candidate, root) {
                    apply(then, candidate, root, out);
                }
            }
        }
        Step::ChainMulti { names, then } => chain(names, then, node, root, out),
    }
}

/// Follow `names` one mapping level each, `*` taking every value
fn chain<'n, N: TreeNode>(
    names: &[String],
    then: &Step,
    node: &'n N,
    root: &'n N,
    out: &mut Vec<&'n N>,
) {
    let Some((name, rest)) = names.split_first() else {
        apply(then, node, root, out);
        return;
    };
    if name == "*" {
        for value in mapping_values(node) {
            chain(rest, then, value, root, out);
        }
    } else if let Some(value) = child(node, name) {
        chain(rest, then, value, root, out);
    }
}

/// Value of the first mapping entry whose key is the scalar `name`
fn child<'n, N: TreeNode>(node: &'n N, name: &str) -> Option<&'n N> {
    if node.kind() != NodeKind::Mapping {
        return None;
    }
    node.content()
        .chunks_exact(2)
        .find_map(|entry| match entry {
            [key, value] if key.kind() == NodeKind::Scalar && key.value() == name => Some(value),
            _ => None,
        })
}

fn mapping_values<'n, N: TreeNode>(node: &'n N) -> impl Iterator<Item = &'n N> {
    let values = match node.kind() {
        NodeKind::Mapping => node.content(),
        _ => &[][..],
    };
    values.iter().skip(1).step_by(2)
}

/// Mapping values or sequence elements
fn children<'n, N: TreeNode>(node: &'n N) -> impl Iterator<Item = &'n N> {
    let (content, stride) = match node.kind() {
        NodeKind::Mapping => (node.content(), 2),
        NodeKind::Sequence => (node.content(), 1),
        _ => (&[][..], 1),
    };
    content.iter().skip(stride - 1).step_by(stride)
}

/// The node and everything below it in pre-order, skipping mapping keys
fn collect_descendants<N: TreeNode>(node: &N) -> Vec<&N> {
    let mut results = Vec::new();
    let mut stack = vec![node];

    while let Some(current) = stack.pop() {
        results.push(current);
        match current.kind() {
            NodeKind::Mapping => {
                let values: SmallVec<[&N; 16]> = mapping_values(current).collect();
                stack.extend(values.into_iter().rev());
            }
            NodeKind::Sequence | NodeKind::Document => {
                stack.extend(current.content().iter().rev());
            }
            NodeKind::Scalar => {}
        }
    }
    results
}

// ========== Filters ==========

/// A comparable value taken from a literal or a matched scalar
#[derive(Debug, Clone, Copy, PartialEq)]
enum Value<'a> {
    Int(i64),
    Float(f64),
    Text(&'a str),
}

impl<'a> Value<'a> {
    fn from_literal(literal: &'a Literal) -> Self {
        match literal {
            Literal::Int(i) => Value::Int(*i),
            Literal::Float(f) => Value::Float(*f),
            Literal::String(s) => Value::Text(s),
        }
    }

    /// Type scalar text: integer, then finite float, else text
    fn from_scalar(text: &'a str) -> Self {
        if let Ok(i) = text.parse::<i64>() {
            return Value::Int(i);
        }
        match text.parse::<f64>() {
            Ok(f) if f.is_finite() => Value::Float(f),
            _ => Value::Text(text),
        }
    }

    fn as_f64(self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(i as f64),
            Value::Float(f) => Some(f),
            Value::Text(_) => None,
        }
    }
}

fn satisfies(op: Comparator, left: Value<'_>, right: Value<'_>) -> bool {
    match (left, right) {
        (Value::Text(l), Value::Text(r)) => match op {
            Comparator::Eq => l == r,
            Comparator::Ne => l != r,
            _ => false,
        },
        (Value::Text(_), _) | (_, Value::Text(_)) => op == Comparator::Ne,
        (Value::Int(l), Value::Int(r)) => op.holds(Some(l.cmp(&r))),
        (l, r) => {
            let ordering = match (l.as_f64(), r.as_f64()) {
                (Some(l), Some(r)) => l.partial_cmp(&r),
                _ => None,
            };
            op.holds(ordering)
        }
    }
}

/// Whether `predicate` holds for one filter candidate
fn holds<N: TreeNode>(predicate: &Predicate, current: &N, root: &N) -> bool {
    match predicate {
        Predicate::Exists(Operand::Literal(_)) => true,
        Predicate::Exists(Operand::Subquery { anchor, path }) => {
            !subquery(*anchor, path, current, root).is_empty()
        }
        Predicate::Not(inner) => !holds(inner, current, root),
        Predicate::And(left, right) => holds(left, current, root) && holds(right, current, root),
        Predicate::Or(left, right) => holds(left, current, root) || holds(right, current, root),
        Predicate::Compare { op, left, right } => {
            let left = values(left, current, root);
            if left.is_empty() {
                return false;
            }
            let right = values(right, current, root);
            left.iter()
                .any(|&l| right.iter().any(|&r| satisfies(*op, l, r)))
        }
        Predicate::Matches { operand, pattern } => match operand {
            Operand::Literal(Literal::String(s)) => pattern.is_match(s),
            Operand::Literal(Literal::Int(i)) => pattern.is_match(&i.to_string()),
            Operand::Literal(Literal::Float(f)) => pattern.is_match(&f.to_string()),
            Operand::Subquery { anchor, path } => subquery(*anchor, path, current, root)
                .iter()
                .any(|node| node.kind() == NodeKind::Scalar && pattern.is_match(node.value())),
        },
    }
}

fn subquery<'n, N: TreeNode>(
    anchor: Anchor,
    path: &Step,
    current: &'n N,
    root: &'n N,
) -> Vec<&'n N> {
    let start = match anchor {
        Anchor::Current => current,
        Anchor::Root => root,
    };
    let mut results = Vec::new();
    apply(path, start, root, &mut results);
    results
}

/// Comparable values of an operand; non-scalar matches contribute none
fn values<'a, N: TreeNode>(
    operand: &'a Operand,
    current: &'a N,
    root: &'a N,
) -> SmallVec<[Value<'a>; 4]> {
    match operand {
        Operand::Literal(literal) => smallvec::smallvec![Value::from_literal(literal)],
        Operand::Subquery { anchor, path } => subquery(*anchor, path, current, root)
            .into_iter()
            .filter(|node| node.kind() == NodeKind::Scalar)
            .map(|node| Value::from_scalar(node.value()))
            .collect(),
    }
}
