//! Compiled representation of path expressions

use crate::eval;
use crate::node::TreeNode;
use crate::slice::SliceSpec;
use regex::Regex;
use std::cmp::Ordering;
use std::fmt;

/// A compiled path expression.
///
/// Immutable once built; a query can be applied to any number of documents,
/// from any number of threads.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    expression: String,
    step: Step,
}

impl Query {
    pub fn new(expression: impl Into<String>, step: Step) -> Self {
        Self {
            expression: expression.into(),
            step,
        }
    }

    /// The expression this query was compiled from
    pub fn as_str(&self) -> &str {
        &self.expression
    }

    /// The first step of the query plan
    pub fn step(&self) -> &Step {
        &self.step
    }

    /// Number of steps in the top-level chain, excluding the final `Identity`
    pub fn step_count(&self) -> usize {
        let mut count = 0;
        let mut step = &self.step;
        while let Some(next) = step.then() {
            count += 1;
            step = next;
        }
        count
    }

    /// Apply the query to a document and return the matching nodes in order
    pub fn find<'n, N: TreeNode>(&self, root: &'n N) -> Vec<&'n N> {
        eval::evaluate(self, root)
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

/// One stage of a query plan, owning the stage that follows it
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Pass the input through
    Identity,
    /// Enter the content of a document node: `$`
    RootAnchor(Box<Step>),
    /// Value of a mapping entry: `.name`
    Child { name: String, then: Box<Step> },
    /// Every value of a mapping: `.*`
    WildcardChildren(Box<Step>),
    /// Selector applied to the input and all its descendants: `..name`, `..*`
    RecursiveDescent {
        selector: DescentSelector,
        then: Box<Step>,
    },
    /// Sequence elements picked by a subscript: `[1:3]`
    IndexSlice { spec: SliceSpec, then: Box<Step> },
    /// Children for which a predicate holds: `[?(@.a == 1)]`
    FilterSelect {
        predicate: Predicate,
        then: Box<Step>,
    },
    /// Nested child lookups: `['a.b']`
    ChainMulti { names: Vec<String>, then: Box<Step> },
}

impl Step {
    /// The step that follows this one, `None` for `Identity`
    pub fn then(&self) -> Option<&Step> {
        match self {
            Step::Identity => None,
            Step::RootAnchor(then) | Step::WildcardChildren(then) => Some(then),
            Step::Child { then, .. }
            | Step::RecursiveDescent { then, .. }
            | Step::IndexSlice { then, .. }
            | Step::FilterSelect { then, .. }
            | Step::ChainMulti { then, .. } => Some(then),
        }
    }
}

/// What a recursive descent selects at each visited node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DescentSelector {
    Named(String),
    Wildcard,
}

/// Boolean filter expression
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// A bare operand: true if a subquery matches anything
    Exists(Operand),
    Not(Box<Predicate>),
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Compare {
        op: Comparator,
        left: Operand,
        right: Operand,
    },
    Matches { operand: Operand, pattern: Pattern },
}

/// An operand of a comparison or match
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Literal(Literal),
    /// A path evaluated from the candidate (`@`) or the document root (`$`)
    Subquery { anchor: Anchor, path: Box<Step> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    /// `@`
    Current,
    /// `$`
    Root,
}

/// Literal values in filter expressions
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    String(String),
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `<`
    Lt,
    /// `<=`
    Le,
}

impl Comparator {
    /// Whether two values ordered as `ordering` satisfy the comparator.
    ///
    /// `None` means the values are unordered, which only `!=` accepts.
    pub fn holds(self, ordering: Option<Ordering>) -> bool {
        let Some(ordering) = ordering else {
            return self == Comparator::Ne;
        };
        match self {
            Comparator::Eq => ordering == Ordering::Equal,
            Comparator::Ne => ordering != Ordering::Equal,
            Comparator::Gt => ordering == Ordering::Greater,
            Comparator::Ge => ordering != Ordering::Less,
            Comparator::Lt => ordering == Ordering::Less,
            Comparator::Le => ordering != Ordering::Greater,
        }
    }
}

/// A compiled regular expression, compared by its source text
#[derive(Debug, Clone)]
pub struct Pattern(Regex);

impl Pattern {
    pub fn new(regex: Regex) -> Self {
        Self(regex)
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.0.is_match(text)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comparator_holds() {
        assert!(Comparator::Eq.holds(Some(Ordering::Equal)));
        assert!(!Comparator::Eq.holds(Some(Ordering::Less)));
        assert!(Comparator::Ge.holds(Some(Ordering::Equal)));
        assert!(Comparator::Ge.holds(Some(Ordering::Greater)));
        assert!(!Comparator::Gt.holds(Some(Ordering::Equal)));
        assert!(Comparator::Le.holds(Some(Ordering::Less)));
        assert!(Comparator::Ne.holds(None));
        assert!(!Comparator::Lt.holds(None));
    }

    #[test]
    fn test_query_display() {
        let query = Query::new("$.a", Step::Identity);
        assert_eq!(query.to_string(), "$.a");
        assert_eq!(query.as_str(), "$.a");
    }

    #[test]
    fn test_step_count() {
        let step = Step::RootAnchor(Box::new(Step::Child {
            name: "a".to_string(),
            then: Box::new(Step::WildcardChildren(Box::new(Step::Identity))),
        }));
        assert_eq!(Query::new("$.a.*", step).step_count(), 3);
        assert_eq!(Query::new("", Step::Identity).step_count(), 0);
    }

    #[test]
    fn test_query_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Query>();
    }
}
