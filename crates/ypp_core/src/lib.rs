//! ypp_core - YAML path query engine core library
//!
//! Compiles path expressions such as `$.spec.containers[*].image` or
//! `$..ports[?(@.port > 8000)]` into reusable [`Query`] values and runs them
//! against any document tree implementing [`TreeNode`].

pub mod ast;
pub mod eval;
pub mod lexer;
pub mod node;
pub mod parser;
pub mod slice;

pub use ast::Query;
pub use node::{Node, NodeKind, TreeNode};

use tracing::debug;

/// Error type for path compilation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Lex(#[from] lexer::LexError),
    #[error(transparent)]
    Compile(#[from] parser::CompileError),
}

/// Compile a path expression into a reusable query
///
/// # Example
/// ```
/// use serde_json::json;
/// use ypp_core::{Node, TreeNode, compile};
///
/// let doc = Node::document_from_json(&json!({"a": {"b": [10, 20, 30]}}));
/// let query = compile("$.a.b[1:]").unwrap();
/// let values: Vec<&str> = query.find(&doc).iter().map(|n| n.value()).collect();
/// assert_eq!(values, vec!["20", "30"]);
/// ```
pub fn compile(expression: &str) -> Result<Query, Error> {
    match parser::Parser::parse(expression) {
        Ok(query) => {
            debug!(expression, steps = query.step_count(), "compiled path");
            Ok(query)
        }
        Err(e) => {
            debug!(expression, error = %e, "path compilation failed");
            Err(e)
        }
    }
}

/// Compile `expression` and run it against `root`
pub fn query<'n, N: TreeNode>(expression: &str, root: &'n N) -> Result<Vec<&'n N>, Error> {
    let query = compile(expression)?;
    Ok(query.find(root))
}
