//! Compiler from path expressions to query plans

use crate::Error;
use crate::ast::{Anchor, Comparator, DescentSelector, Literal, Operand, Pattern, Predicate, Query, Step};
use crate::lexer::{Lexer, Token, TokenKind};
use crate::slice::{SliceError, SliceSpec};
use regex::Regex;

/// Compile error: the token stream is not a valid path
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct CompileError {
    pub message: String,
    /// Byte offset of the offending token, when known
    pub position: Option<usize>,
}

impl CompileError {
    fn at(message: &str, token: &Token<'_>) -> Self {
        Self {
            message: format!(
                "{message} at position {}, near {:?}",
                token.position, token.text
            ),
            position: Some(token.position),
        }
    }
}

impl From<SliceError> for CompileError {
    fn from(e: SliceError) -> Self {
        Self {
            message: format!("invalid array subscript: {e}"),
            position: None,
        }
    }
}

/// Deepest nesting of path segments, parentheses, negations and logical
/// operands accepted before compilation is refused
pub const MAX_DEPTH: usize = 128;

/// Recursive-descent compiler pulling tokens from a [`Lexer`] on demand
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    peeked: Option<Token<'a>>,
    depth: usize,
}

impl<'a> Parser<'a> {
    pub fn new(lexer: Lexer<'a>) -> Self {
        Self {
            lexer,
            peeked: None,
            depth: 0,
        }
    }

    /// Compile a path expression
    pub fn parse(expression: &str) -> Result<Query, Error> {
        let mut parser = Parser::new(Lexer::new(expression));
        let step = parser.parse_path()?;
        parser.expect_end()?;
        Ok(Query::new(expression, step))
    }

    fn peek(&mut self) -> Result<Token<'a>, Error> {
        if let Some(token) = self.peeked {
            return Ok(token);
        }
        let token = self.lexer.next_token()?;
        self.peeked = Some(token);
        Ok(token)
    }

    fn advance(&mut self) -> Result<Token<'a>, Error> {
        match self.peeked.take() {
            Some(token) => Ok(token),
            None => Ok(self.lexer.next_token()?),
        }
    }

    /// Go one level deeper, failing once the nesting limit is passed
    fn enter(&mut self) -> Result<(), Error> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            let token = self.peek()?;
            return Err(CompileError::at("expression nested too deeply", &token).into());
        }
        Ok(())
    }

    fn leave(&mut self, levels: usize) {
        self.depth = self.depth.saturating_sub(levels);
    }

    fn expect_end(&mut self) -> Result<(), Error> {
        let token = self.advance()?;
        if token.kind != TokenKind::EndOfInput {
            return Err(CompileError::at("invalid path syntax", &token).into());
        }
        Ok(())
    }

    // ========== Paths ==========

    /// Parse a path up to the first token that cannot continue it.
    ///
    /// The terminating token is left in place for the caller.
    fn parse_path(&mut self) -> Result<Step, Error> {
        self.enter()?;
        let step = self.parse_segment();
        self.leave(1);
        step
    }

    fn parse_segment(&mut self) -> Result<Step, Error> {
        let token = self.peek()?;
        match token.kind {
            TokenKind::Identity => {
                self.advance()?;
                Ok(Step::Identity)
            }
            TokenKind::Root => {
                self.advance()?;
                let then = self.parse_path()?;
                Ok(Step::RootAnchor(Box::new(then)))
            }
            TokenKind::RecursiveDescent => {
                self.advance()?;
                let name = token.text.strip_prefix("..").unwrap_or(token.text);
                let selector = if name == "*" {
                    DescentSelector::Wildcard
                } else {
                    DescentSelector::Named(name.to_string())
                };
                let then = Box::new(self.parse_path()?);
                Ok(Step::RecursiveDescent { selector, then })
            }
            TokenKind::DotChild => {
                self.advance()?;
                let name = token.text.strip_prefix('.').unwrap_or(token.text);
                let then = self.parse_path()?;
                Ok(child(name, then))
            }
            TokenKind::UndottedChild => {
                self.advance()?;
                let then = self.parse_path()?;
                Ok(child(token.text, then))
            }
            TokenKind::BracketChild => {
                self.advance()?;
                let names = token
                    .text
                    .strip_prefix("['")
                    .and_then(|s| s.strip_suffix("']"))
                    .unwrap_or(token.text);
                let then = self.parse_path()?;
                if !names.contains('.') {
                    return Ok(child(names, then));
                }
                Ok(Step::ChainMulti {
                    names: names.split('.').map(str::to_string).collect(),
                    then: Box::new(then),
                })
            }
            TokenKind::ArraySubscript => {
                self.advance()?;
                let subscript = token
                    .text
                    .strip_prefix('[')
                    .and_then(|s| s.strip_suffix(']'))
                    .unwrap_or(token.text);
                let spec = SliceSpec::parse(subscript).map_err(CompileError::from)?;
                let then = Box::new(self.parse_path()?);
                Ok(Step::IndexSlice { spec, then })
            }
            TokenKind::FilterBegin => {
                self.advance()?;
                let predicate = self.parse_or()?;
                let end = self.advance()?;
                if end.kind != TokenKind::FilterEnd {
                    return Err(CompileError::at("invalid filter syntax", &end).into());
                }
                let then = Box::new(self.parse_path()?);
                Ok(Step::FilterSelect { predicate, then })
            }
            _ => Ok(Step::Identity),
        }
    }

    // ========== Filter Expressions ==========

    /// Parse logical OR expression: expr || expr
    fn parse_or(&mut self) -> Result<Predicate, Error> {
        let mut left = self.parse_and()?;
        let mut levels = 0;

        while self.peek()?.kind == TokenKind::Or {
            self.advance()?;
            self.enter()?;
            levels += 1;
            let right = self.parse_and()?;
            left = Predicate::Or(Box::new(left), Box::new(right));
        }

        self.leave(levels);
        Ok(left)
    }

    /// Parse logical AND expression: expr && expr
    fn parse_and(&mut self) -> Result<Predicate, Error> {
        let mut left = self.parse_unary()?;
        let mut levels = 0;

        while self.peek()?.kind == TokenKind::And {
            self.advance()?;
            self.enter()?;
            levels += 1;
            let right = self.parse_unary()?;
            left = Predicate::And(Box::new(left), Box::new(right));
        }

        self.leave(levels);
        Ok(left)
    }

    /// Parse `!expr`, `(expr)` or a relation
    fn parse_unary(&mut self) -> Result<Predicate, Error> {
        self.enter()?;
        let predicate = self.parse_negation_or_group();
        self.leave(1);
        predicate
    }

    fn parse_negation_or_group(&mut self) -> Result<Predicate, Error> {
        let token = self.peek()?;
        match token.kind {
            TokenKind::Not => {
                self.advance()?;
                let inner = self.parse_unary()?;
                Ok(Predicate::Not(Box::new(inner)))
            }
            TokenKind::FilterOpenParen => {
                self.advance()?;
                let inner = self.parse_or()?;
                let close = self.advance()?;
                if close.kind != TokenKind::FilterCloseParen {
                    return Err(CompileError::at("missing ) in filter", &close).into());
                }
                Ok(inner)
            }
            _ => self.parse_relation(),
        }
    }

    /// Parse `operand`, `operand op operand` or `operand =~ /regex/`
    fn parse_relation(&mut self) -> Result<Predicate, Error> {
        let left = self.parse_operand()?;

        let token = self.peek()?;
        if let Some(op) = comparator(token.kind) {
            self.advance()?;
            let right = self.parse_operand()?;
            return Ok(Predicate::Compare { op, left, right });
        }

        if token.kind == TokenKind::RegexMatch {
            self.advance()?;
            let literal = self.advance()?;
            if literal.kind != TokenKind::RegexLiteral {
                return Err(CompileError::at("missing regular expression", &literal).into());
            }
            let regex = Regex::new(&literal.literal_value())
                .map_err(|e| CompileError::at(&format!("invalid regular expression: {e}"), &literal))?;
            return Ok(Predicate::Matches {
                operand: left,
                pattern: Pattern::new(regex),
            });
        }

        Ok(Predicate::Exists(left))
    }

    fn parse_operand(&mut self) -> Result<Operand, Error> {
        let token = self.advance()?;
        match token.kind {
            TokenKind::At => {
                let path = self.parse_path()?;
                Ok(Operand::Subquery {
                    anchor: Anchor::Current,
                    path: Box::new(path),
                })
            }
            TokenKind::Root => {
                let path = self.parse_path()?;
                Ok(Operand::Subquery {
                    anchor: Anchor::Root,
                    path: Box::new(Step::RootAnchor(Box::new(path))),
                })
            }
            TokenKind::IntLiteral => {
                let value = token
                    .text
                    .parse()
                    .map_err(|_| CompileError::at("invalid integer literal", &token))?;
                Ok(Operand::Literal(Literal::Int(value)))
            }
            TokenKind::FloatLiteral => {
                let value = token
                    .text
                    .parse()
                    .map_err(|_| CompileError::at("invalid float literal", &token))?;
                Ok(Operand::Literal(Literal::Float(value)))
            }
            TokenKind::StringLiteral => Ok(Operand::Literal(Literal::String(
                token.literal_value().into_owned(),
            ))),
            _ => Err(CompileError::at("missing filter operand", &token).into()),
        }
    }
}

fn child(name: &str, then: Step) -> Step {
    if name == "*" {
        Step::WildcardChildren(Box::new(then))
    } else {
        Step::Child {
            name: name.to_string(),
            then: Box::new(then),
        }
    }
}

fn comparator(kind: TokenKind) -> Option<Comparator> {
    match kind {
        TokenKind::Eq => Some(Comparator::Eq),
        TokenKind::Ne => Some(Comparator::Ne),
        TokenKind::Gt => Some(Comparator::Gt),
        TokenKind::Ge => Some(Comparator::Ge),
        TokenKind::Lt => Some(Comparator::Lt),
        TokenKind::Le => Some(Comparator::Le),
        _ => None,
    }
}
