//! Lexer for path expressions
//!
//! The lexer is a state machine with an explicit stack of continuation
//! states. Path segments and filter expressions are two grammars that nest
//! inside each other (`$.a[?(@.b[?(@.c == 1)] == 2)]`): entering a nested
//! grammar pushes the state to resume, and the nested grammar pops it when it
//! reaches a delimiter it cannot consume.
//!
//! Tokens are produced on demand, one [`Lexer::next_token`] call at a time.

use crate::slice::{SliceError, SliceSpec};
use regex::Regex;
use smallvec::SmallVec;
use std::borrow::Cow;
use std::collections::VecDeque;
use thiserror::Error;
use tracing::trace;

/// Token types for path expressions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// Empty remainder of a path
    Identity,
    /// Root `$` (explicit or implied)
    Root,
    /// `.name`
    DotChild,
    /// `name` at the start of an expression without `$`
    UndottedChild,
    /// `['name']`
    BracketChild,
    /// `..name`
    RecursiveDescent,
    /// `[1:3]`, `[*]`, `[0,2]`
    ArraySubscript,
    /// `[?(`
    FilterBegin,
    /// `)]`
    FilterEnd,
    /// `(` inside a filter
    FilterOpenParen,
    /// `)` inside a filter
    FilterCloseParen,
    /// `!`
    Not,
    /// `@`
    At,
    /// `&&`
    And,
    /// `||`
    Or,
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
    /// `=~`
    RegexMatch,
    IntLiteral,
    FloatLiteral,
    StringLiteral,
    RegexLiteral,
    /// Lexing complete
    EndOfInput,
}

impl TokenKind {
    pub fn is_literal(self) -> bool {
        matches!(
            self,
            TokenKind::IntLiteral | TokenKind::FloatLiteral | TokenKind::StringLiteral
        )
    }
}

/// A token and the source text it was scanned from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    /// Exact source slice, delimiters included
    pub text: &'a str,
    /// Byte offset of the token in the expression
    pub position: usize,
}

impl<'a> Token<'a> {
    /// The value of a string or regex literal with its delimiters removed.
    ///
    /// Escaped regex delimiters (`\/`) are unescaped. Other tokens return
    /// their text unchanged.
    pub fn literal_value(&self) -> Cow<'a, str> {
        match self.kind {
            TokenKind::StringLiteral => Cow::Borrowed(strip_delimiters(self.text)),
            TokenKind::RegexLiteral => sanitise_regex(self.text),
            _ => Cow::Borrowed(self.text),
        }
    }
}

fn strip_delimiters(text: &str) -> &str {
    text.len()
        .checked_sub(1)
        .and_then(|end| text.get(1..end))
        .unwrap_or("")
}

fn sanitise_regex(text: &str) -> Cow<'_, str> {
    let inner = strip_delimiters(text);
    if inner.contains(REGEX_ESCAPED_DELIMITER) {
        Cow::Owned(inner.replace(REGEX_ESCAPED_DELIMITER, REGEX_DELIMITER))
    } else {
        Cow::Borrowed(inner)
    }
}

/// Lexer error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct LexError {
    pub message: String,
    /// Byte offset at which scanning stopped
    pub position: usize,
}

const ROOT: &str = "$";
const DOT: &str = ".";
const LEFT_BRACKET: &str = "[";
const RIGHT_BRACKET: &str = "]";
const BRACKET_QUOTE: &str = "['";
const QUOTE_BRACKET: &str = "']";
const FILTER_BEGIN: &str = "[?(";
const FILTER_END: &str = ")]";
const FILTER_OPEN_PAREN: &str = "(";
const FILTER_CLOSE_PAREN: &str = ")";
const FILTER_NOT: &str = "!";
const FILTER_AT: &str = "@";
const FILTER_AND: &str = "&&";
const FILTER_OR: &str = "||";
const FILTER_EQ: &str = "==";
const FILTER_NE: &str = "!=";
const FILTER_REGEX_MATCH: &str = "=~";
const RECURSIVE_DESCENT: &str = "..";
const REGEX_DELIMITER: &str = "/";
const REGEX_ESCAPE: &str = "\\";
const REGEX_ESCAPED_DELIMITER: &str = "\\/";
const STRING_DELIMITERS: [char; 2] = ['\'', '"'];

/// Ordering operators, longest first so `>=` is tried before `>`
const ORDERING_OPERATORS: [(&str, TokenKind); 4] = [
    (">=", TokenKind::Ge),
    (">", TokenKind::Gt),
    ("<=", TokenKind::Le),
    ("<", TokenKind::Lt),
];

/// Characters ending a recursive descent child name
const DESCENT_NAME_STOP: &[char] = &['.', '['];

/// Characters ending a dotted or undotted child name
const CHILD_NAME_STOP: &[char] = &['.', '[', ')', ' ', '&', '|', '=', '!', '>', '<'];

/// Characters after a path that hand control back to an enclosing filter
const FILTER_DELIMITERS: &[char] = &[' ', '&', '|', '=', '!', '>', '<'];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Path,
    SubPath,
    OptionalArrayIndex,
    FilterInitial,
    FilterExpr,
    FilterTerm,
    FilterEnd,
    Done,
}

/// Pull-based lexer for path expressions
pub struct Lexer<'a> {
    input: &'a str,
    /// Start of the token being scanned
    start: usize,
    /// Current scan position
    pos: usize,
    state: State,
    stack: SmallVec<[State; 8]>,
    pending: VecDeque<Result<Token<'a>, LexError>>,
    last_emitted_start: usize,
    /// Kind of the last emitted token, `None` until one is emitted
    last_emitted: Option<TokenKind>,
    /// Set once the iterator has yielded `EndOfInput` or an error
    exhausted: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            start: 0,
            pos: 0,
            state: State::Path,
            stack: SmallVec::new(),
            pending: VecDeque::with_capacity(2),
            last_emitted_start: 0,
            last_emitted: None,
            exhausted: false,
        }
    }

    /// Tokenize the entire input, up to and including `EndOfInput`
    pub fn tokenize(self) -> Result<Vec<Token<'a>>, LexError> {
        self.collect()
    }

    /// Scan until the next token is available.
    ///
    /// Once lexing is complete, every call returns `EndOfInput`.
    pub fn next_token(&mut self) -> Result<Token<'a>, LexError> {
        loop {
            if let Some(item) = self.pending.pop_front() {
                return item;
            }
            if self.state == State::Done {
                return Ok(Token {
                    kind: TokenKind::EndOfInput,
                    text: "",
                    position: self.pos,
                });
            }
            trace!(state = ?self.state, position = self.pos, "lexer state");
            self.state = match self.run(self.state) {
                Ok(next) => next,
                Err(e) => {
                    self.pending.push_back(Err(e));
                    State::Done
                }
            };
        }
    }

    fn run(&mut self, state: State) -> Result<State, LexError> {
        match state {
            State::Path => self.lex_path(),
            State::SubPath => self.lex_sub_path(),
            State::OptionalArrayIndex => self.lex_optional_array_index(),
            State::FilterInitial => self.lex_filter_initial(),
            State::FilterExpr => self.lex_filter_expr(),
            State::FilterTerm => self.lex_filter_term(),
            State::FilterEnd => self.lex_filter_end(),
            State::Done => Ok(State::Done),
        }
    }

    // ========== States ==========

    fn lex_path(&mut self) -> Result<State, LexError> {
        if self.is_empty() {
            self.emit(TokenKind::Identity);
            self.emit(TokenKind::EndOfInput);
            return Ok(State::Done);
        }
        if self.consumed(ROOT, &[]) {
            self.emit(TokenKind::Root);
            return Ok(State::SubPath);
        }

        // An expression without `$` is rooted all the same.
        self.emit_synthetic(TokenKind::Root, ROOT);
        Ok(State::SubPath)
    }

    fn lex_sub_path(&mut self) -> Result<State, LexError> {
        if self.has_prefix(FILTER_CLOSE_PAREN) {
            return self.pop();
        }

        if self.is_empty() {
            if !self.stack.is_empty() {
                return self.pop();
            }
            self.emit(TokenKind::Identity);
            self.emit(TokenKind::EndOfInput);
            return Ok(State::Done);
        }

        if self.consumed(RECURSIVE_DESCENT, &[]) {
            if !self.scan_name(DESCENT_NAME_STOP) {
                return Err(self.error("child name missing"));
            }
            self.emit(TokenKind::RecursiveDescent);
            return Ok(State::SubPath);
        }

        if self.consumed(DOT, &[]) {
            if !self.scan_name(CHILD_NAME_STOP) {
                return Err(self.error("child name missing"));
            }
            self.emit(TokenKind::DotChild);
            return Ok(State::OptionalArrayIndex);
        }

        if self.consumed(BRACKET_QUOTE, &[]) {
            let mut named = false;
            loop {
                if self.consumed(QUOTE_BRACKET, &[]) {
                    break;
                }
                if self.next_char().is_none() {
                    return Err(self.error("unmatched ['"));
                }
                named = true;
            }
            if !named {
                return Err(self.raw_error(format!(
                    "child name missing from [''] before position {}",
                    self.pos
                )));
            }
            self.emit(TokenKind::BracketChild);
            return Ok(State::OptionalArrayIndex);
        }

        if self.consumed(FILTER_BEGIN, &[]) {
            self.emit(TokenKind::FilterBegin);
            self.push(State::FilterEnd);
            return Ok(State::FilterInitial);
        }

        if self.has_prefix(LEFT_BRACKET) {
            return Ok(State::OptionalArrayIndex);
        }

        if self.last_emitted.is_none() {
            if !self.scan_name(CHILD_NAME_STOP) {
                return Err(self.error("child name missing"));
            }
            self.emit(TokenKind::UndottedChild);
            return Ok(State::OptionalArrayIndex);
        }

        // A subquery such as `@` or `@.a[?(...)]` ends where the enclosing
        // filter continues.
        if !self.stack.is_empty() && self.peek().is_some_and(|c| FILTER_DELIMITERS.contains(&c)) {
            return self.pop();
        }

        Err(self.error("invalid path syntax"))
    }

    fn lex_optional_array_index(&mut self) -> Result<State, LexError> {
        if self.consumed(LEFT_BRACKET, &[BRACKET_QUOTE, FILTER_BEGIN]) {
            let mut subscript = false;
            loop {
                if self.consumed(RIGHT_BRACKET, &[]) {
                    break;
                }
                if self.next_char().is_none() {
                    return Err(self.error("unmatched ["));
                }
                subscript = true;
            }
            if !subscript {
                return Err(self.raw_error(format!(
                    "subscript missing from [] before position {}",
                    self.pos
                )));
            }
            self.validate_array_index()?;
            self.emit(TokenKind::ArraySubscript);
        }

        match self.peek() {
            Some(c) if FILTER_DELIMITERS.contains(&c) => {
                if self.stack.is_empty() {
                    return Err(self.error(&format!("invalid character {c:?}")));
                }
                self.pop()
            }
            _ => Ok(State::SubPath),
        }
    }

    fn lex_filter_initial(&mut self) -> Result<State, LexError> {
        self.strip_whitespace();

        if self.numeric_literal()? || self.string_literal()? {
            return Ok(State::FilterExpr);
        }

        if self.consumed(FILTER_OPEN_PAREN, &[]) {
            self.emit(TokenKind::FilterOpenParen);
            self.push(State::FilterExpr);
            return Ok(State::FilterInitial);
        }

        if self.has_prefix(FILTER_NE) {
            return Err(self.missing_first_operand(FILTER_NE));
        }

        if self.consumed(FILTER_NOT, &[]) {
            self.emit(TokenKind::Not);
            return Ok(State::FilterInitial);
        }

        if self.consumed(FILTER_AT, &[]) {
            self.emit(TokenKind::At);
            self.push(State::FilterExpr);
            return Ok(State::SubPath);
        }

        if self.consumed(ROOT, &[]) {
            self.emit(TokenKind::Root);
            self.push(State::FilterExpr);
            return Ok(State::SubPath);
        }

        for operator in [FILTER_AND, FILTER_OR, FILTER_EQ] {
            if self.has_prefix(operator) {
                return Err(self.missing_first_operand(operator));
            }
        }
        for (operator, _) in ORDERING_OPERATORS {
            if self.has_prefix(operator) {
                return Err(self.missing_first_operand(operator));
            }
        }

        self.pop()
    }

    fn lex_filter_expr(&mut self) -> Result<State, LexError> {
        self.strip_whitespace();

        if self.is_empty() {
            return Err(self.error("missing end of filter"));
        }

        // Left for the popped state to consume.
        if self.has_prefix(FILTER_END) {
            return self.pop();
        }

        if self.consumed(FILTER_CLOSE_PAREN, &[]) {
            self.emit(TokenKind::FilterCloseParen);
            return self.pop();
        }

        if self.consumed(FILTER_AND, &[]) {
            self.emit(TokenKind::And);
            self.strip_whitespace();
            return Ok(State::FilterInitial);
        }

        if self.consumed(FILTER_OR, &[]) {
            self.emit(TokenKind::Or);
            self.strip_whitespace();
            return Ok(State::FilterInitial);
        }

        if self.consumed(FILTER_EQ, &[]) {
            self.emit(TokenKind::Eq);
            self.push(State::FilterExpr);
            return Ok(State::FilterTerm);
        }

        if self.consumed(FILTER_NE, &[]) {
            self.emit(TokenKind::Ne);
            self.push(State::FilterExpr);
            return Ok(State::FilterTerm);
        }

        if self.has_prefix(FILTER_REGEX_MATCH) {
            if self.last_emitted.is_some_and(TokenKind::is_literal) {
                return Err(self.error(&format!(
                    "literal cannot be matched using {FILTER_REGEX_MATCH}"
                )));
            }
            self.consume(FILTER_REGEX_MATCH);
            self.emit(TokenKind::RegexMatch);
            self.strip_whitespace();
            self.regex_literal()?;
            return Ok(State::FilterExpr);
        }

        for (operator, kind) in ORDERING_OPERATORS {
            if self.has_prefix(operator) {
                return self.lex_comparison(operator, kind);
            }
        }

        Err(self.error("invalid filter expression"))
    }

    fn lex_filter_term(&mut self) -> Result<State, LexError> {
        self.strip_whitespace();

        if self.consumed(FILTER_AT, &[]) {
            self.emit(TokenKind::At);
            return Ok(State::SubPath);
        }

        if self.consumed(ROOT, &[]) {
            self.emit(TokenKind::Root);
            return Ok(State::SubPath);
        }

        if self.numeric_literal()? || self.string_literal()? {
            return Ok(State::FilterExpr);
        }

        Err(self.error("invalid filter term"))
    }

    fn lex_filter_end(&mut self) -> Result<State, LexError> {
        if self.has_prefix(FILTER_END) {
            if self.last_emitted == Some(TokenKind::FilterBegin) {
                return Err(self.error("missing filter"));
            }
            self.consume(FILTER_END);
            self.emit(TokenKind::FilterEnd);
            return Ok(State::SubPath);
        }

        Err(self.error("invalid filter syntax"))
    }

    fn lex_comparison(&mut self, operator: &str, kind: TokenKind) -> Result<State, LexError> {
        if self.last_emitted == Some(TokenKind::StringLiteral) {
            return Err(self.error(&format!("strings cannot be compared using {operator}")));
        }
        self.consume(operator);
        self.emit(kind);

        self.strip_whitespace();
        if self.peek().is_some_and(|c| STRING_DELIMITERS.contains(&c)) {
            return Err(self.error(&format!("strings cannot be compared using {operator}")));
        }

        self.push(State::FilterExpr);
        Ok(State::FilterTerm)
    }

    // ========== Literals ==========

    /// Scan an integer or float literal if one starts here
    fn numeric_literal(&mut self) -> Result<bool, LexError> {
        let Some(first) = self.peek() else {
            return Ok(false);
        };
        if !(first == '.' || first == '-' || first.is_ascii_digit()) {
            return Ok(false);
        }

        let mut float = first == '.';
        self.next_char();
        while let Some(c) = self.peek() {
            if c == '.' {
                float = true;
            } else if !c.is_ascii_digit() {
                break;
            }
            self.next_char();
        }

        let literal = self.value();
        if float {
            if let Err(e) = literal.parse::<f64>() {
                return Err(self.raw_error(format!(
                    "invalid float literal {literal:?}: {e} before position {}",
                    self.pos
                )));
            }
            self.emit(TokenKind::FloatLiteral);
        } else {
            if let Err(e) = literal.parse::<i64>() {
                return Err(self.raw_error(format!(
                    "invalid integer literal {literal:?}: {e} before position {}",
                    self.pos
                )));
            }
            self.emit(TokenKind::IntLiteral);
        }
        Ok(true)
    }

    /// Scan a quoted string literal if one starts here
    fn string_literal(&mut self) -> Result<bool, LexError> {
        let Some(quote) = self.peek().filter(|c| STRING_DELIMITERS.contains(c)) else {
            return Ok(false);
        };

        let position = self.pos;
        let context = self.context();
        loop {
            if self.next_char().is_none() {
                return Err(self.raw_error(format!(
                    "unmatched string delimiter {quote} at position {position}, following {context:?}"
                )));
            }
            if self.peek() == Some(quote) {
                break;
            }
        }
        self.next_char();
        self.emit(TokenKind::StringLiteral);
        Ok(true)
    }

    /// Scan a `/`-delimited regular expression, which must compile
    fn regex_literal(&mut self) -> Result<(), LexError> {
        if !self.has_prefix(REGEX_DELIMITER) {
            return Err(self.error(&format!(
                "regular expression does not start with {REGEX_DELIMITER}"
            )));
        }

        let position = self.pos;
        let context = self.context();
        let mut escape = false;
        loop {
            if self.next_char().is_none() {
                return Err(self.raw_error(format!(
                    "unmatched regular expression delimiter {REGEX_DELIMITER} at position {position}, following {context:?}"
                )));
            }
            if !escape && self.has_prefix(REGEX_DELIMITER) {
                break;
            }
            escape = !escape && self.has_prefix(REGEX_ESCAPE);
        }
        self.next_char();

        if let Err(e) = Regex::new(&sanitise_regex(self.value())) {
            return Err(self.raw_error(format!(
                "invalid regular expression at position {position}, following {context:?}: {e}"
            )));
        }
        self.emit(TokenKind::RegexLiteral);
        Ok(())
    }

    fn validate_array_index(&self) -> Result<(), LexError> {
        let subscript = self.value();
        let index = subscript
            .strip_prefix(LEFT_BRACKET)
            .and_then(|s| s.strip_suffix(RIGHT_BRACKET))
            .unwrap_or(subscript);

        match SliceSpec::parse(index) {
            Ok(_) => Ok(()),
            Err(e) => {
                let problem = match e.root_cause() {
                    SliceError::MalformedIndex => "invalid array index, too many colons",
                    _ => "invalid array index containing non-integer value",
                };
                Err(self.raw_error(format!(
                    "{problem}: {subscript} before position {}",
                    self.pos
                )))
            }
        }
    }

    // ========== Scanning helpers ==========

    fn rest(&self) -> &'a str {
        self.input.get(self.pos..).unwrap_or("")
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn has_prefix(&self, prefix: &str) -> bool {
        self.rest().starts_with(prefix)
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn next_char(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn consume(&mut self, token: &str) {
        self.pos += token.len();
    }

    /// Consume `token` if the input starts with it and with none of `except`
    fn consumed(&mut self, token: &str, except: &[&str]) -> bool {
        if self.has_prefix(token) && !except.iter().any(|e| self.has_prefix(e)) {
            self.consume(token);
            return true;
        }
        false
    }

    /// Consume a name up to one of `stop` or the end of input
    fn scan_name(&mut self, stop: &[char]) -> bool {
        let mut named = false;
        while let Some(c) = self.peek() {
            if stop.contains(&c) {
                break;
            }
            self.next_char();
            named = true;
        }
        named
    }

    fn strip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.next_char();
        }
        self.start = self.pos;
    }

    /// The portion of the current token scanned so far
    fn value(&self) -> &'a str {
        self.input.get(self.start..self.pos).unwrap_or("")
    }

    /// The last emitted token followed by the current token scanned so far
    fn context(&self) -> &'a str {
        self.input
            .get(self.last_emitted_start..self.pos)
            .unwrap_or("")
    }

    fn emit(&mut self, kind: TokenKind) {
        let token = Token {
            kind,
            text: self.value(),
            position: self.start,
        };
        trace!(?kind, text = token.text, position = token.position, "token");
        self.pending.push_back(Ok(token));
        self.last_emitted_start = self.start;
        self.start = self.pos;
        self.last_emitted = Some(kind);
    }

    /// Emit a token which does not appear in the input
    fn emit_synthetic(&mut self, kind: TokenKind, text: &'static str) {
        trace!(?kind, text, "synthetic token");
        self.pending.push_back(Ok(Token {
            kind,
            text,
            position: self.pos,
        }));
    }

    fn push(&mut self, state: State) {
        self.stack.push(state);
    }

    fn pop(&mut self) -> Result<State, LexError> {
        match self.stack.pop() {
            Some(state) => Ok(state),
            None => Err(self.error("syntax error")),
        }
    }

    /// An error reporting the position and the text leading up to it
    fn error(&self, message: &str) -> LexError {
        LexError {
            message: format!(
                "{message} at position {}, following {:?}",
                self.pos,
                self.context()
            ),
            position: self.pos,
        }
    }

    fn raw_error(&self, message: String) -> LexError {
        LexError {
            message,
            position: self.pos,
        }
    }

    fn missing_first_operand(&self, operator: &str) -> LexError {
        self.error(&format!(
            "missing first operand for binary operator {operator}"
        ))
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Result<Token<'a>, LexError>;

    /// Yields tokens up to and including `EndOfInput` or the first error
    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }
        let item = self.next_token();
        if matches!(
            item,
            Err(_)
                | Ok(Token {
                    kind: TokenKind::EndOfInput,
                    ..
                })
        ) {
            self.exhausted = true;
        }
        Some(item)
    }
}

/// Tokenize an expression, up to and including `EndOfInput`
pub fn tokenize(expression: &str) -> Result<Vec<Token<'_>>, LexError> {
    Lexer::new(expression).tokenize()
}
