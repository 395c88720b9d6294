// parser.rs - Tokens → AST, one token of lookahead

use crate::ast::{Definition, Node};
use crate::dictionary::WordRegistry;
use crate::tokenizer::{LexerError, Tokenizer, COMMENT_OPEN};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error(transparent)]
    Lex(#[from] LexerError),
    #[error("unterminated conditional: 'then' expected before end of input")]
    UnterminatedConditional,
    #[error("unterminated locals: '}}' expected before end of input")]
    UnterminatedLocals,
    #[error("unterminated definition: ';' expected before end of input")]
    UnterminatedDefinition,
    #[error("unterminated loop: 'again' expected before end of input")]
    UnterminatedLoop,
    #[error("loop opened by 'begin' is not closed before the end of its branch or definition")]
    UnbalancedLoop,
    #[error("'while' outside of a begin ... again loop")]
    UnexpectedWhile,
    #[error("'again' without a matching 'begin'")]
    UnmatchedAgain,
    #[error("unknown word \"{0}\"")]
    UnknownWord(String),
    #[error("local \"{0}\" declared twice")]
    DuplicateLocal(String),
}

impl ParseError {
    /// True when the error was caused by the input running out.
    pub fn is_end_of_input(&self) -> bool {
        matches!(
            self,
            ParseError::Lex(LexerError::UnterminatedComment)
                | ParseError::UnterminatedConditional
                | ParseError::UnterminatedLocals
                | ParseError::UnterminatedDefinition
                | ParseError::UnterminatedLoop
        )
    }
}

// ============================================================================
// PARSER
// ============================================================================

/// Loop frames visible to `while` and closable by `again`.
#[derive(Debug, Clone, Copy, Default)]
struct LoopScope {
    /// Frames below this belong to code around the current branch.
    branch_floor: usize,
    /// Frames below this belong to code around the current definition.
    definition_floor: usize,
}

pub struct Parser<I: Iterator<Item = char>> {
    tokens: Tokenizer<I>,
    /// Locals of the innermost definition being parsed.
    locals: Vec<String>,
    open_loops: usize,
    scope: LoopScope,
}

impl<I: Iterator<Item = char>> Parser<I> {
    pub fn new(tokens: Tokenizer<I>) -> Self {
        Parser {
            tokens,
            locals: Vec::new(),
            open_loops: 0,
            scope: LoopScope::default(),
        }
    }

    /// Number of `begin`s not yet closed by `again`.
    pub fn open_loops(&self) -> usize {
        self.open_loops
    }

    /// Forget all scope state left behind by a failed parse.
    pub fn reset(&mut self) {
        self.locals.clear();
        self.open_loops = 0;
        self.scope = LoopScope::default();
    }

    /// Parse the next node. `None` at end of input.
    pub fn next_node(&mut self, words: &mut WordRegistry) -> Result<Option<Node>, ParseError> {
        let token = self.tokens.next_token()?;
        self.parse_token(&token, words)
    }

    /// Parse one top-level unit: a single node, or every node from a
    /// top-level `begin` through its closing `again`.
    pub fn next_unit(&mut self, words: &mut WordRegistry) -> Result<Option<Vec<Node>>, ParseError> {
        let Some(first) = self.next_node(words)? else {
            return Ok(None);
        };

        let mut unit = vec![first];
        while self.open_loops > 0 {
            match self.next_node(words) {
                Ok(Some(node)) => unit.push(node),
                Ok(None) => return Err(ParseError::UnterminatedLoop),
                Err(e) => {
                    if !e.is_end_of_input() {
                        self.skip_open_loops();
                    }
                    return Err(e);
                }
            }
        }

        log::trace!("unit of {} node(s)", unit.len());
        Ok(Some(unit))
    }

    /// Parse a node starting with `token`, which has already been consumed.
    pub fn parse_token(&mut self, token: &str, words: &mut WordRegistry) -> Result<Option<Node>, ParseError> {
        if self.locals.iter().any(|local| local == token) {
            return Ok(Some(Node::LocalRef(token.to_string())));
        }

        if words.contains(token) {
            return Ok(Some(Node::WordCall(token.to_string())));
        }

        if looks_numeric(token) {
            return Ok(Some(Node::Number(parse_number(token))));
        }

        let node = match token {
            "if" => self.parse_conditional(words)?,
            "begin" => {
                self.open_loops += 1;
                Node::LoopBegin
            }
            "while" => {
                if self.open_loops <= self.scope.definition_floor {
                    return Err(ParseError::UnexpectedWhile);
                }
                Node::LoopWhile
            }
            "again" => {
                if self.open_loops <= self.scope.branch_floor {
                    return Err(ParseError::UnmatchedAgain);
                }
                self.open_loops -= 1;
                Node::LoopAgain
            }
            ":" => self.parse_definition(words)?,
            "recurse" => Node::Recurse,
            COMMENT_OPEN => {
                self.tokens.skip_comment()?;
                Node::Comment
            }
            "" => return Ok(None),
            _ => return Err(ParseError::UnknownWord(token.to_string())),
        };

        Ok(Some(node))
    }

    /// IF then-branch [ELSE else-branch] THEN
    fn parse_conditional(&mut self, words: &mut WordRegistry) -> Result<Node, ParseError> {
        let (then_branch, terminator) = self.parse_branch(&["else", "then"], words)?;

        let else_branch = if terminator == "else" {
            self.parse_branch(&["then"], words)?.0
        } else {
            Vec::new()
        };

        Ok(Node::Conditional {
            then_branch,
            else_branch,
        })
    }

    /// Collect nodes up to one of `terminators`, returning which one ended it.
    fn parse_branch(
        &mut self,
        terminators: &[&str],
        words: &mut WordRegistry,
    ) -> Result<(Vec<Node>, String), ParseError> {
        let saved = self.scope;
        self.scope.branch_floor = self.open_loops;

        let result = self.collect_until(terminators, words);

        self.scope = saved;
        result
    }

    /// : name [recursive] [{ locals }] body ;
    fn parse_definition(&mut self, words: &mut WordRegistry) -> Result<Node, ParseError> {
        let name = self.tokens.next_token()?;
        if name.is_empty() {
            return Err(ParseError::UnterminatedDefinition);
        }

        let mut token = self.tokens.next_token()?;
        let recursive = token == "recursive";
        if recursive {
            // Makes the name resolve as a word inside its own body
            words.declare_provisional(&name);
            token = match self.tokens.next_token() {
                Ok(token) => token,
                Err(e) => {
                    words.revoke_provisional(&name);
                    return Err(e.into());
                }
            };
        }

        let result = self.parse_definition_rest(token, words);
        if result.is_err() && recursive {
            words.revoke_provisional(&name);
        }

        let (locals, body) = result?;
        Ok(Node::Definition(Definition {
            name,
            recursive,
            locals,
            body,
        }))
    }

    fn parse_definition_rest(
        &mut self,
        mut token: String,
        words: &mut WordRegistry,
    ) -> Result<(Vec<String>, Vec<Node>), ParseError> {
        let mut locals = Vec::new();
        if token == "{" {
            loop {
                let local = self.tokens.next_token()?;
                match local.as_str() {
                    "}" => break,
                    "" => return Err(ParseError::UnterminatedLocals),
                    _ if locals.contains(&local) => {
                        self.skip_until(":", ";");
                        return Err(ParseError::DuplicateLocal(local));
                    }
                    _ => locals.push(local),
                }
            }
            token = self.tokens.next_token()?;
        }

        let saved_locals = std::mem::replace(&mut self.locals, locals);
        let saved_scope = self.scope;
        self.scope = LoopScope {
            branch_floor: self.open_loops,
            definition_floor: self.open_loops,
        };

        let result = self.parse_body(token, words);

        self.scope = saved_scope;
        let locals = std::mem::replace(&mut self.locals, saved_locals);

        Ok((locals, result?))
    }

    /// Definition body up to `;`. `first` is the already read first token.
    fn parse_body(&mut self, first: String, words: &mut WordRegistry) -> Result<Vec<Node>, ParseError> {
        let mut body = Vec::new();
        let mut token = first;

        while token != ";" {
            if token.is_empty() {
                return Err(ParseError::UnterminatedDefinition);
            }
            if let Some(node) = self.parse_nested(&token, (":", ";"), words)? {
                body.push(node);
            }
            token = self.tokens.next_token()?;
        }

        if self.open_loops != self.scope.branch_floor {
            self.open_loops = self.scope.branch_floor;
            return Err(ParseError::UnbalancedLoop);
        }

        Ok(body)
    }

    fn collect_until(
        &mut self,
        terminators: &[&str],
        words: &mut WordRegistry,
    ) -> Result<(Vec<Node>, String), ParseError> {
        let mut nodes = Vec::new();

        loop {
            let token = self.tokens.next_token()?;
            if terminators.contains(&token.as_str()) {
                if self.open_loops != self.scope.branch_floor {
                    self.open_loops = self.scope.branch_floor;
                    if token == "else" {
                        self.skip_until("if", "then");
                    }
                    return Err(ParseError::UnbalancedLoop);
                }
                return Ok((nodes, token));
            }
            if token.is_empty() {
                return Err(ParseError::UnterminatedConditional);
            }
            if let Some(node) = self.parse_nested(&token, ("if", "then"), words)? {
                nodes.push(node);
            }
        }
    }

    /// Parse a node inside a construct delimited by `bounds`. On an error
    /// that did not come from running out of input, the rest of the
    /// construct is skipped so parsing can resume after it.
    fn parse_nested(
        &mut self,
        token: &str,
        bounds: (&str, &str),
        words: &mut WordRegistry,
    ) -> Result<Option<Node>, ParseError> {
        let result = self.parse_token(token, words);
        if let Err(e) = &result {
            if !e.is_end_of_input() {
                self.skip_until(bounds.0, bounds.1);
            }
        }
        result
    }

    /// Skip past the `again` of every loop still open at top level.
    fn skip_open_loops(&mut self) {
        for _ in 0..self.open_loops {
            self.skip_until("begin", "again");
        }
        self.open_loops = 0;
    }

    /// Skip to the token closing the construct an error occurred in,
    /// counting nested openers. Stops quietly at end of input.
    fn skip_until(&mut self, open: &str, close: &str) {
        let mut depth = 1;
        loop {
            let token = match self.tokens.next_token() {
                Ok(token) => token,
                Err(_) => return,
            };
            if token.is_empty() {
                return;
            }
            if token == open {
                depth += 1;
            } else if token == close {
                depth -= 1;
                if depth == 0 {
                    return;
                }
            }
        }
    }
}

// ============================================================================
// NUMBERS
// ============================================================================

/// A digit, or '-' followed by a digit.
pub fn looks_numeric(token: &str) -> bool {
    let mut chars = token.chars();
    match chars.next() {
        Some(c) if c.is_ascii_digit() => true,
        Some('-') => matches!(chars.next(), Some(c) if c.is_ascii_digit()),
        _ => false,
    }
}

/// Text that looks numeric but does not parse becomes 0.0.
pub fn parse_number(token: &str) -> f64 {
    match token.parse::<f64>() {
        Ok(value) => value,
        Err(_) => {
            log::warn!("malformed number {:?}, using 0", token);
            0.0
        }
    }
}
