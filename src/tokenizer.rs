// tokenizer.rs - Whitespace-delimited, case-folded tokens with ( ... ) comments

use thiserror::Error;

/// Run that opens a comment.
pub const COMMENT_OPEN: &str = "(";
/// Run that closes a comment.
pub const COMMENT_CLOSE: &str = ")";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexerError {
    #[error("unterminated comment: ')' expected before end of input")]
    UnterminatedComment,
}

// ============================================================================
// TOKENIZER
// ============================================================================

/// Pulls tokens off a character stream.
///
/// A token is the maximal run of non-whitespace characters, lower-cased.
/// The empty string marks the end of input and is returned on every call
/// once the stream is exhausted.
pub struct Tokenizer<I: Iterator<Item = char>> {
    chars: I,
    /// One-character pushback buffer.
    pending: Option<char>,
    exhausted: bool,
}

impl<I: Iterator<Item = char>> Tokenizer<I> {
    pub fn new(chars: I) -> Self {
        Tokenizer {
            chars,
            pending: None,
            exhausted: false,
        }
    }

    /// Next token with comments skipped.
    pub fn next_token(&mut self) -> Result<String, LexerError> {
        loop {
            let token = self.next_raw();
            if token != COMMENT_OPEN {
                log::trace!("token {:?}", token);
                return Ok(token);
            }
            self.skip_comment()?;
        }
    }

    /// Next whitespace-delimited run, without comment handling.
    pub fn next_raw(&mut self) -> String {
        let mut token = String::new();

        let mut ch = self.next_char();
        while matches!(ch, Some(c) if c.is_whitespace()) {
            ch = self.next_char();
        }

        while let Some(c) = ch {
            if c.is_whitespace() {
                self.pending = Some(c);
                break;
            }
            token.extend(c.to_lowercase());
            ch = self.next_char();
        }

        token
    }

    /// Discard raw runs through the closing marker. The opening marker has
    /// already been consumed.
    pub fn skip_comment(&mut self) -> Result<(), LexerError> {
        loop {
            let token = self.next_raw();
            if token == COMMENT_CLOSE {
                return Ok(());
            }
            if token.is_empty() {
                return Err(LexerError::UnterminatedComment);
            }
        }
    }

    fn next_char(&mut self) -> Option<char> {
        if let Some(c) = self.pending.take() {
            return Some(c);
        }
        if self.exhausted {
            return None;
        }
        let next = self.chars.next();
        if next.is_none() {
            self.exhausted = true;
        }
        next
    }
}

// ============================================================================
// LINE SOURCES
// ============================================================================

/// Character stream fed one line at a time by `fetch`.
///
/// Lines are only requested when the previous one is used up, so a REPL
/// executes everything on a line before prompting for the next.
pub struct LineSource<F> {
    fetch: F,
    line: Vec<char>,
    position: usize,
    done: bool,
}

impl<F> LineSource<F>
where
    F: FnMut() -> Option<String>,
{
    pub fn new(fetch: F) -> Self {
        LineSource {
            fetch,
            line: Vec::new(),
            position: 0,
            done: false,
        }
    }
}

impl<F> Iterator for LineSource<F>
where
    F: FnMut() -> Option<String>,
{
    type Item = char;

    fn next(&mut self) -> Option<char> {
        loop {
            if let Some(&c) = self.line.get(self.position) {
                self.position += 1;
                return Some(c);
            }
            if self.done {
                return None;
            }
            match (self.fetch)() {
                Some(mut line) => {
                    line.push('\n');
                    self.line = line.chars().collect();
                    self.position = 0;
                }
                None => self.done = true,
            }
        }
    }
}
