use rpnc::tokenizer::{LexerError, LineSource, Tokenizer};

fn tokenize(input: &str) -> Result<Vec<String>, LexerError> {
    let mut tokenizer = Tokenizer::new(input.chars());
    let mut tokens = Vec::new();
    loop {
        let token = tokenizer.next_token()?;
        if token.is_empty() {
            return Ok(tokens);
        }
        tokens.push(token);
    }
}

#[test]
fn test_whitespace_separated() {
    let tokens = tokenize("3 4\t+\n.").unwrap();
    assert_eq!(tokens, vec!["3", "4", "+", "."]);
}

#[test]
fn test_lowercases() {
    let tokens = tokenize(": DOUBLE Dup + ;").unwrap();
    assert_eq!(tokens, vec![":", "double", "dup", "+", ";"]);
}

#[test]
fn test_leading_and_trailing_space() {
    let tokens = tokenize("   dup   \n\n").unwrap();
    assert_eq!(tokens, vec!["dup"]);
}

#[test]
fn test_empty_input() {
    assert_eq!(tokenize("").unwrap(), Vec::<String>::new());
    assert_eq!(tokenize(" \n\t ").unwrap(), Vec::<String>::new());
}

#[test]
fn test_end_of_input_repeats() {
    let mut tokenizer = Tokenizer::new("x".chars());
    assert_eq!(tokenizer.next_token().unwrap(), "x");
    assert_eq!(tokenizer.next_token().unwrap(), "");
    assert_eq!(tokenizer.next_token().unwrap(), "");
}

#[test]
fn test_comment_skipped() {
    let tokens = tokenize("1 ( this is ignored ) 2").unwrap();
    assert_eq!(tokens, vec!["1", "2"]);
}

#[test]
fn test_comment_markers_must_stand_alone() {
    // "(x" is an ordinary token, only a bare "(" opens a comment
    let tokens = tokenize("(x y)").unwrap();
    assert_eq!(tokens, vec!["(x", "y)"]);
}

#[test]
fn test_comment_across_lines() {
    let tokens = tokenize("1 ( first\nsecond\n) 2").unwrap();
    assert_eq!(tokens, vec!["1", "2"]);
}

#[test]
fn test_unterminated_comment() {
    assert_eq!(tokenize("1 ( never closed"), Err(LexerError::UnterminatedComment));
}

#[test]
fn test_raw_sees_comment_markers() {
    let mut tokenizer = Tokenizer::new("( a )".chars());
    assert_eq!(tokenizer.next_raw(), "(");
    assert_eq!(tokenizer.next_raw(), "a");
    assert_eq!(tokenizer.next_raw(), ")");
    assert_eq!(tokenizer.next_raw(), "");
}

#[test]
fn test_line_source_fetches_lazily() {
    let mut lines = vec!["3 4".to_string(), "+".to_string()].into_iter();
    let mut fetched = 0;
    {
        let source = LineSource::new(|| {
            fetched += 1;
            lines.next()
        });
        let mut tokenizer = Tokenizer::new(source);
        assert_eq!(tokenizer.next_token().unwrap(), "3");
        assert_eq!(tokenizer.next_token().unwrap(), "4");
        assert_eq!(tokenizer.next_token().unwrap(), "+");
        assert_eq!(tokenizer.next_token().unwrap(), "");
    }
    // two lines plus the call that reported the end
    assert_eq!(fetched, 3);
}

#[test]
fn test_line_source_separates_lines() {
    let mut lines = vec!["dup".to_string(), "drop".to_string()].into_iter();
    let source = LineSource::new(|| lines.next());
    let text: String = source.collect();
    assert_eq!(text, "dup\ndrop\n");
}
