use super::{ParseError, RedirectKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum Token {
    Word(String),
    Redirect(RedirectKind),
}

/// Split a command line into words and redirection operators, honoring single
/// and double quotes. Unquoted control operators are rejected outright so
/// command chaining and substitution never reach the parser.
pub(super) fn tokenize(line: &str) -> Result<Vec<Token>, ParseError> {
    if line.contains('\0') {
        return Err(ParseError::EmbeddedNul);
    }

    let mut tokens = Vec::new();
    let mut word = String::new();
    let mut in_word = false;
    let mut chars = line.chars().peekable();

    let mut flush = |word: &mut String, in_word: &mut bool, tokens: &mut Vec<Token>| {
        if *in_word {
            tokens.push(Token::Word(std::mem::take(word)));
            *in_word = false;
        }
    };

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_word = true;
                // an unterminated quote consumes the rest of the line
                for q in chars.by_ref() {
                    if q == '\'' {
                        break;
                    }
                    word.push(q);
                }
            }
            '"' => {
                in_word = true;
                for q in chars.by_ref() {
                    if q == '"' {
                        break;
                    }
                    word.push(q);
                }
            }
            ';' => return Err(ParseError::ForbiddenOperator(";")),
            '`' => return Err(ParseError::ForbiddenOperator("`")),
            '&' => {
                if chars.peek() == Some(&'&') {
                    return Err(ParseError::ForbiddenOperator("&&"));
                }
                return Err(ParseError::ForbiddenOperator("&"));
            }
            '|' => {
                if chars.peek() == Some(&'|') {
                    return Err(ParseError::ForbiddenOperator("||"));
                }
                return Err(ParseError::ForbiddenOperator("|"));
            }
            '$' if chars.peek() == Some(&'(') => {
                return Err(ParseError::ForbiddenOperator("$("));
            }
            '>' => {
                flush(&mut word, &mut in_word, &mut tokens);
                if chars.peek() == Some(&'>') {
                    chars.next();
                    tokens.push(Token::Redirect(RedirectKind::OutputAppend));
                } else {
                    tokens.push(Token::Redirect(RedirectKind::Output));
                }
            }
            '<' => {
                flush(&mut word, &mut in_word, &mut tokens);
                tokens.push(Token::Redirect(RedirectKind::Input));
            }
            c if c.is_whitespace() => flush(&mut word, &mut in_word, &mut tokens),
            c => {
                in_word = true;
                word.push(c);
            }
        }
    }
    flush(&mut word, &mut in_word, &mut tokens);

    Ok(tokens)
}
