use thiserror::Error as ThisError;

///
/// Lexer for the textual query grammar.
///
/// Comments (`/* ... */`, `--` to end of line, `//` to end of line) are
/// stripped here so the parser never sees them; a block comment may sit
/// anywhere whitespace may, including between an operator and its
/// literal. Every token carries the byte offset it started at so parse
/// errors can point into the original text.
///

/// Characters that may begin or continue an operator token.
const OPERATOR_CHARS: &[char] = &['=', '<', '>', '~', '!'];

///
/// TokenKind
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TokenKind {
    /// Bare word: identifiers, numbers, dotted paths (`a.b[x].c:size`).
    Word(String),

    /// Quoted string, quotes removed. No escape processing; the closing
    /// quote is the next occurrence of the opening character.
    Quoted(String),

    /// Maximal run of operator characters (`=`, `!=`, `>=`, `~=`, ...).
    Operator(String),

    LParen,
    RParen,
    Comma,
}

impl TokenKind {
    /// The token as the user wrote it, for error messages.
    #[must_use]
    pub fn display(&self) -> String {
        match self {
            Self::Word(text) | Self::Operator(text) => text.clone(),
            Self::Quoted(text) => format!("\"{text}\""),
            Self::LParen => "(".to_string(),
            Self::RParen => ")".to_string(),
            Self::Comma => ",".to_string(),
        }
    }
}

///
/// Token
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte offset of the token start in the source text.
    pub position: usize,
}

///
/// LexError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
#[error("lex error at position {position}: {reason}")]
pub struct LexError {
    pub position: usize,
    pub reason: String,
}

impl LexError {
    fn new(position: usize, reason: impl Into<String>) -> Self {
        Self {
            position,
            reason: reason.into(),
        }
    }
}

fn is_word_part(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '.' | ':' | '[' | ']')
}

/// Tokenize the raw query text, stripping comments.
pub fn tokenize(input: &str) -> Result<Vec<Token>, LexError> {
    let mut tokens = Vec::new();
    let chars: Vec<(usize, char)> = input.char_indices().collect();
    let mut i = 0;

    while i < chars.len() {
        let (position, c) = chars[i];

        if c.is_whitespace() {
            i += 1;
        } else if c == '/' && matches!(chars.get(i + 1), Some((_, '*'))) {
            i = skip_block_comment(&chars, i)?;
        } else if c == '/' && matches!(chars.get(i + 1), Some((_, '/'))) {
            i = skip_line_comment(&chars, i);
        } else if c == '-' && matches!(chars.get(i + 1), Some((_, '-'))) {
            i = skip_line_comment(&chars, i);
        } else if c == '"' || c == '\'' {
            let (token, next) = lex_quoted(&chars, i, c)?;
            tokens.push(token);
            i = next;
        } else if c == '(' {
            tokens.push(Token {
                kind: TokenKind::LParen,
                position,
            });
            i += 1;
        } else if c == ')' {
            tokens.push(Token {
                kind: TokenKind::RParen,
                position,
            });
            i += 1;
        } else if c == ',' {
            tokens.push(Token {
                kind: TokenKind::Comma,
                position,
            });
            i += 1;
        } else if is_word_part(c) {
            let (token, next) = lex_run(&chars, i, is_word_part, TokenKind::Word);
            tokens.push(token);
            i = next;
        } else if OPERATOR_CHARS.contains(&c) {
            let (token, next) = lex_run(&chars, i, |c| OPERATOR_CHARS.contains(&c), TokenKind::Operator);
            tokens.push(token);
            i = next;
        } else {
            return Err(LexError::new(position, format!("unexpected character '{c}'")));
        }
    }

    Ok(tokens)
}

fn skip_block_comment(chars: &[(usize, char)], start: usize) -> Result<usize, LexError> {
    let mut i = start + 2;
    while i < chars.len() {
        if chars[i].1 == '*' && matches!(chars.get(i + 1), Some((_, '/'))) {
            return Ok(i + 2);
        }
        i += 1;
    }

    Err(LexError::new(chars[start].0, "unterminated block comment"))
}

fn skip_line_comment(chars: &[(usize, char)], start: usize) -> usize {
    let mut i = start + 2;
    while i < chars.len() && chars[i].1 != '\n' {
        i += 1;
    }
    i
}

fn lex_quoted(
    chars: &[(usize, char)],
    start: usize,
    quote: char,
) -> Result<(Token, usize), LexError> {
    let position = chars[start].0;
    let mut text = String::new();
    let mut i = start + 1;

    while i < chars.len() {
        if chars[i].1 == quote {
            return Ok((
                Token {
                    kind: TokenKind::Quoted(text),
                    position,
                },
                i + 1,
            ));
        }
        text.push(chars[i].1);
        i += 1;
    }

    Err(LexError::new(position, "unterminated string"))
}

fn lex_run(
    chars: &[(usize, char)],
    start: usize,
    part: impl Fn(char) -> bool,
    kind: impl Fn(String) -> TokenKind,
) -> (Token, usize) {
    let position = chars[start].0;
    let mut text = String::new();
    let mut i = start;

    while i < chars.len() && part(chars[i].1) {
        text.push(chars[i].1);
        i += 1;
    }

    (
        Token {
            kind: kind(text),
            position,
        },
        i,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn words_operators_and_punctuation() {
        assert_eq!(
            kinds("id=1 and (name=foo, x)"),
            vec![
                TokenKind::Word("id".to_string()),
                TokenKind::Operator("=".to_string()),
                TokenKind::Word("1".to_string()),
                TokenKind::Word("and".to_string()),
                TokenKind::LParen,
                TokenKind::Word("name".to_string()),
                TokenKind::Operator("=".to_string()),
                TokenKind::Word("foo".to_string()),
                TokenKind::Comma,
                TokenKind::Word("x".to_string()),
                TokenKind::RParen,
            ]
        );
    }

    #[test]
    fn operator_runs_are_maximal() {
        assert_eq!(
            kinds("a>=2"),
            vec![
                TokenKind::Word("a".to_string()),
                TokenKind::Operator(">=".to_string()),
                TokenKind::Word("2".to_string()),
            ]
        );
    }

    #[test]
    fn paths_lex_as_single_words() {
        assert_eq!(
            kinds("asset.owner[o].id children:size"),
            vec![
                TokenKind::Word("asset.owner[o].id".to_string()),
                TokenKind::Word("children:size".to_string()),
            ]
        );
    }

    #[test]
    fn quoted_strings_keep_inner_text() {
        assert_eq!(
            kinds("name = \"foo bar\" title='dr'"),
            vec![
                TokenKind::Word("name".to_string()),
                TokenKind::Operator("=".to_string()),
                TokenKind::Quoted("foo bar".to_string()),
                TokenKind::Word("title".to_string()),
                TokenKind::Operator("=".to_string()),
                TokenKind::Quoted("dr".to_string()),
            ]
        );
    }

    #[test]
    fn comments_are_stripped() {
        let plain = kinds("id=1");
        assert_eq!(kinds("/* c */ id=1"), plain);
        assert_eq!(kinds("id=1 --c"), plain);
        assert_eq!(kinds("id=1 // c\n"), plain);
        // A block comment may interleave mid-expression.
        assert_eq!(kinds("id= -- comment\n1"), plain);
        assert_eq!(kinds("id=/* c */1"), plain);
    }

    #[test]
    fn unterminated_block_comment_fails_with_position() {
        let err = tokenize("id=1 /* oops").unwrap_err();
        assert_eq!(err.position, 5);
    }

    #[test]
    fn unterminated_string_fails() {
        let err = tokenize("name='oops").unwrap_err();
        assert_eq!(err.position, 5);
    }

    #[test]
    fn stray_character_fails() {
        assert!(tokenize("id # 1").is_err());
    }

    #[test]
    fn positions_are_byte_offsets() {
        let tokens = tokenize("id = 1").unwrap();
        assert_eq!(tokens[0].position, 0);
        assert_eq!(tokens[1].position, 3);
        assert_eq!(tokens[2].position, 5);
    }
}
