//! Query string tokenizer.

use crate::error::EngineError;

#[derive(Debug, Clone, PartialEq)]
pub(super) struct Token {
    pub(super) kind: TokenKind,
    pub(super) position: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum TokenKind {
    /// A bare word with escapes resolved. `pattern` is set when the word
    /// contains an unescaped `*` or `?`; it keeps `\` before escaped `*`,
    /// `?` and `\` so literal stars stay distinguishable.
    Word {
        text: String,
        pattern: Option<String>,
    },
    /// Raw contents of a double-quoted phrase.
    Phrase(String),
    Colon,
    Pipe,
    Tilde,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Plus,
    Minus,
    Bang,
    And,
    Or,
    Not,
}

impl TokenKind {
    pub(super) fn describe(&self) -> String {
        match self {
            TokenKind::Word { text, .. } => format!("word {text:?}"),
            TokenKind::Phrase(raw) => format!("phrase \"{raw}\""),
            TokenKind::Colon => "':'".to_string(),
            TokenKind::Pipe => "'|'".to_string(),
            TokenKind::Tilde => "'~'".to_string(),
            TokenKind::LParen => "'('".to_string(),
            TokenKind::RParen => "')'".to_string(),
            TokenKind::LBracket => "'['".to_string(),
            TokenKind::RBracket => "']'".to_string(),
            TokenKind::LBrace => "'{'".to_string(),
            TokenKind::RBrace => "'}'".to_string(),
            TokenKind::Lt => "'<'".to_string(),
            TokenKind::LtEq => "'<='".to_string(),
            TokenKind::Gt => "'>'".to_string(),
            TokenKind::GtEq => "'>='".to_string(),
            TokenKind::Plus => "'+'".to_string(),
            TokenKind::Minus => "'-'".to_string(),
            TokenKind::Bang => "'!'".to_string(),
            TokenKind::And => "AND".to_string(),
            TokenKind::Or => "OR".to_string(),
            TokenKind::Not => "NOT".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct LexError {
    pub(super) position: usize,
    pub(super) message: String,
}

impl From<LexError> for EngineError {
    fn from(error: LexError) -> Self {
        EngineError::QueryParse(error.message)
    }
}

/// Characters that end a bare word.
fn is_word_terminator(ch: char) -> bool {
    ch.is_whitespace()
        || matches!(
            ch,
            '(' | ')' | '[' | ']' | '{' | '}' | '<' | '>' | ':' | '"' | '~' | '|'
        )
}

pub(super) fn tokenize(input: &str) -> Result<Vec<Token>, LexError> {
    let mut tokens = Vec::new();
    let mut cursor = 0usize;

    while let Some(ch) = input[cursor..].chars().next() {
        if ch.is_whitespace() {
            cursor += ch.len_utf8();
            continue;
        }

        let position = cursor;
        let single = match ch {
            '(' => Some(TokenKind::LParen),
            ')' => Some(TokenKind::RParen),
            '[' => Some(TokenKind::LBracket),
            ']' => Some(TokenKind::RBracket),
            '{' => Some(TokenKind::LBrace),
            '}' => Some(TokenKind::RBrace),
            ':' => Some(TokenKind::Colon),
            '|' => Some(TokenKind::Pipe),
            '~' => Some(TokenKind::Tilde),
            '+' => Some(TokenKind::Plus),
            '-' => Some(TokenKind::Minus),
            '!' => Some(TokenKind::Bang),
            _ => None,
        };
        if let Some(kind) = single {
            tokens.push(Token { kind, position });
            cursor += 1;
            continue;
        }

        match ch {
            '<' | '>' => {
                let with_equals = input[cursor + 1..].starts_with('=');
                let kind = match (ch, with_equals) {
                    ('<', false) => TokenKind::Lt,
                    ('<', true) => TokenKind::LtEq,
                    ('>', false) => TokenKind::Gt,
                    _ => TokenKind::GtEq,
                };
                tokens.push(Token { kind, position });
                cursor += if with_equals { 2 } else { 1 };
            }
            '"' => {
                let (phrase, next_cursor) = consume_quoted_phrase(input, cursor)?;
                tokens.push(Token {
                    kind: TokenKind::Phrase(phrase),
                    position,
                });
                cursor = next_cursor;
            }
            _ => {
                let word = consume_word(input, cursor);
                cursor = word.end;
                if word.text.is_empty() {
                    continue;
                }
                let kind = match (word.escaped, word.text.as_str()) {
                    (false, "AND") => TokenKind::And,
                    (false, "OR") => TokenKind::Or,
                    (false, "NOT") => TokenKind::Not,
                    _ => TokenKind::Word {
                        text: word.text,
                        pattern: word.wildcard.then_some(word.pattern),
                    },
                };
                tokens.push(Token { kind, position });
            }
        }
    }

    Ok(tokens)
}

struct ScannedWord {
    text: String,
    pattern: String,
    wildcard: bool,
    escaped: bool,
    end: usize,
}

fn consume_word(input: &str, start: usize) -> ScannedWord {
    let mut cursor = start;
    let mut text = String::new();
    let mut pattern = String::new();
    let mut wildcard = false;
    let mut escaped = false;

    while let Some(ch) = input[cursor..].chars().next() {
        if ch == '\\' {
            cursor += 1;
            if let Some(next) = input[cursor..].chars().next() {
                if matches!(next, '*' | '?' | '\\') {
                    pattern.push('\\');
                }
                pattern.push(next);
                text.push(next);
                cursor += next.len_utf8();
                escaped = true;
            }
            continue;
        }
        if is_word_terminator(ch) {
            break;
        }
        if matches!(ch, '*' | '?') {
            wildcard = true;
        }
        pattern.push(ch);
        text.push(ch);
        cursor += ch.len_utf8();
    }

    ScannedWord {
        text,
        pattern,
        wildcard,
        escaped,
        end: cursor,
    }
}

fn consume_quoted_phrase(input: &str, start: usize) -> Result<(String, usize), LexError> {
    let mut cursor = start + 1;
    let mut phrase = String::new();
    let mut escaped = false;

    while let Some(ch) = input[cursor..].chars().next() {
        cursor += ch.len_utf8();

        if escaped {
            phrase.push(ch);
            escaped = false;
            continue;
        }
        if ch == '\\' {
            escaped = true;
            continue;
        }
        if ch == '"' {
            return Ok((phrase, cursor));
        }

        phrase.push(ch);
    }

    Err(LexError {
        position: start,
        message: format!("missing closing quote near byte {start}"),
    })
}
