//! Tokenizer for the expression language.

use super::ExprError;

/// One lexed token with its starting byte offset.
#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub offset: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    Number(f64),
    Str(String),
    Ident(String),
    True,
    False,
    Null,
    OrOr,
    AndAnd,
    EqEq,
    NotEq,
    GreaterEq,
    LessEq,
    Greater,
    Less,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    Dot,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Comma,
}

impl TokenKind {
    /// Human-readable description used in parse errors.
    #[must_use]
    pub fn describe(&self) -> &'static str {
        match self {
            TokenKind::Number(_) => "number",
            TokenKind::Str(_) => "string",
            TokenKind::Ident(_) => "identifier",
            TokenKind::True | TokenKind::False => "boolean",
            TokenKind::Null => "null",
            TokenKind::OrOr => "'||'",
            TokenKind::AndAnd => "'&&'",
            TokenKind::EqEq => "'=='",
            TokenKind::NotEq => "'!='",
            TokenKind::GreaterEq => "'>='",
            TokenKind::LessEq => "'<='",
            TokenKind::Greater => "'>'",
            TokenKind::Less => "'<'",
            TokenKind::Plus => "'+'",
            TokenKind::Minus => "'-'",
            TokenKind::Star => "'*'",
            TokenKind::Slash => "'/'",
            TokenKind::Percent => "'%'",
            TokenKind::Bang => "'!'",
            TokenKind::Dot => "'.'",
            TokenKind::LBracket => "'['",
            TokenKind::RBracket => "']'",
            TokenKind::LParen => "'('",
            TokenKind::RParen => "')'",
            TokenKind::Comma => "','",
        }
    }
}

/// Tokenize `source` into a flat token list.
pub fn tokenize(source: &str) -> Result<Vec<Token>, ExprError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let offset = i;

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if c.is_ascii_digit() {
            let (value, consumed) = lex_number(&chars[i..], offset)?;
            tokens.push(Token {
                kind: TokenKind::Number(value),
                offset,
            });
            i += consumed;
            continue;
        }

        if c == '\'' || c == '"' {
            let (value, consumed) = lex_string(&chars[i..], offset)?;
            tokens.push(Token {
                kind: TokenKind::Str(value),
                offset,
            });
            i += consumed;
            continue;
        }

        if c.is_ascii_alphabetic() || c == '_' {
            let mut end = i + 1;
            while end < chars.len() && (chars[end].is_ascii_alphanumeric() || chars[end] == '_') {
                end += 1;
            }
            let word: String = chars[i..end].iter().collect();
            let kind = match word.as_str() {
                "true" => TokenKind::True,
                "false" => TokenKind::False,
                "null" => TokenKind::Null,
                _ => TokenKind::Ident(word),
            };
            tokens.push(Token { kind, offset });
            i = end;
            continue;
        }

        let two = if i + 1 < chars.len() {
            Some((chars[i], chars[i + 1]))
        } else {
            None
        };
        let (kind, width) = match (c, two) {
            (_, Some(('|', '|'))) => (TokenKind::OrOr, 2),
            (_, Some(('&', '&'))) => (TokenKind::AndAnd, 2),
            (_, Some(('=', '='))) => (TokenKind::EqEq, 2),
            (_, Some(('!', '='))) => (TokenKind::NotEq, 2),
            (_, Some(('>', '='))) => (TokenKind::GreaterEq, 2),
            (_, Some(('<', '='))) => (TokenKind::LessEq, 2),
            ('>', _) => (TokenKind::Greater, 1),
            ('<', _) => (TokenKind::Less, 1),
            ('+', _) => (TokenKind::Plus, 1),
            ('-', _) => (TokenKind::Minus, 1),
            ('*', _) => (TokenKind::Star, 1),
            ('/', _) => (TokenKind::Slash, 1),
            ('%', _) => (TokenKind::Percent, 1),
            ('!', _) => (TokenKind::Bang, 1),
            ('.', _) => (TokenKind::Dot, 1),
            ('[', _) => (TokenKind::LBracket, 1),
            (']', _) => (TokenKind::RBracket, 1),
            ('(', _) => (TokenKind::LParen, 1),
            (')', _) => (TokenKind::RParen, 1),
            (',', _) => (TokenKind::Comma, 1),
            _ => return Err(ExprError::UnexpectedChar { ch: c, offset }),
        };
        tokens.push(Token { kind, offset });
        i += width;
    }

    Ok(tokens)
}

fn lex_number(chars: &[char], offset: usize) -> Result<(f64, usize), ExprError> {
    let mut end = 0;
    while end < chars.len() && chars[end].is_ascii_digit() {
        end += 1;
    }
    if end < chars.len() && chars[end] == '.' {
        // A trailing dot with no digit is member access, not a fraction.
        if end + 1 < chars.len() && chars[end + 1].is_ascii_digit() {
            end += 1;
            while end < chars.len() && chars[end].is_ascii_digit() {
                end += 1;
            }
        }
    }
    let text: String = chars[..end].iter().collect();
    let value = text
        .parse::<f64>()
        .map_err(|_| ExprError::InvalidNumber { offset })?;
    Ok((value, end))
}

fn lex_string(chars: &[char], offset: usize) -> Result<(String, usize), ExprError> {
    let quote = chars[0];
    let mut out = String::new();
    let mut i = 1;
    while i < chars.len() {
        let c = chars[i];
        if c == quote {
            return Ok((out, i + 1));
        }
        if c == '\\' {
            i += 1;
            let escaped = chars
                .get(i)
                .copied()
                .ok_or(ExprError::UnterminatedString { offset })?;
            out.push(match escaped {
                'n' => '\n',
                't' => '\t',
                'r' => '\r',
                '0' => '\0',
                other => other,
            });
            i += 1;
            continue;
        }
        out.push(c);
        i += 1;
    }
    Err(ExprError::UnterminatedString { offset })
}
