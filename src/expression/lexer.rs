//! Tokenizer for the expression language.

use super::ExpressionError;

/// A lexical token.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Comma,
    Colon,
    Dot,
    Question,
    Amp,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Str(String),
    Int(i64),
    Float(f64),
    /// Field name, keyword or backtick-quoted name.
    Name(String),
    /// `$`, `$$` or `$name` (name stored without the sigil).
    Var(String),
}

/// A token and its byte offset in the source.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub position: usize,
}

/// Split source text into tokens.
pub fn tokenize(source: &str) -> Result<Vec<Spanned>, ExpressionError> {
    let chars: Vec<(usize, char)> = source.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (pos, c) = chars[i];

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        // Block comment
        if c == '/' && matches!(chars.get(i + 1), Some((_, '*'))) {
            i += 2;
            loop {
                match (chars.get(i), chars.get(i + 1)) {
                    (Some((_, '*')), Some((_, '/'))) => {
                        i += 2;
                        break;
                    }
                    (Some(_), _) => i += 1,
                    (None, _) => return Err(ExpressionError::compile(pos, "unterminated comment")),
                }
            }
            continue;
        }

        let simple = match c {
            '{' => Some(Token::LBrace),
            '}' => Some(Token::RBrace),
            '[' => Some(Token::LBracket),
            ']' => Some(Token::RBracket),
            '(' => Some(Token::LParen),
            ')' => Some(Token::RParen),
            ',' => Some(Token::Comma),
            ':' => Some(Token::Colon),
            '?' => Some(Token::Question),
            '&' => Some(Token::Amp),
            '+' => Some(Token::Plus),
            '-' => Some(Token::Minus),
            '*' => Some(Token::Star),
            '/' => Some(Token::Slash),
            '%' => Some(Token::Percent),
            '=' => Some(Token::Eq),
            _ => None,
        };
        if let Some(token) = simple {
            tokens.push(Spanned { token, position: pos });
            i += 1;
            continue;
        }

        match c {
            '.' if !matches!(chars.get(i + 1), Some((_, d)) if d.is_ascii_digit()) => {
                tokens.push(Spanned { token: Token::Dot, position: pos });
                i += 1;
            }
            '!' => {
                if matches!(chars.get(i + 1), Some((_, '='))) {
                    tokens.push(Spanned { token: Token::NotEq, position: pos });
                    i += 2;
                } else {
                    return Err(ExpressionError::compile(pos, "expected '=' after '!'"));
                }
            }
            '<' | '>' => {
                let with_eq = matches!(chars.get(i + 1), Some((_, '=')));
                let token = match (c, with_eq) {
                    ('<', true) => Token::Le,
                    ('<', false) => Token::Lt,
                    ('>', true) => Token::Ge,
                    _ => Token::Gt,
                };
                tokens.push(Spanned { token, position: pos });
                i += if with_eq { 2 } else { 1 };
            }
            '"' | '\'' => {
                let (value, next) = read_string(&chars, i)?;
                tokens.push(Spanned { token: Token::Str(value), position: pos });
                i = next;
            }
            '`' => {
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && chars[end].1 != '`' {
                    end += 1;
                }
                if end >= chars.len() {
                    return Err(ExpressionError::compile(pos, "unterminated quoted name"));
                }
                let name: String = chars[start..end].iter().map(|(_, ch)| *ch).collect();
                tokens.push(Spanned { token: Token::Name(name), position: pos });
                i = end + 1;
            }
            '$' => {
                let mut end = i + 1;
                if matches!(chars.get(end), Some((_, '$'))) {
                    end += 1;
                    tokens.push(Spanned { token: Token::Var("$".to_string()), position: pos });
                } else {
                    while end < chars.len() && is_name_char(chars[end].1) {
                        end += 1;
                    }
                    let name: String = chars[i + 1..end].iter().map(|(_, ch)| *ch).collect();
                    tokens.push(Spanned { token: Token::Var(name), position: pos });
                }
                i = end;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let (token, next) = read_number(&chars, i)?;
                tokens.push(Spanned { token, position: pos });
                i = next;
            }
            c if is_name_start(c) => {
                let mut end = i;
                while end < chars.len() && is_name_char(chars[end].1) {
                    end += 1;
                }
                let name: String = chars[i..end].iter().map(|(_, ch)| *ch).collect();
                tokens.push(Spanned { token: Token::Name(name), position: pos });
                i = end;
            }
            other => {
                return Err(ExpressionError::compile(pos, format!("unexpected character '{}'", other)));
            }
        }
    }

    Ok(tokens)
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn read_string(chars: &[(usize, char)], start: usize) -> Result<(String, usize), ExpressionError> {
    let (pos, quote) = chars[start];
    let mut out = String::new();
    let mut i = start + 1;

    while i < chars.len() {
        let c = chars[i].1;
        if c == quote {
            return Ok((out, i + 1));
        }
        if c == '\\' {
            let escaped = chars
                .get(i + 1)
                .map(|(_, e)| *e)
                .ok_or_else(|| ExpressionError::compile(pos, "unterminated string"))?;
            match escaped {
                'n' => out.push('\n'),
                't' => out.push('\t'),
                'r' => out.push('\r'),
                'u' => {
                    let hex: String = chars.iter().skip(i + 2).take(4).map(|(_, h)| *h).collect();
                    let code = u32::from_str_radix(&hex, 16)
                        .ok()
                        .filter(|_| hex.len() == 4)
                        .and_then(char::from_u32)
                        .ok_or_else(|| ExpressionError::compile(chars[i].0, "invalid unicode escape"))?;
                    out.push(code);
                    i += 6;
                    continue;
                }
                other => out.push(other),
            }
            i += 2;
            continue;
        }
        out.push(c);
        i += 1;
    }

    Err(ExpressionError::compile(pos, "unterminated string"))
}

fn read_number(chars: &[(usize, char)], start: usize) -> Result<(Token, usize), ExpressionError> {
    let pos = chars[start].0;
    let mut end = start;
    let mut is_float = false;

    while end < chars.len() && chars[end].1.is_ascii_digit() {
        end += 1;
    }
    if end < chars.len() && chars[end].1 == '.' && matches!(chars.get(end + 1), Some((_, d)) if d.is_ascii_digit()) {
        is_float = true;
        end += 1;
        while end < chars.len() && chars[end].1.is_ascii_digit() {
            end += 1;
        }
    }
    if end < chars.len() && matches!(chars[end].1, 'e' | 'E') {
        let mut exp = end + 1;
        if matches!(chars.get(exp), Some((_, '+' | '-'))) {
            exp += 1;
        }
        if matches!(chars.get(exp), Some((_, d)) if d.is_ascii_digit()) {
            is_float = true;
            end = exp;
            while end < chars.len() && chars[end].1.is_ascii_digit() {
                end += 1;
            }
        }
    }

    let text: String = chars[start..end].iter().map(|(_, c)| *c).collect();
    let token = if is_float {
        text.parse::<f64>().map(Token::Float).ok()
    } else {
        text.parse::<i64>()
            .map(Token::Int)
            .or_else(|_| text.parse::<f64>().map(Token::Float))
            .ok()
    };

    token
        .map(|t| (t, end))
        .ok_or_else(|| ExpressionError::compile(pos, format!("invalid number '{}'", text)))
}
