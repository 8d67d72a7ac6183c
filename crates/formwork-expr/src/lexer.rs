// crates/formwork-expr/src/lexer.rs
// ============================================================================
// Module: Expression Lexer
// Description: Tokenizer for the restricted expression language.
// Purpose: Produce positioned tokens and reject unsupported syntax early.
// Dependencies: crate::error
// ============================================================================

//! ## Overview
//! The lexer turns expression text into a flat token stream. Each token keeps
//! its byte offset so parser diagnostics point at the original input.
//! Security posture: expression text is author-supplied configuration and is
//! treated as untrusted; characters outside the grammar are rejected here.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::error::ExpressionError;

// ============================================================================
// SECTION: Tokens
// ============================================================================

/// Token produced from expression input.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token<'a> {
    /// Identifier or non-reserved word.
    Ident(&'a str),
    /// Numeric literal.
    Number(f64),
    /// String literal with escapes resolved.
    Str(String),
    /// `true`
    True,
    /// `false`
    False,
    /// `null`
    Null,
    /// `undefined`
    Undefined,
    /// `typeof`
    Typeof,
    /// `const` or `let`
    Let,
    /// `return`
    Return,
    /// `if`
    If,
    /// `else`
    Else,
    /// `function`
    Function,
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `[`
    LBracket,
    /// `]`
    RBracket,
    /// `{`
    LBrace,
    /// `}`
    RBrace,
    /// `,`
    Comma,
    /// `;`
    Semicolon,
    /// `.`
    Dot,
    /// `?.`
    OptionalDot,
    /// `?`
    Question,
    /// `:`
    Colon,
    /// `??`
    Nullish,
    /// `||`
    Or,
    /// `&&`
    And,
    /// `!`
    Not,
    /// `==`
    LooseEq,
    /// `!=`
    LooseNe,
    /// `===`
    StrictEq,
    /// `!==`
    StrictNe,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Star,
    /// `/`
    Slash,
    /// `%`
    Percent,
    /// `=`
    Assign,
    /// `=>`
    Arrow,
    /// End-of-input marker.
    Eof,
}

/// Token paired with its byte offset.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SpannedToken<'a> {
    /// Token value.
    pub(crate) token: Token<'a>,
    /// Byte offset into the input.
    pub(crate) position: usize,
}

/// Words that are part of the host language but deliberately unsupported.
const FORBIDDEN_WORDS: &[&str] = &[
    "for", "while", "do", "new", "class", "var", "this", "delete", "void", "yield", "await",
    "import", "export", "switch", "try", "catch", "throw", "with", "async",
];

// ============================================================================
// SECTION: Lexer
// ============================================================================

/// Lexer for expression text.
pub(crate) struct Lexer<'a> {
    /// Source input being tokenized.
    input: &'a str,
    /// Current byte offset into the input.
    offset: usize,
}

impl<'a> Lexer<'a> {
    /// Creates a new lexer for the given input.
    pub(crate) const fn new(input: &'a str) -> Self {
        Self {
            input,
            offset: 0,
        }
    }

    /// Lexes the whole input into tokens terminated by [`Token::Eof`].
    pub(crate) fn lex(&mut self) -> Result<Vec<SpannedToken<'a>>, ExpressionError> {
        let mut tokens = Vec::new();
        let bytes = self.input.as_bytes();

        while self.offset < bytes.len() {
            let ch = bytes[self.offset];
            let start = self.offset;
            let token = match ch {
                b' ' | b'\t' | b'\n' | b'\r' => {
                    self.offset += 1;
                    continue;
                }
                b'(' => self.single(Token::LParen),
                b')' => self.single(Token::RParen),
                b'[' => self.single(Token::LBracket),
                b']' => self.single(Token::RBracket),
                b'{' => self.single(Token::LBrace),
                b'}' => self.single(Token::RBrace),
                b',' => self.single(Token::Comma),
                b';' => self.single(Token::Semicolon),
                b':' => self.single(Token::Colon),
                b'+' => self.single(Token::Plus),
                b'-' => self.single(Token::Minus),
                b'*' => self.single(Token::Star),
                b'/' => self.single(Token::Slash),
                b'%' => self.single(Token::Percent),
                b'.' => {
                    if self.peek(bytes, 1).is_some_and(|b| b.is_ascii_digit()) {
                        self.number(bytes)?
                    } else {
                        self.single(Token::Dot)
                    }
                }
                b'?' => match self.peek(bytes, 1) {
                    Some(b'?') => self.multi(Token::Nullish, 2),
                    // `a?.5:1` is a ternary, not optional chaining.
                    Some(b'.') if !self.peek(bytes, 2).is_some_and(|b| b.is_ascii_digit()) => {
                        self.multi(Token::OptionalDot, 2)
                    }
                    _ => self.single(Token::Question),
                },
                b'|' => self.pair(bytes, b'|', Token::Or, "||")?,
                b'&' => self.pair(bytes, b'&', Token::And, "&&")?,
                b'!' => match (self.peek(bytes, 1), self.peek(bytes, 2)) {
                    (Some(b'='), Some(b'=')) => self.multi(Token::StrictNe, 3),
                    (Some(b'='), _) => self.multi(Token::LooseNe, 2),
                    _ => self.single(Token::Not),
                },
                b'=' => match (self.peek(bytes, 1), self.peek(bytes, 2)) {
                    (Some(b'='), Some(b'=')) => self.multi(Token::StrictEq, 3),
                    (Some(b'='), _) => self.multi(Token::LooseEq, 2),
                    (Some(b'>'), _) => self.multi(Token::Arrow, 2),
                    _ => self.single(Token::Assign),
                },
                b'<' => match self.peek(bytes, 1) {
                    Some(b'=') => self.multi(Token::Le, 2),
                    _ => self.single(Token::Lt),
                },
                b'>' => match self.peek(bytes, 1) {
                    Some(b'=') => self.multi(Token::Ge, 2),
                    _ => self.single(Token::Gt),
                },
                b'\'' | b'"' => self.string(ch)?,
                b'`' => {
                    return Err(ExpressionError::syntax(
                        "template literals are not supported",
                        start,
                    ));
                }
                b'0' ..= b'9' => self.number(bytes)?,
                b'a' ..= b'z' | b'A' ..= b'Z' | b'_' | b'$' => self.word(bytes)?,
                _ => {
                    let found = self.input[start ..].chars().next().unwrap_or('?');
                    return Err(ExpressionError::syntax(
                        format!("unexpected character `{found}`"),
                        start,
                    ));
                }
            };
            tokens.push(SpannedToken {
                token,
                position: start,
            });
        }

        if tokens.is_empty() {
            return Err(ExpressionError::Empty);
        }

        tokens.push(SpannedToken {
            token: Token::Eof,
            position: self.offset,
        });
        Ok(tokens)
    }

    /// Consumes one byte and returns the token.
    const fn single(&mut self, token: Token<'a>) -> Token<'a> {
        self.offset += 1;
        token
    }

    /// Consumes `len` bytes and returns the token.
    const fn multi(&mut self, token: Token<'a>, len: usize) -> Token<'a> {
        self.offset += len;
        token
    }

    /// Returns the byte `ahead` positions after the current one.
    fn peek(&self, bytes: &[u8], ahead: usize) -> Option<u8> {
        bytes.get(self.offset + ahead).copied()
    }

    /// Lexes a doubled operator such as `&&`.
    fn pair(
        &mut self,
        bytes: &[u8],
        second: u8,
        token: Token<'a>,
        expected: &str,
    ) -> Result<Token<'a>, ExpressionError> {
        if self.peek(bytes, 1) == Some(second) {
            Ok(self.multi(token, 2))
        } else {
            Err(ExpressionError::syntax(
                format!("expected `{expected}`; bitwise operators are not supported"),
                self.offset,
            ))
        }
    }

    /// Advances while the condition matches the current byte.
    fn consume_while<F>(&mut self, bytes: &[u8], condition: F)
    where
        F: Fn(u8) -> bool,
    {
        while let Some(&b) = bytes.get(self.offset) {
            if condition(b) {
                self.offset += 1;
            } else {
                break;
            }
        }
    }

    /// Lexes a numeric literal (integer, decimal, exponent).
    fn number(&mut self, bytes: &[u8]) -> Result<Token<'a>, ExpressionError> {
        let start = self.offset;
        self.consume_while(bytes, |b| b.is_ascii_digit());
        if self.peek(bytes, 0) == Some(b'.') {
            self.offset += 1;
            self.consume_while(bytes, |b| b.is_ascii_digit());
        }
        if matches!(self.peek(bytes, 0), Some(b'e' | b'E')) {
            self.offset += 1;
            if matches!(self.peek(bytes, 0), Some(b'+' | b'-')) {
                self.offset += 1;
            }
            self.consume_while(bytes, |b| b.is_ascii_digit());
        }
        let raw = &self.input[start .. self.offset];
        if self.peek(bytes, 0).is_some_and(|b| b.is_ascii_alphabetic() || b == b'_') {
            return Err(ExpressionError::syntax(format!("invalid number `{raw}`"), start));
        }
        raw.parse::<f64>()
            .map(Token::Number)
            .map_err(|_| ExpressionError::syntax(format!("invalid number `{raw}`"), start))
    }

    /// Lexes an identifier or keyword.
    fn word(&mut self, bytes: &[u8]) -> Result<Token<'a>, ExpressionError> {
        let start = self.offset;
        self.consume_while(bytes, |b| b.is_ascii_alphanumeric() || b == b'_' || b == b'$');
        let slice = &self.input[start .. self.offset];
        if FORBIDDEN_WORDS.contains(&slice) {
            return Err(ExpressionError::syntax(
                format!("`{slice}` is not supported in expressions"),
                start,
            ));
        }
        Ok(match slice {
            "true" => Token::True,
            "false" => Token::False,
            "null" => Token::Null,
            "undefined" => Token::Undefined,
            "typeof" => Token::Typeof,
            "const" | "let" => Token::Let,
            "return" => Token::Return,
            "if" => Token::If,
            "else" => Token::Else,
            "function" => Token::Function,
            _ => Token::Ident(slice),
        })
    }

    /// Lexes a quoted string literal, resolving escapes.
    fn string(&mut self, quote: u8) -> Result<Token<'a>, ExpressionError> {
        let start = self.offset;
        let body = &self.input[start + 1 ..];
        let mut out = String::new();
        let mut chars = body.char_indices();

        while let Some((index, ch)) = chars.next() {
            if ch == char::from(quote) {
                self.offset = start + 1 + index + 1;
                return Ok(Token::Str(out));
            }
            if ch != '\\' {
                out.push(ch);
                continue;
            }
            let Some((_, escaped)) = chars.next() else {
                break;
            };
            match escaped {
                'n' => out.push('\n'),
                't' => out.push('\t'),
                'r' => out.push('\r'),
                '0' => out.push('\0'),
                'u' => {
                    let mut code = 0u32;
                    for _ in 0 .. 4 {
                        let digit = chars
                            .next()
                            .and_then(|(_, hex)| hex.to_digit(16))
                            .ok_or_else(|| {
                                ExpressionError::syntax("invalid unicode escape", start)
                            })?;
                        code = code * 16 + digit;
                    }
                    let decoded = char::from_u32(code)
                        .ok_or_else(|| ExpressionError::syntax("invalid unicode escape", start))?;
                    out.push(decoded);
                }
                other => out.push(other),
            }
        }

        Err(ExpressionError::syntax("unterminated string literal", start))
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic, reason = "Test-only assertions are permitted.")]

    use super::Lexer;
    use super::Token;
    use crate::error::ExpressionError;

    fn kinds(input: &str) -> Vec<Token<'_>> {
        Lexer::new(input).lex().unwrap().into_iter().map(|t| t.token).collect()
    }

    #[test]
    fn lexes_optional_chain_and_nullish() {
        assert_eq!(
            kinds("a?.b ?? 'x'"),
            vec![
                Token::Ident("a"),
                Token::OptionalDot,
                Token::Ident("b"),
                Token::Nullish,
                Token::Str("x".to_string()),
                Token::Eof
            ]
        );
    }

    #[test]
    fn ternary_with_decimal_is_not_optional_chain() {
        assert_eq!(
            kinds("a?.5:1"),
            vec![
                Token::Ident("a"),
                Token::Question,
                Token::Number(0.5),
                Token::Colon,
                Token::Number(1.0),
                Token::Eof
            ]
        );
    }

    #[test]
    fn rejects_loops_and_templates() {
        assert!(matches!(Lexer::new("for (;;) {}").lex(), Err(ExpressionError::Syntax { .. })));
        assert!(matches!(Lexer::new("`x`").lex(), Err(ExpressionError::Syntax { .. })));
        assert!(matches!(Lexer::new("a & b").lex(), Err(ExpressionError::Syntax { .. })));
    }

    #[test]
    fn resolves_string_escapes() {
        assert_eq!(kinds(r#""a\"b\u0041""#)[0], Token::Str("a\"bA".to_string()));
    }
}
