// crates/formwork-expr/src/parser.rs
// ============================================================================
// Module: Expression Parser
// Description: Recursive-descent parser for the restricted expression grammar.
// Purpose: Turn lexed tokens into a bounded, immutable program tree.
// Dependencies: crate::{ast, error, lexer, value}
// ============================================================================

//! ## Overview
//! The grammar covers literals, identifiers, array literals, member access
//! (including optional chaining), calls, unary/binary/logical operators, the
//! ternary operator and one self-invoking function form:
//!
//! ```text
//! (() => { const x = ...; if (...) { return ...; } return ...; })()
//! (() => expression)()
//! (function () { ... })()
//! ```
//!
//! Loops, assignment to existing names, object literals and `new` are not
//! part of the grammar. Input size, nesting depth and operator chain length
//! are bounded so hostile input fails closed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::ast::Args;
use crate::ast::BinaryOp;
use crate::ast::Block;
use crate::ast::Expr;
use crate::ast::LogicalOp;
use crate::ast::Program;
use crate::ast::Stmt;
use crate::ast::UnaryOp;
use crate::error::ExpressionError;
use crate::error::ExpressionResult;
use crate::lexer::Lexer;
use crate::lexer::SpannedToken;
use crate::lexer::Token;
use crate::value::ExprValue;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Default maximum expression size in bytes.
pub const DEFAULT_MAX_EXPRESSION_BYTES: usize = 64 * 1024;
/// Default maximum nesting depth for parenthesized, bracketed or unary forms.
pub const DEFAULT_MAX_NESTING: usize = 64;
/// Maximum operators or postfix accessors chained at one precedence level.
const MAX_CHAIN_LENGTH: usize = 512;

/// Parser limits.
///
/// # Invariants
/// - Both limits are inclusive upper bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseLimits {
    /// Maximum input size in bytes.
    pub max_bytes: usize,
    /// Maximum nesting depth.
    pub max_nesting: usize,
}

impl Default for ParseLimits {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_EXPRESSION_BYTES,
            max_nesting: DEFAULT_MAX_NESTING,
        }
    }
}

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// Parses expression text into a [`Program`].
///
/// # Errors
///
/// Returns [`ExpressionError`] when the input is empty, exceeds a limit or is
/// not valid expression syntax.
pub fn parse(input: &str, limits: ParseLimits) -> ExpressionResult<Program> {
    if input.len() > limits.max_bytes {
        return Err(ExpressionError::TooLarge {
            max_bytes: limits.max_bytes,
            actual_bytes: input.len(),
        });
    }
    let tokens = Lexer::new(input).lex()?;
    let mut parser = Parser::new(tokens, limits.max_nesting);
    let root = parser.parse_expression()?;
    parser.expect_eof()?;
    Ok(Program {
        source: input.to_string(),
        root,
    })
}

// ============================================================================
// SECTION: Parser
// ============================================================================

/// Recursive-descent parser over a token stream.
struct Parser<'input> {
    /// Token stream with source positions.
    tokens: Vec<SpannedToken<'input>>,
    /// Current token index.
    index: usize,
    /// Current nesting depth.
    nesting: usize,
    /// Maximum nesting depth.
    max_nesting: usize,
}

impl<'input> Parser<'input> {
    /// Creates a parser over lexed tokens (terminated by `Eof`).
    const fn new(tokens: Vec<SpannedToken<'input>>, max_nesting: usize) -> Self {
        Self {
            tokens,
            index: 0,
            nesting: 0,
            max_nesting,
        }
    }

    /// Parses a full expression.
    fn parse_expression(&mut self) -> ExpressionResult<Expr> {
        self.parse_conditional()
    }

    /// Parses `test ? consequent : alternate`.
    fn parse_conditional(&mut self) -> ExpressionResult<Expr> {
        let test = self.parse_logical_or()?;
        let position = self.position();
        if !self.matches(&Token::Question) {
            return Ok(test);
        }
        self.with_nesting(position, |parser| {
            let consequent = parser.parse_expression()?;
            parser.expect(&Token::Colon, "`:`")?;
            let alternate = parser.parse_expression()?;
            Ok(Expr::Conditional {
                test: Box::new(test),
                consequent: Box::new(consequent),
                alternate: Box::new(alternate),
            })
        })
    }

    /// Parses `||` and `??` chains.
    fn parse_logical_or(&mut self) -> ExpressionResult<Expr> {
        let mut left = self.parse_logical_and()?;
        let mut chain = 0;
        loop {
            let op = match self.current().token {
                Token::Or => LogicalOp::Or,
                Token::Nullish => LogicalOp::Nullish,
                _ => return Ok(left),
            };
            self.bump_chain(&mut chain)?;
            self.advance();
            let right = self.parse_logical_and()?;
            left = Expr::Logical {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    /// Parses `&&` chains.
    fn parse_logical_and(&mut self) -> ExpressionResult<Expr> {
        let mut left = self.parse_equality()?;
        let mut chain = 0;
        while matches!(self.current().token, Token::And) {
            self.bump_chain(&mut chain)?;
            self.advance();
            let right = self.parse_equality()?;
            left = Expr::Logical {
                op: LogicalOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    /// Parses equality operators.
    fn parse_equality(&mut self) -> ExpressionResult<Expr> {
        self.parse_binary_level(Self::parse_relational, |token| match token {
            Token::LooseEq => Some(BinaryOp::LooseEq),
            Token::LooseNe => Some(BinaryOp::LooseNe),
            Token::StrictEq => Some(BinaryOp::StrictEq),
            Token::StrictNe => Some(BinaryOp::StrictNe),
            _ => None,
        })
    }

    /// Parses relational operators.
    fn parse_relational(&mut self) -> ExpressionResult<Expr> {
        self.parse_binary_level(Self::parse_additive, |token| match token {
            Token::Lt => Some(BinaryOp::Lt),
            Token::Le => Some(BinaryOp::Le),
            Token::Gt => Some(BinaryOp::Gt),
            Token::Ge => Some(BinaryOp::Ge),
            _ => None,
        })
    }

    /// Parses additive operators.
    fn parse_additive(&mut self) -> ExpressionResult<Expr> {
        self.parse_binary_level(Self::parse_multiplicative, |token| match token {
            Token::Plus => Some(BinaryOp::Add),
            Token::Minus => Some(BinaryOp::Sub),
            _ => None,
        })
    }

    /// Parses multiplicative operators.
    fn parse_multiplicative(&mut self) -> ExpressionResult<Expr> {
        self.parse_binary_level(Self::parse_unary, |token| match token {
            Token::Star => Some(BinaryOp::Mul),
            Token::Slash => Some(BinaryOp::Div),
            Token::Percent => Some(BinaryOp::Rem),
            _ => None,
        })
    }

    /// Parses one left-associative binary precedence level.
    fn parse_binary_level(
        &mut self,
        next: fn(&mut Self) -> ExpressionResult<Expr>,
        operator: fn(&Token<'_>) -> Option<BinaryOp>,
    ) -> ExpressionResult<Expr> {
        let mut left = next(self)?;
        let mut chain = 0;
        while let Some(op) = operator(&self.current().token) {
            self.bump_chain(&mut chain)?;
            self.advance();
            let right = next(self)?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    /// Parses prefix operators.
    fn parse_unary(&mut self) -> ExpressionResult<Expr> {
        let op = match self.current().token {
            Token::Not => UnaryOp::Not,
            Token::Minus => UnaryOp::Negate,
            Token::Plus => UnaryOp::Plus,
            Token::Typeof => UnaryOp::Typeof,
            _ => return self.parse_postfix(),
        };
        let position = self.position();
        self.advance();
        self.with_nesting(position, |parser| {
            let operand = parser.parse_unary()?;
            Ok(Expr::Unary {
                op,
                operand: Box::new(operand),
            })
        })
    }

    /// Parses member access, indexing and calls following a primary.
    fn parse_postfix(&mut self) -> ExpressionResult<Expr> {
        let mut expr = self.parse_primary()?;
        let mut chain = 0;
        loop {
            let position = self.position();
            match self.current().token {
                Token::Dot => {
                    self.bump_chain(&mut chain)?;
                    self.advance();
                    let property = self.expect_property_name()?;
                    expr = Expr::Member {
                        object: Box::new(expr),
                        property,
                        optional: false,
                    };
                }
                Token::OptionalDot => {
                    self.bump_chain(&mut chain)?;
                    self.advance();
                    expr = match self.current().token {
                        Token::LBracket => self.parse_index(expr, true, position)?,
                        Token::LParen => self.parse_call(expr, true, position)?,
                        _ => {
                            let property = self.expect_property_name()?;
                            Expr::Member {
                                object: Box::new(expr),
                                property,
                                optional: true,
                            }
                        }
                    };
                }
                Token::LBracket => {
                    self.bump_chain(&mut chain)?;
                    expr = self.parse_index(expr, false, position)?;
                }
                Token::LParen => {
                    self.bump_chain(&mut chain)?;
                    expr = self.parse_call(expr, false, position)?;
                }
                _ => return Ok(expr),
            }
        }
    }

    /// Parses `[index]` (current token is `[`).
    fn parse_index(
        &mut self,
        object: Expr,
        optional: bool,
        position: usize,
    ) -> ExpressionResult<Expr> {
        self.expect(&Token::LBracket, "`[`")?;
        self.with_nesting(position, |parser| {
            let index = parser.parse_expression()?;
            parser.expect(&Token::RBracket, "`]`")?;
            Ok(Expr::Index {
                object: Box::new(object),
                index: Box::new(index),
                optional,
            })
        })
    }

    /// Parses `(args)` (current token is `(`).
    fn parse_call(
        &mut self,
        callee: Expr,
        optional: bool,
        position: usize,
    ) -> ExpressionResult<Expr> {
        self.expect(&Token::LParen, "`(`")?;
        self.with_nesting(position, |parser| {
            let args: Args =
                parser.parse_list(&Token::RParen, "`)`")?.into_iter().map(Box::new).collect();
            Ok(Expr::Call {
                callee: Box::new(callee),
                args,
                optional,
            })
        })
    }

    /// Parses a comma-separated list up to and including `close`.
    fn parse_list(
        &mut self,
        close: &Token<'_>,
        expected: &'static str,
    ) -> ExpressionResult<Vec<Expr>> {
        let mut items = Vec::new();
        if self.matches(close) {
            return Ok(items);
        }
        loop {
            items.push(self.parse_expression()?);
            if self.matches(&Token::Comma) {
                // Trailing comma.
                if self.matches(close) {
                    return Ok(items);
                }
                continue;
            }
            self.expect(close, expected)?;
            return Ok(items);
        }
    }

    /// Parses a primary expression.
    fn parse_primary(&mut self) -> ExpressionResult<Expr> {
        let position = self.position();
        let literal = match &self.current().token {
            Token::Number(number) => Some(ExprValue::Number(*number)),
            Token::Str(text) => Some(ExprValue::String(text.clone())),
            Token::True => Some(ExprValue::Bool(true)),
            Token::False => Some(ExprValue::Bool(false)),
            Token::Null => Some(ExprValue::Null),
            Token::Undefined => Some(ExprValue::Undefined),
            _ => None,
        };
        if let Some(value) = literal {
            self.advance();
            return Ok(Expr::Literal(value));
        }

        match self.current().token {
            Token::Ident(name) => {
                self.advance();
                Ok(Expr::Ident(name.to_string()))
            }
            Token::LBracket => {
                self.advance();
                self.with_nesting(position, |parser| {
                    Ok(Expr::Array(parser.parse_list(&Token::RBracket, "`]`")?))
                })
            }
            Token::LParen => {
                self.advance();
                self.with_nesting(position, |parser| {
                    if parser.at_function_start() {
                        return parser.parse_invocation(position);
                    }
                    let expr = parser.parse_expression()?;
                    parser.expect(&Token::RParen, "`)`")?;
                    Ok(expr)
                })
            }
            Token::LBrace => {
                Err(ExpressionError::syntax("object literals are not supported", position))
            }
            Token::Function => Err(ExpressionError::syntax(
                "functions must be invoked immediately: (function () { ... })()",
                position,
            )),
            _ => Err(self.unexpected("expression")),
        }
    }

    /// Returns true when the tokens begin a function literal.
    fn at_function_start(&self) -> bool {
        match self.current().token {
            Token::Function => true,
            Token::LParen => {
                matches!(self.peek(1), Some(Token::RParen))
                    && matches!(self.peek(2), Some(Token::Arrow))
            }
            _ => false,
        }
    }

    /// Parses `() => body)()` or `function () { ... })()`.
    ///
    /// The opening parenthesis of the wrapper has already been consumed.
    fn parse_invocation(&mut self, position: usize) -> ExpressionResult<Expr> {
        let body = if self.matches(&Token::Function) {
            if matches!(self.current().token, Token::Ident(_)) {
                self.advance();
            }
            self.expect(&Token::LParen, "`(`")?;
            self.expect_no_params()?;
            self.parse_block()?
        } else {
            self.expect(&Token::LParen, "`(`")?;
            self.expect_no_params()?;
            self.expect(&Token::Arrow, "`=>`")?;
            if matches!(self.current().token, Token::LBrace) {
                self.parse_block()?
            } else {
                Block {
                    statements: vec![Stmt::Return(Some(self.parse_expression()?))],
                }
            }
        };
        self.expect(&Token::RParen, "`)`")?;
        if !matches!(self.current().token, Token::LParen) {
            return Err(ExpressionError::syntax(
                "function literals must be invoked immediately",
                position,
            ));
        }
        self.advance();
        self.expect_no_params()?;
        Ok(Expr::Invoke(body))
    }

    /// Requires an empty parameter or argument list (after its `(`).
    fn expect_no_params(&mut self) -> ExpressionResult<()> {
        if self.matches(&Token::RParen) {
            Ok(())
        } else {
            Err(ExpressionError::syntax(
                "self-invoking functions take no parameters",
                self.position(),
            ))
        }
    }

    /// Parses `{ statements }`.
    fn parse_block(&mut self) -> ExpressionResult<Block> {
        let position = self.position();
        self.expect(&Token::LBrace, "`{`")?;
        self.with_nesting(position, |parser| {
            let mut statements = Vec::new();
            while !parser.matches(&Token::RBrace) {
                if matches!(parser.current().token, Token::Eof) {
                    return Err(parser.unexpected("`}`"));
                }
                statements.push(parser.parse_statement()?);
            }
            Ok(Block {
                statements,
            })
        })
    }

    /// Parses a block or a single statement used as a branch body.
    fn parse_branch(&mut self) -> ExpressionResult<Block> {
        if matches!(self.current().token, Token::LBrace) {
            self.parse_block()
        } else {
            Ok(Block {
                statements: vec![self.parse_statement()?],
            })
        }
    }

    /// Parses one statement, consuming an optional trailing `;`.
    fn parse_statement(&mut self) -> ExpressionResult<Stmt> {
        let position = self.position();
        let stmt = match self.current().token {
            Token::Let => {
                self.advance();
                let name = match self.current().token {
                    Token::Ident(name) => name.to_string(),
                    _ => return Err(self.unexpected("binding name")),
                };
                self.advance();
                self.expect(&Token::Assign, "`=`")?;
                let init = self.parse_expression()?;
                Stmt::Bind {
                    name,
                    init,
                    position,
                }
            }
            Token::If => {
                self.advance();
                self.expect(&Token::LParen, "`(`")?;
                let test = self.parse_expression()?;
                self.expect(&Token::RParen, "`)`")?;
                let then_branch = self.parse_branch()?;
                let else_branch =
                    if self.matches(&Token::Else) { Some(self.parse_branch()?) } else { None };
                return Ok(Stmt::If {
                    test,
                    then_branch,
                    else_branch,
                });
            }
            Token::Return => {
                self.advance();
                if matches!(self.current().token, Token::Semicolon | Token::RBrace) {
                    Stmt::Return(None)
                } else {
                    Stmt::Return(Some(self.parse_expression()?))
                }
            }
            Token::Assign => {
                return Err(ExpressionError::syntax("assignment is not supported", position));
            }
            _ => {
                let expr = self.parse_expression()?;
                if matches!(self.current().token, Token::Assign) {
                    return Err(ExpressionError::syntax(
                        "assignment is not supported",
                        self.position(),
                    ));
                }
                Stmt::Expr(expr)
            }
        };
        self.matches(&Token::Semicolon);
        Ok(stmt)
    }

    /// Increments a chain counter, failing once it exceeds the limit.
    fn bump_chain(&self, chain: &mut usize) -> ExpressionResult<()> {
        *chain += 1;
        if *chain > MAX_CHAIN_LENGTH {
            return Err(ExpressionError::TooDeep {
                max_depth: MAX_CHAIN_LENGTH,
                actual_depth: *chain,
                position: self.position(),
            });
        }
        Ok(())
    }

    /// Executes a parse step with nesting depth tracking.
    fn with_nesting<T>(
        &mut self,
        position: usize,
        f: impl FnOnce(&mut Self) -> ExpressionResult<T>,
    ) -> ExpressionResult<T> {
        let next_depth = self.nesting + 1;
        if next_depth > self.max_nesting {
            return Err(ExpressionError::TooDeep {
                max_depth: self.max_nesting,
                actual_depth: next_depth,
                position,
            });
        }
        self.nesting = next_depth;
        let result = f(self);
        self.nesting = self.nesting.saturating_sub(1);
        result
    }

    /// Consumes an identifier (or keyword) used as a property name.
    fn expect_property_name(&mut self) -> ExpressionResult<String> {
        let name = match self.current().token {
            Token::Ident(name) => name.to_string(),
            Token::True => "true".to_string(),
            Token::False => "false".to_string(),
            Token::Null => "null".to_string(),
            Token::Undefined => "undefined".to_string(),
            Token::Return => "return".to_string(),
            Token::If => "if".to_string(),
            Token::Else => "else".to_string(),
            _ => return Err(self.unexpected("property name")),
        };
        self.advance();
        Ok(name)
    }

    /// Consumes the expected token or returns an error.
    fn expect(&mut self, token: &Token<'_>, expected: &'static str) -> ExpressionResult<()> {
        if self.matches(token) { Ok(()) } else { Err(self.unexpected(expected)) }
    }

    /// Ensures the parser is at end-of-input.
    fn expect_eof(&self) -> ExpressionResult<()> {
        if matches!(self.current().token, Token::Eof) {
            Ok(())
        } else {
            Err(ExpressionError::syntax(
                format!("unexpected trailing input `{}`", describe(&self.current().token)),
                self.position(),
            ))
        }
    }

    /// Consumes the token if it matches the expected kind.
    fn matches(&mut self, kind: &Token<'_>) -> bool {
        if std::mem::discriminant(&self.current().token) == std::mem::discriminant(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Returns the current token.
    fn current(&self) -> &SpannedToken<'input> {
        // The stream always ends with `Eof` and `advance` never passes it.
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[self.index.min(last)]
    }

    /// Returns the token `ahead` positions past the current one.
    fn peek(&self, ahead: usize) -> Option<&Token<'input>> {
        self.tokens.get(self.index + ahead).map(|spanned| &spanned.token)
    }

    /// Returns the byte offset of the current token.
    fn position(&self) -> usize {
        self.current().position
    }

    /// Advances to the next token.
    const fn advance(&mut self) {
        if self.index + 1 < self.tokens.len() {
            self.index += 1;
        }
    }

    /// Builds an "expected X, found Y" error at the current token.
    fn unexpected(&self, expected: &str) -> ExpressionError {
        ExpressionError::syntax(
            format!("expected {expected}, found `{}`", describe(&self.current().token)),
            self.position(),
        )
    }
}

/// Formats a token for diagnostics.
fn describe(token: &Token<'_>) -> String {
    let text = match token {
        Token::Ident(name) => return (*name).to_string(),
        Token::Number(number) => return crate::value::format_number(*number),
        Token::Str(text) => return format!("'{text}'"),
        Token::True => "true",
        Token::False => "false",
        Token::Null => "null",
        Token::Undefined => "undefined",
        Token::Typeof => "typeof",
        Token::Let => "const",
        Token::Return => "return",
        Token::If => "if",
        Token::Else => "else",
        Token::Function => "function",
        Token::LParen => "(",
        Token::RParen => ")",
        Token::LBracket => "[",
        Token::RBracket => "]",
        Token::LBrace => "{",
        Token::RBrace => "}",
        Token::Comma => ",",
        Token::Semicolon => ";",
        Token::Dot => ".",
        Token::OptionalDot => "?.",
        Token::Question => "?",
        Token::Colon => ":",
        Token::Nullish => "??",
        Token::Or => "||",
        Token::And => "&&",
        Token::Not => "!",
        Token::LooseEq => "==",
        Token::LooseNe => "!=",
        Token::StrictEq => "===",
        Token::StrictNe => "!==",
        Token::Lt => "<",
        Token::Le => "<=",
        Token::Gt => ">",
        Token::Ge => ">=",
        Token::Plus => "+",
        Token::Minus => "-",
        Token::Star => "*",
        Token::Slash => "/",
        Token::Percent => "%",
        Token::Assign => "=",
        Token::Arrow => "=>",
        Token::Eof => "end of input",
    };
    text.to_string()
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only assertions are permitted."
    )]

    use super::ParseLimits;
    use super::parse;
    use crate::ast::BinaryOp;
    use crate::ast::Expr;
    use crate::ast::Stmt;
    use crate::error::ExpressionError;

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        let program = parse("1 + 2 * 3", ParseLimits::default()).unwrap();
        let Expr::Binary {
            op: BinaryOp::Add,
            right,
            ..
        } = program.root
        else {
            panic!("expected addition at the root");
        };
        assert!(matches!(
            *right,
            Expr::Binary {
                op: BinaryOp::Mul,
                ..
            }
        ));
    }

    #[test]
    fn parses_arrow_invocation_with_statements() {
        let source = "(() => { const total = a + b; if (total > 3) { return 'big'; } else return 'small'; })()";
        let program = parse(source, ParseLimits::default()).unwrap();
        let Expr::Invoke(block) = program.root else {
            panic!("expected invocation");
        };
        assert_eq!(block.statements.len(), 2);
        assert!(matches!(block.statements[0], Stmt::Bind { .. }));
        assert!(matches!(block.statements[1], Stmt::If { else_branch: Some(_), .. }));
    }

    #[test]
    fn call_arguments_spill_past_inline_capacity() {
        let program = parse("Math.max(1, 2, f(3), 4, 5, 6)", ParseLimits::default()).unwrap();
        let Expr::Call {
            args,
            ..
        } = program.root
        else {
            panic!("expected call at the root");
        };
        assert_eq!(args.len(), 6);
        assert!(args.spilled());
        assert!(matches!(*args[2], Expr::Call { .. }));
    }

    #[test]
    fn parses_function_keyword_invocation() {
        let program = parse("(function () { return 1; })()", ParseLimits::default()).unwrap();
        assert!(matches!(program.root, Expr::Invoke(_)));
    }

    #[test]
    fn uninvoked_function_is_rejected() {
        let err = parse("(() => 1)", ParseLimits::default()).unwrap_err();
        assert!(matches!(err, ExpressionError::Syntax { .. }));
    }

    #[test]
    fn rejects_object_literals_and_assignment() {
        assert!(parse("{ a: 1 }", ParseLimits::default()).is_err());
        assert!(parse("(() => { x = 1; })()", ParseLimits::default()).is_err());
    }

    #[test]
    fn enforces_nesting_limit() {
        let limits = ParseLimits {
            max_nesting: 4,
            ..ParseLimits::default()
        };
        let err = parse("((((((1))))))", limits).unwrap_err();
        assert!(matches!(err, ExpressionError::TooDeep { max_depth: 4, .. }));
    }

    #[test]
    fn enforces_size_limit() {
        let limits = ParseLimits {
            max_bytes: 4,
            ..ParseLimits::default()
        };
        let err = parse("1 + 2 + 3", limits).unwrap_err();
        assert_eq!(err, ExpressionError::TooLarge { max_bytes: 4, actual_bytes: 9 });
    }

    #[test]
    fn enforces_chain_limit() {
        let source = vec!["1"; 600].join(" + ");
        let err = parse(&source, ParseLimits::default()).unwrap_err();
        assert!(matches!(err, ExpressionError::TooDeep { .. }));
    }

    #[test]
    fn reports_trailing_input() {
        let err = parse("a b", ParseLimits::default()).unwrap_err();
        assert!(matches!(err, ExpressionError::Syntax { position: 2, .. }));
    }
}
