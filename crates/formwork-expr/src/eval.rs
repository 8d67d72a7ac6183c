// crates/formwork-expr/src/eval.rs
// ============================================================================
// Module: Expression Interpreter
// Description: Tree-walking evaluation of compiled expression programs.
// Purpose: Evaluate programs against a host scope with script-like semantics.
// Dependencies: crate::{ast, error, value}
// ============================================================================

//! ## Overview
//! Evaluation is a pure function of the program and the [`Scope`]. The host
//! supplies identifier values (`fieldValue`, `formValue`, ...) and named
//! functions (`valueOf`, custom functions); the interpreter supplies a small
//! fixed library (`Number`, `String`, `Boolean`, `Math.*`, `Array.isArray`,
//! `Object.keys` and common string/array methods).
//!
//! Unknown identifiers read as `undefined` and property access is lenient:
//! reading a property of `null` or `undefined` yields `undefined`. Calling a
//! method on `null`/`undefined`, calling an unknown function and redeclaring
//! a binding are runtime errors. Optional chaining (`?.`) short-circuits the
//! remainder of the chain.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use crate::ast::BinaryOp;
use crate::ast::Block;
use crate::ast::Expr;
use crate::ast::LogicalOp;
use crate::ast::Program;
use crate::ast::Stmt;
use crate::ast::UnaryOp;
use crate::error::ExpressionError;
use crate::error::ExpressionResult;
use crate::value::ExprValue;
use crate::value::len_as_f64;

// ============================================================================
// SECTION: Scope
// ============================================================================

/// Host bindings visible to an expression.
pub trait Scope {
    /// Resolves a free identifier; `None` means "not defined".
    fn lookup(&self, name: &str) -> Option<ExprValue>;

    /// Calls a host function by name; `None` means "no such function".
    fn call(&self, name: &str, args: &[ExprValue]) -> Option<Result<ExprValue, String>> {
        let _ = (name, args);
        None
    }

    /// Calls a registered custom function (`customFunctions.name(...)`).
    fn call_custom(&self, name: &str, args: &[ExprValue]) -> Option<Result<ExprValue, String>> {
        let _ = (name, args);
        None
    }
}

/// Scope backed by a fixed set of named values and no host functions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapScope {
    /// Bound identifiers.
    values: BTreeMap<String, ExprValue>,
}

impl MapScope {
    /// Creates an empty scope.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a binding, returning the updated scope.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ExprValue>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }
}

impl Scope for MapScope {
    fn lookup(&self, name: &str) -> Option<ExprValue> {
        self.values.get(name).cloned()
    }
}

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// Evaluates a compiled program against a scope.
///
/// # Errors
///
/// Returns [`ExpressionError::Runtime`] when evaluation fails.
pub fn evaluate(program: &Program, scope: &dyn Scope) -> ExpressionResult<ExprValue> {
    Interpreter {
        scope,
        frames: Vec::new(),
    }
    .eval(&program.root)
}

// ============================================================================
// SECTION: Interpreter
// ============================================================================

/// Result of evaluating a chain link.
enum Flow {
    /// Ordinary value.
    Value(ExprValue),
    /// Optional chain hit `null`/`undefined`; the whole chain is `undefined`.
    Short,
}

/// Outcome of executing a statement.
enum Completion {
    /// Continue with the next statement.
    Normal,
    /// A `return` was executed.
    Return(ExprValue),
}

/// Namespaces callable as `Namespace.method(...)`.
const NAMESPACES: &[&str] = &["Math", "Array", "Object", "customFunctions"];

/// Evaluation state for one program run.
struct Interpreter<'s> {
    /// Host bindings.
    scope: &'s dyn Scope,
    /// Lexical frames for self-invoking function bodies, innermost last.
    frames: Vec<BTreeMap<String, ExprValue>>,
}

impl Interpreter<'_> {
    /// Evaluates an expression to a value.
    fn eval(&mut self, expr: &Expr) -> ExpressionResult<ExprValue> {
        Ok(match self.eval_flow(expr)? {
            Flow::Value(value) => value,
            Flow::Short => ExprValue::Undefined,
        })
    }

    /// Evaluates an expression, propagating optional-chain short circuits.
    fn eval_flow(&mut self, expr: &Expr) -> ExpressionResult<Flow> {
        match expr {
            Expr::Member {
                object,
                property,
                optional,
            } => {
                let Flow::Value(receiver) = self.eval_flow(object)? else {
                    return Ok(Flow::Short);
                };
                if *optional && receiver.is_nullish() {
                    return Ok(Flow::Short);
                }
                Ok(Flow::Value(receiver.property(property)))
            }
            Expr::Index {
                object,
                index,
                optional,
            } => {
                let Flow::Value(receiver) = self.eval_flow(object)? else {
                    return Ok(Flow::Short);
                };
                if *optional && receiver.is_nullish() {
                    return Ok(Flow::Short);
                }
                let key = self.eval(index)?;
                Ok(Flow::Value(receiver.index(&key)))
            }
            Expr::Call {
                callee,
                args,
                optional,
            } => self.eval_call(callee, args, *optional),
            other => self.eval_plain(other).map(Flow::Value),
        }
    }

    /// Evaluates non-chain expressions.
    fn eval_plain(&mut self, expr: &Expr) -> ExpressionResult<ExprValue> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Ident(name) => Ok(self.resolve(name)),
            Expr::Array(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval(item)?);
                }
                Ok(ExprValue::Array(values))
            }
            Expr::Unary {
                op,
                operand,
            } => self.eval_unary(*op, operand),
            Expr::Binary {
                op,
                left,
                right,
            } => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                Ok(binary(*op, &left, &right))
            }
            Expr::Logical {
                op,
                left,
                right,
            } => {
                let left = self.eval(left)?;
                let take_left = match op {
                    LogicalOp::And => !left.truthy(),
                    LogicalOp::Or => left.truthy(),
                    LogicalOp::Nullish => !left.is_nullish(),
                };
                if take_left { Ok(left) } else { self.eval(right) }
            }
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => {
                if self.eval(test)?.truthy() {
                    self.eval(consequent)
                } else {
                    self.eval(alternate)
                }
            }
            Expr::Invoke(block) => match self.exec_block(block)? {
                Completion::Return(value) => Ok(value),
                Completion::Normal => Ok(ExprValue::Undefined),
            },
            Expr::Member {
                ..
            }
            | Expr::Index {
                ..
            }
            | Expr::Call {
                ..
            } => self.eval(expr),
        }
    }

    /// Evaluates a unary operation.
    fn eval_unary(&mut self, op: UnaryOp, operand: &Expr) -> ExpressionResult<ExprValue> {
        let value = self.eval(operand)?;
        Ok(match op {
            UnaryOp::Typeof => ExprValue::from(value.type_name()),
            UnaryOp::Not => ExprValue::Bool(!value.truthy()),
            UnaryOp::Negate => ExprValue::Number(-value.to_number()),
            UnaryOp::Plus => ExprValue::Number(value.to_number()),
        })
    }

    /// Evaluates a call expression.
    fn eval_call(
        &mut self,
        callee: &Expr,
        args: &[Box<Expr>],
        optional: bool,
    ) -> ExpressionResult<Flow> {
        match callee {
            Expr::Ident(name) => {
                let values = self.eval_args(args)?;
                match self.call_function(name, &values) {
                    Some(result) => result.map(Flow::Value),
                    None if optional => Ok(Flow::Short),
                    None => Err(ExpressionError::runtime(format!("{name} is not a function"))),
                }
            }
            Expr::Member {
                object,
                property,
                optional: member_optional,
            } => {
                if let Expr::Ident(namespace) = object.as_ref()
                    && NAMESPACES.contains(&namespace.as_str())
                    && self.lookup_local(namespace).is_none()
                {
                    let values = self.eval_args(args)?;
                    return match self.call_namespace(namespace, property, &values) {
                        Some(result) => result.map(Flow::Value),
                        None if optional => Ok(Flow::Short),
                        None => Err(ExpressionError::runtime(format!(
                            "{namespace}.{property} is not a function"
                        ))),
                    };
                }
                let Flow::Value(receiver) = self.eval_flow(object)? else {
                    return Ok(Flow::Short);
                };
                if receiver.is_nullish() {
                    if *member_optional {
                        return Ok(Flow::Short);
                    }
                    return Err(ExpressionError::runtime(format!(
                        "cannot read properties of {} (reading '{property}')",
                        receiver.to_display_string()
                    )));
                }
                let values = self.eval_args(args)?;
                match call_method(&receiver, property, &values) {
                    Some(value) => Ok(Flow::Value(value)),
                    None if optional => Ok(Flow::Short),
                    None => Err(ExpressionError::runtime(format!(
                        "{property} is not a function on {}",
                        receiver.type_name()
                    ))),
                }
            }
            _ => {
                let Flow::Value(value) = self.eval_flow(callee)? else {
                    return Ok(Flow::Short);
                };
                if optional && value.is_nullish() {
                    return Ok(Flow::Short);
                }
                Err(ExpressionError::runtime(format!(
                    "{} is not a function",
                    value.type_name()
                )))
            }
        }
    }

    /// Evaluates call arguments left to right.
    fn eval_args(&mut self, args: &[Box<Expr>]) -> ExpressionResult<Vec<ExprValue>> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval(arg)?);
        }
        Ok(values)
    }

    /// Calls a global function (built-in first, then host).
    fn call_function(&self, name: &str, args: &[ExprValue]) -> Option<ExpressionResult<ExprValue>> {
        if let Some(value) = call_global(name, args) {
            return Some(Ok(value));
        }
        self.scope.call(name, args).map(|result| result.map_err(ExpressionError::Runtime))
    }

    /// Calls `Namespace.method(...)`.
    fn call_namespace(
        &self,
        namespace: &str,
        method: &str,
        args: &[ExprValue],
    ) -> Option<ExpressionResult<ExprValue>> {
        match namespace {
            "Math" => call_math(method, args).map(Ok),
            "Array" => (method == "isArray")
                .then(|| Ok(ExprValue::Bool(matches!(args.first(), Some(ExprValue::Array(_)))))),
            "Object" => call_object(method, args).map(Ok),
            "customFunctions" => self
                .scope
                .call_custom(method, args)
                .map(|result| result.map_err(ExpressionError::Runtime)),
            _ => None,
        }
    }

    /// Resolves an identifier; unknown names read as `undefined`.
    fn resolve(&self, name: &str) -> ExprValue {
        self.lookup_binding(name).unwrap_or_default()
    }

    /// Resolves an identifier through local frames then the host scope.
    fn lookup_binding(&self, name: &str) -> Option<ExprValue> {
        self.lookup_local(name).or_else(|| self.scope.lookup(name))
    }

    /// Resolves an identifier in local frames only.
    fn lookup_local(&self, name: &str) -> Option<ExprValue> {
        self.frames.iter().rev().find_map(|frame| frame.get(name).cloned())
    }

    /// Executes a block in a fresh lexical frame.
    fn exec_block(&mut self, block: &Block) -> ExpressionResult<Completion> {
        self.frames.push(BTreeMap::new());
        let result = self.exec_statements(&block.statements);
        self.frames.pop();
        result
    }

    /// Executes statements until one returns.
    fn exec_statements(&mut self, statements: &[Stmt]) -> ExpressionResult<Completion> {
        for stmt in statements {
            match stmt {
                Stmt::Bind {
                    name,
                    init,
                    position,
                } => {
                    let value = self.eval(init)?;
                    let Some(frame) = self.frames.last_mut() else {
                        return Err(ExpressionError::runtime("binding outside of a function body"));
                    };
                    if frame.contains_key(name) {
                        return Err(ExpressionError::runtime(format!(
                            "identifier '{name}' has already been declared (at {position})"
                        )));
                    }
                    frame.insert(name.clone(), value);
                }
                Stmt::If {
                    test,
                    then_branch,
                    else_branch,
                } => {
                    let completion = if self.eval(test)?.truthy() {
                        self.exec_block(then_branch)?
                    } else if let Some(branch) = else_branch {
                        self.exec_block(branch)?
                    } else {
                        Completion::Normal
                    };
                    if let Completion::Return(_) = completion {
                        return Ok(completion);
                    }
                }
                Stmt::Return(value) => {
                    let value = match value {
                        Some(expr) => self.eval(expr)?,
                        None => ExprValue::Undefined,
                    };
                    return Ok(Completion::Return(value));
                }
                Stmt::Expr(expr) => {
                    self.eval(expr)?;
                }
            }
        }
        Ok(Completion::Normal)
    }
}

// ============================================================================
// SECTION: Operators
// ============================================================================

/// Applies a binary operator.
fn binary(op: BinaryOp, left: &ExprValue, right: &ExprValue) -> ExprValue {
    match op {
        BinaryOp::LooseEq => ExprValue::Bool(left.loose_equals(right)),
        BinaryOp::LooseNe => ExprValue::Bool(!left.loose_equals(right)),
        BinaryOp::StrictEq => ExprValue::Bool(left.strict_equals(right)),
        BinaryOp::StrictNe => ExprValue::Bool(!left.strict_equals(right)),
        BinaryOp::Lt => ExprValue::Bool(compare(left, right, |ord| ord.is_lt())),
        BinaryOp::Le => ExprValue::Bool(compare(left, right, |ord| ord.is_le())),
        BinaryOp::Gt => ExprValue::Bool(compare(left, right, |ord| ord.is_gt())),
        BinaryOp::Ge => ExprValue::Bool(compare(left, right, |ord| ord.is_ge())),
        BinaryOp::Add => add(left, right),
        BinaryOp::Sub => ExprValue::Number(left.to_number() - right.to_number()),
        BinaryOp::Mul => ExprValue::Number(left.to_number() * right.to_number()),
        BinaryOp::Div => ExprValue::Number(left.to_number() / right.to_number()),
        BinaryOp::Rem => ExprValue::Number(left.to_number() % right.to_number()),
    }
}

/// `+`: string concatenation when either side is non-numeric, else addition.
fn add(left: &ExprValue, right: &ExprValue) -> ExprValue {
    let concatenates = |value: &ExprValue| {
        matches!(value, ExprValue::String(_) | ExprValue::Array(_) | ExprValue::Object(_))
    };
    if concatenates(left) || concatenates(right) {
        return ExprValue::String(format!(
            "{}{}",
            left.to_display_string(),
            right.to_display_string()
        ));
    }
    ExprValue::Number(left.to_number() + right.to_number())
}

/// Relational comparison; strings compare lexically, everything else
/// numerically, and `NaN` never compares.
fn compare(left: &ExprValue, right: &ExprValue, test: fn(std::cmp::Ordering) -> bool) -> bool {
    if let (ExprValue::String(a), ExprValue::String(b)) = (left, right) {
        return test(a.cmp(b));
    }
    left.to_number().partial_cmp(&right.to_number()).is_some_and(test)
}

// ============================================================================
// SECTION: Built-in Library
// ============================================================================

/// Global built-in functions.
fn call_global(name: &str, args: &[ExprValue]) -> Option<ExprValue> {
    let first = args.first().cloned().unwrap_or_default();
    Some(match name {
        "Number" => ExprValue::Number(if args.is_empty() { 0.0 } else { first.to_number() }),
        "String" => ExprValue::String(if args.is_empty() {
            String::new()
        } else {
            first.to_display_string()
        }),
        "Boolean" => ExprValue::Bool(first.truthy()),
        "isNaN" => ExprValue::Bool(first.to_number().is_nan()),
        "parseFloat" => ExprValue::Number(parse_float_prefix(&first.to_display_string())),
        "parseInt" => ExprValue::Number(parse_int_prefix(&first.to_display_string())),
        _ => return None,
    })
}

/// `Math.*` functions.
fn call_math(method: &str, args: &[ExprValue]) -> Option<ExprValue> {
    let numbers: Vec<f64> = args.iter().map(ExprValue::to_number).collect();
    let first = numbers.first().copied().unwrap_or(f64::NAN);
    let value = match method {
        "min" => numbers.iter().copied().fold(f64::INFINITY, |acc, n| {
            if acc.is_nan() || n.is_nan() { f64::NAN } else { acc.min(n) }
        }),
        "max" => numbers.iter().copied().fold(f64::NEG_INFINITY, |acc, n| {
            if acc.is_nan() || n.is_nan() { f64::NAN } else { acc.max(n) }
        }),
        "abs" => first.abs(),
        "floor" => first.floor(),
        "ceil" => first.ceil(),
        "round" => (first + 0.5).floor(),
        "trunc" => first.trunc(),
        "sign" => {
            if first.is_nan() || first == 0.0 {
                first
            } else {
                first.signum()
            }
        }
        "sqrt" => first.sqrt(),
        "pow" => first.powf(numbers.get(1).copied().unwrap_or(f64::NAN)),
        _ => return None,
    };
    Some(ExprValue::Number(value))
}

/// `Object.*` functions.
fn call_object(method: &str, args: &[ExprValue]) -> Option<ExprValue> {
    let map = match args.first() {
        Some(ExprValue::Object(map)) => Some(map),
        _ => None,
    };
    match method {
        "keys" => Some(ExprValue::Array(
            map.map(|map| map.keys().map(|key| ExprValue::from(key.as_str())).collect())
                .unwrap_or_default(),
        )),
        "values" => Some(ExprValue::Array(
            map.map(|map| map.values().cloned().collect()).unwrap_or_default(),
        )),
        _ => None,
    }
}

/// Calls a method on a non-nullish receiver.
fn call_method(receiver: &ExprValue, method: &str, args: &[ExprValue]) -> Option<ExprValue> {
    if method == "toString" {
        return Some(ExprValue::String(receiver.to_display_string()));
    }
    match receiver {
        ExprValue::String(text) => string_method(text, method, args),
        ExprValue::Array(items) => array_method(items, method, args),
        ExprValue::Number(number) => number_method(*number, method, args),
        _ => None,
    }
}

/// String methods.
fn string_method(text: &str, method: &str, args: &[ExprValue]) -> Option<ExprValue> {
    let arg = |index: usize| args.get(index).cloned().unwrap_or_default();
    let needle = || arg(0).to_display_string();
    let chars: Vec<char> = text.chars().collect();
    Some(match method {
        "includes" => ExprValue::Bool(text.contains(needle().as_str())),
        "startsWith" => ExprValue::Bool(text.starts_with(needle().as_str())),
        "endsWith" => ExprValue::Bool(text.ends_with(needle().as_str())),
        "indexOf" => ExprValue::Number(
            text.find(needle().as_str())
                .map_or(-1.0, |byte| len_as_f64(text[.. byte].chars().count())),
        ),
        "trim" => ExprValue::from(text.trim()),
        "toLowerCase" => ExprValue::String(text.to_lowercase()),
        "toUpperCase" => ExprValue::String(text.to_uppercase()),
        "charAt" => ExprValue::String(
            chars
                .get(relative_index(&arg(0), chars.len(), 0))
                .map(char::to_string)
                .unwrap_or_default(),
        ),
        "slice" | "substring" => {
            let start = relative_index(&arg(0), chars.len(), 0);
            let end = relative_index(&arg(1), chars.len(), chars.len());
            ExprValue::String(if start < end {
                chars[start .. end].iter().collect()
            } else {
                String::new()
            })
        }
        "split" => {
            let separator = arg(0);
            let parts: Vec<ExprValue> = match separator {
                ExprValue::Undefined => vec![ExprValue::from(text)],
                other => {
                    let separator = other.to_display_string();
                    if separator.is_empty() {
                        chars.iter().map(|ch| ExprValue::String(ch.to_string())).collect()
                    } else {
                        text.split(separator.as_str()).map(ExprValue::from).collect()
                    }
                }
            };
            ExprValue::Array(parts)
        }
        _ => return None,
    })
}

/// Array methods.
fn array_method(items: &[ExprValue], method: &str, args: &[ExprValue]) -> Option<ExprValue> {
    let target = args.first().cloned().unwrap_or_default();
    Some(match method {
        "includes" => ExprValue::Bool(items.iter().any(|item| same_value_zero(item, &target))),
        "indexOf" => ExprValue::Number(
            items
                .iter()
                .position(|item| item.strict_equals(&target))
                .map_or(-1.0, len_as_f64),
        ),
        "join" => {
            let separator = match target {
                ExprValue::Undefined => ",".to_string(),
                other => other.to_display_string(),
            };
            ExprValue::String(
                items
                    .iter()
                    .map(|item| {
                        if item.is_nullish() { String::new() } else { item.to_display_string() }
                    })
                    .collect::<Vec<_>>()
                    .join(&separator),
            )
        }
        "slice" => {
            let start = relative_index(&target, items.len(), 0);
            let bound = args.get(1).cloned().unwrap_or_default();
            let end = relative_index(&bound, items.len(), items.len());
            ExprValue::Array(if start < end { items[start .. end].to_vec() } else { Vec::new() })
        }
        _ => return None,
    })
}

/// Number methods.
fn number_method(number: f64, method: &str, args: &[ExprValue]) -> Option<ExprValue> {
    match method {
        "toFixed" => {
            let digits = relative_index(&args.first().cloned().unwrap_or_default(), 100, 0);
            Some(ExprValue::String(format!("{number:.digits$}")))
        }
        _ => None,
    }
}

/// `SameValueZero` comparison used by `includes`.
fn same_value_zero(left: &ExprValue, right: &ExprValue) -> bool {
    match (left, right) {
        (ExprValue::Number(a), ExprValue::Number(b)) if a.is_nan() && b.is_nan() => true,
        _ => left.strict_equals(right),
    }
}

/// Resolves a `slice`-style index: negative counts from the end, the result
/// is clamped to `0..=len`, and `undefined` yields `default`.
fn relative_index(value: &ExprValue, len: usize, default: usize) -> usize {
    if matches!(value, ExprValue::Undefined) {
        return default;
    }
    let number = value.to_number();
    if number.is_nan() {
        return 0;
    }
    let len_f = len_as_f64(len);
    let resolved = if number < 0.0 {
        (len_f + number.trunc()).max(0.0)
    } else {
        number.trunc().min(len_f)
    };
    float_to_index(resolved).min(len)
}

/// Converts a non-negative, already clamped float into an index.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "Callers clamp the value to 0..=len before conversion."
)]
fn float_to_index(value: f64) -> usize {
    value as usize
}

/// Parses the longest numeric prefix (`parseFloat` semantics).
fn parse_float_prefix(text: &str) -> f64 {
    let trimmed = text.trim_start();
    if trimmed.starts_with("Infinity") || trimmed.starts_with("+Infinity") {
        return f64::INFINITY;
    }
    if trimmed.starts_with("-Infinity") {
        return f64::NEG_INFINITY;
    }
    if !trimmed.starts_with(|ch: char| ch.is_ascii_digit() || matches!(ch, '.' | '-' | '+')) {
        return f64::NAN;
    }
    let mut best = f64::NAN;
    for (index, _) in trimmed.char_indices().skip(1).chain(std::iter::once((trimmed.len(), ' '))) {
        if let Ok(value) = trimmed[.. index].parse::<f64>() {
            best = value;
        }
    }
    best
}

/// Parses a leading base-10 integer (`parseInt` semantics).
fn parse_int_prefix(text: &str) -> f64 {
    let trimmed = text.trim_start();
    let (sign, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (-1.0, &trimmed[1 ..]),
        Some(b'+') => (1.0, &trimmed[1 ..]),
        _ => (1.0, trimmed),
    };
    let end = digits.find(|ch: char| !ch.is_ascii_digit()).unwrap_or(digits.len());
    if end == 0 {
        return f64::NAN;
    }
    digits[.. end].parse::<f64>().map_or(f64::NAN, |value| sign * value)
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

    use serde_json::json;

    use super::MapScope;
    use super::Scope;
    use super::evaluate;
    use crate::error::ExpressionError;
    use crate::parser::ParseLimits;
    use crate::parser::parse;
    use crate::value::ExprValue;

    fn run(source: &str, scope: &dyn Scope) -> Result<ExprValue, ExpressionError> {
        evaluate(&parse(source, ParseLimits::default())?, scope)
    }

    fn form() -> MapScope {
        MapScope::new().with("formValue", json!({"qty": 3, "price": 4, "name": " Ada ", "tags": ["a", "b"]}))
    }

    #[test]
    fn arithmetic_with_defaults() {
        let value = run("(formValue.qty || 0) * (formValue.price || 0)", &form()).unwrap();
        assert_eq!(value, ExprValue::Number(12.0));
    }

    #[test]
    fn long_argument_lists_evaluate_in_order() {
        let value = run("Math.max(1, formValue.qty, 9, formValue.price, 2, 7)", &form()).unwrap();
        assert_eq!(value, ExprValue::Number(9.0));
    }

    #[test]
    fn optional_chain_short_circuits_whole_chain() {
        let value = run("formValue.missing?.deep.deeper.trim()", &form()).unwrap();
        assert_eq!(value, ExprValue::Undefined);
    }

    #[test]
    fn method_on_undefined_is_runtime_error() {
        let err = run("formValue.missing.trim()", &form()).unwrap_err();
        assert!(matches!(err, ExpressionError::Runtime(_)));
    }

    #[test]
    fn unknown_function_is_runtime_error() {
        let err = run("launch(1)", &form()).unwrap_err();
        assert_eq!(err, ExpressionError::Runtime("launch is not a function".to_string()));
    }

    #[test]
    fn string_and_array_methods() {
        assert_eq!(run("formValue.name.trim().toUpperCase()", &form()).unwrap(), ExprValue::from("ADA"));
        assert_eq!(run("formValue.tags.includes('b')", &form()).unwrap(), ExprValue::Bool(true));
        assert_eq!(run("formValue.tags.join('-')", &form()).unwrap(), ExprValue::from("a-b"));
        assert_eq!(run("'abcdef'.slice(-2)", &form()).unwrap(), ExprValue::from("ef"));
    }

    #[test]
    fn invocation_scopes_bindings() {
        let source = "(() => { const total = formValue.qty * formValue.price; if (total > 10) { const label = 'big'; return label; } return 'small'; })()";
        assert_eq!(run(source, &form()).unwrap(), ExprValue::from("big"));
    }

    #[test]
    fn redeclaration_fails() {
        let err = run("(() => { const a = 1; const a = 2; return a; })()", &form()).unwrap_err();
        assert!(matches!(err, ExpressionError::Runtime(_)));
    }

    #[test]
    fn unknown_identifiers_are_undefined() {
        assert_eq!(run("typeof nothing", &form()).unwrap(), ExprValue::from("undefined"));
        assert_eq!(run("typeof formValue.qty", &form()).unwrap(), ExprValue::from("number"));
        assert_eq!(run("nothing", &form()).unwrap(), ExprValue::Undefined);
    }

    #[test]
    fn math_and_conversions() {
        assert_eq!(run("Math.max(1, '7', 3)", &form()).unwrap(), ExprValue::Number(7.0));
        assert_eq!(run("Math.round(2.5)", &form()).unwrap(), ExprValue::Number(3.0));
        assert_eq!(run("Number('12') + 1", &form()).unwrap(), ExprValue::Number(13.0));
        assert_eq!(run("parseInt('42px')", &form()).unwrap(), ExprValue::Number(42.0));
        assert_eq!(run("(1.005).toFixed(1)", &form()).unwrap(), ExprValue::from("1.0"));
    }

    #[test]
    fn nullish_keeps_falsy_values() {
        let scope = MapScope::new().with("x", 0.0);
        assert_eq!(run("x ?? 5", &scope).unwrap(), ExprValue::Number(0.0));
        assert_eq!(run("x || 5", &scope).unwrap(), ExprValue::Number(5.0));
    }
}
