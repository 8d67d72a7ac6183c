// crates/formwork-expr/src/ast.rs
// ============================================================================
// Module: Expression Syntax Tree
// Description: Parsed representation of restricted expressions.
// Purpose: Provide an immutable program tree plus static reference analysis.
// Dependencies: crate::value, smallvec
// ============================================================================

//! ## Overview
//! A [`Program`] is the compiled, shareable form of an expression string. The
//! tree is immutable once built, so programs are cached and evaluated from
//! many call sites. [`Program::references`] walks the tree to list the form
//! fields an expression reads, which the cross-field validator detector uses.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use smallvec::SmallVec;

use crate::value::ExprValue;

// ============================================================================
// SECTION: Operators
// ============================================================================

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// Logical negation `!`.
    Not,
    /// Numeric negation `-`.
    Negate,
    /// Numeric conversion `+`.
    Plus,
    /// `typeof`.
    Typeof,
}

/// Binary (non short-circuit) operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
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
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Rem,
}

/// Short-circuit operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    /// `&&`
    And,
    /// `||`
    Or,
    /// `??`
    Nullish,
}

// ============================================================================
// SECTION: Nodes
// ============================================================================

/// Call argument list; most calls take few arguments.
pub type Args = SmallVec<[Box<Expr>; 4]>;

/// Expression node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Literal value.
    Literal(ExprValue),
    /// Identifier lookup.
    Ident(String),
    /// Array literal.
    Array(Vec<Expr>),
    /// Static member access `object.property` / `object?.property`.
    Member {
        /// Receiver expression.
        object: Box<Expr>,
        /// Property name.
        property: String,
        /// True for `?.`.
        optional: bool,
    },
    /// Computed member access `object[index]` / `object?.[index]`.
    Index {
        /// Receiver expression.
        object: Box<Expr>,
        /// Key expression.
        index: Box<Expr>,
        /// True for `?.[`.
        optional: bool,
    },
    /// Call `callee(args)` / `callee?.(args)`.
    Call {
        /// Callee expression (identifier or member).
        callee: Box<Expr>,
        /// Argument expressions.
        args: Args,
        /// True for `?.(`.
        optional: bool,
    },
    /// Unary operation.
    Unary {
        /// Operator.
        op: UnaryOp,
        /// Operand.
        operand: Box<Expr>,
    },
    /// Binary operation.
    Binary {
        /// Operator.
        op: BinaryOp,
        /// Left operand.
        left: Box<Expr>,
        /// Right operand.
        right: Box<Expr>,
    },
    /// Short-circuit operation.
    Logical {
        /// Operator.
        op: LogicalOp,
        /// Left operand.
        left: Box<Expr>,
        /// Right operand.
        right: Box<Expr>,
    },
    /// Ternary `test ? consequent : alternate`.
    Conditional {
        /// Condition.
        test: Box<Expr>,
        /// Value when truthy.
        consequent: Box<Expr>,
        /// Value when falsy.
        alternate: Box<Expr>,
    },
    /// Self-invoking function body.
    Invoke(Block),
}

/// Statement inside a self-invoking function body.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// `const name = init;` or `let name = init;`
    Bind {
        /// Binding name.
        name: String,
        /// Initializer.
        init: Expr,
        /// Byte offset of the declaration.
        position: usize,
    },
    /// `if (test) { ... } else { ... }`
    If {
        /// Condition.
        test: Expr,
        /// Branch taken when truthy.
        then_branch: Block,
        /// Optional branch taken when falsy.
        else_branch: Option<Block>,
    },
    /// `return value;`
    Return(Option<Expr>),
    /// Bare expression statement (evaluated, result discarded).
    Expr(Expr),
}

/// Ordered statement list.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Block {
    /// Statements in source order.
    pub statements: Vec<Stmt>,
}

/// Compiled expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    /// Original expression text.
    pub source: String,
    /// Root expression.
    pub root: Expr,
}

// ============================================================================
// SECTION: Reference Analysis
// ============================================================================

/// Static summary of the data an expression reads.
///
/// # Invariants
/// - `form_keys` holds statically known paths read from the form root
///   (`formValue.a`, `formValue['a']`, `valueOf('a.b')`).
/// - `dynamic_form_access` is set when the root is read in a way whose key
///   cannot be known without evaluating (`formValue[key]`, bare `formValue`).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct References {
    /// Form paths read statically.
    pub form_keys: BTreeSet<String>,
    /// True when `fieldValue` is read.
    pub field_value: bool,
    /// True when the form root is read with a non-static key.
    pub dynamic_form_access: bool,
    /// Names of functions called by identifier.
    pub calls: BTreeSet<String>,
}

/// Identifiers bound to the form root.
const ROOT_IDENTS: &[&str] = &["formValue", "rootValue"];

impl Program {
    /// Collects the static references made by this program.
    #[must_use]
    pub fn references(&self) -> References {
        let mut refs = References::default();
        collect_expr(&self.root, &mut refs);
        refs
    }
}

/// Walks an expression collecting references.
fn collect_expr(expr: &Expr, refs: &mut References) {
    match expr {
        Expr::Literal(_) => {}
        Expr::Ident(name) => {
            if name == "fieldValue" {
                refs.field_value = true;
            } else if ROOT_IDENTS.contains(&name.as_str()) {
                refs.dynamic_form_access = true;
            }
        }
        Expr::Array(items) => items.iter().for_each(|item| collect_expr(item, refs)),
        Expr::Member {
            object,
            property,
            ..
        } => {
            if let Some(root) = root_path(object) {
                refs.form_keys.insert(join_path(&root, property));
            } else {
                collect_expr(object, refs);
            }
        }
        Expr::Index {
            object,
            index,
            ..
        } => match (root_path(object), index.as_ref()) {
            (Some(root), Expr::Literal(ExprValue::String(key))) => {
                refs.form_keys.insert(join_path(&root, key));
            }
            (Some(_), other) => {
                refs.dynamic_form_access = true;
                collect_expr(other, refs);
            }
            (None, other) => {
                collect_expr(object, refs);
                collect_expr(other, refs);
            }
        },
        Expr::Call {
            callee,
            args,
            ..
        } => {
            if let Expr::Ident(name) = callee.as_ref() {
                refs.calls.insert(name.clone());
                if name == "valueOf" {
                    match args.first().map(Box::as_ref) {
                        Some(Expr::Literal(ExprValue::String(path))) => {
                            refs.form_keys.insert(path.clone());
                        }
                        Some(_) => refs.dynamic_form_access = true,
                        None => {}
                    }
                }
            } else {
                collect_expr(callee, refs);
            }
            args.iter().for_each(|arg| collect_expr(arg, refs));
        }
        Expr::Unary {
            operand,
            ..
        } => collect_expr(operand, refs),
        Expr::Binary {
            left,
            right,
            ..
        }
        | Expr::Logical {
            left,
            right,
            ..
        } => {
            collect_expr(left, refs);
            collect_expr(right, refs);
        }
        Expr::Conditional {
            test,
            consequent,
            alternate,
        } => {
            collect_expr(test, refs);
            collect_expr(consequent, refs);
            collect_expr(alternate, refs);
        }
        Expr::Invoke(block) => collect_block(block, refs),
    }
}

/// Walks a block collecting references.
fn collect_block(block: &Block, refs: &mut References) {
    for stmt in &block.statements {
        match stmt {
            Stmt::Bind {
                init,
                ..
            }
            | Stmt::Expr(init)
            | Stmt::Return(Some(init)) => collect_expr(init, refs),
            Stmt::Return(None) => {}
            Stmt::If {
                test,
                then_branch,
                else_branch,
            } => {
                collect_expr(test, refs);
                collect_block(then_branch, refs);
                if let Some(branch) = else_branch {
                    collect_block(branch, refs);
                }
            }
        }
    }
}

/// Returns the static path of `expr` when it is rooted at the form value.
///
/// `formValue` yields `""`, `formValue.a` yields `"a"`, `formValue.a.b`
/// yields `"a.b"`; anything else yields `None`.
fn root_path(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Ident(name) if ROOT_IDENTS.contains(&name.as_str()) => Some(String::new()),
        Expr::Member {
            object,
            property,
            ..
        } => root_path(object).map(|root| join_path(&root, property)),
        Expr::Index {
            object,
            index,
            ..
        } => match index.as_ref() {
            Expr::Literal(ExprValue::String(key)) => {
                root_path(object).map(|root| join_path(&root, key))
            }
            _ => None,
        },
        _ => None,
    }
}

/// Joins a dotted path with a key.
fn join_path(root: &str, key: &str) -> String {
    if root.is_empty() { key.to_string() } else { format!("{root}.{key}") }
}
