//! The AST produced by the parser.
//!
//! Node is a tagged variant rather than a virtual class hierarchy: the parser
//! builds these directly, and an evaluator (out of scope here) walks them
//! with whatever capability it needs (pretty-print, children, visitor).

use std::fmt;

use smallvec::{smallvec, SmallVec};
use strum_macros::IntoStaticStr;

/// A parsed expression together with its resolved parameter names, in index
/// order. This is what every [`crate::parse`] entry point returns.
#[derive(Debug, PartialEq)]
pub struct Function {
    pub root: Node,
    pub params: Vec<String>,
}

impl Function {
    pub fn new(root: Node, params: Vec<String>) -> Self {
        Function { root, params }
    }

    /// Whether parsing failed; the tree is an [`Node::Error`] iff this is true.
    pub fn has_error(&self) -> bool {
        matches!(self.root, Node::Error(_))
    }

    /// The bracketed diagnostic, or the empty string if parsing succeeded.
    pub fn get_error(&self) -> &str {
        match &self.root {
            Node::Error(msg) => msg,
            _ => "",
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.root, f)
    }
}

#[derive(Debug, PartialEq)]
pub enum Node {
    Number(f64),
    String(Vec<u8>),
    /// `>= 0`: a parameter index. `< 0`: a let-binding depth, `-(i + 1)`.
    Symbol(i64),
    Neg(Box<Node>),
    Not(Box<Node>),
    Array(Vec<Node>),
    If {
        cond: Box<Node>,
        true_expr: Box<Node>,
        false_expr: Box<Node>,
        p_true: f64,
    },
    Let {
        name: String,
        value: Box<Node>,
        body: Box<Node>,
    },
    Call {
        name: String,
        arity: usize,
        children: Vec<Node>,
    },
    BinaryOp {
        operator: String,
        precedence: i32,
        right_associative: bool,
        lhs: Box<Node>,
        rhs: Box<Node>,
    },
    TensorSum {
        child: Box<Node>,
        dimension: Option<String>,
    },
    TensorMap {
        child: Box<Node>,
        lambda: Box<Function>,
    },
    TensorJoin {
        lhs: Box<Node>,
        rhs: Box<Node>,
        lambda: Box<Function>,
    },
    /// Replaces the whole tree when parsing failed; carries the bracketed
    /// diagnostic built by `get_result`.
    Error(String),
}

/// Cheap leaf used by [`Node::take_children`] to hollow out a node without
/// allocating; the node being torn down never observes this value.
const PLACEHOLDER: Node = Node::Number(0.0);

impl Node {
    /// Direct children, for read-only traversal (pretty-printing, static
    /// checks, visitors). Most variants have at most 3 children, so this
    /// returns a `SmallVec` to keep the common case allocation-free.
    pub fn children(&self) -> SmallVec<[&Node; 4]> {
        match self {
            Node::Number(_) | Node::String(_) | Node::Symbol(_) | Node::Error(_) => smallvec![],
            Node::Neg(child) | Node::Not(child) => smallvec![child.as_ref()],
            Node::Array(children) => children.iter().collect(),
            Node::If {
                cond,
                true_expr,
                false_expr,
                ..
            } => smallvec![cond.as_ref(), true_expr.as_ref(), false_expr.as_ref()],
            Node::Let { value, body, .. } => smallvec![value.as_ref(), body.as_ref()],
            Node::Call { children, .. } => children.iter().collect(),
            Node::BinaryOp { lhs, rhs, .. } => smallvec![lhs.as_ref(), rhs.as_ref()],
            Node::TensorSum { child, .. } => smallvec![child.as_ref()],
            Node::TensorMap { child, lambda } => smallvec![child.as_ref(), &lambda.root],
            Node::TensorJoin { lhs, rhs, lambda } => {
                smallvec![lhs.as_ref(), rhs.as_ref(), &lambda.root]
            }
        }
    }

    /// Moves every direct child out of `self`, replacing them with trivial
    /// placeholders. Used only by the iterative [`Drop`] below.
    fn take_children(&mut self) -> Vec<Node> {
        match self {
            Node::Number(_) | Node::String(_) | Node::Symbol(_) | Node::Error(_) => vec![],
            Node::Neg(child) | Node::Not(child) => {
                vec![*std::mem::replace(child, Box::new(PLACEHOLDER))]
            }
            Node::Array(children) => std::mem::take(children),
            Node::If {
                cond,
                true_expr,
                false_expr,
                ..
            } => vec![
                *std::mem::replace(cond, Box::new(PLACEHOLDER)),
                *std::mem::replace(true_expr, Box::new(PLACEHOLDER)),
                *std::mem::replace(false_expr, Box::new(PLACEHOLDER)),
            ],
            Node::Let { value, body, .. } => vec![
                *std::mem::replace(value, Box::new(PLACEHOLDER)),
                *std::mem::replace(body, Box::new(PLACEHOLDER)),
            ],
            Node::Call { children, .. } => std::mem::take(children),
            Node::BinaryOp { lhs, rhs, .. } => vec![
                *std::mem::replace(lhs, Box::new(PLACEHOLDER)),
                *std::mem::replace(rhs, Box::new(PLACEHOLDER)),
            ],
            Node::TensorSum { child, .. } => {
                vec![*std::mem::replace(child, Box::new(PLACEHOLDER))]
            }
            Node::TensorMap { child, lambda } => vec![
                *std::mem::replace(child, Box::new(PLACEHOLDER)),
                std::mem::replace(&mut lambda.root, PLACEHOLDER),
            ],
            Node::TensorJoin { lhs, rhs, lambda } => vec![
                *std::mem::replace(lhs, Box::new(PLACEHOLDER)),
                *std::mem::replace(rhs, Box::new(PLACEHOLDER)),
                std::mem::replace(&mut lambda.root, PLACEHOLDER),
            ],
        }
    }

    /// A short, human-readable tag for the node's kind; used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        let kind = match self {
            Node::Number(_) => NodeKind::Number,
            Node::String(_) => NodeKind::String,
            Node::Symbol(_) => NodeKind::Symbol,
            Node::Neg(_) => NodeKind::Neg,
            Node::Not(_) => NodeKind::Not,
            Node::Array(_) => NodeKind::Array,
            Node::If { .. } => NodeKind::If,
            Node::Let { .. } => NodeKind::Let,
            Node::Call { .. } => NodeKind::Call,
            Node::BinaryOp { .. } => NodeKind::BinaryOp,
            Node::TensorSum { .. } => NodeKind::TensorSum,
            Node::TensorMap { .. } => NodeKind::TensorMap,
            Node::TensorJoin { .. } => NodeKind::TensorJoin,
            Node::Error(_) => NodeKind::Error,
        };
        kind.into()
    }
}

/// Mirrors the teacher's `Token` enum in `formulas/lexer.rs`: a plain tag
/// enum whose only job is to carry a human-readable name per variant via
/// `strum`, rather than a hand-written match arm per string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
enum NodeKind {
    #[strum(to_string = "number")]
    Number,
    #[strum(to_string = "string")]
    String,
    #[strum(to_string = "symbol")]
    Symbol,
    #[strum(to_string = "negation")]
    Neg,
    #[strum(to_string = "logical not")]
    Not,
    #[strum(to_string = "array")]
    Array,
    #[strum(to_string = "if")]
    If,
    #[strum(to_string = "let")]
    Let,
    #[strum(to_string = "call")]
    Call,
    #[strum(to_string = "binary operator")]
    BinaryOp,
    #[strum(to_string = "sum")]
    TensorSum,
    #[strum(to_string = "map")]
    TensorMap,
    #[strum(to_string = "join")]
    TensorJoin,
    #[strum(to_string = "error")]
    Error,
}

/// Nodes can nest to the depth of the input, so destructors must not
/// recurse: the default derived `Drop` would walk the whole tree on the Rust
/// call stack one frame per level. Instead, pop each node's children onto a
/// local worklist and drain it iteratively.
impl Drop for Node {
    fn drop(&mut self) {
        let mut worklist = self.take_children();
        while let Some(mut node) = worklist.pop() {
            worklist.append(&mut node.take_children());
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Number(n) => write!(f, "{n:?}"),
            Node::String(bytes) => write!(f, "{:?}", String::from_utf8_lossy(bytes)),
            Node::Symbol(id) if *id >= 0 => write!(f, "$param{id}"),
            Node::Symbol(id) => write!(f, "$let{}", -(*id) - 1),
            Node::Neg(child) => write!(f, "-{child}"),
            Node::Not(child) => write!(f, "!{child}"),
            Node::Array(children) => {
                write!(f, "[")?;
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{child}")?;
                }
                write!(f, "]")
            }
            Node::If {
                cond,
                true_expr,
                false_expr,
                p_true,
            } => write!(f, "if({cond}, {true_expr}, {false_expr}, {p_true})"),
            Node::Let { name, value, body } => write!(f, "let({name}, {value}, {body})"),
            Node::Call { name, children, .. } => {
                write!(f, "{name}(")?;
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{child}")?;
                }
                write!(f, ")")
            }
            Node::BinaryOp {
                operator, lhs, rhs, ..
            } => write!(f, "({lhs} {operator} {rhs})"),
            Node::TensorSum {
                child,
                dimension: Some(dim),
            } => write!(f, "sum({child}, {dim})"),
            Node::TensorSum { child, .. } => write!(f, "sum({child})"),
            Node::TensorMap { child, lambda } => write!(
                f,
                "map({child}, f({})({}))",
                lambda.params.join(", "),
                lambda.root
            ),
            Node::TensorJoin { lhs, rhs, lambda } => write!(
                f,
                "join({lhs}, {rhs}, f({})({}))",
                lambda.params.join(", "),
                lambda.root
            ),
            Node::Error(msg) => write!(f, "{msg}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn children_of_leaf_is_empty() {
        assert!(Node::Number(1.0).children().is_empty());
        assert!(Node::Symbol(0).children().is_empty());
    }

    #[test]
    fn children_of_binary_op() {
        let node = Node::BinaryOp {
            operator: "+".into(),
            precedence: 1,
            right_associative: false,
            lhs: Box::new(Node::Number(1.0)),
            rhs: Box::new(Node::Number(2.0)),
        };
        assert_eq!(node.children().len(), 2);
    }

    #[test]
    fn deeply_nested_negation_drops_without_overflow() {
        let mut node = Node::Number(0.0);
        for _ in 0..200_000 {
            node = Node::Neg(Box::new(node));
        }
        drop(node);
    }

    #[test]
    fn display_matches_infix_shape() {
        let node = Node::BinaryOp {
            operator: "+".into(),
            precedence: 1,
            right_associative: false,
            lhs: Box::new(Node::Number(1.0)),
            rhs: Box::new(Node::Number(2.0)),
        };
        assert_eq!(node.to_string(), "(1.0 + 2.0)");
    }

    #[test]
    fn function_error_reporting() {
        let ok = Function::new(Node::Number(1.0), vec![]);
        assert!(!ok.has_error());
        assert_eq!(ok.get_error(), "");

        let err = Function::new(Node::Error("[x]...[bad]...[]".into()), vec![]);
        assert!(err.has_error());
        assert_eq!(err.get_error(), "[x]...[bad]...[]");
    }

    #[test]
    fn type_name_is_used_for_diagnostics() {
        assert_eq!(Node::Number(1.0).type_name(), "number");
        assert_eq!(Node::Array(vec![]).type_name(), "array");
    }
}
