//! The operator and call registries.
//!
//! These are read-only catalogs the parser queries by name; their internals
//! are an external collaborator by contract (§2 of the design: "the core
//! consumes them via lookup contracts"). [`DefaultOperatorRepo`] and
//! [`DefaultCallRepo`] are one concrete, dependency-free catalog — grounded
//! in the teacher's name-keyed function table (`functions::ALL_FUNCTIONS`,
//! populated once via `lazy_static!`) — so the crate parses real expressions
//! out of the box; a caller with its own operator/function set supplies a
//! different `OperatorRepo`/`CallRepo` instead.

use crate::node::Node;

/// A single operator, already matched against input text, waiting to be
/// bound to its left/right operands.
///
/// `do_before` is the precedence-climbing predicate: while `self` sits on
/// top of the operator stack and `other` is the incoming operator, it
/// returns true iff `self` must reduce first. The default implementation
/// derives this from precedence and associativity alone, so a concrete
/// catalog only needs to supply those two facts.
pub trait OperatorBuilder {
    fn token(&self) -> &str;
    fn precedence(&self) -> i32;
    fn right_associative(&self) -> bool;

    fn do_before(&self, other: &dyn OperatorBuilder) -> bool {
        self.precedence() > other.precedence()
            || (self.precedence() == other.precedence() && !self.right_associative())
    }

    fn build(&self, lhs: Node, rhs: Node) -> Node {
        Node::BinaryOp {
            operator: self.token().to_string(),
            precedence: self.precedence(),
            right_associative: self.right_associative(),
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }
}

/// Read-only catalog of operator spellings, queried by longest-prefix match.
pub trait OperatorRepo {
    /// Length in bytes of the longest operator spelling in this repo.
    fn max_size(&self) -> usize;

    /// Attempts a longest-prefix match against `peek` (exactly `max_size()`
    /// bytes, zero-padded past end-of-input). Returns a fresh operator node
    /// on success; the caller advances the cursor by `matched.token().len()`.
    fn create(&self, peek: &[u8]) -> Option<Box<dyn OperatorBuilder>>;
}

/// A function name, already matched, with a fixed arity known before its
/// arguments are parsed — so the parser can read exactly that many
/// comma-separated sub-expressions.
pub trait CallBuilder {
    fn name(&self) -> &str;
    fn arity(&self) -> usize;

    fn build(&self, children: Vec<Node>) -> Node {
        debug_assert_eq!(children.len(), self.arity());
        Node::Call {
            name: self.name().to_string(),
            arity: self.arity(),
            children,
        }
    }
}

/// Read-only catalog of function names.
pub trait CallRepo {
    fn create(&self, name: &str) -> Option<Box<dyn CallBuilder>>;
}

#[derive(Clone, Copy)]
struct StaticOperator {
    token: &'static str,
    precedence: i32,
    right_associative: bool,
}

impl OperatorBuilder for StaticOperator {
    fn token(&self) -> &str {
        self.token
    }
    fn precedence(&self) -> i32 {
        self.precedence
    }
    fn right_associative(&self) -> bool {
        self.right_associative
    }
}

#[derive(Clone, Copy)]
struct StaticCall {
    name: &'static str,
    arity: usize,
}

impl CallBuilder for StaticCall {
    fn name(&self) -> &str {
        self.name
    }
    fn arity(&self) -> usize {
        self.arity
    }
}

lazy_static::lazy_static! {
    /// Highest to lowest precedence, left-associative unless noted.
    static ref DEFAULT_OPERATORS: Vec<StaticOperator> = {
        let mut ops = vec![
            StaticOperator { token: "^", precedence: 6, right_associative: true },
            StaticOperator { token: "*", precedence: 5, right_associative: false },
            StaticOperator { token: "/", precedence: 5, right_associative: false },
            StaticOperator { token: "%", precedence: 5, right_associative: false },
            StaticOperator { token: "+", precedence: 4, right_associative: false },
            StaticOperator { token: "-", precedence: 4, right_associative: false },
            StaticOperator { token: "<=", precedence: 3, right_associative: false },
            StaticOperator { token: ">=", precedence: 3, right_associative: false },
            StaticOperator { token: "<", precedence: 3, right_associative: false },
            StaticOperator { token: ">", precedence: 3, right_associative: false },
            StaticOperator { token: "==", precedence: 2, right_associative: false },
            StaticOperator { token: "!=", precedence: 2, right_associative: false },
            StaticOperator { token: "&&", precedence: 1, right_associative: false },
            StaticOperator { token: "||", precedence: 0, right_associative: false },
        ];
        // Longest spelling first so a naive linear scan still finds the
        // longest match (e.g. "<=" before "<").
        ops.sort_by_key(|op| std::cmp::Reverse(op.token.len()));
        ops
    };

    static ref DEFAULT_CALLS: Vec<StaticCall> = vec![
        StaticCall { name: "sin", arity: 1 },
        StaticCall { name: "cos", arity: 1 },
        StaticCall { name: "tan", arity: 1 },
        StaticCall { name: "exp", arity: 1 },
        StaticCall { name: "ln", arity: 1 },
        StaticCall { name: "sqrt", arity: 1 },
        StaticCall { name: "abs", arity: 1 },
        StaticCall { name: "floor", arity: 1 },
        StaticCall { name: "ceil", arity: 1 },
        StaticCall { name: "pow", arity: 2 },
        StaticCall { name: "atan2", arity: 2 },
        StaticCall { name: "max", arity: 2 },
        StaticCall { name: "min", arity: 2 },
        StaticCall { name: "fmod", arity: 2 },
    ];
}

/// The built-in arithmetic/comparison/logical operator catalog.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultOperatorRepo;

impl OperatorRepo for DefaultOperatorRepo {
    fn max_size(&self) -> usize {
        DEFAULT_OPERATORS
            .iter()
            .map(|op| op.token.len())
            .max()
            .unwrap_or(0)
    }

    fn create(&self, peek: &[u8]) -> Option<Box<dyn OperatorBuilder>> {
        DEFAULT_OPERATORS
            .iter()
            .find(|op| peek.starts_with(op.token.as_bytes()))
            .map(|op| Box::new(*op) as Box<dyn OperatorBuilder>)
    }
}

/// The built-in math function catalog.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultCallRepo;

impl CallRepo for DefaultCallRepo {
    fn create(&self, name: &str) -> Option<Box<dyn CallBuilder>> {
        DEFAULT_CALLS
            .iter()
            .find(|call| call.name == name)
            .map(|call| Box::new(*call) as Box<dyn CallBuilder>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn longest_prefix_wins() {
        let repo = DefaultOperatorRepo;
        let peek = b"<=x";
        let op = repo.create(peek).unwrap();
        assert_eq!(op.token(), "<=");
    }

    #[test]
    fn unknown_operator_is_none() {
        let repo = DefaultOperatorRepo;
        assert!(repo.create(b"~~~").is_none());
    }

    #[test]
    fn do_before_respects_associativity() {
        let plus = StaticOperator {
            token: "+",
            precedence: 4,
            right_associative: false,
        };
        let pow = StaticOperator {
            token: "^",
            precedence: 6,
            right_associative: true,
        };
        // Equal precedence, left-associative: reduce before pushing the next.
        assert!(plus.do_before(&plus));
        // Equal precedence, right-associative: do NOT reduce; let it stack.
        assert!(!pow.do_before(&pow));
        // Higher precedence always reduces first regardless of incoming op.
        assert!(pow.do_before(&plus));
        assert!(!plus.do_before(&pow));
    }

    #[test]
    fn call_repo_knows_fixed_arity() {
        let repo = DefaultCallRepo;
        assert_eq!(repo.create("sin").unwrap().arity(), 1);
        assert_eq!(repo.create("pow").unwrap().arity(), 2);
        assert!(repo.create("no_such_function").is_none());
    }
}
