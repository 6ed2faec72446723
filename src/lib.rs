//! A parser for ranking expressions: arithmetic/logical operators, `if`,
//! `let`, lambdas, and the tensor forms `map`/`join`/`sum`, producing an AST
//! fit for a separate evaluator to walk.
//!
//! The four [`parse`]-family entry points below cover explicit vs. implicit
//! parameter discovery, crossed with an optional [`SymbolExtractor`]. All
//! other customization (a non-default operator/function catalog) goes
//! through [`parse_with`].

mod context;
mod node;
mod parser;
mod registry;
mod resolve;
mod unwrap;

pub use node::{Function, Node};
pub use registry::{CallBuilder, CallRepo, DefaultCallRepo, DefaultOperatorRepo, OperatorBuilder, OperatorRepo};
pub use resolve::{Params, SymbolExtractor, UNDEF};
pub use unwrap::{unwrap, UnwrapError};

use context::ParseContext;
use resolve::ResolveContext;

/// Implicit parameter discovery, no external symbol extractor.
pub fn parse(expression: &str) -> Function {
    parse_with(Params::implicit(), None, expression, &DefaultOperatorRepo, &DefaultCallRepo)
}

/// Implicit parameter discovery, with an external symbol extractor.
pub fn parse_with_extractor(expression: &str, extractor: Box<dyn SymbolExtractor>) -> Function {
    parse_with(
        Params::implicit(),
        Some(extractor),
        expression,
        &DefaultOperatorRepo,
        &DefaultCallRepo,
    )
}

/// A fixed parameter list, no external symbol extractor.
pub fn parse_explicit(param_names: Vec<String>, expression: &str) -> Function {
    match Params::explicit(param_names) {
        Ok(params) => parse_with(params, None, expression, &DefaultOperatorRepo, &DefaultCallRepo),
        Err(msg) => Function::new(Node::Error(msg), vec![]),
    }
}

/// A fixed parameter list, with an external symbol extractor.
pub fn parse_explicit_with_extractor(
    param_names: Vec<String>,
    expression: &str,
    extractor: Box<dyn SymbolExtractor>,
) -> Function {
    match Params::explicit(param_names) {
        Ok(params) => parse_with(
            params,
            Some(extractor),
            expression,
            &DefaultOperatorRepo,
            &DefaultCallRepo,
        ),
        Err(msg) => Function::new(Node::Error(msg), vec![]),
    }
}

/// The fully general entry point: any `Params` strategy, optional extractor,
/// and caller-supplied operator/call catalogs. The four `parse*` functions
/// above are thin convenience wrappers over this one using the default
/// catalogs.
pub fn parse_with(
    params: Params,
    extractor: Option<Box<dyn SymbolExtractor>>,
    expression: &str,
    operator_repo: &dyn OperatorRepo,
    call_repo: &dyn CallRepo,
) -> Function {
    let implicit = params.implicit_mode();
    let resolve_ctx = ResolveContext::new(params, extractor);
    let mut ctx = ParseContext::new(expression, operator_repo, call_repo, resolve_ctx);
    parser::parse_expression(&mut ctx);
    let param_names = ctx.resolve().param_names();
    let root = ctx.get_result();

    if implicit && matches!(root, Node::Error(_)) {
        Function::new(root, vec![])
    } else {
        Function::new(root, param_names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn implicit_entry_point_discovers_params() {
        let f = parse("a + b");
        assert!(!f.has_error());
        assert_eq!(f.params, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn explicit_entry_point_keeps_params_on_failure() {
        let f = parse_explicit(vec!["a".into(), "b".into()], "a +");
        assert!(f.has_error());
        assert_eq!(f.params, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn implicit_entry_point_drops_params_on_failure() {
        let f = parse("a +");
        assert!(f.has_error());
        assert!(f.params.is_empty());
    }

    #[test]
    fn duplicate_explicit_params_report_as_error() {
        let f = parse_explicit(vec!["a".into(), "a".into()], "a");
        assert!(f.has_error());
        assert!(f.get_error().contains("duplicate parameter name"));
    }

    /// Remaps any unresolved bare identifier straight onto `target`,
    /// regardless of what was actually typed — standing in for a host that
    /// resolves dotted/qualified names outside the bare-identifier grammar.
    struct RemapExtractor {
        target: &'static str,
    }
    impl SymbolExtractor for RemapExtractor {
        fn extract_symbol(&self, _pos: usize, end: usize) -> (Option<usize>, String) {
            (Some(end), self.target.to_string())
        }
    }

    #[test]
    fn extractor_is_consulted_after_explicit_resolution_fails() {
        // Implicit mode always resolves a bare identifier to a fresh
        // parameter, so the extractor can only ever matter in explicit mode,
        // where the fixed name list can reject a name outright.
        let f = parse_explicit_with_extractor(
            vec!["mapped".into()],
            "unmapped_name",
            Box::new(RemapExtractor { target: "mapped" }),
        );
        assert!(!f.has_error(), "{}", f.get_error());
        assert_eq!(f.root, Node::Symbol(0));
    }

    #[test]
    fn extractor_failure_surfaces_the_original_unknown_symbol() {
        struct RefusingExtractor;
        impl SymbolExtractor for RefusingExtractor {
            fn extract_symbol(&self, _pos: usize, _end: usize) -> (Option<usize>, String) {
                (None, String::new())
            }
        }

        let f = parse_explicit_with_extractor(
            vec!["a".into()],
            "b",
            Box::new(RefusingExtractor),
        );
        assert!(f.has_error());
        assert!(f.get_error().contains("unknown symbol: 'b'"));
    }

    /// Extends a bare identifier with `.segment` suffixes, the way a host
    /// resolving dotted/qualified names would — `get_ident` itself stops at
    /// the first `.`, so this is the kind of thing a real extractor exists
    /// to do. Holds its own copy of the source text since the extractor
    /// interface only passes byte offsets.
    struct DottedNameExtractor {
        source: String,
    }
    impl SymbolExtractor for DottedNameExtractor {
        fn extract_symbol(&self, pos: usize, end: usize) -> (Option<usize>, String) {
            let bytes = self.source.as_bytes();
            let is_part = |c: u8| c.is_ascii_alphanumeric() || c == b'_';
            let mut i = pos;
            if i >= end || !is_part(bytes[i]) {
                return (None, String::new());
            }
            while i < end && is_part(bytes[i]) {
                i += 1;
            }
            while i < end && bytes[i] == b'.' {
                let dot = i;
                let seg_start = i + 1;
                let mut j = seg_start;
                while j < end && is_part(bytes[j]) {
                    j += 1;
                }
                if j == seg_start {
                    let _ = dot;
                    break;
                }
                i = j;
            }
            (Some(i), self.source[pos..i].to_string())
        }
    }

    #[test]
    fn extractor_resolves_dotted_name_that_stops_well_short_of_end_of_input() {
        // Regression test: the identifier "foo" fails to resolve at pos=3
        // out of end=11, nowhere near the real end of the buffer. The
        // latch that failure sets must still clear on the subsequent
        // restore so the extractor's "foo.bar" resolution isn't discarded.
        let f = parse_explicit_with_extractor(
            vec!["foo.bar".into()],
            "foo.bar + 1",
            Box::new(DottedNameExtractor {
                source: "foo.bar + 1".into(),
            }),
        );
        assert!(!f.has_error(), "{}", f.get_error());
        match f.root {
            Node::BinaryOp { operator, lhs, rhs, .. } => {
                assert_eq!(operator, "+");
                assert_eq!(*lhs, Node::Symbol(0));
                assert_eq!(*rhs, Node::Number(1.0));
            }
            other => panic!("expected BinaryOp, got {other:?}"),
        }
    }
}
