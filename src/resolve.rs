//! Two-mode symbol resolution layered with lexically scoped let-bindings.
//!
//! Mirrors how the teacher keys its function registry by name
//! (`functions::ALL_FUNCTIONS`/`lookup_function`) but for parameters instead
//! of functions: an order-preserving map from name to index.

use std::cell::RefCell;

use indexmap::IndexSet;

/// Sentinel meaning "no such symbol" without reaching for `Option` at every
/// call site in the parser, matching the teacher's UNDEF-as-index convention
/// used for its own name-to-slot lookups.
pub const UNDEF: i64 = i64::MIN;

/// A host-provided hook that can extend identifier lexing to consume
/// qualified names (`foo.bar.baz`) the bare-identifier grammar would not
/// otherwise recognize.
///
/// `extract_symbol` is called with the byte offsets of the remaining input.
/// On success it returns a new position strictly greater than `pos` and at
/// most `end`, plus the extracted symbol text. On failure it must return a
/// position `<= pos` (or none) and an empty string — the parser does not
/// otherwise validate the contract, so a misbehaving extractor can desync
/// the cursor.
pub trait SymbolExtractor {
    fn extract_symbol(&self, pos: usize, end: usize) -> (Option<usize>, String);
}

/// The two resolution strategies for top-level free identifiers.
pub enum Params {
    /// A fixed list supplied by the caller; unknown names stay UNDEF.
    Explicit(Vec<String>),
    /// Discovers parameters as they're encountered, in first-use order.
    ///
    /// The insertion-ordered set lives behind a `RefCell` because `resolve`
    /// conceptually reads the parameter table but must also grow it; this is
    /// the "const-erasure" interior mutability called out for implicit mode,
    /// made sound by the parser being confined to a single thread.
    Implicit(RefCell<IndexSet<String>>),
}

impl Params {
    pub fn explicit(names: Vec<String>) -> Result<Self, String> {
        let mut seen = IndexSet::with_capacity(names.len());
        for name in &names {
            if !seen.insert(name.clone()) {
                return Err(format!("duplicate parameter name: '{name}'"));
            }
        }
        Ok(Params::Explicit(names))
    }

    pub fn implicit() -> Self {
        Params::Implicit(RefCell::new(IndexSet::new()))
    }

    pub fn implicit_mode(&self) -> bool {
        matches!(self, Params::Implicit(_))
    }

    /// Resolves `name` to a parameter index, registering it in implicit
    /// mode. Returns [`UNDEF`] if explicit mode has no such name.
    pub fn resolve(&self, name: &str) -> i64 {
        match self {
            Params::Explicit(names) => names
                .iter()
                .position(|n| n == name)
                .map(|i| i as i64)
                .unwrap_or(UNDEF),
            Params::Implicit(names) => {
                let mut names = names.borrow_mut();
                let (index, _) = names.insert_full(name.to_string());
                index as i64
            }
        }
    }

    /// The parameter list in index order. For implicit mode this is exactly
    /// the insertion-ordered set of names discovered so far.
    pub fn names(&self) -> Vec<String> {
        match self {
            Params::Explicit(names) => names.clone(),
            Params::Implicit(names) => names.borrow().iter().cloned().collect(),
        }
    }
}

/// One resolution regime: a `Params` strategy, an optional external
/// extractor, and the stack of let-binding names currently in scope.
///
/// Lambdas push a fresh `ResolveContext` (explicit params, no extractor) so
/// that the outer expression's parameters and let-bindings are invisible
/// inside the lambda body — nested scoping via an explicit stack rather than
/// dynamic scoping through a shared mutable environment.
pub struct ResolveContext {
    params: Params,
    extractor: Option<Box<dyn SymbolExtractor>>,
    let_names: Vec<String>,
}

impl ResolveContext {
    pub fn new(params: Params, extractor: Option<Box<dyn SymbolExtractor>>) -> Self {
        ResolveContext {
            params,
            extractor,
            let_names: Vec::new(),
        }
    }

    pub fn implicit_mode(&self) -> bool {
        self.params.implicit_mode()
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn extractor(&self) -> Option<&dyn SymbolExtractor> {
        self.extractor.as_deref()
    }

    pub fn push_let_binding(&mut self, name: String) {
        self.let_names.push(name);
    }

    pub fn pop_let_binding(&mut self) {
        self.let_names.pop();
    }

    /// Resolves `name` against the let-binding stack, innermost first.
    /// Returns the negative id `-(i + 1)` for the first (innermost) match,
    /// or [`UNDEF`] if `name` is not currently let-bound.
    pub fn resolve_let_name(&self, name: &str) -> i64 {
        for (depth_from_outer, bound) in self.let_names.iter().enumerate().rev() {
            if bound == name {
                return -(depth_from_outer as i64) - 1;
            }
        }
        UNDEF
    }

    /// Resolves `name` as a parameter (not a let-binding).
    pub fn resolve_param(&self, name: &str) -> i64 {
        self.params.resolve(name)
    }

    pub fn param_names(&self) -> Vec<String> {
        self.params.names()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_rejects_duplicates() {
        assert!(Params::explicit(vec!["a".into(), "a".into()]).is_err());
        assert!(Params::explicit(vec!["a".into(), "b".into()]).is_ok());
    }

    #[test]
    fn explicit_resolve_is_stable() {
        let params = Params::explicit(vec!["a".into(), "b".into()]).unwrap();
        assert_eq!(params.resolve("a"), 0);
        assert_eq!(params.resolve("b"), 1);
        assert_eq!(params.resolve("c"), UNDEF);
    }

    #[test]
    fn implicit_discovers_in_order() {
        let params = Params::implicit();
        assert_eq!(params.resolve("x"), 0);
        assert_eq!(params.resolve("y"), 1);
        assert_eq!(params.resolve("x"), 0); // repeat lookups are idempotent
        assert_eq!(params.names(), vec!["x".to_string(), "y".to_string()]);
    }

    #[test]
    fn let_scope_innermost_wins() {
        let mut ctx = ResolveContext::new(Params::implicit(), None);
        ctx.push_let_binding("x".into());
        assert_eq!(ctx.resolve_let_name("x"), -1);
        ctx.push_let_binding("x".into());
        assert_eq!(ctx.resolve_let_name("x"), -2);
        ctx.pop_let_binding();
        assert_eq!(ctx.resolve_let_name("x"), -1);
        ctx.pop_let_binding();
        assert_eq!(ctx.resolve_let_name("x"), UNDEF);
    }
}
