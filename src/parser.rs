//! Recursive-descent parser over a [`ParseContext`].
//!
//! Every sub-parser follows the same discipline: check `ctx.failed()` on
//! entry, do its work, leave exactly the node(s) it promised on the
//! expression stack (or none, on failure) and return. Nothing here ever
//! panics on malformed input — malformed input latches a failure instead.

use crate::context::ParseContext;
use crate::node::{Function, Node};
use crate::resolve::{Params, ResolveContext, UNDEF};

fn is_terminator(ctx: &mut ParseContext) -> bool {
    ctx.skip_spaces();
    ctx.eos() || matches!(ctx.get(), b')' | b',' | b']')
}

/// The precedence driver: `value (operator value)*`, reducing the operator
/// stack down to the mark it enters with.
pub(crate) fn parse_expression(ctx: &mut ParseContext) {
    let mark = ctx.enter_expression();
    parse_value(ctx);
    while !ctx.failed() && !is_terminator(ctx) {
        parse_operator(ctx);
        if ctx.failed() {
            break;
        }
        parse_value(ctx);
    }
    ctx.exit_expression(mark);
}

fn parse_value(ctx: &mut ParseContext) {
    if ctx.failed() {
        return;
    }
    ctx.skip_spaces();
    match ctx.get() {
        b'-' => {
            ctx.next();
            parse_value(ctx);
            if !ctx.failed() {
                let inner = ctx.pop_expr();
                ctx.push_expr(Node::Neg(Box::new(inner)));
            }
        }
        b'!' => {
            ctx.next();
            parse_value(ctx);
            if !ctx.failed() {
                let inner = ctx.pop_expr();
                ctx.push_expr(Node::Not(Box::new(inner)));
            }
        }
        b'(' => {
            ctx.next();
            parse_expression(ctx);
            ctx.skip_spaces();
            ctx.eat(b')');
        }
        b'[' => parse_array(ctx),
        b'"' => {
            let bytes = ctx.parse_string();
            if !ctx.failed() {
                ctx.push_expr(Node::String(bytes));
            }
        }
        c if c.is_ascii_digit() => {
            let n = ctx.parse_number();
            if !ctx.failed() {
                ctx.push_expr(Node::Number(n));
            }
        }
        _ => parse_symbol_or_call(ctx),
    }
}

fn parse_array(ctx: &mut ParseContext) {
    ctx.eat(b'[');
    let mut count = 0usize;
    ctx.skip_spaces();
    if ctx.get() != b']' {
        loop {
            parse_expression(ctx);
            if ctx.failed() {
                return;
            }
            count += 1;
            ctx.skip_spaces();
            if ctx.get() == b',' {
                ctx.next();
                continue;
            }
            break;
        }
    }
    ctx.eat(b']');
    if ctx.failed() {
        return;
    }
    let mut children = Vec::with_capacity(count);
    for _ in 0..count {
        children.push(ctx.pop_expr());
    }
    children.reverse();
    ctx.push_expr(Node::Array(children));
}

fn parse_operator(ctx: &mut ParseContext) {
    if ctx.failed() {
        return;
    }
    ctx.skip_spaces();
    let peek = ctx.peek(ctx.operator_repo().max_size());
    match ctx.operator_repo().create(&peek) {
        Some(op) => {
            let len = op.token().len();
            ctx.skip(len);
            ctx.push_operator(op);
        }
        None => {
            ctx.fail(format!("invalid operator: '{}'", ctx.get() as char));
        }
    }
}

/// Reads an identifier and either dispatches a call/keyword form (if
/// followed by `(`) or resolves it as a bare symbol: let-binding, then
/// parameter, then (if those fail) the external extractor.
fn parse_symbol_or_call(ctx: &mut ParseContext) {
    if ctx.failed() {
        return;
    }
    let mark = ctx.save_input_mark();
    let ident = ctx.get_ident();
    if ident.is_empty() {
        if ctx.eos() {
            ctx.fail("incomplete parse");
        } else {
            ctx.fail("missing value");
        }
        return;
    }
    ctx.skip_spaces();
    if ctx.get() == b'(' {
        parse_call(ctx, &ident);
        return;
    }

    let let_id = ctx.resolve().resolve_let_name(&ident);
    if let_id != UNDEF {
        ctx.push_expr(Node::Symbol(let_id));
        return;
    }
    let param_id = ctx.resolve().resolve_param(&ident);
    if param_id != UNDEF {
        ctx.push_expr(Node::Symbol(param_id));
        return;
    }

    // Latch the failure, then roll the cursor back to before the bare
    // identifier so the extractor (if any) sees the full raw text. `fail`
    // forced `curr` to the 0 sentinel; restoring to a mark whose `curr` is
    // a real byte again clears the latch (the only path that ever clears
    // one), regardless of how far `pos` was from the real end of input —
    // so every exit below re-latches explicitly rather than assuming the
    // original message survived.
    ctx.fail(format!("unknown symbol: '{ident}'"));
    ctx.restore_input_mark(mark);

    if let Some(extractor) = ctx.resolve().extractor() {
        let pos = ctx.pos();
        let end = ctx.end();
        let (new_pos, symbol) = extractor.extract_symbol(pos, end);
        if let Some(new_pos) = new_pos {
            if new_pos > pos && new_pos <= end && !symbol.is_empty() {
                ctx.skip(new_pos - pos);
                let resolved = ctx.resolve().resolve_param(&symbol);
                if resolved != UNDEF {
                    ctx.push_expr(Node::Symbol(resolved));
                    return;
                }
                ctx.fail(format!("unknown symbol: '{symbol}'"));
                return;
            }
        }
    }
    ctx.fail(format!("unknown symbol: '{ident}'"));
}

/// Dispatches keyword forms against a closed set before falling through to
/// the open-ended call repo. `ctx.get() == '('` has already been consumed by
/// the caller of... no: the opening paren is eaten here, once, regardless of
/// which branch handles the arguments.
fn parse_call(ctx: &mut ParseContext, name: &str) {
    ctx.eat(b'(');
    if ctx.failed() {
        return;
    }
    match name {
        "if" => parse_if_args(ctx),
        "let" => parse_let_args(ctx),
        "map" => parse_map_args(ctx),
        "join" => parse_join_args(ctx),
        "sum" => parse_sum_args(ctx),
        _ => parse_plain_call_args(ctx, name),
    }
}

fn parse_plain_call_args(ctx: &mut ParseContext, name: &str) {
    let builder = match ctx.call_repo().create(name) {
        Some(b) => b,
        None => {
            ctx.fail(format!("unknown function: '{name}'"));
            return;
        }
    };
    let arity = builder.arity();
    let mut children = Vec::with_capacity(arity);
    if arity > 0 {
        loop {
            parse_expression(ctx);
            if ctx.failed() {
                return;
            }
            children.push(ctx.pop_expr());
            ctx.skip_spaces();
            if children.len() == arity {
                break;
            }
            ctx.eat(b',');
            if ctx.failed() {
                return;
            }
        }
    }
    ctx.skip_spaces();
    ctx.eat(b')');
    if ctx.failed() {
        return;
    }
    ctx.push_expr(builder.build(children));
}

/// `if(cond, true_expr, false_expr [, p_true])`.
fn parse_if_args(ctx: &mut ParseContext) {
    parse_expression(ctx);
    if ctx.failed() {
        return;
    }
    let cond = ctx.pop_expr();
    ctx.skip_spaces();
    ctx.eat(b',');
    parse_expression(ctx);
    if ctx.failed() {
        return;
    }
    let true_expr = ctx.pop_expr();
    ctx.skip_spaces();
    ctx.eat(b',');
    parse_expression(ctx);
    if ctx.failed() {
        return;
    }
    let false_expr = ctx.pop_expr();
    ctx.skip_spaces();

    let mut p_true = 0.5;
    if ctx.get() == b',' {
        ctx.next();
        ctx.skip_spaces();
        if ctx.get().is_ascii_digit() {
            p_true = ctx.parse_number();
            if ctx.failed() {
                return;
            }
        }
        // A non-numeric fourth argument is simply not consumed; the default
        // is retained and the trailing ')' check below will reject it if
        // it isn't actually the closing paren.
    }
    ctx.skip_spaces();
    ctx.eat(b')');
    if ctx.failed() {
        return;
    }
    ctx.push_expr(Node::If {
        cond: Box::new(cond),
        true_expr: Box::new(true_expr),
        false_expr: Box::new(false_expr),
        p_true,
    });
}

/// `let(name, value, body)`.
fn parse_let_args(ctx: &mut ParseContext) {
    ctx.skip_spaces();
    let name = ctx.get_ident();
    if name.is_empty() {
        ctx.fail("missing value");
        return;
    }
    ctx.skip_spaces();
    ctx.eat(b',');
    parse_expression(ctx);
    if ctx.failed() {
        return;
    }
    let value = ctx.pop_expr();
    ctx.skip_spaces();
    ctx.eat(b',');

    ctx.resolve_mut().push_let_binding(name.clone());
    parse_expression(ctx);
    ctx.resolve_mut().pop_let_binding();
    if ctx.failed() {
        return;
    }
    let body = ctx.pop_expr();
    ctx.skip_spaces();
    ctx.eat(b')');
    if ctx.failed() {
        return;
    }
    ctx.push_expr(Node::Let {
        name,
        value: Box::new(value),
        body: Box::new(body),
    });
}

/// `map(expr, lambda)`, lambda arity must be 1.
fn parse_map_args(ctx: &mut ParseContext) {
    parse_expression(ctx);
    if ctx.failed() {
        return;
    }
    let child = ctx.pop_expr();
    ctx.skip_spaces();
    ctx.eat(b',');
    let lambda = parse_lambda(ctx);
    if ctx.failed() {
        return;
    }
    if lambda.params.len() != 1 {
        ctx.fail(format!(
            "map requires a lambda with 1 parameter, was {}",
            lambda.params.len()
        ));
        return;
    }
    ctx.skip_spaces();
    ctx.eat(b')');
    if ctx.failed() {
        return;
    }
    ctx.push_expr(Node::TensorMap {
        child: Box::new(child),
        lambda: Box::new(lambda),
    });
}

/// `join(lhs, rhs, lambda)`, lambda arity must be 2.
fn parse_join_args(ctx: &mut ParseContext) {
    parse_expression(ctx);
    if ctx.failed() {
        return;
    }
    let lhs = ctx.pop_expr();
    ctx.skip_spaces();
    ctx.eat(b',');
    parse_expression(ctx);
    if ctx.failed() {
        return;
    }
    let rhs = ctx.pop_expr();
    ctx.skip_spaces();
    ctx.eat(b',');
    let lambda = parse_lambda(ctx);
    if ctx.failed() {
        return;
    }
    if lambda.params.len() != 2 {
        ctx.fail(format!(
            "join requires a lambda with 2 parameter, was {}",
            lambda.params.len()
        ));
        return;
    }
    ctx.skip_spaces();
    ctx.eat(b')');
    if ctx.failed() {
        return;
    }
    ctx.push_expr(Node::TensorJoin {
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
        lambda: Box::new(lambda),
    });
}

/// `sum(expr [, dimension])`.
fn parse_sum_args(ctx: &mut ParseContext) {
    parse_expression(ctx);
    if ctx.failed() {
        return;
    }
    let child = ctx.pop_expr();
    ctx.skip_spaces();
    let mut dimension = None;
    if ctx.get() == b',' {
        ctx.next();
        ctx.skip_spaces();
        let ident = ctx.get_ident();
        if ident.is_empty() {
            ctx.fail("missing value");
            return;
        }
        dimension = Some(ident);
    }
    ctx.skip_spaces();
    ctx.eat(b')');
    if ctx.failed() {
        return;
    }
    ctx.push_expr(Node::TensorSum {
        child: Box::new(child),
        dimension,
    });
}

fn placeholder_function() -> Function {
    Function::new(Node::Number(0.0), vec![])
}

/// `f(a, b, ...)(body)`, parsed in a fresh resolve context where the outer
/// expression's parameters and let-bindings are invisible.
fn parse_lambda(ctx: &mut ParseContext) -> Function {
    ctx.skip_spaces();
    let ident = ctx.get_ident();
    if ctx.failed() {
        return placeholder_function();
    }
    if ident != "f" {
        ctx.fail(format!("expected lambda, found '{ident}'"));
        return placeholder_function();
    }

    ctx.skip_spaces();
    ctx.eat(b'(');
    let mut params = Vec::new();
    ctx.skip_spaces();
    if ctx.get() != b')' {
        loop {
            let name = ctx.get_ident();
            if name.is_empty() {
                ctx.fail("missing value");
                return placeholder_function();
            }
            params.push(name);
            ctx.skip_spaces();
            if ctx.get() == b',' {
                ctx.next();
                ctx.skip_spaces();
                continue;
            }
            break;
        }
    }
    ctx.eat(b')');
    if ctx.failed() {
        return placeholder_function();
    }

    let explicit = match Params::explicit(params) {
        Ok(p) => p,
        Err(msg) => {
            ctx.fail(msg);
            return placeholder_function();
        }
    };
    ctx.push_resolve_context(ResolveContext::new(explicit, None));
    ctx.skip_spaces();
    ctx.eat(b'(');
    parse_expression(ctx);
    ctx.skip_spaces();
    ctx.eat(b')');
    let lambda_resolve = ctx.pop_resolve_context();
    if ctx.failed() {
        return placeholder_function();
    }
    let body = ctx.pop_expr();
    Function::new(body, lambda_resolve.param_names())
}


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::registry::{DefaultCallRepo, DefaultOperatorRepo};
    use proptest::prelude::*;

    fn run(source: &str) -> Function {
        let operators = DefaultOperatorRepo;
        let calls = DefaultCallRepo;
        let resolve = ResolveContext::new(Params::implicit(), None);
        let mut ctx = ParseContext::new(source, &operators, &calls, resolve);
        parse_expression(&mut ctx);
        let names = ctx.resolve().param_names();
        let root = ctx.get_result();
        Function::new(root, names)
    }

    /// Builds a fully parenthesized arithmetic expression of bounded depth
    /// so shrinking stays fast, per the crash-freedom/always-parses property.
    fn parenthesized_expr() -> impl Strategy<Value = String> {
        let leaf = (1u32..1000).prop_map(|n| n.to_string());
        leaf.prop_recursive(4, 64, 4, |inner| {
            (inner.clone(), prop::sample::select(vec!["+", "-", "*", "/"]), inner)
                .prop_map(|(lhs, op, rhs)| format!("({lhs} {op} {rhs})"))
        })
    }

    proptest! {
        #[test]
        fn never_panics_on_arbitrary_input(input in "\\PC{0,64}") {
            let _ = run(&input);
        }

        #[test]
        fn numeric_literals_round_trip(n in 0f64..1e12) {
            let text = n.to_string();
            let f = run(&text);
            prop_assert!(!f.has_error(), "{}", f.get_error());
            match f.root {
                Node::Number(parsed) => prop_assert_eq!(parsed, text.parse::<f64>().unwrap()),
                other => prop_assert!(false, "expected Number, got {other:?}"),
            }
        }

        #[test]
        fn fully_parenthesized_expressions_always_parse(expr in parenthesized_expr()) {
            let f = run(&expr);
            prop_assert!(!f.has_error(), "failed on {}: {}", expr, f.get_error());
        }
    }
}
