//! `ParseContext`: the input cursor, the expression/operator stacks, the
//! resolver-scope stack, and the single-shot failure latch.
//!
//! Everything here is scratch state confined to one `parse` call (§5): no
//! shared mutable state escapes a `ParseContext`, so distinct parses run in
//! parallel on independent contexts without synchronization.

use crate::node::Node;
use crate::registry::{CallRepo, OperatorBuilder, OperatorRepo};
use crate::resolve::ResolveContext;

const WHITESPACE: &[u8] = b" \t\n\r\x0c\x0b";

fn is_ident_start(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_' || c == b'@'
}

fn is_ident_continue(c: u8) -> bool {
    is_ident_start(c) || c == b'$'
}

fn hex_digit(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

/// A cursor checkpoint. [`ParseContext::restore_input_mark`] is the only
/// path that can clear the failure latch (§4.1) — used by symbol extraction
/// to retry a bare identifier as a qualified name. The clearing rule is
/// keyed off the `curr == 0` sentinel (forced by `fail`), not the buffer's
/// real end — a failure latched well short of the real end of input must
/// still be eligible to clear on restore.
#[derive(Clone, Copy)]
pub struct InputMark {
    pos: usize,
    curr: u8,
}

pub struct ParseContext<'a> {
    source: &'a str,
    begin: usize,
    pos: usize,
    end: usize,
    /// The byte at `pos`, or 0 past end-of-input. Forced to 0 by `fail` so
    /// loops that test `get() != 0` exit promptly once a failure latches.
    curr: u8,

    scratch: String,
    expr_stack: Vec<Node>,
    op_stack: Vec<Box<dyn OperatorBuilder>>,
    /// Low-water mark on `op_stack` for the current sub-expression; see
    /// `enter_expression`/`exit_expression`.
    operator_mark: usize,
    resolve_stack: Vec<ResolveContext>,
    fail_msg: Option<String>,

    operator_repo: &'a dyn OperatorRepo,
    call_repo: &'a dyn CallRepo,
}

impl<'a> ParseContext<'a> {
    pub fn new(
        source: &'a str,
        operator_repo: &'a dyn OperatorRepo,
        call_repo: &'a dyn CallRepo,
        root_resolve: ResolveContext,
    ) -> Self {
        let bytes = source.as_bytes();
        let curr = bytes.first().copied().unwrap_or(0);
        ParseContext {
            source,
            begin: 0,
            pos: 0,
            end: bytes.len(),
            curr,
            scratch: String::new(),
            expr_stack: Vec::new(),
            op_stack: Vec::new(),
            operator_mark: 0,
            resolve_stack: vec![root_resolve],
            fail_msg: None,
            operator_repo,
            call_repo,
        }
    }

    // ---- lexical layer (§4.1) ----------------------------------------

    pub fn get(&self) -> u8 {
        self.curr
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn end(&self) -> usize {
        self.end
    }

    /// True once the real cursor (not the failure sentinel) has reached the
    /// end of input.
    pub fn eos(&self) -> bool {
        self.pos >= self.end
    }

    pub fn next(&mut self) -> u8 {
        if self.pos < self.end {
            self.pos += 1;
        }
        self.curr = self.source.as_bytes().get(self.pos).copied().unwrap_or(0);
        self.curr
    }

    pub fn eat(&mut self, expected: u8) {
        if self.curr == expected {
            self.next();
        } else {
            self.fail(format!(
                "expected '{}', but got '{}'",
                expected as char, self.curr as char
            ));
        }
    }

    pub fn skip_spaces(&mut self) {
        while !self.eos() && WHITESPACE.contains(&self.curr) {
            self.next();
        }
    }

    /// Reads up to `n` bytes ahead from the current position, zero-padded
    /// past end-of-input. Does not consume anything.
    pub fn peek(&self, n: usize) -> Vec<u8> {
        let bytes = self.source.as_bytes();
        let mut out = Vec::with_capacity(n);
        for i in 0..n {
            out.push(bytes.get(self.pos + i).copied().unwrap_or(0));
        }
        out
    }

    pub fn skip(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.end);
        self.curr = self.source.as_bytes().get(self.pos).copied().unwrap_or(0);
    }

    pub fn save_input_mark(&self) -> InputMark {
        InputMark {
            pos: self.pos,
            curr: self.curr,
        }
    }

    pub fn restore_input_mark(&mut self, mark: InputMark) {
        // The clearing condition keys off the `curr == 0` sentinel, not the
        // raw `pos >= end` buffer position: `fail()` forces `curr = 0`
        // without moving `pos`, so a restore that rewinds past a failure
        // latched mid-buffer (e.g. a bare identifier that stopped short of
        // the real end of input) must still count as leaving that sentinel
        // state once the restored `curr` is a real byte again.
        let was_zero = self.curr == 0;
        self.pos = mark.pos;
        self.curr = mark.curr;
        if was_zero && self.curr != 0 {
            self.fail_msg = None;
        }
    }

    // ---- failure latch -------------------------------------------------

    pub fn fail(&mut self, msg: impl Into<String>) {
        if self.fail_msg.is_none() {
            self.fail_msg = Some(msg.into());
        }
        self.curr = 0;
    }

    pub fn failed(&self) -> bool {
        self.fail_msg.is_some()
    }

    // ---- identifiers, numbers, strings (§4.2) --------------------------

    /// Skips leading whitespace, then reads the maximal run of identifier
    /// characters. Empty if the next character isn't an identifier start.
    pub fn get_ident(&mut self) -> String {
        self.skip_spaces();
        self.scratch.clear();
        if !is_ident_start(self.curr) {
            return String::new();
        }
        self.scratch.push(self.curr as char);
        self.next();
        while is_ident_continue(self.curr) {
            self.scratch.push(self.curr as char);
            self.next();
        }
        std::mem::take(&mut self.scratch)
    }

    pub fn parse_number(&mut self) -> f64 {
        if self.failed() {
            return 0.0;
        }
        let start = self.pos;
        if !self.curr.is_ascii_digit() {
            self.fail(format!("invalid number: '{}'", self.curr as char));
            return 0.0;
        }
        while self.curr.is_ascii_digit() {
            self.next();
        }
        if self.curr == b'.' {
            self.next();
            while self.curr.is_ascii_digit() {
                self.next();
            }
        }
        if self.curr == b'e' || self.curr == b'E' {
            self.next();
            if self.curr == b'+' || self.curr == b'-' {
                self.next();
            }
            while self.curr.is_ascii_digit() {
                self.next();
            }
        }
        // Byte-sliced rather than `&str`-sliced: `pos` tracks a raw byte
        // offset, and a failed escape scan elsewhere in the lexer can leave
        // it off a UTF-8 character boundary. `str` indexing would panic on
        // that; lossy conversion degrades gracefully instead.
        let text = String::from_utf8_lossy(&self.source.as_bytes()[start..self.pos]).into_owned();
        text.parse::<f64>().unwrap_or_else(|_| {
            let msg = format!("invalid number: '{text}'");
            self.fail(msg);
            0.0
        })
    }

    /// Assumes `get() == b'"'`. Consumes the closing quote on success.
    pub fn parse_string(&mut self) -> Vec<u8> {
        self.eat(b'"');
        let mut bytes = Vec::new();
        loop {
            if self.failed() {
                return bytes;
            }
            if self.eos() {
                self.fail("bad quote");
                return bytes;
            }
            match self.curr {
                b'"' => {
                    self.next();
                    return bytes;
                }
                b'\\' => {
                    self.next();
                    if self.eos() {
                        self.fail("bad quote");
                        return bytes;
                    }
                    match self.curr {
                        b'"' => {
                            bytes.push(b'"');
                            self.next();
                        }
                        b'\\' => {
                            bytes.push(b'\\');
                            self.next();
                        }
                        b'f' => {
                            bytes.push(0x0c);
                            self.next();
                        }
                        b'n' => {
                            bytes.push(b'\n');
                            self.next();
                        }
                        b'r' => {
                            bytes.push(b'\r');
                            self.next();
                        }
                        b't' => {
                            bytes.push(b'\t');
                            self.next();
                        }
                        b'x' => {
                            self.next();
                            let hi = hex_digit(self.curr);
                            self.next();
                            let lo = hex_digit(self.curr);
                            self.next();
                            match (hi, lo) {
                                (Some(h), Some(l)) => bytes.push(h * 16 + l),
                                _ => {
                                    self.fail("bad hex quote");
                                    return bytes;
                                }
                            }
                        }
                        _ => {
                            self.fail("bad quote");
                            return bytes;
                        }
                    }
                }
                c => {
                    bytes.push(c);
                    self.next();
                }
            }
        }
    }

    // ---- registries -----------------------------------------------------

    pub fn operator_repo(&self) -> &'a dyn OperatorRepo {
        self.operator_repo
    }

    pub fn call_repo(&self) -> &'a dyn CallRepo {
        self.call_repo
    }

    // ---- expression / operator stacks (§4.3, §4.4) -----------------------

    pub fn push_expr(&mut self, node: Node) {
        self.expr_stack.push(node);
    }

    pub fn pop_expr(&mut self) -> Node {
        match self.expr_stack.pop() {
            Some(node) => node,
            None => {
                self.fail("expression stack underflow");
                Node::Number(0.0)
            }
        }
    }

    pub fn expr_stack_len(&self) -> usize {
        self.expr_stack.len()
    }

    fn reduce_one(&mut self) {
        let op = self.op_stack.pop().expect("reduce_one called on empty operator stack");
        let rhs = self.pop_expr();
        let lhs = self.pop_expr();
        self.push_expr(op.build(lhs, rhs));
    }

    /// Reduces the operator stack down to `mark`, left to right.
    fn reduce_to_mark(&mut self, mark: usize) {
        while self.op_stack.len() > mark {
            self.reduce_one();
        }
    }

    /// Pushes `op`, first reducing any operator already on top of the stack
    /// (above the current mark) that must bind before `op` does.
    pub fn push_operator(&mut self, op: Box<dyn OperatorBuilder>) {
        while self.op_stack.len() > self.operator_mark {
            let must_reduce = self.op_stack.last().unwrap().do_before(op.as_ref());
            if !must_reduce {
                break;
            }
            self.reduce_one();
        }
        self.op_stack.push(op);
    }

    /// Enters a new sub-expression, returning the previous operator mark to
    /// hand back to `exit_expression`. This is what keeps call-argument
    /// parsing from leaking operators across argument boundaries.
    pub fn enter_expression(&mut self) -> usize {
        let previous = self.operator_mark;
        self.operator_mark = self.op_stack.len();
        previous
    }

    /// Reduces whatever is left above the current mark, then restores the
    /// caller's mark. Skipped entirely once a failure has latched — there is
    /// no well-formed operand/operator pairing left to reduce, and the
    /// leftover stack entries are exactly what makes `get_result`'s
    /// incomplete-parse check fire for callers that reach it without a
    /// latched message of their own.
    pub fn exit_expression(&mut self, previous_mark: usize) {
        if !self.failed() {
            self.reduce_to_mark(self.operator_mark);
        }
        self.operator_mark = previous_mark;
    }

    // ---- resolver scopes (§4.5) ------------------------------------------

    pub fn push_resolve_context(&mut self, ctx: ResolveContext) {
        self.resolve_stack.push(ctx);
    }

    pub fn pop_resolve_context(&mut self) -> ResolveContext {
        self.resolve_stack
            .pop()
            .expect("pop_resolve_context called with empty resolve stack")
    }

    pub fn resolve(&self) -> &ResolveContext {
        self.resolve_stack
            .last()
            .expect("resolve stack is never empty")
    }

    pub fn resolve_mut(&mut self) -> &mut ResolveContext {
        self.resolve_stack
            .last_mut()
            .expect("resolve stack is never empty")
    }

    // ---- finalization (§4.8) ---------------------------------------------

    /// Consumes the context and produces the root `Node`: the sole surviving
    /// expression on success, or an `Error` wrapping the latched diagnostic
    /// and surrounding text on failure.
    pub fn get_result(mut self) -> Node {
        if !self.eos() || self.expr_stack.len() != 1 || !self.op_stack.is_empty() {
            self.fail("incomplete parse");
        }
        if let Some(msg) = self.fail_msg.take() {
            // Byte-sliced for the same reason as `parse_number`: `self.pos`
            // is not guaranteed to sit on a character boundary if a failure
            // latched mid-escape-sequence scan.
            let bytes = self.source.as_bytes();
            let prefix = String::from_utf8_lossy(&bytes[self.begin..self.pos]);
            let suffix = String::from_utf8_lossy(&bytes[self.pos..self.end]);
            Node::Error(format!("[{prefix}]...[{msg}]...[{suffix}]"))
        } else {
            self.expr_stack.pop().expect("exactly one expression left")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{DefaultCallRepo, DefaultOperatorRepo};
    use crate::resolve::{Params, ResolveContext};

    fn ctx(source: &'static str) -> ParseContext<'static> {
        let ops: &'static DefaultOperatorRepo = Box::leak(Box::new(DefaultOperatorRepo));
        let calls: &'static DefaultCallRepo = Box::leak(Box::new(DefaultCallRepo));
        ParseContext::new(source, ops, calls, ResolveContext::new(Params::implicit(), None))
    }

    #[test]
    fn cursor_primitives() {
        let mut c = ctx("ab");
        assert_eq!(c.get(), b'a');
        assert!(!c.eos());
        c.next();
        assert_eq!(c.get(), b'b');
        c.next();
        assert!(c.eos());
        assert_eq!(c.get(), 0);
    }

    #[test]
    fn eat_mismatch_fails() {
        let mut c = ctx("x");
        c.eat(b'y');
        assert!(c.failed());
    }

    #[test]
    fn ident_reads_digits_and_at_sign() {
        let mut c = ctx("  3abc@1 rest");
        assert_eq!(c.get_ident(), "3abc@1");
    }

    #[test]
    fn number_literal_with_exponent() {
        let mut c = ctx("1.5e3");
        let n = c.parse_number();
        assert!(!c.failed());
        assert_eq!(n, 1500.0);
    }

    #[test]
    fn malformed_exponent_fails() {
        let mut c = ctx("1e");
        c.parse_number();
        assert!(c.failed());
    }

    #[test]
    fn string_escapes() {
        let mut c = ctx("\"hi\\n\\x41\"");
        let bytes = c.parse_string();
        assert!(!c.failed());
        assert_eq!(bytes, b"hi\nA");
    }

    #[test]
    fn bad_escape_fails() {
        let mut c = ctx("\"\\q\"");
        c.parse_string();
        assert!(c.failed());
    }

    #[test]
    fn hex_escape_failure_on_multibyte_input_does_not_panic_on_finalize() {
        // `\x` followed by a non-ASCII UTF-8 character can leave the cursor
        // mid-character, since the hex scanner advances one raw byte at a
        // time regardless of character boundaries. get_result must not
        // panic slicing `source` at that offset.
        let mut c = ctx("\"\\xé\"");
        c.parse_string();
        assert!(c.failed());
        let root = c.get_result();
        assert!(matches!(root, Node::Error(_)));
    }

    #[test]
    fn restore_mark_from_eos_clears_latch() {
        let mut c = ctx("abc");
        c.skip(3);
        assert!(c.eos());
        let mark = c.save_input_mark();
        c.next(); // no-op, still eos
        c.fail("unknown symbol: 'abc'");
        assert!(c.failed());
        let rewound = InputMark { pos: 0, curr: b'a' };
        let _ = mark;
        c.restore_input_mark(rewound);
        assert!(!c.failed());
        assert_eq!(c.pos(), 0);
    }

    #[test]
    fn restore_mark_mid_buffer_after_fail_still_clears_latch() {
        // The latch clears on the curr-sentinel transition, not on whether
        // `pos` was ever at the buffer's real end — a failure latched well
        // short of end-of-input (e.g. a bare identifier that stopped at a
        // `.` mid-expression) must still be clearable so symbol extraction
        // can retry it as a qualified name.
        let mut c = ctx("abc");
        c.fail("boom"); // pos is still 0, nowhere near the real end of "abc"
        let mark = InputMark { pos: 1, curr: b'b' };
        c.restore_input_mark(mark);
        assert!(!c.failed());
    }

    #[test]
    fn restore_mark_without_zero_to_nonzero_transition_keeps_latch() {
        let mut c = ctx("abc");
        c.fail("boom");
        // Restoring to another zero-curr mark is not a sentinel transition,
        // so the latch must survive.
        let mark = InputMark { pos: 3, curr: 0 };
        c.restore_input_mark(mark);
        assert!(c.failed());
    }
}
