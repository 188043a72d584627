//! Compilation and evaluation of per-channel equations. See spec §4.2.
//!
//! The source grammar is deliberately tiny: one variable (`t`), three unary functions (`sin`,
//! `cos`, `tan`), the four arithmetic operators, unary negation, and parentheses. A hand-rolled
//! recursive-descent parser is the right tool for a grammar this small and fixed, in the same
//! spirit as the controller's own line-framed JSON reader: no dependency is worth pulling in for
//! a handful of productions that will never grow.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::model::ChannelConfig;

/// `1 / (2*PI)`, used by [`reduce_angle`] to avoid a division on the evaluation hot path.
const INV_TWO_PI: f32 = 0.159_154_94;
/// `2*PI`.
const TWO_PI: f32 = 6.283_185_3;

/// Reduce `angle` into `[0, 2*PI)` by multiplication instead of `fmod`.
///
/// Precision degrades for `|angle|` beyond roughly `10^5` because of `f32` mantissa limits; this
/// is an accepted trade-off carried over from the original firmware (spec §4.2).
fn reduce_angle(angle: f32) -> f32 {
    let wrapped = angle * INV_TWO_PI;
    (wrapped - wrapped.floor()) * TWO_PI
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// The three trig functions the grammar exposes, each wrapped with [`reduce_angle`].
enum MathFn {
    Sin,
    Cos,
    Tan,
}

impl MathFn {
    fn apply(self, x: f32) -> f32 {
        let x = reduce_angle(x);
        match self {
            MathFn::Sin => x.sin(),
            MathFn::Cos => x.cos(),
            MathFn::Tan => x.tan(),
        }
    }
}

#[derive(Debug, Clone)]
/// A parsed expression tree.
enum Expr {
    Const(f32),
    Var,
    Call(MathFn, Box<Expr>),
    Neg(Box<Expr>),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Div(Box<Expr>, Box<Expr>),
}

impl Expr {
    fn eval(&self, t: f32) -> f32 {
        match self {
            Expr::Const(v) => *v,
            Expr::Var => t,
            Expr::Call(f, inner) => f.apply(inner.eval(t)),
            Expr::Neg(inner) => -inner.eval(t),
            Expr::Add(a, b) => a.eval(t) + b.eval(t),
            Expr::Sub(a, b) => a.eval(t) - b.eval(t),
            Expr::Mul(a, b) => a.eval(t) * b.eval(t),
            Expr::Div(a, b) => {
                let divisor = b.eval(t);
                if divisor == 0.0 {
                    0.0
                } else {
                    a.eval(t) / divisor
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// An equation that failed to compile, carrying enough context to report it per spec §7.
pub struct CompileError {
    pub position: usize,
    pub message: String,
}

static LIVE_HANDLES: AtomicU64 = AtomicU64::new(0);
static TOTAL_ALLOCATED: AtomicU64 = AtomicU64::new(0);
static TOTAL_FREED: AtomicU64 = AtomicU64::new(0);

/// Test-only introspection into the compiled-expression free counters (spec §8, property 7:
/// "compiled-handle conservation"). Not used by production code paths.
pub fn handle_counts() -> (u64, u64) {
    (
        TOTAL_ALLOCATED.load(Ordering::SeqCst),
        TOTAL_FREED.load(Ordering::SeqCst),
    )
}

/// Number of compiled-expression handles currently live (allocated but not yet dropped).
pub fn live_handle_count() -> u64 {
    LIVE_HANDLES.load(Ordering::SeqCst)
}

/// A compiled expression: the "opaque expression handle" of spec §4.2.
///
/// This is the scoped-wrapper slot design note from spec §9: construction records an allocation,
/// and `Drop` records the matching release, so every code path that replaces or discards a
/// `CompiledExpr` — including early-return-on-error paths — releases it automatically.
#[derive(Debug)]
pub struct CompiledExpr {
    expr: Expr,
}

impl CompiledExpr {
    fn new(expr: Expr) -> Self {
        LIVE_HANDLES.fetch_add(1, Ordering::SeqCst);
        TOTAL_ALLOCATED.fetch_add(1, Ordering::SeqCst);
        CompiledExpr { expr }
    }

    /// Evaluate the compiled expression at `t`.
    pub fn eval(&self, t: f32) -> f32 {
        self.expr.eval(t)
    }
}

impl Drop for CompiledExpr {
    fn drop(&mut self) {
        LIVE_HANDLES.fetch_sub(1, Ordering::SeqCst);
        TOTAL_FREED.fetch_add(1, Ordering::SeqCst);
    }
}

struct Parser<'a> {
    source: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(source: &'a [u8]) -> Self {
        Parser { source, pos: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.source.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b) if b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn error(&self, message: impl Into<String>) -> CompileError {
        CompileError { position: self.pos, message: message.into() }
    }

    // expr := term (('+' | '-') term)*
    fn parse_expr(&mut self) -> Result<Expr, CompileError> {
        let mut node = self.parse_term()?;
        loop {
            self.skip_ws();
            match self.peek() {
                Some(b'+') => {
                    self.pos += 1;
                    node = Expr::Add(Box::new(node), Box::new(self.parse_term()?));
                }
                Some(b'-') => {
                    self.pos += 1;
                    node = Expr::Sub(Box::new(node), Box::new(self.parse_term()?));
                }
                _ => break,
            }
        }
        Ok(node)
    }

    // term := factor (('*' | '/') factor)*
    fn parse_term(&mut self) -> Result<Expr, CompileError> {
        let mut node = self.parse_factor()?;
        loop {
            self.skip_ws();
            match self.peek() {
                Some(b'*') => {
                    self.pos += 1;
                    node = Expr::Mul(Box::new(node), Box::new(self.parse_factor()?));
                }
                Some(b'/') => {
                    self.pos += 1;
                    node = Expr::Div(Box::new(node), Box::new(self.parse_factor()?));
                }
                _ => break,
            }
        }
        Ok(node)
    }

    // factor := '-' factor | '(' expr ')' | number | ident ['(' expr ')']
    fn parse_factor(&mut self) -> Result<Expr, CompileError> {
        self.skip_ws();
        match self.peek() {
            Some(b'-') => {
                self.pos += 1;
                Ok(Expr::Neg(Box::new(self.parse_factor()?)))
            }
            Some(b'+') => {
                self.pos += 1;
                self.parse_factor()
            }
            Some(b'(') => {
                self.pos += 1;
                let inner = self.parse_expr()?;
                self.skip_ws();
                if self.peek() != Some(b')') {
                    return Err(self.error("expected ')'"));
                }
                self.pos += 1;
                Ok(inner)
            }
            Some(b) if b.is_ascii_digit() || b == b'.' => self.parse_number(),
            Some(b) if b.is_ascii_alphabetic() => self.parse_ident(),
            Some(_) => Err(self.error("unexpected character")),
            None => Err(self.error("unexpected end of expression")),
        }
    }

    fn parse_number(&mut self) -> Result<Expr, CompileError> {
        let start = self.pos;
        while matches!(self.peek(), Some(b) if b.is_ascii_digit() || b == b'.') {
            self.pos += 1;
        }
        let text = std::str::from_utf8(&self.source[start..self.pos]).unwrap_or("");
        text.parse::<f32>()
            .map(Expr::Const)
            .map_err(|_| CompileError { position: start, message: format!("invalid number '{text}'") })
    }

    fn parse_ident(&mut self) -> Result<Expr, CompileError> {
        let start = self.pos;
        while matches!(self.peek(), Some(b) if b.is_ascii_alphanumeric() || b == b'_') {
            self.pos += 1;
        }
        let ident = std::str::from_utf8(&self.source[start..self.pos]).unwrap_or("");

        let math_fn = match ident {
            "sin" => Some(MathFn::Sin),
            "cos" => Some(MathFn::Cos),
            "tan" => Some(MathFn::Tan),
            _ => None,
        };

        if let Some(f) = math_fn {
            self.skip_ws();
            if self.peek() != Some(b'(') {
                return Err(self.error(format!("expected '(' after '{ident}'")));
            }
            self.pos += 1;
            let arg = self.parse_expr()?;
            self.skip_ws();
            if self.peek() != Some(b')') {
                return Err(self.error("expected ')'"));
            }
            self.pos += 1;
            return Ok(Expr::Call(f, Box::new(arg)));
        }

        if ident == "t" {
            return Ok(Expr::Var);
        }

        Err(CompileError { position: start, message: format!("unknown symbol '{ident}'") })
    }
}

/// Compile a single equation source string.
///
/// The source is lower-cased first (spec §4.2), so identifiers are matched case-insensitively.
pub fn compile(source: &str) -> Result<CompiledExpr, CompileError> {
    let lowered = source.to_ascii_lowercase();
    let mut parser = Parser::new(lowered.as_bytes());
    let expr = parser.parse_expr()?;
    parser.skip_ws();
    if parser.pos != parser.source.len() {
        return Err(parser.error("trailing characters after expression"));
    }
    Ok(CompiledExpr::new(expr))
}

/// Compile every section of a [`ChannelConfig`], continuing past individual failures so the
/// caller can surface the *first* error while still attempting every section (spec §4.3: "the
/// routine attempts to compile all equations regardless of individual failures").
///
/// Returns one slot per section (`None` where compilation failed) and the first error seen, if
/// any.
pub fn compile_channel(
    config: &ChannelConfig,
) -> (Vec<Option<CompiledExpr>>, Option<CompileError>) {
    let mut slots = Vec::with_capacity(config.sections.len());
    let mut first_error = None;
    for section in &config.sections {
        match compile(&section.equation) {
            Ok(handle) => slots.push(Some(handle)),
            Err(err) => {
                if first_error.is_none() {
                    first_error = Some(err);
                }
                slots.push(None);
            }
        }
    }
    (slots, first_error)
}

/// Evaluate a (possibly absent) compiled handle at `t`, clamped into `[0, 255]` and truncated.
///
/// A null handle evaluates to `0`, per spec §4.2.
pub fn eval_clamped(handle: Option<&CompiledExpr>, t: f32) -> u8 {
    let raw = handle.map_or(0.0, |h| h.eval(t));
    raw.clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_constant() {
        let e = compile("128").unwrap();
        assert_eq!(e.eval(0.0), 128.0);
    }

    #[test]
    fn compiles_variable() {
        let e = compile("t").unwrap();
        assert_eq!(e.eval(2.5), 2.5);
    }

    #[test]
    fn compiles_arithmetic_with_precedence() {
        let e = compile("1 + 2 * 3").unwrap();
        assert_eq!(e.eval(0.0), 7.0);
    }

    #[test]
    fn compiles_parentheses() {
        let e = compile("(1 + 2) * 3").unwrap();
        assert_eq!(e.eval(0.0), 9.0);
    }

    #[test]
    fn compiles_unary_minus() {
        let e = compile("-t + 5").unwrap();
        assert_eq!(e.eval(2.0), 3.0);
    }

    #[test]
    fn compiles_trig_case_insensitively() {
        let e = compile("SIN(0)").unwrap();
        assert!((e.eval(0.0)).abs() < 1e-5);
    }

    #[test]
    fn sin_is_periodic_for_large_arguments() {
        let e = compile("sin(t)").unwrap();
        let small = e.eval(1.0);
        let shifted = e.eval(1.0 + TWO_PI * 1000.0);
        assert!((small - shifted).abs() < 1e-2);
    }

    #[test]
    fn rejects_unknown_symbol() {
        let err = compile("bogus(t)").unwrap_err();
        assert_eq!(err.position, 0);
    }

    #[test]
    fn rejects_unbalanced_parens() {
        assert!(compile("(1 + 2").is_err());
    }

    #[test]
    fn division_by_zero_is_zero_not_nan() {
        let e = compile("1 / 0").unwrap();
        assert_eq!(e.eval(0.0), 0.0);
    }

    #[test]
    fn eval_clamped_saturates_and_truncates() {
        let e = compile("1000").unwrap();
        assert_eq!(eval_clamped(Some(&e), 0.0), 255);
        let neg = compile("-5").unwrap();
        assert_eq!(eval_clamped(Some(&neg), 0.0), 0);
        assert_eq!(eval_clamped(None, 0.0), 0);
    }

    #[test]
    /// Property 7: allocated handles equal freed handles once dropped.
    fn handle_conservation() {
        let (before_alloc, before_free) = handle_counts();
        {
            let _a = compile("t").unwrap();
            let _b = compile("sin(t)").unwrap();
        }
        let (after_alloc, after_free) = handle_counts();
        assert_eq!(after_alloc - before_alloc, 2);
        assert_eq!(after_free - before_free, 2);
    }

    #[test]
    fn compile_channel_reports_first_error_but_compiles_rest() {
        use crate::model::EquationSection;
        let config = ChannelConfig {
            sections: vec![
                EquationSection { duration: 100, equation: "t".into() },
                EquationSection { duration: 100, equation: "nope(t)".into() },
                EquationSection { duration: 100, equation: "sin(t)".into() },
            ],
            loop_after_duration: false,
        };
        let (slots, err) = compile_channel(&config);
        assert!(slots[0].is_some());
        assert!(slots[1].is_none());
        assert!(slots[2].is_some());
        assert!(err.is_some());
    }
}
