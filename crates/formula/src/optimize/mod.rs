//! Algebraic simplification of formula text.
//!
//! A second grammar instance runs the same tokenizer/parser/evaluator
//! machinery over a symbolic operand: operations over fully-resolved
//! literals fold to constants, anything touching a variable becomes a
//! deferred node that renders back to formula text. `AND`/`OR` and the
//! `any`/`all` functions flatten into a single group with identity and
//! absorbing literals removed.

use std::sync::LazyLock;

use tracing::debug;

use crate::error::{FormulaError, ResolveError};
use crate::grammar::{Associativity, Grammar, Operand, OperatorDef};
use crate::value::Value;

/// Simplifies `text` and renders it back as formula text.
pub(crate) fn optimize(text: &str) -> Result<String, FormulaError> {
    if text.trim().is_empty() {
        return Ok(String::new());
    }
    let program = grammar().parse(text)?;
    let simplified = program.resolve(None)?;
    debug!(source = text, "optimized formula");
    Ok(simplified.render_top())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MathOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl MathOp {
    fn symbol(self) -> char {
        match self {
            Self::Add => '+',
            Self::Sub => '-',
            Self::Mul => '*',
            Self::Div => '/',
        }
    }

    /// `+` and `-` share brackets; so do `*` and `/`.
    fn additive(self) -> bool {
        matches!(self, Self::Add | Self::Sub)
    }

    fn apply(self, lhs: f64, rhs: f64) -> f64 {
        match self {
            Self::Add => lhs + rhs,
            Self::Sub => lhs - rhs,
            Self::Mul => lhs * rhs,
            Self::Div => lhs / rhs,
        }
    }
}

/// A partially-resolved formula fragment.
#[derive(Debug, Clone)]
pub(crate) enum Sym {
    /// A fully-resolved value, or a symbolic spelling carried as text
    /// (variables and deferred operations render themselves into
    /// `Lit(Text(...))`).
    Lit(Value),
    /// Deferred arithmetic kept as a tree for bracket-aware rendering.
    Math {
        op: MathOp,
        lhs: Box<Sym>,
        rhs: Box<Sym>,
    },
    Any(Vec<Sym>),
    All(Vec<Sym>),
    /// A `[label]` comment kept on its subject.
    Named { value: Box<Sym>, label: String },
}

impl Operand for Sym {
    #[inline]
    fn from_value(value: Value) -> Self {
        Self::Lit(value)
    }
}

impl Sym {
    fn render(&self) -> String {
        match self {
            Self::Lit(value) => render_literal(value),
            Self::Math { .. } => format!("({})", self.render_flat()),
            Self::Any(items) => render_group("any", items),
            Self::All(items) => render_group("all", items),
            Self::Named { value, label } => format!("{}[{label}]", value.render()),
        }
    }

    /// Like [`Sym::render`] but a top-level math node keeps no outer
    /// brackets.
    fn render_top(&self) -> String {
        match self {
            Self::Math { .. } => self.render_flat(),
            other => other.render(),
        }
    }

    /// Math rendering without this node's own brackets. A left child in the
    /// same bracket family inlines itself; a right child only does so under
    /// `+` or `*`, where left-associative re-parsing keeps the value.
    fn render_flat(&self) -> String {
        let Self::Math { op, lhs, rhs } = self else {
            return self.render();
        };
        let left = match lhs.as_ref() {
            Self::Math { op: child, .. } if child.additive() == op.additive() => lhs.render_flat(),
            other => other.render(),
        };
        let right = match rhs.as_ref() {
            Self::Math { op: child, .. }
                if child.additive() == op.additive()
                    && matches!(op, MathOp::Add | MathOp::Mul) =>
            {
                rhs.render_flat()
            }
            other => other.render(),
        };
        format!("{left}{}{right}", op.symbol())
    }
}

fn render_group(name: &str, items: &[Sym]) -> String {
    if let [single] = items {
        return single.render();
    }
    let rendered: Vec<String> = items.iter().map(Sym::render).collect();
    format!("{name}({})", rendered.join(","))
}

fn render_literal(value: &Value) -> String {
    match value {
        Value::Quoted {
            value,
            prefix,
            suffix,
        } => format!("{prefix}{}{suffix}", value.as_text()),
        other => other.as_text(),
    }
}

/// The numeric reading of a foldable literal. Text literals stay symbolic
/// even when they look numeric: they are variable spellings.
fn numeric(sym: &Sym) -> Option<f64> {
    match sym {
        Sym::Lit(Value::Integer(n)) => Some(*n as f64),
        Sym::Lit(Value::Decimal(d)) => Some(*d),
        _ => None,
    }
}

fn boolean(sym: &Sym) -> Option<bool> {
    match sym {
        Sym::Lit(Value::Boolean(b)) => Some(*b),
        _ => None,
    }
}

/// A literal that is safe to compare by value: anything except symbolic
/// text.
fn concrete(sym: &Sym) -> Option<&Value> {
    match sym {
        Sym::Lit(Value::Text(_)) => None,
        Sym::Lit(value) => Some(value),
        _ => None,
    }
}

/// Folded numbers render as integers when they are whole.
fn number(value: f64) -> Sym {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        Sym::Lit(Value::Integer(value as i64))
    } else {
        Sym::Lit(Value::Decimal(value))
    }
}

fn one(args: Vec<Sym>) -> Sym {
    args.into_iter()
        .next()
        .unwrap_or(Sym::Lit(Value::Null))
}

fn two(args: Vec<Sym>) -> (Sym, Sym) {
    let mut it = args.into_iter();
    (
        it.next().unwrap_or(Sym::Lit(Value::Null)),
        it.next().unwrap_or(Sym::Lit(Value::Null)),
    )
}

/// `any(...)` with nested groups inlined, false dropped and true absorbing
/// everything.
fn any_of(items: Vec<Sym>) -> Sym {
    let mut flat = Vec::new();
    let mut saw_false = false;
    for item in items {
        match item {
            Sym::Any(children) => flat.extend(children),
            other => match boolean(&other) {
                Some(true) => return Sym::Lit(Value::Boolean(true)),
                Some(false) => saw_false = true,
                None => flat.push(other),
            },
        }
    }
    if flat.is_empty() {
        return Sym::Lit(Value::Boolean(!saw_false));
    }
    Sym::Any(flat)
}

/// `all(...)` with nested groups inlined, true dropped and false absorbing
/// everything.
fn all_of(items: Vec<Sym>) -> Sym {
    let mut flat = Vec::new();
    for item in items {
        match item {
            Sym::All(children) => flat.extend(children),
            other => match boolean(&other) {
                Some(true) => {}
                Some(false) => return Sym::Lit(Value::Boolean(false)),
                None => flat.push(other),
            },
        }
    }
    if flat.is_empty() {
        return Sym::Lit(Value::Boolean(true));
    }
    Sym::All(flat)
}

fn math_op(op: MathOp) -> impl Fn(Vec<Sym>) -> Result<Sym, ResolveError> + Send + Sync + 'static {
    move |args| {
        let (lhs, rhs) = two(args);
        if let (Some(a), Some(b)) = (numeric(&lhs), numeric(&rhs)) {
            let folded = op.apply(a, b);
            // Division by zero stays deferred rather than rendering `inf`.
            if folded.is_finite() {
                return Ok(number(folded));
            }
        }
        Ok(Sym::Math {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }
}

fn comparison(
    symbol: &'static str,
    f: impl Fn(f64, f64) -> bool + Send + Sync + 'static,
) -> impl Fn(Vec<Sym>) -> Result<Sym, ResolveError> + Send + Sync + 'static {
    move |args| {
        let (lhs, rhs) = two(args);
        if let (Some(a), Some(b)) = (numeric(&lhs), numeric(&rhs)) {
            return Ok(Sym::Lit(Value::Boolean(f(a, b))));
        }
        Ok(defer(format!("{}{symbol}{}", lhs.render(), rhs.render())))
    }
}

fn equality(
    symbol: &'static str,
    negated: bool,
) -> impl Fn(Vec<Sym>) -> Result<Sym, ResolveError> + Send + Sync + 'static {
    move |args| {
        let (lhs, rhs) = two(args);
        if let (Some(a), Some(b)) = (concrete(&lhs), concrete(&rhs)) {
            return Ok(Sym::Lit(Value::Boolean((a == b) != negated)));
        }
        Ok(defer(format!("{}{symbol}{}", lhs.render(), rhs.render())))
    }
}

/// A numeric function that folds when every argument is numeric and
/// otherwise renders back as a call.
fn numeric_fn(
    name: &'static str,
    f: impl Fn(&[f64]) -> f64 + Send + Sync + 'static,
) -> impl Fn(Vec<Sym>) -> Result<Sym, ResolveError> + Send + Sync + 'static {
    move |args| {
        let folded: Option<Vec<f64>> = args.iter().map(numeric).collect();
        match folded {
            Some(values) => Ok(number(f(&values))),
            None => Ok(defer_call(name, &args)),
        }
    }
}

/// A function that always renders back as a call.
fn passthrough_fn(
    name: &'static str,
) -> impl Fn(Vec<Sym>) -> Result<Sym, ResolveError> + Send + Sync + 'static {
    move |args| Ok(defer_call(name, &args))
}

fn defer(text: String) -> Sym {
    Sym::Lit(Value::Text(text))
}

fn defer_call(name: &str, args: &[Sym]) -> Sym {
    let rendered: Vec<String> = args.iter().map(Sym::render).collect();
    defer(format!("{name}({})", rendered.join(",")))
}

/// The shared optimizing grammar, built on first use. Independent of the
/// evaluating grammar; only the token spellings coincide.
fn grammar() -> &'static Grammar<Sym> {
    static GRAMMAR: LazyLock<Grammar<Sym>> = LazyLock::new(build);
    &GRAMMAR
}

fn build() -> Grammar<Sym> {
    Grammar::builder()
        .quoted_literal('"')
        .quoted_literal('\'')
        .operator("^", 4, Associativity::Right, 2, |args| {
            let (lhs, rhs) = two(args);
            if let (Some(a), Some(b)) = (numeric(&lhs), numeric(&rhs)) {
                let folded = a.powf(b);
                if folded.is_finite() {
                    return Ok(number(folded));
                }
            }
            Ok(defer(format!("{}^{}", lhs.render(), rhs.render())))
        })
        .operator("*", 3, Associativity::Left, 2, math_op(MathOp::Mul))
        .operator("/", 3, Associativity::Left, 2, math_op(MathOp::Div))
        .operator("+", 2, Associativity::Left, 2, math_op(MathOp::Add))
        .bi_operator(
            OperatorDef::new("-", 1, 4, Associativity::Left, |args| {
                let value = one(args);
                match numeric(&value) {
                    Some(n) => Ok(number(-n)),
                    None => Ok(defer(format!("-{}", value.render()))),
                }
            }),
            OperatorDef::new("-", 2, 2, Associativity::Left, math_op(MathOp::Sub)),
        )
        .operator("!", 2, Associativity::Left, 1, |args| {
            let value = one(args);
            match boolean(&value) {
                Some(b) => Ok(Sym::Lit(Value::Boolean(!b))),
                None => Ok(defer(format!("!{}", value.render()))),
            }
        })
        .operator("<", 3, Associativity::Left, 2, comparison("<", |a, b| a < b))
        .operator("<=", 3, Associativity::Left, 2, comparison("<=", |a, b| a <= b))
        .operator(">", 3, Associativity::Left, 2, comparison(">", |a, b| a > b))
        .operator(">=", 3, Associativity::Left, 2, comparison(">=", |a, b| a >= b))
        .operator("==", 3, Associativity::Left, 2, equality("==", false))
        .operator("!=", 3, Associativity::Left, 2, equality("!=", true))
        .operator("AND", 1, Associativity::Left, 2, |args| {
            let (lhs, rhs) = two(args);
            Ok(all_of(vec![lhs, rhs]))
        })
        .operator("OR", 1, Associativity::Left, 2, |args| {
            let (lhs, rhs) = two(args);
            Ok(any_of(vec![lhs, rhs]))
        })
        .operator("d", 4, Associativity::Left, 2, |args| {
            let (lhs, rhs) = two(args);
            Ok(defer(format!("{}d{}", lhs.render(), rhs.render())))
        })
        .term("true", Value::Boolean(true))
        .term("false", Value::Boolean(false))
        // Renders back as its own spelling; Null would render as "".
        .term("null", Value::text("null"))
        .function("abs", 1, numeric_fn("abs", |v| v[0].abs()))
        .function("min", 2, numeric_fn("min", |v| v[0].min(v[1])))
        .function("max", 2, numeric_fn("max", |v| v[0].max(v[1])))
        .function("floor", 1, numeric_fn("floor", |v| v[0].floor()))
        .function("ceil", 1, numeric_fn("ceil", |v| v[0].ceil()))
        .function("signed", 1, passthrough_fn("signed"))
        .function("if", 3, |args| {
            if let Some(condition) = args.first().and_then(boolean) {
                let mut it = args.into_iter();
                let then = it.nth(1).unwrap_or(Sym::Lit(Value::Null));
                let otherwise = it.next().unwrap_or(Sym::Lit(Value::Null));
                return Ok(if condition { then } else { otherwise });
            }
            Ok(defer_call("if", &args))
        })
        .function("concat", 2, passthrough_fn("concat"))
        .function("ordinal", 1, passthrough_fn("ordinal"))
        .variadic("any", |args| Ok(any_of(args)))
        .variadic("all", |args| Ok(all_of(args)))
        .variable("@", "", |_, key| Ok(defer(format!("@{key}"))))
        .variable("@{", "}", |_, key| Ok(defer(format!("@{{{key}}}"))))
        .variable("min(@", ")", |_, key| Ok(defer(format!("min(@{key})"))))
        .variable("max(@", ")", |_, key| Ok(defer(format!("max(@{key})"))))
        .variable("sum(@", ")", |_, key| Ok(defer(format!("sum(@{key})"))))
        .comment("[", "]", |value, label| Sym::Named {
            value: Box::new(value),
            label: label.to_string(),
        })
        .build()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn opt(text: &str) -> String {
        optimize(text).unwrap()
    }

    #[test]
    fn test_constant_folding() {
        assert_eq!(opt("1+2"), "3");
        assert_eq!(opt("1+2+@x"), "3+@x");
        assert_eq!(opt("(1+2)*@x"), "3*@x");
        assert_eq!(opt("2^3"), "8");
        assert_eq!(opt("10/4"), "2.5");
    }

    #[test]
    fn test_division_by_zero_stays_deferred() {
        assert_eq!(opt("1/0"), "1/0");
    }

    #[test]
    fn test_math_bracket_families() {
        assert_eq!(opt("@a + (@b + @c)"), "@a+@b+@c");
        assert_eq!(opt("@a * (@b + @c + @d) / 2"), "@a*(@b+@c+@d)/2");
        assert_eq!(opt("@a-(@b/@c)"), "@a-(@b/@c)");
        assert_eq!(opt("@a<(@b-@c)"), "@a<(@b-@c)");
        // Subtraction and division do not distribute over their own family.
        assert_eq!(opt("@a - (@b + @c)"), "@a-(@b+@c)");
        assert_eq!(opt("@a / (@b * @c)"), "@a/(@b*@c)");
        assert_eq!(opt("@a + (@b - @c)"), "@a+@b-@c");
        assert_eq!(opt("@a * (@b / @c)"), "@a*@b/@c");
    }

    #[test]
    fn test_group_flattening() {
        assert_eq!(opt("any(any(@a, any(@b, @c)), @d)"), "any(@a,@b,@c,@d)");
        assert_eq!(opt("@a OR @b OR @c"), "any(@a,@b,@c)");
        assert_eq!(opt("@a AND @b"), "all(@a,@b)");
    }

    #[test]
    fn test_boolean_literal_elimination() {
        assert_eq!(opt("any(@a, false)"), "@a");
        assert_eq!(opt("any(@a, true)"), "true");
        assert_eq!(opt("all(@a, true)"), "@a");
        assert_eq!(opt("all(@a, false)"), "false");
        assert_eq!(opt("any(false, false)"), "false");
        assert_eq!(opt("all()"), "true");
    }

    #[test]
    fn test_symbolic_spellings_survive() {
        assert_eq!(opt("-@a"), "-@a");
        assert_eq!(opt("!@a"), "!@a");
        assert_eq!(opt("2d6"), "2d6");
        assert_eq!(opt("signed(@a)"), "signed(@a)");
        assert_eq!(opt("concat(\"a\", @b)"), "concat(\"a\",@b)");
        assert_eq!(opt("min(@a*)"), "min(@a*)");
        assert_eq!(opt("@{a.b}"), "@{a.b}");
    }

    #[test]
    fn test_quoted_and_named_rendering() {
        assert_eq!(opt("\"testing\""), "\"testing\"");
        assert_eq!(opt("'testing'"), "'testing'");
        assert_eq!(opt("(@a+@b)[testing]"), "(@a+@b)[testing]");
        assert_eq!(opt("null"), "null");
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(opt(""), "");
        assert_eq!(opt("   "), "");
    }
}
