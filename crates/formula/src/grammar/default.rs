//! The standard formula grammar.
//!
//! Arithmetic works over decimal views, comparisons and equality over the
//! value model's own rules, `AND`/`OR` over boolean views. Variables read
//! from the data context, with `*` wildcards resolving to lists and the
//! `min(@...)` / `max(@...)` / `sum(@...)` forms reducing over a wildcard
//! search.

use std::sync::LazyLock;

use crate::context::DataContext;
use crate::error::ResolveError;
use crate::grammar::{Associativity, Grammar, OperatorDef};
use crate::value::Value;

/// The shared evaluating grammar, built on first use.
pub(crate) fn grammar() -> &'static Grammar<Value> {
    static GRAMMAR: LazyLock<Grammar<Value>> = LazyLock::new(build);
    &GRAMMAR
}

fn one(args: Vec<Value>) -> Value {
    args.into_iter().next().unwrap_or_default()
}

fn two(args: Vec<Value>) -> (Value, Value) {
    let mut it = args.into_iter();
    (
        it.next().unwrap_or_default(),
        it.next().unwrap_or_default(),
    )
}

fn three(args: Vec<Value>) -> (Value, Value, Value) {
    let mut it = args.into_iter();
    (
        it.next().unwrap_or_default(),
        it.next().unwrap_or_default(),
        it.next().unwrap_or_default(),
    )
}

/// Wraps a two-decimal operation as an operator implementation.
fn decimal_op<R: Into<Value>>(
    f: impl Fn(f64, f64) -> R + Send + Sync + 'static,
) -> impl Fn(Vec<Value>) -> Result<Value, ResolveError> + Send + Sync + 'static {
    move |args| {
        let (lhs, rhs) = two(args);
        Ok(f(lhs.as_decimal()?, rhs.as_decimal()?).into())
    }
}

/// Wraps a one-decimal operation as a function implementation.
fn decimal_fn<R: Into<Value>>(
    f: impl Fn(f64) -> R + Send + Sync + 'static,
) -> impl Fn(Vec<Value>) -> Result<Value, ResolveError> + Send + Sync + 'static {
    move |args| Ok(f(one(args).as_decimal()?).into())
}

fn build() -> Grammar<Value> {
    Grammar::builder()
        .quoted_literal('"')
        .quoted_literal('\'')
        .operator("^", 4, Associativity::Right, 2, decimal_op(f64::powf))
        .operator("*", 3, Associativity::Left, 2, decimal_op(|a, b| a * b))
        .operator("/", 3, Associativity::Left, 2, decimal_op(|a, b| a / b))
        .operator("+", 2, Associativity::Left, 2, decimal_op(|a, b| a + b))
        .bi_operator(
            OperatorDef::new("-", 1, 4, Associativity::Left, |args| {
                Ok(Value::Decimal(-one(args).as_decimal()?))
            }),
            OperatorDef::new("-", 2, 2, Associativity::Left, decimal_op(|a, b| a - b)),
        )
        .operator("!", 2, Associativity::Left, 1, |args| {
            Ok(Value::Boolean(!one(args).as_boolean()))
        })
        .operator("<", 3, Associativity::Left, 2, decimal_op(|a, b| a < b))
        .operator("<=", 3, Associativity::Left, 2, decimal_op(|a, b| a <= b))
        .operator(">", 3, Associativity::Left, 2, decimal_op(|a, b| a > b))
        .operator(">=", 3, Associativity::Left, 2, decimal_op(|a, b| a >= b))
        .operator("==", 3, Associativity::Left, 2, |args| {
            let (lhs, rhs) = two(args);
            Ok(Value::Boolean(lhs == rhs))
        })
        .operator("!=", 3, Associativity::Left, 2, |args| {
            let (lhs, rhs) = two(args);
            Ok(Value::Boolean(lhs != rhs))
        })
        .operator("AND", 1, Associativity::Left, 2, |args| {
            let (lhs, rhs) = two(args);
            Ok(Value::Boolean(lhs.as_boolean() && rhs.as_boolean()))
        })
        .operator("OR", 1, Associativity::Left, 2, |args| {
            let (lhs, rhs) = two(args);
            Ok(Value::Boolean(lhs.as_boolean() || rhs.as_boolean()))
        })
        .operator("d", 4, Associativity::Left, 2, |args| {
            let (count, sides) = two(args);
            Ok(Value::roll(count.as_number()?, sides.as_number()?))
        })
        .term("true", Value::Boolean(true))
        .term("false", Value::Boolean(false))
        .term("null", Value::Null)
        .function("abs", 1, decimal_fn(f64::abs))
        .function("min", 2, decimal_op(f64::min))
        .function("max", 2, decimal_op(f64::max))
        .function("floor", 1, decimal_fn(f64::floor))
        .function("ceil", 1, decimal_fn(f64::ceil))
        .function("signed", 1, |args| {
            let n = one(args).as_number()?;
            let sign = if n < 0 { "" } else { "+" };
            Ok(Value::Text(format!("{sign}{n}")))
        })
        .function("if", 3, |args| {
            let (condition, then, otherwise) = three(args);
            Ok(if condition.as_boolean() { then } else { otherwise })
        })
        .function("concat", 2, |args| {
            let (lhs, rhs) = two(args);
            Ok(Value::Text(lhs.as_text() + &rhs.as_text()))
        })
        .function("ordinal", 1, |args| {
            Ok(Value::Text(ordinal(one(args).as_number()?)))
        })
        .variadic("any", |args| {
            Ok(Value::Boolean(args.iter().any(Value::as_boolean)))
        })
        .variadic("all", |args| {
            Ok(Value::Boolean(args.iter().all(Value::as_boolean)))
        })
        .variable("@", "", find_variable)
        .variable("@{", "}", find_variable)
        .variable("min(@", ")", reduce_min)
        .variable("max(@", ")", reduce_max)
        .variable("sum(@", ")", reduce_sum)
        .comment("[", "]", |value, label| Value::named(value, label))
        .build()
}

fn ordinal(n: i64) -> String {
    let suffix = match (n % 100).abs() {
        11..=13 => "th",
        v => match v % 10 {
            1 => "st",
            2 => "nd",
            3 => "rd",
            _ => "th",
        },
    };
    format!("{n}{suffix}")
}

fn require_context<'c>(
    context: Option<&'c DataContext>,
    key: &str,
) -> Result<&'c DataContext, ResolveError> {
    context.ok_or_else(|| ResolveError::MissingContext(key.to_string()))
}

/// `@key` lookup; a wildcard key resolves to the list of matching values.
fn find_variable(context: Option<&DataContext>, key: &str) -> Result<Value, ResolveError> {
    let context = require_context(context, key)?;
    if key.contains('*') {
        Ok(Value::List(context.search(key)?))
    } else {
        context.get(key)
    }
}

/// `sum(@pattern)`: decimal sum over matching keys, Null when none match.
fn reduce_sum(context: Option<&DataContext>, key: &str) -> Result<Value, ResolveError> {
    let found = require_context(context, key)?.search(key)?;
    if found.is_empty() {
        return Ok(Value::Null);
    }
    let mut total = 0.0;
    for value in &found {
        total += value.as_decimal()?;
    }
    Ok(Value::Decimal(total))
}

/// `min(@pattern)`: the matching value with the smallest decimal view.
fn reduce_min(context: Option<&DataContext>, key: &str) -> Result<Value, ResolveError> {
    reduce_by(context, key, |best, candidate| candidate < best)
}

/// `max(@pattern)`: the matching value with the largest decimal view.
fn reduce_max(context: Option<&DataContext>, key: &str) -> Result<Value, ResolveError> {
    reduce_by(context, key, |best, candidate| candidate > best)
}

fn reduce_by(
    context: Option<&DataContext>,
    key: &str,
    replaces: impl Fn(f64, f64) -> bool,
) -> Result<Value, ResolveError> {
    let found = require_context(context, key)?.search(key)?;
    let mut best: Option<(Value, f64)> = None;
    for value in found {
        let decimal = value.as_decimal()?;
        let replace = match &best {
            Some((_, best_decimal)) => replaces(*best_decimal, decimal),
            None => true,
        };
        if replace {
            best = Some((value, decimal));
        }
    }
    Ok(best.map_or(Value::Null, |(value, _)| value))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_ordinal_suffixes() {
        assert_eq!(ordinal(1), "1st");
        assert_eq!(ordinal(2), "2nd");
        assert_eq!(ordinal(3), "3rd");
        assert_eq!(ordinal(4), "4th");
        assert_eq!(ordinal(11), "11th");
        assert_eq!(ordinal(12), "12th");
        assert_eq!(ordinal(13), "13th");
        assert_eq!(ordinal(21), "21st");
        assert_eq!(ordinal(102), "102nd");
        assert_eq!(ordinal(111), "111th");
    }

    #[test]
    fn test_variable_without_context() {
        let err = find_variable(None, "a");
        assert_eq!(err, Err(ResolveError::MissingContext("a".into())));
    }

    #[test]
    fn test_reduce_over_empty_search_is_null() {
        let context = DataContext::new();
        assert_eq!(reduce_sum(Some(&context), "a*").unwrap(), Value::Null);
        assert_eq!(reduce_min(Some(&context), "a*").unwrap(), Value::Null);
    }
}
