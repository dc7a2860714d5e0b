//! End-to-end language tests: parse then resolve, with and without data.

use formula_engine::{DataContext, Formula, ResolveError, Value, parse};
use pretty_assertions::assert_eq;
use rstest::rstest;

fn resolve(text: &str) -> Value {
    parse(text).unwrap().resolve().unwrap()
}

fn resolve_with(text: &str, context: &DataContext) -> Value {
    parse(text).unwrap().resolve_with(context).unwrap()
}

#[rstest]
#[case("2+3*4", 14.0)]
#[case("(2+3)*4", 20.0)]
#[case("10/4", 2.5)]
#[case("2^3", 8.0)]
#[case("2^3^2", 512.0)]
#[case("-5+3", -2.0)]
#[case("5-3", 2.0)]
#[case("5 - -3", 8.0)]
#[case("-(2+3)", -5.0)]
#[case("abs(-4)", 4.0)]
#[case("floor(2.9)", 2.0)]
#[case("ceil(2.1)", 3.0)]
#[case("min(4, 2)", 2.0)]
#[case("max(4, 2)", 4.0)]
#[case("if(true, 1, 2)", 1.0)]
#[case("if(false, 1, 2)", 2.0)]
#[case("2d6", 7.0)]
#[case("1d20", 10.5)]
fn test_decimal_results(#[case] formula: &str, #[case] expected: f64) {
    assert_eq!(resolve(formula).as_decimal(), Ok(expected));
}

#[rstest]
#[case("1 < 2", true)]
#[case("2 <= 2", true)]
#[case("3 > 4", false)]
#[case("4 >= 5", false)]
#[case("1 == 1", true)]
#[case("1 == 2", false)]
#[case("1 != 2", true)]
#[case("\"5\" == 5", true)]
#[case("true AND true", true)]
#[case("true AND false", false)]
#[case("true OR false", true)]
#[case("false OR false", false)]
#[case("!true", false)]
#[case("!false", true)]
#[case("any(false, false, true)", true)]
#[case("any(false, false)", false)]
#[case("any()", false)]
#[case("all(true, true, false)", false)]
#[case("all(true, true)", true)]
#[case("1 < 2 AND 2 < 3", true)]
fn test_boolean_results(#[case] formula: &str, #[case] expected: bool) {
    assert_eq!(resolve(formula).as_boolean(), expected);
}

#[rstest]
#[case("\"hello\"", "hello")]
#[case("'hello'", "hello")]
#[case("concat(\"ab\", \"cd\")", "abcd")]
#[case("concat(1+1, \"nd\")", "2nd")]
#[case("signed(3)", "+3")]
#[case("signed(-3)", "-3")]
#[case("signed(0)", "+0")]
#[case("ordinal(1)", "1st")]
#[case("ordinal(2)", "2nd")]
#[case("ordinal(11)", "11th")]
#[case("2d6", "2d6")]
#[case("5+5", "10")]
#[case("null", "")]
fn test_text_results(#[case] formula: &str, #[case] expected: &str) {
    assert_eq!(resolve(formula).as_text(), expected);
}

#[test]
fn test_oversized_dice_roll_resolves() {
    let value = resolve("9999999999d9999999999");
    assert!(value.as_decimal().unwrap().is_finite());
    assert_eq!(value.as_text(), "9999999999d9999999999");
}

#[test]
fn test_integer_literal_past_i64_keeps_its_value() {
    let value = resolve("9223372036854775808");
    assert_eq!(value, Value::Decimal(9_223_372_036_854_775_808.0));
}

#[test]
fn test_escaped_quotes() {
    assert_eq!(resolve("\"say \\\"hi\\\"\"").as_text(), "say \\\"hi\\\"");
}

#[test]
fn test_comment_names_the_value() {
    let value = resolve("3 [Strength]");
    assert_eq!(value, Value::named(Value::Integer(3), "Strength"));
    assert_eq!(value.as_number(), Ok(3));
}

#[test]
fn test_comment_applies_to_preceding_group() {
    let value = resolve("(1+2)[total] + 1");
    assert_eq!(value.as_decimal(), Ok(4.0));
}

mod variables {
    use super::*;
    use pretty_assertions::assert_eq;

    fn context() -> DataContext {
        let mut context = DataContext::new();
        context.set("a", 1_i64);
        context.set("b", 2_i64);
        context.set("key:with.parts", 10_i64);
        context
    }

    #[test]
    fn test_simple_variable() {
        assert_eq!(resolve_with("@a + @b", &context()).as_decimal(), Ok(3.0));
    }

    #[test]
    fn test_braced_variable() {
        assert_eq!(
            resolve_with("@{key:with.parts} * 2", &context()).as_decimal(),
            Ok(20.0)
        );
    }

    #[test]
    fn test_missing_variable_is_null() {
        let value = resolve_with("@missing", &context());
        assert_eq!(value, Value::Null);
        assert_eq!(value.as_text(), "");
    }

    #[test]
    fn test_wildcard_variable_resolves_to_list() {
        let mut context = DataContext::new();
        context.set("a1", 1_i64);
        context.set("a2", 2_i64);
        context.set("a3", 3_i64);
        let value = resolve_with("@a*", &context);
        assert_eq!(
            value,
            Value::List(vec![
                Value::Integer(1),
                Value::Integer(2),
                Value::Integer(3)
            ])
        );
    }

    #[rstest]
    #[case("sum(@a*)", 6.0)]
    #[case("min(@a*)", 1.0)]
    #[case("max(@a*)", 3.0)]
    fn test_wildcard_aggregates(#[case] formula: &str, #[case] expected: f64) {
        let mut context = DataContext::new();
        context.set("a1", 1_i64);
        context.set("a2", 2_i64);
        context.set("a3", 3_i64);
        assert_eq!(resolve_with(formula, &context).as_decimal(), Ok(expected));
    }

    #[test]
    fn test_aggregate_over_empty_search_is_null() {
        let value = resolve_with("sum(@z*)", &context());
        assert_eq!(value, Value::Null);
    }

    #[test]
    fn test_nested_formula_resolves_against_owning_context() {
        let mut context = DataContext::new();
        context.set("b", Formula::parse("@a + 2").unwrap());
        context.set("a", 1_i64);
        assert_eq!(resolve_with("@b", &context).as_decimal(), Ok(3.0));
    }

    #[test]
    fn test_json_seeded_context_matches_hand_built() {
        let json = DataContext::from_json(&serde_json::json!({
            "a": 1,
            "b": 2,
        }));
        assert_eq!(
            resolve_with("@a + @b", &json),
            resolve_with("@a + @b", &context())
        );
    }
}

mod errors {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_illegal_character_offset() {
        let err = parse("@a$").unwrap_err();
        assert_eq!(err.offset(), 2);
        assert!(err.message().contains('$'));
    }

    #[test]
    fn test_text_variable_is_not_a_number() {
        let mut context = DataContext::new();
        context.set("a", "hello");
        let value = resolve_with("@a", &context);
        assert_eq!(
            value.as_number(),
            Err(ResolveError::NotANumber("hello".into()))
        );
    }

    #[test]
    fn test_adding_text_fails_to_resolve() {
        let mut context = DataContext::new();
        context.set("a", "hello");
        let formula = parse("@a + 1").unwrap();
        assert_eq!(
            formula.resolve_with(&context),
            Err(ResolveError::NotANumber("hello".into()))
        );
    }
}

#[test]
fn test_optimize_round_trip_preserves_resolution() {
    let formulas = [
        "2+3*4",
        "1+2+@a",
        "(1+2)*@a",
        "@a + (@b + @c)",
        "@a * (@b + @c + @d)/2",
        "@a - (@b / @c)",
        "@a - (@b + @c)",
        "@a < (@b - @c)",
        "any(any(@a, any(@b, @c)), @d)",
        "all(@a, @b, true)",
        "@a OR @b",
        "if(@a > 1, 2, 3)",
        "concat(\"x\", @a)",
        "min(@a*)",
    ];
    let mut context = DataContext::new();
    context.set("a", 2_i64);
    context.set("b", 3_i64);
    context.set("c", 4_i64);
    context.set("d", 5_i64);

    for formula in formulas {
        let optimized = formula_engine::optimize(formula).unwrap();
        let direct = parse(formula).unwrap().resolve_with(&context).unwrap();
        let round_tripped = parse(&optimized).unwrap().resolve_with(&context).unwrap();
        assert_eq!(
            round_tripped.as_text(),
            direct.as_text(),
            "round trip changed `{formula}` (optimized to `{optimized}`)"
        );
    }
}
