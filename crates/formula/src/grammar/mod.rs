//! Grammar registration.
//!
//! A [`Grammar`] is a token trie whose tokens carry their parsing role and
//! their implementation. It is generic over the operand type `V` so the
//! evaluating grammar (over [`Value`]) and the optimizing grammar (over a
//! symbolic operand) are separate instances sharing no state; each is built
//! once and kept in a `LazyLock`.

pub(crate) mod default;

use std::sync::Arc;

use crate::context::DataContext;
use crate::error::{ResolveError, SyntaxError};
use crate::parser::{self, Rpn};
use crate::token::{self, Matcher, TokenTree};
use crate::value::Value;

pub(crate) type ApplyFn<V> = Arc<dyn Fn(Vec<V>) -> Result<V, ResolveError> + Send + Sync>;
pub(crate) type VariableFn<V> =
    Arc<dyn Fn(Option<&DataContext>, &str) -> Result<V, ResolveError> + Send + Sync>;
pub(crate) type DecorateFn<V> = Arc<dyn Fn(V, &str) -> V + Send + Sync>;

/// What a grammar's tokens operate on. The evaluator uses [`Value`]
/// directly; the optimizer wraps literals in its symbolic type.
pub(crate) trait Operand: Clone + Send + Sync + 'static {
    fn from_value(value: Value) -> Self;
}

impl Operand for Value {
    #[inline]
    fn from_value(value: Value) -> Self {
        value
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Associativity {
    Left,
    Right,
}

/// An operator registration: symbol, arity, precedence and implementation.
#[derive(Clone)]
pub(crate) struct OperatorDef<V> {
    pub symbol: String,
    pub operands: usize,
    pub precedence: u8,
    pub associativity: Associativity,
    pub apply: ApplyFn<V>,
}

impl<V> OperatorDef<V> {
    pub fn new(
        symbol: impl Into<String>,
        operands: usize,
        precedence: u8,
        associativity: Associativity,
        apply: impl Fn(Vec<V>) -> Result<V, ResolveError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            operands,
            precedence,
            associativity,
            apply: Arc::new(apply),
        }
    }
}

/// A lexed token together with its parsing role.
#[derive(Clone)]
pub(crate) enum Token<V> {
    Value(V),
    Open,
    Close,
    Comma,
    Operator(OperatorDef<V>),
    /// One spelling, two meanings: unary when it follows the start of
    /// input, another operator, `(` or `,`; binary otherwise.
    BiOperator {
        unary: OperatorDef<V>,
        binary: OperatorDef<V>,
    },
    Function {
        name: String,
        operands: usize,
        apply: ApplyFn<V>,
    },
    Variadic {
        name: String,
        apply: ApplyFn<V>,
    },
    Variable {
        key: String,
        resolve: VariableFn<V>,
    },
    Comment {
        label: String,
        decorate: DecorateFn<V>,
    },
}

/// A compiled grammar, ready to parse formula text.
pub(crate) struct Grammar<V: Operand> {
    tree: TokenTree<Token<V>>,
}

impl<V: Operand> Grammar<V> {
    pub fn builder() -> GrammarBuilder<V> {
        GrammarBuilder::new()
    }

    /// Tokenizes `text` and reorders it into an RPN program.
    pub fn parse(&self, text: &str) -> Result<Rpn<V>, SyntaxError> {
        let tokens = self.tree.tokenize(text)?;
        Ok(parser::shunting_yard(tokens))
    }
}

/// Collects token registrations and compiles them into a [`Grammar`].
///
/// Number literals, parentheses and the argument separator are registered
/// up front; everything else is the caller's grammar table. Registration
/// order is the tie-break when two tokens match the same length of input.
pub(crate) struct GrammarBuilder<V: Operand> {
    tree: TokenTree<Token<V>>,
}

impl<V: Operand> GrammarBuilder<V> {
    pub fn new() -> Self {
        let mut tree = TokenTree::new();
        tree.ignore_whitespace();
        // Decimal first so `3.14` is never lexed as `3` `.` `14`.
        tree.add_branch(token::decimal(), |text| {
            let d = text.parse().unwrap_or(f64::INFINITY);
            Some(Token::Value(V::from_value(Value::Decimal(d))))
        });
        // Digit runs beyond i64 keep their decimal reading; dropping the
        // token here would silently erase the literal.
        tree.add_branch(token::integer(), |text| {
            let value = text.parse::<i64>().map_or_else(
                |_| Value::Decimal(text.parse().unwrap_or(f64::INFINITY)),
                Value::Integer,
            );
            Some(Token::Value(V::from_value(value)))
        });
        tree.add_branch(token::exact_text("("), |_| Some(Token::Open));
        tree.add_branch(token::exact_text(")"), |_| Some(Token::Close));
        tree.add_branch(token::exact_text(","), |_| Some(Token::Comma));
        Self { tree }
    }

    /// A quoted text literal delimited by `quote`, with `\quote` as the
    /// escape. The delimiters are preserved on the value.
    pub fn quoted_literal(mut self, quote: char) -> Self {
        let delimiter = quote.to_string();
        let escape = format!("\\{quote}");
        self.tree.add_branch(
            token::literal(&delimiter, &delimiter, Some(&escape)),
            move |text| {
                let inner = &text[1..text.len() - 1];
                Some(Token::Value(V::from_value(Value::quoted(
                    Value::text(inner),
                    quote.to_string(),
                    quote.to_string(),
                ))))
            },
        );
        self
    }

    pub fn operator(
        mut self,
        symbol: &str,
        precedence: u8,
        associativity: Associativity,
        operands: usize,
        apply: impl Fn(Vec<V>) -> Result<V, ResolveError> + Send + Sync + 'static,
    ) -> Self {
        let def = OperatorDef::new(symbol, operands, precedence, associativity, apply);
        let token = Token::Operator(def);
        self.tree
            .add_branch(token::exact_text(symbol), move |_| Some(token.clone()));
        self
    }

    /// One symbol with distinct unary and binary registrations; the parser
    /// picks by the preceding token.
    pub fn bi_operator(mut self, unary: OperatorDef<V>, binary: OperatorDef<V>) -> Self {
        debug_assert_eq!(unary.symbol, binary.symbol);
        debug_assert_eq!(unary.operands, 1);
        debug_assert_eq!(binary.operands, 2);
        let matchers = token::exact_text(&unary.symbol);
        let token = Token::BiOperator { unary, binary };
        self.tree.add_branch(matchers, move |_| Some(token.clone()));
        self
    }

    /// A keyword that folds to a constant at parse time.
    pub fn term(mut self, text: &str, value: Value) -> Self {
        let token = Token::Value(V::from_value(value));
        self.tree
            .add_branch(token::exact_text(text), move |_| Some(token.clone()));
        self
    }

    pub fn function(
        mut self,
        name: &str,
        operands: usize,
        apply: impl Fn(Vec<V>) -> Result<V, ResolveError> + Send + Sync + 'static,
    ) -> Self {
        let token = Token::Function {
            name: name.to_string(),
            operands,
            apply: Arc::new(apply),
        };
        self.tree
            .add_branch(token::exact_text(name), move |_| Some(token.clone()));
        self
    }

    /// A function taking any number of arguments; the parser records the
    /// actual count in the program.
    pub fn variadic(
        mut self,
        name: &str,
        apply: impl Fn(Vec<V>) -> Result<V, ResolveError> + Send + Sync + 'static,
    ) -> Self {
        let token = Token::Variadic {
            name: name.to_string(),
            apply: Arc::new(apply),
        };
        self.tree
            .add_branch(token::exact_text(name), move |_| Some(token.clone()));
        self
    }

    /// A variable reference: `prefix`, one letter, an optional run of key
    /// characters, then `suffix`. The resolver receives the bare key.
    pub fn variable(
        mut self,
        prefix: &str,
        suffix: &str,
        resolve: impl Fn(Option<&DataContext>, &str) -> Result<V, ResolveError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        let mut matchers = token::exact_text(prefix);
        matchers.push(token::any_of(token::ALPHA_CHARACTERS));
        matchers.push(Matcher::AnyOf {
            set: token::KEY_CHARACTERS.to_string(),
            min: 0,
            max: None,
        });
        matchers.extend(token::exact_text(suffix));

        let resolve: VariableFn<V> = Arc::new(resolve);
        let (skip, trim) = (prefix.len(), suffix.len());
        self.tree.add_branch(matchers, move |text| {
            Some(Token::Variable {
                key: text[skip..text.len() - trim].to_string(),
                resolve: Arc::clone(&resolve),
            })
        });
        self
    }

    /// A `[label]`-style decoration applied to the preceding value.
    pub fn comment(
        mut self,
        open: &str,
        close: &str,
        decorate: impl Fn(V, &str) -> V + Send + Sync + 'static,
    ) -> Self {
        let decorate: DecorateFn<V> = Arc::new(decorate);
        let (skip, trim) = (open.len(), close.len());
        self.tree
            .add_branch(token::literal(open, close, None), move |text| {
                Some(Token::Comment {
                    label: text[skip..text.len() - trim].to_string(),
                    decorate: Arc::clone(&decorate),
                })
            });
        self
    }

    pub fn build(self) -> Grammar<V> {
        Grammar { tree: self.tree }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn tiny_grammar() -> Grammar<Value> {
        Grammar::builder()
            .operator("+", 2, Associativity::Left, 2, |args: Vec<Value>| {
                let mut it = args.into_iter();
                let lhs = it.next().unwrap_or_default();
                let rhs = it.next().unwrap_or_default();
                Ok(Value::Decimal(lhs.as_decimal()? + rhs.as_decimal()?))
            })
            .term("ten", Value::Integer(10))
            .build()
    }

    #[test]
    fn test_parse_and_resolve() {
        let grammar = tiny_grammar();
        let program = grammar.parse("1 + 2 + ten").unwrap();
        assert_eq!(program.resolve(None).unwrap(), Value::Decimal(13.0));
    }

    #[test]
    fn test_unknown_token_is_a_syntax_error() {
        let grammar = tiny_grammar();
        let err = grammar.parse("1 ? 2").unwrap_err();
        assert_eq!(err.offset(), 2);
    }

    #[test]
    fn test_literal_past_i64_reads_as_decimal() {
        let grammar = tiny_grammar();
        // One past i64::MAX.
        let program = grammar.parse("9223372036854775808").unwrap();
        assert_eq!(
            program.resolve(None).unwrap(),
            Value::Decimal(9_223_372_036_854_775_808.0)
        );
        let program = grammar.parse("9223372036854775808 + 1").unwrap();
        assert_eq!(
            program.resolve(None).unwrap().as_decimal(),
            Ok(9_223_372_036_854_775_808.0 + 1.0)
        );
    }

    #[test]
    fn test_quoted_literal_keeps_delimiters() {
        let grammar = Grammar::<Value>::builder().quoted_literal('"').build();
        let program = grammar.parse("\"hello\"").unwrap();
        assert_eq!(
            program.resolve(None).unwrap(),
            Value::quoted(Value::text("hello"), "\"", "\"")
        );
    }
}
