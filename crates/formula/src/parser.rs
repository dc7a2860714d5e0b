//! Shunting-yard: a token stream becomes an RPN program.
//!
//! The algorithm is the classic two-stack form with two extensions:
//! bi-operators are resolved to their unary or binary meaning by looking at
//! the previous token, and variadic function calls carry their argument
//! count, tracked with a parallel arity stack while parentheses are open
//! and emitted as an [`RpnEntry::Arity`] directly before the function.

use tracing::trace;

use crate::grammar::{ApplyFn, Associativity, DecorateFn, Operand, OperatorDef, Token, VariableFn};

/// One step of a compiled program.
#[derive(Clone)]
pub(crate) enum RpnEntry<V> {
    Value(V),
    Operator(OperatorDef<V>),
    Function {
        name: String,
        operands: usize,
        apply: ApplyFn<V>,
    },
    /// Argument count for the variadic function that follows.
    Arity(usize),
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

/// An immutable compiled program in reverse Polish order.
#[derive(Clone)]
pub(crate) struct Rpn<V> {
    pub(crate) entries: Vec<RpnEntry<V>>,
}

impl<V> std::fmt::Debug for Rpn<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rpn")
            .field("entries", &self.entries.len())
            .finish()
    }
}

impl<V> Rpn<V> {
    /// The empty program; it resolves to Null.
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

/// What the previous token was, as far as disambiguation cares.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Prev {
    Start,
    Operator,
    Open,
    Comma,
    Operand,
}

enum StackItem<V> {
    Operator(OperatorDef<V>),
    Open,
    Function {
        name: String,
        operands: usize,
        apply: ApplyFn<V>,
    },
    Variadic {
        name: String,
        apply: ApplyFn<V>,
    },
}

pub(crate) fn shunting_yard<V: Operand>(tokens: Vec<Token<V>>) -> Rpn<V> {
    let mut output: Vec<RpnEntry<V>> = Vec::new();
    let mut stack: Vec<StackItem<V>> = Vec::new();
    let mut arity: Vec<usize> = Vec::new();
    let mut prev = Prev::Start;

    for token in tokens {
        // A bi-operator is unary when nothing bindable precedes it.
        let token = match token {
            Token::BiOperator { unary, binary } => {
                if matches!(prev, Prev::Start | Prev::Operator | Prev::Open | Prev::Comma) {
                    Token::Operator(unary)
                } else {
                    Token::Operator(binary)
                }
            }
            other => other,
        };

        let at_open = prev == Prev::Open;
        prev = match &token {
            Token::Operator(_) => Prev::Operator,
            Token::Open => Prev::Open,
            Token::Comma => Prev::Comma,
            _ => Prev::Operand,
        };

        match token {
            Token::Value(value) => output.push(RpnEntry::Value(value)),
            Token::Variable { key, resolve } => output.push(RpnEntry::Variable { key, resolve }),
            Token::Comment { label, decorate } => {
                output.push(RpnEntry::Comment { label, decorate });
            }
            Token::Operator(op) => {
                flush_operators(&mut stack, &mut output, |top| {
                    top.precedence > op.precedence
                        || (top.precedence == op.precedence
                            && op.associativity == Associativity::Left)
                });
                stack.push(StackItem::Operator(op));
            }
            Token::Function {
                name,
                operands,
                apply,
            } => {
                stack.push(StackItem::Function {
                    name,
                    operands,
                    apply,
                });
                arity.push(1);
            }
            Token::Variadic { name, apply } => {
                stack.push(StackItem::Variadic { name, apply });
                arity.push(1);
            }
            Token::Open => stack.push(StackItem::Open),
            Token::Comma => {
                if let Some(count) = arity.last_mut() {
                    *count += 1;
                }
                flush_operators(&mut stack, &mut output, |_| true);
            }
            Token::Close => {
                flush_operators(&mut stack, &mut output, |_| true);
                if matches!(stack.last(), Some(StackItem::Open)) {
                    stack.pop();
                }
                match stack.last() {
                    Some(StackItem::Function { .. }) => {
                        if let Some(StackItem::Function {
                            name,
                            operands,
                            apply,
                        }) = stack.pop()
                        {
                            arity.pop();
                            output.push(RpnEntry::Function {
                                name,
                                operands,
                                apply,
                            });
                        }
                    }
                    Some(StackItem::Variadic { .. }) => {
                        if let Some(StackItem::Variadic { name, apply }) = stack.pop() {
                            let count = arity.pop().unwrap_or(0);
                            // `f()` parses as a call with no arguments.
                            let count = if at_open { 0 } else { count };
                            output.push(RpnEntry::Arity(count));
                            output.push(RpnEntry::Variadic { name, apply });
                        }
                    }
                    _ => {}
                }
            }
            Token::BiOperator { .. } => unreachable!("resolved above"),
        }
    }

    // Flush whatever is left; unbalanced parentheses surface as missing
    // operands at resolve time.
    while let Some(item) = stack.pop() {
        match item {
            StackItem::Operator(op) => output.push(RpnEntry::Operator(op)),
            StackItem::Open => {}
            StackItem::Function {
                name,
                operands,
                apply,
            } => output.push(RpnEntry::Function {
                name,
                operands,
                apply,
            }),
            StackItem::Variadic { name, apply } => {
                output.push(RpnEntry::Arity(arity.pop().unwrap_or(0)));
                output.push(RpnEntry::Variadic { name, apply });
            }
        }
    }

    trace!(entries = output.len(), "reordered tokens into rpn");
    Rpn { entries: output }
}

/// Pops operators to the output while `keep_flushing` holds; stops at
/// anything that is not an operator.
fn flush_operators<V>(
    stack: &mut Vec<StackItem<V>>,
    output: &mut Vec<RpnEntry<V>>,
    keep_flushing: impl Fn(&OperatorDef<V>) -> bool,
) {
    loop {
        let flush = match stack.last() {
            Some(StackItem::Operator(top)) => keep_flushing(top),
            _ => false,
        };
        if !flush {
            return;
        }
        if let Some(StackItem::Operator(top)) = stack.pop() {
            output.push(RpnEntry::Operator(top));
        }
    }
}
