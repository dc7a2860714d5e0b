//! RPN program evaluation.

use tracing::trace;

use crate::context::DataContext;
use crate::error::ResolveError;
use crate::grammar::{ApplyFn, Operand};
use crate::parser::{Rpn, RpnEntry};
use crate::value::Value;

impl<V: Operand> Rpn<V> {
    /// Runs the program against an optional data context.
    ///
    /// Values and resolved variables go on a stack; operators and
    /// functions pop their operands from it. Variadic functions read the
    /// argument count queued directly before them. An empty program
    /// resolves to Null.
    pub(crate) fn resolve(&self, context: Option<&DataContext>) -> Result<V, ResolveError> {
        let mut stack: Vec<V> = Vec::new();
        let mut pending_arity: Option<usize> = None;

        for entry in &self.entries {
            match entry {
                RpnEntry::Value(value) => stack.push(value.clone()),
                RpnEntry::Variable { key, resolve } => {
                    trace!(key = %key, "resolving variable");
                    stack.push(resolve(context, key)?);
                }
                RpnEntry::Operator(op) => {
                    apply(&mut stack, &op.symbol, op.operands, &op.apply)?;
                }
                RpnEntry::Function {
                    name,
                    operands,
                    apply: function,
                } => {
                    apply(&mut stack, name, *operands, function)?;
                }
                RpnEntry::Arity(count) => pending_arity = Some(*count),
                RpnEntry::Variadic {
                    name,
                    apply: function,
                } => {
                    let count = pending_arity
                        .take()
                        .ok_or_else(|| ResolveError::MissingArity(name.clone()))?;
                    apply(&mut stack, name, count, function)?;
                }
                RpnEntry::Comment { label, decorate } => {
                    let value = stack
                        .pop()
                        .ok_or_else(|| ResolveError::missing_operand(label.clone(), 1))?;
                    stack.push(decorate(value, label));
                }
            }
        }

        Ok(stack.pop().unwrap_or_else(|| V::from_value(Value::Null)))
    }
}

/// Pops `count` operands (left-to-right order restored) and pushes the
/// result of `function`.
fn apply<V: Operand>(
    stack: &mut Vec<V>,
    symbol: &str,
    count: usize,
    function: &ApplyFn<V>,
) -> Result<(), ResolveError> {
    let mut args = Vec::with_capacity(count);
    for missing in (1..=count).rev() {
        let value = stack
            .pop()
            .ok_or_else(|| ResolveError::missing_operand(symbol, missing))?;
        args.push(value);
    }
    args.reverse();
    stack.push(function(args)?);
    Ok(())
}
