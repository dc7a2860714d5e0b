//! Formula expression language.
//!
//! Parses text like `2 + 3 * @strength` into an immutable program, resolves
//! it against key/value data, and can algebraically simplify formula text
//! without resolving its variables.
//!
//! ```
//! use formula_engine::{DataContext, Formula, Value};
//!
//! let formula = Formula::parse("2 + 3 * @strength")?;
//! let mut context = DataContext::new();
//! context.set("strength", 4_i64);
//! assert_eq!(formula.resolve_with(&context)?, Value::Decimal(14.0));
//!
//! assert_eq!(formula_engine::optimize("2 + 3 + @strength")?, "5+@strength");
//! # Ok::<(), formula_engine::FormulaError>(())
//! ```
//!
//! Parsing is a trie tokenizer feeding a shunting-yard pass; the result is
//! a reverse Polish program that can be resolved any number of times, from
//! any thread, against different contexts.

mod context;
mod error;
mod eval;
mod grammar;
mod optimize;
mod parser;
mod token;
mod value;

use std::fmt;
use std::str::FromStr;

use tracing::debug;

pub use crate::context::{DataContext, Entry, Resolvable};
pub use crate::error::{FormulaError, FormulaResult, ResolveError, SyntaxError};
pub use crate::value::{Roll, Value};

use crate::parser::Rpn;

/// A parsed formula: the compiled program plus its source text.
#[derive(Clone)]
pub struct Formula {
    program: Rpn<Value>,
    source: String,
}

impl Formula {
    /// Parses formula text. Empty (or all-whitespace) text is a valid
    /// formula that resolves to Null.
    pub fn parse(text: &str) -> Result<Self, SyntaxError> {
        let program = if text.trim().is_empty() {
            Rpn::empty()
        } else {
            grammar::default::grammar().parse(text)?
        };
        debug!(source = text, "parsed formula");
        Ok(Self {
            program,
            source: text.to_string(),
        })
    }

    /// Resolves without any data; variable references fail.
    pub fn resolve(&self) -> Result<Value, ResolveError> {
        self.program.resolve(None)
    }

    /// Resolves against `context`.
    pub fn resolve_with(&self, context: &DataContext) -> Result<Value, ResolveError> {
        self.program.resolve(Some(context))
    }

    /// The text this formula was parsed from.
    #[inline]
    pub fn source_text(&self) -> &str {
        &self.source
    }
}

impl Resolvable for Formula {
    fn resolve(&self, context: Option<&DataContext>) -> Result<Value, ResolveError> {
        self.program.resolve(context)
    }
}

impl FromStr for Formula {
    type Err = SyntaxError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        Self::parse(text)
    }
}

impl fmt::Debug for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Formula")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

/// Parses formula text. See [`Formula::parse`].
pub fn parse(text: &str) -> Result<Formula, SyntaxError> {
    Formula::parse(text)
}

/// Simplifies formula text without resolving its variables: constant
/// subexpressions fold, `AND`/`OR` chains flatten into `all(...)` /
/// `any(...)`, and everything else renders back unchanged.
pub fn optimize(text: &str) -> Result<String, FormulaError> {
    optimize::optimize(text)
}
