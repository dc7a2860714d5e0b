//! Error types for parsing and resolving formulas.

use thiserror::Error;

/// Convenience alias for fallible formula operations.
pub type FormulaResult<T> = Result<T, FormulaError>;

/// Either phase of formula processing can fail; `optimize` surfaces both.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FormulaError {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

/// Tokenizer failure: some stretch of input matched no registered token.
///
/// The `Display` rendering repeats the source line with a caret pointing at
/// the offending character:
///
/// ```text
/// parse error at offset 4 of "1 + $a": did not expect character '$'
/// 1 + $a
///     ^
/// ```
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{}", self.render())]
pub struct SyntaxError {
    offset: usize,
    source_text: String,
    message: String,
}

impl SyntaxError {
    pub(crate) fn new(
        offset: usize,
        source_text: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            offset,
            source_text: source_text.into(),
            message: message.into(),
        }
    }

    /// Character offset (not byte offset) of the unmatched input.
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// The full text that was being tokenized.
    #[inline]
    pub fn source_text(&self) -> &str {
        &self.source_text
    }

    /// What went wrong, without the caret rendering.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }

    fn render(&self) -> String {
        let caret = " ".repeat(self.offset);
        format!(
            "parse error at offset {} of \"{}\": {}\n{}\n{caret}^",
            self.offset, self.source_text, self.message, self.source_text,
        )
    }
}

/// Evaluation failure while resolving a parsed formula.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    /// A text value could not be coerced to a numeric type.
    #[error("cannot convert '{0}' to a number")]
    NotANumber(String),

    /// An operator or function found fewer values on the stack than it needs.
    #[error("missing parameter #{index} for \"{symbol}\"")]
    MissingOperand { symbol: String, index: usize },

    /// A variadic function ran without its argument-count entry.
    #[error("missing arity count for \"{0}\"")]
    MissingArity(String),

    /// A formula referencing variables was resolved without a data context.
    #[error("no data context supplied for variable \"{0}\"")]
    MissingContext(String),

    /// A wildcard search pattern failed to compile.
    #[error("invalid search pattern '{0}'")]
    InvalidPattern(String),
}

impl ResolveError {
    pub(crate) fn missing_operand(symbol: impl Into<String>, index: usize) -> Self {
        Self::MissingOperand {
            symbol: symbol.into(),
            index,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_syntax_error_points_at_offset() {
        let err = SyntaxError::new(4, "1 + $a", "did not expect character '$'");
        assert_eq!(
            err.to_string(),
            "parse error at offset 4 of \"1 + $a\": did not expect character '$'\n\
             1 + $a\n    ^"
        );
    }

    #[test]
    fn test_resolve_error_messages() {
        assert_eq!(
            ResolveError::NotANumber("abc".into()).to_string(),
            "cannot convert 'abc' to a number"
        );
        assert_eq!(
            ResolveError::missing_operand("+", 2).to_string(),
            "missing parameter #2 for \"+\""
        );
        assert_eq!(
            ResolveError::MissingArity("any".into()).to_string(),
            "missing arity count for \"any\""
        );
    }
}
