use crate::frontend::lexer::{Span, Spanned};
use crate::frontend::token::Token;

#[derive(Debug, Clone)]
pub enum CompileError {
    /// A token did not match what the grammar expects at this point.
    UnexpectedToken {
        expected: String,
        found: Token,
        span: Span,
    },
    /// An identifier was used without a visible declaration.
    UndeclaredIdentifier { name: String, span: Span },
    /// A call site's argument count differs from the declared parameter count.
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
        span: Span,
    },
    /// Assignment target is a constant or a function name.
    NotAssignable { name: String, span: Span },
    /// `return` outside of any function body.
    ReturnOutsideFunction { span: Span },
}

impl CompileError {
    pub fn unexpected(expected: impl Into<String>, found: &Spanned) -> Self {
        CompileError::UnexpectedToken {
            expected: expected.into(),
            found: found.token.clone(),
            span: found.span.clone(),
        }
    }

    pub fn undeclared(name: impl Into<String>, span: Span) -> Self {
        CompileError::UndeclaredIdentifier {
            name: name.into(),
            span,
        }
    }

    pub fn arity_mismatch(
        name: impl Into<String>,
        expected: usize,
        found: usize,
        span: Span,
    ) -> Self {
        CompileError::ArityMismatch {
            name: name.into(),
            expected,
            found,
            span,
        }
    }

    pub fn not_assignable(name: impl Into<String>, span: Span) -> Self {
        CompileError::NotAssignable {
            name: name.into(),
            span,
        }
    }

    pub fn return_outside_function(span: Span) -> Self {
        CompileError::ReturnOutsideFunction { span }
    }

    fn span(&self) -> &Span {
        match self {
            CompileError::UnexpectedToken { span, .. }
            | CompileError::UndeclaredIdentifier { span, .. }
            | CompileError::ArityMismatch { span, .. }
            | CompileError::NotAssignable { span, .. }
            | CompileError::ReturnOutsideFunction { span } => span,
        }
    }
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let span = self.span();
        write!(f, "{}:{}: ", span.line, span.col)?;
        match self {
            CompileError::UnexpectedToken {
                expected, found, ..
            } => {
                write!(f, "expected {}, found '{}'", expected, found)
            }
            CompileError::UndeclaredIdentifier { name, .. } => {
                write!(f, "undeclared identifier '{}'", name)
            }
            CompileError::ArityMismatch {
                name,
                expected,
                found,
                ..
            } => {
                write!(
                    f,
                    "function '{}' takes {} argument(s), {} given",
                    name, expected, found
                )
            }
            CompileError::NotAssignable { name, .. } => {
                write!(f, "'{}' is not assignable", name)
            }
            CompileError::ReturnOutsideFunction { .. } => {
                write!(f, "'return' outside of a function body")
            }
        }
    }
}

impl std::error::Error for CompileError {}
