//! Error types for expression evaluation

use thiserror::Error;

/// Result type for expression operations
pub type ExpressionResult<T> = Result<T, ExpressionError>;

/// Errors raised while compiling or evaluating a presence expression
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExpressionError {
    /// The expression is empty or whitespace
    #[error("expression is empty")]
    Empty,

    /// Invalid expression syntax
    #[error("invalid expression syntax: {message}")]
    Syntax { message: String },

    /// Undefined variable or function
    #[error("undefined value: {message}")]
    Undefined { message: String },

    /// Evaluation failed at runtime
    #[error("failed to evaluate expression: {message}")]
    Evaluation { message: String },
}

impl From<minijinja::Error> for ExpressionError {
    fn from(err: minijinja::Error) -> Self {
        match err.kind() {
            minijinja::ErrorKind::SyntaxError => ExpressionError::Syntax {
                message: err.to_string(),
            },
            minijinja::ErrorKind::UndefinedError | minijinja::ErrorKind::UnknownFunction => {
                ExpressionError::Undefined {
                    message: err.to_string(),
                }
            }
            _ => ExpressionError::Evaluation {
                message: err.to_string(),
            },
        }
    }
}
