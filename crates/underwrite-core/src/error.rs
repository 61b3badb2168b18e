use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UnderwriteError {
    #[error("Invalid input for {field}: {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Convergence failure: {function} did not converge after {iterations} iterations (delta: {last_delta})")]
    ConvergenceFailure {
        function: String,
        iterations: u32,
        last_delta: Decimal,
    },

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Division by zero in {context}")]
    DivisionByZero { context: String },

    #[error("Date error: {0}")]
    DateError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl UnderwriteError {
    /// Shorthand for the most common validation failure.
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        UnderwriteError::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Prefix the error with where it happened, keeping the variant.
    pub fn with_context(self, context: &str) -> Self {
        match self {
            UnderwriteError::InvalidInput { field, reason } => UnderwriteError::InvalidInput {
                field: format!("{context}.{field}"),
                reason,
            },
            UnderwriteError::ConvergenceFailure {
                function,
                iterations,
                last_delta,
            } => UnderwriteError::ConvergenceFailure {
                function: format!("{context}: {function}"),
                iterations,
                last_delta,
            },
            UnderwriteError::InsufficientData(msg) => {
                UnderwriteError::InsufficientData(format!("{context}: {msg}"))
            }
            UnderwriteError::DivisionByZero { context: inner } => UnderwriteError::DivisionByZero {
                context: format!("{context}: {inner}"),
            },
            UnderwriteError::DateError(msg) => UnderwriteError::DateError(format!("{context}: {msg}")),
            UnderwriteError::SerializationError(msg) => {
                UnderwriteError::SerializationError(format!("{context}: {msg}"))
            }
        }
    }
}

impl From<serde_json::Error> for UnderwriteError {
    fn from(e: serde_json::Error) -> Self {
        UnderwriteError::SerializationError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_keeps_variant() {
        let err = UnderwriteError::invalid("vacancy_rate", "Must be below 1").with_context("scenario:Downside");
        match err {
            UnderwriteError::InvalidInput { field, reason } => {
                assert_eq!(field, "scenario:Downside.vacancy_rate");
                assert_eq!(reason, "Must be below 1");
            }
            other => panic!("expected InvalidInput, got {other:?}"),
        }

        let err = UnderwriteError::DivisionByZero {
            context: "debt yield".into(),
        }
        .with_context("scenario:Downside");
        assert!(matches!(
            err,
            UnderwriteError::DivisionByZero { ref context } if context == "scenario:Downside: debt yield"
        ));
    }
}
