//! Error types of the compiler.

use std::fmt;

use thiserror::Error;

use crate::token::Operator;

/// Result type for compile and DSL operations
pub type CompileResult<T> = Result<T, CompileError>;

/// Where an unknown field name was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldContext {
    Select,
    Condition,
    Search,
    Sort,
}

impl fmt::Display for FieldContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FieldContext::Select => "select",
            FieldContext::Condition => "condition",
            FieldContext::Search => "search condition",
            FieldContext::Sort => "selection order",
        })
    }
}

/// Why a value was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidReason {
    Unparseable,
    Negative,
    TooLong,
}

impl InvalidReason {
    fn prefix(&self) -> &'static str {
        match self {
            InvalidReason::Unparseable => "unexpected",
            InvalidReason::Negative => "invalid negative",
            InvalidReason::TooLong => "too long",
        }
    }
}

/// Compilation errors. Every error aborts the whole compile call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    /// Empty filter string, target or field name
    #[error("{0} not passed")]
    MissingInput(&'static str),

    /// Field name the resolver does not know
    #[error("unexpected field name in {context} - {name}")]
    UnknownField { context: FieldContext, name: String },

    /// Atomic unit without a recognized operator token
    #[error("unsupported operator in condition - {0}")]
    UnsupportedOperator(String),

    /// Operator that cannot be applied to the classified value
    #[error("{}", operator_for_type_message(.operator, .value_kind))]
    InvalidOperatorForType {
        operator: Operator,
        value_kind: &'static str,
    },

    /// Unparseable, negative or over-length value
    #[error("{} {what} - {value}", .reason.prefix())]
    InvalidValue {
        what: &'static str,
        value: String,
        reason: InvalidReason,
    },

    /// Wrong block structure or unbalanced grouping
    #[error("malformed query: {0}")]
    MalformedQuery(String),
}

fn operator_for_type_message(operator: &Operator, value_kind: &str) -> String {
    if *operator == Operator::Overlaps && value_kind == "NULL" {
        return "unexpected OVERLAPS operator in NULL condition".to_string();
    }
    format!(
        "unexpected operator {} in {} condition",
        operator.token(),
        value_kind
    )
}

impl CompileError {
    pub(crate) fn unknown_field(context: FieldContext, name: &str) -> Self {
        CompileError::UnknownField {
            context,
            name: name.to_string(),
        }
    }

    pub(crate) fn invalid_value(what: &'static str, value: &str, reason: InvalidReason) -> Self {
        CompileError::InvalidValue {
            what,
            value: value.to_string(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(
            CompileError::unknown_field(FieldContext::Select, "randomField").to_string(),
            "unexpected field name in select - randomField"
        );
        assert_eq!(
            CompileError::invalid_value("selection limit", "-1", InvalidReason::Negative).to_string(),
            "invalid negative selection limit - -1"
        );
        assert_eq!(
            CompileError::invalid_value("selection order", "dasc", InvalidReason::Unparseable)
                .to_string(),
            "unexpected selection order - dasc"
        );
        assert_eq!(
            CompileError::MissingInput("request target").to_string(),
            "request target not passed"
        );
    }

    #[test]
    fn test_overlaps_on_null_has_its_own_message() {
        let err = CompileError::InvalidOperatorForType {
            operator: Operator::Overlaps,
            value_kind: "NULL",
        };
        assert_eq!(err.to_string(), "unexpected OVERLAPS operator in NULL condition");

        let err = CompileError::InvalidOperatorForType {
            operator: Operator::Gt,
            value_kind: "ARRAY",
        };
        assert_eq!(err.to_string(), "unexpected operator > in ARRAY condition");
    }
}
