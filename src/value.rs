//! Literal sanitizing and value-type inference.

use crate::ast::TypedValue;
use crate::error::{CompileError, CompileResult, InvalidReason};
use crate::token::{Operator, LIST_SEPARATOR, NESTED_PATH_MARKER, WILDCARD};

/// Longest text literal accepted in a condition.
pub const DEFAULT_MAX_TEXT_LEN: usize = 48;

/// Whitelist of characters kept in a raw literal.
///
/// ASCII letters and digits and Cyrillic letters are always kept; `extra`
/// adds punctuation. Every run of other characters is dropped, or collapsed
/// into `replacement` when one is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Charset {
    extra: Vec<char>,
    replacement: Option<char>,
}

impl Charset {
    pub fn new(extra: impl IntoIterator<Item = char>, replacement: Option<char>) -> Self {
        Self {
            extra: extra.into_iter().collect(),
            replacement,
        }
    }

    /// Whitelist for condition values.
    pub fn condition() -> Self {
        Self::new(['{', '}', '_', '\'', ',', '-', '^', ' '], None)
    }

    /// Whitelist for search text. Anything else turns into a wildcard.
    pub fn search() -> Self {
        Self::new(['\'', ',', '^', ' ', WILDCARD], Some(WILDCARD))
    }

    pub fn allows(&self, c: char) -> bool {
        c.is_ascii_alphanumeric() || is_cyrillic_letter(c) || self.extra.contains(&c)
    }

    pub fn sanitize(&self, raw: &str) -> String {
        let mut out = String::with_capacity(raw.len());
        let mut in_rejected_run = false;
        for c in raw.chars() {
            if self.allows(c) {
                out.push(c);
                in_rejected_run = false;
            } else {
                if let (Some(r), false) = (self.replacement, in_rejected_run) {
                    out.push(r);
                }
                in_rejected_run = true;
            }
        }
        out
    }
}

fn is_cyrillic_letter(c: char) -> bool {
    matches!(c, 'а'..='я' | 'А'..='Я' | 'ё' | 'Ё')
}

fn is_null_word(value: &str) -> bool {
    value.eq_ignore_ascii_case("null") || value.eq_ignore_ascii_case("undefined")
}

fn parse_bool(value: &str) -> Option<bool> {
    if value.eq_ignore_ascii_case("true") {
        Some(true)
    } else if value.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

/// Classifies a sanitized condition value.
///
/// Priority: null words, booleans, integers (unless the operator is
/// overlaps), arrays (a comma, or the overlaps operator), then text capped
/// at `max_text_len` characters. A `key^^value` literal yields
/// [`TypedValue::NestedPath`] whose inner value is classified as text, since
/// `->>` always yields text.
pub fn classify(value: &str, operator: Operator, max_text_len: usize) -> CompileResult<TypedValue> {
    if let Some((path, inner)) = value.split_once(NESTED_PATH_MARKER) {
        let inner = classify_nested(inner, operator, max_text_len)?;
        return Ok(TypedValue::NestedPath {
            path: path.to_string(),
            inner: Box::new(inner),
        });
    }

    if is_null_word(value) {
        return Ok(TypedValue::Null);
    }
    if let Some(b) = parse_bool(value) {
        return Ok(TypedValue::Bool(b));
    }
    if operator != Operator::Overlaps {
        if let Ok(n) = value.parse::<i64>() {
            return Ok(TypedValue::Int(n));
        }
    }
    if value.contains(LIST_SEPARATOR) || operator == Operator::Overlaps {
        return Ok(TypedValue::Array(split_array(value, classify_element)));
    }
    text(value, max_text_len)
}

fn classify_nested(value: &str, operator: Operator, max_text_len: usize) -> CompileResult<TypedValue> {
    if is_null_word(value) {
        return Ok(TypedValue::Null);
    }
    if value.contains(LIST_SEPARATOR) || operator == Operator::Overlaps {
        return Ok(TypedValue::Array(split_array(value, |v| TypedValue::Text(v.to_string()))));
    }
    text(value, max_text_len)
}

fn text(value: &str, max_text_len: usize) -> CompileResult<TypedValue> {
    if value.chars().count() > max_text_len {
        return Err(CompileError::invalid_value(
            "string value in condition",
            value,
            InvalidReason::TooLong,
        ));
    }
    Ok(TypedValue::Text(value.to_string()))
}

fn split_array(value: &str, element: impl Fn(&str) -> TypedValue) -> Vec<TypedValue> {
    value.split(LIST_SEPARATOR).map(element).collect()
}

fn classify_element(value: &str) -> TypedValue {
    if let Some(b) = parse_bool(value) {
        TypedValue::Bool(b)
    } else if let Ok(n) = value.parse::<i64>() {
        TypedValue::Int(n)
    } else {
        TypedValue::Text(value.to_string())
    }
}
