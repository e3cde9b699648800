//! The token tables of the filter language.
//!
//! Every mini-language token maps to exactly one SQL operator or keyword; the
//! tables here are the only place where those spellings live.

use serde::{Deserialize, Serialize};

/// Separates the `fields`, `conditions` and `restrictions` blocks.
pub const BLOCK_DELIMITER: char = '?';
/// Separates select fields, array elements and restriction positions.
pub const LIST_SEPARATOR: char = ',';
/// Separates several sort fields inside the restrictions block.
pub const SORT_FIELD_SEPARATOR: char = '|';
/// Marks a key inside a JSON column: `key^^value`.
pub const NESTED_PATH_MARKER: &str = "^^";
/// The operator token of a search unit: `field~~text`.
pub const SEARCH_TOKEN: &str = "~~";
/// Wildcard used by `LIKE` patterns; whitespace in search text becomes this.
pub const WILDCARD: char = '%';

/// A comparison operator of an atomic condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    Eq,       // ==
    NotEq,    // !=
    Lt,       // <
    Lte,      // <=
    Gt,       // >
    Gte,      // >=
    Overlaps, // >>
    Like,     // ~~ (search units only)
}

/// Base tokens scanned in priority order when detecting a condition operator.
pub const BASE_OPERATOR_TOKENS: [&str; 4] = ["==", "!=", "<", ">"];

/// Suffixes that upgrade a base token to a longer operator (`>` to `>=`, `>>`).
pub const OPERATOR_EXTENSIONS: [char; 2] = ['=', '>'];

impl Operator {
    /// Every operator allowed inside a condition block.
    pub const CONDITION_OPERATORS: [Operator; 7] = [
        Operator::Eq,
        Operator::NotEq,
        Operator::Lt,
        Operator::Lte,
        Operator::Gt,
        Operator::Gte,
        Operator::Overlaps,
    ];

    /// Looks up a condition operator by its mini-language token.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "==" => Some(Operator::Eq),
            "!=" => Some(Operator::NotEq),
            "<" => Some(Operator::Lt),
            "<=" => Some(Operator::Lte),
            ">" => Some(Operator::Gt),
            ">=" => Some(Operator::Gte),
            ">>" => Some(Operator::Overlaps),
            _ => None,
        }
    }

    /// The mini-language spelling.
    pub fn token(&self) -> &'static str {
        match self {
            Operator::Eq => "==",
            Operator::NotEq => "!=",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::Overlaps => ">>",
            Operator::Like => SEARCH_TOKEN,
        }
    }

    /// The SQL spelling.
    pub fn sql(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::NotEq => "!=",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::Overlaps => "&&",
            Operator::Like => "like",
        }
    }
}

/// A logical token joining two sibling units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Connector {
    And, // *
    Or,  // ||
}

impl Connector {
    pub const ALL: [Connector; 2] = [Connector::And, Connector::Or];

    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "*" => Some(Connector::And),
            "||" => Some(Connector::Or),
            _ => None,
        }
    }

    pub fn token(&self) -> &'static str {
        match self {
            Connector::And => "*",
            Connector::Or => "||",
        }
    }

    pub fn sql(&self) -> &'static str {
        match self {
            Connector::And => "and",
            Connector::Or => "or",
        }
    }

    /// Finds the logical token that occurs first in `text`, with its byte offset.
    ///
    /// Position alone decides; there is no precedence between AND and OR.
    pub fn find_first(text: &str) -> Option<(usize, Connector)> {
        Connector::ALL
            .iter()
            .filter_map(|c| text.find(c.token()).map(|idx| (idx, *c)))
            .min_by_key(|(idx, _)| *idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_tokens_round_trip_through_table() {
        for op in Operator::CONDITION_OPERATORS {
            assert_eq!(Operator::from_token(op.token()), Some(op));
        }
        assert_eq!(Operator::from_token("~~"), None);
        assert_eq!(Operator::from_token("^="), None);
    }

    #[test]
    fn test_sql_spellings() {
        assert_eq!(Operator::Eq.sql(), "=");
        assert_eq!(Operator::Overlaps.sql(), "&&");
        assert_eq!(Connector::And.sql(), "and");
        assert_eq!(Connector::Or.sql(), "or");
    }

    #[test]
    fn test_first_connector_wins_by_position() {
        assert_eq!(Connector::find_first("a==1||b==2*c==3"), Some((4, Connector::Or)));
        assert_eq!(Connector::find_first("a==1*b==2||c==3"), Some((4, Connector::And)));
        assert_eq!(Connector::find_first("a==1"), None);
    }
}
