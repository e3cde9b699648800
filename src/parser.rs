//! Grammar parser of the condition and search blocks.
//!
//! ## Grammar
//!
//! ```text
//! block     = unit (logical unit)*
//! unit      = group / atom
//! group     = "(" atom (logical atom)* ")"
//! logical   = "*" / "||"
//! atom      = field operator value          ; condition block
//!           / field "~~" text                ; search block
//! operator  = "==" / "!=" / "<" / "<=" / ">" / ">=" / ">>"
//! ```
//!
//! Groups do not nest. There is no precedence between `*` and `||`: units
//! keep their source order and each one carries the logical token that
//! follows it, so `(A||B)*C` stays `(A or B) and C`.
//!
//! ## Examples
//!
//! ```text
//! ID==1
//! (ID>1||ID<=3)*(content!=test1*content==test2)
//! content>>value1,value2*data==author^^smith
//! title~~release plan||description~~release      ; search block
//! ```
//!
//! Parsing never resolves field names or classifies values, so the same tree
//! serves the SQL compiler and the DSL read/write utilities.

use tracing::trace;

use crate::ast::{Condition, ConditionNode};
use crate::error::{CompileError, CompileResult};
use crate::lexer::{find_operator, Unit, UnitKind, UnitScanner};
use crate::token::{Operator, SEARCH_TOKEN, WILDCARD};

/// Which kind of block is being parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    /// `field<op>value` units; whitespace is removed.
    Standard,
    /// `field~~text` units; whitespace turns into the wildcard.
    Search,
}

impl ParseMode {
    /// Whitespace handling applied before scanning.
    pub fn normalize(&self, raw: &str) -> String {
        match self {
            ParseMode::Standard => raw.chars().filter(|c| !c.is_whitespace()).collect(),
            ParseMode::Search => raw
                .chars()
                .map(|c| if c.is_whitespace() { WILDCARD } else { c })
                .collect(),
        }
    }
}

/// Parses a condition or search block into its ordered units.
///
/// An empty block (after whitespace handling) yields no nodes.
pub fn parse_block(raw: &str, mode: ParseMode) -> CompileResult<Vec<ConditionNode>> {
    let block = mode.normalize(raw);
    let nodes = UnitScanner::new(&block)
        .map(|unit| unit.and_then(|unit| parse_unit(unit, mode)))
        .collect::<CompileResult<Vec<_>>>()?;
    trace!(?mode, units = nodes.len(), "parsed block");
    Ok(nodes)
}

fn parse_unit(unit: Unit<'_>, mode: ParseMode) -> CompileResult<ConditionNode> {
    match unit.kind {
        UnitKind::Atom(atom) => Ok(ConditionNode::leaf(parse_atom(atom, mode)?, unit.connector)),
        UnitKind::Group(content) => {
            let children = UnitScanner::group_content(content)
                .map(|inner| {
                    inner.and_then(|inner| match inner.kind {
                        UnitKind::Atom(atom) => {
                            Ok(ConditionNode::leaf(parse_atom(atom, mode)?, inner.connector))
                        }
                        UnitKind::Group(_) => Err(CompileError::MalformedQuery(
                            "nested groups are not supported".to_string(),
                        )),
                    })
                })
                .collect::<CompileResult<Vec<_>>>()?;
            Ok(ConditionNode::group(children, unit.connector))
        }
    }
}

/// Splits one atomic unit into field, operator and raw value.
pub fn parse_atom(atom: &str, mode: ParseMode) -> CompileResult<Condition> {
    let (operator, token) = match mode {
        ParseMode::Standard => {
            let operator = find_operator(atom)
                .ok_or_else(|| CompileError::UnsupportedOperator(atom.to_string()))?;
            (operator, operator.token())
        }
        ParseMode::Search => (Operator::Like, SEARCH_TOKEN),
    };
    let (field, value) = atom
        .split_once(token)
        .ok_or_else(|| CompileError::UnsupportedOperator(atom.to_string()))?;
    Ok(Condition::new(field, operator, value))
}
