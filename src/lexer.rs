//! Block splitting and unit scanning for the filter language.
//!
//! A filter string is cut into its three blocks first. A condition or search
//! block is then consumed left to right: every step removes one unit (an
//! atomic condition or a parenthesized group) together with the logical token
//! that follows it, so scanning always terminates.

use crate::error::{CompileError, CompileResult};
use crate::token::{
    Connector, Operator, BASE_OPERATOR_TOKENS, BLOCK_DELIMITER, OPERATOR_EXTENSIONS,
};

/// The three positional blocks of a filter string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawBlocks<'a> {
    pub fields: &'a str,
    pub conditions: &'a str,
    pub restrictions: &'a str,
}

impl<'a> RawBlocks<'a> {
    /// Bounded three-way split: only the first two delimiters are structural,
    /// any later one stays inside the restrictions block.
    pub fn split(filter: &'a str) -> CompileResult<Self> {
        let mut parts = filter.splitn(3, BLOCK_DELIMITER);
        match (parts.next(), parts.next(), parts.next()) {
            (Some(fields), Some(conditions), Some(restrictions)) => Ok(Self {
                fields,
                conditions,
                restrictions,
            }),
            _ => Err(CompileError::MalformedQuery(format!(
                "expected 3 blocks separated by '{}' in - {}",
                BLOCK_DELIMITER, filter
            ))),
        }
    }
}

/// What a scanned unit is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind<'a> {
    Atom(&'a str),
    /// Content between the parentheses.
    Group(&'a str),
}

/// One unit of a block and the logical token that follows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unit<'a> {
    pub kind: UnitKind<'a>,
    pub connector: Option<Connector>,
}

pub struct UnitScanner<'a> {
    input: &'a str,
    /// Current byte position in `input`
    position: usize,
    /// Whether `(` may open a group here; false inside a group.
    allow_groups: bool,
}

impl<'a> UnitScanner<'a> {
    /// Scans the top level of a block.
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            position: 0,
            allow_groups: true,
        }
    }

    /// Scans the content of a group, where parentheses are not allowed.
    pub fn group_content(input: &'a str) -> Self {
        Self {
            input,
            position: 0,
            allow_groups: false,
        }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.position..]
    }

    fn fail(&mut self, message: String) -> CompileError {
        self.position = self.input.len();
        CompileError::MalformedQuery(message)
    }

    fn read_group(&mut self) -> CompileResult<UnitKind<'a>> {
        let rest = self.rest();
        let Some(close) = rest.find(')') else {
            return Err(self.fail(format!("unbalanced parenthesis in - {}", rest)));
        };
        let content = &rest[1..close];
        if content.contains('(') {
            return Err(self.fail(format!("nested groups are not supported - {}", &rest[..=close])));
        }
        if content.is_empty() {
            return Err(self.fail("empty group".to_string()));
        }
        self.position += close + 1;
        Ok(UnitKind::Group(content))
    }

    fn read_atom(&mut self) -> CompileResult<UnitKind<'a>> {
        let rest = self.rest();
        let end = Connector::find_first(rest).map_or(rest.len(), |(idx, _)| idx);
        let atom = &rest[..end];
        if atom.is_empty() {
            return Err(self.fail(format!("empty condition before - {}", rest)));
        }
        if atom.contains('(') || atom.contains(')') {
            return Err(self.fail(format!("unexpected parenthesis in - {}", atom)));
        }
        self.position += end;
        Ok(UnitKind::Atom(atom))
    }

    /// Consumes the logical token right after a unit, if any.
    fn read_connector(&mut self) -> CompileResult<Option<Connector>> {
        let rest = self.rest();
        if rest.is_empty() {
            return Ok(None);
        }
        let Some(connector) = Connector::ALL.into_iter().find(|c| rest.starts_with(c.token())) else {
            return Err(self.fail(format!("missing logical operator before - {}", rest)));
        };
        self.position += connector.token().len();
        if self.rest().is_empty() {
            return Err(self.fail(format!("dangling logical operator {}", connector.token())));
        }
        Ok(Some(connector))
    }
}

impl<'a> Iterator for UnitScanner<'a> {
    type Item = CompileResult<Unit<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.position >= self.input.len() {
            return None;
        }

        let kind = if self.rest().starts_with('(') && self.allow_groups {
            self.read_group()
        } else {
            self.read_atom()
        };
        let unit = kind.and_then(|kind| {
            let connector = self.read_connector()?;
            Ok(Unit { kind, connector })
        });
        Some(unit)
    }
}

/// Detects the comparison operator of an atomic condition.
///
/// Base tokens are scanned in priority order; each one present is selected
/// tentatively, and the first longer variant found (`<=`, `>=`, `>>`) wins
/// and ends the scan.
pub fn find_operator(atom: &str) -> Option<Operator> {
    let mut selected = None;
    for base in BASE_OPERATOR_TOKENS {
        if !atom.contains(base) {
            continue;
        }
        selected = Operator::from_token(base);
        let longer = OPERATOR_EXTENSIONS
            .iter()
            .filter_map(|ext| Operator::from_token(&format!("{}{}", base, ext)))
            .find(|op| atom.contains(op.token()));
        if longer.is_some() {
            selected = longer;
            break;
        }
    }
    selected
}
