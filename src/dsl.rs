//! Read and rewrite utilities over filter strings.
//!
//! Nothing here produces SQL. A filter is split into a [`FilterString`]; only
//! the block an operation reads or rewrites is parsed, so the two structural
//! `?` delimiters stay where they are and the other blocks keep their text.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::ast::{Condition, ConditionNode, DslNodes, NodeKind, SortOrder};
use crate::error::{CompileError, CompileResult, FieldContext, InvalidReason};
use crate::fields::FieldResolver;
use crate::lexer::RawBlocks;
use crate::parser::{parse_atom, parse_block, ParseMode};
use crate::sql_compiler::parse_count;
use crate::token::{Connector, Operator, BLOCK_DELIMITER, LIST_SEPARATOR, SORT_FIELD_SEPARATOR};

/// One condition as seen by the DSL utilities.
///
/// When read with `to_db` the field is the resolved column and the operator
/// is its SQL spelling; otherwise both are exactly as written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionExpr {
    pub field: String,
    pub operator: String,
    pub value: String,
    /// Whether the condition sits (or should sit) inside parentheses
    pub in_group: bool,
    /// Logical token after the condition when read; the token joining it to
    /// its neighbour when added (`*` if unset).
    pub separator: Option<Connector>,
}

impl ConditionExpr {
    pub fn new(field: impl Into<String>, operator: Operator, value: impl ToString) -> Self {
        Self {
            field: field.into(),
            operator: operator.token().to_string(),
            value: value.to_string(),
            in_group: false,
            separator: None,
        }
    }

    pub fn grouped(mut self) -> Self {
        self.in_group = true;
        self
    }

    pub fn separated_by(mut self, connector: Connector) -> Self {
        self.separator = Some(connector);
        self
    }

    fn from_condition(condition: &Condition, in_group: bool, separator: Option<Connector>) -> Self {
        Self {
            field: condition.field.clone(),
            operator: condition.operator.token().to_string(),
            value: condition.raw_value.clone(),
            in_group,
            separator,
        }
    }

    fn to_db<R: FieldResolver + ?Sized>(mut self, fields: &R, operator: Operator) -> CompileResult<Self> {
        let column = fields
            .resolve(&self.field)
            .ok_or_else(|| CompileError::unknown_field(FieldContext::Condition, &self.field))?;
        self.field = column.to_string();
        self.operator = operator.sql().to_string();
        Ok(self)
    }

    /// The condition this expression writes. Field and value must read back
    /// as the same single condition once printed.
    fn to_condition(&self) -> CompileResult<Condition> {
        let operator = Operator::from_token(&self.operator)
            .ok_or_else(|| CompileError::UnsupportedOperator(self.operator.clone()))?;
        let condition = Condition::new(self.field.as_str(), operator, self.value.as_str());

        let text = condition.to_string();
        let structural = text.contains([BLOCK_DELIMITER, '(', ')']) || Connector::find_first(&text).is_some();
        if structural || parse_atom(&text, ParseMode::Standard).ok().as_ref() != Some(&condition) {
            return Err(CompileError::MalformedQuery(format!(
                "condition does not read back as written - {}",
                text
            )));
        }
        Ok(condition)
    }

    /// The node this expression adds to a condition block.
    fn to_node(&self, connector: Option<Connector>) -> CompileResult<ConditionNode> {
        let condition = self.to_condition()?;
        Ok(if self.in_group {
            ConditionNode::group(vec![ConditionNode::leaf(condition, None)], connector)
        } else {
            ConditionNode::leaf(condition, connector)
        })
    }
}

/// A filter string split into its blocks, each kept as written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterString {
    pub fields: String,
    pub conditions: String,
    pub restrictions: String,
}

impl FilterString {
    pub fn parse(filter: &str) -> CompileResult<Self> {
        if filter.is_empty() {
            return Err(CompileError::MissingInput("query string"));
        }
        let blocks = RawBlocks::split(filter)?;
        Ok(Self {
            fields: blocks.fields.to_string(),
            conditions: blocks.conditions.to_string(),
            restrictions: blocks.restrictions.to_string(),
        })
    }

    pub fn condition_nodes(&self) -> CompileResult<Vec<ConditionNode>> {
        parse_block(&self.conditions, ParseMode::Standard)
    }

    pub fn set_condition_nodes(&mut self, nodes: &[ConditionNode]) {
        self.conditions = DslNodes(nodes).to_string();
    }
}

/// Every leaf in source order, with whether it sits in a group and the
/// logical token written after it.
fn leaves(nodes: &[ConditionNode]) -> Vec<(&Condition, bool, Option<Connector>)> {
    let mut out = Vec::new();
    for node in nodes {
        match &node.kind {
            NodeKind::Leaf(condition) => out.push((condition, false, node.connector)),
            NodeKind::Group(children) => {
                let last = children.len().saturating_sub(1);
                for (i, child) in children.iter().enumerate() {
                    if let NodeKind::Leaf(condition) = &child.kind {
                        let connector = if i == last { node.connector } else { child.connector };
                        out.push((condition, true, connector));
                    }
                }
            }
        }
    }
    out
}

/// Position of the first leaf on `field`: its top-level index and, for a
/// leaf inside a group, the index within the group.
fn find_leaf(nodes: &[ConditionNode], field: &str) -> Option<(usize, Option<usize>)> {
    nodes.iter().enumerate().find_map(|(i, node)| match &node.kind {
        NodeKind::Leaf(condition) => (condition.field == field).then_some((i, None)),
        NodeKind::Group(children) => children
            .iter()
            .position(|child| matches!(&child.kind, NodeKind::Leaf(c) if c.field == field))
            .map(|j| (i, Some(j))),
    })
}

impl FromStr for FilterString {
    type Err = CompileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FilterString::parse(s)
    }
}

impl fmt::Display for FilterString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}{}{}",
            self.fields,
            BLOCK_DELIMITER,
            self.conditions,
            BLOCK_DELIMITER,
            self.restrictions
        )
    }
}

/// The four positions of a restrictions block, as written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct RestrictionPositions {
    sort_fields: String,
    sort_order: String,
    limit: String,
    offset: String,
}

impl RestrictionPositions {
    fn parse(block: &str) -> CompileResult<Self> {
        let block: String = block.chars().filter(|c| !c.is_whitespace()).collect();
        if block.is_empty() {
            return Ok(Self::default());
        }
        let mut positions = block.split(LIST_SEPARATOR).map(str::to_string);
        let parsed = Self {
            sort_fields: positions.next().unwrap_or_default(),
            sort_order: positions.next().unwrap_or_default(),
            limit: positions.next().unwrap_or_default(),
            offset: positions.next().unwrap_or_default(),
        };
        if positions.next().is_some() {
            return Err(CompileError::MalformedQuery(format!(
                "restrictions block takes 4 positions - {}",
                block
            )));
        }
        Ok(parsed)
    }
}

impl fmt::Display for RestrictionPositions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{1}{0}{2}{0}{3}{0}{4}",
            LIST_SEPARATOR, self.sort_fields, self.sort_order, self.limit, self.offset
        )
    }
}

fn restrictions_of(filter: &str) -> CompileResult<RestrictionPositions> {
    RestrictionPositions::parse(&FilterString::parse(filter)?.restrictions)
}

/// Columns of the select block, or `None` when it is empty.
pub fn fields_list<R: FieldResolver + ?Sized>(
    fields: &R,
    filter: &str,
) -> CompileResult<Option<Vec<String>>> {
    let parsed = FilterString::parse(filter)?;
    if parsed.fields.trim().is_empty() {
        return Ok(None);
    }
    parsed
        .fields
        .split(LIST_SEPARATOR)
        .map(str::trim)
        .map(|name| {
            fields
                .resolve(name)
                .map(str::to_string)
                .ok_or_else(|| CompileError::unknown_field(FieldContext::Select, name))
        })
        .collect::<CompileResult<Vec<_>>>()
        .map(Some)
}

/// Every condition, flattened in source order.
///
/// `fields` resolves columns when `to_db` is set and is not consulted
/// otherwise.
pub fn conditions_list<R: FieldResolver + ?Sized>(
    fields: &R,
    filter: &str,
    to_db: bool,
) -> CompileResult<Vec<ConditionExpr>> {
    let nodes = FilterString::parse(filter)?.condition_nodes()?;
    leaves(&nodes)
        .into_iter()
        .map(|(condition, in_group, separator)| {
            let expr = ConditionExpr::from_condition(condition, in_group, separator);
            if to_db {
                expr.to_db(fields, condition.operator)
            } else {
                Ok(expr)
            }
        })
        .collect()
}

/// Every unit of a search string, flattened in source order.
pub fn search_conditions_list(search_params: &str) -> CompileResult<Vec<ConditionExpr>> {
    if search_params.is_empty() {
        return Err(CompileError::MissingInput("search string"));
    }
    let nodes = parse_block(search_params, ParseMode::Search)?;
    Ok(leaves(&nodes)
        .into_iter()
        .map(|(condition, in_group, separator)| {
            ConditionExpr::from_condition(condition, in_group, separator)
        })
        .collect())
}

/// The first condition on `name`, if any.
pub fn condition_by_name<R: FieldResolver + ?Sized>(
    fields: &R,
    filter: &str,
    name: &str,
    to_db: bool,
) -> CompileResult<Option<ConditionExpr>> {
    if name.is_empty() {
        return Err(CompileError::MissingInput("condition field name"));
    }
    let nodes = FilterString::parse(filter)?.condition_nodes()?;
    let Some((condition, in_group, separator)) = leaves(&nodes)
        .into_iter()
        .find(|(condition, _, _)| condition.field == name)
    else {
        return Ok(None);
    };
    let expr = ConditionExpr::from_condition(condition, in_group, separator);
    if to_db {
        expr.to_db(fields, condition.operator).map(Some)
    } else {
        Ok(Some(expr))
    }
}

/// Resolved sort columns, or `None` when the position is empty.
pub fn sort_fields<R: FieldResolver + ?Sized>(
    fields: &R,
    filter: &str,
) -> CompileResult<Option<Vec<String>>> {
    let positions = restrictions_of(filter)?;
    if positions.sort_fields.is_empty() {
        return Ok(None);
    }
    positions
        .sort_fields
        .split(SORT_FIELD_SEPARATOR)
        .map(|name| {
            fields
                .resolve(name)
                .map(str::to_string)
                .ok_or_else(|| CompileError::unknown_field(FieldContext::Sort, name))
        })
        .collect::<CompileResult<Vec<_>>>()
        .map(Some)
}

pub fn sort_order(filter: &str) -> CompileResult<Option<SortOrder>> {
    let positions = restrictions_of(filter)?;
    match positions.sort_order.as_str() {
        "" => Ok(None),
        order => SortOrder::parse(order).map(Some).ok_or_else(|| {
            CompileError::invalid_value("selection order", order, InvalidReason::Unparseable)
        }),
    }
}

pub fn limit(filter: &str) -> CompileResult<Option<u64>> {
    parse_count(&restrictions_of(filter)?.limit, "selection limit")
}

pub fn offset(filter: &str) -> CompileResult<Option<u64>> {
    parse_count(&restrictions_of(filter)?.offset, "selection offset")
}

/// Appends `names` to the select block, or replaces it when `replace_current`
/// is set. Names the resolver does not know and duplicates are skipped.
pub fn add_fields_to_select<R: FieldResolver + ?Sized>(
    fields: &R,
    filter: &str,
    names: &[&str],
    replace_current: bool,
) -> CompileResult<String> {
    let mut parsed = FilterString::parse(filter)?;
    let mut selected: Vec<String> = if replace_current {
        Vec::new()
    } else {
        parsed
            .fields
            .split(LIST_SEPARATOR)
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect()
    };
    for name in names {
        if fields.resolve(name).is_some() && !selected.iter().any(|s| s == name) {
            selected.push(name.to_string());
        }
    }
    parsed.fields = selected.join(&LIST_SEPARATOR.to_string());
    Ok(rewritten(parsed))
}

/// Adds `conditions` to the condition block, after the current ones or before
/// them when `leading` is set, keeping their relative order.
///
/// Every operator is checked before anything changes.
pub fn add_conditions(
    filter: &str,
    conditions: &[ConditionExpr],
    replace_current: bool,
    leading: bool,
) -> CompileResult<String> {
    let mut parsed = FilterString::parse(filter)?;
    let mut nodes = parsed.condition_nodes()?;
    if conditions.is_empty() {
        return Ok(filter.to_string());
    }
    let additions: Vec<&ConditionExpr> = conditions.iter().filter(|c| !c.field.is_empty()).collect();
    for expr in &additions {
        expr.to_node(None)?;
    }
    if replace_current {
        nodes.clear();
    }

    if leading {
        let mut head = Vec::with_capacity(additions.len() + nodes.len());
        for (i, expr) in additions.iter().enumerate() {
            let followed = i + 1 < additions.len() || !nodes.is_empty();
            let connector = followed.then(|| expr.separator.unwrap_or(Connector::And));
            head.push(expr.to_node(connector)?);
        }
        head.append(&mut nodes);
        nodes = head;
    } else {
        for expr in additions {
            if let Some(last) = nodes.last_mut() {
                last.connector = Some(expr.separator.unwrap_or(Connector::And));
            }
            nodes.push(expr.to_node(None)?);
        }
    }
    parsed.set_condition_nodes(&nodes);
    Ok(rewritten(parsed))
}

/// Replaces the first condition on `replacement.field`. The filter is returned
/// unchanged when there is none.
pub fn replace_condition(filter: &str, replacement: &ConditionExpr) -> CompileResult<String> {
    let mut parsed = FilterString::parse(filter)?;
    let mut nodes = parsed.condition_nodes()?;
    let Some((i, inner)) = find_leaf(&nodes, &replacement.field) else {
        return Ok(filter.to_string());
    };

    match inner {
        Some(j) => {
            let condition = replacement.to_condition()?;
            if let NodeKind::Group(children) = &mut nodes[i].kind {
                children[j] = ConditionNode::leaf(condition, children[j].connector);
            }
        }
        None => {
            let connector = nodes[i].connector;
            nodes[i] = replacement.to_node(connector)?;
        }
    }
    parsed.set_condition_nodes(&nodes);
    Ok(rewritten(parsed))
}

/// Removes the first condition on `name` along with the logical token that
/// joined it. A group left empty is removed too.
pub fn delete_condition(filter: &str, name: &str) -> CompileResult<String> {
    let mut parsed = FilterString::parse(filter)?;
    let mut nodes = parsed.condition_nodes()?;
    let Some((i, inner)) = find_leaf(&nodes, name) else {
        return Ok(filter.to_string());
    };

    let group_emptied = match (inner, &mut nodes[i].kind) {
        (Some(j), NodeKind::Group(children)) => {
            remove_joined(children, j);
            children.is_empty()
        }
        _ => true,
    };
    if group_emptied {
        remove_joined(&mut nodes, i);
    }
    parsed.set_condition_nodes(&nodes);
    Ok(rewritten(parsed))
}

/// Removes `nodes[i]` and the connector in front of it, or the one after it
/// when it comes first.
fn remove_joined(nodes: &mut Vec<ConditionNode>, i: usize) {
    let removed = nodes.remove(i);
    if i > 0 {
        nodes[i - 1].connector = removed.connector;
    }
}

/// Overwrites restriction positions. Empty arguments, an unknown order and
/// negative or unparseable numbers leave their position as it was.
pub fn add_restrictions(
    filter: &str,
    sort_fields: &str,
    sort_order: &str,
    limit: &str,
    offset: &str,
) -> CompileResult<String> {
    let mut parsed = FilterString::parse(filter)?;
    let mut positions = RestrictionPositions::parse(&parsed.restrictions)?;

    if !sort_fields.is_empty() {
        positions.sort_fields = sort_fields.to_string();
    }
    if SortOrder::parse(sort_order).is_some() {
        positions.sort_order = sort_order.to_string();
    }
    if limit.parse::<u64>().is_ok() {
        positions.limit = limit.to_string();
    }
    if offset.parse::<u64>().is_ok() {
        positions.offset = offset.to_string();
    }

    parsed.restrictions = positions.to_string();
    Ok(rewritten(parsed))
}

fn rewritten(parsed: FilterString) -> String {
    let out = parsed.to_string();
    trace!(filter = %out, "rewrote filter");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::FieldMap;

    fn test_fields() -> FieldMap {
        [("ID", "id"), ("content", "content"), ("count", "count"), ("isBool", "is_bool")]
            .into_iter()
            .collect()
    }

    fn expr(field: &str, operator: &str, value: &str, in_group: bool) -> ConditionExpr {
        ConditionExpr {
            field: field.to_string(),
            operator: operator.to_string(),
            value: value.to_string(),
            in_group,
            separator: None,
        }
    }

    #[test]
    fn test_fields_list() {
        let fields = test_fields();
        let cases: [(&str, Option<Vec<&str>>); 4] = [
            ("ID??", Some(vec!["id"])),
            ("ID,content,count??", Some(vec!["id", "content", "count"])),
            ("ID,isBool??", Some(vec!["id", "is_bool"])),
            ("??", None),
        ];
        for (filter, expected) in cases {
            let expected = expected.map(|v| v.into_iter().map(String::from).collect::<Vec<_>>());
            assert_eq!(fields_list(&fields, filter).unwrap(), expected, "filter: {}", filter);
        }

        assert_eq!(
            fields_list(&fields, ""),
            Err(CompileError::MissingInput("query string"))
        );
        assert_eq!(
            fields_list(&fields, "randomField??").unwrap_err().to_string(),
            "unexpected field name in select - randomField"
        );
    }

    #[test]
    fn test_conditions_list_to_db() {
        let list = conditions_list(&test_fields(), "?(ID>>1,2,3)*content==testText*count!=2?", true)
            .unwrap();
        assert_eq!(
            list,
            vec![
                expr("id", "&&", "1,2,3", true).separated_by(Connector::And),
                expr("content", "=", "testText", false).separated_by(Connector::And),
                expr("count", "!=", "2", false),
            ]
        );
    }

    #[test]
    fn test_conditions_list_as_written() {
        let list = conditions_list(&test_fields(), "?ID>=1||randomField!=2?", false).unwrap();
        assert_eq!(
            list,
            vec![
                expr("ID", ">=", "1", false).separated_by(Connector::Or),
                expr("randomField", "!=", "2", false),
            ]
        );
        assert!(conditions_list(&test_fields(), "??", true).unwrap().is_empty());
        assert!(conditions_list(&test_fields(), "?randomField==1?", true).is_err());
    }

    #[test]
    fn test_search_conditions_list() {
        let list = search_conditions_list("content~~hello world*ID~~4").unwrap();
        assert_eq!(
            list,
            vec![
                expr("content", "~~", "hello%world", false).separated_by(Connector::And),
                expr("ID", "~~", "4", false),
            ]
        );
    }

    #[test]
    fn test_condition_by_name() {
        let fields = test_fields();
        assert_eq!(
            condition_by_name(&fields, "?ID==1?", "ID", true).unwrap(),
            Some(expr("id", "=", "1", false))
        );
        assert_eq!(
            condition_by_name(&fields, "?ID>=1*count!=2?", "count", true).unwrap(),
            Some(expr("count", "!=", "2", false))
        );
        assert_eq!(
            condition_by_name(&fields, "?(ID>>1,2,3)*content==testText?", "ID", true).unwrap(),
            Some(expr("id", "&&", "1,2,3", true).separated_by(Connector::And))
        );
        assert_eq!(condition_by_name(&fields, "??", "ID", true).unwrap(), None);
        assert_eq!(
            condition_by_name(&fields, "?count!=2?", "", true),
            Err(CompileError::MissingInput("condition field name"))
        );
        assert!(matches!(
            condition_by_name(&fields, "?ID^3?", "ID", true),
            Err(CompileError::UnsupportedOperator(_))
        ));
    }

    #[test]
    fn test_restriction_reads() {
        let fields = test_fields();
        let filter = "??ID,asc,10,0";
        assert_eq!(sort_fields(&fields, filter).unwrap(), Some(vec!["id".to_string()]));
        assert_eq!(sort_order(filter).unwrap(), Some(SortOrder::Asc));
        assert_eq!(limit(filter).unwrap(), Some(10));
        assert_eq!(offset(filter).unwrap(), Some(0));

        assert_eq!(sort_fields(&fields, "??").unwrap(), None);
        assert_eq!(sort_order("??ID,,5").unwrap(), None);
        assert_eq!(limit("??ID").unwrap(), None);
        assert_eq!(offset("??,,5,").unwrap(), None);
        assert_eq!(
            sort_fields(&fields, "??ID|count,desc").unwrap(),
            Some(vec!["id".to_string(), "count".to_string()])
        );
    }

    #[test]
    fn test_restriction_read_errors() {
        assert_eq!(
            sort_order("??ID,dasc,,").unwrap_err().to_string(),
            "unexpected selection order - dasc"
        );
        assert_eq!(
            limit("??ID,,-1,").unwrap_err().to_string(),
            "invalid negative selection limit - -1"
        );
        assert_eq!(
            offset("??ID,,,x").unwrap_err().to_string(),
            "unexpected selection offset - x"
        );
        assert!(matches!(
            sort_fields(&test_fields(), "??UD,,,"),
            Err(CompileError::UnknownField { context: FieldContext::Sort, .. })
        ));
    }

    #[test]
    fn test_add_fields_to_select() {
        let fields = test_fields();
        let cases: [(&str, &[&str], bool, &str); 4] = [
            ("??", &["ID", "count", "randomField"], true, "ID,count??"),
            ("isBool??", &["ID", "count"], false, "isBool,ID,count??"),
            ("isBool??", &["ID", "count"], true, "ID,count??"),
            ("??", &["ID"], false, "ID??"),
        ];
        for (filter, names, replace_current, expected) in cases {
            assert_eq!(
                add_fields_to_select(&fields, filter, names, replace_current).unwrap(),
                expected,
                "filter: {}",
                filter
            );
        }
    }

    #[test]
    fn test_add_fields_skips_duplicates() {
        let out = add_fields_to_select(&test_fields(), "ID,count?ID==1?", &["count", "ID", "isBool", "isBool"], false)
            .unwrap();
        assert_eq!(out, "ID,count,isBool?ID==1?");
    }

    #[test]
    fn test_add_conditions() {
        let cases = [
            ("??", vec![ConditionExpr::new("ID", Operator::Eq, 1)], false, "?ID==1?"),
            (
                "ID??ID,asc,10,0",
                vec![
                    ConditionExpr::new("ID", Operator::Eq, 1).grouped(),
                    ConditionExpr::new("count", Operator::NotEq, 12),
                ],
                false,
                "ID?(ID==1)*count!=12?ID,asc,10,0",
            ),
            (
                "ID?isBool==true?ID,asc,10,0",
                vec![ConditionExpr::new("ID", Operator::Eq, 1)],
                false,
                "ID?isBool==true*ID==1?ID,asc,10,0",
            ),
            (
                "ID?isBool==true?ID,asc,10,0",
                vec![ConditionExpr::new("isBool", Operator::Eq, false).grouped()],
                true,
                "ID?(isBool==false)?ID,asc,10,0",
            ),
            (
                "?isBool==true?",
                vec![ConditionExpr::new("ID", Operator::Gt, 3).separated_by(Connector::Or)],
                false,
                "?isBool==true||ID>3?",
            ),
        ];
        for (filter, conditions, replace_current, expected) in cases {
            assert_eq!(
                add_conditions(filter, &conditions, replace_current, false).unwrap(),
                expected,
                "filter: {}",
                filter
            );
        }
    }

    #[test]
    fn test_add_conditions_leading() {
        let out = add_conditions(
            "ID?isBool==true?",
            &[
                ConditionExpr::new("ID", Operator::Eq, 1),
                ConditionExpr::new("count", Operator::Lt, 5).separated_by(Connector::Or),
            ],
            false,
            true,
        )
        .unwrap();
        assert_eq!(out, "ID?ID==1*count<5||isBool==true?");
    }

    #[test]
    fn test_add_conditions_rejects_unknown_operator() {
        let err = add_conditions(
            "ID?isBool==true?ID,asc,10,0",
            &[expr("isBool", "^=", "false", true)],
            true,
            false,
        )
        .unwrap_err();
        assert_eq!(err, CompileError::UnsupportedOperator("^=".to_string()));
    }

    #[test]
    fn test_replace_condition() {
        let cases = [
            ("?ID==1?", ConditionExpr::new("ID", Operator::NotEq, 5).grouped(), "?(ID!=5)?"),
            (
                "ID?(ID==1)*count>2?ID,asc,10,0",
                ConditionExpr::new("count", Operator::NotEq, 12),
                "ID?(ID==1)*count!=12?ID,asc,10,0",
            ),
            (
                "ID?isBool==true?ID,asc,10,0",
                ConditionExpr::new("ID", Operator::Eq, 1),
                "ID?isBool==true?ID,asc,10,0",
            ),
            (
                "?(ID==1||count>2)*isBool==true?",
                ConditionExpr::new("count", Operator::Lte, 9).grouped(),
                "?(ID==1||count<=9)*isBool==true?",
            ),
            (
                "?isBool==true*ID==1||count>2?",
                ConditionExpr::new("ID", Operator::Overlaps, "1,2").grouped(),
                "?isBool==true*(ID>>1,2)||count>2?",
            ),
        ];
        for (filter, replacement, expected) in cases {
            assert_eq!(replace_condition(filter, &replacement).unwrap(), expected, "filter: {}", filter);
        }
    }

    #[test]
    fn test_delete_condition() {
        let cases = [
            ("?ID==1?", "ID", "??"),
            ("ID?isBool==true*ID==1?ID,asc,10,0", "ID", "ID?isBool==true?ID,asc,10,0"),
            ("?ID==1*isBool==true?", "ID", "?isBool==true?"),
            ("?isBool==true*ID==1||count>2?", "ID", "?isBool==true||count>2?"),
            ("?(ID==1||count>2)*isBool==true?", "count", "?(ID==1)*isBool==true?"),
            ("?isBool==true*(ID==1)?", "ID", "?isBool==true?"),
            ("?isBool==true?", "ID", "?isBool==true?"),
        ];
        for (filter, name, expected) in cases {
            assert_eq!(delete_condition(filter, name).unwrap(), expected, "filter: {}", filter);
        }
    }

    #[test]
    fn test_add_then_delete_restores_conditions() {
        let fields = test_fields();
        let original = "ID?(ID==1||ID==3)*isBool==true?ID,desc,10,0";
        for leading in [false, true] {
            for grouped in [false, true] {
                let mut added = ConditionExpr::new("count", Operator::Gte, 4);
                added.in_group = grouped;
                let with = add_conditions(original, &[added], false, leading).unwrap();
                let restored = delete_condition(&with, "count").unwrap();
                assert_eq!(
                    conditions_list(&fields, &restored, false).unwrap(),
                    conditions_list(&fields, original, false).unwrap(),
                    "via: {}",
                    with
                );
            }
        }
    }

    #[test]
    fn test_add_restrictions() {
        let cases = [
            ("ID,count??", "ID", "", "", "", "ID,count??ID,,,"),
            ("ID,count??", "ID", "desc", "", "", "ID,count??ID,desc,,"),
            ("ID,count??", "", "", "10", "2", "ID,count??,,10,2"),
            ("ID,count??", "count", "asc", "10", "2", "ID,count??count,asc,10,2"),
            ("ID,count??ID,,5,0", "count", "asc", "10", "2", "ID,count??count,asc,10,2"),
            ("ID??ID,desc,5,0", "", "dasc", "-1", "x", "ID??ID,desc,5,0"),
            ("ID??ID", "", "", "7", "", "ID??ID,,7,"),
        ];
        for (filter, sort, order, lim, off, expected) in cases {
            assert_eq!(
                add_restrictions(filter, sort, order, lim, off).unwrap(),
                expected,
                "filter: {}",
                filter
            );
        }
    }

    #[test]
    fn test_block_writes_keep_conditions_as_written() {
        assert_eq!(
            add_restrictions("ID?content==hello world?", "", "desc", "", "").unwrap(),
            "ID?content==hello world?,desc,,"
        );
        assert_eq!(
            add_restrictions("ID?ID^3?", "ID", "", "", "").unwrap(),
            "ID?ID^3?ID,,,"
        );
        assert_eq!(
            add_fields_to_select(&test_fields(), "?ID^3?", &["ID"], false).unwrap(),
            "ID?ID^3?"
        );
        assert_eq!(limit("?ID^3?,,5,").unwrap(), Some(5));
        assert_eq!(fields_list(&test_fields(), "count?ID^3?").unwrap(), Some(vec!["count".to_string()]));
    }

    #[test]
    fn test_added_conditions_cannot_carry_structural_tokens() {
        let malformed = |result: CompileResult<String>| matches!(result, Err(CompileError::MalformedQuery(_)));
        for value in ["1?x", "1*count>2", "1||count>2", "(1)", "1)"] {
            let added = [ConditionExpr::new("ID", Operator::Eq, value)];
            assert!(malformed(add_conditions("ID??", &added, false, false)), "value: {}", value);
            assert!(
                malformed(replace_condition("?ID==1?", &ConditionExpr::new("ID", Operator::Eq, value))),
                "value: {}",
                value
            );
        }
        let added = [ConditionExpr::new("count?", Operator::Gt, 2)];
        assert!(malformed(add_conditions("ID?ID==1?", &added, false, false)));

        assert_eq!(
            add_conditions("ID??", &[ConditionExpr::new("content", Operator::Eq, "a,b")], false, false).unwrap(),
            "ID?content==a,b?"
        );
    }

    #[test]
    fn test_filter_string_round_trip() {
        let filter = "ID,content?(ID>1||ID<=3)*content>>a,b*content==author^^smith?ID|count,desc,10,0";
        let mut parsed: FilterString = filter.parse().unwrap();
        assert_eq!(parsed.to_string(), filter);

        let nodes = parsed.condition_nodes().unwrap();
        assert_eq!(leaves(&nodes).len(), 4);
        parsed.set_condition_nodes(&nodes);
        assert_eq!(parsed.to_string(), filter);
    }
}
