//! Syntax tree and compile outputs of the filter language.

use std::fmt;

use sea_query::{ArrayType, Value, Values};
use serde::{Deserialize, Serialize};

use crate::token::{Connector, Operator, NESTED_PATH_MARKER};

/// One atomic `field<op>value` unit, exactly as written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub operator: Operator,
    pub raw_value: String,
}

impl Condition {
    pub fn new(field: impl Into<String>, operator: Operator, raw_value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            operator,
            raw_value: raw_value.into(),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.field, self.operator.token(), self.raw_value)
    }
}

/// A leaf condition or a parenthesized group of leaves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    Leaf(Condition),
    /// Groups hold leaves only; they never nest.
    Group(Vec<ConditionNode>),
}

/// A unit of a condition or search block and the connector that joins it to
/// the next sibling at the same level (`None` for the last one).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionNode {
    pub kind: NodeKind,
    pub connector: Option<Connector>,
}

impl ConditionNode {
    pub fn leaf(condition: Condition, connector: Option<Connector>) -> Self {
        Self {
            kind: NodeKind::Leaf(condition),
            connector,
        }
    }

    pub fn group(children: Vec<ConditionNode>, connector: Option<Connector>) -> Self {
        Self {
            kind: NodeKind::Group(children),
            connector,
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self.kind, NodeKind::Group(_))
    }
}

impl fmt::Display for ConditionNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            NodeKind::Leaf(condition) => write!(f, "{}", condition)?,
            NodeKind::Group(children) => write!(f, "({})", DslNodes(children))?,
        }
        if let Some(connector) = self.connector {
            f.write_str(connector.token())?;
        }
        Ok(())
    }
}

/// Renders a node sequence back into mini-language text.
pub struct DslNodes<'a>(pub &'a [ConditionNode]);

impl fmt::Display for DslNodes<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for node in self.0 {
            write!(f, "{}", node)?;
        }
        Ok(())
    }
}

/// A literal with its inferred semantic type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum TypedValue {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
    Array(Vec<TypedValue>),
    /// A value addressed through a key of a JSON column.
    NestedPath { path: String, inner: Box<TypedValue> },
}

impl TypedValue {
    pub fn kind_name(&self) -> &'static str {
        match self {
            TypedValue::Null => "NULL",
            TypedValue::Bool(_) => "BOOLEAN",
            TypedValue::Int(_) => "INTEGER",
            TypedValue::Text(_) => "STRING",
            TypedValue::Array(_) => "ARRAY",
            TypedValue::NestedPath { .. } => "JSON PATH",
        }
    }

    /// The element type of a postgres array built from `items`; mixed arrays
    /// are bound as text.
    fn array_type(items: &[TypedValue]) -> ArrayType {
        if !items.is_empty() && items.iter().all(|v| matches!(v, TypedValue::Int(_))) {
            ArrayType::BigInt
        } else if !items.is_empty() && items.iter().all(|v| matches!(v, TypedValue::Bool(_))) {
            ArrayType::Bool
        } else {
            ArrayType::String
        }
    }
}

impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypedValue::Null => f.write_str("null"),
            TypedValue::Bool(b) => write!(f, "{}", b),
            TypedValue::Int(n) => write!(f, "{}", n),
            TypedValue::Text(s) => f.write_str(s),
            TypedValue::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}", item)?;
                }
                Ok(())
            }
            TypedValue::NestedPath { path, inner } => {
                write!(f, "{}{}{}", path, NESTED_PATH_MARKER, inner)
            }
        }
    }
}

impl From<&TypedValue> for Value {
    fn from(value: &TypedValue) -> Self {
        match value {
            TypedValue::Null => Value::String(None),
            TypedValue::Bool(b) => Value::Bool(Some(*b)),
            TypedValue::Int(n) => Value::BigInt(Some(*n)),
            TypedValue::Text(s) => Value::String(Some(Box::new(s.clone()))),
            TypedValue::Array(items) => {
                let array_type = TypedValue::array_type(items);
                let as_text = matches!(array_type, ArrayType::String);
                let elements = items
                    .iter()
                    .map(|item| match item {
                        TypedValue::Text(_) => Value::from(item),
                        _ if as_text => Value::String(Some(Box::new(item.to_string()))),
                        _ => Value::from(item),
                    })
                    .collect();
                Value::Array(array_type, Some(Box::new(elements)))
            }
            TypedValue::NestedPath { inner, .. } => Value::from(inner.as_ref()),
        }
    }
}

/// Sort direction of the restrictions block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "asc" => Some(SortOrder::Asc),
            "desc" => Some(SortOrder::Desc),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

/// The parsed `sortFields,sortOrder,limit,offset` block.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RestrictionSpec {
    /// Resolved columns, in the order given.
    pub sort_fields: Vec<String>,
    /// The order as written; `None` when the position was empty.
    pub sort_order: Option<SortOrder>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// A piece of SQL and the arguments its placeholders refer to.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CompiledFragment {
    pub sql: String,
    /// Empty in literal mode.
    pub args: Vec<TypedValue>,
}

impl CompiledFragment {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args(sql: impl Into<String>, args: Vec<TypedValue>) -> Self {
        Self {
            sql: sql.into(),
            args,
        }
    }

    /// Appends `other` separated by a single space.
    pub fn push(&mut self, other: CompiledFragment) {
        if !self.sql.is_empty() && !other.sql.is_empty() {
            self.sql.push(' ');
        }
        self.sql.push_str(&other.sql);
        self.args.extend(other.args);
    }
}

/// Output of one compile call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledQuery {
    pub main_sql: String,
    pub count_sql: Option<String>,
    /// `Some` only when placeholders were requested.
    pub args: Option<Vec<TypedValue>>,
}

impl CompiledQuery {
    /// The arguments as sea-query values, ready to be bound by a driver.
    pub fn values(&self) -> Values {
        Values(self.args.iter().flatten().map(Value::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nodes_render_back_to_dsl() {
        let nodes = vec![
            ConditionNode::group(
                vec![
                    ConditionNode::leaf(Condition::new("ID", Operator::Eq, "1"), Some(Connector::Or)),
                    ConditionNode::leaf(Condition::new("ID", Operator::Eq, "3"), None),
                ],
                Some(Connector::And),
            ),
            ConditionNode::leaf(Condition::new("content", Operator::Overlaps, "a,b"), None),
        ];
        assert_eq!(DslNodes(&nodes).to_string(), "(ID==1||ID==3)*content>>a,b");
    }

    #[test]
    fn test_sort_order_tokens_are_lowercase() {
        assert_eq!(SortOrder::parse("asc"), Some(SortOrder::Asc));
        assert_eq!(SortOrder::parse("dasc"), None);
        assert_eq!(SortOrder::parse("DESC"), None);
    }

    #[test]
    fn test_values_for_binding() {
        let query = CompiledQuery {
            main_sql: String::new(),
            count_sql: None,
            args: Some(vec![
                TypedValue::Int(1),
                TypedValue::Text("x".to_string()),
                TypedValue::Array(vec![TypedValue::Int(1), TypedValue::Int(2)]),
            ]),
        };
        let values = query.values();
        assert_eq!(values.0.len(), 3);
        assert_eq!(values.0[0], Value::BigInt(Some(1)));
        assert_eq!(values.0[1], Value::String(Some(Box::new("x".to_string()))));
        assert_eq!(
            values.0[2],
            Value::Array(
                ArrayType::BigInt,
                Some(Box::new(vec![Value::BigInt(Some(1)), Value::BigInt(Some(2))]))
            )
        );
    }

    #[test]
    fn test_mixed_array_binds_as_text() {
        let value = Value::from(&TypedValue::Array(vec![
            TypedValue::Int(1),
            TypedValue::Text("a".to_string()),
        ]));
        assert_eq!(
            value,
            Value::Array(
                ArrayType::String,
                Some(Box::new(vec![
                    Value::String(Some(Box::new("1".to_string()))),
                    Value::String(Some(Box::new("a".to_string()))),
                ]))
            )
        );
    }
}
