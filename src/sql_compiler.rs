//! SQL compiler that turns a filter string into PostgreSQL `SELECT` text.
//!
//! The compiler works in one of two bind modes: [`BindMode::Literal`] inlines
//! sanitized, quoted values; [`BindMode::Parameterized`] emits `$N`
//! placeholders and returns the typed values alongside. The placeholder
//! offset is threaded through return values (every fragment reports the
//! arguments it bound), so nothing is shared between calls.

use sea_query::{PostgresQueryBuilder, QueryBuilder, Value};
use tracing::debug;

use crate::ast::{
    CompiledFragment, CompiledQuery, Condition, ConditionNode, NodeKind, RestrictionSpec,
    SortOrder, TypedValue,
};
use crate::error::{CompileError, CompileResult, FieldContext, InvalidReason};
use crate::fields::FieldResolver;
use crate::lexer::RawBlocks;
use crate::parser::{parse_block, ParseMode};
use crate::token::{
    Connector, Operator, LIST_SEPARATOR, NESTED_PATH_MARKER, SORT_FIELD_SEPARATOR, WILDCARD,
};
use crate::value::{classify, Charset, DEFAULT_MAX_TEXT_LEN};

/// Alias of the target table inside generated SQL.
pub const TABLE_ALIAS: &str = "q";

/// Number of positions in the restrictions block.
const RESTRICTION_POSITIONS: usize = 4;

/// Configuration of a [`SqlCompiler`].
#[derive(Debug, Clone)]
pub struct CompilerConfig {
    /// Longest text literal accepted in a condition
    pub max_text_len: usize,
    /// Characters kept in condition values
    pub condition_charset: Charset,
    /// Characters kept in search text
    pub search_charset: Charset,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            max_text_len: DEFAULT_MAX_TEXT_LEN,
            condition_charset: Charset::condition(),
            search_charset: Charset::search(),
        }
    }
}

/// How values reach the SQL text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindMode {
    /// Values are sanitized and inlined.
    Literal,
    /// Values become `$N` placeholders.
    Parameterized,
}

impl BindMode {
    fn from_flag(with_args: bool) -> Self {
        if with_args {
            BindMode::Parameterized
        } else {
            BindMode::Literal
        }
    }
}

/// Collects the values one leaf binds.
struct Binder {
    mode: BindMode,
    /// Placeholders already used before this leaf
    offset: usize,
    args: Vec<TypedValue>,
}

impl Binder {
    fn new(mode: BindMode, offset: usize) -> Self {
        Self {
            mode,
            offset,
            args: Vec::new(),
        }
    }

    fn bind(&mut self, value: TypedValue) -> String {
        match self.mode {
            BindMode::Literal => render_literal(&value),
            BindMode::Parameterized => {
                self.args.push(value);
                format!("${}", self.offset + self.args.len())
            }
        }
    }

    fn finish(self, sql: String, connector: Option<Connector>) -> CompiledFragment {
        CompiledFragment::with_args(with_connector(sql, connector), self.args)
    }
}

fn with_connector(mut sql: String, connector: Option<Connector>) -> String {
    if let Some(connector) = connector {
        sql.push(' ');
        sql.push_str(connector.sql());
    }
    sql
}

/// Single-quotes text the way PostgreSQL expects, escaping embedded quotes.
fn quote_text(text: &str) -> String {
    PostgresQueryBuilder.value_to_string(&Value::String(Some(Box::new(text.to_string()))))
}

fn render_literal(value: &TypedValue) -> String {
    match value {
        TypedValue::Null => "null".to_string(),
        TypedValue::Bool(b) => b.to_string(),
        TypedValue::Int(n) => n.to_string(),
        TypedValue::Text(s) => quote_text(s),
        TypedValue::Array(items) => {
            let items: Vec<String> = items.iter().map(render_literal).collect();
            format!("array[{}]", items.join(&LIST_SEPARATOR.to_string()))
        }
        TypedValue::NestedPath { inner, .. } => render_literal(inner),
    }
}

fn column_ref(column: &str) -> String {
    format!("{}.{}", TABLE_ALIAS, column)
}

/// SQL compiler for the filter language.
#[derive(Debug, Clone, Default)]
pub struct SqlCompiler {
    config: CompilerConfig,
}

impl SqlCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: CompilerConfig) -> Self {
        Self { config }
    }

    /// Compiles `filter` against `target`.
    pub fn get<R: FieldResolver + ?Sized>(
        &self,
        fields: &R,
        target: &str,
        filter: &str,
        with_count: bool,
        with_args: bool,
    ) -> CompileResult<CompiledQuery> {
        self.compile(fields, target, filter, with_count, with_args, "")
    }

    /// Compiles `filter` against `target`, adding a case-insensitive search
    /// over `search_params`.
    pub fn search<R: FieldResolver + ?Sized>(
        &self,
        fields: &R,
        target: &str,
        filter: &str,
        with_count: bool,
        with_args: bool,
        search_params: &str,
    ) -> CompileResult<CompiledQuery> {
        self.compile(fields, target, filter, with_count, with_args, search_params)
    }

    fn compile<R: FieldResolver + ?Sized>(
        &self,
        fields: &R,
        target: &str,
        filter: &str,
        with_count: bool,
        with_args: bool,
        search_params: &str,
    ) -> CompileResult<CompiledQuery> {
        debug!(target_table = target, with_count, with_args, "compiling filter");
        let result = self.assemble(fields, target, filter, with_count, with_args, search_params);
        if let Err(err) = &result {
            debug!(%err, filter, "filter rejected");
        }
        result
    }

    fn assemble<R: FieldResolver + ?Sized>(
        &self,
        fields: &R,
        target: &str,
        filter: &str,
        with_count: bool,
        with_args: bool,
        search_params: &str,
    ) -> CompileResult<CompiledQuery> {
        if filter.is_empty() {
            return Err(CompileError::MissingInput("request parameters"));
        }
        if target.trim().is_empty() {
            return Err(CompileError::MissingInput("request target"));
        }

        let blocks = RawBlocks::split(filter)?;
        let mode = BindMode::from_flag(with_args);

        let select = self.compile_select(fields, blocks.fields)?;
        let from = format!("from {} {}", target.trim(), TABLE_ALIAS);
        let where_clause = self.compile_where(fields, blocks.conditions, search_params, mode)?;
        let restrictions = self.compile_restrictions(fields, blocks.restrictions)?;
        let limits = render_restrictions(&restrictions);

        let main_sql = join_fragments(&[
            select.as_str(),
            from.as_str(),
            where_clause.sql.as_str(),
            limits.as_str(),
        ]);
        let count_sql = with_count.then(|| {
            let inner = join_fragments(&["select 1", from.as_str(), where_clause.sql.as_str()]);
            format!("select count(*) from ({}) {}", inner, TABLE_ALIAS)
        });

        Ok(CompiledQuery {
            main_sql,
            count_sql,
            args: with_args.then_some(where_clause.args),
        })
    }

    /// Builds the select list; an empty block selects every column.
    pub fn compile_select<R: FieldResolver + ?Sized>(
        &self,
        fields: &R,
        block: &str,
    ) -> CompileResult<String> {
        let columns: Vec<String> = if block.trim().is_empty() {
            fields.columns().into_iter().map(column_ref).collect()
        } else {
            block
                .split(LIST_SEPARATOR)
                .map(str::trim)
                .map(|name| {
                    fields
                        .resolve(name)
                        .map(column_ref)
                        .ok_or_else(|| CompileError::unknown_field(FieldContext::Select, name))
                })
                .collect::<CompileResult<_>>()?
        };

        if columns.is_empty() {
            return Ok(format!("select {}.*", TABLE_ALIAS));
        }
        Ok(format!("select {}", columns.join(", ")))
    }

    /// Builds the `where` clause from the condition and search blocks.
    ///
    /// Search units form one parenthesized group placed first and joined to
    /// the conditions with `and`.
    pub fn compile_where<R: FieldResolver + ?Sized>(
        &self,
        fields: &R,
        conditions: &str,
        search_params: &str,
        mode: BindMode,
    ) -> CompileResult<CompiledFragment> {
        let search_nodes = parse_block(search_params, ParseMode::Search)?;
        let condition_nodes = parse_block(conditions, ParseMode::Standard)?;
        if search_nodes.is_empty() && condition_nodes.is_empty() {
            return Ok(CompiledFragment::default());
        }

        let mut clause = CompiledFragment::new("where");
        if !search_nodes.is_empty() {
            let mut search = self.compile_nodes(fields, &search_nodes, ParseMode::Search, mode, 0)?;
            search.sql = format!("({})", search.sql);
            if !condition_nodes.is_empty() {
                search.sql = with_connector(search.sql, Some(Connector::And));
            }
            clause.push(search);
        }
        if !condition_nodes.is_empty() {
            let offset = clause.args.len();
            clause.push(self.compile_nodes(fields, &condition_nodes, ParseMode::Standard, mode, offset)?);
        }
        Ok(clause)
    }

    /// Compiles a node sequence in source order. `offset` is the number of
    /// placeholders emitted before the first node.
    pub fn compile_nodes<R: FieldResolver + ?Sized>(
        &self,
        fields: &R,
        nodes: &[ConditionNode],
        parse_mode: ParseMode,
        mode: BindMode,
        offset: usize,
    ) -> CompileResult<CompiledFragment> {
        let mut out = CompiledFragment::default();
        for node in nodes {
            let offset = offset + out.args.len();
            let fragment = match &node.kind {
                NodeKind::Leaf(condition) => match parse_mode {
                    ParseMode::Standard => {
                        self.compile_leaf(fields, condition, node.connector, mode, offset)?
                    }
                    ParseMode::Search => {
                        self.compile_search_leaf(fields, condition, node.connector, mode, offset)?
                    }
                },
                NodeKind::Group(children) => {
                    let inner = self.compile_nodes(fields, children, parse_mode, mode, offset)?;
                    CompiledFragment::with_args(
                        with_connector(format!("({})", inner.sql), node.connector),
                        inner.args,
                    )
                }
            };
            out.push(fragment);
        }
        Ok(out)
    }

    /// Compiles one atomic condition.
    pub fn compile_leaf<R: FieldResolver + ?Sized>(
        &self,
        fields: &R,
        condition: &Condition,
        connector: Option<Connector>,
        mode: BindMode,
        offset: usize,
    ) -> CompileResult<CompiledFragment> {
        let column = fields
            .resolve(&condition.field)
            .ok_or_else(|| CompileError::unknown_field(FieldContext::Condition, &condition.field))?;
        let raw = self.config.condition_charset.sanitize(&condition.raw_value);
        let value = classify(&raw, condition.operator, self.config.max_text_len)?;

        let (column, value) = match value {
            TypedValue::NestedPath { path, inner } => {
                (format!("{} ->> {}", column_ref(column), quote_text(&path)), *inner)
            }
            other => (column_ref(column), other),
        };

        let operator = condition.operator;
        let is_null = matches!(value, TypedValue::Null);
        let is_array = matches!(value, TypedValue::Array(_));
        let invalid = || CompileError::InvalidOperatorForType {
            operator,
            value_kind: if is_null { "NULL" } else { "ARRAY" },
        };

        let mut binder = Binder::new(mode, offset);
        let sql = match operator {
            Operator::Eq if is_null => format!("{} is null", column),
            Operator::NotEq if is_null => format!("{} is not null", column),
            _ if is_null => return Err(invalid()),
            Operator::Overlaps => {
                let array = if is_array {
                    value
                } else {
                    TypedValue::Array(vec![value])
                };
                format!("{} {} {}", column, operator.sql(), binder.bind(array))
            }
            Operator::Eq if is_array => format!("{} = any({})", column, binder.bind(value)),
            Operator::NotEq if is_array => format!("not {} = any({})", column, binder.bind(value)),
            _ if is_array => return Err(invalid()),
            _ => format!("{} {} {}", column, operator.sql(), binder.bind(value)),
        };

        Ok(binder.finish(sql, connector))
    }

    /// Compiles one `field~~text` unit into a case-insensitive `like`.
    pub fn compile_search_leaf<R: FieldResolver + ?Sized>(
        &self,
        fields: &R,
        condition: &Condition,
        connector: Option<Connector>,
        mode: BindMode,
        offset: usize,
    ) -> CompileResult<CompiledFragment> {
        let column = fields
            .resolve(&condition.field)
            .ok_or_else(|| CompileError::unknown_field(FieldContext::Search, &condition.field))?;
        let text = self.config.search_charset.sanitize(&condition.raw_value);

        let (target, text) = match text.split_once(NESTED_PATH_MARKER) {
            Some((path, text)) => (
                format!("lower({} ->> {})", column_ref(column), quote_text(path)),
                text,
            ),
            None => (format!("lower({}::text)", column_ref(column)), text.as_str()),
        };
        let pattern = format!("{}{}{}", WILDCARD, text.to_lowercase(), WILDCARD);

        let mut binder = Binder::new(mode, offset);
        let sql = format!(
            "{} {} {}",
            target,
            Operator::Like.sql(),
            binder.bind(TypedValue::Text(pattern))
        );
        Ok(binder.finish(sql, connector))
    }

    /// Parses `sortFields,sortOrder,limit,offset`. Missing trailing positions
    /// are empty.
    pub fn compile_restrictions<R: FieldResolver + ?Sized>(
        &self,
        fields: &R,
        block: &str,
    ) -> CompileResult<RestrictionSpec> {
        let block: String = block.chars().filter(|c| !c.is_whitespace()).collect();
        if block.is_empty() {
            return Ok(RestrictionSpec::default());
        }

        let positions: Vec<&str> = block.split(LIST_SEPARATOR).collect();
        if positions.len() > RESTRICTION_POSITIONS {
            return Err(CompileError::MalformedQuery(format!(
                "restrictions block takes {} positions - {}",
                RESTRICTION_POSITIONS, block
            )));
        }
        let position = |i: usize| positions.get(i).copied().unwrap_or("");

        let mut sort_fields = Vec::new();
        if !position(0).is_empty() {
            for name in position(0).split(SORT_FIELD_SEPARATOR) {
                let column = fields
                    .resolve(name)
                    .ok_or_else(|| CompileError::unknown_field(FieldContext::Sort, name))?;
                sort_fields.push(column.to_string());
            }
        }

        let sort_order = match position(1) {
            "" => None,
            order => Some(SortOrder::parse(order).ok_or_else(|| {
                CompileError::invalid_value("selection order", order, InvalidReason::Unparseable)
            })?),
        };
        if sort_fields.is_empty() && sort_order.is_some() {
            sort_fields.push(fields.primary_column().to_string());
        }

        Ok(RestrictionSpec {
            sort_fields,
            sort_order,
            limit: parse_count(position(2), "selection limit")?,
            offset: parse_count(position(3), "selection offset")?,
        })
    }
}

/// Parses an optional non-negative limit or offset.
pub(crate) fn parse_count(raw: &str, what: &'static str) -> CompileResult<Option<u64>> {
    if raw.is_empty() {
        return Ok(None);
    }
    let n: i64 = raw
        .parse()
        .map_err(|_| CompileError::invalid_value(what, raw, InvalidReason::Unparseable))?;
    u64::try_from(n)
        .map(Some)
        .map_err(|_| CompileError::invalid_value(what, raw, InvalidReason::Negative))
}

fn render_restrictions(restrictions: &RestrictionSpec) -> String {
    let mut parts = Vec::new();
    if !restrictions.sort_fields.is_empty() {
        let columns: Vec<String> = restrictions
            .sort_fields
            .iter()
            .map(|column| match restrictions.sort_order {
                Some(order) => format!("{} {}", column_ref(column), order.as_str()),
                None => column_ref(column),
            })
            .collect();
        parts.push(format!("order by {}", columns.join(", ")));
    }
    if let Some(limit) = restrictions.limit {
        parts.push(format!("limit {}", limit));
    }
    if let Some(offset) = restrictions.offset {
        parts.push(format!("offset {}", offset));
    }
    parts.join(" ")
}

fn join_fragments(fragments: &[&str]) -> String {
    fragments
        .iter()
        .map(|f| f.trim())
        .filter(|f| !f.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
