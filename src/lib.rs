//! Compiler from a compact, URL-safe filter language to PostgreSQL `SELECT`
//! statements.
//!
//! A filter has three blocks separated by `?`:
//!
//! ```text
//! <fields>?<conditions>?<restrictions>
//! ID,content?(ID>1||ID<=3)*content>>a,b?ID,desc,10,0
//! ```
//!
//! ```
//! use filterql::FieldMap;
//!
//! let fields: FieldMap = [("ID", "id"), ("content", "content")].into_iter().collect();
//! let query = filterql::get(&fields, "v_test", "ID?ID==1?", false, false).unwrap();
//! assert_eq!(query.main_sql, "select q.id from v_test q where q.id = 1");
//! ```

pub mod ast;
pub mod config;
pub mod dsl;
pub mod error;
pub mod fields;
pub mod lexer;
pub mod parser;
pub mod sql_compiler;
pub mod token;
pub mod value;

pub use ast::{CompiledQuery, ConditionNode, RestrictionSpec, SortOrder, TypedValue};
pub use config::{ConfigError, ModelRegistry};
pub use error::{CompileError, CompileResult};
pub use fields::{FieldMap, FieldResolver};
pub use sql_compiler::{CompilerConfig, SqlCompiler};

/// Compiles `filter` against `target` with the default [`CompilerConfig`].
///
/// `with_count` adds a row-count query; `with_args` switches from inlined
/// literals to `$N` placeholders with the values returned in
/// [`CompiledQuery::args`].
pub fn get<R: FieldResolver + ?Sized>(
    fields: &R,
    target: &str,
    filter: &str,
    with_count: bool,
    with_args: bool,
) -> CompileResult<CompiledQuery> {
    SqlCompiler::new().get(fields, target, filter, with_count, with_args)
}

/// Like [`get`], with a `field~~text` search block joined to the conditions.
pub fn search<R: FieldResolver + ?Sized>(
    fields: &R,
    target: &str,
    filter: &str,
    with_count: bool,
    with_args: bool,
    search_params: &str,
) -> CompileResult<CompiledQuery> {
    SqlCompiler::new().search(fields, target, filter, with_count, with_args, search_params)
}
