//! Statement Processor (spec §4.D): parses query-file SQL into the typed
//! `Statement` model, rewriting named parameters for binding along the way.

mod insert_parser;
mod model;
mod rewrite;
mod select_parser;
mod sql_text;
mod update_delete_parser;

pub use insert_parser::parse_insert;
pub use model::{
    AssociatedColumn, Catalog, ColumnInfo, FieldSource, MutatingKind, MutatingStatement,
    SelectStatement, Statement,
};
pub use rewrite::{classify_params, collection_param_names, rewrite_params, Rewritten};
pub use select_parser::parse_select;
pub use sql_text::{find_named_params, mask, normalize_blank_lines, split_top_level, ParamOccurrence};
pub use update_delete_parser::{parse_delete, parse_update};

use std::path::Path;

use crate::error::GenResult;
use crate::scanner::RawStatement;

/// Parse one query-file statement into the `Statement` model, dispatching
/// on its leading keyword. `catalog` supplies live column metadata for
/// `SELECT *` expansion (spec §4.B/§4.D).
pub fn parse_statement(stmt: &RawStatement, catalog: &Catalog) -> GenResult<Statement> {
    parse_statement_at(&stmt.path, &stmt.sql, stmt.leading_comment.as_deref(), catalog)
}

fn parse_statement_at(
    path: &Path,
    sql: &str,
    leading_comment: Option<&str>,
    catalog: &Catalog,
) -> GenResult<Statement> {
    let keyword = first_keyword(sql);
    match keyword.as_str() {
        "SELECT" | "WITH" => Ok(Statement::Select(parse_select(path, sql, leading_comment, catalog)?)),
        "INSERT" => Ok(Statement::Mutating(parse_insert(path, sql, leading_comment, catalog)?)),
        "UPDATE" => Ok(Statement::Mutating(parse_update(path, sql, leading_comment, catalog)?)),
        "DELETE" => Ok(Statement::Mutating(parse_delete(path, sql, leading_comment, catalog)?)),
        other => Err(crate::error::GenError::UnsupportedStatement {
            path: path.to_path_buf(),
            message: format!("unrecognized leading keyword `{other}`"),
        }),
    }
}

fn first_keyword(sql: &str) -> String {
    sql.trim_start()
        .split(|c: char| c.is_whitespace() || c == '(')
        .next()
        .unwrap_or("")
        .to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn dispatches_on_leading_keyword() {
        let catalog = Catalog::new();
        let stmt = parse_statement_at(&PathBuf::from("q.sql"), "SELECT 1", None, &catalog).unwrap();
        assert!(matches!(stmt, Statement::Select(_)));
    }

    #[test]
    fn rejects_unknown_statement_kind() {
        let catalog = Catalog::new();
        let err = parse_statement_at(&PathBuf::from("q.sql"), "PRAGMA foreign_keys", None, &catalog).unwrap_err();
        assert!(matches!(err, crate::error::GenError::UnsupportedStatement { .. }));
    }
}
