//! UPDATE / DELETE statement parsing (spec §4.D): `WHERE`/`SET`
//! param-to-column association and RETURNING capture. Also supplies the
//! `col (=|IN) :param` and RETURNING helpers [`insert_parser`] reuses for
//! `ON CONFLICT ... DO UPDATE SET`.

use std::collections::BTreeMap;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::annotations::StatementAnnotationOverrides;
use crate::error::{GenError, GenResult};

use super::model::{AssociatedColumn, Catalog, MutatingKind, MutatingStatement};
use super::rewrite::{collection_param_names, rewrite_params};
use super::sql_text::{extract_cast_hints, mask, normalize_blank_lines};

static PARAM_ASSOC_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)([A-Za-z_]\w*(?:\s*\.\s*[A-Za-z_]\w*)?)\s*(=|\bIN\b)\s*:([A-Za-z_]\w*)").unwrap());

static RETURNING_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)\bRETURNING\b\s*(.*?)\s*;?\s*$").unwrap());

pub fn parse_update(
    path: &Path,
    raw_sql: &str,
    leading_comment: Option<&str>,
    _catalog: &Catalog,
) -> GenResult<MutatingStatement> {
    let normalized = normalize_blank_lines(raw_sql);
    let masked = mask(&normalized);

    let table = extract_table_name(&normalized, &masked, "UPDATE").ok_or_else(|| GenError::SqlParseError {
        path: path.to_path_buf(),
        statement: None,
        message: "expected UPDATE <table>".to_string(),
    })?;

    build_mutating(path, MutatingKind::Update, normalized, table, leading_comment)
}

pub fn parse_delete(
    path: &Path,
    raw_sql: &str,
    leading_comment: Option<&str>,
    _catalog: &Catalog,
) -> GenResult<MutatingStatement> {
    let normalized = normalize_blank_lines(raw_sql);
    let masked = mask(&normalized);

    let table = extract_table_name(&normalized, &masked, "FROM").ok_or_else(|| GenError::SqlParseError {
        path: path.to_path_buf(),
        statement: None,
        message: "expected DELETE FROM <table>".to_string(),
    })?;

    build_mutating(path, MutatingKind::Delete, normalized, table, leading_comment)
}

fn build_mutating(
    path: &Path,
    kind: MutatingKind,
    normalized: String,
    table: String,
    leading_comment: Option<&str>,
) -> GenResult<MutatingStatement> {
    let param_to_column: BTreeMap<String, AssociatedColumn> = extract_param_column_associations(&normalized).into_iter().collect();
    let parameter_cast_types = extract_cast_hints(&normalized);
    let (has_returning, returning_columns) = extract_returning(path, &normalized)?;

    let collection_params = collection_param_names(&normalized);
    let rewritten = rewrite_params(&normalized, &collection_params);

    let annotations = match leading_comment {
        Some(c) => StatementAnnotationOverrides::from_body(c, &path.display().to_string())?,
        None => StatementAnnotationOverrides::default(),
    };

    Ok(MutatingStatement {
        path: path.to_path_buf(),
        kind,
        sql: rewritten.sql,
        table,
        named_parameters: rewritten.named_parameters,
        param_to_column,
        with_selects: Vec::new(),
        parameter_cast_types,
        has_returning,
        returning_columns,
        annotations,
    })
}

/// Find the `<table>` token right after `keyword` (`INTO`, `UPDATE`, or
/// `FROM`), skipping an optional `IF EXISTS` for the table itself is not
/// needed in SQLite's INSERT/UPDATE/DELETE grammar.
pub(crate) fn extract_table_name(sql: &str, masked: &str, keyword: &str) -> Option<String> {
    let lower = masked.to_ascii_lowercase();
    let kw_lower = keyword.to_ascii_lowercase();
    let pos = find_word(&lower, &kw_lower)?;
    let after = pos + keyword.len();
    let rest = &masked[after..];
    let trimmed_rest = rest.trim_start();
    let skip_ws = rest.len() - trimmed_rest.len();
    let start = after + skip_ws;
    let mut end = start;
    let mbytes = masked.as_bytes();
    while end < mbytes.len() && ((mbytes[end] as char).is_alphanumeric() || mbytes[end] == b'_') {
        end += 1;
    }
    if end == start {
        return None;
    }
    Some(sql[start..end].to_string())
}

fn find_word(haystack: &str, word: &str) -> Option<usize> {
    let bytes = haystack.as_bytes();
    let mut i = 0;
    while let Some(rel) = haystack[i..].find(word) {
        let pos = i + rel;
        let before_ok = pos == 0 || !(bytes[pos - 1] as char).is_alphanumeric();
        let after_idx = pos + word.len();
        let after_ok = after_idx >= bytes.len() || !(bytes[after_idx] as char).is_alphanumeric();
        if before_ok && after_ok {
            return Some(pos);
        }
        i = pos + 1;
    }
    None
}

/// Every `col (=|IN) :param` association anywhere in `sql` (`SET` and
/// `WHERE` clauses alike — the pattern is unambiguous in either position).
pub(crate) fn extract_param_column_associations(sql: &str) -> Vec<(String, AssociatedColumn)> {
    let masked = mask(sql);
    let mut out = Vec::new();
    for cap in PARAM_ASSOC_RE.captures_iter(&masked) {
        let column_token = cap[1].trim();
        let column = column_token.rsplit('.').next().unwrap_or(column_token).to_string();
        let op = &cap[2];
        let param = cap[3].to_string();
        let assoc = if op.eq_ignore_ascii_case("in") {
            AssociatedColumn::Collection(column)
        } else {
            AssociatedColumn::Default(column)
        };
        out.push((param, assoc));
    }
    out
}

/// Capture `RETURNING <cols>`; only bare (optionally qualified) column
/// names are supported, matching the `UnsupportedReturning` invariant —
/// expressions or aliases in RETURNING are a hard error, since the result
/// struct can't be named from them.
pub(crate) fn extract_returning(path: &Path, sql: &str) -> GenResult<(bool, Vec<String>)> {
    let masked = mask(sql);
    let Some(caps) = RETURNING_RE.captures(&masked) else {
        return Ok((false, Vec::new()));
    };
    let list_masked = caps[1].trim();
    if list_masked == "*" {
        return Ok((true, vec!["*".to_string()]));
    }
    let start = caps.get(1).unwrap().start();
    let end = caps.get(1).unwrap().end();
    let list_original = sql[start..end].trim();

    let mut columns = Vec::new();
    for item in super::sql_text::split_top_level(list_original, ',') {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        if !is_bare_column_ref(item) {
            return Err(GenError::UnsupportedReturning {
                path: path.to_path_buf(),
                message: format!("`{item}` is not a bare column reference"),
            });
        }
        let column = item.rsplit('.').next().unwrap_or(item).to_string();
        columns.push(column);
    }
    Ok((true, columns))
}

fn is_bare_column_ref(s: &str) -> bool {
    let parts: Vec<&str> = s.split('.').collect();
    if parts.len() > 2 {
        return false;
    }
    parts.iter().all(|p| {
        let p = p.trim();
        let mut chars = p.chars();
        matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_') && chars.all(|c| c.is_alphanumeric() || c == '_')
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn update_associates_set_and_where_params() {
        let stmt = parse_update(
            &PathBuf::from("q.sql"),
            "UPDATE person SET name = :name WHERE id = :id",
            None,
            &Catalog::new(),
        )
        .unwrap();
        assert_eq!(stmt.table, "person");
        assert_eq!(
            stmt.param_to_column.get("name"),
            Some(&AssociatedColumn::Default("name".to_string()))
        );
        assert_eq!(
            stmt.param_to_column.get("id"),
            Some(&AssociatedColumn::Default("id".to_string()))
        );
    }

    #[test]
    fn delete_with_in_collection() {
        let stmt = parse_delete(
            &PathBuf::from("q.sql"),
            "DELETE FROM person WHERE id IN :ids",
            None,
            &Catalog::new(),
        )
        .unwrap();
        assert_eq!(stmt.table, "person");
        assert_eq!(
            stmt.param_to_column.get("ids"),
            Some(&AssociatedColumn::Collection("id".to_string()))
        );
        assert_eq!(stmt.sql, "DELETE FROM person WHERE id IN (SELECT value FROM json_each(?))");
    }

    #[test]
    fn captures_returning_star() {
        let stmt = parse_delete(&PathBuf::from("q.sql"), "DELETE FROM person WHERE id = :id RETURNING *", None, &Catalog::new())
            .unwrap();
        assert!(stmt.has_returning);
        assert_eq!(stmt.returning_columns, vec!["*"]);
    }

    #[test]
    fn rejects_expression_in_returning() {
        let err = parse_delete(
            &PathBuf::from("q.sql"),
            "DELETE FROM person WHERE id = :id RETURNING id, name || ' '",
            None,
            &Catalog::new(),
        )
        .unwrap_err();
        assert!(matches!(err, GenError::UnsupportedReturning { .. }));
    }
}
