//! INSERT statement parsing (spec §4.D): column/VALUES pairing,
//! `ON CONFLICT ... DO UPDATE SET` param-to-column association, and
//! RETURNING capture.

use std::collections::BTreeMap;
use std::path::Path;

use crate::annotations::StatementAnnotationOverrides;
use crate::error::{GenError, GenResult};

use super::model::{AssociatedColumn, Catalog, MutatingKind, MutatingStatement};
use super::rewrite::{collection_param_names, rewrite_params};
use super::sql_text::{extract_cast_hints, find_named_params, mask, normalize_blank_lines};
use super::update_delete_parser::{extract_param_column_associations, extract_returning, extract_table_name};

pub fn parse_insert(
    path: &Path,
    raw_sql: &str,
    leading_comment: Option<&str>,
    _catalog: &Catalog,
) -> GenResult<MutatingStatement> {
    let normalized = normalize_blank_lines(raw_sql);
    let masked = mask(&normalized);

    let table = extract_table_name(&normalized, &masked, "INTO").ok_or_else(|| GenError::SqlParseError {
        path: path.to_path_buf(),
        statement: None,
        message: "expected INSERT INTO <table>".to_string(),
    })?;

    let mut param_to_column: BTreeMap<String, AssociatedColumn> = BTreeMap::new();
    if let Some((columns, params)) = extract_insert_column_value_pairs(&normalized) {
        for (col, param) in columns.into_iter().zip(params.into_iter()) {
            param_to_column.entry(param).or_insert(AssociatedColumn::Default(col));
        }
    }
    // `ON CONFLICT (...) DO UPDATE SET col = :param` and any WHERE clause on
    // the conflict action reuse the same `col (=|IN) :param` shape as
    // UPDATE/DELETE.
    for (param, assoc) in extract_param_column_associations(&normalized) {
        param_to_column.entry(param).or_insert(assoc);
    }

    let parameter_cast_types = extract_cast_hints(&normalized);
    let (has_returning, returning_columns) = extract_returning(path, &normalized)?;

    let collection_params = collection_param_names(&normalized);
    let rewritten = rewrite_params(&normalized, &collection_params);

    let annotations = match leading_comment {
        Some(c) => StatementAnnotationOverrides::from_body(c, &path.display().to_string())?,
        None => StatementAnnotationOverrides::default(),
    };

    // Any named parameter not otherwise associated with a column (e.g. an
    // expression in VALUES) still needs to appear for binding order, with
    // no column to type against.
    for occ in find_named_params(&normalized) {
        param_to_column
            .entry(occ.name)
            .or_insert_with(|| AssociatedColumn::Default(String::new()));
    }

    Ok(MutatingStatement {
        path: path.to_path_buf(),
        kind: MutatingKind::Insert,
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

/// Pair the `(col1, col2, ...)` column list with the `:name` parameters in
/// the matching position of `VALUES (:p1, :p2, ...)`. Returns `None` if
/// either list is absent (e.g. `INSERT INTO t DEFAULT VALUES`) or their
/// lengths disagree, in which case callers fall back to WHERE/SET-style
/// association only.
fn extract_insert_column_value_pairs(sql: &str) -> Option<(Vec<String>, Vec<String>)> {
    let masked = mask(sql);
    let lower = masked.to_ascii_lowercase();

    let into_pos = find_word(&lower, "into")?;
    let open = masked[into_pos..].find('(')? + into_pos;
    let close = matching_paren(&masked, open)?;
    let columns: Vec<String> = super::sql_text::split_top_level(&sql[open + 1..close], ',')
        .into_iter()
        .map(|s| s.trim().trim_matches(|c| c == '`' || c == '[' || c == ']' || c == '"').to_string())
        .filter(|s| !s.is_empty())
        .collect();

    let values_pos = find_word(&lower[close..], "values")? + close;
    let vopen = masked[values_pos..].find('(')? + values_pos;
    let vclose = matching_paren(&masked, vopen)?;
    let value_exprs = super::sql_text::split_top_level(&sql[vopen + 1..vclose], ',');

    if value_exprs.len() != columns.len() {
        return None;
    }

    let mut params = Vec::new();
    for expr in &value_exprs {
        let occs = find_named_params(expr);
        if occs.len() != 1 {
            // Not a simple `:param` value (could be a literal, NULL,
            // expression, or multiple params); that column is skipped for
            // direct pairing.
            params.push(String::new());
        } else {
            params.push(occs[0].name.clone());
        }
    }

    let paired: Vec<(String, String)> = columns
        .into_iter()
        .zip(params)
        .filter(|(_, p)| !p.is_empty())
        .collect();
    let (cols, params): (Vec<_>, Vec<_>) = paired.into_iter().unzip();
    Some((cols, params))
}

fn find_word(haystack: &str, word: &str) -> Option<usize> {
    let bytes = haystack.as_bytes();
    let wl = word.len();
    let mut i = 0;
    while let Some(rel) = haystack[i..].find(word) {
        let pos = i + rel;
        let before_ok = pos == 0 || !(bytes[pos - 1] as char).is_alphanumeric();
        let after_idx = pos + wl;
        let after_ok = after_idx >= bytes.len() || !(bytes[after_idx] as char).is_alphanumeric();
        if before_ok && after_ok {
            return Some(pos);
        }
        i = pos + 1;
    }
    None
}

fn matching_paren(masked: &str, open_byte: usize) -> Option<usize> {
    let mut depth = 0i32;
    for (i, c) in masked[open_byte..].char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open_byte + i);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn pairs_columns_with_values() {
        let stmt = parse_insert(
            &PathBuf::from("q.sql"),
            "INSERT INTO person (id, name) VALUES (:id, :name)",
            None,
            &Catalog::new(),
        )
        .unwrap();
        assert_eq!(stmt.table, "person");
        assert_eq!(
            stmt.param_to_column.get("id"),
            Some(&AssociatedColumn::Default("id".to_string()))
        );
        assert_eq!(
            stmt.param_to_column.get("name"),
            Some(&AssociatedColumn::Default("name".to_string()))
        );
        assert_eq!(stmt.sql, "INSERT INTO person (id, name) VALUES (?, ?)");
    }

    #[test]
    fn captures_returning_columns() {
        let stmt = parse_insert(
            &PathBuf::from("q.sql"),
            "INSERT INTO person (name) VALUES (:name) RETURNING id, name",
            None,
            &Catalog::new(),
        )
        .unwrap();
        assert!(stmt.has_returning);
        assert_eq!(stmt.returning_columns, vec!["id", "name"]);
    }

    #[test]
    fn on_conflict_do_update_associates_params() {
        let stmt = parse_insert(
            &PathBuf::from("q.sql"),
            "INSERT INTO person (id, name) VALUES (:id, :name) \
             ON CONFLICT (id) DO UPDATE SET name = :name",
            None,
            &Catalog::new(),
        )
        .unwrap();
        assert_eq!(
            stmt.param_to_column.get("name"),
            Some(&AssociatedColumn::Default("name".to_string()))
        );
    }

    #[test]
    fn rejects_aliased_returning_expression() {
        let err = parse_insert(
            &PathBuf::from("q.sql"),
            "INSERT INTO person (name) VALUES (:name) RETURNING id + 1 AS next_id",
            None,
            &Catalog::new(),
        )
        .unwrap_err();
        assert!(matches!(err, GenError::UnsupportedReturning { .. }));
    }
}
