//! SELECT statement parsing (spec §4.D): projected fields (incl. `*`
//! expansion against the live schema catalog), table aliases, named
//! parameters, `CAST(:p AS T)` hints and `WITH` sub-selects.
//!
//! Table/alias extraction is done with a small hand-rolled word cursor
//! rather than deep `sqlparser` AST matching, same reasoning as
//! [`super::sql_text`]: this generator leans on regex/token scanning over
//! the raw SQL text rather than a full grammar for structure it already
//! knows how to find by position.

use std::collections::BTreeMap;
use std::path::Path;

use crate::annotations::{FieldAnnotationOverrides, StatementAnnotationOverrides};
use crate::error::{GenError, GenResult};

use super::model::{Catalog, FieldSource, SelectStatement};
use super::rewrite::{collection_param_names, rewrite_params};
use super::sql_text::{extract_cast_hints, mask, normalize_blank_lines};

const CLAUSE_KEYWORDS: &[&str] = &[
    "WHERE", "ON", "GROUP", "ORDER", "LIMIT", "HAVING", "JOIN", "INNER", "LEFT", "RIGHT", "CROSS",
    "OUTER", "UNION", "SET", "VALUES", "RETURNING", "USING",
];

/// Parse a single SELECT (or `WITH ... SELECT`) statement.
pub fn parse_select(
    path: &Path,
    raw_sql: &str,
    leading_comment: Option<&str>,
    catalog: &Catalog,
) -> GenResult<SelectStatement> {
    let normalized = normalize_blank_lines(raw_sql);
    let (with_selects, main_sql) = extract_with_ctes(path, &normalized, catalog)?;
    build_select(path, &main_sql, leading_comment, catalog, with_selects)
}

fn build_select(
    path: &Path,
    main_sql: &str,
    leading_comment: Option<&str>,
    catalog: &Catalog,
    with_selects: Vec<SelectStatement>,
) -> GenResult<SelectStatement> {
    let chars: Vec<char> = main_sql.chars().collect();
    let masked = mask(main_sql);
    let mchars: Vec<char> = masked.chars().collect();

    let sel_idx = find_top_level_word(&mchars, 0, "SELECT").ok_or_else(|| GenError::SqlParseError {
        path: path.to_path_buf(),
        statement: None,
        message: "expected a SELECT statement".to_string(),
    })?;
    let mut proj_start = sel_idx + "SELECT".len();
    if let Some(d) = find_top_level_word(&mchars, proj_start, "DISTINCT") {
        if d == skip_ws(&mchars, proj_start) {
            proj_start = d + "DISTINCT".len();
        }
    }

    let from_idx = find_top_level_word(&mchars, proj_start, "FROM");
    let proj_end = from_idx.unwrap_or(chars.len());
    let projection_text: String = chars[proj_start..proj_end].iter().collect();
    let projection_mask: String = mchars[proj_start..proj_end].iter().collect();

    let mut table_aliases: BTreeMap<String, String> = BTreeMap::new();
    let mut join_tables: Vec<String> = Vec::new();
    let mut from_table = None;

    if let Some(idx) = from_idx {
        let after = idx + "FROM".len();
        if let Some((table, alias, next)) = read_table_ref(&chars, &mchars, after) {
            let key = alias.clone().unwrap_or_else(|| table.clone());
            table_aliases.insert(key.clone(), table.clone());
            from_table = Some(key);

            let mut cursor = next;
            while let Some(join_idx) = find_top_level_word(&mchars, cursor, "JOIN") {
                let after_join = join_idx + "JOIN".len();
                if let Some((jtable, jalias, jnext)) = read_table_ref(&chars, &mchars, after_join) {
                    let jkey = jalias.unwrap_or_else(|| jtable.clone());
                    table_aliases.insert(jkey.clone(), jtable.clone());
                    join_tables.push(jkey);
                    cursor = jnext;
                } else {
                    cursor = after_join;
                }
            }
        }
    }

    let fields = parse_projection(path, &projection_text, &projection_mask, &from_table, &table_aliases, catalog)?;

    let parameter_cast_types = extract_cast_hints(main_sql);
    let collection_params = collection_param_names(main_sql);
    let rewritten = rewrite_params(main_sql, &collection_params);

    let annotations = match leading_comment {
        Some(c) => StatementAnnotationOverrides::from_body(c, &path.display().to_string())?,
        None => StatementAnnotationOverrides::default(),
    };

    Ok(SelectStatement {
        path: path.to_path_buf(),
        sql: rewritten.sql,
        from_table,
        table_aliases,
        join_tables,
        fields,
        named_parameters: rewritten.named_parameters,
        collection_parameters: collection_params,
        parameter_cast_types,
        with_selects,
        annotations,
    })
}

fn parse_projection(
    path: &Path,
    projection_text: &str,
    projection_mask: &str,
    from_table: &Option<String>,
    table_aliases: &BTreeMap<String, String>,
    catalog: &Catalog,
) -> GenResult<Vec<FieldSource>> {
    let items = split_top_level_preserving(projection_text, projection_mask, ',');
    let mut fields = Vec::new();
    for item in items {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        fields.extend(parse_projection_item(path, item, from_table, table_aliases, catalog)?);
    }
    Ok(fields)
}

fn parse_projection_item(
    path: &Path,
    item: &str,
    from_table: &Option<String>,
    table_aliases: &BTreeMap<String, String>,
    catalog: &Catalog,
) -> GenResult<Vec<FieldSource>> {
    let overrides = crate::annotations::extract_annotation_body(item)
        .map(|body| FieldAnnotationOverrides::from_body(body, &path.display().to_string()))
        .transpose()?
        .unwrap_or_default();

    // `mask()` preserves char count 1:1, so trimming the masked text tells
    // us how many leading chars of `item` are real code (the rest is a
    // trailing comment turned to spaces).
    let masked_item = mask(item);
    let code_char_len = masked_item.trim_end().chars().count();
    let code_for_match: String = item.chars().take(code_char_len).collect();
    let code = strip_trailing_semicolon(code_for_match.trim());

    // Bare `*`.
    if code == "*" {
        let real_table = from_table
            .as_ref()
            .and_then(|alias| table_aliases.get(alias))
            .cloned();
        return expand_star(path, real_table.as_deref(), from_table.clone(), catalog);
    }

    // `alias.*`.
    if let Some(alias) = code.strip_suffix(".*") {
        let alias = alias.trim();
        let real_table = table_aliases.get(alias).cloned();
        return expand_star(path, real_table.as_deref(), Some(alias.to_string()), catalog);
    }

    let (expr_part, alias) = split_as_alias(code);
    let expr_part = expr_part.as_str();

    if let Some((table, column)) = split_dotted(expr_part) {
        let field_name = alias.clone().unwrap_or_else(|| column.clone());
        return Ok(vec![FieldSource {
            field_name,
            table_name: table,
            original_column_name: column,
            sql_type: None,
            expression: None,
            overrides,
        }]);
    }

    if is_bare_ident(expr_part) {
        let field_name = alias.clone().unwrap_or_else(|| expr_part.to_string());
        let table_name = from_table.clone().unwrap_or_default();
        return Ok(vec![FieldSource {
            field_name,
            table_name,
            original_column_name: expr_part.to_string(),
            sql_type: None,
            expression: None,
            overrides,
        }]);
    }

    // Anything else is an expression: CAST(...), a function call, a
    // literal, string concatenation, etc. Needs an explicit alias to name
    // the resulting field unless the annotation supplies `field`/
    // `propertyName`.
    let field_name = alias
        .or_else(|| overrides.property_name.clone())
        .unwrap_or_else(|| sanitize_expr_name(expr_part));
    Ok(vec![FieldSource {
        field_name: field_name.clone(),
        table_name: from_table.clone().unwrap_or_default(),
        original_column_name: field_name,
        sql_type: None,
        expression: Some(expr_part.to_string()),
        overrides,
    }])
}

fn expand_star(
    path: &Path,
    real_table: Option<&str>,
    alias_for_error: Option<String>,
    catalog: &Catalog,
) -> GenResult<Vec<FieldSource>> {
    let real_table = real_table.ok_or_else(|| GenError::SqlParseError {
        path: path.to_path_buf(),
        statement: None,
        message: format!(
            "cannot expand `*`: unknown table/view `{}`",
            alias_for_error.clone().unwrap_or_default()
        ),
    })?;
    let columns = catalog.get(&real_table.to_ascii_lowercase()).ok_or_else(|| GenError::SqlParseError {
        path: path.to_path_buf(),
        statement: None,
        message: format!("cannot expand `*`: no schema columns known for `{real_table}`"),
    })?;
    let table_name = alias_for_error.unwrap_or_else(|| real_table.to_string());
    Ok(columns
        .iter()
        .map(|c| FieldSource {
            field_name: c.name.clone(),
            table_name: table_name.clone(),
            original_column_name: c.name.clone(),
            sql_type: Some(c.sql_type.clone()),
            expression: None,
            overrides: FieldAnnotationOverrides::default(),
        })
        .collect())
}

/// Split `code` on a top-level (paren-depth 0, outside string literals)
/// ` AS alias` suffix, so `CAST(x AS TEXT)` isn't mistaken for an alias.
fn split_as_alias(code: &str) -> (String, Option<String>) {
    let masked = mask(code);
    let mchars: Vec<char> = masked.chars().collect();
    let lower: Vec<char> = masked.to_ascii_lowercase().chars().collect();
    let n = mchars.len();
    let mut depth = 0i32;
    let mut last_as = None;
    let mut i = 0;
    while i < n {
        match mchars[i] {
            '(' => depth += 1,
            ')' => depth -= 1,
            _ => {}
        }
        if depth == 0 && i + 2 <= n && lower[i] == 'a' && lower[i + 1] == 's' {
            let before_ok = i == 0 || !(lower[i - 1].is_alphanumeric() || lower[i - 1] == '_');
            let after_idx = i + 2;
            let after_ok = after_idx >= n || !(lower[after_idx].is_alphanumeric() || lower[after_idx] == '_');
            if before_ok && after_ok {
                last_as = Some(i);
            }
        }
        i += 1;
    }
    if let Some(pos) = last_as {
        let code_chars: Vec<char> = code.chars().collect();
        let expr: String = code_chars[..pos].iter().collect();
        let alias: String = code_chars[pos + 2..].iter().collect();
        let expr = expr.trim().to_string();
        let alias = alias.trim().to_string();
        if is_bare_ident(&alias) && !expr.is_empty() {
            return (expr, Some(alias));
        }
    }
    (code.to_string(), None)
}

fn split_dotted(expr: &str) -> Option<(String, String)> {
    let mut parts = expr.splitn(2, '.');
    let first = parts.next()?.trim();
    let second = parts.next()?.trim();
    if parts.next().is_some() {
        return None;
    }
    if is_bare_ident(first) && is_bare_ident(second) {
        Some((first.to_string(), second.to_string()))
    } else {
        None
    }
}

fn is_bare_ident(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}

fn sanitize_expr_name(expr: &str) -> String {
    let mut out = String::new();
    for c in expr.chars() {
        if c.is_alphanumeric() || c == '_' {
            out.push(c);
        }
    }
    if out.is_empty() {
        "expr".to_string()
    } else {
        out
    }
}

fn strip_trailing_semicolon(s: &str) -> &str {
    s.strip_suffix(';').unwrap_or(s)
}

/// Split `original` on commas at paren-depth 0, using `masked` (same char
/// length) purely to decide where depth/commas are real, but building the
/// output strings from `original` so inline comments/annotations survive.
fn split_top_level_preserving(original: &str, masked: &str, sep: char) -> Vec<String> {
    let orig_chars: Vec<char> = original.chars().collect();
    let mask_chars: Vec<char> = masked.chars().collect();
    let mut depth = 0i32;
    let mut current = String::new();
    let mut parts = Vec::new();
    for idx in 0..orig_chars.len() {
        let mc = mask_chars.get(idx).copied().unwrap_or(' ');
        match mc {
            '(' => {
                depth += 1;
                current.push(orig_chars[idx]);
            }
            ')' => {
                depth -= 1;
                current.push(orig_chars[idx]);
            }
            c if c == sep && depth <= 0 => {
                parts.push(std::mem::take(&mut current));
            }
            _ => current.push(orig_chars[idx]),
        }
    }
    if !current.trim().is_empty() {
        parts.push(current);
    }
    parts
}

/// Find the char index of `word` as a whole word at paren-depth 0 in
/// `masked`, starting the search at char index `from`.
fn find_top_level_word(masked: &[char], from: usize, word: &str) -> Option<usize> {
    let lower: Vec<char> = masked.iter().collect::<String>().to_ascii_lowercase().chars().collect();
    let wl: Vec<char> = word.to_ascii_lowercase().chars().collect();
    let n = masked.len();
    let mut depth = 0i32;
    let mut i = 0;
    while i < n {
        match masked[i] {
            '(' => depth += 1,
            ')' => depth -= 1,
            _ => {}
        }
        if i >= from && depth == 0 && i + wl.len() <= n && lower[i..i + wl.len()] == wl[..] {
            let before_ok = i == 0 || !(lower[i - 1].is_alphanumeric() || lower[i - 1] == '_');
            let after_idx = i + wl.len();
            let after_ok = after_idx >= n || !(lower[after_idx].is_alphanumeric() || lower[after_idx] == '_');
            if before_ok && after_ok {
                return Some(i);
            }
        }
        i += 1;
    }
    None
}

fn skip_ws(chars: &[char], mut i: usize) -> usize {
    while i < chars.len() && chars[i].is_whitespace() {
        i += 1;
    }
    i
}

fn read_ident_at(chars: &[char], mut i: usize) -> Option<(String, usize)> {
    i = skip_ws(chars, i);
    let start = i;
    if i >= chars.len() || !(chars[i].is_alphabetic() || chars[i] == '_') {
        return None;
    }
    while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
        i += 1;
    }
    Some((chars[start..i].iter().collect(), i))
}

/// Read `table_name [[AS] alias]` starting at char index `from` (right
/// after the `FROM`/`JOIN` keyword). Returns the table name, optional
/// alias, and the char index just past what was consumed.
fn read_table_ref(chars: &[char], mchars: &[char], from: usize) -> Option<(String, Option<String>, usize)> {
    let (_, after_table) = read_ident_at(mchars, from)?;
    let table_real: String = chars[skip_ws(mchars, from)..after_table].iter().collect();
    let mut cursor = skip_ws(mchars, after_table);

    if let Some((word, after_word)) = read_ident_at(mchars, cursor) {
        if word.eq_ignore_ascii_case("AS") {
            if let Some((alias, after_alias)) = read_ident_at(mchars, after_word) {
                return Some((table_real, Some(alias), after_alias));
            }
            return Some((table_real, None, after_word));
        }
        if !CLAUSE_KEYWORDS.iter().any(|k| word.eq_ignore_ascii_case(k)) {
            cursor = after_word;
            return Some((table_real, Some(word), cursor));
        }
    }
    Some((table_real, None, after_table))
}

/// Strip a leading `WITH [RECURSIVE] name [(cols)] AS (body) [, ...]`
/// prefix, returning the parsed CTEs (as independently-resolved
/// `SelectStatement`s) and the remaining main statement text.
fn extract_with_ctes(path: &Path, sql: &str, catalog: &Catalog) -> GenResult<(Vec<SelectStatement>, String)> {
    let chars: Vec<char> = sql.chars().collect();
    let masked = mask(sql);
    let mchars: Vec<char> = masked.chars().collect();

    let Some((word, after)) = read_ident_at(&mchars, 0) else {
        return Ok((Vec::new(), sql.to_string()));
    };
    if !word.eq_ignore_ascii_case("WITH") {
        return Ok((Vec::new(), sql.to_string()));
    }
    let mut cursor = after;
    if let Some((maybe_recursive, after_r)) = read_ident_at(&mchars, cursor) {
        if maybe_recursive.eq_ignore_ascii_case("RECURSIVE") {
            cursor = after_r;
        }
    }

    let mut ctes = Vec::new();
    loop {
        let Some((_name, after_name)) = read_ident_at(&mchars, cursor) else {
            break;
        };
        cursor = skip_ws(&mchars, after_name);
        // Optional column list.
        if cursor < mchars.len() && mchars[cursor] == '(' {
            let close = match_paren(&mchars, cursor)?;
            cursor = skip_ws(&mchars, close + 1);
        }
        let Some((as_word, after_as)) = read_ident_at(&mchars, cursor) else {
            break;
        };
        if !as_word.eq_ignore_ascii_case("AS") {
            break;
        }
        cursor = skip_ws(&mchars, after_as);
        if cursor >= mchars.len() || mchars[cursor] != '(' {
            break;
        }
        let close = match_paren(&mchars, cursor)?;
        let body: String = chars[cursor + 1..close].iter().collect();
        ctes.push(build_select(path, body.trim(), None, catalog, Vec::new())?);
        cursor = skip_ws(&mchars, close + 1);
        if cursor < mchars.len() && mchars[cursor] == ',' {
            cursor = skip_ws(&mchars, cursor + 1);
            continue;
        }
        break;
    }

    let remaining: String = chars[cursor..].iter().collect();
    Ok((ctes, remaining))
}

fn match_paren(mchars: &[char], open: usize) -> GenResult<usize> {
    let mut depth = 0i32;
    let mut i = open;
    while i < mchars.len() {
        match mchars[i] {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    Err(GenError::SqlParseError {
        path: std::path::PathBuf::new(),
        statement: None,
        message: "unbalanced parentheses".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn catalog_with(table: &str, columns: &[(&str, &str)]) -> Catalog {
        let mut catalog = Catalog::new();
        catalog.insert(
            table.to_ascii_lowercase(),
            columns
                .iter()
                .map(|(n, t)| super::super::model::ColumnInfo {
                    name: n.to_string(),
                    sql_type: t.to_string(),
                })
                .collect(),
        );
        catalog
    }

    #[test]
    fn parses_simple_select_star() {
        let catalog = catalog_with("person", &[("id", "INTEGER"), ("name", "TEXT")]);
        let stmt = parse_select(
            &PathBuf::from("q.sql"),
            "SELECT * FROM person WHERE id = :id",
            None,
            &catalog,
        )
        .unwrap();
        assert_eq!(stmt.from_table.as_deref(), Some("person"));
        assert_eq!(stmt.fields.len(), 2);
        assert_eq!(stmt.fields[0].field_name, "id");
        assert_eq!(stmt.sql, "SELECT * FROM person WHERE id = ?");
        assert_eq!(stmt.named_parameters, vec!["id"]);
    }

    #[test]
    fn parses_aliased_join_with_explicit_fields() {
        let catalog = catalog_with("person", &[]);
        let stmt = parse_select(
            &PathBuf::from("q.sql"),
            "SELECT p.id, p.name AS fullName, a.city \
             FROM person p JOIN address AS a ON a.person_id = p.id",
            None,
            &catalog,
        )
        .unwrap();
        assert_eq!(stmt.table_aliases.get("p"), Some(&"person".to_string()));
        assert_eq!(stmt.table_aliases.get("a"), Some(&"address".to_string()));
        assert_eq!(stmt.join_tables, vec!["a"]);
        assert_eq!(stmt.fields.len(), 3);
        assert_eq!(stmt.fields[1].field_name, "fullName");
        assert_eq!(stmt.fields[1].table_name, "p");
        assert_eq!(stmt.fields[1].original_column_name, "name");
    }

    #[test]
    fn parses_in_collection_parameter() {
        let catalog = catalog_with("person", &[]);
        let stmt = parse_select(
            &PathBuf::from("q.sql"),
            "SELECT id FROM person WHERE id IN :ids",
            None,
            &catalog,
        )
        .unwrap();
        assert_eq!(stmt.sql, "SELECT id FROM person WHERE id IN (SELECT value FROM json_each(?))");
    }

    #[test]
    fn parses_cast_hint() {
        let catalog = catalog_with("person", &[]);
        let stmt = parse_select(
            &PathBuf::from("q.sql"),
            "SELECT id FROM person WHERE created_at > CAST(:since AS TEXT)",
            None,
            &catalog,
        )
        .unwrap();
        assert_eq!(stmt.parameter_cast_types.get("since"), Some(&"TEXT".to_string()));
    }

    #[test]
    fn parses_with_cte() {
        let catalog = catalog_with("person", &[("id", "INTEGER")]);
        let stmt = parse_select(
            &PathBuf::from("q.sql"),
            "WITH recent AS (SELECT id FROM person) SELECT id FROM recent",
            None,
            &catalog,
        )
        .unwrap();
        assert_eq!(stmt.with_selects.len(), 1);
        assert_eq!(stmt.with_selects[0].from_table.as_deref(), Some("person"));
    }

    #[test]
    fn field_level_annotation_is_parsed() {
        let catalog = catalog_with("person", &[]);
        let stmt = parse_select(
            &PathBuf::from("q.sql"),
            "SELECT id, birth_date -- @@{ propertyType=LocalDate }\n FROM person",
            None,
            &catalog,
        )
        .unwrap();
        let field = stmt.fields.iter().find(|f| f.field_name == "birth_date").unwrap();
        assert_eq!(field.overrides.property_type.as_deref(), Some("LocalDate"));
    }
}
