//! Schema Inspector (spec §4.B): bootstrap an ephemeral SQLite connection
//! and read back authoritative column metadata via `PRAGMA table_info`.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::Connection;

use crate::annotations::{extract_annotation_body, FieldAnnotationOverrides};
use crate::error::GenError;
use crate::scanner::RawStatement;

use super::graph::topological_order;
use super::model::{Column, CreateTableModel, TableAnnotations};

static CREATE_TABLE_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)CREATE\s+TABLE\s+(?:IF\s+NOT\s+EXISTS\s+)?[`\[\"]?(\w+)[`\]\"]?").unwrap());
static CREATE_VIEW_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)CREATE\s+VIEW\s+(?:IF\s+NOT\s+EXISTS\s+)?[`\[\"]?(\w+)[`\]\"]?\s*(\([^)]*\))?\s*AS\s+(.*)").unwrap()
});
static FROM_JOIN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)\b(?:FROM|JOIN)\s+[`\[\"]?(\w+)[`\]\"]?").unwrap());

/// Owns the ephemeral SQLite connection and the per-run caches (table
/// info, nothing shared across [`SchemaInspector`] instances — spec §5/§9
/// requires each generator invocation to own its state).
pub struct SchemaInspector {
    conn: Connection,
    pub tables: BTreeMap<String, CreateTableModel>,
    /// Views in bootstrap/topological order, as `(name, sql, column_names, select_sql)`.
    pub view_order: Vec<String>,
    pub view_sql: BTreeMap<String, String>,
    pub view_select_sql: BTreeMap<String, String>,
    pub view_column_names: BTreeMap<String, Option<Vec<String>>>,
    pub view_paths: BTreeMap<String, PathBuf>,
}

impl SchemaInspector {
    /// Open an ephemeral connection (`:memory:`, or a file path to snapshot
    /// to later) and execute `schema` then `init` statements in order,
    /// views sorted topologically among themselves.
    pub fn bootstrap(schema: &[RawStatement], init: &[RawStatement]) -> Result<Self, GenError> {
        let conn = Connection::open_in_memory().map_err(|e| GenError::SqlExecutionError {
            path: PathBuf::new(),
            message: e.to_string(),
        })?;

        let mut table_stmts: Vec<&RawStatement> = Vec::new();
        let mut view_stmts: Vec<&RawStatement> = Vec::new();
        let mut index_other_stmts: Vec<&RawStatement> = Vec::new();

        for stmt in schema {
            let upper_start = stmt.sql.trim_start();
            if CREATE_TABLE_NAME_RE.is_match(upper_start) {
                table_stmts.push(stmt);
            } else if CREATE_VIEW_RE.is_match(upper_start) {
                view_stmts.push(stmt);
            } else {
                index_other_stmts.push(stmt);
            }
        }

        // Execute tables first, in source order.
        for stmt in &table_stmts {
            exec(&conn, stmt)?;
        }

        // Build the view dependency graph (conservative FROM/JOIN walk)
        // and execute in topological order.
        let view_names: BTreeSet<String> = view_stmts
            .iter()
            .filter_map(|s| CREATE_VIEW_RE.captures(s.sql.trim_start()).map(|c| c[1].to_string()))
            .collect();

        let mut deps: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut by_name: BTreeMap<String, &RawStatement> = BTreeMap::new();
        for stmt in &view_stmts {
            let caps = CREATE_VIEW_RE
                .captures(stmt.sql.trim_start())
                .expect("already matched above");
            let name = caps[1].to_string();
            let body = &caps[3];
            let referenced: BTreeSet<String> = FROM_JOIN_RE
                .captures_iter(body)
                .map(|c| c[1].to_string())
                .filter(|n| view_names.contains(n) && n != &name)
                .collect();
            deps.insert(name.clone(), referenced);
            by_name.insert(name, stmt);
        }
        let order = topological_order(&deps)?;

        for name in &order {
            exec(&conn, by_name[name])?;
        }

        // Any remaining schema statements (indexes, etc.) after tables and
        // views, in source order — they may reference either.
        for stmt in &index_other_stmts {
            exec(&conn, stmt)?;
        }

        for stmt in init {
            exec(&conn, stmt)?;
        }

        let mut tables = BTreeMap::new();
        for stmt in &table_stmts {
            let caps = CREATE_TABLE_NAME_RE
                .captures(stmt.sql.trim_start())
                .expect("already matched above");
            let name = caps[1].to_string();
            let (columns, annotations) = read_table_columns(&conn, &name, stmt)?;
            tables.insert(
                name.clone(),
                CreateTableModel {
                    path: stmt.path.clone(),
                    name,
                    sql: stmt.sql.clone(),
                    columns,
                    annotations,
                },
            );
        }

        let mut view_sql = BTreeMap::new();
        let mut view_select_sql = BTreeMap::new();
        let mut view_column_names = BTreeMap::new();
        let mut view_paths = BTreeMap::new();
        for name in &order {
            let stmt = by_name[name];
            let caps = CREATE_VIEW_RE
                .captures(stmt.sql.trim_start())
                .expect("already matched above");
            let column_names = caps.get(2).map(|m| {
                m.as_str()
                    .trim_start_matches('(')
                    .trim_end_matches(')')
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .collect::<Vec<_>>()
            });
            view_sql.insert(name.clone(), stmt.sql.clone());
            view_select_sql.insert(name.clone(), caps[3].trim_end_matches(';').trim().to_string());
            view_column_names.insert(name.clone(), column_names);
            view_paths.insert(name.clone(), stmt.path.clone());
        }

        Ok(SchemaInspector {
            conn,
            tables,
            view_order: order,
            view_sql,
            view_select_sql,
            view_column_names,
            view_paths,
        })
    }

    /// Column metadata for a view, read back the same way as a table's
    /// (SQLite's `PRAGMA table_info` works for views too).
    pub fn view_columns(&self, name: &str) -> Result<Vec<(String, String, bool)>, GenError> {
        pragma_table_info(&self.conn, name)
    }

    /// Copy the bootstrap database out to a user-chosen path for
    /// inspection (spec §2/§6).
    pub fn snapshot_to(&self, path: &Path) -> Result<(), GenError> {
        let dest = Connection::open(path).map_err(|e| GenError::SqlExecutionError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        self.conn
            .backup(rusqlite::DatabaseName::Main, &dest, None)
            .map_err(|e| GenError::SqlExecutionError {
                path: path.to_path_buf(),
                message: e.to_string(),
            })
    }
}

fn exec(conn: &Connection, stmt: &RawStatement) -> Result<(), GenError> {
    conn.execute_batch(&stmt.sql).map_err(|e| GenError::SqlExecutionError {
        path: stmt.path.clone(),
        message: format!("{e} in statement: {}", first_line(&stmt.sql)),
    })
}

fn first_line(sql: &str) -> &str {
    sql.lines().next().unwrap_or(sql)
}

fn pragma_table_info(conn: &Connection, table: &str) -> Result<Vec<(String, String, bool)>, GenError> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info(\"{table}\")"))
        .map_err(|e| GenError::SqlExecutionError {
            path: PathBuf::new(),
            message: e.to_string(),
        })?;
    let rows = stmt
        .query_map([], |row| {
            let name: String = row.get(1)?;
            let sql_type: String = row.get(2)?;
            let notnull: i64 = row.get(3)?;
            Ok((name, sql_type, notnull != 0))
        })
        .map_err(|e| GenError::SqlExecutionError {
            path: PathBuf::new(),
            message: e.to_string(),
        })?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.map_err(|e| GenError::SqlExecutionError {
            path: PathBuf::new(),
            message: e.to_string(),
        })?);
    }
    Ok(out)
}

fn read_table_columns(
    conn: &Connection,
    table: &str,
    stmt: &RawStatement,
) -> Result<(Vec<Column>, TableAnnotations), GenError> {
    let mut q = conn
        .prepare(&format!("PRAGMA table_info(\"{table}\")"))
        .map_err(|e| GenError::SqlExecutionError {
            path: stmt.path.clone(),
            message: e.to_string(),
        })?;
    let rows = q
        .query_map([], |row| {
            let name: String = row.get(1)?;
            let sql_type: String = row.get(2)?;
            let notnull: i64 = row.get(3)?;
            let pk: i64 = row.get(5)?;
            Ok((name, sql_type, notnull != 0, pk != 0))
        })
        .map_err(|e| GenError::SqlExecutionError {
            path: stmt.path.clone(),
            message: e.to_string(),
        })?;

    let unique_columns = extract_unique_columns(&stmt.sql);
    let auto_increment_columns = extract_autoincrement_columns(&stmt.sql);
    let annotations_by_column = extract_column_annotations(&stmt.sql, &stmt.path)?;

    let mut columns = Vec::new();
    let mut table_annotations = TableAnnotations::default();
    for row in rows {
        let (name, sql_type, not_null, primary_key) =
            row.map_err(|e| GenError::SqlExecutionError {
                path: stmt.path.clone(),
                message: e.to_string(),
            })?;
        let overrides = annotations_by_column.get(&name).cloned().unwrap_or_default();
        if !overrides.is_empty() {
            table_annotations
                .column_overrides
                .insert(name.clone(), overrides.clone());
        }
        columns.push(Column {
            auto_increment: auto_increment_columns.contains(&name) || (primary_key && sql_type.eq_ignore_ascii_case("INTEGER")),
            unique: unique_columns.contains(&name),
            not_null: not_null || primary_key,
            primary_key,
            sql_type,
            name,
            annotations: overrides,
        });
    }
    Ok((columns, table_annotations))
}

fn extract_unique_columns(sql: &str) -> BTreeSet<String> {
    static COL_UNIQUE_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?i)[`\[\"]?(\w+)[`\]\"]?\s+[\w() ]*?\bUNIQUE\b").unwrap());
    COL_UNIQUE_RE.captures_iter(sql).map(|c| c[1].to_string()).collect()
}

fn extract_autoincrement_columns(sql: &str) -> BTreeSet<String> {
    static AUTOINC_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?i)[`\[\"]?(\w+)[`\]\"]?\s+INTEGER\s+PRIMARY\s+KEY\s+AUTOINCREMENT").unwrap());
    AUTOINC_RE.captures_iter(sql).map(|c| c[1].to_string()).collect()
}

/// Extract `-- @@{...}` / `/* @@{...} */` annotation comments sitting next
/// to each column definition inside a `CREATE TABLE(...)` body.
fn extract_column_annotations(
    sql: &str,
    path: &Path,
) -> Result<BTreeMap<String, FieldAnnotationOverrides>, GenError> {
    let open = match sql.find('(') {
        Some(i) => i,
        None => return Ok(BTreeMap::new()),
    };
    let close = sql.rfind(')').unwrap_or(sql.len());
    let body = &sql[open + 1..close.min(sql.len())];

    let mut out = BTreeMap::new();
    for line in crate::statement::split_top_level(body, ',') {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let col_name = trimmed
            .split_whitespace()
            .next()
            .map(|s| s.trim_matches(|c| c == '`' || c == '[' || c == ']' || c == '"'))
            .unwrap_or_default();
        if col_name.is_empty() || is_table_constraint_keyword(col_name) {
            continue;
        }
        if let Some(body) = extract_annotation_body(trimmed) {
            let site = format!("{}:{col_name}", path.display());
            let overrides = FieldAnnotationOverrides::from_body(body, &site)?;
            if !overrides.is_empty() {
                out.insert(col_name.to_string(), overrides);
            }
        }
    }
    Ok(out)
}

fn is_table_constraint_keyword(word: &str) -> bool {
    matches!(
        word.to_ascii_uppercase().as_str(),
        "PRIMARY" | "UNIQUE" | "FOREIGN" | "CHECK" | "CONSTRAINT"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::split_top_level_statements;
    use std::path::PathBuf;

    fn raw(sql: &str) -> Vec<RawStatement> {
        split_top_level_statements(&PathBuf::from("schema.sql"), sql)
    }

    #[test]
    fn bootstraps_table_and_reads_columns() {
        let schema = raw(
            "CREATE TABLE person(id INTEGER PRIMARY KEY, name TEXT NOT NULL, email TEXT UNIQUE);",
        );
        let inspector = SchemaInspector::bootstrap(&schema, &[]).unwrap();
        let person = &inspector.tables["person"];
        assert_eq!(person.columns.len(), 3);
        let id = person.column("id").unwrap();
        assert!(id.primary_key);
        assert!(id.auto_increment);
        let email = person.column("email").unwrap();
        assert!(email.unique);
        assert!(!email.not_null);
    }

    #[test]
    fn orders_views_topologically() {
        let schema = raw(
            "CREATE TABLE person(id INTEGER PRIMARY KEY, name TEXT NOT NULL);\n\
             CREATE VIEW person_names AS SELECT name FROM person;\n\
             CREATE VIEW person_upper AS SELECT name FROM person_names;",
        );
        let inspector = SchemaInspector::bootstrap(&schema, &[]).unwrap();
        assert_eq!(inspector.view_order, vec!["person_names", "person_upper"]);
    }

    #[test]
    fn forward_reference_is_reordered_not_an_error() {
        // v2 is written before v1 but only references it; the dependency
        // graph is built from statement text independent of source order,
        // so bootstrap should still succeed by creating v1 first.
        let schema = raw(
            "CREATE TABLE t(id INTEGER);\nCREATE VIEW v2 AS SELECT * FROM v1;\nCREATE VIEW v1 AS SELECT * FROM t;",
        );
        let inspector = SchemaInspector::bootstrap(&schema, &[]).unwrap();
        assert_eq!(inspector.view_order, vec!["v1", "v2"]);
    }

    #[test]
    fn view_cycle_fails() {
        let schema = raw(
            "CREATE TABLE t(id INTEGER);\nCREATE VIEW v1 AS SELECT * FROM v2;\nCREATE VIEW v2 AS SELECT * FROM v1;",
        );
        let err = SchemaInspector::bootstrap(&schema, &[]);
        assert!(matches!(err, Err(GenError::ViewCycle { .. })));
    }

    #[test]
    fn column_annotation_extracted() {
        let schema = raw(
            "CREATE TABLE person(id INTEGER PRIMARY KEY, birth_date TEXT /* @@{ propertyType=LocalDate, adapter } */);",
        );
        let inspector = SchemaInspector::bootstrap(&schema, &[]).unwrap();
        let person = &inspector.tables["person"];
        let birth = person.column("birth_date").unwrap();
        assert_eq!(birth.annotations.property_type.as_deref(), Some("LocalDate"));
        assert!(birth.annotations.adapter);
    }
}
