//! Statement model (spec §3 data model) shared by the Statement Processor,
//! Field Annotation Resolver and Result Mapping Planner.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::annotations::{FieldAnnotationOverrides, StatementAnnotationOverrides};

/// Whether a named parameter binds a single scalar or an `IN :param`
/// collection that must be rewritten to `json_each`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssociatedColumn {
    Default(String),
    Collection(String),
}

impl AssociatedColumn {
    pub fn column_name(&self) -> &str {
        match self {
            AssociatedColumn::Default(c) | AssociatedColumn::Collection(c) => c,
        }
    }

    pub fn is_collection(&self) -> bool {
        matches!(self, AssociatedColumn::Collection(_))
    }
}

/// A table/view's columns as read back from the live schema connection,
/// keyed by lowercased name. Built once during schema bootstrap and handed
/// to the Statement Processor so `SELECT *` can be expanded without a
/// second round trip to SQLite.
#[derive(Debug, Clone)]
pub struct ColumnInfo {
    pub name: String,
    pub sql_type: String,
}

pub type Catalog = BTreeMap<String, Vec<ColumnInfo>>;

/// A column projected by a SELECT (spec §3 `FieldSource`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSource {
    /// Alias if aliased, else the bare/original column name.
    pub field_name: String,
    /// Alias of the table/view this column came from, or the bare table
    /// name when there's no alias.
    pub table_name: String,
    pub original_column_name: String,
    pub sql_type: Option<String>,
    /// Set when the projection item is an expression, not a bare column
    /// reference (e.g. `COUNT(*)`, `a.x || a.y`).
    pub expression: Option<String>,
    /// Inline `-- @@{...}` annotation on this projection item, if any.
    pub overrides: FieldAnnotationOverrides,
}

/// A SELECT statement (spec §3).
#[derive(Debug, Clone)]
pub struct SelectStatement {
    pub path: PathBuf,
    /// Rewritten SQL (`:name` -> `?`, collection `IN` -> `json_each`).
    pub sql: String,
    pub from_table: Option<String>,
    /// alias (or bare table name) -> table/view name.
    pub table_aliases: BTreeMap<String, String>,
    pub join_tables: Vec<String>,
    pub fields: Vec<FieldSource>,
    pub named_parameters: Vec<String>,
    /// Subset of `named_parameters` that bound an `IN :param` collection
    /// and were rewritten to `json_each` (spec §4.H `Params` Collection
    /// variant).
    pub collection_parameters: std::collections::BTreeSet<String>,
    pub parameter_cast_types: BTreeMap<String, String>,
    pub with_selects: Vec<SelectStatement>,
    pub annotations: StatementAnnotationOverrides,
}

/// INSERT / UPDATE / DELETE (spec §3).
#[derive(Debug, Clone)]
pub struct MutatingStatement {
    pub path: PathBuf,
    pub kind: MutatingKind,
    pub sql: String,
    pub table: String,
    pub named_parameters: Vec<String>,
    pub param_to_column: BTreeMap<String, AssociatedColumn>,
    pub with_selects: Vec<SelectStatement>,
    pub parameter_cast_types: BTreeMap<String, String>,
    pub has_returning: bool,
    pub returning_columns: Vec<String>,
    pub annotations: StatementAnnotationOverrides,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutatingKind {
    Insert,
    Update,
    Delete,
}

/// Any parsed query-file statement.
#[derive(Debug, Clone)]
pub enum Statement {
    Select(SelectStatement),
    Mutating(MutatingStatement),
}

impl Statement {
    pub fn path(&self) -> &std::path::Path {
        match self {
            Statement::Select(s) => &s.path,
            Statement::Mutating(m) => &m.path,
        }
    }

    pub fn annotations(&self) -> &StatementAnnotationOverrides {
        match self {
            Statement::Select(s) => &s.annotations,
            Statement::Mutating(m) => &m.annotations,
        }
    }
}
