//! Schema-level model (spec §3): `CreateTable` / `CreateView` plus the
//! column metadata the Schema Inspector reads back from SQLite.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::annotations::FieldAnnotationOverrides;
use crate::statement::{FieldSource, SelectStatement};

/// A DDL column, as introspected via `PRAGMA table_info` plus whatever
/// annotation comment sat above/after it in the schema file.
#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub sql_type: String,
    pub not_null: bool,
    pub primary_key: bool,
    pub auto_increment: bool,
    pub unique: bool,
    pub annotations: FieldAnnotationOverrides,
}

/// Per-column overrides declared directly on a `CREATE TABLE`.
#[derive(Debug, Clone, Default)]
pub struct TableAnnotations {
    pub column_overrides: BTreeMap<String, FieldAnnotationOverrides>,
}

#[derive(Debug, Clone)]
pub struct CreateTableModel {
    pub path: PathBuf,
    pub name: String,
    pub sql: String,
    pub columns: Vec<Column>,
    pub annotations: TableAnnotations,
}

impl CreateTableModel {
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }
}

/// One of a view's own projected fields, after (potential) annotation.
#[derive(Debug, Clone)]
pub struct ViewField {
    pub source: FieldSource,
    pub annotations: FieldAnnotationOverrides,
}

/// A dynamic field declared on a view's own SELECT (spec §4.G step 2).
#[derive(Debug, Clone)]
pub struct DynamicField {
    pub property_name: String,
    pub overrides: FieldAnnotationOverrides,
    /// Alias path from the view's own perspective, e.g. `["a"]` for a
    /// `sourceTable=a` dynamic field declared directly on this view.
    pub alias_path: Vec<String>,
    /// The view's own projected field name the annotation sat on, so a
    /// consuming statement selecting that same column (directly or through
    /// a chain of views) can look this declaration up by name.
    pub declared_on_field: String,
}

#[derive(Debug, Clone, Default)]
pub struct ViewAnnotations {
    pub field_overrides: BTreeMap<String, FieldAnnotationOverrides>,
}

#[derive(Debug, Clone)]
pub struct CreateViewModel {
    pub path: PathBuf,
    pub name: String,
    pub sql: String,
    pub column_names: Option<Vec<String>>,
    pub select: SelectStatement,
    pub annotations: ViewAnnotations,
    pub fields: Vec<ViewField>,
    pub dynamic_fields: Vec<DynamicField>,
}

/// Any schema-defined object the resolver/planner can look a field up on.
#[derive(Debug, Clone)]
pub enum SchemaObject {
    Table(CreateTableModel),
    View(CreateViewModel),
}

impl SchemaObject {
    pub fn name(&self) -> &str {
        match self {
            SchemaObject::Table(t) => &t.name,
            SchemaObject::View(v) => &v.name,
        }
    }

    pub fn is_view(&self) -> bool {
        matches!(self, SchemaObject::View(_))
    }
}
