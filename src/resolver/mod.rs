//! Field Annotation Resolver (spec §4.E): flattens annotations across
//! tables and chains of views so any `(tableOrView, field)` pair resolves
//! to one effective [`FieldAnnotationOverrides`].
//!
//! Precedence: statement field > direct column > referenced view field >
//! upstream table (`spec.md` §4.E). The direct/statement-field distinction
//! is handled by the caller (the planner merges a field's own inline
//! override on top of whatever this resolver returns for its source
//! column); this module owns steps 1-3 of the lookup algorithm itself.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};

use crate::annotations::FieldAnnotationOverrides;
use crate::schema::{CreateTableModel, CreateViewModel};

pub struct AnnotationResolver<'a> {
    tables: &'a BTreeMap<String, CreateTableModel>,
    views: &'a BTreeMap<String, CreateViewModel>,
    cache: RefCell<BTreeMap<(String, String), FieldAnnotationOverrides>>,
}

impl<'a> AnnotationResolver<'a> {
    pub fn new(tables: &'a BTreeMap<String, CreateTableModel>, views: &'a BTreeMap<String, CreateViewModel>) -> Self {
        Self {
            tables,
            views,
            cache: RefCell::new(BTreeMap::new()),
        }
    }

    /// Resolve the effective annotations for `field` on `object` (a table
    /// or view name, case-insensitive). Memoized per run.
    pub fn resolve(&self, object: &str, field: &str) -> FieldAnnotationOverrides {
        let key = (object.to_ascii_lowercase(), field.to_ascii_lowercase());
        if let Some(cached) = self.cache.borrow().get(&key) {
            return cached.clone();
        }
        let mut visited = BTreeSet::new();
        let result = self.resolve_inner(object, field, &mut visited);
        self.cache.borrow_mut().insert(key, result.clone());
        result
    }

    fn resolve_inner(
        &self,
        object: &str,
        field: &str,
        visited: &mut BTreeSet<(String, String)>,
    ) -> FieldAnnotationOverrides {
        let key = (object.to_ascii_lowercase(), field.to_ascii_lowercase());
        if visited.contains(&key) {
            return FieldAnnotationOverrides::default();
        }
        visited.insert(key.clone());

        if let Some(table) = self.tables.get(&key.0) {
            return table.column(field).map(|c| c.annotations.clone()).unwrap_or_default();
        }

        let Some(view) = self.views.get(&key.0) else {
            return FieldAnnotationOverrides::default();
        };

        // Step 1: direct hit on the view's own declared field annotation.
        let own = view
            .fields
            .iter()
            .find(|f| f.source.field_name.eq_ignore_ascii_case(field))
            .map(|f| f.annotations.clone())
            .unwrap_or_default();

        // A view's own `dynamicField` declaration (spec §4.G step 2) names
        // a `sourceTable` alias local to the view's SELECT, meaningless to
        // whatever statement queries the view. From the consumer's side the
        // view itself is the source, so drop that inner alias here; the
        // planner's own existing fallback (declaring field's own table
        // alias) then resolves to the consuming statement's alias for this
        // view.
        let own = if own.is_dynamic_field {
            view.dynamic_fields
                .iter()
                .find(|d| d.declared_on_field.eq_ignore_ascii_case(field))
                .map(|d| FieldAnnotationOverrides {
                    source_table: None,
                    ..d.overrides.clone()
                })
                .unwrap_or(own)
        } else {
            own
        };
        if !own.is_empty() {
            return own;
        }

        // Step 2: recurse via the view field's own source alias/column.
        if let Some(vf) = view.fields.iter().find(|f| f.source.field_name.eq_ignore_ascii_case(field)) {
            if let Some(target) = view.select.table_aliases.get(&vf.source.table_name) {
                let upstream = self.resolve_inner(target, &vf.source.original_column_name, visited);
                if !upstream.is_empty() {
                    return upstream;
                }
            }
        }

        // Step 3: fallback, try every table alias the view draws from.
        for target in view.select.table_aliases.values() {
            let upstream = self.resolve_inner(target, field, visited);
            if !upstream.is_empty() {
                return upstream;
            }
        }

        FieldAnnotationOverrides::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Column, DynamicField, TableAnnotations, ViewAnnotations, ViewField};
    use crate::statement::{FieldSource, SelectStatement};
    use std::path::PathBuf;

    fn table_with_column(name: &str, col: &str, overrides: FieldAnnotationOverrides) -> CreateTableModel {
        CreateTableModel {
            path: PathBuf::from("schema.sql"),
            name: name.to_string(),
            sql: String::new(),
            columns: vec![Column {
                name: col.to_string(),
                sql_type: "TEXT".to_string(),
                not_null: false,
                primary_key: false,
                auto_increment: false,
                unique: false,
                annotations: overrides,
            }],
            annotations: TableAnnotations::default(),
        }
    }

    fn bare_select(from_table: &str, alias: &str, field: &str) -> SelectStatement {
        let mut table_aliases = BTreeMap::new();
        table_aliases.insert(alias.to_string(), from_table.to_string());
        SelectStatement {
            path: PathBuf::from("view.sql"),
            sql: String::new(),
            from_table: Some(alias.to_string()),
            table_aliases,
            join_tables: Vec::new(),
            fields: vec![FieldSource {
                field_name: field.to_string(),
                table_name: alias.to_string(),
                original_column_name: field.to_string(),
                sql_type: None,
                expression: None,
                overrides: FieldAnnotationOverrides::default(),
            }],
            named_parameters: Vec::new(),
            collection_parameters: BTreeSet::new(),
            parameter_cast_types: BTreeMap::new(),
            with_selects: Vec::new(),
            annotations: Default::default(),
        }
    }

    #[test]
    fn resolves_direct_table_column() {
        let mut tables = BTreeMap::new();
        let overrides = FieldAnnotationOverrides {
            not_null: Some(true),
            ..Default::default()
        };
        tables.insert("person".to_string(), table_with_column("person", "name", overrides.clone()));
        let views = BTreeMap::new();
        let resolver = AnnotationResolver::new(&tables, &views);
        assert_eq!(resolver.resolve("person", "name").not_null, Some(true));
    }

    #[test]
    fn recurses_through_view_to_upstream_table() {
        let mut tables = BTreeMap::new();
        let overrides = FieldAnnotationOverrides {
            property_type: Some("LocalDate".to_string()),
            adapter: true,
            ..Default::default()
        };
        tables.insert(
            "person".to_string(),
            table_with_column("person", "birth_date", overrides),
        );

        let select = bare_select("person", "p", "birth_date");
        let view = CreateViewModel {
            path: PathBuf::from("view.sql"),
            name: "person_view".to_string(),
            sql: String::new(),
            column_names: None,
            fields: vec![ViewField {
                source: select.fields[0].clone(),
                annotations: FieldAnnotationOverrides::default(),
            }],
            select,
            annotations: ViewAnnotations::default(),
            dynamic_fields: Vec::new(),
        };
        let mut views = BTreeMap::new();
        views.insert("person_view".to_string(), view);

        let resolver = AnnotationResolver::new(&tables, &views);
        let resolved = resolver.resolve("person_view", "birth_date");
        assert_eq!(resolved.property_type.as_deref(), Some("LocalDate"));
        assert!(resolved.adapter);
    }

    #[test]
    fn unknown_object_returns_default() {
        let tables = BTreeMap::new();
        let views = BTreeMap::new();
        let resolver = AnnotationResolver::new(&tables, &views);
        assert!(resolver.resolve("nope", "x").is_empty());
    }

    #[test]
    fn view_dynamic_field_is_inherited_with_inner_alias_cleared() {
        let tables = BTreeMap::new();
        let select = bare_select("address", "a", "address__city");
        let declared = FieldAnnotationOverrides {
            is_dynamic_field: true,
            property_name: Some("address".to_string()),
            source_table: Some("a".to_string()),
            alias_prefix: Some("address__".to_string()),
            ..Default::default()
        };
        let view = CreateViewModel {
            path: PathBuf::from("view.sql"),
            name: "person_view".to_string(),
            sql: String::new(),
            column_names: None,
            fields: vec![ViewField {
                source: select.fields[0].clone(),
                annotations: declared.clone(),
            }],
            select,
            annotations: ViewAnnotations::default(),
            dynamic_fields: vec![DynamicField {
                property_name: "address".to_string(),
                overrides: declared,
                alias_path: vec!["a".to_string()],
                declared_on_field: "address__city".to_string(),
            }],
        };
        let mut views = BTreeMap::new();
        views.insert("person_view".to_string(), view);

        let resolver = AnnotationResolver::new(&tables, &views);
        let resolved = resolver.resolve("person_view", "address__city");
        assert!(resolved.is_dynamic_field);
        assert_eq!(resolved.source_table, None, "view-internal alias must not leak to the consumer");
        assert_eq!(resolved.alias_prefix.as_deref(), Some("address__"));
    }
}
