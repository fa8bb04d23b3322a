//! Type Mapping & Adapter Config (spec §4.F): SQL primitive -> Kotlin type,
//! nullability resolution, and adapter naming/deduplication.

use std::collections::BTreeMap;

use heck::{ToLowerCamelCase, ToUpperCamelCase};

use crate::annotations::FieldAnnotationOverrides;
use crate::config::DatabaseConfig;
use crate::error::{GenError, GenResult};

/// A fully resolved column type, ready for the emitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedType {
    pub kotlin_type: String,
    pub nullable: bool,
    pub needs_adapter: bool,
}

impl ResolvedType {
    /// The type as it appears in generated Kotlin source, e.g. `Long?`.
    pub fn rendered(&self) -> String {
        if self.nullable {
            format!("{}?", self.kotlin_type)
        } else {
            self.kotlin_type.clone()
        }
    }
}

/// A user-supplied adapter function pair (spec §4.F adapter naming).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct AdapterSpec {
    pub namespace: String,
    pub to_sql_fn: String,
    pub from_sql_fn: String,
    pub input_type: String,
    pub output_type: String,
}

/// Dedup bucket for adapters, grouped by `(namespace, fn name, input, output)`
/// per spec §4.F.
#[derive(Debug, Clone, Default)]
pub struct AdapterRegistry {
    by_key: BTreeMap<(String, String, String, String), AdapterSpec>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or reuse) the adapter pair for `column_name` in `namespace`,
    /// binding SQL type `sql_primitive` to `kotlin_type`. Returns the
    /// canonical spec (existing entry if already registered).
    pub fn register(
        &mut self,
        namespace: &str,
        column_name: &str,
        sql_primitive: &str,
        kotlin_type: &str,
        nullable: bool,
    ) -> AdapterSpec {
        let to_sql_fn = format!("{}ToSqlValue", column_name.to_lower_camel_case());
        let from_sql_fn = format!("sqlValueTo{}", column_name.to_upper_camel_case());
        let input_type = if nullable { format!("{kotlin_type}?") } else { kotlin_type.to_string() };
        let output_type = if nullable {
            format!("{sql_primitive}?")
        } else {
            sql_primitive.to_string()
        };
        let key = (namespace.to_string(), from_sql_fn.clone(), input_type.clone(), output_type.clone());
        self.by_key
            .entry(key)
            .or_insert_with(|| AdapterSpec {
                namespace: namespace.to_string(),
                to_sql_fn: to_sql_fn.clone(),
                from_sql_fn: from_sql_fn.clone(),
                input_type,
                output_type,
            })
            .clone()
    }

    pub fn by_namespace(&self, namespace: &str) -> Vec<&AdapterSpec> {
        self.by_key.values().filter(|a| a.namespace == namespace).collect()
    }
}

/// Normalize a declared SQL type to its primitive family (strips length
/// modifiers like `VARCHAR(255)`).
fn normalize_sql_type(sql_type: &str) -> String {
    let base = sql_type.split('(').next().unwrap_or(sql_type).trim();
    base.to_ascii_uppercase()
}

/// Map a SQL type to its built-in Kotlin primitive, honoring per-database
/// config overrides first.
pub fn map_primitive(sql_type: &str, config: &DatabaseConfig) -> Option<&'static str> {
    let base = normalize_sql_type(sql_type);
    if config.type_overrides.contains_key(&base) {
        // Config overrides supply their own type name, handled by the
        // caller (resolve_column_type) since this function returns a
        // `'static` built-in; see that function for the override path.
        return None;
    }
    match base.as_str() {
        "INTEGER" | "INT" | "BIGINT" | "SMALLINT" | "TINYINT" => Some("Long"),
        "REAL" | "DOUBLE" | "DOUBLE PRECISION" | "FLOAT" => Some("Double"),
        "TEXT" | "VARCHAR" | "CHARACTER" | "CHAR" | "CLOB" | "NCHAR" | "NVARCHAR" => Some("String"),
        "BLOB" => Some("ByteArray"),
        "BOOLEAN" | "BOOL" => Some("Boolean"),
        // NUMERIC keeps full precision as a string unless the author
        // annotates a narrower propertyType explicitly.
        "NUMERIC" | "DECIMAL" => Some("String"),
        _ => None,
    }
}

/// Resolve the nullability of a column/expression (spec §4.F, testable
/// property 7). `column_not_null` is `None` for expressions (default
/// nullable). `effective_primary` is true when the field's source alias is
/// the SELECT's primary alias, or an explicit `sourceTable` override names
/// it.
pub fn resolve_nullability(
    column_not_null: Option<bool>,
    effective_primary: bool,
    overrides: &FieldAnnotationOverrides,
) -> bool {
    if overrides.not_null == Some(true) {
        return false;
    }
    if overrides.nullable == Some(true) {
        return true;
    }
    let base_nullable = column_not_null.map(|nn| !nn).unwrap_or(true);
    if !effective_primary {
        return true;
    }
    base_nullable
}

/// Resolve the full type (host type, nullability, adapter requirement) for
/// one field.
pub fn resolve_column_type(
    path: &std::path::Path,
    column_name: &str,
    sql_type: Option<&str>,
    column_not_null: Option<bool>,
    effective_primary: bool,
    overrides: &FieldAnnotationOverrides,
    config: &DatabaseConfig,
) -> GenResult<ResolvedType> {
    let nullable = resolve_nullability(column_not_null, effective_primary, overrides);
    let needs_adapter = overrides.adapter || overrides.property_type.as_deref().is_some_and(|t| !is_builtin(t));

    if let Some(explicit) = &overrides.property_type {
        return Ok(ResolvedType {
            kotlin_type: explicit.clone(),
            nullable,
            needs_adapter,
        });
    }

    let base = sql_type.map(normalize_sql_type);
    if let Some(base) = &base {
        if let Some(custom) = config.type_overrides.get(base) {
            return Ok(ResolvedType {
                kotlin_type: custom.clone(),
                nullable,
                needs_adapter: needs_adapter || overrides.adapter,
            });
        }
    }

    let Some(sql_type) = sql_type else {
        return Err(GenError::TypeResolution {
            path: path.to_path_buf(),
            column: column_name.to_string(),
        });
    };
    let Some(builtin) = map_primitive(sql_type, config) else {
        return Err(GenError::TypeResolution {
            path: path.to_path_buf(),
            column: column_name.to_string(),
        });
    };
    Ok(ResolvedType {
        kotlin_type: builtin.to_string(),
        nullable,
        needs_adapter,
    })
}

fn is_builtin(type_name: &str) -> bool {
    matches!(type_name, "Long" | "Double" | "String" | "ByteArray" | "Boolean")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> DatabaseConfig {
        DatabaseConfig {
            root: "db".into(),
            output: "gen".into(),
            package: "a.b".into(),
            schema_snapshot: None,
            debug: false,
            type_overrides: BTreeMap::new(),
        }
    }

    #[test]
    fn maps_builtin_primitives() {
        assert_eq!(map_primitive("INTEGER", &config()), Some("Long"));
        assert_eq!(map_primitive("VARCHAR(255)", &config()), Some("String"));
        assert_eq!(map_primitive("REAL", &config()), Some("Double"));
    }

    #[test]
    fn not_null_primary_is_non_null_no_check() {
        let overrides = FieldAnnotationOverrides {
            not_null: Some(true),
            ..Default::default()
        };
        assert!(!resolve_nullability(Some(false), true, &overrides));
    }

    #[test]
    fn joined_alias_widens_to_nullable() {
        let overrides = FieldAnnotationOverrides::default();
        assert!(resolve_nullability(Some(true), false, &overrides));
    }

    #[test]
    fn expression_defaults_nullable() {
        let overrides = FieldAnnotationOverrides::default();
        assert!(resolve_nullability(None, true, &overrides));
    }

    #[test]
    fn adapter_required_when_property_type_is_custom() {
        let path = std::path::Path::new("q.sql");
        let overrides = FieldAnnotationOverrides {
            property_type: Some("LocalDate".to_string()),
            adapter: true,
            ..Default::default()
        };
        let resolved = resolve_column_type(path, "birth_date", Some("TEXT"), Some(true), true, &overrides, &config()).unwrap();
        assert_eq!(resolved.kotlin_type, "LocalDate");
        assert!(resolved.needs_adapter);
        assert!(!resolved.nullable);
    }

    #[test]
    fn adapter_registry_dedups_by_key() {
        let mut registry = AdapterRegistry::new();
        let a = registry.register("Person", "birth_date", "TEXT", "LocalDate", true);
        let b = registry.register("Person", "birth_date", "TEXT", "LocalDate", true);
        assert_eq!(a, b);
        assert_eq!(registry.by_namespace("Person").len(), 1);
        assert_eq!(a.from_sql_fn, "sqlValueToBirthDate");
        assert_eq!(a.to_sql_fn, "birthDateToSqlValue");
    }

    #[test]
    fn unmappable_type_without_property_type_errors() {
        let path = std::path::Path::new("q.sql");
        let overrides = FieldAnnotationOverrides::default();
        let err = resolve_column_type(path, "payload", Some("JSONB"), Some(false), true, &overrides, &config()).unwrap_err();
        assert!(matches!(err, GenError::TypeResolution { .. }));
    }
}
