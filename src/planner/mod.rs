//! Result Mapping Planner (spec §4.G): turns a resolved `SelectStatement`
//! into a `ResultMappingPlan` the emitter can read purely (spec §9: "the
//! planner is the single writer, emitters are pure readers").

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use heck::ToLowerCamelCase;

use crate::annotations::{FieldAnnotationOverrides, MappingType};
use crate::config::DatabaseConfig;
use crate::error::{GenError, GenResult};
use crate::resolver::AnnotationResolver;
use crate::statement::{FieldSource, SelectStatement};
use crate::typing::{self, AdapterRegistry, ResolvedType};

/// One constructor argument: a resolved type plus the provenance the
/// emitter prints as a trailing comment (spec §4.H).
#[derive(Debug, Clone)]
pub struct PlannedField {
    pub property_name: String,
    pub resolved: ResolvedType,
    pub source_alias: String,
    pub original_column_name: String,
    pub sql_type: Option<String>,
    pub adapter_from_sql_fn: Option<String>,
    pub adapter_to_sql_fn: Option<String>,
}

impl PlannedField {
    /// One-line provenance comment: SQL type, alias/table, original column,
    /// notNull (spec §4.H).
    pub fn provenance_comment(&self) -> String {
        format!(
            "{} {}.{}{}",
            self.sql_type.as_deref().unwrap_or("expr"),
            self.source_alias,
            self.original_column_name,
            if !self.resolved.nullable { " notNull" } else { "" }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DynamicRole {
    Entity,
    PerRow,
    Collection,
}

#[derive(Debug, Clone)]
pub struct DynamicFieldPlan {
    pub property_name: String,
    pub role: DynamicRole,
    pub property_type: String,
    pub source_alias: String,
    pub alias_prefix: Option<String>,
    /// Child-side identity column (already alias-prefix stripped), required
    /// for `Collection` mappings.
    pub collection_key: Option<String>,
    pub default_value: Option<String>,
    pub not_null: bool,
    pub children: Vec<PlannedField>,
}

#[derive(Debug, Clone, Default)]
pub struct ResultMappingPlan {
    pub regular_fields: Vec<PlannedField>,
    pub dynamic_fields: Vec<DynamicFieldPlan>,
    /// Lowercased `alias.column` keys pruned from `regular_fields` because a
    /// dynamic mapping consumes them (spec §4.G step 3 / testable property 5).
    pub skip_set: BTreeSet<String>,
    pub needs_joined_struct: bool,
    /// Property name of the statement-level `collectionKey` grouping field.
    pub grouping_key: Option<String>,
}

/// Build the plan for one SELECT. `namespace` is the enclosing namespace
/// name, used for adapter dedup grouping (spec §4.F).
pub fn plan_select(
    path: &Path,
    select: &SelectStatement,
    resolver: &AnnotationResolver,
    config: &DatabaseConfig,
    adapters: &mut AdapterRegistry,
    namespace: &str,
) -> GenResult<ResultMappingPlan> {
    let effective: Vec<(FieldAnnotationOverrides, &FieldSource)> = select
        .fields
        .iter()
        .map(|f| {
            let real_table = select.table_aliases.get(&f.table_name).cloned().unwrap_or_else(|| f.table_name.clone());
            let upstream = resolver.resolve(&real_table, &f.original_column_name);
            (upstream.merged_over(&f.overrides), f)
        })
        .collect();

    let dynamic_decls: Vec<(usize, FieldAnnotationOverrides)> = effective
        .iter()
        .enumerate()
        .filter(|(_, (ov, _))| ov.is_dynamic_field)
        .map(|(i, (ov, _))| (i, ov.clone()))
        .collect();

    // alias-prefix strictly prefix-free within the statement (spec §4.G validation).
    let prefixes: Vec<&str> = dynamic_decls
        .iter()
        .filter_map(|(_, ov)| ov.alias_prefix.as_deref())
        .collect();
    for (i, a) in prefixes.iter().enumerate() {
        for (j, b) in prefixes.iter().enumerate() {
            if i != j && b.starts_with(a) {
                return Err(GenError::AmbiguousAliasPrefix {
                    path: path.to_path_buf(),
                    prefix: a.to_string(),
                    conflicting: vec![a.to_string(), b.to_string()],
                });
            }
        }
    }

    let mut dynamic_fields = Vec::new();
    let mut skip_set: BTreeSet<String> = BTreeSet::new();

    for (idx, ov) in &dynamic_decls {
        let decl_field = effective[*idx].1;
        let source_alias = ov
            .source_table
            .clone()
            .unwrap_or_else(|| decl_field.table_name.clone());
        if !select.table_aliases.contains_key(&source_alias) {
            return Err(GenError::UnresolvedSourceTable {
                path: path.to_path_buf(),
                field: ov.property_name.clone().unwrap_or_else(|| decl_field.field_name.clone()),
                source_table: source_alias,
            });
        }

        let role = match ov.mapping_type {
            Some(MappingType::Entity) => DynamicRole::Entity,
            Some(MappingType::PerRow) => DynamicRole::PerRow,
            Some(MappingType::Collection) => DynamicRole::Collection,
            None => DynamicRole::PerRow,
        };

        let property_type = ov.property_type.clone().unwrap_or_else(|| {
            ov.property_name
                .clone()
                .unwrap_or_else(|| decl_field.field_name.clone())
                .to_lower_camel_case()
        });

        // Gather sibling columns belonging to this alias, strip alias prefix,
        // and mark them skipped from the parent (spec §4.G step 3/4). The
        // declaring field itself (the one the `dynamicField` annotation sits
        // on) is also a real projected column and belongs in `children` too,
        // but its own overrides describe the *dynamic field*, not its
        // column type, so it resolves with a blank override set.
        // When a dynamic field's source alias is the same alias the
        // statement's other regular columns are also drawn from (as with a
        // dynamic field inherited from a view, spec §4.G step 2, where the
        // whole projection comes through one alias), an `aliasPrefix` is the
        // only thing separating its children from plain sibling columns;
        // without a prefix, every same-alias column is assumed to belong
        // (the join-alias case this was originally written for).
        let mut children = Vec::new();
        for (field_idx, (ov2, f2)) in effective.iter().enumerate() {
            if f2.table_name != source_alias {
                continue;
            }
            if ov2.is_dynamic_field && field_idx != *idx {
                continue;
            }
            if let Some(prefix) = &ov.alias_prefix {
                if field_idx != *idx && !f2.field_name.starts_with(prefix.as_str()) {
                    continue;
                }
            }
            let skip_key = format!("{}.{}", f2.table_name.to_ascii_lowercase(), f2.original_column_name.to_ascii_lowercase());
            skip_set.insert(skip_key);

            let stripped_name = match &ov.alias_prefix {
                Some(prefix) => f2.field_name.strip_prefix(prefix.as_str()).unwrap_or(&f2.field_name).to_string(),
                None => f2.field_name.clone(),
            };
            let column_overrides = if field_idx == *idx {
                FieldAnnotationOverrides::default()
            } else {
                ov2.clone()
            };
            let resolved = typing::resolve_column_type(
                path,
                &f2.original_column_name,
                f2.sql_type.as_deref(),
                None,
                false,
                &column_overrides,
                config,
            )?;
            let (to_fn, from_fn) = if resolved.needs_adapter {
                let spec = adapters.register(namespace, &f2.original_column_name, f2.sql_type.as_deref().unwrap_or("TEXT"), &resolved.kotlin_type, resolved.nullable);
                (Some(spec.to_sql_fn), Some(spec.from_sql_fn))
            } else {
                (None, None)
            };
            children.push(PlannedField {
                property_name: stripped_name.to_lower_camel_case(),
                resolved,
                source_alias: f2.table_name.clone(),
                original_column_name: f2.original_column_name.clone(),
                sql_type: f2.sql_type.clone(),
                adapter_from_sql_fn: from_fn,
                adapter_to_sql_fn: to_fn,
            });
        }

        let collection_key = if role == DynamicRole::Collection {
            let raw = ov.collection_key.clone().ok_or_else(|| GenError::MissingCollectionKey {
                path: path.to_path_buf(),
                field: ov.property_name.clone().unwrap_or_else(|| decl_field.field_name.clone()),
            })?;
            let stripped = match &ov.alias_prefix {
                Some(prefix) => raw.strip_prefix(prefix.as_str()).unwrap_or(&raw).to_string(),
                None => raw.clone(),
            };
            if !children.iter().any(|c| c.original_column_name.eq_ignore_ascii_case(&stripped) || c.property_name.eq_ignore_ascii_case(&stripped.to_lower_camel_case())) {
                return Err(GenError::MalformedAnnotation {
                    site: path.display().to_string(),
                    message: format!("collectionKey `{raw}` does not match any projected child column"),
                });
            }
            Some(stripped)
        } else {
            None
        };

        dynamic_fields.push(DynamicFieldPlan {
            property_name: ov.property_name.clone().unwrap_or_else(|| decl_field.field_name.clone()),
            role,
            property_type,
            source_alias,
            alias_prefix: ov.alias_prefix.clone(),
            collection_key,
            default_value: ov.default_value.clone(),
            not_null: ov.not_null == Some(true),
            children,
        });
    }

    // Regular fields: everything not itself a dynamic-field declaration and
    // not swept into a dynamic field's skip set.
    let primary_alias = select.from_table.clone().unwrap_or_default();
    let mut regular_fields = Vec::new();
    for (ov, f) in &effective {
        if ov.is_dynamic_field {
            continue;
        }
        let key = format!("{}.{}", f.table_name.to_ascii_lowercase(), f.original_column_name.to_ascii_lowercase());
        if skip_set.contains(&key) {
            continue;
        }
        let effective_primary = f.table_name == primary_alias
            || ov.source_table.as_deref().map(|s| s == primary_alias).unwrap_or(false);
        let resolved = typing::resolve_column_type(
            path,
            &f.original_column_name,
            f.sql_type.as_deref(),
            None,
            effective_primary,
            ov,
            config,
        )?;
        let (to_fn, from_fn) = if resolved.needs_adapter {
            let spec = adapters.register(namespace, &f.original_column_name, f.sql_type.as_deref().unwrap_or("TEXT"), &resolved.kotlin_type, resolved.nullable);
            (Some(spec.to_sql_fn), Some(spec.from_sql_fn))
        } else {
            (None, None)
        };
        regular_fields.push(PlannedField {
            property_name: ov.property_name.clone().unwrap_or_else(|| f.field_name.clone()).to_lower_camel_case(),
            resolved,
            source_alias: f.table_name.clone(),
            original_column_name: f.original_column_name.clone(),
            sql_type: f.sql_type.clone(),
            adapter_from_sql_fn: from_fn,
            adapter_to_sql_fn: to_fn,
        });
    }

    let needs_joined_struct = dynamic_fields.iter().any(|d| d.role == DynamicRole::Collection);

    // A collection mapping groups `ResultJoined` rows by a statement-level
    // `collectionKey` (spec §3); without one, every joined row would form
    // its own group and children would never coalesce.
    let grouping_key = match select.annotations.collection_key.as_deref() {
        Some(raw) => {
            let field = effective
                .iter()
                .find(|(_, f)| f.field_name.eq_ignore_ascii_case(raw))
                .ok_or_else(|| GenError::MissingCollectionKey {
                    path: path.to_path_buf(),
                    field: raw.to_string(),
                })?;
            Some(format!(
                "{}_{}",
                field.1.table_name.to_ascii_lowercase(),
                field.1.field_name.to_lower_camel_case()
            ))
        }
        None if needs_joined_struct => {
            let field = dynamic_fields
                .iter()
                .find(|d| d.role == DynamicRole::Collection)
                .map(|d| d.property_name.clone())
                .unwrap_or_else(|| "collection".to_string());
            return Err(GenError::MissingCollectionKey {
                path: path.to_path_buf(),
                field,
            });
        }
        None => None,
    };

    Ok(ResultMappingPlan {
        regular_fields,
        dynamic_fields,
        skip_set,
        needs_joined_struct,
        grouping_key,
    })
}
