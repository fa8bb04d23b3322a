//! Typed annotation records (spec §3, §9 "replace heterogeneous maps").

use crate::error::GenError;

use super::parser::{parse_annotation_entries, AnnotationValue};

/// `mappingType` on a field-level annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingType {
    Entity,
    PerRow,
    Collection,
}

impl MappingType {
    fn parse(s: &str, site: &str) -> Result<Self, GenError> {
        match s {
            "entity" => Ok(MappingType::Entity),
            "perRow" => Ok(MappingType::PerRow),
            "collection" => Ok(MappingType::Collection),
            other => Err(GenError::MalformedAnnotation {
                site: site.to_string(),
                message: format!("unknown mappingType `{other}` (expected entity, perRow, or collection)"),
            }),
        }
    }
}

/// Per-`(tableOrView, field)` override set. Shared shape for DDL column
/// comments and SELECT projection-item comments (spec §3 data model).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldAnnotationOverrides {
    pub field: Option<String>,
    pub property_name: Option<String>,
    pub property_type: Option<String>,
    pub adapter: bool,
    pub not_null: Option<bool>,
    pub nullable: Option<bool>,
    pub default_value: Option<String>,
    pub is_dynamic_field: bool,
    pub mapping_type: Option<MappingType>,
    pub source_table: Option<String>,
    pub alias_prefix: Option<String>,
    pub collection_key: Option<String>,
}

impl FieldAnnotationOverrides {
    pub fn is_empty(&self) -> bool {
        *self == FieldAnnotationOverrides::default()
    }

    /// Merge `other` on top of `self`: any field `other` sets wins. Used
    /// when flattening annotations across a view-inheritance chain (§4.E).
    pub fn merged_over(&self, other: &FieldAnnotationOverrides) -> FieldAnnotationOverrides {
        FieldAnnotationOverrides {
            field: other.field.clone().or_else(|| self.field.clone()),
            property_name: other.property_name.clone().or_else(|| self.property_name.clone()),
            property_type: other.property_type.clone().or_else(|| self.property_type.clone()),
            adapter: other.adapter || self.adapter,
            not_null: other.not_null.or(self.not_null),
            nullable: other.nullable.or(self.nullable),
            default_value: other.default_value.clone().or_else(|| self.default_value.clone()),
            is_dynamic_field: other.is_dynamic_field || self.is_dynamic_field,
            mapping_type: other.mapping_type.or(self.mapping_type),
            source_table: other.source_table.clone().or_else(|| self.source_table.clone()),
            alias_prefix: other.alias_prefix.clone().or_else(|| self.alias_prefix.clone()),
            collection_key: other.collection_key.clone().or_else(|| self.collection_key.clone()),
        }
    }

    pub fn from_body(body: &str, site: &str) -> Result<Self, GenError> {
        let entries = parse_annotation_entries(body, site)?;
        Self::from_entries(&entries, site)
    }

    pub fn from_entries(entries: &[(String, AnnotationValue)], site: &str) -> Result<Self, GenError> {
        let mut out = FieldAnnotationOverrides::default();
        for (key, value) in entries {
            match key.as_str() {
                "field" => out.field = Some(require_str(value, key, site)?.to_string()),
                "propertyName" => out.property_name = Some(require_str(value, key, site)?.to_string()),
                "propertyType" => out.property_type = Some(require_str(value, key, site)?.to_string()),
                "adapter" => out.adapter = value.as_bool().unwrap_or(true),
                "notNull" => out.not_null = Some(value.as_bool().unwrap_or(true)),
                "nullable" => out.nullable = Some(value.as_bool().unwrap_or(true)),
                "defaultValue" => out.default_value = Some(require_str(value, key, site)?.to_string()),
                "isDynamicField" => out.is_dynamic_field = value.as_bool().unwrap_or(true),
                // `dynamicField=<name>` (as used throughout spec.md's own
                // examples, e.g. S4/S5) declares the field dynamic *and*
                // names its property in one annotation; `isDynamicField`
                // is the bare boolean form for a field whose name is
                // already fixed by its SQL alias.
                "dynamicField" => {
                    out.is_dynamic_field = true;
                    out.property_name = Some(require_str(value, key, site)?.to_string());
                }
                "mappingType" => {
                    out.mapping_type = Some(MappingType::parse(require_str(value, key, site)?, site)?)
                }
                "sourceTable" => out.source_table = Some(require_str(value, key, site)?.to_string()),
                "aliasPrefix" => out.alias_prefix = Some(require_str(value, key, site)?.to_string()),
                "collectionKey" => out.collection_key = Some(require_str(value, key, site)?.to_string()),
                other => {
                    return Err(GenError::UnknownAnnotation {
                        key: other.to_string(),
                        site: site.to_string(),
                    })
                }
            }
        }
        Ok(out)
    }
}

/// Statement-level overrides on a SELECT (spec §3).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatementAnnotationOverrides {
    pub query_result: Option<String>,
    pub shared_result: Option<String>,
    pub implements: Option<String>,
    pub exclude_override_fields: Vec<String>,
    pub name: Option<String>,
    pub property_name_generator: Option<String>,
    pub collection_key: Option<String>,
    pub map_to: Option<String>,
    pub debug: bool,
}

impl StatementAnnotationOverrides {
    pub fn from_body(body: &str, site: &str) -> Result<Self, GenError> {
        let entries = parse_annotation_entries(body, site)?;
        Self::from_entries(&entries, site)
    }

    pub fn from_entries(entries: &[(String, AnnotationValue)], site: &str) -> Result<Self, GenError> {
        let mut out = StatementAnnotationOverrides::default();
        for (key, value) in entries {
            match key.as_str() {
                "queryResult" => out.query_result = Some(require_str(value, key, site)?.to_string()),
                "sharedResult" => out.shared_result = Some(require_str(value, key, site)?.to_string()),
                "implements" => out.implements = Some(require_str(value, key, site)?.to_string()),
                "excludeOverrideFields" => {
                    out.exclude_override_fields = value
                        .as_list()
                        .map(|l| l.to_vec())
                        .unwrap_or_else(|| vec![require_str(value, key, site).unwrap_or_default().to_string()]);
                }
                "name" => out.name = Some(require_str(value, key, site)?.to_string()),
                "propertyNameGenerator" => {
                    out.property_name_generator = Some(require_str(value, key, site)?.to_string())
                }
                "collectionKey" => out.collection_key = Some(require_str(value, key, site)?.to_string()),
                "mapTo" => out.map_to = Some(require_str(value, key, site)?.to_string()),
                "debug" => out.debug = value.as_bool().unwrap_or(true),
                other => {
                    return Err(GenError::UnknownAnnotation {
                        key: other.to_string(),
                        site: site.to_string(),
                    })
                }
            }
        }
        // Open Question (see DESIGN.md): `sharedResult` is a legacy synonym
        // for `queryResult`; if both appear and disagree, that's an error
        // rather than a silent pick.
        if let (Some(q), Some(s)) = (&out.query_result, &out.shared_result) {
            if q != s {
                return Err(GenError::MalformedAnnotation {
                    site: site.to_string(),
                    message: format!("queryResult `{q}` and sharedResult `{s}` disagree"),
                });
            }
        }
        Ok(out)
    }

    /// `queryResult`, falling back to the legacy `sharedResult` alias.
    pub fn result_name(&self) -> Option<&str> {
        self.query_result.as_deref().or(self.shared_result.as_deref())
    }
}

fn require_str<'a>(value: &'a AnnotationValue, key: &str, site: &str) -> Result<&'a str, GenError> {
    value.as_str().ok_or_else(|| GenError::MalformedAnnotation {
        site: site.to_string(),
        message: format!("`{key}` requires a string/identifier value"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_field_key() {
        let err = FieldAnnotationOverrides::from_body("bogusKey=1", "x").unwrap_err();
        assert!(matches!(err, GenError::UnknownAnnotation { .. }));
    }

    #[test]
    fn field_overrides_parse() {
        let f = FieldAnnotationOverrides::from_body(
            "propertyType=LocalDate, adapter, notNull",
            "x",
        )
        .unwrap();
        assert_eq!(f.property_type.as_deref(), Some("LocalDate"));
        assert!(f.adapter);
        assert_eq!(f.not_null, Some(true));
    }

    #[test]
    fn dynamic_field_collection_mapping_parses() {
        let f = FieldAnnotationOverrides::from_body(
            "dynamicField=addresses, mappingType=collection, collectionKey=address__id, defaultValue=\"listOf()\", notNull",
            "x",
        )
        .unwrap();
        assert!(f.is_dynamic_field);
        assert_eq!(f.property_name.as_deref(), Some("addresses"));
        assert_eq!(f.mapping_type, Some(MappingType::Collection));
        assert_eq!(f.collection_key.as_deref(), Some("address__id"));
        assert_eq!(f.not_null, Some(true));
    }

    #[test]
    fn shared_result_legacy_alias() {
        let s = StatementAnnotationOverrides::from_body("sharedResult=Row", "x").unwrap();
        assert_eq!(s.result_name(), Some("Row"));
    }

    #[test]
    fn conflicting_result_names_fail() {
        let err = StatementAnnotationOverrides::from_body(
            "queryResult=Row, sharedResult=OtherRow",
            "x",
        )
        .unwrap_err();
        assert!(matches!(err, GenError::MalformedAnnotation { .. }));
    }

    #[test]
    fn merge_prefers_later() {
        let base = FieldAnnotationOverrides {
            not_null: Some(false),
            property_type: Some("String".into()),
            ..Default::default()
        };
        let over = FieldAnnotationOverrides {
            not_null: Some(true),
            ..Default::default()
        };
        let merged = base.merged_over(&over);
        assert_eq!(merged.not_null, Some(true));
        assert_eq!(merged.property_type.as_deref(), Some("String"));
    }
}
