//! SQL rewriting: `:name` -> `?`, and `IN :collection` -> the
//! `json_each` expansion (spec §4.D, testable property 6).

use std::collections::{BTreeMap, BTreeSet};

use super::model::AssociatedColumn;
use super::sql_text::{find_named_params, mask};

/// Names of every parameter that appears in an `IN :param` position,
/// without needing a param -> column association (spec §4.D, used for the
/// SELECT side where `SelectStatement` doesn't track per-param columns).
pub fn collection_param_names(sql: &str) -> BTreeSet<String> {
    let masked = mask(sql);
    find_named_params(sql)
        .into_iter()
        .filter(|occ| preceded_by_in(&masked, occ.offset))
        .map(|occ| occ.name)
        .collect()
}

/// Result of rewriting a statement's SQL for parameter binding.
pub struct Rewritten {
    pub sql: String,
    /// Parameter names in first-`?`-appearance order, deduplicated.
    pub named_parameters: Vec<String>,
}

/// Rewrite `sql`, consulting `collection_params` (names known to need the
/// `IN :param` -> `json_each` expansion) for each occurrence.
pub fn rewrite_params(sql: &str, collection_params: &std::collections::BTreeSet<String>) -> Rewritten {
    let masked = mask(sql);
    let occurrences = find_named_params(sql);

    let mut out = String::with_capacity(sql.len());
    let mut last = 0usize;
    let mut seen_order: Vec<String> = Vec::new();
    let mut seen_set: BTreeMap<String, ()> = BTreeMap::new();

    for occ in &occurrences {
        out.push_str(&sql[last..occ.offset]);
        let is_collection = collection_params.contains(&occ.name) && preceded_by_in(&masked, occ.offset);
        if is_collection {
            out.push_str("(SELECT value FROM json_each(?))");
        } else {
            out.push('?');
        }
        if !seen_set.contains_key(&occ.name) {
            seen_set.insert(occ.name.clone(), ());
            seen_order.push(occ.name.clone());
        }
        last = occ.offset + occ.len;
    }
    out.push_str(&sql[last..]);

    Rewritten {
        sql: out,
        named_parameters: seen_order,
    }
}

fn preceded_by_in(masked: &str, offset: usize) -> bool {
    let before = masked[..offset].trim_end();
    let lower = before.to_ascii_lowercase();
    if let Some(stripped) = lower.strip_suffix("in") {
        stripped
            .chars()
            .last()
            .map(|c| !c.is_alphanumeric() && c != '_')
            .unwrap_or(true)
    } else {
        false
    }
}

/// Classify each named parameter against its associated column, based on
/// whether it appears in an `IN` position (spec §3 `AssociatedColumn`).
pub fn classify_params(
    sql: &str,
    param_to_column_name: &BTreeMap<String, String>,
) -> BTreeMap<String, AssociatedColumn> {
    let masked = mask(sql);
    let occurrences = find_named_params(sql);
    let mut out = BTreeMap::new();
    for occ in occurrences {
        let Some(column) = param_to_column_name.get(&occ.name) else {
            continue;
        };
        let assoc = if preceded_by_in(&masked, occ.offset) {
            AssociatedColumn::Collection(column.clone())
        } else {
            AssociatedColumn::Default(column.clone())
        };
        // First classification wins; spec invariant says a collection
        // param appears exactly once in an IN position so this shouldn't
        // actually need tie-breaking in valid input.
        out.entry(occ.name).or_insert(assoc);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn rewrites_scalar_param() {
        let r = rewrite_params("SELECT * FROM t WHERE id = :id", &BTreeSet::new());
        assert_eq!(r.sql, "SELECT * FROM t WHERE id = ?");
        assert_eq!(r.named_parameters, vec!["id"]);
    }

    #[test]
    fn rewrites_collection_param() {
        let mut collections = BTreeSet::new();
        collections.insert("ids".to_string());
        let r = rewrite_params("DELETE FROM person WHERE id IN :ids", &collections);
        assert_eq!(
            r.sql,
            "DELETE FROM person WHERE id IN (SELECT value FROM json_each(?))"
        );
    }

    #[test]
    fn duplicate_param_appears_once_in_named_list() {
        let r = rewrite_params("SELECT * FROM t WHERE a = :id OR b = :id", &BTreeSet::new());
        assert_eq!(r.sql, "SELECT * FROM t WHERE a = ? OR b = ?");
        assert_eq!(r.named_parameters, vec!["id"]);
    }

    #[test]
    fn classifies_collection_vs_default() {
        let mut cols = BTreeMap::new();
        cols.insert("ids".to_string(), "id".to_string());
        let assoc = classify_params("DELETE FROM person WHERE id IN :ids", &cols);
        assert_eq!(assoc["ids"], AssociatedColumn::Collection("id".to_string()));
    }
}
