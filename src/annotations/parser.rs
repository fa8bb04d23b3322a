//! Annotation Parser (spec §4.C): `-- @@{ key=value, ... }` /
//! `/* @@{ ... } */` syntax.
//!
//! This module only turns annotation text into an ordered list of
//! `(key, value)` pairs; it has no opinion on which keys are legal where.
//! Callers (the field/statement typed-override builders in
//! [`crate::annotations::model`]) decide the legal key set for their site
//! and report `UnknownAnnotation` themselves.

use crate::error::GenError;

/// A parsed annotation value. Bare `key` (no `=`) parses as `Bool(true)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnnotationValue {
    Bool(bool),
    String(String),
    Ident(String),
    List(Vec<String>),
}

impl AnnotationValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AnnotationValue::String(s) | AnnotationValue::Ident(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AnnotationValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            AnnotationValue::List(items) => Some(items),
            _ => None,
        }
    }
}

/// Find the first `@@{ ... }` block in `text` and return its inner content
/// (the text between the braces, not including them).
pub fn extract_annotation_body(text: &str) -> Option<&str> {
    let start = text.find("@@{")?;
    let after = start + 3;
    let end_rel = text[after..].find('}')?;
    Some(&text[after..after + end_rel])
}

/// Parse the comma-separated `key[=value]` list inside an `@@{ ... }` block.
///
/// `site` is a human-readable location (file/statement/column) used only
/// for error messages.
pub fn parse_annotation_entries(body: &str, site: &str) -> Result<Vec<(String, AnnotationValue)>, GenError> {
    let mut entries = Vec::new();
    for raw_entry in split_top_level_commas(body) {
        let entry = raw_entry.trim();
        if entry.is_empty() {
            continue;
        }
        if let Some(eq) = find_top_level_eq(entry) {
            let key = entry[..eq].trim().to_string();
            let value_text = entry[eq + 1..].trim();
            let value = parse_value(value_text, site)?;
            entries.push((key, value));
        } else {
            entries.push((entry.to_string(), AnnotationValue::Bool(true)));
        }
    }
    Ok(entries)
}

fn parse_value(text: &str, site: &str) -> Result<AnnotationValue, GenError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(GenError::MalformedAnnotation {
            site: site.to_string(),
            message: "empty annotation value".to_string(),
        });
    }
    if (text.starts_with('"') && text.ends_with('"') && text.len() >= 2)
        || (text.starts_with('\'') && text.ends_with('\'') && text.len() >= 2)
    {
        return Ok(AnnotationValue::String(text[1..text.len() - 1].to_string()));
    }
    if text.starts_with('[') && text.ends_with(']') {
        let inner = &text[1..text.len() - 1];
        let items = split_top_level_commas(inner)
            .into_iter()
            .map(|s| s.trim().trim_matches('"').trim_matches('\'').to_string())
            .filter(|s| !s.is_empty())
            .collect();
        return Ok(AnnotationValue::List(items));
    }
    if text == "true" {
        return Ok(AnnotationValue::Bool(true));
    }
    if text == "false" {
        return Ok(AnnotationValue::Bool(false));
    }
    // Bare identifier, possibly generic (`List<String>`).
    Ok(AnnotationValue::Ident(text.to_string()))
}

/// Split on commas that are not inside `[...]`, `<...>`, or a quoted string.
fn split_top_level_commas(text: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut in_quote: Option<char> = None;
    let mut current = String::new();
    for c in text.chars() {
        match in_quote {
            Some(q) => {
                current.push(c);
                if c == q {
                    in_quote = None;
                }
            }
            None => match c {
                '"' | '\'' => {
                    in_quote = Some(c);
                    current.push(c);
                }
                '[' | '<' => {
                    depth += 1;
                    current.push(c);
                }
                ']' | '>' => {
                    depth -= 1;
                    current.push(c);
                }
                ',' if depth <= 0 => {
                    parts.push(std::mem::take(&mut current));
                }
                _ => current.push(c),
            },
        }
    }
    if !current.trim().is_empty() {
        parts.push(current);
    }
    parts
}

fn find_top_level_eq(text: &str) -> Option<usize> {
    let mut depth = 0i32;
    let mut in_quote: Option<char> = None;
    for (i, c) in text.char_indices() {
        match in_quote {
            Some(q) => {
                if c == q {
                    in_quote = None;
                }
            }
            None => match c {
                '"' | '\'' => in_quote = Some(c),
                '[' | '<' => depth += 1,
                ']' | '>' => depth -= 1,
                '=' if depth <= 0 => return Some(i),
                _ => {}
            },
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_single_line_block() {
        let text = "-- @@{ propertyType=LocalDate, adapter }";
        let body = extract_annotation_body(text).unwrap();
        assert_eq!(body.trim(), "propertyType=LocalDate, adapter");
    }

    #[test]
    fn parses_flags_and_kv() {
        let entries = parse_annotation_entries("propertyType=LocalDate, adapter", "x").unwrap();
        assert_eq!(entries[0], ("propertyType".to_string(), AnnotationValue::Ident("LocalDate".to_string())));
        assert_eq!(entries[1], ("adapter".to_string(), AnnotationValue::Bool(true)));
    }

    #[test]
    fn parses_quoted_string() {
        let entries = parse_annotation_entries(r#"defaultValue="listOf()""#, "x").unwrap();
        assert_eq!(entries[0].1, AnnotationValue::String("listOf()".to_string()));
    }

    #[test]
    fn parses_bracketed_list() {
        let entries = parse_annotation_entries("excludeOverrideFields=[id, name]", "x").unwrap();
        assert_eq!(
            entries[0].1,
            AnnotationValue::List(vec!["id".to_string(), "name".to_string()])
        );
    }

    #[test]
    fn parses_generic_ident() {
        let entries = parse_annotation_entries("propertyType=List<String>", "x").unwrap();
        assert_eq!(entries[0].1, AnnotationValue::Ident("List<String>".to_string()));
    }

    #[test]
    fn comma_inside_brackets_does_not_split() {
        let entries = parse_annotation_entries(
            "excludeOverrideFields=[id, name], mappingType=collection",
            "x",
        )
        .unwrap();
        assert_eq!(entries.len(), 2);
    }
}
