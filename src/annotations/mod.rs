//! Annotation Parser (spec §4.C) and typed override records (spec §3, §9).

mod model;
mod parser;

pub use model::{FieldAnnotationOverrides, MappingType, StatementAnnotationOverrides};
pub use parser::{extract_annotation_body, parse_annotation_entries, AnnotationValue};
