//! Schema Inspector (spec §4.B).

mod graph;
mod inspector;
mod model;

pub use graph::topological_order;
pub use inspector::SchemaInspector;
pub use model::{
    Column, CreateTableModel, CreateViewModel, DynamicField, SchemaObject, TableAnnotations,
    ViewAnnotations, ViewField,
};
