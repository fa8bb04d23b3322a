//! Code Emitter: renders the resolved, planned model into Kotlin source
//! text. Submodules split by concern, one writer per output shape: `kt`
//! holds shared text-rendering helpers, `statement` renders one
//! namespace's `Params`/`Result`/runner trio per query file, `migration`
//! renders the migrations object, and `facade` renders the top-level
//! database class.

mod facade;
mod kt;
mod migration;
mod statement;

pub use facade::render_database_facade;
pub use kt::pascal;
pub use migration::render_migrations_class;
pub use statement::{render_namespace, EmitStatement};

use std::collections::BTreeMap;

use crate::error::GenResult;

/// The field shape of one `queryResult`/`sharedResult`-named result class,
/// as already rendered for the emitter (property name, Kotlin type).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedResultShape {
    pub fields: Vec<(String, String)>,
    pub first_site: String,
}

/// Dedup bucket for `object SharedResult` data classes (spec §4.H,
/// GLOSSARY "Shared result"): two statements naming the same result get one
/// declaration if their field shapes agree, else `SharedResultShapeMismatch`.
#[derive(Debug, Default)]
pub struct SharedResultRegistry {
    entries: BTreeMap<(String, String), SharedResultShape>,
}

impl SharedResultRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `Ok(true)` the first time `(namespace, name)` is seen (the
    /// caller should emit the `data class`), `Ok(false)` for a
    /// shape-identical repeat (the caller just references it), or
    /// `Err` when a later statement disagrees on the shape.
    pub fn register(&mut self, namespace: &str, name: &str, fields: Vec<(String, String)>, site: &str) -> GenResult<bool> {
        let key = (namespace.to_string(), name.to_string());
        match self.entries.get(&key) {
            Some(existing) => {
                if existing.fields != fields {
                    return Err(crate::error::GenError::SharedResultShapeMismatch {
                        name: name.to_string(),
                        first: existing.first_site.clone(),
                        second: site.to_string(),
                        reason: format!("{:?} != {:?}", existing.fields, fields),
                    });
                }
                Ok(false)
            }
            None => {
                self.entries.insert(
                    key,
                    SharedResultShape {
                        fields,
                        first_site: site.to_string(),
                    },
                );
                Ok(true)
            }
        }
    }
}
