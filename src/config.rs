//! Per-database generator configuration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::GenError;

/// Configuration for one `<root>` SQL asset tree (see spec §2).
///
/// A project with several databases runs the generator once per
/// `DatabaseConfig`; nothing here is shared across invocations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Root of the `schema/ init/ migration/ queries/` tree.
    pub root: PathBuf,
    /// Directory generated Kotlin sources are written under.
    pub output: PathBuf,
    /// Dotted package prefix, e.g. `com.example.db`.
    pub package: String,
    /// Optional path to copy the bootstrap SQLite database to for inspection.
    #[serde(default)]
    pub schema_snapshot: Option<PathBuf>,
    /// Emit provenance/debug comments for every statement, not just ones
    /// annotated `debug`.
    #[serde(default)]
    pub debug: bool,
    /// Per-database overrides of the built-in SQL->host type table, e.g.
    /// mapping `NUMERIC` to a custom type name by default.
    #[serde(default)]
    pub type_overrides: BTreeMap<String, String>,
}

impl DatabaseConfig {
    pub fn from_file(path: &Path) -> Result<Self, GenError> {
        let text = std::fs::read_to_string(path).map_err(|e| GenError::FileReadError {
            path: path.to_path_buf(),
            source: e,
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&text).map_err(|e| GenError::Config {
                message: format!("{}: {e}", path.display()),
            }),
            _ => toml::from_str(&text).map_err(|e| GenError::Config {
                message: format!("{}: {e}", path.display()),
            }),
        }
    }

    /// Apply CLI-provided overrides on top of a config-file value. CLI
    /// flags always win over the config file's defaults.
    pub fn merge_cli_overrides(
        &mut self,
        output: Option<PathBuf>,
        package: Option<String>,
        schema_snapshot: Option<PathBuf>,
        debug: bool,
    ) {
        if let Some(output) = output {
            self.output = output;
        }
        if let Some(package) = package {
            self.package = package;
        }
        if schema_snapshot.is_some() {
            self.schema_snapshot = schema_snapshot;
        }
        if debug {
            self.debug = true;
        }
    }
}
