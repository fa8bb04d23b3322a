//! Error types for the code generator.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while generating code from a SQL asset tree.
///
/// Each variant corresponds to one of the error kinds in the generator's
/// error taxonomy. The generator never recovers from one of these: the
/// first error aborts the run and is reported with enough file/statement
/// context to be actionable.
#[derive(Error, Debug)]
pub enum GenError {
    #[error("missing or empty schema directory: {path}")]
    MissingSchemaDir { path: PathBuf },

    #[error("query file must contain exactly one statement: {path} ({found} found)")]
    MultiStatementQueryFile { path: PathBuf, found: usize },

    #[error("duplicate migration version {version}: {first} and {second}")]
    DuplicateMigrationVersion {
        version: u32,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("failed to read {path}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}")]
    FileWriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("SQL parse error in {path}{}: {message}", statement.as_ref().map(|s| format!(" ({s})")).unwrap_or_default())]
    SqlParseError {
        path: PathBuf,
        statement: Option<String>,
        message: String,
    },

    #[error("SQLite execution error while bootstrapping {path}: {message}")]
    SqlExecutionError { path: PathBuf, message: String },

    #[error("unknown annotation key `{key}` at {site}")]
    UnknownAnnotation { key: String, site: String },

    #[error("malformed annotation value at {site}: {message}")]
    MalformedAnnotation { site: String, message: String },

    #[error("view dependency cycle detected: {cycle}")]
    ViewCycle { cycle: String },

    #[error("cannot resolve a host type for `{column}` in {path}: no primitive mapping and no `propertyType` given")]
    TypeResolution { path: PathBuf, column: String },

    #[error("dynamic field `{field}` in {path} is missing `collectionKey`")]
    MissingCollectionKey { path: PathBuf, field: String },

    #[error("dynamic field `{field}` in {path}: sourceTable `{source_table}` does not resolve to a table or view participating in the SELECT")]
    UnresolvedSourceTable {
        path: PathBuf,
        field: String,
        source_table: String,
    },

    #[error("aliasPrefix `{prefix}` in {path} is not prefix-free among {conflicting:?}")]
    AmbiguousAliasPrefix {
        path: PathBuf,
        prefix: String,
        conflicting: Vec<String>,
    },

    #[error("alias `{alias}` is ambiguous in {path}: inherited from view dynamic field but already bound in the consuming SELECT")]
    AmbiguousAlias { path: PathBuf, alias: String },

    #[error("queryResult/sharedResult `{name}` used by both {first} and {second} disagree: {reason}")]
    SharedResultShapeMismatch {
        name: String,
        first: String,
        second: String,
        reason: String,
    },

    #[error("statement `{path}` uses both `queryResult` and `sharedResult` with different values ({query_result} != {shared_result})")]
    ConflictingResultNameAnnotations {
        path: PathBuf,
        query_result: String,
        shared_result: String,
    },

    #[error("unsupported RETURNING clause in {path}: {message}")]
    UnsupportedReturning { path: PathBuf, message: String },

    #[error("unsupported statement kind in {path}: {message}")]
    UnsupportedStatement { path: PathBuf, message: String },

    #[error("invalid configuration: {message}")]
    Config { message: String },

    #[error("{0} generation errors occurred", .0.len())]
    Many(Vec<GenError>),
}

pub type GenResult<T> = Result<T, GenError>;
