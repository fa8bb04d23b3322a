//! sqlitenow-codegen: a SQL-first code generator.
//!
//! Reads a `<root>/{schema,init,migration,queries}` asset tree, bootstraps
//! an ephemeral SQLite database to introspect it, interprets `@@{...}`
//! annotations, and emits type-safe Kotlin source (spec §2 pipeline).

pub mod annotations;
pub mod config;
pub mod emit;
pub mod error;
pub mod planner;
pub mod resolver;
pub mod scanner;
pub mod schema;
pub mod statement;
pub mod typing;
pub mod util;

use std::collections::BTreeMap;
use std::path::PathBuf;

use log::{debug, info};

pub use config::DatabaseConfig;
pub use error::{GenError, GenResult};

use emit::{EmitStatement, SharedResultRegistry};
use schema::{CreateViewModel, DynamicField, SchemaInspector, ViewAnnotations, ViewField};
use statement::{Catalog, ColumnInfo, Statement};
use typing::AdapterRegistry;

/// Summary of one `generate` run: files written and a few headline counts,
/// for the CLI to print on success.
#[derive(Debug, Clone, Default)]
pub struct GenerateReport {
    pub files: Vec<PathBuf>,
    pub tables: usize,
    pub views: usize,
    pub namespaces: usize,
    pub migrations: usize,
}

/// Run the full pipeline for one [`DatabaseConfig`], writing generated
/// Kotlin sources under `config.output` (spec §2).
pub fn generate(config: &DatabaseConfig) -> GenResult<GenerateReport> {
    info!("scanning project at {}", config.root.display());
    let project = scanner::scan_project(&config.root)?;

    info!(
        "bootstrapping schema ({} statements, {} init)",
        project.schema.len(),
        project.init.len()
    );
    let inspector = SchemaInspector::bootstrap(&project.schema, &project.init)?;

    if let Some(snapshot) = &config.schema_snapshot {
        debug!("writing schema snapshot to {}", snapshot.display());
        inspector.snapshot_to(snapshot)?;
    }

    let mut catalog: Catalog = Catalog::new();
    for (name, table) in &inspector.tables {
        catalog.insert(
            name.clone(),
            table
                .columns
                .iter()
                .map(|c| ColumnInfo {
                    name: c.name.clone(),
                    sql_type: c.sql_type.clone(),
                })
                .collect(),
        );
    }

    // Views are already bootstrap-ordered (spec §4.B Kahn's-algorithm
    // topological sort), so parsing each view's SELECT against the
    // catalog-so-far always sees its upstream tables/views already
    // present, and `*` expansion resolves correctly.
    let mut views: BTreeMap<String, CreateViewModel> = BTreeMap::new();
    for name in &inspector.view_order {
        let select_sql = inspector.view_select_sql.get(name).cloned().unwrap_or_default();
        let path = inspector.view_paths.get(name).cloned().unwrap_or_default();
        let select = statement::parse_select(&path, &select_sql, None, &catalog)?;

        let fields: Vec<ViewField> = select
            .fields
            .iter()
            .map(|f| ViewField {
                source: f.clone(),
                annotations: f.overrides.clone(),
            })
            .collect();

        // A view can carry its own `dynamicField` annotation on one of its
        // projected columns (spec §4.G step 2); a consuming SELECT drawing
        // that column from the view inherits it via the resolver.
        let dynamic_fields: Vec<DynamicField> = fields
            .iter()
            .filter(|f| f.annotations.is_dynamic_field)
            .map(|f| DynamicField {
                property_name: f.annotations.property_name.clone().unwrap_or_else(|| f.source.field_name.clone()),
                overrides: f.annotations.clone(),
                alias_path: vec![f.annotations.source_table.clone().unwrap_or_else(|| f.source.table_name.clone())],
                declared_on_field: f.source.field_name.clone(),
            })
            .collect();

        let columns = inspector.view_columns(name)?;
        catalog.insert(
            name.clone(),
            columns
                .into_iter()
                .map(|(col_name, sql_type, _not_null)| ColumnInfo { name: col_name, sql_type })
                .collect(),
        );

        views.insert(
            name.clone(),
            CreateViewModel {
                path,
                name: name.clone(),
                sql: inspector.view_sql.get(name).cloned().unwrap_or_default(),
                column_names: inspector.view_column_names.get(name).cloned().flatten(),
                select,
                annotations: ViewAnnotations::default(),
                fields,
                dynamic_fields,
            },
        );
    }

    let annotation_resolver = resolver::AnnotationResolver::new(&inspector.tables, &views);
    let mut adapters = AdapterRegistry::new();
    let mut shared_results = SharedResultRegistry::new();

    let mut namespace_text: BTreeMap<String, String> = BTreeMap::new();
    for (namespace, files) in &project.queries {
        let mut emit_statements = Vec::new();
        for file in files {
            let parsed = statement::parse_statement(&file.statement, &catalog)?;
            let plan = match &parsed {
                Statement::Select(select) => Some(planner::plan_select(&file.path, select, &annotation_resolver, config, &mut adapters, namespace)?),
                Statement::Mutating(_) => None,
            };
            emit_statements.push(EmitStatement {
                stem: file.stem.clone(),
                statement: parsed,
                plan,
            });
        }
        let rendered = emit::render_namespace(namespace, &config.package, &emit_statements, &inspector.tables, &mut adapters, &mut shared_results, config)?;
        namespace_text.insert(namespace.clone(), rendered);
    }

    let mut report = GenerateReport {
        tables: inspector.tables.len(),
        views: views.len(),
        namespaces: namespace_text.len(),
        migrations: project.migrations.len(),
        ..Default::default()
    };

    for (namespace, text) in &namespace_text {
        let path = config
            .output
            .join(namespace.to_ascii_lowercase())
            .join(format!("{}.kt", emit::pascal(namespace)));
        write_file(&path, text)?;
        report.files.push(path);
    }

    let migrations_path = config.output.join("DatabaseMigrations.kt");
    let migrations_text = emit::render_migrations_class(&config.package, &project.migrations);
    write_file(&migrations_path, &migrations_text)?;
    report.files.push(migrations_path);

    let namespaces: Vec<String> = namespace_text.keys().cloned().collect();
    let facade_path = config.output.join("Database.kt");
    let facade_text = emit::render_database_facade(&config.package, &namespaces);
    write_file(&facade_path, &facade_text)?;
    report.files.push(facade_path);

    info!("generated {} files across {} namespaces", report.files.len(), report.namespaces);
    Ok(report)
}

fn write_file(path: &std::path::Path, contents: &str) -> GenResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| GenError::FileWriteError {
            path: path.to_path_buf(),
            source: e,
        })?;
    }
    std::fs::write(path, contents).map_err(|e| GenError::FileWriteError {
        path: path.to_path_buf(),
        source: e,
    })
}
