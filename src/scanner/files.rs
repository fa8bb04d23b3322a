//! File Scanner (spec §4.A): enumerate the `<root>` asset tree.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::GenError;

use super::comments::{split_top_level_statements, RawStatement};

/// One `queries/<namespace>/<stem>.sql` file.
#[derive(Debug, Clone)]
pub struct QueryFile {
    pub namespace: String,
    pub stem: String,
    pub path: PathBuf,
    pub statement: RawStatement,
}

/// One `migration/NNNN.sql` file.
#[derive(Debug, Clone)]
pub struct MigrationFile {
    pub version: u32,
    pub path: PathBuf,
    pub statements: Vec<RawStatement>,
}

/// Everything the scanner found under `<root>`.
#[derive(Debug, Clone, Default)]
pub struct ScannedProject {
    pub schema: Vec<RawStatement>,
    pub init: Vec<RawStatement>,
    pub migrations: Vec<MigrationFile>,
    /// namespace -> query files, in file-name order.
    pub queries: BTreeMap<String, Vec<QueryFile>>,
}

/// Scan `<root>/{schema,init,migration,queries}` into a [`ScannedProject`].
pub fn scan_project(root: &Path) -> Result<ScannedProject, GenError> {
    let schema_dir = root.join("schema");
    if !schema_dir.is_dir() {
        return Err(GenError::MissingSchemaDir { path: schema_dir });
    }
    let schema = scan_statement_dir(&schema_dir)?;
    if schema.is_empty() {
        return Err(GenError::MissingSchemaDir { path: schema_dir });
    }

    let init_dir = root.join("init");
    let init = if init_dir.is_dir() {
        scan_statement_dir(&init_dir)?
    } else {
        Vec::new()
    };

    let migrations = scan_migrations(&root.join("migration"))?;
    let queries = scan_queries(&root.join("queries"))?;

    Ok(ScannedProject {
        schema,
        init,
        migrations,
        queries,
    })
}

/// Read every `.sql` file in `dir` (sorted by name) and split each into its
/// top-level statements, in file order then in-file order.
fn scan_statement_dir(dir: &Path) -> Result<Vec<RawStatement>, GenError> {
    let mut paths = sql_files_sorted(dir)?;
    paths.sort();
    let mut out = Vec::new();
    for path in paths {
        let text = read_file(&path)?;
        out.extend(split_top_level_statements(&path, &text));
    }
    Ok(out)
}

fn scan_migrations(dir: &Path) -> Result<Vec<MigrationFile>, GenError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut paths = sql_files_sorted(dir)?;
    paths.sort();

    let mut seen: BTreeMap<u32, PathBuf> = BTreeMap::new();
    let mut files = Vec::new();
    for path in paths {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        let version = parse_migration_version(stem).ok_or_else(|| GenError::FileReadError {
            path: path.clone(),
            source: std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("migration file name `{stem}` has no numeric version prefix"),
            ),
        })?;
        if let Some(first) = seen.get(&version) {
            return Err(GenError::DuplicateMigrationVersion {
                version,
                first: first.clone(),
                second: path,
            });
        }
        seen.insert(version, path.clone());

        let text = read_file(&path)?;
        let statements = split_top_level_statements(&path, &text);
        files.push(MigrationFile {
            version,
            path,
            statements,
        });
    }
    files.sort_by_key(|f| f.version);
    Ok(files)
}

/// `0001` and `1` both map to version `1`; a non-numeric prefix is rejected.
fn parse_migration_version(stem: &str) -> Option<u32> {
    let digits: String = stem.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        None
    } else {
        digits.parse().ok()
    }
}

fn scan_queries(dir: &Path) -> Result<BTreeMap<String, Vec<QueryFile>>, GenError> {
    let mut namespaces: BTreeMap<String, Vec<QueryFile>> = BTreeMap::new();
    if !dir.is_dir() {
        return Ok(namespaces);
    }
    let mut namespace_dirs: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|e| GenError::FileReadError {
            path: dir.to_path_buf(),
            source: e,
        })?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    namespace_dirs.sort();

    for ns_dir in namespace_dirs {
        let namespace = ns_dir
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        let mut paths = sql_files_sorted(&ns_dir)?;
        paths.sort();
        let mut files = Vec::new();
        for path in paths {
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();
            let text = read_file(&path)?;
            let statements = split_top_level_statements(&path, &text);
            if statements.len() != 1 {
                return Err(GenError::MultiStatementQueryFile {
                    path,
                    found: statements.len(),
                });
            }
            files.push(QueryFile {
                namespace: namespace.clone(),
                stem,
                path,
                statement: statements.into_iter().next().unwrap(),
            });
        }
        namespaces.insert(namespace, files);
    }
    Ok(namespaces)
}

fn sql_files_sorted(dir: &Path) -> Result<Vec<PathBuf>, GenError> {
    let mut paths: Vec<PathBuf> = walkdir::WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.path().to_path_buf())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("sql"))
        .collect();
    paths.sort();
    Ok(paths)
}

fn read_file(path: &Path) -> Result<String, GenError> {
    std::fs::read_to_string(path).map_err(|e| GenError::FileReadError {
        path: path.to_path_buf(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn scans_full_tree() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        write(root, "schema/person.sql", "CREATE TABLE person(id INTEGER PRIMARY KEY, name TEXT NOT NULL);");
        write(root, "init/seed.sql", "INSERT INTO person(id, name) VALUES (1, 'a');");
        write(root, "migration/0001.sql", "ALTER TABLE person ADD COLUMN email TEXT;");
        write(root, "migration/2.sql", "ALTER TABLE person ADD COLUMN age INTEGER;");
        write(
            root,
            "queries/person/selectAll.sql",
            "SELECT id, name FROM person;",
        );

        let project = scan_project(root).unwrap();
        assert_eq!(project.schema.len(), 1);
        assert_eq!(project.init.len(), 1);
        assert_eq!(project.migrations.len(), 2);
        assert_eq!(project.migrations[0].version, 1);
        assert_eq!(project.migrations[1].version, 2);
        assert_eq!(project.queries["person"].len(), 1);
        assert_eq!(project.queries["person"][0].stem, "selectAll");
    }

    #[test]
    fn duplicate_migration_versions_fail() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        write(root, "schema/t.sql", "CREATE TABLE t(id INTEGER);");
        write(root, "migration/0001.sql", "SELECT 1;");
        write(root, "migration/1.sql", "SELECT 1;");

        let err = scan_project(root).unwrap_err();
        assert!(matches!(err, GenError::DuplicateMigrationVersion { version: 1, .. }));
    }

    #[test]
    fn multi_statement_query_file_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        write(root, "schema/t.sql", "CREATE TABLE t(id INTEGER);");
        write(
            root,
            "queries/t/bad.sql",
            "SELECT 1; SELECT 2;",
        );
        let err = scan_project(root).unwrap_err();
        assert!(matches!(err, GenError::MultiStatementQueryFile { found: 2, .. }));
    }

    #[test]
    fn missing_schema_dir_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let err = scan_project(tmp.path()).unwrap_err();
        assert!(matches!(err, GenError::MissingSchemaDir { .. }));
    }
}
