//! End-to-end pipeline tests: write a SQL asset tree to a tempdir, run
//! `generate`, assert on the emitted Kotlin text.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use sqlitenow_codegen::{generate, DatabaseConfig};

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn config(root: &Path, output: &Path) -> DatabaseConfig {
    DatabaseConfig {
        root: root.to_path_buf(),
        output: output.to_path_buf(),
        package: "com.example.db".to_string(),
        schema_snapshot: None,
        debug: false,
        type_overrides: BTreeMap::new(),
    }
}

fn read_generated(output: &Path, rel: &str) -> String {
    fs::read_to_string(output.join(rel)).unwrap_or_else(|e| panic!("reading {rel}: {e}"))
}

#[test]
fn generates_params_and_result_for_simple_select() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("db");
    let output = tmp.path().join("out");

    write(
        &root,
        "schema/person.sql",
        "CREATE TABLE person(id INTEGER PRIMARY KEY, name TEXT NOT NULL, email TEXT);",
    );
    write(
        &root,
        "queries/person/selectById.sql",
        "SELECT id, name, email FROM person WHERE id = CAST(:id AS INTEGER);",
    );

    let cfg = config(&root, &output);
    let report = generate(&cfg).unwrap();

    assert_eq!(report.tables, 1);
    assert_eq!(report.namespaces, 1);
    assert!(report.files.iter().any(|p| p.ends_with("Database.kt")));
    assert!(report.files.iter().any(|p| p.ends_with("DatabaseMigrations.kt")));

    let text = read_generated(&output, "person/Person.kt");
    assert!(text.contains("object Person"));
    assert!(text.contains("object SelectById"));
    assert!(text.contains("data class Params"));
    assert!(text.contains("val id: Long"));
    assert!(text.contains("fun asList"));
    assert!(text.contains("fun asOneOrNull"));
}

#[test]
fn generates_execute_for_non_returning_mutation() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("db");
    let output = tmp.path().join("out");

    write(
        &root,
        "schema/person.sql",
        "CREATE TABLE person(id INTEGER PRIMARY KEY, name TEXT NOT NULL);",
    );
    write(
        &root,
        "queries/person/updateName.sql",
        "UPDATE person SET name = :name WHERE id = :id;",
    );

    let cfg = config(&root, &output);
    generate(&cfg).unwrap();

    let text = read_generated(&output, "person/Person.kt");
    assert!(text.contains("object UpdateName"));
    assert!(text.contains("fun execute(database: Database, params: Params)"));
    assert!(text.contains("notifyTablesChanged(setOf(\"person\"))"));
}

#[test]
fn generates_readrow_for_returning_mutation() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("db");
    let output = tmp.path().join("out");

    write(
        &root,
        "schema/person.sql",
        "CREATE TABLE person(id INTEGER PRIMARY KEY, name TEXT NOT NULL);",
    );
    write(
        &root,
        "queries/person/insertPerson.sql",
        "INSERT INTO person(name) VALUES (:name) RETURNING id, name;",
    );

    let cfg = config(&root, &output);
    generate(&cfg).unwrap();

    let text = read_generated(&output, "person/Person.kt");
    assert!(text.contains("object InsertPerson"));
    assert!(text.contains("fun readRow"));
    assert!(text.contains("fun one(connection: SqlConnection, params: Params): Result"));
}

#[test]
fn shared_result_is_declared_once_across_statements() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("db");
    let output = tmp.path().join("out");

    write(
        &root,
        "schema/person.sql",
        "CREATE TABLE person(id INTEGER PRIMARY KEY, name TEXT NOT NULL);",
    );
    write(
        &root,
        "queries/person/selectAll.sql",
        "-- @@{ queryResult=PersonRow }\nSELECT id, name FROM person;",
    );
    write(
        &root,
        "queries/person/selectOne.sql",
        "-- @@{ queryResult=PersonRow }\nSELECT id, name FROM person WHERE id = :id;",
    );

    let cfg = config(&root, &output);
    generate(&cfg).unwrap();

    let text = read_generated(&output, "person/Person.kt");
    let occurrences = text.matches("data class PersonRow").count();
    assert_eq!(occurrences, 1, "expected PersonRow declared exactly once, got:\n{text}");
    assert!(text.contains("object SharedResult"));
}

#[test]
fn conflicting_shared_result_shapes_fail() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("db");
    let output = tmp.path().join("out");

    write(
        &root,
        "schema/person.sql",
        "CREATE TABLE person(id INTEGER PRIMARY KEY, name TEXT NOT NULL, email TEXT);",
    );
    write(
        &root,
        "queries/person/selectA.sql",
        "-- @@{ queryResult=PersonRow }\nSELECT id, name FROM person;",
    );
    write(
        &root,
        "queries/person/selectB.sql",
        "-- @@{ queryResult=PersonRow }\nSELECT id, email FROM person;",
    );

    let cfg = config(&root, &output);
    let err = generate(&cfg).unwrap_err();
    assert!(matches!(err, sqlitenow_codegen::GenError::SharedResultShapeMismatch { .. }));
}

#[test]
fn migrations_apply_in_ascending_version_order() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("db");
    let output = tmp.path().join("out");

    write(&root, "schema/person.sql", "CREATE TABLE person(id INTEGER PRIMARY KEY);");
    write(&root, "migration/0002.sql", "ALTER TABLE person ADD COLUMN age INTEGER;");
    write(&root, "migration/0001.sql", "ALTER TABLE person ADD COLUMN name TEXT;");

    let cfg = config(&root, &output);
    let report = generate(&cfg).unwrap();
    assert_eq!(report.migrations, 2);

    let text = read_generated(&output, "DatabaseMigrations.kt");
    let first = text.find("version < 1").unwrap();
    let second = text.find("version < 2").unwrap();
    assert!(first < second);
}

#[test]
fn collection_dynamic_field_produces_joined_struct_and_hydrate() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("db");
    let output = tmp.path().join("out");

    write(
        &root,
        "schema/person.sql",
        "CREATE TABLE person(id INTEGER PRIMARY KEY, name TEXT NOT NULL);",
    );
    write(
        &root,
        "schema/address.sql",
        "CREATE TABLE address(id INTEGER PRIMARY KEY, person_id INTEGER NOT NULL, city TEXT NOT NULL);",
    );
    write(
        &root,
        "queries/person/selectWithAddresses.sql",
        "-- @@{ collectionKey=id }\n\
         SELECT p.id, p.name,\n\
         a.id AS a_id /* @@{ dynamicField=addresses, mappingType=collection, propertyType=AddressRow, sourceTable=a, collectionKey=id, defaultValue=\"listOf()\" } */,\n\
         a.city AS a_city\n\
         FROM person p JOIN address a ON a.person_id = p.id;",
    );

    let cfg = config(&root, &output);
    generate(&cfg).unwrap();

    let text = read_generated(&output, "person/Person.kt");
    assert!(text.contains("data class ResultJoined"));
    assert!(text.contains("fun readJoinedRow"));

    // `hydrate` must build the real `Result`, not just pass the first row
    // through: the `addresses` list is constructed from the grouped rows'
    // own joined columns, and the grouping key dedups by `collectionKey`.
    let hydrate_start = text.find("private fun hydrate").expect("hydrate fn emitted");
    let rest = &text[hydrate_start..];
    let hydrate_end = rest.find("fun asList").expect("asList follows hydrate");
    let hydrate_body = &rest[..hydrate_end];
    assert!(
        hydrate_body.contains("fun hydrate(rows: List<ResultJoined>): SelectWithAddresses.Result"),
        "hydrate must return the real Result type, not Any:\n{hydrate_body}"
    );
    assert!(hydrate_body.contains("val addresses = rows.distinctBy { it.a_aId }"), "addresses must be grouped and deduped by the collectionKey:\n{hydrate_body}");
    assert!(hydrate_body.contains("AddressRow("), "addresses entries must construct AddressRow from child columns:\n{hydrate_body}");
    assert!(hydrate_body.contains("return SelectWithAddresses.Result("), "hydrate must construct the parent Result:\n{hydrate_body}");
    assert!(hydrate_body.contains("addresses = addresses,"), "the constructed Result must carry the built addresses list:\n{hydrate_body}");

    assert!(text.contains("grouped.getOrPut(row.p_id)"), "asList must group joined rows by the statement-level collectionKey:\n{text}");
}

#[test]
fn collection_mapping_without_statement_level_key_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("db");
    let output = tmp.path().join("out");

    write(
        &root,
        "schema/person.sql",
        "CREATE TABLE person(id INTEGER PRIMARY KEY, name TEXT NOT NULL);",
    );
    write(
        &root,
        "schema/address.sql",
        "CREATE TABLE address(id INTEGER PRIMARY KEY, person_id INTEGER NOT NULL, city TEXT NOT NULL);",
    );
    write(
        &root,
        "queries/person/selectWithAddresses.sql",
        "SELECT p.id, p.name,\n\
         a.id AS a_id /* @@{ dynamicField=addresses, mappingType=collection, sourceTable=a, collectionKey=id, defaultValue=\"listOf()\" } */,\n\
         a.city AS a_city\n\
         FROM person p JOIN address a ON a.person_id = p.id;",
    );

    let cfg = config(&root, &output);
    let err = generate(&cfg).unwrap_err();
    assert!(matches!(err, sqlitenow_codegen::GenError::MissingCollectionKey { .. }), "expected MissingCollectionKey, got {err:?}");
}

#[test]
fn missing_schema_dir_is_reported() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("db");
    fs::create_dir_all(&root).unwrap();
    let output = tmp.path().join("out");

    let cfg = config(&root, &output);
    let err = generate(&cfg).unwrap_err();
    assert!(matches!(err, sqlitenow_codegen::GenError::MissingSchemaDir { .. }));
}

#[test]
fn schema_snapshot_is_written_when_configured() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("db");
    let output = tmp.path().join("out");
    let snapshot = tmp.path().join("snapshot.db");

    write(&root, "schema/person.sql", "CREATE TABLE person(id INTEGER PRIMARY KEY);");

    let mut cfg = config(&root, &output);
    cfg.schema_snapshot = Some(snapshot.clone());
    generate(&cfg).unwrap();

    assert!(snapshot.exists());
}

#[test]
fn view_based_query_resolves_inherited_column_annotations() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("db");
    let output = tmp.path().join("out");

    write(
        &root,
        "schema/person.sql",
        "CREATE TABLE person(id INTEGER PRIMARY KEY, birth_date TEXT /* @@{ propertyType=LocalDate, adapter } */);",
    );
    write(
        &root,
        "schema/person_view.sql",
        "CREATE VIEW person_view AS SELECT id, birth_date FROM person;",
    );
    write(
        &root,
        "queries/person/selectFromView.sql",
        "SELECT id, birth_date FROM person_view;",
    );

    let cfg = config(&root, &output);
    let report = generate(&cfg).unwrap();
    assert_eq!(report.views, 1);

    let text = read_generated(&output, "person/Person.kt");
    assert!(text.contains("LocalDate"));
}

#[test]
fn output_paths_match_namespace_layout() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("db");
    let output = tmp.path().join("out");

    write(&root, "schema/person.sql", "CREATE TABLE person(id INTEGER PRIMARY KEY);");
    write(&root, "queries/person/selectAll.sql", "SELECT id FROM person;");

    let cfg = config(&root, &output);
    let report = generate(&cfg).unwrap();

    let expected: PathBuf = output.join("person").join("Person.kt");
    assert!(report.files.contains(&expected));
}
