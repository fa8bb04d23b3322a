//! Migrations object (spec §4.H, §8 scenario S7 / testable property 8):
//! applies `migration/NNNN.sql` files in ascending version order, skipping
//! versions at or below the database's current `user_version`.

use crate::scanner::MigrationFile;

use super::kt::indent;

pub fn render_migrations_class(package: &str, migrations: &[MigrationFile]) -> String {
    let mut sorted: Vec<&MigrationFile> = migrations.iter().collect();
    sorted.sort_by_key(|m| m.version);

    let mut out = String::new();
    out.push_str(&format!("package {package}\n\n"));
    out.push_str("object DatabaseMigrations {\n");
    out.push_str(&format!("{}val versions: List<Int> = listOf({})\n\n", indent(1), version_list(&sorted)));

    out.push_str(&format!("{}fun migrate(connection: SqlConnection, currentVersion: Int): Int {{\n", indent(1)));
    out.push_str(&format!("{}var version = currentVersion\n", indent(2)));
    for m in &sorted {
        out.push_str(&format!("{}if (version < {}) {{\n", indent(2), m.version));
        for stmt in &m.statements {
            out.push_str(&format!("{}connection.execute({:?})\n", indent(3), stmt.sql));
        }
        out.push_str(&format!("{}version = {}\n", indent(3), m.version));
        out.push_str(&format!("{}}}\n", indent(2)));
    }
    out.push_str(&format!("{}return version\n", indent(2)));
    out.push_str(&format!("{}}}\n", indent(1)));
    out.push_str("}\n");
    out
}

fn version_list(migrations: &[&MigrationFile]) -> String {
    migrations.iter().map(|m| m.version.to_string()).collect::<Vec<_>>().join(", ")
}
