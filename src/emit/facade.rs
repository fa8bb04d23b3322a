//! Database façade (spec §6 external interfaces): the generated `Database`
//! class wiring a `Connection`, `DatabaseMigrations`, and one property per
//! namespace's adapter bundle.

use super::kt::{indent, pascal};

pub fn render_database_facade(package: &str, namespaces: &[String]) -> String {
    let mut out = String::new();
    out.push_str(&format!("package {package}\n\n"));
    out.push_str("class Database(private val connection: SqlConnection) {\n");
    out.push_str(&format!("{}fun open(): Connection = connection.open()\n\n", indent(1)));
    out.push_str(&format!(
        "{}fun migrate(): Int = DatabaseMigrations.migrate(connection, connection.userVersion())\n\n",
        indent(1)
    ));
    out.push_str(&format!(
        "{}fun <T> transaction(block: (SqlConnection) -> T): T = connection.withTransaction(block)\n\n",
        indent(1)
    ));
    out.push_str(&format!(
        "{}fun notifyTablesChanged(tables: Set<String>) = connection.notify(tables)\n\n",
        indent(1)
    ));
    out.push_str(&format!(
        "{}fun <T> reactiveFlow(tables: Set<String>, query: (SqlConnection) -> T): Flow<T> =\n\
         {}connection.observe(tables, query)\n\n",
        indent(1),
        indent(2)
    ));
    for ns in namespaces {
        let ns_pascal = pascal(ns);
        out.push_str(&format!("{}val {}: {} get() = {}\n", indent(1), ns.to_ascii_lowercase(), ns_pascal, ns_pascal));
    }
    out.push_str("}\n");
    out
}
