//! Per-statement emission (spec §4.H): `Params`/`Result` data classes and
//! the runner object, for one namespace's worth of query files.

use std::collections::BTreeMap;
use std::path::Path;

use crate::annotations::FieldAnnotationOverrides;
use crate::config::DatabaseConfig;
use crate::error::GenResult;
use crate::planner::{DynamicRole, PlannedField, ResultMappingPlan};
use crate::schema::CreateTableModel;
use crate::statement::{AssociatedColumn, MutatingStatement, SelectStatement, Statement};
use crate::typing::{self, AdapterRegistry, ResolvedType};

use super::kt::{camel, indent, pascal, render_data_class};
use super::SharedResultRegistry;

/// One query file queued for emission within a namespace.
pub struct EmitStatement {
    pub stem: String,
    pub statement: Statement,
    /// `Some` for SELECTs (the planner only runs on SELECTs).
    pub plan: Option<ResultMappingPlan>,
}

struct ParamField {
    name: String,
    resolved: ResolvedType,
    is_collection: bool,
    bound_column: Option<String>,
}

/// Render one namespace's translation unit: the shared-result bucket plus
/// one nested object per statement.
pub fn render_namespace(
    namespace: &str,
    package: &str,
    statements: &[EmitStatement],
    tables: &BTreeMap<String, CreateTableModel>,
    adapters: &mut AdapterRegistry,
    shared: &mut SharedResultRegistry,
    config: &DatabaseConfig,
) -> GenResult<String> {
    let ns_pascal = pascal(namespace);
    let mut shared_decls = String::new();
    let mut statement_objects = Vec::new();

    for stmt in statements {
        let (obj_text, _touched) = render_statement_object(stmt, namespace, tables, adapters, shared, &mut shared_decls, config)?;
        statement_objects.push(obj_text);
    }

    let mut out = String::new();
    out.push_str(&format!("package {package}.{}\n\n", namespace.to_ascii_lowercase()));
    out.push_str("import app.cash.sqldelight.db.*\n");
    out.push_str("import kotlinx.coroutines.flow.Flow\n\n");
    out.push_str(&format!("object {ns_pascal} {{\n"));
    if !shared_decls.is_empty() {
        out.push_str(&format!("{}object SharedResult {{\n", indent(1)));
        out.push_str(&shared_decls);
        out.push_str(&format!("{}}}\n\n", indent(1)));
    }
    for obj in &statement_objects {
        out.push_str(obj);
        out.push('\n');
    }
    if let Some(group) = adapters_group_text(namespace, adapters) {
        out.push_str(&group);
    }
    out.push_str("}\n");
    Ok(out)
}

fn adapters_group_text(namespace: &str, adapters: &AdapterRegistry) -> Option<String> {
    let specs = adapters.by_namespace(namespace);
    if specs.is_empty() {
        return None;
    }
    let mut out = format!("{}data class Adapters(\n", indent(1));
    for (i, spec) in specs.iter().enumerate() {
        let comma = if i + 1 == specs.len() { "" } else { "," };
        out.push_str(&format!(
            "{}val {}: ({}) -> {},{comma}\n",
            indent(2),
            spec.to_sql_fn,
            spec.input_type,
            spec.output_type
        ));
        out.push_str(&format!(
            "{}val {}: ({}) -> {}{comma}\n",
            indent(2),
            spec.from_sql_fn,
            spec.output_type,
            spec.input_type
        ));
    }
    out.push_str(&format!("{})\n\n", indent(1)));
    Some(out)
}

fn render_statement_object(
    stmt: &EmitStatement,
    namespace: &str,
    tables: &BTreeMap<String, CreateTableModel>,
    adapters: &mut AdapterRegistry,
    shared: &mut SharedResultRegistry,
    shared_decls_out: &mut String,
    config: &DatabaseConfig,
) -> GenResult<(String, Vec<String>)> {
    let stmt_name = pascal(&stmt.stem);
    let path = stmt.statement.path().to_path_buf();
    let debug = stmt.statement.annotations().debug || config.debug;

    let mut out = String::new();
    out.push_str(&format!("{}object {stmt_name} {{\n", indent(1)));
    if debug {
        out.push_str(&format!("{}// debug: {}\n", indent(2), sql_of(&stmt.statement)));
    }

    match &stmt.statement {
        Statement::Select(select) => {
            let plan = stmt.plan.as_ref().expect("planner output required for a SELECT");
            let params = resolve_select_params(&path, select, tables, config)?;
            out.push_str(&render_params_struct(&params, 2));

            let result_fields = plan_result_fields(plan);
            let result_type_name = match select.annotations.result_name() {
                Some(name) => {
                    let is_new = shared.register(namespace, name, shared_shape(&result_fields), &path.display().to_string())?;
                    if is_new {
                        shared_decls_out.push_str(&render_data_class(name, &result_fields, 2));
                    }
                    format!("SharedResult.{name}")
                }
                None => {
                    out.push_str(&render_data_class("Result", &result_fields, 2));
                    format!("{stmt_name}.Result")
                }
            };

            if plan.needs_joined_struct {
                let joined_fields = joined_struct_fields(plan);
                out.push_str(&render_data_class("ResultJoined", &joined_fields, 2));
            }

            out.push_str(&render_select_runner(select, plan, &params, &result_type_name, adapters, namespace, 2));

            let touched = affected_tables(select);
            out.push_str(&format!("{}val affectedTables: Set<String> = setOf({})\n", indent(2), quote_list(&touched)));
            out.push_str(&format!("{}}}\n", indent(1)));
            Ok((out, touched))
        }
        Statement::Mutating(m) => {
            let params = resolve_mutating_params(&path, m, tables, config)?;
            out.push_str(&render_params_struct(&params, 2));
            let returning_fields = if m.has_returning {
                let fields = returning_result_fields(m, tables, adapters, namespace, config)?;
                let tuples: Vec<(String, String, Option<String>)> = fields
                    .iter()
                    .map(|f| (f.property_name.clone(), f.resolved.rendered(), Some(f.provenance_comment())))
                    .collect();
                out.push_str(&render_data_class("Result", &tuples, 2));
                fields
            } else {
                Vec::new()
            };
            out.push_str(&render_mutating_runner(m, &params, &returning_fields, adapters, namespace, 2));
            let touched = vec![m.table.clone()];
            out.push_str(&format!("{}}}\n", indent(1)));
            Ok((out, touched))
        }
    }
}

fn sql_of(stmt: &Statement) -> &str {
    match stmt {
        Statement::Select(s) => &s.sql,
        Statement::Mutating(m) => &m.sql,
    }
}

fn quote_list(items: &[String]) -> String {
    items.iter().map(|s| format!("\"{s}\"")).collect::<Vec<_>>().join(", ")
}

/// Tables this SELECT (and any WITH sub-selects, recursively) reads from —
/// the `asFlow` invalidation set (spec §4.H).
fn affected_tables(select: &SelectStatement) -> Vec<String> {
    let mut set = std::collections::BTreeSet::new();
    collect_affected(select, &mut set);
    set.into_iter().collect()
}

fn collect_affected(select: &SelectStatement, out: &mut std::collections::BTreeSet<String>) {
    for table in select.table_aliases.values() {
        out.insert(table.to_ascii_lowercase());
    }
    for with in &select.with_selects {
        collect_affected(with, out);
    }
}

fn resolve_select_params(
    path: &Path,
    select: &SelectStatement,
    _tables: &BTreeMap<String, CreateTableModel>,
    config: &DatabaseConfig,
) -> GenResult<Vec<ParamField>> {
    let mut out = Vec::new();
    for name in &select.named_parameters {
        let is_collection = select.collection_parameters.contains(name);
        let cast = select.parameter_cast_types.get(name).map(String::as_str);
        let resolved = resolve_scalar_param_type(path, cast, config)?;
        out.push(ParamField {
            name: camel(name),
            resolved,
            is_collection,
            bound_column: None,
        });
    }
    Ok(out)
}

fn resolve_mutating_params(
    path: &Path,
    stmt: &MutatingStatement,
    tables: &BTreeMap<String, CreateTableModel>,
    config: &DatabaseConfig,
) -> GenResult<Vec<ParamField>> {
    let mut out = Vec::new();
    for name in &stmt.named_parameters {
        let assoc = stmt.param_to_column.get(name);
        let is_collection = assoc.map(|a| a.is_collection()).unwrap_or(false);
        let cast = stmt.parameter_cast_types.get(name).map(String::as_str);
        let column_name = assoc.map(AssociatedColumn::column_name).filter(|c| !c.is_empty());
        let resolved = resolve_column_backed_param_type(path, &stmt.table, column_name, cast, tables, config)?;
        out.push(ParamField {
            name: camel(name),
            resolved,
            is_collection,
            bound_column: column_name.map(|c| format!("{}.{c}", stmt.table)),
        });
    }
    Ok(out)
}

fn resolve_scalar_param_type(path: &Path, cast_hint: Option<&str>, config: &DatabaseConfig) -> GenResult<ResolvedType> {
    match cast_hint {
        Some(cast) => typing::resolve_column_type(path, "param", Some(cast), Some(true), true, &FieldAnnotationOverrides::default(), config),
        // SELECT named parameters aren't associated with a column the way
        // INSERT/UPDATE/DELETE params are (spec §4.D only defines that
        // association for mutating statements); absent a CAST hint we fall
        // back to String, the least-assuming host type.
        None => Ok(ResolvedType {
            kotlin_type: "String".to_string(),
            nullable: false,
            needs_adapter: false,
        }),
    }
}

fn resolve_column_backed_param_type(
    path: &Path,
    table_name: &str,
    column_name: Option<&str>,
    cast_hint: Option<&str>,
    tables: &BTreeMap<String, CreateTableModel>,
    config: &DatabaseConfig,
) -> GenResult<ResolvedType> {
    if let Some(cast) = cast_hint {
        return typing::resolve_column_type(path, "param", Some(cast), Some(true), true, &FieldAnnotationOverrides::default(), config);
    }
    let column = tables
        .get(&table_name.to_ascii_lowercase())
        .and_then(|t| column_name.and_then(|c| t.column(c)));
    match column {
        Some(col) => typing::resolve_column_type(
            path,
            &col.name,
            Some(&col.sql_type),
            Some(col.not_null),
            true,
            &col.annotations,
            config,
        ),
        None => Ok(ResolvedType {
            kotlin_type: "String".to_string(),
            nullable: false,
            needs_adapter: false,
        }),
    }
}

fn render_params_struct(params: &[ParamField], level: usize) -> String {
    let fields: Vec<(String, String, Option<String>)> = params
        .iter()
        .map(|p| {
            let ty = if p.is_collection {
                format!("Collection<{}>", p.resolved.kotlin_type)
            } else {
                p.resolved.rendered()
            };
            let comment = p.bound_column.clone();
            (p.name.clone(), ty, comment)
        })
        .collect();
    render_data_class("Params", &fields, level)
}

fn plan_result_fields(plan: &ResultMappingPlan) -> Vec<(String, String, Option<String>)> {
    let mut out: Vec<(String, String, Option<String>)> = plan
        .regular_fields
        .iter()
        .map(|f| (f.property_name.clone(), f.resolved.rendered(), Some(f.provenance_comment())))
        .collect();
    for d in &plan.dynamic_fields {
        let ty = match d.role {
            DynamicRole::Entity => d.property_type.clone(),
            DynamicRole::PerRow => format!("{}?", d.property_type),
            DynamicRole::Collection => format!("List<{}>", d.property_type),
        };
        let comment = format!("dynamic {:?} from {}", d.role, d.source_alias).to_ascii_lowercase();
        out.push((d.property_name.clone(), ty, Some(comment)));
    }
    out
}

fn joined_struct_fields(plan: &ResultMappingPlan) -> Vec<(String, String, Option<String>)> {
    let mut fields: Vec<&PlannedField> = plan.regular_fields.iter().collect();
    for d in &plan.dynamic_fields {
        fields.extend(d.children.iter());
    }
    fields
        .into_iter()
        .map(|f| (format!("{}_{}", f.source_alias.to_ascii_lowercase(), f.property_name), f.resolved.rendered(), Some(f.provenance_comment())))
        .collect()
}

fn shared_shape(fields: &[(String, String, Option<String>)]) -> Vec<(String, String)> {
    fields.iter().map(|(n, t, _)| (n.clone(), t.clone())).collect()
}

fn returning_result_fields(
    stmt: &MutatingStatement,
    tables: &BTreeMap<String, CreateTableModel>,
    adapters: &mut AdapterRegistry,
    namespace: &str,
    config: &DatabaseConfig,
) -> GenResult<Vec<PlannedField>> {
    let table = tables.get(&stmt.table.to_ascii_lowercase());
    let names: Vec<String> = if stmt.returning_columns == vec!["*".to_string()] {
        table.map(|t| t.columns.iter().map(|c| c.name.clone()).collect()).unwrap_or_default()
    } else {
        stmt.returning_columns.clone()
    };

    let mut out = Vec::new();
    for name in &names {
        let col = table.and_then(|t| t.column(name));
        let resolved = match col {
            Some(col) => typing::resolve_column_type(&stmt.path, &col.name, Some(&col.sql_type), Some(col.not_null), true, &col.annotations, config)?,
            None => ResolvedType {
                kotlin_type: "String".to_string(),
                nullable: false,
                needs_adapter: false,
            },
        };
        let (to_fn, from_fn) = if resolved.needs_adapter {
            let sql_type = col.map(|c| c.sql_type.as_str()).unwrap_or("TEXT");
            let spec = adapters.register(namespace, name, sql_type, &resolved.kotlin_type, resolved.nullable);
            (Some(spec.to_sql_fn), Some(spec.from_sql_fn))
        } else {
            (None, None)
        };
        out.push(PlannedField {
            property_name: camel(name),
            resolved,
            source_alias: stmt.table.clone(),
            original_column_name: name.clone(),
            sql_type: col.map(|c| c.sql_type.clone()),
            adapter_from_sql_fn: from_fn,
            adapter_to_sql_fn: to_fn,
        });
    }
    Ok(out)
}

fn render_select_runner(
    select: &SelectStatement,
    plan: &ResultMappingPlan,
    params: &[ParamField],
    result_type: &str,
    adapters: &AdapterRegistry,
    namespace: &str,
    level: usize,
) -> String {
    let pad = indent(level);
    let body_pad = indent(level + 1);
    let mut out = format!("{pad}val sql: String = {:?}\n\n", select.sql);

    out.push_str(&format!("{pad}private fun bind(statement: SqlStatement, params: Params) {{\n"));
    for (i, p) in params.iter().enumerate() {
        out.push_str(&render_bind_line(&body_pad, i, p, adapters, namespace));
    }
    out.push_str(&format!("{pad}}}\n\n"));

    if plan.needs_joined_struct {
        out.push_str(&render_joined_read_fn(plan, result_type, &pad));
        out.push_str(&format!("{pad}fun asList(connection: SqlConnection, params: Params): List<{result_type}> {{\n"));
        out.push_str(&format!("{body_pad}val statement = connection.prepare(sql)\n"));
        out.push_str(&format!("{body_pad}try {{\n"));
        out.push_str(&format!("{}    bind(statement, params)\n", body_pad));
        out.push_str(&format!("{}    val grouped = LinkedHashMap<Any?, MutableList<ResultJoined>>()\n", body_pad));
        out.push_str(&format!("{}    while (statement.step()) {{\n", body_pad));
        out.push_str(&format!("{}        val row = readJoinedRow(statement)\n", body_pad));
        let key_expr = plan.grouping_key.clone().unwrap_or_else(|| "row".to_string());
        out.push_str(&format!("{}        grouped.getOrPut(row.{key_expr}) {{ mutableListOf() }}.add(row)\n", body_pad));
        out.push_str(&format!("{}    }}\n", body_pad));
        out.push_str(&format!("{}    return grouped.values.map {{ group -> hydrate(group) }}\n", body_pad));
        out.push_str(&format!("{body_pad}}} finally {{\n{body_pad}    statement.close()\n{body_pad}}}\n"));
        out.push_str(&format!("{pad}}}\n\n"));
    } else {
        out.push_str(&render_flat_read_fn_with_dynamic(&plan.regular_fields, &plan.dynamic_fields, result_type, &pad));
        out.push_str(&format!("{pad}fun asList(connection: SqlConnection, params: Params): List<{result_type}> {{\n"));
        out.push_str(&format!("{body_pad}val statement = connection.prepare(sql)\n"));
        out.push_str(&format!("{body_pad}try {{\n"));
        out.push_str(&format!("{}    bind(statement, params)\n", body_pad));
        out.push_str(&format!("{}    val rows = mutableListOf<{result_type}>()\n", body_pad));
        out.push_str(&format!("{}    while (statement.step()) {{ rows.add(readRow(statement)) }}\n", body_pad));
        out.push_str(&format!("{}    return rows\n", body_pad));
        out.push_str(&format!("{body_pad}}} finally {{\n{body_pad}    statement.close()\n{body_pad}}}\n"));
        out.push_str(&format!("{pad}}}\n\n"));
    }

    out.push_str(&format!(
        "{pad}fun asOne(connection: SqlConnection, params: Params): {result_type} {{\n\
         {body_pad}val rows = asList(connection, params)\n\
         {body_pad}check(rows.size == 1) {{ \"expected exactly one row, got ${{rows.size}}\" }}\n\
         {body_pad}return rows.first()\n\
         {pad}}}\n\n"
    ));
    out.push_str(&format!(
        "{pad}fun asOneOrNull(connection: SqlConnection, params: Params): {result_type}? {{\n\
         {body_pad}val rows = asList(connection, params)\n\
         {body_pad}check(rows.size <= 1) {{ \"expected at most one row, got ${{rows.size}}\" }}\n\
         {body_pad}return rows.firstOrNull()\n\
         {pad}}}\n\n"
    ));
    out.push_str(&format!(
        "{pad}fun asFlow(database: Database, params: Params): Flow<List<{result_type}>> =\n\
         {body_pad}database.reactiveFlow(affectedTables) {{ connection -> asList(connection, params) }}\n\n"
    ));
    out
}

fn render_bind_line(pad: &str, index: usize, p: &ParamField, adapters: &AdapterRegistry, namespace: &str) -> String {
    let position = index + 1;
    if p.is_collection {
        return format!("{pad}statement.bindText({position}, encodeJsonArray(params.{}))\n", p.name);
    }
    let value = if p.resolved.needs_adapter {
        let spec = adapters
            .by_namespace(namespace)
            .into_iter()
            .find(|s| s.to_sql_fn.starts_with(&p.name) || s.output_type == p.resolved.kotlin_type);
        match spec {
            Some(s) => format!("adapters.{}(params.{})", s.to_sql_fn, p.name),
            None => format!("params.{}", p.name),
        }
    } else {
        format!("params.{}", p.name)
    };
    let binder = bind_fn_for(&p.resolved.kotlin_type);
    if p.resolved.nullable {
        format!(
            "{pad}if ({value} == null) statement.bindNull({position}) else statement.{binder}({position}, {value})\n"
        )
    } else {
        format!("{pad}statement.{binder}({position}, {value})\n")
    }
}

fn bind_fn_for(kotlin_type: &str) -> &'static str {
    match kotlin_type {
        "Long" => "bindLong",
        "Double" => "bindDouble",
        "ByteArray" => "bindBlob",
        "Boolean" => "bindLong",
        _ => "bindText",
    }
}

fn get_fn_for(kotlin_type: &str) -> &'static str {
    match kotlin_type {
        "Long" => "getLong",
        "Double" => "getDouble",
        "ByteArray" => "getBlob",
        "Boolean" => "getLong",
        _ => "getText",
    }
}

fn render_flat_read_fn(fields: &[PlannedField], result_type: &str, pad: &str) -> String {
    render_flat_read_fn_with_dynamic(fields, &[], result_type, pad)
}

fn render_flat_read_fn_with_dynamic(fields: &[PlannedField], dynamic: &[crate::planner::DynamicFieldPlan], result_type: &str, pad: &str) -> String {
    let body_pad = format!("{pad}    ");
    let mut out = format!("{pad}private fun readRow(statement: SqlStatement): {result_type} {{\n");
    let mut index = 0usize;
    let mut args = Vec::new();
    for f in fields {
        let var = format!("col{index}");
        out.push_str(&render_column_read(&body_pad, &var, index, f));
        args.push(format!("{} = {var}", f.property_name));
        index += 1;
    }
    for d in dynamic {
        match d.role {
            DynamicRole::Collection => {
                args.push(format!("{} = {}", d.property_name, d.default_value.clone().unwrap_or_else(|| "emptyList()".to_string())));
            }
            DynamicRole::Entity | DynamicRole::PerRow => {
                let mut child_vars = Vec::new();
                for c in &d.children {
                    let var = format!("col{index}");
                    out.push_str(&render_column_read(&body_pad, &var, index, c));
                    child_vars.push((c.property_name.clone(), var));
                    index += 1;
                }
                render_dynamic_ctor(&mut out, &body_pad, d, &child_vars);
                args.push(format!("{} = {}", d.property_name, d.property_name));
            }
        }
    }
    out.push_str(&format!("{body_pad}return {result_type}(\n"));
    for a in &args {
        out.push_str(&format!("{body_pad}    {a},\n"));
    }
    out.push_str(&format!("{body_pad})\n"));
    out.push_str(&format!("{pad}}}\n\n"));
    out
}

/// Writes `val {d.property_name} = ...` constructing `d.property_type` from
/// `child_vars` (property name, already-bound local variable). A `PerRow`
/// field not marked `notNull` is only constructed when its first sibling
/// column is non-null, so a LEFT JOIN that missed yields `null` rather than
/// a struct of nulls.
fn render_dynamic_ctor(out: &mut String, body_pad: &str, d: &crate::planner::DynamicFieldPlan, child_vars: &[(String, String)]) {
    let guard = (d.role == DynamicRole::PerRow && !d.not_null).then(|| child_vars.first().map(|(_, v)| v.clone())).flatten();
    match &guard {
        Some(g) => out.push_str(&format!("{body_pad}val {} = if ({g} == null) null else {}(\n", d.property_name, d.property_type)),
        None => out.push_str(&format!("{body_pad}val {} = {}(\n", d.property_name, d.property_type)),
    }
    for (name, var) in child_vars {
        out.push_str(&format!("{body_pad}    {name} = {var},\n"));
    }
    out.push_str(&format!("{body_pad})\n"));
}

fn joined_field_ref(f: &PlannedField) -> String {
    format!("{}_{}", f.source_alias.to_ascii_lowercase(), f.property_name)
}

fn render_joined_read_fn(plan: &ResultMappingPlan, result_type: &str, pad: &str) -> String {
    let body_pad = format!("{pad}    ");
    let fields = joined_struct_fields(plan);
    let mut out = format!("{pad}private fun readJoinedRow(statement: SqlStatement): ResultJoined {{\n");
    let mut args = Vec::new();
    let mut all_planned: Vec<&PlannedField> = plan.regular_fields.iter().collect();
    for d in &plan.dynamic_fields {
        all_planned.extend(d.children.iter());
    }
    for (i, (field, (prop, _, _))) in all_planned.iter().zip(fields.iter()).enumerate() {
        let var = format!("col{i}");
        out.push_str(&render_column_read(&body_pad, &var, i, field));
        args.push(format!("{prop} = {var}"));
    }
    out.push_str(&format!("{body_pad}return ResultJoined(\n"));
    for a in &args {
        out.push_str(&format!("{body_pad}    {a},\n"));
    }
    out.push_str(&format!("{body_pad})\n"));
    out.push_str(&format!("{pad}}}\n\n"));

    out.push_str(&render_hydrate_fn(plan, result_type, pad, &body_pad));
    out
}

/// `hydrate` groups the joined rows belonging to one parent (spec §8
/// testable property 4: stable first-appearance order, no duplicate
/// children by `collectionKey`) and builds the real `result_type`, with
/// every dynamic field constructed from its own child columns rather than
/// aliased to the flattened join row.
fn render_hydrate_fn(plan: &ResultMappingPlan, result_type: &str, pad: &str, body_pad: &str) -> String {
    let mut out = format!("{pad}private fun hydrate(rows: List<ResultJoined>): {result_type} {{\n");
    out.push_str(&format!("{body_pad}val first = rows.first()\n"));
    for d in &plan.dynamic_fields {
        match d.role {
            DynamicRole::Collection => {
                let key = d.collection_key.as_deref().unwrap_or("id");
                let key_child = d
                    .children
                    .iter()
                    .find(|c| c.original_column_name.eq_ignore_ascii_case(key) || c.property_name.eq_ignore_ascii_case(&camel(key)));
                let key_ref = match key_child {
                    Some(c) => joined_field_ref(c),
                    None => format!("{}_{}", d.source_alias.to_ascii_lowercase(), camel(key)),
                };
                out.push_str(&format!("{body_pad}val {} = rows.distinctBy {{ it.{key_ref} }}.map {{ row ->\n", d.property_name));
                out.push_str(&format!("{body_pad}    {}(\n", d.property_type));
                for c in &d.children {
                    out.push_str(&format!("{body_pad}        {} = row.{},\n", c.property_name, joined_field_ref(c)));
                }
                out.push_str(&format!("{body_pad}    )\n"));
                out.push_str(&format!("{body_pad}}}\n"));
            }
            DynamicRole::Entity | DynamicRole::PerRow => {
                let guard = (d.role == DynamicRole::PerRow && !d.not_null)
                    .then(|| d.children.first().map(joined_field_ref))
                    .flatten();
                match &guard {
                    Some(g) => out.push_str(&format!("{body_pad}val {} = if (first.{g} == null) null else {}(\n", d.property_name, d.property_type)),
                    None => out.push_str(&format!("{body_pad}val {} = {}(\n", d.property_name, d.property_type)),
                }
                for c in &d.children {
                    out.push_str(&format!("{body_pad}    {} = first.{},\n", c.property_name, joined_field_ref(c)));
                }
                out.push_str(&format!("{body_pad})\n"));
            }
        }
    }
    out.push_str(&format!("{body_pad}return {result_type}(\n"));
    for f in &plan.regular_fields {
        out.push_str(&format!("{body_pad}    {} = first.{},\n", f.property_name, joined_field_ref(f)));
    }
    for d in &plan.dynamic_fields {
        out.push_str(&format!("{body_pad}    {} = {},\n", d.property_name, d.property_name));
    }
    out.push_str(&format!("{body_pad})\n"));
    out.push_str(&format!("{pad}}}\n\n"));
    out
}

fn render_column_read(pad: &str, var: &str, index: usize, f: &PlannedField) -> String {
    let position = index + 1;
    let getter = get_fn_for(&f.resolved.kotlin_type);
    let raw = if f.resolved.nullable {
        format!("if (statement.isNull({position})) null else statement.{getter}({position})")
    } else {
        format!("statement.{getter}({position})")
    };
    let value = match &f.adapter_from_sql_fn {
        Some(fn_name) => format!("adapters.{fn_name}({raw})"),
        None if f.resolved.kotlin_type == "Boolean" => format!("({raw}) != 0L"),
        None => raw,
    };
    format!("{pad}val {var} = {value}\n")
}

fn render_mutating_runner(
    stmt: &MutatingStatement,
    params: &[ParamField],
    returning_fields: &[PlannedField],
    adapters: &AdapterRegistry,
    namespace: &str,
    level: usize,
) -> String {
    let pad = indent(level);
    let body_pad = indent(level + 1);
    let mut out = format!("{pad}val sql: String = {:?}\n\n", stmt.sql);
    out.push_str(&format!("{pad}private fun bind(statement: SqlStatement, params: Params) {{\n"));
    for (i, p) in params.iter().enumerate() {
        out.push_str(&render_bind_line(&body_pad, i, p, adapters, namespace));
    }
    out.push_str(&format!("{pad}}}\n\n"));

    if stmt.has_returning {
        out.push_str(&format!(
            "{pad}fun list(connection: SqlConnection, params: Params): List<Result> {{\n\
             {body_pad}val statement = connection.prepare(sql)\n\
             {body_pad}try {{\n\
             {body_pad}    bind(statement, params)\n\
             {body_pad}    val rows = mutableListOf<Result>()\n\
             {body_pad}    while (statement.step()) {{ rows.add(readRow(statement)) }}\n\
             {body_pad}    return rows\n\
             {body_pad}}} finally {{\n\
             {body_pad}    statement.close()\n\
             {body_pad}}}\n\
             {pad}}}\n\n"
        ));
        out.push_str(&format!(
            "{pad}fun one(connection: SqlConnection, params: Params): Result {{\n\
             {body_pad}val rows = list(connection, params)\n\
             {body_pad}check(rows.size == 1) {{ \"expected exactly one row, got ${{rows.size}}\" }}\n\
             {body_pad}return rows.first()\n\
             {pad}}}\n\n"
        ));
        out.push_str(&format!(
            "{pad}fun oneOrNull(connection: SqlConnection, params: Params): Result? {{\n\
             {body_pad}val rows = list(connection, params)\n\
             {body_pad}check(rows.size <= 1) {{ \"expected at most one row, got ${{rows.size}}\" }}\n\
             {body_pad}return rows.firstOrNull()\n\
             {pad}}}\n\n"
        ));
        out.push_str(&format!(
            "{pad}operator fun invoke(connection: SqlConnection, params: Params): List<Result> = list(connection, params)\n\n"
        ));
        out.push_str(&render_flat_read_fn(returning_fields, "Result", &pad));
    } else {
        out.push_str(&format!(
            "{pad}fun execute(database: Database, params: Params) {{\n\
             {body_pad}database.transaction {{ connection ->\n\
             {body_pad}    val statement = connection.prepare(sql)\n\
             {body_pad}    try {{\n\
             {body_pad}        bind(statement, params)\n\
             {body_pad}        statement.step()\n\
             {body_pad}    }} finally {{\n\
             {body_pad}        statement.close()\n\
             {body_pad}    }}\n\
             {body_pad}}}\n\
             {body_pad}database.notifyTablesChanged(setOf(\"{}\"))\n\
             {pad}}}\n\n",
            stmt.table
        ));
    }
    out
}
