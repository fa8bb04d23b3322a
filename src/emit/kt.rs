//! Small Kotlin text-rendering helpers shared by the emit submodules.

use heck::{ToLowerCamelCase, ToUpperCamelCase};

pub fn pascal(s: &str) -> String {
    s.to_upper_camel_case()
}

pub fn camel(s: &str) -> String {
    s.to_lower_camel_case()
}

pub fn indent(level: usize) -> String {
    "    ".repeat(level)
}

/// Render a Kotlin `data class` with one constructor argument per line and a
/// trailing provenance comment on each (spec §4.H "must be emitted for
/// every argument").
pub fn render_data_class(name: &str, fields: &[(String, String, Option<String>)], level: usize) -> String {
    let pad = indent(level);
    let field_pad = indent(level + 1);
    if fields.is_empty() {
        return format!("{pad}data class {name}(private val _unused: Unit = Unit)\n");
    }
    let mut out = format!("{pad}data class {name}(\n");
    for (i, (prop, ty, comment)) in fields.iter().enumerate() {
        let comma = if i + 1 == fields.len() { "" } else { "," };
        match comment {
            Some(c) => out.push_str(&format!("{field_pad}val {prop}: {ty}{comma} // {c}\n")),
            None => out.push_str(&format!("{field_pad}val {prop}: {ty}{comma}\n")),
        }
    }
    out.push_str(&format!("{pad})\n"));
    out
}
