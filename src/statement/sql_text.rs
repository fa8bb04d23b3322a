//! Shared raw-text helpers for statement parsing: masking string literals
//! and comments so regex/offset scanning never misfires inside them, and
//! named-parameter discovery built on top of that mask.
//!
//! Leans on cached regexes over raw SQL text rather than deep AST matching,
//! which sqlparser's SQLite coverage doesn't always need.

/// Replace the contents of string literals and comments with spaces,
/// preserving byte length and all non-masked characters, so callers can run
/// regexes/offset math against the mask and index back into the original.
pub fn mask(sql: &str) -> String {
    let mut out: Vec<char> = sql.chars().collect();
    let n = out.len();
    #[derive(Clone, Copy, PartialEq)]
    enum St {
        Normal,
        Line,
        Block,
        Single,
        Double,
    }
    let mut state = St::Normal;
    let mut i = 0;
    while i < n {
        let c = out[i];
        match state {
            St::Normal => {
                if c == '-' && i + 1 < n && out[i + 1] == '-' {
                    state = St::Line;
                    out[i] = ' ';
                } else if c == '/' && i + 1 < n && out[i + 1] == '*' {
                    state = St::Block;
                    out[i] = ' ';
                } else if c == '\'' {
                    state = St::Single;
                } else if c == '"' {
                    state = St::Double;
                }
            }
            St::Line => {
                if c == '\n' {
                    state = St::Normal;
                } else {
                    out[i] = ' ';
                }
            }
            St::Block => {
                if c == '*' && i + 1 < n && out[i + 1] == '/' {
                    out[i] = ' ';
                    out[i + 1] = ' ';
                    i += 1;
                    state = St::Normal;
                } else {
                    out[i] = ' ';
                }
            }
            St::Single => {
                if c == '\'' {
                    if i + 1 < n && out[i + 1] == '\'' {
                        out[i] = ' ';
                        out[i + 1] = ' ';
                        i += 1;
                    } else {
                        out[i] = ' ';
                        state = St::Normal;
                    }
                } else {
                    out[i] = ' ';
                }
            }
            St::Double => {
                if c == '"' {
                    out[i] = ' ';
                    state = St::Normal;
                } else {
                    out[i] = ' ';
                }
            }
        }
        i += 1;
    }
    out.into_iter().collect()
}

/// Collapse 2+ consecutive blank lines to a single newline. Some SQL
/// parsers truncate statements on blank-line runs; spec §4.D calls this
/// out as a required pre-normalization step.
pub fn normalize_blank_lines(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut blank_run = 0;
    for line in sql.split('\n') {
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line);
        out.push('\n');
    }
    out
}

/// A named parameter occurrence: its name and the byte offset of the `:`
/// sigil in the original (unmasked) text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamOccurrence {
    pub name: String,
    pub offset: usize,
    pub len: usize, // length of `:name` including the sigil
}

/// Find every `:name` occurrence outside strings/comments. A `::` (as in a
/// Postgres-style cast, not meaningful in SQLite but harmless to exclude)
/// is never treated as a parameter sigil.
pub fn find_named_params(sql: &str) -> Vec<ParamOccurrence> {
    let masked = mask(sql);
    let chars: Vec<char> = sql.chars().collect();
    let masked_chars: Vec<char> = masked.chars().collect();
    let n = chars.len();
    let mut out = Vec::new();
    let mut byte_offset = 0usize;
    let mut char_to_byte = Vec::with_capacity(n + 1);
    for c in &chars {
        char_to_byte.push(byte_offset);
        byte_offset += c.len_utf8();
    }
    char_to_byte.push(byte_offset);

    let mut i = 0;
    while i < n {
        if masked_chars[i] == ':' && (i + 1 >= n || masked_chars[i + 1] != ':') && (i == 0 || masked_chars[i - 1] != ':') {
            let mut j = i + 1;
            while j < n && (chars[j].is_alphanumeric() || chars[j] == '_') {
                j += 1;
            }
            if j > i + 1 {
                let name: String = chars[i + 1..j].iter().collect();
                out.push(ParamOccurrence {
                    name,
                    offset: char_to_byte[i],
                    len: char_to_byte[j] - char_to_byte[i],
                });
                i = j;
                continue;
            }
        }
        i += 1;
    }
    out
}

/// Extract `CAST(:param AS TYPE)` hints: the declared type a query author
/// pins a parameter to, for statements where the column it ultimately
/// binds to can't be inferred any other way (spec §4.D/§4.F).
pub fn extract_cast_hints(sql: &str) -> std::collections::BTreeMap<String, String> {
    use once_cell::sync::Lazy;
    use regex::Regex;
    static RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?is)CAST\s*\(\s*:([A-Za-z_]\w*)\s+AS\s+([A-Za-z_][\w ]*?)\s*\)").unwrap());
    let mut out = std::collections::BTreeMap::new();
    for cap in RE.captures_iter(sql) {
        out.insert(cap[1].to_string(), cap[2].trim().to_string());
    }
    out
}

/// Split `text` on commas that are not nested inside `(...)` or a quoted
/// string (text is assumed already mask-safe, i.e. either masked itself or
/// known not to contain relevant string literals).
pub fn split_top_level(text: &str, sep: char) -> Vec<String> {
    let mut depth = 0i32;
    let mut parts = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        match c {
            '(' => {
                depth += 1;
                current.push(c);
            }
            ')' => {
                depth -= 1;
                current.push(c);
            }
            c if c == sep && depth <= 0 => {
                parts.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() || !parts.is_empty() {
        parts.push(current);
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_strings_and_comments() {
        let sql = "SELECT 'a:b' -- :c\nFROM t WHERE x = :p";
        let masked = mask(sql);
        assert!(!masked.contains(':'));
        let params = find_named_params(sql);
        assert_eq!(params.len(), 1);
        assert_eq!(params[0].name, "p");
    }

    #[test]
    fn finds_duplicate_named_params() {
        let sql = "SELECT * FROM t WHERE a = :id OR b = :id";
        let params = find_named_params(sql);
        assert_eq!(params.len(), 2);
        assert_eq!(params[0].name, "id");
        assert_eq!(params[1].name, "id");
    }

    #[test]
    fn normalizes_blank_line_runs() {
        let sql = "SELECT 1\n\n\n\nFROM t";
        let normalized = normalize_blank_lines(sql);
        assert_eq!(normalized, "SELECT 1\n\nFROM t\n");
    }

    #[test]
    fn splits_top_level_respecting_parens() {
        let parts = split_top_level("a, f(b, c), d", ',');
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[1].trim(), "f(b, c)");
    }
}
