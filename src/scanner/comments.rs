//! Top-level `;`-statement splitting with comment-boundary tracking.
//!
//! A hand-rolled scanner rather than `sqlparser`'s tokenizer: schema files
//! may contain syntax the parser doesn't need to understand yet (we only
//! need to know where comments, string literals and parentheses are, not
//! build an AST), and we need the *raw* text of each statement including
//! any inline `-- @@{...}` comments for the annotation parser to pick up
//! downstream.

use std::path::{Path, PathBuf};

/// One `;`-terminated statement extracted from a schema/init/migration file,
/// plus whatever comment immediately preceded it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawStatement {
    pub path: PathBuf,
    /// The statement's own SQL text, comments inside it (e.g. per-column
    /// annotations) left intact.
    pub sql: String,
    /// Comment block(s) immediately above the statement, joined in source
    /// order. `None` if the statement has no leading comment.
    pub leading_comment: Option<String>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum State {
    Normal,
    LineComment,
    BlockComment,
    SingleQuoted,
    DoubleQuoted,
}

/// Split `text` into top-level statements on un-quoted, un-nested `;`.
pub fn split_top_level_statements(path: &Path, text: &str) -> Vec<RawStatement> {
    let chars: Vec<char> = text.chars().collect();
    let n = chars.len();
    let mut is_comment = vec![false; n];
    let mut state = State::Normal;
    let mut paren_depth: i32 = 0;
    let mut split_points: Vec<usize> = Vec::new();

    let mut i = 0;
    while i < n {
        let c = chars[i];
        match state {
            State::Normal => {
                if c == '-' && i + 1 < n && chars[i + 1] == '-' {
                    state = State::LineComment;
                    is_comment[i] = true;
                } else if c == '/' && i + 1 < n && chars[i + 1] == '*' {
                    state = State::BlockComment;
                    is_comment[i] = true;
                } else if c == '\'' {
                    state = State::SingleQuoted;
                } else if c == '"' {
                    state = State::DoubleQuoted;
                } else if c == '(' {
                    paren_depth += 1;
                } else if c == ')' {
                    paren_depth -= 1;
                } else if c == ';' && paren_depth <= 0 {
                    split_points.push(i);
                }
            }
            State::LineComment => {
                is_comment[i] = true;
                if c == '\n' {
                    state = State::Normal;
                }
            }
            State::BlockComment => {
                is_comment[i] = true;
                if c == '*' && i + 1 < n && chars[i + 1] == '/' {
                    is_comment[i + 1] = true;
                    i += 1;
                    state = State::Normal;
                }
            }
            State::SingleQuoted => {
                if c == '\'' {
                    // doubled '' is an escaped quote, stay quoted
                    if i + 1 < n && chars[i + 1] == '\'' {
                        i += 1;
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::DoubleQuoted => {
                if c == '"' {
                    state = State::Normal;
                }
            }
        }
        i += 1;
    }

    let mut statements = Vec::new();
    let mut seg_start = 0usize;
    let mut boundaries = split_points.clone();
    boundaries.push(n); // trailing segment without a terminating ';'

    for end in boundaries {
        let segment: &[char] = &chars[seg_start..end];
        if let Some(stmt) = extract_statement(path, segment, &is_comment[seg_start..end]) {
            statements.push(stmt);
        }
        seg_start = end + 1;
    }
    statements
}

fn extract_statement(path: &Path, segment: &[char], comment_mask: &[bool]) -> Option<RawStatement> {
    // Find where the leading comment/whitespace run ends and real SQL begins.
    let mut sql_start = 0usize;
    while sql_start < segment.len() {
        let c = segment[sql_start];
        if comment_mask[sql_start] || c.is_whitespace() {
            sql_start += 1;
        } else {
            break;
        }
    }
    if sql_start >= segment.len() {
        return None; // comment-only or empty segment, nothing to split out
    }
    let leading_raw: String = segment[..sql_start].iter().collect();
    let leading_comment = normalize_leading_comment(&leading_raw);
    let sql: String = segment[sql_start..].iter().collect();
    let sql = sql.trim_end().to_string();
    if sql.is_empty() {
        return None;
    }
    Some(RawStatement {
        path: path.to_path_buf(),
        sql,
        leading_comment,
    })
}

/// Strip comment delimiters (`--`, `/* */`) from a leading-comment run and
/// join the remaining lines, dropping pure whitespace.
fn normalize_leading_comment(raw: &str) -> Option<String> {
    let mut lines = Vec::new();
    for line in raw.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let stripped = trimmed
            .trim_start_matches("--")
            .trim_start_matches("/*")
            .trim_end_matches("*/")
            .trim();
        if !stripped.is_empty() {
            lines.push(stripped.to_string());
        }
    }
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn p() -> PathBuf {
        PathBuf::from("schema.sql")
    }

    #[test]
    fn splits_two_statements() {
        let text = "CREATE TABLE a(id INTEGER);\nCREATE TABLE b(id INTEGER);";
        let stmts = split_top_level_statements(&p(), text);
        assert_eq!(stmts.len(), 2);
        assert!(stmts[0].sql.starts_with("CREATE TABLE a"));
        assert!(stmts[1].sql.starts_with("CREATE TABLE b"));
    }

    #[test]
    fn captures_leading_comment() {
        let text = "-- a person table\nCREATE TABLE person(id INTEGER);";
        let stmts = split_top_level_statements(&p(), text);
        assert_eq!(stmts.len(), 1);
        assert_eq!(stmts[0].leading_comment.as_deref(), Some("a person table"));
    }

    #[test]
    fn semicolon_inside_string_not_a_split() {
        let text = "INSERT INTO t(x) VALUES('a;b');";
        let stmts = split_top_level_statements(&p(), text);
        assert_eq!(stmts.len(), 1);
    }

    #[test]
    fn preserves_inline_comment_in_sql() {
        let text = "CREATE TABLE t(\n  birth_date TEXT /* @@{ adapter } */\n);";
        let stmts = split_top_level_statements(&p(), text);
        assert_eq!(stmts.len(), 1);
        assert!(stmts[0].sql.contains("@@{ adapter }"));
    }
}
