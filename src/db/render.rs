//! Named placeholder rendering
//!
//! SQL is written with `:name` placeholders. Postgres only understands
//! positional `$n` parameters, so every distinct name is given an index in
//! order of first appearance and its value is pulled from the param map.

use crate::models::{AppError, AppResult};
use crate::queries::{SqlParams, SqlValue};

/// Rewrites `:name` placeholders to `$n` and returns the values in
/// positional order. `::` casts and quoted text are left untouched.
pub fn render(sql: &str, params: &SqlParams) -> AppResult<(String, Vec<SqlValue>)> {
    let chars: Vec<char> = sql.chars().collect();
    let mut out = String::with_capacity(sql.len());
    let mut names: Vec<String> = Vec::new();
    let mut values: Vec<SqlValue> = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\'' | '"' => {
                // copy the quoted run verbatim, doubled quotes included
                out.push(c);
                i += 1;
                while i < chars.len() {
                    out.push(chars[i]);
                    if chars[i] == c {
                        if i + 1 < chars.len() && chars[i + 1] == c {
                            out.push(c);
                            i += 2;
                            continue;
                        }
                        break;
                    }
                    i += 1;
                }
                i += 1;
            }
            ':' if chars.get(i + 1) == Some(&':') => {
                out.push_str("::");
                i += 2;
            }
            ':' if chars
                .get(i + 1)
                .map(|n| n.is_ascii_alphabetic() || *n == '_')
                .unwrap_or(false) =>
            {
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && (chars[end].is_ascii_alphanumeric() || chars[end] == '_') {
                    end += 1;
                }
                let name: String = chars[start..end].iter().collect();
                let index = match names.iter().position(|n| *n == name) {
                    Some(pos) => pos + 1,
                    None => {
                        let value = params
                            .get(&name)
                            .cloned()
                            .ok_or_else(|| AppError::missing_param(&name))?;
                        names.push(name);
                        values.push(value);
                        names.len()
                    }
                };
                out.push('$');
                out.push_str(&index.to_string());
                i = end;
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    Ok((out, values))
}
