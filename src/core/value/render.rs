// src/core/value/render.rs

//! Markdown rendering of key values.

use std::fmt::Write;

pub fn render_string(value: &str) -> String {
    format!("```{value}```")
}

/// A bullet list, in the order given.
pub fn render_list(items: &[String]) -> String {
    let mut out = String::new();
    for item in items {
        let _ = writeln!(out, "- `{item}`");
    }
    out
}

/// A bullet list sorted by member, so repeated renders are identical.
pub fn render_set(members: &[String]) -> String {
    let mut sorted = members.to_vec();
    sorted.sort();
    render_list(&sorted)
}

/// A score/value table in the order given, which for `ZRANGE` is by score.
pub fn render_zset(members: &[(f64, String)]) -> String {
    let mut out = String::from("| score | value |\n| --- | --- |\n");
    for (score, member) in members {
        let _ = writeln!(out, "| {score:.6} | `{member}` |");
    }
    out
}

/// A field/value table sorted by field.
pub fn render_hash(fields: &[(String, String)]) -> String {
    let mut sorted: Vec<&(String, String)> = fields.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));
    let mut out = String::from("| field | value |\n| --- | --- |\n");
    for (field, value) in sorted {
        let _ = writeln!(out, "| {field} | {value} |");
    }
    out
}

pub fn render_unknown(tag: &str) -> String {
    format!("Unknown data type: {tag}")
}
