//! Ini-style settings text, as emitted by the join tool and as persisted
//! in provider state files.
//!
//! The format is deliberately small: `[section]` headers, `key = value`
//! pairs, `#`/`;` comments, and backslash line continuations (the join
//! tool wraps long registry values across lines).

use std::collections::BTreeMap;

/// The section the join tool writes host-wide settings into.
pub const GLOBAL_SECTION: &str = "global";

/// Join physical lines into logical lines, honoring trailing backslashes.
fn logical_lines(text: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut pending = String::new();

    for raw in text.lines() {
        let joined = if pending.is_empty() {
            raw.to_string()
        } else {
            format!("{}{}", pending, raw.trim_start())
        };

        if let Some(stripped) = joined.strip_suffix('\\') {
            pending = stripped.to_string();
        } else {
            lines.push(joined);
            pending.clear();
        }
    }

    if !pending.is_empty() {
        lines.push(pending);
    }

    lines
}

/// Parse all sections of an ini-style text into key/value maps.
pub fn parse_sections(text: &str) -> BTreeMap<String, BTreeMap<String, String>> {
    let mut sections: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
    let mut current: Option<String> = None;

    for line in logical_lines(text) {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if line.starts_with('[') && line.ends_with(']') {
            let name = line[1..line.len() - 1].trim().to_string();
            sections.entry(name.clone()).or_default();
            current = Some(name);
            continue;
        }

        if let (Some(section), Some((key, value))) = (&current, line.split_once('=')) {
            sections
                .entry(section.clone())
                .or_default()
                .insert(key.trim().to_string(), value.trim().to_string());
        }
    }

    sections
}

/// Parse one named section out of an ini-style text. Missing section
/// yields an empty map.
pub fn parse_section(text: &str, name: &str) -> BTreeMap<String, String> {
    parse_sections(text).remove(name).unwrap_or_default()
}

/// The section names present in an ini-style text, in sorted order.
pub fn section_names(text: &str) -> Vec<String> {
    parse_sections(text).into_keys().collect()
}

/// Render section maps back into ini-style text.
///
/// Output is deterministic (sections and keys in sorted order) so state
/// files do not churn on rewrite.
pub fn render_sections(sections: &BTreeMap<String, BTreeMap<String, String>>) -> String {
    let mut out = String::new();
    for (name, values) in sections {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&format!("[{}]\n", name));
        for (key, value) in values {
            out.push_str(&format!("{} = {}\n", key, value));
        }
    }
    out
}
