//! Plain-text formatting for this CLI's five commands. No JSON/raw mode
//! switch (spec §6 names a fixed human-readable exploration surface, not
//! a scriptable output contract).

use dbzero_core::{ObjectUuid, Value};

/// One line per prefix.
pub fn prefixes(names: &[String]) -> String {
    if names.is_empty() {
        return "(no prefixes)".to_string();
    }
    names.join("\n")
}

/// One line per class name.
pub fn classes(names: &[&str]) -> String {
    if names.is_empty() {
        return "(no classes declared for this prefix)".to_string();
    }
    names.join("\n")
}

/// One line per declared attribute name.
pub fn attributes(names: &[String]) -> String {
    if names.is_empty() {
        return "(no declared attributes)".to_string();
    }
    names.join("\n")
}

/// One line per dumped object: uuid followed by its declared attributes.
pub fn dump_row(uuid: ObjectUuid, attrs: &[(String, Option<Value>)]) -> String {
    let rendered: Vec<String> = attrs
        .iter()
        .map(|(name, value)| match value {
            Some(v) => format!("{name}={v:?}"),
            None => format!("{name}=<unset>"),
        })
        .collect();
    format!("{uuid} {}", rendered.join(" "))
}
