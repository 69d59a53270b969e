//! One function per subcommand. Each returns the line(s) to print;
//! `main.rs` owns exit-code translation.

use std::path::Path;

use dbzero_core::{ClassUuid, DbZeroError, DbZeroResult};
use dbzero_engine::Engine;

use crate::format;
use crate::manifest::ClassManifest;

/// `list-prefixes`: every subdirectory of `db_dir` that holds a prefix's
/// on-disk store (the same `base.dat` marker `ConcurrencyManager::open`
/// checks to decide create-vs-recover).
pub fn list_prefixes(db_dir: &Path) -> DbZeroResult<String> {
    let mut names = Vec::new();
    if db_dir.exists() {
        for entry in std::fs::read_dir(db_dir)? {
            let entry = entry?;
            if entry.path().is_dir() && entry.path().join("base.dat").exists() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
    }
    names.sort();
    Ok(format::prefixes(&names))
}

/// `list-classes --prefix P`: every manifest-declared class visible from
/// `prefix` (unscoped, or scoped to exactly this prefix).
pub fn list_classes(classes: &ClassManifest, prefix: &str) -> String {
    let names: Vec<&str> = classes.classes_in(prefix).iter().map(|c| c.name.as_str()).collect();
    format::classes(&names)
}

/// `list-attributes --class C`: the manifest's declared `pos_vt` fields
/// for `class`. Dynamically-appeared `index_vt` attributes on actual
/// instances are not listed here — this command reports declared shape,
/// the same "schema inferred, not enforced" split the engine itself
/// keeps (spec §1 Non-goals).
pub fn list_attributes(classes: &ClassManifest, class: &str) -> DbZeroResult<String> {
    let entry = classes.find(class).ok_or(DbZeroError::ClassNotFound { class: ClassUuid::from_qualified_name(class) })?;
    Ok(format::attributes(&entry.pos_vt))
}

/// `dump --class C`: every instance of `class` across every prefix in
/// `db_dir`, with its declared attributes.
pub fn dump(engine: &Engine, db_dir: &Path, classes: &ClassManifest, class: &str) -> DbZeroResult<String> {
    let entry = classes.find(class).ok_or(DbZeroError::ClassNotFound { class: ClassUuid::from_qualified_name(class) })?;
    let class_uuid = ClassUuid::from_qualified_name(class);

    let mut lines = Vec::new();
    let prefixes: Vec<String> = std::fs::read_dir(db_dir)?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir() && e.path().join("base.dat").exists())
        .filter_map(|e| e.file_name().to_str().map(str::to_string))
        .collect();

    for prefix_name in prefixes {
        let store = engine.open_prefix(&prefix_name, false, |registry| {
            classes.register_into(registry);
        })?;
        let descriptor = match store.classes().get(class_uuid) {
            Some(d) => d,
            None => continue,
        };
        for (uuid, uuid_class) in store.all_objects() {
            if uuid_class != class_uuid {
                continue;
            }
            let attrs: Vec<(String, Option<dbzero_core::Value>)> =
                entry.pos_vt.iter().map(|name| (name.clone(), store.get_attr(uuid, &descriptor, name))).collect();
            lines.push(format::dump_row(uuid, &attrs));
        }
    }

    if lines.is_empty() {
        Ok(format!("(no instances of {class} found)"))
    } else {
        Ok(lines.join("\n"))
    }
}

/// `queries --module M`: DBZero has no persisted, named query registry
/// (`dbzero-api::Query` trees are composed in host code, not declared
/// anywhere this CLI can discover); this always reports an empty list
/// rather than failing, matching the other `list-*` commands' behavior
/// on an empty result.
pub fn queries(module: &str) -> String {
    format!("(no queries registered for module '{module}': DBZero has no query-module registry; compose queries in host code via dbzero-api::Query)")
}
