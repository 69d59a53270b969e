//! A static class manifest: a stand-in for the original implementation's
//! module-reflection class discovery (Design Notes: "memo.py's
//! bytecode-reflection mechanism... is not ported"). Class descriptors
//! are never persisted into a prefix (see `dbzero-engine::objectlog`'s
//! module doc), so an exploration tool started fresh has no way to learn
//! what classes exist short of being told; this manifest is that telling,
//! the same "explicit list instead of dynamic discovery" shape
//! `ClassDescriptorBuilder` already uses for attribute shape.

use std::path::Path;

use dbzero_core::{ClassUuid, DbZeroError, DbZeroResult};
use dbzero_objects::{ClassDescriptor, ClassDescriptorBuilder, ClassRegistry};
use serde::{Deserialize, Serialize};

/// One declared class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassEntry {
    /// Qualified name (module + display name), the same string
    /// `ClassUuid::from_qualified_name` hashes.
    pub name: String,
    /// Direct superclass's qualified name, if any.
    #[serde(default)]
    pub parent: Option<String>,
    /// Constructor-assigned attribute names, in declaration order.
    #[serde(default)]
    pub pos_vt: Vec<String>,
    /// Restrict `list-classes --prefix` to this one prefix. A class with
    /// no `prefix` is listed under every prefix.
    #[serde(default)]
    pub prefix: Option<String>,
}

/// Every class declared for one data directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassManifest {
    /// The declared classes. Listing order does not matter for
    /// registration: a class uuid is deterministic from its qualified
    /// name, so a child can name a parent that appears later in the file.
    #[serde(default)]
    pub class: Vec<ClassEntry>,
}

impl ClassManifest {
    /// Read and parse a manifest from `path`.
    pub fn load(path: &Path) -> DbZeroResult<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| DbZeroError::InvalidState { reason: format!("invalid class manifest at {}: {e}", path.display()) })
    }

    /// An empty manifest (used when `--classes` is omitted: only
    /// `list-prefixes` works without one).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build every entry's descriptor, without registering it anywhere.
    pub fn descriptors(&self) -> Vec<ClassDescriptor> {
        self.class
            .iter()
            .map(|entry| {
                let mut builder = ClassDescriptorBuilder::new(entry.name.clone());
                if let Some(parent) = &entry.parent {
                    builder = builder.parent(ClassUuid::from_qualified_name(parent));
                }
                for field in &entry.pos_vt {
                    builder = builder.pos_vt_field(field.clone());
                }
                builder.build()
            })
            .collect()
    }

    /// Register every declared class into `registry`.
    pub fn register_into(&self, registry: &ClassRegistry) {
        for descriptor in self.descriptors() {
            registry.register(descriptor);
        }
    }

    /// The declared entry named `name`, if any.
    pub fn find(&self, name: &str) -> Option<&ClassEntry> {
        self.class.iter().find(|c| c.name == name)
    }

    /// Every class visible from `prefix` (unscoped classes plus ones
    /// scoped to exactly this prefix).
    pub fn classes_in(&self, prefix: &str) -> Vec<&ClassEntry> {
        self.class.iter().filter(|c| c.prefix.as_deref().map_or(true, |p| p == prefix)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn loads_classes_and_resolves_parent_by_name() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("classes.toml");
        std::fs::write(
            &path,
            r#"
            [[class]]
            name = "app.Base"

            [[class]]
            name = "app.Child"
            parent = "app.Base"
            pos_vt = ["age"]
            "#,
        )
        .unwrap();

        let manifest = ClassManifest::load(&path).unwrap();
        let descriptors = manifest.descriptors();
        assert_eq!(descriptors.len(), 2);
        let child = descriptors.iter().find(|d| d.qualified_name() == "app.Child").unwrap();
        assert_eq!(child.parent(), Some(ClassUuid::from_qualified_name("app.Base")));
    }

    #[test]
    fn classes_in_filters_by_declared_prefix() {
        let manifest = ClassManifest {
            class: vec![
                ClassEntry { name: "app.Global".into(), parent: None, pos_vt: vec![], prefix: None },
                ClassEntry { name: "app.Scoped".into(), parent: None, pos_vt: vec![], prefix: Some("p1".into()) },
            ],
        };
        let names: Vec<&str> = manifest.classes_in("p1").iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["app.Global", "app.Scoped"]);
        let names2: Vec<&str> = manifest.classes_in("p2").iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names2, vec!["app.Global"]);
    }
}
