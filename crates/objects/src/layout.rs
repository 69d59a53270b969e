//! Class descriptors and field-storage shapes (spec §4.4, "Object layout
//! engine").
//!
//! The original implementation discovers a class's constructor-assigned
//! attributes by disassembling `__init__`'s bytecode (see
//! `original_source/dbzero_ce/dbzero_ce/memo.py`'s `dis_init_assig`).
//! There is no bytecode to disassemble in a statically-compiled binding,
//! so [`ClassDescriptorBuilder`] replaces that discovery step with
//! explicit registration: the host binding calls `.pos_vt_field(name)`
//! for each attribute it already knows is assigned in the constructor,
//! and the rest of the pipeline (pre-allocated slots, migration of rare
//! attributes to `index_vt`) is unchanged.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use dbzero_core::{ClassUuid, PrefixUuid, ValueKind};

/// Where one attribute's values live on an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldShape {
    /// A pre-allocated positional slot, assigned on every instance
    /// (spec: attributes seen in the constructor's assignment set).
    PosVt(usize),
    /// A sparse, name-keyed slot added only when first written
    /// (attributes that "appear only rarely or only on some instances").
    IndexVt,
}

/// One attribute's declared shape and last-observed value kind. Schema is
/// inferred, not enforced (spec §1 Non-goals), so `value_kind` is
/// advisory: it records what the field layout engine has seen, not a
/// constraint checked at write time.
#[derive(Debug, Clone)]
pub struct AttributeDescriptor {
    /// Attribute name.
    pub name: String,
    /// Storage shape.
    pub shape: FieldShape,
    /// Last-observed value kind, if any value has been written yet.
    pub value_kind: Option<ValueKind>,
}

/// A class's attribute layout plus identity (spec §4.4/§4.5).
#[derive(Debug, Clone)]
pub struct ClassDescriptor {
    uuid: ClassUuid,
    qualified_name: String,
    parent: Option<ClassUuid>,
    singleton: bool,
    scoped_prefix: Option<PrefixUuid>,
    attributes: HashMap<String, AttributeDescriptor>,
    next_pos_vt_slot: usize,
}

impl ClassDescriptor {
    /// Stable class uuid.
    pub fn uuid(&self) -> ClassUuid {
        self.uuid
    }

    /// Fully-qualified name this class was registered under.
    pub fn qualified_name(&self) -> &str {
        &self.qualified_name
    }

    /// Direct superclass, if any.
    pub fn parent(&self) -> Option<ClassUuid> {
        self.parent
    }

    /// Whether exactly one instance of this class may exist per prefix
    /// (spec §4.5, "Singletons").
    pub fn is_singleton(&self) -> bool {
        self.singleton
    }

    /// The prefix this class is pinned to, if scoped (spec §4.4: "scoped
    /// types... create their values on that prefix regardless of the
    /// current default prefix").
    pub fn scoped_prefix(&self) -> Option<PrefixUuid> {
        self.scoped_prefix
    }

    /// Look up an attribute's current descriptor.
    pub fn attribute(&self, name: &str) -> Option<&AttributeDescriptor> {
        self.attributes.get(name)
    }

    /// Number of pre-allocated `pos_vt` slots.
    pub fn pos_vt_len(&self) -> usize {
        self.next_pos_vt_slot
    }

    /// Record that `name` was just written with `kind`, adding it as a
    /// sparse `index_vt` attribute if it isn't already declared (spec:
    /// "subsequent attributes... migrate to index_vt").
    pub fn observe_write(&mut self, name: &str, kind: ValueKind) {
        match self.attributes.get_mut(name) {
            Some(attr) => attr.value_kind = Some(kind),
            None => {
                self.attributes.insert(
                    name.to_string(),
                    AttributeDescriptor {
                        name: name.to_string(),
                        shape: FieldShape::IndexVt,
                        value_kind: Some(kind),
                    },
                );
            }
        }
    }
}

/// Builds a [`ClassDescriptor`], replacing bytecode-reflected
/// constructor-assignment discovery with explicit registration.
pub struct ClassDescriptorBuilder {
    qualified_name: String,
    parent: Option<ClassUuid>,
    singleton: bool,
    scoped_prefix: Option<PrefixUuid>,
    attributes: HashMap<String, AttributeDescriptor>,
    next_pos_vt_slot: usize,
}

impl ClassDescriptorBuilder {
    /// Start building a class registered under `qualified_name` (module +
    /// display name, per `ClassUuid::from_qualified_name`).
    pub fn new(qualified_name: impl Into<String>) -> Self {
        Self {
            qualified_name: qualified_name.into(),
            parent: None,
            singleton: false,
            scoped_prefix: None,
            attributes: HashMap::new(),
            next_pos_vt_slot: 0,
        }
    }

    /// Set the direct superclass.
    pub fn parent(mut self, parent: ClassUuid) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Mark this class as a singleton (spec §4.5).
    pub fn singleton(mut self) -> Self {
        self.singleton = true;
        self
    }

    /// Pin this class to a specific prefix (spec §4.4, "Scoped types").
    pub fn scoped_to(mut self, prefix: PrefixUuid) -> Self {
        self.scoped_prefix = Some(prefix);
        self
    }

    /// Register a constructor-assigned attribute, pre-allocating a
    /// `pos_vt` slot for it.
    pub fn pos_vt_field(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        let slot = self.next_pos_vt_slot;
        self.next_pos_vt_slot += 1;
        self.attributes.insert(
            name.clone(),
            AttributeDescriptor {
                name,
                shape: FieldShape::PosVt(slot),
                value_kind: None,
            },
        );
        self
    }

    /// Finish, deriving the class uuid from `qualified_name`.
    pub fn build(self) -> ClassDescriptor {
        ClassDescriptor {
            uuid: ClassUuid::from_qualified_name(&self.qualified_name),
            qualified_name: self.qualified_name,
            parent: self.parent,
            singleton: self.singleton,
            scoped_prefix: self.scoped_prefix,
            attributes: self.attributes,
            next_pos_vt_slot: self.next_pos_vt_slot,
        }
    }
}

/// Registry of every known class, keyed by uuid, with ancestor-chain
/// lookup for type-tag inheritance (spec §4.6: "a find(BaseClass, tag)
/// also returns subclass instances").
#[derive(Default)]
pub struct ClassRegistry {
    classes: DashMap<ClassUuid, Arc<ClassDescriptor>>,
}

impl ClassRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a class descriptor.
    pub fn register(&self, descriptor: ClassDescriptor) -> Arc<ClassDescriptor> {
        let handle = Arc::new(descriptor);
        self.classes.insert(handle.uuid(), Arc::clone(&handle));
        handle
    }

    /// Look up a class by uuid.
    pub fn get(&self, uuid: ClassUuid) -> Option<Arc<ClassDescriptor>> {
        self.classes.get(&uuid).map(|e| Arc::clone(&e))
    }

    /// `uuid`'s ancestor chain, nearest-first, including `uuid` itself.
    pub fn ancestors(&self, uuid: ClassUuid) -> Vec<ClassUuid> {
        let mut chain = vec![uuid];
        let mut current = uuid;
        while let Some(class) = self.get(current) {
            match class.parent() {
                Some(parent) => {
                    chain.push(parent);
                    current = parent;
                }
                None => break,
            }
        }
        chain
    }

    /// Whether `child` is `parent` or descends from it.
    pub fn is_subclass_of(&self, child: ClassUuid, parent: ClassUuid) -> bool {
        self.ancestors(child).contains(&parent)
    }

    /// Every currently-registered class descriptor. Used to seed a freshly
    /// constructed store's registry (e.g. a snapshot-bound replay) from an
    /// already-populated one, since class descriptors are never persisted
    /// or logged themselves.
    pub fn all(&self) -> Vec<Arc<ClassDescriptor>> {
        self.classes.iter().map(|e| Arc::clone(e.value())).collect()
    }
}
