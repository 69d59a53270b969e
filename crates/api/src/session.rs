//! [`Session`]: one host binding's handle onto a single prefix.

use std::sync::Arc;

use dbzero_concurrency::{AtomicSession, LockedSession, Snapshot};
use dbzero_core::{DbZeroResult, ObjectUuid, TagKey, Value, WeakProxy};
use dbzero_engine::Engine;
use dbzero_objects::{ClassDescriptor, ClassRegistry};

use crate::query::Query;

/// A host binding's view onto one open prefix. Every method desugars to
/// exactly one `Engine` call against that prefix; `Session` adds no
/// semantics of its own beyond pinning the prefix name so callers don't
/// repeat it on every operation.
pub struct Session {
    engine: Arc<Engine>,
    prefix: String,
}

impl Session {
    /// Open `prefix` on `engine`, registering `classes` the first time
    /// this process opens it (idempotent otherwise, per
    /// `Engine::open_prefix`). `classes` replaces the bytecode-reflection
    /// class discovery the original implementation used: the host lists
    /// every class descriptor it wants available up front.
    pub fn open(engine: Arc<Engine>, prefix: impl Into<String>, writable: bool, classes: Vec<ClassDescriptor>) -> DbZeroResult<Self> {
        let prefix = prefix.into();
        engine.open_prefix(&prefix, writable, |registry: &ClassRegistry| {
            for class in classes {
                registry.register(class);
            }
        })?;
        Ok(Self { engine, prefix })
    }

    /// The prefix name this session is bound to.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Declare a named range index over `attr_name` (spec §4.6).
    pub fn declare_index(&self, index_name: &str, attr_name: &str) -> DbZeroResult<()> {
        self.engine.declare_index(&self.prefix, index_name, attr_name)
    }

    /// Create a new instance of `class`.
    pub fn create(&self, class: &ClassDescriptor) -> DbZeroResult<ObjectUuid> {
        self.engine.create_object(&self.prefix, class)
    }

    /// Write attribute `name` on `obj` to `value`.
    pub fn set_attr(&self, obj: ObjectUuid, class: &ClassDescriptor, name: &str, value: Value) -> DbZeroResult<()> {
        self.engine.set_attr(&self.prefix, obj, class, name, value)
    }

    /// Read attribute `name` on `obj`, or `None` if unset.
    pub fn get_attr(&self, obj: ObjectUuid, class: &ClassDescriptor, name: &str) -> DbZeroResult<Option<Value>> {
        Ok(self.engine.objects(&self.prefix)?.get_attr(obj, class, name))
    }

    /// Tag `obj` with `key`.
    pub fn add_tag(&self, obj: ObjectUuid, key: TagKey) -> DbZeroResult<()> {
        self.engine.add_tag(&self.prefix, obj, key)
    }

    /// Remove tag `key` from `obj`.
    pub fn remove_tag(&self, obj: ObjectUuid, key: &TagKey) -> DbZeroResult<()> {
        self.engine.remove_tag(&self.prefix, obj, key)
    }

    /// Delete `obj`.
    pub fn delete(&self, obj: ObjectUuid, class: &ClassDescriptor) -> DbZeroResult<()> {
        self.engine.delete_object(&self.prefix, obj, class)
    }

    /// Release the host cache's hold on `obj`, reclaiming it immediately
    /// if nothing else references it (spec §4.5/§8 scenario 5).
    pub fn clear_external_hold(&self, obj: ObjectUuid) -> DbZeroResult<()> {
        self.engine.clear_external_hold(&self.prefix, obj)
    }

    /// Look up `obj`, failing if it has been GC0-reclaimed.
    pub fn fetch(&self, obj: ObjectUuid) -> DbZeroResult<ObjectUuid> {
        self.engine.fetch(&self.prefix, obj)
    }

    /// Resolve a weak, cross-prefix proxy to its live target uuid.
    pub fn resolve_weak(&self, proxy: &WeakProxy) -> DbZeroResult<ObjectUuid> {
        self.engine.resolve_weak(proxy)
    }

    /// Read attribute `name` on `obj` as it existed at `snapshot`'s
    /// pinned state, rather than the session's live view (spec §4.3, §8
    /// "Snapshot isolation").
    pub fn get_attr_at(&self, snapshot: &Snapshot, obj: ObjectUuid, class: &ClassDescriptor, name: &str) -> DbZeroResult<Option<Value>> {
        Ok(self.engine.object_store_at(&self.prefix, snapshot)?.get_attr(obj, class, name))
    }

    /// Flush this prefix's pending mutations and commit, returning the
    /// new finalized state number.
    pub fn commit(&self) -> DbZeroResult<u64> {
        self.engine.commit(&self.prefix)
    }

    /// Begin an atomic section over this prefix (spec §4.3).
    pub fn begin_atomic(&self) -> DbZeroResult<AtomicSession> {
        self.engine.begin_atomic(&self.prefix)
    }

    /// Begin a locked session over every prefix this engine has open
    /// (spec §4.3 — locked sessions are engine-wide, not per-prefix).
    pub fn begin_locked(&self) -> DbZeroResult<LockedSession> {
        self.engine.begin_locked()
    }

    /// Pin a snapshot of this prefix at its current finalized state.
    /// Mutating through this session while a snapshot observer expects a
    /// stable view is the caller's responsibility to avoid; `Engine`
    /// itself does not bind snapshots to a read-only mode.
    pub fn snapshot(&self) -> DbZeroResult<Snapshot> {
        self.engine.snapshot(None)
    }

    /// Start composing a query against this session's prefix.
    pub fn query(&self) -> Query {
        Query::new(Arc::clone(&self.engine), self.prefix.clone())
    }
}
