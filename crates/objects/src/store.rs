//! Per-prefix object store: ties together class descriptors, records,
//! GC0 refcounting and tag postings into create/assign/delete operations
//! (spec §4.4/§4.5/§4.9).

use std::collections::HashMap;

use dashmap::DashMap;
use dbzero_core::{ClassUuid, DbZeroError, DbZeroResult, ObjectUuid, PrefixUuid, TagKey, Value};

use crate::gc0::{Gc0Registry, HoldKind};
use crate::layout::{ClassDescriptor, ClassRegistry};
use crate::record::ObjectRecord;
use crate::string_pool::StringPool;
use crate::tags::TagStore;

/// Owns every live object record in one prefix, plus the supporting
/// indexes (classes, GC0 counts, interned strings, tag postings).
/// Creation of a class whose [`ClassDescriptor::scoped_prefix`] differs
/// from `prefix` is rejected: scoped types are created on their pinned
/// prefix by routing the call to that prefix's `ObjectStore`, not by this
/// store reaching across prefixes.
pub struct ObjectStore {
    prefix: PrefixUuid,
    classes: ClassRegistry,
    gc: Gc0Registry,
    strings: StringPool,
    tags: TagStore,
    records: DashMap<ObjectUuid, ObjectRecord>,
    object_tags: DashMap<ObjectUuid, Vec<TagKey>>,
}

impl ObjectStore {
    /// A fresh, empty store for `prefix`.
    pub fn new(prefix: PrefixUuid) -> Self {
        Self {
            prefix,
            classes: ClassRegistry::new(),
            gc: Gc0Registry::new(),
            strings: StringPool::new(),
            tags: TagStore::new(),
            records: DashMap::new(),
            object_tags: DashMap::new(),
        }
    }

    /// The prefix this store belongs to.
    pub fn prefix(&self) -> PrefixUuid {
        self.prefix
    }

    /// Class registry for this prefix.
    pub fn classes(&self) -> &ClassRegistry {
        &self.classes
    }

    /// GC0 refcount registry for this prefix.
    pub fn gc(&self) -> &Gc0Registry {
        &self.gc
    }

    /// Interned tag-name string pool for this prefix.
    pub fn strings(&self) -> &StringPool {
        &self.strings
    }

    /// Tag posting lists for this prefix.
    pub fn tags(&self) -> &TagStore {
        &self.tags
    }

    /// Create a new instance of `class`. If `class` is a singleton, the
    /// uuid is the deterministic `ObjectUuid::singleton_of(class, prefix)`
    /// and creating it twice returns the same uuid (spec §4.5:
    /// "Singletons"). Registers one `external_ref` hold, modeling the
    /// caller's own freshly materialized reference to the object (spec
    /// §4.5: "External holds come from the host language binding");
    /// nothing else references it yet, so a `strong_ref` would be wrong
    /// here — see [`Self::clear_external_hold`] for the matching release.
    pub fn create(&self, class: &ClassDescriptor) -> DbZeroResult<ObjectUuid> {
        if let Some(scoped) = class.scoped_prefix() {
            if scoped != self.prefix {
                return Err(DbZeroError::InvalidState {
                    reason: format!(
                        "class {} is scoped to prefix {scoped}, cannot create on {}",
                        class.qualified_name(),
                        self.prefix
                    ),
                });
            }
        }
        let uuid = if class.is_singleton() {
            ObjectUuid::singleton_of(class.uuid(), self.prefix)
        } else {
            ObjectUuid::new()
        };
        if !self.records.contains_key(&uuid) {
            self.records.insert(uuid, ObjectRecord::new(uuid, class.uuid(), class.pos_vt_len()));
            self.gc.retain(uuid, HoldKind::External);
            for ancestor in self.classes.ancestors(class.uuid()) {
                self.tags.add(TagKey::Class(ancestor), uuid);
            }
        }
        Ok(uuid)
    }

    /// Like [`Self::create`], but with the object uuid supplied by the
    /// caller instead of generated. Used to replay a previously recorded
    /// creation (its uuid already committed elsewhere) without changing
    /// identity; singleton classes still resolve to their deterministic
    /// uuid regardless of `uuid`.
    pub fn create_with_uuid(&self, class: &ClassDescriptor, uuid: ObjectUuid) -> DbZeroResult<ObjectUuid> {
        if let Some(scoped) = class.scoped_prefix() {
            if scoped != self.prefix {
                return Err(DbZeroError::InvalidState {
                    reason: format!(
                        "class {} is scoped to prefix {scoped}, cannot create on {}",
                        class.qualified_name(),
                        self.prefix
                    ),
                });
            }
        }
        let uuid = if class.is_singleton() {
            ObjectUuid::singleton_of(class.uuid(), self.prefix)
        } else {
            uuid
        };
        if !self.records.contains_key(&uuid) {
            self.records.insert(uuid, ObjectRecord::new(uuid, class.uuid(), class.pos_vt_len()));
            self.gc.retain(uuid, HoldKind::External);
            for ancestor in self.classes.ancestors(class.uuid()) {
                self.tags.add(TagKey::Class(ancestor), uuid);
            }
        }
        Ok(uuid)
    }

    /// Read attribute `name` on `obj`'s current value, if the object and
    /// attribute both exist.
    pub fn get_attr(&self, obj: ObjectUuid, class: &ClassDescriptor, name: &str) -> Option<Value> {
        self.records.get(&obj)?.get_attr(class, name).cloned()
    }

    /// Write attribute `name` on `obj` to `value`. A `Value::Ref` target
    /// must already live in this same prefix's store; a missing target is
    /// reported here as a plain not-found (this store has no visibility
    /// into other prefixes to tell a dangling uuid from a foreign-prefix
    /// one — `dbzero-engine::Engine::set_attr` does that cross-prefix
    /// check before calling down to here, raising `CrossPrefixReference`
    /// when the target is found alive elsewhere). A non-empty weak
    /// container (`Value::List`/`Value::Tuple`) assigned into a scoped
    /// instance's field is rejected outright; an empty one is admitted
    /// as-is (spec §4.4/§4.9 auto-hardening: there is no out-of-line
    /// prefix tag on an empty container left to re-key).
    pub fn set_attr(&self, obj: ObjectUuid, class: &ClassDescriptor, name: &str, value: Value) -> DbZeroResult<()> {
        if let Some(target) = value.as_ref_target() {
            if !self.records.contains_key(&target) {
                return Err(DbZeroError::InvalidState {
                    reason: format!("object {target} not found in prefix {}", self.prefix),
                });
            }
        }
        if class.scoped_prefix().is_some() && matches!(value, Value::List(_) | Value::Tuple(_)) && !value.is_empty_weak_container() {
            return Err(DbZeroError::InvalidState {
                reason: format!(
                    "non-empty weak container cannot be hardened into scoped prefix {} (attribute '{name}')",
                    self.prefix
                ),
            });
        }
        let mut record = self
            .records
            .get_mut(&obj)
            .ok_or_else(|| DbZeroError::InvalidState {
                reason: format!("object {obj} not found in prefix {}", self.prefix),
            })?;

        let previous = record.get_attr(class, name).cloned();
        if let Some(new_target) = value.as_ref_target() {
            self.gc.retain(new_target, HoldKind::Strong);
        }
        record.set_attr(class, name, value);
        drop(record);
        if let Some(old_target) = previous.as_ref().and_then(Value::as_ref_target) {
            if self.gc.release(old_target, HoldKind::Strong) {
                self.reclaim(old_target);
            }
        }
        Ok(())
    }

    /// Release `obj`'s external hold, modeling the host-language binding
    /// dropping its cached reference to it (spec §4.5: "clearing the host
    /// cache decrements them"). If every counter is then zero, `obj` is
    /// reclaimed immediately, cascading to any child it strong-referenced
    /// whose own refcount also reaches zero (spec §8 scenario 5).
    pub fn clear_external_hold(&self, obj: ObjectUuid) {
        if self.gc.release(obj, HoldKind::External) {
            self.reclaim(obj);
        }
    }

    /// Look up `obj`, failing if it has been GC0-reclaimed (or never
    /// existed) rather than returning a stale identity (spec §8 scenario
    /// 5: "fetch(uuid(A)) fails").
    pub fn fetch(&self, obj: ObjectUuid) -> DbZeroResult<ObjectUuid> {
        if self.records.contains_key(&obj) {
            Ok(obj)
        } else {
            Err(DbZeroError::InvalidState {
                reason: format!("object {obj} not found in prefix {} (reclaimed or never created)", self.prefix),
            })
        }
    }

    /// Remove `uuid`'s record and its tag/type-tag postings. Shared by
    /// [`Self::reclaim`] (refcount hit zero) and [`Self::delete`]
    /// (explicit removal); callers are responsible for the GC0 entry and
    /// cascading to referenced children per their own semantics.
    fn evict_record(&self, uuid: ObjectUuid, record: &ObjectRecord, class: ClassUuid) {
        if let Some((_, tags)) = self.object_tags.remove(&uuid) {
            for tag in tags {
                self.tags.remove(&tag, uuid, &self.strings);
            }
        }
        for ancestor in self.classes.ancestors(class) {
            self.tags.remove(&TagKey::Class(ancestor), uuid, &self.strings);
        }
    }

    /// Reclaim `obj`: its record has already had its last GC0 hold
    /// released (the caller observed `release` return `true`). Removes
    /// the record and its postings, then releases a strong ref on every
    /// child it held a `Value::Ref` to, cascading the same reclamation to
    /// any child whose own counters thereby reach zero.
    fn reclaim(&self, obj: ObjectUuid) {
        let mut stack = vec![obj];
        while let Some(uuid) = stack.pop() {
            let Some((_, record)) = self.records.remove(&uuid) else {
                continue;
            };
            self.evict_record(uuid, &record, record.class());
            for value in record.pos_vt().iter().chain(record.index_vt().values()) {
                if let Some(target) = value.as_ref_target() {
                    if self.gc.release(target, HoldKind::Strong) {
                        stack.push(target);
                    }
                }
            }
        }
    }

    /// Tag `obj` with `key`, tracking the posting for cascade-on-delete.
    pub fn add_tag(&self, obj: ObjectUuid, key: TagKey) {
        self.tags.add(key.clone(), obj);
        self.object_tags.entry(obj).or_default().push(key);
    }

    /// Remove one tag from `obj`.
    pub fn remove_tag(&self, obj: ObjectUuid, key: &TagKey) {
        self.tags.remove(key, obj, &self.strings);
        if let Some(mut tags) = self.object_tags.get_mut(&obj) {
            tags.retain(|k| k != key);
        }
    }

    /// Delete `obj` unconditionally, regardless of its own GC0 counters:
    /// removes its record and every posting it carried, drops its own GC0
    /// entry outright (its counters stop mattering once it's gone), and
    /// releases a strong ref on every object it held a `Value::Ref` to,
    /// cascading reclamation into any child whose own counters reach zero
    /// as a result, in the same stop-on-fixpoint style as the teacher's
    /// index cleanup.
    pub fn delete(&self, obj: ObjectUuid, class: &ClassDescriptor) -> DbZeroResult<()> {
        let Some((_, record)) = self.records.remove(&obj) else {
            return Ok(());
        };
        self.evict_record(obj, &record, class.uuid());
        self.gc.forget(obj);
        for value in record.pos_vt().iter().chain(record.index_vt().values()) {
            if let Some(target) = value.as_ref_target() {
                if self.gc.release(target, HoldKind::Strong) {
                    self.reclaim(target);
                }
            }
        }
        Ok(())
    }

    /// Whether `obj` currently has a live record.
    pub fn contains(&self, obj: ObjectUuid) -> bool {
        self.records.contains_key(&obj)
    }

    /// Every live object uuid paired with its class, for scan-based
    /// query evaluation.
    pub fn all_objects(&self) -> HashMap<ObjectUuid, ClassUuid> {
        self.records.iter().map(|e| (*e.key(), e.value().class())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::ClassDescriptorBuilder;

    #[test]
    fn create_assigns_an_external_hold() {
        let store = ObjectStore::new(PrefixUuid::from_name("p"));
        let class = ClassDescriptorBuilder::new("app.Thing").build();
        let obj = store.create(&class).unwrap();
        assert!(!store.gc().is_reclaimable(obj));
        let counts = store.gc().counts(obj);
        assert_eq!(counts.external_holds, 1);
        assert_eq!(counts.strong_refs, 0);
    }

    #[test]
    fn singleton_create_is_idempotent() {
        let store = ObjectStore::new(PrefixUuid::from_name("p"));
        let class = ClassDescriptorBuilder::new("app.Config").singleton().build();
        let a = store.create(&class).unwrap();
        let b = store.create(&class).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn create_adds_a_type_tag_posting_for_every_registered_ancestor() {
        let store = ObjectStore::new(PrefixUuid::from_name("p"));
        let base = ClassDescriptorBuilder::new("app.Base").build();
        let base = store.classes().register(base);
        let child = ClassDescriptorBuilder::new("app.Child").parent(base.uuid()).build();
        let child = store.classes().register(child);

        let obj = store.create(&child).unwrap();
        assert!(store.tags().contains(&TagKey::Class(child.uuid()), obj));
        assert!(store.tags().contains(&TagKey::Class(base.uuid()), obj));
    }

    #[test]
    fn delete_removes_type_tag_postings() {
        let store = ObjectStore::new(PrefixUuid::from_name("p"));
        let class = ClassDescriptorBuilder::new("app.Thing").build();
        let class = store.classes().register(class);
        let obj = store.create(&class).unwrap();
        store.delete(obj, &class).unwrap();
        assert!(!store.tags().contains(&TagKey::Class(class.uuid()), obj));
    }

    #[test]
    fn assigning_unknown_ref_target_is_rejected() {
        let store = ObjectStore::new(PrefixUuid::from_name("p"));
        let class = ClassDescriptorBuilder::new("app.Thing").pos_vt_field("other").build();
        let obj = store.create(&class).unwrap();
        let ghost = ObjectUuid::new();
        let err = store.set_attr(obj, &class, "other", Value::Ref(ghost)).unwrap_err();
        assert!(matches!(err, DbZeroError::InvalidState { .. }));
    }

    #[test]
    fn assigning_a_live_ref_retains_it_and_reassigning_releases_the_old_one() {
        let store = ObjectStore::new(PrefixUuid::from_name("p"));
        let class = ClassDescriptorBuilder::new("app.Thing").pos_vt_field("other").build();
        let owner = store.create(&class).unwrap();
        let first = store.create(&class).unwrap();
        let second = store.create(&class).unwrap();

        store.set_attr(owner, &class, "other", Value::Ref(first)).unwrap();
        assert_eq!(store.gc().counts(first).strong_refs, 1);

        store.set_attr(owner, &class, "other", Value::Ref(second)).unwrap();
        // first no longer strong-referenced by `owner`, but its own
        // external (creation) hold still keeps it alive.
        assert_eq!(store.gc().counts(first).strong_refs, 0);
        assert!(!store.gc().is_reclaimable(first));
        assert_eq!(store.gc().counts(second).strong_refs, 1);
    }

    #[test]
    fn delete_cascades_strong_ref_release() {
        let store = ObjectStore::new(PrefixUuid::from_name("p"));
        let class = ClassDescriptorBuilder::new("app.Thing").pos_vt_field("other").build();
        let owner = store.create(&class).unwrap();
        let child = store.create(&class).unwrap();
        store.set_attr(owner, &class, "other", Value::Ref(child)).unwrap();

        store.delete(owner, &class).unwrap();
        assert!(!store.contains(owner));
        // child still alive from its own external (creation) hold.
        assert!(!store.gc().is_reclaimable(child));
        assert_eq!(store.gc().counts(child).strong_refs, 0);
        store.clear_external_hold(child);
        assert!(!store.contains(child));
    }

    #[test]
    fn clearing_external_hold_after_last_strong_ref_released_reclaims_the_object() {
        // Mirrors the "Create A, B with B.field = Ref(A); assign
        // B.field = None; clear the host cache; fetch(A) fails" scenario.
        let store = ObjectStore::new(PrefixUuid::from_name("p"));
        let class = ClassDescriptorBuilder::new("app.Thing").pos_vt_field("field").build();
        let a = store.create(&class).unwrap();
        let b = store.create(&class).unwrap();

        store.set_attr(b, &class, "field", Value::Ref(a)).unwrap();
        assert_eq!(store.gc().counts(a).strong_refs, 1);

        // Host clears its own cached handles to both objects.
        store.clear_external_hold(a);
        assert!(store.contains(a), "still strong-referenced by b");

        store.set_attr(b, &class, "field", Value::Null).unwrap();
        assert!(!store.contains(a));
        assert!(store.fetch(a).is_err());
    }

    #[test]
    fn non_empty_weak_container_cannot_be_hardened_into_a_scoped_instance() {
        let store = ObjectStore::new(PrefixUuid::from_name("p"));
        let class = ClassDescriptorBuilder::new("app.Thing")
            .pos_vt_field("items")
            .scoped_to(PrefixUuid::from_name("p"))
            .build();
        let obj = store.create(&class).unwrap();

        let err = store
            .set_attr(obj, &class, "items", Value::List(vec![Value::Int(1)]))
            .unwrap_err();
        assert!(matches!(err, DbZeroError::InvalidState { .. }));

        store.set_attr(obj, &class, "items", Value::List(vec![])).unwrap();
        assert_eq!(store.get_attr(obj, &class, "items"), Some(Value::List(vec![])));
    }
}
