//! [`Engine`]: the orchestrator tying storage, durability, concurrency,
//! objects, query and fast-query into one handle with explicit
//! `open`/`close` lifecycle (no global state: every engine instance is
//! independent, the way the teacher's `Database` is one handle per data
//! directory rather than a process-wide singleton).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};

use dbzero_concurrency::{AtomicSession, ConcurrencyManager, LockedSession, PrefixHandle, Snapshot};
use dbzero_core::{DbZeroError, DbZeroResult, ObjectUuid, PrefixUuid, TagKey, Value, WeakProxy};
use dbzero_fastquery::FastQueryCache;
use dbzero_objects::{ClassDescriptor, ClassRegistry, ObjectStore};
use dbzero_query::QuerySource;

use crate::config::{DbZeroConfig, CONFIG_FILE_NAME};
use crate::indexes::PrefixIndexes;
use crate::objectlog::{self, ObjectOp};
use crate::query_source::PrefixQuerySource;

struct PrefixRuntime {
    handle: Arc<PrefixHandle>,
    store: Arc<ObjectStore>,
    indexes: Arc<PrefixIndexes>,
    pending: Mutex<Vec<ObjectOp>>,
}

/// One open DBZero data directory. Construct via [`Engine::open`], and
/// call [`Engine::close`] before dropping to stop the background
/// autocommit thread cleanly (it is also stopped on `Drop`, but `close`
/// surfaces the final flush's errors).
pub struct Engine {
    manager: ConcurrencyManager,
    dir: PathBuf,
    config: DbZeroConfig,
    runtimes: Arc<DashMap<String, Arc<PrefixRuntime>>>,
    fastquery: FastQueryCache,
    autocommit: Mutex<Option<AutocommitThread>>,
    /// Errors raised by a background autocommit tick, queued here until
    /// the next synchronous call against the same prefix surfaces them
    /// (spec §7: "background autocommit errors are queued for the next
    /// synchronous operation to surface").
    autocommit_errors: Arc<DashMap<String, String>>,
}

struct AutocommitThread {
    stop: Arc<(Mutex<bool>, Condvar)>,
    handle: Option<JoinHandle<()>>,
}

impl AutocommitThread {
    fn stop_and_join(&mut self) {
        {
            let (lock, cvar) = &*self.stop;
            let mut guard = lock.lock();
            *guard = true;
            cvar.notify_all();
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for AutocommitThread {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}

impl Engine {
    /// Open (or create) a DBZero data directory, reading `dbzero.toml` if
    /// present and writing a default one if not.
    pub fn open(dir: impl Into<PathBuf>) -> DbZeroResult<Arc<Self>> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        let config_path = dir.join(CONFIG_FILE_NAME);
        DbZeroConfig::write_default_if_missing(&config_path)?;
        let config = DbZeroConfig::from_file(&config_path)?;
        Self::open_with_config(dir, config)
    }

    /// Open with an explicit config, bypassing `dbzero.toml` entirely
    /// (the config file is still not written in this path).
    pub fn open_with_config(dir: impl Into<PathBuf>, config: DbZeroConfig) -> DbZeroResult<Arc<Self>> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        let limits = config.limits()?;
        let manager = ConcurrencyManager::new(&dir, limits);
        let engine = Arc::new(Self {
            manager,
            dir,
            config,
            runtimes: Arc::new(DashMap::new()),
            fastquery: FastQueryCache::new(),
            autocommit: Mutex::new(None),
            autocommit_errors: Arc::new(DashMap::new()),
        });
        if engine.config.autocommit {
            engine.start_autocommit();
        }
        Ok(engine)
    }

    /// The data directory this engine is rooted at.
    pub fn root_dir(&self) -> &Path {
        &self.dir
    }

    /// The config this engine was opened with.
    pub fn config(&self) -> &DbZeroConfig {
        &self.config
    }

    /// The fast-query cache shared by every `group_by` call through this
    /// engine (spec §4.8: one cache per engine instance, not global).
    pub fn fastquery(&self) -> &FastQueryCache {
        &self.fastquery
    }

    fn start_autocommit(&self) {
        let dp_size = self.config.dp_size;
        let runtimes = Arc::clone(&self.runtimes);
        let errors = Arc::clone(&self.autocommit_errors);
        let interval = self.config.autocommit_interval();
        let stop = Arc::new((Mutex::new(false), Condvar::new()));
        let stop_for_thread = Arc::clone(&stop);
        let handle = std::thread::Builder::new()
            .name("dbzero-autocommit".to_string())
            .spawn(move || {
                let (lock, cvar) = &*stop_for_thread;
                let mut guard = lock.lock();
                loop {
                    let timed_out = cvar.wait_for(&mut guard, interval).timed_out();
                    if *guard {
                        break;
                    }
                    if !timed_out {
                        continue;
                    }
                    for entry in runtimes.iter() {
                        let rt = Arc::clone(entry.value());
                        if !rt.handle.autocommit_eligible() {
                            continue;
                        }
                        if rt.pending.lock().is_empty() && rt.handle.dirty_len() == 0 {
                            continue;
                        }
                        if let Err(e) = flush(&rt, dp_size) {
                            tracing::warn!(prefix = entry.key().as_str(), error = %e, "autocommit failed, queued for next synchronous call");
                            errors.insert(entry.key().clone(), e.to_string());
                        }
                    }
                }
            })
            .expect("failed to spawn autocommit thread");
        *self.autocommit.lock() = Some(AutocommitThread { stop, handle: Some(handle) });
    }

    /// Stop the background autocommit thread, if running.
    pub fn stop_autocommit(&self) {
        if let Some(mut thread) = self.autocommit.lock().take() {
            thread.stop_and_join();
        }
    }

    /// Open prefix `name` (creating its on-disk store on first use,
    /// recovering and replaying its object log on subsequent opens),
    /// registering classes via `register_classes` the first time this
    /// process opens it. Idempotent: later calls reuse the already
    /// loaded, in-memory `ObjectStore` and ignore `register_classes`.
    pub fn open_prefix(&self, name: &str, writable: bool, register_classes: impl FnOnce(&ClassRegistry)) -> DbZeroResult<Arc<ObjectStore>> {
        let handle = self.manager.open(name, writable)?;
        if let Some(existing) = self.runtimes.get(name) {
            return Ok(Arc::clone(&existing.store));
        }

        let store = Arc::new(ObjectStore::new(handle.uuid()));
        register_classes(store.classes());
        objectlog::replay(&handle, self.config.dp_size, &store)?;

        let runtime = Arc::new(PrefixRuntime {
            handle,
            store: Arc::clone(&store),
            indexes: Arc::new(PrefixIndexes::new()),
            pending: Mutex::new(Vec::new()),
        });
        self.runtimes.insert(name.to_string(), runtime);
        Ok(store)
    }

    /// Close prefix `name`. Any pending (uncommitted) mutations are left
    /// in place for the next `commit`/autocommit tick, matching
    /// `PrefixHandle::close`'s own refusal to discard dirty state.
    pub fn close_prefix(&self, name: &str) -> DbZeroResult<()> {
        self.manager.close(name)
    }

    /// Close every open prefix and stop the autocommit thread.
    pub fn close(&self) -> DbZeroResult<()> {
        self.stop_autocommit();
        for name in self.manager.known_prefixes() {
            if let Some(rt) = self.runtimes.get(&name) {
                if rt.handle.lifecycle() != dbzero_concurrency::Lifecycle::Closed {
                    self.manager.close(&name)?;
                }
            }
        }
        Ok(())
    }

    fn runtime(&self, prefix: &str) -> DbZeroResult<Arc<PrefixRuntime>> {
        if let Some((_, message)) = self.autocommit_errors.remove(prefix) {
            return Err(DbZeroError::InvalidState {
                reason: format!("background autocommit failed for prefix '{prefix}': {message}"),
            });
        }
        self.runtimes
            .get(prefix)
            .map(|e| Arc::clone(&e))
            .ok_or_else(|| DbZeroError::InvalidState { reason: format!("prefix '{prefix}' is not open") })
    }

    /// Declare a named range index over `attr_name` on prefix `name`
    /// (spec §4.6). Index content starts empty; it is only populated by
    /// subsequent `set_attr` calls through this engine, not backfilled
    /// from existing data.
    pub fn declare_index(&self, prefix: &str, index_name: &str, attr_name: &str) -> DbZeroResult<()> {
        self.runtime(prefix)?.indexes.declare(index_name, attr_name);
        Ok(())
    }

    /// Create a new instance of `class` on `prefix` (spec §4.4/§4.5).
    pub fn create_object(&self, prefix: &str, class: &ClassDescriptor) -> DbZeroResult<ObjectUuid> {
        let rt = self.runtime(prefix)?;
        let uuid = rt.store.create(class)?;
        rt.pending.lock().push(ObjectOp::Create { class: class.uuid(), uuid });
        Ok(uuid)
    }

    /// Write attribute `name` on `obj` to `value`, re-keying any range
    /// index declared over `name` and recording the mutation for replay.
    /// A `Value::Ref` target missing from `prefix`'s own store is checked
    /// against every other open prefix first: found alive elsewhere, the
    /// write is rejected as a genuine `CrossPrefixReference` (only this
    /// engine has the multi-prefix visibility to tell that apart from a
    /// plain dangling uuid, which `ObjectStore::set_attr` reports as
    /// `InvalidState` on its own).
    pub fn set_attr(&self, prefix: &str, obj: ObjectUuid, class: &ClassDescriptor, name: &str, value: Value) -> DbZeroResult<()> {
        let rt = self.runtime(prefix)?;
        if let Some(target) = value.as_ref_target() {
            if !rt.store.contains(target) {
                if let Some(foreign) = self.find_foreign_prefix(prefix, target) {
                    return Err(DbZeroError::CrossPrefixReference {
                        target,
                        target_prefix: foreign,
                        owner_prefix: rt.store.prefix(),
                    });
                }
            }
        }
        let previous = rt.store.get_attr(obj, class, name);
        rt.store.set_attr(obj, class, name, value.clone())?;
        rt.indexes.on_set_attr(name, obj, previous.as_ref(), &value);
        rt.pending.lock().push(ObjectOp::SetAttr { obj, class: class.uuid(), name: name.to_string(), value });
        Ok(())
    }

    /// Scan every open prefix other than `owner_prefix` for one whose
    /// store currently holds `target`, returning its `PrefixUuid`. Used to
    /// distinguish a genuinely cross-prefix reference from a plain
    /// dangling uuid before raising `CrossPrefixReference`.
    fn find_foreign_prefix(&self, owner_prefix: &str, target: ObjectUuid) -> Option<PrefixUuid> {
        for entry in self.runtimes.iter() {
            if entry.key() == owner_prefix {
                continue;
            }
            if entry.value().store.contains(target) {
                return Some(entry.value().store.prefix());
            }
        }
        None
    }

    /// Release `obj`'s external (host-cache) hold on `prefix`, reclaiming
    /// it immediately if that was its last live hold (spec §4.5/§8
    /// scenario 5). Not itself logged to the object log: a host binding
    /// that clears its cache mid-run and never restarts re-derives the
    /// same clears from its own liveness tracking, not from replay.
    pub fn clear_external_hold(&self, prefix: &str, obj: ObjectUuid) -> DbZeroResult<()> {
        self.runtime(prefix)?.store.clear_external_hold(obj);
        Ok(())
    }

    /// Look up `obj` on `prefix`, failing if it has been GC0-reclaimed.
    pub fn fetch(&self, prefix: &str, obj: ObjectUuid) -> DbZeroResult<ObjectUuid> {
        self.runtime(prefix)?.store.fetch(obj)
    }

    /// Resolve a weak, cross-prefix proxy to its live target uuid.
    /// Raises `ExpiredReference` if the proxy's prefix isn't open here or
    /// the target has since been reclaimed there (spec §3 "Weak proxy",
    /// §4.9).
    pub fn resolve_weak(&self, proxy: &WeakProxy) -> DbZeroResult<ObjectUuid> {
        for entry in self.runtimes.iter() {
            if entry.value().store.prefix() == proxy.prefix {
                return entry.value().store.fetch(proxy.target).map_err(|_| DbZeroError::ExpiredReference { target: proxy.target });
            }
        }
        Err(DbZeroError::ExpiredReference { target: proxy.target })
    }

    /// Reconstruct `prefix`'s object store as of `snapshot`'s pinned
    /// state, by replaying its object log through [`Snapshot::read`]
    /// instead of the live handle. The fresh store's class registry is
    /// seeded from the live one's (`ClassRegistry::all`), since class
    /// descriptors are never themselves logged. Gives `get_attr`/`find`
    /// an object-level binding to a snapshot, matching the storage-level
    /// one `Snapshot::read` already provides (spec §4.3, §8 "Snapshot
    /// isolation").
    pub fn object_store_at(&self, prefix: &str, snapshot: &Snapshot) -> DbZeroResult<ObjectStore> {
        let rt = self.runtime(prefix)?;
        let prefix_uuid = snapshot.prefix_uuid(prefix).unwrap_or_else(|| rt.store.prefix());
        let store = ObjectStore::new(prefix_uuid);
        for descriptor in rt.store.classes().all() {
            store.classes().register((*descriptor).clone());
        }
        objectlog::replay_at(snapshot, prefix, self.config.dp_size, &store)?;
        Ok(store)
    }

    /// Tag `obj` with `key`.
    pub fn add_tag(&self, prefix: &str, obj: ObjectUuid, key: TagKey) -> DbZeroResult<()> {
        let rt = self.runtime(prefix)?;
        rt.store.add_tag(obj, key.clone());
        rt.pending.lock().push(ObjectOp::AddTag { obj, key });
        Ok(())
    }

    /// Remove tag `key` from `obj`.
    pub fn remove_tag(&self, prefix: &str, obj: ObjectUuid, key: &TagKey) -> DbZeroResult<()> {
        let rt = self.runtime(prefix)?;
        rt.store.remove_tag(obj, key);
        rt.pending.lock().push(ObjectOp::RemoveTag { obj, key: key.clone() });
        Ok(())
    }

    /// Delete `obj` (spec §4.4/§4.5/§4.9 cascade release).
    pub fn delete_object(&self, prefix: &str, obj: ObjectUuid, class: &ClassDescriptor) -> DbZeroResult<()> {
        let rt = self.runtime(prefix)?;
        rt.store.delete(obj, class)?;
        rt.pending.lock().push(ObjectOp::Delete { obj, class: class.uuid() });
        Ok(())
    }

    /// Flush `prefix`'s pending object log and commit its durable store,
    /// returning the new finalized state number.
    pub fn commit(&self, prefix: &str) -> DbZeroResult<u64> {
        let rt = self.runtime(prefix)?;
        flush(&rt, self.config.dp_size)
    }

    /// Begin an atomic section over one prefix (spec §4.3).
    pub fn begin_atomic(&self, prefix: &str) -> DbZeroResult<AtomicSession> {
        self.manager.begin_atomic(prefix)
    }

    /// Begin a locked session over every open writable prefix (spec
    /// §4.3).
    pub fn begin_locked(&self) -> DbZeroResult<LockedSession> {
        self.manager.begin_locked()
    }

    /// Pin a snapshot over every open prefix (or the overrides in
    /// `pins`), per `ConcurrencyManager::snapshot`.
    pub fn snapshot(&self, pins: Option<HashMap<String, u64>>) -> DbZeroResult<Snapshot> {
        self.manager.snapshot(pins)
    }

    /// Block until `prefix` reaches `target`'s finalized state number.
    pub fn await_prefix_state(&self, prefix: &str, target: u64, timeout: Duration) -> DbZeroResult<bool> {
        self.manager.await_prefix_state(prefix, target, timeout)
    }

    /// A `QuerySource` over `prefix`'s current in-memory state, for
    /// `dbzero_query`/`dbzero_fastquery` evaluation.
    pub fn query_source(&self, prefix: &str) -> DbZeroResult<Arc<dyn QuerySource + Send + Sync>> {
        let rt = self.runtime(prefix)?;
        Ok(Arc::new(PrefixQuerySource::new(Arc::clone(&rt.store), Arc::clone(&rt.indexes))))
    }

    /// Direct access to `prefix`'s in-memory `ObjectStore`, for read-only
    /// inspection (`dbzero-cli`'s `dump`/`list-*` commands). Mutations
    /// must go through this engine's `create_object`/`set_attr`/etc. so
    /// the object log stays in sync; calling `ObjectStore` methods
    /// directly on this handle bypasses durability.
    pub fn objects(&self, prefix: &str) -> DbZeroResult<Arc<ObjectStore>> {
        Ok(Arc::clone(&self.runtime(prefix)?.store))
    }

    /// Every prefix name this engine has opened in its lifetime (open or
    /// closed).
    pub fn known_prefixes(&self) -> Vec<String> {
        self.manager.known_prefixes()
    }
}

fn flush(rt: &PrefixRuntime, dp_size: u32) -> DbZeroResult<u64> {
    let ops = std::mem::take(&mut *rt.pending.lock());
    objectlog::append(&rt.handle, dp_size, &ops)?;
    rt.handle.commit()
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbzero_objects::ClassDescriptorBuilder;
    use tempfile::tempdir;

    #[test]
    fn open_create_commit_reopen_replays_object_state() {
        let dir = tempdir().unwrap();
        let mut config = DbZeroConfig::default();
        config.autocommit = false;
        config.dp_size = 64;
        config.slab_size = 1 << 20;

        let engine = Engine::open_with_config(dir.path(), config.clone()).unwrap();
        let store = engine
            .open_prefix("p", true, |classes| {
                classes.register(ClassDescriptorBuilder::new("app.Thing").pos_vt_field("name").build());
            })
            .unwrap();
        let class = store.classes().get(dbzero_core::ClassUuid::from_qualified_name("app.Thing")).unwrap();
        let obj = engine.create_object("p", &class).unwrap();
        engine.set_attr("p", obj, &class, "name", Value::Str("hello".into())).unwrap();
        engine.commit("p").unwrap();
        engine.close_prefix("p").unwrap();

        let reopened = Engine::open_with_config(dir.path(), config).unwrap();
        let store2 = reopened
            .open_prefix("p", false, |classes| {
                classes.register(ClassDescriptorBuilder::new("app.Thing").pos_vt_field("name").build());
            })
            .unwrap();
        assert!(store2.contains(obj));
        assert_eq!(store2.get_attr(obj, &class, "name"), Some(Value::Str("hello".into())));
    }

    #[test]
    fn mutating_before_open_prefix_is_rejected() {
        let dir = tempdir().unwrap();
        let mut config = DbZeroConfig::default();
        config.autocommit = false;
        let engine = Engine::open_with_config(dir.path(), config).unwrap();
        let class = ClassDescriptorBuilder::new("app.Thing").build();
        assert!(engine.create_object("ghost", &class).is_err());
    }

    #[test]
    fn declared_index_round_trips_through_query_source() {
        let dir = tempdir().unwrap();
        let mut config = DbZeroConfig::default();
        config.autocommit = false;
        config.dp_size = 64;
        let engine = Engine::open_with_config(dir.path(), config).unwrap();
        let store = engine
            .open_prefix("p", true, |classes| {
                classes.register(ClassDescriptorBuilder::new("app.Thing").pos_vt_field("age").build());
            })
            .unwrap();
        let class = store.classes().get(dbzero_core::ClassUuid::from_qualified_name("app.Thing")).unwrap();
        engine.declare_index("p", "by_age", "age").unwrap();
        let obj = engine.create_object("p", &class).unwrap();
        engine.set_attr("p", obj, &class, "age", Value::Int(42)).unwrap();

        let source = engine.query_source("p").unwrap();
        let hits = source.range("by_age", Some(&Value::Int(42)), Some(&Value::Int(42)), false);
        assert_eq!(hits, vec![(Value::Int(42), obj)]);
    }

    #[test]
    fn queued_autocommit_error_surfaces_on_next_call_and_then_clears() {
        let dir = tempdir().unwrap();
        let mut config = DbZeroConfig::default();
        config.autocommit = false;
        let engine = Engine::open_with_config(dir.path(), config).unwrap();
        engine
            .open_prefix("p", true, |classes| {
                classes.register(ClassDescriptorBuilder::new("app.Thing").build());
            })
            .unwrap();
        engine.autocommit_errors.insert("p".to_string(), "disk full".to_string());

        let class = ClassDescriptorBuilder::new("app.Thing").build();
        assert!(engine.create_object("p", &class).is_err());
        // the queued error is consumed by the failed call above; the next call succeeds.
        assert!(engine.create_object("p", &class).is_ok());
    }

    #[test]
    fn clearing_external_hold_after_last_strong_ref_makes_fetch_fail() {
        let dir = tempdir().unwrap();
        let mut config = DbZeroConfig::default();
        config.autocommit = false;
        let engine = Engine::open_with_config(dir.path(), config).unwrap();
        engine
            .open_prefix("p", true, |classes| {
                classes.register(ClassDescriptorBuilder::new("app.Thing").pos_vt_field("field").build());
            })
            .unwrap();
        let store = engine.objects("p").unwrap();
        let class = store.classes().get(dbzero_core::ClassUuid::from_qualified_name("app.Thing")).unwrap();

        let a = engine.create_object("p", &class).unwrap();
        let b = engine.create_object("p", &class).unwrap();
        engine.set_attr("p", b, &class, "field", Value::Ref(a)).unwrap();
        engine.clear_external_hold("p", a).unwrap();
        assert!(engine.fetch("p", a).is_ok(), "still strong-referenced by b");

        engine.set_attr("p", b, &class, "field", Value::Null).unwrap();
        assert!(engine.fetch("p", a).is_err());
    }

    #[test]
    fn cross_prefix_reference_is_detected_when_target_lives_elsewhere() {
        let dir = tempdir().unwrap();
        let mut config = DbZeroConfig::default();
        config.autocommit = false;
        let engine = Engine::open_with_config(dir.path(), config).unwrap();
        let register = |classes: &ClassRegistry| {
            classes.register(ClassDescriptorBuilder::new("app.Thing").pos_vt_field("other").build());
        };
        engine.open_prefix("a", true, register).unwrap();
        engine.open_prefix("b", true, register).unwrap();

        let store_a = engine.objects("a").unwrap();
        let store_b = engine.objects("b").unwrap();
        let class_a = store_a.classes().get(dbzero_core::ClassUuid::from_qualified_name("app.Thing")).unwrap();
        let class_b = store_b.classes().get(dbzero_core::ClassUuid::from_qualified_name("app.Thing")).unwrap();

        let owner = engine.create_object("a", &class_a).unwrap();
        let foreign = engine.create_object("b", &class_b).unwrap();

        let err = engine.set_attr("a", owner, &class_a, "other", Value::Ref(foreign)).unwrap_err();
        assert!(matches!(err, DbZeroError::CrossPrefixReference { .. }));

        let ghost = ObjectUuid::new();
        let err = engine.set_attr("a", owner, &class_a, "other", Value::Ref(ghost)).unwrap_err();
        assert!(matches!(err, DbZeroError::InvalidState { .. }));
    }

    #[test]
    fn resolve_weak_succeeds_live_and_expires_after_reclamation() {
        let dir = tempdir().unwrap();
        let mut config = DbZeroConfig::default();
        config.autocommit = false;
        let engine = Engine::open_with_config(dir.path(), config).unwrap();
        engine
            .open_prefix("p", true, |classes| {
                classes.register(ClassDescriptorBuilder::new("app.Thing").build());
            })
            .unwrap();
        let store = engine.objects("p").unwrap();
        let class = store.classes().get(dbzero_core::ClassUuid::from_qualified_name("app.Thing")).unwrap();
        let obj = engine.create_object("p", &class).unwrap();
        let proxy = WeakProxy { prefix: store.prefix(), target: obj };

        assert_eq!(engine.resolve_weak(&proxy).unwrap(), obj);
        engine.clear_external_hold("p", obj).unwrap();
        let err = engine.resolve_weak(&proxy).unwrap_err();
        assert!(matches!(err, DbZeroError::ExpiredReference { .. }));
        // the proxy's own fields remain readable after expiration.
        assert_eq!(proxy.target, obj);
    }

    #[test]
    fn object_store_at_binds_get_attr_to_a_pinned_snapshot() {
        let dir = tempdir().unwrap();
        let mut config = DbZeroConfig::default();
        config.autocommit = false;
        config.dp_size = 64;
        let engine = Engine::open_with_config(dir.path(), config).unwrap();
        engine
            .open_prefix("p", true, |classes| {
                classes.register(ClassDescriptorBuilder::new("app.Thing").pos_vt_field("name").build());
            })
            .unwrap();
        let store = engine.objects("p").unwrap();
        let class = store.classes().get(dbzero_core::ClassUuid::from_qualified_name("app.Thing")).unwrap();
        let obj = engine.create_object("p", &class).unwrap();
        engine.set_attr("p", obj, &class, "name", Value::Str("before".into())).unwrap();
        engine.commit("p").unwrap();

        let snapshot = engine.snapshot(None).unwrap();
        engine.set_attr("p", obj, &class, "name", Value::Str("after".into())).unwrap();
        engine.commit("p").unwrap();

        let at_snapshot = engine.object_store_at("p", &snapshot).unwrap();
        assert_eq!(at_snapshot.get_attr(obj, &class, "name"), Some(Value::Str("before".into())));
        assert_eq!(store.get_attr(obj, &class, "name"), Some(Value::Str("after".into())));
    }
}
