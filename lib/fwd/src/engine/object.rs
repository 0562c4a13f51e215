// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The object registry.
//!
//! Every forwarding object (port, table, counter) lives in an
//! [`ObjectTable`] under a unique string ID and a numeric NID drawn
//! from a recycling pool. Objects are reference counted by the
//! registry: the table itself holds the initial reference, and each
//! [`ObjectRef`] handed out by [`ObjectTable::acquire`] holds one
//! more. Links between objects (a table entry's `lookup` of another
//! table, a `transmit` to a port) always go through an `ObjectRef`,
//! never through direct ownership, so cyclic references can still be
//! torn down by a forced removal.
//!
//! When the last reference goes away the object is cleaned up exactly
//! once: its [`Object::cleanup`] runs, its NID leaves the index and
//! returns to the pool.

use super::counter::Counters;
use super::counter::FlowCounter;
use super::port::Port;
use super::table::Table;
use crate::api::Nid;
use crate::api::ObjectKind;
use crate::sync::KMutex;
use core::fmt;
use core::sync::atomic::AtomicBool;
use core::sync::atomic::Ordering;
use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeMap;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::OnceLock;
use std::sync::Weak;
use thiserror::Error;

#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum RegistryError {
    #[error("no object with ID {0}")]
    NotFound(String),

    #[error("no object with NID {0}")]
    NidNotFound(Nid),

    #[error("an object with ID {0} already exists")]
    Duplicate(String),

    #[error("object already inserted as {0}")]
    AlreadyInserted(String),

    #[error("object {0} is being torn down")]
    Teardown(String),

    #[error("NID pool exhausted")]
    PoolExhausted,

    #[error("object {id} is a {found}, not a {want}")]
    WrongKind { id: String, want: ObjectKind, found: ObjectKind },
}

/// Registry bookkeeping carried by every object.
#[derive(Debug, Default)]
pub struct ObjectCore {
    ident: OnceLock<(String, Nid)>,
    cleaned: AtomicBool,
}

impl ObjectCore {
    /// The object's ID, empty until it is inserted.
    pub fn id(&self) -> &str {
        self.ident.get().map(|(id, _)| id.as_str()).unwrap_or("")
    }

    /// The object's NID, [`Nid::INVALID`] until it is inserted.
    pub fn nid(&self) -> Nid {
        self.ident.get().map(|(_, nid)| *nid).unwrap_or(Nid::INVALID)
    }

    /// Has this object's cleanup run?
    pub fn is_cleaned(&self) -> bool {
        self.cleaned.load(Ordering::Acquire)
    }
}

/// A forwarding object managed by an [`ObjectTable`].
pub trait Object: Send + Sync {
    fn core(&self) -> &ObjectCore;

    fn kind(&self) -> ObjectKind;

    fn counters(&self) -> Option<&Counters> {
        None
    }

    /// Release every reference this object holds on other objects.
    /// Called once, when the object's last reference goes away or it
    /// is forced out.
    fn cleanup(&self) {}

    fn as_table(&self) -> Option<&dyn Table> {
        None
    }

    fn as_port(&self) -> Option<&dyn Port> {
        None
    }

    fn as_flow_counter(&self) -> Option<&FlowCounter> {
        None
    }
}

impl fmt::Debug for dyn Object {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {} ({})", self.kind(), self.core().id(), self.core().nid())
    }
}

/// NIDs are handed out from a monotonic counter; released NIDs are
/// reused before the counter advances.
#[derive(Debug)]
pub struct NidPool {
    next: u64,
    free: Vec<Nid>,
}

impl Default for NidPool {
    fn default() -> Self {
        Self { next: 1, free: vec![] }
    }
}

impl NidPool {
    #[cfg(test)]
    fn starting_at(next: u64) -> Self {
        Self { next, free: vec![] }
    }

    pub fn alloc(&mut self) -> Result<Nid, RegistryError> {
        if let Some(nid) = self.free.pop() {
            return Ok(nid);
        }

        if self.next == u64::MAX {
            return Err(RegistryError::PoolExhausted);
        }

        let nid = Nid::new(self.next);
        self.next += 1;
        Ok(nid)
    }

    pub fn free(&mut self, nid: Nid) {
        if nid.is_valid() {
            self.free.push(nid);
        }
    }
}

struct Entry {
    obj: Arc<dyn Object>,
    refs: u64,
}

#[derive(Default)]
struct Inner {
    ids: BTreeMap<String, Nid>,
    nids: BTreeMap<Nid, Entry>,
    pool: NidPool,
}

/// A point-in-time view of one registered object.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ObjectInfo {
    pub id: String,
    pub nid: Nid,
    pub kind: ObjectKind,
    pub refs: u64,
}

/// The ID and NID indices of a context's objects.
pub struct ObjectTable {
    inner: KMutex<Inner>,
    this: Weak<ObjectTable>,
}

impl ObjectTable {
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            inner: KMutex::new(Inner::default()),
            this: this.clone(),
        })
    }

    /// Register `obj` under `id`, holding the initial reference.
    pub fn insert(
        &self,
        id: &str,
        obj: Arc<dyn Object>,
    ) -> Result<Nid, RegistryError> {
        let mut inner = self.inner.lock();

        if inner.ids.contains_key(id) {
            return Err(RegistryError::Duplicate(id.to_string()));
        }

        if let Some((prev, _)) = obj.core().ident.get() {
            return Err(RegistryError::AlreadyInserted(prev.clone()));
        }

        let nid = inner.pool.alloc()?;
        if obj.core().ident.set((id.to_string(), nid)).is_err() {
            inner.pool.free(nid);
            return Err(RegistryError::AlreadyInserted(obj.core().id().into()));
        }

        inner.ids.insert(id.to_string(), nid);
        inner.nids.insert(nid, Entry { obj, refs: 1 });
        Ok(nid)
    }

    /// Remove `id` from the ID index and drop the initial reference.
    ///
    /// With `force` the object is cleaned up even when references to
    /// it remain; those references become inert.
    pub fn remove(&self, id: &str, force: bool) -> Result<Nid, RegistryError> {
        let (nid, obj) = {
            let mut inner = self.inner.lock();
            let nid = inner
                .ids
                .remove(id)
                .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
            let obj = inner
                .nids
                .get(&nid)
                .map(|e| e.obj.clone())
                .ok_or(RegistryError::NidNotFound(nid))?;
            (nid, obj)
        };

        self.release(nid, &obj, force);
        Ok(nid)
    }

    /// Take a reference to the object registered under `id`.
    pub fn acquire(&self, id: &str) -> Result<ObjectRef, RegistryError> {
        let mut inner = self.inner.lock();
        let nid = *inner
            .ids
            .get(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        let entry = inner
            .nids
            .get_mut(&nid)
            .ok_or(RegistryError::NidNotFound(nid))?;

        if entry.refs == 0 || entry.obj.core().is_cleaned() {
            return Err(RegistryError::Teardown(id.to_string()));
        }

        entry.refs += 1;
        Ok(ObjectRef {
            obj: entry.obj.clone(),
            table: self.this.clone(),
            released: false,
        })
    }

    /// Take a reference to `id`, which must be of `kind`.
    pub fn acquire_kind(
        &self,
        id: &str,
        kind: ObjectKind,
    ) -> Result<ObjectRef, RegistryError> {
        let obj = self.acquire(id)?;
        if obj.kind() != kind {
            return Err(RegistryError::WrongKind {
                id: id.to_string(),
                want: kind,
                found: obj.kind(),
            });
        }
        Ok(obj)
    }

    pub fn find_id(&self, id: &str) -> Result<Arc<dyn Object>, RegistryError> {
        let inner = self.inner.lock();
        inner
            .ids
            .get(id)
            .and_then(|nid| inner.nids.get(nid))
            .map(|e| e.obj.clone())
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    pub fn find_nid(&self, nid: Nid) -> Result<Arc<dyn Object>, RegistryError> {
        self.inner
            .lock()
            .nids
            .get(&nid)
            .map(|e| e.obj.clone())
            .ok_or(RegistryError::NidNotFound(nid))
    }

    /// The current reference count of `id`.
    pub fn refs(&self, id: &str) -> Result<u64, RegistryError> {
        let inner = self.inner.lock();
        inner
            .ids
            .get(id)
            .and_then(|nid| inner.nids.get(nid))
            .map(|e| e.refs)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    /// Every object still reachable by ID.
    pub fn snapshot(&self) -> Vec<ObjectInfo> {
        let inner = self.inner.lock();
        inner
            .ids
            .iter()
            .filter_map(|(id, nid)| {
                inner.nids.get(nid).map(|e| ObjectInfo {
                    id: id.clone(),
                    nid: *nid,
                    kind: e.obj.kind(),
                    refs: e.refs,
                })
            })
            .collect()
    }

    /// The number of objects holding a NID, including those removed
    /// by ID but still referenced.
    pub fn live(&self) -> usize {
        self.inner.lock().nids.len()
    }

    fn release(&self, nid: Nid, obj: &Arc<dyn Object>, force: bool) {
        {
            let mut inner = self.inner.lock();
            let Some(entry) = inner.nids.get_mut(&nid) else {
                return;
            };

            // The NID may have been recycled for another object after
            // a forced cleanup.
            if !Arc::ptr_eq(&entry.obj, obj) || obj.core().is_cleaned() {
                return;
            }

            entry.refs = entry.refs.saturating_sub(1);
            if entry.refs > 0 && !force {
                return;
            }

            entry.refs = 0;
            obj.core().cleaned.store(true, Ordering::Release);
        }

        // Composite cleanup releases other objects, and possibly this
        // one again, so it runs without the registry lock.
        obj.cleanup();

        let mut inner = self.inner.lock();
        inner.nids.remove(&nid);
        inner.pool.free(nid);
    }
}

impl fmt::Debug for ObjectTable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_list().entries(self.snapshot()).finish()
    }
}

/// One counted reference to a registered object, released on drop.
pub struct ObjectRef {
    obj: Arc<dyn Object>,
    table: Weak<ObjectTable>,
    released: bool,
}

impl ObjectRef {
    pub fn object(&self) -> &Arc<dyn Object> {
        &self.obj
    }

    pub fn id(&self) -> &str {
        self.obj.core().id()
    }

    pub fn nid(&self) -> Nid {
        self.obj.core().nid()
    }

    /// Has the object been cleaned up, leaving this reference inert?
    pub fn is_cleaned(&self) -> bool {
        self.obj.core().is_cleaned()
    }

    /// Drop this reference now.
    pub fn release(self) {}

    fn put(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        if let Some(table) = self.table.upgrade() {
            table.release(self.nid(), &self.obj, false);
        }
    }
}

impl Deref for ObjectRef {
    type Target = dyn Object;

    fn deref(&self) -> &Self::Target {
        &*self.obj
    }
}

impl Drop for ObjectRef {
    fn drop(&mut self) {
        self.put();
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ObjectRef({:?})", &*self.obj)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use core::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Probe {
        core: ObjectCore,
        cleanups: AtomicUsize,
        held: KMutex<Vec<ObjectRef>>,
    }

    impl Object for Probe {
        fn core(&self) -> &ObjectCore {
            &self.core
        }

        fn kind(&self) -> ObjectKind {
            ObjectKind::Other
        }

        fn cleanup(&self) {
            self.cleanups.fetch_add(1, Ordering::Relaxed);
            let held = core::mem::take(&mut *self.held.lock());
            drop(held);
        }
    }

    fn probe() -> Arc<Probe> {
        Arc::new(Probe::default())
    }

    #[test]
    fn insert_acquire_release() {
        let table = ObjectTable::new();
        let p = probe();
        let nid = table.insert("p0", p.clone()).unwrap();
        assert_eq!(nid, Nid::new(1));
        assert_eq!(p.core().id(), "p0");
        assert_eq!(p.core().nid(), nid);

        let r = table.acquire("p0").unwrap();
        assert_eq!(table.refs("p0"), Ok(2));
        assert_eq!(r.nid(), nid);

        table.remove("p0", false).unwrap();
        assert_eq!(p.cleanups.load(Ordering::Relaxed), 0);
        assert!(table.find_id("p0").is_err());
        assert!(table.find_nid(nid).is_ok());

        r.release();
        assert_eq!(p.cleanups.load(Ordering::Relaxed), 1);
        assert!(p.core().is_cleaned());
        assert_eq!(table.find_nid(nid).unwrap_err(), RegistryError::NidNotFound(nid));

        // The NID went back to the pool.
        assert_eq!(table.insert("p1", probe()).unwrap(), nid);
    }

    #[test]
    fn insert_errors() {
        let table = ObjectTable::new();
        let p = probe();
        table.insert("p0", p.clone()).unwrap();
        assert_eq!(
            table.insert("p0", probe()),
            Err(RegistryError::Duplicate("p0".into()))
        );
        assert_eq!(
            table.insert("other", p),
            Err(RegistryError::AlreadyInserted("p0".into()))
        );
        assert_eq!(
            table.acquire("nope").unwrap_err(),
            RegistryError::NotFound("nope".into())
        );
        assert!(table.remove("nope", false).is_err());
    }

    #[test]
    fn forced_cleanup_runs_once() {
        let table = ObjectTable::new();
        let p = probe();
        table.insert("p0", p.clone()).unwrap();
        let r1 = table.acquire("p0").unwrap();
        let r2 = table.acquire("p0").unwrap();

        table.remove("p0", true).unwrap();
        assert_eq!(p.cleanups.load(Ordering::Relaxed), 1);
        assert!(r1.is_cleaned());
        assert_eq!(table.live(), 0);

        drop(r1);
        drop(r2);
        assert_eq!(p.cleanups.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn stale_ref_leaves_recycled_nid_alone() {
        let table = ObjectTable::new();
        table.insert("a", probe()).unwrap();
        let stale = table.acquire("a").unwrap();
        let nid = table.remove("a", true).unwrap();

        let b = probe();
        assert_eq!(table.insert("b", b.clone()).unwrap(), nid);
        drop(stale);
        assert_eq!(table.refs("b"), Ok(1));
        assert_eq!(b.cleanups.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn cyclic_references_torn_down() {
        let table = ObjectTable::new();
        let a = probe();
        let b = probe();
        table.insert("a", a.clone()).unwrap();
        table.insert("b", b.clone()).unwrap();
        a.held.lock().push(table.acquire("b").unwrap());
        b.held.lock().push(table.acquire("a").unwrap());
        a.held.lock().push(table.acquire("a").unwrap());

        // Neither reaches zero on its own.
        table.remove("a", false).unwrap();
        table.remove("b", false).unwrap();
        assert_eq!(table.live(), 2);
        assert_eq!(a.cleanups.load(Ordering::Relaxed), 0);

        let table = ObjectTable::new();
        let a = probe();
        let b = probe();
        table.insert("a", a.clone()).unwrap();
        table.insert("b", b.clone()).unwrap();
        a.held.lock().push(table.acquire("b").unwrap());
        b.held.lock().push(table.acquire("a").unwrap());

        table.remove("a", true).unwrap();
        assert_eq!(a.cleanups.load(Ordering::Relaxed), 1);
        // a's cleanup dropped its reference to b, leaving only the
        // table's own.
        assert_eq!(table.refs("b"), Ok(1));
        table.remove("b", false).unwrap();
        assert_eq!(b.cleanups.load(Ordering::Relaxed), 1);
        assert_eq!(table.live(), 0);
    }

    #[test]
    fn pool_exhaustion() {
        let mut pool = NidPool::starting_at(u64::MAX - 1);
        let last = pool.alloc().unwrap();
        assert_eq!(last, Nid::new(u64::MAX - 1));
        assert_eq!(pool.alloc(), Err(RegistryError::PoolExhausted));
        pool.free(last);
        assert_eq!(pool.alloc(), Ok(last));
        pool.free(Nid::INVALID);
        assert_eq!(pool.alloc(), Err(RegistryError::PoolExhausted));
    }

    #[test]
    fn acquire_kind_checks() {
        let table = ObjectTable::new();
        table.insert("p0", probe()).unwrap();
        assert_eq!(
            table.acquire_kind("p0", ObjectKind::Table).unwrap_err(),
            RegistryError::WrongKind {
                id: "p0".into(),
                want: ObjectKind::Table,
                found: ObjectKind::Other,
            }
        );
        // The failed acquire released its reference.
        assert_eq!(table.refs("p0"), Ok(1));
    }
}
