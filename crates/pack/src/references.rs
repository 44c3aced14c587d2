//! Reference tagging for host instances.
//!
//! An instance referenced by an `Instance` node is written as a 4-byte UID
//! instead of its content. The [`ReferenceTable`] hands out UIDs and maps
//! them back to live instances. It holds instances weakly: an entry never
//! keeps its target alive, and entries for dropped targets are skipped and
//! can be pruned.
//!
//! Attaching a fresh UID to an instance is a host side effect that may not
//! complete immediately ([`Instance::attach_tag`]). The table awaits it with
//! no timeout and no cancellation; a host that never completes the future
//! stalls the write that triggered it. Every caller asking for that
//! instance's UID waits for the same attach before it gets the UID back.
//!
//! Hosts that persist tags should [`ReferenceTable::restore`] persisted
//! instances before tagging fresh ones. Fresh allocation skips every UID the
//! table already knows, but it cannot skip a tag it has not seen yet. A
//! persisted tag that arrives after another live instance took the same UID
//! is not registered, and [`ReferenceTable::tag`] attaches a new one.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use futures::channel::oneshot;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;

use crate::value::InstanceRef;

/// Reference tag. `0` is reserved for "no instance".
pub type Uid = u32;

/// A host object that can carry a reference tag.
pub trait Instance: Any + Send + Sync + fmt::Debug {
    /// Tag the host has attached to this instance, if any. Hosts that
    /// persist tags return the persisted value here.
    fn tag(&self) -> Option<Uid>;

    /// Attaches `uid` to the instance.
    fn attach_tag(&self, uid: Uid) -> BoxFuture<'_, ()>;

    fn as_any(&self) -> &dyn Any;
}

/// Tag storage for hosts that attach tags synchronously.
#[derive(Debug, Default)]
pub struct TagSlot(AtomicU32);

impl TagSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<Uid> {
        match self.0.load(Ordering::Acquire) {
            0 => None,
            uid => Some(uid),
        }
    }

    pub fn set(&self, uid: Uid) {
        self.0.store(uid, Ordering::Release);
    }
}

/// Resolves once the host finished attaching a UID.
type Attached = Shared<oneshot::Receiver<()>>;

#[derive(Debug)]
struct Entries {
    by_identity: HashMap<usize, Uid>,
    by_uid: HashMap<Uid, Weak<dyn Instance>>,
    pending: HashMap<Uid, Attached>,
    next_uid: Uid,
}

impl Entries {
    /// UID of a live entry for `instance`. Drops the entry when its target
    /// is gone (the address may have been reused).
    fn live_uid(&mut self, instance: &InstanceRef) -> Option<Uid> {
        let identity = instance.identity();
        let uid = *self.by_identity.get(&identity)?;
        let target = self.by_uid.get(&uid).and_then(Weak::upgrade);
        match target {
            Some(target) if InstanceRef(target.clone()) == *instance => Some(uid),
            Some(_) => {
                // The UID now belongs to someone else.
                self.by_identity.remove(&identity);
                None
            }
            None => {
                self.by_identity.remove(&identity);
                self.by_uid.remove(&uid);
                None
            }
        }
    }

    /// Whether a live instance other than `instance` holds `uid`.
    fn held_by_other(&self, uid: Uid, instance: &InstanceRef) -> bool {
        self.by_uid
            .get(&uid)
            .and_then(Weak::upgrade)
            .is_some_and(|target| InstanceRef(target) != *instance)
    }

    fn insert(&mut self, instance: &InstanceRef, uid: Uid) {
        if let Some(previous) = self.by_identity.insert(instance.identity(), uid) {
            if previous != uid {
                self.by_uid.remove(&previous);
            }
        }
        self.by_uid.insert(uid, Arc::downgrade(&instance.0));
        if uid >= self.next_uid {
            self.next_uid = uid.wrapping_add(1).max(1);
        }
    }

    /// Next UID no entry uses, dead entries included.
    fn allocate(&mut self) -> Uid {
        loop {
            let uid = self.next_uid;
            self.next_uid = uid.wrapping_add(1).max(1);
            if !self.by_uid.contains_key(&uid) {
                return uid;
            }
        }
    }

    /// Registers a host tag unless another live instance holds it.
    fn register_host_tag(&mut self, instance: &InstanceRef, uid: Uid) -> bool {
        if self.held_by_other(uid, instance) {
            tracing::warn!(uid, "host tag is held by another instance");
            return false;
        }
        self.insert(instance, uid);
        true
    }
}

/// What a `tag` call does once the lock is released.
enum Step {
    Ready(Uid),
    Wait(Uid, Attached),
    Attach(Uid, oneshot::Sender<()>),
}

/// Weak identity map from live instances to UIDs.
#[derive(Debug)]
pub struct ReferenceTable {
    entries: Mutex<Entries>,
}

impl Default for ReferenceTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ReferenceTable {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Entries {
                by_identity: HashMap::new(),
                by_uid: HashMap::new(),
                pending: HashMap::new(),
                next_uid: 1,
            }),
        }
    }

    /// The process-wide table.
    pub fn global() -> &'static Arc<ReferenceTable> {
        static GLOBAL: OnceLock<Arc<ReferenceTable>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(ReferenceTable::new()))
    }

    /// Returns the instance's UID, assigning and attaching one on first use.
    ///
    /// Allocation happens under the table lock, so concurrent callers for
    /// the same instance get the same UID. The caller that allocated awaits
    /// the host's attach step; the others await its completion. A host tag
    /// that another live instance already holds is replaced by a fresh one.
    pub async fn tag(&self, instance: &InstanceRef) -> Uid {
        let step = {
            let mut entries = self.entries.lock();
            let known = match entries.live_uid(instance) {
                Some(uid) => Some(uid),
                None => instance
                    .0
                    .tag()
                    .filter(|&uid| uid != 0 && entries.register_host_tag(instance, uid)),
            };
            match known {
                Some(uid) => match entries.pending.get(&uid) {
                    Some(attached) => Step::Wait(uid, attached.clone()),
                    None => Step::Ready(uid),
                },
                None => {
                    let uid = entries.allocate();
                    entries.insert(instance, uid);
                    let (done, attached) = oneshot::channel();
                    entries.pending.insert(uid, attached.shared());
                    Step::Attach(uid, done)
                }
            }
        };

        match step {
            Step::Ready(uid) => uid,
            Step::Wait(uid, attached) => {
                // Cancelled means the allocating caller was dropped mid-attach.
                if attached.await.is_err() {
                    tracing::warn!(uid, "reference tag attach was abandoned");
                }
                uid
            }
            Step::Attach(uid, done) => {
                tracing::debug!(uid, "attaching reference tag");
                instance.0.attach_tag(uid).await;
                self.entries.lock().pending.remove(&uid);
                let _ = done.send(());
                uid
            }
        }
    }

    /// [`ReferenceTable::tag`], driven to completion on the calling thread.
    pub fn tag_blocking(&self, instance: &InstanceRef) -> Uid {
        futures::executor::block_on(self.tag(instance))
    }

    /// UID already assigned to `instance`, without assigning one.
    ///
    /// A host tag is registered on the way, unless a different live
    /// instance already holds it; then this returns `None`.
    pub fn uid_of(&self, instance: &InstanceRef) -> Option<Uid> {
        let mut entries = self.entries.lock();
        if let Some(uid) = entries.live_uid(instance) {
            return Some(uid);
        }
        let uid = instance.0.tag().filter(|&uid| uid != 0)?;
        entries.register_host_tag(instance, uid).then_some(uid)
    }

    /// The live instance tagged `uid`, if any.
    pub fn resolve(&self, uid: Uid) -> Option<InstanceRef> {
        if uid == 0 {
            return None;
        }
        let entries = self.entries.lock();
        entries.by_uid.get(&uid).and_then(Weak::upgrade).map(InstanceRef)
    }

    /// Registers an instance whose tag the host restored from storage.
    ///
    /// Call this for persisted instances before tagging fresh ones. Returns
    /// `None` when the instance has no tag or another live instance already
    /// holds it.
    pub fn restore(&self, instance: &InstanceRef) -> Option<Uid> {
        self.uid_of(instance)
    }

    /// Removes the entry for `instance`, e.g. when the host destroys it.
    pub fn forget(&self, instance: &InstanceRef) -> Option<Uid> {
        let mut entries = self.entries.lock();
        let uid = entries.by_identity.remove(&instance.identity())?;
        entries.by_uid.remove(&uid);
        Some(uid)
    }

    /// Drops entries whose instance no longer exists. Returns how many.
    pub fn prune(&self) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.by_uid.len();
        entries.by_uid.retain(|_, target| target.strong_count() > 0);
        let live: std::collections::HashSet<Uid> = entries.by_uid.keys().copied().collect();
        entries.by_identity.retain(|_, uid| live.contains(uid));
        let pruned = before - entries.by_uid.len();
        if pruned > 0 {
            tracing::debug!(pruned, "pruned dead reference tags");
        }
        pruned
    }

    pub fn len(&self) -> usize {
        self.entries.lock().by_uid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct Part {
        slot: TagSlot,
    }

    impl Instance for Part {
        fn tag(&self) -> Option<Uid> {
            self.slot.get()
        }

        fn attach_tag(&self, uid: Uid) -> BoxFuture<'_, ()> {
            self.slot.set(uid);
            Box::pin(futures::future::ready(()))
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn test_tag_is_stable() {
        let table = ReferenceTable::new();
        let part = InstanceRef::new(Part::default());
        let uid = table.tag_blocking(&part);
        assert_eq!(uid, 1);
        assert_eq!(table.tag_blocking(&part), uid);
        assert_eq!(part.downcast_ref::<Part>().unwrap().slot.get(), Some(uid));
    }

    #[test]
    fn test_distinct_instances_get_distinct_uids() {
        let table = ReferenceTable::new();
        let a = InstanceRef::new(Part::default());
        let b = InstanceRef::new(Part::default());
        assert_ne!(table.tag_blocking(&a), table.tag_blocking(&b));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_resolve_is_weak() {
        let table = ReferenceTable::new();
        let part = InstanceRef::new(Part::default());
        let uid = table.tag_blocking(&part);
        assert_eq!(table.resolve(uid), Some(part.clone()));
        drop(part);
        assert_eq!(table.resolve(uid), None);
        assert_eq!(table.prune(), 1);
        assert!(table.is_empty());
    }

    #[test]
    fn test_forget() {
        let table = ReferenceTable::new();
        let part = InstanceRef::new(Part::default());
        let uid = table.tag_blocking(&part);
        assert_eq!(table.forget(&part), Some(uid));
        assert_eq!(table.resolve(uid), None);
    }

    #[test]
    fn test_restored_tag_is_reused() {
        let table = ReferenceTable::new();
        let part = Part::default();
        part.slot.set(41);
        let part = InstanceRef::new(part);
        assert_eq!(table.restore(&part), Some(41));
        assert_eq!(table.resolve(41), Some(part.clone()));

        let fresh = InstanceRef::new(Part::default());
        assert_eq!(table.tag_blocking(&fresh), 42);
    }

    fn persisted(uid: Uid) -> InstanceRef {
        let part = Part::default();
        part.slot.set(uid);
        InstanceRef::new(part)
    }

    #[test]
    fn test_late_persisted_tag_does_not_steal_a_uid() {
        let table = ReferenceTable::new();
        let first = InstanceRef::new(Part::default());
        assert_eq!(table.tag_blocking(&first), 1);

        let late = persisted(1);
        assert_eq!(table.restore(&late), None);
        let uid = table.tag_blocking(&late);
        assert_ne!(uid, 1);
        assert_eq!(table.resolve(1), Some(first.clone()));
        assert_eq!(table.resolve(uid), Some(late.clone()));
        assert_eq!(late.downcast_ref::<Part>().unwrap().slot.get(), Some(uid));
        assert_eq!(table.tag_blocking(&first), 1);
    }

    #[test]
    fn test_allocation_skips_known_uids() {
        let table = ReferenceTable::new();
        let high = persisted(3);
        assert_eq!(table.restore(&high), Some(3));
        // Lower tags restored later must not be handed out again.
        let low = persisted(1);
        assert_eq!(table.restore(&low), Some(1));
        let fresh = InstanceRef::new(Part::default());
        assert_eq!(table.tag_blocking(&fresh), 4);
    }
}
