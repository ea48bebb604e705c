//! Entity-scoped mutual exclusion.
//!
//! Operations touching the same queue slot, session or challenge run one at a time; unrelated
//! entities never contend. When an operation needs several entities it takes them through
//! [`EntityLocks::lock_many`], which acquires in ascending [`EntityKey`] order.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::dao::models::PlayerId;

/// Lockable entity. Variant order is the acquisition order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKey {
    Queue(PlayerId),
    Session(String),
    Challenge(Uuid),
}

/// Held lock on one entity; released on drop.
#[derive(Debug)]
pub struct EntityGuard {
    key: EntityKey,
    _guard: OwnedMutexGuard<()>,
}

impl EntityGuard {
    pub fn key(&self) -> &EntityKey {
        &self.key
    }
}

/// Registry of per-entity async mutexes.
#[derive(Debug, Default)]
pub struct EntityLocks {
    slots: DashMap<EntityKey, Arc<Mutex<()>>>,
}

impl EntityLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`.
    pub async fn lock(&self, key: EntityKey) -> EntityGuard {
        // Clone the slot out so the shard lock is not held across the await.
        let slot = self.slots.entry(key.clone()).or_default().clone();
        let guard = slot.lock_owned().await;
        EntityGuard { key, _guard: guard }
    }

    /// Take `key` only if nobody holds it right now.
    pub fn try_lock(&self, key: EntityKey) -> Option<EntityGuard> {
        let slot = self.slots.entry(key.clone()).or_default().clone();
        let guard = slot.try_lock_owned().ok()?;
        Some(EntityGuard { key, _guard: guard })
    }

    /// Lock several entities in canonical order, skipping duplicates.
    pub async fn lock_many(&self, keys: impl IntoIterator<Item = EntityKey>) -> Vec<EntityGuard> {
        let mut keys: Vec<EntityKey> = keys.into_iter().collect();
        keys.sort();
        keys.dedup();

        let mut guards = Vec::with_capacity(keys.len());
        for key in keys {
            guards.push(self.lock(key).await);
        }
        guards
    }

    /// Drop slots nobody holds or waits on. Returns how many were removed.
    pub fn prune(&self) -> usize {
        let before = self.slots.len();
        self.slots.retain(|_, slot| Arc::strong_count(slot) > 1);
        before.saturating_sub(self.slots.len())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;

    #[tokio::test]
    async fn same_entity_is_exclusive() {
        let locks = Arc::new(EntityLocks::new());
        let id = Uuid::new_v4();

        let guard = locks.lock(EntityKey::Challenge(id)).await;
        let blocked = timeout(
            Duration::from_millis(50),
            locks.lock(EntityKey::Challenge(id)),
        )
        .await;
        assert!(blocked.is_err());

        drop(guard);
        let reacquired = timeout(
            Duration::from_millis(50),
            locks.lock(EntityKey::Challenge(id)),
        )
        .await;
        assert!(reacquired.is_ok());
    }

    #[tokio::test]
    async fn unrelated_entities_do_not_contend() {
        let locks = EntityLocks::new();
        let _a = locks.lock(EntityKey::Challenge(Uuid::new_v4())).await;
        let b = timeout(
            Duration::from_millis(50),
            locks.lock(EntityKey::Challenge(Uuid::new_v4())),
        )
        .await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn try_lock_fails_while_held() {
        let locks = EntityLocks::new();
        let player = Uuid::new_v4();

        let held = locks.try_lock(EntityKey::Queue(player));
        assert!(held.is_some());
        assert!(locks.try_lock(EntityKey::Queue(player)).is_none());

        drop(held);
        assert!(locks.try_lock(EntityKey::Queue(player)).is_some());
    }

    #[tokio::test]
    async fn lock_many_orders_and_dedups() {
        let locks = EntityLocks::new();
        let challenge = EntityKey::Challenge(Uuid::new_v4());
        let queue = EntityKey::Queue(Uuid::new_v4());

        let guards = locks
            .lock_many([challenge.clone(), queue.clone(), challenge.clone()])
            .await;
        let keys: Vec<_> = guards.iter().map(|guard| guard.key().clone()).collect();
        assert_eq!(keys, vec![queue, challenge]);
    }

    #[tokio::test]
    async fn prune_keeps_held_slots() {
        let locks = EntityLocks::new();
        let held = locks.lock(EntityKey::Session("abc".into())).await;
        drop(locks.lock(EntityKey::Session("def".into())).await);

        assert_eq!(locks.len(), 2);
        assert_eq!(locks.prune(), 1);
        assert_eq!(locks.len(), 1);
        drop(held);
        assert_eq!(locks.prune(), 1);
        assert!(locks.is_empty());
    }
}
