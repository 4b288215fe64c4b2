//! Per-user critical sections
//!
//! Every wallet or session mutation for a user runs while holding that
//! user's guard. Guards are owned so they can be held across storage awaits.
//! Two-user operations lock in ascending id order.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::domain::value_objects::UserId;

/// Entries beyond this count trigger a prune of idle locks
const PRUNE_THRESHOLD: usize = 4096;

pub type UserGuard = OwnedMutexGuard<()>;

/// Guards of both participants of a cross-user operation
pub struct PairGuard {
    _first: UserGuard,
    _second: UserGuard,
}

#[derive(Debug, Default)]
pub struct UserLocks {
    table: Mutex<HashMap<UserId, Arc<AsyncMutex<()>>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, user_id: UserId) -> Arc<AsyncMutex<()>> {
        let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        if table.len() >= PRUNE_THRESHOLD {
            // only the table holds these: nobody owns or awaits them
            table.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
        table.entry(user_id).or_default().clone()
    }

    pub async fn lock(&self, user_id: UserId) -> UserGuard {
        let lock = self.entry(user_id);
        lock.lock_owned().await
    }

    /// Lock two distinct users in a fixed global order
    pub async fn lock_pair(&self, a: UserId, b: UserId) -> PairGuard {
        debug_assert_ne!(a, b, "lock_pair needs two distinct users");
        let (first, second) = if a <= b { (a, b) } else { (b, a) };
        let first = self.lock(first).await;
        let second = self.lock(second).await;
        PairGuard {
            _first: first,
            _second: second,
        }
    }

    pub fn len(&self) -> usize {
        self.table.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
