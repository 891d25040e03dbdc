use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use crate::domain::UserId;

/// Authoritative set of users that receive a group's pushes, each with a
/// role/subscription flag.
///
/// Every access takes the lock for a single map operation only. Fan-out
/// works on a [`MemberSet::snapshot`], so a member added or removed while a
/// broadcast is in flight may or may not receive it.
#[derive(Debug, Default)]
pub struct MemberSet {
    inner: Mutex<HashMap<UserId, i32>>,
}

impl MemberSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<UserId, i32>> {
        // The map holds no invariant a panicking writer could break.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or overwrite.
    pub fn put(&self, uid: UserId, flag: i32) {
        self.lock().insert(uid, flag);
    }

    /// Returns true when the member was present.
    pub fn remove(&self, uid: UserId) -> bool {
        self.lock().remove(&uid).is_some()
    }

    pub fn contains(&self, uid: UserId) -> bool {
        self.lock().contains_key(&uid)
    }

    pub fn flag(&self, uid: UserId) -> Option<i32> {
        self.lock().get(&uid).copied()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Current member ids, copied out under the lock.
    pub fn snapshot(&self) -> Vec<UserId> {
        self.lock().keys().copied().collect()
    }
}
