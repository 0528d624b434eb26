//! Striped in-process locks keyed by string.

use parking_lot::{Mutex, MutexGuard};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

const DEFAULT_STRIPES: usize = 64;

/// A fixed set of mutexes; keys hash onto one of them.
///
/// Two operations on the same key always serialize. Unrelated keys may
/// share a stripe, which only costs a little contention.
pub(crate) struct KeyedLocks {
    stripes: Box<[Mutex<()>]>,
}

impl KeyedLocks {
    pub(crate) fn new() -> Self {
        Self::with_stripes(DEFAULT_STRIPES)
    }

    pub(crate) fn with_stripes(n: usize) -> Self {
        let stripes = (0..n.max(1)).map(|_| Mutex::new(())).collect();
        Self { stripes }
    }

    pub(crate) fn lock(&self, key: &str) -> MutexGuard<'_, ()> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let idx = (hasher.finish() % self.stripes.len() as u64) as usize;
        self.stripes[idx].lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_key_same_stripe() {
        let locks = KeyedLocks::with_stripes(4);
        let guard = locks.lock("a/b.txt");
        let idx = locks
            .stripes
            .iter()
            .position(|m| m.is_locked())
            .unwrap();
        drop(guard);
        let _again = locks.lock("a/b.txt");
        assert!(locks.stripes[idx].is_locked());
    }

    #[test]
    fn single_stripe_still_works() {
        let locks = KeyedLocks::with_stripes(0);
        drop(locks.lock("x"));
        drop(locks.lock("y"));
    }
}
