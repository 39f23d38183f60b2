//! Wrapper over standard sync primitives to allow for concurrent testing, plus a small keyed
//! lock table used to serialize read-modify-write sequences per key without a global lock.
//!

#[cfg(all(shuttle, test))]
pub(crate) use shuttle::{sync::*, thread};

#[cfg(not(all(shuttle, test)))]
pub(crate) use std::sync::*;

use dashmap::DashMap;
use std::hash::Hash;

/// A table of locks, one per key. Callers holding the lock for key `a` never block callers
/// working on key `b`.
///
#[derive(Debug)]
pub(crate) struct KeyedLocks<K: Eq + Hash> {
    locks: DashMap<K, Arc<Mutex<()>>>,
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    pub(crate) fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    /// Get the lock for `key`, creating it on first use.
    pub(crate) fn lock_for(&self, key: &K) -> Arc<Mutex<()>> {
        self.locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }
}

impl<K: Eq + Hash + Clone> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_key_yields_same_lock() {
        let locks: KeyedLocks<String> = KeyedLocks::new();
        let a = locks.lock_for(&"a".to_string());
        let b = locks.lock_for(&"a".to_string());
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn different_keys_do_not_contend() {
        let locks: KeyedLocks<String> = KeyedLocks::new();
        let a = locks.lock_for(&"a".to_string());
        let b = locks.lock_for(&"b".to_string());
        let _held = a.lock().unwrap();
        assert!(b.try_lock().is_ok());
    }

    #[cfg(shuttle)]
    #[test]
    fn conc_same_key_sections_never_interleave() {
        shuttle::check_random(
            move || {
                let locks: Arc<KeyedLocks<u8>> = Arc::new(KeyedLocks::new());
                let counter = Arc::new(Mutex::new(0_usize));

                let mut handles = vec![];
                for _ in 0..3 {
                    let locks = locks.clone();
                    let counter = counter.clone();
                    let handle = thread::spawn(move || {
                        let lock = locks.lock_for(&1);
                        let _held = lock.lock().unwrap();
                        let seen = *counter.lock().unwrap();
                        thread::yield_now();
                        *counter.lock().unwrap() = seen + 1;
                    });
                    handles.push(handle);
                }

                for handle in handles {
                    handle.join().unwrap()
                }

                assert_eq!(*counter.lock().unwrap(), 3);
            },
            1_000,
        );
    }
}
