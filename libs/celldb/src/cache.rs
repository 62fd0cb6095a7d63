//! Reclaimable cache slots.
//!
//! A [`CacheSlot`] holds an optional shared value computed after its owner
//! was constructed. The absent to present transition is a single write, so
//! concurrent readers see either nothing or the complete value. A slot may be
//! emptied at any time with [`CacheSlot::reclaim`]; the next access
//! recomputes. Two racing computations both succeed and the later write wins,
//! which is harmless because the computation is a pure function of the
//! owner.

use std::fmt::{Debug, Formatter};
use std::sync::{Arc, RwLock};

/// A lazily filled, reclaimable slot.
pub struct CacheSlot<T> {
    value: RwLock<Option<Arc<T>>>,
}

impl<T> CacheSlot<T> {
    /// Creates an empty slot.
    #[inline]
    pub fn new() -> Self {
        Self {
            value: RwLock::new(None),
        }
    }

    /// Creates a slot holding `value`.
    #[inline]
    pub fn with_value(value: Arc<T>) -> Self {
        Self {
            value: RwLock::new(Some(value)),
        }
    }

    /// The cached value, if present.
    pub fn get(&self) -> Option<Arc<T>> {
        match self.value.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Stores `value`, replacing anything cached.
    pub fn set(&self, value: Arc<T>) {
        match self.value.write() {
            Ok(mut guard) => *guard = Some(value),
            Err(poisoned) => *poisoned.into_inner() = Some(value),
        }
    }

    /// Returns the cached value, computing and storing it on a miss.
    pub fn get_or_init(&self, init: impl FnOnce() -> T) -> Arc<T> {
        if let Some(value) = self.get() {
            return value;
        }
        let value = Arc::new(init());
        self.set(value.clone());
        value
    }

    /// Returns the cached value, computing and storing it on a miss.
    ///
    /// Failed computations are not cached.
    pub fn get_or_try_init<E>(&self, init: impl FnOnce() -> Result<T, E>) -> Result<Arc<T>, E> {
        if let Some(value) = self.get() {
            return Ok(value);
        }
        let value = Arc::new(init()?);
        self.set(value.clone());
        Ok(value)
    }

    /// Empties the slot.
    pub fn reclaim(&self) {
        match self.value.write() {
            Ok(mut guard) => *guard = None,
            Err(poisoned) => *poisoned.into_inner() = None,
        }
    }

    /// Returns `true` if a value is cached.
    pub fn is_cached(&self) -> bool {
        self.get().is_some()
    }
}

impl<T> Default for CacheSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Debug for CacheSlot<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheSlot")
            .field("cached", &self.is_cached())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn computes_once_until_reclaimed() {
        let slot = CacheSlot::new();
        let mut calls = 0;
        let a = slot.get_or_init(|| {
            calls += 1;
            5
        });
        let b = slot.get_or_init(|| {
            calls += 1;
            6
        });
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(calls, 1);

        slot.reclaim();
        assert!(!slot.is_cached());
        assert_eq!(*slot.get_or_init(|| 7), 7);
    }

    #[test]
    fn failures_are_not_cached() {
        let slot: CacheSlot<u32> = CacheSlot::new();
        assert!(slot.get_or_try_init(|| Err::<u32, ()>(())).is_err());
        assert!(!slot.is_cached());
        assert_eq!(*slot.get_or_try_init(|| Ok::<u32, ()>(1)).unwrap(), 1);
    }
}
