//! A shared sender cache.

use alloy_primitives::{Address, B256};
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;

/// Default number of recovered senders kept per cache.
pub const DEFAULT_SENDER_CACHE_SIZE: usize = 10_240;

/// A bounded transaction-hash → sender cache.
///
/// Sender recovery is the expensive step of transaction validation; sessions
/// share one of these so a transaction seen from several peers is recovered
/// once. The transaction values themselves stay immutable.
#[derive(Debug)]
pub struct SenderCache {
    inner: Mutex<LruCache<B256, Address>>,
}

impl SenderCache {
    /// Creates a cache bounded to `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("max(1) is non-zero");
        Self { inner: Mutex::new(LruCache::new(capacity)) }
    }

    /// The cached sender for a transaction hash, if any.
    pub fn get(&self, tx_hash: &B256) -> Option<Address> {
        self.inner.lock().get(tx_hash).copied()
    }

    /// Records a recovered sender.
    pub fn insert(&self, tx_hash: B256, sender: Address) {
        self.inner.lock().put(tx_hash, sender);
    }

    /// Returns the cached sender or recovers it with `recover` and caches the
    /// result. Errors are not cached.
    pub fn get_or_recover<E>(
        &self,
        tx_hash: B256,
        recover: impl FnOnce() -> Result<Address, E>,
    ) -> Result<Address, E> {
        if let Some(sender) = self.get(&tx_hash) {
            return Ok(sender);
        }
        let sender = recover()?;
        self.insert(tx_hash, sender);
        Ok(sender)
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// True if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SenderCache {
    fn default() -> Self {
        Self::new(DEFAULT_SENDER_CACHE_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recovers_once() {
        let cache = SenderCache::new(4);
        let hash = B256::repeat_byte(1);
        let sender = Address::repeat_byte(2);

        let mut calls = 0;
        for _ in 0..3 {
            let got = cache
                .get_or_recover::<()>(hash, || {
                    calls += 1;
                    Ok(sender)
                })
                .unwrap();
            assert_eq!(got, sender);
        }
        assert_eq!(calls, 1);
    }

    #[test]
    fn bounded_eviction() {
        let cache = SenderCache::new(2);
        for i in 0..4u8 {
            cache.insert(B256::repeat_byte(i), Address::repeat_byte(i));
        }
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&B256::repeat_byte(0)).is_none());
        assert_eq!(cache.get(&B256::repeat_byte(3)), Some(Address::repeat_byte(3)));
    }

    #[test]
    fn errors_not_cached() {
        let cache = SenderCache::new(2);
        let hash = B256::repeat_byte(9);
        assert!(cache.get_or_recover(hash, || Err::<Address, _>(())).is_err());
        assert!(cache.get(&hash).is_none());
    }
}
