//! Specialized collection types

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU32, Ordering};

pub use slotmap::{SlotMap, DefaultKey};

/// Handle-based map using slot map for stable references
pub type HandleMap<T> = SlotMap<DefaultKey, T>;

static NEXT_STORE_ID: AtomicU32 = AtomicU32::new(1);

/// Process-unique identity of the store that issued a handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StoreId(u32);

impl StoreId {
    pub(crate) fn next() -> Self {
        Self(NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Typed handle for type-safe asset references
///
/// Handles are generational: once the slot they point at is freed, lookups
/// with the old handle fail instead of aliasing whatever reuses the slot.
/// They also remember the store that issued them, so a handle from one
/// manager never resolves in another.
pub struct AssetHandle<T> {
    store: StoreId,
    key: DefaultKey,
    _phantom: PhantomData<fn() -> T>,
}

impl<T> AssetHandle<T> {
    /// Create a new typed handle from a key
    pub(crate) const fn new(store: StoreId, key: DefaultKey) -> Self {
        Self {
            store,
            key,
            _phantom: PhantomData,
        }
    }

    /// Get the underlying key
    pub const fn key(&self) -> DefaultKey {
        self.key
    }

    /// Store that issued this handle
    pub const fn store(&self) -> StoreId {
        self.store
    }
}

// Manual impls: derives would demand the same traits from `T`.
impl<T> Clone for AssetHandle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for AssetHandle<T> {}

impl<T> PartialEq for AssetHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.store == other.store && self.key == other.key
    }
}

impl<T> Eq for AssetHandle<T> {}

impl<T> Hash for AssetHandle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.store.hash(state);
        self.key.hash(state);
    }
}

impl<T> fmt::Debug for AssetHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AssetHandle").field(&self.store).field(&self.key).finish()
    }
}
