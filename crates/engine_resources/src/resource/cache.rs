//! Keyed asset cache
//!
//! One implementation of get-or-load shared by every asset kind. Entries are
//! stored in a slot map so handed-out [`AssetHandle`]s go stale instead of
//! aliasing a newer asset once their entry is evicted. Each cache has its own
//! [`StoreId`]; handles issued by another cache never resolve.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

use super::{AssetKind, ResourceError};
use crate::foundation::collections::{AssetHandle, DefaultKey, HandleMap, StoreId};

/// Path-keyed store owning one decoded asset per key
pub(crate) struct KeyedCache<K, T> {
    kind: AssetKind,
    store: StoreId,
    entries: HandleMap<(K, T)>,
    index: HashMap<K, DefaultKey>,
}

impl<K, T> KeyedCache<K, T>
where
    K: Eq + Hash + Clone + Debug,
{
    pub fn new(kind: AssetKind) -> Self {
        Self {
            kind,
            store: StoreId::next(),
            entries: HandleMap::new(),
            index: HashMap::new(),
        }
    }

    /// Handle for `key` if it is cached, never loads
    pub fn handle(&self, key: &K) -> Option<AssetHandle<T>> {
        self.index.get(key).map(|&slot| AssetHandle::new(self.store, slot))
    }

    /// Cached handle, or load on a miss
    pub fn get<F>(&mut self, key: &K, loader: F) -> Option<AssetHandle<T>>
    where
        F: FnOnce(&K) -> Result<T, ResourceError>,
    {
        if let Some(handle) = self.handle(key) {
            return Some(handle);
        }
        log::warn!("{} {:?} requested before it was loaded, loading now", self.kind, key);
        self.load(key, loader)
    }

    /// Load `key` if it is not cached yet; failures are logged and yield `None`
    pub fn load<F>(&mut self, key: &K, loader: F) -> Option<AssetHandle<T>>
    where
        F: FnOnce(&K) -> Result<T, ResourceError>,
    {
        match self.try_load(key, loader) {
            Ok(handle) => Some(handle),
            Err(e) => {
                log::error!("{}", e);
                None
            }
        }
    }

    /// Load `key` if it is not cached yet, reporting the failure reason
    pub fn try_load<F>(&mut self, key: &K, loader: F) -> Result<AssetHandle<T>, ResourceError>
    where
        F: FnOnce(&K) -> Result<T, ResourceError>,
    {
        if let Some(handle) = self.handle(key) {
            return Ok(handle);
        }

        let asset = loader(key)?;
        let slot = self.entries.insert((key.clone(), asset));
        self.index.insert(key.clone(), slot);
        log::debug!("Loaded {} {:?}", self.kind, key);
        Ok(AssetHandle::new(self.store, slot))
    }

    /// Evict `key`, handing the asset back to the caller for release
    pub fn unload(&mut self, key: &K) -> Option<T> {
        let Some(slot) = self.index.remove(key) else {
            log::warn!("Cannot unload {} {:?}: not loaded", self.kind, key);
            return None;
        };
        log::debug!("Unloaded {} {:?}", self.kind, key);
        self.entries.remove(slot).map(|(_, asset)| asset)
    }

    /// Evict every entry, returning the number released
    pub fn clear(&mut self) -> usize {
        let released = self.drain().len();
        if released > 0 {
            log::debug!("Cleared {} {} entries", released, self.kind);
        }
        released
    }

    /// Evict every entry, handing the assets back to the caller
    pub fn drain(&mut self) -> Vec<(K, T)> {
        self.index.clear();
        self.entries.drain().map(|(_, entry)| entry).collect()
    }

    /// Asset behind a live handle issued by this cache
    pub fn resolve(&self, handle: AssetHandle<T>) -> Option<&T> {
        if handle.store() != self.store {
            return None;
        }
        self.entries.get(handle.key()).map(|(_, asset)| asset)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }
}
