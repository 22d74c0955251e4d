/// Favourite symbols, persisted to durable storage
///
/// Memory is authoritative: storage failures are logged and otherwise ignored.
use std::time::Instant;

use fnv::FnvHashSet;
use tracing::{debug, warn};

use super::{
    debounce::{DEFAULT_DEBOUNCE, Debouncer},
    storage::KeyValueStore,
};

/// Storage key holding the JSON array of favourite symbols
pub const FAVOURITES_KEY: &str = "favourites";

#[derive(Debug)]
pub struct FavoritesStore {
    symbols: FnvHashSet<String>,
    store: Box<dyn KeyValueStore>,
    persist: Debouncer,
}

impl FavoritesStore {
    /// Load the favourites set from `store`. Missing or corrupt data yields an empty set.
    pub fn load(store: Box<dyn KeyValueStore>) -> Self {
        let symbols = match store.get(FAVOURITES_KEY) {
            Ok(Some(raw)) => serde_json::from_str::<Vec<String>>(&raw)
                .map(|symbols| symbols.into_iter().collect())
                .unwrap_or_else(|error| {
                    warn!(%error, "stored favourites are corrupt, starting empty");
                    FnvHashSet::default()
                }),
            Ok(None) => FnvHashSet::default(),
            Err(error) => {
                warn!(%error, backend = store.backend(), "failed to read favourites");
                FnvHashSet::default()
            }
        };

        debug!(count = symbols.len(), "loaded favourites");

        Self {
            symbols,
            store,
            persist: Debouncer::new(DEFAULT_DEBOUNCE),
        }
    }

    pub fn is_favorite(&self, symbol: &str) -> bool {
        self.symbols.contains(symbol)
    }

    /// Add or remove `symbol`, returning whether it is now a favourite. Persistence is
    /// scheduled, not immediate.
    pub fn toggle(&mut self, symbol: &str, now: Instant) -> bool {
        let favourite = if self.symbols.remove(symbol) {
            false
        } else {
            self.symbols.insert(symbol.to_string());
            true
        };

        self.persist.schedule(now);
        favourite
    }

    pub fn symbols(&self) -> &FnvHashSet<String> {
        &self.symbols
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn backend(&self) -> &'static str {
        self.store.backend()
    }

    pub fn has_pending_persist(&self) -> bool {
        self.persist.is_pending()
    }

    /// Persist if the debounce deadline has passed.
    pub fn flush_due(&mut self, now: Instant) {
        if self.persist.fire_due(now) {
            self.write();
        }
    }

    /// Persist any pending change now.
    pub fn flush(&mut self) {
        if self.persist.take() {
            self.write();
        }
    }

    #[cfg(test)]
    pub(crate) fn store(&self) -> &dyn KeyValueStore {
        self.store.as_ref()
    }

    fn write(&mut self) {
        let result = if self.symbols.is_empty() {
            self.store.remove(FAVOURITES_KEY)
        } else {
            let mut symbols = self.symbols.iter().collect::<Vec<_>>();
            symbols.sort();
            serde_json::to_string(&symbols)
                .map_err(Into::into)
                .and_then(|raw| self.store.set(FAVOURITES_KEY, &raw))
        };

        match result {
            Ok(()) => debug!(count = self.symbols.len(), "persisted favourites"),
            Err(error) => {
                warn!(%error, backend = self.store.backend(), "failed to persist favourites")
            }
        }
    }
}

impl Drop for FavoritesStore {
    fn drop(&mut self) {
        self.flush();
    }
}
