//! In-memory table store.
//!
//! A flat cache keyed by exact (locale, table). The store performs no fallback
//! walk; the service decides which tables end up registered for which locale.

use crate::localization::{LocaleId, Table, TableId, TextKey};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;
use tracing::debug;

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreEventKind {
    TableLoaded,
    TableUnloaded,
}

/// Change notification for one (locale, table) entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEvent {
    pub kind: StoreEventKind,
    pub locale: LocaleId,
    pub table: TableId,
}

/// Decides which resident tables to drop after a new table is stored.
///
/// The store calls `select_evictions` after every put with the list of resident
/// entries in insertion order (oldest first) and unloads whatever it returns.
pub trait EvictionPolicy: Send + Sync {
    fn select_evictions(
        &self,
        active_locale: &LocaleId,
        resident: &[(LocaleId, TableId)],
    ) -> Vec<(LocaleId, TableId)>;
}

/// Default policy: never evict.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeepAll;

impl EvictionPolicy for KeepAll {
    fn select_evictions(
        &self,
        _active_locale: &LocaleId,
        _resident: &[(LocaleId, TableId)],
    ) -> Vec<(LocaleId, TableId)> {
        Vec::new()
    }
}

#[derive(Default)]
struct Entries {
    tables: HashMap<(LocaleId, TableId), Arc<Table>>,
    // Insertion order of the keys in `tables`, oldest first.
    order: Vec<(LocaleId, TableId)>,
}

impl Entries {
    fn insert(&mut self, key: (LocaleId, TableId), table: Arc<Table>) {
        if self.tables.insert(key.clone(), table).is_some() {
            self.order.retain(|existing| existing != &key);
        }
        self.order.push(key);
    }

    fn remove(&mut self, key: &(LocaleId, TableId)) -> bool {
        if self.tables.remove(key).is_none() {
            return false;
        }
        self.order.retain(|existing| existing != key);
        true
    }
}

/// Holds parsed tables and the active locale.
pub struct TableStore {
    entries: RwLock<Entries>,
    active_locale: RwLock<LocaleId>,
    events: broadcast::Sender<StoreEvent>,
    eviction: Box<dyn EvictionPolicy>,
}

impl TableStore {
    pub fn new(active_locale: LocaleId) -> Self {
        Self::with_eviction(active_locale, Box::new(KeepAll))
    }

    pub fn with_eviction(active_locale: LocaleId, eviction: Box<dyn EvictionPolicy>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            entries: RwLock::new(Entries::default()),
            active_locale: RwLock::new(active_locale),
            events,
            eviction,
        }
    }

    /// Register a table under its own (locale, table) key, replacing any previous snapshot.
    pub fn put(&self, table: Arc<Table>) {
        let locale = table.locale().clone();
        self.put_for(&locale, table);
    }

    /// Register `table` so that it serves lookups for `locale`.
    ///
    /// Used when a fallback chain entry satisfied the table for a locale whose own
    /// content is unavailable.
    pub fn put_for(&self, locale: &LocaleId, table: Arc<Table>) {
        let key = (locale.clone(), table.id().clone());
        let evicted = {
            let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
            entries.insert(key.clone(), table);

            let active = self.active_locale();
            let victims = self.eviction.select_evictions(&active, &entries.order);
            victims
                .into_iter()
                .filter(|victim| victim != &key && entries.remove(victim))
                .collect::<Vec<_>>()
        };

        debug!("Stored table '{}' for locale '{}'", key.1, key.0);
        self.publish(StoreEventKind::TableLoaded, key.0, key.1);
        for (locale, table) in evicted {
            debug!("Evicted table '{}' for locale '{}'", table, locale);
            self.publish(StoreEventKind::TableUnloaded, locale, table);
        }
    }

    /// Remove a table.
    ///
    /// # Returns
    /// `true` if an entry was removed (a `TableUnloaded` event is raised), `false` otherwise.
    pub fn unload(&self, locale: &LocaleId, table: &TableId) -> bool {
        let key = (locale.clone(), table.clone());
        let removed = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key);

        if removed {
            self.publish(StoreEventKind::TableUnloaded, key.0, key.1);
        }
        removed
    }

    /// Record which locale's tables satisfy lookups. Loads nothing.
    pub fn set_active_locale(&self, locale: LocaleId) {
        *self
            .active_locale
            .write()
            .unwrap_or_else(PoisonError::into_inner) = locale;
    }

    pub fn active_locale(&self) -> LocaleId {
        self.active_locale
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn get(&self, locale: &LocaleId, table: &TableId) -> Option<Arc<Table>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .tables
            .get(&(locale.clone(), table.clone()))
            .cloned()
    }

    pub fn contains(&self, locale: &LocaleId, table: &TableId) -> bool {
        self.get(locale, table).is_some()
    }

    /// Look up a raw template for the active locale.
    pub fn try_resolve_template(&self, table: &TableId, key: &TextKey) -> Option<String> {
        let active = self.active_locale();
        self.get(&active, table)
            .and_then(|snapshot| snapshot.template(key).map(str::to_string))
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .tables
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Subscribe to load/unload events.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// Number of live event subscriptions, one per running observation.
    pub fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }

    fn publish(&self, kind: StoreEventKind, locale: LocaleId, table: TableId) {
        // No subscribers is not an error.
        let _ = self.events.send(StoreEvent {
            kind,
            locale,
            table,
        });
    }
}
