//! The localization service: owns the active locale and sequences initialization,
//! preloading and locale switches.
//!
//! # Concurrency
//!
//! - Initialization is single-flighted through an async gate.
//! - Locale switches are ordered by a generation counter. Starting a switch cancels
//!   the token of the previous one; only the attempt holding the latest generation
//!   may commit the active locale or persist the selection.
//! - Persistence writes go through their own async gate and re-check the generation,
//!   so a stale switch can never save after a newer one.
//! - Every std mutex critical section is short and never spans an `.await`.

use crate::localization::{
    Catalog, ContentError, ContentLoader, ErrorCode, EvictionPolicy, FallbackChain,
    FallbackPolicy, JsonTableParser, KeepAll, LocaleId, LocaleStorage, LocalizationError,
    PlaceholderFormatter, ServiceError, Table, TableId, TableParser, TableStore, TextArgs,
    TextFormatter, TextKey,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const ERROR_CHANNEL_CAPACITY: usize = 256;

/// Runtime behavior switches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceOptions {
    /// Return `⟦Missing: Table.Key⟧` for missing keys instead of an empty string.
    pub use_missing_key_placeholders: bool,
    /// Upper bound of the missing-key dedup set; the set is cleared when reached.
    pub max_reported_missing_keys: usize,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            use_missing_key_placeholders: true,
            max_reported_missing_keys: 4096,
        }
    }
}

/// Outcome of [`LocalizationService::set_locale`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocaleSwitch {
    /// The new locale is active (and persistence was attempted).
    Applied,
    /// A newer switch started before this one could commit; nothing changed.
    Superseded,
    /// The locale is not supported; an error event was published, nothing changed.
    Unsupported,
}

type MissingKeyReport = (LocaleId, TableId, TextKey);

/// Outcome of the most recent initialization attempt that ran to completion.
#[derive(Default)]
struct InitAttempts {
    finished: u64,
    last_error: Option<ServiceError>,
}

struct SwitchState {
    generation: u64,
    token: CancellationToken,
}

/// Reentrant busy counter backing [`LocalizationService::is_busy`].
struct Busy {
    count: Mutex<usize>,
    state: watch::Sender<bool>,
}

impl Busy {
    fn new() -> Self {
        let (state, _) = watch::channel(false);
        Self {
            count: Mutex::new(0),
            state,
        }
    }

    fn enter(&self) -> BusyGuard<'_> {
        let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        *count += 1;
        if *count == 1 {
            self.state.send_replace(true);
        }
        BusyGuard { busy: self }
    }

    fn exit(&self) {
        let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.state.send_replace(false);
        }
    }
}

/// Keeps the service busy until dropped.
struct BusyGuard<'a> {
    busy: &'a Busy,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.busy.exit();
    }
}

/// Resolves (locale, table, key) triples to formatted strings.
///
/// Construct once per process with [`LocalizationService::builder`] and share the
/// returned `Arc`. Call [`initialize`](Self::initialize) before anything else:
/// resolving, observing or switching locales on an uninitialized service panics.
pub struct LocalizationService {
    pub(crate) store: TableStore,
    loader: Arc<dyn ContentLoader>,
    parser: Arc<dyn TableParser>,
    catalog: Arc<dyn Catalog>,
    pub(crate) policy: FallbackPolicy,
    formatter: Arc<dyn TextFormatter>,
    locale_storage: Arc<dyn LocaleStorage>,
    options: ServiceOptions,

    pub(crate) current_locale: watch::Sender<LocaleId>,
    busy: Busy,
    errors: broadcast::Sender<LocalizationError>,

    reported_missing_keys: Mutex<HashSet<MissingKeyReport>>,
    tracked_tables: Mutex<Vec<TableId>>,

    initialized: AtomicBool,
    initialize_gate: tokio::sync::Mutex<InitAttempts>,
    // Mirrors `InitAttempts::finished` so callers can read it before queueing on the gate.
    init_attempts: AtomicU64,

    switch: Mutex<SwitchState>,
    save_gate: tokio::sync::Mutex<()>,
}

/// Assembles a [`LocalizationService`].
pub struct LocalizationServiceBuilder {
    default_locale: LocaleId,
    fallback_locales: Vec<LocaleId>,
    catalog: Arc<dyn Catalog>,
    loader: Arc<dyn ContentLoader>,
    locale_storage: Arc<dyn LocaleStorage>,
    parser: Arc<dyn TableParser>,
    formatter: Arc<dyn TextFormatter>,
    eviction: Box<dyn EvictionPolicy>,
    options: ServiceOptions,
}

impl LocalizationServiceBuilder {
    /// System-wide last-resort locales appended to every fallback chain.
    pub fn with_fallback_locales(mut self, locales: Vec<LocaleId>) -> Self {
        self.fallback_locales = locales;
        self
    }

    pub fn with_parser(mut self, parser: Arc<dyn TableParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_formatter(mut self, formatter: Arc<dyn TextFormatter>) -> Self {
        self.formatter = formatter;
        self
    }

    pub fn with_eviction(mut self, eviction: Box<dyn EvictionPolicy>) -> Self {
        self.eviction = eviction;
        self
    }

    pub fn with_options(mut self, options: ServiceOptions) -> Self {
        self.options = options;
        self
    }

    pub fn build(self) -> Arc<LocalizationService> {
        let (current_locale, _) = watch::channel(self.default_locale.clone());
        let (errors, _) = broadcast::channel(ERROR_CHANNEL_CAPACITY);

        Arc::new(LocalizationService {
            store: TableStore::with_eviction(self.default_locale.clone(), self.eviction),
            loader: self.loader,
            parser: self.parser,
            catalog: self.catalog,
            policy: FallbackPolicy::new(self.default_locale, self.fallback_locales),
            formatter: self.formatter,
            locale_storage: self.locale_storage,
            options: self.options,
            current_locale,
            busy: Busy::new(),
            errors,
            reported_missing_keys: Mutex::new(HashSet::new()),
            tracked_tables: Mutex::new(Vec::new()),
            initialized: AtomicBool::new(false),
            initialize_gate: tokio::sync::Mutex::new(InitAttempts::default()),
            init_attempts: AtomicU64::new(0),
            switch: Mutex::new(SwitchState {
                generation: 0,
                token: CancellationToken::new(),
            }),
            save_gate: tokio::sync::Mutex::new(()),
        })
    }
}

impl LocalizationService {
    /// Start building a service.
    ///
    /// The JSON table parser and the placeholder formatter are used unless
    /// replaced on the builder.
    pub fn builder(
        default_locale: LocaleId,
        catalog: Arc<dyn Catalog>,
        loader: Arc<dyn ContentLoader>,
        locale_storage: Arc<dyn LocaleStorage>,
    ) -> LocalizationServiceBuilder {
        LocalizationServiceBuilder {
            default_locale,
            fallback_locales: Vec::new(),
            catalog,
            loader,
            locale_storage,
            parser: Arc::new(JsonTableParser::new()),
            formatter: Arc::new(PlaceholderFormatter::new()),
            eviction: Box::new(KeepAll),
            options: ServiceOptions::default(),
        }
    }

    // ==================== Live Values ====================

    pub fn current_locale(&self) -> LocaleId {
        self.current_locale.borrow().clone()
    }

    /// Receiver notified on every committed locale change.
    pub fn watch_locale(&self) -> watch::Receiver<LocaleId> {
        self.current_locale.subscribe()
    }

    pub fn is_busy(&self) -> bool {
        *self.busy.state.borrow()
    }

    pub fn watch_busy(&self) -> watch::Receiver<bool> {
        self.busy.state.subscribe()
    }

    /// Subscribe to error events. Events published before subscribing are not replayed.
    pub fn errors(&self) -> broadcast::Receiver<LocalizationError> {
        self.errors.subscribe()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub fn supported_locales(&self) -> Vec<LocaleId> {
        self.catalog.supported_locales()
    }

    pub fn fallback_chain(&self, locale: &LocaleId) -> FallbackChain {
        self.policy.fallback_chain(locale)
    }

    /// Tables resolved or observed so far, in first-use order.
    pub fn tracked_tables(&self) -> Vec<TableId> {
        self.tracked_tables
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn store(&self) -> &TableStore {
        &self.store
    }

    // ==================== Initialization ====================

    /// Restore the saved locale and preload startup and required tables.
    ///
    /// Idempotent: concurrent callers share the outcome of the attempt that was
    /// running while they waited, whether it succeeded or failed. Later callers
    /// return immediately once initialized, or retry after a failure.
    ///
    /// # Returns
    /// * `Ok(())` once the service is initialized
    /// * `Err(ServiceError::RequiredTableUnavailable)` if a required table could not
    ///   be loaded through its whole fallback chain; the service stays uninitialized
    /// * `Err(ServiceError::Cancelled)` if `cancel` fired first
    pub async fn initialize(&self, cancel: &CancellationToken) -> Result<(), ServiceError> {
        let seen = self.init_attempts.load(Ordering::Acquire);

        let mut attempts = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ServiceError::Cancelled),
            gate = self.initialize_gate.lock() => gate,
        };

        if self.is_initialized() {
            return Ok(());
        }
        if attempts.finished != seen {
            debug!("Reusing the outcome of a concurrent initialization");
            return attempts.last_error.clone().map_or(Ok(()), Err);
        }

        let result = self.run_initialize(cancel).await;

        // Caller cancellation is not recorded as an outcome.
        if result != Err(ServiceError::Cancelled) {
            attempts.finished += 1;
            attempts.last_error = result.clone().err();
            self.init_attempts.store(attempts.finished, Ordering::Release);
        }
        result
    }

    async fn run_initialize(&self, cancel: &CancellationToken) -> Result<(), ServiceError> {
        let _busy = self.busy.enter();
        info!("Initializing localization");

        let locale = self.restore_saved_locale(cancel).await?;

        let tables = merge_tables(&self.catalog.required_tables(), &self.catalog.startup_tables());
        self.preload(&locale, &tables, cancel).await?;

        self.apply_locale(locale.clone());
        self.initialized.store(true, Ordering::Release);

        info!("Localization initialized. Active locale: {}", locale);
        Ok(())
    }

    async fn restore_saved_locale(
        &self,
        cancel: &CancellationToken,
    ) -> Result<LocaleId, ServiceError> {
        let default_locale = self.policy.default_locale().clone();

        let saved = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ServiceError::Cancelled),
            saved = self.locale_storage.load_selected_locale() => saved,
        };

        match saved {
            Ok(Some(saved)) if self.is_supported(&saved) => {
                debug!("Restoring saved locale {}", saved);
                Ok(saved)
            }
            Ok(Some(saved)) => {
                self.report(
                    LocalizationError::new(
                        ErrorCode::UnsupportedLocale,
                        format!("Unsupported saved locale '{}'.", saved),
                    )
                    .with_locale(saved),
                );
                Ok(default_locale)
            }
            Ok(None) => Ok(default_locale),
            Err(e) => {
                self.report(
                    LocalizationError::new(storage_error_code(&e), "Failed to load saved locale.")
                        .with_cause(e),
                );
                Ok(default_locale)
            }
        }
    }

    // ==================== Locale Switching ====================

    /// Switch to `locale`, superseding any switch still in flight.
    ///
    /// Preloads startup, required and tracked tables for the new locale, then
    /// commits the switch and persists the selection. Once committed, the
    /// selection is persisted regardless of `cancel`.
    ///
    /// # Returns
    /// * `Ok(LocaleSwitch::Applied)` when this call committed the new locale
    /// * `Ok(LocaleSwitch::Superseded)` when a newer switch won
    /// * `Ok(LocaleSwitch::Unsupported)` for unsupported locales
    /// * `Err(ServiceError::Cancelled)` when `cancel` fired before the commit
    /// * `Err(ServiceError::RequiredTableUnavailable)` when a required table cannot be loaded
    ///
    /// # Panics
    /// Panics if the service is not initialized.
    pub async fn set_locale(
        &self,
        locale: LocaleId,
        cancel: &CancellationToken,
    ) -> Result<LocaleSwitch, ServiceError> {
        self.ensure_initialized();

        if !self.is_supported(&locale) {
            self.report(
                LocalizationError::new(
                    ErrorCode::UnsupportedLocale,
                    format!("Unsupported locale '{}'.", locale),
                )
                .with_locale(locale),
            );
            return Ok(LocaleSwitch::Unsupported);
        }

        let (generation, superseded) = self.begin_switch();
        let _busy = self.busy.enter();
        debug!("Switching locale to {} (generation {})", locale, generation);

        let tables = self.locale_switch_tables();
        let preloaded = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ServiceError::Cancelled),
            result = self.preload(&locale, &tables, &superseded) => result,
        };

        if let Err(e) = preloaded {
            if cancel.is_cancelled() {
                return Err(ServiceError::Cancelled);
            }
            if superseded.is_cancelled() || !self.is_current_generation(generation) {
                debug!("Locale switch to {} superseded during preload", locale);
                return Ok(LocaleSwitch::Superseded);
            }
            return Err(e);
        }

        if !self.commit_switch(generation, &locale) {
            debug!("Locale switch to {} superseded before commit", locale);
            return Ok(LocaleSwitch::Superseded);
        }
        info!("Locale switched to {}", locale);

        self.persist_locale(generation, &locale).await;
        Ok(LocaleSwitch::Applied)
    }

    fn begin_switch(&self) -> (u64, CancellationToken) {
        let mut switch = self.switch.lock().unwrap_or_else(PoisonError::into_inner);
        switch.token.cancel();
        switch.generation += 1;
        switch.token = CancellationToken::new();
        (switch.generation, switch.token.clone())
    }

    fn is_current_generation(&self, generation: u64) -> bool {
        self.switch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .generation
            == generation
    }

    /// Commit `locale` if `generation` is still the latest switch.
    ///
    /// The check and the commit happen under the switch lock, so a newer switch
    /// cannot commit in between.
    fn commit_switch(&self, generation: u64, locale: &LocaleId) -> bool {
        let switch = self.switch.lock().unwrap_or_else(PoisonError::into_inner);
        if switch.generation != generation {
            return false;
        }
        self.apply_locale(locale.clone());
        true
    }

    fn apply_locale(&self, locale: LocaleId) {
        self.store.set_active_locale(locale.clone());
        self.reported_missing_keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.current_locale.send_replace(locale);
    }

    async fn persist_locale(&self, generation: u64, locale: &LocaleId) {
        let _gate = self.save_gate.lock().await;

        if !self.is_current_generation(generation) {
            debug!("Skipping save of superseded locale {}", locale);
            return;
        }

        if let Err(e) = self.locale_storage.save_selected_locale(locale).await {
            self.report(
                LocalizationError::new(storage_error_code(&e), "Failed to save locale.")
                    .with_cause(e)
                    .with_locale(locale.clone()),
            );
        }
    }

    fn locale_switch_tables(&self) -> Vec<TableId> {
        let merged = merge_tables(&self.catalog.required_tables(), &self.catalog.startup_tables());
        merge_tables(&merged, &self.tracked_tables())
    }

    // ==================== Preloading ====================

    /// Load `tables` for `locale`, walking the fallback chain per table.
    ///
    /// Each table stops at the first chain entry whose content loads and parses.
    /// A table that fails through the whole chain produces one aggregated error
    /// event; if it is a required table, preloading stops with an error.
    pub async fn preload(
        &self,
        locale: &LocaleId,
        tables: &[TableId],
        cancel: &CancellationToken,
    ) -> Result<(), ServiceError> {
        let chain = self.policy.fallback_chain(locale);

        for table in tables {
            if cancel.is_cancelled() {
                return Err(ServiceError::Cancelled);
            }

            let mut tried: Vec<String> = Vec::with_capacity(chain.len());
            let mut last_error: Option<ContentError> = None;
            let mut loaded = false;

            for candidate in chain.iter() {
                if cancel.is_cancelled() {
                    return Err(ServiceError::Cancelled);
                }

                let address = self.catalog.content_address(candidate, table);
                if tried.contains(&address) {
                    continue;
                }
                tried.push(address.clone());

                let result = {
                    let _release = ReleaseOnDrop {
                        loader: self.loader.as_ref(),
                        address: &address,
                    };
                    self.load_table(&address, candidate, table, cancel).await
                };

                match result {
                    Ok(parsed) => {
                        let parsed = Arc::new(parsed);
                        self.store.put(Arc::clone(&parsed));
                        if candidate != locale {
                            debug!(
                                "Table '{}' for {} served from fallback {}",
                                table, locale, candidate
                            );
                            self.store.put_for(locale, parsed);
                        }
                        loaded = true;
                        break;
                    }
                    Err(ContentError::Cancelled) => return Err(ServiceError::Cancelled),
                    Err(e) => {
                        debug!("Loading '{}' failed: {}", address, e);
                        last_error = Some(e);
                    }
                }
            }

            if loaded {
                continue;
            }

            let code = match &last_error {
                Some(e) if e.is_format() => ErrorCode::ParseFailed,
                _ => ErrorCode::AddressLoadFailed,
            };
            let mut error = LocalizationError::new(
                code,
                format!(
                    "Failed to preload table '{}' for locale '{}'. Tried: {}",
                    table,
                    locale,
                    tried.join(", ")
                ),
            )
            .with_locale(locale.clone())
            .with_table(table.clone());
            if let Some(cause) = last_error {
                error = error.with_cause(cause);
            }
            self.report(error);

            if self.catalog.required_tables().contains(table) {
                return Err(ServiceError::RequiredTableUnavailable {
                    table: table.clone(),
                    locale: locale.clone(),
                });
            }
        }

        Ok(())
    }

    /// Preload `tables` for the current locale.
    pub async fn preload_current_locale(
        &self,
        tables: &[TableId],
        cancel: &CancellationToken,
    ) -> Result<(), ServiceError> {
        let locale = self.current_locale();
        self.preload(&locale, tables, cancel).await
    }

    async fn load_table(
        &self,
        address: &str,
        locale: &LocaleId,
        table: &TableId,
        cancel: &CancellationToken,
    ) -> Result<Table, ContentError> {
        let bytes = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ContentError::Cancelled),
            bytes = self.loader.fetch_bytes(address, cancel) => bytes?,
        };
        self.parser.parse(&bytes, locale, table)
    }

    // ==================== Resolution ====================

    /// Resolve and format a key for the active locale.
    ///
    /// Never walks the fallback chain; fallback content was registered for the
    /// active locale while preloading. Missing keys produce a placeholder (or an
    /// empty string) and one `MissingKey` error event per (locale, table, key).
    ///
    /// # Panics
    /// Panics if the service is not initialized.
    pub fn resolve(&self, table: &TableId, key: &TextKey, args: Option<&TextArgs>) -> String {
        self.ensure_initialized();
        self.track_table(table);
        self.resolve_untracked(table, key, args)
    }

    /// [`resolve`](Self::resolve) with plain string identifiers.
    pub fn resolve_str(&self, table: &str, key: &str, args: Option<&TextArgs>) -> String {
        self.resolve(&TableId::new(table), &TextKey::new(key), args)
    }

    pub(crate) fn resolve_untracked(
        &self,
        table: &TableId,
        key: &TextKey,
        args: Option<&TextArgs>,
    ) -> String {
        let locale = self.store.active_locale();
        let formatted = self.store.get(&locale, table).and_then(|snapshot| {
            snapshot
                .template(key)
                .map(|template| self.formatter.format(template, &locale, args))
        });

        match formatted {
            Some(text) => text,
            None => {
                self.report_missing_key(locale, table, key);
                if self.options.use_missing_key_placeholders {
                    format!("⟦Missing: {}.{}⟧", table, key)
                } else {
                    String::new()
                }
            }
        }
    }

    fn report_missing_key(&self, locale: LocaleId, table: &TableId, key: &TextKey) {
        let first_report = {
            let mut reported = self
                .reported_missing_keys
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if reported.len() >= self.options.max_reported_missing_keys {
                reported.clear();
            }
            reported.insert((locale.clone(), table.clone(), key.clone()))
        };

        if first_report {
            self.report(
                LocalizationError::new(
                    ErrorCode::MissingKey,
                    format!("Missing key '{}' in table '{}'.", key, table),
                )
                .with_locale(locale)
                .with_table(table.clone())
                .with_key(key.clone()),
            );
        }
    }

    pub(crate) fn track_table(&self, table: &TableId) {
        if table.is_blank() {
            return;
        }

        let mut tracked = self
            .tracked_tables
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !tracked.contains(table) {
            tracked.push(table.clone());
        }
    }

    // ==================== Helpers ====================

    pub(crate) fn ensure_initialized(&self) {
        assert!(
            self.is_initialized(),
            "LocalizationService is not initialized. Call initialize() first."
        );
    }

    fn is_supported(&self, locale: &LocaleId) -> bool {
        self.catalog.supported_locales().contains(locale)
    }

    fn report(&self, error: LocalizationError) {
        warn!("Localization error: {}", error);
        // No subscribers is not an error.
        let _ = self.errors.send(error);
    }
}

/// Storage adapters report their own failures as `ContentError::Storage`;
/// anything else coming out of locale storage is unexpected.
fn storage_error_code(error: &ContentError) -> ErrorCode {
    match error {
        ContentError::Storage(_) => ErrorCode::PersistenceFailed,
        _ => ErrorCode::Unknown,
    }
}

/// Releases a fetched address when dropped, including when the fetch itself is
/// dropped by a cancelled caller.
struct ReleaseOnDrop<'a> {
    loader: &'a dyn ContentLoader,
    address: &'a str,
}

impl Drop for ReleaseOnDrop<'_> {
    fn drop(&mut self) {
        self.loader.release(self.address);
    }
}

/// Concatenate two table lists, dropping duplicates and keeping first-seen order.
fn merge_tables(first: &[TableId], second: &[TableId]) -> Vec<TableId> {
    let mut merged: Vec<TableId> = Vec::with_capacity(first.len() + second.len());
    for table in first.iter().chain(second) {
        if !merged.contains(table) {
            merged.push(table.clone());
        }
    }
    merged
}
