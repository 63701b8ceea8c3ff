//! Live text observations that re-emit when the locale, table content or
//! arguments change.

use crate::localization::{LocaleId, LocalizationService, StoreEvent, TableId, TextArgs, TextKey};
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::debug;

/// A stream of formatted strings for one (table, key).
///
/// The current text is available immediately. Dropping the observation stops
/// its background task; nothing is emitted afterwards.
pub struct TextObservation {
    receiver: mpsc::UnboundedReceiver<String>,
    task: JoinHandle<()>,
}

impl TextObservation {
    /// Wait for the next emission. `None` once the service side has shut down.
    pub async fn recv(&mut self) -> Option<String> {
        self.receiver.recv().await
    }

    /// Take an emission that is already queued, if any.
    pub fn try_recv(&mut self) -> Option<String> {
        self.receiver.try_recv().ok()
    }
}

impl Stream for TextObservation {
    type Item = String;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<String>> {
        self.receiver.poll_recv(cx)
    }
}

impl Drop for TextObservation {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Locale,
    Store,
    Args,
}

impl LocalizationService {
    /// Observe a key with fixed arguments.
    ///
    /// Emits the current text at once, then again whenever the active locale
    /// changes or content for this table is loaded or unloaded in the active
    /// fallback chain. Consecutive identical strings are suppressed.
    ///
    /// Must be called within a Tokio runtime.
    ///
    /// # Panics
    /// Panics if the service is not initialized.
    pub fn observe(
        self: &Arc<Self>,
        table: TableId,
        key: TextKey,
        args: Option<TextArgs>,
    ) -> TextObservation {
        self.ensure_initialized();
        self.track_table(&table);
        self.spawn_observation(table, key, args, None)
    }

    /// Observe a key whose arguments change over time.
    ///
    /// Like [`observe`](Self::observe), and additionally re-emits on every
    /// argument change, even when the formatted text is the same.
    pub fn observe_with(
        self: &Arc<Self>,
        table: TableId,
        key: TextKey,
        mut args: watch::Receiver<TextArgs>,
    ) -> TextObservation {
        self.ensure_initialized();
        self.track_table(&table);
        let current = args.borrow_and_update().clone();
        self.spawn_observation(table, key, Some(current), Some(args))
    }

    fn spawn_observation(
        self: &Arc<Self>,
        table: TableId,
        key: TextKey,
        args: Option<TextArgs>,
        args_source: Option<watch::Receiver<TextArgs>>,
    ) -> TextObservation {
        let (sender, receiver) = mpsc::unbounded_channel();

        // Subscribe before the first resolve so no change can slip in between.
        let locale_changes = self.current_locale.subscribe();
        let store_events = self.store.subscribe();

        let first = self.resolve_untracked(&table, &key, args.as_ref());
        let _ = sender.send(first.clone());

        let task = tokio::spawn(run_observation(
            Arc::clone(self),
            Observed { table, key, args },
            Sources {
                locale_changes,
                store_events,
                args_source,
            },
            sender,
            first,
        ));

        TextObservation { receiver, task }
    }
}

struct Observed {
    table: TableId,
    key: TextKey,
    args: Option<TextArgs>,
}

struct Sources {
    locale_changes: watch::Receiver<LocaleId>,
    store_events: broadcast::Receiver<StoreEvent>,
    args_source: Option<watch::Receiver<TextArgs>>,
}

async fn run_observation(
    service: Arc<LocalizationService>,
    mut observed: Observed,
    mut sources: Sources,
    sender: mpsc::UnboundedSender<String>,
    mut last: String,
) {
    let mut store_open = true;

    loop {
        let trigger = tokio::select! {
            changed = sources.locale_changes.changed() => match changed {
                Ok(()) => Trigger::Locale,
                Err(_) => return,
            },
            event = sources.store_events.recv(), if store_open => match event {
                Ok(event) if affects(&service, &observed.table, &event) => Trigger::Store,
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    debug!("Observation lagged {} store events, refreshing", skipped);
                    Trigger::Store
                }
                Err(RecvError::Closed) => {
                    store_open = false;
                    continue;
                }
            },
            args = next_args(&mut sources.args_source) => match args {
                Some(args) => {
                    observed.args = Some(args);
                    Trigger::Args
                }
                None => continue,
            },
            _ = sender.closed() => return,
        };

        let text = service.resolve_untracked(&observed.table, &observed.key, observed.args.as_ref());
        if trigger != Trigger::Args && text == last {
            continue;
        }

        last = text.clone();
        if sender.send(text).is_err() {
            return;
        }
    }
}

/// A store event matters when it touches the observed table for a locale in
/// the active fallback chain.
fn affects(service: &LocalizationService, table: &TableId, event: &StoreEvent) -> bool {
    if &event.table != table {
        return false;
    }
    service
        .policy
        .fallback_chain(&service.store.active_locale())
        .contains(&event.locale)
}

/// Next argument value, or pending forever for static observations. Returns
/// `None` once when the argument source goes away.
async fn next_args(source: &mut Option<watch::Receiver<TextArgs>>) -> Option<TextArgs> {
    let Some(receiver) = source.as_mut() else {
        return std::future::pending().await;
    };

    if receiver.changed().await.is_ok() {
        return Some(receiver.borrow_and_update().clone());
    }

    *source = None;
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::localization::{
        BundleLoader, MemoryLocaleStorage, StaticCatalog, StoreEventKind, Table,
    };
    use std::collections::HashMap;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn locale(code: &str) -> LocaleId {
        LocaleId::new(code).unwrap()
    }

    fn table(locale_code: &str, name: &str, entries: &[(&str, &str)]) -> Arc<Table> {
        let entries: HashMap<TextKey, String> = entries
            .iter()
            .map(|(k, v)| (TextKey::new(k), v.to_string()))
            .collect();
        Arc::new(Table::new(locale(locale_code), TableId::new(name), entries))
    }

    async fn initialized() -> Arc<LocalizationService> {
        let catalog = StaticCatalog::new(vec![locale("en-US"), locale("de-DE")]);
        let service = LocalizationService::builder(
            locale("en-US"),
            Arc::new(catalog),
            Arc::new(BundleLoader::new()),
            Arc::new(MemoryLocaleStorage::default()),
        )
        .build();
        service
            .initialize(&CancellationToken::new())
            .await
            .expect("Should initialize without tables");
        service
    }

    async fn next(observation: &mut TextObservation) -> Option<String> {
        tokio::time::timeout(Duration::from_secs(1), observation.recv())
            .await
            .ok()
            .flatten()
    }

    async fn quiet(observation: &mut TextObservation) -> bool {
        tokio::time::timeout(Duration::from_millis(50), observation.recv())
            .await
            .is_err()
    }

    #[tokio::test]
    async fn test_first_emission_is_immediate() {
        let service = initialized().await;
        service.store().put(table("en-US", "UI", &[("Play", "Play")]));

        let mut observation =
            service.observe(TableId::new("UI"), TextKey::new("Play"), None);
        assert_eq!(observation.try_recv().as_deref(), Some("Play"));
    }

    #[tokio::test]
    async fn test_store_event_refreshes_text() {
        let service = initialized().await;
        let mut observation =
            service.observe(TableId::new("UI"), TextKey::new("Play"), None);
        assert_eq!(next(&mut observation).await.as_deref(), Some("⟦Missing: UI.Play⟧"));

        service.store().put(table("en-US", "UI", &[("Play", "Play")]));
        assert_eq!(next(&mut observation).await.as_deref(), Some("Play"));
    }

    #[tokio::test]
    async fn test_unrelated_table_event_ignored() {
        let service = initialized().await;
        service.store().put(table("en-US", "UI", &[("Play", "Play")]));
        let mut observation =
            service.observe(TableId::new("UI"), TextKey::new("Play"), None);
        next(&mut observation).await;

        service.store().put(table("en-US", "Errors", &[("Oops", "Oops")]));
        service.store().put(table("de-DE", "UI", &[("Play", "Spielen")]));
        assert!(quiet(&mut observation).await);
    }

    #[tokio::test]
    async fn test_dynamic_args_always_emit() {
        let service = initialized().await;
        service
            .store()
            .put(table("en-US", "UI", &[("Hi", "Hi {name}"), ("Static", "Static")]));

        let (args_tx, args_rx) = watch::channel(TextArgs::new().with("name", "Ann"));
        let mut observation =
            service.observe_with(TableId::new("UI"), TextKey::new("Hi"), args_rx);
        assert_eq!(next(&mut observation).await.as_deref(), Some("Hi Ann"));

        args_tx.send_replace(TextArgs::new().with("name", "Bob"));
        assert_eq!(next(&mut observation).await.as_deref(), Some("Hi Bob"));

        // Same text again still emits for an argument change
        args_tx.send_replace(TextArgs::new().with("name", "Bob"));
        assert_eq!(next(&mut observation).await.as_deref(), Some("Hi Bob"));
    }

    #[tokio::test]
    async fn test_dropped_args_source_keeps_observation_alive() {
        let service = initialized().await;
        let (args_tx, args_rx) = watch::channel(TextArgs::new().with("name", "Ann"));
        let mut observation =
            service.observe_with(TableId::new("UI"), TextKey::new("Hi"), args_rx);
        next(&mut observation).await;
        drop(args_tx);

        service.store().put(table("en-US", "UI", &[("Hi", "Hi {name}")]));
        assert_eq!(next(&mut observation).await.as_deref(), Some("Hi Ann"));
    }

    #[tokio::test]
    async fn test_dropped_observation_stops_its_task() {
        let service = initialized().await;
        assert_eq!(service.store().subscriber_count(), 0);

        let mut observation =
            service.observe(TableId::new("UI"), TextKey::new("Play"), None);
        next(&mut observation).await;
        assert_eq!(service.store().subscriber_count(), 1);

        drop(observation);
        tokio::time::timeout(Duration::from_secs(1), async {
            while service.store().subscriber_count() > 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("Observation task should stop after drop");

        // Nothing is listening any more; changes must not fail or revive it
        service.store().put(table("en-US", "UI", &[("Play", "Play")]));
        assert_eq!(service.store().subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_events_for_fallback_chain_locales_affect_observation() {
        let catalog = StaticCatalog::new(vec![locale("en-US"), locale("fr-FR")]);
        let service = LocalizationService::builder(
            locale("en-US"),
            Arc::new(catalog),
            Arc::new(BundleLoader::new()),
            Arc::new(MemoryLocaleStorage::default()),
        )
        .build();
        service.store.set_active_locale(locale("fr-FR"));

        let event = |locale_code: &str, name: &str| StoreEvent {
            kind: StoreEventKind::TableLoaded,
            locale: locale(locale_code),
            table: TableId::new(name),
        };
        let ui = TableId::new("UI");

        assert!(affects(&service, &ui, &event("fr-FR", "UI")));
        assert!(affects(&service, &ui, &event("fr", "UI")));
        assert!(affects(&service, &ui, &event("en-US", "UI")));
        assert!(!affects(&service, &ui, &event("de-DE", "UI")));
        assert!(!affects(&service, &ui, &event("en-US", "Menu")));
    }
}
