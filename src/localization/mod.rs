//! Runtime text localization.
//!
//! Text is organized in tables (named groups of keyed templates) per locale.
//! Tables are loaded lazily from content addresses, cached in a [`TableStore`],
//! and resolved through a [`LocalizationService`] that owns the active locale.
//!
//! # Architecture
//!
//! - `ids`: validated locale, table and key identifiers
//! - `policy`: fallback chains (`fr-FR` -> `fr` -> default -> extra fallbacks)
//! - `store`: flat (locale, table) cache with change events
//! - `ports`: collaborator traits (catalog, loader, parser, storage, formatter)
//! - `catalog`, `loader`, `parser`, `storage`, `formatter`: stock implementations
//! - `service`: initialization, locale switching, preloading, resolution
//! - `observe`: live strings that follow locale and content changes
//!
//! # Example
//!
//! ```rust,ignore
//! use localization_service::localization::*;
//!
//! let service = LocalizationService::builder(
//!     LocaleId::new("en-US")?,
//!     Arc::new(StaticCatalog::new(supported).with_required_tables(vec![TableId::new("UI")])),
//!     Arc::new(FsLoader::new("content")),
//!     Arc::new(FileLocaleStorage::new("locale.json")),
//! )
//! .build();
//!
//! service.initialize(&CancellationToken::new()).await?;
//! let play = service.resolve_str("UI", "Play", None);
//! ```

mod catalog;
mod error;
mod formatter;
mod ids;
mod loader;
mod observe;
mod parser;
mod policy;
mod ports;
mod service;
mod storage;
mod store;
mod table;

pub use catalog::StaticCatalog;
pub use error::{ContentError, ErrorCode, LocalizationError, ServiceError};
pub use formatter::PlaceholderFormatter;
pub use ids::{IdError, LocaleId, TableId, TextKey};
pub use loader::{BundleLoader, FsLoader, RetryingLoader};
pub use observe::TextObservation;
pub use parser::JsonTableParser;
pub use policy::{FallbackChain, FallbackPolicy};
pub use ports::{Catalog, ContentLoader, LocaleStorage, TableParser, TextArgs, TextFormatter};
pub use service::{LocaleSwitch, LocalizationService, LocalizationServiceBuilder, ServiceOptions};
pub use storage::{FileLocaleStorage, MemoryLocaleStorage};
pub use store::{EvictionPolicy, KeepAll, StoreEvent, StoreEventKind, TableStore};
pub use table::Table;
