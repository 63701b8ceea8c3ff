//! Localize binary - resolves localized strings from content on disk
//!
//! Usage:
//!   cargo run -- UI.Play UI.Greeting name=Ann          # Resolve in the saved/default locale
//!   cargo run -- --locale ru-RU UI.Play                # Switch (and persist) first
//!
//! Keys are given as `Table.Key`; `name=value` pairs become format arguments.
//!
//! Optional environment variables (see `Config::from_env`):
//! - LOCALIZATION_DEFAULT_LOCALE (defaults to en-US)
//! - LOCALIZATION_SUPPORTED_LOCALES
//! - LOCALIZATION_REQUIRED_TABLES / LOCALIZATION_STARTUP_TABLES
//! - LOCALIZATION_CONTENT_DIR (defaults to content)
//! - LOCALIZATION_LOCALE_FILE (defaults to selected_locale.json)

use anyhow::{bail, Context, Result};
use localization_service::config::Config;
use localization_service::localization::{
    FileLocaleStorage, FsLoader, LocaleId, LocaleSwitch, LocalizationService, RetryingLoader,
    TextArgs,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

struct Request {
    locale: Option<LocaleId>,
    keys: Vec<(String, String)>,
    args: TextArgs,
}

fn parse_args(args: &[String]) -> Result<Request> {
    let mut request = Request {
        locale: None,
        keys: Vec::new(),
        args: TextArgs::new(),
    };

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--locale" {
            let code = iter.next().context("--locale requires a value")?;
            request.locale = Some(LocaleId::new(code).context("Invalid --locale value")?);
        } else if let Some((name, value)) = arg.split_once('=') {
            request.args.insert(name, value);
        } else if let Some((table, key)) = arg.split_once('.') {
            request.keys.push((table.to_string(), key.to_string()));
        } else {
            bail!("Expected Table.Key, name=value or --locale, got '{}'", arg);
        }
    }

    Ok(request)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("localization_service=info".parse()?),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let request = parse_args(&args)?;

    let config = Config::from_env()?;
    info!(
        "Loading content from {} (default locale {})",
        config.content_dir.display(),
        config.default_locale
    );

    let loader = RetryingLoader::new(FsLoader::new(&config.content_dir), config.retry_config());
    let service = LocalizationService::builder(
        config.default_locale.clone(),
        Arc::new(config.catalog()),
        Arc::new(loader),
        Arc::new(FileLocaleStorage::new(&config.locale_file)),
    )
    .with_fallback_locales(config.fallback_locales.clone())
    .with_options(config.service_options())
    .build();

    // Error events are logged by the service at warn level
    let cancel = CancellationToken::new();
    service
        .initialize(&cancel)
        .await
        .context("Failed to initialize localization")?;

    if let Some(locale) = request.locale {
        match service.set_locale(locale.clone(), &cancel).await? {
            LocaleSwitch::Applied => info!("Switched to {}", locale),
            LocaleSwitch::Unsupported => bail!("Locale {} is not supported", locale),
            LocaleSwitch::Superseded => warn!("Switch to {} was superseded", locale),
        }
    }

    let args = (!request.args.is_empty()).then_some(&request.args);
    for (table, key) in &request.keys {
        println!("{}.{} = {}", table, key, service.resolve_str(table, key, args));
    }

    Ok(())
}
