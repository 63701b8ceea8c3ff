//! Fallback policy: which locales to try, in order, for a requested locale.

use crate::localization::LocaleId;
use std::collections::HashMap;
use std::ops::Deref;
use std::sync::{Arc, Mutex, PoisonError};

/// Ordered, deduplicated list of candidate locales.
///
/// The first element is always the requested locale and the configured default
/// locale is always present, so a chain is never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackChain(Arc<[LocaleId]>);

impl FallbackChain {
    pub fn requested(&self) -> &LocaleId {
        &self.0[0]
    }

    pub fn contains(&self, locale: &LocaleId) -> bool {
        self.0.iter().any(|candidate| candidate == locale)
    }
}

impl Deref for FallbackChain {
    type Target = [LocaleId];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Builds and caches fallback chains.
///
/// Chains are computed once per distinct requested locale and kept for the
/// lifetime of the policy. The cache only grows with the number of distinct
/// locales ever requested, which is small.
#[derive(Debug)]
pub struct FallbackPolicy {
    default_locale: LocaleId,
    extra_fallbacks: Vec<LocaleId>,
    cache: Mutex<HashMap<LocaleId, FallbackChain>>,
}

impl FallbackPolicy {
    /// Create a policy.
    ///
    /// # Arguments
    /// * `default_locale` - Appended to every chain after the language-only form
    /// * `extra_fallbacks` - System-wide last-resort locales appended after the default
    pub fn new(default_locale: LocaleId, extra_fallbacks: Vec<LocaleId>) -> Self {
        Self {
            default_locale,
            extra_fallbacks,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn default_locale(&self) -> &LocaleId {
        &self.default_locale
    }

    /// Get the fallback chain for `requested`.
    ///
    /// `[requested, language-only(requested), default, extra fallbacks...]`,
    /// deduplicated with first-seen order preserved. When `requested` is the
    /// default locale its language-only form is skipped.
    pub fn fallback_chain(&self, requested: &LocaleId) -> FallbackChain {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(chain) = cache.get(requested) {
            return chain.clone();
        }

        let mut locales: Vec<LocaleId> = Vec::with_capacity(3 + self.extra_fallbacks.len());
        append_unique(&mut locales, requested.clone());
        // The default locale is its own last resort.
        if requested != &self.default_locale {
            if let Some(language_only) = requested.language_only() {
                append_unique(&mut locales, language_only);
            }
        }
        append_unique(&mut locales, self.default_locale.clone());
        for locale in &self.extra_fallbacks {
            append_unique(&mut locales, locale.clone());
        }

        let chain = FallbackChain(Arc::from(locales));
        cache.insert(requested.clone(), chain.clone());
        chain
    }

    #[cfg(test)]
    fn cached_chains(&self) -> usize {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

fn append_unique(locales: &mut Vec<LocaleId>, locale: LocaleId) {
    if !locales.contains(&locale) {
        locales.push(locale);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn locale(code: &str) -> LocaleId {
        LocaleId::new(code).unwrap()
    }

    fn codes(chain: &FallbackChain) -> Vec<&str> {
        chain.iter().map(LocaleId::code).collect()
    }

    // ==================== Chain Shape Tests ====================

    #[test]
    fn test_chain_for_default_locale_is_single() {
        let policy = FallbackPolicy::new(locale("en-US"), vec![]);
        let chain = policy.fallback_chain(&locale("en-US"));
        assert_eq!(codes(&chain), vec!["en-US"]);
    }

    #[test]
    fn test_chain_includes_language_only_and_default() {
        let policy = FallbackPolicy::new(locale("en-US"), vec![]);
        let chain = policy.fallback_chain(&locale("fr-FR"));
        assert_eq!(codes(&chain), vec!["fr-FR", "fr", "en-US"]);
        assert_eq!(chain.requested(), &locale("fr-FR"));
    }

    #[test]
    fn test_chain_for_language_only_request() {
        let policy = FallbackPolicy::new(locale("en-US"), vec![]);
        let chain = policy.fallback_chain(&locale("ru"));
        assert_eq!(codes(&chain), vec!["ru", "en-US"]);
    }

    #[test]
    fn test_chain_appends_extra_fallbacks_deduplicated() {
        let policy = FallbackPolicy::new(locale("en-US"), vec![locale("en"), locale("en-US")]);
        let chain = policy.fallback_chain(&locale("en-GB"));
        assert_eq!(codes(&chain), vec!["en-GB", "en", "en-US"]);
    }

    // ==================== Cache Tests ====================

    #[test]
    fn test_chain_is_cached_per_requested_locale() {
        let policy = FallbackPolicy::new(locale("en-US"), vec![]);
        let first = policy.fallback_chain(&locale("de-DE"));
        let second = policy.fallback_chain(&locale("de-de"));
        assert_eq!(first, second);
        assert_eq!(policy.cached_chains(), 1);

        policy.fallback_chain(&locale("ja"));
        assert_eq!(policy.cached_chains(), 2);
    }

    // ==================== Property Tests ====================

    proptest! {
        #[test]
        fn prop_chain_starts_with_request_and_contains_default(
            lang in "[a-z]{2}",
            region in proptest::option::of("[A-Z]{2}"),
        ) {
            let code = match region {
                Some(r) => format!("{}-{}", lang, r),
                None => lang,
            };
            let requested = locale(&code);
            let policy = FallbackPolicy::new(locale("en-US"), vec![locale("en")]);
            let chain = policy.fallback_chain(&requested);

            prop_assert_eq!(chain.requested(), &requested);
            prop_assert!(chain.contains(&locale("en-US")));
            let mut seen = std::collections::HashSet::new();
            for candidate in chain.iter() {
                prop_assert!(seen.insert(candidate.clone()));
            }
        }
    }
}
