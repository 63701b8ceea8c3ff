//! Default template formatter: `{name}` placeholder substitution.

use crate::localization::{LocaleId, TextArgs, TextFormatter};
use regex::{Captures, Regex};
use std::sync::OnceLock;

static PLACEHOLDER_REGEX: OnceLock<Regex> = OnceLock::new();

/// Substitutes `{name}` placeholders with values from [`TextArgs`].
///
/// Unknown placeholders are left verbatim so a missing argument is visible
/// instead of silently dropped. `{{` and `}}` produce literal braces.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaceholderFormatter;

impl PlaceholderFormatter {
    pub fn new() -> Self {
        Self
    }
}

impl TextFormatter for PlaceholderFormatter {
    fn format(&self, template: &str, _locale: &LocaleId, args: Option<&TextArgs>) -> String {
        if !template.contains(['{', '}']) {
            return template.to_string();
        }

        let regex = PLACEHOLDER_REGEX
            .get_or_init(|| Regex::new(r"\{\{|\}\}|\{([A-Za-z0-9_.\-]+)\}").unwrap());

        regex
            .replace_all(template, |caps: &Captures| {
                let whole = &caps[0];
                match whole {
                    "{{" => "{".to_string(),
                    "}}" => "}".to_string(),
                    _ => args
                        .and_then(|args| args.get(&caps[1]))
                        .map(str::to_string)
                        .unwrap_or_else(|| whole.to_string()),
                }
            })
            .into_owned()
    }
}
