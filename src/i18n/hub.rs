use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use super::fluent::{Bundle, LocaleBundle};
use super::I18nError;

/// Locale used when the user has no known preference.
pub const ROOT_LOCALE: &str = "ru";

/// Requested locale → lookup chain, first registered bundle with the message wins.
pub const LOCALES_MAP: &[(&str, &[&str])] = &[("ru", &["ru", "en"]), ("en", &["en", "ru"])];

/// Messages every chain must be able to produce.
pub const REQUIRED_KEYS: &[&str] = &[
    "welcome-text",
    "repository-link",
    "click-on-link",
    "admin-panel",
    "bot-started",
    "bot-stopped",
    "start-command",
];

/// Message lookups bound to one locale and its fallback chain.
///
/// Cloning is cheap, bundles are shared.
#[derive(Clone)]
pub struct Translator {
    locale: Arc<str>,
    chain: Arc<[Arc<Bundle>]>,
}

impl Translator {
    pub fn locale(&self) -> &str {
        &self.locale
    }

    pub fn try_get(&self, key: &str) -> Result<String, I18nError> {
        for bundle in self.chain.iter() {
            let Some(pattern) = bundle.get_message(key).and_then(|m| m.value()) else {
                continue;
            };
            let mut errors = vec![];
            let value = bundle.format_pattern(pattern, None, &mut errors);
            if !errors.is_empty() {
                return Err(I18nError::Format {
                    locale: self.locale.to_string(),
                    key: key.to_string(),
                    errors: errors.iter().map(|e| e.to_string()).collect(),
                });
            }
            return Ok(value.into_owned());
        }
        Err(I18nError::MissingMessage { locale: self.locale.to_string(), key: key.to_string() })
    }

    /// Like [`Translator::try_get`], but falls back to the key itself.
    pub fn get(&self, key: &str) -> String {
        self.try_get(key).unwrap_or_else(|e| {
            warn!("Translation lookup failed: {e}");
            key.to_string()
        })
    }

    pub fn welcome_text(&self) -> String {
        self.get("welcome-text")
    }

    pub fn repository_link(&self) -> String {
        self.get("repository-link")
    }

    pub fn click_on_link(&self) -> String {
        self.get("click-on-link")
    }

    pub fn admin_panel(&self) -> String {
        self.get("admin-panel")
    }

    pub fn bot_started(&self) -> String {
        self.get("bot-started")
    }

    pub fn bot_stopped(&self) -> String {
        self.get("bot-stopped")
    }

    pub fn start_command(&self) -> String {
        self.get("start-command")
    }

    /// Reply to `/start`.
    pub fn start_message(&self) -> String {
        [self.welcome_text(), self.repository_link(), self.click_on_link()].join("\n")
    }
}

/// All configured translators, built and validated once.
pub struct TranslatorHub {
    root: Translator,
    translators: HashMap<String, Translator>,
}

impl TranslatorHub {
    pub fn new(root: &str, locales_map: &[(&str, &[&str])], bundles: Vec<LocaleBundle>) -> Result<Self, I18nError> {
        let mut registered: HashMap<String, Arc<Bundle>> = HashMap::new();
        for b in bundles {
            if registered.contains_key(&b.locale) {
                return Err(I18nError::DuplicateBundle(b.locale));
            }
            registered.insert(b.locale, Arc::new(b.bundle));
        }

        let mut translators = HashMap::new();
        for (locale, chain) in locales_map {
            let resolved: Vec<Arc<Bundle>> = chain
                .iter()
                .filter_map(|l| match registered.get(*l) {
                    Some(bundle) => Some(bundle.clone()),
                    None => {
                        debug!("Locale {l} in chain of {locale} has no bundle, skipping");
                        None
                    }
                })
                .collect();
            if resolved.is_empty() {
                return Err(I18nError::EmptyChain(locale.to_string()));
            }

            let translator = Translator { locale: Arc::from(*locale), chain: resolved.into() };
            for key in REQUIRED_KEYS {
                translator.try_get(key)?;
            }
            translators.insert(locale.to_string(), translator);
        }

        let root = translators
            .get(root)
            .cloned()
            .ok_or_else(|| I18nError::UnknownRoot(root.to_string()))?;

        Ok(Self { root, translators })
    }

    /// The hub shipped with the bot: `ru` (root) and `en`.
    pub fn embedded() -> Result<Self, I18nError> {
        let bundles = ["ru", "en"]
            .into_iter()
            .map(LocaleBundle::embedded)
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(ROOT_LOCALE, LOCALES_MAP, bundles)
    }

    pub fn root_locale(&self) -> &str {
        self.root.locale()
    }

    pub fn locales(&self) -> Vec<&str> {
        let mut locales: Vec<&str> = self.translators.keys().map(String::as_str).collect();
        locales.sort();
        locales
    }

    /// Translator for a user's language tag, the root locale when unknown.
    ///
    /// `en-US` and `en_us` resolve to `en` when only the primary tag is mapped.
    pub fn resolve(&self, language_code: Option<&str>) -> Translator {
        let normalized = language_code
            .map(|tag| tag.trim().to_lowercase().replace('_', "-"))
            .filter(|tag| !tag.is_empty());

        let found = normalized.as_deref().and_then(|tag| {
            self.translators.get(tag).or_else(|| {
                let primary = tag.split('-').next().unwrap_or(tag);
                self.translators.get(primary)
            })
        });

        found.unwrap_or(&self.root).clone()
    }
}
