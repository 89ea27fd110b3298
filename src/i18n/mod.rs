//! Localized bot texts.
//!
//! Translations are Fluent (`.ftl`) files embedded into the binary. A
//! [`TranslatorHub`] is built once at startup, validating every locale chain,
//! and hands out a [`Translator`] per inbound event.

pub mod fluent;
pub mod hub;

use std::fmt;

pub use fluent::LocaleBundle;
pub use hub::{Translator, TranslatorHub, REQUIRED_KEYS};

#[derive(Debug)]
pub enum I18nError {
    /// The tag is not a valid language identifier.
    InvalidLocale(String),
    /// No embedded `.ftl` files exist for the locale.
    MissingAssets(String),
    /// A `.ftl` file does not parse.
    Parse { locale: String, file: String, errors: Vec<String> },
    /// A `.ftl` file redefines messages already in the bundle.
    Resource { locale: String, file: String, errors: Vec<String> },
    DuplicateBundle(String),
    /// The root locale has no entry in the locale map.
    UnknownRoot(String),
    /// None of the locales in the chain has a registered bundle.
    EmptyChain(String),
    MissingMessage { locale: String, key: String },
    Format { locale: String, key: String, errors: Vec<String> },
}

impl fmt::Display for I18nError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidLocale(tag) => write!(f, "invalid locale tag '{}'", tag),
            Self::MissingAssets(locale) => write!(f, "no translation files for locale '{}'", locale),
            Self::Parse { locale, file, errors } => {
                write!(f, "failed to parse {} for '{}': {}", file, locale, errors.join("; "))
            }
            Self::Resource { locale, file, errors } => {
                write!(f, "failed to add {} to '{}': {}", file, locale, errors.join("; "))
            }
            Self::DuplicateBundle(locale) => write!(f, "locale '{}' registered twice", locale),
            Self::UnknownRoot(locale) => write!(f, "root locale '{}' is not in the locale map", locale),
            Self::EmptyChain(locale) => {
                write!(f, "no registered bundle in the fallback chain of '{}'", locale)
            }
            Self::MissingMessage { locale, key } => {
                write!(f, "message '{}' missing for locale '{}'", key, locale)
            }
            Self::Format { locale, key, errors } => {
                write!(f, "message '{}' for '{}' does not format: {}", key, locale, errors.join("; "))
            }
        }
    }
}

impl std::error::Error for I18nError {}
