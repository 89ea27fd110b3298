use fluent_bundle::FluentResource;
use rust_embed::RustEmbed;
use unic_langid::LanguageIdentifier;

use super::I18nError;

#[derive(RustEmbed)]
#[folder = "assets/i18n/"]
struct Asset;

/// Thread-safe bundle, shared by every translator whose chain includes it.
pub type Bundle = fluent_bundle::concurrent::FluentBundle<FluentResource>;

/// All messages of one locale.
pub struct LocaleBundle {
    pub(crate) locale: String,
    pub(crate) bundle: Bundle,
}

impl LocaleBundle {
    /// Build a bundle from `(file name, ftl source)` pairs.
    pub fn from_sources(locale: &str, sources: &[(&str, &str)]) -> Result<Self, I18nError> {
        let langid: LanguageIdentifier = locale
            .parse()
            .map_err(|_| I18nError::InvalidLocale(locale.to_string()))?;

        let mut bundle = Bundle::new_concurrent(vec![langid]);
        // No FSI/PDI marks around placeables, texts go out exactly as written.
        bundle.set_use_isolating(false);

        for (file, source) in sources {
            let resource = FluentResource::try_new(source.to_string()).map_err(|(_, errors)| I18nError::Parse {
                locale: locale.to_string(),
                file: file.to_string(),
                errors: errors.iter().map(|e| e.to_string()).collect(),
            })?;
            bundle.add_resource(resource).map_err(|errors| I18nError::Resource {
                locale: locale.to_string(),
                file: file.to_string(),
                errors: errors.iter().map(|e| e.to_string()).collect(),
            })?;
        }

        Ok(Self { locale: locale.to_string(), bundle })
    }

    /// Load every `assets/i18n/<locale>/*.ftl` file compiled into the binary.
    pub fn embedded(locale: &str) -> Result<Self, I18nError> {
        let prefix = format!("{locale}/");
        let mut files: Vec<String> = Asset::iter()
            .map(|f| f.to_string())
            .filter(|f| f.starts_with(&prefix) && f.ends_with(".ftl"))
            .collect();
        files.sort();

        let mut sources = Vec::with_capacity(files.len());
        for file in &files {
            if let Some(content) = Asset::get(file) {
                sources.push((file.as_str(), String::from_utf8_lossy(content.data.as_ref()).into_owned()));
            }
        }
        if sources.is_empty() {
            return Err(I18nError::MissingAssets(locale.to_string()));
        }

        let borrowed: Vec<(&str, &str)> = sources.iter().map(|(f, s)| (*f, s.as_str())).collect();
        Self::from_sources(locale, &borrowed)
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    pub fn has_message(&self, key: &str) -> bool {
        self.bundle.has_message(key)
    }
}
