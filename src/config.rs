use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Collects the settings of a [`Draw`][`crate::Draw`] and validates them
/// into a [`Config`].
///
/// Every field has a default, so a builder only needs the two directories:
///
/// ```no_run
/// use kx_draw::Builder;
///
/// let config = Builder::new()
///     .with_templates_dir("/srv/app/templates")
///     .with_cache_dir("/srv/app/cache")
///     .with_cache(true)
///     .with_mem_cache(true)
///     .build()
///     .unwrap();
///
/// assert_eq!(config.ext(), "hbs");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Builder {
    ext: String,
    use_cache: bool,
    use_mem_cache: bool,
    use_benchmark: bool,
    cache_dir: PathBuf,
    templates_dir: PathBuf,
    map_file_name: String,
}

impl Default for Builder {
    fn default() -> Self {
        Self {
            ext: "hbs".to_string(),
            use_cache: false,
            use_mem_cache: false,
            use_benchmark: false,
            cache_dir: PathBuf::new(),
            templates_dir: PathBuf::new(),
            map_file_name: "map.json".to_string(),
        }
    }
}

impl Builder {
    /// Create a new [`Builder`] with default settings.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a [`Builder`] from a JSON object.
    ///
    /// Keys are the field names (`ext`, `use_cache`, `use_mem_cache`,
    /// `use_benchmark`, `cache_dir`, `templates_dir`, `map_file_name`),
    /// missing keys keep their default.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid JSON or contains unknown keys.
    ///
    /// # Examples
    ///
    /// ```
    /// use kx_draw::Builder;
    ///
    /// let builder = Builder::from_json(r#"{ "ext": "html", "use_cache": true }"#);
    /// assert!(builder.is_ok());
    ///
    /// assert!(Builder::from_json(r#"{ "extension": "html" }"#).is_err());
    /// ```
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|source| Error::Json {
            context: "configuration".to_string(),
            source,
        })
    }

    /// Set the template file extension, without the leading period.
    #[must_use]
    pub fn with_ext<T>(mut self, ext: T) -> Self
    where
        T: Into<String>,
    {
        self.ext = ext.into();

        self
    }

    /// Enable or disable the on-disk renderer cache.
    #[must_use]
    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.use_cache = enabled;

        self
    }

    /// Enable or disable the in-memory renderer cache.
    ///
    /// Requires the on-disk cache.
    #[must_use]
    pub fn with_mem_cache(mut self, enabled: bool) -> Self {
        self.use_mem_cache = enabled;

        self
    }

    /// Enable or disable recording of render times.
    #[must_use]
    pub fn with_benchmark(mut self, enabled: bool) -> Self {
        self.use_benchmark = enabled;

        self
    }

    #[must_use]
    pub fn with_cache_dir<T>(mut self, path: T) -> Self
    where
        T: Into<PathBuf>,
    {
        self.cache_dir = path.into();

        self
    }

    #[must_use]
    pub fn with_templates_dir<T>(mut self, path: T) -> Self
    where
        T: Into<PathBuf>,
    {
        self.templates_dir = path.into();

        self
    }

    /// Set the name of the file, inside the cache directory, that records
    /// template modification times.
    #[must_use]
    pub fn with_map_file_name<T>(mut self, name: T) -> Self
    where
        T: Into<String>,
    {
        self.map_file_name = name.into();

        self
    }

    /// Validate the settings and return a [`Config`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] when the extension is empty or
    /// contains a path separator, the memory cache is enabled without the
    /// file cache, either directory is missing or not writable, or the map
    /// file name is not a plain file name.
    pub fn build(self) -> Result<Config> {
        let ext = self.ext.strip_prefix('.').unwrap_or(&self.ext).to_string();
        if ext.is_empty() {
            return Err(Error::Configuration(
                "the template extension must not be empty".to_string(),
            ));
        }
        if ext.contains(&['/', '\\'][..]) {
            return Err(Error::Configuration(format!(
                "the template extension `{ext}` must not contain a path separator"
            )));
        }
        if self.use_mem_cache && !self.use_cache {
            return Err(Error::Configuration(
                "the memory cache cannot be used without the file cache, enable both".to_string(),
            ));
        }

        check_directory("cache", &self.cache_dir)?;
        check_directory("templates", &self.templates_dir)?;

        let name = self.map_file_name.as_str();
        if name.is_empty() || name == "." || name == ".." || name.contains(&['/', '\\'][..]) {
            return Err(Error::Configuration(format!(
                "the cache map file name `{name}` must be a plain file name, \
                the default `map.json` works"
            )));
        }

        Ok(Config {
            ext,
            use_cache: self.use_cache,
            use_mem_cache: self.use_mem_cache,
            use_benchmark: self.use_benchmark,
            cache_dir: self.cache_dir,
            templates_dir: self.templates_dir,
            map_file_name: self.map_file_name,
        })
    }
}

/// Return an error unless the path is an existing, writable directory.
fn check_directory(role: &str, path: &Path) -> Result<()> {
    if !path.is_dir() {
        return Err(Error::Configuration(format!(
            "the {role} directory {} does not exist",
            path.display()
        )));
    }

    tempfile::tempfile_in(path).map_err(|source| {
        Error::Configuration(format!(
            "the {role} directory {} is not writable: {source}",
            path.display()
        ))
    })?;

    Ok(())
}

/// Validated settings of a [`Draw`][`crate::Draw`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    ext: String,
    use_cache: bool,
    use_mem_cache: bool,
    use_benchmark: bool,
    cache_dir: PathBuf,
    templates_dir: PathBuf,
    map_file_name: String,
}

impl Config {
    /// Template file extension, without the leading period.
    #[inline]
    pub fn ext(&self) -> &str {
        &self.ext
    }

    #[inline]
    pub fn use_cache(&self) -> bool {
        self.use_cache
    }

    #[inline]
    pub fn use_mem_cache(&self) -> bool {
        self.use_mem_cache
    }

    #[inline]
    pub fn use_benchmark(&self) -> bool {
        self.use_benchmark
    }

    #[inline]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    #[inline]
    pub fn templates_dir(&self) -> &Path {
        &self.templates_dir
    }

    #[inline]
    pub fn map_file_name(&self) -> &str {
        &self.map_file_name
    }

    /// Full path of the cache map file.
    #[inline]
    pub fn map_path(&self) -> PathBuf {
        self.cache_dir.join(&self.map_file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::Builder;
    use crate::error::Error;
    use tempfile::tempdir;

    fn directories() -> (tempfile::TempDir, tempfile::TempDir) {
        (tempdir().unwrap(), tempdir().unwrap())
    }

    #[test]
    fn test_defaults() {
        let builder = Builder::new();

        assert_eq!(builder, Builder::from_json("{}").unwrap());
        assert_eq!(builder.ext, "hbs");
        assert_eq!(builder.map_file_name, "map.json");
        assert!(!builder.use_cache && !builder.use_mem_cache && !builder.use_benchmark);
    }

    #[test]
    fn test_build() {
        let (templates, cache) = directories();
        let config = Builder::new()
            .with_templates_dir(templates.path())
            .with_cache_dir(cache.path())
            .with_ext(".html")
            .with_cache(true)
            .with_mem_cache(true)
            .build()
            .unwrap();

        assert_eq!(config.ext(), "html");
        assert!(config.use_mem_cache());
        assert_eq!(config.map_path(), cache.path().join("map.json"));
    }

    #[test]
    fn test_from_json() {
        let (templates, cache) = directories();
        let text = serde_json::json!({
            "templates_dir": templates.path(),
            "cache_dir": cache.path(),
            "use_benchmark": true,
        })
        .to_string();

        let config = Builder::from_json(&text).unwrap().build().unwrap();
        assert!(config.use_benchmark());
        assert!(!config.use_cache());
    }

    #[test]
    fn test_errors() {
        let (templates, cache) = directories();
        let valid = Builder::new()
            .with_templates_dir(templates.path())
            .with_cache_dir(cache.path());

        let invalid = [
            valid.clone().with_ext(""),
            valid.clone().with_ext("a/b"),
            valid.clone().with_mem_cache(true),
            valid.clone().with_cache_dir(cache.path().join("missing")),
            valid.clone().with_templates_dir(""),
            valid.clone().with_map_file_name(""),
            valid.clone().with_map_file_name("nested/map.json"),
            valid.clone().with_map_file_name(".."),
        ];
        for builder in invalid {
            assert!(
                matches!(builder.clone().build(), Err(Error::Configuration(_))),
                "{builder:?} should be rejected"
            );
        }

        assert!(valid.build().is_ok());
    }
}
