use crate::{
    error::{Error, Result},
    template::TemplateStore,
};
use std::collections::BTreeMap;

/// Holds the source text of every registered partial, by logical name.
///
/// The whole table is handed to the compiler on each compile. Partials
/// are read once when registered, so a partial changed on disk must be
/// registered again to be picked up by the same [`Draw`][`crate::Draw`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialRegistry {
    partials: BTreeMap<String, String>,
}

impl PartialRegistry {
    /// Create a new, empty [`PartialRegistry`].
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the template with the given name as a partial.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPartialName`] if the name is empty, or an
    /// error from the [`TemplateStore`] if the template cannot be read.
    pub fn register(&mut self, name: &str, templates: &mut TemplateStore) -> Result<()> {
        let logical = templates.normalize_name(name);
        if logical.is_empty() {
            return Err(Error::InvalidPartialName(name.to_string()));
        }

        let text = templates.get(&logical)?.to_string();
        self.partials.insert(logical, text);

        Ok(())
    }

    /// Register every template beneath the given directory, relative to the
    /// templates directory, as a partial.
    ///
    /// Returns the number of partials registered.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPartialName`] if the directory name is empty,
    /// [`Error::DirectoryNotFound`] if it does not exist, or the first error
    /// met while registering a partial.
    pub fn register_directory(
        &mut self,
        directory: &str,
        templates: &mut TemplateStore,
    ) -> Result<usize> {
        let relative = directory.replace('\\', "/");
        let relative = relative.trim_matches('/');
        if relative.is_empty() {
            return Err(Error::InvalidPartialName(directory.to_string()));
        }

        let path = templates.root().join(relative);
        if !path.is_dir() {
            return Err(Error::DirectoryNotFound { path });
        }

        let found = templates.discover(&path);
        for (name, _) in &found {
            self.register(name, templates)?;
        }
        tracing::debug!(directory = relative, count = found.len(), "registered partials");

        Ok(found.len())
    }

    /// Return the source text of the partial with the given name.
    #[inline]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.partials.get(name).map(String::as_str)
    }

    /// Return the full table of partials.
    #[inline]
    pub fn partials(&self) -> &BTreeMap<String, String> {
        &self.partials
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.partials.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.partials.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::PartialRegistry;
    use crate::{error::Error, template::TemplateStore};
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_register() {
        let root = tempdir().unwrap();
        fs::create_dir(root.path().join("shared")).unwrap();
        fs::write(root.path().join("shared/name.hbs"), "<i>{{name}}</i>").unwrap();
        let mut templates = TemplateStore::new(root.path(), "hbs");
        let mut registry = PartialRegistry::new();

        registry.register("/shared/name", &mut templates).unwrap();
        assert_eq!(registry.get("shared/name"), Some("<i>{{name}}</i>"));
    }

    #[test]
    fn test_register_errors() {
        let root = tempdir().unwrap();
        let mut templates = TemplateStore::new(root.path(), "hbs");
        let mut registry = PartialRegistry::new();

        assert!(matches!(
            registry.register("", &mut templates),
            Err(Error::InvalidPartialName(_))
        ));
        assert!(matches!(
            registry.register("missing", &mut templates),
            Err(Error::TemplateNotFound { .. })
        ));
        assert!(matches!(
            registry.register_directory("/", &mut templates),
            Err(Error::InvalidPartialName(_))
        ));
        assert!(matches!(
            registry.register_directory("nope", &mut templates),
            Err(Error::DirectoryNotFound { .. })
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_register_directory() {
        let root = tempdir().unwrap();
        fs::create_dir_all(root.path().join("shared/icons")).unwrap();
        fs::write(root.path().join("hello.hbs"), "<b></b>").unwrap();
        fs::write(root.path().join("shared/name.hbs"), "<i></i>").unwrap();
        fs::write(root.path().join("shared/icons/star.hbs"), "<svg></svg>").unwrap();
        let mut templates = TemplateStore::new(root.path(), "hbs");
        let mut registry = PartialRegistry::new();

        assert_eq!(registry.register_directory("shared/", &mut templates).unwrap(), 2);
        assert_eq!(registry.register_directory("\\shared\\icons", &mut templates).unwrap(), 1);
        assert_eq!(
            registry.partials().keys().collect::<Vec<_>>(),
            vec!["shared/icons/star", "shared/name"]
        );
    }
}
