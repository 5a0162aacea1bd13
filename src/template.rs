use crate::error::{Error, Result};
use std::{
    collections::{btree_map::Entry, BTreeMap},
    ffi::OsStr,
    fs,
    path::{Component, Path, PathBuf},
};
use walkdir::WalkDir;

/// Reads template sources from the templates directory and keeps the text
/// of every template read so far.
///
/// Templates are addressed by logical name: the path relative to the
/// templates directory, with `/` separators and without the extension.
#[derive(Debug, Clone)]
pub struct TemplateStore {
    root: PathBuf,
    ext: String,
    memo: BTreeMap<String, String>,
}

impl TemplateStore {
    /// Create a new [`TemplateStore`] over the given directory and extension.
    pub fn new<P, T>(root: P, ext: T) -> Self
    where
        P: Into<PathBuf>,
        T: Into<String>,
    {
        Self {
            root: root.into(),
            ext: ext.into(),
            memo: BTreeMap::new(),
        }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[inline]
    pub fn ext(&self) -> &str {
        &self.ext
    }

    /// Normalize a name given by a caller into a logical name.
    ///
    /// Backslashes become `/`, a leading templates directory prefix and a
    /// trailing extension are removed and separators are trimmed, so that
    /// `"/cards/user.hbs"` and `"cards/user"` name the same template.
    ///
    /// # Examples
    ///
    /// ```
    /// use kx_draw::TemplateStore;
    ///
    /// let store = TemplateStore::new("/srv/templates", "hbs");
    ///
    /// assert_eq!(store.normalize_name("/srv/templates/cards/user.hbs"), "cards/user");
    /// assert_eq!(store.normalize_name("cards\\user"), "cards/user");
    /// ```
    pub fn normalize_name(&self, name: &str) -> String {
        let name = name.replace('\\', "/");
        let root = self.root.to_string_lossy().replace('\\', "/");
        let root = root.trim_end_matches('/');

        let mut name = match name.strip_prefix(root) {
            Some(rest) if !root.is_empty() && (rest.is_empty() || rest.starts_with('/')) => rest,
            _ => name.as_str(),
        }
        .trim_matches('/');

        let suffix = format!(".{}", self.ext);
        if let Some(stripped) = name.strip_suffix(&suffix) {
            name = stripped.trim_end_matches('/');
        }

        name.to_string()
    }

    /// Return the logical name of a template file found under the
    /// templates directory, or `None` if the path lies elsewhere.
    pub fn name_of(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts = relative
            .components()
            .filter_map(|component| match component {
                Component::Normal(part) => Some(part.to_string_lossy()),
                _ => None,
            })
            .collect::<Vec<_>>();

        if parts.is_empty() {
            return None;
        }

        Some(self.normalize_name(&parts.join("/")))
    }

    /// Path of the source file of the template with the given logical name.
    #[inline]
    pub fn path_of(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.{}", self.ext))
    }

    /// Return the text of the template with the given name.
    ///
    /// The text is read from disk on first use and kept afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TemplateNotFound`] if there is no such file, or
    /// [`Error::Io`] if it cannot be read.
    pub fn get(&mut self, name: &str) -> Result<&str> {
        let name = self.normalize_name(name);
        let path = self.path_of(&name);

        match self.memo.entry(name) {
            Entry::Occupied(entry) => Ok(entry.into_mut().as_str()),
            Entry::Vacant(entry) => {
                if !path.is_file() {
                    return Err(Error::TemplateNotFound {
                        name: entry.into_key(),
                        path,
                    });
                }

                let text = fs::read_to_string(&path).map_err(Error::io(&path))?;

                Ok(entry.insert(text).as_str())
            }
        }
    }

    /// Keep the given text for the template, as if it had been read.
    pub fn preload(&mut self, name: String, text: String) {
        self.memo.insert(name, text);
    }

    /// Return true if the text of the template is held in memory.
    #[inline]
    pub fn is_loaded(&self, name: &str) -> bool {
        self.memo.contains_key(name)
    }

    /// Walk the given directory and return the logical name and path of
    /// every template file beneath it, ordered by path.
    ///
    /// Files with another extension are ignored. Entries that cannot be
    /// read are logged and skipped.
    pub fn discover(&self, dir: &Path) -> Vec<(String, PathBuf)> {
        let ext = OsStr::new(&self.ext);
        let mut found = vec![];

        for entry in WalkDir::new(dir).sort_by_file_name().follow_links(true) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(error) => {
                    tracing::warn!(%error, "skipping unreadable entry while walking templates");
                    continue;
                }
            };

            if !entry.file_type().is_file() || entry.path().extension() != Some(ext) {
                continue;
            }
            if let Some(name) = self.name_of(entry.path()) {
                found.push((name, entry.into_path()));
            }
        }

        found
    }
}

#[cfg(test)]
mod tests {
    use super::TemplateStore;
    use crate::error::Error;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_normalize_name() {
        let store = TemplateStore::new("/srv/templates/", "hbs");

        assert_eq!(store.normalize_name("hello"), "hello");
        assert_eq!(store.normalize_name("/hello.hbs"), "hello");
        assert_eq!(store.normalize_name("shared/name/"), "shared/name");
        assert_eq!(store.normalize_name("/srv/templates/shared/name.hbs"), "shared/name");
        assert_eq!(store.normalize_name("/srv/templates-old/x"), "srv/templates-old/x");
        assert_eq!(store.normalize_name("page.html"), "page.html");
        assert_eq!(store.normalize_name("shared\\name.hbs"), "shared/name");
        assert_eq!(store.normalize_name("\\srv\\templates\\hello"), "hello");
    }

    #[test]
    fn test_get_reads_once() {
        let root = tempdir().unwrap();
        fs::write(root.path().join("hello.hbs"), "<b>one</b>").unwrap();
        let mut store = TemplateStore::new(root.path(), "hbs");

        assert_eq!(store.get("hello").unwrap(), "<b>one</b>");
        assert!(store.is_loaded("hello"));

        fs::write(root.path().join("hello.hbs"), "<b>two</b>").unwrap();
        assert_eq!(store.get("/hello.hbs").unwrap(), "<b>one</b>");
    }

    #[test]
    fn test_get_missing() {
        let root = tempdir().unwrap();
        let mut store = TemplateStore::new(root.path(), "hbs");

        assert!(matches!(
            store.get("missing"),
            Err(Error::TemplateNotFound { name, .. }) if name == "missing"
        ));
    }

    #[test]
    fn test_discover() {
        let root = tempdir().unwrap();
        fs::create_dir_all(root.path().join("shared/deep")).unwrap();
        fs::write(root.path().join("hello.hbs"), "").unwrap();
        fs::write(root.path().join("shared/name.hbs"), "").unwrap();
        fs::write(root.path().join("shared/deep/item.hbs"), "").unwrap();
        fs::write(root.path().join("shared/notes.txt"), "").unwrap();
        let store = TemplateStore::new(root.path(), "hbs");

        let names = store
            .discover(root.path())
            .into_iter()
            .map(|(name, _)| name)
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["hello", "shared/deep/item", "shared/name"]);

        let names = store
            .discover(&root.path().join("shared"))
            .into_iter()
            .map(|(name, _)| name)
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["shared/deep/item", "shared/name"]);
    }
}
