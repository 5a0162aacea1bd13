use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs, io,
    io::Write,
    path::Path,
    time::{SystemTime, UNIX_EPOCH},
};
use tempfile::NamedTempFile;

/// Last known modification time of every template, by logical name.
///
/// Times are nanoseconds since the Unix epoch. The map is stored as a JSON
/// object in the cache directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheMap {
    entries: BTreeMap<String, u64>,
}

impl CacheMap {
    /// Create a new, empty [`CacheMap`].
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the map stored at the given path.
    ///
    /// A missing file is an empty map. A file that cannot be read or decoded
    /// is logged and also treated as empty, which invalidates every
    /// compiled artifact.
    pub fn load(path: &Path) -> Self {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Self::new(),
            Err(error) => {
                tracing::warn!(path = %path.display(), %error, "cannot read cache map, starting empty");
                return Self::new();
            }
        };

        serde_json::from_str(&text).unwrap_or_else(|error| {
            tracing::warn!(path = %path.display(), %error, "corrupt cache map, starting empty");
            Self::new()
        })
    }

    /// Write the map to the given path, replacing the previous file
    /// atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the map cannot be encoded or written.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec(self).map_err(|source| Error::Json {
            context: "cache map".to_string(),
            source,
        })?;
        write_atomic(path, &json)?;
        tracing::debug!(path = %path.display(), entries = self.len(), "wrote cache map");

        Ok(())
    }

    /// Return the recorded modification time of the template.
    #[inline]
    pub fn get(&self, name: &str) -> Option<u64> {
        self.entries.get(name).copied()
    }

    #[inline]
    pub fn insert(&mut self, name: String, modified: u64) {
        self.entries.insert(name, modified);
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Iterate over the names in the map.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Return the modification time of the file in nanoseconds since the Unix
/// epoch.
///
/// # Errors
///
/// Returns [`Error::Io`] if the metadata cannot be read.
pub fn modified_nanos(path: &Path) -> Result<u64> {
    let modified = fs::metadata(path)
        .and_then(|metadata| metadata.modified())
        .map_err(Error::io(path))?;

    Ok(nanos_since_epoch(modified))
}

fn nanos_since_epoch(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|elapsed| u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}

/// Write the bytes to a temporary file beside the target, then move it in
/// place of the target.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let directory = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(directory).map_err(Error::io(directory))?;

    let mut file = NamedTempFile::new_in(directory).map_err(Error::io(directory))?;
    file.write_all(bytes).map_err(Error::io(file.path()))?;
    file.persist(path)
        .map_err(|error| Error::io(path)(error.error))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{modified_nanos, nanos_since_epoch, CacheMap};
    use std::{
        fs,
        time::{Duration, UNIX_EPOCH},
    };
    use tempfile::tempdir;

    #[test]
    fn test_save_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("map.json");
        let mut map = CacheMap::new();
        map.insert("hello".to_string(), 1_700_000_000_123_456_789);
        map.insert("shared/name".to_string(), 42);

        map.save(&path).unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            r#"{"hello":1700000000123456789,"shared/name":42}"#
        );
        assert_eq!(CacheMap::load(&path), map);
    }

    #[test]
    fn test_load_missing_or_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("map.json");
        assert!(CacheMap::load(&path).is_empty());

        fs::write(&path, "{ not json").unwrap();
        assert!(CacheMap::load(&path).is_empty());

        fs::write(&path, r#"{"hello": "yesterday"}"#).unwrap();
        assert!(CacheMap::load(&path).is_empty());
    }

    #[test]
    fn test_save_replaces() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("map.json");
        fs::write(&path, "old").unwrap();

        let mut map = CacheMap::new();
        map.insert("a".to_string(), 1);
        map.save(&path).unwrap();

        assert!(CacheMap::load(&path).contains("a"));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_modified_nanos() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hello.hbs");
        fs::write(&path, "").unwrap();

        let time = UNIX_EPOCH + Duration::from_secs(1_600_000_000);
        fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(time)
            .unwrap();

        assert_eq!(modified_nanos(&path).unwrap(), nanos_since_epoch(time));
        assert_eq!(nanos_since_epoch(time), 1_600_000_000_000_000_000);
        assert!(modified_nanos(&dir.path().join("missing")).is_err());
    }
}
