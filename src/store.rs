use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{to_value, Map, Value};

/// Provides storage for the data a template is rendered with.
///
/// A `Store` is a JSON object. [`Draw`][`crate::Draw`] adds the hydration
/// fields to it before rendering and keeps a copy for hydration export.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Store {
    data: Map<String, Value>,
}

impl Store {
    /// Create a new, empty [`Store`].
    ///
    /// # Examples
    ///
    /// ```
    /// use kx_draw::Store;
    ///
    /// let store = Store::new();
    /// assert!(store.is_empty());
    /// ```
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a [`Store`] from any value that serializes to a JSON object.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails or the value is not an object.
    ///
    /// # Examples
    ///
    /// ```
    /// use kx_draw::Store;
    /// use serde_json::json;
    ///
    /// let store = Store::from_value(json!({ "name": "world" })).unwrap();
    /// assert_eq!(store.get("name").unwrap(), "world");
    ///
    /// assert!(Store::from_value(json!([1, 2])).is_err());
    /// ```
    pub fn from_value<T>(value: T) -> Result<Self>
    where
        T: Serialize,
    {
        let serialized = to_value(value).map_err(|source| Error::Json {
            context: "render data".to_string(),
            source,
        })?;

        match serialized {
            Value::Object(data) => Ok(Self { data }),
            other => Err(Error::InvalidData(format!(
                "expected an object, found `{other}`"
            ))),
        }
    }

    /// Inserts a key-value pair into the [`Store`].
    ///
    /// # Errors
    ///
    /// Returns an error if the serialization fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use kx_draw::Store;
    ///
    /// let mut store = Store::new();
    /// let result = store.insert("name", "world");
    ///
    /// assert!(result.is_ok());
    /// ```
    pub fn insert<S, T>(&mut self, key: S, value: T) -> Result<()>
    where
        S: Into<String>,
        T: Serialize,
    {
        let key = key.into();
        let value = to_value(value).map_err(|source| Error::Json {
            context: format!("value for key `{key}`"),
            source,
        })?;
        self.data.insert(key, value);

        Ok(())
    }

    /// Inserts a key-value pair into the [`Store`].
    ///
    /// # Panics
    ///
    /// Panics if the serialization fails.
    #[inline]
    pub fn insert_must<S, T>(&mut self, key: S, value: T)
    where
        S: Into<String>,
        T: Serialize,
    {
        self.data.insert(
            key.into(),
            to_value(value).expect("value must serialize to json"),
        );
    }

    /// Inserts a key-value pair into the [`Store`].
    ///
    /// Returns the `Store`, so additional methods may be chained.
    ///
    /// # Errors
    ///
    /// Returns an error if the serialization fails.
    #[inline]
    pub fn with<S, T>(mut self, key: S, value: T) -> Result<Self>
    where
        S: Into<String>,
        T: Serialize,
    {
        self.insert(key, value)?;

        Ok(self)
    }

    /// Inserts a key-value pair into the [`Store`].
    ///
    /// Returns the `Store`, so additional methods may be chained.
    ///
    /// # Panics
    ///
    /// Panics if the serialization fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use kx_draw::Store;
    ///
    /// let store = Store::new().with_must("name", "world").with_must("count", 3);
    /// assert_eq!(store.len(), 2);
    /// ```
    #[inline]
    pub fn with_must<S, T>(mut self, key: S, value: T) -> Self
    where
        S: Into<String>,
        T: Serialize,
    {
        self.insert_must(key, value);

        self
    }

    /// Returns a reference to the [`Value`] corresponding to the key.
    #[inline]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Convert the [`Store`] into a JSON object value.
    #[inline]
    pub fn into_value(self) -> Value {
        Value::Object(self.data)
    }
}

impl From<Map<String, Value>> for Store {
    fn from(data: Map<String, Value>) -> Self {
        Self { data }
    }
}

#[cfg(test)]
mod tests {
    use super::Store;
    use serde_json::json;

    #[test]
    fn test_insert() {
        let mut store = Store::new();
        store.insert_must("one", "two");

        assert!(store.get("one").is_some_and(|t| t == "two"));
    }

    #[test]
    fn test_insert_fluent() {
        assert!(Store::new()
            .with_must("three", "four")
            .get("three")
            .is_some_and(|t| t == "four"));
    }

    #[test]
    fn test_insert_overwrites() {
        let store = Store::new().with_must("id", 1).with_must("id", "100");

        assert_eq!(store.len(), 1);
        assert_eq!(store.get("id"), Some(&json!("100")));
    }

    #[test]
    fn test_from_value_rejects_non_objects() {
        assert!(Store::from_value(json!("text")).is_err());
        assert!(Store::from_value(json!(null)).is_err());
        assert_eq!(
            Store::from_value(json!({ "test": [123, 123] }))
                .unwrap()
                .into_value(),
            json!({ "test": [123, 123] })
        );
    }
}
