use crate::store::Store;
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::Display,
    time::Duration,
};

/// Identifies one render of a template for hydration.
///
/// [`InstanceId::Static`] renders without recording the data, so the view
/// is never hydrated. Every other id is recorded under its key.
///
/// # Examples
///
/// ```
/// use kx_draw::InstanceId;
///
/// assert_eq!(InstanceId::from(100), InstanceId::Key("100".to_string()));
/// assert_eq!(InstanceId::from("card-1").key(), Some("card-1"));
/// assert_eq!(InstanceId::Static.key(), None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InstanceId {
    /// Render only, do not record for hydration.
    Static,
    /// Record the render under this key.
    Key(String),
}

impl InstanceId {
    /// Return the key, or `None` for [`InstanceId::Static`].
    #[inline]
    pub fn key(&self) -> Option<&str> {
        match self {
            InstanceId::Static => None,
            InstanceId::Key(key) => Some(key),
        }
    }

    /// Return true if the id is a key that is empty or only whitespace.
    #[inline]
    pub fn is_blank(&self) -> bool {
        self.key().is_some_and(|key| key.trim().is_empty())
    }
}

impl From<&str> for InstanceId {
    fn from(key: &str) -> Self {
        InstanceId::Key(key.to_string())
    }
}

impl From<String> for InstanceId {
    fn from(key: String) -> Self {
        InstanceId::Key(key)
    }
}

impl From<&String> for InstanceId {
    fn from(key: &String) -> Self {
        InstanceId::Key(key.clone())
    }
}

macro_rules! from_integer {
    ($($t:ty),*) => {
        $(
            impl From<$t> for InstanceId {
                fn from(key: $t) -> Self {
                    InstanceId::Key(key.to_string())
                }
            }
        )*
    };
}

from_integer!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize);

impl Display for InstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstanceId::Static => write!(f, "static"),
            InstanceId::Key(key) => write!(f, "{key}"),
        }
    }
}

/// Records the data of every identified render, and optionally the time
/// spent rendering each template.
///
/// Records are never removed. A second render with the same template name
/// and id replaces the first.
#[derive(Debug, Clone, Default)]
pub struct InstanceStore {
    data: BTreeMap<String, BTreeMap<String, Store>>,
    usage: BTreeMap<String, usize>,
    draw_times: Option<BTreeMap<String, Duration>>,
}

impl InstanceStore {
    /// Create a new [`InstanceStore`].
    ///
    /// Draw times are only accumulated when `benchmark` is true.
    pub fn new(benchmark: bool) -> Self {
        Self {
            draw_times: benchmark.then(BTreeMap::new),
            ..Default::default()
        }
    }

    /// Store the data of a render, replacing any previous render of the
    /// same template with the same id.
    pub fn save(&mut self, name: &str, id: &str, data: Store) {
        *self.usage.entry(name.to_string()).or_default() += 1;
        self.data
            .entry(name.to_string())
            .or_default()
            .insert(id.to_string(), data);
    }

    /// Add to the total time spent rendering the template.
    ///
    /// Does nothing unless benchmarking is enabled.
    pub fn add_draw_time(&mut self, name: &str, elapsed: Duration) {
        if let Some(times) = &mut self.draw_times {
            *times.entry(name.to_string()).or_default() += elapsed;
        }
    }

    /// Return the number of renders stored for the template.
    #[inline]
    pub fn usage(&self, name: &str) -> usize {
        self.usage.get(name).copied().unwrap_or_default()
    }

    /// Return the name of every template that has a stored render.
    pub fn used_template_names(&self) -> BTreeSet<&str> {
        self.data.keys().map(String::as_str).collect()
    }

    /// Return the stored data of one render.
    pub fn get(&self, name: &str, id: &str) -> Option<&Store> {
        self.data.get(name)?.get(id)
    }

    /// Return every stored render, by template name and id.
    #[inline]
    pub fn all_data(&self) -> &BTreeMap<String, BTreeMap<String, Store>> {
        &self.data
    }

    /// Return the total render time of each template, or `None` if
    /// benchmarking is disabled.
    #[inline]
    pub fn draw_times(&self) -> Option<&BTreeMap<String, Duration>> {
        self.draw_times.as_ref()
    }
}
