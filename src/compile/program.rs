use super::parse::scope::Scope;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A compiled template, together with every partial it can reach.
///
/// A `Program` is self-contained: it owns all of its text, so it can be
/// written to disk and loaded back without the template sources.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Program {
    /// Trees of the template itself.
    pub scope: Scope,
    /// Trees of each reachable partial, by logical name.
    pub partials: BTreeMap<String, Scope>,
}

impl Program {
    /// Create a new [`Program`].
    #[inline]
    pub fn new(scope: Scope, partials: BTreeMap<String, Scope>) -> Self {
        Self { scope, partials }
    }

    /// Return the trees of the partial with the given name.
    #[inline]
    pub fn partial(&self, name: &str) -> Option<&Scope> {
        self.partials.get(name)
    }

    /// Return the names of partials that are included somewhere in the
    /// program but missing from its partial table.
    pub fn missing_partials(&self) -> Vec<&str> {
        let mut names = vec![];
        self.scope.partial_names(&mut names);
        for scope in self.partials.values() {
            scope.partial_names(&mut names);
        }

        names.sort_unstable();
        names.dedup();
        names.retain(|name| !self.partials.contains_key(*name));

        names
    }
}
