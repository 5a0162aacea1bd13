use super::scope::Scope;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Types that form the abstract syntax tree of a compiled template.
///
/// Unlike tokens, trees own their text so a compiled program can be
/// persisted and reloaded without the source it was compiled from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Tree {
    /// Raw text, written as-is.
    Raw(String),
    /// A value to write, such as `{{ name }}` or `{{{ html }}}`.
    Output(Output),
    /// An included partial, such as `{{> shared/card }}`.
    Partial(Partial),
    /// An `#if` or `#unless` block.
    Condition(Condition),
    /// An `#each` block.
    Each(Block),
    /// A `#with` block.
    With(Block),
}

/// An expression that writes a single value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Output {
    /// The value to write.
    pub base: Base,
    /// True when html characters must be escaped.
    pub escape: bool,
}

/// A value, either looked up at render time or known at compile time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Base {
    /// A path into the render data.
    Variable(Path),
    /// A string, number, boolean or null written in the template.
    Literal(Value),
}

/// Where a [`Path`] starts looking for its keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Origin {
    /// The current context, or one of its parents when `parents` is above zero.
    Context { parents: usize },
    /// A data variable such as `@index` or `@root`.
    Data(String),
}

/// A chain of keys, such as `person.name` or `../title`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Path {
    pub origin: Origin,
    pub keys: Vec<String>,
}

impl Path {
    /// Return a [`Path`] pointing at the current context, `this`.
    pub fn this() -> Self {
        Self {
            origin: Origin::Context { parents: 0 },
            keys: vec![],
        }
    }
}

/// An included partial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Partial {
    /// Logical name of the partial.
    pub name: String,
    /// Context the partial is rendered with, the current one if absent.
    pub context: Option<Base>,
}

/// An `#if` block, or an `#unless` block when `negate` is true.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub negate: bool,
    pub base: Base,
    pub then_branch: Scope,
    pub else_branch: Option<Scope>,
}

/// A block that changes the context, `#each` or `#with`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub base: Base,
    pub then_branch: Scope,
    pub else_branch: Option<Scope>,
}
