use super::tree::Tree;
use serde::{Deserialize, Serialize};

/// A distinct set of Tree instances.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scope {
    pub data: Vec<Tree>,
}

impl Scope {
    /// Create a new Scope.
    #[inline]
    pub fn new() -> Self {
        Self { data: vec![] }
    }

    /// Visit every partial name referenced by this Scope, including those
    /// inside nested blocks.
    pub fn partial_names<'a>(&'a self, names: &mut Vec<&'a str>) {
        for tree in &self.data {
            match tree {
                Tree::Partial(partial) => names.push(&partial.name),
                Tree::Condition(condition) => {
                    condition.then_branch.partial_names(names);
                    if let Some(else_branch) = &condition.else_branch {
                        else_branch.partial_names(names);
                    }
                }
                Tree::Each(block) | Tree::With(block) => {
                    block.then_branch.partial_names(names);
                    if let Some(else_branch) = &block.else_branch {
                        else_branch.partial_names(names);
                    }
                }
                Tree::Raw(_) | Tree::Output(_) => (),
            }
        }
    }
}
