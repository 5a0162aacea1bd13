use super::{
    scope::Scope,
    tree::{Base, Block, Condition, Tree},
};
use crate::{compile::Keyword, region::Region};
use std::mem::take;

/// Describes an open block while the `Parser` reads its contents.
#[derive(Debug)]
pub struct Frame {
    /// The helper that opened the block.
    pub keyword: Keyword,
    /// The argument of the helper.
    pub base: Base,
    /// [`Region`] spanning the opening tag.
    pub region: Region,
    /// Contents before an `{{else}}`, once one has been seen.
    pub then_branch: Option<Scope>,
    /// Contents currently being collected.
    pub body: Scope,
    /// True if the block was opened by `{{else if}}` or `{{else unless}}`,
    /// meaning it closes together with its parent.
    pub chained: bool,
}

impl Frame {
    pub fn new(keyword: Keyword, base: Base, region: Region, chained: bool) -> Self {
        Self {
            keyword,
            base,
            region,
            then_branch: None,
            body: Scope::new(),
            chained,
        }
    }

    /// Move the collected contents into the then branch, so that
    /// following trees belong to the else branch.
    ///
    /// Returns false if the block already had an else branch.
    pub fn begin_else(&mut self) -> bool {
        if self.then_branch.is_some() {
            return false;
        }
        self.then_branch = Some(take(&mut self.body));

        true
    }

    /// Convert the frame into a [`Tree`].
    pub fn finish(self) -> Tree {
        let (then_branch, else_branch) = match self.then_branch {
            Some(then_branch) => (then_branch, Some(self.body)),
            None => (self.body, None),
        };

        match self.keyword {
            Keyword::If | Keyword::Unless => Tree::Condition(Condition {
                negate: self.keyword == Keyword::Unless,
                base: self.base,
                then_branch,
                else_branch,
            }),
            Keyword::Each => Tree::Each(Block {
                base: self.base,
                then_branch,
                else_branch,
            }),
            Keyword::With => Tree::With(Block {
                base: self.base,
                then_branch,
                else_branch,
            }),
        }
    }
}
