//! Handlebars parser.
//!
//! Utilizes a Lexer to receive instances of Region, which it uses to construct
//! a Scope containing the abstract syntax tree.
pub mod scope;
pub mod tree;

mod state;

use crate::{
    compile::{
        lex::{Lexer, Token, TokenResult},
        Keyword,
    },
    log::{
        expected, Diagnostic, INVALID_SYNTAX, UNEXPECTED_BLOCK, UNEXPECTED_EOF, UNEXPECTED_TOKEN,
        UNKNOWN_HELPER, UNREGISTERED_PARTIAL,
    },
    region::Region,
};
use scope::Scope;
use serde_json::{Number, Value};
use state::Frame;
use std::collections::{BTreeMap, BTreeSet};
use tree::{Base, Origin, Output, Partial, Path, Tree};

/// Result of a call that must produce a token.
type TokenResultMust = Result<(Token, Region), Diagnostic>;

pub struct Parser<'source, 'partials> {
    /// Lexer used to pull from source as tokens instead of raw text.
    lexer: Lexer<'source>,
    /// Store peeked tokens.
    ///
    /// Double option is used to remember when the next token is None.
    buffer: Option<Option<(Token, Region)>>,
    /// Partial sources known at compile time, by logical name.
    partials: &'partials BTreeMap<String, String>,
    /// Names of the partials this source includes.
    references: BTreeSet<String>,
}

impl<'source, 'partials> Parser<'source, 'partials> {
    /// Create a new Parser from the given string and partial table.
    #[inline]
    pub fn new(source: &'source str, partials: &'partials BTreeMap<String, String>) -> Self {
        Self {
            lexer: Lexer::new(source),
            buffer: None,
            partials,
            references: BTreeSet::new(),
        }
    }

    /// Parse the source.
    ///
    /// Returns the root Scope and the names of every partial it includes.
    ///
    /// # Errors
    ///
    /// Returns a [`Diagnostic`] pointing at the first piece of invalid
    /// syntax, an unclosed block or an unregistered partial.
    pub fn parse(mut self) -> Result<(Scope, BTreeSet<String>), Diagnostic> {
        // Blocks that were opened and not yet closed, innermost last.
        let mut frames: Vec<Frame> = vec![];
        let mut root = Scope::new();

        while let Some(next) = self.next()? {
            match next {
                (Token::Raw, region) => {
                    let raw = self.lexer.source[region].to_string();
                    current(&mut frames, &mut root).data.push(Tree::Raw(raw));
                }
                (Token::Comment, _) => continue,
                (Token::BeginRaw, _) => {
                    let base = self.parse_base()?;
                    self.next_must(Token::EndRaw)?;
                    let tree = Tree::Output(Output {
                        base,
                        escape: false,
                    });
                    current(&mut frames, &mut root).data.push(tree);
                }
                (Token::BeginExpression, region) => {
                    self.parse_tag(region, &mut frames, &mut root)?
                }
                (token, region) => {
                    return Err(Diagnostic::build(UNEXPECTED_TOKEN)
                        .with_pointer(self.lexer.source, region)
                        .with_help(expected("raw text or the beginning of a tag", token)))
                }
            }
        }

        if let Some(frame) = frames.iter().rev().find(|frame| !frame.chained) {
            let keyword = frame.keyword;

            return Err(Diagnostic::build(INVALID_SYNTAX)
                .with_pointer(self.lexer.source, frame.region)
                .with_help(format!(
                    "did you close the `{keyword}` block with `{{{{/{keyword}}}}}`?"
                )));
        }

        Ok((root, self.references))
    }

    /// Parse the contents of a `{{ }}` tag and attach the result.
    ///
    /// Opening and closing block tags change `frames`, everything else
    /// becomes a tree in the current scope.
    fn parse_tag(
        &mut self,
        begin: Region,
        frames: &mut Vec<Frame>,
        root: &mut Scope,
    ) -> Result<(), Diagnostic> {
        match self.next_any_must()? {
            (Token::Hash, _) => {
                let keyword = self.parse_keyword()?;
                let base = self.parse_base()?;
                let (_, end) = self.next_must(Token::EndExpression)?;
                frames.push(Frame::new(keyword, base, begin.combine(end), false));
            }
            (Token::Slash, _) => {
                let (_, name) = self.next_must(Token::Identifier)?;
                let (_, end) = self.next_must(Token::EndExpression)?;
                self.close_block(begin.combine(end), &self.lexer.source[name], frames, root)?;
            }
            (Token::Greater, _) => {
                let partial = self.parse_partial(begin)?;
                current(frames, root).data.push(Tree::Partial(partial));
            }
            (Token::Ampersand, _) => {
                let base = self.parse_base()?;
                self.next_must(Token::EndExpression)?;
                let tree = Tree::Output(Output {
                    base,
                    escape: false,
                });
                current(frames, root).data.push(tree);
            }
            (Token::Identifier, region) if &self.lexer.source[region] == "else" => {
                self.parse_else(begin, frames)?;
            }
            next => {
                let base = self.parse_base_from(next)?;
                self.next_must(Token::EndExpression)?;
                let tree = Tree::Output(Output { base, escape: true });
                current(frames, root).data.push(tree);
            }
        }

        Ok(())
    }

    /// Parse `{{else}}`, `{{else if x}}` or `{{else unless x}}`.
    ///
    /// Assumes the `else` identifier was already read.
    fn parse_else(&mut self, begin: Region, frames: &mut Vec<Frame>) -> Result<(), Diagnostic> {
        let chained = match self.next_any_must()? {
            (Token::EndExpression, _) => None,
            (Token::Identifier, region) => match &self.lexer.source[region] {
                "if" => Some(Keyword::If),
                "unless" => Some(Keyword::Unless),
                _ => {
                    return Err(Diagnostic::build(UNKNOWN_HELPER)
                        .with_pointer(self.lexer.source, region)
                        .with_help("only `if` and `unless` may follow `else`"))
                }
            },
            (token, region) => {
                return Err(Diagnostic::build(UNEXPECTED_TOKEN)
                    .with_pointer(self.lexer.source, region)
                    .with_help(expected(Token::EndExpression, token)))
            }
        };

        let Some(frame) = frames.last_mut() else {
            return Err(Diagnostic::build(UNEXPECTED_BLOCK)
                .with_pointer(self.lexer.source, begin)
                .with_help("`else` must be placed inside of a block"));
        };
        if !frame.begin_else() {
            return Err(Diagnostic::build(UNEXPECTED_BLOCK)
                .with_pointer(self.lexer.source, begin)
                .with_help(format!(
                    "the `{}` block already has an `else` branch",
                    frame.keyword
                )));
        }

        if let Some(keyword) = chained {
            let base = self.parse_base()?;
            let (_, end) = self.next_must(Token::EndExpression)?;
            frames.push(Frame::new(keyword, base, begin.combine(end), true));
        }

        Ok(())
    }

    /// Close the innermost open block, along with any `{{else if}}` blocks
    /// chained to it.
    fn close_block(
        &self,
        region: Region,
        name: &str,
        frames: &mut Vec<Frame>,
        root: &mut Scope,
    ) -> Result<(), Diagnostic> {
        loop {
            let Some(frame) = frames.pop() else {
                return Err(Diagnostic::build(UNEXPECTED_BLOCK)
                    .with_pointer(self.lexer.source, region)
                    .with_help(format!("there is no open `{name}` block to close")));
            };

            let chained = frame.chained;
            if !chained && frame.keyword.to_string() != name {
                let keyword = frame.keyword;

                return Err(Diagnostic::build(UNEXPECTED_BLOCK)
                    .with_pointer(self.lexer.source, region)
                    .with_help(format!(
                        "expected `{{{{/{keyword}}}}}` to close the block opened first"
                    )));
            }

            let tree = frame.finish();
            current(frames, root).data.push(tree);

            if !chained {
                return Ok(());
            }
        }
    }

    /// Parse the name of a block helper following `#`.
    fn parse_keyword(&mut self) -> Result<Keyword, Diagnostic> {
        let (_, region) = self.next_must(Token::Identifier)?;

        Keyword::from_helper(&self.lexer.source[region]).ok_or_else(|| {
            Diagnostic::build(UNKNOWN_HELPER)
                .with_pointer(self.lexer.source, region)
                .with_help("the supported block helpers are `if`, `unless`, `each` and `with`")
        })
    }

    /// Parse a partial tag, assuming `>` was already read.
    ///
    /// # Errors
    ///
    /// Returns a [`Diagnostic`] when the partial was never registered.
    fn parse_partial(&mut self, begin: Region) -> Result<Partial, Diagnostic> {
        let (name, name_region) = match self.next_any_must()? {
            (Token::Name, region) => (self.lexer.source[region].to_string(), region),
            (Token::String, region) => (self.parse_string(region)?, region),
            (token, region) => {
                return Err(Diagnostic::build(UNEXPECTED_TOKEN)
                    .with_pointer(self.lexer.source, region)
                    .with_help(expected("a partial name", token)))
            }
        };

        let context = if self.next_is(Token::EndExpression)? {
            None
        } else {
            Some(self.parse_base()?)
        };
        let (_, end) = self.next_must(Token::EndExpression)?;

        if name.is_empty() {
            return Err(Diagnostic::build(INVALID_SYNTAX)
                .with_pointer(self.lexer.source, name_region)
                .with_help("partial names must not be empty"));
        }
        if !self.partials.contains_key(&name) {
            return Err(Diagnostic::build(UNREGISTERED_PARTIAL)
                .with_pointer(self.lexer.source, begin.combine(end))
                .with_help(format!(
                    "the partial `{name}` is not registered, add it with `add_partial` \
                    or `add_partials_directory` before rendering"
                )));
        }
        self.references.insert(name.clone());

        Ok(Partial { name, context })
    }

    /// Parse a [`Base`] from the next token.
    fn parse_base(&mut self) -> Result<Base, Diagnostic> {
        let next = self.next_any_must()?;

        self.parse_base_from(next)
    }

    /// Parse a [`Base`] that begins with the given token.
    fn parse_base_from(&mut self, next: (Token, Region)) -> Result<Base, Diagnostic> {
        let base = match next {
            (Token::String, region) => Base::Literal(Value::String(self.parse_string(region)?)),
            (Token::Number, region) => Base::Literal(self.parse_number(region)?),
            (Token::True, _) => Base::Literal(Value::Bool(true)),
            (Token::False, _) => Base::Literal(Value::Bool(false)),
            (Token::Null, _) => Base::Literal(Value::Null),
            (Token::At | Token::Parent | Token::Period | Token::Identifier, _) => {
                Base::Variable(self.parse_path(next)?)
            }
            (token, region) => {
                return Err(Diagnostic::build(UNEXPECTED_TOKEN)
                    .with_pointer(self.lexer.source, region)
                    .with_help(expected("a path or literal", token)))
            }
        };

        Ok(base)
    }

    /// Parse a [`Path`] that begins with the given token.
    ///
    /// Recognizes `name`, `this`, `.`, `./name`, `../name`, `@index` and
    /// any of those followed by `.key` or `/key` segments.
    fn parse_path(&mut self, first: (Token, Region)) -> Result<Path, Diagnostic> {
        let source = self.lexer.source;
        let (origin, mut keys, mut last) = match first {
            (Token::At, region) => {
                let (_, name) = self.next_must(Token::Identifier)?;
                if !region.is_neighbor(name) {
                    return Err(Diagnostic::build(UNEXPECTED_TOKEN)
                        .with_pointer(source, region.combine(name))
                        .with_help("try removing the whitespace after `@`"));
                }

                (Origin::Data(source[name].to_string()), vec![], name)
            }
            (Token::Parent, region) => {
                let mut parents = 1;
                let mut last = region;
                let mut keys = vec![];
                while self.next_is_neighbor(Token::Slash, last)? {
                    let (_, slash) = self.next_any_must()?;
                    last = slash;
                    if self.next_is_neighbor(Token::Parent, last)? {
                        let (_, parent) = self.next_any_must()?;
                        parents += 1;
                        last = parent;
                        continue;
                    }

                    let (_, key) = self.parse_key(last)?;
                    keys.push(source[key].to_string());
                    last = key;
                    break;
                }

                (Origin::Context { parents }, keys, last)
            }
            (Token::Period, region) => {
                if self.next_is_neighbor(Token::Slash, region)? {
                    let (_, slash) = self.next_any_must()?;
                    let (_, key) = self.parse_key(slash)?;

                    (Origin::Context { parents: 0 }, vec![source[key].to_string()], key)
                } else {
                    (Origin::Context { parents: 0 }, vec![], region)
                }
            }
            (_, region) => {
                let keys = match &source[region] {
                    "this" => vec![],
                    key => vec![key.to_string()],
                };

                (Origin::Context { parents: 0 }, keys, region)
            }
        };

        // Keep chaining keys as long as we see an adjacent separator.
        while self.next_is_neighbor(Token::Period, last)?
            || self.next_is_neighbor(Token::Slash, last)?
        {
            let (_, separator) = self.next_any_must()?;
            let (_, key) = self.parse_key(separator)?;
            keys.push(source[key].to_string());
            last = key;
        }

        Ok(Path { origin, keys })
    }

    /// Parse a key directly following the separator at `after`.
    ///
    /// # Errors
    ///
    /// Returns a [`Diagnostic`] if the next token is not an identifier or
    /// number, or is separated from the path by whitespace.
    fn parse_key(&mut self, after: Region) -> TokenResultMust {
        match self.next_any_must()? {
            (token @ (Token::Identifier | Token::Number), region) if after.is_neighbor(region) => {
                Ok((token, region))
            }
            (_, region) => Err(Diagnostic::build(UNEXPECTED_TOKEN)
                .with_pointer(self.lexer.source, region)
                .with_help("expected an unquoted key such as `one.two` or `items.0`")),
        }
    }

    /// Parse a String from the literal value of the given Region.
    ///
    /// # Errors
    ///
    /// Returns an error if an unrecognized escape character is found.
    fn parse_string(&self, region: Region) -> Result<String, Diagnostic> {
        let window = &self.lexer.source[region];
        let inner = &window[1..window.len() - 1];
        if !inner.contains('\\') {
            return Ok(inner.to_owned());
        }

        let mut string = String::with_capacity(inner.len());
        let mut iter = inner.chars();
        while let Some(c) = iter.next() {
            if c != '\\' {
                string.push(c);
                continue;
            }

            let c = match iter.next() {
                Some('n') => '\n',
                Some('r') => '\r',
                Some('t') => '\t',
                Some(c @ ('\\' | '"' | '\'')) => c,
                _ => {
                    return Err(Diagnostic::build("unexpected escape character")
                        .with_pointer(self.lexer.source, region)
                        .with_help("recognized escapes are `\\n`, `\\r`, `\\t`, `\\\\`, `\\\"` and `\\'`"))
                }
            };
            string.push(c);
        }

        Ok(string)
    }

    /// Parse a Value::Number from the given Region.
    ///
    /// # Errors
    ///
    /// Returns an error if the literal value of the Region cannot be converted
    /// to a Value::Number.
    fn parse_number(&self, region: Region) -> Result<Value, Diagnostic> {
        let number: Number = self.lexer.source[region].parse().map_err(|_| {
            Diagnostic::build("unrecognizable number")
                .with_pointer(self.lexer.source, region)
                .with_help("numbers may begin with `-` and must not end with a decimal")
        })?;

        Ok(Value::Number(number))
    }

    /// Peek the next token.
    ///
    /// # Errors
    ///
    /// Propagates any error reported by the underlying Lexer.
    fn peek(&mut self) -> TokenResult {
        if let o @ None = &mut self.buffer {
            *o = Some(self.lexer.next()?);
        }

        Ok(self.buffer.flatten())
    }

    /// Get the next token.
    ///
    /// Prefers to pull a token from the internal buffer first, but will pull from
    /// the lexer when the buffer is empty.
    fn next(&mut self) -> TokenResult {
        match self.buffer.take() {
            Some(t) => Ok(t),
            None => self.lexer.next(),
        }
    }

    /// Returns true if the given token matches the upcoming token.
    ///
    /// # Errors
    ///
    /// Propagates any errors reported by the underlying lexer.
    fn next_is(&mut self, expect: Token) -> Result<bool, Diagnostic> {
        Ok(self.peek()?.is_some_and(|(token, _)| token == expect))
    }

    /// Returns true if the given token matches the upcoming token, and
    /// that token directly touches the given [`Region`].
    fn next_is_neighbor(&mut self, expect: Token, last: Region) -> Result<bool, Diagnostic> {
        Ok(self
            .peek()?
            .is_some_and(|(token, region)| token == expect && last.is_neighbor(region)))
    }

    /// Get the next token, and compare it to the given token.
    ///
    /// # Errors
    ///
    /// An error is returned if the next token does not match the given token,
    /// or when [next()] returns None.
    fn next_must(&mut self, expect: Token) -> TokenResultMust {
        match self.next()? {
            Some((token, region)) if token == expect => Ok((token, region)),
            Some((token, region)) => Err(Diagnostic::build(UNEXPECTED_TOKEN)
                .with_pointer(self.lexer.source, region)
                .with_help(expected(expect, token))),
            None => {
                let source_len = self.lexer.source.len();
                Err(Diagnostic::build(UNEXPECTED_EOF)
                    .with_pointer(self.lexer.source, source_len..source_len)
                    .with_help(format!("expected {expect}")))
            }
        }
    }

    /// Get the next token.
    ///
    /// Similar to "next()" but requires that a token is returned.
    ///
    /// # Errors
    ///
    /// An error is returned if no more tokens are left.
    fn next_any_must(&mut self) -> TokenResultMust {
        match self.next()? {
            Some((token, region)) => Ok((token, region)),
            None => Err(crate::log::error_eof(self.lexer.source)),
        }
    }
}

/// Return the scope trees are currently added to, the body of the innermost
/// open block or the root.
fn current<'a>(frames: &'a mut [Frame], root: &'a mut Scope) -> &'a mut Scope {
    match frames.last_mut() {
        Some(frame) => &mut frame.body,
        None => root,
    }
}
