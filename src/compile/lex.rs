pub mod token;

mod state;

pub use token::Token;

use crate::{
    log::{Diagnostic, INVALID_SYNTAX, UNEXPECTED_TOKEN},
    region::Region,
};
use state::CursorState;

/// Result of a single call to [`Lexer::next`].
pub type TokenResult = Result<Option<(Token, Region)>, Diagnostic>;

/// Provides methods to read a source string as [`Token`] instances.
pub struct Lexer<'source> {
    /// Reference to the source text.
    pub source: &'source str,
    /// Position within source.
    pub cursor: usize,
    /// Tracks the [`Lexer`] state and determines the action taken
    /// when `.next` is called.
    state: CursorState,
    /// When true, the following [`Token`] read while in
    /// [`CursorState::Default`] state will be left trimmed.
    left_trim: bool,
    /// Temporary storage for the a [`Token`] that will be read
    /// on the following call to `.next`
    buffer: Option<(Token, Region)>,
}

impl<'source> Lexer<'source> {
    /// Create a new [`Lexer`] from the given source.
    #[inline]
    pub fn new(source: &'source str) -> Self {
        Self {
            source,
            cursor: 0,
            state: CursorState::Default,
            left_trim: false,
            buffer: None,
        }
    }

    /// Return the next [`Token`] and [`Region`].
    ///
    /// Any instance of [`Token::Whitespace`] is ignored, as is raw text
    /// that was trimmed away completely.
    ///
    /// # Errors
    ///
    /// Returns a [`Diagnostic`] when an unexpected [`Token`] is found.
    pub fn next(&mut self) -> TokenResult {
        loop {
            // Always prefer taking from the buffer when possible.
            if let Some(next) = self.buffer.take() {
                return Ok(Some(next));
            }
            if self.source[self.cursor..].is_empty() {
                return Ok(None);
            }

            let c = self.cursor;
            let result = match self.state {
                CursorState::Default => self.lex_default(c),
                CursorState::Inside {
                    end_token,
                    partial_name,
                } => self.lex_tag(c, end_token, partial_name),
            }?;

            return match result {
                Some((Token::Whitespace, _)) => continue,
                Some((Token::Raw, region)) if region.is_empty() => continue,
                Some(next) => Ok(Some(next)),
                None => Ok(None),
            };
        }
    }

    /// Return the next [`Token`] and [`Region`] in [`CursorState::Default`]
    /// configuration.
    ///
    /// Assumes the cursor is outside of a tag. Raw text before the next
    /// tag is returned first and the tag marker is buffered.
    ///
    /// # Errors
    ///
    /// Returns a [`Diagnostic`] when a comment is never closed.
    fn lex_default(&mut self, from: usize) -> TokenResult {
        let source = self.source;
        let Some(offset) = source[from..].find("{{") else {
            let end = self.source.len();
            self.cursor = end;

            return Ok(Some(self.trim_raw(from, end, false)));
        };

        let marker_begin = from + offset;
        let right_trim = source[marker_begin + 2..].starts_with('~');
        let after = marker_begin + 2 + usize::from(right_trim);
        let raw = self.trim_raw(from, marker_begin, right_trim);

        let rest = &source[after..];
        let marker = if rest.starts_with('!') {
            let (end, trimmed) = self.find_comment_end(marker_begin, after)?;
            self.left_trim = trimmed;
            self.cursor = end;

            (Token::Comment, (marker_begin..end).into())
        } else {
            let (end_token, marker_end) = if rest.starts_with('{') {
                (Token::BeginRaw, after + 1)
            } else {
                (Token::BeginExpression, after)
            };
            self.state = CursorState::Inside {
                end_token: if end_token == Token::BeginRaw {
                    Token::EndRaw
                } else {
                    Token::EndExpression
                },
                partial_name: false,
            };
            self.cursor = marker_end;

            (end_token, (marker_begin..marker_end).into())
        };

        self.buffer = Some(marker);

        Ok(Some(raw))
    }

    /// Return the end of the comment that begins at `marker_begin`, and
    /// whether its closing marker trims the following raw text.
    ///
    /// `bang` is the position of the `!` character.
    fn find_comment_end(
        &self,
        marker_begin: usize,
        bang: usize,
    ) -> Result<(usize, bool), Diagnostic> {
        let closing = if self.source[bang..].starts_with("!--") {
            let body = bang + 3;
            [("--}}", false), ("--~}}", true)]
                .into_iter()
                .filter_map(|(marker, trimmed)| {
                    self.source[body..]
                        .find(marker)
                        .map(|index| (body + index + marker.len(), trimmed))
                })
                .min_by_key(|(end, _)| *end)
        } else {
            let body = bang + 1;
            self.source[body..].find("}}").map(|index| {
                let close = body + index;
                let trimmed = close > body && self.source[..close].ends_with('~');

                (close + 2, trimmed)
            })
        };

        closing.ok_or_else(|| {
            Diagnostic::build(INVALID_SYNTAX)
                .with_pointer(self.source, marker_begin..bang + 1)
                .with_help("this might be an unclosed comment, try closing it with `}}` or `--}}`")
        })
    }

    /// Return a [`Token::Raw`] covering the given range, trimmed on the
    /// right when the next tag asks for it and on the left when the
    /// previous tag did.
    fn trim_raw(&mut self, mut begin: usize, mut end: usize, right_trim: bool) -> (Token, Region) {
        if right_trim {
            end = begin + self.source[begin..end].trim_end().len();
        }
        if self.left_trim {
            self.left_trim = false;
            let s = &self.source[begin..end];
            begin = begin + s.len() - s.trim_start().len();
        }

        (Token::Raw, (begin..end).into())
    }

    /// Return the next [`Token`] and [`Region`] in [`CursorState::Inside`]
    /// configuration.
    ///
    /// Assumes the cursor is inside of a tag.
    ///
    /// # Errors
    ///
    /// Returns a [`Diagnostic`] when an unexpected [`Token`] is found.
    fn lex_tag(&mut self, from: usize, end_token: Token, partial_name: bool) -> TokenResult {
        let source = self.source;
        let rest = &source[from..];
        let closing: &[(&str, bool)] = match end_token {
            Token::EndRaw => &[("}}}", false), ("}~}}", true)],
            _ => &[("}}", false), ("~}}", true)],
        };

        for (marker, trimmed) in closing {
            if rest.starts_with(marker) {
                let to = from + marker.len();
                self.state = CursorState::Default;
                self.left_trim = *trimmed;
                self.cursor = to;

                return Ok(Some((end_token, (from..to).into())));
            }
        }

        if rest.starts_with("{{") {
            return Err(Diagnostic::build(UNEXPECTED_TOKEN)
                .with_pointer(self.source, from..from + 2)
                .with_help("did you close the previous expression?"));
        }
        if end_token == Token::EndRaw && (rest.starts_with("}}") || rest.starts_with("~}}")) {
            return Err(Diagnostic::build(UNEXPECTED_TOKEN)
                .with_pointer(self.source, from..from + 2)
                .with_help("did you close the raw expression with `}}}`?"));
        }

        let mut iterator = rest.char_indices().map(|(d, c)| (from + d, c));
        let Some((index, char)) = iterator.next() else {
            return Ok(None);
        };

        if partial_name && !char.is_whitespace() && char != '"' && char != '\'' {
            self.state = CursorState::Inside {
                end_token,
                partial_name: false,
            };

            return Ok(Some(self.lex_name(iterator, index)));
        }
        if partial_name && (char == '"' || char == '\'') {
            self.state = CursorState::Inside {
                end_token,
                partial_name: false,
            };
        }

        let mut advance = |length: usize, data: Token| {
            self.cursor += length;

            Ok(Some((data, (from..from + length).into())))
        };

        match char {
            '#' => advance(1, Token::Hash),
            '/' => advance(1, Token::Slash),
            '&' => advance(1, Token::Ampersand),
            '@' => advance(1, Token::At),
            '>' => {
                self.state = CursorState::Inside {
                    end_token,
                    partial_name: true,
                };
                self.cursor += 1;

                Ok(Some((Token::Greater, (from..from + 1).into())))
            }
            '.' if rest[1..].starts_with('.') => advance(2, Token::Parent),
            '.' => advance(1, Token::Period),
            '"' | '\'' => self.lex_string(iterator, index, char),
            '-' if rest[1..].starts_with(|c: char| c.is_ascii_digit()) => {
                Ok(Some(self.lex_digit(index)))
            }
            c if c.is_whitespace() => Ok(Some(self.lex_whitespace(iterator, index))),
            c if c.is_ascii_digit() => Ok(Some(self.lex_digit(index))),
            c if is_ident_start(c) => Ok(Some(self.lex_ident_or_literal(iterator, index))),
            _ => Err(Diagnostic::build(UNEXPECTED_TOKEN)
                .with_pointer(self.source, index..index + char.len_utf8())
                .with_help(
                    "expected one of `#`, `/`, `>`, `&`, `@`, `.`, an identifier, \
                    a number, or a string literal marked with `\"` or `'`",
                )),
        }
    }

    /// Return a [`Token`] and [`Region`] containing [`Token::Number`].
    ///
    /// Accepts an optional leading `-` and a fractional part, which must
    /// have at least one digit after the period.
    fn lex_digit(&mut self, from: usize) -> (Token, Region) {
        let bytes = self.source.as_bytes();
        let digits_from = |mut at: usize| {
            while at < bytes.len() && bytes[at].is_ascii_digit() {
                at += 1;
            }
            at
        };

        let mut to = digits_from(from + 1);
        if to + 1 < bytes.len() && bytes[to] == b'.' && bytes[to + 1].is_ascii_digit() {
            to = digits_from(to + 1);
        }
        self.cursor = to;

        (Token::Number, (from..to).into())
    }

    /// Return a [`Token`] and [`Region`] containing [`Token::Whitespace`].
    fn lex_whitespace<T>(&mut self, mut iter: T, from: usize) -> (Token, Region)
    where
        T: Iterator<Item = (usize, char)>,
    {
        loop {
            match iter.next() {
                Some((index, char)) if !char.is_whitespace() => {
                    self.cursor = index;

                    break (Token::Whitespace, (from..index).into());
                }
                Some((_, _)) => continue,
                None => {
                    self.cursor = self.source.len();

                    break (Token::Whitespace, (from..self.source.len()).into());
                }
            }
        }
    }

    /// Return a [`Token`] and [`Region`] containing [`Token::Name`].
    ///
    /// A partial name runs until whitespace or the end of the tag, so it may
    /// contain `/`, `-` and `.`.
    fn lex_name<T>(&mut self, mut iter: T, from: usize) -> (Token, Region)
    where
        T: Iterator<Item = (usize, char)>,
    {
        loop {
            match iter.next() {
                Some((index, char)) if char.is_whitespace() || char == '}' || char == '~' => {
                    self.cursor = index;

                    break (Token::Name, (from..index).into());
                }
                Some((_, _)) => continue,
                None => {
                    self.cursor = self.source.len();

                    break (Token::Name, (from..self.source.len()).into());
                }
            }
        }
    }

    /// Return a [`Token`] and [`Region`] containing [`Token::String`] using
    /// the given iterator.
    ///
    /// # Errors
    ///
    /// Returns a [`Diagnostic`] when the string is never closed.
    fn lex_string<T>(&mut self, mut iter: T, from: usize, quote: char) -> TokenResult
    where
        T: Iterator<Item = (usize, char)>,
    {
        let mut escaped = false;
        loop {
            match iter.next() {
                Some((index, char)) if char == quote && !escaped => {
                    let to = index + 1;
                    self.cursor = to;

                    return Ok(Some((Token::String, (from..to).into())));
                }
                Some((_, char)) => escaped = char == '\\' && !escaped,
                None => {
                    return Err(Diagnostic::build(INVALID_SYNTAX)
                        .with_pointer(self.source, from..from + 1)
                        .with_help(format!(
                            "this might be an undelimited string, try closing it with `{quote}`"
                        )));
                }
            }
        }
    }

    /// Return a [`Token`] and [`Region`] from the given iterator.
    ///
    /// The `Token` will be [`Token::Identifier`] or one of the literal
    /// tokens `true`, `false` and `null`. Helper names such as `if` and
    /// `each` are identifiers here, the parser decides what they mean.
    fn lex_ident_or_literal<T>(&mut self, mut iter: T, from: usize) -> (Token, Region)
    where
        T: Iterator<Item = (usize, char)>,
    {
        let to = loop {
            match iter.next() {
                Some((index, char)) if !is_ident_continue(char) => break index,
                Some((_, _)) => continue,
                None => break self.source.len(),
            }
        };
        self.cursor = to;

        let token = match &self.source[from..to] {
            "true" => Token::True,
            "false" => Token::False,
            "null" | "undefined" => Token::Null,
            _ => Token::Identifier,
        };

        (token, (from..to).into())
    }
}

/// Return true if the given character is a recognized beginning identifier,
/// meaning '_', '$' or an `xid_start`.
fn is_ident_start(c: char) -> bool {
    c == '_' || c == '$' || unicode_ident::is_xid_start(c)
}

/// Return true if the given character is a recognized continue identifier,
/// meaning an `xid_continue`, '-' or '$'.
fn is_ident_continue(c: char) -> bool {
    c == '-' || c == '$' || unicode_ident::is_xid_continue(c)
}
