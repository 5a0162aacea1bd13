use std::fmt::Display;

/// Types emitted by the Lexer.
///
/// An abstraction over raw text to make construction of Tree types easier.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Token {
    /// Raw text outside of any tag.
    Raw,
    /// A full comment tag, `{{! }}` or `{{!-- --}}`.
    Comment,
    /// Beginning of an expression - `{{`.
    BeginExpression,
    /// End of an expression - `}}`.
    EndExpression,
    /// Beginning of an unescaped expression - `{{{`.
    BeginRaw,
    /// End of an unescaped expression - `}}}`.
    EndRaw,
    /// String literal within a tag, single or double quoted.
    String,
    /// Number within a tag.
    Number,
    /// Identifier (unquoted string) within a tag.
    Identifier,
    /// Name of a partial following `>`.
    Name,
    /// Whitespace within a tag.
    Whitespace,
    /// #
    Hash,
    /// /
    Slash,
    /// >
    Greater,
    /// &
    Ampersand,
    /// @
    At,
    /// .
    Period,
    /// ..
    Parent,
    /// A boolean true.
    True,
    /// A boolean false.
    False,
    /// A null literal.
    Null,
}

impl Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Raw => write!(f, "raw"),
            Token::Comment => write!(f, "comment"),
            Token::BeginExpression => write!(f, "begin expression ({{{{)"),
            Token::EndExpression => write!(f, "end expression (}}}})"),
            Token::BeginRaw => write!(f, "begin raw expression ({{{{{{)"),
            Token::EndRaw => write!(f, "end raw expression (}}}}}})"),
            Token::String => write!(f, "string"),
            Token::Number => write!(f, "number"),
            Token::Identifier => write!(f, "identifier"),
            Token::Name => write!(f, "partial name"),
            Token::Whitespace => write!(f, "whitespace"),
            Token::Hash => write!(f, "hash (#)"),
            Token::Slash => write!(f, "slash (/)"),
            Token::Greater => write!(f, "greater (>)"),
            Token::Ampersand => write!(f, "ampersand (&)"),
            Token::At => write!(f, "at (@)"),
            Token::Period => write!(f, "period (.)"),
            Token::Parent => write!(f, "parent (..)"),
            Token::True => write!(f, "true"),
            Token::False => write!(f, "false"),
            Token::Null => write!(f, "null"),
        }
    }
}
