use super::Diagnostic;
use std::fmt::Display;

pub const UNEXPECTED_TOKEN: &str = "unexpected token";
pub const UNEXPECTED_BLOCK: &str = "unexpected block";
pub const UNEXPECTED_EOF: &str = "unexpected eof";
pub const INVALID_SYNTAX: &str = "invalid syntax";
pub const UNKNOWN_HELPER: &str = "unknown helper";
pub const UNREGISTERED_PARTIAL: &str = "unregistered partial";

/// Return a [`Diagnostic`] explaining that the end of source was not expected.
pub fn error_eof(source: &str) -> Diagnostic {
    let source_len = source.len();
    Diagnostic::build(UNEXPECTED_EOF)
        .with_pointer(source, source_len..source_len)
        .with_help("expected additional tokens, did you close all blocks and expressions?")
}

/// Return a [`Diagnostic`] explaining that the write operation failed.
///
/// This is likely caused by a failure during a `write!` macro operation.
pub fn error_write() -> Diagnostic {
    Diagnostic::build("write failure")
        .with_help("failed to write result of render, are you low on memory?")
}

/// Return a [`Diagnostic`] explaining that partials nest deeper than allowed.
pub fn error_partial_depth(name: &str, limit: usize) -> Diagnostic {
    Diagnostic::build("partial nesting too deep").with_help(format!(
        "partial `{name}` exceeded the nesting limit of {limit}, \
        does it include itself without a terminating condition?"
    ))
}

/// Return a string describing an unexpected token.
pub fn expected<T, U>(expected: T, received: U) -> String
where
    T: Display,
    U: Display,
{
    format!("expected {expected}, found {received}")
}
