mod lex;
mod parse;
mod program;

pub use crate::compile::{
    parse::{scope::Scope, tree, Parser},
    program::Program,
};

use crate::log::Diagnostic;
use std::{collections::BTreeMap, fmt::Display};

/// Turns normalized template text into a [`Program`].
///
/// Partials are handed over by logical name so the compiler can resolve
/// every `{{> name}}` reference at compile time.
///
/// Any `Fn(&str, &BTreeMap<String, String>) -> Result<Program, Diagnostic>`
/// is also a `Compiler`.
pub trait Compiler {
    /// Compile the given source.
    ///
    /// # Errors
    ///
    /// Returns a [`Diagnostic`] if the source is not valid template syntax.
    fn compile(
        &self,
        source: &str,
        partials: &BTreeMap<String, String>,
    ) -> Result<Program, Diagnostic>;
}

/// The built-in [`Compiler`], understanding a subset of Handlebars.
///
/// Supported are `{{path}}`, `{{{path}}}` and `{{&path}}` output, the
/// `#if`, `#unless`, `#each` and `#with` block helpers with `{{else}}`
/// and `{{else if}}`, partials, comments and `~` whitespace control.
#[derive(Debug, Default, Clone, Copy)]
pub struct Handlebars;

impl Compiler for Handlebars {
    fn compile(
        &self,
        source: &str,
        partials: &BTreeMap<String, String>,
    ) -> Result<Program, Diagnostic> {
        compile(source, partials)
    }
}

impl<F> Compiler for F
where
    F: Fn(&str, &BTreeMap<String, String>) -> Result<Program, Diagnostic>,
{
    fn compile(
        &self,
        source: &str,
        partials: &BTreeMap<String, String>,
    ) -> Result<Program, Diagnostic> {
        self(source, partials)
    }
}

/// Compile a [`Program`] from the given text.
///
/// Each partial reachable from the text is compiled once and stored in
/// the program.
///
/// # Examples
///
/// ```
/// use kx_draw::compile;
/// use std::collections::BTreeMap;
///
/// let partials = BTreeMap::from([("name".to_string(), "<i>{{name}}</i>".to_string())]);
/// let program = compile("<b>Hello {{> name}}</b>", &partials);
/// assert!(program.is_ok());
/// ```
pub fn compile(source: &str, partials: &BTreeMap<String, String>) -> Result<Program, Diagnostic> {
    let (scope, mut pending) = Parser::new(source, partials).parse()?;

    let mut compiled = BTreeMap::new();
    while let Some(name) = pending.pop_first() {
        if compiled.contains_key(&name) {
            continue;
        }

        // The parser only records partials present in the table.
        let Some(text) = partials.get(&name) else {
            continue;
        };
        let (partial, references) = Parser::new(text, partials)
            .parse()
            .map_err(|diagnostic| diagnostic.with_name(name.clone()))?;

        compiled.insert(name, partial);
        pending.extend(
            references
                .into_iter()
                .filter(|reference| !compiled.contains_key(reference)),
        );
    }

    Ok(Program::new(scope, compiled))
}

/// Block helpers recognized by the Parser.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Keyword {
    /// Renders its contents when the argument is truthy.
    If,
    /// Renders its contents when the argument is falsy.
    Unless,
    /// Renders its contents once per item of an array or object.
    Each,
    /// Renders its contents with the argument as the context.
    With,
}

impl Keyword {
    /// Return the [`Keyword`] with the given helper name.
    pub fn from_helper(name: &str) -> Option<Self> {
        match name {
            "if" => Some(Keyword::If),
            "unless" => Some(Keyword::Unless),
            "each" => Some(Keyword::Each),
            "with" => Some(Keyword::With),
            _ => None,
        }
    }
}

impl Display for Keyword {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Keyword::If => write!(f, "if"),
            Keyword::Unless => write!(f, "unless"),
            Keyword::Each => write!(f, "each"),
            Keyword::With => write!(f, "with"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{compile, Compiler, Handlebars, Program};
    use crate::log::Diagnostic;
    use std::collections::BTreeMap;

    #[test]
    fn test_compile_nested_partials() {
        let partials = BTreeMap::from([
            ("card".to_string(), "<div>{{> shared/title}}</div>".to_string()),
            ("shared/title".to_string(), "<h1>{{title}}</h1>".to_string()),
            ("unused".to_string(), "x".to_string()),
        ]);
        let program = Handlebars.compile("{{> card}}", &partials).unwrap();

        assert_eq!(
            program.partials.keys().collect::<Vec<_>>(),
            vec!["card", "shared/title"]
        );
    }

    #[test]
    fn test_compile_recursive_partial() {
        let partials = BTreeMap::from([(
            "tree".to_string(),
            "{{name}}{{#each children}}{{> tree}}{{/each}}".to_string(),
        )]);

        assert!(compile("{{> tree}}", &partials).is_ok());
    }

    #[test]
    fn test_partial_error_is_named() {
        let partials = BTreeMap::from([("broken".to_string(), "{{#if}}".to_string())]);
        let error = compile("{{> broken}}", &partials).unwrap_err();

        assert_eq!(error.name(), Some("broken"));
    }

    #[test]
    fn test_closure_is_compiler() {
        let compiler = |_: &str, _: &BTreeMap<String, String>| -> Result<Program, Diagnostic> {
            Ok(Program::default())
        };

        assert_eq!(compiler.compile("{{x}}", &BTreeMap::new()), Ok(Program::default()));
    }
}
