use super::{Pointer, Visual, RED, RESET};
use crate::region::Region;
use std::fmt::{Debug, Display, Formatter, Result};

/// Describes a failure to compile or render a template, and allows adding
/// contextual help text and a visualization of the offending source.
///
/// # Examples
///
/// ```
/// use kx_draw::Diagnostic;
///
/// let diagnostic = Diagnostic::build("unexpected token")
///     .with_pointer("<b>{{#if}}</b>", 3..10)
///     .with_name("card")
///     .with_help("expected a path or literal after `#if`");
///
/// assert_eq!(diagnostic.name(), Some("card"));
/// ```
///
/// When printed with `println!("{:#}", diagnostic)` it produces:
///
/// ```text
/// error: unexpected token
///   --> card:1:4
///    |
///  1 | <b>{{#if}}</b>
///    |    ^^^^^^^
///    |
///   = help: expected a path or literal after `#if`
/// ```
pub struct Diagnostic {
    /// Short summary of the failure.
    reason: String,
    /// A visualization to help illustrate the failure.
    visual: Option<Box<dyn Visual>>,
    /// Additional information to display with the reason.
    help: Option<String>,
    /// The name of the template the failure comes from.
    name: Option<String>,
}

impl Diagnostic {
    /// Create a new [`Diagnostic`] with the given reason text.
    pub fn build<T>(reason: T) -> Self
    where
        T: Into<String>,
    {
        Diagnostic {
            reason: reason.into(),
            visual: None,
            help: None,
            name: None,
        }
    }

    /// Set the name of the template that the [`Diagnostic`] is related to.
    ///
    /// A name that was already set is kept, so the innermost template
    /// (for example a partial) stays the one reported.
    #[must_use]
    pub fn with_name<T>(mut self, text: T) -> Self
    where
        T: Into<String>,
    {
        if self.name.is_none() {
            self.name = Some(text.into());
        }

        self
    }

    /// Set the [`Visual`].
    #[must_use]
    pub fn with_visual(mut self, visual: impl Visual + 'static) -> Self {
        self.visual = Some(Box::new(visual));

        self
    }

    /// Set the visualization to a new [`Pointer`] over the given source text.
    ///
    /// Shortcut for `.with_visual(Pointer::new(source, region.into()))`.
    #[must_use]
    pub fn with_pointer<T>(self, source: &str, region: T) -> Self
    where
        T: Into<Region>,
    {
        self.with_visual(Pointer::new(source, region.into()))
    }

    /// Set the help text.
    #[must_use]
    pub fn with_help<T>(mut self, text: T) -> Self
    where
        T: Into<String>,
    {
        self.help = Some(text.into());

        self
    }

    /// Return the reason text.
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Return the help text, if any.
    pub fn help(&self) -> Option<&str> {
        self.help.as_deref()
    }

    /// Return the name of the template that the diagnostic is related to.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl Debug for Diagnostic {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        f.debug_struct("Diagnostic")
            .field("reason", &self.reason)
            .field("name", &self.name)
            .field("visual", &self.visual)
            .field("help", &self.help)
            .finish()
    }
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        if !f.alternate() {
            write!(f, "{}", self.reason)?;
            if let Some(help) = &self.help {
                write!(f, " ({help})")?;
            }
            return Ok(());
        }

        write!(f, "{RED}error{RESET}: {}", self.reason)?;
        match &self.visual {
            Some(visual) => visual.display(f, self.name.as_deref(), self.help.as_deref()),
            None => match &self.help {
                Some(help) => write!(f, "\n  = help: {help}"),
                None => Ok(()),
            },
        }
    }
}

impl PartialEq for Diagnostic {
    fn eq(&self, other: &Self) -> bool {
        self.reason == other.reason && self.help == other.help && self.name == other.name
    }
}

impl std::error::Error for Diagnostic {}
