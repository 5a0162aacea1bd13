use std::{
    cmp::max,
    fmt::{Formatter, Result},
};

use super::{
    super::{RESET, YELLOW},
    get_width, Visual, BLANK, EQUAL, HIGHLIGHT, PIPE,
};
use crate::region::Region;

/// A [`Visual`] that underlines a specific location within source text.
#[derive(Debug, PartialEq)]
pub struct Pointer {
    /// Zero indexed line being pointed to.
    line: usize,
    /// Zero indexed display column where the highlight begins.
    column: usize,
    /// Display width of the highlight.
    length: usize,
    /// The line of text being pointed to.
    text: String,
}

impl Pointer {
    /// Create a new Pointer over the given source text and Region.
    ///
    /// A Region that spans several lines is clipped to its first line.
    pub fn new(source: &str, region: Region) -> Self {
        let begin = floor_boundary(source, region.begin);
        let end = floor_boundary(source, region.end.max(begin));

        let line_begin = source[..begin].rfind('\n').map_or(0, |index| index + 1);
        let line_end = source[begin..]
            .find('\n')
            .map_or(source.len(), |index| begin + index);

        Self {
            line: source[..line_begin].matches('\n').count(),
            column: get_width(&source[line_begin..begin]),
            length: max(1, get_width(&source[begin..end.min(line_end)])),
            text: source[line_begin..line_end].trim_end_matches('\r').to_string(),
        }
    }
}

/// Move the index back to the closest character boundary within source.
fn floor_boundary(source: &str, index: usize) -> usize {
    let mut index = index.min(source.len());
    while !source.is_char_boundary(index) {
        index -= 1;
    }

    index
}

impl Visual for Pointer {
    fn display(
        &self,
        formatter: &mut Formatter<'_>,
        template: Option<&str>,
        help: Option<&str>,
    ) -> Result {
        let num = (self.line + 1).to_string();
        let col = self.column + 1;
        let pad = get_width(&num);
        let align = self.column + self.length;

        let name = template.unwrap_or("?");
        let text = &self.text;
        let underline = HIGHLIGHT.repeat(self.length);

        write!(
            formatter,
            "\n {BLANK:pad$}--> {name}:{num}:{col}\
             \n {BLANK:pad$} {PIPE}\
             \n {num:>} {PIPE} {text}\
             \n {BLANK:pad$} {PIPE} {YELLOW}{underline:>align$}{RESET}\
             \n {BLANK:pad$} {PIPE}\n",
        )?;

        if let Some(help) = help {
            writeln!(formatter, " {BLANK:pad$} {EQUAL} help: {help}")?;
        }

        Ok(())
    }
}
