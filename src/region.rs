use std::{
    cmp::{max, min},
    ops::{Index, Range},
};

/// Represents an area within template source text.
#[derive(Debug, PartialEq, Eq, Copy, Clone, Default)]
pub struct Region {
    /// The beginning of the range, inclusive.
    pub begin: usize,
    /// The ending of the range, exclusive.
    pub end: usize,
}

impl Region {
    /// Create a new Region from the given range.
    pub fn new(position: Range<usize>) -> Self {
        Self {
            begin: position.start,
            end: position.end,
        }
    }

    /// Return true if this [`Region`] ends where the given `Region` begins,
    /// or this `Region` begins where the given `Region` ends.
    pub fn is_neighbor(&self, other: Self) -> bool {
        self.end == other.begin || other.end == self.begin
    }

    /// Merge the indices of two [`Region`] instances.
    pub fn combine(self, other: Self) -> Self {
        Self {
            begin: min(self.begin, other.begin),
            end: max(self.end, other.end),
        }
    }

    /// Access the literal value of a [`Region`], if it lies on character
    /// boundaries within the given source text.
    pub fn literal<'source>(&self, source: &'source str) -> Option<&'source str> {
        source.get(self.begin..self.end)
    }

    /// Number of bytes covered by the [`Region`].
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.begin)
    }

    /// Return true if the [`Region`] covers no bytes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Index<Region> for str {
    type Output = str;

    fn index(&self, region: Region) -> &Self::Output {
        let Region { begin, end } = region;

        &self[begin..end]
    }
}

impl From<Range<usize>> for Region {
    fn from(value: Range<usize>) -> Self {
        Self::new(value)
    }
}

impl From<Region> for Range<usize> {
    fn from(value: Region) -> Self {
        value.begin..value.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_neighbor() {
        assert!(Region::new(0..5).is_neighbor(Region::new(5..10)));
        assert!(Region::new(5..10).is_neighbor(Region::new(0..5)));
        assert!(!Region::new(5..10).is_neighbor(Region::new(11..14)));
    }

    #[test]
    fn test_combine() {
        let combined = Region::new(5..10).combine(Region::new(8..15));

        assert_eq!(combined, Region::new(5..15));
        assert_eq!(combined.len(), 10);
    }

    #[test]
    fn test_literal() {
        let source = "Hello {{name}}!";

        assert_eq!(Region::new(8..12).literal(source), Some("name"));
        assert_eq!(Region::new(8..40).literal(source), None);
        assert_eq!(&source[Region::new(6..8)], "{{");
    }
}
