//! Wrapper carrying the source byte range a value was read from.
//!
//! Lex and directive warnings are wrapped in [`SourceRangeMixin`] so that
//! callers (and the `diagnostics` feature) can point back at the offending
//! line of chart text without the warning types themselves storing
//! positions.

/// A value tagged with the `[start, end)` byte range of the source text it
/// came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SourceRangeMixin<T> {
    content: T,
    start: usize,
    end: usize,
}

impl<T> SourceRangeMixin<T> {
    /// Wraps `content` with its source byte range.
    pub const fn new(content: T, start: usize, end: usize) -> Self {
        Self {
            content,
            start,
            end,
        }
    }

    /// The wrapped value.
    pub const fn content(&self) -> &T {
        &self.content
    }

    /// Unwraps into the inner value, dropping the range.
    pub fn into_content(self) -> T {
        self.content
    }

    /// The byte range as a `(start, end)` pair.
    pub const fn as_span(&self) -> (usize, usize) {
        (self.start, self.end)
    }

    /// Maps the wrapped value, keeping the range.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> SourceRangeMixin<U> {
        SourceRangeMixin {
            content: f(self.content),
            start: self.start,
            end: self.end,
        }
    }
}

impl<T: std::fmt::Display> std::fmt::Display for SourceRangeMixin<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (bytes {}..{})",
            self.content, self.start, self.end
        )
    }
}

/// Convenience for wrapping a value with the range of another wrapper.
pub trait SourceRangeMixinExt: Sized {
    /// Wraps `self` with an explicit byte range.
    fn into_wrapper_range(self, range: (usize, usize)) -> SourceRangeMixin<Self> {
        SourceRangeMixin::new(self, range.0, range.1)
    }

    /// Wraps `self` with the range carried by `other`.
    fn into_wrapper<U>(self, other: &SourceRangeMixin<U>) -> SourceRangeMixin<Self> {
        self.into_wrapper_range(other.as_span())
    }
}

impl<T> SourceRangeMixinExt for T {}
