//! Fancy diagnostics support using `ariadne`.
//!
//! Converts warnings carrying [`SourceRangeMixin`] byte spans into
//! `ariadne::Report`s without modifying the warning type definitions.
//! Since the mixin stores start/end byte offsets, ariadne handles the
//! row/column calculations for display by itself.
//!
//! # Usage Example
//!
//! ```rust
//! use ksh2vox::ksh::{diagnostics::emit_convert_warnings, parse_ksh};
//!
//! let source = "title=Test\nartist=Composer\nt=120\nver=167\n--\n0000|00|--\n--\n";
//! let output = parse_ksh(source).expect("convertible chart");
//!
//! // Render every warning to the terminal.
//! emit_convert_warnings("test.ksh", source, &output.warnings);
//! ```

use ariadne::{Color, Label, Report, ReportKind, Source};

use super::ConvertWarning;
use super::command::mixin::SourceRangeMixin;

/// Simple source container that holds the filename and source text.
/// Ariadne will automatically handle row/column calculations from byte offsets.
///
/// # Usage Example
///
/// ```rust
/// use ksh2vox::ksh::diagnostics::SimpleSource;
///
/// let source_text = "title=test\nartist=composer\n";
/// let source = SimpleSource::new("test.ksh", source_text);
/// assert_eq!(source.text(), source_text);
/// ```
pub struct SimpleSource<'a> {
    /// Name of the source file.
    name: &'a str,
    /// Source text content.
    text: &'a str,
}

impl<'a> SimpleSource<'a> {
    /// Create a new source container instance.
    #[must_use]
    pub const fn new(name: &'a str, text: &'a str) -> Self {
        Self { name, text }
    }

    /// Get source text content.
    #[must_use]
    pub const fn text(&self) -> &'a str {
        self.text
    }

    /// Get source file name.
    #[must_use]
    pub const fn name(&self) -> &'a str {
        self.name
    }
}

/// Trait for converting positioned warnings to `ariadne::Report`.
pub trait ToAriadne {
    /// Convert the warning to an ariadne Report. The container supplies the
    /// filename; ariadne derives row and column from the byte span.
    fn to_report<'a>(&self, src: &SimpleSource<'a>)
    -> Report<'a, (String, std::ops::Range<usize>)>;
}

impl ToAriadne for SourceRangeMixin<ConvertWarning> {
    fn to_report<'a>(
        &self,
        src: &SimpleSource<'a>,
    ) -> Report<'a, (String, std::ops::Range<usize>)> {
        let (start, end) = self.as_span();
        let stage = match self.content() {
            ConvertWarning::Lex(_) => "lex",
            ConvertWarning::Directive(_) => "directive",
            ConvertWarning::Parse(_) => "parse",
            ConvertWarning::Shift(_) => "effect table",
        };
        let filename = src.name().to_string();
        Report::build(ReportKind::Warning, (filename.clone(), start..end))
            .with_message(format!("{stage}: {}", self.content()))
            .with_label(Label::new((filename, start..end)).with_color(Color::Blue))
            .finish()
    }
}

/// Convenience method: batch render a [`ConvertWarning`] list.
///
/// Creates the [`SimpleSource`] internally and prints one report per
/// warning. Ariadne handles the row/column calculations from the stored
/// byte ranges.
///
/// # Usage Example
///
/// ```rust
/// use ksh2vox::ksh::{diagnostics::emit_convert_warnings, parse_ksh};
///
/// let source = "title=Test\nartist=Composer\nt=120\nver=167\n--\n0000|00|--\n--\n";
/// let output = parse_ksh(source).expect("convertible chart");
/// emit_convert_warnings("test.ksh", source, &output.warnings);
/// ```
pub fn emit_convert_warnings<'a>(
    name: &'a str,
    source: &'a str,
    warnings: impl IntoIterator<Item = &'a SourceRangeMixin<ConvertWarning>>,
) {
    let simple = SimpleSource::new(name, source);
    let ariadne_source = Source::from(source);
    for w in warnings {
        let report = w.to_report(&simple);
        let _ = report.print((name.to_string(), ariadne_source.clone()));
    }
}

/// Collect `ariadne::Report` instances for a warning list without printing.
///
/// Useful in tests to verify diagnostics can be generated while keeping
/// test output clean.
#[must_use]
pub fn collect_convert_reports<'a>(
    name: &'a str,
    source: &'a str,
    warnings: impl IntoIterator<Item = &'a SourceRangeMixin<ConvertWarning>>,
) -> Vec<Report<'a, (String, std::ops::Range<usize>)>> {
    let simple = SimpleSource::new(name, source);
    warnings.into_iter().map(|w| w.to_report(&simple)).collect()
}
