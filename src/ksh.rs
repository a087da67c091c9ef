//! KSH chart reading.
//!
//! [`parse_ksh`] takes KSH source text through three stages: the lexer
//! splits it into classified lines, the directive interpreter tracks the
//! state driven by `//` comments, and the builder turns both into a
//! [`SongInfo`] and [`ChartInfo`] ready for serialization. Degraded input
//! surfaces as [`ConvertWarning`]s on the output; only a missing required
//! header or an unsupported format version aborts the conversion.

pub mod command;
pub mod directive;
pub mod ease;
pub mod lex;
pub mod model;
mod parse;
pub mod stats;

#[cfg(feature = "diagnostics")]
pub mod diagnostics;

use thiserror::Error;

use command::mixin::SourceRangeMixin;
use directive::DirectiveWarning;
use lex::LexWarning;
use model::{ChartInfo, ReferentialShift, SongInfo};
pub use parse::ParseWarning;

/// The source cannot be converted at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConvertError {
    /// A header field every chart must carry was absent.
    #[error("required header field {0:?} is missing")]
    MissingHeaderField(&'static str),
    /// The chart predates format version 160.
    #[error("chart format version {0} is not supported, need 160 or newer")]
    UnsupportedVersion(u32),
}

/// Anything the conversion had to repair, drop or renumber.
#[derive(Debug, Clone, PartialEq, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConvertWarning {
    /// Raised while splitting the source into lines.
    #[error(transparent)]
    Lex(#[from] LexWarning),
    /// Raised while interpreting a comment directive.
    #[error(transparent)]
    Directive(#[from] DirectiveWarning),
    /// Raised while building the chart.
    #[error(transparent)]
    Parse(#[from] ParseWarning),
    /// Raised while renumbering effect references.
    #[error(transparent)]
    Shift(#[from] ReferentialShift),
}

/// A converted chart with everything raised along the way.
#[derive(Debug, Clone, PartialEq)]
pub struct KshOutput {
    /// Song-level metadata.
    pub song: SongInfo,
    /// The chart itself.
    pub chart: ChartInfo,
    /// Warnings in source order.
    pub warnings: Vec<SourceRangeMixin<ConvertWarning>>,
}

impl KshOutput {
    /// Warnings most recent first, for interfaces that show the latest
    /// problem on top.
    pub fn recent_warnings(&self) -> impl DoubleEndedIterator<Item = &SourceRangeMixin<ConvertWarning>> {
        self.warnings.iter().rev()
    }
}

/// Converts KSH source text into a song entry and chart.
pub fn parse_ksh(source: &str) -> Result<KshOutput, ConvertError> {
    let lexed = lex::lex(source);
    let (song, chart, warnings) = parse::build_chart(&lexed)?;
    Ok(KshOutput {
        song,
        chart,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn minimal_chart_converts() {
        let source = "title=x\nartist=y\nt=120\nver=167\n--\n1000|00|--\n0000|00|--\n0000|00|--\n0000|00|--\n--\n";
        let output = parse_ksh(source).unwrap();
        assert_eq!(output.song.title, "x");
        assert_eq!(output.chart.bts[0].len(), 1);
        assert_eq!(output.warnings, vec![]);
    }

    #[test]
    fn recent_warnings_run_backwards() {
        let source = "title=x\nartist=y\nt=120\nver=167\n--\njunk line\nmore junk\n0000|00|--\n--\n";
        let output = parse_ksh(source).unwrap();
        let spans: Vec<_> = output
            .recent_warnings()
            .map(SourceRangeMixin::as_span)
            .collect();
        assert_eq!(spans.len(), 2);
        assert!(spans[0].0 > spans[1].0);
    }

    #[test]
    fn version_gate() {
        let source = "title=x\nartist=y\nt=120\nver=159\n--\n--\n";
        assert_eq!(
            parse_ksh(source).unwrap_err(),
            ConvertError::UnsupportedVersion(159)
        );
    }
}
