//! Line-level reading of KSH source text.
//!
//! The lexer never fails; lines it cannot make sense of are skipped and
//! reported as [`LexWarning`]s with their source byte range. Splitting the
//! file into header, measures and footer definitions happens here, so the
//! later stages only ever see classified lines.

pub mod token;

use thiserror::Error;

use super::command::mixin::{SourceRangeMixin, SourceRangeMixinExt};
use token::{
    BodyLine, BtChar, ChartLine, Definition, DefinitionKind, FxChar, SpinDir, SpinLead, SpinMark,
    VolChar,
};

/// A line the lexer had to skip or truncate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LexWarning {
    /// A body line that is neither a chart line, an option, a comment nor
    /// a measure delimiter.
    #[error("malformed body line")]
    MalformedBodyLine,
    /// A header line without a `=` separator.
    #[error("malformed header line")]
    MalformedHeaderLine,
    /// A chart line carried a spin suffix that could not be read.
    #[error("malformed spin suffix")]
    MalformedSpinSuffix,
    /// A `#define_fx` or `#define_filter` line without a name.
    #[error("definition line has no name")]
    UnnamedDefinition,
}

/// One measure of classified body lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Measure<'a> {
    /// Lines in source order.
    pub lines: Vec<SourceRangeMixin<BodyLine<'a>>>,
}

impl Measure<'_> {
    /// How many chart lines this measure subdivides into.
    pub fn chart_line_count(&self) -> usize {
        self.lines
            .iter()
            .filter(|line| matches!(line.content(), BodyLine::Chart(_)))
            .count()
    }
}

/// The lexed structure of a KSH file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LexOutput<'a> {
    /// Header `key=value` pairs, in source order.
    pub header: Vec<SourceRangeMixin<(&'a str, &'a str)>>,
    /// Measures between `--` delimiters.
    pub measures: Vec<Measure<'a>>,
    /// `#define_fx` and `#define_filter` footer lines.
    pub definitions: Vec<SourceRangeMixin<Definition<'a>>>,
    /// Skipped or truncated lines.
    pub warnings: Vec<SourceRangeMixin<LexWarning>>,
}

/// Splits KSH source text into header pairs, measures and definitions.
pub fn lex(source: &str) -> LexOutput<'_> {
    let mut out = LexOutput::default();
    let mut in_header = true;
    let mut measure = Measure::default();

    let mut offset = 0;
    for raw_line in source.split_inclusive('\n') {
        let start = offset;
        offset += raw_line.len();
        let mut line = raw_line.trim_end_matches('\n').trim_end_matches('\r');
        let mut start = start;
        if start == 0 {
            if let Some(stripped) = line.strip_prefix('\u{feff}') {
                start += '\u{feff}'.len_utf8();
                line = stripped;
            }
        }
        let range = (start, start + line.len());

        if line == "--" {
            if in_header {
                in_header = false;
            } else {
                out.measures.push(std::mem::take(&mut measure));
            }
            continue;
        }
        if line.is_empty() {
            continue;
        }

        if let Some(rest) = line.strip_prefix("#define_fx ") {
            lex_definition(DefinitionKind::Effect, rest, range, &mut out);
            continue;
        }
        if let Some(rest) = line.strip_prefix("#define_filter ") {
            lex_definition(DefinitionKind::Filter, rest, range, &mut out);
            continue;
        }

        if in_header {
            if line.starts_with("//") {
                continue;
            }
            match line.split_once('=') {
                Some((key, value)) => out.header.push((key, value).into_wrapper_range(range)),
                None => out
                    .warnings
                    .push(LexWarning::MalformedHeaderLine.into_wrapper_range(range)),
            }
            continue;
        }

        if let Some(comment) = line.strip_prefix("//") {
            measure
                .lines
                .push(BodyLine::Comment(comment).into_wrapper_range(range));
        } else if let Some(chart) = lex_chart_line(line, range, &mut out.warnings) {
            measure
                .lines
                .push(BodyLine::Chart(chart).into_wrapper_range(range));
        } else if let Some((key, value)) = line.split_once('=') {
            measure
                .lines
                .push(BodyLine::Option { key, value }.into_wrapper_range(range));
        } else {
            out.warnings
                .push(LexWarning::MalformedBodyLine.into_wrapper_range(range));
        }
    }

    // A trailing measure without a closing delimiter still counts.
    if !in_header && !measure.lines.is_empty() {
        out.measures.push(measure);
    }
    out
}

fn lex_definition<'a>(
    kind: DefinitionKind,
    rest: &'a str,
    range: (usize, usize),
    out: &mut LexOutput<'a>,
) {
    let mut words = rest.split_whitespace();
    let Some(name) = words.next() else {
        out.warnings
            .push(LexWarning::UnnamedDefinition.into_wrapper_range(range));
        return;
    };
    let params = words
        .flat_map(|word| word.split(';'))
        .filter_map(|pair| pair.split_once('='))
        .collect();
    out.definitions
        .push(Definition { kind, name, params }.into_wrapper_range(range));
}

fn lex_chart_line(
    line: &str,
    range: (usize, usize),
    warnings: &mut Vec<SourceRangeMixin<LexWarning>>,
) -> Option<ChartLine> {
    let bytes = line.as_bytes();
    if bytes.len() < 10 || bytes[4] != b'|' || bytes[7] != b'|' {
        return None;
    }
    let mut chart = ChartLine::default();
    for (slot, &byte) in chart.bts.iter_mut().zip(&bytes[..4]) {
        *slot = match byte {
            b'0' => BtChar::None,
            b'1' => BtChar::Chip,
            b'2' => BtChar::Hold,
            _ => return None,
        };
    }
    for (slot, &byte) in chart.fxs.iter_mut().zip(&bytes[5..7]) {
        *slot = match byte {
            b'0' => FxChar::None,
            b'1' => FxChar::Hold,
            b'2' => FxChar::Chip,
            _ => return None,
        };
    }
    for (slot, &byte) in chart.vols.iter_mut().zip(&bytes[8..10]) {
        *slot = match byte {
            b'-' => VolChar::None,
            b':' => VolChar::Connect,
            byte if byte.is_ascii_graphic() => VolChar::Position(byte as char),
            _ => return None,
        };
    }
    let suffix = &line[10..];
    if !suffix.is_empty() {
        match lex_spin(suffix) {
            Some(spin) => chart.spin = Some(spin),
            None => warnings.push(LexWarning::MalformedSpinSuffix.into_wrapper_range(range)),
        }
    }
    Some(chart)
}

fn lex_spin(suffix: &str) -> Option<SpinMark> {
    let mut chars = suffix.chars();
    let lead = match chars.next()? {
        '@' => SpinLead::Full,
        'S' => SpinLead::Half,
        _ => return None,
    };
    let dir = match chars.next()? {
        '(' | '<' => SpinDir::Left,
        ')' | '>' => SpinDir::Right,
        _ => return None,
    };
    let digits = chars.as_str();
    let length = if digits.is_empty() {
        192
    } else {
        digits.parse().ok()?
    };
    Some(SpinMark { lead, dir, length })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const SOURCE: &str = "\u{feff}title=song\nartist=someone\n--\n0000|00|--\n1021|12|0o\n--\nt=150\n2000|00|:-@)384\n--\n#define_fx LoFx type=Retrigger;waveLength=1/8\n";

    #[test]
    fn splits_header_measures_and_definitions() {
        let out = lex(SOURCE);

        assert_eq!(
            out.header
                .iter()
                .map(|pair| *pair.content())
                .collect::<Vec<_>>(),
            vec![("title", "song"), ("artist", "someone")]
        );
        assert_eq!(out.measures.len(), 2);
        assert_eq!(out.measures[0].chart_line_count(), 2);
        assert_eq!(out.measures[1].chart_line_count(), 1);
        assert_eq!(out.warnings, vec![]);

        let definition = out.definitions[0].content();
        assert_eq!(definition.kind, DefinitionKind::Effect);
        assert_eq!(definition.name, "LoFx");
        assert_eq!(
            definition.params,
            vec![("type", "Retrigger"), ("waveLength", "1/8")]
        );
    }

    #[test]
    fn chart_lines_decode_slots_and_spins() {
        let out = lex(SOURCE);
        let BodyLine::Chart(line) = out.measures[0].lines[1].content() else {
            panic!("expected a chart line");
        };
        assert_eq!(
            line.bts,
            [BtChar::Chip, BtChar::None, BtChar::Hold, BtChar::Chip]
        );
        assert_eq!(line.fxs, [FxChar::Hold, FxChar::Chip]);
        assert_eq!(
            line.vols,
            [VolChar::Position('0'), VolChar::Position('o')]
        );
        assert_eq!(line.spin, None);

        let BodyLine::Chart(line) = out.measures[1].lines[1].content() else {
            panic!("expected a chart line");
        };
        assert_eq!(line.vols, [VolChar::Connect, VolChar::None]);
        assert_eq!(
            line.spin,
            Some(SpinMark {
                lead: SpinLead::Full,
                dir: SpinDir::Right,
                length: 384,
            })
        );
    }

    #[test]
    fn junk_lines_are_warned_and_skipped() {
        let out = lex("title=x\nnot a header\n--\nxyz\n0000|00|--\n--\n");
        assert_eq!(
            out.warnings
                .iter()
                .map(|warning| warning.content().clone())
                .collect::<Vec<_>>(),
            vec![LexWarning::MalformedHeaderLine, LexWarning::MalformedBodyLine]
        );
        assert_eq!(out.measures[0].chart_line_count(), 1);
    }

    #[test]
    fn option_and_comment_lines_keep_their_text() {
        let out = lex("title=x\n--\nt=150\n//lightFXL=2\n0000|00|--\n--\n");
        let lines = &out.measures[0].lines;
        assert_eq!(
            lines[0].content(),
            &BodyLine::Option {
                key: "t",
                value: "150"
            }
        );
        assert_eq!(lines[1].content(), &BodyLine::Comment("lightFXL=2"));
    }
}
