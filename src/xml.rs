//! Music database XML serialization.
//!
//! [`write_xml`] renders one `<music>` element for the converted chart,
//! ready to splice into the game's `music_db.xml`. Metadata fields are
//! validated on the way out; a bad value produces a [`MetadataWarning`]
//! but is still written, so the export never fails over cosmetics.

use std::fmt::{self, Write};

use thiserror::Error;

use crate::ksh::command::DifficultySlot;
use crate::ksh::model::{ChartInfo, SongInfo};
use crate::ksh::stats::{self, Notecounts, Radar};

/// A metadata field that will not survive the game's own import checks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MetadataWarning {
    /// The ascii label may only contain `a-z`, `0-9` and `_`.
    #[error("ascii label {0:?} must match [a-z0-9_]+")]
    InvalidAsciiLabel(String),
    /// The distribution date must be eight digits, `YYYYMMDD`.
    #[error("release date {0:?} must be eight digits")]
    InvalidReleaseDate(String),
    /// Yomigana fields must be full-width katakana.
    #[error("{field} yomigana {value:?} must be full-width katakana")]
    InvalidYomigana {
        /// Which yomigana field was rejected.
        field: &'static str,
        /// The offending value.
        value: String,
    },
}

/// File name the game expects for this chart's metadata,
/// `{id:04}_{ascii_label}_{slot shorthand}.xml`.
#[must_use]
pub fn xml_filename(song: &SongInfo, chart: &ChartInfo) -> String {
    format!(
        "{:04}_{}_{}.xml",
        song.id,
        song.ascii_label,
        chart.difficulty.shorthand()
    )
}

/// Checks the fields the game's importer is strict about. Failures are
/// advisory; the document is produced either way.
#[must_use]
pub fn validate_metadata(song: &SongInfo) -> Vec<MetadataWarning> {
    let mut warnings = Vec::new();
    if song.ascii_label.is_empty()
        || !song
            .ascii_label
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        warnings.push(MetadataWarning::InvalidAsciiLabel(song.ascii_label.clone()));
    }
    if song.release_date.len() != 8 || !song.release_date.chars().all(|c| c.is_ascii_digit()) {
        warnings.push(MetadataWarning::InvalidReleaseDate(
            song.release_date.clone(),
        ));
    }
    for (field, value) in [
        ("title", &song.title_yomigana),
        ("artist", &song.artist_yomigana),
    ] {
        if !value.is_empty() && !value.chars().all(is_katakana) {
            warnings.push(MetadataWarning::InvalidYomigana {
                field,
                value: value.clone(),
            });
        }
    }
    warnings
}

fn is_katakana(c: char) -> bool {
    ('\u{30A1}'..='\u{30FF}').contains(&c)
}

/// Escapes a text node. The game's parser additionally chokes on bare
/// apostrophes and quotes, so all five entities are written out.
fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Renders the `<music>` element and reports any metadata the game would
/// reject. Note counts and the radar are derived from the chart on the
/// way out.
#[must_use]
pub fn write_xml(song: &SongInfo, chart: &ChartInfo) -> (String, Vec<MetadataWarning>) {
    let warnings = validate_metadata(song);
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = render(&mut out, song, chart);
    (out, warnings)
}

fn render(out: &mut String, song: &SongInfo, chart: &ChartInfo) -> fmt::Result {
    let counts = stats::notecounts(chart);
    let radar = stats::radar(chart);

    writeln!(out, "  <music id=\"{}\">", song.id)?;
    out.push_str("    <info>\n");
    writeln!(out, "      <label>{}</label>", song.id)?;
    writeln!(
        out,
        "      <title_name>{}</title_name>",
        escape(&song.title)
    )?;
    writeln!(
        out,
        "      <title_yomigana>{}</title_yomigana>",
        song.title_yomigana
    )?;
    writeln!(
        out,
        "      <artist_name>{}</artist_name>",
        escape(&song.artist)
    )?;
    writeln!(
        out,
        "      <artist_yomigana>{}</artist_yomigana>",
        song.artist_yomigana
    )?;
    writeln!(out, "      <ascii>{}</ascii>", song.ascii_label)?;
    writeln!(
        out,
        "      <bpm_max __type=\"u32\">{:.0}</bpm_max>",
        song.max_bpm * 100.0
    )?;
    writeln!(
        out,
        "      <bpm_min __type=\"u32\">{:.0}</bpm_min>",
        song.min_bpm * 100.0
    )?;
    writeln!(
        out,
        "      <distribution_date __type=\"u32\">{}</distribution_date>",
        song.release_date
    )?;
    writeln!(
        out,
        "      <volume __type=\"u16\">{}</volume>",
        song.music_volume
    )?;
    writeln!(out, "      <bg_no __type=\"u16\">{}</bg_no>", song.background)?;
    out.push_str("      <genre __type=\"u8\">32</genre>\n");
    out.push_str("      <is_fixed __type=\"u8\">1</is_fixed>\n");
    out.push_str("      <version __type=\"u8\">6</version>\n");
    out.push_str("      <demo_pri __type=\"s8\">-2</demo_pri>\n");
    writeln!(
        out,
        "      <inf_ver __type=\"u8\">{}</inf_ver>",
        song.inf_ver.to_xml()
    )?;
    out.push_str("    </info>\n");
    out.push_str("    <difficulty>\n");
    for slot in DifficultySlot::ALL {
        writeln!(out, "      <{}>", slot.tag())?;
        if chart.difficulty == slot {
            write_difficulty(out, chart, counts, radar)?;
        } else {
            write_dummy_difficulty(out);
        }
        writeln!(out, "      </{}>", slot.tag())?;
    }
    out.push_str("    </difficulty>\n");
    out.push_str("  </music>\n");
    Ok(())
}

fn write_difficulty(
    out: &mut String,
    chart: &ChartInfo,
    counts: Notecounts,
    radar: Radar,
) -> fmt::Result {
    writeln!(out, "        <difnum __type=\"u8\">{}</difnum>", chart.level)?;
    writeln!(
        out,
        "        <illustrator>{}</illustrator>",
        escape(&chart.illustrator)
    )?;
    writeln!(
        out,
        "        <effected_by>{}</effected_by>",
        escape(&chart.effector)
    )?;
    out.push_str("        <price __type=\"s32\">-1</price>\n");
    out.push_str("        <limited __type=\"u8\">3</limited>\n");
    out.push_str("        <jacket_print __type=\"s32\">-2</jacket_print>\n");
    out.push_str("        <jacket_mask __type=\"s32\">0</jacket_mask>\n");
    writeln!(
        out,
        "        <max_exscore __type=\"s32\">{}</max_exscore>",
        counts.max_ex_score()
    )?;
    out.push_str("        <radar>\n");
    writeln!(
        out,
        "          <notes __type=\"u8\">{}</notes>",
        radar.notes
    )?;
    writeln!(out, "          <peak __type=\"u8\">{}</peak>", radar.peak)?;
    writeln!(
        out,
        "          <tsumami __type=\"u8\">{}</tsumami>",
        radar.long
    )?;
    out.push_str("          <tricky __type=\"u8\">0</tricky>\n");
    writeln!(
        out,
        "          <hand-trip __type=\"u8\">{}</hand-trip>",
        radar.hand_trip
    )?;
    writeln!(
        out,
        "          <one-hand __type=\"u8\">{}</one-hand>",
        radar.one_hand
    )?;
    out.push_str("        </radar>\n");
    Ok(())
}

fn write_dummy_difficulty(out: &mut String) {
    out.push_str("        <difnum __type=\"u8\">0</difnum>\n");
    out.push_str("        <illustrator>dummy</illustrator>\n");
    out.push_str("        <effected_by>dummy</effected_by>\n");
    out.push_str("        <price __type=\"s32\">-1</price>\n");
    out.push_str("        <limited __type=\"u8\">3</limited>\n");
    out.push_str("        <jacket_print __type=\"s32\">-2</jacket_print>\n");
    out.push_str("        <jacket_mask __type=\"s32\">0</jacket_mask>\n");
    out.push_str("        <max_exscore __type=\"s32\">0</max_exscore>\n");
    out.push_str("        <radar>\n");
    out.push_str("          <notes __type=\"u8\">0</notes>\n");
    out.push_str("          <peak __type=\"u8\">0</peak>\n");
    out.push_str("          <tsumami __type=\"u8\">0</tsumami>\n");
    out.push_str("          <tricky __type=\"u8\">0</tricky>\n");
    out.push_str("          <hand-trip __type=\"u8\">0</hand-trip>\n");
    out.push_str("          <one-hand __type=\"u8\">0</one-hand>\n");
    out.push_str("        </radar>\n");
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn song() -> SongInfo {
        SongInfo {
            id: 256,
            title: "Deadly Force <Cut> & More".into(),
            title_yomigana: "デッドリーフォース".into(),
            artist: "\"someone\"".into(),
            ascii_label: "deadly_force".into(),
            release_date: "20260826".into(),
            min_bpm: 150.0,
            max_bpm: 180.0,
            ..SongInfo::default()
        }
    }

    #[test]
    fn text_fields_are_escaped() {
        let (xml, warnings) = write_xml(&song(), &ChartInfo::default());
        assert_eq!(warnings, vec![]);
        assert!(xml.contains("<title_name>Deadly Force &lt;Cut&gt; &amp; More</title_name>"));
        assert!(xml.contains("<artist_name>&quot;someone&quot;</artist_name>"));
        assert!(xml.contains("<bpm_max __type=\"u32\">18000</bpm_max>"));
        assert!(xml.contains("<bpm_min __type=\"u32\">15000</bpm_min>"));
    }

    #[test]
    fn invalid_metadata_warns_but_still_exports() {
        let mut bad = song();
        bad.ascii_label = "Deadly Force!".into();
        bad.release_date = "2026-08-26".into();
        bad.title_yomigana = "ﾃﾞｯﾄﾞﾘｰ".into();

        let (xml, warnings) = write_xml(&bad, &ChartInfo::default());
        assert_eq!(warnings.len(), 3);
        assert!(xml.contains("<ascii>Deadly Force!</ascii>"));
        assert!(xml.contains("2026-08-26"));
    }

    #[test]
    fn only_the_occupied_slot_carries_chart_data() {
        let mut chart = ChartInfo::default();
        chart.level = 17;
        chart.illustrator = "someone".into();
        let (xml, _) = write_xml(&song(), &chart);

        // Chart sits in the MAXIMUM slot by default.
        let maximum = &xml[xml.find("<maximum>").unwrap()..];
        assert!(maximum.contains("<difnum __type=\"u8\">17</difnum>"));
        let novice = &xml[xml.find("<novice>").unwrap()..xml.find("</novice>").unwrap()];
        assert!(novice.contains("<difnum __type=\"u8\">0</difnum>"));
        assert!(novice.contains("<illustrator>dummy</illustrator>"));
    }

    #[test]
    fn filename_follows_the_id_label_slot_convention() {
        assert_eq!(
            xml_filename(&song(), &ChartInfo::default()),
            "0256_deadly_force_5m.xml"
        );
    }
}
