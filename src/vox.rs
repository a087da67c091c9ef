//! VOX chart serialization.
//!
//! [`write_vox`] renders a converted chart into the section-based VOX text
//! container: named `#SECTION` blocks in a fixed canonical order, each
//! terminated by `#END` and holding tab-separated records keyed by
//! `mmm,dd,ss` timepoints.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Write};

use itertools::Itertools;

use crate::ksh::command::{
    Lane, SegmentFlag,
    time::{TimePoint, length_to_ticks},
};
use crate::ksh::model::{BtNote, ChartInfo, FxNote, SongInfo, VolPoint};

/// The value of the FORMAT VERSION section.
const VOX_FORMAT_VERSION: u32 = 12;

const BANNER: &str = "//====================================\n";

/// File name the game expects for this chart,
/// `{id:04}_{ascii_label}_{slot shorthand}.vox`.
#[must_use]
pub fn vox_filename(song: &SongInfo, chart: &ChartInfo) -> String {
    format!(
        "{:04}_{}_{}.vox",
        song.id,
        song.ascii_label,
        chart.difficulty.shorthand()
    )
}

/// Renders the whole VOX document. `source_name` only appears in the
/// header comment, crediting the file the chart was converted from.
#[must_use]
pub fn write_vox(song: &SongInfo, chart: &ChartInfo, source_name: &str) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = render(&mut out, song, chart, source_name);
    out
}

fn render(out: &mut String, song: &SongInfo, chart: &ChartInfo, source_name: &str) -> fmt::Result {
    out.push_str(BANNER);
    out.push_str("// SOUND VOLTEX OUTPUT TEXT FILE\n");
    writeln!(out, "// Converted from {source_name}")?;
    out.push_str(BANNER);
    out.push('\n');

    section(out, "FORMAT VERSION", |out| {
        writeln!(out, "{VOX_FORMAT_VERSION}")
    })?;

    section(out, "BEAT INFO", |out| {
        for (&at, timesig) in &chart.timesigs {
            writeln!(
                out,
                "{}\t{}\t{}",
                chart.timepoint_to_vox(at),
                timesig.upper,
                timesig.lower
            )?;
        }
        Ok(())
    })?;

    section(out, "BPM INFO", |out| write_bpm_records(out, song, chart))?;

    section(out, "TILT MODE INFO", |out| {
        let mut previous = None;
        for (&at, &mode) in &chart.tilts {
            if previous != Some(mode) {
                writeln!(out, "{}\t{}", chart.timepoint_to_vox(at), mode.to_vox())?;
            }
            previous = Some(mode);
        }
        Ok(())
    })?;

    section(out, "LYRIC INFO", |_| Ok(()))?;

    section(out, "END POSITION", |out| {
        writeln!(out, "{:03},01,00", chart.end_measure)
    })?;

    section(out, "TAB EFFECT INFO", |out| {
        for filter in &chart.filter_list {
            out.push_str(&filter.to_vox_string());
            out.push('\n');
        }
        Ok(())
    })?;

    section(out, "FXBUTTON EFFECT INFO", |out| {
        for entry in &chart.effect_list {
            out.push_str(&entry.to_vox_string());
            out.push('\n');
        }
        Ok(())
    })?;

    section(out, "TAB PARAM ASSIGN INFO", |out| {
        for autotab in &chart.autotab_list {
            out.push_str(&autotab.to_vox_string());
        }
        Ok(())
    })?;

    section(out, "REVERB EFFECT PARAM", |_| Ok(()))?;

    out.push_str(BANNER);
    out.push_str("// TRACK INFO\n");
    out.push_str(BANNER);
    out.push('\n');

    for lane in Lane::ALL {
        let name = format!("TRACK{}", lane.track_number());
        section(out, &name, |out| match lane {
            Lane::VolL | Lane::VolR => match chart.vol_lane(lane) {
                Some(points) => write_vol_records(out, chart, points, true),
                None => Ok(()),
            },
            Lane::FxL | Lane::FxR => match chart.fx_lane(lane) {
                Some(notes) => write_fx_records(out, chart, notes),
                None => Ok(()),
            },
            _ => match chart.bt_lane(lane) {
                Some(notes) => write_bt_records(out, chart, notes),
                None => Ok(()),
            },
        })?;
        out.push_str(BANNER);
        out.push('\n');
    }

    section(out, "TRACK AUTO TAB", |out| {
        for (&at, info) in &chart.autotab_infos {
            writeln!(
                out,
                "{}\t{}\t{}",
                chart.timepoint_to_vox(at),
                length_to_ticks(info.duration),
                info.which + 2
            )?;
        }
        Ok(())
    })?;
    out.push_str(BANNER);
    out.push('\n');

    section(out, "TRACK ORIGINAL L", |out| {
        match chart.vol_lane(Lane::VolL) {
            Some(points) => write_vol_records(out, chart, points, false),
            None => Ok(()),
        }
    })?;
    section(out, "TRACK ORIGINAL R", |out| {
        match chart.vol_lane(Lane::VolR) {
            Some(points) => write_vol_records(out, chart, points, false),
            None => Ok(()),
        }
    })?;

    out.push_str(BANNER);
    out.push_str("// SPCONTROLER INFO\n");
    out.push_str(BANNER);
    out.push('\n');

    section(out, "SPCONTROLER", |out| {
        out.push_str("001,01,00\tRealize\t3\t0\t36.12\t60.12\t110.12\t0.00\n");
        out.push_str("001,01,00\tRealize\t4\t0\t0.62\t0.72\t1.03\t0.00\n");
        out.push_str("001,01,00\tAIRL_ScaX\t1\t0\t0.00\t1.00\t0.00\t0.00\n");
        out.push_str("001,01,00\tAIRR_ScaX\t1\t0\t0.00\t2.00\t0.00\t0.00\n");
        write_bar_records(out, chart)
    })?;

    write_script_sections(out, chart)?;

    out.push_str(BANNER);
    Ok(())
}

fn section(
    out: &mut String,
    name: &str,
    body: impl FnOnce(&mut String) -> fmt::Result,
) -> fmt::Result {
    writeln!(out, "#{name}")?;
    body(out)?;
    out.push_str("#END\n\n");
    Ok(())
}

/// BPM and stop records share one section. A stop suspends scrolling, so
/// its records repeat the surrounding BPM with a trailing `-` until the
/// matching release.
fn write_bpm_records(out: &mut String, song: &SongInfo, chart: &ChartInfo) -> fmt::Result {
    let timepoints: BTreeSet<TimePoint> = chart
        .bpms
        .keys()
        .chain(chart.stops.keys())
        .copied()
        .collect();
    let mut current_bpm = song.min_bpm;
    let mut stopped = false;
    for at in timepoints {
        if let Some(&bpm) = chart.bpms.get(&at) {
            current_bpm = bpm;
        }
        if let Some(&stop) = chart.stops.get(&at) {
            stopped = stop;
        }
        write!(out, "{}\t{current_bpm:.2}\t4", chart.timepoint_to_vox(at))?;
        if stopped {
            out.push('-');
        }
        out.push('\n');
    }
    Ok(())
}

fn write_bt_records(
    out: &mut String,
    chart: &ChartInfo,
    notes: &BTreeMap<TimePoint, BtNote>,
) -> fmt::Result {
    for (&at, note) in notes {
        writeln!(
            out,
            "{}\t{}\t0",
            chart.timepoint_to_vox(at),
            length_to_ticks(note.duration)
        )?;
    }
    Ok(())
}

fn write_fx_records(
    out: &mut String,
    chart: &ChartInfo,
    notes: &BTreeMap<TimePoint, FxNote>,
) -> fmt::Result {
    for (&at, note) in notes {
        // Chips carry a keysound id; holds reference an effect entry,
        // offset past the two reserved slots.
        let special = if note.is_chip() {
            note.special
        } else {
            note.special + 2
        };
        writeln!(
            out,
            "{}\t{}\t{}",
            chart.timepoint_to_vox(at),
            length_to_ticks(note.duration),
            special
        )?;
    }
    Ok(())
}

/// TRACK1/8 carry the eased point stream; TRACK ORIGINAL L/R repeat it
/// without the interpolated points.
fn write_vol_records(
    out: &mut String,
    chart: &ChartInfo,
    points: &BTreeMap<TimePoint, VolPoint>,
    apply_ease: bool,
) -> fmt::Result {
    for (&at, point) in points {
        if !apply_ease && point.interpolated {
            continue;
        }
        let timepoint = chart.timepoint_to_vox(at);
        let wide = if point.wide { 2 } else { 1 };
        if point.is_slam() {
            let start_flag = if point.segment.contains(SegmentFlag::START) {
                1
            } else {
                0
            };
            let end_flag = if point.segment.contains(SegmentFlag::END) {
                2
            } else {
                0
            };
            writeln!(
                out,
                "{timepoint}\t{:.6}\t{start_flag}\t{}\t{}\t{wide}\t0\t{}\t{}",
                f64::from(point.start),
                point.spin_type.to_vox(),
                point.filter.to_vox(),
                point.ease.to_vox(),
                point.spin_duration
            )?;
            writeln!(
                out,
                "{timepoint}\t{:.6}\t{end_flag}\t0\t{}\t{wide}\t0\t{}\t0",
                f64::from(point.end),
                point.filter.to_vox(),
                point.ease.to_vox()
            )?;
        } else {
            writeln!(
                out,
                "{timepoint}\t{:.6}\t{}\t{}\t{}\t{wide}\t0\t{}\t{}",
                f64::from(point.start),
                point.segment.to_vox(),
                point.spin_type.to_vox(),
                point.filter.to_vox(),
                point.ease.to_vox(),
                point.spin_duration
            )?;
        }
    }
    Ok(())
}

/// Bar-line control lives in SPCONTROLER: `BAROFF` suspends the bar lines
/// and `BAR` restores them or forces a single one while suspended.
fn write_bar_records(out: &mut String, chart: &ChartInfo) -> fmt::Result {
    let mut records: BTreeMap<TimePoint, &str> = BTreeMap::new();
    for (&at, &hidden) in &chart.bar_toggles {
        records.insert(at, if hidden { "BAROFF" } else { "BAR" });
    }
    for &at in &chart.forced_bars {
        records.entry(at).or_insert("BAR");
    }
    for (at, keyword) in records {
        writeln!(
            out,
            "{}\t{keyword}\t2\t0\t0.00\t0.00\t0.00\t0.00",
            chart.timepoint_to_vox(at)
        )?;
    }
    Ok(())
}

/// SCRIPT_DEFINE declares every referenced script id once; a
/// SCRIPTED_TRACK section per button lane then lists the note timepoints
/// the active ids apply to. Laser lanes cannot be scripted.
fn write_script_sections(out: &mut String, chart: &ChartInfo) -> fmt::Result {
    let ids: BTreeSet<u32> = chart
        .scripts
        .values()
        .flat_map(BTreeMap::values)
        .flatten()
        .copied()
        .collect();

    section(out, "SCRIPT_DEFINE", |out| {
        out.push_str("// Define your scripts here!\n");
        for id in &ids {
            writeln!(out, "@SCRIPTSTART {id}")?;
            out.push_str("@SCRIPTEND\n");
        }
        Ok(())
    })?;

    for lane in Lane::ALL {
        if matches!(lane, Lane::VolL | Lane::VolR) {
            continue;
        }
        let name = format!("SCRIPTED_TRACK{}", lane.track_number());
        section(out, &name, |out| {
            let Some(changes) = chart.scripts.get(&lane) else {
                return Ok(());
            };
            let note_times: Vec<TimePoint> = match lane {
                Lane::FxL | Lane::FxR => chart
                    .fx_lane(lane)
                    .map(|notes| notes.keys().copied().collect())
                    .unwrap_or_default(),
                _ => chart
                    .bt_lane(lane)
                    .map(|notes| notes.keys().copied().collect())
                    .unwrap_or_default(),
            };
            let mut changes = changes.iter().peekable();
            let mut active: &[u32] = &[];
            let mut next_change = changes.peek().map(|&(&at, _)| at);
            for at in note_times {
                while next_change.is_some_and(|change| change <= at) {
                    if let Some((_, ids)) = changes.next() {
                        active = ids;
                    }
                    next_change = changes.peek().map(|&(&at, _)| at);
                }
                if active.is_empty() {
                    continue;
                }
                writeln!(
                    out,
                    "{}\t{}",
                    chart.timepoint_to_vox(at),
                    active.iter().join(",")
                )?;
            }
            Ok(())
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::ksh::command::SpinType;
    use crate::ksh::command::time::NoteLength;
    use crate::ksh::model::BtNote;

    use super::*;

    fn minimal() -> (SongInfo, ChartInfo) {
        let song = SongInfo {
            id: 1337,
            ascii_label: "test_song".into(),
            min_bpm: 120.0,
            max_bpm: 120.0,
            ..SongInfo::default()
        };
        (song, ChartInfo::default())
    }

    #[test]
    fn filename_follows_the_id_label_slot_convention() {
        let (song, chart) = minimal();
        assert_eq!(vox_filename(&song, &chart), "1337_test_song_5m.vox");
    }

    #[test]
    fn sections_appear_in_canonical_order() {
        let (song, chart) = minimal();
        let vox = write_vox(&song, &chart, "test.ksh");

        let names = [
            "#FORMAT VERSION",
            "#BEAT INFO",
            "#BPM INFO",
            "#TILT MODE INFO",
            "#LYRIC INFO",
            "#END POSITION",
            "#TAB EFFECT INFO",
            "#FXBUTTON EFFECT INFO",
            "#TAB PARAM ASSIGN INFO",
            "#REVERB EFFECT PARAM",
            "#TRACK1",
            "#TRACK8",
            "#TRACK AUTO TAB",
            "#TRACK ORIGINAL L",
            "#TRACK ORIGINAL R",
            "#SPCONTROLER",
            "#SCRIPT_DEFINE",
            "#SCRIPTED_TRACK7",
        ];
        let mut last = 0;
        for name in names {
            let position = vox[last..]
                .find(&format!("{name}\n"))
                .unwrap_or_else(|| panic!("missing section {name}"));
            last += position;
        }
    }

    #[test]
    fn bpm_records_repeat_during_stops() {
        let (song, mut chart) = minimal();
        chart
            .stops
            .insert(TimePoint::new(2, NoteLength::new(1, 4)), true);
        chart
            .stops
            .insert(TimePoint::new(2, NoteLength::new(1, 2)), false);

        let vox = write_vox(&song, &chart, "test.ksh");
        assert!(vox.contains("001,01,00\t120.00\t4\n"));
        assert!(vox.contains("002,02,00\t120.00\t4-\n"));
        assert!(vox.contains("002,03,00\t120.00\t4\n"));
    }

    #[test]
    fn slams_render_as_two_records() {
        let (song, mut chart) = minimal();
        let mut slam = VolPoint::new(0, SegmentFlag::START);
        slam.end = 127;
        slam.spin_type = SpinType::SingleSpin;
        slam.spin_duration = 11;
        chart.vols[0].insert(TimePoint::measure_start(2), slam);
        chart.vols[0].insert(
            TimePoint::new(2, NoteLength::new(1, 4)),
            VolPoint::new(127, SegmentFlag::END),
        );

        let vox = write_vox(&song, &chart, "test.ksh");
        assert!(vox.contains("002,01,00\t0.000000\t1\t1\t0\t1\t0\t0\t11\n"));
        assert!(vox.contains("002,01,00\t127.000000\t0\t0\t0\t1\t0\t0\t0\n"));
    }

    #[test]
    fn original_tracks_drop_interpolated_points() {
        let (song, mut chart) = minimal();
        chart.vols[0].insert(
            TimePoint::measure_start(2),
            VolPoint::new(0, SegmentFlag::START),
        );
        let mut inserted = VolPoint::new(90, SegmentFlag::MIDDLE);
        inserted.interpolated = true;
        chart.vols[0].insert(TimePoint::new(2, NoteLength::new(1, 8)), inserted);
        chart.vols[0].insert(
            TimePoint::new(2, NoteLength::new(1, 4)),
            VolPoint::new(127, SegmentFlag::END),
        );

        let vox = write_vox(&song, &chart, "test.ksh");
        let track1 = &vox[vox.find("#TRACK1\n").unwrap()..vox.find("#TRACK2\n").unwrap()];
        let original = &vox
            [vox.find("#TRACK ORIGINAL L\n").unwrap()..vox.find("#TRACK ORIGINAL R\n").unwrap()];
        assert!(track1.contains("\t90.000000\t"));
        assert!(!original.contains("\t90.000000\t"));
    }

    #[test]
    fn scripted_notes_list_their_active_ids() {
        let (song, mut chart) = minimal();
        chart.bts[0].insert(TimePoint::measure_start(2), BtNote::chip());
        chart.bts[0].insert(TimePoint::measure_start(3), BtNote::chip());
        chart.bts[0].insert(TimePoint::measure_start(5), BtNote::chip());
        let changes = chart.scripts.entry(Lane::BtA).or_default();
        changes.insert(TimePoint::measure_start(3), vec![7, 9]);
        changes.insert(TimePoint::measure_start(4), Vec::new());

        let vox = write_vox(&song, &chart, "test.ksh");
        assert!(vox.contains("@SCRIPTSTART 7\n"));
        assert!(vox.contains("@SCRIPTSTART 9\n"));
        let scripted = &vox[vox.find("#SCRIPTED_TRACK3\n").unwrap()..];
        let scripted = &scripted[..scripted.find("#END").unwrap()];
        assert_eq!(scripted, "#SCRIPTED_TRACK3\n003,01,00\t7,9\n");
    }

    #[test]
    fn bar_toggles_emit_baroff_and_bar_records() {
        let (song, mut chart) = minimal();
        chart.bar_toggles.insert(TimePoint::measure_start(2), true);
        chart.bar_toggles.insert(TimePoint::measure_start(4), false);
        chart.forced_bars.insert(TimePoint::measure_start(3));

        let vox = write_vox(&song, &chart, "test.ksh");
        assert!(vox.contains("002,01,00\tBAROFF\t2\t0\t0.00\t0.00\t0.00\t0.00\n"));
        assert!(vox.contains("003,01,00\tBAR\t2\t0\t0.00\t0.00\t0.00\t0.00\n"));
        assert!(vox.contains("004,01,00\tBAR\t2\t0\t0.00\t0.00\t0.00\t0.00\n"));
    }
}
