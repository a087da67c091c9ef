//! End-to-end conversion tests over the public API.

use pretty_assertions::assert_eq;

use ksh2vox::ksh::command::time::{NoteLength, TimePoint};
use ksh2vox::ksh::parse_ksh;
use ksh2vox::vox::{vox_filename, write_vox};
use ksh2vox::xml::{MetadataWarning, write_xml};

const HEADER: &str = "title=Emblem\nartist=Composer\neffect=Effector\nt=170\nver=167\n";

fn chart(body: &str) -> String {
    format!("{HEADER}--\n{body}--\n")
}

#[test]
fn minimal_chart_round_trips_into_every_section() {
    let output = parse_ksh(&chart("0000|00|--\n")).expect("chart converts");
    assert_eq!(output.song.title, "Emblem");
    assert_eq!(output.song.min_bpm, 170.0);

    let vox = write_vox(&output.song, &output.chart, "emblem.ksh");
    for name in [
        "#FORMAT VERSION",
        "#BEAT INFO",
        "#BPM INFO",
        "#END POSITION",
        "#FXBUTTON EFFECT INFO",
        "#TRACK8",
        "#SPCONTROLER",
        "#SCRIPT_DEFINE",
    ] {
        assert!(vox.contains(name), "missing section {name}");
    }
    assert!(vox.contains("001,01,00\t170.00\t4\n"));
    assert_eq!(vox_filename(&output.song, &output.chart), "0000_emblem_5m.vox");
}

#[test]
fn ease_out_curve_hits_ninety_at_the_midpoint() {
    let body = "//curveBeginL=4\n0000|00|0-\n//curveEndL\n0000|00|o-\n0000|00|--\n0000|00|--\n";
    let output = parse_ksh(&chart(body)).expect("chart converts");

    let lane = &output.chart.vols[0];
    let midway = TimePoint::new(1, NoteLength::new(1, 8));
    let midpoint = lane.get(&midway).expect("interpolated midpoint exists");
    assert!(midpoint.interpolated);
    assert_eq!(midpoint.start, 90);

    // The eased point stream rises strictly towards the endpoint.
    let positions: Vec<u8> = lane.values().map(|point| point.start).collect();
    assert!(positions.windows(2).all(|pair| pair[0] < pair[1]));
    assert_eq!(positions.first(), Some(&0));
    assert_eq!(positions.last(), Some(&127));

    // TRACK1 carries the inserted points, TRACK ORIGINAL L omits them.
    let vox = write_vox(&output.song, &output.chart, "emblem.ksh");
    let track1 = &vox[vox.find("#TRACK1\n").unwrap()..vox.find("#TRACK2\n").unwrap()];
    let original =
        &vox[vox.find("#TRACK ORIGINAL L\n").unwrap()..vox.find("#TRACK ORIGINAL R\n").unwrap()];
    assert!(track1.contains("\t90.000000\t"));
    assert!(!original.contains("\t90.000000\t"));
}

#[test]
fn script_mask_addresses_the_documented_lanes() {
    let body = "//scriptBegin=0xA2,3\n0010|00|--\n0000|00|--\n0000|00|--\n0000|00|--\n";
    let output = parse_ksh(&chart(body)).expect("chart converts");

    let vox = write_vox(&output.song, &output.chart, "emblem.ksh");
    assert!(vox.contains("@SCRIPTSTART 3\n"));

    // 0xA2 selects VOL-L, BT-C and BT-D; the BT-C chip picks up the id.
    let scripted = &vox[vox.find("#SCRIPTED_TRACK5\n").unwrap()..];
    let scripted = &scripted[..scripted.find("#END").unwrap()];
    assert_eq!(scripted, "#SCRIPTED_TRACK5\n001,01,00\t3\n");

    // BT-A is not in the mask, so its section stays empty.
    let unscripted = &vox[vox.find("#SCRIPTED_TRACK3\n").unwrap()..];
    let unscripted = &unscripted[..unscripted.find("#END").unwrap()];
    assert_eq!(unscripted, "#SCRIPTED_TRACK3\n");
}

#[test]
fn metadata_validation_never_blocks_the_export() {
    let output = parse_ksh(&chart("0000|00|--\n")).expect("chart converts");

    // No release date was ever supplied, which the game would reject.
    let (xml, warnings) = write_xml(&output.song, &output.chart);
    assert!(
        warnings
            .iter()
            .any(|w| matches!(w, MetadataWarning::InvalidReleaseDate(_)))
    );
    assert!(xml.contains("<music id=\"0\">"));
    assert!(xml.contains("<title_name>Emblem</title_name>"));
}

#[test]
fn stops_suspend_the_bpm_stream() {
    let body = "stop=192\n0000|00|--\n0000|00|--\n0000|00|--\n0000|00|--\n";
    let output = parse_ksh(&chart(body)).expect("chart converts");

    let vox = write_vox(&output.song, &output.chart, "emblem.ksh");
    assert!(vox.contains("001,01,00\t170.00\t4-\n"));
    assert!(vox.contains("002,01,00\t170.00\t4\n"));
}
