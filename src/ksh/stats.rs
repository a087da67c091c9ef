//! Notecounts, score ceilings and the radar chart.
//!
//! Counting follows the in-game judge: chips score once, holds score one
//! tick per sixteenth (eighth at high BPM) with a small leniency cut, and
//! lasers score their slams plus the ticks no slam already occupies.

use std::collections::BTreeMap;

use num::Zero;

use super::command::{
    Lane, SegmentFlag,
    time::{NoteLength, TimePoint},
};
use super::model::{ChartInfo, ratio_to_f64};

/// Notes broken down the way the music database wants them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Notecounts {
    /// Chip notes.
    pub chip: u32,
    /// Hold scoring ticks.
    pub long: u32,
    /// Laser scoring ticks and slams.
    pub vol: u32,
}

impl Notecounts {
    /// Longest possible chain.
    #[must_use]
    pub const fn max_chain(self) -> u32 {
        self.chip + self.long + self.vol
    }

    /// Highest reachable EX score.
    #[must_use]
    pub const fn max_ex_score(self) -> u32 {
        5 * self.chip + 2 * (self.long + self.vol)
    }
}

/// The five radar axes, each in `0..=200`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Radar {
    /// Overall button density.
    pub notes: u32,
    /// Densest two seconds.
    pub peak: u32,
    /// Time spent in holds and lasers.
    pub long: u32,
    /// Buttons played while a laser occupies the other hand.
    pub one_hand: u32,
    /// Buttons played by the hand holding the laser.
    pub hand_trip: u32,
}

const BT_LANES: [Lane; 4] = [Lane::BtA, Lane::BtB, Lane::BtC, Lane::BtD];
const FX_LANES: [Lane; 2] = [Lane::FxL, Lane::FxR];

const NOTES_SCALE: f64 = 200.0 / 12.521;
const PEAK_WINDOW_SECONDS: f64 = 2.0;
const PEAK_SCALE: f64 = 1.0 / 0.24;
const LONG_HOLD_WEIGHT: f64 = 191.0;
const LONG_LASER_WEIGHT: f64 = 29.0;
const LONG_SCALE: f64 = 0.956;
const REFERENCE_CHART_SECONDS: f64 = 118.5;
const ONEHAND_CHIP_VALUES: [f64; 4] = [0.0, 1.2132, 1.3343, 1.6246];
const ONEHAND_CHIP_OVERFLOW: f64 = 1.6365;
const ONEHAND_HOLD_VALUES: [f64; 4] = [0.0, 0.2205, 0.3530, 0.5180];
const ONEHAND_HOLD_OVERFLOW: f64 = 0.5649;
const ONEHAND_SCALE: f64 = 1.0 / 5.55;
const HANDTRIP_VALUES: [f64; 4] = [0.0, 1.2486, 1.4250, 1.5113];
const HANDTRIP_OVERFLOW: f64 = 1.5113;

/// Counts every scorable judge of the chart.
#[must_use]
pub fn notecounts(chart: &ChartInfo) -> Notecounts {
    let origin = TimePoint::measure_start(1);
    let mut counts = Notecounts::default();

    for lane in &chart.bts {
        for (&at, note) in lane {
            if note.is_chip() {
                counts.chip += 1;
            } else {
                counts.long += hold_ticks(chart, origin, at, note.duration);
            }
        }
    }
    for lane in &chart.fxs {
        for (&at, note) in lane {
            if note.is_chip() {
                counts.chip += 1;
            } else {
                counts.long += hold_ticks(chart, origin, at, note.duration);
            }
        }
    }
    for lane in &chart.vols {
        counts.vol += laser_ticks(chart, origin, lane);
    }
    counts
}

/// Computes the radar chart from the notes and timing.
#[must_use]
pub fn radar(chart: &ChartInfo) -> Radar {
    let end = TimePoint::measure_start(chart.end_measure);
    let total_seconds = chart.elapsed_seconds(end).max(f64::EPSILON);
    let time_coefficient = (total_seconds / REFERENCE_CHART_SECONDS).max(1.0);

    let buttons = button_count(chart).max(1);

    let notes = f64::from(buttons) * NOTES_SCALE / total_seconds;
    let peak = peak_density(chart) * PEAK_SCALE;
    let long = long_axis(chart, total_seconds);
    let (one_hand, hand_trip) = hand_axes(chart, buttons, time_coefficient);

    Radar {
        notes: clamp_axis(notes),
        peak: clamp_axis(peak),
        long: clamp_axis(long),
        one_hand: clamp_axis(one_hand),
        hand_trip: clamp_axis(hand_trip),
    }
}

fn clamp_axis(value: f64) -> u32 {
    value.clamp(0.0, 200.0) as u32
}

fn button_count(chart: &ChartInfo) -> u32 {
    let bts: usize = chart.bts.iter().map(BTreeMap::len).sum();
    let fxs: usize = chart.fxs.iter().map(BTreeMap::len).sum();
    (bts + fxs) as u32
}

fn hold_ticks(
    chart: &ChartInfo,
    origin: TimePoint,
    start: TimePoint,
    duration: NoteLength,
) -> u32 {
    let rate = chart.tick_rate(start);
    let from = chart.distance(origin, start);
    let to = from + duration;
    let raw = ticks_between(from, to, rate).count() as u32;
    // Short holds keep every tick; longer ones give the judge room at the
    // edges.
    let mut leniency = 0;
    if raw > 5 {
        leniency += 1;
    }
    if raw > 6 {
        leniency += 1;
    }
    raw.saturating_sub(leniency).max(1)
}

fn ticks_between(
    from: NoteLength,
    to: NoteLength,
    rate: NoteLength,
) -> impl Iterator<Item = NoteLength> {
    let first = (from / rate).ceil().to_integer();
    (first..)
        .map(move |step| rate * step)
        .take_while(move |tick| *tick < to)
}

fn laser_ticks(
    chart: &ChartInfo,
    origin: TimePoint,
    lane: &BTreeMap<TimePoint, super::model::VolPoint>,
) -> u32 {
    let mut count = 0;
    let mut segment_start: Option<TimePoint> = None;
    let mut slams: Vec<NoteLength> = Vec::new();

    for (&at, point) in lane {
        if point.segment.contains(SegmentFlag::START) {
            segment_start = Some(at);
            slams.clear();
        }
        if point.is_slam() {
            slams.push(chart.distance(origin, at));
        }
        if !point.segment.contains(SegmentFlag::END) {
            continue;
        }
        let Some(start) = segment_start.take() else {
            continue;
        };
        if start == at {
            // A lone point scores once.
            count += 1;
            slams.clear();
            continue;
        }
        let rate = chart.tick_rate(start);
        let from = chart.distance(origin, start);
        let to = chart.distance(origin, at);
        let mut ticks: Vec<(NoteLength, bool)> =
            ticks_between(from, to, rate).map(|tick| (tick, true)).collect();
        // A slam supersedes the scoring tick closest to it.
        for &slam in &slams {
            let nearest = ticks
                .iter_mut()
                .filter(|(_, enabled)| *enabled)
                .min_by(|(a, _), (b, _)| {
                    abs_distance(*a, slam)
                        .partial_cmp(&abs_distance(*b, slam))
                        .unwrap_or(std::cmp::Ordering::Equal)
                });
            if let Some((_, enabled)) = nearest {
                *enabled = false;
            }
        }
        count += slams.len() as u32;
        count += ticks.iter().filter(|(_, enabled)| *enabled).count() as u32;
        slams.clear();
    }
    count
}

fn abs_distance(a: NoteLength, b: NoteLength) -> f64 {
    ratio_to_f64(if a > b { a - b } else { b - a })
}

/// Chip density per timepoint with chord deductions, over the densest two
/// seconds in either direction.
fn peak_density(chart: &ChartInfo) -> f64 {
    let mut flags: BTreeMap<TimePoint, u32> = BTreeMap::new();
    let chip_bit = |lane: Lane| -> u32 {
        match lane {
            Lane::FxL => 0o40,
            Lane::BtA => 0o20,
            Lane::BtB => 0o10,
            Lane::BtC => 0o04,
            Lane::BtD => 0o02,
            Lane::FxR => 0o01,
            Lane::VolL | Lane::VolR => 0,
        }
    };
    for (lane_id, lane) in BT_LANES.into_iter().zip(&chart.bts) {
        let bit = chip_bit(lane_id);
        for (&at, note) in lane {
            if note.is_chip() {
                *flags.entry(at).or_default() |= bit;
            }
        }
    }
    for (lane_id, lane) in FX_LANES.into_iter().zip(&chart.fxs) {
        let bit = chip_bit(lane_id);
        for (&at, note) in lane {
            if note.is_chip() {
                *flags.entry(at).or_default() |= bit;
            }
        }
    }

    let weighted: Vec<(f64, f64)> = flags
        .iter()
        .map(|(&at, &mask)| (chart.elapsed_seconds(at), chord_value(mask)))
        .collect();

    let mut best: f64 = 0.0;
    for (index, &(start, _)) in weighted.iter().enumerate() {
        let forward: f64 = weighted[index..]
            .iter()
            .take_while(|(t, _)| *t < start + PEAK_WINDOW_SECONDS)
            .map(|(_, v)| v)
            .sum();
        let backward: f64 = weighted[..=index]
            .iter()
            .rev()
            .take_while(|(t, _)| *t > start - PEAK_WINDOW_SECONDS)
            .map(|(_, v)| v)
            .sum();
        best = best.max(forward).max(backward);
    }
    best
}

/// One point per set bit, minus a cut for chords a single hand covers.
fn chord_value(mask: u32) -> f64 {
    let mut value = f64::from(mask.count_ones());
    let left = mask & 0o70;
    let right = mask & 0o07;
    if left == 0o70 {
        value -= 1.5;
    } else if matches!(left, 0o60 | 0o50 | 0o30) {
        value -= 0.83;
    }
    if right == 0o07 {
        value -= 1.5;
    } else if matches!(right, 0o06 | 0o05 | 0o03) {
        value -= 0.83;
    }
    if mask & 0o77 == 0o14 {
        value -= 0.83;
    }
    value
}

fn long_axis(chart: &ChartInfo, total_seconds: f64) -> f64 {
    let mut hold_seconds = 0.0;
    for lane in &chart.bts {
        for (&at, note) in lane {
            if !note.is_chip() {
                hold_seconds += seconds_of(chart, at, note.duration);
            }
        }
    }
    for lane in &chart.fxs {
        for (&at, note) in lane {
            if !note.is_chip() {
                hold_seconds += seconds_of(chart, at, note.duration);
            }
        }
    }
    let mut laser_seconds = 0.0;
    for lane in &chart.vols {
        for (start, end) in segment_spans(lane) {
            laser_seconds += chart.elapsed_seconds(end) - chart.elapsed_seconds(start);
        }
    }
    (hold_seconds * LONG_HOLD_WEIGHT + laser_seconds * LONG_LASER_WEIGHT) / total_seconds
        * LONG_SCALE
}

fn seconds_of(chart: &ChartInfo, at: TimePoint, duration: NoteLength) -> f64 {
    let end = chart.add_duration(at, duration);
    chart.elapsed_seconds(end) - chart.elapsed_seconds(at)
}

fn segment_spans(lane: &BTreeMap<TimePoint, super::model::VolPoint>) -> Vec<(TimePoint, TimePoint)> {
    let mut spans = Vec::new();
    let mut start: Option<TimePoint> = None;
    for (&at, point) in lane {
        if point.segment.contains(SegmentFlag::START) {
            start = Some(at);
        }
        if point.segment.contains(SegmentFlag::END) {
            if let Some(from) = start.take() {
                if from != at {
                    spans.push((from, at));
                }
            }
        }
    }
    spans
}

fn hand_axes(chart: &ChartInfo, buttons: u32, time_coefficient: f64) -> (f64, f64) {
    let mut one_hand = 0.0;
    let mut hand_trip = 0.0;

    for (side, lane) in chart.vols.iter().enumerate() {
        let same_hand: [Lane; 3] = if side == 0 {
            [Lane::BtA, Lane::BtB, Lane::FxL]
        } else {
            [Lane::BtC, Lane::BtD, Lane::FxR]
        };
        for (start, end) in segment_spans(lane) {
            // Buttons struck while this laser is held.
            let mut chips_at: BTreeMap<TimePoint, (u32, u32)> = BTreeMap::new();
            for (lane_id, bt_lane) in BT_LANES.into_iter().zip(&chart.bts) {
                for (&at, note) in bt_lane.range(start..=end) {
                    if note.is_chip() {
                        let entry = chips_at.entry(at).or_default();
                        entry.0 += 1;
                        if same_hand.contains(&lane_id) {
                            entry.1 += 1;
                        }
                    }
                }
            }
            for (lane_id, fx_lane) in FX_LANES.into_iter().zip(&chart.fxs) {
                for (&at, note) in fx_lane.range(start..=end) {
                    if note.is_chip() {
                        let entry = chips_at.entry(at).or_default();
                        entry.0 += 1;
                        if same_hand.contains(&lane_id) {
                            entry.1 += 1;
                        }
                    }
                }
            }
            for (&at, &(total, same)) in &chips_at {
                one_hand += lookup(&ONEHAND_CHIP_VALUES, ONEHAND_CHIP_OVERFLOW, total);
                let holds = active_holds(chart, at);
                one_hand += lookup(&ONEHAND_HOLD_VALUES, ONEHAND_HOLD_OVERFLOW, holds);
                hand_trip += lookup(&HANDTRIP_VALUES, HANDTRIP_OVERFLOW, same);
            }
        }
    }

    let pressure = one_hand;
    let factor = ((pressure / f64::from(buttons) - 0.16) / 0.34).clamp(0.0, 1.0) + 2.0;
    (
        pressure * ONEHAND_SCALE * factor / time_coefficient,
        hand_trip / time_coefficient,
    )
}

fn lookup(values: &[f64; 4], overflow: f64, count: u32) -> f64 {
    values
        .get(count as usize)
        .copied()
        .unwrap_or(overflow)
}

fn active_holds(chart: &ChartInfo, at: TimePoint) -> u32 {
    let mut count = 0;
    for lane in &chart.bts {
        count += holds_covering(chart, lane.iter().map(|(&t, n)| (t, n.duration)), at);
    }
    for lane in &chart.fxs {
        count += holds_covering(chart, lane.iter().map(|(&t, n)| (t, n.duration)), at);
    }
    count
}

fn holds_covering(
    chart: &ChartInfo,
    notes: impl Iterator<Item = (TimePoint, NoteLength)>,
    at: TimePoint,
) -> u32 {
    notes
        .filter(|&(start, duration)| {
            !duration.is_zero() && start < at && chart.add_duration(start, duration) > at
        })
        .count() as u32
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::super::command::{EasingType, SpinType};
    use super::super::model::{BtNote, FxNote, VolPoint};
    use super::*;

    fn timepoint(measure: u32, numer: i64, denom: i64) -> TimePoint {
        TimePoint::new(measure, NoteLength::new(numer, denom))
    }

    fn point(position: u8, flag: SegmentFlag) -> VolPoint {
        VolPoint::new(position, flag)
    }

    #[test]
    fn chips_count_once_each() {
        let mut chart = ChartInfo::default();
        chart.bts[0].insert(TimePoint::measure_start(1), BtNote::chip());
        chart.bts[2].insert(timepoint(1, 1, 4), BtNote::chip());
        chart.fxs[1].insert(
            timepoint(1, 1, 2),
            FxNote {
                duration: NoteLength::zero(),
                special: 0,
            },
        );
        chart.end_measure = 3;

        let counts = notecounts(&chart);
        assert_eq!(counts.chip, 3);
        assert_eq!(counts.max_ex_score(), 15);
        assert_eq!(counts.max_chain(), 3);
    }

    #[test]
    fn hold_ticks_follow_the_sixteenth_grid() {
        let mut chart = ChartInfo::default();
        // A half-note hold covers eight sixteenths; over the leniency
        // threshold, so two ticks are forgiven.
        chart.bts[0].insert(
            TimePoint::measure_start(1),
            BtNote {
                duration: NoteLength::new(1, 2),
            },
        );
        chart.end_measure = 3;
        assert_eq!(notecounts(&chart).long, 6);

        // A quarter-note hold keeps all four of its ticks.
        let mut chart = ChartInfo::default();
        chart.bts[0].insert(
            TimePoint::measure_start(1),
            BtNote {
                duration: NoteLength::new(1, 4),
            },
        );
        chart.end_measure = 3;
        assert_eq!(notecounts(&chart).long, 4);
    }

    #[test]
    fn fast_charts_tick_at_eighths() {
        let mut chart = ChartInfo::default();
        chart.bpms.insert(TimePoint::measure_start(1), 260.0);
        chart.bts[0].insert(
            TimePoint::measure_start(1),
            BtNote {
                duration: NoteLength::new(1, 4),
            },
        );
        chart.end_measure = 3;
        assert_eq!(notecounts(&chart).long, 2);
    }

    #[test]
    fn lone_laser_point_scores_once() {
        let mut chart = ChartInfo::default();
        chart.vols[0].insert(
            TimePoint::measure_start(1),
            point(64, SegmentFlag::POINT),
        );
        chart.end_measure = 3;
        assert_eq!(notecounts(&chart).vol, 1);
    }

    #[test]
    fn slam_supersedes_its_nearest_tick() {
        let mut chart = ChartInfo::default();
        let start = TimePoint::measure_start(1);
        let end = timepoint(1, 1, 4);
        let mut slam = point(0, SegmentFlag::START);
        slam.end = 127;
        chart.vols[0].insert(start, slam);
        chart.vols[0].insert(end, point(127, SegmentFlag::END));
        chart.end_measure = 3;

        // Four ticks over the quarter note, one eaten by the slam, plus
        // the slam itself.
        assert_eq!(notecounts(&chart).vol, 4);
    }

    #[test]
    fn radar_axes_stay_in_range() {
        let mut chart = ChartInfo::default();
        for step in 0..16 {
            chart.bts[step % 4].insert(
                timepoint(1, step as i64, 16),
                BtNote::chip(),
            );
        }
        let mut slam = point(0, SegmentFlag::START);
        slam.end = 127;
        slam.ease = EasingType::NoEase;
        slam.spin_type = SpinType::NoSpin;
        chart.vols[1].insert(timepoint(1, 1, 2), slam);
        chart.vols[1].insert(timepoint(1, 3, 4), point(127, SegmentFlag::END));
        chart.end_measure = 3;

        let radar = radar(&chart);
        for axis in [radar.notes, radar.peak, radar.long, radar.one_hand, radar.hand_trip] {
            assert!(axis <= 200);
        }
        assert!(radar.notes > 0);
        assert!(radar.peak > 0);
    }
}
