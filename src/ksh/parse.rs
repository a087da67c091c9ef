//! Chart building.
//!
//! Turns the lexed line structure into a [`SongInfo`] and [`ChartInfo`],
//! then runs the fix-up passes that the VOX side needs: equalizing paired
//! FX holds, attaching spins to slams, materializing stop toggles, placing
//! ease midpoints, flattening curves into laser points, splitting laser
//! segments at filter changes and building the effect tables.

use std::collections::{BTreeSet, HashMap};
use std::ops::Bound::{Excluded, Unbounded};

use num::Zero;
use thiserror::Error;

use super::command::{
    DifficultySlot, EasingType, FilterIndex, Lane, SegmentFlag, SpinType, TiltMode,
    mixin::{SourceRangeMixin, SourceRangeMixinExt},
    time::{
        INTERPOLATION_DISTANCE, KSH_SLAM_DISTANCE, NoteLength, SPIN_CONVERSION_RATE,
        STOP_CONVERSION_RATE, TimePoint, TimeSignature,
    },
};
use super::directive::DirectiveState;
use super::ease::{interpolate_position, laser_char_position};
use super::lex::{
    LexOutput,
    token::{
        BodyLine, BtChar, ChartLine, DefinitionKind, FxChar, SpinDir, SpinLead, SpinMark, VolChar,
    },
};
use super::model::{
    AutotabInfo, BtNote, ChartInfo, FxNote, SongInfo, VolPoint,
    effects::{Effect, EffectEntry},
    ratio_to_f64 as ratio_f64,
};
use super::{ConvertError, ConvertWarning};

/// A chart construct that had to be repaired or dropped.
#[derive(Debug, Clone, PartialEq, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ParseWarning {
    /// A hold was cut short by a chip on the same lane.
    #[error("hold on {0} terminated by a chip")]
    ImproperHoldTermination(Lane),
    /// A laser slot held a character outside the laser alphabets.
    #[error("laser character {found:?} on {lane} is not a position")]
    BadLaserChar {
        /// Laser lane.
        lane: Lane,
        /// Offending character.
        found: char,
    },
    /// A recognized option carried an unreadable value.
    #[error("option {key} rejects value {value:?}")]
    BadOptionValue {
        /// Option name.
        key: String,
        /// Offending value.
        value: String,
    },
    /// A time signature change somewhere other than a measure start.
    #[error("time signature changes must sit at a measure start")]
    MidMeasureTimeSignature,
    /// An FX effect was assigned while another assignment was pending.
    #[error("effect on {0} assigned twice before a hold consumed it")]
    EffectAlreadyAssigned(Lane),
    /// An effect name with no built-in or chart-defined meaning.
    #[error("unknown effect {0:?}")]
    UnknownEffect(String),
    /// An effect definition that could not be built.
    #[error("effect definition {name:?} rejected: {message}")]
    BadEffectDefinition {
        /// Definition name.
        name: String,
        /// What went wrong.
        message: String,
    },
    /// A spin mark with no slam of the matching direction under it.
    #[error("spin does not sit on a slam of its direction")]
    UnmatchedSpin,
    /// A curve was still open when its laser segment ended.
    #[error("curve on {0} extends past the end of its segment")]
    CurveOutsideSegment(Lane),
}

#[derive(Debug, Clone, Copy)]
struct FxHold {
    start: TimePoint,
    effect: Option<usize>,
}

#[derive(Debug, Clone, Copy)]
struct RecentVol {
    at: TimePoint,
    elapsed: NoteLength,
}

struct Builder {
    song: SongInfo,
    chart: ChartInfo,
    warnings: Vec<SourceRangeMixin<ConvertWarning>>,
    state: DirectiveState,

    bt_holds: [Option<TimePoint>; 4],
    fx_holds: [Option<FxHold>; 2],
    pending_fx: [Option<usize>; 2],
    vol_segment: [bool; 2],
    wide: [bool; 2],
    recent_vol: [Option<RecentVol>; 2],
    last_vol_at: [Option<TimePoint>; 2],
    ease_ranges: [HashMap<TimePoint, (f64, f64)>; 2],
    ease_midpoints: [Vec<TimePoint>; 2],

    fx_list: Vec<String>,
    pending_spins: Vec<(TimePoint, SpinMark, (usize, usize))>,
    raw_stops: Vec<(TimePoint, NoteLength)>,
    filter_names: Vec<(TimePoint, String)>,
    current_filter: FilterIndex,
    bpm_range: Option<(f64, f64)>,
}

/// Builds the song and chart from lexed source, collecting every warning
/// raised on the way.
pub(super) fn build_chart(
    lex: &LexOutput<'_>,
) -> Result<(SongInfo, ChartInfo, Vec<SourceRangeMixin<ConvertWarning>>), ConvertError> {
    let mut builder = Builder {
        song: SongInfo::default(),
        chart: ChartInfo::default(),
        warnings: lex
            .warnings
            .iter()
            .map(|warning| warning.clone().map(ConvertWarning::Lex))
            .collect(),
        state: DirectiveState::new(),
        bt_holds: Default::default(),
        fx_holds: Default::default(),
        pending_fx: Default::default(),
        vol_segment: Default::default(),
        wide: Default::default(),
        recent_vol: Default::default(),
        last_vol_at: Default::default(),
        ease_ranges: Default::default(),
        ease_midpoints: Default::default(),
        fx_list: Vec::new(),
        pending_spins: Vec::new(),
        raw_stops: Vec::new(),
        filter_names: Vec::new(),
        current_filter: FilterIndex::Peak,
        bpm_range: None,
    };
    builder.header(lex)?;
    builder.body(lex);
    builder.finish(lex);
    Ok((builder.song, builder.chart, builder.warnings))
}

impl Builder {
    fn warn(&mut self, warning: impl Into<ConvertWarning>, range: (usize, usize)) {
        self.warnings.push(warning.into().into_wrapper_range(range));
    }

    fn header(&mut self, lex: &LexOutput<'_>) -> Result<(), ConvertError> {
        let mut seen: BTreeSet<&str> = BTreeSet::new();
        let start = TimePoint::measure_start(1);
        let mut filter_name = "peak".to_owned();
        for pair in &lex.header {
            let &(key, value) = pair.content();
            let range = pair.as_span();
            seen.insert(key);
            match key {
                "title" => {
                    self.song.title = value.to_owned();
                    self.song.ascii_label = ascii_label(value);
                }
                "artist" => self.song.artist = value.to_owned(),
                "effect" => self.chart.effector = value.to_owned(),
                "jacket" => self.chart.jacket_path = value.to_owned(),
                "illustrator" => self.chart.illustrator = value.to_owned(),
                "difficulty" => self.chart.difficulty = DifficultySlot::from_ksh(value),
                "level" => match value.parse() {
                    Ok(level) => self.chart.level = level,
                    Err(_) => self.warn_option(key, value, range),
                },
                "t" => match parse_bpm_field(value) {
                    Some((min, max)) => {
                        self.bpm_range = Some((min, max));
                        self.song.min_bpm = min;
                        self.song.max_bpm = max;
                        self.chart.bpms.insert(start, min);
                    }
                    None => self.warn_option(key, value, range),
                },
                "beat" => match parse_timesig(value) {
                    Some(timesig) => {
                        self.chart.timesigs.insert(start, timesig);
                    }
                    None => self.warn_option(key, value, range),
                },
                "m" => {
                    self.chart.music_path = value
                        .split(';')
                        .next()
                        .unwrap_or_default()
                        .to_owned();
                }
                "mvol" => match value.parse() {
                    Ok(volume) => self.song.music_volume = volume,
                    Err(_) => self.warn_option(key, value, range),
                },
                "o" => match value.parse() {
                    Ok(offset) => self.chart.music_offset = offset,
                    Err(_) => self.warn_option(key, value, range),
                },
                "po" => match value.parse() {
                    Ok(preview) => self.chart.preview_start = preview,
                    Err(_) => self.warn_option(key, value, range),
                },
                "filtertype" => {
                    filter_name = value.to_owned();
                    if let Some(filter) = FilterIndex::from_ksh(value) {
                        self.chart.active_filter.insert(start, filter);
                        self.current_filter = filter;
                    }
                }
                "ver" => match value.parse::<u32>() {
                    Ok(version) if version >= 160 => {}
                    Ok(version) => return Err(ConvertError::UnsupportedVersion(version)),
                    Err(_) => self.warn_option(key, value, range),
                },
                _ => {}
            }
        }
        for required in ["title", "artist", "t", "ver"] {
            if !seen.contains(required) {
                return Err(ConvertError::MissingHeaderField(required));
            }
        }
        self.filter_names.push((start, filter_name));
        Ok(())
    }

    fn warn_option(&mut self, key: &str, value: &str, range: (usize, usize)) {
        self.warn(
            ParseWarning::BadOptionValue {
                key: key.to_owned(),
                value: value.to_owned(),
            },
            range,
        );
    }

    fn body(&mut self, lex: &LexOutput<'_>) {
        for (index, measure) in lex.measures.iter().enumerate() {
            let measure_number = index as u32 + 1;
            let measure_start = TimePoint::measure_start(measure_number);

            // Time signatures ahead of the first chart line govern the
            // whole measure, including its subdivision.
            for line in &measure.lines {
                match line.content() {
                    BodyLine::Chart(_) => break,
                    BodyLine::Option { key: "beat", value } => match parse_timesig(value) {
                        Some(timesig) => {
                            self.chart.timesigs.insert(measure_start, timesig);
                        }
                        None => self.warn_option("beat", value, line.as_span()),
                    },
                    _ => {}
                }
            }

            let timesig = self.chart.timesig_at(measure_start);
            let count = measure.chart_line_count();
            let subdivision = if count == 0 {
                timesig.measure_length()
            } else {
                timesig.measure_length() / count as i64
            };

            let mut slot: usize = 0;
            for line in &measure.lines {
                let at = TimePoint::new(measure_number, subdivision * slot as i64);
                let range = line.as_span();
                match line.content() {
                    BodyLine::Comment(text) => {
                        let mut directive_warnings = Vec::new();
                        self.state
                            .apply(text, at, range, &mut self.chart, &mut directive_warnings);
                        // `applyFilter` switches the filter from its own
                        // time point; pick the change up for later points.
                        if let Some((_, &filter)) =
                            self.chart.active_filter.range(..=at).next_back()
                        {
                            self.current_filter = filter;
                        }
                        self.warnings.extend(
                            directive_warnings
                                .into_iter()
                                .map(|warning| warning.map(ConvertWarning::Directive)),
                        );
                    }
                    BodyLine::Option { key, value } => {
                        self.handle_option(key, value, at, slot, range);
                    }
                    BodyLine::Chart(chart_line) => {
                        self.handle_chart_line(chart_line, at, range);
                        let mut directive_warnings = Vec::new();
                        self.state.finish_chart_line(range, &mut directive_warnings);
                        self.warnings.extend(
                            directive_warnings
                                .into_iter()
                                .map(|warning| warning.map(ConvertWarning::Directive)),
                        );
                        for side in 0..2 {
                            if let Some(recent) = &mut self.recent_vol[side] {
                                recent.elapsed += subdivision;
                                if recent.elapsed > KSH_SLAM_DISTANCE {
                                    self.recent_vol[side] = None;
                                }
                            }
                        }
                        slot += 1;
                    }
                }
            }
        }
    }

    fn handle_option(&mut self, key: &str, value: &str, at: TimePoint, slot: usize, range: (usize, usize)) {
        match key {
            "t" => match value.parse::<f64>() {
                Ok(bpm) => {
                    self.chart.bpms.insert(at, bpm);
                }
                Err(_) => self.warn_option(key, value, range),
            },
            "beat" => {
                // Applied in the measure pre-scan when it sits at the
                // measure start.
                if slot != 0 {
                    self.warn(ParseWarning::MidMeasureTimeSignature, range);
                }
            }
            "stop" => match value.parse::<i64>() {
                Ok(ticks) => {
                    self.raw_stops
                        .push((at, STOP_CONVERSION_RATE * ticks));
                }
                Err(_) => self.warn_option(key, value, range),
            },
            "tilt" => match parse_tilt(value) {
                Some(mode) => {
                    self.chart.tilts.insert(at, mode);
                }
                None => self.warn_option(key, value, range),
            },
            "laserrange_l" => self.wide[0] = value == "2x",
            "laserrange_r" => self.wide[1] = value == "2x",
            "fx-l" => self.assign_fx(0, value, range),
            "fx-r" => self.assign_fx(1, value, range),
            "fx-l_se" => self.assign_fx_se(0, value, range),
            "fx-r_se" => self.assign_fx_se(1, value, range),
            "filtertype" => {
                let resolved = self
                    .state
                    .take_filter_override()
                    .or_else(|| FilterIndex::from_ksh(value))
                    .unwrap_or(FilterIndex::Custom);
                self.filter_names.push((at, value.to_owned()));
                if resolved != self.current_filter {
                    self.chart.active_filter.insert(at, resolved);
                    self.current_filter = resolved;
                }
            }
            // Manual camera values have no VOX counterpart here.
            "zoom_top" | "zoom_bottom" | "zoom_side" | "center_split" => {}
            _ => {}
        }
    }

    fn assign_fx(&mut self, side: usize, value: &str, range: (usize, usize)) {
        if value.is_empty() {
            self.pending_fx[side] = None;
            return;
        }
        let index = self
            .fx_list
            .iter()
            .position(|name| name == value)
            .unwrap_or_else(|| {
                self.fx_list.push(value.to_owned());
                self.fx_list.len() - 1
            });
        if self.pending_fx[side].is_some() {
            self.warn(ParseWarning::EffectAlreadyAssigned(fx_lane(side)), range);
        }
        self.pending_fx[side] = Some(index);
        if let Some(hold) = &mut self.fx_holds[side] {
            if hold.effect.is_none() {
                hold.effect = self.pending_fx[side].take();
            }
        }
    }

    fn assign_fx_se(&mut self, side: usize, value: &str, range: (usize, usize)) {
        let id = value
            .strip_suffix(".wav")
            .and_then(|stem| stem.parse::<usize>().ok());
        match id {
            Some(id) => self.state.set_light_fx(side, id),
            None => self.warn_option(if side == 0 { "fx-l_se" } else { "fx-r_se" }, value, range),
        }
    }

    fn handle_chart_line(&mut self, line: &ChartLine, at: TimePoint, range: (usize, usize)) {
        let mut activity = false;

        for (index, &slot) in line.bts.iter().enumerate() {
            let lane = bt_lane(index);
            match slot {
                BtChar::None => {
                    if let Some(start) = self.bt_holds[index].take() {
                        let duration = self.chart.distance(start, at);
                        self.chart.bts[index].insert(start, BtNote { duration });
                    }
                }
                BtChar::Chip => {
                    if let Some(start) = self.bt_holds[index].take() {
                        self.warn(ParseWarning::ImproperHoldTermination(lane), range);
                        let duration = self.chart.distance(start, at);
                        self.chart.bts[index].insert(start, BtNote { duration });
                    }
                    self.chart.bts[index].insert(at, BtNote::chip());
                    activity = true;
                }
                BtChar::Hold => {
                    if self.bt_holds[index].is_none() {
                        self.bt_holds[index] = Some(at);
                    }
                    activity = true;
                }
            }
        }

        for (side, &slot) in line.fxs.iter().enumerate() {
            let lane = fx_lane(side);
            match slot {
                FxChar::None => {
                    if let Some(hold) = self.fx_holds[side].take() {
                        self.end_fx_hold(side, hold, at);
                    }
                }
                FxChar::Hold => {
                    if self.fx_holds[side].is_none() {
                        self.fx_holds[side] = Some(FxHold {
                            start: at,
                            effect: self.pending_fx[side].take(),
                        });
                    }
                    activity = true;
                }
                FxChar::Chip => {
                    if let Some(hold) = self.fx_holds[side].take() {
                        self.warn(ParseWarning::ImproperHoldTermination(lane), range);
                        self.end_fx_hold(side, hold, at);
                    }
                    let keysound = self.state.take_light_fx(side).unwrap_or(0);
                    self.chart.fxs[side].insert(
                        at,
                        FxNote {
                            duration: NoteLength::zero(),
                            special: keysound,
                        },
                    );
                    activity = true;
                }
            }
        }

        for (side, &slot) in line.vols.iter().enumerate() {
            match slot {
                VolChar::None => {
                    if self.vol_segment[side] {
                        self.close_vol_segment(side, range);
                    }
                }
                VolChar::Connect => {
                    // A curve starting on a pass-through gets a midpoint
                    // whose position is interpolated later.
                    if self.state.curve_pending(side) {
                        let (ease, curve_range) = self
                            .state
                            .curve(side)
                            .unwrap_or((EasingType::NoEase, (0.0, 1.0)));
                        self.state.anchor_curve(side);
                        self.ease_ranges[side].insert(at, curve_range);
                        let mut point = VolPoint::new(0, SegmentFlag::MIDDLE);
                        point.ease = ease;
                        point.filter = self.current_filter;
                        point.wide = self.wide[side];
                        point.interpolated = true;
                        self.chart.vols[side].insert(at, point);
                        self.ease_midpoints[side].push(at);
                        self.last_vol_at[side] = Some(at);
                    }
                    activity = true;
                }
                VolChar::Position(c) => {
                    let Some(position) = laser_char_position(c) else {
                        self.warn(
                            ParseWarning::BadLaserChar {
                                lane: vol_lane(side),
                                found: c,
                            },
                            range,
                        );
                        continue;
                    };
                    self.place_vol_point(side, position, at);
                    activity = true;
                }
            }
        }

        if let Some(spin) = line.spin {
            self.pending_spins.push((at, spin, range));
        }

        if activity {
            self.chart.end_measure = self.chart.end_measure.max(at.measure + 2);
        }
    }

    fn place_vol_point(&mut self, side: usize, position: u8, at: TimePoint) {
        // Two nearby points at different positions merge into a slam on
        // the earlier one.
        if let Some(recent) = self.recent_vol[side] {
            if recent.elapsed <= KSH_SLAM_DISTANCE {
                if let Some(point) = self.chart.vols[side].get_mut(&recent.at) {
                    if point.end != position {
                        point.end = position;
                        self.recent_vol[side] = None;
                        return;
                    }
                }
            }
        }

        let ease = self
            .state
            .curve(side)
            .map_or(EasingType::NoEase, |(ease, _)| ease);
        if self.state.curve_pending(side) {
            let (_, curve_range) = self
                .state
                .curve(side)
                .unwrap_or((EasingType::NoEase, (0.0, 1.0)));
            self.state.anchor_curve(side);
            self.ease_ranges[side].insert(at, curve_range);
        }

        let flag = if self.vol_segment[side] {
            SegmentFlag::MIDDLE
        } else {
            self.vol_segment[side] = true;
            SegmentFlag::START
        };
        let mut point = VolPoint::new(position, flag);
        point.ease = ease;
        point.filter = self.current_filter;
        point.wide = self.wide[side];
        self.chart.vols[side].insert(at, point);
        self.recent_vol[side] = Some(RecentVol {
            at,
            elapsed: NoteLength::zero(),
        });
        self.last_vol_at[side] = Some(at);
    }

    fn close_vol_segment(&mut self, side: usize, range: (usize, usize)) {
        if let Some(last) = self.last_vol_at[side] {
            if let Some(point) = self.chart.vols[side].get_mut(&last) {
                point.segment |= SegmentFlag::END;
            }
        }
        self.vol_segment[side] = false;
        self.wide[side] = false;
        self.recent_vol[side] = None;
        if self.state.curve(side).is_some() {
            self.warn(ParseWarning::CurveOutsideSegment(vol_lane(side)), range);
            self.state.clear_curve(side);
        }
    }

    fn end_fx_hold(&mut self, side: usize, hold: FxHold, at: TimePoint) {
        let duration = self.chart.distance(hold.start, at);
        let effect = hold
            .effect
            .or_else(|| self.pending_fx[side].take())
            .unwrap_or(0);
        self.chart.fxs[side].insert(
            hold.start,
            FxNote {
                duration,
                special: effect,
            },
        );
    }

    fn finish(&mut self, lex: &LexOutput<'_>) {
        let end_of_chart = TimePoint::measure_start(lex.measures.len() as u32 + 1);
        let end_range = (0, 0);

        for index in 0..4 {
            if let Some(start) = self.bt_holds[index].take() {
                let duration = self.chart.distance(start, end_of_chart);
                self.chart.bts[index].insert(start, BtNote { duration });
            }
        }
        for side in 0..2 {
            if let Some(hold) = self.fx_holds[side].take() {
                self.end_fx_hold(side, hold, end_of_chart);
            }
            if self.vol_segment[side] {
                self.close_vol_segment(side, end_range);
            }
        }
        let mut directive_warnings = Vec::new();
        self.state.finish(end_range, &mut directive_warnings);
        self.warnings.extend(
            directive_warnings
                .into_iter()
                .map(|warning| warning.map(ConvertWarning::Directive)),
        );

        self.equalize_fx_holds();
        self.attach_spins();
        self.materialize_stops();
        self.place_ease_midpoints();
        self.flatten_curves();
        self.split_at_filter_changes();
        self.build_effect_tables(lex);
        self.build_autotabs();

        let (mut min_bpm, mut max_bpm) = self.bpm_range.unwrap_or((f64::MAX, f64::MIN));
        for &bpm in self.chart.bpms.values() {
            min_bpm = min_bpm.min(bpm);
            max_bpm = max_bpm.max(bpm);
        }
        self.song.min_bpm = min_bpm;
        self.song.max_bpm = max_bpm;
    }

    /// Holds starting and ending together form one gesture; if only one of
    /// them carries an effect, the other borrows it.
    fn equalize_fx_holds(&mut self) {
        let mut updates: Vec<(usize, TimePoint, usize)> = Vec::new();
        for (&at, left) in &self.chart.fxs[0] {
            if left.is_chip() {
                continue;
            }
            let Some(right) = self.chart.fxs[1].get(&at) else {
                continue;
            };
            if right.is_chip() || right.duration != left.duration {
                continue;
            }
            if left.special == 0 && right.special != 0 {
                updates.push((0, at, right.special));
            } else if right.special == 0 && left.special != 0 {
                updates.push((1, at, left.special));
            }
        }
        for (side, at, special) in updates {
            if let Some(note) = self.chart.fxs[side].get_mut(&at) {
                note.special = special;
            }
        }
    }

    fn attach_spins(&mut self) {
        for (at, mark, range) in std::mem::take(&mut self.pending_spins) {
            let mut matched = false;
            for side in 0..2 {
                let Some(point) = self.chart.vols[side].get_mut(&at) else {
                    continue;
                };
                if !point.is_slam() {
                    continue;
                }
                let rising = point.end > point.start;
                let wanted_rising = mark.dir == SpinDir::Right;
                if rising != wanted_rising {
                    continue;
                }
                point.spin_type = match mark.lead {
                    SpinLead::Full => SpinType::SingleSpin,
                    SpinLead::Half => SpinType::HalfSpin,
                };
                let duration = (f64::from(mark.length) * SPIN_CONVERSION_RATE).round();
                point.spin_duration = (duration as u32).max(1);
                matched = true;
                break;
            }
            if !matched {
                self.warn(ParseWarning::UnmatchedSpin, range);
            }
        }
    }

    fn materialize_stops(&mut self) {
        for (at, duration) in std::mem::take(&mut self.raw_stops) {
            let end = self.chart.add_duration(at, duration);
            self.chart.stops.insert(at, true);
            self.chart.stops.insert(end, false);
        }
    }

    /// Midpoints written as `:` get their position from the straight line
    /// between their real neighbors.
    fn place_ease_midpoints(&mut self) {
        for side in 0..2 {
            for at in std::mem::take(&mut self.ease_midpoints[side]) {
                let prev = self.chart.vols[side]
                    .range(..at)
                    .next_back()
                    .map(|(&t, point)| (t, point.end));
                let next = self.chart.vols[side]
                    .range((Excluded(at), Unbounded))
                    .next()
                    .map(|(&t, point)| (t, point.start));
                let (Some((prev_at, prev_pos)), Some((next_at, next_pos))) = (prev, next) else {
                    self.chart.vols[side].remove(&at);
                    continue;
                };
                let total = ratio_f64(self.chart.distance(prev_at, next_at));
                let part = ratio_f64(self.chart.distance(prev_at, at));
                let fraction = if total > 0.0 { part / total } else { 0.0 };
                let position = interpolate_position(
                    EasingType::Linear,
                    fraction,
                    prev_pos,
                    next_pos,
                    (0.0, 1.0),
                );
                if let Some(point) = self.chart.vols[side].get_mut(&at) {
                    point.start = position;
                    point.end = position;
                }
            }
        }
    }

    /// Replaces each curved run of laser points by a dense sequence of
    /// interpolated points, one per sixty-fourth note.
    fn flatten_curves(&mut self) {
        for side in 0..2 {
            let keys: Vec<TimePoint> = self.chart.vols[side].keys().copied().collect();
            let mut inserts: Vec<(TimePoint, VolPoint)> = Vec::new();

            let mut index = 0;
            while index + 1 < keys.len() {
                let start_point = self.chart.vols[side][&keys[index]];
                let curved = matches!(start_point.ease, EasingType::EaseOut | EasingType::EaseIn);
                if !curved || start_point.segment.contains(SegmentFlag::END) {
                    index += 1;
                    continue;
                }
                // Extend the run while the easing continues.
                let run_start = index;
                let mut run_end = index + 1;
                while run_end + 1 < keys.len() {
                    let point = &self.chart.vols[side][&keys[run_end]];
                    if point.ease != start_point.ease
                        || point.segment.contains(SegmentFlag::END)
                    {
                        break;
                    }
                    run_end += 1;
                }

                let (lo, hi) = self.ease_ranges[side]
                    .get(&keys[run_start])
                    .copied()
                    .unwrap_or((0.0, 1.0));
                let run_total = ratio_f64(
                    self.chart.distance(keys[run_start], keys[run_end]),
                );
                let mut covered = NoteLength::zero();

                for pair in run_start..run_end {
                    let (a_at, b_at) = (keys[pair], keys[pair + 1]);
                    let a = self.chart.vols[side][&a_at];
                    let b = self.chart.vols[side][&b_at];
                    let pair_length = self.chart.distance(a_at, b_at);
                    let pair_f64 = ratio_f64(pair_length);
                    let fa = ratio_f64(covered) / run_total;
                    let fb = (ratio_f64(covered) + pair_f64) / run_total;
                    let pair_range = (lo + fa * (hi - lo), lo + fb * (hi - lo));
                    covered += pair_length;

                    let steps = (pair_length / INTERPOLATION_DISTANCE).ceil().to_integer();
                    for step in 1..steps {
                        let offset = INTERPOLATION_DISTANCE * step;
                        let at = self.chart.add_duration(a_at, offset);
                        let fraction = ratio_f64(offset) / pair_f64;
                        let position = interpolate_position(
                            start_point.ease,
                            fraction,
                            a.end,
                            b.start,
                            pair_range,
                        );
                        let mut point = VolPoint::new(position, SegmentFlag::MIDDLE);
                        point.filter = a.filter;
                        point.wide = a.wide;
                        point.interpolated = true;
                        inserts.push((at, point));
                    }
                }
                index = run_end;
            }

            for (at, point) in inserts {
                self.chart.vols[side].entry(at).or_insert(point);
            }
        }
    }

    /// Filter changes inside a laser segment land on a point of their own
    /// so the sweep switches exactly on time.
    fn split_at_filter_changes(&mut self) {
        let changes: Vec<(TimePoint, FilterIndex)> = self
            .chart
            .active_filter
            .iter()
            .map(|(&at, &filter)| (at, filter))
            .collect();
        for (at, filter) in changes {
            for side in 0..2 {
                if let Some(point) = self.chart.vols[side].get_mut(&at) {
                    point.filter = filter;
                    point.interpolated = false;
                    continue;
                }
                let prev = self.chart.vols[side]
                    .range(..at)
                    .next_back()
                    .map(|(&t, point)| (t, *point));
                let next = self.chart.vols[side]
                    .range((Excluded(at), Unbounded))
                    .next()
                    .map(|(&t, point)| (t, *point));
                let (Some((prev_at, prev_point)), Some((next_at, next_point))) = (prev, next)
                else {
                    continue;
                };
                if prev_point.segment.contains(SegmentFlag::END) {
                    continue;
                }
                let total = ratio_f64(self.chart.distance(prev_at, next_at));
                let part = ratio_f64(self.chart.distance(prev_at, at));
                let fraction = if total > 0.0 { part / total } else { 0.0 };
                let position = interpolate_position(
                    EasingType::Linear,
                    fraction,
                    prev_point.end,
                    next_point.start,
                    (0.0, 1.0),
                );
                let mut point = VolPoint::new(position, SegmentFlag::MIDDLE);
                point.filter = filter;
                point.wide = prev_point.wide;
                self.chart.vols[side].insert(at, point);
            }
        }
    }

    fn build_effect_tables(&mut self, lex: &LexOutput<'_>) {
        let mut effect_defs: HashMap<&str, Effect> = HashMap::new();
        let mut filter_defs: Vec<(&str, Effect)> = Vec::new();
        for definition in &lex.definitions {
            let content = definition.content();
            let range = definition.as_span();
            let params: HashMap<String, String> = content
                .params
                .iter()
                .map(|&(key, value)| (key.to_owned(), value.to_owned()))
                .collect();
            match Effect::from_definition(&params) {
                Ok(effect) => match content.kind {
                    DefinitionKind::Effect => {
                        effect_defs.insert(content.name, effect);
                    }
                    DefinitionKind::Filter => {
                        filter_defs.push((content.name, effect));
                    }
                },
                Err(error) => self.warn(
                    ParseWarning::BadEffectDefinition {
                        name: content.name.to_owned(),
                        message: error.to_string(),
                    },
                    range,
                ),
            }
        }

        for index in 0..self.fx_list.len() {
            let raw = self.fx_list[index].clone();
            let mut parts = raw.split(';');
            let name = parts.next().unwrap_or_default();
            let params: Vec<i64> = parts.filter_map(|part| part.trim().parse().ok()).collect();
            let custom = effect_defs.contains_key(name);
            let Some(mut effect) = effect_defs
                .get(name)
                .cloned()
                .or_else(|| Effect::from_ksh_name(name))
            else {
                self.warn(ParseWarning::UnknownEffect(name.to_owned()), (0, 0));
                continue;
            };
            if let Err(error) = effect.apply_short_params(&params) {
                self.warn(
                    ParseWarning::BadEffectDefinition {
                        name: name.to_owned(),
                        message: error.to_string(),
                    },
                    (0, 0),
                );
            }
            let entry = EffectEntry::single(effect);
            if index < self.chart.effect_list.len() {
                self.chart.effect_list[index] = entry;
            } else {
                self.chart.push_effect(entry);
            }
            if custom {
                self.chart.custom_effects.insert(name.to_owned(), index);
            }
        }

        // Only filters the chart actually switches to earn an effect slot.
        let used: BTreeSet<&str> = self
            .filter_names
            .iter()
            .filter(|(_, name)| FilterIndex::from_ksh(name).is_none())
            .map(|(_, name)| name.as_str())
            .collect();
        for (name, effect) in filter_defs {
            if !used.contains(name) {
                continue;
            }
            let index = self.chart.push_effect(EffectEntry::single(effect));
            self.chart.custom_filters.insert(name.to_owned(), index);
        }
    }

    fn build_autotabs(&mut self) {
        let names = std::mem::take(&mut self.filter_names);
        for (index, (at, name)) in names.iter().enumerate() {
            let Some(&which) = self.chart.custom_filters.get(name) else {
                continue;
            };
            let until = names
                .get(index + 1)
                .map_or(TimePoint::measure_start(self.chart.end_measure), |(next, _)| *next);
            let duration = self.chart.distance(*at, until);
            self.chart
                .autotab_infos
                .insert(*at, AutotabInfo { which, duration });
        }
    }
}

const fn bt_lane(index: usize) -> Lane {
    match index {
        0 => Lane::BtA,
        1 => Lane::BtB,
        2 => Lane::BtC,
        _ => Lane::BtD,
    }
}

const fn fx_lane(side: usize) -> Lane {
    if side == 0 { Lane::FxL } else { Lane::FxR }
}

const fn vol_lane(side: usize) -> Lane {
    if side == 0 { Lane::VolL } else { Lane::VolR }
}

fn ascii_label(title: &str) -> String {
    title
        .to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

fn parse_bpm_field(value: &str) -> Option<(f64, f64)> {
    if let Some((min, max)) = value.split_once('-') {
        let min: f64 = min.trim().parse().ok()?;
        let max: f64 = max.trim().parse().ok()?;
        Some((min.min(max), min.max(max)))
    } else {
        let bpm: f64 = value.trim().parse().ok()?;
        Some((bpm, bpm))
    }
}

fn parse_timesig(value: &str) -> Option<TimeSignature> {
    let (upper, lower) = value.split_once('/')?;
    let upper: u32 = upper.trim().parse().ok()?;
    let lower: u32 = lower.trim().parse().ok()?;
    if upper == 0 || lower == 0 {
        return None;
    }
    Some(TimeSignature { upper, lower })
}

fn parse_tilt(value: &str) -> Option<TiltMode> {
    match value {
        "normal" | "zero" => Some(TiltMode::Normal),
        "bigger" | "biggest" => Some(TiltMode::Bigger),
        _ if value.starts_with("keep") => Some(TiltMode::Keep),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::ksh::lex::lex;

    const HEADER: &str = "title=Test Song\nartist=Someone\nt=150\nver=167\n";

    fn build(body: &str) -> (SongInfo, ChartInfo, Vec<SourceRangeMixin<ConvertWarning>>) {
        let source = format!("{HEADER}--\n{body}");
        let lexed = lex(&source);
        build_chart(&lexed).unwrap()
    }

    fn timepoint(measure: u32, numer: i64, denom: i64) -> TimePoint {
        TimePoint::new(measure, NoteLength::new(numer, denom))
    }

    #[test]
    fn header_fields_land_in_song_and_chart() {
        let (song, chart, _) = build("0000|00|--\n--\n");
        assert_eq!(song.title, "Test Song");
        assert_eq!(song.ascii_label, "test_song");
        assert_eq!(song.artist, "Someone");
        assert_eq!(song.min_bpm, 150.0);
        assert_eq!(chart.bpm_at(TimePoint::measure_start(1)), 150.0);
    }

    #[test]
    fn apply_filter_switches_without_an_option_line() {
        let (_, chart, _) = build(
            "0000|00|0-\n//applyFilter=hpf\n0000|00|5-\n0000|00|o-\n0000|00|--\n--\n",
        );
        let first = chart.vols[0][&TimePoint::measure_start(1)];
        assert_eq!(first.filter, FilterIndex::Peak);
        let mid = chart.vols[0][&timepoint(1, 1, 4)];
        assert_eq!(mid.filter, FilterIndex::Hpf);
        assert_eq!(chart.active_filter[&timepoint(1, 1, 4)], FilterIndex::Hpf);
    }

    #[test]
    fn curve_lr_shapes_each_side() {
        let (_, chart, _) = build(
            "//curveBeginLR=4,5\n0000|00|0o\n//curveEndLR\n0000|00|o0\n0000|00|--\n0000|00|--\n--\n",
        );
        let start = TimePoint::measure_start(1);
        assert_eq!(chart.vols[0][&start].ease, EasingType::EaseOut);
        assert_eq!(chart.vols[1][&start].ease, EasingType::EaseIn);
    }

    #[test]
    fn missing_header_field_is_fatal() {
        let lexed = lex("title=x\nartist=y\nt=120\n--\n--\n");
        assert_eq!(
            build_chart(&lexed).unwrap_err(),
            ConvertError::MissingHeaderField("ver")
        );
        let lexed = lex("title=x\nartist=y\nt=120\nver=120\n--\n--\n");
        assert_eq!(
            build_chart(&lexed).unwrap_err(),
            ConvertError::UnsupportedVersion(120)
        );
    }

    #[test]
    fn bt_chips_and_holds() {
        let body = "1000|00|--\n2000|00|--\n2000|00|--\n0100|00|--\n--\n";
        let (_, chart, warnings) = build(body);

        assert!(chart.bts[0][&TimePoint::measure_start(1)].is_chip());
        // The hold spans the second and third quarters.
        assert_eq!(
            chart.bts[0][&timepoint(1, 1, 4)].duration,
            NoteLength::new(1, 2)
        );
        assert!(chart.bts[1][&timepoint(1, 3, 4)].is_chip());
        assert_eq!(chart.end_measure, 3);
        assert_eq!(warnings, vec![]);
    }

    #[test]
    fn chip_cutting_a_hold_warns() {
        let body = "2000|00|--\n1000|00|--\n0000|00|--\n0000|00|--\n--\n";
        let (_, chart, warnings) = build(body);
        assert_eq!(
            warnings[0].content(),
            &ConvertWarning::Parse(ParseWarning::ImproperHoldTermination(Lane::BtA))
        );
        assert_eq!(
            chart.bts[0][&TimePoint::measure_start(1)].duration,
            NoteLength::new(1, 4)
        );
        assert!(chart.bts[0][&timepoint(1, 1, 4)].is_chip());
    }

    #[test]
    fn fx_holds_take_assigned_effects() {
        let body = concat!(
            "fx-l=Flanger\n",
            "0000|10|--\n0000|10|--\n0000|00|--\n0000|02|--\n--\n",
        );
        let (_, chart, _) = build(body);

        let hold = chart.fxs[0][&TimePoint::measure_start(1)];
        assert_eq!(hold.duration, NoteLength::new(1, 2));
        assert_eq!(hold.special, 0);
        // Flanger replaced the first default slot.
        assert_eq!(
            chart.effect_list[0],
            EffectEntry::single(Effect::flanger())
        );

        let chip = chart.fxs[1][&timepoint(1, 3, 4)];
        assert!(chip.is_chip());
        assert_eq!(chip.special, 0);
    }

    #[test]
    fn fx_chip_keysound_comes_from_directive() {
        let body = "//lightFXR=4\n0000|02|--\n0000|00|--\n--\n";
        let (_, chart, warnings) = build(body);
        assert_eq!(chart.fxs[1][&TimePoint::measure_start(1)].special, 4);
        assert_eq!(warnings, vec![]);
    }

    #[test]
    fn laser_segment_gets_start_and_end_flags() {
        let body = "0000|00|0-\n0000|00|:-\n0000|00|o-\n0000|00|--\n--\n";
        let (_, chart, _) = build(body);
        let points: Vec<_> = chart.vols[0].values().collect();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].start, 0);
        assert!(points[0].segment.contains(SegmentFlag::START));
        assert_eq!(points[1].start, 127);
        assert!(points[1].segment.contains(SegmentFlag::END));
    }

    #[test]
    fn nearby_laser_points_merge_into_a_slam() {
        // 32 lines per measure, so adjacent lines sit 1/32 apart.
        let mut body = String::from("0000|00|0-\n0000|00|o-\n");
        for _ in 0..30 {
            body.push_str("0000|00|--\n");
        }
        body.push_str("--\n");
        let (_, chart, _) = build(&body);

        let point = chart.vols[0][&TimePoint::measure_start(1)];
        assert_eq!((point.start, point.end), (0, 127));
        assert!(point.is_slam());
        assert_eq!(chart.vols[0].len(), 1);
    }

    #[test]
    fn spin_attaches_to_matching_slam() {
        let mut body = String::from("0000|00|0-@)384\n0000|00|o-\n");
        for _ in 0..30 {
            body.push_str("0000|00|--\n");
        }
        body.push_str("--\n");
        let (_, chart, warnings) = build(&body);

        let point = chart.vols[0][&TimePoint::measure_start(1)];
        assert_eq!(point.spin_type, SpinType::SingleSpin);
        assert_eq!(point.spin_duration, 11);
        assert_eq!(warnings, vec![]);
    }

    #[test]
    fn curve_is_flattened_into_interpolated_points() {
        // One laser sweep 0 -> 127 over a quarter note with an ease-out.
        let body = concat!(
            "//curveBeginL=4\n",
            "0000|00|0-\n",
            "//curveEndL\n",
            "0000|00|o-\n",
            "0000|00|--\n",
            "0000|00|--\n",
            "--\n",
        );
        let (_, chart, _) = build(body);

        // Quarter note span at 1/64 spacing: fifteen inserted points
        // between the two anchors.
        assert_eq!(chart.vols[0].len(), 17);
        let midway = chart.vols[0][&timepoint(1, 1, 8)];
        assert!(midway.interpolated);
        assert_eq!(midway.start, 90);
    }

    #[test]
    fn stops_become_paired_toggles() {
        let body = "stop=192\n0000|00|--\n--\n0000|00|--\n--\n";
        let (_, chart, _) = build(body);
        assert!(chart.stops[&TimePoint::measure_start(1)]);
        assert!(!chart.stops[&TimePoint::measure_start(2)]);
    }

    #[test]
    fn custom_filter_earns_effect_slot_and_autotab() {
        let body = concat!(
            "0000|00|0-\n",
            "filtertype=mybitc\n",
            "0000|00|:-\n",
            "0000|00|o-\n",
            "0000|00|--\n",
            "--\n",
            "#define_filter mybitc type=BitCrusher;reduction=40samples\n",
        );
        let (_, chart, _) = build(body);

        let slot = chart.custom_filters["mybitc"];
        assert_eq!(slot, 12);
        assert_eq!(chart.effect_list.len(), 13);
        let info = chart.autotab_infos[&timepoint(1, 1, 4)];
        assert_eq!(info.which, 12);
        // Runs from the change to the end measure.
        assert_eq!(
            info.duration,
            chart.distance(timepoint(1, 1, 4), TimePoint::measure_start(chart.end_measure))
        );
        assert_eq!(
            chart.active_filter[&timepoint(1, 1, 4)],
            FilterIndex::Custom
        );
    }
}
