//! Comment directives.
//!
//! Chart comments starting with a recognized directive name drive a small
//! state machine: FX chip keysounds, laser curve spans, filter overrides,
//! script activations and measure bar visibility. State set by a directive
//! is consumed by the chart lines that follow it; anything a line fails to
//! consume is reported as a [`DirectiveWarning`].

use thiserror::Error;

use super::command::{
    EasingType, FilterIndex, Lane,
    mixin::{SourceRangeMixin, SourceRangeMixinExt},
    time::TimePoint,
};
use super::model::ChartInfo;

/// A directive that could not take effect as written.
#[derive(Debug, Clone, PartialEq, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DirectiveWarning {
    /// The directive value could not be read.
    #[error("directive {directive} rejects value {value:?}")]
    BadValue {
        /// Directive name.
        directive: String,
        /// Offending value.
        value: String,
    },
    /// A curve directive named an easing code outside 2, 4 and 5.
    #[error("unknown curve type {0}")]
    UnknownCurveType(u32),
    /// A curve began on a side whose previous curve never ended.
    #[error("curve on {0} restarted without ending the previous one")]
    ImplicitCurveRestart(Lane),
    /// A curve ended on a side without an active curve.
    #[error("curve end on {0} without a matching begin")]
    UnmatchedCurveEnd(Lane),
    /// A curve was still active when the chart ended.
    #[error("curve on {0} still open at the end of the chart")]
    UnclosedCurveAtEof(Lane),
    /// A curve began on a line without a laser point on that side.
    #[error("curve on {0} does not start on a laser point")]
    OffLaserPoint(Lane),
    /// A keysound was assigned on a line without an FX chip on that side.
    #[error("keysound on {0} does not land on a chip")]
    OffChip(Lane),
    /// A bar visibility directive that changes nothing.
    #[error("measure bars are already in the requested state")]
    RedundantBarToggle,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct ActiveCurve {
    ease: EasingType,
    range: (f64, f64),
    /// Still waiting for the laser point the curve starts on.
    pending: bool,
}

/// Interpreter state threaded through the chart body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DirectiveState {
    light_fx: [Option<usize>; 2],
    curves: [Option<ActiveCurve>; 2],
    filter_override: Option<FilterIndex>,
    bars_hidden: bool,
}

/// Laser and FX sides addressed by directive suffixes.
const SIDES: [(usize, &str); 2] = [(0, "L"), (1, "R")];

impl DirectiveState {
    /// A fresh interpreter with bars visible and nothing pending.
    pub fn new() -> Self {
        Self::default()
    }

    /// Interprets every directive in a comment. Unrecognized text is left
    /// alone; comments are allowed to just be comments.
    pub fn apply(
        &mut self,
        comment: &str,
        at: TimePoint,
        range: (usize, usize),
        chart: &mut ChartInfo,
        warnings: &mut Vec<SourceRangeMixin<DirectiveWarning>>,
    ) {
        for directive in comment.split(';').map(str::trim) {
            if directive.is_empty() {
                continue;
            }
            let (name, value) = directive
                .split_once('=')
                .map_or((directive, None), |(name, value)| (name, Some(value)));
            self.apply_one(name, value, at, range, chart, warnings);
        }
    }

    fn apply_one(
        &mut self,
        name: &str,
        value: Option<&str>,
        at: TimePoint,
        range: (usize, usize),
        chart: &mut ChartInfo,
        warnings: &mut Vec<SourceRangeMixin<DirectiveWarning>>,
    ) {
        let bad_value = |warnings: &mut Vec<SourceRangeMixin<DirectiveWarning>>| {
            warnings.push(
                DirectiveWarning::BadValue {
                    directive: name.to_owned(),
                    value: value.unwrap_or_default().to_owned(),
                }
                .into_wrapper_range(range),
            );
        };
        match name {
            "lightFXL" | "lightFXR" | "lightFXLR" => {
                let Some(id) = value.and_then(|v| v.parse::<usize>().ok()) else {
                    bad_value(warnings);
                    return;
                };
                for &side in directive_sides(name) {
                    self.light_fx[side] = Some(id);
                }
            }
            "curveBeginL" | "curveBeginR" | "curveBeginLR" => {
                let sides = directive_sides(name);
                let codes = value.map_or_else(Vec::new, parse_curve_codes);
                let Some(&first) = codes.first() else {
                    bad_value(warnings);
                    return;
                };
                if codes.len() > sides.len() {
                    bad_value(warnings);
                    return;
                }
                // The second code of the LR form shapes the right laser;
                // a lone code covers both sides.
                for (slot, &side) in sides.iter().enumerate() {
                    let code = codes.get(slot).copied().unwrap_or(first);
                    match EasingType::try_from(code) {
                        Ok(ease) => self.begin_curve(side, ease, (0.0, 1.0), range, warnings),
                        Err(unknown) => warnings.push(
                            DirectiveWarning::UnknownCurveType(unknown.0).into_wrapper_range(range),
                        ),
                    }
                }
            }
            "curveBeginSpL" | "curveBeginSpR" => {
                let Some((ease, curve_range)) = value.and_then(parse_curve_span) else {
                    bad_value(warnings);
                    return;
                };
                match ease {
                    Ok(ease) => {
                        for &side in directive_sides(name) {
                            self.begin_curve(side, ease, curve_range, range, warnings);
                        }
                    }
                    Err(unknown) => warnings
                        .push(DirectiveWarning::UnknownCurveType(unknown.0).into_wrapper_range(range)),
                }
            }
            "curveEndL" | "curveEndR" | "curveEndLR" => {
                for &side in directive_sides(name) {
                    if self.curves[side].take().is_none() {
                        warnings.push(
                            DirectiveWarning::UnmatchedCurveEnd(vol_lane(side))
                                .into_wrapper_range(range),
                        );
                    }
                }
            }
            "applyFilter" => {
                let filter = value.and_then(|v| {
                    FilterIndex::from_ksh(v)
                        .or_else(|| v.parse::<u8>().ok().and_then(FilterIndex::from_slot))
                });
                match filter {
                    Some(filter) => {
                        // Active from this time point; a following
                        // `filtertype=` line still consumes the stash.
                        self.filter_override = Some(filter);
                        let current = chart
                            .active_filter
                            .range(..=at)
                            .next_back()
                            .map_or(FilterIndex::Peak, |(_, &filter)| filter);
                        if filter != current {
                            chart.active_filter.insert(at, filter);
                        }
                    }
                    None => bad_value(warnings),
                }
            }
            "scriptBegin" => {
                let Some((mask, ids)) = value.and_then(parse_script_begin) else {
                    bad_value(warnings);
                    return;
                };
                for lane in Lane::from_mask(mask) {
                    chart.scripts.entry(lane).or_default().insert(at, ids.clone());
                }
            }
            "scriptEnd" => {
                let Some(mask) = value.and_then(parse_mask) else {
                    bad_value(warnings);
                    return;
                };
                for lane in Lane::from_mask(mask) {
                    chart.scripts.entry(lane).or_default().insert(at, Vec::new());
                }
            }
            "hideBars" => {
                let hide = match value {
                    Some("on") => true,
                    Some("off") => false,
                    _ => {
                        bad_value(warnings);
                        return;
                    }
                };
                if self.bars_hidden == hide {
                    warnings.push(DirectiveWarning::RedundantBarToggle.into_wrapper_range(range));
                } else {
                    self.bars_hidden = hide;
                    chart.bar_toggles.insert(at, hide);
                }
            }
            "addBars" => {
                if self.bars_hidden {
                    chart.forced_bars.insert(at);
                } else {
                    warnings.push(DirectiveWarning::RedundantBarToggle.into_wrapper_range(range));
                }
            }
            _ => {}
        }
    }

    fn begin_curve(
        &mut self,
        side: usize,
        ease: EasingType,
        curve_range: (f64, f64),
        range: (usize, usize),
        warnings: &mut Vec<SourceRangeMixin<DirectiveWarning>>,
    ) {
        if self.curves[side].is_some() {
            warnings.push(
                DirectiveWarning::ImplicitCurveRestart(vol_lane(side)).into_wrapper_range(range),
            );
        }
        self.curves[side] = Some(ActiveCurve {
            ease,
            range: curve_range,
            pending: true,
        });
    }

    /// The keysound id waiting for an FX chip on `side`, consuming it.
    pub fn take_light_fx(&mut self, side: usize) -> Option<usize> {
        self.light_fx[side].take()
    }

    /// Queues a keysound id for the next FX chip on `side`. The `fx-l_se`
    /// and `fx-r_se` options land here as well.
    pub fn set_light_fx(&mut self, side: usize, id: usize) {
        self.light_fx[side] = Some(id);
    }

    /// The easing and sub-range of the curve active on laser `side`.
    pub fn curve(&self, side: usize) -> Option<(EasingType, (f64, f64))> {
        self.curves[side].map(|curve| (curve.ease, curve.range))
    }

    /// Whether the curve on `side` is still waiting for its first laser
    /// point.
    pub fn curve_pending(&self, side: usize) -> bool {
        self.curves[side].is_some_and(|curve| curve.pending)
    }

    /// Marks the curve on `side` as anchored to a laser point.
    pub fn anchor_curve(&mut self, side: usize) {
        if let Some(curve) = &mut self.curves[side] {
            curve.pending = false;
        }
    }

    /// Drops the curve on `side` without warning; the caller has already
    /// reported why.
    pub fn clear_curve(&mut self, side: usize) {
        self.curves[side] = None;
    }

    /// The filter the next `filtertype=` change should resolve to,
    /// consuming it.
    pub fn take_filter_override(&mut self) -> Option<FilterIndex> {
        self.filter_override.take()
    }

    /// Whether measure bars are currently hidden.
    pub fn bars_hidden(&self) -> bool {
        self.bars_hidden
    }

    /// Closes out a chart line: keysounds that found no chip and curve
    /// starts that found no laser point are warned about and dropped.
    pub fn finish_chart_line(
        &mut self,
        range: (usize, usize),
        warnings: &mut Vec<SourceRangeMixin<DirectiveWarning>>,
    ) {
        for (side, _) in SIDES {
            if self.light_fx[side].take().is_some() {
                warnings.push(DirectiveWarning::OffChip(fx_lane(side)).into_wrapper_range(range));
            }
            if self.curves[side].is_some_and(|curve| curve.pending) {
                self.curves[side] = None;
                warnings.push(
                    DirectiveWarning::OffLaserPoint(vol_lane(side)).into_wrapper_range(range),
                );
            }
        }
    }

    /// Closes out the chart: curves still open at the end are warned about.
    pub fn finish(
        &mut self,
        range: (usize, usize),
        warnings: &mut Vec<SourceRangeMixin<DirectiveWarning>>,
    ) {
        for (side, _) in SIDES {
            if self.curves[side].take().is_some() {
                warnings.push(
                    DirectiveWarning::UnclosedCurveAtEof(vol_lane(side)).into_wrapper_range(range),
                );
            }
        }
    }
}

fn directive_sides(name: &str) -> &'static [usize] {
    if name.ends_with("LR") {
        &[0, 1]
    } else if name.ends_with('L') {
        &[0]
    } else {
        &[1]
    }
}

const fn vol_lane(side: usize) -> Lane {
    if side == 0 { Lane::VolL } else { Lane::VolR }
}

const fn fx_lane(side: usize) -> Lane {
    if side == 0 { Lane::FxL } else { Lane::FxR }
}

fn parse_curve_codes(value: &str) -> Vec<u32> {
    value
        .split(',')
        .map(|code| code.trim().parse())
        .collect::<Result<Vec<u32>, _>>()
        .unwrap_or_default()
}

type CurveSpan = (Result<EasingType, super::command::UnknownCurveType>, (f64, f64));

fn parse_curve_span(value: &str) -> Option<CurveSpan> {
    let mut parts = value.split(',');
    let code: u32 = parts.next()?.trim().parse().ok()?;
    let mut lo: f64 = parts.next()?.trim().parse().ok()?;
    let mut hi: f64 = parts.next()?.trim().parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    if lo > hi {
        std::mem::swap(&mut lo, &mut hi);
    }
    lo = lo.clamp(0.0, 1.0);
    hi = hi.clamp(0.0, 1.0);
    Some((EasingType::try_from(code), (lo, hi)))
}

fn parse_mask(value: &str) -> Option<u8> {
    let mask = if let Some(hex) = value.strip_prefix("0x") {
        u32::from_str_radix(hex, 16).ok()?
    } else if let Some(bin) = value.strip_prefix("0b") {
        u32::from_str_radix(bin, 2).ok()?
    } else {
        value.parse().ok()?
    };
    Some((mask % 0x100) as u8)
}

fn parse_script_begin(value: &str) -> Option<(u8, Vec<u32>)> {
    let mut parts = value.split(',');
    let mask = parse_mask(parts.next()?.trim())?;
    let ids = parts
        .map(|id| id.trim().parse())
        .collect::<Result<Vec<u32>, _>>()
        .ok()?;
    Some((mask, ids))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const RANGE: (usize, usize) = (0, 10);

    fn unwrapped(warnings: &[SourceRangeMixin<DirectiveWarning>]) -> Vec<DirectiveWarning> {
        warnings.iter().map(|w| w.content().clone()).collect()
    }

    #[test]
    fn light_fx_is_consumed_or_warned() {
        let mut state = DirectiveState::new();
        let mut chart = ChartInfo::default();
        let mut warnings = Vec::new();
        let at = TimePoint::measure_start(1);

        state.apply("lightFXLR=3", at, RANGE, &mut chart, &mut warnings);
        assert_eq!(state.take_light_fx(0), Some(3));
        state.finish_chart_line(RANGE, &mut warnings);
        assert_eq!(
            unwrapped(&warnings),
            vec![DirectiveWarning::OffChip(Lane::FxR)]
        );
        // Cleared after the line even though it was never consumed.
        assert_eq!(state.take_light_fx(1), None);
    }

    #[test]
    fn curve_lifecycle_warnings() {
        let mut state = DirectiveState::new();
        let mut chart = ChartInfo::default();
        let mut warnings = Vec::new();
        let at = TimePoint::measure_start(1);

        state.apply("curveEndL", at, RANGE, &mut chart, &mut warnings);
        state.apply("curveBeginL=4", at, RANGE, &mut chart, &mut warnings);
        assert_eq!(state.curve(0), Some((EasingType::EaseOut, (0.0, 1.0))));
        state.apply("curveBeginSpL=5,0.75,0.25", at, RANGE, &mut chart, &mut warnings);
        assert_eq!(state.curve(0), Some((EasingType::EaseIn, (0.25, 0.75))));
        state.finish(RANGE, &mut warnings);

        assert_eq!(
            unwrapped(&warnings),
            vec![
                DirectiveWarning::UnmatchedCurveEnd(Lane::VolL),
                DirectiveWarning::ImplicitCurveRestart(Lane::VolL),
                DirectiveWarning::UnclosedCurveAtEof(Lane::VolL),
            ]
        );
    }

    #[test]
    fn curve_lr_takes_one_code_per_side() {
        let mut state = DirectiveState::new();
        let mut chart = ChartInfo::default();
        let mut warnings = Vec::new();
        let at = TimePoint::measure_start(1);

        state.apply("curveBeginLR=4,5", at, RANGE, &mut chart, &mut warnings);
        assert_eq!(state.curve(0), Some((EasingType::EaseOut, (0.0, 1.0))));
        assert_eq!(state.curve(1), Some((EasingType::EaseIn, (0.0, 1.0))));
        assert_eq!(warnings, vec![]);

        state.apply("curveEndLR", at, RANGE, &mut chart, &mut warnings);
        state.apply("curveBeginLR=2", at, RANGE, &mut chart, &mut warnings);
        assert_eq!(state.curve(0), Some((EasingType::Linear, (0.0, 1.0))));
        assert_eq!(state.curve(1), Some((EasingType::Linear, (0.0, 1.0))));

        state.apply("curveBeginL=4,5", at, RANGE, &mut chart, &mut warnings);
        assert_eq!(
            unwrapped(&warnings),
            vec![DirectiveWarning::BadValue {
                directive: "curveBeginL".to_owned(),
                value: "4,5".to_owned(),
            }]
        );
    }

    #[test]
    fn off_laser_curve_is_dropped() {
        let mut state = DirectiveState::new();
        let mut chart = ChartInfo::default();
        let mut warnings = Vec::new();
        let at = TimePoint::measure_start(1);

        state.apply("curveBeginL=4", at, RANGE, &mut chart, &mut warnings);
        state.finish_chart_line(RANGE, &mut warnings);
        assert_eq!(
            unwrapped(&warnings),
            vec![DirectiveWarning::OffLaserPoint(Lane::VolL)]
        );
        // Nothing left over for a later laser point to pick up.
        assert_eq!(state.curve(0), None);
    }

    #[test]
    fn apply_filter_accepts_names_and_slots() {
        let mut state = DirectiveState::new();
        let mut chart = ChartInfo::default();
        let mut warnings = Vec::new();
        let at = TimePoint::measure_start(1);

        state.apply("applyFilter=bitc", at, RANGE, &mut chart, &mut warnings);
        assert_eq!(state.take_filter_override(), Some(FilterIndex::Bitcrush));
        // In force from the directive itself, not from a later option line.
        assert_eq!(chart.active_filter[&at], FilterIndex::Bitcrush);
        state.apply("applyFilter=2", at, RANGE, &mut chart, &mut warnings);
        assert_eq!(state.take_filter_override(), Some(FilterIndex::Lpf));
        state.apply("applyFilter=peak", at, RANGE, &mut chart, &mut warnings);
        assert_eq!(state.take_filter_override(), None);
        assert_eq!(
            unwrapped(&warnings),
            vec![DirectiveWarning::BadValue {
                directive: "applyFilter".to_owned(),
                value: "peak".to_owned(),
            }]
        );
    }

    #[test]
    fn scripts_land_on_masked_lanes() {
        let mut state = DirectiveState::new();
        let mut chart = ChartInfo::default();
        let mut warnings = Vec::new();
        let at = TimePoint::measure_start(2);

        state.apply("scriptBegin=0xA2,7,9", at, RANGE, &mut chart, &mut warnings);
        assert_eq!(warnings, vec![]);
        assert_eq!(chart.scripts[&Lane::VolL][&at], vec![7, 9]);
        assert_eq!(chart.scripts[&Lane::BtC][&at], vec![7, 9]);
        assert_eq!(chart.scripts[&Lane::BtD][&at], vec![7, 9]);
        assert!(!chart.scripts.contains_key(&Lane::BtA));

        state.apply("scriptEnd=0b10100010", at, RANGE, &mut chart, &mut warnings);
        assert_eq!(chart.scripts[&Lane::VolL][&at], Vec::<u32>::new());
    }

    #[test]
    fn bar_toggles_reject_redundant_changes() {
        let mut state = DirectiveState::new();
        let mut chart = ChartInfo::default();
        let mut warnings = Vec::new();
        let at = TimePoint::measure_start(1);

        state.apply("addBars", at, RANGE, &mut chart, &mut warnings);
        state.apply("hideBars=off", at, RANGE, &mut chart, &mut warnings);
        state.apply("hideBars=on", at, RANGE, &mut chart, &mut warnings);
        state.apply("addBars", TimePoint::measure_start(2), RANGE, &mut chart, &mut warnings);

        assert_eq!(
            unwrapped(&warnings),
            vec![
                DirectiveWarning::RedundantBarToggle,
                DirectiveWarning::RedundantBarToggle,
            ]
        );
        assert!(chart.bar_toggles[&at]);
        assert!(chart.forced_bars.contains(&TimePoint::measure_start(2)));
    }
}
