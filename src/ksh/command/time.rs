//! Chart time representation.
//!
//! A chart position is a measure number plus an exact offset from the start
//! of that measure, measured in whole notes. All note and event maps in the
//! model are keyed by [`TimePoint`], so iteration order is chart order.

use num::rational::Ratio;

/// Exact fraction of a whole note.
pub type NoteLength = Ratio<i64>;

/// Ticks in one whole note. A 4/4 measure spans exactly this many ticks.
pub const TICKS_PER_BAR: i64 = 192;

/// Two laser points on the same side at most this far apart (and at
/// different positions) collapse into a slam.
pub const KSH_SLAM_DISTANCE: NoteLength = Ratio::new_raw(1, 32);

/// Spacing of laser points inserted while flattening a curve span.
pub const INTERPOLATION_DISTANCE: NoteLength = Ratio::new_raw(1, 64);

/// KSH `stop` values are whole-note lengths counted in 192ths.
pub const STOP_CONVERSION_RATE: NoteLength = Ratio::new_raw(1, 192);

/// Converts a KSH spin length suffix into VOX spin duration units.
pub const SPIN_CONVERSION_RATE: f64 = (4.0 / 3.0) / 48.0;

/// From this BPM upwards notecount ticks run at eighth notes instead of
/// sixteenths.
pub const HALF_TICK_BPM_THRESHOLD: f64 = 255.0;

/// A position in the chart. `measure` is 1-based; `offset` is the distance
/// from the start of the measure in whole notes, so it stays below
/// `upper / lower` of the measure's time signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TimePoint {
    /// 1-based measure number.
    pub measure: u32,
    /// Offset from the measure start, in whole notes.
    pub offset: NoteLength,
}

impl TimePoint {
    /// Creates a time point at `offset` whole notes into `measure`.
    pub const fn new(measure: u32, offset: NoteLength) -> Self {
        Self { measure, offset }
    }

    /// The start of `measure`.
    pub fn measure_start(measure: u32) -> Self {
        Self::new(measure, Ratio::from_integer(0))
    }

    /// Renders the `mmm,dd,ss` VOX timepoint for this position under
    /// `timesig`: division is the 1-based beat index, subdivision the tick
    /// remainder within the beat.
    pub fn to_vox(self, timesig: TimeSignature) -> String {
        let note_val = Ratio::new(1, i64::from(timesig.lower));
        let div = (self.offset / note_val).floor().to_integer();
        let subdiv = (self.offset - note_val * div) * TICKS_PER_BAR;
        format!(
            "{:03},{:02},{:02}",
            self.measure,
            div + 1,
            subdiv.round().to_integer()
        )
    }
}

/// A time signature, `upper` beats of `1/lower` notes per measure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TimeSignature {
    /// Beats per measure.
    pub upper: u32,
    /// Note value of one beat (4 = quarter note).
    pub lower: u32,
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self { upper: 4, lower: 4 }
    }
}

impl TimeSignature {
    /// Length of one measure in whole notes.
    pub fn measure_length(self) -> NoteLength {
        Ratio::new(i64::from(self.upper), i64::from(self.lower))
    }
}

/// Rounds a whole-note length to its nearest tick count.
pub fn length_to_ticks(length: NoteLength) -> i64 {
    (length * TICKS_PER_BAR).round().to_integer()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn vox_timepoint_rendering() {
        let common = TimeSignature::default();
        let start = TimePoint::measure_start(1);
        assert_eq!(start.to_vox(common), "001,01,00");

        // Third beat of measure 12, half a beat in.
        let t = TimePoint::new(12, Ratio::new(5, 8));
        assert_eq!(t.to_vox(common), "012,03,24");

        // Waltz measures only reach division 3.
        let waltz = TimeSignature { upper: 3, lower: 4 };
        let t = TimePoint::new(2, Ratio::new(1, 2));
        assert_eq!(t.to_vox(waltz), "002,03,00");
    }

    #[test]
    fn timepoint_ordering_is_chart_order() {
        let a = TimePoint::new(1, Ratio::new(3, 4));
        let b = TimePoint::new(2, Ratio::new(0, 1));
        let c = TimePoint::new(2, Ratio::new(1, 16));
        assert!(a < b && b < c);
        assert_eq!(b, TimePoint::measure_start(2));
    }

    #[test]
    fn tick_conversion() {
        assert_eq!(length_to_ticks(Ratio::new(1, 4)), 48);
        assert_eq!(length_to_ticks(Ratio::new(1, 192)), 1);
        assert_eq!(length_to_ticks(KSH_SLAM_DISTANCE), 6);
    }
}
