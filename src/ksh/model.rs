//! The converted chart model.
//!
//! [`SongInfo`] carries the song-level metadata destined for the music
//! database entry, while [`ChartInfo`] carries everything one VOX file
//! needs: notes and laser points keyed by [`TimePoint`], timing and camera
//! state keyed the same way, and the effect, filter and auto-tab tables.

pub mod effects;

use std::collections::{BTreeMap, BTreeSet};

use num::Zero;
use thiserror::Error;

use super::command::{
    DifficultySlot, EasingType, FilterIndex, InfVer, Lane, SegmentFlag, SpinType, TiltMode,
    time::{HALF_TICK_BPM_THRESHOLD, NoteLength, TimePoint, TimeSignature},
};
use effects::{AutotabEntry, EffectEntry, Filter};

/// Song-level metadata shared by every difficulty of a song.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SongInfo {
    /// Numeric song id.
    pub id: u32,
    /// Display title.
    pub title: String,
    /// Title reading in full-width katakana.
    pub title_yomigana: String,
    /// Display artist.
    pub artist: String,
    /// Artist reading in full-width katakana.
    pub artist_yomigana: String,
    /// Lowercase ASCII label derived from the title.
    pub ascii_label: String,
    /// Smallest BPM reached by the chart.
    pub min_bpm: f64,
    /// Largest BPM reached by the chart.
    pub max_bpm: f64,
    /// Release date as eight digits, `YYYYMMDD`.
    pub release_date: String,
    /// Playback volume.
    pub music_volume: u16,
    /// Stage background number.
    pub background: u16,
    /// INFINITE-tier kind of the fifth difficulty.
    pub inf_ver: InfVer,
}

impl Default for SongInfo {
    fn default() -> Self {
        Self {
            id: 0,
            title: String::new(),
            title_yomigana: String::new(),
            artist: String::new(),
            artist_yomigana: String::new(),
            ascii_label: String::new(),
            min_bpm: 120.0,
            max_bpm: 120.0,
            release_date: String::new(),
            music_volume: 91,
            background: 0,
            inf_ver: InfVer::default(),
        }
    }
}

/// A BT chip or hold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BtNote {
    /// Hold length in whole notes; zero for a chip.
    pub duration: NoteLength,
}

impl BtNote {
    /// A chip.
    pub fn chip() -> Self {
        Self::default()
    }

    /// Whether this note is a chip rather than a hold.
    pub fn is_chip(&self) -> bool {
        self.duration.is_zero()
    }
}

/// An FX chip or hold.
///
/// `special` is the keysound id for chips and the index into the effect
/// list for holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FxNote {
    /// Hold length in whole notes; zero for a chip.
    pub duration: NoteLength,
    /// Keysound id (chip) or effect list index (hold).
    pub special: usize,
}

impl FxNote {
    /// Whether this note is a chip rather than a hold.
    pub fn is_chip(&self) -> bool {
        self.duration.is_zero()
    }
}

/// One point of a laser segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VolPoint {
    /// Position entering this point, in `0..=127`.
    pub start: u8,
    /// Position leaving this point. Differs from `start` only on a slam.
    pub end: u8,
    /// Segment role of this point.
    pub segment: SegmentFlag,
    /// Easing toward the next point.
    pub ease: EasingType,
    /// Filter active at this point.
    pub filter: FilterIndex,
    /// Spin starting at this point.
    pub spin_type: SpinType,
    /// Spin duration in VOX spin units.
    pub spin_duration: u32,
    /// Whether the lasers run at double width here.
    pub wide: bool,
    /// Whether this point was inserted while flattening a curve rather
    /// than read from the source.
    pub interpolated: bool,
}

impl VolPoint {
    /// A plain point holding one position.
    pub fn new(position: u8, segment: SegmentFlag) -> Self {
        Self {
            start: position,
            end: position,
            segment,
            ease: EasingType::default(),
            filter: FilterIndex::default(),
            spin_type: SpinType::default(),
            spin_duration: 0,
            wide: false,
            interpolated: false,
        }
    }

    /// Whether this point is a slam.
    pub fn is_slam(&self) -> bool {
        self.start != self.end
    }
}

/// One laser-driven parameter sweep over an effect entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AutotabInfo {
    /// Index into the effect list.
    pub which: usize,
    /// Sweep length in whole notes.
    pub duration: NoteLength,
}

/// The effect list cannot be edited as requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EffectTableError {
    /// No entry exists at the given index.
    #[error("no effect entry at index {0}")]
    OutOfBounds(usize),
}

/// A stored effect reference that had to be renumbered after the effect
/// list changed shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[error("{site} now refers to effect {to} (was {from})")]
pub struct ReferentialShift {
    /// Where the reference lives.
    pub site: ShiftSite,
    /// Index before the edit.
    pub from: usize,
    /// Index after the edit.
    pub to: usize,
}

/// The location of a renumbered effect reference.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ShiftSite {
    /// An auto-tab activation on the timeline.
    Autotab {
        /// Sweep start.
        at: TimePoint,
    },
    /// A sweep stored in the auto-tab table.
    AutotabSweep {
        /// Table slot.
        slot: usize,
    },
    /// An FX hold's assigned effect.
    FxHold {
        /// FX lane.
        lane: Lane,
        /// Hold start.
        at: TimePoint,
    },
    /// A `#define_fx` name binding.
    CustomEffect {
        /// Definition name.
        name: String,
    },
    /// A `#define_filter` name binding.
    CustomFilter {
        /// Definition name.
        name: String,
    },
}

impl std::fmt::Display for ShiftSite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Autotab { at } => write!(f, "auto-tab at {}/{}", at.measure, at.offset),
            Self::AutotabSweep { slot } => write!(f, "auto-tab table slot {slot}"),
            Self::FxHold { lane, at } => {
                write!(f, "{lane} hold at {}/{}", at.measure, at.offset)
            }
            Self::CustomEffect { name } => write!(f, "effect definition {name:?}"),
            Self::CustomFilter { name } => write!(f, "filter definition {name:?}"),
        }
    }
}

/// Everything one VOX chart file needs.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChartInfo {
    /// Difficulty level, 1 to 20.
    pub level: u8,
    /// Difficulty slot this chart occupies.
    pub difficulty: DifficultySlot,
    /// Effector credit.
    pub effector: String,
    /// Jacket illustrator credit.
    pub illustrator: String,
    /// Audio file referenced by the source chart.
    pub music_path: String,
    /// Audio offset in milliseconds.
    pub music_offset: i32,
    /// Preview start in milliseconds.
    pub preview_start: u32,
    /// Jacket image referenced by the source chart.
    pub jacket_path: String,
    /// One measure past the last measure holding chart content.
    pub end_measure: u32,

    /// BT notes per lane, in A, B, C, D order.
    pub bts: [BTreeMap<TimePoint, BtNote>; 4],
    /// FX notes per lane, left then right.
    pub fxs: [BTreeMap<TimePoint, FxNote>; 2],
    /// Laser points per lane, left then right.
    pub vols: [BTreeMap<TimePoint, VolPoint>; 2],

    /// BPM changes. Always holds the opening BPM at measure 1.
    pub bpms: BTreeMap<TimePoint, f64>,
    /// Time signature changes, keyed by measure start.
    pub timesigs: BTreeMap<TimePoint, TimeSignature>,
    /// Stop state toggles; `true` enters a stop, `false` leaves it.
    pub stops: BTreeMap<TimePoint, bool>,
    /// Tilt mode changes.
    pub tilts: BTreeMap<TimePoint, TiltMode>,
    /// Measure bar visibility toggles; `true` hides the bars.
    pub bar_toggles: BTreeMap<TimePoint, bool>,
    /// Bars forced to render while the bars are hidden.
    pub forced_bars: BTreeSet<TimePoint>,
    /// Laser filter changes.
    pub active_filter: BTreeMap<TimePoint, FilterIndex>,
    /// Auto-tab activations on the timeline.
    pub autotab_infos: BTreeMap<TimePoint, AutotabInfo>,
    /// Track script activations: lane, then start point, then script ids.
    pub scripts: BTreeMap<Lane, BTreeMap<TimePoint, Vec<u32>>>,

    /// FXBUTTON EFFECT INFO entries. Never empty.
    pub effect_list: Vec<EffectEntry>,
    /// TAB EFFECT INFO entries.
    pub filter_list: Vec<Filter>,
    /// TAB PARAM ASSIGN INFO entries, parallel to `effect_list`.
    pub autotab_list: Vec<AutotabEntry>,
    /// `#define_fx` names bound to effect list slots.
    pub custom_effects: BTreeMap<String, usize>,
    /// `#define_filter` names bound to effect list slots.
    pub custom_filters: BTreeMap<String, usize>,
}

impl Default for ChartInfo {
    fn default() -> Self {
        let start = TimePoint::measure_start(1);
        Self {
            level: 1,
            difficulty: DifficultySlot::default(),
            effector: String::new(),
            illustrator: String::new(),
            music_path: String::new(),
            music_offset: 0,
            preview_start: 0,
            jacket_path: String::new(),
            end_measure: 1,
            bts: Default::default(),
            fxs: Default::default(),
            vols: Default::default(),
            bpms: BTreeMap::from([(start, 120.0)]),
            timesigs: BTreeMap::from([(start, TimeSignature::default())]),
            stops: BTreeMap::new(),
            tilts: BTreeMap::from([(start, TiltMode::Normal)]),
            bar_toggles: BTreeMap::new(),
            forced_bars: BTreeSet::new(),
            active_filter: BTreeMap::from([(start, FilterIndex::Peak)]),
            autotab_infos: BTreeMap::new(),
            scripts: BTreeMap::new(),
            effect_list: effects::default_effects(),
            filter_list: effects::default_filters(),
            autotab_list: effects::default_autotabs(),
            custom_effects: BTreeMap::new(),
            custom_filters: BTreeMap::new(),
        }
    }
}

impl ChartInfo {
    /// BT notes of `lane`, if it is a BT lane.
    pub fn bt_lane(&self, lane: Lane) -> Option<&BTreeMap<TimePoint, BtNote>> {
        match lane {
            Lane::BtA => Some(&self.bts[0]),
            Lane::BtB => Some(&self.bts[1]),
            Lane::BtC => Some(&self.bts[2]),
            Lane::BtD => Some(&self.bts[3]),
            _ => None,
        }
    }

    /// FX notes of `lane`, if it is an FX lane.
    pub fn fx_lane(&self, lane: Lane) -> Option<&BTreeMap<TimePoint, FxNote>> {
        match lane {
            Lane::FxL => Some(&self.fxs[0]),
            Lane::FxR => Some(&self.fxs[1]),
            _ => None,
        }
    }

    /// Laser points of `lane`, if it is a laser lane.
    pub fn vol_lane(&self, lane: Lane) -> Option<&BTreeMap<TimePoint, VolPoint>> {
        match lane {
            Lane::VolL => Some(&self.vols[0]),
            Lane::VolR => Some(&self.vols[1]),
            _ => None,
        }
    }

    /// The time signature governing `at`.
    pub fn timesig_at(&self, at: TimePoint) -> TimeSignature {
        self.timesigs
            .range(..=at)
            .next_back()
            .map_or_else(TimeSignature::default, |(_, &sig)| sig)
    }

    /// The BPM at `at`.
    pub fn bpm_at(&self, at: TimePoint) -> f64 {
        self.bpms
            .range(..=at)
            .next_back()
            .map_or(120.0, |(_, &bpm)| bpm)
    }

    /// The notecount tick spacing at `at`. Charts this fast are counted at
    /// eighth notes, everything else at sixteenths.
    pub fn tick_rate(&self, at: TimePoint) -> NoteLength {
        if self.bpm_at(at) >= HALF_TICK_BPM_THRESHOLD {
            NoteLength::new(1, 8)
        } else {
            NoteLength::new(1, 16)
        }
    }

    /// Renders `at` in VOX notation under the time signature governing it.
    pub fn timepoint_to_vox(&self, at: TimePoint) -> String {
        at.to_vox(self.timesig_at(TimePoint::measure_start(at.measure)))
    }

    /// The point `duration` whole notes after `at`, rolling over measure
    /// boundaries of varying length.
    pub fn add_duration(&self, at: TimePoint, duration: NoteLength) -> TimePoint {
        let mut measure = at.measure;
        let mut offset = at.offset + duration;
        loop {
            let length = self
                .timesig_at(TimePoint::measure_start(measure))
                .measure_length();
            if offset < length {
                break;
            }
            offset -= length;
            measure += 1;
        }
        TimePoint::new(measure, offset)
    }

    /// The distance from `from` to `to` in whole notes. `from` must not be
    /// after `to`.
    pub fn distance(&self, from: TimePoint, to: TimePoint) -> NoteLength {
        debug_assert!(from <= to);
        let mut total = to.offset - from.offset;
        for measure in from.measure..to.measure {
            total += self
                .timesig_at(TimePoint::measure_start(measure))
                .measure_length();
        }
        total
    }

    /// Seconds of audio between the chart start and `at`, following every
    /// BPM change on the way.
    pub fn elapsed_seconds(&self, at: TimePoint) -> f64 {
        let mut seconds = 0.0;
        let mut prev_at = TimePoint::measure_start(1);
        let mut prev_bpm = self.bpm_at(prev_at);
        for (&change_at, &bpm) in self.bpms.range(..=at) {
            if change_at > prev_at {
                seconds += whole_note_seconds(prev_bpm) * ratio_to_f64(self.distance(prev_at, change_at));
                prev_at = change_at;
            }
            prev_bpm = bpm;
        }
        if at > prev_at {
            seconds += whole_note_seconds(prev_bpm) * ratio_to_f64(self.distance(prev_at, at));
        }
        seconds
    }

    /// How many seconds each BPM is active for, up to the end measure.
    pub fn bpm_durations(&self) -> BTreeMap<u64, f64> {
        let end = TimePoint::measure_start(self.end_measure);
        let mut durations: BTreeMap<u64, f64> = BTreeMap::new();
        let mut prev_at = TimePoint::measure_start(1);
        let mut prev_bpm = self.bpm_at(prev_at);
        for (&change_at, &bpm) in self.bpms.range(..end) {
            if change_at > prev_at {
                *durations.entry(prev_bpm.to_bits()).or_default() +=
                    whole_note_seconds(prev_bpm) * ratio_to_f64(self.distance(prev_at, change_at));
                prev_at = change_at;
            }
            prev_bpm = bpm;
        }
        if end > prev_at {
            *durations.entry(prev_bpm.to_bits()).or_default() +=
                whole_note_seconds(prev_bpm) * ratio_to_f64(self.distance(prev_at, end));
        }
        durations
    }

    /// Inserts `entry` at `index` of the effect list, together with a fresh
    /// auto-tab table entry, and renumbers every stored reference at or
    /// past `index`. Returns one [`ReferentialShift`] per renumbered
    /// reference.
    pub fn insert_effect(
        &mut self,
        index: usize,
        entry: EffectEntry,
    ) -> Result<Vec<ReferentialShift>, EffectTableError> {
        if index > self.effect_list.len() {
            return Err(EffectTableError::OutOfBounds(index));
        }
        self.effect_list.insert(index, entry);
        self.autotab_list.insert(index, AutotabEntry::new(index));
        Ok(self.renumber_references(index, Edit::Inserted))
    }

    /// Appends `entry` to the effect list, growing the auto-tab table with
    /// it, and returns the new entry's index.
    pub fn push_effect(&mut self, entry: EffectEntry) -> usize {
        let index = self.effect_list.len();
        self.effect_list.push(entry);
        self.autotab_list.push(AutotabEntry::new(index));
        index
    }

    /// Removes the entry at `index` of the effect list and its auto-tab
    /// table entry, and renumbers every stored reference at or past
    /// `index`. References to the removed entry are redirected to its
    /// successor. Removing the sole remaining entry replaces it with an
    /// empty one, so the list is never left empty.
    pub fn remove_effect(
        &mut self,
        index: usize,
    ) -> Result<Vec<ReferentialShift>, EffectTableError> {
        if index >= self.effect_list.len() {
            return Err(EffectTableError::OutOfBounds(index));
        }
        self.effect_list.remove(index);
        self.autotab_list.remove(index);
        if self.effect_list.is_empty() {
            self.effect_list.push(EffectEntry::default());
            self.autotab_list.push(AutotabEntry::new(0));
        }
        Ok(self.renumber_references(index, Edit::Removed))
    }

    /// Replaces the entry at `index` of the effect list. Auto-tab sweeps
    /// still pointing at a parameter the new effect kinds no longer have
    /// are reset.
    pub fn replace_effect(
        &mut self,
        index: usize,
        entry: EffectEntry,
    ) -> Result<(), EffectTableError> {
        let slot = self
            .effect_list
            .get_mut(index)
            .ok_or(EffectTableError::OutOfBounds(index))?;
        *slot = entry;
        let (effect1, effect2) = (
            self.effect_list[index].effect1.clone(),
            self.effect_list[index].effect2.clone(),
        );
        for tab in &mut self.autotab_list {
            if tab.setting1.effect_index == index && !tab.setting1.is_valid_for(&effect1) {
                tab.setting1.reset();
            }
            if tab.setting2.effect_index == index && !tab.setting2.is_valid_for(&effect2) {
                tab.setting2.reset();
            }
        }
        Ok(())
    }

    // `renumber` returns `Some` whenever the referent changed, including a
    // reference to a removed mid-list entry whose numeric index stays put;
    // one shift is reported for each such reference.
    fn renumber_references(&mut self, index: usize, edit: Edit) -> Vec<ReferentialShift> {
        let last = self.effect_list.len() - 1;
        let renumber = |reference: usize| -> Option<usize> {
            match edit {
                Edit::Inserted if reference >= index => Some(reference + 1),
                Edit::Removed if reference > index => Some(reference - 1),
                // The referenced entry itself was removed; the successor
                // takes its place.
                Edit::Removed if reference == index => Some(reference.min(last)),
                _ => None,
            }
        };
        let mut shifts = Vec::new();
        for (slot, tab) in self.autotab_list.iter_mut().enumerate() {
            // The table entry inserted alongside the new effect already
            // points at the right slot.
            if matches!(edit, Edit::Inserted) && slot == index {
                continue;
            }
            for setting in [&mut tab.setting1, &mut tab.setting2] {
                if let Some(to) = renumber(setting.effect_index) {
                    shifts.push(ReferentialShift {
                        site: ShiftSite::AutotabSweep { slot },
                        from: setting.effect_index,
                        to,
                    });
                    setting.effect_index = to;
                }
            }
        }
        for (&at, info) in &mut self.autotab_infos {
            if let Some(to) = renumber(info.which) {
                shifts.push(ReferentialShift {
                    site: ShiftSite::Autotab { at },
                    from: info.which,
                    to,
                });
                info.which = to;
            }
        }
        for (lane, notes) in [Lane::FxL, Lane::FxR].into_iter().zip(&mut self.fxs) {
            for (&at, note) in notes.iter_mut() {
                if note.is_chip() {
                    continue;
                }
                if let Some(to) = renumber(note.special) {
                    shifts.push(ReferentialShift {
                        site: ShiftSite::FxHold { lane, at },
                        from: note.special,
                        to,
                    });
                    note.special = to;
                }
            }
        }
        for (name, slot) in &mut self.custom_effects {
            if let Some(to) = renumber(*slot) {
                shifts.push(ReferentialShift {
                    site: ShiftSite::CustomEffect { name: name.clone() },
                    from: *slot,
                    to,
                });
                *slot = to;
            }
        }
        for (name, slot) in &mut self.custom_filters {
            if let Some(to) = renumber(*slot) {
                shifts.push(ReferentialShift {
                    site: ShiftSite::CustomFilter { name: name.clone() },
                    from: *slot,
                    to,
                });
                *slot = to;
            }
        }
        shifts
    }
}

#[derive(Clone, Copy)]
enum Edit {
    Inserted,
    Removed,
}

pub(crate) fn whole_note_seconds(bpm: f64) -> f64 {
    240.0 / bpm
}

pub(crate) fn ratio_to_f64(length: NoteLength) -> f64 {
    *length.numer() as f64 / *length.denom() as f64
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::ksh::model::effects::Effect;

    fn timepoint(measure: u32, numer: i64, denom: i64) -> TimePoint {
        TimePoint::new(measure, NoteLength::new(numer, denom))
    }

    #[test]
    fn add_duration_rolls_over_uneven_measures() {
        let mut chart = ChartInfo::default();
        chart.timesigs.insert(
            TimePoint::measure_start(2),
            TimeSignature { upper: 3, lower: 4 },
        );
        // Half a note from the middle of measure 1 lands inside the 3/4
        // measure 2.
        let start = timepoint(1, 1, 2);
        assert_eq!(
            chart.add_duration(start, NoteLength::new(1, 2)),
            timepoint(2, 1, 4)
        );
        assert_eq!(
            chart.distance(start, timepoint(2, 1, 4)),
            NoteLength::new(1, 2)
        );
    }

    #[test]
    fn elapsed_seconds_follows_bpm_changes() {
        let mut chart = ChartInfo::default();
        chart.bpms.insert(TimePoint::measure_start(1), 120.0);
        chart.bpms.insert(TimePoint::measure_start(2), 240.0);
        chart.end_measure = 3;
        // One 4/4 measure at 120 takes 2 s; the next at 240 takes 1 s.
        assert_eq!(chart.elapsed_seconds(TimePoint::measure_start(3)), 3.0);
        let durations = chart.bpm_durations();
        assert_eq!(durations[&120.0_f64.to_bits()], 2.0);
        assert_eq!(durations[&240.0_f64.to_bits()], 1.0);
    }

    #[test]
    fn insert_effect_shifts_later_references() {
        let mut chart = ChartInfo::default();
        let at = TimePoint::measure_start(2);
        chart.autotab_infos.insert(
            at,
            AutotabInfo {
                which: 3,
                duration: NoteLength::new(1, 1),
            },
        );
        chart.fxs[0].insert(
            at,
            FxNote {
                duration: NoteLength::new(1, 4),
                special: 5,
            },
        );

        let shifts = chart
            .insert_effect(3, EffectEntry::single(Effect::flanger()))
            .unwrap();

        assert_eq!(chart.effect_list.len(), 13);
        assert_eq!(chart.autotab_list.len(), 13);
        assert_eq!(chart.autotab_infos[&at].which, 4);
        assert_eq!(chart.fxs[0][&at].special, 6);
        assert!(shifts.contains(&ReferentialShift {
            site: ShiftSite::Autotab { at },
            from: 3,
            to: 4,
        }));
        assert!(shifts.contains(&ReferentialShift {
            site: ShiftSite::FxHold { lane: Lane::FxL, at },
            from: 5,
            to: 6,
        }));
    }

    #[test]
    fn remove_effect_redirects_dangling_references() {
        let mut chart = ChartInfo::default();
        let at = TimePoint::measure_start(2);
        chart.autotab_infos.insert(
            at,
            AutotabInfo {
                which: 11,
                duration: NoteLength::new(1, 2),
            },
        );

        let shifts = chart.remove_effect(11).unwrap();

        assert_eq!(chart.effect_list.len(), 11);
        // The reference pointed at the removed final slot and is clamped
        // back into bounds.
        assert_eq!(chart.autotab_infos[&at].which, 10);
        assert!(shifts.contains(&ReferentialShift {
            site: ShiftSite::Autotab { at },
            from: 11,
            to: 10,
        }));
    }

    #[test]
    fn removing_a_referenced_entry_reports_the_new_referent() {
        let mut chart = ChartInfo::default();
        let at = TimePoint::measure_start(2);
        chart.autotab_infos.insert(
            at,
            AutotabInfo {
                which: 3,
                duration: NoteLength::new(1, 1),
            },
        );

        let shifts = chart.remove_effect(3).unwrap();

        // The numeric index is unchanged but the successor entry moved
        // into it, so the sweep at measure 2 still gets its shift record.
        let autotab_shifts: Vec<_> = shifts
            .iter()
            .filter(|shift| matches!(shift.site, ShiftSite::Autotab { .. }))
            .collect();
        assert_eq!(
            autotab_shifts,
            vec![&ReferentialShift {
                site: ShiftSite::Autotab { at },
                from: 3,
                to: 3,
            }]
        );
        assert_eq!(chart.autotab_infos[&at].which, 3);
    }

    #[test]
    fn effect_list_is_never_emptied() {
        let mut chart = ChartInfo::default();
        for _ in 0..11 {
            chart.remove_effect(0).unwrap();
        }
        chart.remove_effect(0).unwrap();
        assert_eq!(chart.effect_list, vec![EffectEntry::default()]);
        assert_eq!(chart.autotab_list.len(), 1);
        assert_eq!(chart.remove_effect(1), Err(EffectTableError::OutOfBounds(1)));
    }
}
