//! Common vocabulary shared by the lexer, the directive interpreter and the
//! chart model.

pub mod mixin;
pub mod time;

use thiserror::Error;

/// The eight playable lanes of a chart.
///
/// Lane order follows the VOX track layout: VOL-L is TRACK1, VOL-R is
/// TRACK8 with the buttons in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Lane {
    /// Left laser.
    VolL,
    /// Left FX button.
    FxL,
    /// BT-A button.
    BtA,
    /// BT-B button.
    BtB,
    /// BT-C button.
    BtC,
    /// BT-D button.
    BtD,
    /// Right FX button.
    FxR,
    /// Right laser.
    VolR,
}

impl Lane {
    /// All lanes in VOX track order.
    pub const ALL: [Self; 8] = [
        Self::VolL,
        Self::FxL,
        Self::BtA,
        Self::BtB,
        Self::BtC,
        Self::BtD,
        Self::FxR,
        Self::VolR,
    ];

    /// The 1-based VOX track number of this lane.
    pub const fn track_number(self) -> u8 {
        match self {
            Self::VolL => 1,
            Self::FxL => 2,
            Self::BtA => 3,
            Self::BtB => 4,
            Self::BtC => 5,
            Self::BtD => 6,
            Self::FxR => 7,
            Self::VolR => 8,
        }
    }

    /// The bit selecting this lane in a script mask. Reading the mask MSB to
    /// LSB gives VOL-L, BT-A, BT-C, FX-R, FX-L, BT-B, BT-D, VOL-R.
    pub const fn mask_bit(self) -> u8 {
        match self {
            Self::VolL => 0x80,
            Self::BtA => 0x40,
            Self::BtC => 0x20,
            Self::FxR => 0x10,
            Self::FxL => 0x08,
            Self::BtB => 0x04,
            Self::BtD => 0x02,
            Self::VolR => 0x01,
        }
    }

    /// The lanes selected by an 8-bit script mask, in track order.
    pub fn from_mask(mask: u8) -> impl Iterator<Item = Self> {
        Self::ALL
            .into_iter()
            .filter(move |lane| mask & lane.mask_bit() != 0)
    }
}

impl std::fmt::Display for Lane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::VolL => "VOL-L",
            Self::FxL => "FX-L",
            Self::BtA => "BT-A",
            Self::BtB => "BT-B",
            Self::BtC => "BT-C",
            Self::BtD => "BT-D",
            Self::FxR => "FX-R",
            Self::VolR => "VOL-R",
        };
        write!(f, "{name}")
    }
}

/// The difficulty slot a chart occupies in the song entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DifficultySlot {
    /// NOVICE, slot 1.
    Novice,
    /// ADVANCED, slot 2.
    Advanced,
    /// EXHAUST, slot 3.
    Exhaust,
    /// INFINITE, slot 4.
    Infinite,
    /// MAXIMUM, slot 5.
    #[default]
    Maximum,
}

impl DifficultySlot {
    /// All slots in ascending order.
    pub const ALL: [Self; 5] = [
        Self::Novice,
        Self::Advanced,
        Self::Exhaust,
        Self::Infinite,
        Self::Maximum,
    ];

    /// The 1-based slot number.
    pub const fn number(self) -> u8 {
        match self {
            Self::Novice => 1,
            Self::Advanced => 2,
            Self::Exhaust => 3,
            Self::Infinite => 4,
            Self::Maximum => 5,
        }
    }

    /// The lowercase slot name used as an XML tag.
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Novice => "novice",
            Self::Advanced => "advanced",
            Self::Exhaust => "exhaust",
            Self::Infinite => "infinite",
            Self::Maximum => "maximum",
        }
    }

    /// The file-name shorthand, e.g. `4i` for INFINITE.
    pub fn shorthand(self) -> String {
        let initial = self.tag().chars().next().unwrap_or('m');
        format!("{}{}", self.number(), initial)
    }

    /// Maps a KSH `difficulty` value. Anything unrecognized lands in the
    /// MAXIMUM slot, like the game's own importer.
    pub fn from_ksh(value: &str) -> Self {
        match value {
            "light" => Self::Novice,
            "challenge" => Self::Advanced,
            "extended" => Self::Exhaust,
            "infinite" => Self::Infinite,
            _ => Self::Maximum,
        }
    }
}

/// The curve applied to a laser segment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EasingType {
    /// Straight segment, no inserted points.
    #[default]
    NoEase,
    /// Evenly spaced interpolation.
    Linear,
    /// Fast start, slow finish: `sin(t * pi / 2)`.
    EaseOut,
    /// Slow start, fast finish: `1 - cos(t * pi / 2)`.
    EaseIn,
}

/// The numeric curve type was not one of 2, 4 or 5.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown curve type {0}")]
pub struct UnknownCurveType(pub u32);

impl TryFrom<u32> for EasingType {
    type Error = UnknownCurveType;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            2 => Ok(Self::Linear),
            4 => Ok(Self::EaseOut),
            5 => Ok(Self::EaseIn),
            other => Err(UnknownCurveType(other)),
        }
    }
}

impl EasingType {
    /// The numeric code written into VOX VOL records.
    pub const fn to_vox(self) -> u8 {
        match self {
            Self::NoEase => 0,
            Self::Linear => 2,
            Self::EaseOut => 4,
            Self::EaseIn => 5,
        }
    }
}

/// The filter slot a laser drives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FilterIndex {
    /// Peaking filter, slot 0.
    #[default]
    Peak,
    /// Alternate low-pass, slot 1.
    LpfAlt,
    /// Low-pass, slot 2.
    Lpf,
    /// Alternate high-pass, slot 3.
    HpfAlt,
    /// High-pass, slot 4.
    Hpf,
    /// Bitcrush, slot 5.
    Bitcrush,
    /// A chart-defined filter, slot 6.
    Custom,
}

impl FilterIndex {
    /// The slot number written into VOX records.
    pub const fn to_vox(self) -> u8 {
        match self {
            Self::Peak => 0,
            Self::LpfAlt => 1,
            Self::Lpf => 2,
            Self::HpfAlt => 3,
            Self::Hpf => 4,
            Self::Bitcrush => 5,
            Self::Custom => 6,
        }
    }

    /// Maps a KSH `filtertype` value to its built-in slot, if it names one.
    pub fn from_ksh(value: &str) -> Option<Self> {
        match value {
            "peak" => Some(Self::Peak),
            "lpf1" => Some(Self::Lpf),
            "hpf1" => Some(Self::Hpf),
            "bitc" => Some(Self::Bitcrush),
            _ => None,
        }
    }

    /// Maps a built-in slot number (1 through 5).
    pub const fn from_slot(slot: u8) -> Option<Self> {
        match slot {
            1 => Some(Self::LpfAlt),
            2 => Some(Self::Lpf),
            3 => Some(Self::HpfAlt),
            4 => Some(Self::Hpf),
            5 => Some(Self::Bitcrush),
            _ => None,
        }
    }
}

/// The lane spin attached to a slam.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SpinType {
    /// No spin.
    #[default]
    NoSpin,
    /// Full rotation.
    SingleSpin,
    /// Full rotation, variant 2.
    SingleSpin2,
    /// Full rotation, variant 3.
    SingleSpin3,
    /// Three rotations.
    TripleSpin,
    /// Swing without a full rotation.
    HalfSpin,
}

impl SpinType {
    /// The numeric code written into VOX VOL records.
    pub const fn to_vox(self) -> u8 {
        match self {
            Self::NoSpin => 0,
            Self::SingleSpin => 1,
            Self::SingleSpin2 => 2,
            Self::SingleSpin3 => 3,
            Self::TripleSpin => 4,
            Self::HalfSpin => 5,
        }
    }
}

/// The lane tilt behavior.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TiltMode {
    /// Tilt follows the lasers at normal strength.
    #[default]
    Normal,
    /// Stronger tilt.
    Bigger,
    /// Tilt holds its last value.
    Keep,
}

impl TiltMode {
    /// The numeric code written into the TILT MODE INFO section.
    pub const fn to_vox(self) -> u8 {
        match self {
            Self::Normal => 0,
            Self::Bigger => 1,
            Self::Keep => 2,
        }
    }
}

/// Marks where a laser point sits within its segment. `START` and `END` can
/// combine into `POINT` for an isolated point (a lone slam).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SegmentFlag(u8);

impl SegmentFlag {
    /// Interior point of a segment.
    pub const MIDDLE: Self = Self(0);
    /// First point of a segment.
    pub const START: Self = Self(1);
    /// Last point of a segment.
    pub const END: Self = Self(2);
    /// Isolated point, both start and end.
    pub const POINT: Self = Self(3);

    /// Whether all bits of `other` are set in `self`.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0 && (other.0 != 0 || self.0 == 0)
    }

    /// The numeric code written into VOX VOL records.
    pub const fn to_vox(self) -> u8 {
        self.0
    }
}

impl std::ops::BitOr for SegmentFlag {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for SegmentFlag {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// The backdrop set an INFINITE chart belongs to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum InfVer {
    /// INFINITE (SDVX II).
    #[default]
    Infinite,
    /// GRAVITY (SDVX III).
    Gravity,
    /// HEAVENLY (SDVX IV).
    Heavenly,
    /// VIVID (SDVX V).
    Vivid,
    /// EXCEED (SDVX VI).
    Exceed,
}

impl InfVer {
    /// The numeric code written into the XML `inf_ver` field.
    pub const fn to_xml(self) -> u8 {
        match self {
            Self::Infinite => 2,
            Self::Gravity => 3,
            Self::Heavenly => 4,
            Self::Vivid => 5,
            Self::Exceed => 6,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn script_mask_bit_order() {
        // 0xA2 = 0b10100010 selects the 1st, 3rd and 7th lanes of the
        // documented MSB-to-LSB order.
        let lanes: Vec<_> = Lane::from_mask(0xA2).collect();
        assert_eq!(lanes, vec![Lane::VolL, Lane::BtC, Lane::BtD]);

        let all: Vec<_> = Lane::from_mask(0xFF).collect();
        assert_eq!(all.len(), 8);
        assert_eq!(Lane::from_mask(0).count(), 0);
    }

    #[test]
    fn difficulty_slot_mapping() {
        assert_eq!(DifficultySlot::from_ksh("light"), DifficultySlot::Novice);
        assert_eq!(
            DifficultySlot::from_ksh("challenge"),
            DifficultySlot::Advanced
        );
        assert_eq!(DifficultySlot::from_ksh("extended"), DifficultySlot::Exhaust);
        assert_eq!(DifficultySlot::from_ksh("infinite"), DifficultySlot::Infinite);
        assert_eq!(DifficultySlot::from_ksh("unheard"), DifficultySlot::Maximum);
        assert_eq!(DifficultySlot::Exhaust.shorthand(), "3e");
    }

    #[test]
    fn curve_type_codes() {
        assert_eq!(EasingType::try_from(2), Ok(EasingType::Linear));
        assert_eq!(EasingType::try_from(4), Ok(EasingType::EaseOut));
        assert_eq!(EasingType::try_from(5), Ok(EasingType::EaseIn));
        assert_eq!(EasingType::try_from(3), Err(UnknownCurveType(3)));
    }

    #[test]
    fn segment_flag_combination() {
        let mut flag = SegmentFlag::START;
        flag |= SegmentFlag::END;
        assert_eq!(flag, SegmentFlag::POINT);
        assert!(flag.contains(SegmentFlag::START));
        assert!(flag.contains(SegmentFlag::END));
        assert!(!SegmentFlag::START.contains(SegmentFlag::MIDDLE));
        assert!(SegmentFlag::MIDDLE.contains(SegmentFlag::MIDDLE));
    }
}
