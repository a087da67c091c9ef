//! Classified lines of a KSH source file.

/// State of one BT slot in a chart line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BtChar {
    /// `0`, nothing on the lane.
    #[default]
    None,
    /// `1`, a chip.
    Chip,
    /// `2`, part of a hold.
    Hold,
}

/// State of one FX slot in a chart line. Note the chip and hold digits are
/// swapped relative to the BT slots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FxChar {
    /// `0`, nothing on the lane.
    #[default]
    None,
    /// `1`, part of a hold.
    Hold,
    /// `2`, a chip.
    Chip,
}

/// State of one laser slot in a chart line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum VolChar {
    /// `-`, no laser.
    #[default]
    None,
    /// `:`, the segment passes through without a written point.
    Connect,
    /// A position character from one of the laser alphabets.
    Position(char),
}

/// Whether a spin mark requests a full rotation or a half swing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SpinLead {
    /// `@`, a full spin.
    Full,
    /// `S`, a half spin.
    Half,
}

/// Which way a spin mark turns the lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SpinDir {
    /// `(` or `<`, matching a falling slam.
    Left,
    /// `)` or `>`, matching a rising slam.
    Right,
}

/// A spin suffix on a chart line, e.g. `@(192`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SpinMark {
    /// Full spin or half swing.
    pub lead: SpinLead,
    /// Turn direction.
    pub dir: SpinDir,
    /// Length in 192nds of a whole note.
    pub length: u32,
}

/// One chart line: four BT slots, two FX slots, two laser slots and an
/// optional spin suffix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChartLine {
    /// BT lanes A to D.
    pub bts: [BtChar; 4],
    /// FX lanes, left then right.
    pub fxs: [FxChar; 2],
    /// Laser lanes, left then right.
    pub vols: [VolChar; 2],
    /// Spin suffix, if any.
    pub spin: Option<SpinMark>,
}

/// A classified line inside a measure.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BodyLine<'a> {
    /// A chart line.
    Chart(ChartLine),
    /// A `key=value` option line.
    Option {
        /// Option name.
        key: &'a str,
        /// Option value, possibly empty.
        value: &'a str,
    },
    /// The text after a `//` marker.
    Comment(&'a str),
}

/// Which definition table a footer line extends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DefinitionKind {
    /// `#define_fx`.
    Effect,
    /// `#define_filter`.
    Filter,
}

/// A `#define_fx` or `#define_filter` footer line.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Definition<'a> {
    /// Effect or filter definition.
    pub kind: DefinitionKind,
    /// Name the chart refers to this definition by.
    pub name: &'a str,
    /// `key=value` parameters, in source order.
    pub params: Vec<(&'a str, &'a str)>,
}
