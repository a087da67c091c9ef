//! FX effects, laser filters and auto-tab assignments.
//!
//! The effect vocabulary is closed: every effect the VOX format knows is a
//! variant of [`Effect`], and each variant publishes a static parameter
//! schema through [`Effect::schema`]. There is no reflection; editors query
//! the schema to present and validate parameter ranges.

use std::collections::HashMap;

use thiserror::Error;

/// The pass-band of a wobble filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PassFilterType {
    /// Low-pass.
    #[default]
    LowPass,
    /// High-pass.
    HighPass,
    /// Band-pass.
    BandPass,
}

impl PassFilterType {
    const fn to_vox(self) -> u8 {
        match self {
            Self::LowPass => 0,
            Self::HighPass => 1,
            Self::BandPass => 2,
        }
    }
}

/// The oscillator shape driving a wobble filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum WaveShape {
    /// Sawtooth.
    Saw,
    /// Square.
    Square,
    /// Triangle.
    Linear,
    /// Sine.
    #[default]
    Sine,
}

impl WaveShape {
    const fn to_vox(self) -> u8 {
        match self {
            Self::Saw => 0,
            Self::Square => 1,
            Self::Linear => 2,
            Self::Sine => 3,
        }
    }
}

/// One entry of an effect's parameter schema.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamDef {
    /// Parameter name as exposed to editors.
    pub name: &'static str,
    /// Smallest accepted value.
    pub min: f64,
    /// Largest accepted value.
    pub max: f64,
}

const fn param(name: &'static str, min: f64, max: f64) -> ParamDef {
    ParamDef { name, min, max }
}

/// An FX effect with its parameters.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Effect {
    /// Pass-through.
    NoEffect,
    /// Retrigger sampling at every update period.
    Retrigger {
        /// Wet/dry balance in percent.
        mix: f64,
        /// Repeats per update period.
        wavelength: i64,
        /// Update period in beats.
        update_period: f64,
        /// Feedback level.
        feedback: f64,
        /// Portion of the sample replayed.
        amount: f64,
        /// Volume decay per repeat.
        decay: f64,
    },
    /// Rhythmic volume gate.
    Gate {
        /// Wet/dry balance in percent.
        mix: f64,
        /// Gates per length.
        wavelength: i64,
        /// Gate length in beats.
        length: f64,
    },
    /// Flanger sweep.
    Flanger {
        /// Wet/dry balance in percent.
        mix: f64,
        /// Sweep period in beats.
        period: f64,
        /// Feedback level.
        feedback: f64,
        /// Stereo phase offset in percent.
        stereo_width: i64,
        /// High-cut gain in decibels.
        hicut_gain: f64,
    },
    /// Tape slowdown.
    Tapestop {
        /// Wet/dry balance in percent.
        mix: f64,
        /// Slowdown speed.
        speed: f64,
        /// Slowdown rate.
        rate: f64,
    },
    /// Sidechain compression pump.
    Sidechain {
        /// Wet/dry balance in percent.
        mix: f64,
        /// Pumps per beat.
        frequency: f64,
        /// Attack time in milliseconds.
        attack: i64,
        /// Hold time in milliseconds.
        hold: i64,
        /// Release time in milliseconds.
        release: i64,
    },
    /// Oscillating filter.
    Wobble {
        /// Wet/dry balance in percent.
        mix: f64,
        /// Filter pass-band.
        filter_type: PassFilterType,
        /// Oscillator shape.
        wave_shape: WaveShape,
        /// Lower cutoff in hertz.
        low_cutoff: f64,
        /// Upper cutoff in hertz.
        hi_cutoff: f64,
        /// Oscillations per beat.
        frequency: f64,
        /// Filter bandwidth.
        bandwidth: f64,
    },
    /// Sample-rate reduction.
    Bitcrush {
        /// Wet/dry balance in percent.
        mix: f64,
        /// Reduction amount in samples.
        amount: i64,
    },
    /// Retrigger sampling once at the effect start.
    RetriggerEx {
        /// Wet/dry balance in percent.
        mix: f64,
        /// Repeats per update period.
        wavelength: i64,
        /// Update period in beats.
        update_period: f64,
        /// Feedback level.
        feedback: f64,
        /// Portion of the sample replayed.
        amount: f64,
        /// Volume decay per repeat.
        decay: f64,
    },
    /// Pitch shift.
    PitchShift {
        /// Wet/dry balance in percent.
        mix: f64,
        /// Shift in semitones.
        amount: i64,
    },
    /// Tape scratch.
    Tapescratch {
        /// Wet/dry balance in percent.
        mix: f64,
        /// Curve slope.
        curve_slope: f64,
        /// Attack portion.
        attack: f64,
        /// Hold portion.
        hold: f64,
        /// Release portion.
        release: f64,
    },
    /// Fixed low-pass filter.
    LowpassFilter {
        /// Wet/dry balance in percent.
        mix: f64,
        /// Lower cutoff in hertz.
        low_cutoff: f64,
        /// Upper cutoff in hertz.
        hi_cutoff: f64,
        /// Filter bandwidth.
        bandwidth: f64,
    },
    /// Fixed high-pass filter.
    HighpassFilter {
        /// Wet/dry balance in percent.
        mix: f64,
        /// Cutoff in hertz.
        cutoff: f64,
        /// Curve slope.
        curve_slope: f64,
        /// Filter bandwidth.
        bandwidth: f64,
    },
}

impl Default for Effect {
    fn default() -> Self {
        Self::NoEffect
    }
}

/// A definition or parameter list could not be turned into an effect.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EffectParseError {
    /// The `type` key was absent from a definition line.
    #[error("effect definition has no type")]
    MissingType,
    /// The `type` value names no known effect.
    #[error("unknown effect type {0:?}")]
    UnknownType(String),
    /// A parameter value could not be parsed.
    #[error("invalid value {value:?} for parameter {name}")]
    BadValue {
        /// Parameter name.
        name: String,
        /// Offending value.
        value: String,
    },
    /// Too few positional parameters for this effect.
    #[error("{kind} requires at least {expected} parameter(s), got {got}")]
    MissingParams {
        /// Effect kind name.
        kind: &'static str,
        /// Required parameter count.
        expected: usize,
        /// Supplied parameter count.
        got: usize,
    },
}

impl Effect {
    /// Default retrigger (Re8).
    pub const fn retrigger() -> Self {
        Self::Retrigger {
            mix: 95.0,
            wavelength: 4,
            update_period: 2.0,
            feedback: 1.0,
            amount: 0.85,
            decay: 0.15,
        }
    }

    /// Default gate (Ga16).
    pub const fn gate() -> Self {
        Self::Gate {
            mix: 98.0,
            wavelength: 16,
            length: 2.0,
        }
    }

    /// Default flanger.
    pub const fn flanger() -> Self {
        Self::Flanger {
            mix: 75.0,
            period: 2.0,
            feedback: 0.5,
            stereo_width: 90,
            hicut_gain: 2.0,
        }
    }

    /// Flanger settings approximating KSM's phaser.
    pub const fn phaser() -> Self {
        Self::Flanger {
            mix: 50.0,
            period: 2.0,
            feedback: 0.35,
            stereo_width: 0,
            hicut_gain: 8.0,
        }
    }

    /// Default tapestop.
    pub const fn tapestop() -> Self {
        Self::Tapestop {
            mix: 100.0,
            speed: 8.0,
            rate: 0.4,
        }
    }

    /// Default sidechain.
    pub const fn sidechain() -> Self {
        Self::Sidechain {
            mix: 90.0,
            frequency: 1.0,
            attack: 45,
            hold: 50,
            release: 60,
        }
    }

    /// Default wobble (Wo12).
    pub const fn wobble() -> Self {
        Self::Wobble {
            mix: 80.0,
            filter_type: PassFilterType::LowPass,
            wave_shape: WaveShape::Sine,
            low_cutoff: 500.0,
            hi_cutoff: 18000.0,
            frequency: 4.0,
            bandwidth: 1.4,
        }
    }

    /// Default bitcrush.
    pub const fn bitcrush() -> Self {
        Self::Bitcrush {
            mix: 100.0,
            amount: 12,
        }
    }

    /// Default start-sampling retrigger.
    pub const fn retrigger_ex() -> Self {
        Self::RetriggerEx {
            mix: 95.0,
            wavelength: 8,
            update_period: 2.0,
            feedback: 1.0,
            amount: 0.85,
            decay: 0.15,
        }
    }

    /// Retrigger settings approximating KSM's echo (Echo4).
    pub const fn echo() -> Self {
        Self::RetriggerEx {
            mix: 100.0,
            wavelength: 4,
            update_period: 4.0,
            feedback: 0.6,
            amount: 1.0,
            decay: 0.8,
        }
    }

    /// Default pitch shift.
    pub const fn pitch_shift() -> Self {
        Self::PitchShift {
            mix: 100.0,
            amount: 12,
        }
    }

    /// Default tapescratch.
    pub const fn tapescratch() -> Self {
        Self::Tapescratch {
            mix: 100.0,
            curve_slope: 5.0,
            attack: 1.0,
            hold: 0.1,
            release: 1.0,
        }
    }

    /// Default fixed low-pass filter effect.
    pub const fn lowpass_filter() -> Self {
        Self::LowpassFilter {
            mix: 75.0,
            low_cutoff: 400.0,
            hi_cutoff: 900.0,
            bandwidth: 2.0,
        }
    }

    /// Default fixed high-pass filter effect.
    pub const fn highpass_filter() -> Self {
        Self::HighpassFilter {
            mix: 100.0,
            cutoff: 2000.0,
            curve_slope: 5.0,
            bandwidth: 1.4,
        }
    }

    /// Human-readable kind name.
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::NoEffect => "NoEffect",
            Self::Retrigger { .. } => "Retrigger",
            Self::Gate { .. } => "Gate",
            Self::Flanger { .. } => "Flanger",
            Self::Tapestop { .. } => "Tapestop",
            Self::Sidechain { .. } => "Sidechain",
            Self::Wobble { .. } => "Wobble",
            Self::Bitcrush { .. } => "Bitcrush",
            Self::RetriggerEx { .. } => "RetriggerEx",
            Self::PitchShift { .. } => "PitchShift",
            Self::Tapescratch { .. } => "Tapescratch",
            Self::LowpassFilter { .. } => "LowpassFilter",
            Self::HighpassFilter { .. } => "HighpassFilter",
        }
    }

    /// The numeric effect type written as the first field of a VOX record.
    pub const fn type_index(&self) -> u8 {
        match self {
            Self::NoEffect => 0,
            Self::Retrigger { .. } => 1,
            Self::Gate { .. } => 2,
            Self::Flanger { .. } => 3,
            Self::Tapestop { .. } => 4,
            Self::Sidechain { .. } => 5,
            Self::Wobble { .. } => 6,
            Self::Bitcrush { .. } => 7,
            Self::RetriggerEx { .. } => 8,
            Self::PitchShift { .. } => 9,
            Self::Tapescratch { .. } => 10,
            Self::LowpassFilter { .. } => 11,
            Self::HighpassFilter { .. } => 12,
        }
    }

    /// The static parameter schema of this effect kind, in VOX field order.
    pub const fn schema(&self) -> &'static [ParamDef] {
        match self {
            Self::NoEffect => &[],
            Self::Retrigger { .. } | Self::RetriggerEx { .. } => const {
                &[
                    param("wavelength", 1.0, 64.0),
                    param("mix", 0.0, 100.0),
                    param("updatePeriod", 0.0, 8.0),
                    param("feedback", 0.0, 1.0),
                    param("amount", 0.0, 1.0),
                    param("decay", 0.0, 1.0),
                ]
            },
            Self::Gate { .. } => const {
                &[
                    param("mix", 0.0, 100.0),
                    param("wavelength", 1.0, 64.0),
                    param("length", 0.0, 8.0),
                ]
            },
            Self::Flanger { .. } => const {
                &[
                    param("mix", 0.0, 100.0),
                    param("period", 0.0, 8.0),
                    param("feedback", 0.0, 1.0),
                    param("stereoWidth", 0.0, 100.0),
                    param("hiCutGain", -24.0, 24.0),
                ]
            },
            Self::Tapestop { .. } => const {
                &[
                    param("mix", 0.0, 100.0),
                    param("speed", 0.0, 100.0),
                    param("rate", 0.0, 1.0),
                ]
            },
            Self::Sidechain { .. } => const {
                &[
                    param("mix", 0.0, 100.0),
                    param("frequency", 0.0, 16.0),
                    param("attack", 0.0, 1000.0),
                    param("hold", 0.0, 1000.0),
                    param("release", 0.0, 1000.0),
                ]
            },
            Self::Wobble { .. } => const {
                &[
                    param("filterType", 0.0, 2.0),
                    param("waveShape", 0.0, 3.0),
                    param("mix", 0.0, 100.0),
                    param("loFreq", 10.0, 20000.0),
                    param("hiFreq", 10.0, 20000.0),
                    param("frequency", 0.0, 64.0),
                    param("Q", 0.1, 50.0),
                ]
            },
            Self::Bitcrush { .. } | Self::PitchShift { .. } => {
                const { &[param("mix", 0.0, 100.0), param("amount", 0.0, 48.0)] }
            }
            Self::Tapescratch { .. } => const {
                &[
                    param("mix", 0.0, 100.0),
                    param("curveSlope", 0.0, 10.0),
                    param("attack", 0.0, 10.0),
                    param("hold", 0.0, 10.0),
                    param("release", 0.0, 10.0),
                ]
            },
            Self::LowpassFilter { .. } => const {
                &[
                    param("mix", 0.0, 100.0),
                    param("loFreq", 10.0, 20000.0),
                    param("hiFreq", 10.0, 20000.0),
                    param("Q", 0.1, 50.0),
                ]
            },
            Self::HighpassFilter { .. } => const {
                &[
                    param("mix", 0.0, 100.0),
                    param("cutoff", 10.0, 20000.0),
                    param("curveSlope", 0.0, 10.0),
                    param("Q", 0.1, 50.0),
                ]
            },
        }
    }

    /// Applies the short positional parameter list KSH attaches to an effect
    /// name, e.g. the `8` of `Retrigger;8`.
    pub fn apply_short_params(&mut self, params: &[i64]) -> Result<(), EffectParseError> {
        let kind = self.kind_name();
        let missing = |expected: usize| EffectParseError::MissingParams {
            kind,
            expected,
            got: params.len(),
        };
        match self {
            Self::NoEffect
            | Self::Flanger { .. }
            | Self::Sidechain { .. }
            | Self::Tapescratch { .. }
            | Self::LowpassFilter { .. }
            | Self::HighpassFilter { .. } => Ok(()),
            Self::Retrigger {
                wavelength,
                update_period,
                ..
            } => {
                let first = *params.first().ok_or_else(|| missing(1))?;
                *wavelength = (first as f64 * *update_period / 4.0) as i64;
                Ok(())
            }
            Self::RetriggerEx {
                wavelength,
                update_period,
                feedback,
                ..
            } => {
                let first = *params.first().ok_or_else(|| missing(1))?;
                if let Some(&second) = params.get(1) {
                    *feedback = second as f64 / 100.0;
                }
                *wavelength = (first as f64 * *update_period / 4.0) as i64;
                Ok(())
            }
            Self::Gate {
                wavelength, length, ..
            } => {
                let first = *params.first().ok_or_else(|| missing(1))?;
                *wavelength = (first as f64 * *length / 2.0) as i64;
                Ok(())
            }
            Self::Tapestop { speed, .. } => {
                let first = *params.first().ok_or_else(|| missing(1))?;
                *speed = first as f64 * 0.16;
                Ok(())
            }
            Self::Wobble { frequency, .. } => {
                let first = *params.first().ok_or_else(|| missing(1))?;
                *frequency = first as f64 / 4.0;
                Ok(())
            }
            Self::Bitcrush { amount, .. } | Self::PitchShift { amount, .. } => {
                let first = *params.first().ok_or_else(|| missing(1))?;
                *amount = first;
                Ok(())
            }
        }
    }

    /// The comma-and-tab separated record of this effect for the FXBUTTON
    /// EFFECT INFO section.
    pub fn to_vox_string(&self) -> String {
        let idx = self.type_index();
        match *self {
            Self::NoEffect => format!("{idx},\t0,\t0,\t0,\t0,\t0,\t0"),
            Self::Retrigger {
                mix,
                wavelength,
                update_period,
                feedback,
                amount,
                decay,
            }
            | Self::RetriggerEx {
                mix,
                wavelength,
                update_period,
                feedback,
                amount,
                decay,
            } => format!(
                "{idx},\t{wavelength},\t{mix:.2},\t{update_period:.2},\t{feedback:.2},\t{amount:.2},\t{decay:.2}"
            ),
            Self::Gate {
                mix,
                wavelength,
                length,
            } => format!("{idx},\t{mix:.2},\t{wavelength},\t{length:.2}"),
            Self::Flanger {
                mix,
                period,
                feedback,
                stereo_width,
                hicut_gain,
            } => format!(
                "{idx},\t{mix:.2},\t{period:.2},\t{feedback:.2},\t{stereo_width},\t{hicut_gain:.2}"
            ),
            Self::Tapestop { mix, speed, rate } => {
                format!("{idx},\t{mix:.2},\t{speed:.2},\t{rate:.2}")
            }
            Self::Sidechain {
                mix,
                frequency,
                attack,
                hold,
                release,
            } => format!("{idx},\t{mix:.2},\t{frequency:.2},\t{attack},\t{hold},\t{release}"),
            Self::Wobble {
                mix,
                filter_type,
                wave_shape,
                low_cutoff,
                hi_cutoff,
                frequency,
                bandwidth,
            } => format!(
                "{idx},\t{},\t{},\t{mix:.2},\t{low_cutoff:.2},\t{hi_cutoff:.2},\t{frequency:.2},\t{bandwidth:.2}",
                filter_type.to_vox(),
                wave_shape.to_vox()
            ),
            Self::Bitcrush { mix, amount } | Self::PitchShift { mix, amount } => {
                format!("{idx},\t{mix:.2},\t{amount}")
            }
            Self::Tapescratch {
                mix,
                curve_slope,
                attack,
                hold,
                release,
            } => format!(
                "{idx},\t{mix:.2},\t{curve_slope:.2},\t{attack:.2},\t{hold:.2},\t{release:.2}"
            ),
            Self::LowpassFilter {
                mix,
                low_cutoff,
                hi_cutoff,
                bandwidth,
            } => format!("{idx},\t{mix:.2},\t{low_cutoff:.2},\t{hi_cutoff:.2},\t{bandwidth:.2}"),
            Self::HighpassFilter {
                mix,
                cutoff,
                curve_slope,
                bandwidth,
            } => format!("{idx},\t{mix:.2},\t{cutoff:.2},\t{curve_slope:.2},\t{bandwidth:.2}"),
        }
    }

    /// Looks up a KSH effect name, e.g. `Retrigger` or `TapeStop`.
    pub fn from_ksh_name(name: &str) -> Option<Self> {
        match name {
            "Retrigger" => Some(Self::retrigger()),
            "Gate" => Some(Self::gate()),
            "Flanger" => Some(Self::flanger()),
            "PitchShift" => Some(Self::pitch_shift()),
            "BitCrusher" => Some(Self::bitcrush()),
            "Phaser" => Some(Self::phaser()),
            "Wobble" => Some(Self::wobble()),
            "TapeStop" => Some(Self::tapestop()),
            "Echo" => Some(Self::echo()),
            "SideChain" => Some(Self::sidechain()),
            _ => None,
        }
    }

    /// Builds an effect from the key-value map of a `#define_fx` or
    /// `#define_filter` line.
    pub fn from_definition(params: &HashMap<String, String>) -> Result<Self, EffectParseError> {
        let type_name = params.get("type").ok_or(EffectParseError::MissingType)?;
        let get_len = |key: &str| -> Result<Option<f64>, EffectParseError> {
            params
                .get(key)
                .map(|v| {
                    parse_length(v).ok_or_else(|| EffectParseError::BadValue {
                        name: key.to_owned(),
                        value: v.clone(),
                    })
                })
                .transpose()
        };
        let effect = match type_name.as_str() {
            "Retrigger" | "Echo" => {
                let update_period = get_len("updatePeriod")?;
                // A zero update period means resampling never restarts,
                // which the VOX side expresses as the EX retrigger.
                if update_period == Some(0.0) {
                    let mut effect = Self::retrigger_ex();
                    if let Self::RetriggerEx {
                        mix,
                        wavelength,
                        update_period,
                        feedback,
                        amount,
                        ..
                    } = &mut effect
                    {
                        *update_period = 4.0;
                        if let Some(v) = get_len("waveLength")? {
                            if v > 0.0 {
                                *wavelength = (1.0 / v) as i64;
                            }
                        }
                        if let Some(v) = get_len("feedbackLevel")? {
                            *feedback = v;
                        }
                        if let Some(v) = get_len("rate")? {
                            *amount = v;
                        }
                        if let Some(v) = get_len("mix")? {
                            *mix = v * 100.0;
                        }
                    }
                    effect
                } else {
                    let mut effect = Self::retrigger();
                    if let Self::Retrigger {
                        mix,
                        wavelength,
                        update_period: period,
                        amount,
                        ..
                    } = &mut effect
                    {
                        if let Some(v) = update_period {
                            *period = v * 4.0;
                        }
                        if let Some(v) = get_len("waveLength")? {
                            if v > 0.0 {
                                *wavelength = (*period / 4.0 / v) as i64;
                            }
                        }
                        if let Some(v) = get_len("rate")? {
                            *amount = v;
                        }
                        if let Some(v) = get_len("mix")? {
                            *mix = v * 100.0;
                        }
                    }
                    effect
                }
            }
            "Gate" => {
                let mut effect = Self::gate();
                if let Self::Gate {
                    mix,
                    wavelength,
                    length,
                } = &mut effect
                {
                    if let Some(v) = get_len("mix")? {
                        *mix = v * 100.0;
                    }
                    if let Some(v) = get_len("waveLength")? {
                        if v > 0.0 {
                            *wavelength = (*length / 2.0 / v) as i64;
                        }
                    }
                }
                effect
            }
            "Flanger" | "Phaser" => {
                let mut effect = if type_name == "Phaser" {
                    Self::phaser()
                } else {
                    Self::flanger()
                };
                if let Self::Flanger {
                    mix,
                    period,
                    feedback,
                    stereo_width,
                    hicut_gain,
                } = &mut effect
                {
                    if let Some(v) = get_len("period")? {
                        *period = v * 4.0;
                    }
                    if let Some(v) = get_len("feedback")? {
                        *feedback = v;
                    }
                    if let Some(v) = get_len("stereoWidth")? {
                        *stereo_width = (v * 100.0) as i64;
                    }
                    if let Some(v) = params.get("hiCutGain") {
                        *hicut_gain =
                            parse_decibel(v).ok_or_else(|| EffectParseError::BadValue {
                                name: "hiCutGain".to_owned(),
                                value: v.clone(),
                            })?;
                    }
                    if let Some(v) = get_len("mix")? {
                        *mix = v * 100.0;
                    }
                }
                effect
            }
            "PitchShift" => {
                let mut effect = Self::pitch_shift();
                if let Self::PitchShift { mix, amount } = &mut effect {
                    if let Some(v) = params.get("pitch") {
                        *amount = v.parse::<f64>().map_err(|_| EffectParseError::BadValue {
                            name: "pitch".to_owned(),
                            value: v.clone(),
                        })? as i64;
                    }
                    if let Some(v) = get_len("mix")? {
                        *mix = v * 100.0;
                    }
                }
                effect
            }
            "BitCrusher" => {
                let mut effect = Self::bitcrush();
                if let Self::Bitcrush { mix, amount } = &mut effect {
                    if let Some(v) = params.get("reduction") {
                        if let Some(samples) = v.strip_suffix("samples") {
                            *amount =
                                samples
                                    .parse()
                                    .map_err(|_| EffectParseError::BadValue {
                                        name: "reduction".to_owned(),
                                        value: v.clone(),
                                    })?;
                        }
                    }
                    if let Some(v) = get_len("mix")? {
                        *mix = v * 100.0;
                    }
                }
                effect
            }
            "Wobble" => {
                let mut effect = Self::wobble();
                if let Self::Wobble {
                    mix,
                    low_cutoff,
                    hi_cutoff,
                    frequency,
                    bandwidth,
                    ..
                } = &mut effect
                {
                    if let Some(v) = get_len("waveLength")? {
                        if v > 0.0 {
                            *frequency = 0.25 / v;
                        }
                    }
                    if let Some(v) = params.get("loFreq") {
                        *low_cutoff =
                            parse_frequency(v).ok_or_else(|| EffectParseError::BadValue {
                                name: "loFreq".to_owned(),
                                value: v.clone(),
                            })?;
                    }
                    if let Some(v) = params.get("hiFreq") {
                        *hi_cutoff =
                            parse_frequency(v).ok_or_else(|| EffectParseError::BadValue {
                                name: "hiFreq".to_owned(),
                                value: v.clone(),
                            })?;
                    }
                    if let Some(v) = params.get("Q") {
                        *bandwidth = v.parse().map_err(|_| EffectParseError::BadValue {
                            name: "Q".to_owned(),
                            value: v.clone(),
                        })?;
                    }
                    if let Some(v) = get_len("mix")? {
                        *mix = v * 100.0;
                    }
                }
                effect
            }
            "TapeStop" => {
                let mut effect = Self::tapestop();
                if let Self::Tapestop { mix, speed, .. } = &mut effect {
                    if let Some(v) = get_len("speed")? {
                        *speed = v * 0.16;
                    }
                    if let Some(v) = get_len("mix")? {
                        *mix = v * 100.0;
                    }
                }
                effect
            }
            "SideChain" => {
                let mut effect = Self::sidechain();
                if let Self::Sidechain {
                    mix,
                    frequency,
                    attack,
                    hold,
                    release,
                } = &mut effect
                {
                    if let Some(v) = get_len("period")? {
                        if v > 0.0 {
                            *frequency = 0.25 / v;
                        }
                    }
                    if let Some(v) = params.get("attackTime") {
                        *attack = parse_time(v).ok_or_else(|| EffectParseError::BadValue {
                            name: "attackTime".to_owned(),
                            value: v.clone(),
                        })? as i64;
                    }
                    if let Some(v) = params.get("holdTime") {
                        *hold = parse_time(v).ok_or_else(|| EffectParseError::BadValue {
                            name: "holdTime".to_owned(),
                            value: v.clone(),
                        })? as i64;
                    }
                    if let Some(v) = params.get("releaseTime") {
                        *release = parse_time(v).ok_or_else(|| EffectParseError::BadValue {
                            name: "releaseTime".to_owned(),
                            value: v.clone(),
                        })? as i64;
                    }
                    if let Some(v) = get_len("mix")? {
                        *mix = v * 100.0;
                    }
                }
                effect
            }
            other => return Err(EffectParseError::UnknownType(other.to_owned())),
        };
        Ok(effect)
    }
}

/// One FXBUTTON EFFECT INFO slot: two effects rendered together.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EffectEntry {
    /// First layered effect.
    pub effect1: Effect,
    /// Second layered effect.
    pub effect2: Effect,
}

impl EffectEntry {
    /// An entry rendering `effect` over silence on the second layer.
    pub fn single(effect: Effect) -> Self {
        Self {
            effect1: effect,
            effect2: Effect::NoEffect,
        }
    }

    /// Both effect records, one per line.
    pub fn to_vox_string(&self) -> String {
        format!(
            "{}\n{}\n",
            self.effect1.to_vox_string(),
            self.effect2.to_vox_string()
        )
    }
}

/// A laser filter definition for the TAB EFFECT INFO section.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Filter {
    /// Low-pass filter sweep.
    Lowpass {
        /// Wet/dry balance in percent.
        mix: f64,
        /// Cutoff at laser position 0.
        min_cutoff: f64,
        /// Cutoff at laser position 127.
        max_cutoff: f64,
        /// Filter bandwidth.
        bandwidth: f64,
    },
    /// High-pass filter sweep.
    Highpass {
        /// Wet/dry balance in percent.
        mix: f64,
        /// Cutoff at laser position 0.
        min_cutoff: f64,
        /// Cutoff at laser position 127.
        max_cutoff: f64,
        /// Filter bandwidth.
        bandwidth: f64,
    },
    /// Bitcrush sweep.
    Bitcrush {
        /// Wet/dry balance in percent.
        mix: f64,
        /// Reduction at laser position 127.
        max_amount: i64,
    },
}

impl Filter {
    const fn type_index(&self) -> u8 {
        match self {
            Self::Lowpass { .. } => 1,
            Self::Highpass { .. } => 2,
            Self::Bitcrush { .. } => 3,
        }
    }

    /// The record of this filter for the TAB EFFECT INFO section.
    pub fn to_vox_string(&self) -> String {
        let idx = self.type_index();
        match *self {
            Self::Lowpass {
                mix,
                min_cutoff,
                max_cutoff,
                bandwidth,
            }
            | Self::Highpass {
                mix,
                min_cutoff,
                max_cutoff,
                bandwidth,
            } => format!("{idx},\t{mix:.2},\t{min_cutoff:.2},\t{max_cutoff:.2},\t{bandwidth:.2}"),
            Self::Bitcrush { mix, max_amount } => format!("{idx},\t{mix:.2},\t{max_amount}"),
        }
    }
}

/// The filter list every chart starts with.
pub fn default_filters() -> Vec<Filter> {
    vec![
        Filter::Lowpass {
            mix: 90.0,
            min_cutoff: 400.0,
            max_cutoff: 18000.0,
            bandwidth: 0.7,
        },
        Filter::Lowpass {
            mix: 90.0,
            min_cutoff: 600.0,
            max_cutoff: 15000.0,
            bandwidth: 5.0,
        },
        Filter::Highpass {
            mix: 90.0,
            min_cutoff: 40.0,
            max_cutoff: 5000.0,
            bandwidth: 0.7,
        },
        Filter::Highpass {
            mix: 90.0,
            min_cutoff: 40.0,
            max_cutoff: 2000.0,
            bandwidth: 3.0,
        },
        Filter::Bitcrush {
            mix: 100.0,
            max_amount: 30,
        },
    ]
}

/// One auto-tab parameter sweep: which parameter of an effect entry a laser
/// drives, and over what range.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AutotabSetting {
    /// Index into the effect list.
    pub effect_index: usize,
    /// Index into the effect's parameter schema.
    pub param_index: usize,
    /// Parameter value at laser position 0.
    pub min_value: f64,
    /// Parameter value at laser position 127.
    pub max_value: f64,
}

impl AutotabSetting {
    /// A no-sweep setting pointing at `effect_index`.
    pub const fn new(effect_index: usize) -> Self {
        Self {
            effect_index,
            param_index: 0,
            min_value: 0.0,
            max_value: 0.0,
        }
    }

    /// Whether `param_index` names a parameter of `effect`'s schema.
    pub fn is_valid_for(&self, effect: &Effect) -> bool {
        self.param_index < effect.schema().len() || effect.schema().is_empty()
    }

    /// Resets the sweep after the referenced entry changed kind; the old
    /// parameter index and range are meaningless against the new schema.
    pub fn reset(&mut self) {
        self.param_index = 0;
        self.min_value = 0.0;
        self.max_value = 0.0;
    }

    fn to_vox_string(self) -> String {
        format!(
            "{},\t{},\t{:.2},\t{:.2}",
            self.effect_index, self.param_index, self.min_value, self.max_value
        )
    }
}

/// One TAB PARAM ASSIGN INFO entry: a sweep per layered effect.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AutotabEntry {
    /// Sweep for the first layered effect.
    pub setting1: AutotabSetting,
    /// Sweep for the second layered effect.
    pub setting2: AutotabSetting,
}

impl AutotabEntry {
    /// An entry with both sweeps pointing at `effect_index`.
    pub const fn new(effect_index: usize) -> Self {
        Self {
            setting1: AutotabSetting::new(effect_index),
            setting2: AutotabSetting::new(effect_index),
        }
    }

    /// Both sweep records, one per line.
    pub fn to_vox_string(&self) -> String {
        format!(
            "{}\n{}\n",
            self.setting1.to_vox_string(),
            self.setting2.to_vox_string()
        )
    }
}

/// The twelve effect entries every chart starts with.
pub fn default_effects() -> Vec<EffectEntry> {
    vec![
        // Re8
        EffectEntry::single(Effect::retrigger()),
        // Re16
        EffectEntry::single(Effect::Retrigger {
            mix: 95.0,
            wavelength: 8,
            update_period: 2.0,
            feedback: 1.0,
            amount: 0.85,
            decay: 0.1,
        }),
        // Ga16
        EffectEntry::single(Effect::gate()),
        // Flanger
        EffectEntry::single(Effect::flanger()),
        // Re32
        EffectEntry::single(Effect::Retrigger {
            mix: 95.0,
            wavelength: 16,
            update_period: 2.0,
            feedback: 1.0,
            amount: 0.87,
            decay: 0.13,
        }),
        // Ga8
        EffectEntry::single(Effect::Gate {
            mix: 98.0,
            wavelength: 4,
            length: 2.0,
        }),
        // Echo4
        EffectEntry::single(Effect::echo()),
        // Tapestop
        EffectEntry::single(Effect::tapestop()),
        // Sidechain
        EffectEntry::single(Effect::sidechain()),
        // Wo12
        EffectEntry::single(Effect::wobble()),
        // Re12
        EffectEntry::single(Effect::Retrigger {
            mix: 95.0,
            wavelength: 6,
            update_period: 2.0,
            feedback: 1.0,
            amount: 0.85,
            decay: 0.15,
        }),
        // Bitcrush
        EffectEntry::single(Effect::bitcrush()),
    ]
}

/// The twelve auto-tab entries every chart starts with, one per default
/// effect slot.
pub fn default_autotabs() -> Vec<AutotabEntry> {
    (0..12).map(AutotabEntry::new).collect()
}

fn parse_length(s: &str) -> Option<f64> {
    if let Ok(v) = s.parse() {
        return Some(v);
    }
    if let Some((num, denom)) = s.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let denom: f64 = denom.parse().ok()?;
        if denom == 0.0 {
            return None;
        }
        return Some(num / denom);
    }
    if let Some(percent) = s.strip_suffix('%') {
        return percent.parse::<f64>().ok().map(|v| v / 100.0);
    }
    None
}

fn parse_decibel(s: &str) -> Option<f64> {
    s.strip_suffix("dB")?.parse().ok()
}

fn parse_frequency(s: &str) -> Option<f64> {
    let s = s.strip_suffix("Hz")?;
    if let Some(kilo) = s.strip_suffix('k') {
        return kilo.parse::<f64>().ok().map(|v| v * 1000.0);
    }
    s.parse().ok()
}

/// Parses a KSH duration into milliseconds.
fn parse_time(s: &str) -> Option<f64> {
    let s = s.strip_suffix('s')?;
    if let Some(millis) = s.strip_suffix('m') {
        return millis.parse().ok();
    }
    s.parse::<f64>().ok().map(|v| v * 1000.0)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn vox_records_follow_field_order() {
        assert_eq!(
            Effect::NoEffect.to_vox_string(),
            "0,\t0,\t0,\t0,\t0,\t0,\t0"
        );
        assert_eq!(
            Effect::retrigger().to_vox_string(),
            "1,\t4,\t95.00,\t2.00,\t1.00,\t0.85,\t0.15"
        );
        assert_eq!(
            Effect::gate().to_vox_string(),
            "2,\t98.00,\t16,\t2.00"
        );
        assert_eq!(
            Effect::wobble().to_vox_string(),
            "6,\t0,\t3,\t80.00,\t500.00,\t18000.00,\t4.00,\t1.40"
        );
    }

    #[test]
    fn default_lists_have_expected_sizes() {
        assert_eq!(default_effects().len(), 12);
        assert_eq!(default_filters().len(), 5);
        assert_eq!(default_autotabs().len(), 12);
    }

    #[test]
    fn short_params_adjust_wavelength() {
        let mut effect = Effect::retrigger();
        effect.apply_short_params(&[8]).unwrap();
        match effect {
            Effect::Retrigger { wavelength, .. } => assert_eq!(wavelength, 4),
            other => panic!("unexpected effect {other:?}"),
        }

        let mut effect = Effect::bitcrush();
        assert_eq!(
            effect.apply_short_params(&[]),
            Err(EffectParseError::MissingParams {
                kind: "Bitcrush",
                expected: 1,
                got: 0,
            })
        );
    }

    #[test]
    fn definition_lines_build_effects() {
        let mut params = HashMap::new();
        params.insert("type".to_owned(), "Retrigger".to_owned());
        params.insert("updatePeriod".to_owned(), "1/2".to_owned());
        params.insert("mix".to_owned(), "80%".to_owned());
        let effect = Effect::from_definition(&params).unwrap();
        match effect {
            Effect::Retrigger {
                mix, update_period, ..
            } => {
                assert_eq!(update_period, 2.0);
                assert_eq!(mix, 80.0);
            }
            other => panic!("unexpected effect {other:?}"),
        }

        let mut params = HashMap::new();
        params.insert("type".to_owned(), "Blender".to_owned());
        assert_eq!(
            Effect::from_definition(&params),
            Err(EffectParseError::UnknownType("Blender".to_owned()))
        );
    }

    #[test]
    fn autotab_reset_clears_sweep() {
        let mut setting = AutotabSetting {
            effect_index: 3,
            param_index: 2,
            min_value: 10.0,
            max_value: 90.0,
        };
        setting.reset();
        assert_eq!(setting, AutotabSetting::new(3));
        assert!(setting.is_valid_for(&Effect::flanger()));
    }
}
