//! Curve flattening for laser segments.
//!
//! A curve span authored over a laser segment is replaced by a run of
//! interpolated points. The easing functions map `[0, 1]` onto `[0, 1]` and
//! are strictly increasing, so the interpolation is exact at both endpoints
//! no matter the sub-range in use.

use std::f64::consts::FRAC_PI_2;

use super::command::EasingType;

/// Highest laser position. Positions run from 0 (far left) to 127 (far
/// right).
pub const MAX_LASER_POSITION: u8 = 127;

fn clamp_unit(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}

/// Evaluates the easing curve at `t` in `[0, 1]`.
pub fn ease(easing: EasingType, t: f64) -> f64 {
    let t = clamp_unit(t);
    match easing {
        EasingType::NoEase | EasingType::Linear => t,
        EasingType::EaseOut => (t * FRAC_PI_2).sin(),
        EasingType::EaseIn => 1.0 - (t * FRAC_PI_2).cos(),
    }
}

/// Interpolates between `initial` and `final_pos` at progress `t`, with the
/// easing curve restricted to `sub_range` and renormalized so `t = 0` and
/// `t = 1` hit the endpoints exactly.
pub fn interpolate(
    easing: EasingType,
    t: f64,
    initial: f64,
    final_pos: f64,
    sub_range: (f64, f64),
) -> f64 {
    if t <= 0.0 {
        return initial;
    }
    if t >= 1.0 {
        return final_pos;
    }
    let (lo, hi) = sub_range;
    let span = ease(easing, hi) - ease(easing, lo);
    let progress = if span.abs() < f64::EPSILON {
        t
    } else {
        let u = lo + t * (hi - lo);
        (ease(easing, u) - ease(easing, lo)) / span
    };
    initial + progress * (final_pos - initial)
}

/// [`interpolate`] rounded onto the integer laser position grid.
pub fn interpolate_position(
    easing: EasingType,
    t: f64,
    initial: u8,
    final_pos: u8,
    sub_range: (f64, f64),
) -> u8 {
    let value = interpolate(
        easing,
        t,
        f64::from(initial),
        f64::from(final_pos),
        sub_range,
    );
    value.round().clamp(0.0, f64::from(MAX_LASER_POSITION)) as u8
}

/// The three position alphabets a KSH laser character may come from, coarse
/// to fine.
const LASER_ALPHABETS: [&str; 3] = [
    "05AFKPUZejo",
    "0257ACFHKMPSUXZbehjmo",
    "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmno",
];

/// Converts a KSH laser character to a position on the `[0, 127]` grid.
/// Returns `None` for characters outside every alphabet.
pub fn laser_char_position(c: char) -> Option<u8> {
    for alphabet in LASER_ALPHABETS {
        if let Some(index) = alphabet.find(c) {
            let index = alphabet[..index].chars().count();
            let last = alphabet.chars().count() - 1;
            let position =
                (index as f64) * f64::from(MAX_LASER_POSITION) / (last as f64);
            return Some(position.round() as u8);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn endpoints_are_exact() {
        for easing in [EasingType::Linear, EasingType::EaseOut, EasingType::EaseIn] {
            for range in [(0.0, 1.0), (0.25, 0.75), (0.0, 0.5)] {
                assert_eq!(interpolate(easing, 0.0, 31.0, 96.0, range), 31.0);
                assert_eq!(interpolate(easing, 1.0, 31.0, 96.0, range), 96.0);
            }
        }
    }

    #[test]
    fn ease_out_midpoint() {
        // sin(pi / 4) * 127 = 89.8, rounded onto the position grid.
        let mid = interpolate_position(EasingType::EaseOut, 0.5, 0, 127, (0.0, 1.0));
        assert_eq!(mid, 90);
    }

    #[test]
    fn split_sub_ranges_stay_continuous() {
        // One segment authored as two adjacent sub-range spans: the first
        // span's end equals the second span's start at the seam.
        let easing = EasingType::EaseOut;
        let seam = ease(easing, 0.5);
        let first_half_end = interpolate(easing, 1.0, 0.0, seam * 127.0, (0.0, 0.5));
        let second_half_start =
            interpolate(easing, 0.0, seam * 127.0, 127.0, (0.5, 1.0));
        assert!((first_half_end - second_half_start).abs() < 1e-9);
    }

    #[test]
    fn ease_in_is_reflected_ease_out() {
        for i in 0..=10 {
            let t = f64::from(i) / 10.0;
            let fwd = ease(EasingType::EaseIn, t);
            let mirrored = 1.0 - ease(EasingType::EaseOut, 1.0 - t);
            assert!((fwd - mirrored).abs() < 1e-12);
        }
    }

    #[test]
    fn laser_characters_cover_all_alphabets() {
        assert_eq!(laser_char_position('0'), Some(0));
        assert_eq!(laser_char_position('o'), Some(127));
        // 'K' sits at index 4 of the 11-character alphabet.
        assert_eq!(laser_char_position('K'), Some(51));
        assert_eq!(laser_char_position('|'), None);
        assert_eq!(laser_char_position('-'), None);
    }
}
