//! Conversion math shared across the synthesizer.

use libm::{log2f, powf};

/// Converts a (possibly fractional) MIDI semitone value to Hertz.
///
/// Standard tuning: semitone 69 (A4) = 440 Hz.
#[inline]
pub fn semitone_to_hz(semitone: f32) -> f32 {
    440.0 * powf(2.0, (semitone - 69.0) / 12.0)
}

/// Converts a frequency in Hertz to a fractional MIDI semitone value.
#[inline]
pub fn hz_to_semitone(hz: f32) -> f32 {
    69.0 + 12.0 * log2f(hz / 440.0)
}

/// Converts decibels to linear gain with a silence floor.
///
/// Values at or below `floor_db` map to exactly 0.0, so a fader pulled to
/// the bottom of its range is truly silent rather than -36 dB quiet.
#[inline]
pub fn db_to_gain(db: f32, floor_db: f32) -> f32 {
    if db <= floor_db {
        0.0
    } else {
        powf(10.0, db / 20.0)
    }
}

/// Linear interpolation between `a` and `b` by `t` in [0, 1].
#[inline]
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a4_is_440() {
        assert!((semitone_to_hz(69.0) - 440.0).abs() < 0.001);
    }

    #[test]
    fn octave_doubles() {
        let a4 = semitone_to_hz(69.0);
        let a5 = semitone_to_hz(81.0);
        assert!((a5 / a4 - 2.0).abs() < 0.001);
    }

    #[test]
    fn semitone_round_trip() {
        for st in [0.0_f32, 33.5, 60.0, 69.0, 100.25, 127.0] {
            let back = hz_to_semitone(semitone_to_hz(st));
            assert!((back - st).abs() < 0.001, "{st} -> {back}");
        }
    }

    #[test]
    fn db_floor_is_silent() {
        assert_eq!(db_to_gain(-36.0, -36.0), 0.0);
        assert_eq!(db_to_gain(-40.0, -36.0), 0.0);
        assert!((db_to_gain(0.0, -36.0) - 1.0).abs() < 1e-6);
        assert!((db_to_gain(-6.0, -36.0) - 0.501).abs() < 0.01);
    }
}
