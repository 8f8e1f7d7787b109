/*
Note Names and Pitch Math
=========================

All harmony work happens in Hz. Note names are converted once, when the
chord pools are built, and never again.

Naming:
- Letter A-G, optional accidental (`#` or `s` for sharp, `b` for flat),
  then an octave number: C4, F#3, Bb2, Cs5.
- Middle C (C4) is MIDI note 60, A4 (MIDI 69) is 440 Hz.

    midi = 12 * (octave + 1) + semitone
    hz   = 440 * 2^((midi - 69) / 12)

Cents:
- 100 cents = one equal-tempered semitone, 1200 cents = one octave.
- Shifting a frequency by c cents multiplies it by 2^(c / 1200).

    +15 cents on 440 Hz  ->  440 * 2^(15/1200)  ≈ 443.82 Hz
    -15 cents on 440 Hz  ->  440 * 2^(-15/1200) ≈ 436.21 Hz
*/

/// Lowest frequency voicing will produce.
pub const MIN_VOICED_HZ: f32 = 30.0;
/// Highest frequency voicing will produce.
pub const MAX_VOICED_HZ: f32 = 8_000.0;

/// Convert MIDI note number to frequency in Hz.
#[inline]
pub fn midi_to_hz(note: i32) -> f32 {
    440.0 * 2.0_f32.powf((note as f32 - 69.0) / 12.0)
}

/// Parse a note name such as `C4`, `F#3` or `Bb2` into a MIDI note number.
pub fn note_to_midi(name: &str) -> Option<i32> {
    let mut chars = name.trim().chars().peekable();

    let semitone = match chars.next()?.to_ascii_uppercase() {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => return None,
    };

    let accidental = match chars.peek() {
        Some('#') | Some('s') => {
            chars.next();
            1
        }
        Some('b') => {
            chars.next();
            -1
        }
        _ => 0,
    };

    let octave: String = chars.collect();
    let octave: i32 = octave.parse().ok()?;
    if !(-1..=9).contains(&octave) {
        return None;
    }

    Some(12 * (octave + 1) + semitone + accidental)
}

/// Parse a note name straight to Hz.
pub fn note_to_hz(name: &str) -> Option<f32> {
    note_to_midi(name).map(midi_to_hz)
}

/// Frequency ratio for a cents offset.
#[inline]
pub fn cents_to_ratio(cents: f32) -> f32 {
    2.0_f32.powf(cents / 1200.0)
}

/// Interval between two frequencies, in cents.
#[inline]
pub fn cents_between(from_hz: f32, to_hz: f32) -> f32 {
    1200.0 * (to_hz / from_hz).log2()
}

#[inline]
pub fn shift_cents(hz: f32, cents: f32) -> f32 {
    hz * cents_to_ratio(cents)
}

#[inline]
pub fn shift_octaves(hz: f32, octaves: i32) -> f32 {
    hz * 2.0_f32.powi(octaves)
}

/// Move `hz` by whole octaves until it lies within `[lo, hi]`.
///
/// `hi` must be at least an octave above `lo`.
pub fn fold_into_range(hz: f32, lo: f32, hi: f32) -> f32 {
    if !hz.is_finite() || hz <= 0.0 {
        return lo;
    }
    let mut out = hz;
    while out < lo {
        out *= 2.0;
    }
    while out > hi {
        out *= 0.5;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn middle_c_is_60() {
        assert_eq!(note_to_midi("C4"), Some(60));
    }

    #[test]
    fn a440_is_69() {
        assert_eq!(note_to_midi("A4"), Some(69));
        assert_relative_eq!(note_to_hz("A4").unwrap(), 440.0);
    }

    #[test]
    fn sharps_and_flats_are_equal() {
        assert_eq!(note_to_midi("F#3"), note_to_midi("Gb3"));
        assert_eq!(note_to_midi("Cs5"), note_to_midi("Db5"));
        assert_eq!(note_to_midi("Bb2"), Some(46));
    }

    #[test]
    fn rejects_malformed_names() {
        assert_eq!(note_to_midi("H4"), None);
        assert_eq!(note_to_midi("C"), None);
        assert_eq!(note_to_midi("C#x"), None);
        assert_eq!(note_to_midi(""), None);
    }

    #[test]
    fn cents_math() {
        assert_relative_eq!(cents_to_ratio(1200.0), 2.0);
        assert_relative_eq!(cents_between(440.0, 880.0), 1200.0, epsilon = 1e-3);
        assert_relative_eq!(shift_cents(440.0, 15.0), 443.82, epsilon = 0.01);
    }

    #[test]
    fn folding_keeps_pitch_class() {
        let folded = fold_into_range(10.0, MIN_VOICED_HZ, MAX_VOICED_HZ);
        assert_relative_eq!(folded, 40.0);
        let folded = fold_into_range(20_000.0, MIN_VOICED_HZ, MAX_VOICED_HZ);
        assert_relative_eq!(folded, 5_000.0);
        assert_eq!(fold_into_range(-1.0, MIN_VOICED_HZ, MAX_VOICED_HZ), MIN_VOICED_HZ);
    }
}
