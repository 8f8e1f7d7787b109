//! Distortion / Waveshaping and bit reduction
//!
//! Distortion adds harmonics by reshaping the waveform. The "drive" parameter
//! controls how aggressively the signal is pushed into the nonlinear region.
//!
//! # How Waveshaping Works
//!
//! A waveshaper applies a transfer function to each sample:
//!   output = f(input * drive)
//!
//! When drive is low (1.0), the signal stays in the linear region of f()
//! and passes through mostly unchanged. As drive increases, the signal hits
//! the nonlinear parts of f(), creating harmonic distortion. The choir's
//! scream mode pushes drive to 6 and raises the wet mix.
//!
//! Soft Clip:
//!   f(x) = x / (1 + |x|)
//!   - Smooth, warm saturation
//!   - Gradually compresses peaks
//!
//! Hard Clip:
//!   f(x) = clamp(x, -threshold, threshold)
//!   - Harsh, buzzy distortion
//!   - Used as the last-resort safety on the device output
//!
//! # Bit Reduction
//!
//! A bit crusher quantises each sample to `2^bits` levels:
//!
//! ```text
//!   steps = 2^(bits - 1)
//!   y     = round(x * steps) / steps
//! ```
//!
//! At 16 bits this is inaudible; at 4-6 bits the static voice gains a
//! gritty, stepped texture.
//!
//! # Drive Values
//!
//!   1.0  = Clean (no distortion)
//!   2-4  = Warm saturation
//!   5-10 = Obvious distortion

/// Soft clipping using x / (1 + |x|) transfer function.
#[inline]
pub fn soft_clip(sample: f32, drive: f32) -> f32 {
    let x = sample * drive;
    x / (1.0 + x.abs())
}

/// Hard clipping - simply clamps the signal at a threshold.
#[inline]
pub fn hard_clip(sample: f32, drive: f32, threshold: f32) -> f32 {
    let x = sample * drive;
    x.clamp(-threshold, threshold)
}

/// Dry/wet soft-clip waveshaper. The wet path is normalised by the drive so
/// raising the drive thickens the sound without a large jump in level.
#[inline]
pub fn waveshape(sample: f32, drive: f32, wet: f32) -> f32 {
    let drive = drive.max(1.0);
    let wet = wet.clamp(0.0, 1.0);
    let makeup = (1.0 + drive) / drive;
    let shaped = soft_clip(sample, drive) * makeup;
    sample * (1.0 - wet) + shaped * wet
}

/// Quantise to `bits` of resolution.
#[inline]
pub fn bit_crush(sample: f32, bits: f32) -> f32 {
    let steps = 2.0_f32.powf(bits.clamp(1.0, 24.0) - 1.0);
    (sample * steps).round() / steps
}

/// Dry/wet bit crusher.
#[inline]
pub fn crush(sample: f32, bits: f32, wet: f32) -> f32 {
    let wet = wet.clamp(0.0, 1.0);
    sample * (1.0 - wet) + bit_crush(sample, bits) * wet
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn soft_clip_unity_drive() {
        // f(0.1) = 0.1 / 1.1 ≈ 0.0909
        assert!((soft_clip(0.1, 1.0) - 0.0909).abs() < 0.01);
    }

    #[test]
    fn soft_clip_high_drive_approaches_one() {
        let output = soft_clip(1.0, 10.0);
        assert!(output > 0.9 && output < 1.0);
    }

    #[test]
    fn hard_clip_limits_to_threshold() {
        assert!((hard_clip(0.3, 1.0, 1.0) - 0.3).abs() < 1e-6);
        assert!((hard_clip(0.8, 2.0, 1.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn dry_waveshaper_is_transparent() {
        for x in [-0.9, -0.2, 0.0, 0.4, 1.0] {
            assert_eq!(waveshape(x, 6.0, 0.0), x);
        }
    }

    #[test]
    fn wet_waveshaper_compresses_peaks() {
        let quiet = waveshape(0.05, 6.0, 1.0) / 0.05;
        let loud = waveshape(1.0, 6.0, 1.0);
        assert!(quiet > loud, "small signals gain more than peaks");
        assert!(loud <= 1.01);
    }

    #[test]
    fn bit_crush_quantises() {
        // 3 bits -> 4 steps per unit.
        assert_eq!(bit_crush(0.3, 3.0), 0.25);
        assert_eq!(bit_crush(-0.6, 3.0), -0.5);
        assert!((bit_crush(0.123_456, 24.0) - 0.123_456).abs() < 1e-6);
        assert_eq!(crush(0.3, 3.0, 0.0), 0.3);
    }
}
