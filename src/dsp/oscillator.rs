//! Oscillators and noise.

/*
Oscillators
===========

An oscillator is a phase accumulator plus a shaping function. Every sample
the phase advances by `frequency / sample_rate` and wraps at 1.0; the shape
maps the phase to an amplitude in -1.0..=1.0.

    phase  0.0 ──────────────> 1.0 (wrap)

    sine      ╭─╮     sin(2π·phase)
                ╰─╯
    triangle  ╱╲╱     4·|phase - 0.5| - 1, inverted
    sawtooth  ╱│╱│    2·phase - 1
    square    ┌┐└┘    +1 below 0.5, -1 above
    pulse     ┌┐└─┘   +1 below `width`, -1 above


Aliasing and PolyBLEP
---------------------

The sawtooth, square and pulse shapes jump instantly. A jump contains
energy at every frequency, and everything above Nyquist folds back as
inharmonic aliasing, which is very audible on bright drones.

PolyBLEP ("polynomial band-limited step") subtracts a small polynomial
correction around each discontinuity, one sample either side:

    t < dt          :  t/dt·2 - (t/dt)² - 1
    t > 1 - dt      :  ((t-1)/dt)² + (t-1)/dt·2 + 1
    otherwise       :  0

where `dt` is the phase increment. It is cheap and removes most of the
audible aliasing for the frequencies this engine plays.


Control rate
------------

LFOs use the same shapes without the correction; at a few Hertz there is
nothing to alias. `shape` is exposed for them.
*/

use std::f32::consts::TAU;

use crate::toolkit::{NoiseColor, Waveform};

/// Naive bipolar waveform value at `phase` (0..1). Used for control-rate
/// oscillators where aliasing does not matter.
#[inline]
pub fn shape(waveform: Waveform, phase: f32, pulse_width: f32) -> f32 {
    match waveform {
        Waveform::Sine => (TAU * phase).sin(),
        Waveform::Triangle => 1.0 - 4.0 * (phase - 0.5).abs(),
        Waveform::Sawtooth => 2.0 * phase - 1.0,
        Waveform::Square => {
            if phase < 0.5 {
                1.0
            } else {
                -1.0
            }
        }
        Waveform::Pulse => {
            if phase < pulse_width {
                1.0
            } else {
                -1.0
            }
        }
    }
}

#[inline]
fn poly_blep(t: f32, dt: f32) -> f32 {
    if dt <= 0.0 {
        return 0.0;
    }
    if t < dt {
        let x = t / dt;
        x + x - x * x - 1.0
    } else if t > 1.0 - dt {
        let x = (t - 1.0) / dt;
        x * x + x + x + 1.0
    } else {
        0.0
    }
}

/// Audio-rate oscillator with PolyBLEP-corrected edges.
#[derive(Debug, Clone, Default)]
pub struct Oscillator {
    phase: f32,
}

impl Oscillator {
    pub fn new() -> Self {
        Self { phase: 0.0 }
    }

    /// Start at a given phase, used to decorrelate stacked oscillators.
    pub fn with_phase(phase: f32) -> Self {
        Self {
            phase: phase.rem_euclid(1.0),
        }
    }

    pub fn phase(&self) -> f32 {
        self.phase
    }

    pub fn reset(&mut self) {
        self.phase = 0.0;
    }

    /// Produce one sample and advance.
    #[inline]
    pub fn next_sample(
        &mut self,
        waveform: Waveform,
        frequency: f32,
        pulse_width: f32,
        sample_rate: f32,
    ) -> f32 {
        let dt = (frequency / sample_rate).clamp(0.0, 0.5);
        let t = self.phase;
        let width = pulse_width.clamp(0.01, 0.99);

        let value = match waveform {
            Waveform::Sine | Waveform::Triangle => shape(waveform, t, width),
            Waveform::Sawtooth => shape(waveform, t, width) - poly_blep(t, dt),
            Waveform::Square | Waveform::Pulse => {
                let edge = if waveform == Waveform::Square {
                    0.5
                } else {
                    width
                };
                let raw = if t < edge { 1.0 } else { -1.0 };
                raw + poly_blep(t, dt) - poly_blep((t - edge).rem_euclid(1.0), dt)
            }
        };

        self.phase += dt;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }
        value
    }
}

/// Noise with white, pink and brown spectra and a sample-and-hold playback
/// rate: at rate 1.0 a new value is drawn every sample, lower rates hold
/// each value longer and darken the result.
#[derive(Debug, Clone)]
pub struct NoiseSource {
    color: NoiseColor,
    state: u32,
    pink: [f32; 7],
    brown: f32,
    held: f32,
    hold_phase: f32,
}

impl NoiseSource {
    pub fn new(color: NoiseColor, seed: u32) -> Self {
        Self {
            color,
            state: if seed == 0 { 0x9E37_79B9 } else { seed },
            pink: [0.0; 7],
            brown: 0.0,
            held: 0.0,
            hold_phase: 1.0,
        }
    }

    pub fn color(&self) -> NoiseColor {
        self.color
    }

    #[inline]
    fn white(&mut self) -> f32 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.state = x;
        (x as f32 / u32::MAX as f32) * 2.0 - 1.0
    }

    #[inline]
    fn draw(&mut self) -> f32 {
        let white = self.white();
        match self.color {
            NoiseColor::White => white,
            NoiseColor::Pink => {
                // Paul Kellet's refined pink filter.
                let b = &mut self.pink;
                b[0] = 0.99886 * b[0] + white * 0.055_517_9;
                b[1] = 0.99332 * b[1] + white * 0.075_075_9;
                b[2] = 0.96900 * b[2] + white * 0.153_852;
                b[3] = 0.86650 * b[3] + white * 0.310_485_6;
                b[4] = 0.55000 * b[4] + white * 0.532_952_2;
                b[5] = -0.7616 * b[5] - white * 0.016_898;
                let pink = b[0] + b[1] + b[2] + b[3] + b[4] + b[5] + b[6] + white * 0.5362;
                b[6] = white * 0.115_926;
                pink * 0.11
            }
            NoiseColor::Brown => {
                self.brown = (self.brown + 0.02 * white) / 1.02;
                self.brown * 3.5
            }
        }
    }

    /// Produce one sample at the given playback rate.
    #[inline]
    pub fn next_sample(&mut self, rate: f32) -> f32 {
        self.hold_phase += rate.clamp(0.0, 8.0);
        while self.hold_phase >= 1.0 {
            self.hold_phase -= 1.0;
            self.held = self.draw();
        }
        self.held
    }
}
