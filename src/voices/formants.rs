/*
Formant Presets
===============

A sung vowel is mostly defined by a handful of resonances of the vocal
tract: the formants. Five band-pass filters in parallel, each at one
formant's centre frequency and bandwidth and scaled by its relative level,
turn a buzzy source into something vowel-like.

    source ──┬──→ [BP F1] ──→ [gain A1] ──┐
             ├──→ [BP F2] ──→ [gain A2] ──┤
             ├──→ [BP F3] ──→ [gain A3] ──┼──→ (+) ──→ out
             ├──→ [BP F4] ──→ [gain A4] ──┤
             └──→ [BP F5] ──→ [gain A5] ──┘

Filter Q follows from the bandwidth:

    Q = centre / bandwidth          (800 Hz at 80 Hz wide -> Q = 10)

The values below are the widely used table for four voice registers and
five vowels: centre frequencies in Hz, levels in dB relative to F1, and
bandwidths in Hz.
*/

use serde::{Deserialize, Serialize};

pub const BANDS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vowel {
    A,
    E,
    I,
    O,
    U,
}

impl Vowel {
    pub const ALL: [Vowel; 5] = [Vowel::A, Vowel::E, Vowel::I, Vowel::O, Vowel::U];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Register {
    Soprano,
    Alto,
    Tenor,
    Bass,
}

impl Register {
    pub const ALL: [Register; 4] = [
        Register::Soprano,
        Register::Alto,
        Register::Tenor,
        Register::Bass,
    ];

    /// Register that best fits a note, by the usual vocal ranges.
    pub fn for_pitch(hz: f32) -> Register {
        match hz {
            f if f < 130.0 => Register::Bass,
            f if f < 220.0 => Register::Tenor,
            f if f < 330.0 => Register::Alto,
            _ => Register::Soprano,
        }
    }
}

/// One vowel/register preset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Formant {
    pub freqs: [f32; BANDS],
    pub levels_db: [f32; BANDS],
    pub bandwidths: [f32; BANDS],
}

impl Formant {
    pub fn q(&self, band: usize) -> f32 {
        self.freqs[band] / self.bandwidths[band]
    }
}

const fn f(freqs: [f32; BANDS], levels_db: [f32; BANDS], bandwidths: [f32; BANDS]) -> Formant {
    Formant {
        freqs,
        levels_db,
        bandwidths,
    }
}

const SOPRANO: [Formant; 5] = [
    f([800.0, 1150.0, 2900.0, 3900.0, 4950.0], [0.0, -6.0, -32.0, -20.0, -50.0], [80.0, 90.0, 120.0, 130.0, 140.0]),
    f([350.0, 2000.0, 2800.0, 3600.0, 4950.0], [0.0, -20.0, -15.0, -40.0, -56.0], [60.0, 100.0, 120.0, 150.0, 200.0]),
    f([270.0, 2140.0, 2950.0, 3900.0, 4950.0], [0.0, -12.0, -26.0, -26.0, -44.0], [60.0, 90.0, 100.0, 120.0, 120.0]),
    f([450.0, 800.0, 2830.0, 3800.0, 4950.0], [0.0, -11.0, -22.0, -22.0, -50.0], [70.0, 80.0, 100.0, 130.0, 135.0]),
    f([325.0, 700.0, 2700.0, 3800.0, 4950.0], [0.0, -16.0, -35.0, -40.0, -60.0], [50.0, 60.0, 170.0, 180.0, 200.0]),
];

const ALTO: [Formant; 5] = [
    f([800.0, 1150.0, 2800.0, 3500.0, 4950.0], [0.0, -4.0, -20.0, -36.0, -60.0], [80.0, 90.0, 120.0, 130.0, 140.0]),
    f([400.0, 1600.0, 2700.0, 3300.0, 4950.0], [0.0, -24.0, -30.0, -35.0, -60.0], [60.0, 80.0, 120.0, 150.0, 200.0]),
    f([350.0, 1700.0, 2700.0, 3700.0, 4950.0], [0.0, -20.0, -30.0, -36.0, -60.0], [50.0, 100.0, 120.0, 150.0, 200.0]),
    f([450.0, 800.0, 2830.0, 3500.0, 4950.0], [0.0, -9.0, -16.0, -28.0, -55.0], [70.0, 80.0, 100.0, 130.0, 135.0]),
    f([325.0, 700.0, 2530.0, 3500.0, 4950.0], [0.0, -12.0, -30.0, -40.0, -64.0], [50.0, 60.0, 170.0, 180.0, 200.0]),
];

const TENOR: [Formant; 5] = [
    f([650.0, 1080.0, 2650.0, 2900.0, 3250.0], [0.0, -6.0, -7.0, -8.0, -22.0], [80.0, 90.0, 120.0, 130.0, 140.0]),
    f([400.0, 1700.0, 2600.0, 3200.0, 3580.0], [0.0, -14.0, -12.0, -14.0, -20.0], [70.0, 80.0, 100.0, 120.0, 120.0]),
    f([290.0, 1870.0, 2800.0, 3250.0, 3540.0], [0.0, -15.0, -18.0, -20.0, -30.0], [40.0, 90.0, 100.0, 120.0, 120.0]),
    f([400.0, 800.0, 2600.0, 2800.0, 3000.0], [0.0, -10.0, -12.0, -12.0, -26.0], [40.0, 80.0, 100.0, 120.0, 120.0]),
    f([350.0, 600.0, 2700.0, 2900.0, 3300.0], [0.0, -20.0, -17.0, -14.0, -26.0], [40.0, 60.0, 100.0, 120.0, 120.0]),
];

const BASS: [Formant; 5] = [
    f([600.0, 1040.0, 2250.0, 2450.0, 2750.0], [0.0, -7.0, -9.0, -9.0, -20.0], [60.0, 70.0, 110.0, 120.0, 130.0]),
    f([400.0, 1620.0, 2400.0, 2800.0, 3100.0], [0.0, -12.0, -9.0, -12.0, -18.0], [40.0, 80.0, 100.0, 120.0, 120.0]),
    f([250.0, 1750.0, 2600.0, 3050.0, 3340.0], [0.0, -30.0, -16.0, -22.0, -28.0], [60.0, 90.0, 100.0, 120.0, 120.0]),
    f([400.0, 750.0, 2400.0, 2600.0, 2900.0], [0.0, -11.0, -21.0, -20.0, -40.0], [40.0, 80.0, 100.0, 120.0, 120.0]),
    f([350.0, 600.0, 2400.0, 2675.0, 2950.0], [0.0, -20.0, -32.0, -28.0, -36.0], [40.0, 80.0, 100.0, 120.0, 120.0]),
];

pub fn formant(vowel: Vowel, register: Register) -> &'static Formant {
    let table = match register {
        Register::Soprano => &SOPRANO,
        Register::Alto => &ALTO,
        Register::Tenor => &TENOR,
        Register::Bass => &BASS,
    };
    &table[vowel as usize]
}
