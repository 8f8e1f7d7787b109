//! Reverb - Room Simulation via Delay Networks
//!
//! Every voice in the engine sits in a long, dark room, and a dry signal
//! never reaches the master bus. This is the classic Schroeder design, run
//! twice with slightly different delay lengths for a decorrelated stereo
//! tail.
//!
//! # Schroeder Reverb Architecture
//!
//! ```text
//! Input ──┬──→ [Comb 1] ──┐
//!         ├──→ [Comb 2] ──┤
//!         ├──→ [Comb 3] ──┼──→ (+) ──→ [Allpass 1] ──→ [Allpass 2] ──→ Output
//!         └──→ [Comb 4] ──┘
//! ```
//!
//! ## Comb Filters
//!
//! ```text
//! y[n] = x[n] + feedback * lowpass(y[n - delay])
//! ```
//!
//! The delay times are mutually prime so the echoes do not pile up on one
//! frequency. The one-pole low-pass in the loop absorbs highs the way air
//! and soft walls do.
//!
//! ## Allpass Filters
//!
//! ```text
//! y[n] = -g * x[n] + x[n - delay] + g * y[n - delay]
//! ```
//!
//! Allpasses smear the comb echoes into a dense wash without colouring it.
//!
//! # Decay Time
//!
//! The node is configured with a decay time (RT60: seconds for the tail to
//! fall 60 dB) rather than a raw feedback amount. A comb with delay `d`
//! loses `20·log10(g)` dB per pass, so reaching -60 dB after `rt60`
//! seconds needs:
//!
//! ```text
//! g = 10^(-3 · d / rt60)
//! ```

const COMB_DELAYS_MS: [f32; 4] = [29.7, 37.1, 41.1, 43.7];
const ALLPASS_DELAYS_MS: [f32; 2] = [5.0, 1.7];
/// Extra samples on the right channel's delays (at 44.1 kHz).
const STEREO_SPREAD: f32 = 23.0;

#[derive(Debug, Clone)]
pub struct CombFilter {
    buffer: Vec<f32>,
    write_pos: usize,
    feedback: f32,
    damp: f32,
    filter_state: f32,
}

impl CombFilter {
    pub fn new(delay_samples: usize) -> Self {
        Self {
            buffer: vec![0.0; delay_samples.max(1)],
            write_pos: 0,
            feedback: 0.5,
            damp: 0.5,
            filter_state: 0.0,
        }
    }

    pub fn delay_samples(&self) -> usize {
        self.buffer.len()
    }

    pub fn set_feedback(&mut self, feedback: f32) {
        self.feedback = feedback.clamp(0.0, 0.98);
    }

    pub fn set_damp(&mut self, damp: f32) {
        self.damp = damp.clamp(0.0, 1.0);
    }

    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let output = self.buffer[self.write_pos];

        self.filter_state = output * (1.0 - self.damp) + self.filter_state * self.damp;
        self.buffer[self.write_pos] = input + self.filter_state * self.feedback;
        self.write_pos = (self.write_pos + 1) % self.buffer.len();

        output
    }

    pub fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.filter_state = 0.0;
        self.write_pos = 0;
    }
}

#[derive(Debug, Clone)]
pub struct AllpassFilter {
    buffer: Vec<f32>,
    write_pos: usize,
    feedback: f32,
}

impl AllpassFilter {
    pub fn new(delay_samples: usize) -> Self {
        Self {
            buffer: vec![0.0; delay_samples.max(1)],
            write_pos: 0,
            feedback: 0.5,
        }
    }

    pub fn set_feedback(&mut self, feedback: f32) {
        self.feedback = feedback.clamp(0.0, 0.9);
    }

    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let delayed = self.buffer[self.write_pos];
        let output = -self.feedback * input + delayed;

        self.buffer[self.write_pos] = input + self.feedback * output;
        self.write_pos = (self.write_pos + 1) % self.buffer.len();

        output
    }

    pub fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
    }
}

/// One channel: four parallel combs into two series allpasses.
#[derive(Debug, Clone)]
pub struct SchroederReverb {
    combs: [CombFilter; 4],
    allpasses: [AllpassFilter; 2],
    sample_rate: f32,
}

impl SchroederReverb {
    pub fn new(sample_rate: f32, extra_samples: f32) -> Self {
        let samples = |ms: f32| (ms * sample_rate / 1000.0 + extra_samples) as usize;
        let combs = COMB_DELAYS_MS.map(|ms| CombFilter::new(samples(ms)));
        let allpasses = ALLPASS_DELAYS_MS.map(|ms| AllpassFilter::new(samples(ms)));
        Self {
            combs,
            allpasses,
            sample_rate,
        }
    }

    /// Set comb feedback so the tail falls 60 dB in `decay_secs`.
    pub fn set_decay(&mut self, decay_secs: f32) {
        let rt60 = decay_secs.max(0.05);
        for comb in &mut self.combs {
            let delay_secs = comb.delay_samples() as f32 / self.sample_rate;
            comb.set_feedback(10.0_f32.powf(-3.0 * delay_secs / rt60));
        }
    }

    /// Set damping (high frequency absorption)
    pub fn set_damping(&mut self, damp: f32) {
        for comb in &mut self.combs {
            comb.set_damp(damp);
        }
    }

    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let mut output = 0.0;
        for comb in &mut self.combs {
            output += comb.process(input);
        }
        output *= 0.25;

        for allpass in &mut self.allpasses {
            output = allpass.process(output);
        }

        output
    }

    pub fn reset(&mut self) {
        for comb in &mut self.combs {
            comb.reset();
        }
        for allpass in &mut self.allpasses {
            allpass.reset();
        }
    }
}

/// Two decorrelated Schroeder channels with a dry/wet mix.
#[derive(Debug, Clone)]
pub struct StereoReverb {
    left: SchroederReverb,
    right: SchroederReverb,
}

impl StereoReverb {
    pub fn new(sample_rate: f32, decay_secs: f32) -> Self {
        let spread = STEREO_SPREAD * sample_rate / 44_100.0;
        let mut reverb = Self {
            left: SchroederReverb::new(sample_rate, 0.0),
            right: SchroederReverb::new(sample_rate, spread),
        };
        reverb.left.set_decay(decay_secs);
        reverb.right.set_decay(decay_secs);
        reverb.left.set_damping(0.4);
        reverb.right.set_damping(0.4);
        reverb
    }

    /// Process a stereo frame. `wet` is 0..1; the dry signal is scaled by
    /// `1 - wet`.
    #[inline]
    pub fn process(&mut self, frame: [f32; 2], wet: f32) -> [f32; 2] {
        let wet = wet.clamp(0.0, 1.0);
        let mono = 0.5 * (frame[0] + frame[1]);
        let l = self.left.process(mono);
        let r = self.right.process(mono);
        [
            frame[0] * (1.0 - wet) + l * wet,
            frame[1] * (1.0 - wet) + r * wet,
        ]
    }

    pub fn reset(&mut self) {
        self.left.reset();
        self.right.reset();
    }
}
