use std::f32::consts::PI;

/*
| response  | passes            | rejects           | used for                     |
| --------- | ----------------- | ----------------- | ---------------------------- |
| low-pass  | below cutoff      | above cutoff      | drone tone, bus tail         |
| high-pass | above cutoff      | below cutoff      | DC block, static thinning    |
| band-pass | around cutoff     | everything else   | formants, rhythm bands       |
| notch     | everything else   | around cutoff     |                              |
| peaking   | all, ± gain at fc | nothing           | choir presence               |

Topology: Andrew Simper's trapezoidal state-variable filter. One pair of
integrator states yields every response above from the same update, and it
stays stable while the cutoff is swept every sample by an LFO.

    g = tan(π · fc / fs)        prewarped integrator gain
    k = 1 / Q                   damping

Band-pass is scaled by k so its peak gain stays at unity whatever the Q.
Peaking reuses the band-pass tap: out = x + k·(A² - 1)·band, with
A = 10^(gain_db / 40) and k = 1 / (Q·A).
*/

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FilterResponse {
    LowPass,
    HighPass,
    BandPass,
    Notch,
    Peaking { gain_db: f32 },
}

pub struct FilterOutputs {
    pub lowpass: f32,
    pub bandpass: f32,
    pub highpass: f32,
    pub notch: f32,
}

#[derive(Debug, Clone)]
pub struct SVFilter {
    ic1eq: f32, // First integrator's memory
    ic2eq: f32, // Second integrator's memory

    pub cutoff_hz: f32,
    pub q: f32,
    response: FilterResponse,
}

impl SVFilter {
    pub fn new(response: FilterResponse, cutoff_hz: f32, q: f32) -> Self {
        Self {
            ic1eq: 0.0,
            ic2eq: 0.0,
            cutoff_hz,
            q,
            response,
        }
    }

    pub fn lowpass(cutoff_hz: f32) -> Self {
        Self::new(FilterResponse::LowPass, cutoff_hz, 0.707)
    }

    pub fn highpass(cutoff_hz: f32) -> Self {
        Self::new(FilterResponse::HighPass, cutoff_hz, 0.707)
    }

    pub fn bandpass(cutoff_hz: f32, q: f32) -> Self {
        Self::new(FilterResponse::BandPass, cutoff_hz, q)
    }

    pub fn response(&self) -> FilterResponse {
        self.response
    }

    pub fn set_response(&mut self, response: FilterResponse) {
        self.response = response;
    }

    /// Prewarped integrator gain. The cutoff is kept just under Nyquist so
    /// a modulated sweep cannot blow up the tangent.
    #[inline]
    pub fn compute_g(cutoff_hz: f32, sample_rate: f32) -> f32 {
        let fc = cutoff_hz.clamp(5.0, sample_rate * 0.49);
        (PI * fc / sample_rate).tan()
    }

    #[inline]
    pub fn next_sample(&mut self, sample: f32, k: f32, g: f32) -> FilterOutputs {
        let h = 1.0 / (1.0 + g * (g + k));
        let v3 = sample - self.ic2eq;
        let v1 = h * (self.ic1eq + g * v3);
        let v2 = self.ic2eq + g * v1;

        self.ic1eq = 2.0 * v1 - self.ic1eq;
        self.ic2eq = 2.0 * v2 - self.ic2eq;

        FilterOutputs {
            lowpass: v2,
            bandpass: v1,
            highpass: sample - k * v1 - v2,
            notch: sample - k * v1,
        }
    }

    /// Filter one sample using the current cutoff and Q.
    #[inline]
    pub fn process(&mut self, sample: f32, sample_rate: f32) -> f32 {
        let g = Self::compute_g(self.cutoff_hz, sample_rate);
        let q = self.q.max(0.05);

        match self.response {
            FilterResponse::Peaking { gain_db } => {
                let a = 10.0_f32.powf(gain_db / 40.0);
                let k = 1.0 / (q * a);
                let out = self.next_sample(sample, k, g);
                sample + k * (a * a - 1.0) * out.bandpass
            }
            response => {
                let k = 1.0 / q;
                let out = self.next_sample(sample, k, g);
                match response {
                    FilterResponse::LowPass => out.lowpass,
                    FilterResponse::HighPass => out.highpass,
                    FilterResponse::BandPass => k * out.bandpass,
                    _ => out.notch,
                }
            }
        }
    }

    pub fn render(&mut self, buffer: &mut [f32], sample_rate: f32) {
        for sample in buffer.iter_mut() {
            *sample = self.process(*sample, sample_rate);
        }
    }

    pub fn reset(&mut self) {
        self.ic1eq = 0.0;
        self.ic2eq = 0.0;
    }

    pub fn set_cutoff(&mut self, cutoff: f32) {
        self.cutoff_hz = cutoff;
    }

    pub fn set_q(&mut self, q: f32) {
        self.q = q;
    }
}
