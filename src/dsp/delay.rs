/// Circular delay buffer. The buffer is sized once at construction; reads
/// interpolate linearly so the delay time can be automated without zipper
/// noise.
#[derive(Debug, Clone)]
pub struct DelayLine {
    buffer: Vec<f32>,
    write_pos: usize,
}

impl DelayLine {
    pub fn new(max_samples: usize) -> Self {
        Self {
            buffer: vec![0.0; max_samples.max(2)],
            write_pos: 0,
        }
    }

    pub fn with_max_seconds(max_seconds: f32, sample_rate: f32) -> Self {
        Self::new((max_seconds * sample_rate).ceil() as usize + 2)
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Read the sample written `delay_samples` ago (fractional).
    #[inline]
    pub fn read(&self, delay_samples: f32) -> f32 {
        let len = self.buffer.len();
        let delay = delay_samples.clamp(1.0, (len - 1) as f32);
        let whole = delay.floor() as usize;
        let frac = delay - whole as f32;

        let a = self.buffer[(self.write_pos + len - whole) % len];
        let b = self.buffer[(self.write_pos + len - whole - 1) % len];
        a + (b - a) * frac
    }

    #[inline]
    pub fn write(&mut self, sample: f32) {
        self.buffer[self.write_pos] = sample;
        self.write_pos = (self.write_pos + 1) % self.buffer.len();
    }

    pub fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
    }
}
