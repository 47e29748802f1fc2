//! Final lookahead limiter: threshold -2 dB, attack 1 ms, release 50 ms
//! (SPEC_FULL.md §4.5).
//!
//! Adapted from a feed-forward lookahead design: each input sample is
//! delayed by the attack window while a sliding-window minimum of the
//! per-sample target gain is tracked, so gain reduction is fully applied
//! before the peak that caused it reaches the output.

use crate::types::StereoSample;

const MAX_DELAY: usize = 256;

pub struct Limiter {
    threshold: f32,
    lookahead: usize,
    delay: [[f32; MAX_DELAY]; 2],
    target_gains: [f32; MAX_DELAY],
    write_pos: usize,
    gain: f32,
    attack_coeff: f32,
    release_coeff: f32,
}

impl Limiter {
    pub fn new(sample_rate: f32) -> Self {
        Self::with_params(-2.0, 1.0, 50.0, sample_rate)
    }

    pub fn with_params(threshold_db: f32, attack_ms: f32, release_ms: f32, sample_rate: f32) -> Self {
        let threshold = 10f32.powf(threshold_db / 20.0);
        let lookahead = ((attack_ms / 1000.0) * sample_rate).round() as usize;
        let lookahead = lookahead.clamp(1, MAX_DELAY);

        let attack_coeff = (-4.605_17 / lookahead as f32).exp();
        let release_coeff = (-1.0 / (release_ms / 1000.0 * sample_rate)).exp();

        Self {
            threshold,
            lookahead,
            delay: [[0.0; MAX_DELAY]; 2],
            target_gains: [1.0; MAX_DELAY],
            write_pos: 0,
            gain: 1.0,
            attack_coeff,
            release_coeff,
        }
    }

    pub fn latency_samples(&self) -> usize {
        self.lookahead
    }

    pub fn process(&mut self, buffer: &mut [StereoSample]) {
        for sample in buffer.iter_mut() {
            let peak = sample.left.abs().max(sample.right.abs());
            let target = if peak > self.threshold { self.threshold / peak } else { 1.0 };
            self.target_gains[self.write_pos] = target;

            let min_gain = self.window_min_gain();
            if min_gain < self.gain {
                self.gain = self.gain * self.attack_coeff + min_gain * (1.0 - self.attack_coeff);
            } else {
                self.gain = self.gain * self.release_coeff + min_gain * (1.0 - self.release_coeff);
            }

            let read_pos = (self.write_pos + MAX_DELAY - self.lookahead) % MAX_DELAY;
            let out_left = self.delay[0][read_pos] * self.gain;
            let out_right = self.delay[1][read_pos] * self.gain;

            self.delay[0][self.write_pos] = sample.left;
            self.delay[1][self.write_pos] = sample.right;

            sample.left = out_left;
            sample.right = out_right;

            self.write_pos = (self.write_pos + 1) % MAX_DELAY;
        }
    }

    #[inline]
    fn window_min_gain(&self) -> f32 {
        let mut min = 1.0_f32;
        for i in 0..self.lookahead {
            let pos = (self.write_pos + MAX_DELAY - i) % MAX_DELAY;
            min = min.min(self.target_gains[pos]);
        }
        min
    }

    pub fn reset(&mut self) {
        self.delay = [[0.0; MAX_DELAY]; 2];
        self.target_gains = [1.0; MAX_DELAY];
        self.write_pos = 0;
        self.gain = 1.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn below_threshold_is_transparent_after_lookahead() {
        let mut limiter = Limiter::new(44_100.0);
        let threshold = limiter.threshold;
        let mut warmup = vec![StereoSample::silence(); 64];
        limiter.process(&mut warmup);

        let level = threshold * 0.5;
        let mut buf = vec![StereoSample::new(level, level); 64];
        limiter.process(&mut buf);

        for sample in &buf[limiter.lookahead..] {
            assert!((sample.left - level).abs() < 1e-4);
        }
    }

    #[test]
    fn hot_signal_is_reduced_toward_threshold() {
        let mut limiter = Limiter::new(44_100.0);
        let threshold = limiter.threshold;
        let mut warmup = vec![StereoSample::silence(); 64];
        limiter.process(&mut warmup);

        let hot = threshold * 2.0;
        let mut buf = vec![StereoSample::new(hot, hot); 256];
        limiter.process(&mut buf);

        for sample in &buf[128..] {
            assert!(sample.left <= threshold * 1.05);
        }
    }
}
