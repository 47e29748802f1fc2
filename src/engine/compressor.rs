//! Feed-forward compressor: threshold -18 dB, attack 2 ms, release 80 ms
//! (SPEC_FULL.md §4.5). Simpler than the limiter's lookahead design since
//! it sits upstream of it and can tolerate a little overshoot.

use crate::types::StereoSample;

pub struct Compressor {
    threshold: f32,
    ratio: f32,
    attack_coeff: f32,
    release_coeff: f32,
    envelope: f32,
}

impl Compressor {
    pub fn new(sample_rate: f32) -> Self {
        Self::with_params(-18.0, 4.0, 2.0, 80.0, sample_rate)
    }

    pub fn with_params(
        threshold_db: f32,
        ratio: f32,
        attack_ms: f32,
        release_ms: f32,
        sample_rate: f32,
    ) -> Self {
        Self {
            threshold: 10f32.powf(threshold_db / 20.0),
            ratio,
            attack_coeff: (-1.0 / (attack_ms / 1000.0 * sample_rate)).exp(),
            release_coeff: (-1.0 / (release_ms / 1000.0 * sample_rate)).exp(),
            envelope: 0.0,
        }
    }

    pub fn process(&mut self, buffer: &mut [StereoSample]) {
        for sample in buffer.iter_mut() {
            let peak = sample.left.abs().max(sample.right.abs());

            if peak > self.envelope {
                self.envelope = self.attack_coeff * self.envelope + (1.0 - self.attack_coeff) * peak;
            } else {
                self.envelope = self.release_coeff * self.envelope + (1.0 - self.release_coeff) * peak;
            }

            let gain = if self.envelope > self.threshold {
                let excess_db = 20.0 * (self.envelope / self.threshold).log10();
                let reduced_db = excess_db * (1.0 - 1.0 / self.ratio);
                10f32.powf(-reduced_db / 20.0)
            } else {
                1.0
            };

            *sample = sample.scale(gain);
        }
    }

    pub fn reset(&mut self) {
        self.envelope = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn below_threshold_is_transparent() {
        let mut comp = Compressor::new(44_100.0);
        let mut buf = vec![StereoSample::new(0.05, 0.05); 512];
        comp.process(&mut buf);
        assert!((buf.last().unwrap().left - 0.05).abs() < 0.001);
    }

    #[test]
    fn above_threshold_is_reduced() {
        let mut comp = Compressor::new(44_100.0);
        let mut buf = vec![StereoSample::new(0.9, 0.9); 4096];
        comp.process(&mut buf);
        assert!(buf.last().unwrap().left < 0.9);
    }
}
