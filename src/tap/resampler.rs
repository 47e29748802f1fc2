//! RT-safe linear-interpolation resampler.
//!
//! Runs inside the real-time callback, so it never allocates in the steady
//! state: scratch buffers are grown once, on demand, before the caller
//! enters the RT path (see `ensure_capacity`), then reused indefinitely.
//!
//! State carried across calls: a fractional phase accumulator and the last
//! sample per channel, so a call boundary never produces a click.

use crate::types::StereoSample;

pub struct LinearResampler {
    input_rate: u32,
    output_rate: u32,
    /// Position in the input stream, as a fraction of one input frame.
    phase: f64,
    last_sample: StereoSample,
    scratch: Vec<StereoSample>,
}

impl LinearResampler {
    pub fn new(input_rate: u32, output_rate: u32) -> Self {
        Self {
            input_rate,
            output_rate,
            phase: 0.0,
            last_sample: StereoSample::silence(),
            scratch: Vec::new(),
        }
    }

    pub fn set_input_rate(&mut self, input_rate: u32) {
        if input_rate != self.input_rate {
            self.input_rate = input_rate;
            self.phase = 0.0;
        }
    }

    /// Grow the scratch buffer to at least `frames` capacity. Call this
    /// off the RT thread before driving `process` with inputs of that size.
    pub fn ensure_capacity(&mut self, frames: usize) {
        if self.scratch.len() < frames {
            self.scratch.resize(frames, StereoSample::silence());
        }
    }

    /// Upper bound on output frames for `input_frames` of input, used by
    /// callers to size their own destination buffers ahead of time.
    pub fn max_output_frames(&self, input_frames: usize) -> usize {
        if self.input_rate == 0 {
            return 0;
        }
        ((input_frames as u64 * self.output_rate as u64) / self.input_rate as u64) as usize + 2
    }

    /// Resample `input` into `output`, returning the number of output
    /// frames produced. Does not allocate as long as `output.len()` is
    /// already sufficient (callers should size it via `max_output_frames`).
    pub fn process(&mut self, input: &[StereoSample], output: &mut [StereoSample]) -> usize {
        if self.input_rate == self.output_rate {
            let n = input.len().min(output.len());
            output[..n].copy_from_slice(&input[..n]);
            if let Some(&last) = input.last() {
                self.last_sample = last;
            }
            return n;
        }

        if input.is_empty() {
            return 0;
        }

        let step = self.input_rate as f64 / self.output_rate as f64;
        let mut out_idx = 0;

        while out_idx < output.len() {
            let frame_pos = self.phase;
            let frame_idx = frame_pos.floor() as usize;
            if frame_idx >= input.len() {
                break;
            }
            let frac = (frame_pos - frame_idx as f64) as f32;

            let current = input[frame_idx];
            let next = input.get(frame_idx + 1).copied().unwrap_or(current);

            output[out_idx] = StereoSample::new(
                current.left + (next.left - current.left) * frac,
                current.right + (next.right - current.right) * frac,
            );
            out_idx += 1;
            self.phase += step;
        }

        // Carry phase forward relative to the next call's input, and
        // remember the last sample in case the next block starts fresh.
        self.phase -= input.len() as f64;
        if self.phase < 0.0 {
            self.phase = 0.0;
        }
        if let Some(&last) = input.last() {
            self.last_sample = last;
        }

        out_idx
    }

    pub fn last_sample(&self) -> StereoSample {
        self.last_sample
    }

    pub fn reset(&mut self) {
        self.phase = 0.0;
        self.last_sample = StereoSample::silence();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_when_rates_match() {
        let mut r = LinearResampler::new(44_100, 44_100);
        let input = vec![StereoSample::new(1.0, -1.0); 10];
        let mut output = vec![StereoSample::silence(); 10];
        let n = r.process(&input, &mut output);
        assert_eq!(n, 10);
        assert_eq!(output, input);
    }

    #[test]
    fn upsampling_produces_approximately_proportional_frames() {
        let input_rate = 22_050;
        let output_rate = 44_100;
        let mut r = LinearResampler::new(input_rate, output_rate);
        let input = vec![StereoSample::new(0.5, 0.5); 1000];
        let max_out = r.max_output_frames(input.len());
        let mut output = vec![StereoSample::silence(); max_out];
        let n = r.process(&input, &mut output);

        let expected = (1000.0 * output_rate as f64 / input_rate as f64).ceil() as i64;
        assert!((n as i64 - expected).abs() <= 2, "n={n} expected~={expected}");
    }

    #[test]
    fn downsampling_produces_approximately_proportional_frames() {
        let input_rate = 48_000;
        let output_rate = 44_100;
        let mut r = LinearResampler::new(input_rate, output_rate);
        let input = vec![StereoSample::new(0.25, -0.25); 4800];
        let max_out = r.max_output_frames(input.len());
        let mut output = vec![StereoSample::silence(); max_out];
        let n = r.process(&input, &mut output);

        let expected = (4800.0 * output_rate as f64 / input_rate as f64).round() as i64;
        assert!((n as i64 - expected).abs() <= 2, "n={n} expected~={expected}");
    }

    #[test]
    fn ensure_capacity_grows_scratch_without_shrinking() {
        let mut r = LinearResampler::new(44_100, 48_000);
        r.ensure_capacity(100);
        assert!(r.scratch.len() >= 100);
        r.ensure_capacity(50);
        assert!(r.scratch.len() >= 100);
    }

    #[test]
    fn reset_clears_phase_and_last_sample() {
        let mut r = LinearResampler::new(22_050, 44_100);
        let input = vec![StereoSample::new(0.1, 0.2); 10];
        let mut output = vec![StereoSample::silence(); 32];
        r.process(&input, &mut output);
        r.reset();
        assert_eq!(r.last_sample(), StereoSample::silence());
    }
}
