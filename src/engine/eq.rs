//! 10-band parametric EQ: band 0 low-shelf, band 9 high-shelf, bands 1-8
//! parametric peaking at Q=1 (SPEC_FULL.md §4.5).

use crate::types::{StereoSample, ENGINE_SAMPLE_RATE};

pub const NUM_BANDS: usize = 10;

/// Fixed center frequencies, roughly one octave apart across the audible
/// range.
pub const BAND_FREQUENCIES_HZ: [f32; NUM_BANDS] =
    [60.0, 150.0, 250.0, 400.0, 630.0, 1_000.0, 1_600.0, 2_500.0, 4_000.0, 10_000.0];

/// Direct-form-II transposed biquad, coefficients recomputed whenever a
/// band's gain changes.
#[derive(Clone, Copy)]
struct BandFilter {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
    z1_l: f32,
    z2_l: f32,
    z1_r: f32,
    z2_r: f32,
}

impl BandFilter {
    fn flat() -> Self {
        Self { b0: 1.0, b1: 0.0, b2: 0.0, a1: 0.0, a2: 0.0, z1_l: 0.0, z2_l: 0.0, z1_r: 0.0, z2_r: 0.0 }
    }

    fn low_shelf(freq: f32, gain_db: f32, sample_rate: f32) -> Self {
        let a = 10f32.powf(gain_db / 40.0);
        let omega = 2.0 * std::f32::consts::PI * freq / sample_rate;
        let cos_omega = omega.cos();
        let sin_omega = omega.sin();
        let s = 1.0; // shelf slope
        let alpha = sin_omega / 2.0 * ((a + 1.0 / a) * (1.0 / s - 1.0) + 2.0).sqrt();
        let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;

        let b0 = a * ((a + 1.0) - (a - 1.0) * cos_omega + two_sqrt_a_alpha);
        let b1 = 2.0 * a * ((a - 1.0) - (a + 1.0) * cos_omega);
        let b2 = a * ((a + 1.0) - (a - 1.0) * cos_omega - two_sqrt_a_alpha);
        let a0 = (a + 1.0) + (a - 1.0) * cos_omega + two_sqrt_a_alpha;
        let a1 = -2.0 * ((a - 1.0) + (a + 1.0) * cos_omega);
        let a2 = (a + 1.0) + (a - 1.0) * cos_omega - two_sqrt_a_alpha;

        Self::normalized(b0, b1, b2, a0, a1, a2)
    }

    fn high_shelf(freq: f32, gain_db: f32, sample_rate: f32) -> Self {
        let a = 10f32.powf(gain_db / 40.0);
        let omega = 2.0 * std::f32::consts::PI * freq / sample_rate;
        let cos_omega = omega.cos();
        let sin_omega = omega.sin();
        let s = 1.0;
        let alpha = sin_omega / 2.0 * ((a + 1.0 / a) * (1.0 / s - 1.0) + 2.0).sqrt();
        let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;

        let b0 = a * ((a + 1.0) + (a - 1.0) * cos_omega + two_sqrt_a_alpha);
        let b1 = -2.0 * a * ((a - 1.0) + (a + 1.0) * cos_omega);
        let b2 = a * ((a + 1.0) + (a - 1.0) * cos_omega - two_sqrt_a_alpha);
        let a0 = (a + 1.0) - (a - 1.0) * cos_omega + two_sqrt_a_alpha;
        let a1 = 2.0 * ((a - 1.0) - (a + 1.0) * cos_omega);
        let a2 = (a + 1.0) - (a - 1.0) * cos_omega - two_sqrt_a_alpha;

        Self::normalized(b0, b1, b2, a0, a1, a2)
    }

    fn peaking(freq: f32, gain_db: f32, q: f32, sample_rate: f32) -> Self {
        let a = 10f32.powf(gain_db / 40.0);
        let omega = 2.0 * std::f32::consts::PI * freq / sample_rate;
        let cos_omega = omega.cos();
        let sin_omega = omega.sin();
        let alpha = sin_omega / (2.0 * q);

        let b0 = 1.0 + alpha * a;
        let b1 = -2.0 * cos_omega;
        let b2 = 1.0 - alpha * a;
        let a0 = 1.0 + alpha / a;
        let a1 = -2.0 * cos_omega;
        let a2 = 1.0 - alpha / a;

        Self::normalized(b0, b1, b2, a0, a1, a2)
    }

    fn normalized(b0: f32, b1: f32, b2: f32, a0: f32, a1: f32, a2: f32) -> Self {
        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
            z1_l: 0.0,
            z2_l: 0.0,
            z1_r: 0.0,
            z2_r: 0.0,
        }
    }

    #[inline]
    fn process(&mut self, frame: StereoSample) -> StereoSample {
        let left = self.b0 * frame.left + self.z1_l;
        self.z1_l = self.b1 * frame.left - self.a1 * left + self.z2_l;
        self.z2_l = self.b2 * frame.left - self.a2 * left;

        let right = self.b0 * frame.right + self.z1_r;
        self.z1_r = self.b1 * frame.right - self.a1 * right + self.z2_r;
        self.z2_r = self.b2 * frame.right - self.a2 * right;

        StereoSample::new(left, right)
    }

    fn reset(&mut self) {
        self.z1_l = 0.0;
        self.z2_l = 0.0;
        self.z1_r = 0.0;
        self.z2_r = 0.0;
    }
}

pub struct ParametricEq {
    bands: [BandFilter; NUM_BANDS],
    gains_db: [f32; NUM_BANDS],
    sample_rate: f32,
    /// Caps band 0's effective gain to prevent doubling when the parallel
    /// bass chain is engaged (SPEC_FULL.md §4.5).
    band0_cap_db: Option<f32>,
}

impl ParametricEq {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            bands: [BandFilter::flat(); NUM_BANDS],
            gains_db: [0.0; NUM_BANDS],
            sample_rate,
            band0_cap_db: None,
        }
    }

    pub fn set_band_gain_db(&mut self, band: usize, gain_db: f32) {
        if band >= NUM_BANDS {
            return;
        }
        self.gains_db[band] = gain_db;
        self.rebuild_band(band);
    }

    pub fn band_gain_db(&self, band: usize) -> f32 {
        self.gains_db.get(band).copied().unwrap_or(0.0)
    }

    /// Mean of bands 0 and 1, used by the caller to auto-engage the bass
    /// chain when it exceeds +3 dB.
    pub fn low_band_average_db(&self) -> f32 {
        (self.gains_db[0] + self.gains_db[1]) / 2.0
    }

    /// Cap band 0's actual applied gain (the parallel bass chain's own
    /// doubling guard); the stored/reported gain is unaffected.
    pub fn set_band0_cap_db(&mut self, cap: Option<f32>) {
        self.band0_cap_db = cap;
        self.rebuild_band(0);
    }

    fn rebuild_band(&mut self, band: usize) {
        let freq = BAND_FREQUENCIES_HZ[band];
        let mut gain = self.gains_db[band];
        if band == 0 {
            if let Some(cap) = self.band0_cap_db {
                gain = gain.min(cap);
            }
        }
        self.bands[band] = if band == 0 {
            BandFilter::low_shelf(freq, gain, self.sample_rate)
        } else if band == NUM_BANDS - 1 {
            BandFilter::high_shelf(freq, gain, self.sample_rate)
        } else {
            BandFilter::peaking(freq, gain, 1.0, self.sample_rate)
        };
    }

    pub fn process(&mut self, buffer: &mut [StereoSample]) {
        for sample in buffer.iter_mut() {
            let mut frame = *sample;
            for band in &mut self.bands {
                frame = band.process(frame);
            }
            *sample = frame;
        }
    }

    pub fn reset(&mut self) {
        for band in &mut self.bands {
            band.reset();
        }
    }
}

impl Default for ParametricEq {
    fn default() -> Self {
        Self::new(ENGINE_SAMPLE_RATE as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_eq_is_near_transparent() {
        let mut eq = ParametricEq::new(44_100.0);
        let mut buf = vec![StereoSample::new(0.5, -0.5); 256];
        eq.process(&mut buf);
        for sample in &buf[32..] {
            assert!((sample.left - 0.5).abs() < 0.01);
        }
    }

    #[test]
    fn low_band_average_reflects_bands_0_and_1() {
        let mut eq = ParametricEq::new(44_100.0);
        eq.set_band_gain_db(0, 4.0);
        eq.set_band_gain_db(1, 2.0);
        assert!((eq.low_band_average_db() - 3.0).abs() < 1e-6);
    }

    #[test]
    fn band0_cap_limits_applied_gain_without_changing_reported_gain() {
        let mut eq = ParametricEq::new(44_100.0);
        eq.set_band_gain_db(0, 8.0);
        eq.set_band0_cap_db(Some(4.0));
        assert_eq!(eq.band_gain_db(0), 8.0);
    }
}
