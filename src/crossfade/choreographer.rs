//! Transition Choreographer: turns elapsed fade progress into eight stem
//! gains (four outgoing, four incoming) at 60 Hz (SPEC_FULL.md §4.8).

use crate::types::{Stem, NUM_STEMS};

const DUCK_THRESHOLD: f32 = 0.1;
const BASS_DUCK_GAIN: f32 = 0.707;
const INSTRUMENT_DUCK_GAIN: f32 = 0.85;

/// A (start_fraction, end_fraction) pair describing where within the total
/// fade duration a stem's curve is active.
#[derive(Debug, Clone, Copy)]
pub struct FadeWindow {
    pub outgoing: (f32, f32),
    pub incoming: (f32, f32),
}

/// Per-stem fade windows for one named profile.
#[derive(Debug, Clone, Copy)]
pub struct FadeProfile {
    pub name: &'static str,
    pub windows: [FadeWindow; NUM_STEMS],
}

pub const SMOOTH_PROFILE: FadeProfile = FadeProfile {
    name: "smooth",
    windows: [
        FadeWindow { outgoing: (0.00, 0.40), incoming: (0.20, 0.60) }, // drums
        FadeWindow { outgoing: (0.05, 0.50), incoming: (0.10, 0.50) }, // bass
        FadeWindow { outgoing: (0.15, 0.75), incoming: (0.35, 0.85) }, // vocal
        FadeWindow { outgoing: (0.00, 0.40), incoming: (0.20, 0.60) }, // atmosphere
    ],
};

/// A tighter profile for beat-matched DJ-style transitions: drums and bass
/// swap quickly, vocal and atmosphere linger.
pub const DJ_MIX_PROFILE: FadeProfile = FadeProfile {
    name: "djMix",
    windows: [
        FadeWindow { outgoing: (0.00, 0.20), incoming: (0.00, 0.20) },
        FadeWindow { outgoing: (0.00, 0.25), incoming: (0.05, 0.25) },
        FadeWindow { outgoing: (0.40, 0.90), incoming: (0.50, 0.95) },
        FadeWindow { outgoing: (0.00, 0.30), incoming: (0.10, 0.40) },
    ],
};

/// A profile that front-loads the incoming drop: outgoing cuts fast, the
/// incoming track's drums and bass arrive early.
pub const DROP_PROFILE: FadeProfile = FadeProfile {
    name: "drop",
    windows: [
        FadeWindow { outgoing: (0.00, 0.15), incoming: (0.00, 0.15) },
        FadeWindow { outgoing: (0.00, 0.15), incoming: (0.00, 0.15) },
        FadeWindow { outgoing: (0.10, 0.60), incoming: (0.20, 0.70) },
        FadeWindow { outgoing: (0.00, 0.20), incoming: (0.05, 0.25) },
    ],
};

#[derive(Debug, Clone, Copy, Default)]
pub struct StemGains {
    pub outgoing: [f32; NUM_STEMS],
    pub incoming: [f32; NUM_STEMS],
}

pub struct TransitionChoreographer {
    profile: FadeProfile,
}

impl TransitionChoreographer {
    pub fn new(profile: FadeProfile) -> Self {
        Self { profile }
    }

    pub fn set_profile(&mut self, profile: FadeProfile) {
        self.profile = profile;
    }

    pub fn profile(&self) -> FadeProfile {
        self.profile
    }

    /// `progress` is overall fade progress in `[0, 1]`.
    pub fn gains_at(&self, progress: f32) -> StemGains {
        let progress = progress.clamp(0.0, 1.0);
        let mut gains = StemGains::default();
        for stem in Stem::ALL {
            let window = self.profile.windows[stem as usize];
            gains.outgoing[stem as usize] = curve_value(progress, window.outgoing, true);
            gains.incoming[stem as usize] = curve_value(progress, window.incoming, false);
        }

        let bass = Stem::Bass as usize;
        if gains.outgoing[bass] > DUCK_THRESHOLD && gains.incoming[bass] > DUCK_THRESHOLD {
            gains.incoming[bass] *= BASS_DUCK_GAIN;
        }

        // The "instrument lane" duck applies to vocal: the only melodic,
        // non-drums/non-bass stem in this decomposition (atmosphere is
        // ducked separately via its own window, not this rule).
        let vocal = Stem::Vocal as usize;
        if gains.outgoing[vocal] > DUCK_THRESHOLD && gains.incoming[vocal] > DUCK_THRESHOLD {
            gains.incoming[vocal] *= INSTRUMENT_DUCK_GAIN;
        }

        gains
    }
}

/// Equal-power curve value for one stem's window. `outgoing == true` uses
/// `cos(p·π/2)` (1 → 0); `false` uses `sin(p·π/2)` (0 → 1). Before the
/// window: outgoing = 1, incoming = 0. After: outgoing = 0, incoming = 1.
fn curve_value(progress: f32, window: (f32, f32), is_outgoing: bool) -> f32 {
    let (start, end) = window;
    if progress <= start {
        return if is_outgoing { 1.0 } else { 0.0 };
    }
    if progress >= end {
        return if is_outgoing { 0.0 } else { 1.0 };
    }
    let span = (end - start).max(f32::EPSILON);
    let local = (progress - start) / span;
    if is_outgoing {
        (local * std::f32::consts::FRAC_PI_2).cos()
    } else {
        (local * std::f32::consts::FRAC_PI_2).sin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn before_any_window_outgoing_is_full_and_incoming_silent() {
        let choreographer = TransitionChoreographer::new(SMOOTH_PROFILE);
        let gains = choreographer.gains_at(0.0);
        assert_eq!(gains.outgoing[Stem::Drums as usize], 1.0);
        assert_eq!(gains.incoming[Stem::Drums as usize], 0.0);
    }

    #[test]
    fn after_all_windows_outgoing_is_silent_and_incoming_full() {
        let choreographer = TransitionChoreographer::new(SMOOTH_PROFILE);
        let gains = choreographer.gains_at(1.0);
        for stem in Stem::ALL {
            assert_eq!(gains.outgoing[stem as usize], 0.0);
            assert_eq!(gains.incoming[stem as usize], 1.0);
        }
    }

    #[test]
    fn bass_incoming_is_ducked_during_overlap() {
        let choreographer = TransitionChoreographer::new(SMOOTH_PROFILE);
        // bass window: outgoing (0.05, 0.50), incoming (0.10, 0.50) -- at 0.30
        // both outgoing and incoming bass sit comfortably above the duck threshold.
        let gains = choreographer.gains_at(0.30);
        let bass = Stem::Bass as usize;
        assert!(gains.outgoing[bass] > DUCK_THRESHOLD);
        let unducked_incoming = curve_value(0.30, SMOOTH_PROFILE.windows[bass].incoming, false);
        assert!(gains.incoming[bass] < unducked_incoming);
    }

    #[test]
    fn midpoint_of_a_window_is_equal_power() {
        let value = curve_value(0.5, (0.0, 1.0), false);
        assert!((value - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-5);
    }
}
