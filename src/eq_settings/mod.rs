//! EQ Settings Store: a mutable cell holding the current EQ settings,
//! persisted to disk and broadcast to subscribers (SPEC_FULL.md §4.12).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::config::{load_config, save_config};
use crate::engine::{BAND_FREQUENCIES_HZ, NUM_BANDS};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EqSettings {
    pub band_gains_db: [f32; NUM_BANDS],
    pub mega_bass_preset: bool,
}

impl Default for EqSettings {
    fn default() -> Self {
        Self { band_gains_db: [0.0; NUM_BANDS], mega_bass_preset: false }
    }
}

impl EqSettings {
    pub fn band_frequency_hz(band: usize) -> Option<f32> {
        BAND_FREQUENCIES_HZ.get(band).copied()
    }
}

/// Holds the current settings, persists mutations, and broadcasts them to
/// subscribers (the Audio Engine's command producer and any "Tap-EQ"
/// monitoring variant) over a `tokio::sync::watch` channel.
pub struct EqSettingsStore {
    path: PathBuf,
    sender: watch::Sender<EqSettings>,
}

impl EqSettingsStore {
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let settings: EqSettings = load_config(&path);
        let (sender, _receiver) = watch::channel(settings);
        Self { path, sender }
    }

    pub fn current(&self) -> EqSettings {
        self.sender.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<EqSettings> {
        self.sender.subscribe()
    }

    pub fn set_band_gain_db(&mut self, band: usize, gain_db: f32) -> anyhow::Result<()> {
        let mut settings = self.current();
        if let Some(slot) = settings.band_gains_db.get_mut(band) {
            *slot = gain_db;
        }
        self.apply(settings)
    }

    pub fn set_mega_bass_preset(&mut self, engaged: bool) -> anyhow::Result<()> {
        let mut settings = self.current();
        settings.mega_bass_preset = engaged;
        self.apply(settings)
    }

    fn apply(&mut self, settings: EqSettings) -> anyhow::Result<()> {
        save_config(&settings, &self.path)?;
        let _ = self.sender.send(settings);
        Ok(())
    }
}
