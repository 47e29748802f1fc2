//! Playback Tracker: fire-and-forget watch-time pings at milestone
//! thresholds (SPEC_FULL.md §4.11).

use std::time::Duration;

const MILESTONES_SECS: &[f64] = &[10.0, 30.0, 60.0];
const REPEAT_INTERVAL_SECS: f64 = 60.0;

#[derive(Debug, Clone)]
pub struct TrackerContext {
    pub cpn: String,
    pub client_identifier: String,
}

/// Which watch-time window `(st, et)` this ping covers, in seconds since
/// the session started.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WatchWindow {
    pub start_secs: f64,
    pub end_secs: f64,
}

pub struct PlaybackTracker {
    http: reqwest::Client,
    ping_base_url: String,
    context: TrackerContext,
    fired_milestones: Vec<f64>,
    last_fired_secs: f64,
    init_fired: bool,
    end_fired: bool,
}

impl PlaybackTracker {
    pub fn new(http: reqwest::Client, ping_base_url: String, context: TrackerContext) -> Self {
        Self {
            http,
            ping_base_url,
            context,
            fired_milestones: Vec::new(),
            last_fired_secs: 0.0,
            init_fired: false,
            end_fired: false,
        }
    }

    /// Fire the session-start ping. Call once, right after a track loads.
    pub fn fire_init_ping(&mut self) {
        if self.init_fired {
            return;
        }
        self.init_fired = true;
        self.spawn_ping(WatchWindow { start_secs: 0.0, end_secs: 0.0 });
    }

    /// Call periodically (e.g. every second) with elapsed playback time.
    /// Fires the 10/30/60 s milestones and every 60 s thereafter.
    pub fn tick(&mut self, elapsed_secs: f64) {
        for &milestone in MILESTONES_SECS {
            if elapsed_secs >= milestone && !self.fired_milestones.contains(&milestone) {
                self.fired_milestones.push(milestone);
                self.spawn_ping(WatchWindow { start_secs: self.last_fired_secs, end_secs: milestone });
                self.last_fired_secs = milestone;
            }
        }

        let last_repeat_milestone = MILESTONES_SECS.last().copied().unwrap_or(0.0);
        if elapsed_secs > last_repeat_milestone {
            let intervals_elapsed = ((elapsed_secs - last_repeat_milestone) / REPEAT_INTERVAL_SECS) as u64;
            let next_repeat = last_repeat_milestone + (intervals_elapsed as f64) * REPEAT_INTERVAL_SECS;
            if next_repeat > self.last_fired_secs {
                self.spawn_ping(WatchWindow { start_secs: self.last_fired_secs, end_secs: next_repeat });
                self.last_fired_secs = next_repeat;
            }
        }
    }

    /// Fire the session-end attestation ping exactly once.
    pub fn fire_end_ping(&mut self, elapsed_secs: f64) {
        if self.end_fired {
            return;
        }
        self.end_fired = true;
        self.spawn_ping(WatchWindow { start_secs: self.last_fired_secs, end_secs: elapsed_secs });
    }

    fn spawn_ping(&self, window: WatchWindow) {
        let http = self.http.clone();
        let url = self.ping_base_url.clone();
        let cpn = self.context.cpn.clone();
        let client_identifier = self.context.client_identifier.clone();

        tokio::spawn(async move {
            let result = http
                .get(&url)
                .query(&[
                    ("cpn", cpn.as_str()),
                    ("st", &window.start_secs.to_string()),
                    ("et", &window.end_secs.to_string()),
                    ("cid", client_identifier.as_str()),
                ])
                .timeout(Duration::from_secs(5))
                .send()
                .await;

            if let Err(err) = result {
                log::debug!("playback tracker ping failed: {err}");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> PlaybackTracker {
        PlaybackTracker::new(
            reqwest::Client::new(),
            "http://localhost:0/ping".into(),
            TrackerContext { cpn: "abc".into(), client_identifier: "client-1".into() },
        )
    }

    #[tokio::test]
    async fn milestones_fire_exactly_once() {
        let mut tracker = tracker();
        tracker.tick(10.5);
        tracker.tick(10.6);
        assert_eq!(tracker.fired_milestones, vec![10.0]);
    }

    #[tokio::test]
    async fn all_three_milestones_accumulate_in_order() {
        let mut tracker = tracker();
        tracker.tick(65.0);
        assert_eq!(tracker.fired_milestones, vec![10.0, 30.0, 60.0]);
    }

    #[tokio::test]
    async fn repeat_interval_advances_last_fired() {
        let mut tracker = tracker();
        tracker.tick(125.0);
        assert!(tracker.last_fired_secs >= 120.0);
    }

    #[tokio::test]
    async fn end_ping_fires_only_once() {
        let mut tracker = tracker();
        tracker.fire_end_ping(90.0);
        assert!(tracker.end_fired);
        tracker.fire_end_ping(95.0);
    }
}
