//! Queue and Shuffle: ordered song list, user-queue prefix, and an
//! independent shuffle permutation (SPEC_FULL.md §4.10).

use rand::seq::SliceRandom;

const RECOMMENDATION_REFILL_THRESHOLD: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopMode {
    None,
    One,
    All,
}

impl LoopMode {
    pub fn cycle(self) -> LoopMode {
        match self {
            LoopMode::None => LoopMode::One,
            LoopMode::One => LoopMode::All,
            LoopMode::All => LoopMode::None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SongId(pub String);

/// Whether the underlying song list came from an album (vs. a
/// recommendation/search-derived playlist); album queues never
/// background-load more recommendations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueSource {
    Album,
    Other,
}

pub struct Queue {
    songs: Vec<SongId>,
    current_index: Option<usize>,
    /// How many of the songs immediately after `current_index` were placed
    /// there by `play_next`/`add_to_queue` rather than belonging to the
    /// underlying album/recommendation order. They live directly in `songs`
    /// (SPEC_FULL.md §4.10 requires the ordered list itself to reflect the
    /// user queue, not a side list `move_to_next` has to cross-reference).
    user_queue_count: usize,
    shuffle_order: Vec<usize>,
    shuffle_cursor: usize,
    shuffle_enabled: bool,
    loop_mode: LoopMode,
    source: QueueSource,
}

impl Queue {
    pub fn new(songs: Vec<SongId>, source: QueueSource) -> Self {
        let shuffle_order = (0..songs.len()).collect();
        Self {
            songs,
            current_index: None,
            user_queue_count: 0,
            shuffle_order,
            shuffle_cursor: 0,
            shuffle_enabled: false,
            loop_mode: LoopMode::None,
            source,
        }
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current_index
    }

    pub fn current_song(&self) -> Option<&SongId> {
        self.current_index.and_then(|i| self.songs.get(i))
    }

    pub fn loop_mode(&self) -> LoopMode {
        self.loop_mode
    }

    pub fn cycle_loop_mode(&mut self) {
        self.loop_mode = self.loop_mode.cycle();
    }

    pub fn set_current_index(&mut self, index: usize) {
        self.current_index = Some(index);
    }

    /// Index right after the currently playing song, where the user-queue
    /// block starts (or 0 before anything has played).
    fn user_queue_start(&self) -> usize {
        self.current_index.map(|i| i + 1).unwrap_or(0)
    }

    /// Insert `song` into `songs` at `at`, shifting every shuffle-order
    /// entry that pointed past the insertion point so it still names the
    /// same song. The new index plays back strictly through the user-queue
    /// path, never through `get_next_shuffle_index`, so it doesn't need a
    /// slot of its own in the permutation.
    fn insert_into_songs(&mut self, at: usize, song: SongId) {
        self.songs.insert(at, song);
        for index in self.shuffle_order.iter_mut() {
            if *index >= at {
                *index += 1;
            }
        }
    }

    /// Insert `song` directly after the current index, to play next.
    pub fn play_next(&mut self, song: SongId) {
        let at = self.user_queue_start();
        self.insert_into_songs(at, song);
        self.user_queue_count += 1;
    }

    /// Append `song` to the end of the user queue unless it's already queued.
    pub fn add_to_queue(&mut self, song: SongId) {
        let block_start = self.user_queue_start();
        let block_end = block_start + self.user_queue_count;
        if self.songs[block_start..block_end].contains(&song) {
            return;
        }
        self.insert_into_songs(block_end, song);
        self.user_queue_count += 1;
    }

    /// Advance to the next song: a pending user-queue entry, a shuffled
    /// pick, or the next sequential song. Returns `None` at the end of a
    /// non-looping queue.
    pub fn move_to_next(&mut self) -> Option<&SongId> {
        if self.loop_mode == LoopMode::One {
            return self.current_song();
        }

        if self.user_queue_count > 0 {
            self.user_queue_count -= 1;
            self.current_index = Some(self.user_queue_start());
            return self.current_song();
        }

        let next_index = if self.shuffle_enabled {
            self.get_next_shuffle_index()?
        } else {
            let current = self.current_index.unwrap_or(0);
            let candidate = current + 1;
            if candidate >= self.songs.len() {
                if self.loop_mode == LoopMode::All {
                    0
                } else {
                    return None;
                }
            } else {
                candidate
            }
        };

        self.current_index = Some(next_index);
        self.current_song()
    }

    pub fn move_to_previous(&mut self) -> Option<&SongId> {
        let current = self.current_index?;
        if current == 0 {
            return None;
        }
        self.current_index = Some(current - 1);
        self.current_song()
    }

    /// Shuffle the remaining, not-yet-played songs and reset the cursor.
    /// Grounded on the Fisher-Yates shuffle `rand::seq::SliceRandom` gives
    /// for free; a dedicated RNG is passed in so tests can seed it.
    pub fn enable_shuffle(&mut self, rng: &mut impl rand::Rng) {
        self.shuffle_order = (0..self.songs.len()).collect();
        self.shuffle_order.shuffle(rng);
        self.shuffle_cursor = 0;
        self.shuffle_enabled = true;
    }

    pub fn disable_shuffle(&mut self) {
        self.shuffle_enabled = false;
    }

    pub fn shuffle_enabled(&self) -> bool {
        self.shuffle_enabled
    }

    /// Advance the shuffle cursor, wrapping to 0 under `loop_mode = all`.
    pub fn get_next_shuffle_index(&mut self) -> Option<usize> {
        self.shuffle_cursor += 1;
        if self.shuffle_cursor >= self.shuffle_order.len() {
            if self.loop_mode == LoopMode::All {
                self.shuffle_cursor = 0;
            } else {
                return None;
            }
        }
        self.shuffle_order.get(self.shuffle_cursor).copied()
    }

    pub fn songs_remaining(&self) -> usize {
        let played = self.current_index.map(|i| i + 1).unwrap_or(0);
        self.songs.len().saturating_sub(played)
    }

    /// Whether a background task should load more recommendations now.
    pub fn needs_more_recommendations(&self) -> bool {
        self.source == QueueSource::Other
            && self.loop_mode == LoopMode::None
            && self.songs_remaining() < RECOMMENDATION_REFILL_THRESHOLD
    }

    pub fn extend(&mut self, songs: impl IntoIterator<Item = SongId>) {
        for song in songs {
            self.shuffle_order.push(self.songs.len());
            self.songs.push(song);
        }
    }

    pub fn len(&self) -> usize {
        self.songs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.songs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn song(id: &str) -> SongId {
        SongId(id.to_string())
    }

    fn queue_of(n: usize) -> Queue {
        let songs = (0..n).map(|i| song(&format!("s{i}"))).collect();
        let mut queue = Queue::new(songs, QueueSource::Other);
        queue.set_current_index(0);
        queue
    }

    #[test]
    fn move_to_next_advances_sequentially() {
        let mut queue = queue_of(3);
        assert_eq!(queue.move_to_next(), Some(&song("s1")));
        assert_eq!(queue.move_to_next(), Some(&song("s2")));
        assert_eq!(queue.move_to_next(), None);
    }

    #[test]
    fn loop_all_wraps_at_end() {
        let mut queue = queue_of(2);
        queue.cycle_loop_mode(); // None -> One
        queue.cycle_loop_mode(); // One -> All
        queue.set_current_index(1);
        assert_eq!(queue.move_to_next(), Some(&song("s0")));
    }

    #[test]
    fn loop_one_replays_current() {
        let mut queue = queue_of(3);
        queue.cycle_loop_mode(); // None -> One
        queue.set_current_index(1);
        assert_eq!(queue.move_to_next(), Some(&song("s1")));
    }

    #[test]
    fn play_next_is_consumed_before_sequential_advance() {
        let mut queue = queue_of(3);
        queue.play_next(song("s2"));
        assert_eq!(queue.move_to_next(), Some(&song("s2")));
    }

    #[test]
    fn play_next_inserts_into_the_ordered_song_list() {
        let mut queue = queue_of(3);
        queue.play_next(song("brand-new"));
        assert_eq!(
            queue.songs,
            vec![song("s0"), song("brand-new"), song("s1"), song("s2")]
        );
    }

    #[test]
    fn play_next_of_a_song_never_in_the_original_list_does_not_abort_playback() {
        // Previously `move_to_next` looked up the queued song by position()
        // in `songs`; a song that had never been part of the original order
        // (e.g. queued from search, not from this album) would fail that
        // lookup and `move_to_next` would silently end the queue.
        let mut queue = queue_of(2);
        queue.play_next(song("from-search"));
        assert_eq!(queue.move_to_next(), Some(&song("from-search")));
        assert_eq!(queue.move_to_next(), Some(&song("s1")));
    }

    #[test]
    fn add_to_queue_appends_after_existing_user_queue_block() {
        let mut queue = queue_of(3);
        queue.play_next(song("first"));
        queue.add_to_queue(song("second"));
        assert_eq!(
            queue.songs,
            vec![song("s0"), song("first"), song("second"), song("s1"), song("s2")]
        );
        assert_eq!(queue.move_to_next(), Some(&song("first")));
        assert_eq!(queue.move_to_next(), Some(&song("second")));
        assert_eq!(queue.move_to_next(), Some(&song("s1")));
    }

    #[test]
    fn add_to_queue_skips_duplicates_already_in_the_user_queue_block() {
        let mut queue = queue_of(3);
        queue.play_next(song("dup"));
        queue.add_to_queue(song("dup"));
        assert_eq!(queue.songs, vec![song("s0"), song("dup"), song("s1"), song("s2")]);
    }

    #[test]
    fn shuffle_order_stays_valid_after_a_mid_list_insert() {
        let mut queue = queue_of(4);
        let mut rng = rand::rngs::mock::StepRng::new(0, 1);
        queue.enable_shuffle(&mut rng);
        queue.play_next(song("inserted"));

        let mut seen: Vec<SongId> = queue.shuffle_order.iter().map(|&i| queue.songs[i].clone()).collect();
        seen.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(
            seen,
            vec![song("s0"), song("s1"), song("s2"), song("s3")]
        );
    }

    #[test]
    fn move_to_previous_stops_at_start() {
        let mut queue = queue_of(3);
        queue.set_current_index(1);
        assert_eq!(queue.move_to_previous(), Some(&song("s0")));
        assert_eq!(queue.move_to_previous(), None);
    }

    #[test]
    fn needs_more_recommendations_below_threshold() {
        let mut queue = queue_of(5);
        queue.set_current_index(0);
        assert!(queue.needs_more_recommendations());

        let mut album_queue = queue_of(5);
        album_queue.source = QueueSource::Album;
        assert!(!album_queue.needs_more_recommendations());
    }

    #[test]
    fn shuffle_visits_every_index_once_without_loop() {
        let mut queue = queue_of(5);
        let mut rng = rand::rngs::mock::StepRng::new(0, 1);
        queue.enable_shuffle(&mut rng);
        let mut seen = vec![queue.shuffle_order[0]];
        while let Some(i) = queue.get_next_shuffle_index() {
            seen.push(i);
        }
        seen.sort();
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }
}
