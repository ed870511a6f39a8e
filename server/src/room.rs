//! Per-room round state machine
//!
//! A room tracks who is present, which round it is on, and what each player
//! was assigned when the latest round started. There is no explicit
//! "in progress" state: a round is a snapshot taken by [`Room::start_round`],
//! which is the only way the round counter ever moves.
//!
//! Words are drawn without replacement from a per-room, per-wordlist pool.
//! When a draw asks for more words than the pool still holds, the leftovers
//! are discarded and the pool is refilled with a fresh shuffle of the full
//! list, so every word of a list is seen once before any word repeats.
//!
//! Time and randomness are always passed in by the caller.

use crate::transport::ConnectionId;
use crate::wordbank::WordBank;
use log::debug;
use rand::seq::{index, SliceRandom};
use rand::Rng;
use shared::StartRequest;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Minimum time between two successful round starts in one room
pub const MIN_ROUND_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoundError {
    #[error("round out of sync: room is at {expected}, request was for {requested}")]
    OutOfSync { expected: u64, requested: u64 },
    #[error("round start requested too soon after the previous one")]
    TooSoon,
    #[error("unknown wordlist {0:?}")]
    UnknownWordlist(String),
    #[error("need two distinct words but only {available} can be drawn")]
    NotEnoughWords { available: usize },
}

#[derive(Debug, Clone, Default)]
pub struct Room {
    players: HashMap<String, ConnectionId>,
    round: u64,
    last_start: Option<Instant>,
    players_in_round: Vec<String>,
    assigned_words: HashMap<String, String>,
    draw_pools: HashMap<String, Vec<String>>,
    current_words: Vec<String>,
}

impl Room {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_player(&self, name: &str) -> bool {
        self.players.contains_key(name)
    }

    /// Player names in lexicographic order
    pub fn player_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.players.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn player_connection(&self, name: &str) -> Option<ConnectionId> {
        self.players.get(name).copied()
    }

    /// (name, connection) pairs ordered by name
    pub fn named_connections(&self) -> Vec<(String, ConnectionId)> {
        let mut pairs: Vec<(String, ConnectionId)> = self
            .players
            .iter()
            .map(|(name, conn)| (name.clone(), *conn))
            .collect();
        pairs.sort();
        pairs
    }

    pub fn connections(&self) -> Vec<ConnectionId> {
        self.named_connections()
            .into_iter()
            .map(|(_, conn)| conn)
            .collect()
    }

    /// Inserts or overwrites the connection holding `name`. Evicting a
    /// previous holder is the caller's job.
    pub fn set_player(&mut self, name: &str, conn: ConnectionId) {
        self.players.insert(name.to_string(), conn);
    }

    pub fn remove_player(&mut self, name: &str) -> Option<ConnectionId> {
        self.players.remove(name)
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn round(&self) -> u64 {
        self.round
    }

    pub fn last_start(&self) -> Option<Instant> {
        self.last_start
    }

    pub fn players_in_round(&self) -> &[String] {
        &self.players_in_round
    }

    pub fn current_words(&self) -> &[String] {
        &self.current_words
    }

    pub fn assigned_word(&self, name: &str) -> Option<&str> {
        self.assigned_words.get(name).map(String::as_str)
    }

    pub fn assigned_words(&self) -> &HashMap<String, String> {
        &self.assigned_words
    }

    /// Draws up to `count` words from the pool for `wordlist` without
    /// replacement, refilling the pool first if it holds fewer than `count`.
    pub fn draw_words<R: Rng + ?Sized>(
        &mut self,
        bank: &WordBank,
        wordlist: &str,
        count: usize,
        rng: &mut R,
    ) -> Result<Vec<String>, RoundError> {
        let full = bank
            .get(wordlist)
            .ok_or_else(|| RoundError::UnknownWordlist(wordlist.to_string()))?;

        let pool = self.draw_pools.entry(wordlist.to_string()).or_default();
        if pool.len() < count {
            debug!("Reshuffling wordlist {} for a draw of {}", wordlist, count);
            *pool = full.to_vec();
            pool.shuffle(rng);
        }

        let keep = pool.len() - count.min(pool.len());
        Ok(pool.split_off(keep))
    }

    /// Number of words a draw of `count` would yield, without touching the pool
    fn draw_size(&self, wordlist: &str, count: usize, available: usize) -> usize {
        let remaining = self.draw_pools.get(wordlist).map_or(0, Vec::len);
        if remaining >= count {
            count
        } else {
            count.min(available)
        }
    }

    /// Starts the next round
    ///
    /// Checks, in order: the request names the current round, the rate limit
    /// has elapsed, the wordlist exists, and at least two words can be drawn.
    /// Any failure leaves the room untouched. On success the players are
    /// shuffled into two teams; the first `n / 2` players of the shuffled
    /// order share one word and the rest share another.
    ///
    /// Returns the new round number.
    pub fn start_round<R: Rng + ?Sized>(
        &mut self,
        bank: &WordBank,
        request: &StartRequest,
        now: Instant,
        rng: &mut R,
    ) -> Result<u64, RoundError> {
        if request.round != self.round {
            return Err(RoundError::OutOfSync {
                expected: self.round,
                requested: request.round,
            });
        }

        if let Some(last) = self.last_start {
            if now.saturating_duration_since(last) < MIN_ROUND_INTERVAL {
                return Err(RoundError::TooSoon);
            }
        }

        let wordcount = request.wordcount();
        let available = bank
            .get(&request.wordlist)
            .ok_or_else(|| RoundError::UnknownWordlist(request.wordlist.clone()))?
            .len();
        let drawable = self.draw_size(&request.wordlist, wordcount, available);
        if drawable < 2 {
            return Err(RoundError::NotEnoughWords {
                available: drawable,
            });
        }

        let words = self.draw_words(bank, &request.wordlist, wordcount, rng)?;
        debug!("Drew words: {}", words.join(", "));

        let picked = index::sample(rng, words.len(), 2);
        let word_a = words[picked.index(0)].clone();
        let word_b = words[picked.index(1)].clone();

        let mut named = self.named_connections();
        named.shuffle(rng);
        let half = named.len() / 2;

        self.round += 1;
        self.last_start = Some(now);
        self.players_in_round = self.player_names();
        self.assigned_words = named
            .into_iter()
            .enumerate()
            .map(|(i, (name, _))| {
                let word = if i < half { &word_a } else { &word_b };
                (name, word.clone())
            })
            .collect();
        self.current_words = words;

        Ok(self.round)
    }

    /// The current round's words in a fresh random order
    pub fn shuffled_current_words<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<String> {
        let mut words = self.current_words.clone();
        words.shuffle(rng);
        words
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    const ANIMALS: [&str; 8] = ["cat", "dog", "fox", "owl", "bee", "ant", "elk", "rat"];

    fn test_bank() -> WordBank {
        WordBank::from_lists([
            ("animals", ANIMALS.to_vec()),
            ("single", vec!["alone"]),
        ])
    }

    fn test_rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    fn room_with_players(names: &[&str]) -> Room {
        let mut room = Room::new();
        for (i, name) in names.iter().enumerate() {
            room.set_player(name, ConnectionId(i as u64 + 1));
        }
        room
    }

    fn start(round: u64, wordcount: Option<usize>) -> StartRequest {
        StartRequest::new(round, "animals", wordcount)
    }

    #[test]
    fn test_room_creation() {
        let room = Room::new();
        assert_eq!(room.round(), 0);
        assert!(room.last_start().is_none());
        assert!(room.players_in_round().is_empty());
        assert!(room.current_words().is_empty());
        assert_eq!(room.player_count(), 0);
    }

    #[test]
    fn test_player_membership() {
        let mut room = Room::new();
        room.set_player("zed", ConnectionId(1));
        room.set_player("amy", ConnectionId(2));
        room.set_player("kim", ConnectionId(3));

        assert!(room.has_player("amy"));
        assert_eq!(room.player_names(), vec!["amy", "kim", "zed"]);
        assert_eq!(room.player_connection("zed"), Some(ConnectionId(1)));

        room.set_player("zed", ConnectionId(9));
        assert_eq!(room.player_connection("zed"), Some(ConnectionId(9)));
        assert_eq!(room.player_count(), 3);

        assert_eq!(room.remove_player("kim"), Some(ConnectionId(3)));
        assert_eq!(room.remove_player("kim"), None);
        assert_eq!(
            room.named_connections(),
            vec![
                ("amy".to_string(), ConnectionId(2)),
                ("zed".to_string(), ConnectionId(9))
            ]
        );
    }

    #[test]
    fn test_draw_words_without_replacement() {
        let bank = test_bank();
        let mut room = Room::new();
        let mut rng = test_rng();

        let words = room.draw_words(&bank, "animals", 5, &mut rng).unwrap();
        let unique: HashSet<&String> = words.iter().collect();

        assert_eq!(words.len(), 5);
        assert_eq!(unique.len(), 5);
        assert!(words.iter().all(|w| ANIMALS.contains(&w.as_str())));
    }

    #[test]
    fn test_draw_words_exhausts_list_before_repeating() {
        let bank = test_bank();
        let mut room = Room::new();
        let mut rng = test_rng();

        let first = room.draw_words(&bank, "animals", 4, &mut rng).unwrap();
        let second = room.draw_words(&bank, "animals", 4, &mut rng).unwrap();

        let seen: HashSet<String> = first.into_iter().chain(second).collect();
        assert_eq!(seen.len(), ANIMALS.len());

        // Pool is now empty, so the next draw starts a fresh generation
        let third = room.draw_words(&bank, "animals", 4, &mut rng).unwrap();
        assert_eq!(third.len(), 4);
        assert_eq!(room.draw_pools["animals"].len(), 4);
    }

    #[test]
    fn test_draw_words_discards_leftovers_on_refill() {
        let bank = test_bank();
        let mut room = Room::new();
        let mut rng = test_rng();

        room.draw_words(&bank, "animals", 6, &mut rng).unwrap();
        assert_eq!(room.draw_pools["animals"].len(), 2);

        let words = room.draw_words(&bank, "animals", 3, &mut rng).unwrap();
        assert_eq!(words.len(), 3);
        // Refilled with all 8, minus the 3 just drawn
        assert_eq!(room.draw_pools["animals"].len(), 5);
    }

    #[test]
    fn test_draw_words_more_than_available() {
        let bank = test_bank();
        let mut room = Room::new();
        let mut rng = test_rng();

        let words = room.draw_words(&bank, "animals", 50, &mut rng).unwrap();
        assert_eq!(words.len(), ANIMALS.len());
    }

    #[test]
    fn test_draw_words_unknown_list() {
        let bank = test_bank();
        let mut room = Room::new();

        assert_eq!(
            room.draw_words(&bank, "plants", 3, &mut test_rng()),
            Err(RoundError::UnknownWordlist("plants".to_string()))
        );
        assert!(room.draw_pools.is_empty());
    }

    #[test]
    fn test_start_round_three_players() {
        let bank = test_bank();
        let mut room = room_with_players(&["P1", "P2", "P3"]);
        let mut rng = test_rng();
        let now = Instant::now();

        assert_eq!(room.start_round(&bank, &start(0, Some(4)), now, &mut rng), Ok(1));

        assert_eq!(room.round(), 1);
        assert_eq!(room.last_start(), Some(now));
        assert_eq!(room.current_words().len(), 4);
        assert_eq!(room.players_in_round(), ["P1", "P2", "P3"]);
        assert_eq!(room.assigned_words().len(), 3);

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for word in room.assigned_words().values() {
            assert!(room.current_words().contains(word));
            *counts.entry(word.as_str()).or_default() += 1;
        }
        assert_eq!(counts.len(), 2);
        let mut sizes: Vec<usize> = counts.values().copied().collect();
        sizes.sort();
        assert_eq!(sizes, vec![1, 2]);
    }

    #[test]
    fn test_start_round_even_split() {
        let bank = test_bank();
        let mut room = room_with_players(&["a", "b", "c", "d"]);
        let mut rng = test_rng();

        room.start_round(&bank, &start(0, None), Instant::now(), &mut rng)
            .unwrap();

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for word in room.assigned_words().values() {
            *counts.entry(word.as_str()).or_default() += 1;
        }
        assert_eq!(counts.values().copied().collect::<Vec<_>>(), vec![2, 2]);
        // Default wordcount is larger than the list, so the whole list is drawn
        assert_eq!(room.current_words().len(), ANIMALS.len());
    }

    #[test]
    fn test_start_round_rate_limited() {
        let bank = test_bank();
        let mut room = room_with_players(&["P1", "P2", "P3"]);
        let mut rng = test_rng();
        let now = Instant::now();

        room.start_round(&bank, &start(0, Some(4)), now, &mut rng)
            .unwrap();
        let assigned = room.assigned_words().clone();

        let soon = now + Duration::from_millis(1999);
        assert_eq!(
            room.start_round(&bank, &start(1, Some(4)), soon, &mut rng),
            Err(RoundError::TooSoon)
        );
        assert_eq!(room.round(), 1);
        assert_eq!(room.last_start(), Some(now));
        assert_eq!(room.assigned_words(), &assigned);

        let later = now + MIN_ROUND_INTERVAL;
        assert_eq!(
            room.start_round(&bank, &start(1, Some(4)), later, &mut rng),
            Ok(2)
        );
        assert_eq!(room.last_start(), Some(later));
    }

    #[test]
    fn test_start_round_out_of_sync() {
        let bank = test_bank();
        let mut room = room_with_players(&["P1", "P2"]);
        let mut rng = test_rng();
        let now = Instant::now();

        assert_eq!(
            room.start_round(&bank, &start(3, None), now, &mut rng),
            Err(RoundError::OutOfSync {
                expected: 0,
                requested: 3
            })
        );

        room.start_round(&bank, &start(0, None), now, &mut rng)
            .unwrap();

        // Stale round number fails no matter how much time has passed
        let much_later = now + Duration::from_secs(600);
        assert!(matches!(
            room.start_round(&bank, &start(0, None), much_later, &mut rng),
            Err(RoundError::OutOfSync { .. })
        ));
        assert_eq!(room.round(), 1);
    }

    #[test]
    fn test_start_round_unknown_wordlist_leaves_room_untouched() {
        let bank = test_bank();
        let mut room = room_with_players(&["P1", "P2"]);
        let request = StartRequest::new(0, "plants", None);

        assert_eq!(
            room.start_round(&bank, &request, Instant::now(), &mut test_rng()),
            Err(RoundError::UnknownWordlist("plants".to_string()))
        );
        assert_eq!(room.round(), 0);
        assert!(room.last_start().is_none());
        assert!(room.assigned_words().is_empty());
    }

    #[test]
    fn test_start_round_needs_two_words() {
        let bank = test_bank();
        let mut room = room_with_players(&["P1", "P2"]);
        let mut rng = test_rng();

        assert_eq!(
            room.start_round(&bank, &start(0, Some(1)), Instant::now(), &mut rng),
            Err(RoundError::NotEnoughWords { available: 1 })
        );
        assert!(room.draw_pools.is_empty());

        let single = StartRequest::new(0, "single", None);
        assert_eq!(
            room.start_round(&bank, &single, Instant::now(), &mut rng),
            Err(RoundError::NotEnoughWords { available: 1 })
        );
        assert_eq!(room.round(), 0);
    }

    #[test]
    fn test_start_round_with_partial_pool_counts_refill() {
        let bank = test_bank();
        let mut room = room_with_players(&["P1", "P2"]);
        let mut rng = test_rng();

        // Leave one word in the pool; a draw of 2 must refill rather than fail
        room.draw_words(&bank, "animals", 7, &mut rng).unwrap();
        room.start_round(&bank, &start(0, Some(2)), Instant::now(), &mut rng)
            .unwrap();
        assert_eq!(room.current_words().len(), 2);
    }

    #[test]
    fn test_players_joining_later_have_no_word() {
        let bank = test_bank();
        let mut room = room_with_players(&["P1", "P2"]);

        room.start_round(&bank, &start(0, None), Instant::now(), &mut test_rng())
            .unwrap();
        room.set_player("late", ConnectionId(50));

        assert!(room.assigned_word("P1").is_some());
        assert!(room.assigned_word("late").is_none());
        assert_eq!(room.players_in_round(), ["P1", "P2"]);
    }

    #[test]
    fn test_same_seed_same_round() {
        let bank = test_bank();
        let mut first = room_with_players(&["a", "b", "c", "d", "e"]);
        let mut second = room_with_players(&["a", "b", "c", "d", "e"]);
        let now = Instant::now();

        first
            .start_round(&bank, &start(0, Some(6)), now, &mut StdRng::seed_from_u64(99))
            .unwrap();
        second
            .start_round(&bank, &start(0, Some(6)), now, &mut StdRng::seed_from_u64(99))
            .unwrap();

        assert_eq!(first.current_words(), second.current_words());
        assert_eq!(first.assigned_words(), second.assigned_words());
    }

    #[test]
    fn test_shuffled_current_words_is_permutation() {
        let bank = test_bank();
        let mut room = room_with_players(&["P1", "P2"]);
        let mut rng = test_rng();

        room.start_round(&bank, &start(0, Some(6)), Instant::now(), &mut rng)
            .unwrap();

        let mut shuffled = room.shuffled_current_words(&mut rng);
        let mut stored = room.current_words().to_vec();
        shuffled.sort();
        stored.sort();
        assert_eq!(shuffled, stored);
    }
}
