//! Time-ordered append keys.
//!
//! 8 characters of millisecond timestamp followed by 12 characters of
//! randomness, drawn from an alphabet whose ASCII order matches its digit
//! order. Keys therefore sort lexicographically in creation order, and two
//! keys minted in the same millisecond are ordered by incrementing the random
//! tail instead of re-rolling it.

use rand::Rng;

const ALPHABET: &[u8; 64] = b"-0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";

const TIME_CHARS: usize = 8;
const RANDOM_CHARS: usize = 12;

#[derive(Debug, Default)]
pub struct PushIdGenerator {
    last_time: i64,
    last_random: [u8; RANDOM_CHARS],
}

impl PushIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id<R: Rng + ?Sized>(&mut self, now_ms: i64, rng: &mut R) -> String {
        // Never go backwards, even if the clock does.
        let now = now_ms.max(self.last_time);
        if now == self.last_time && self.last_time != 0 {
            self.increment_tail();
        } else {
            for slot in self.last_random.iter_mut() {
                *slot = rng.random_range(0..64);
            }
        }
        self.last_time = now;

        let mut out = [0u8; TIME_CHARS + RANDOM_CHARS];
        let mut t = now.max(0) as u64;
        for i in (0..TIME_CHARS).rev() {
            out[i] = ALPHABET[(t % 64) as usize];
            t /= 64;
        }
        for (i, digit) in self.last_random.iter().enumerate() {
            out[TIME_CHARS + i] = ALPHABET[*digit as usize];
        }
        out.iter().map(|b| *b as char).collect()
    }

    fn increment_tail(&mut self) {
        for slot in self.last_random.iter_mut().rev() {
            if *slot == 63 {
                *slot = 0;
            } else {
                *slot += 1;
                return;
            }
        }
    }
}
