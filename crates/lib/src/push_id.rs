//! Chronologically ordered, collision-resistant child keys for `push`.
//!
//! An id is 20 characters: 8 characters encoding the millisecond timestamp,
//! followed by 12 random characters. The alphabet is listed in ASCII order, so
//! ids compare the same way as strings, as UTF-8 bytes and as encoded keys.
//!
//! Ids generated by one generator within the same millisecond reuse the
//! previous random tail plus one, so they still sort in generation order. If
//! the clock moves backwards the generator keeps using the last timestamp it
//! saw.

use std::sync::{Arc, Mutex};

use rand::Rng;

use crate::clock::Clock;

const PUSH_CHARS: &[u8; 64] = b"-0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";
const TIMESTAMP_LEN: usize = 8;
const RANDOM_LEN: usize = 12;

/// Length of every generated id.
pub const PUSH_ID_LEN: usize = TIMESTAMP_LEN + RANDOM_LEN;

#[derive(Debug, Default)]
struct GeneratorState {
    last_millis: u64,
    last_random: [u8; RANDOM_LEN],
}

/// Generates push ids. Shared by every clone of a store.
#[derive(Debug)]
pub struct PushIdGenerator {
    clock: Arc<dyn Clock>,
    state: Mutex<GeneratorState>,
}

impl PushIdGenerator {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state: Mutex::new(GeneratorState::default()),
        }
    }

    /// Returns a new id that sorts after every id this generator returned before.
    pub fn generate(&self) -> String {
        let now = self.clock.now_millis();
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        if now > state.last_millis {
            state.last_millis = now;
            let mut rng = rand::thread_rng();
            for slot in state.last_random.iter_mut() {
                *slot = rng.gen_range(0..64);
            }
        } else if !increment(&mut state.last_random) {
            // The random tail wrapped around; move to the next millisecond.
            state.last_millis += 1;
        }

        let mut id = String::with_capacity(PUSH_ID_LEN);
        let mut millis = state.last_millis;
        let mut timestamp = [0u8; TIMESTAMP_LEN];
        for slot in timestamp.iter_mut().rev() {
            *slot = PUSH_CHARS[(millis % 64) as usize];
            millis /= 64;
        }
        id.extend(timestamp.iter().map(|&b| b as char));
        id.extend(state.last_random.iter().map(|&i| PUSH_CHARS[i as usize] as char));
        id
    }
}

/// Adds one to a base-64 digit string. Returns `false` on overflow.
fn increment(digits: &mut [u8]) -> bool {
    for digit in digits.iter_mut().rev() {
        if *digit < 63 {
            *digit += 1;
            return true;
        }
        *digit = 0;
    }
    false
}
