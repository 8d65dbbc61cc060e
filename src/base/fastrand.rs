//! Lock-free random index selection.
//!
//! [`FastRand`] is a splitmix64 generator whose state is advanced with a
//! single atomic add, so any number of tasks can draw from one instance
//! without a lock. [`fastrange`] maps a draw into `[0, n)` with a
//! multiply-high instead of a modulo.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

const GAMMA: u64 = 0x9e37_79b9_7f4a_7c15;

/// Maps a uniformly distributed `rnd` into `[0, n)`.
///
/// Computes the high 64 bits of the 128-bit product `rnd * n`. Returns 0
/// when `n` is 0.
#[inline]
pub fn fastrange(rnd: u64, n: usize) -> usize {
    ((u128::from(rnd) * n as u128) >> 64) as usize
}

/// Atomically advanced splitmix64 generator.
pub struct FastRand {
    state: AtomicU64,
}

impl FastRand {
    /// Creates a generator with a fixed seed.
    pub fn new(seed: u64) -> Self {
        Self {
            state: AtomicU64::new(seed),
        }
    }

    /// Creates a generator seeded from the thread-local OS-seeded RNG.
    pub fn from_entropy() -> Self {
        Self::new(rand::random())
    }

    /// Returns the next pseudo-random value.
    #[inline]
    pub fn next_u64(&self) -> u64 {
        let z = self
            .state
            .fetch_add(GAMMA, Ordering::Relaxed)
            .wrapping_add(GAMMA);
        mix(z)
    }

    /// Returns a uniformly distributed index in `[0, n)`.
    #[inline]
    pub fn index(&self, n: usize) -> usize {
        fastrange(self.next_u64(), n)
    }
}

impl Default for FastRand {
    fn default() -> Self {
        Self::from_entropy()
    }
}

impl fmt::Debug for FastRand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FastRand").finish_non_exhaustive()
    }
}

#[inline]
fn mix(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}
