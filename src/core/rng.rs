//! Dice Generator
//!
//! Seeded Xorshift128+ for everything this crate rolls itself: initiative
//! expressions on the GM side, and the faces handed out by the scripted dice
//! platform. Physical player throws come from the host platform instead.

use serde::{Serialize, Deserialize};
use sha2::{Sha256, Digest};

/// Faces on every die this system throws.
pub const DIE_FACES: u32 = 6;

/// Seeded dice generator.
///
/// # Example
///
/// ```
/// use combat_helm::core::rng::DeterministicRng;
///
/// let mut rng = DeterministicRng::new(12345);
/// let face = rng.roll_die(6);
/// assert!((1..=6).contains(&face));
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeterministicRng {
    state: [u64; 2],
}

impl Default for DeterministicRng {
    fn default() -> Self {
        Self::new(0)
    }
}

impl DeterministicRng {
    /// Generator for a 64-bit seed. Weak seeds are spread with SplitMix64.
    pub fn new(seed: u64) -> Self {
        let mut s = seed;
        let a = splitmix64(&mut s);
        let b = splitmix64(&mut s);

        // Xorshift never leaves the all-zero state
        if a == 0 && b == 0 {
            return Self { state: [1, 1] };
        }
        Self { state: [a, b] }
    }

    /// Generator seeded from a label such as a player id.
    pub fn from_label(label: &str) -> Self {
        Self::new(derive_seed(label))
    }

    #[inline]
    fn next_u64(&mut self) -> u64 {
        let [s0, mut s1] = self.state;
        let out = s0.wrapping_add(s1);

        s1 ^= s0;
        self.state = [s0.rotate_left(24) ^ s1 ^ (s1 << 16), s1.rotate_left(37)];
        out
    }

    /// One die with `faces` sides, `1..=faces`. A zero-sided die shows 0.
    pub fn roll_die(&mut self, faces: u32) -> u32 {
        if faces == 0 {
            return 0;
        }
        (self.next_u64() % u64::from(faces)) as u32 + 1
    }

    /// `count` six-sided dice.
    pub fn roll_d6(&mut self, count: u32) -> Vec<u32> {
        (0..count).map(|_| self.roll_die(DIE_FACES)).collect()
    }
}

#[inline]
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

/// Seed for a label; every client derives the same one.
pub fn derive_seed(label: &str) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(b"COMBAT_HELM_SEED_V1");
    hasher.update(label.as_bytes());
    let digest = hasher.finalize();

    let mut seed = [0u8; 8];
    seed.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(seed)
}
