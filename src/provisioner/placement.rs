//! Placement - pick a subnet and security group from configured pools
//!
//! Uniform choice across a static pool spreads filesystems over subnets.
//! Tests inject [`FixedSelector`] instead of relying on a seeded RNG.

use rand::seq::SliceRandom;

/// Chooses one candidate out of a pool
pub trait PlacementSelector: Send + Sync {
    fn choose<'a>(&self, candidates: &'a [String]) -> Option<&'a String>;
}

/// Uniform pseudo-random choice
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomSelector;

impl PlacementSelector for RandomSelector {
    fn choose<'a>(&self, candidates: &'a [String]) -> Option<&'a String> {
        let mut rng = rand::thread_rng();
        candidates.choose(&mut rng)
    }
}

/// Always the candidate at `index`, wrapping around the pool
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedSelector(pub usize);

impl PlacementSelector for FixedSelector {
    fn choose<'a>(&self, candidates: &'a [String]) -> Option<&'a String> {
        if candidates.is_empty() {
            return None;
        }
        candidates.get(self.0 % candidates.len())
    }
}
