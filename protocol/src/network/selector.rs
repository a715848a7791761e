//! Uniform random choice over a static peer list.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::config::PeerAddr;

/// Picks next hops uniformly at random.
///
/// The RNG is injectable: production seeds from OS entropy, tests pass a
/// fixed seed for reproducible choices.
#[derive(Debug)]
pub struct PeerSelector {
    rng: Mutex<StdRng>,
}

impl Default for PeerSelector {
    fn default() -> Self {
        Self::from_entropy()
    }
}

impl PeerSelector {
    /// Seeds from OS entropy.
    pub fn from_entropy() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Deterministic selector for tests.
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    /// Wraps an existing RNG.
    pub fn with_rng(rng: StdRng) -> Self {
        Self {
            rng: Mutex::new(rng),
        }
    }

    /// Picks one peer, or `None` if the list is empty.
    pub fn choose<'a>(&self, peers: &'a [PeerAddr]) -> Option<&'a PeerAddr> {
        peers.choose(&mut *self.rng.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn peers(n: u16) -> Vec<PeerAddr> {
        (0..n).map(|i| PeerAddr::new("10.0.1.1", 7000 + i)).collect()
    }

    #[test]
    fn empty_list_yields_none() {
        assert!(PeerSelector::seeded(1).choose(&[]).is_none());
    }

    #[test]
    fn same_seed_same_sequence() {
        let list = peers(5);
        let a = PeerSelector::seeded(42);
        let b = PeerSelector::seeded(42);
        for _ in 0..20 {
            assert_eq!(a.choose(&list), b.choose(&list));
        }
    }

    #[test]
    fn every_peer_gets_picked() {
        let list = peers(3);
        let selector = PeerSelector::seeded(7);
        let mut hits: HashMap<u16, usize> = HashMap::new();
        for _ in 0..3000 {
            *hits.entry(selector.choose(&list).unwrap().port).or_default() += 1;
        }
        assert_eq!(hits.len(), 3);
        // Roughly uniform: each within 20% of the expected 1000.
        assert!(hits.values().all(|&n| (800..=1200).contains(&n)));
    }
}
