use serde::{Deserialize, Serialize};

/// Pair addresses the user tracks, in the order they were added.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Watchlist(Vec<String>);

impl Watchlist {
    pub fn contains(&self, pair_address: &str) -> bool {
        self.0.iter().any(|a| a == pair_address)
    }

    /// Returns `false` if the address was already present.
    pub fn add(&mut self, pair_address: &str) -> bool {
        if self.contains(pair_address) {
            return false;
        }
        self.0.push(pair_address.to_string());
        true
    }

    /// Returns `false` if the address was not present.
    pub fn remove(&mut self, pair_address: &str) -> bool {
        let before = self.0.len();
        self.0.retain(|a| a != pair_address);
        before != self.0.len()
    }

    /// Flips membership and returns whether the address is now watched.
    pub fn toggle(&mut self, pair_address: &str) -> bool {
        if self.remove(pair_address) {
            false
        } else {
            self.add(pair_address)
        }
    }

    pub fn addresses(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
