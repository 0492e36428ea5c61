use serde::{Deserialize, Serialize};

/// Stores the numbers backpropagation updates constantly
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeStats {
    visits: u64,
    value: f64,
}

impl NodeStats {
    pub fn new() -> Self {
        NodeStats {
            visits: 0,
            value: 0.0,
        }
    }

    /// Retrieve the amount of backpropagation passes through this node
    pub fn visits(&self) -> u64 {
        self.visits
    }

    /// Retrieve the accumulated reward sum
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Function to be used for backpropagation.
    /// Immediately records the reward and increments the visits.
    pub fn record(&mut self, reward: f64) {
        self.visits += 1;
        self.value += reward;
    }

    /// Exact inverse of a batch of `record` calls.
    /// Returns `false` and leaves the stats untouched if `visits` exceeds the current count.
    pub fn retract(&mut self, visits: u64, value: f64) -> bool {
        match self.visits.checked_sub(visits) {
            Some(remaining) => {
                self.visits = remaining;
                self.value -= value;
                true
            }
            None => false,
        }
    }

    /// Helper function just to check if the node has been visited or not
    pub fn is_unvisited(&self) -> bool {
        self.visits == 0
    }

    /// Mean reward, zero while unvisited
    pub fn mean(&self) -> f64 {
        if self.is_unvisited() {
            0.0
        } else {
            self.value / self.visits as f64
        }
    }
}
