//! Pick-sequence selectors over the upstream client set.
//!
//! A selector is built per query and exhausted by it; picks never repeat.

pub mod sequential;
pub mod weighted;

pub use sequential::Sequential;
pub use weighted::WeightedRand;

use crate::dns::client::Client;
use std::sync::Arc;

/// Enum-dispatched selector over upstream clients.
pub enum ClientSelector {
    Sequential(Sequential<Arc<Client>>),
    WeightedRand(WeightedRand<Arc<Client>>),
}

impl ClientSelector {
    /// Next upstream to consult, or `None` once the pool is exhausted.
    pub fn pick(&mut self) -> Option<Arc<Client>> {
        match self {
            Self::Sequential(s) => s.pick(),
            Self::WeightedRand(s) => s.pick(),
        }
    }
}
