use crate::dns::client::Client;
use crate::dns::selector::{ClientSelector, Sequential, WeightedRand};
use fanout_dns_domain::{FanoutConfig, PolicyKind};
use std::sync::Arc;

/// Binds a selector construction strategy to the engine. One selector is
/// built per query and never reused.
pub enum SelectionPolicy {
    Sequential,
    WeightedRandom { load_factor: Vec<u32> },
}

impl SelectionPolicy {
    pub fn from_config(config: &FanoutConfig) -> Self {
        match config.policy {
            PolicyKind::Sequential => Self::Sequential,
            PolicyKind::WeightedRandom => Self::WeightedRandom {
                load_factor: config.load_factor.clone(),
            },
        }
    }

    pub fn selector(&self, clients: &[Arc<Client>]) -> ClientSelector {
        match self {
            Self::Sequential => ClientSelector::Sequential(Sequential::new(clients.to_vec())),
            Self::WeightedRandom { load_factor } => ClientSelector::WeightedRand(
                WeightedRand::new(clients.to_vec(), load_factor.clone()),
            ),
        }
    }
}
