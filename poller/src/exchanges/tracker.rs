use std::collections::HashMap;

use crate::model::SymbolPair;

/// Maps exchange-assigned channel ids to the pairs they stream.
///
/// Owned by a single connection and dropped with it, so ids never leak across
/// reconnects.
#[derive(Debug, Default)]
pub struct SubscriptionTracker {
    channels: HashMap<u64, SymbolPair>,
}

impl SubscriptionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an acknowledged subscription. Returns the pair previously bound
    /// to the channel, if the exchange reused the id.
    pub fn record(&mut self, channel_id: u64, pair: SymbolPair) -> Option<SymbolPair> {
        self.channels.insert(channel_id, pair)
    }

    pub fn lookup(&self, channel_id: u64) -> Option<&SymbolPair> {
        self.channels.get(&channel_id)
    }

    pub fn is_subscribed(&self, pair: &SymbolPair) -> bool {
        self.channels.values().any(|known| known.id == pair.id)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}
